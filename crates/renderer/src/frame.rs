//! Per-frame data handed from the producer to the render thread.
//!
//! A [`FrameContext`] owns a [`FrameArena`]. Each time the producer claims a
//! context it rewinds the arena and builds a fresh [`FramePacket`] in it, so
//! nothing from an earlier use survives. The packet is plain data; the
//! render thread only reads it.

use glam::IVec2;
use relay_core::{ArenaRef, ArenaSlice, FrameArena, FrameTime, Result};

/// One draw replayed after the built-in triangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
}

/// Everything the render thread needs to draw one frame.
///
/// Lives in its context's arena and is valid until the context is reused.
#[derive(Debug, Clone, Copy)]
pub struct FramePacket {
    /// Seconds since the producer's clock started.
    pub t: f32,
    /// Seconds since the previous packet.
    pub dt: f32,
    /// Window drawable size in pixels when the packet was built.
    pub drawable_size: IVec2,
    pub commands: ArenaSlice<DrawCommand>,
}

/// A recyclable frame slot circulating between producer and consumer.
pub struct FrameContext {
    id: usize,
    arena: FrameArena,
    packet: Option<ArenaRef<FramePacket>>,
}

impl FrameContext {
    pub fn new(id: usize, arena_size: usize) -> Self {
        Self {
            id,
            arena: FrameArena::new(arena_size),
            packet: None,
        }
    }

    /// Creates `count` contexts with ids `0..count`.
    pub fn pool(count: usize, arena_size: usize) -> Vec<Self> {
        (0..count).map(|id| Self::new(id, arena_size)).collect()
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn arena(&self) -> &FrameArena {
        &self.arena
    }

    /// Rewinds the arena and forgets the previous packet.
    pub fn begin(&mut self) {
        self.arena.reset();
        self.packet = None;
    }

    /// Builds a new packet, replacing whatever the context held.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::Error::ArenaExhausted`] if the commands do not
    /// fit. The context is left empty in that case.
    pub fn build_packet(
        &mut self,
        time: FrameTime,
        drawable_size: IVec2,
        commands: &[DrawCommand],
    ) -> Result<ArenaRef<FramePacket>> {
        self.begin();

        let slice = self.arena.alloc_array::<DrawCommand>(commands.len())?;
        self.arena.slice_mut(slice).copy_from_slice(commands);

        let packet = self.arena.alloc(FramePacket {
            t: time.t,
            dt: time.dt,
            drawable_size,
            commands: slice,
        })?;
        self.packet = Some(packet);
        Ok(packet)
    }

    /// The packet built for the current use, if any.
    pub fn packet(&self) -> Option<&FramePacket> {
        self.packet.map(|handle| self.arena.get(handle))
    }

    /// Draw commands of the current packet; empty without one.
    pub fn commands(&self) -> &[DrawCommand] {
        match self.packet() {
            Some(packet) => self.arena.slice(packet.commands),
            None => &[],
        }
    }
}

impl std::fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("id", &self.id)
            .field("used", &self.arena.used())
            .field("has_packet", &self.packet.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(t: f32) -> FrameTime {
        FrameTime { t, dt: 1.0 / 60.0 }
    }

    #[test]
    fn test_pool_ids() {
        let pool = FrameContext::pool(3, 1024);
        let ids: Vec<_> = pool.iter().map(FrameContext::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(pool.iter().all(|ctx| ctx.packet().is_none()));
    }

    #[test]
    fn test_build_packet() {
        let mut ctx = FrameContext::new(0, 4096);
        let commands = [
            DrawCommand {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
            },
            DrawCommand {
                vertex_count: 6,
                instance_count: 2,
                first_vertex: 3,
            },
        ];

        ctx.build_packet(time(1.5), IVec2::new(800, 600), &commands)
            .unwrap();

        let packet = ctx.packet().unwrap();
        assert_eq!(packet.t, 1.5);
        assert_eq!(packet.drawable_size, IVec2::new(800, 600));
        assert_eq!(packet.commands.len(), 2);
        assert_eq!(ctx.commands(), &commands);
    }

    #[test]
    fn test_rebuild_replaces_previous_packet() {
        let mut ctx = FrameContext::new(0, 4096);
        let one = [DrawCommand::default()];

        ctx.build_packet(time(0.0), IVec2::new(10, 10), &one).unwrap();
        let used_first = ctx.arena().used();

        ctx.build_packet(time(1.0), IVec2::new(20, 20), &[]).unwrap();
        assert!(ctx.commands().is_empty());
        assert_eq!(ctx.packet().unwrap().drawable_size, IVec2::new(20, 20));
        assert!(ctx.arena().used() <= used_first);
    }

    #[test]
    fn test_build_packet_exhaustion_leaves_context_empty() {
        let mut ctx = FrameContext::new(0, 16);
        let commands = [DrawCommand::default(); 8];

        let err = ctx
            .build_packet(time(0.0), IVec2::ONE, &commands)
            .unwrap_err();
        assert!(matches!(err, relay_core::Error::ArenaExhausted { .. }));
        assert!(ctx.packet().is_none());
        assert!(ctx.commands().is_empty());
    }

    #[test]
    #[should_panic(expected = "after the arena was reset")]
    fn test_stale_packet_handle_panics() {
        let mut ctx = FrameContext::new(0, 1024);
        let stale = ctx.build_packet(time(0.0), IVec2::ONE, &[]).unwrap();
        ctx.begin();
        let _ = ctx.arena().get(stale);
    }

    #[test]
    fn test_frame_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameContext>();
    }
}
