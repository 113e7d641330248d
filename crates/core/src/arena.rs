//! Per-frame bump allocator.
//!
//! A [`FrameArena`] hands out aligned storage from one fixed buffer and
//! reclaims all of it at once with [`FrameArena::reset`]. Only `Copy` types
//! can be stored, so resetting never has destructors to run.
//!
//! Allocations return small handles ([`ArenaRef`], [`ArenaSlice`]) instead of
//! borrows. A handle remembers the arena and the reset epoch it was issued
//! in; resolving it against another arena or after a reset panics instead of
//! reading recycled memory.
//!
//! # Example
//! ```
//! use relay_core::FrameArena;
//!
//! let mut arena = FrameArena::new(1024);
//! let value = arena.alloc(42u32).unwrap();
//! let items = arena.alloc_array::<u16>(4).unwrap();
//! arena.slice_mut(items)[2] = 7;
//!
//! assert_eq!(*arena.get(value), 42);
//! assert_eq!(arena.slice(items), &[0, 0, 7, 0]);
//!
//! arena.reset();
//! assert_eq!(arena.used(), 0);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(0);

/// Handle to a single value stored in a [`FrameArena`].
pub struct ArenaRef<T> {
    arena: u64,
    epoch: u64,
    offset: usize,
    _marker: PhantomData<fn() -> T>,
}

/// Handle to a contiguous run of values stored in a [`FrameArena`].
pub struct ArenaSlice<T> {
    arena: u64,
    epoch: u64,
    offset: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaSlice<T> {
    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Clone for ArenaRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaRef<T> {}

impl<T> Clone for ArenaSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaSlice<T> {}

impl<T> fmt::Debug for ArenaRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaRef")
            .field("epoch", &self.epoch)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T> fmt::Debug for ArenaSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaSlice")
            .field("epoch", &self.epoch)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Fixed-capacity bump allocator, reset once per frame.
pub struct FrameArena {
    buffer: Box<[MaybeUninit<u8>]>,
    cursor: usize,
    epoch: u64,
    id: u64,
}

impl FrameArena {
    /// Create an arena backed by `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Box::new_uninit_slice(capacity),
            cursor: 0,
            epoch: 0,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes consumed so far, alignment padding included.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Reclaim every allocation. Handles issued before the reset become invalid.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Store `value` at an address aligned for `T`.
    pub fn alloc<T: Copy>(&mut self, value: T) -> Result<ArenaRef<T>> {
        let offset = self.reserve(mem::size_of::<T>(), mem::align_of::<T>())?;

        // SAFETY: `reserve` returned an in-bounds offset with room for one `T`
        // at an address aligned for `T`.
        unsafe {
            ptr::write(self.base_mut().add(offset).cast::<T>(), value);
        }

        Ok(ArenaRef {
            arena: self.id,
            epoch: self.epoch,
            offset,
            _marker: PhantomData,
        })
    }

    /// Reserve `count` default-initialized elements.
    ///
    /// A zero count consumes nothing and yields an empty slice.
    pub fn alloc_array<T: Copy + Default>(&mut self, count: usize) -> Result<ArenaSlice<T>> {
        if count == 0 {
            return Ok(ArenaSlice {
                arena: self.id,
                epoch: self.epoch,
                offset: self.cursor,
                len: 0,
                _marker: PhantomData,
            });
        }

        let size = mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(Error::ArenaExhausted {
                requested: usize::MAX,
                remaining: self.remaining(),
            })?;
        let offset = self.reserve(size, mem::align_of::<T>())?;

        // Zero-sized elements need no writes; `count` may be arbitrarily large
        if size > 0 {
            // SAFETY: `reserve` returned an aligned, in-bounds region of
            // `count * size_of::<T>()` bytes.
            unsafe {
                let first = self.base_mut().add(offset).cast::<T>();
                for i in 0..count {
                    ptr::write(first.add(i), T::default());
                }
            }
        }

        Ok(ArenaSlice {
            arena: self.id,
            epoch: self.epoch,
            offset,
            len: count,
            _marker: PhantomData,
        })
    }

    /// Resolve a value handle.
    ///
    /// # Panics
    /// Panics if the handle belongs to another arena or predates the last reset.
    pub fn get<T: Copy>(&self, handle: ArenaRef<T>) -> &T {
        self.check(handle.arena, handle.epoch);
        // SAFETY: the handle is current, so `alloc` wrote a valid `T` at this
        // aligned offset and nothing has overwritten it since.
        unsafe { &*self.base().add(handle.offset).cast::<T>() }
    }

    /// Mutable counterpart of [`FrameArena::get`].
    pub fn get_mut<T: Copy>(&mut self, handle: ArenaRef<T>) -> &mut T {
        self.check(handle.arena, handle.epoch);
        // SAFETY: see `get`; `&mut self` guarantees exclusivity.
        unsafe { &mut *self.base_mut().add(handle.offset).cast::<T>() }
    }

    /// Resolve a slice handle.
    ///
    /// # Panics
    /// Panics if the handle belongs to another arena or predates the last reset.
    pub fn slice<T: Copy>(&self, handle: ArenaSlice<T>) -> &[T] {
        self.check(handle.arena, handle.epoch);
        if handle.len == 0 {
            return &[];
        }
        // SAFETY: the handle is current, so `alloc_array` initialized `len`
        // aligned elements starting at this offset.
        unsafe { std::slice::from_raw_parts(self.base().add(handle.offset).cast::<T>(), handle.len) }
    }

    /// Mutable counterpart of [`FrameArena::slice`].
    pub fn slice_mut<T: Copy>(&mut self, handle: ArenaSlice<T>) -> &mut [T] {
        self.check(handle.arena, handle.epoch);
        if handle.len == 0 {
            return &mut [];
        }
        // SAFETY: see `slice`; `&mut self` guarantees exclusivity.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.base_mut().add(handle.offset).cast::<T>(),
                handle.len,
            )
        }
    }

    /// Advance the cursor past `size` bytes aligned to `align`, returning the
    /// start offset. Nothing moves on failure.
    fn reserve(&mut self, size: usize, align: usize) -> Result<usize> {
        let address = self.base() as usize + self.cursor;
        let padding = address.next_multiple_of(align) - address;
        let remaining = self.remaining();

        let needed = padding.checked_add(size).filter(|&n| n <= remaining);
        let Some(needed) = needed else {
            tracing::error!(size, align, remaining, "frame arena exhausted");
            return Err(Error::ArenaExhausted {
                requested: size,
                remaining,
            });
        };

        let offset = self.cursor + padding;
        self.cursor += needed;
        Ok(offset)
    }

    fn check(&self, arena: u64, epoch: u64) {
        assert_eq!(arena, self.id, "arena handle resolved against a different arena");
        assert_eq!(
            epoch, self.epoch,
            "arena handle used after the arena was reset"
        );
    }

    #[inline]
    fn base(&self) -> *const u8 {
        self.buffer.as_ptr().cast::<u8>()
    }

    #[inline]
    fn base_mut(&mut self) -> *mut u8 {
        self.buffer.as_mut_ptr().cast::<u8>()
    }
}

impl fmt::Debug for FrameArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArena")
            .field("capacity", &self.capacity())
            .field("used", &self.cursor)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    #[repr(C, align(16))]
    struct Wide {
        a: u64,
        b: u64,
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let mut arena = FrameArena::new(256);
        let a = arena.alloc(1u8).unwrap();
        let b = arena.alloc(0xdead_beefu32).unwrap();
        let c = arena.alloc(Wide { a: 3, b: 4 }).unwrap();

        assert!(b.offset >= a.offset + 1);
        assert!(c.offset >= b.offset + 4);
        assert_eq!(*arena.get(a), 1);
        assert_eq!(*arena.get(b), 0xdead_beef);
        assert_eq!(*arena.get(c), Wide { a: 3, b: 4 });
    }

    #[test]
    fn test_alignment_is_respected() {
        let mut arena = FrameArena::new(256);
        arena.alloc(7u8).unwrap();
        let wide = arena.alloc(Wide::default()).unwrap();
        let address = arena.get(wide) as *const Wide as usize;
        assert!(address.is_multiple_of(16));

        arena.alloc(1u8).unwrap();
        let words = arena.alloc_array::<u64>(3).unwrap();
        assert!((arena.slice(words).as_ptr() as usize).is_multiple_of(8));
    }

    #[test]
    fn test_padding_is_counted_in_used() {
        let mut arena = FrameArena::new(256);
        arena.alloc(1u8).unwrap();
        let before = arena.used();
        arena.alloc(2u64).unwrap();
        assert!(arena.used() >= before + 8);
        assert_eq!(arena.remaining(), arena.capacity() - arena.used());
    }

    #[test]
    fn test_overflow_fails_without_consuming() {
        let mut arena = FrameArena::new(64);
        arena.alloc_array::<u8>(60).unwrap();
        let used = arena.used();

        let err = arena.alloc_array::<u64>(2).unwrap_err();
        assert!(matches!(err, Error::ArenaExhausted { requested: 16, .. }));
        assert_eq!(arena.used(), used);

        assert!(arena.alloc_array::<u64>(usize::MAX).is_err());
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn test_exact_fit_succeeds() {
        let mut arena = FrameArena::new(32);
        let bytes = arena.alloc_array::<u8>(32).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(arena.remaining(), 0);
        assert!(arena.alloc(0u8).is_err());
    }

    #[test]
    fn test_zero_count_array_is_empty_and_free() {
        let mut arena = FrameArena::new(32);
        let empty = arena.alloc_array::<Wide>(0).unwrap();
        assert!(empty.is_empty());
        assert_eq!(arena.used(), 0);
        assert!(arena.slice(empty).is_empty());
    }

    #[test]
    fn test_zero_sized_array_of_any_length_is_free() {
        #[derive(Clone, Copy, Default, Debug, PartialEq)]
        struct Marker;

        let mut arena = FrameArena::new(16);
        let markers = arena.alloc_array::<Marker>(usize::MAX).unwrap();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.slice(markers).len(), usize::MAX);
        assert_eq!(arena.slice(markers)[0], Marker);
    }

    #[test]
    fn test_reset_gives_deterministic_offsets() {
        let mut arena = FrameArena::new(512);
        let run = |arena: &mut FrameArena| {
            let a = arena.alloc(1u16).unwrap().offset;
            let b = arena.alloc(Wide::default()).unwrap().offset;
            let c = arena.alloc_array::<u32>(5).unwrap().offset;
            (a, b, c, arena.used())
        };

        let first = run(&mut arena);
        arena.reset();
        assert_eq!(arena.used(), 0);
        let second = run(&mut arena);
        assert_eq!(first, second);
    }

    #[test]
    fn test_array_is_default_initialized_and_writable() {
        let mut arena = FrameArena::new(128);
        let items = arena.alloc_array::<u32>(4).unwrap();
        assert_eq!(arena.slice(items), &[0, 0, 0, 0]);

        arena.slice_mut(items).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.slice(items), &[1, 2, 3, 4]);

        let value = arena.alloc(5i32).unwrap();
        *arena.get_mut(value) += 1;
        assert_eq!(*arena.get(value), 6);
    }

    #[test]
    #[should_panic(expected = "after the arena was reset")]
    fn test_stale_handle_panics() {
        let mut arena = FrameArena::new(64);
        let value = arena.alloc(9u32).unwrap();
        arena.reset();
        let _ = arena.get(value);
    }

    #[test]
    #[should_panic(expected = "different arena")]
    fn test_foreign_handle_panics() {
        let mut a = FrameArena::new(64);
        let b = FrameArena::new(64);
        let value = a.alloc(1u8).unwrap();
        let _ = b.get(value);
    }

    #[test]
    fn test_arena_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameArena>();
        assert_send::<ArenaRef<u32>>();
        assert_send::<ArenaSlice<u32>>();
    }
}
