//! Translation of winit window events into the few the frame engine reacts to.

use glam::IVec2;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::window::size_to_ivec;

/// Window events relevant to the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The user asked to close the window (close button or Escape).
    Quit,
    /// The drawable area changed. May be zero while minimized.
    Resized(IVec2),
}

impl PlatformEvent {
    /// Maps a winit event, ignoring everything the engine has no use for.
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::CloseRequested => Some(Self::Quit),
            WindowEvent::Resized(size) => Some(Self::Resized(size_to_ivec(*size))),
            WindowEvent::KeyboardInput { event, .. } => key_event(event),
            _ => None,
        }
    }
}

fn key_event(event: &KeyEvent) -> Option<PlatformEvent> {
    match (event.physical_key, event.state, event.repeat) {
        (PhysicalKey::Code(KeyCode::Escape), ElementState::Pressed, false) => {
            Some(PlatformEvent::Quit)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn test_close_requested_is_quit() {
        assert_eq!(
            PlatformEvent::from_window_event(&WindowEvent::CloseRequested),
            Some(PlatformEvent::Quit)
        );
    }

    #[test]
    fn test_resized_carries_size() {
        let event = WindowEvent::Resized(PhysicalSize::new(1024, 768));
        assert_eq!(
            PlatformEvent::from_window_event(&event),
            Some(PlatformEvent::Resized(IVec2::new(1024, 768)))
        );
    }

    #[test]
    fn test_minimize_resizes_to_zero() {
        let event = WindowEvent::Resized(PhysicalSize::new(0, 0));
        assert_eq!(
            PlatformEvent::from_window_event(&event),
            Some(PlatformEvent::Resized(IVec2::ZERO))
        );
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        assert_eq!(
            PlatformEvent::from_window_event(&WindowEvent::Focused(true)),
            None
        );
        assert_eq!(
            PlatformEvent::from_window_event(&WindowEvent::RedrawRequested),
            None
        );
    }
}
