//! Input delivered to the scene once per frame.
//!
//! The host collects window events while it waits for the next frame and
//! hands them over in arrival order; [`crate::Scene::process_events`] applies
//! them before anything is drawn.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Space,
    R,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// New framebuffer size in pixels.
    Resized { width: u32, height: u32 },
    KeyPressed(Key),
    CloseRequested,
}

/// What the host should do after a batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameControl {
    pub should_close: bool,
    /// Flip the status overlay. Flipped once per Space press in the batch.
    pub toggle_overlay: bool,
    /// A shader reload ran.
    pub reloaded: bool,
}
