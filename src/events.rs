/// Viewer input, already mapped from window and keyboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    Next,
    Previous,
    Exit,
}

/// Events injected into the window event loop from outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Shutdown was requested by a signal handler.
    Cancelled,
}
