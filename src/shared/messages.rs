//! Message types for the UI-event loop

use crate::analysis::{Fling, Swipe};

/// Events delivered to the UI-event loop
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Single tap anywhere on the screen
    Tap,
    /// Already-classified swipe
    Swipe(Swipe),
    /// Raw fling, classified by the swipe detector
    Fling(Fling),
    /// Leave the analysis screen
    Quit,
}
