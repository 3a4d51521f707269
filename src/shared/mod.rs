//! Messaging between the input thread and the UI-event loop

pub mod messages;

pub use messages::UiEvent;
