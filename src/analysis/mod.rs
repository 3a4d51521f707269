//! Analysis Engine
//!
//! Turns UI events and camera frames into overlay updates and speech.

pub mod gesture;
pub mod session;

pub use gesture::{Fling, Swipe, SwipeDetector};
pub use session::{AnalysisMode, AnalysisSession, FrameOutcome, SessionSettings, TapOutcome};
