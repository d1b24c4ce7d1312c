//! Context manager: bounds the message window handed to a provider via
//! hot-window truncation, a total character budget, and tool-output
//! clipping.

pub mod clip;
pub mod window;

pub use clip::clip_output;
pub use window::{bound_window, ContextLimits};
