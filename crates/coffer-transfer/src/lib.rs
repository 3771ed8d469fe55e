//! Outbound body helpers: byte counting, progress reporting and streaming upload.

pub mod counting_sink;
pub mod producers;
pub mod progress;
pub mod tracked_body;
pub mod upload;

pub use counting_sink::CountingSink;
pub use producers::{BytesBody, FileBody};
pub use progress::PercentProgress;
pub use tracked_body::TrackedBody;
