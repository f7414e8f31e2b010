pub mod dedup;
pub mod format;
pub mod sink;

pub use dedup::Deduplicator;
pub use format::format;
pub use sink::{Badge, LogSink, Notification, NotificationSink};
