pub mod capabilities;
pub mod ctx;
pub mod events;
pub mod ids;
pub mod kind;
pub mod message;
pub mod priority;
pub mod record;
pub mod stats;

pub use capabilities::QueueCapabilities;
pub use ctx::QueueCtx;
pub use events::JobEvent;
pub use ids::{JobId, LeaseToken};
pub use kind::JobKind;
pub use message::JobMessage;
pub use priority::Priority;
pub use record::{JobRecord, JobStatus, LeasedJob};
pub use stats::QueueStats;
