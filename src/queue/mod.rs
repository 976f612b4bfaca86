//! Crawl queue
//!
//! The queue deduplicates discovered URLs, admits them to workers under each
//! host's concurrency and delay limits, and drives the retry/abandon state
//! machine. A single actor task owns the queue; workers talk to it through a
//! cloneable [`QueueHandle`].

mod crawl_queue;
mod handle;
mod host;
mod task;

pub use crawl_queue::{CrawlQueue, EnqueueOutcome, FailureOutcome, QueueSettings, QueueStats};
pub use handle::{spawn_queue, QueueHandle};
pub use host::HostState;
pub use task::{CrawlTask, FailureKind, TaskStatus};
