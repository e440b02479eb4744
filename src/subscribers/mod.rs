//! # Event subscribers.
//!
//! Subscribers observe the launcher's runtime [`Event`](crate::Event)s without
//! being able to influence the launch.
//!
//! ```text
//! Bus ──► subscriber listener ──► SubscriberSet::emit(&Event)
//!                                   ├──► [queue] ──► LogWriter (tracing)
//!                                   └──► [queue] ──► custom subscribers
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use rankvisor::{Event, EventKind, Subscribe};
//!
//! struct ExitCounter;
//!
//! #[async_trait]
//! impl Subscribe for ExitCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::WorkerExited {
//!             // increment a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "exit-counter"
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
