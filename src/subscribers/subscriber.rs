//! # Event subscriber trait.
//!
//! Each subscriber gets:
//! - a **dedicated worker task**,
//! - a **bounded queue** (capacity via [`Subscribe::queue_capacity`]),
//! - **panic isolation**: a panicking handler is logged and the worker moves on.
//!
//! A slow subscriber only affects its own queue. When the queue is full the
//! new event is dropped for that subscriber alone.

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for launcher observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from the subscriber's own worker task, in FIFO order.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic reports.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity (min 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
