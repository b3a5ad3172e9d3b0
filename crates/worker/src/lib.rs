//! Worker runtime primitives shared by background features.
//!
//! * [`TaskClass`]: execution class attached to every spawned task.
//! * [`spawn`]: routes work onto the ambient tokio runtime.
//! * [`GenerationToken`]: generation-scoped cooperative cancellation.
//! * [`WorkScheduler`]: debounced single-flight scheduling.

mod class;
mod scheduler;
mod spawn;
mod token;

pub use class::TaskClass;
pub use scheduler::{SchedulePhase, WorkScheduler};
pub use spawn::{join_error_panic_message, spawn};
pub use token::{GenerationClock, GenerationToken};
pub use tokio_util::sync::CancellationToken;
