//! Scrawl Scheduler Library
//!
//! Cancellation tokens and cancellable interval timers for the background
//! maintenance loops.
//!
//! # Example
//!
//! ```
//! use scrawl_scheduler::IntervalTimer;
//! use std::time::Duration;
//!
//! let cleanup = IntervalTimer::new("cleanup", Duration::from_secs(30))
//!     .start(|| {
//!         // ... evict idle resources ...
//!     })
//!     .unwrap();
//!
//! // Stopping wakes the timer thread immediately
//! cleanup.stop();
//! ```

mod cancel;
mod timer;

pub use cancel::CancellationToken;
pub use timer::{IntervalTimer, TimerHandle};
