//! Cancellable interval timers
//!
//! Each timer owns one thread that sleeps on a [`CancellationToken`] between
//! ticks, so stopping a timer never waits out a full interval.

use crate::CancellationToken;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Builder for a named interval timer
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    name: String,
    interval: Duration,
}

impl IntervalTimer {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the timer thread; the first tick happens after one interval
    pub fn start<F>(self, mut tick: F) -> std::io::Result<TimerHandle>
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let interval = self.interval.max(Duration::from_millis(1));

        let thread_token = token.clone();
        let thread_ticks = Arc::clone(&ticks);
        let name = self.name.clone();
        let thread = thread::Builder::new()
            .name(format!("scrawl-{}", self.name))
            .spawn(move || {
                tracing::debug!(timer = %name, ?interval, "timer started");
                while !thread_token.wait_timeout(interval) {
                    tick();
                    thread_ticks.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(timer = %name, "timer stopped");
            })?;

        Ok(TimerHandle {
            name: self.name,
            token,
            ticks,
            thread: Some(thread),
        })
    }
}

/// Running timer; stops (and joins) when dropped
pub struct TimerHandle {
    name: String,
    token: CancellationToken,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop the timer and wait for an in-flight tick to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(timer = %self.name, "timer thread panicked");
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("name", &self.name)
            .field("ticks", &self.ticks())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_timer_ticks_until_stopped() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let handle = IntervalTimer::new("test", Duration::from_millis(5))
            .start(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.ticks() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_running());
        handle.stop();

        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_does_not_wait_for_interval() {
        let handle = IntervalTimer::new("slow", Duration::from_secs(3600))
            .start(|| {})
            .unwrap();
        let start = Instant::now();
        drop(handle);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_no_tick_before_first_interval() {
        let handle = IntervalTimer::new("late", Duration::from_secs(3600))
            .start(|| panic!("should not tick"))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.ticks(), 0);
        assert_eq!(handle.name(), "late");
    }
}
