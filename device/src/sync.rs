//! Timeline synchronization for asynchronous kernel submission.
//!
//! Every device queue owns a timeline signal: a monotonically increasing
//! counter. Each submitted launch is assigned the next timeline value and the
//! signal reaches that value once the launch has finished. A
//! [`CompletionToken`] is the (signal, value) pair handed back to the caller.
//!
//! ```ignore
//! let token = device.launch(&kernel, &args)?;
//! token.wait(1000)?;  // Wait up to one second for the launch to finish
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RuntimeSnafu};

/// Monotonic timeline signal.
///
/// The value only increases; waiters block until it reaches or exceeds
/// their target.
pub trait TimelineSignal: Send + Sync + fmt::Debug {
    fn value(&self) -> u64;

    /// Advance the signal. Values lower than the current one are ignored.
    fn set(&self, value: u64);

    /// Wait for the signal to reach `value`; `timeout_ms == 0` waits forever.
    fn wait(&self, value: u64, timeout_ms: u64) -> Result<()>;

    fn is_reached(&self, value: u64) -> bool {
        self.value() >= value
    }
}

/// Host timeline signal backed by an atomic counter and a condvar.
#[derive(Debug)]
pub struct CpuTimelineSignal {
    value: AtomicU64,
    /// Only pairs with `condvar`; the counter itself is atomic.
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Default for CpuTimelineSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimelineSignal {
    pub fn new() -> Self {
        Self::with_initial(0)
    }

    pub fn with_initial(initial: u64) -> Self {
        Self { value: AtomicU64::new(initial), mutex: Mutex::new(()), condvar: Condvar::new() }
    }
}

impl TimelineSignal for CpuTimelineSignal {
    fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    fn set(&self, value: u64) {
        self.value.fetch_max(value, Ordering::Release);
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn wait(&self, target: u64, timeout_ms: u64) -> Result<()> {
        if self.value.load(Ordering::Acquire) >= target {
            return Ok(());
        }

        let mut guard = self.mutex.lock();
        let deadline = (timeout_ms != 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        while self.value.load(Ordering::Acquire) < target {
            match deadline {
                None => self.condvar.wait(&mut guard),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let timed_out = remaining.is_zero() || self.condvar.wait_for(&mut guard, remaining).timed_out();
                    if timed_out && self.value.load(Ordering::Acquire) < target {
                        return RuntimeSnafu {
                            message: format!(
                                "timeline signal timeout: waited {}ms for value {}, current {}",
                                timeout_ms,
                                target,
                                self.value.load(Ordering::Acquire)
                            ),
                        }
                        .fail();
                    }
                }
            }
        }
        Ok(())
    }
}

/// Handle on one submitted launch (or the last launch of a sequence).
#[derive(Clone)]
pub struct CompletionToken {
    signal: Arc<dyn TimelineSignal>,
    value: u64,
}

impl CompletionToken {
    pub fn new(signal: Arc<dyn TimelineSignal>, value: u64) -> Self {
        Self { signal, value }
    }

    /// A token for work that needed no submission.
    pub fn completed() -> Self {
        Self { signal: Arc::new(CpuTimelineSignal::new()), value: 0 }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_complete(&self) -> bool {
        self.signal.is_reached(self.value)
    }

    /// Block until the launch finished; `timeout_ms == 0` waits forever.
    pub fn wait(&self, timeout_ms: u64) -> Result<()> {
        self.signal.wait(self.value, timeout_ms)
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("value", &self.value)
            .field("complete", &self.is_complete())
            .finish()
    }
}
