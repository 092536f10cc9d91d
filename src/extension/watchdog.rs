// ABOUTME: Dedicated watchdog scheduler that fires one-shot deadline actions
// ABOUTME: Single worker thread with a timer queue, graceful shutdown with a grace period

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::engine::error::{EngineError, Result};

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

static WORKER_COUNTER: AtomicUsize = AtomicUsize::new(0);

type WatchdogAction = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    deadline: Instant,
    sequence: u64,
    state: Arc<AtomicU8>,
    action: WatchdogAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // reversed so the binary heap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct WorkerState {
    queue: BinaryHeap<Entry>,
    next_sequence: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<WorkerState>,
    wakeup: Condvar,
}

/// Handle to one armed watchdog task.
///
/// The task state transitions armed -> fired or armed -> cancelled exactly
/// once; that atomic transition is the commit point deciding a
/// completion-vs-timeout race.
pub struct WatchdogHandle {
    state: Arc<AtomicU8>,
}

impl WatchdogHandle {
    /// Try to cancel the task before it fires. Returns `false` iff the
    /// watchdog has already committed to firing.
    pub fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(FIRED) => false,
            Err(_) => true,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }
}

/// One-shot deadline scheduler backed by a single dedicated worker thread.
///
/// Watchdog actions are just "deliver one cancellation signal" operations,
/// so a single worker is sufficient and bounds background thread usage. The
/// worker runs at elevated scheduling priority (best effort, unix only) so an
/// overloaded system is less likely to delay signal delivery past the
/// deadline.
pub struct WatchdogScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WatchdogScheduler {
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState::default()),
            wakeup: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let name = format!(
            "timeout-watchdog-{}",
            WORKER_COUNTER.fetch_add(1, Ordering::SeqCst)
        );
        let handle = thread::Builder::new().name(name).spawn(move || {
            raise_worker_priority();
            run_worker(worker_shared);
        })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Schedule `action` to run once after `delay`. Fails once the scheduler
    /// has begun shutting down.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Result<WatchdogHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(EngineError::SchedulerStopped);
        }

        let task_state = Arc::new(AtomicU8::new(ARMED));
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.queue.push(Entry {
            deadline: Instant::now() + delay,
            sequence,
            state: Arc::clone(&task_state),
            action: Box::new(action),
        });
        self.shared.wakeup.notify_one();

        Ok(WatchdogHandle { state: task_state })
    }

    /// Stop accepting new work and join the worker within `grace`.
    ///
    /// Idempotent. If the worker does not drain within the grace period it is
    /// abandoned and a teardown error is raised; the stray thread finishes on
    /// its own without blocking the caller further.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wakeup.notify_all();
        }

        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        debug!("waiting up to {:?} for the watchdog worker to stop", grace);
        let join = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout(grace, join).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("watchdog worker did not stop within {:?}", grace);
                Err(EngineError::SchedulerTeardown)
            }
        }
    }
}

impl Drop for WatchdogScheduler {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

fn run_worker(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            // pending timers never fire once shutdown begins
            while let Some(entry) = state.queue.pop() {
                let _ = entry.state.compare_exchange(
                    ARMED,
                    CANCELLED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            debug!("watchdog worker exiting");
            return;
        }

        let now = Instant::now();
        let next_deadline = state.queue.peek().map(|entry| entry.deadline);
        let due = match next_deadline {
            Some(deadline) if deadline <= now => state.queue.pop(),
            Some(deadline) => {
                let _ = shared.wakeup.wait_for(&mut state, deadline - now);
                None
            }
            None => {
                shared.wakeup.wait(&mut state);
                None
            }
        };

        if let Some(entry) = due {
            let committed = entry
                .state
                .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if committed {
                // run outside the lock so a slow action cannot block schedule()
                MutexGuard::unlocked(&mut state, || (entry.action)());
            }
        }
    }
}

#[cfg(unix)]
fn raise_worker_priority() {
    // On Linux, PRIO_PROCESS with pid 0 applies to the calling thread. This
    // needs privileges on most systems, so failures are ignored.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -10) };
    if result != 0 {
        debug!("could not raise watchdog worker priority");
    }
}

#[cfg(not(unix))]
fn raise_worker_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::time::sleep;

    #[tokio::test]
    async fn fires_the_action_after_the_delay() {
        let scheduler = WatchdogScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let handle = scheduler
            .schedule(Duration::from_millis(20), move || {
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(handle.has_fired());
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn cancelled_tasks_never_fire() {
        let scheduler = WatchdogScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let handle = scheduler
            .schedule(Duration::from_millis(50), move || {
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert!(handle.cancel());
        sleep(Duration::from_millis(120)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!handle.has_fired());
    }

    #[tokio::test]
    async fn schedule_is_rejected_after_shutdown() {
        let scheduler = WatchdogScheduler::new().unwrap();
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = scheduler.schedule(Duration::from_millis(1), || {});
        assert!(matches!(result, Err(EngineError::SchedulerStopped)));
    }

    #[tokio::test]
    async fn shutdown_within_the_grace_period_is_silent() {
        let scheduler = WatchdogScheduler::new().unwrap();
        scheduler.schedule(Duration::from_millis(5), || {}).unwrap();
        sleep(Duration::from_millis(30)).await;

        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
        // idempotent
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_exceeding_the_grace_period_raises_a_teardown_error() {
        let scheduler = WatchdogScheduler::new().unwrap();
        scheduler
            .schedule(Duration::ZERO, || {
                thread::sleep(Duration::from_millis(400));
            })
            .unwrap();
        // let the worker pick the action up before asking it to stop
        sleep(Duration::from_millis(50)).await;

        let result = scheduler.shutdown(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(EngineError::SchedulerTeardown)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Scheduled executor could not be stopped in an orderly manner"
        );
    }
}
