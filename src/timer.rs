//! Reconnect timers.
//!
//! A [`Scheduler`] runs a task once after a delay unless the returned
//! [`TimerHandle`] is cancelled or dropped first.

use crate::error::{RealtimeError, Result};
use crossbeam_channel::{after, bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::thread;
use std::time::Duration;

/// A task run when a timer expires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules delayed tasks.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle>;
}

/// Cancels its timer when cancelled explicitly or dropped.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: Option<Sender<()>>,
}

impl TimerHandle {
    fn new(cancel: Sender<()>) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }

    /// Cancel the timer. A task that already started is not interrupted.
    pub fn cancel(mut self) {
        self.fire_cancel();
    }

    fn fire_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.fire_cancel();
    }
}

fn cancelled(rx: &Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(TryRecvError::Empty))
}

/// Runs each timer on its own short-lived thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let deadline = after(delay);

        thread::Builder::new()
            .name("chat-realtime-timer".to_string())
            .spawn(move || {
                select! {
                    recv(cancel_rx) -> _ => {}
                    recv(deadline) -> _ => task(),
                }
            })
            .map_err(|e| RealtimeError::Scheduler(e.to_string()))?;

        Ok(TimerHandle::new(cancel_tx))
    }
}

struct ManualTimer {
    delay: Duration,
    task: TimerTask,
    cancel: Receiver<()>,
}

/// Scheduler driven by the caller: nothing fires until [`fire_next`] is
/// called. Useful for hosts that own their own clock, and for tests.
///
/// [`fire_next`]: ManualScheduler::fire_next
#[derive(Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<ManualTimer>>,
    history: Mutex<Vec<Duration>>,
    failing: Mutex<u32>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` schedule calls.
    pub fn fail_next(&self, count: u32) {
        *self.failing.lock() = count;
    }

    /// Every delay ever scheduled, in order.
    pub fn scheduled(&self) -> Vec<Duration> {
        self.history.lock().clone()
    }

    /// Delays of timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> Vec<Duration> {
        let mut timers = self.timers.lock();
        timers.retain(|t| !cancelled(&t.cancel));
        timers.iter().map(|t| t.delay).collect()
    }

    /// Run the oldest live timer. Returns false if none is pending.
    pub fn fire_next(&self) -> bool {
        let task = {
            let mut timers = self.timers.lock();
            timers.retain(|t| !cancelled(&t.cancel));
            if timers.is_empty() {
                return false;
            }
            timers.remove(0).task
        };
        task();
        true
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle> {
        {
            let mut failing = self.failing.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(RealtimeError::Scheduler("timer source unavailable".into()));
            }
        }

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        self.timers.lock().push(ManualTimer {
            delay,
            task,
            cancel: cancel_rx,
        });
        self.history.lock().push(delay);
        Ok(TimerHandle::new(cancel_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_thread_timer_fires() {
        let (tx, rx) = bounded(1);
        let handle = ThreadScheduler::new()
            .schedule(
                Duration::from_millis(10),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        drop(handle);
    }

    #[test]
    fn test_thread_timer_cancel() {
        let (tx, rx) = bounded::<()>(1);
        let handle = ThreadScheduler::new()
            .schedule(
                Duration::from_millis(50),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();
        handle.cancel();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_manual_fire_order_and_history() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let _a = scheduler
            .schedule(Duration::from_millis(1), counting_task(&counter))
            .unwrap();
        let _b = scheduler
            .schedule(Duration::from_millis(2), counting_task(&counter))
            .unwrap();
        assert_eq!(
            scheduler.pending(),
            vec![Duration::from_millis(1), Duration::from_millis(2)]
        );

        assert!(scheduler.fire_next());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), vec![Duration::from_millis(2)]);
        assert_eq!(scheduler.scheduled().len(), 2);
    }

    #[test]
    fn test_manual_dropped_handle_cancels() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule(Duration::from_millis(1), counting_task(&counter))
            .unwrap();
        drop(handle);

        assert!(scheduler.pending().is_empty());
        assert!(!scheduler.fire_next());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
