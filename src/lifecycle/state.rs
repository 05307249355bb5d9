//! Cross-callback reconnect bookkeeping.

use crate::timer::TimerHandle;

/// A reconnect timer that has been scheduled and not yet consumed.
#[derive(Debug)]
struct ScheduledReconnect {
    id: u64,
    handle: TimerHandle,
}

/// Attempt counter, pending timer and cleanup flag.
///
/// Owned and mutated only by the lifecycle manager. Holds at most one
/// pending timer; replacing it cancels the previous one.
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: u32,
    timer: Option<ScheduledReconnect>,
    cleaned_up: bool,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    /// Id of the pending timer, if any.
    pub fn pending_timer(&self) -> Option<u64> {
        self.timer.as_ref().map(|t| t.id)
    }

    /// Called after a successful subscribe.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Increment and return the attempt counter.
    pub fn next_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Roll back an attempt whose timer was never scheduled.
    pub fn undo_attempt(&mut self) {
        self.attempts = self.attempts.saturating_sub(1);
    }

    /// Store a new timer, cancelling any previous one.
    pub fn replace_timer(&mut self, id: u64, handle: TimerHandle) {
        self.clear_timer();
        self.timer = Some(ScheduledReconnect { id, handle });
    }

    /// Cancel the pending timer, if any.
    pub fn clear_timer(&mut self) {
        if let Some(previous) = self.timer.take() {
            previous.handle.cancel();
        }
    }

    /// Consume the timer with `id`. Returns false if it is not the pending
    /// one (cancelled, replaced, or already consumed).
    pub fn take_timer(&mut self, id: u64) -> bool {
        match &self.timer {
            Some(pending) if pending.id == id => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Clear the timer and set the flag. Returns false if already cleaned up.
    pub fn mark_cleaned_up(&mut self) -> bool {
        if self.cleaned_up {
            return false;
        }
        self.clear_timer();
        self.cleaned_up = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{ManualScheduler, Scheduler};
    use std::time::Duration;

    fn timer(scheduler: &ManualScheduler) -> TimerHandle {
        scheduler
            .schedule(Duration::from_millis(10), Box::new(|| {}))
            .unwrap()
    }

    #[test]
    fn test_attempts_grow_until_reset() {
        let mut state = ReconnectState::new();
        assert_eq!(state.next_attempt(), 1);
        assert_eq!(state.next_attempt(), 2);
        state.undo_attempt();
        assert_eq!(state.attempts(), 1);
        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.next_attempt(), 1);
    }

    #[test]
    fn test_replacing_timer_cancels_previous() {
        let scheduler = ManualScheduler::new();
        let mut state = ReconnectState::new();

        state.replace_timer(1, timer(&scheduler));
        state.replace_timer(2, timer(&scheduler));

        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(state.pending_timer(), Some(2));
        assert!(!state.take_timer(1));
        assert!(state.take_timer(2));
        assert_eq!(state.pending_timer(), None);
    }

    #[test]
    fn test_cleanup_flag_set_once() {
        let scheduler = ManualScheduler::new();
        let mut state = ReconnectState::new();
        state.replace_timer(7, timer(&scheduler));

        assert!(state.mark_cleaned_up());
        assert!(state.is_cleaned_up());
        assert!(scheduler.pending().is_empty());
        assert!(!state.mark_cleaned_up());
    }
}
