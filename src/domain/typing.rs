//! Debounced "is typing" state for the local user.

use std::time::{Duration, Instant};

pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTransition {
    Started,
    Stopped,
}

/// Typing starts on the first input event and stops once no input has been
/// seen for the idle interval. Time is passed in so callers own the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingDebouncer {
    idle: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            deadline: None,
        }
    }

    /// When the pending "stopped" transition is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_input(&mut self, now: Instant) -> Option<TypingTransition> {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.idle);
        started.then_some(TypingTransition::Started)
    }

    pub fn poll(&mut self, now: Instant) -> Option<TypingTransition> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(TypingTransition::Stopped)
            }
            _ => None,
        }
    }

    /// Drops the pending timer without emitting a transition.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rapid_input_starts_typing_once_and_stops_once() {
        let mut typing = TypingDebouncer::default();
        let start = Instant::now();
        let mut transitions = Vec::new();

        for step in 0..10u64 {
            let now = start + Duration::from_millis(step * 200);
            transitions.extend(typing.on_input(now));
            transitions.extend(typing.poll(now));
        }

        let last_input = start + Duration::from_millis(1_800);
        transitions.extend(typing.poll(last_input + Duration::from_millis(999)));
        transitions.extend(typing.poll(last_input + Duration::from_millis(1_000)));
        transitions.extend(typing.poll(last_input + Duration::from_millis(5_000)));

        assert_eq!(
            transitions,
            vec![TypingTransition::Started, TypingTransition::Stopped]
        );
    }

    #[test]
    fn input_after_a_gap_starts_a_new_cycle() {
        let mut typing = TypingDebouncer::new(Duration::from_millis(500));
        let start = Instant::now();

        assert_eq!(typing.on_input(start), Some(TypingTransition::Started));
        assert_eq!(
            typing.poll(start + Duration::from_millis(600)),
            Some(TypingTransition::Stopped)
        );
        assert_eq!(
            typing.on_input(start + Duration::from_millis(700)),
            Some(TypingTransition::Started)
        );
    }

    #[test]
    fn cancel_clears_the_deadline_without_a_stop_transition() {
        let mut typing = TypingDebouncer::default();
        let start = Instant::now();
        typing.on_input(start);

        assert!(typing.cancel());
        assert_eq!(typing.deadline(), None);
        assert_eq!(typing.poll(start + Duration::from_secs(10)), None);
        assert!(!typing.cancel());
    }
}
