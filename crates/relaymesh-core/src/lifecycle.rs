//! Session lifecycle
//!
//! A session is `Active` from boot until something ends it, then `Sleeping`
//! for good. Waking up is a new session with fresh state.

use std::time::Duration;

use tracing::info;

use crate::traits::PowerControl;

/// Why a session went to sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Discovery saw no Root or Relay network
    UplinkNotFound,
    /// A bounded connect policy ran out of attempts
    ConnectionTimeout,
    /// Connected, but the downstream domain could not be opened
    LinkSetupFailed,
    /// The telemetry send counter reached its maximum
    SendLimitReached,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Running the control loop
    Active,
    /// Terminal for this session
    Sleeping(SleepReason),
}

impl SessionState {
    pub fn is_sleeping(&self) -> bool {
        matches!(self, SessionState::Sleeping(_))
    }
}

/// Tracks the send budget and drives the transition to sleep
#[derive(Debug, Clone)]
pub struct LifecycleController {
    max_sends: u32,
    sleep_duration: Duration,
    state: SessionState,
}

impl LifecycleController {
    pub fn new(max_sends: u32, sleep_duration: Duration) -> Self {
        Self {
            max_sends,
            sleep_duration,
            state: SessionState::Active,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether `send_count` has used up the send budget
    pub fn send_limit_reached(&self, send_count: u32) -> bool {
        send_count >= self.max_sends
    }

    /// Enter `Sleeping` and ask the power collaborator to sleep
    ///
    /// Only the first call has any effect.
    pub fn enter_sleep<P: PowerControl>(&mut self, power: &mut P, reason: SleepReason) -> SessionState {
        if self.state.is_sleeping() {
            return self.state;
        }
        info!(?reason, duration = ?self.sleep_duration, "Session going to sleep");
        self.state = SessionState::Sleeping(reason);
        power.request_sleep(self.sleep_duration);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingPower {
        requests: Vec<Duration>,
    }

    impl PowerControl for CountingPower {
        fn request_sleep(&mut self, duration: Duration) {
            self.requests.push(duration);
        }
    }

    #[test]
    fn test_send_limit() {
        let lc = LifecycleController::new(3, Duration::from_secs(60));
        assert!(!lc.send_limit_reached(0));
        assert!(!lc.send_limit_reached(2));
        assert!(lc.send_limit_reached(3));
    }

    #[test]
    fn test_sleep_requested_once() {
        let mut lc = LifecycleController::new(3, Duration::from_secs(60));
        let mut power = CountingPower::default();

        assert_eq!(lc.state(), SessionState::Active);
        let state = lc.enter_sleep(&mut power, SleepReason::SendLimitReached);
        assert_eq!(state, SessionState::Sleeping(SleepReason::SendLimitReached));

        // A second trigger keeps the original reason
        lc.enter_sleep(&mut power, SleepReason::UplinkNotFound);
        assert_eq!(lc.state(), SessionState::Sleeping(SleepReason::SendLimitReached));
        assert_eq!(power.requests, vec![Duration::from_secs(60)]);
    }
}
