//! Agent lifecycle state machine.
//!
//! The transport layer reports connection states; the machine records the
//! current one and tells its subscribers about every change.
//!
//! ```text
//! Disconnected ──→ Connecting ──→ Connected ──→ Closing ──→ Closed
//!      ↑                                           ↑
//!      └──────── any state on failure ──────────    shutdown request
//! ```
//!
//! Notifications are processed one at a time. A notification that arrives
//! while subscribers are still being told about the previous one (from
//! another thread, or from inside a subscriber) is queued and applied by the
//! thread that is already delivering, once the current delivery finishes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Connection lifecycle state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// No transport connection. Initial state.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The transport is ready; commands can be dispatched.
    Connected,
    /// Shutdown was requested; the transport is closing.
    Closing,
    /// Fully shut down. Terminal.
    Closed,
}

impl AgentState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` for the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Failure (`→ Disconnected`) and a shutdown request (`→ Closing`) are
    /// accepted from any non-terminal state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Connecting | Self::Connected | Self::Closing,
                Self::Disconnected
            ) | (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (
                    Self::Disconnected | Self::Connecting | Self::Connected,
                    Self::Closing
                )
                | (Self::Closing, Self::Closed)
        )
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "closing" => Ok(Self::Closing),
            "closed" => Ok(Self::Closed),
            _ => Err(StateError::UnknownState(s.to_string())),
        }
    }
}

/// State machine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The requested transition is not allowed from the current state.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: AgentState,
        /// Requested state.
        to: AgentState,
    },

    /// A state name could not be parsed.
    #[error("unknown agent state: {0}")]
    UnknownState(String),
}

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The state changed and subscribers were told.
    Applied {
        /// Previous state.
        from: AgentState,
        /// New state.
        to: AgentState,
    },
    /// The state was already current; nothing happened.
    Unchanged(AgentState),
    /// Another notification is being delivered; this one was queued.
    Deferred(AgentState),
}

/// Subscriber invoked with the new state after every transition.
pub type TransitionCallback = Arc<dyn Fn(AgentState) -> crate::Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct Inner {
    current: AgentState,
    pending: VecDeque<AgentState>,
    delivering: bool,
}

/// Holds the agent's current state and its transition subscribers.
#[derive(Default)]
pub struct StateMachine {
    inner: Mutex<Inner>,
    callbacks: RwLock<Vec<TransitionCallback>>,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl StateMachine {
    /// Creates a machine in [`AgentState::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> AgentState {
        self.lock().current
    }

    /// Registers a subscriber.
    ///
    /// Subscribers are invoked synchronously, in registration order. A
    /// subscriber error is logged and does not stop the others.
    pub fn on_transition<F>(&self, callback: F)
    where
        F: Fn(AgentState) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Processes a state notification from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] if the transition is not
    /// allowed. Deferred notifications are validated when they are applied;
    /// an invalid one is logged and dropped.
    pub fn notify(&self, next: AgentState) -> Result<Notification, StateError> {
        let mut inner = self.lock();
        if inner.delivering {
            inner.pending.push_back(next);
            tracing::debug!(state = %next, "state notification deferred");
            return Ok(Notification::Deferred(next));
        }

        let from = inner.current;
        if !Self::apply(&mut inner, next)? {
            return Ok(Notification::Unchanged(next));
        }
        inner.delivering = true;
        drop(inner);

        self.deliver(next);
        self.drain();

        Ok(Notification::Applied { from, to: next })
    }

    /// Completes a shutdown: `Closing → Closed`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] unless the agent is closing.
    pub fn complete_shutdown(&self) -> Result<Notification, StateError> {
        let current = self.current();
        if current != AgentState::Closing {
            return Err(StateError::InvalidTransition {
                from: current,
                to: AgentState::Closed,
            });
        }
        self.notify(AgentState::Closed)
    }

    /// Applies queued notifications until none are left.
    fn drain(&self) {
        loop {
            let mut inner = self.lock();
            let Some(next) = inner.pending.pop_front() else {
                inner.delivering = false;
                return;
            };
            match Self::apply(&mut inner, next) {
                Ok(true) => {
                    drop(inner);
                    self.deliver(next);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "deferred state notification dropped"),
            }
        }
    }

    /// Records `next` as current. Returns `false` for same-state notifications.
    fn apply(inner: &mut Inner, next: AgentState) -> Result<bool, StateError> {
        let from = inner.current;
        if from == next {
            return Ok(false);
        }
        if !from.can_transition_to(next) {
            return Err(StateError::InvalidTransition { from, to: next });
        }
        inner.current = next;
        tracing::info!(%from, to = %next, "agent state changed");
        Ok(true)
    }

    fn deliver(&self, state: AgentState) {
        let callbacks: Vec<TransitionCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            if let Err(e) = callback(state) {
                tracing::error!(%state, error = %e, "state callback failed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recorder(machine: &StateMachine) -> Arc<Mutex<Vec<AgentState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        machine.on_transition(move |state| {
            sink.lock().unwrap().push(state);
            Ok(())
        });
        seen
    }

    #[test]
    fn starts_disconnected() {
        assert_eq!(StateMachine::new().current(), AgentState::Disconnected);
    }

    #[test]
    fn follows_the_happy_path() {
        let machine = StateMachine::new();
        let seen = recorder(&machine);

        for state in [
            AgentState::Connecting,
            AgentState::Connected,
            AgentState::Closing,
        ] {
            machine.notify(state).unwrap();
        }
        machine.complete_shutdown().unwrap();

        assert_eq!(machine.current(), AgentState::Closed);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AgentState::Connecting,
                AgentState::Connected,
                AgentState::Closing,
                AgentState::Closed
            ]
        );
    }

    #[test]
    fn same_state_is_a_noop() {
        let machine = StateMachine::new();
        let seen = recorder(&machine);

        machine.notify(AgentState::Connecting).unwrap();
        let outcome = machine.notify(AgentState::Connecting).unwrap();

        assert_eq!(outcome, Notification::Unchanged(AgentState::Connecting));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn failure_is_recoverable_but_closed_is_terminal() {
        let machine = StateMachine::new();
        machine.notify(AgentState::Connecting).unwrap();
        machine.notify(AgentState::Connected).unwrap();
        machine.notify(AgentState::Disconnected).unwrap();
        machine.notify(AgentState::Connecting).unwrap();
        machine.notify(AgentState::Closing).unwrap();
        machine.notify(AgentState::Closed).unwrap();

        let err = machine.notify(AgentState::Connecting).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: AgentState::Closed,
                to: AgentState::Connecting
            }
        );
        assert!(machine.notify(AgentState::Disconnected).is_err());
    }

    #[test]
    fn rejects_skipping_connecting() {
        let machine = StateMachine::new();
        assert!(machine.notify(AgentState::Connected).is_err());
        assert_eq!(machine.current(), AgentState::Disconnected);
    }

    #[test]
    fn complete_shutdown_requires_closing() {
        let machine = StateMachine::new();
        assert!(machine.complete_shutdown().is_err());
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let machine = StateMachine::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            machine.on_transition(move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        machine.notify(AgentState::Connecting).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_callback_does_not_stop_the_rest() {
        let machine = StateMachine::new();
        machine.on_transition(|state| {
            let refused = StateError::InvalidTransition {
                from: state,
                to: state,
            };
            Err(refused.into())
        });
        let seen = recorder(&machine);

        machine.notify(AgentState::Connecting).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![AgentState::Connecting]);
    }

    #[test]
    fn notification_from_a_callback_is_deferred() {
        let machine = Arc::new(StateMachine::new());
        let inner_outcome = Arc::new(Mutex::new(None));
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let handle = Arc::clone(&machine);
            let inner_outcome = Arc::clone(&inner_outcome);
            let log = Arc::clone(&log);
            machine.on_transition(move |state| {
                log.lock().unwrap().push(format!("enter {state}"));
                if state == AgentState::Connected {
                    let outcome = handle.notify(AgentState::Disconnected).unwrap();
                    *inner_outcome.lock().unwrap() = Some(outcome);
                    // Still connected while this callback runs.
                    assert_eq!(handle.current(), AgentState::Connected);
                }
                log.lock().unwrap().push(format!("leave {state}"));
                Ok(())
            });
        }

        machine.notify(AgentState::Connecting).unwrap();
        machine.notify(AgentState::Connected).unwrap();

        assert_eq!(
            *inner_outcome.lock().unwrap(),
            Some(Notification::Deferred(AgentState::Disconnected))
        );
        assert_eq!(machine.current(), AgentState::Disconnected);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "enter connecting",
                "leave connecting",
                "enter connected",
                "leave connected",
                "enter disconnected",
                "leave disconnected",
            ]
        );
    }

    #[test]
    fn parses_state_names() {
        assert_eq!("Connected".parse::<AgentState>().unwrap(), AgentState::Connected);
        assert!("ready".parse::<AgentState>().is_err());
    }
}
