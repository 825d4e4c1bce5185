//! Per-channel motion state machine.
//!
//! The drain worker drives one of these per controller: each motion
//! command cycles Idle -> Moving -> Waiting -> Done and folds back to
//! Idle for the next command. Cancel is legal from every state and is
//! terminal until the controller is re-armed.

use sinterkit_core::error::{ControlError, Result};
use std::fmt;

/// Lifecycle of the in-flight motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorControllerState {
    /// No motion in flight
    Idle,
    /// Move command sent, stage accelerating or travelling
    Moving,
    /// Wait-for-stop issued, polling the status byte
    Waiting,
    /// Stop confirmed
    Done,
    /// Stopped by cancellation; terminal until re-armed
    Cancelled,
}

/// Events the drain worker and cancellation path feed the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    Move,
    Wait,
    Done,
    Cancel,
}

impl MotorControllerState {
    /// Total transition function: every (state, event) pair either
    /// yields the next state or an `InvalidStateTransition` error.
    pub fn transition(self, event: MotorEvent) -> Result<Self> {
        use MotorControllerState::*;
        let next = match (self, event) {
            (Idle, MotorEvent::Move) => Moving,
            (Moving, MotorEvent::Wait) => Waiting,
            (Waiting, MotorEvent::Done) => Done,
            // stop confirmed; fold back to Idle for the next command
            (Done, MotorEvent::Move) | (Done, MotorEvent::Wait) | (Done, MotorEvent::Done) => Idle,
            (_, MotorEvent::Cancel) => Cancelled,
            (current, event) => {
                return Err(ControlError::InvalidStateTransition {
                    current: current.to_string(),
                    event: format!("{:?}", event),
                }
                .into());
            }
        };
        Ok(next)
    }
}

impl fmt::Display for MotorControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::MotorControllerState::*;
    use super::MotorEvent;

    #[test]
    fn happy_path_cycles_through_the_states() {
        let state = Idle
            .transition(MotorEvent::Move)
            .and_then(|s| s.transition(MotorEvent::Wait))
            .and_then(|s| s.transition(MotorEvent::Done))
            .unwrap();
        assert_eq!(state, Done);
        assert_eq!(state.transition(MotorEvent::Done).unwrap(), Idle);
    }

    #[test]
    fn cancel_is_legal_from_every_state() {
        for state in [Idle, Moving, Waiting, Done, Cancelled] {
            assert_eq!(state.transition(MotorEvent::Cancel).unwrap(), Cancelled);
        }
    }

    #[test]
    fn cancelled_is_terminal_for_ordinary_events() {
        for event in [MotorEvent::Move, MotorEvent::Wait, MotorEvent::Done] {
            assert!(Cancelled.transition(event).is_err());
        }
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        assert!(Idle.transition(MotorEvent::Wait).is_err());
        assert!(Idle.transition(MotorEvent::Done).is_err());
        assert!(Moving.transition(MotorEvent::Move).is_err());
        assert!(Moving.transition(MotorEvent::Done).is_err());
        assert!(Waiting.transition(MotorEvent::Move).is_err());
        assert!(Waiting.transition(MotorEvent::Wait).is_err());
    }
}
