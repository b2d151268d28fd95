//! Racing two pending outcomes.
//!
//! [`race`] resolves with whichever outcome arrived first and then waits for
//! the right-hand outcome regardless, so the caller always ends up holding
//! the right-hand value. Arrival is judged by delivery sequence, so two
//! outcomes that are both already buffered still resolve in the order the
//! channel produced them.

use crate::channel::{Delivered, Pending};
use crate::error::{ProbeError, Result};
use crossbeam_channel::{after, never, select, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// Result of racing a left outcome against a right outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum Race<A, B> {
    /// The left outcome arrived first; the right one was awaited afterwards.
    LeftFirst(A, B),
    /// The right outcome arrived first.
    RightFirst(B),
}

impl<A, B> Race<A, B> {
    pub fn left_won(&self) -> bool {
        matches!(self, Race::LeftFirst(..))
    }

    /// The left value, if it won the race.
    pub fn left(&self) -> Option<&A> {
        match self {
            Race::LeftFirst(a, _) => Some(a),
            Race::RightFirst(_) => None,
        }
    }

    pub fn right(&self) -> &B {
        match self {
            Race::LeftFirst(_, b) | Race::RightFirst(b) => b,
        }
    }

    pub fn into_parts(self) -> (Option<A>, B) {
        match self {
            Race::LeftFirst(a, b) => (Some(a), b),
            Race::RightFirst(b) => (None, b),
        }
    }
}

/// Wait for the first of `left` and `right`, then for `right` regardless.
///
/// A left side that disconnects without a value simply loses. A right side
/// that disconnects fails the race. `timeout` bounds the whole race; `None`
/// waits indefinitely.
pub fn race<A, B>(
    left: Pending<A>,
    right: Pending<B>,
    timeout: Option<Duration>,
) -> Result<Race<A, B>> {
    let deadline = timer(timeout);

    select! {
        recv(left.receiver) -> msg => match msg {
            Ok(a) => match right.receiver.try_recv() {
                Ok(b) if b.sequence < a.sequence => Ok(Race::RightFirst(b.value)),
                Ok(b) => Ok(Race::LeftFirst(a.value, b.value)),
                Err(TryRecvError::Empty) => {
                    let b = recv_before(&right, &deadline, timeout)?;
                    Ok(Race::LeftFirst(a.value, b.value))
                }
                Err(TryRecvError::Disconnected) => {
                    Err(ProbeError::Disconnected(right.label().to_string()))
                }
            },
            Err(_) => {
                let b = recv_before(&right, &deadline, timeout)?;
                Ok(Race::RightFirst(b.value))
            }
        },
        recv(right.receiver) -> msg => {
            let b = msg.map_err(|_| ProbeError::Disconnected(right.label().to_string()))?;
            match left.receiver.try_recv() {
                Ok(a) if a.sequence < b.sequence => Ok(Race::LeftFirst(a.value, b.value)),
                _ => Ok(Race::RightFirst(b.value)),
            }
        },
        recv(deadline) -> _ => Err(ProbeError::Timeout(timeout.unwrap_or_default())),
    }
}

/// Channel that fires once `timeout` elapses, or never.
pub(crate) fn timer(timeout: Option<Duration>) -> Receiver<Instant> {
    match timeout {
        Some(duration) => after(duration),
        None => never(),
    }
}

/// Receive from `pending` unless `deadline` fires first.
pub(crate) fn recv_before<T>(
    pending: &Pending<T>,
    deadline: &Receiver<Instant>,
    timeout: Option<Duration>,
) -> Result<Delivered<T>> {
    select! {
        recv(pending.receiver) -> msg => {
            msg.map_err(|_| ProbeError::Disconnected(pending.label().to_string()))
        },
        recv(deadline) -> _ => Err(ProbeError::Timeout(timeout.unwrap_or_default())),
    }
}
