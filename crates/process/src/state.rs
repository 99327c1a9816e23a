//! Process state tree.
//!
//! A [`ProcessState`] is where a workflow currently stands. Terminal nodes
//! (`Succeeded`, `Failed`) carry the final domain state; an `InProgress` node
//! carries the domain state at suspension plus a [`Next`] function that
//! consumes one event and yields the following [`Transition`], or `None` when
//! the event is not for this node.
//!
//! Every node carries domain state, including `Failed`. Nothing downstream
//! has to guess what the state was when a workflow gave up.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use procflow_core::{Effect, ProcessData};

/// The effect to run for a step, paired with the node the workflow lands on.
pub type Transition<S, E, R> = (Effect<()>, ProcessState<S, E, R>);

type NextFn<S, E, R> = dyn Fn(&E) -> Option<Transition<S, E, R>> + Send + Sync;

/// Event continuation of a suspended node.
pub struct Next<S, E, R>(Arc<NextFn<S, E, R>>);

impl<S, E, R> Next<S, E, R> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&E) -> Option<Transition<S, E, R>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Offer `event`. `None` means the node ignores it.
    pub fn call(&self, event: &E) -> Option<Transition<S, E, R>> {
        (self.0)(event)
    }
}

impl<S, E, R> Clone for Next<S, E, R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S, E, R> fmt::Debug for Next<S, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(<fn>)")
    }
}

/// Discriminant of a [`ProcessState`], convenient for assertions and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStateKind {
    Succeeded,
    Failed,
    InProgress,
}

impl fmt::Display for ProcessStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::InProgress => "InProgress",
        };
        f.write_str(name)
    }
}

/// Where a workflow stands: finished, failed, or waiting for an event.
///
/// - `S`: domain state
/// - `E`: event type
/// - `R`: result value
pub enum ProcessState<S, E, R> {
    Succeeded { state: S, value: R },
    Failed { state: S, error: String },
    InProgress { state: S, next: Next<S, E, R> },
}

impl<S: Clone, E, R: Clone> Clone for ProcessState<S, E, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Succeeded { state, value } => Self::Succeeded {
                state: state.clone(),
                value: value.clone(),
            },
            Self::Failed { state, error } => Self::Failed {
                state: state.clone(),
                error: error.clone(),
            },
            Self::InProgress { state, next } => Self::InProgress {
                state: state.clone(),
                next: next.clone(),
            },
        }
    }
}

impl<S: fmt::Debug, E, R: fmt::Debug> fmt::Debug for ProcessState<S, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { state, value } => f
                .debug_struct("Succeeded")
                .field("state", state)
                .field("value", value)
                .finish(),
            Self::Failed { state, error } => f
                .debug_struct("Failed")
                .field("state", state)
                .field("error", error)
                .finish(),
            Self::InProgress { state, .. } => f
                .debug_struct("InProgress")
                .field("state", state)
                .finish_non_exhaustive(),
        }
    }
}

impl<S, E, R> ProcessState<S, E, R> {
    pub fn succeeded(state: S, value: R) -> Self {
        Self::Succeeded { state, value }
    }

    pub fn failed(state: S, error: impl Into<String>) -> Self {
        Self::Failed {
            state,
            error: error.into(),
        }
    }

    pub fn in_progress<F>(state: S, next: F) -> Self
    where
        F: Fn(&E) -> Option<Transition<S, E, R>> + Send + Sync + 'static,
    {
        Self::InProgress {
            state,
            next: Next::new(next),
        }
    }

    pub fn kind(&self) -> ProcessStateKind {
        match self {
            Self::Succeeded { .. } => ProcessStateKind::Succeeded,
            Self::Failed { .. } => ProcessStateKind::Failed,
            Self::InProgress { .. } => ProcessStateKind::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress { .. })
    }

    /// Domain state carried by this node.
    pub fn state(&self) -> &S {
        match self {
            Self::Succeeded { state, .. }
            | Self::Failed { state, .. }
            | Self::InProgress { state, .. } => state,
        }
    }

    pub fn into_state(self) -> S {
        match self {
            Self::Succeeded { state, .. }
            | Self::Failed { state, .. }
            | Self::InProgress { state, .. } => state,
        }
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Offer an event to a suspended node.
    ///
    /// Terminal nodes accept nothing, so they return `None` just like a node
    /// that ignores the event.
    pub fn offer(&self, event: &E) -> Option<Transition<S, E, R>> {
        match self {
            Self::InProgress { next, .. } => next.call(event),
            _ => None,
        }
    }
}

impl<S, E, R> ProcessState<S, E, R>
where
    S: ProcessData,
    E: 'static,
    R: ProcessData,
{
    /// Map the result value, now or whenever the workflow gets there.
    pub fn map<R2, F>(self, f: F) -> ProcessState<S, E, R2>
    where
        R2: ProcessData,
        F: Fn(R) -> R2 + Send + Sync + 'static,
    {
        self.map_shared(Arc::new(f))
    }

    fn map_shared<R2>(self, f: Arc<dyn Fn(R) -> R2 + Send + Sync>) -> ProcessState<S, E, R2>
    where
        R2: ProcessData,
    {
        match self {
            Self::Succeeded { state, value } => ProcessState::Succeeded {
                state,
                value: f(value),
            },
            Self::Failed { state, error } => ProcessState::Failed { state, error },
            Self::InProgress { state, next } => ProcessState::in_progress(state, move |event| {
                let (effect, advanced) = next.call(event)?;
                Some((effect, advanced.map_shared(Arc::clone(&f))))
            }),
        }
    }

    /// Map the domain state of this node and of every node after it.
    pub fn map_state<S2, F>(self, f: F) -> ProcessState<S2, E, R>
    where
        S2: ProcessData,
        F: Fn(S) -> S2 + Send + Sync + 'static,
    {
        self.map_state_shared(Arc::new(f))
    }

    fn map_state_shared<S2>(self, f: Arc<dyn Fn(S) -> S2 + Send + Sync>) -> ProcessState<S2, E, R>
    where
        S2: ProcessData,
    {
        match self {
            Self::Succeeded { state, value } => ProcessState::Succeeded {
                state: f(state),
                value,
            },
            Self::Failed { state, error } => ProcessState::Failed {
                state: f(state),
                error,
            },
            Self::InProgress { state, next } => {
                let mapped = f(state);
                ProcessState::in_progress(mapped, move |event| {
                    let (effect, advanced) = next.call(event)?;
                    Some((effect, advanced.map_state_shared(Arc::clone(&f))))
                })
            }
        }
    }

    /// Run two branches side by side, pairing their states and results.
    ///
    /// Resolution, `self` being the left branch:
    ///
    /// - left succeeded: the right branch continues alone, its value paired
    ///   with the left value
    /// - left failed: fails with the left error, unless the right branch has
    ///   failed as well, in which case the right error wins
    /// - left suspended, right succeeded: the left branch continues alone
    /// - left suspended, right failed: fails with the right error
    /// - both suspended: every event is offered to both branches. The combined
    ///   node ignores an event only when both ignore it; a branch that ignores
    ///   it keeps its node, and when both accept, the left effect runs first.
    pub fn zip<S2, R2>(self, right: ProcessState<S2, E, R2>) -> ProcessState<(S, S2), E, (R, R2)>
    where
        S2: ProcessData,
        R2: ProcessData,
    {
        match (self, right) {
            (Self::Succeeded { state: ls, value: a }, right) => right
                .map(move |b| (a.clone(), b))
                .map_state(move |rs| (ls.clone(), rs)),

            (Self::Failed { state: ls, error }, right) => match right {
                ProcessState::Failed { state: rs, error: right_error } => {
                    ProcessState::failed((ls, rs), right_error)
                }
                right => ProcessState::failed((ls, right.into_state()), error),
            },

            (left @ Self::InProgress { .. }, ProcessState::Succeeded { state: rs, value: b }) => left
                .map(move |a| (a, b.clone()))
                .map_state(move |ls| (ls, rs.clone())),

            (Self::InProgress { state: ls, .. }, ProcessState::Failed { state: rs, error }) => {
                ProcessState::failed((ls, rs), error)
            }

            (left @ Self::InProgress { .. }, right @ ProcessState::InProgress { .. }) => {
                let state = (left.state().clone(), right.state().clone());
                ProcessState::in_progress(state, move |event| {
                    match (left.offer(event), right.offer(event)) {
                        (None, None) => None,
                        (Some((effect, advanced)), None) => {
                            Some((effect, advanced.zip(right.clone())))
                        }
                        (None, Some((effect, advanced))) => {
                            Some((effect, left.clone().zip(advanced)))
                        }
                        (Some((left_effect, left_next)), Some((right_effect, right_next))) => {
                            Some((left_effect.then(right_effect), left_next.zip(right_next)))
                        }
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Node = ProcessState<i32, &'static str, i32>;

    /// Suspends until `wanted` arrives, then succeeds with `value` and state + 1.
    fn waiting(state: i32, wanted: &'static str, value: i32) -> Node {
        ProcessState::in_progress(state, move |event: &&'static str| {
            (*event == wanted).then(|| (Effect::unit(), ProcessState::succeeded(state + 1, value)))
        })
    }

    fn advance<S: ProcessData, R: ProcessData>(
        node: &ProcessState<S, &'static str, R>,
        event: &'static str,
    ) -> ProcessState<S, &'static str, R> {
        match node.offer(&event) {
            Some((_, next)) => next,
            None => panic!("event {event} was ignored"),
        }
    }

    #[test]
    fn accessors_follow_the_variant() {
        let done: Node = ProcessState::succeeded(1, 2);
        let broken: Node = ProcessState::failed(3, "boom");
        let waiting = waiting(4, "go", 0);

        assert_eq!(done.kind(), ProcessStateKind::Succeeded);
        assert_eq!(done.value(), Some(&2));
        assert_eq!(broken.error(), Some("boom"));
        assert_eq!(*broken.state(), 3);
        assert_eq!(waiting.kind(), ProcessStateKind::InProgress);
        assert!(!waiting.is_terminal());
        assert!(done.offer(&"go").is_none());
    }

    #[test]
    fn map_applies_through_future_transitions() {
        let mapped = waiting(0, "go", 20).map(|v| v * 2);
        assert!(mapped.offer(&"other").is_none());

        let finished = advance(&mapped, "go");
        assert_eq!(finished.value(), Some(&40));
        assert_eq!(*finished.state(), 1);
    }

    #[test]
    fn map_leaves_failures_alone() {
        let failed: Node = ProcessState::failed(9, "nope");
        let mapped = failed.map(|v| v.to_string());
        assert_eq!(mapped.error(), Some("nope"));
        assert_eq!(*mapped.state(), 9);
    }

    #[test]
    fn map_state_applies_to_every_node() {
        let mapped = waiting(5, "go", 1).map_state(|s| format!("s{s}"));
        assert_eq!(mapped.state(), "s5");
        assert_eq!(advance(&mapped, "go").state(), "s6");

        let failed: Node = ProcessState::failed(2, "x");
        assert_eq!(failed.map_state(|s| s * 10).into_state(), 20);
    }

    #[test]
    fn zip_with_succeeded_left_continues_on_the_right() {
        let left: Node = ProcessState::succeeded(1, 10);
        let zipped = left.zip(waiting(2, "r", 20));
        assert_eq!(*zipped.state(), (1, 2));

        let done = advance(&zipped, "r");
        assert_eq!(done.value(), Some(&(10, 20)));
        assert_eq!(*done.state(), (1, 3));
    }

    #[test]
    fn zip_failure_precedence() {
        let left_failed: Node = ProcessState::failed(1, "left");
        let right_failed: Node = ProcessState::failed(2, "right");

        let both = left_failed.clone().zip(right_failed.clone());
        assert_eq!(both.error(), Some("right"));
        assert_eq!(*both.state(), (1, 2));

        let only_left = left_failed.zip(waiting(5, "x", 0));
        assert_eq!(only_left.error(), Some("left"));
        assert_eq!(*only_left.state(), (1, 5));

        let only_right = waiting(7, "x", 0).zip(right_failed);
        assert_eq!(only_right.error(), Some("right"));
        assert_eq!(*only_right.state(), (7, 2));
    }

    #[test]
    fn zip_with_succeeded_right_continues_on_the_left() {
        let zipped = waiting(0, "l", 1).zip(ProcessState::<i32, &'static str, i32>::succeeded(8, 2));
        let done = advance(&zipped, "l");
        assert_eq!(done.value(), Some(&(1, 2)));
        assert_eq!(*done.state(), (1, 8));
    }

    #[test]
    fn zip_of_suspended_branches_routes_events() {
        let zipped = waiting(0, "l", 1).zip(waiting(10, "r", 2));
        assert!(zipped.offer(&"nobody").is_none());

        let after_left = advance(&zipped, "l");
        assert_eq!(after_left.kind(), ProcessStateKind::InProgress);
        assert_eq!(*after_left.state(), (1, 10));

        let done = advance(&after_left, "r");
        assert_eq!(done.value(), Some(&(1, 2)));
        assert_eq!(*done.state(), (1, 11));
    }

    #[test]
    fn zip_advances_both_branches_on_a_shared_event() {
        let zipped = waiting(0, "go", 1).zip(waiting(0, "go", 2));
        let done = advance(&zipped, "go");
        assert_eq!(done.value(), Some(&(1, 2)));
        assert_eq!(*done.state(), (1, 1));
    }
}
