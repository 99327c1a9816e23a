//! Process constructors and composition.
//!
//! A [`Process`] is a pure function `(&instance, state) -> Transition`. Running
//! it never performs side work; the returned effect does, when (and if) the
//! runtime executes it. Because running is pure, the runtime can rebuild a
//! workflow from scratch on every event and replay history through it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use procflow_core::{Effect, ProcessData, ProcessInstance, StepResult};

use crate::command::EnqueueEvent;
use crate::mediator::EventMediator;
use crate::state::{ProcessState, Transition};

type RunFn<I, S, E, R> = dyn Fn(&I, S) -> Transition<S, E, R> + Send + Sync;
type Continuation<I, S, E, R, R2> = Arc<dyn Fn(R) -> Process<I, S, E, R2> + Send + Sync>;

/// A composable workflow description.
///
/// - `I`: instance identity
/// - `S`: domain state threaded through every step
/// - `E`: events the workflow reacts to
/// - `R`: value the workflow completes with
pub struct Process<I, S, E, R> {
    run: Arc<RunFn<I, S, E, R>>,
}

impl<I, S, E, R> Clone for Process<I, S, E, R> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<I, S, E, R> fmt::Debug for Process<I, S, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Process(<fn>)")
    }
}

impl<I, S, E, R> Process<I, S, E, R>
where
    I: ProcessData,
    S: ProcessData,
    E: ProcessData,
    R: ProcessData,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&I, S) -> Transition<S, E, R> + Send + Sync + 'static,
    {
        Self { run: Arc::new(f) }
    }

    /// Build the initial transition for `instance` starting from `state`.
    pub fn run(&self, instance: &I, state: S) -> Transition<S, E, R> {
        (self.run)(instance, state)
    }

    /// Succeed immediately with `value`.
    pub fn pure(value: R) -> Self {
        Self::new(move |_, state| (Effect::unit(), ProcessState::succeeded(state, value.clone())))
    }

    /// Fail immediately, keeping the current state.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(move |_, state| (Effect::unit(), ProcessState::failed(state, error.clone())))
    }

    /// Suspend until `interpret` recognises an event.
    ///
    /// `interpret` returns `None` for events that are not for this step,
    /// `Some(Ok(value))` to complete the step and `Some(Err(message))` to fail
    /// the workflow. Either way the resulting node carries the state the
    /// workflow had when it suspended.
    pub fn wait_for_event<F>(interpret: F) -> Self
    where
        F: Fn(&E) -> Option<StepResult<R>> + Send + Sync + 'static,
    {
        let interpret = Arc::new(interpret);
        Self::new(move |_, state| {
            let interpret = Arc::clone(&interpret);
            let suspended = state.clone();
            let node = ProcessState::in_progress(state, move |event| {
                let outcome = match interpret(event)? {
                    Ok(value) => ProcessState::succeeded(suspended.clone(), value),
                    Err(error) => ProcessState::failed(suspended.clone(), error),
                };
                Some((Effect::unit(), outcome))
            });
            (Effect::unit(), node)
        })
    }

    /// Sequential composition.
    ///
    /// Effects run in order: everything `self` produced before completing,
    /// then whatever the continuation produces. `f` is only called once `self`
    /// has succeeded; a failure short-circuits with the state at the failure.
    pub fn bind<R2, F>(self, f: F) -> Process<I, S, E, R2>
    where
        R2: ProcessData,
        F: Fn(R) -> Process<I, S, E, R2> + Send + Sync + 'static,
    {
        let f: Continuation<I, S, E, R, R2> = Arc::new(f);
        Process::new(move |instance, state| {
            bind_transition(self.run(instance, state), instance.clone(), Arc::clone(&f))
        })
    }

    pub fn map<R2, F>(self, f: F) -> Process<I, S, E, R2>
    where
        R2: ProcessData,
        F: Fn(R) -> R2 + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Process::new(move |instance, state| {
            let (effect, node) = self.run(instance, state);
            let f = Arc::clone(&f);
            (effect, node.map(move |value| f(value)))
        })
    }

    /// Pick a branch each time the node is built.
    ///
    /// `condition` runs when the process is run (initially and on every
    /// replay), not when events arrive.
    pub fn if_then_else<C>(condition: C, then_branch: Self, else_branch: Self) -> Self
    where
        C: Fn() -> bool + Send + Sync + 'static,
    {
        Self::new(move |instance, state| {
            if condition() {
                then_branch.run(instance, state)
            } else {
                else_branch.run(instance, state)
            }
        })
    }

    /// Build the process from the instance it runs for.
    pub fn with_instance<F>(f: F) -> Self
    where
        F: Fn(&I) -> Self + Send + Sync + 'static,
    {
        Self::new(move |instance, state| f(instance).run(instance, state))
    }

    /// Run `self` and `other` side by side.
    ///
    /// Both branches start from the same state and their initial effects run
    /// `self` first. Each incoming event is offered to both branches; the
    /// combined state is `merger(left_state, right_state)`, recomputed whenever
    /// either branch moves. The result pairs both values once both succeed.
    /// The first failure fails the whole thing; if both have failed, the error
    /// of `other` is reported.
    pub fn both<R2, M>(self, other: Process<I, S, E, R2>, merger: M) -> Process<I, S, E, (R, R2)>
    where
        R2: ProcessData,
        M: Fn(S, S) -> S + Send + Sync + 'static,
    {
        let merger = Arc::new(merger);
        Process::new(move |instance, state: S| {
            let (left_effect, left) = self.run(instance, state.clone());
            let (right_effect, right) = other.run(instance, state);
            let merger = Arc::clone(&merger);
            let node = left
                .zip(right)
                .map_state(move |(left_state, right_state)| merger(left_state, right_state));
            (left_effect.then(right_effect), node)
        })
    }
}

fn bind_transition<I, S, E, R, R2>(
    transition: Transition<S, E, R>,
    instance: I,
    f: Continuation<I, S, E, R, R2>,
) -> Transition<S, E, R2>
where
    I: ProcessData,
    S: ProcessData,
    E: ProcessData,
    R: ProcessData,
    R2: ProcessData,
{
    let (effect, node) = transition;
    match node {
        ProcessState::Succeeded { state, value } => {
            let (next_effect, next_node) = f(value).run(&instance, state);
            (effect.then(next_effect), next_node)
        }
        ProcessState::Failed { state, error } => (effect, ProcessState::Failed { state, error }),
        ProcessState::InProgress { state, next } => {
            let node = ProcessState::in_progress(state, move |event| {
                let advanced = next.call(event)?;
                Some(bind_transition(advanced, instance.clone(), Arc::clone(&f)))
            });
            (effect, node)
        }
    }
}

impl<I, S, E> Process<I, S, E, ()>
where
    I: ProcessData,
    S: ProcessData,
    E: ProcessData,
{
    pub fn ignore() -> Self {
        Self::pure(())
    }

    /// Run `effect`, then continue.
    pub fn lift_effect(effect: Effect<()>) -> Self {
        Self::new(move |_, state| (effect.clone(), ProcessState::succeeded(state, ())))
    }

    /// Run an async side effect for its own sake, then continue.
    pub fn from_side_effect<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::lift_effect(Effect::from_async(f))
    }

    /// Replace the domain state with `f(current)`.
    pub fn set_state<F>(f: F) -> Self
    where
        F: Fn(S) -> S + Send + Sync + 'static,
    {
        Self::new(move |_, state| (Effect::unit(), ProcessState::succeeded(f(state), ())))
    }
}

impl<I, S, E> Process<I, S, E, ()>
where
    I: ProcessInstance,
    S: ProcessData,
    E: ProcessData,
{
    /// Run `effect` and enqueue every event it yields for this same instance,
    /// in order, through `mediator`.
    pub fn lift_event_returning_effect(mediator: &EventMediator<I, E>, effect: Effect<Vec<E>>) -> Self {
        let mediator = mediator.clone();
        Self::new(move |instance, state| {
            let mediator = mediator.clone();
            let instance = instance.clone();
            let enqueue = effect.clone().bind(move |events| {
                let mediator = mediator.clone();
                let instance = instance.clone();
                Effect::traverse(events, move |event| {
                    mediator.send(EnqueueEvent::new(instance.clone(), event))
                })
                .ignore()
            });
            (enqueue, ProcessState::succeeded(state, ()))
        })
    }
}

impl<I, S, E, R> Process<I, S, E, R>
where
    I: ProcessInstance,
    S: ProcessData,
    E: ProcessData,
    R: ProcessData,
{
    /// Call out to the world and wait for the answer to come back as an event.
    ///
    /// `effect_fn` produces follow-up events which are enqueued for this
    /// instance through `mediator`; `interpret` then picks the event that
    /// completes the step (see [`Process::wait_for_event`]).
    pub fn from_effect<F, Fut, H>(mediator: &EventMediator<I, E>, effect_fn: F, interpret: H) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<E>>> + Send + 'static,
        H: Fn(&E) -> Option<StepResult<R>> + Send + Sync + 'static,
    {
        let interpret = Arc::new(interpret);
        Process::<I, S, E, ()>::lift_event_returning_effect(mediator, Effect::from_async(effect_fn))
            .bind(move |()| {
                let interpret = Arc::clone(&interpret);
                Process::wait_for_event(move |event| interpret(event))
            })
    }
}
