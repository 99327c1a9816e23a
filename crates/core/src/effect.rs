//! Deferred, re-runnable asynchronous computations.
//!
//! An [`Effect`] is a *description* of work, not the work itself. Building one
//! (or composing several) performs nothing; only [`Effect::execute`] starts the
//! underlying computation, and every call starts it afresh. Results are never
//! memoised.
//!
//! ## Why a cold effect?
//!
//! Process definitions are replayed from persisted history. Replay has to walk
//! the same transitions the live run walked without repeating any side work, so
//! transitions return effects instead of performing them. The runtime decides
//! which effects actually run (only the ones produced by a freshly persisted
//! transition).
//!
//! ## Failure
//!
//! Effects fail with `anyhow::Error`. A failure propagates to whoever awaits
//! `execute()`, through every combinator, except where
//! [`Effect::catch_error`] explicitly intercepts it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::EffectError;

type Computation<T> = dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;

/// A cold unit of asynchronous work producing `T`.
///
/// Cloning is cheap (the computation is shared behind an `Arc`) and a clone
/// describes the same work.
pub struct Effect<T> {
    computation: Arc<Computation<T>>,
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            computation: Arc::clone(&self.computation),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect(<deferred>)")
    }
}

impl Effect<()> {
    /// An effect that does nothing and succeeds.
    pub fn unit() -> Self {
        Self::from_async(|| future::ready(Ok(())))
    }
}

impl<T> Effect<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An effect that succeeds with (a copy of) `value`.
    pub fn pure(value: T) -> Self {
        Self::from_async(move || future::ready(Ok(value.clone())))
    }
}

impl<T> Effect<T>
where
    T: Send + 'static,
{
    /// Wrap an asynchronous function. `f` is called once per execution.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            computation: Arc::new(move || f().boxed()),
        }
    }

    /// Wrap a synchronous function. `f` runs when the effect is polled.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_async(move || {
            let f = Arc::clone(&f);
            async move { Ok(f()) }
        })
    }

    /// Wrap a synchronous function that can fail. An `Err` from `f` fails the
    /// effect instead of panicking.
    pub fn try_from_sync<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_async(move || {
            let f = Arc::clone(&f);
            async move { f() }
        })
    }

    /// An effect that always fails with `error`.
    pub fn fail<E>(error: E) -> Self
    where
        E: std::error::Error + Clone + Send + Sync + 'static,
    {
        Self::from_async(move || future::ready(Err(anyhow::Error::new(error.clone()))))
    }

    /// Run the computation.
    pub fn execute(&self) -> BoxFuture<'static, anyhow::Result<T>> {
        (self.computation)()
    }

    /// Sequential composition: run `self`, feed its value to `f`, run the
    /// effect `f` returns.
    ///
    /// `f` is not invoked until `self` has completed successfully.
    pub fn bind<U, F>(self, f: F) -> Effect<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Effect<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_async(move || {
            let first = self.execute();
            let f = Arc::clone(&f);
            async move {
                let value = first.await?;
                f(value).execute().await
            }
        })
    }

    /// Run `self`, discard its value, then run `next`.
    pub fn then<U>(self, next: Effect<U>) -> Effect<U>
    where
        U: Send + 'static,
    {
        self.bind(move |_| next.clone())
    }

    pub fn map<U, F>(self, f: F) -> Effect<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_async(move || {
            let run = self.execute();
            let f = Arc::clone(&f);
            async move { run.await.map(|value| f(value)) }
        })
    }

    /// Discard the value.
    pub fn ignore(self) -> Effect<()> {
        self.map(|_| ())
    }

    /// On failure of `self`, run `handler(error)` in its place.
    pub fn catch_error<F>(self, handler: F) -> Self
    where
        F: Fn(anyhow::Error) -> Effect<T> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::from_async(move || {
            let run = self.execute();
            let handler = Arc::clone(&handler);
            async move {
                match run.await {
                    Ok(value) => Ok(value),
                    Err(error) => handler(error).execute().await,
                }
            }
        })
    }

    /// Run `a` then `b` and combine their values.
    pub fn map2<A, B, F>(f: F, a: Effect<A>, b: Effect<B>) -> Self
    where
        A: Send + 'static,
        B: Send + 'static,
        F: Fn(A, B) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_async(move || {
            let (a, b, f) = (a.clone(), b.clone(), Arc::clone(&f));
            async move {
                let left = a.execute().await?;
                let right = b.execute().await?;
                Ok(f(left, right))
            }
        })
    }

    /// Run effects one after another in list order, collecting their values.
    /// Stops at the first failure; later effects do not run.
    pub fn sequence(effects: Vec<Effect<T>>) -> Effect<Vec<T>> {
        Effect::from_async(move || {
            let effects = effects.clone();
            async move {
                let mut values = Vec::with_capacity(effects.len());
                for effect in &effects {
                    values.push(effect.execute().await?);
                }
                Ok(values)
            }
        })
    }

    /// Map every item to an effect, then [`sequence`](Effect::sequence) them.
    pub fn traverse<A, F>(items: impl IntoIterator<Item = A>, f: F) -> Effect<Vec<T>>
    where
        F: FnMut(A) -> Effect<T>,
    {
        Self::sequence(items.into_iter().map(f).collect())
    }

    /// Run effects concurrently and wait for all of them.
    /// The first failure fails the whole effect.
    pub fn all(effects: Vec<Effect<T>>) -> Effect<Vec<T>> {
        Effect::from_async(move || future::try_join_all(effects.iter().map(Effect::execute)))
    }

    /// Run effects concurrently; settle with whichever completes first,
    /// success or failure.
    pub fn race(effects: Vec<Effect<T>>) -> Self {
        Self::from_async(move || {
            let runs: Vec<_> = effects.iter().map(Effect::execute).collect();
            async move {
                if runs.is_empty() {
                    return Err(EffectError::EmptyRace.into());
                }
                let (first, _index, _rest) = future::select_all(runs).await;
                first
            }
        })
    }
}

/// Left-to-right chain of [`Effect::bind`].
///
/// `effect_pipe!(e, f, g)` is `e.bind(f).bind(g)`.
#[macro_export]
macro_rules! effect_pipe {
    ($effect:expr $(, $f:expr)* $(,)?) => {{
        let effect = $effect;
        $( let effect = effect.bind($f); )*
        effect
    }};
}
