//! Process runtime: delivers events to durable process instances.
//!
//! The runtime keeps no in-memory state per instance. Every delivery rebuilds
//! the workflow from its stream:
//!
//! ```text
//! handle_event(instance, event, stream, process)
//!   ↓
//! 1. Start the stream if it does not exist (ProcessStarted, initial effect)
//!   ↓
//! 2. Load history and replay it through the process (effects discarded)
//!   ↓
//! 3. Offer the event to the replayed node
//!   ↓  ignored → nothing written, nothing run
//! 4. Append EventReceived at expected version = history length
//!   ↓
//! 5. Execute the step's effect
//! ```
//!
//! A concurrency conflict on one of the runtime's own appends means another
//! delivery won the race for this stream; the whole delivery is retried from
//! step 1 under the runtime's [`RetryPolicy`]. Persistence always precedes
//! effect execution, so an effect never runs for a transition that was not
//! recorded.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use procflow_core::{Effect, ProcessData, ProcessInstance};
use procflow_process::{EventMediator, Process, ProcessState, StreamEntry};

use crate::config::RuntimeConfig;
use crate::event_store::{EventStoreError, EventStoreHandle, create_event_store};
use crate::retry::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("event store error: {0}")]
    Store(EventStoreError),

    /// A stream that does not start with exactly one `ProcessStarted`.
    #[error("invalid process history: {0}")]
    InvalidHistory(String),

    #[error("gave up on stream '{stream}' after {attempts} conflicting attempts")]
    RetriesExhausted { stream: String, attempts: u32 },
}

impl From<EventStoreError> for RuntimeError {
    fn from(value: EventStoreError) -> Self {
        Self::Store(value)
    }
}

enum Attempt {
    Done,
    Conflict(EventStoreError),
}

/// Event delivery for processes whose events are `E`.
///
/// Cloning is cheap; clones share the store.
#[derive(Debug)]
pub struct ProcessRuntime<E> {
    store: EventStoreHandle<StreamEntry<E>>,
    retry: RetryPolicy,
}

impl<E> Clone for ProcessRuntime<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<E> ProcessRuntime<E>
where
    E: ProcessData,
{
    pub fn new(store: EventStoreHandle<StreamEntry<E>>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Build the configured store and retry policy.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError>
    where
        E: Serialize + DeserializeOwned,
    {
        let store = create_event_store::<E>(&config.store)?;
        Ok(Self::new(store).with_retry_policy(config.retry.clone()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &EventStoreHandle<StreamEntry<E>> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Deliver `event` to the instance persisted in `stream`.
    ///
    /// The returned effect fails with [`RuntimeError`] for store faults,
    /// corrupt history and exhausted retries; a failing step effect surfaces
    /// its own error unchanged. A workflow that ends in `Failed` is not an
    /// error.
    pub fn handle_event<I, S, R>(
        &self,
        instance_id: I,
        event: E,
        stream: impl Into<String>,
        process: Process<I, S, E, R>,
    ) -> Effect<()>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let runtime = self.clone();
        let stream = stream.into();
        Effect::from_async(move || {
            let runtime = runtime.clone();
            let instance_id = instance_id.clone();
            let event = event.clone();
            let stream = stream.clone();
            let process = process.clone();
            async move { runtime.deliver(&instance_id, &event, &stream, &process).await }
        })
    }

    /// Write the `ProcessStarted` sentinel and run the process's initial
    /// effect. Fails if the stream was already started.
    pub fn start_process<I, S, R>(
        &self,
        instance_id: I,
        stream: impl Into<String>,
        process: Process<I, S, E, R>,
    ) -> Effect<()>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let runtime = self.clone();
        let stream = stream.into();
        Effect::from_async(move || {
            let runtime = runtime.clone();
            let instance_id = instance_id.clone();
            let stream = stream.clone();
            let process = process.clone();
            async move {
                match runtime.begin(&instance_id, &stream, &process).await? {
                    None => Ok(()),
                    Some(conflict) => Err(RuntimeError::Store(conflict).into()),
                }
            }
        })
    }

    /// Current node of the instance in `stream`, rebuilt from history.
    ///
    /// Nothing is written. A stream that does not exist yet yields the node the
    /// process starts in.
    pub fn get_process_state<I, S, R>(
        &self,
        instance_id: I,
        stream: impl Into<String>,
        process: Process<I, S, E, R>,
    ) -> Effect<ProcessState<S, E, R>>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let store = self.store.clone();
        let stream = stream.into();
        Effect::from_async(move || {
            let load = store.load_events(stream.clone(), None);
            let instance_id = instance_id.clone();
            let process = process.clone();
            async move {
                let history = load.execute().await.map_err(store_failure)?;
                if history.is_empty() {
                    return Ok(process.run(&instance_id, S::default()).1);
                }
                Ok(apply_history(&instance_id, &process, &history)?)
            }
        })
    }

    /// Delete the instance's stream. The next delivery starts it afresh.
    pub fn clear_process_state(&self, stream: impl Into<String>) -> Effect<()> {
        let delete = self.store.delete_stream(stream);
        Effect::from_async(move || {
            let delete = delete.execute();
            async move { delete.await.map_err(store_failure) }
        })
    }

    /// Route follow-up events that `process` enqueues through `mediator` back
    /// into this runtime. `stream_of` names the stream of an instance.
    pub fn connect_mediator<I, S, R, F>(
        &self,
        mediator: &EventMediator<I, E>,
        process_name: &str,
        stream_of: F,
        process: Process<I, S, E, R>,
    ) where
        I: ProcessInstance,
        S: ProcessData + Default,
        R: ProcessData,
        F: Fn(&I) -> String + Send + Sync + 'static,
    {
        let runtime = self.clone();
        mediator.on_enqueue_event(process_name, move |instance_id: I, event: E| {
            let stream = stream_of(&instance_id);
            runtime.handle_event(instance_id, event, stream, process.clone())
        });
    }

    #[instrument(skip(self, instance_id, event, process), err)]
    async fn deliver<I, S, R>(
        &self,
        instance_id: &I,
        event: &E,
        stream: &str,
        process: &Process<I, S, E, R>,
    ) -> anyhow::Result<()>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let mut retries: u32 = 0;
        loop {
            let conflict = match self.attempt(instance_id, event, stream, process).await? {
                Attempt::Done => return Ok(()),
                Attempt::Conflict(conflict) => conflict,
            };

            if !self.retry.should_retry(retries) {
                return Err(RuntimeError::RetriesExhausted {
                    stream: stream.to_string(),
                    attempts: retries.saturating_add(1),
                }
                .into());
            }
            retries += 1;

            let delay = self.retry.delay_for_attempt(retries);
            warn!(
                stream,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %conflict,
                "concurrency conflict, retrying delivery"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<I, S, R>(
        &self,
        instance_id: &I,
        event: &E,
        stream: &str,
        process: &Process<I, S, E, R>,
    ) -> anyhow::Result<Attempt>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let exists = self
            .store
            .stream_exists(stream)
            .execute()
            .await
            .map_err(store_failure)?;
        if !exists {
            if let Some(conflict) = self.begin(instance_id, stream, process).await? {
                return Ok(Attempt::Conflict(conflict));
            }
        }

        let history = self
            .store
            .load_events(stream, None)
            .execute()
            .await
            .map_err(store_failure)?;
        let node = apply_history(instance_id, process, &history)?;

        let Some((effect, next)) = node.offer(event) else {
            debug!(stream, state = %node.kind(), "event ignored");
            return Ok(Attempt::Done);
        };

        let expected = history.len() as u64;
        let append = self
            .store
            .append_event(stream, vec![StreamEntry::received(event.clone())], expected);
        match append.execute().await {
            Ok(version) => info!(stream, version, state = %next.kind(), "event accepted"),
            Err(error) => return into_conflict(error).map(Attempt::Conflict),
        }

        effect.execute().await?;
        Ok(Attempt::Done)
    }

    /// Append the sentinel at version 0, then run the initial effect.
    /// `Some` means another delivery started the stream first.
    async fn begin<I, S, R>(
        &self,
        instance_id: &I,
        stream: &str,
        process: &Process<I, S, E, R>,
    ) -> anyhow::Result<Option<EventStoreError>>
    where
        I: ProcessData,
        S: ProcessData + Default,
        R: ProcessData,
    {
        let start = self
            .store
            .append_event(stream, vec![StreamEntry::ProcessStarted], 0);
        if let Err(error) = start.execute().await {
            return into_conflict(error).map(Some);
        }

        let (effect, node) = process.run(instance_id, S::default());
        info!(stream, state = %node.kind(), "process started");
        effect.execute().await?;
        Ok(None)
    }
}

/// Rebuild the current node from a stream's entries.
///
/// The first entry must be `ProcessStarted` and no other entry may be. Each
/// `EventReceived` is offered in order; the effects of replayed steps are
/// dropped, they ran when the step was first accepted.
pub fn apply_history<I, S, E, R>(
    instance_id: &I,
    process: &Process<I, S, E, R>,
    history: &[StreamEntry<E>],
) -> Result<ProcessState<S, E, R>, RuntimeError>
where
    I: ProcessData,
    S: ProcessData + Default,
    E: ProcessData,
    R: ProcessData,
{
    let Some((first, rest)) = history.split_first() else {
        return Err(RuntimeError::InvalidHistory("stream is empty".to_string()));
    };
    if !first.is_start() {
        return Err(RuntimeError::InvalidHistory(format!(
            "stream starts with {} instead of ProcessStarted",
            first.entry_type()
        )));
    }

    let (_, mut node) = process.run(instance_id, S::default());
    for (offset, entry) in rest.iter().enumerate() {
        let Some(event) = entry.event() else {
            return Err(RuntimeError::InvalidHistory(format!(
                "second ProcessStarted at version {}",
                offset + 2
            )));
        };
        match node.offer(event) {
            Some((_, next)) => node = next,
            None => debug!(version = offset + 2, "recorded event no longer accepted, skipped"),
        }
    }
    Ok(node)
}

/// Split a failed append into a retryable conflict or a runtime fault.
fn into_conflict(error: anyhow::Error) -> anyhow::Result<EventStoreError> {
    match error.downcast::<EventStoreError>() {
        Ok(conflict) if conflict.is_concurrency() => Ok(conflict),
        Ok(other) => Err(RuntimeError::Store(other).into()),
        Err(error) => Err(error),
    }
}

fn store_failure(error: anyhow::Error) -> anyhow::Error {
    match error.downcast::<EventStoreError>() {
        Ok(store) => RuntimeError::Store(store).into(),
        Err(error) => error,
    }
}
