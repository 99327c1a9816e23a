//! Process-scoped command routing.
//!
//! Effects built inside a process definition sometimes produce events meant
//! for the same workflow ("payment requested" → "payment captured"). The
//! process cannot call the runtime directly without knowing where it is
//! hosted, so it sends an [`EnqueueEvent`] through a [`Mediator`] and the host
//! registers a handler that feeds the event back into the runtime.
//!
//! The mediator is an explicit handle. Clones share one handler table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use procflow_core::Effect;

use crate::command::{Command, EnqueueEvent};

type Handler<C> = Arc<dyn Fn(C) -> Effect<()> + Send + Sync>;

/// Registry of command handlers keyed by command type.
pub struct Mediator<C> {
    handlers: Arc<RwLock<HashMap<String, Handler<C>>>>,
}

/// Mediator carrying follow-up events for processes with instance type `I`
/// and event type `E`.
pub type EventMediator<I, E> = Mediator<EnqueueEvent<I, E>>;

impl<C> Clone for Mediator<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C> Default for Mediator<C> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<C> fmt::Debug for Mediator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = handlers.keys().collect();
        keys.sort();
        f.debug_struct("Mediator").field("handlers", &keys).finish()
    }
}

impl<C: Command> Mediator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command_type`, replacing any previous handler.
    pub fn register_handler<F>(&self, command_type: impl Into<String>, handler: F)
    where
        F: Fn(C) -> Effect<()> + Send + Sync + 'static,
    {
        let command_type = command_type.into();
        debug!(command_type = %command_type, "registering mediator handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command_type, Arc::new(handler));
    }

    pub fn has_handler(&self, command_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(command_type)
    }

    /// Route `command` to its handler.
    ///
    /// An unrouted command is dropped: the result is `Effect::unit()`.
    pub fn send(&self, command: C) -> Effect<()> {
        let command_type = command.command_type();
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&command_type)
            .cloned();

        match handler {
            Some(handler) => handler(command),
            None => {
                debug!(command_type = %command_type, "no handler registered, dropping command");
                Effect::unit()
            }
        }
    }
}

impl<I, E> Mediator<EnqueueEvent<I, E>>
where
    I: procflow_core::ProcessInstance,
    E: Send + Sync + 'static,
{
    /// Register the follow-up event handler for `process_name`.
    pub fn on_enqueue_event<F>(&self, process_name: &str, handler: F)
    where
        F: Fn(I, E) -> Effect<()> + Send + Sync + 'static,
    {
        self.register_handler(
            EnqueueEvent::<I, E>::command_type_for(process_name),
            move |command: EnqueueEvent<I, E>| handler(command.instance_id, command.event),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::InstanceId;
    use std::sync::Mutex;

    #[tokio::test]
    async fn send_routes_by_process_name() {
        let mediator: EventMediator<InstanceId, u32> = Mediator::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        mediator.on_enqueue_event("billing", move |id, event| {
            let sink = Arc::clone(&sink);
            Effect::from_sync(move || sink.lock().unwrap().push((id.to_string(), event)))
        });
        assert!(mediator.has_handler("billing.enqueueEvent"));

        let send = mediator.send(EnqueueEvent::new(InstanceId::with_key("billing", "1"), 7));
        assert!(received.lock().unwrap().is_empty(), "sending only builds the effect");

        send.execute().await.unwrap();
        assert_eq!(*received.lock().unwrap(), vec![("billing/1".to_string(), 7)]);
    }

    #[tokio::test]
    async fn unrouted_commands_are_dropped() {
        let mediator: EventMediator<InstanceId, u32> = Mediator::new();
        let send = mediator.send(EnqueueEvent::new(InstanceId::with_key("shipping", "1"), 1));
        send.execute().await.unwrap();
    }

    #[tokio::test]
    async fn registering_again_replaces_the_handler_for_all_clones() {
        let mediator: EventMediator<InstanceId, u32> = Mediator::new();
        let clone = mediator.clone();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let hits = Arc::clone(&hits);
            mediator.on_enqueue_event("billing", move |_, _| {
                let hits = Arc::clone(&hits);
                Effect::from_sync(move || hits.lock().unwrap().push(label))
            });
        }

        clone
            .send(EnqueueEvent::new(InstanceId::with_key("billing", "1"), 1))
            .execute()
            .await
            .unwrap();
        assert_eq!(*hits.lock().unwrap(), vec!["second"]);
    }
}
