use procflow_core::ProcessInstance;

/// A message routed through a [`Mediator`](crate::Mediator).
///
/// Commands represent **intent**: a request for some handler to act. They are
/// transient (never persisted) and are routed by `command_type()`, not by
/// their Rust type, so one mediator can serve many processes.
///
/// ## Design Constraints
///
/// Commands must be:
/// - **Send + Sync**: they are sent from effects running on a multi-threaded executor
/// - **'static**: handlers may hold on to them inside deferred effects
pub trait Command: Send + Sync + 'static {
    /// Routing key of this command.
    fn command_type(&self) -> String;
}

/// Deliver `event` to the process instance `instance_id`.
///
/// Process helpers send this command for every follow-up event an effect
/// produces. Whoever hosts the process registers a handler for
/// [`EnqueueEvent::command_type_for`] that feeds the event back into the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueEvent<I, E> {
    pub instance_id: I,
    pub event: E,
}

impl<I, E> EnqueueEvent<I, E> {
    pub const NAME: &'static str = "enqueueEvent";

    pub fn new(instance_id: I, event: E) -> Self {
        Self { instance_id, event }
    }

    /// Routing key for `process_name`: `"{process_name}.enqueueEvent"`.
    pub fn command_type_for(process_name: &str) -> String {
        format!("{process_name}.{}", Self::NAME)
    }
}

impl<I, E> Command for EnqueueEvent<I, E>
where
    I: ProcessInstance,
    E: Send + Sync + 'static,
{
    fn command_type(&self) -> String {
        Self::command_type_for(self.instance_id.process_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::InstanceId;

    #[test]
    fn enqueue_event_is_scoped_by_process_name() {
        let command = EnqueueEvent::new(InstanceId::with_key("billing", "7"), 42_u32);
        assert_eq!(command.command_type(), "billing.enqueueEvent");
        assert_eq!(
            EnqueueEvent::<InstanceId, u32>::command_type_for("billing"),
            command.command_type()
        );
    }
}
