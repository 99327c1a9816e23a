//! What a process stream stores.
//!
//! A stream always starts with exactly one `ProcessStarted` sentinel, followed
//! by one `EventReceived` per event that caused a transition. Ignored events
//! are never written, so replaying a stream offers the process exactly the
//! events it once accepted, in the same order.

use serde::{Deserialize, Serialize};

/// One persisted entry of a process stream.
///
/// Serialised internally tagged: `{"type":"ProcessStarted"}` and
/// `{"type":"EventReceived","event":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEntry<E> {
    ProcessStarted,
    EventReceived { event: E },
}

impl<E> StreamEntry<E> {
    pub fn received(event: E) -> Self {
        Self::EventReceived { event }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Self::ProcessStarted)
    }

    /// The event carried by an `EventReceived` entry.
    pub fn event(&self) -> Option<&E> {
        match self {
            Self::EventReceived { event } => Some(event),
            Self::ProcessStarted => None,
        }
    }

    /// Entry tag as it appears in the serialised form.
    pub fn entry_type(&self) -> &'static str {
        match self {
            Self::ProcessStarted => "ProcessStarted",
            Self::EventReceived { .. } => "EventReceived",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum Payment {
        Authorized { amount: u32 },
    }

    #[test]
    fn entries_serialise_with_a_type_tag() {
        let started: StreamEntry<Payment> = StreamEntry::ProcessStarted;
        assert_eq!(serde_json::to_value(&started).unwrap(), json!({"type": "ProcessStarted"}));

        let received = StreamEntry::received(Payment::Authorized { amount: 5 });
        assert_eq!(
            serde_json::to_value(&received).unwrap(),
            json!({"type": "EventReceived", "event": {"type": "Authorized", "amount": 5}})
        );
        assert_eq!(received.entry_type(), "EventReceived");
    }

    #[test]
    fn entries_deserialise_from_stored_json() {
        let entry: StreamEntry<Payment> =
            serde_json::from_value(json!({"type": "EventReceived", "event": {"type": "Authorized", "amount": 9}}))
                .unwrap();
        assert_eq!(entry.event(), Some(&Payment::Authorized { amount: 9 }));
        assert!(!entry.is_start());
    }
}
