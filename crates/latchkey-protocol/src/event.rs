//! Log events published on `client/{D}/log`.
//!
//! Producers (the access controller, the sync router) enqueue events through
//! a cloneable [`LogPublisher`]; the connection supervisor drains the queue
//! while a session is up. The queue is bounded: when it is full the newest
//! event is dropped.

use latchkey_core::AccessKey;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// A structured log event as serialized on the wire.
///
/// ```json
/// {"message": "Access granted", "key": "00010203...", "had_access": true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub had_access: Option<bool>,
}

impl LogEvent {
    /// Plain informational event.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
            had_access: None,
        }
    }

    /// Result of an authentication cycle.
    pub fn access_attempt(key: &AccessKey, granted: bool) -> Self {
        let message = if granted {
            "Access granted"
        } else {
            "Access denied"
        };

        Self {
            message: message.to_string(),
            key: Some(key.to_hex()),
            had_access: Some(granted),
        }
    }

    /// Serialize for publishing.
    pub fn to_json(&self) -> String {
        // A struct of strings and bools cannot fail to serialize
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Create a bounded log queue.
pub fn log_channel(capacity: usize) -> (LogPublisher, LogReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LogPublisher { tx }, LogReceiver { rx })
}

/// Producer side of the log queue.
#[derive(Debug, Clone)]
pub struct LogPublisher {
    tx: mpsc::Sender<LogEvent>,
}

impl LogPublisher {
    /// Enqueue an event without waiting.
    ///
    /// Returns `false` if the event was dropped (queue full or receiver gone).
    pub fn publish(&self, event: LogEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(message = %event.message, "Log queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Shorthand for `publish(LogEvent::info(message))`.
    pub fn info(&self, message: impl Into<String>) -> bool {
        self.publish(LogEvent::info(message))
    }
}

/// Consumer side of the log queue.
#[derive(Debug)]
pub struct LogReceiver {
    rx: mpsc::Receiver<LogEvent>,
}

impl LogReceiver {
    /// Take up to `max` queued events, oldest first, without waiting.
    pub fn drain(&mut self, max: usize) -> Vec<LogEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_serialization_omits_optional_fields() {
        let event = LogEvent::info("Device connected to network");
        assert_eq!(event.to_json(), r#"{"message":"Device connected to network"}"#);
    }

    #[test]
    fn test_access_attempt_serialization() {
        let key = AccessKey::new([0xAB; 16]);
        let event = LogEvent::access_attempt(&key, true);
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["message"], "Access granted");
        assert_eq!(value["key"], "AB".repeat(16));
        assert_eq!(value["had_access"], true);

        let denied = LogEvent::access_attempt(&key, false);
        assert_eq!(denied.message, "Access denied");
        assert_eq!(denied.had_access, Some(false));
    }

    #[test]
    fn test_deserialize_minimal_event() {
        let event: LogEvent = serde_json::from_str(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(event, LogEvent::info("hello"));
    }

    #[test]
    fn test_queue_preserves_order() {
        let (publisher, mut receiver) = log_channel(8);
        assert!(publisher.info("one"));
        assert!(publisher.info("two"));
        assert!(publisher.info("three"));

        let drained = receiver.drain(2);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "one");
        assert_eq!(drained[1].message, "two");
        assert_eq!(receiver.len(), 1);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (publisher, mut receiver) = log_channel(2);
        assert!(publisher.info("a"));
        assert!(publisher.info("b"));
        assert!(!publisher.info("c"));

        let messages: Vec<_> = receiver
            .drain(10)
            .into_iter()
            .map(|event| event.message)
            .collect();
        assert_eq!(messages, vec!["a", "b"]);
        assert!(receiver.is_empty());
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (publisher, receiver) = log_channel(2);
        drop(receiver);
        assert!(!publisher.info("lost"));
    }
}
