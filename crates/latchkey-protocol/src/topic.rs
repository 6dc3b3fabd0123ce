//! Topic names derived from the device identifier.

use std::fmt;

use latchkey_core::DeviceId;
use latchkey_core::constants::{
    CLIENT_TOPIC_PREFIX, DISCOVERY_TOPIC, PRIVATE_TOPIC_PREFIX, TOPIC_ADD_KEY, TOPIC_LOG,
    TOPIC_REMOVE_KEY, TOPIC_SYNC_KEYS,
};

/// Inbound control topics, one per store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTopic {
    /// Full replacement of the allow-list.
    SyncKeys,
    /// Add a single key.
    AddKey,
    /// Remove a single key.
    RemoveKey,
}

impl ControlTopic {
    /// All control topics, in subscription order.
    pub const ALL: [ControlTopic; 3] = [
        ControlTopic::SyncKeys,
        ControlTopic::AddKey,
        ControlTopic::RemoveKey,
    ];

    /// Last path segment of the topic.
    pub fn suffix(&self) -> &'static str {
        match self {
            ControlTopic::SyncKeys => TOPIC_SYNC_KEYS,
            ControlTopic::AddKey => TOPIC_ADD_KEY,
            ControlTopic::RemoveKey => TOPIC_REMOVE_KEY,
        }
    }
}

impl fmt::Display for ControlTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Pre-rendered topic strings for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    sync_keys: String,
    add_key: String,
    remove_key: String,
    log: String,
}

impl Topics {
    /// Render all topics for `device`.
    pub fn new(device: &DeviceId) -> Self {
        let private = |suffix: &str| format!("{PRIVATE_TOPIC_PREFIX}/{device}/{suffix}");

        Self {
            sync_keys: private(TOPIC_SYNC_KEYS),
            add_key: private(TOPIC_ADD_KEY),
            remove_key: private(TOPIC_REMOVE_KEY),
            log: format!("{CLIENT_TOPIC_PREFIX}/{device}/{TOPIC_LOG}"),
        }
    }

    /// Full topic string for a control topic.
    pub fn control(&self, topic: ControlTopic) -> &str {
        match topic {
            ControlTopic::SyncKeys => &self.sync_keys,
            ControlTopic::AddKey => &self.add_key,
            ControlTopic::RemoveKey => &self.remove_key,
        }
    }

    /// Topics to subscribe to after every successful connect.
    pub fn subscriptions(&self) -> [&str; 3] {
        ControlTopic::ALL.map(|topic| self.control(topic))
    }

    /// Map an inbound topic string to its control topic.
    ///
    /// Returns `None` for any topic that does not belong to this device.
    pub fn classify(&self, topic: &str) -> Option<ControlTopic> {
        ControlTopic::ALL
            .into_iter()
            .find(|candidate| self.control(*candidate) == topic)
    }

    /// Outbound log topic.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Shared discovery channel.
    pub fn discovery(&self) -> &'static str {
        DISCOVERY_TOPIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn topics() -> Topics {
        Topics::new(&DeviceId::new("esp-device-1").unwrap())
    }

    #[test]
    fn test_topic_rendering() {
        let topics = topics();
        assert_eq!(
            topics.subscriptions(),
            [
                "private/esp-device-1/sync-keys",
                "private/esp-device-1/add-key",
                "private/esp-device-1/remove-key",
            ]
        );
        assert_eq!(topics.log(), "client/esp-device-1/log");
        assert_eq!(topics.discovery(), "discovery");
    }

    #[rstest]
    #[case("private/esp-device-1/sync-keys", Some(ControlTopic::SyncKeys))]
    #[case("private/esp-device-1/add-key", Some(ControlTopic::AddKey))]
    #[case("private/esp-device-1/remove-key", Some(ControlTopic::RemoveKey))]
    #[case("private/other-device/add-key", None)]
    #[case("private/esp-device-1/reboot", None)]
    #[case("discovery", None)]
    fn test_classify(#[case] topic: &str, #[case] expected: Option<ControlTopic>) {
        assert_eq!(topics().classify(topic), expected);
    }
}
