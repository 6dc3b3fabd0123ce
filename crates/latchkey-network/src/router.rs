//! Inbound message routing.
//!
//! [`SyncRouter`] turns each (topic, payload) pair from the broker into at
//! most one credential store mutation. Malformed messages and unknown topics
//! are logged and dropped; nothing here is fatal.

#![allow(async_fn_in_trait)]

use latchkey_core::Error;
use latchkey_protocol::{KeyCommand, LogPublisher, Topics, decode_command};
use latchkey_storage::{
    AddOutcome, KeyNamespace, RemoveOutcome, ReplaceOutcome, SharedCredentialStore,
};
use tracing::{debug, error, info, warn};

/// Receiver of inbound broker messages, registered with the supervisor.
pub trait MessageHandler: Send {
    async fn handle(&mut self, topic: &str, payload: &[u8]);
}

/// What a routed message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Added(AddOutcome),
    Removed(RemoveOutcome),
    Replaced(ReplaceOutcome),
    UnknownTopic,
    /// Payload could not be decoded.
    Rejected(Error),
    /// Decoded, but the store could not persist it.
    StorageFailed(String),
}

/// Applies control-plane commands to the shared credential store.
#[derive(Debug)]
pub struct SyncRouter<N> {
    store: SharedCredentialStore<N>,
    topics: Topics,
    log: LogPublisher,
}

impl<N: KeyNamespace> SyncRouter<N> {
    pub fn new(store: SharedCredentialStore<N>, topics: Topics, log: LogPublisher) -> Self {
        Self { store, topics, log }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Route one message and report the result.
    pub async fn route(&self, topic: &str, payload: &[u8]) -> RouteOutcome {
        let Some(kind) = self.topics.classify(topic) else {
            info!(topic, "Unknown topic");
            self.log.info(format!("Unknown Topic: {topic}"));
            return RouteOutcome::UnknownTopic;
        };

        let command = match decode_command(kind, payload) {
            Ok(command) => command,
            Err(e) => {
                error!(topic, len = payload.len(), error = %e, "Dropping malformed message");
                return RouteOutcome::Rejected(e);
            }
        };

        match command {
            KeyCommand::Sync(batch) => {
                if batch.skipped > 0 {
                    warn!(
                        skipped = batch.skipped,
                        total = batch.total,
                        "Skipped invalid keys in sync payload"
                    );
                }
                if batch.is_noop() {
                    debug!(total = batch.total, "Sync payload has no usable keys, store unchanged");
                    return RouteOutcome::Replaced(ReplaceOutcome::Unchanged);
                }

                debug!(count = batch.keys.len(), "Syncing keys");
                match self.store.replace_all(&batch.keys).await {
                    Ok(outcome) => RouteOutcome::Replaced(outcome),
                    Err(e) => {
                        error!(error = %e, "Failed to replace key list");
                        RouteOutcome::StorageFailed(e.to_string())
                    }
                }
            }
            KeyCommand::Add(key) => match self.store.add(key).await {
                Ok(outcome) => RouteOutcome::Added(outcome),
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to add key");
                    RouteOutcome::StorageFailed(e.to_string())
                }
            },
            KeyCommand::Remove(key) => match self.store.remove(&key).await {
                Ok(RemoveOutcome::NotFound) => {
                    warn!(key = %key, "Key not found");
                    RouteOutcome::Removed(RemoveOutcome::NotFound)
                }
                Ok(outcome) => RouteOutcome::Removed(outcome),
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to remove key");
                    RouteOutcome::StorageFailed(e.to_string())
                }
            },
        }
    }
}

impl<N: KeyNamespace> MessageHandler for SyncRouter<N> {
    async fn handle(&mut self, topic: &str, payload: &[u8]) {
        self.route(topic, payload).await;
    }
}
