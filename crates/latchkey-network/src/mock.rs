//! In-memory transport and link for tests.
//!
//! [`MockTransport`] behaves like a broker session that always succeeds
//! unless told otherwise through its [`MockBroker`] handle. The handle also
//! records everything the device subscribed to and published.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::{TransportError, TransportResult};
use crate::link::NetworkLink;
use crate::session::{InboundMessage, TransportSession};

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    refusals: VecDeque<u8>,
    connect_attempts: usize,
    client_ids: Vec<String>,
    subscriptions: Vec<String>,
    published: Vec<(String, Bytes)>,
    inbound: VecDeque<InboundMessage>,
    fail_publish: bool,
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport session backed by shared in-memory state.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<BrokerState>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockBroker) {
        let state = Arc::new(Mutex::new(BrokerState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockBroker { state },
        )
    }
}

impl TransportSession for MockTransport {
    async fn connect(&mut self, client_id: &str) -> TransportResult<()> {
        let mut state = lock(&self.state);
        state.connect_attempts += 1;
        state.client_ids.push(client_id.to_string());
        if let Some(rc) = state.refusals.pop_front() {
            state.connected = false;
            return Err(TransportError::ConnectionRefused(rc));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> TransportResult<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_publish {
            state.connected = false;
            return Err(TransportError::ConnectionLost("publish failed".to_string()));
        }
        state
            .published
            .push((topic.to_string(), Bytes::copy_from_slice(payload)));
        Ok(())
    }

    async fn service(&mut self) -> TransportResult<Vec<InboundMessage>> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::ConnectionLost("session dropped".to_string()));
        }
        Ok(state.inbound.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Control and inspection handle for a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    /// Refuse the next connect attempt with CONNACK return code `rc`.
    pub fn refuse_next(&self, rc: u8) {
        lock(&self.state).refusals.push_back(rc);
    }

    /// Drop the current session, as if the broker went away.
    pub fn drop_session(&self) {
        lock(&self.state).connected = false;
    }

    /// Make publishes fail (and drop the session) until reset.
    pub fn set_publish_failure(&self, fail: bool) {
        lock(&self.state).fail_publish = fail;
    }

    /// Queue a message for the next `service()` call.
    pub fn deliver(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        lock(&self.state)
            .inbound
            .push_back(InboundMessage::new(topic, payload));
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn connect_attempts(&self) -> usize {
        lock(&self.state).connect_attempts
    }

    pub fn client_ids(&self) -> Vec<String> {
        lock(&self.state).client_ids.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        lock(&self.state).published.clone()
    }

    /// Payloads published to `topic`, in order.
    pub fn published_to(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.to_vec())
            .collect()
    }
}

#[derive(Debug)]
struct LinkState {
    up: AtomicBool,
    reconnect_succeeds: AtomicBool,
    reconnect_attempts: AtomicUsize,
}

/// Network link whose state is set by the test. Clones share state.
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<LinkState>,
}

impl MockLink {
    /// A link that is up.
    pub fn new() -> Self {
        Self {
            state: Arc::new(LinkState {
                up: AtomicBool::new(true),
                reconnect_succeeds: AtomicBool::new(true),
                reconnect_attempts: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.state.up.store(up, Ordering::SeqCst);
    }

    pub fn set_reconnect_succeeds(&self, succeeds: bool) {
        self.state.reconnect_succeeds.store(succeeds, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.state.reconnect_attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for MockLink {
    fn is_up(&self) -> bool {
        self.state.up.load(Ordering::SeqCst)
    }

    async fn reconnect(&mut self) -> bool {
        self.state.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        let up = self.state.reconnect_succeeds.load(Ordering::SeqCst);
        self.state.up.store(up, Ordering::SeqCst);
        up
    }
}
