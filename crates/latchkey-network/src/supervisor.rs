//! Connection supervision.
//!
//! The supervisor owns the broker session. Each [`tick`] brings the link and
//! the session up if needed, or services the session and hands inbound
//! messages to the registered [`MessageHandler`]. Retries use fixed delays
//! and never give up.
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──ok──> Connected
//!      ^                          │                  │
//!      └──── reconnect delay ─────┴── session lost ──┘
//! ```
//!
//! [`tick`]: ConnectionSupervisor::tick

use std::time::Duration;

use latchkey_core::DeviceId;
use latchkey_core::constants::{
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SERVICE_INTERVAL_MS, LINK_RETRY_PAUSE_MS,
    LOG_QUEUE_CAPACITY,
};
use latchkey_hardware::OutputPin;
use latchkey_protocol::{LogEvent, LogReceiver, Topics};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::link::NetworkLink;
use crate::router::MessageHandler;
use crate::session::TransportSession;

const CONNECTED_MESSAGE: &str = "Device connected to network";

/// Broker session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Supervisor timings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait after a failed connect or a lost session.
    pub reconnect_delay: Duration,
    /// Wait after a failed link re-establishment.
    pub link_retry_pause: Duration,
    /// Pause between ticks in [`ConnectionSupervisor::run`].
    pub service_interval: Duration,
    /// Most log events published per tick.
    pub log_batch: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            link_retry_pause: Duration::from_millis(LINK_RETRY_PAUSE_MS),
            service_interval: Duration::from_millis(DEFAULT_SERVICE_INTERVAL_MS),
            log_batch: LOG_QUEUE_CAPACITY,
        }
    }
}

/// Keeps the device connected and dispatches inbound messages.
pub struct ConnectionSupervisor<T, L, H, P> {
    device_id: DeviceId,
    topics: Topics,
    transport: T,
    link: L,
    handler: H,
    indicator: P,
    log_rx: LogReceiver,
    config: SupervisorConfig,
    state: SessionState,
    connections: u64,
}

impl<T, L, H, P> ConnectionSupervisor<T, L, H, P>
where
    T: TransportSession,
    L: NetworkLink,
    H: MessageHandler,
    P: OutputPin,
{
    /// Create a supervisor. The failure indicator is switched on until the
    /// first successful connection.
    pub fn new(
        device_id: DeviceId,
        transport: T,
        link: L,
        handler: H,
        mut indicator: P,
        log_rx: LogReceiver,
        config: SupervisorConfig,
    ) -> Self {
        indicator.set_high();
        Self {
            topics: Topics::new(&device_id),
            device_id,
            transport,
            link,
            handler,
            indicator,
            log_rx,
            config,
            state: SessionState::Disconnected,
            connections: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of successful connections so far.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn indicator(&self) -> &P {
        &self.indicator
    }

    /// Tick forever, pausing `service_interval` between ticks.
    pub async fn run(&mut self) {
        info!(device = %self.device_id, "Connection supervisor started");
        loop {
            self.tick().await;
            sleep(self.config.service_interval).await;
        }
    }

    /// One supervision step. May sleep for the link retry pause or the
    /// reconnect delay.
    pub async fn tick(&mut self) {
        if !self.link.is_up() {
            debug!("Network link down, reconnecting");
            if !self.link.reconnect().await {
                sleep(self.config.link_retry_pause).await;
                return;
            }
            info!("Network link re-established");
        }

        if self.state == SessionState::Connected && !self.transport.is_connected() {
            self.session_lost(&TransportError::ConnectionLost(
                "transport reports disconnected".to_string(),
            ))
            .await;
            return;
        }

        match self.state {
            SessionState::Connected => self.service().await,
            SessionState::Disconnected | SessionState::Connecting => self.connect().await,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state changed");
            self.state = state;
        }
        self.indicator.set(state != SessionState::Connected);
    }

    async fn connect(&mut self) {
        self.set_state(SessionState::Connecting);

        let result = match self.transport.connect(self.device_id.as_str()).await {
            Ok(()) => self.announce().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!(
                rc = e.status_code(),
                error = %e,
                retry_ms = self.config.reconnect_delay.as_millis() as u64,
                "MQTT connection failed"
            );
            self.set_state(SessionState::Disconnected);
            sleep(self.config.reconnect_delay).await;
        }
    }

    /// Subscribe, publish discovery and log the connection, once per
    /// successful connect.
    async fn announce(&mut self) -> TransportResult<()> {
        for topic in self.topics.subscriptions() {
            self.transport.subscribe(topic).await?;
        }

        self.transport
            .publish(self.topics.discovery(), self.device_id.as_str().as_bytes())
            .await?;

        self.set_state(SessionState::Connected);
        self.connections += 1;

        info!(device = %self.device_id, connections = self.connections, "{CONNECTED_MESSAGE}");
        let event = LogEvent::info(CONNECTED_MESSAGE);
        self.transport
            .publish(self.topics.log(), event.to_json().as_bytes())
            .await
    }

    async fn service(&mut self) {
        let messages = match self.transport.service().await {
            Ok(messages) => messages,
            Err(e) => {
                self.session_lost(&e).await;
                return;
            }
        };

        for message in messages {
            self.handler.handle(&message.topic, &message.payload).await;
        }

        for event in self.log_rx.drain(self.config.log_batch) {
            let payload = event.to_json();
            if let Err(e) = self.transport.publish(self.topics.log(), payload.as_bytes()).await {
                self.session_lost(&e).await;
                return;
            }
        }
    }

    async fn session_lost(&mut self, error: &TransportError) {
        warn!(
            rc = error.status_code(),
            error = %error,
            retry_ms = self.config.reconnect_delay.as_millis() as u64,
            "MQTT session lost"
        );
        self.set_state(SessionState::Disconnected);
        sleep(self.config.reconnect_delay).await;
    }
}
