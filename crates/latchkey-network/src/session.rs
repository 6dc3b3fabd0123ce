//! Pub/sub transport sessions.
//!
//! [`TransportSession`] is the seam between the connection supervisor and
//! the broker client. [`MqttSession`] speaks MQTT 3.1.1 over TCP using
//! [`MqttCodec`]; [`MockTransport`](crate::mock::MockTransport) is used in
//! tests.
//!
//! `service()` never waits for the network: it drains whatever packets are
//! already buffered, answers keep-alive duties and returns. The supervisor
//! calls it on every tick.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use latchkey_core::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_MQTT_PORT};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::codec::{MqttCodec, Packet};
use crate::error::{TransportError, TransportResult};

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Broker session used by the connection supervisor.
pub trait TransportSession: Send {
    /// Open a session identified by `client_id`.
    ///
    /// # Errors
    ///
    /// Any failure; [`TransportError::status_code`] gives the code to log.
    async fn connect(&mut self, client_id: &str) -> TransportResult<()>;

    async fn subscribe(&mut self, topic: &str) -> TransportResult<()>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()>;

    /// Process pending network traffic without blocking.
    ///
    /// Returns the messages that arrived since the last call. An error means
    /// the session is gone and `is_connected()` now returns `false`.
    async fn service(&mut self) -> TransportResult<Vec<InboundMessage>>;

    fn is_connected(&self) -> bool;
}

/// Broker address and session timings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    /// Bound on TCP connect plus CONNACK.
    pub connect_timeout: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MQTT_PORT,
            keep_alive: Duration::from_secs(u64::from(DEFAULT_KEEP_ALIVE_SECS)),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// MQTT 3.1.1 client session over TCP.
pub struct MqttSession {
    config: MqttConfig,
    framed: Option<Framed<TcpStream, MqttCodec>>,
    next_packet_id: u16,
    last_sent: Instant,
    ping_sent_at: Option<Instant>,
}

impl MqttSession {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            framed: None,
            next_packet_id: 1,
            last_sent: Instant::now(),
            ping_sent_at: None,
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // Packet identifier 0 is reserved
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.config.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }

    fn drop_session(&mut self, reason: &str) -> TransportError {
        self.framed = None;
        self.ping_sent_at = None;
        warn!(reason, "MQTT session dropped");
        TransportError::ConnectionLost(reason.to_string())
    }

    async fn send(&mut self, packet: Packet) -> TransportResult<()> {
        let name = packet.name();
        let framed = self.framed.as_mut().ok_or(TransportError::NotConnected)?;

        if let Err(e) = framed.send(packet).await {
            return Err(self.drop_session(&format!("{name} failed: {e}")));
        }

        trace!(packet = name, "Packet sent");
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn open(&mut self, client_id: &str) -> TransportResult<()> {
        let address = self.config.address();
        let stream = TcpStream::connect(&address).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let mut framed = Framed::new(stream, MqttCodec::new());
        framed
            .send(Packet::connect(client_id, self.keep_alive_secs()))
            .await?;

        match framed.next().await {
            Some(Ok(Packet::ConnAck { return_code: 0, .. })) => {}
            Some(Ok(Packet::ConnAck { return_code, .. })) => {
                return Err(TransportError::ConnectionRefused(return_code));
            }
            Some(Ok(other)) => {
                return Err(TransportError::Codec(format!(
                    "expected CONNACK, got {}",
                    other.name()
                )));
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(TransportError::ConnectionLost(
                    "broker closed connection during handshake".to_string(),
                ));
            }
        }

        self.framed = Some(framed);
        self.last_sent = Instant::now();
        self.ping_sent_at = None;
        Ok(())
    }
}

impl TransportSession for MqttSession {
    async fn connect(&mut self, client_id: &str) -> TransportResult<()> {
        self.framed = None;
        debug!(broker = %self.config.address(), client_id, "Attempting MQTT connection");

        let limit = self.config.connect_timeout;
        match timeout(limit, self.open(client_id)).await {
            Ok(Ok(())) => {
                info!(broker = %self.config.address(), "Connected to MQTT broker");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::ConnectionTimeout(limit.as_millis() as u64)),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> TransportResult<()> {
        debug!(topic, "Subscribing");
        let packet_id = self.packet_id();
        self.send(Packet::Subscribe {
            packet_id,
            topics: vec![topic.to_string()],
        })
        .await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        self.send(Packet::publish(topic, Bytes::copy_from_slice(payload)))
            .await
    }

    async fn service(&mut self) -> TransportResult<Vec<InboundMessage>> {
        let mut inbound = Vec::new();

        loop {
            let framed = self.framed.as_mut().ok_or(TransportError::NotConnected)?;
            let Some(next) = framed.next().now_or_never() else {
                break;
            };

            match next {
                Some(Ok(Packet::Publish { topic, payload })) => {
                    trace!(topic = %topic, len = payload.len(), "Message received");
                    inbound.push(InboundMessage { topic, payload });
                }
                Some(Ok(Packet::PingResp)) => {
                    self.ping_sent_at = None;
                }
                Some(Ok(Packet::SubAck {
                    packet_id,
                    return_codes,
                })) => {
                    if return_codes.contains(&0x80) {
                        warn!(packet_id, "Broker rejected subscription");
                    } else {
                        debug!(packet_id, "Subscription acknowledged");
                    }
                }
                Some(Ok(other)) => {
                    debug!(packet = other.name(), "Ignoring unexpected packet");
                }
                Some(Err(e)) => return Err(self.drop_session(&e.to_string())),
                None => return Err(self.drop_session("broker closed connection")),
            }
        }

        let keep_alive = self.config.keep_alive;
        if let Some(sent_at) = self.ping_sent_at {
            if sent_at.elapsed() > keep_alive {
                return Err(self.drop_session("keep-alive timeout"));
            }
        } else if !keep_alive.is_zero() && self.last_sent.elapsed() >= keep_alive {
            self.send(Packet::PingReq).await?;
            self.ping_sent_at = Some(Instant::now());
        }

        Ok(inbound)
    }

    fn is_connected(&self) -> bool {
        self.framed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn broker() -> (TcpListener, MqttConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, MqttConfig::new("127.0.0.1", port))
    }

    async fn accept(listener: &TcpListener, rc: u8) -> Framed<TcpStream, MqttCodec> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, MqttCodec::new());
        let connect = framed.next().await.unwrap().unwrap();
        assert!(matches!(connect, Packet::Connect { .. }));
        framed
            .send(Packet::ConnAck {
                session_present: false,
                return_code: rc,
            })
            .await
            .unwrap();
        framed
    }

    #[test]
    fn test_config_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert_eq!(config.address(), "127.0.0.1:1883");
    }

    #[tokio::test]
    async fn test_operations_without_connect() {
        let mut session = MqttSession::new(MqttConfig::default());
        assert!(!session.is_connected());
        assert!(matches!(
            session.publish("t", b"x").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            session.service().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_subscribe_and_receive() {
        let (listener, config) = broker().await;
        let server = tokio::spawn(async move {
            let mut framed = accept(&listener, 0).await;
            let subscribe = framed.next().await.unwrap().unwrap();
            let Packet::Subscribe { topics, .. } = subscribe else {
                panic!("expected SUBSCRIBE");
            };
            assert_eq!(topics, vec!["private/dev/add-key".to_string()]);
            framed
                .send(Packet::publish("private/dev/add-key", "00"))
                .await
                .unwrap();
            let published = framed.next().await.unwrap().unwrap();
            assert_eq!(published, Packet::publish("discovery", "dev"));
        });

        let mut session = MqttSession::new(config);
        session.connect("dev").await.unwrap();
        assert!(session.is_connected());
        session.subscribe("private/dev/add-key").await.unwrap();

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(session.service().await.unwrap());
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            received,
            vec![InboundMessage::new("private/dev/add-key", "00")]
        );

        session.publish("discovery", b"dev").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_reports_return_code() {
        let (listener, config) = broker().await;
        tokio::spawn(async move {
            let _framed = accept(&listener, 5).await;
        });

        let mut session = MqttSession::new(config);
        let error = session.connect("dev").await.unwrap_err();
        assert!(matches!(error, TransportError::ConnectionRefused(5)));
        assert_eq!(error.status_code(), 5);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_when_nothing_listens() {
        let (listener, config) = broker().await;
        drop(listener);

        let mut session = MqttSession::new(config);
        let error = session.connect("dev").await.unwrap_err();
        assert!(error.status_code() < 0);
    }

    #[tokio::test]
    async fn test_broker_close_detected_by_service() {
        let (listener, config) = broker().await;
        let server = tokio::spawn(async move {
            let framed = accept(&listener, 0).await;
            drop(framed);
        });

        let mut session = MqttSession::new(config);
        session.connect("dev").await.unwrap();
        server.await.unwrap();

        let mut lost = false;
        for _ in 0..100 {
            if session.service().await.is_err() {
                lost = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(lost);
        assert!(!session.is_connected());
    }
}
