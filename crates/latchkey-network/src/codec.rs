//! Tokio codec for the MQTT 3.1.1 subset used by the endpoint.
//!
//! Only QoS 0 is produced. Inbound PUBLISH packets with a higher QoS are
//! accepted (their packet identifier is skipped) so a misconfigured broker
//! cannot wedge the session.
//!
//! ```text
//! fixed header   : type(4) | flags(4), remaining length (1-4 bytes, base 128)
//! variable header: packet specific
//! payload        : packet specific
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use latchkey_network::codec::{MqttCodec, Packet};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), latchkey_network::TransportError> {
//! let stream = TcpStream::connect("127.0.0.1:1883").await?;
//! let mut framed = Framed::new(stream, MqttCodec::new());
//!
//! framed.send(Packet::connect("esp-device-1", 60)).await?;
//! if let Some(Ok(Packet::ConnAck { return_code, .. })) = framed.next().await {
//!     println!("CONNACK rc={return_code}");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;

/// Largest packet accepted from the broker.
///
/// A full 256-key sync payload is about 8.7 KB; anything far beyond that is
/// not meant for this device.
const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

/// Largest value the remaining-length field can encode.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;
const CLEAN_SESSION: u8 = 0x02;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

/// An MQTT control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_id: String,
        keep_alive: u16,
        clean_session: bool,
    },
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        topic: String,
        payload: Bytes,
    },
    Subscribe {
        packet_id: u16,
        topics: Vec<String>,
    },
    SubAck {
        packet_id: u16,
        return_codes: Vec<u8>,
    },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// CONNECT with a clean session.
    pub fn connect(client_id: impl Into<String>, keep_alive: u16) -> Self {
        Self::Connect {
            client_id: client_id.into(),
            keep_alive,
            clean_session: true,
        }
    }

    /// QoS 0 PUBLISH.
    pub fn publish(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::Publish {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Packet type name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT",
            Self::ConnAck { .. } => "CONNACK",
            Self::Publish { .. } => "PUBLISH",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::SubAck { .. } => "SUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

/// Tokio codec for MQTT packets.
#[derive(Debug)]
pub struct MqttCodec {
    max_packet_size: usize,
}

impl MqttCodec {
    /// Create a new codec with the default maximum packet size (64 KB).
    pub fn new() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Create a new codec with a custom maximum packet size.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl Default for MqttCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn codec_error(message: impl Into<String>) -> TransportError {
    TransportError::Codec(message.into())
}

/// Parse the remaining-length field starting at `src[1]`.
///
/// Returns `Ok(None)` if more bytes are needed, otherwise the length and the
/// number of bytes the field occupied.
fn read_remaining_length(src: &[u8]) -> Result<Option<(usize, usize)>, TransportError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;

    for (i, byte) in src.iter().skip(1).take(4).enumerate() {
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }

    if src.len() >= 5 {
        return Err(codec_error("remaining length exceeds four bytes"));
    }
    Ok(None)
}

fn write_remaining_length(mut len: usize, dst: &mut BytesMut) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if len == 0 {
            break;
        }
    }
}

fn read_u16(body: &mut Bytes) -> Result<u16, TransportError> {
    if body.remaining() < 2 {
        return Err(codec_error("truncated packet"));
    }
    Ok(body.get_u16())
}

fn read_string(body: &mut Bytes) -> Result<String, TransportError> {
    let len = usize::from(read_u16(body)?);
    if body.remaining() < len {
        return Err(codec_error("string runs past end of packet"));
    }
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| codec_error("string is not valid UTF-8"))
}

fn put_string(value: &str, dst: &mut BytesMut) -> Result<(), TransportError> {
    let len = u16::try_from(value.len()).map_err(|_| codec_error("string longer than 65535 bytes"))?;
    dst.put_u16(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn decode_body(header: u8, mut body: Bytes) -> Result<Packet, TransportError> {
    let packet_type = header >> 4;
    let flags = header & 0x0F;

    let packet = match packet_type {
        CONNECT => {
            let protocol = read_string(&mut body)?;
            if protocol != PROTOCOL_NAME || body.remaining() < 4 {
                return Err(codec_error("unsupported protocol"));
            }
            let _level = body.get_u8();
            let connect_flags = body.get_u8();
            let keep_alive = body.get_u16();
            let client_id = read_string(&mut body)?;
            Packet::Connect {
                client_id,
                keep_alive,
                clean_session: connect_flags & CLEAN_SESSION != 0,
            }
        }
        CONNACK => {
            if body.remaining() != 2 {
                return Err(codec_error("CONNACK must be 2 bytes"));
            }
            Packet::ConnAck {
                session_present: body.get_u8() & 0x01 != 0,
                return_code: body.get_u8(),
            }
        }
        PUBLISH => {
            let topic = read_string(&mut body)?;
            let qos = (flags >> 1) & 0x03;
            if qos > 0 {
                read_u16(&mut body)?;
            }
            Packet::Publish {
                topic,
                payload: body,
            }
        }
        SUBSCRIBE => {
            let packet_id = read_u16(&mut body)?;
            let mut topics = Vec::new();
            while body.has_remaining() {
                topics.push(read_string(&mut body)?);
                if !body.has_remaining() {
                    return Err(codec_error("missing requested QoS"));
                }
                body.advance(1);
            }
            Packet::Subscribe { packet_id, topics }
        }
        SUBACK => {
            let packet_id = read_u16(&mut body)?;
            Packet::SubAck {
                packet_id,
                return_codes: body.to_vec(),
            }
        }
        PINGREQ => Packet::PingReq,
        PINGRESP => Packet::PingResp,
        DISCONNECT => Packet::Disconnect,
        other => return Err(codec_error(format!("unsupported packet type {other}"))),
    };

    Ok(packet)
}

impl Decoder for MqttCodec {
    type Item = Packet;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, TransportError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let Some((remaining, length_bytes)) = read_remaining_length(src)? else {
            return Ok(None);
        };

        let total = 1 + length_bytes + remaining;
        if total > self.max_packet_size {
            return Err(codec_error(format!(
                "packet of {total} bytes exceeds limit of {}",
                self.max_packet_size
            )));
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        let header = frame[0];
        frame.advance(1 + length_bytes);
        decode_body(header, frame.freeze()).map(Some)
    }
}

impl Encoder<Packet> for MqttCodec {
    type Error = TransportError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), TransportError> {
        let mut body = BytesMut::new();

        let header = match &packet {
            Packet::Connect {
                client_id,
                keep_alive,
                clean_session,
            } => {
                put_string(PROTOCOL_NAME, &mut body)?;
                body.put_u8(PROTOCOL_LEVEL);
                body.put_u8(if *clean_session { CLEAN_SESSION } else { 0 });
                body.put_u16(*keep_alive);
                put_string(client_id, &mut body)?;
                CONNECT << 4
            }
            Packet::ConnAck {
                session_present,
                return_code,
            } => {
                body.put_u8(u8::from(*session_present));
                body.put_u8(*return_code);
                CONNACK << 4
            }
            Packet::Publish { topic, payload } => {
                put_string(topic, &mut body)?;
                body.put_slice(payload);
                PUBLISH << 4
            }
            Packet::Subscribe { packet_id, topics } => {
                body.put_u16(*packet_id);
                for topic in topics {
                    put_string(topic, &mut body)?;
                    body.put_u8(0);
                }
                // SUBSCRIBE carries reserved flags 0b0010
                (SUBSCRIBE << 4) | 0x02
            }
            Packet::SubAck {
                packet_id,
                return_codes,
            } => {
                body.put_u16(*packet_id);
                body.put_slice(return_codes);
                SUBACK << 4
            }
            Packet::PingReq => PINGREQ << 4,
            Packet::PingResp => PINGRESP << 4,
            Packet::Disconnect => DISCONNECT << 4,
        };

        if body.len() > MAX_REMAINING_LENGTH {
            return Err(codec_error("packet too large to encode"));
        }

        dst.reserve(body.len() + 5);
        dst.put_u8(header);
        write_remaining_length(body.len(), dst);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
