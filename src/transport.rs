//! Event transport
//!
//! Events travel as one UTF-8 datagram each: `"<channel_id>,<class_id>"`.
//! There is no sequence number, checksum or acknowledgement. Every packet is
//! self-contained, so loss, duplication and reordering only cost a missed or
//! repeated drum hit.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{debug, trace};

use crate::error::{AirdrumError, DecodeError};
use crate::types::{Channel, ClassId, Event};

/// Receive buffer for event datagrams; valid payloads are three bytes
pub const EVENT_RECV_BUFFER: usize = 64;

/// Encode an event as its wire payload
pub fn encode(channel: Channel, class: ClassId) -> Vec<u8> {
    format!("{},{}", channel.id(), class.id()).into_bytes()
}

/// Decode a wire payload. Surrounding whitespace is tolerated.
pub fn decode(payload: &[u8]) -> Result<(Channel, ClassId), DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() != 2 {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let channel_id = parse_id(fields[0])?;
    let class_id = parse_id(fields[1])?;

    let channel = Channel::from_id(channel_id).ok_or(DecodeError::UnknownChannel(channel_id))?;
    let class = ClassId::new(class_id).ok_or(DecodeError::UnknownClass(class_id))?;
    Ok((channel, class))
}

fn parse_id(field: &str) -> Result<u8, DecodeError> {
    let field = field.trim();
    field
        .parse::<u8>()
        .map_err(|_| DecodeError::NotNumeric(field.to_string()))
}

/// Destination for emitted events
pub trait EventSink {
    /// Hand off one event. Implementations must not block on delivery.
    fn send(&mut self, event: &Event) -> Result<(), AirdrumError>;
}

/// Collects events in memory (offline classification and tests)
impl EventSink for Vec<Event> {
    fn send(&mut self, event: &Event) -> Result<(), AirdrumError> {
        self.push(event.clone());
        Ok(())
    }
}

/// Fire-and-forget UDP sender
#[derive(Debug)]
pub struct UdpEventSender {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpEventSender {
    /// Bind an ephemeral local socket that sends to `destination`
    pub fn new<A: ToSocketAddrs>(destination: A) -> Result<Self, AirdrumError> {
        let destination = destination
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| AirdrumError::Config("destination resolved to no address".to_string()))?;

        let local: SocketAddr = if destination.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Send one raw payload
    pub fn send_payload(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, self.destination)
    }
}

impl EventSink for UdpEventSender {
    fn send(&mut self, event: &Event) -> Result<(), AirdrumError> {
        let payload = encode(event.channel, event.class);
        self.send_payload(&payload)?;
        trace!(
            destination = %self.destination,
            payload = %String::from_utf8_lossy(&payload),
            "event sent"
        );
        Ok(())
    }
}

/// Decode one received datagram, logging and discarding anything malformed
pub fn accept_datagram(payload: &[u8], peer: SocketAddr) -> Option<(Channel, ClassId)> {
    match decode(payload) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(
                %peer,
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "dropping malformed event packet"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Listener;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn class(id: u8) -> ClassId {
        ClassId::new(id).unwrap()
    }

    #[test]
    fn test_encode_format() {
        assert_eq!(encode(Channel::Left, class(2)), b"0,2".to_vec());
        assert_eq!(encode(Channel::Right, class(0)), b"1,0".to_vec());
    }

    #[test]
    fn test_decode_encoded() {
        let payload = encode(Channel::Right, class(2));
        assert_eq!(decode(&payload), Ok((Channel::Right, class(2))));
    }

    #[test]
    fn test_decode_tolerates_whitespace() {
        assert_eq!(decode(b" 0,1\n"), Ok((Channel::Left, class(1))));
        assert_eq!(decode(b"1, 2"), Ok((Channel::Right, class(2))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode(b"garbage"), Err(DecodeError::FieldCount(1)));
        assert_eq!(decode(b""), Err(DecodeError::FieldCount(1)));
        assert_eq!(decode(b"0,"), Err(DecodeError::NotNumeric(String::new())));
        assert_eq!(decode(b"0,2,1"), Err(DecodeError::FieldCount(3)));
        assert_eq!(decode(b"a,b"), Err(DecodeError::NotNumeric("a".to_string())));
        assert_eq!(decode(b"-1,0"), Err(DecodeError::NotNumeric("-1".to_string())));
        assert_eq!(decode(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert_eq!(decode(b"2,0"), Err(DecodeError::UnknownChannel(2)));
        assert_eq!(decode(b"0,3"), Err(DecodeError::UnknownClass(3)));
        assert_eq!(decode(b"0,999"), Err(DecodeError::NotNumeric("999".to_string())));
    }

    #[test]
    fn test_accept_datagram_drops_malformed() {
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert_eq!(accept_datagram(b"1,1", peer), Some((Channel::Right, class(1))));
        assert_eq!(accept_datagram(b"1;1", peer), None);
    }

    #[test]
    fn test_udp_send_over_loopback() {
        let mut listener = Listener::bind("127.0.0.1:0", EVENT_RECV_BUFFER).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut sender = UdpEventSender::new(addr).unwrap();
        let event = Event::new(Channel::Left, class(2), 1.0, Utc::now());
        sender.send(&event).unwrap();

        let datagram = listener.recv().unwrap().unwrap();
        assert_eq!(decode(datagram.payload), Ok((Channel::Left, class(2))));
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<Event> = Vec::new();
        let event = Event::new(Channel::Right, class(0), 0.6, Utc::now());
        sink.send(&event).unwrap();
        assert_eq!(sink, vec![event]);
    }
}
