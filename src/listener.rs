//! Blocking UDP listener with cooperative shutdown
//!
//! The listener blocks in `recv_from` until a datagram arrives, the run
//! deadline passes, or a `StopHandle` wakes it with an empty datagram.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Default receive buffer, large enough for one sample line
pub const DEFAULT_RECV_BUFFER: usize = 1024;

/// Stops a running `Listener` from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl StopHandle {
    /// Request shutdown and wake the blocked receive
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let unspecified: SocketAddr = if self.wake_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let waker = UdpSocket::bind(unspecified).and_then(|s| s.send_to(&[], self.wake_addr));
        if let Err(e) = waker {
            warn!(error = %e, "failed to wake listener, it will stop on the next datagram");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// One received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub payload: &'a [u8],
    pub peer: SocketAddr,
    /// The packet did not fit the receive buffer; `payload` is only its head
    pub truncated: bool,
}

/// A bound datagram socket read one packet at a time
#[derive(Debug)]
pub struct Listener {
    socket: UdpSocket,
    buffer: Vec<u8>,
    deadline: Option<Instant>,
    stopped: Arc<AtomicBool>,
}

impl Listener {
    /// Bind `addr`, accepting datagrams of up to `buffer_size` bytes
    pub fn bind<A: ToSocketAddrs>(addr: A, buffer_size: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self {
            socket,
            // One spare byte tells a full-size packet from a cut one
            buffer: vec![0u8; buffer_size.max(1) + 1],
            deadline: None,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stop returning datagrams once `duration` has elapsed from now
    pub fn run_for(mut self, duration: Option<Duration>) -> Self {
        self.deadline = duration.map(|d| Instant::now() + d);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stop_handle(&self) -> io::Result<StopHandle> {
        let mut wake_addr = self.socket.local_addr()?;
        if wake_addr.ip().is_unspecified() {
            let loopback: IpAddr = match wake_addr.ip() {
                IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            };
            wake_addr.set_ip(loopback);
        }
        Ok(StopHandle {
            stopped: Arc::clone(&self.stopped),
            wake_addr,
        })
    }

    /// Block for the next datagram.
    ///
    /// Returns `Ok(None)` once stopped or past the deadline. Datagrams longer
    /// than the buffer come back flagged as truncated.
    pub fn recv(&mut self) -> io::Result<Option<Datagram<'_>>> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(None);
            }

            match self.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!("listener deadline reached");
                        return Ok(None);
                    }
                    self.socket.set_read_timeout(Some(remaining))?;
                }
                None => self.socket.set_read_timeout(None)?,
            }

            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, peer)) => {
                    if self.stopped.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    let truncated = len == self.buffer.len();
                    let len = if truncated { len - 1 } else { len };
                    return Ok(Some(Datagram {
                        payload: &self.buffer[..len],
                        peer,
                        truncated,
                    }));
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                // ICMP port-unreachable from an earlier send surfaces here on some platforms
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    debug!(error = %e, "ignoring connection reset on listener");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_receives_datagram() {
        let mut listener = Listener::bind("127.0.0.1:0", 64).unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"0,2", addr).unwrap();

        let datagram = listener.recv().unwrap().unwrap();
        assert_eq!(datagram.payload, b"0,2");
        assert_eq!(datagram.peer, sender.local_addr().unwrap());
        assert!(!datagram.truncated);
    }

    #[test]
    fn test_oversized_datagram_is_flagged() {
        let mut listener = Listener::bind("127.0.0.1:0", 8).unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"01234567", addr).unwrap();
        sender.send_to(b"0123456789abcdef", addr).unwrap();

        let exact = listener.recv().unwrap().unwrap();
        assert_eq!(exact.payload, b"01234567");
        assert!(!exact.truncated);

        let cut = listener.recv().unwrap().unwrap();
        assert_eq!(cut.payload, b"01234567");
        assert!(cut.truncated);
    }

    #[test]
    fn test_deadline_ends_listening() {
        let mut listener = Listener::bind("127.0.0.1:0", 64)
            .unwrap()
            .run_for(Some(Duration::from_millis(50)));

        let started = Instant::now();
        assert!(listener.recv().unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_stop_handle_wakes_blocked_listener() {
        let mut listener = Listener::bind("127.0.0.1:0", 64).unwrap();
        let handle = listener.stop_handle().unwrap();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.stop();
        });

        assert!(listener.recv().unwrap().is_none());
        stopper.join().unwrap();
    }

    #[test]
    fn test_unspecified_bind_wakes_via_loopback() {
        let listener = Listener::bind("0.0.0.0:0", 64).unwrap();
        let handle = listener.stop_handle().unwrap();
        assert!(handle.wake_addr.ip().is_loopback());
        assert!(!handle.is_stopped());
    }
}
