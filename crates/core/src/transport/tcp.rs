//! Control connection: a locked write half for requests and a receive
//! loop that decodes one reply per read.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::protocol::RtspReply;

/// Default size of a single control read. One read carries one reply.
pub const DEFAULT_CONTROL_BUFFER: usize = 1024;

/// What the receive loop should do after a reply has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// Close both directions of the connection and exit.
    Close,
}

/// Write half of the control connection.
///
/// Requests are written as-is with no retry; a failed write is returned
/// to the caller. The matching read half is a [`ControlReceiver`], which
/// must be started once per connection.
pub struct ControlChannel {
    writer: Mutex<TcpStream>,
    peer_addr: SocketAddr,
    closed: Arc<AtomicBool>,
}

impl ControlChannel {
    /// Connect to the server.
    ///
    /// Every failure, including address resolution, is reported as
    /// [`RtspError::ConnectionFailed`].
    pub fn connect(
        addr: &str,
        timeout: Option<Duration>,
        buffer_size: usize,
    ) -> Result<(ControlChannel, ControlReceiver)> {
        let failed = |source| RtspError::ConnectionFailed {
            addr: addr.to_string(),
            source,
        };

        let stream = match timeout {
            None => TcpStream::connect(addr).map_err(failed)?,
            Some(timeout) => {
                let mut last_err = std::io::Error::new(ErrorKind::NotFound, "no address resolved");
                let mut connected = None;
                for candidate in addr.to_socket_addrs().map_err(failed)? {
                    match TcpStream::connect_timeout(&candidate, timeout) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(e) => last_err = e,
                    }
                }
                connected.ok_or_else(|| failed(last_err))?
            }
        };

        let peer_addr = stream.peer_addr().map_err(failed)?;
        let reader = stream.try_clone().map_err(failed)?;
        let closed = Arc::new(AtomicBool::new(false));

        tracing::info!(%peer_addr, "connected to RTSP server");

        let channel = ControlChannel {
            writer: Mutex::new(stream),
            peer_addr,
            closed: closed.clone(),
        };
        let receiver = ControlReceiver {
            stream: reader,
            peer_addr,
            closed,
            buffer_size: buffer_size.max(1),
        };
        Ok((channel, receiver))
    }

    /// Write one encoded request.
    pub fn send(&self, request: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(request)?;
        writer.flush()?;
        tracing::debug!(
            peer = %self.peer_addr,
            request = %String::from_utf8_lossy(request),
            "sent RTSP request"
        );
        Ok(())
    }

    /// Shut down both directions. Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.writer.lock().shutdown(Shutdown::Both);
            tracing::debug!(peer = %self.peer_addr, "control connection closed");
        }
    }

    /// Whether the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Shut the write direction without marking the channel closed, so the
    /// next `send` fails at the socket.
    #[cfg(test)]
    pub(crate) fn shutdown_write(&self) -> std::io::Result<()> {
        self.writer.lock().shutdown(Shutdown::Write)
    }
}

/// Read half of the control connection.
pub struct ControlReceiver {
    stream: TcpStream,
    peer_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    buffer_size: usize,
}

impl ControlReceiver {
    /// Run the receive loop on a dedicated thread.
    pub fn spawn<F>(self, on_reply: F) -> Result<JoinHandle<Result<()>>>
    where
        F: FnMut(RtspReply) -> LoopControl + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("rtsp-control".to_string())
            .spawn(move || self.run(on_reply))?;
        Ok(handle)
    }

    /// Blocking receive loop.
    ///
    /// Every non-empty read is decoded as one reply and handed to
    /// `on_reply`. Malformed replies are logged and dropped. Returns `Ok`
    /// when `on_reply` asks to close or the connection was closed locally,
    /// and [`RtspError::Transport`] on a read error or a remote close.
    pub fn run<F>(mut self, mut on_reply: F) -> Result<()>
    where
        F: FnMut(RtspReply) -> LoopControl,
    {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => {
                    if self.closed.swap(true, Ordering::SeqCst) {
                        return Ok(());
                    }
                    tracing::warn!(peer = %self.peer_addr, "server closed the control connection");
                    return Err(RtspError::Transport(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "control connection closed by server",
                    )));
                }
                Ok(n) => n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.closed.swap(true, Ordering::SeqCst) {
                        return Ok(());
                    }
                    tracing::warn!(peer = %self.peer_addr, error = %e, "control read failed");
                    return Err(e.into());
                }
            };

            tracing::debug!(
                peer = %self.peer_addr,
                reply = %String::from_utf8_lossy(&buf[..n]),
                "received RTSP reply"
            );

            match RtspReply::decode(&buf[..n]) {
                Ok(reply) => {
                    if on_reply(reply) == LoopControl::Close {
                        self.closed.store(true, Ordering::SeqCst);
                        let _ = self.stream.shutdown(Shutdown::Both);
                        tracing::info!(peer = %self.peer_addr, "control loop finished");
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "dropping malformed reply");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn connect_to_closed_port_fails() {
        let (listener, addr) = listener();
        drop(listener);
        let err = ControlChannel::connect(&addr, Some(Duration::from_secs(1)), 1024)
            .err()
            .unwrap();
        assert!(matches!(err, RtspError::ConnectionFailed { .. }));
    }

    #[test]
    fn replies_are_forwarded_and_malformed_ones_dropped() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"PLAY x RTSP/1.0\nCSeq: 1\nSession: 7");
            stream.write_all(b"garbage").unwrap();
            thread::sleep(Duration::from_millis(50));
            stream
                .write_all(RtspReply::ok(1, 7).serialize().as_bytes())
                .unwrap();
            // Wait for the client to close.
            let n = stream.read(&mut buf).unwrap_or(0);
            assert_eq!(n, 0);
        });

        let (channel, receiver) = ControlChannel::connect(&addr, None, 1024).unwrap();
        let (tx, rx) = mpsc::channel();
        let handle = receiver
            .spawn(move |reply| {
                tx.send(reply).unwrap();
                LoopControl::Close
            })
            .unwrap();

        channel
            .send(b"PLAY x RTSP/1.0\nCSeq: 1\nSession: 7")
            .unwrap();

        let reply = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(reply, RtspReply::ok(1, 7));
        assert!(handle.join().unwrap().is_ok());
        assert!(channel.is_closed());
        server.join().unwrap();
    }

    #[test]
    fn remote_close_is_a_transport_error() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let (channel, receiver) = ControlChannel::connect(&addr, None, 1024).unwrap();
        let result = receiver.run(|_| LoopControl::Continue);
        assert!(matches!(result, Err(RtspError::Transport(_))));
        assert!(channel.is_closed());
        server.join().unwrap();
    }

    #[test]
    fn local_close_ends_loop_cleanly() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let _ = stream.read(&mut buf);
        });

        let (channel, receiver) = ControlChannel::connect(&addr, None, 1024).unwrap();
        let handle = receiver.spawn(|_| LoopControl::Continue).unwrap();
        thread::sleep(Duration::from_millis(50));
        channel.close();
        channel.close();
        assert!(handle.join().unwrap().is_ok());
        assert!(channel.send(b"PLAY").is_err());
        server.join().unwrap();
    }
}
