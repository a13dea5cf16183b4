//! Per-connection byte-stream engine.
//!
//! A [`ByteStream`] owns one non-blocking socket plus its send and receive
//! queues and optional per-direction RC4 state. Every operation is a single
//! non-blocking pass: "would block" ends the pass quietly and anything else
//! is reported to the caller, which decides whether the connection dies.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use netmux_framing::{decode_frame, encode_header, FrameStatus, FramingError, HeaderMode, Rc4};

/// Largest message a raw (mode 13) connection delivers at once.
pub const RAW_CHUNK: usize = 0x4000;

/// Lifecycle of a [`ByteStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Connecting,
    Established,
}

/// What one receive pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecvOutcome {
    /// Bytes appended to the receive queue.
    pub bytes: usize,
    /// The peer closed its side.
    pub closed: bool,
}

#[derive(Debug)]
pub struct ByteStream {
    socket: Option<TcpStream>,
    state: StreamState,
    mode: HeaderMode,
    last_error: u32,
    send_queue: BytesMut,
    recv_queue: BytesMut,
    send_cipher: Option<Rc4>,
    recv_cipher: Option<Rc4>,
}

impl ByteStream {
    pub fn new(mode: HeaderMode) -> Self {
        Self {
            socket: None,
            state: StreamState::Closed,
            mode,
            last_error: 0,
            send_queue: BytesMut::new(),
            recv_queue: BytesMut::new(),
            send_cipher: None,
            recv_cipher: None,
        }
    }

    /// Starts a non-blocking connect. The stream is `Connecting` until
    /// [`try_connect`](Self::try_connect) sees the outcome.
    pub fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.close();
        let socket = match TcpStream::connect(addr) {
            Ok(socket) => socket,
            Err(err) => {
                self.record(&err);
                return Err(err);
            }
        };
        self.socket = Some(socket);
        self.state = StreamState::Connecting;
        Ok(())
    }

    /// Adopts a socket that is already connected.
    pub fn assign(&mut self, socket: TcpStream) {
        self.close();
        self.socket = Some(socket);
        self.state = StreamState::Established;
    }

    /// Releases the socket and resets queues and ciphers.
    ///
    /// Queue allocations are kept for reuse.
    pub fn close(&mut self) {
        self.socket = None;
        self.state = StreamState::Closed;
        self.send_queue.clear();
        self.recv_queue.clear();
        self.send_cipher = None;
        self.recv_cipher = None;
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    /// Raw OS error of the last failed socket call, 0 if none.
    pub fn last_error(&self) -> u32 {
        self.last_error
    }

    pub fn socket(&self) -> Option<&TcpStream> {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> Option<&mut TcpStream> {
        self.socket.as_mut()
    }

    /// Bytes queued but not yet written.
    pub fn pending(&self) -> usize {
        self.send_queue.len()
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.recv_queue.len()
    }

    /// Keys the send direction. An empty key removes the cipher.
    pub fn set_send_key(&mut self, key: &[u8]) -> Result<(), FramingError> {
        self.send_cipher = keyed(key)?;
        Ok(())
    }

    /// Keys the receive direction. An empty key removes the cipher.
    pub fn set_recv_key(&mut self, key: &[u8]) -> Result<(), FramingError> {
        self.recv_cipher = keyed(key)?;
        Ok(())
    }

    fn record(&mut self, err: &io::Error) {
        self.last_error = err.raw_os_error().map_or(0, |code| code as u32);
    }

    /// Checks an in-progress connect. `Ok(true)` once established.
    pub fn try_connect(&mut self) -> io::Result<bool> {
        match self.state {
            StreamState::Established => return Ok(true),
            StreamState::Closed => return Err(io::ErrorKind::NotConnected.into()),
            StreamState::Connecting => {}
        }
        let Some(socket) = self.socket.as_ref() else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        let outcome = match socket.take_error() {
            Ok(Some(err)) | Err(err) => Err(err),
            Ok(None) => match socket.peer_addr() {
                Ok(_) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(false),
                Err(err) => Err(err),
            },
        };
        match outcome {
            Ok(true) => {
                self.state = StreamState::Established;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.record(&err);
                Err(err)
            }
        }
    }

    /// Writes as much of the send queue as the socket takes.
    ///
    /// Returns the number of bytes written.
    pub fn try_send(&mut self) -> io::Result<usize> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(0);
        };
        let mut written = 0;
        while !self.send_queue.is_empty() {
            match socket.write(&self.send_queue) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.send_queue.advance(n);
                    written += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.last_error = e.raw_os_error().map_or(0, |code| code as u32);
                    return Err(e);
                }
            }
        }
        Ok(written)
    }

    /// Reads into `buf`, decrypts, and appends to the receive queue.
    ///
    /// A read shorter than `buf` ends the pass unless `drain` is set, in
    /// which case reading continues until the socket would block or reports
    /// end of stream.
    pub fn try_recv(&mut self, buf: &mut [u8], drain: bool) -> io::Result<RecvOutcome> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        let mut outcome = RecvOutcome::default();
        loop {
            match socket.read(buf) {
                Ok(0) => {
                    outcome.closed = true;
                    break;
                }
                Ok(n) => {
                    let chunk = &mut buf[..n];
                    if let Some(cipher) = self.recv_cipher.as_mut() {
                        cipher.apply(chunk);
                    }
                    self.recv_queue.extend_from_slice(chunk);
                    outcome.bytes += n;
                    if n < buf.len() && !drain {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.last_error = e.raw_os_error().map_or(0, |code| code as u32);
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Frames `fragments` as one message and queues it.
    ///
    /// The header and payload are encrypted when a send key is installed.
    /// Returns the payload length.
    pub fn send_vector(&mut self, fragments: &[&[u8]], mask: u8) -> Result<usize, FramingError> {
        let size: usize = fragments.iter().map(|f| f.len()).sum();
        let mut header = encode_header(self.mode, size, mask)?;

        self.send_queue.reserve(header.len() + size);
        if let Some(cipher) = self.send_cipher.as_mut() {
            cipher.apply(header.as_mut_slice());
        }
        self.send_queue.extend_from_slice(header.as_slice());

        for fragment in fragments {
            let start = self.send_queue.len();
            self.send_queue.extend_from_slice(fragment);
            if let Some(cipher) = self.send_cipher.as_mut() {
                cipher.apply(&mut self.send_queue[start..]);
            }
        }
        Ok(size)
    }

    /// Inspects the frame at the front of the receive queue without consuming it.
    pub fn peek_frame(&self, max_size: usize) -> Result<FrameStatus, FramingError> {
        decode_frame(self.mode, &self.recv_queue, RAW_CHUNK, max_size)
    }

    /// Moves the next `total` received bytes into `out`.
    pub fn read_frame(&mut self, total: usize, out: &mut [u8]) {
        self.recv_queue.copy_to_slice(&mut out[..total]);
    }
}

fn keyed(key: &[u8]) -> Result<Option<Rc4>, FramingError> {
    if key.is_empty() {
        return Ok(None);
    }
    Rc4::new(key).map(Some)
}
