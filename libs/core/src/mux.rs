//! The event multiplexer.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};
use netmux_events::{encode_addr, Event, EventKind, EventQueue, LeaveCode, LeaveInfo, RecordHeader};
use netmux_framing::{FrameStatus, HeaderMode};
use netmux_id::{Handle, HandleTable, Iter, MAX_LIVE_HANDLES};
use netmux_networking as sockopt;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{debug, info, warn};

use crate::idle::IdleList;
use crate::scratch::{Scratch, ScratchView};
use crate::stream::{ByteStream, StreamState};
use crate::{ConnectionKind, CoreConfig, CoreError, CoreStats, Firewall, SocketOption};

/// Socket behind a table entry.
#[derive(Debug)]
enum Io {
    Listener(TcpListener),
    Stream(ByteStream),
}

/// One table entry.
#[derive(Debug)]
pub(crate) struct Connection {
    io: Io,
    kind: ConnectionKind,
    mode: HeaderMode,
    tag: i32,
    interest: Interest,
    max_message_size: usize,
    send_limit: usize,
    scratch: ScratchView,
}

impl Connection {
    fn stream(&self) -> Option<&ByteStream> {
        match &self.io {
            Io::Stream(stream) => Some(stream),
            Io::Listener(_) => None,
        }
    }

    fn stream_mut(&mut self) -> Option<&mut ByteStream> {
        match &mut self.io {
            Io::Stream(stream) => Some(stream),
            Io::Listener(_) => None,
        }
    }

    fn source(&mut self) -> Option<&mut dyn Source> {
        match &mut self.io {
            Io::Listener(listener) => Some(listener as &mut dyn Source),
            Io::Stream(stream) => stream.socket_mut().map(|s| s as &mut dyn Source),
        }
    }

    fn sock_ref(&self) -> Option<SockRef<'_>> {
        match &self.io {
            Io::Listener(listener) => Some(SockRef::from(listener)),
            Io::Stream(stream) => stream.socket().map(SockRef::from),
        }
    }

    fn last_error(&self) -> u32 {
        self.stream().map_or(0, ByteStream::last_error)
    }

    /// Interest this connection should be registered with right now.
    fn wanted_interest(&self) -> Interest {
        match self.stream() {
            None => Interest::READABLE,
            Some(stream) if stream.state() == StreamState::Connecting => Interest::WRITABLE,
            Some(stream) if stream.pending() > 0 => Interest::READABLE | Interest::WRITABLE,
            Some(_) => Interest::READABLE,
        }
    }
}

/// Readiness reported for one token during a poll.
#[derive(Debug, Clone, Copy)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
    error: bool,
    read_closed: bool,
}

fn token(handle: Handle) -> Token {
    Token(handle.raw() as usize)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Single-threaded multiplexer over many non-blocking TCP connections.
///
/// All work happens inside [`process`](Core::process); everything it
/// observes is queued as [`Event`]s that the caller drains afterwards.
pub struct Core {
    poll: Poll,
    events: Events,
    ready: Vec<Ready>,
    table: HandleTable<Connection>,
    idle: IdleList,
    queue: EventQueue,
    scratch: Scratch,
    config: CoreConfig,
    firewall: Option<Box<dyn Firewall>>,
    now: Instant,
    last_sec: u64,
    stats: CoreStats,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("connections", &self.table.len())
            .field("queued_events", &self.queue.len())
            .field("scratch_capacity", &self.scratch.capacity())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Core {
    /// Creates a core with its own poller.
    pub fn new(config: CoreConfig) -> Result<Self, CoreError> {
        let poll = Poll::new()?;
        Ok(Self {
            poll,
            events: Events::with_capacity(config.event_capacity.max(1)),
            ready: Vec::new(),
            table: HandleTable::new(),
            idle: IdleList::new(),
            queue: EventQueue::new(),
            scratch: Scratch::new(config.scratch_capacity),
            config,
            firewall: None,
            now: Instant::now(),
            last_sec: unix_seconds(),
            stats: CoreStats::default(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Connection creation
    // ------------------------------------------------------------------

    /// Binds a listener. Accepted connections inherit `mode`.
    ///
    /// Emits NEW(handle, -1, bound address).
    pub fn new_listener(&mut self, addr: SocketAddr, mode: HeaderMode) -> Result<Handle, CoreError> {
        let bind_err = |source| CoreError::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        if addr.is_ipv6() {
            socket.set_only_v6(true).map_err(bind_err)?;
        }
        #[cfg(not(windows))]
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(self.config.backlog).map_err(bind_err)?;

        let listener = TcpListener::from_std(socket.into());
        let bound = listener.local_addr().map_err(bind_err)?;
        let kind = if bound.is_ipv6() {
            ConnectionKind::ListenerV6
        } else {
            ConnectionKind::ListenerV4
        };

        let handle = self.insert(Io::Listener(listener), kind, mode)?;
        self.queue
            .push(EventKind::New, handle.into(), -1, &encode_addr(&bound));
        info!(handle = %handle, bind_addr = %bound, mode = %mode, "Listener bound");
        Ok(handle)
    }

    /// Starts an outbound connection.
    ///
    /// Emits NEW(handle, 0, target address) now and ESTAB once connected.
    pub fn new_connect(&mut self, addr: SocketAddr, mode: HeaderMode) -> Result<Handle, CoreError> {
        let mut stream = ByteStream::new(mode);
        stream
            .connect(addr)
            .map_err(|source| CoreError::Connect { addr, source })?;

        let handle = self.insert(Io::Stream(stream), ConnectionKind::Outbound, mode)?;
        self.now = Instant::now();
        self.idle.touch(handle, self.now);
        self.queue
            .push(EventKind::New, handle.into(), 0, &encode_addr(&addr));
        debug!(handle = %handle, remote_addr = %addr, "Connecting");
        Ok(handle)
    }

    /// Adopts an already connected socket, for example one produced by a
    /// finished proxy traversal.
    ///
    /// Emits NEW(handle, 0, peer address) followed by ESTAB.
    pub fn new_assign(&mut self, socket: TcpStream, mode: HeaderMode) -> Result<Handle, CoreError> {
        let peer = socket.peer_addr()?;
        let mut stream = ByteStream::new(mode);
        stream.assign(socket);

        let handle = self.insert(Io::Stream(stream), ConnectionKind::Outbound, mode)?;
        self.now = Instant::now();
        self.idle.touch(handle, self.now);
        let tag = self.table.get(handle).map_or(-1, |conn| conn.tag);
        self.queue
            .push(EventKind::New, handle.into(), 0, &encode_addr(&peer));
        self.queue.push(EventKind::Estab, handle.into(), tag, &[]);
        debug!(handle = %handle, peer_addr = %peer, "Socket assigned");
        Ok(handle)
    }

    /// Allocates a handle for `io` and registers it with the poller.
    fn insert(&mut self, io: Io, kind: ConnectionKind, mode: HeaderMode) -> Result<Handle, CoreError> {
        let connection = Connection {
            io,
            kind,
            mode,
            tag: -1,
            interest: Interest::READABLE,
            max_message_size: self.config.max_message_size,
            send_limit: self.config.send_limit,
            scratch: self.scratch.view(),
        };
        let handle = self.table.insert(connection)?;

        let registry = self.poll.registry();
        let registered = match self.table.get_mut(handle) {
            Some(conn) => {
                let interest = conn.wanted_interest();
                conn.interest = interest;
                match conn.source() {
                    Some(source) => registry.register(source, token(handle), interest),
                    None => Err(io::ErrorKind::NotConnected.into()),
                }
            }
            None => Err(io::ErrorKind::NotFound.into()),
        };
        if let Err(err) = registered {
            self.table.remove(handle);
            return Err(err.into());
        }
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Waits up to `timeout` for readiness, then services every ready
    /// connection and, once per wall-clock second, the idle sweep.
    pub fn process(&mut self, timeout: Duration) -> Result<(), CoreError> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
        self.now = Instant::now();

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        ready.extend(self.events.iter().map(|event| Ready {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            read_closed: event.is_read_closed(),
        }));

        for event in &ready {
            self.dispatch(*event);
        }
        self.ready = ready;

        let sec = unix_seconds();
        if sec != self.last_sec && self.config.idle_timeout.is_some() {
            self.last_sec = sec;
            self.sweep_idle(self.now);
        }
        Ok(())
    }

    fn dispatch(&mut self, ready: Ready) {
        let Ok(handle) = Handle::from_raw(ready.token.0 as u32) else {
            return;
        };
        let Some(conn) = self.table.get(handle) else {
            // Closed earlier in this pass; its slot may even be reused.
            return;
        };

        if conn.kind.is_listener() {
            if ready.readable || ready.error {
                self.accept_all(handle);
            }
            return;
        }

        let connecting = conn
            .stream()
            .is_some_and(|s| s.state() == StreamState::Connecting);

        let mut fault = None;
        if connecting && (ready.writable || ready.error) {
            fault = self.on_connect(handle);
        }
        if fault.is_none() && (ready.readable || ready.error || ready.read_closed) {
            fault = self.on_readable(handle, ready.read_closed || ready.error);
        }
        if fault.is_none() && ready.writable {
            fault = self.on_writable(handle);
        }
        if fault.is_none() {
            let closed = self
                .table
                .get(handle)
                .and_then(Connection::stream)
                .is_some_and(|s| s.state() == StreamState::Closed);
            if closed {
                fault = Some(LeaveCode::Closed);
            }
        }

        if let Some(code) = fault {
            self.close_connection(handle, code.code());
        } else {
            self.refresh_interest(handle);
        }
    }

    fn accept_all(&mut self, listener: Handle) {
        loop {
            let accepted = match self.table.get(listener).map(|c| &c.io) {
                Some(Io::Listener(l)) => l.accept(),
                _ => return,
            };
            match accepted {
                Ok((socket, peer)) => self.admit(listener, socket, peer),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(listener = %listener, error = %err, "Accept error");
                    return;
                }
            }
        }
    }

    fn admit(&mut self, listener: Handle, socket: TcpStream, peer: SocketAddr) {
        let capacity = self.config.max_connections.min(MAX_LIVE_HANDLES);
        if self.table.len() >= capacity {
            self.stats.rejected += 1;
            warn!(peer_addr = %peer, capacity, "Connection rejected: handle table full");
            return;
        }
        if let Some(firewall) = self.firewall.as_mut() {
            if !firewall.allow(&peer, listener) {
                self.stats.rejected += 1;
                debug!(listener = %listener, peer_addr = %peer, "Connection rejected by firewall");
                return;
            }
        }

        let Some(mode) = self.table.get(listener).map(|c| c.mode) else {
            return;
        };
        let mut stream = ByteStream::new(mode);
        stream.assign(socket);

        match self.insert(Io::Stream(stream), ConnectionKind::Inbound, mode) {
            Ok(handle) => {
                self.idle.touch(handle, self.now);
                self.queue
                    .push(EventKind::New, handle.into(), listener.into(), &encode_addr(&peer));
                self.stats.accepted += 1;
                debug!(handle = %handle, listener = %listener, peer_addr = %peer, "Connection accepted");
            }
            Err(err) => {
                self.stats.rejected += 1;
                warn!(peer_addr = %peer, error = %err, "Failed to admit connection");
            }
        }
    }

    fn on_connect(&mut self, handle: Handle) -> Option<LeaveCode> {
        let conn = self.table.get_mut(handle)?;
        let tag = conn.tag;
        let stream = conn.stream_mut()?;
        match stream.try_connect() {
            Ok(true) => {
                self.queue.push(EventKind::Estab, handle.into(), tag, &[]);
                self.idle.touch(handle, self.now);
                debug!(handle = %handle, "Connection established");
                None
            }
            Ok(false) => None,
            Err(err) => {
                debug!(handle = %handle, error = %err, "Connect failed");
                Some(LeaveCode::SendFailed)
            }
        }
    }

    fn on_readable(&mut self, handle: Handle, drain: bool) -> Option<LeaveCode> {
        let conn = self.table.get_mut(handle)?;
        let capacity = conn.scratch.capacity.min(self.scratch.capacity());
        let stream = conn.stream_mut()?;
        if stream.state() != StreamState::Established {
            return None;
        }

        let outcome = match stream.try_recv(&mut self.scratch.as_mut_slice()[..capacity], drain) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(handle = %handle, error = %err, "Receive failed");
                return Some(LeaveCode::RecvFailed);
            }
        };
        if outcome.bytes > 0 {
            self.stats.bytes_in += outcome.bytes as u64;
            self.idle.touch(handle, self.now);
        }

        if let Some(code) = self.deliver_frames(handle) {
            return Some(code);
        }
        if outcome.closed {
            debug!(handle = %handle, "Peer closed connection");
            return Some(LeaveCode::RecvFailed);
        }
        None
    }

    /// Emits a DATA event for every complete frame buffered on `handle`.
    fn deliver_frames(&mut self, handle: Handle) -> Option<LeaveCode> {
        loop {
            let conn = self.table.get(handle)?;
            let stream = conn.stream()?;
            let (total, header) = match stream.peek_frame(conn.max_message_size) {
                Ok(FrameStatus::Incomplete) => return None,
                Ok(FrameStatus::Ready { total, header, .. }) => (total, header),
                Err(err) => {
                    debug!(handle = %handle, error = %err, "Framing violation");
                    return Some(LeaveCode::ProtocolViolation);
                }
            };

            if total > self.scratch.capacity() {
                if let Err(err) = self.grow_scratch(total) {
                    warn!(handle = %handle, needed = total, error = %err, "Scratch buffer growth failed");
                    return Some(LeaveCode::ScratchGrowth);
                }
            }

            let conn = self.table.get_mut(handle)?;
            let tag = conn.tag;
            let stream = conn.stream_mut()?;
            let frame = &mut self.scratch.as_mut_slice()[..total];
            stream.read_frame(total, frame);
            self.queue
                .push(EventKind::Data, handle.into(), tag, &frame[header..]);
            self.stats.messages_in += 1;
        }
    }

    /// Grows the shared scratch buffer and repoints every connection at it.
    fn grow_scratch(&mut self, needed: usize) -> Result<(), std::collections::TryReserveError> {
        if self.scratch.grow_to(needed)? {
            let view = self.scratch.view();
            for conn in self.table.values_mut() {
                conn.scratch = view;
            }
            self.stats.scratch_growths += 1;
            debug!(capacity = view.capacity, generation = view.generation, "Scratch buffer grown");
        }
        Ok(())
    }

    fn on_writable(&mut self, handle: Handle) -> Option<LeaveCode> {
        let conn = self.table.get_mut(handle)?;
        let stream = conn.stream_mut()?;
        if stream.state() != StreamState::Established || stream.pending() == 0 {
            return None;
        }
        match stream.try_send() {
            Ok(0) => None,
            Ok(n) => {
                self.stats.bytes_out += n as u64;
                self.idle.touch(handle, self.now);
                None
            }
            Err(err) => {
                debug!(handle = %handle, error = %err, "Send failed");
                Some(LeaveCode::SendFailed)
            }
        }
    }

    /// Re-registers `handle` if its wanted interest changed.
    fn refresh_interest(&mut self, handle: Handle) {
        let registry: &Registry = self.poll.registry();
        let Some(conn) = self.table.get_mut(handle) else {
            return;
        };
        let wanted = conn.wanted_interest();
        if wanted == conn.interest {
            return;
        }
        conn.interest = wanted;
        if let Some(source) = conn.source() {
            if let Err(err) = registry.reregister(source, token(handle), wanted) {
                warn!(handle = %handle, error = %err, "Failed to update poll interest");
            }
        }
    }

    /// Closes every connection idle for at least the configured timeout.
    ///
    /// Returns the number evicted.
    pub(crate) fn sweep_idle(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.idle_timeout else {
            return 0;
        };
        let mut evicted = 0;
        while let Some((handle, touched)) = self.idle.front() {
            if now < touched + timeout {
                break;
            }
            if !self.close_connection(handle, LeaveCode::IdleTimeout.code()) {
                self.idle.remove(handle.slot());
                continue;
            }
            self.stats.evicted += 1;
            evicted += 1;
            debug!(handle = %handle, "Connection evicted after idle timeout");
        }
        evicted
    }

    /// Deregisters, emits LEAVE, and frees the slot. Returns false if
    /// `handle` was not live.
    fn close_connection(&mut self, handle: Handle, code: u32) -> bool {
        let registry = self.poll.registry();
        let Some(conn) = self.table.get_mut(handle) else {
            return false;
        };
        if let Some(source) = conn.source() {
            if let Err(err) = registry.deregister(source) {
                warn!(handle = %handle, error = %err, "Failed to deregister socket");
            }
        }
        let info = LeaveInfo {
            error: conn.last_error(),
            code,
        };
        let tag = conn.tag;
        if let Some(stream) = conn.stream_mut() {
            stream.close();
        }

        self.idle.remove(handle.slot());
        self.table.remove(handle);
        self.queue
            .push(EventKind::Leave, handle.into(), tag, &info.encode());
        self.stats.closed += 1;
        debug!(handle = %handle, code, error = info.error, "Connection closed");
        true
    }

    // ------------------------------------------------------------------
    // Sending and closing
    // ------------------------------------------------------------------

    /// Frames and queues one message.
    pub fn send(&mut self, handle: Handle, data: &[u8]) -> Result<usize, CoreError> {
        self.send_vector(handle, &[data], 0)
    }

    /// Frames `fragments` as a single message and queues it.
    ///
    /// If the send queue is already over the connection's limit the
    /// connection is closed (LEAVE 2005) and the call fails.
    pub fn send_vector(
        &mut self,
        handle: Handle,
        fragments: &[&[u8]],
        mask: u8,
    ) -> Result<usize, CoreError> {
        let conn = self
            .table
            .get_mut(handle)
            .ok_or(CoreError::UnknownHandle(handle))?;
        let limit = conn.send_limit;
        let stream = conn.stream_mut().ok_or(CoreError::Listener(handle))?;

        let pending = stream.pending();
        if limit > 0 && pending > limit {
            warn!(handle = %handle, pending, limit, "Send limit exceeded");
            self.close_connection(handle, LeaveCode::SendLimit.code());
            return Err(CoreError::SendLimit {
                handle,
                pending,
                limit,
            });
        }

        let size = stream.send_vector(fragments, mask)?;
        self.stats.messages_out += 1;
        self.refresh_interest(handle);
        Ok(size)
    }

    /// Closes `handle`, emitting LEAVE with the caller's `code`.
    pub fn close(&mut self, handle: Handle, code: u32) -> Result<(), CoreError> {
        if self.close_connection(handle, code) {
            Ok(())
        } else {
            Err(CoreError::UnknownHandle(handle))
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Number of queued events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Payload size of the next event, without consuming it.
    pub fn peek_event_size(&self) -> Option<usize> {
        self.queue.peek_size()
    }

    /// Copies the next event's payload into `out` and consumes it.
    ///
    /// `Ok(None)` means no event is queued. If `out` is too small the event
    /// stays queued and the error reports the size needed.
    pub fn read_event(&mut self, out: &mut [u8]) -> Result<Option<RecordHeader>, CoreError> {
        Ok(self.queue.read_into(out)?)
    }

    /// Dequeues the next event as an owned value.
    pub fn pop_event(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Live connections, listeners included.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.table.contains(handle)
    }

    fn get(&self, handle: Handle) -> Result<&Connection, CoreError> {
        self.table
            .get(handle)
            .ok_or(CoreError::UnknownHandle(handle))
    }

    fn get_mut(&mut self, handle: Handle) -> Result<&mut Connection, CoreError> {
        self.table
            .get_mut(handle)
            .ok_or(CoreError::UnknownHandle(handle))
    }

    pub fn kind(&self, handle: Handle) -> Result<ConnectionKind, CoreError> {
        Ok(self.get(handle)?.kind)
    }

    pub fn mode(&self, handle: Handle) -> Result<HeaderMode, CoreError> {
        Ok(self.get(handle)?.mode)
    }

    /// Lifecycle state; listeners report `Established`.
    pub fn state(&self, handle: Handle) -> Result<StreamState, CoreError> {
        let conn = self.get(handle)?;
        Ok(conn
            .stream()
            .map_or(StreamState::Established, ByteStream::state))
    }

    pub fn tag(&self, handle: Handle) -> Result<i32, CoreError> {
        Ok(self.get(handle)?.tag)
    }

    /// Sets the value carried as lparam by later ESTAB, DATA and LEAVE events.
    pub fn set_tag(&mut self, handle: Handle, tag: i32) -> Result<(), CoreError> {
        self.get_mut(handle)?.tag = tag;
        Ok(())
    }

    /// Bytes queued for sending but not yet written.
    pub fn pending(&self, handle: Handle) -> Result<usize, CoreError> {
        Ok(self.get(handle)?.stream().map_or(0, ByteStream::pending))
    }

    pub fn local_addr(&self, handle: Handle) -> Result<SocketAddr, CoreError> {
        let conn = self.get(handle)?;
        let addr = match &conn.io {
            Io::Listener(listener) => listener.local_addr()?,
            Io::Stream(stream) => match stream.socket() {
                Some(socket) => socket.local_addr()?,
                None => return Err(io::Error::from(io::ErrorKind::NotConnected).into()),
            },
        };
        Ok(addr)
    }

    pub fn peer_addr(&self, handle: Handle) -> Result<SocketAddr, CoreError> {
        let conn = self.get(handle)?;
        match conn.stream().and_then(ByteStream::socket) {
            Some(socket) => Ok(socket.peer_addr()?),
            None => Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        }
    }

    /// Oldest live handle.
    pub fn head(&self) -> Option<Handle> {
        self.table.head()
    }

    /// Live handle created right after `handle`.
    pub fn next(&self, handle: Handle) -> Option<Handle> {
        self.table.next(handle)
    }

    /// Live handle created right before `handle`.
    pub fn prev(&self, handle: Handle) -> Option<Handle> {
        self.table.prev(handle)
    }

    /// Live handles in creation order.
    pub fn handles(&self) -> Handles<'_> {
        Handles {
            inner: self.table.iter(),
        }
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    pub fn set_option(&mut self, handle: Handle, option: SocketOption) -> Result<(), CoreError> {
        let conn = self.get_mut(handle)?;
        match option {
            SocketOption::SendLimit(limit) => conn.send_limit = limit,
            SocketOption::MaxMessageSize(size) => conn.max_message_size = size,
            option => {
                let Some(socket) = conn.sock_ref() else {
                    return Err(io::Error::from(io::ErrorKind::NotConnected).into());
                };
                match option {
                    SocketOption::NoDelay(on) => sockopt::set_nodelay(socket, on)?,
                    SocketOption::ReuseAddr(on) => sockopt::set_reuse_address(socket, on)?,
                    SocketOption::KeepAlive(on) => sockopt::set_keepalive(socket, on)?,
                    SocketOption::SendBuffer(size) => sockopt::set_send_buffer_size(socket, size)?,
                    SocketOption::RecvBuffer(size) => sockopt::set_recv_buffer_size(socket, size)?,
                    SocketOption::SendLimit(_) | SocketOption::MaxMessageSize(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Installs the RC4 key for data sent on `handle`. An empty key removes it.
    pub fn set_send_key(&mut self, handle: Handle, key: &[u8]) -> Result<(), CoreError> {
        let stream = self
            .get_mut(handle)?
            .stream_mut()
            .ok_or(CoreError::Listener(handle))?;
        stream.set_send_key(key)?;
        Ok(())
    }

    /// Installs the RC4 key for data received on `handle`. An empty key removes it.
    pub fn set_recv_key(&mut self, handle: Handle, key: &[u8]) -> Result<(), CoreError> {
        let stream = self
            .get_mut(handle)?
            .stream_mut()
            .ok_or(CoreError::Listener(handle))?;
        stream.set_recv_key(key)?;
        Ok(())
    }

    /// Installs or replaces the accept-time admission policy.
    pub fn set_firewall(&mut self, firewall: impl Firewall + 'static) {
        self.firewall = Some(Box::new(firewall));
    }

    /// Removes the admission policy; every accepted socket is admitted.
    pub fn clear_firewall(&mut self) {
        self.firewall = None;
    }

    /// Defaults copied into connections created from now on.
    pub fn set_limits(&mut self, send_limit: usize, max_message_size: usize) {
        self.config.send_limit = send_limit;
        self.config.max_message_size = max_message_size;
    }

    /// Enables (`Some`) or disables idle eviction.
    pub fn set_idle_timeout(&mut self, timeout: Option<Duration>) {
        self.config.idle_timeout = timeout;
    }
}

/// Creation-order iterator over live handles.
pub struct Handles<'a> {
    inner: Iter<'a, Connection>,
}

impl Iterator for Handles<'_> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        self.inner.next().map(|(handle, _)| handle)
    }
}
