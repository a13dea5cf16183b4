//! Outbound proxy traversal.
//!
//! [`ProxyConnector`] opens a non-blocking connection either straight to the
//! destination or to a proxy, and walks the proxy handshake one
//! non-blocking step at a time. The caller keeps invoking
//! [`ProxyConnector::process`] from its own loop until it reports
//! [`ProxyStatus::Connected`] or [`ProxyStatus::Failed`]; the finished
//! stream is then taken with [`ProxyConnector::into_stream`].
//!
//! ```text
//! Start -> Connecting -> Connected                                  (direct)
//! Start -> Connecting -> SendRequest -> RecvReply -> Connected      (HTTP, SOCKS4)
//! Start -> Connecting -> SendRequest -> RecvReply
//!       [-> SendAuth -> RecvAuth] -> SendConnect -> RecvConnect -> Connected (SOCKS5)
//! ```

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mio::net::TcpStream;
use tracing::debug;

use crate::ProxyError;

/// Longest HTTP proxy reply accepted before giving up.
pub const HTTP_REPLY_LIMIT: usize = 4096;

const SOCKS4_VERSION: u8 = 4;
const SOCKS4_GRANTED: u8 = 90;
const SOCKS5_VERSION: u8 = 5;
const SOCKS5_NO_AUTH: u8 = 0;
const SOCKS5_USER_PASS: u8 = 2;
const SOCKS5_CMD_CONNECT: u8 = 1;
const SOCKS5_ATYP_V4: u8 = 1;
const SOCKS5_ATYP_DOMAIN: u8 = 3;
const SOCKS5_ATYP_V6: u8 = 4;

/// How to reach the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyKind {
    /// Connect straight to the destination.
    #[default]
    None,
    /// HTTP `CONNECT` tunnel.
    Http,
    /// SOCKS4 (IPv4 destinations only).
    Socks4,
    /// SOCKS5 with optional username/password.
    Socks5,
}

/// Username and password for the proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Result of one [`ProxyConnector::process`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyStatus {
    Connected,
    Pending,
    Failed(ProxyError),
}

impl ProxyStatus {
    /// 1 connected, 0 in progress, -1 failed.
    pub fn as_i32(&self) -> i32 {
        match self {
            ProxyStatus::Connected => 1,
            ProxyStatus::Pending => 0,
            ProxyStatus::Failed(_) => -1,
        }
    }
}

/// Where a [`ProxyConnector`] is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStep {
    Start,
    Connecting,
    SendRequest,
    RecvReply,
    SendAuth,
    RecvAuth,
    SendConnect,
    RecvConnect,
    Connected,
    Failed,
}

/// Poll-driven connector for one outbound connection.
#[derive(Debug)]
pub struct ProxyConnector {
    kind: ProxyKind,
    remote: SocketAddr,
    proxy: SocketAddr,
    stream: Option<TcpStream>,
    step: ProxyStep,
    /// Every step entered so far, in order.
    trace: Vec<ProxyStep>,

    /// First handshake message (CONNECT line, SOCKS4 request, SOCKS5 greeting).
    request: Vec<u8>,
    /// SOCKS5 username/password sub-negotiation, when credentials were given.
    auth: Option<Vec<u8>>,
    /// SOCKS5 CONNECT request.
    connect: Vec<u8>,

    /// Message currently being sent and how much of it went out.
    out: Vec<u8>,
    sent: usize,
    /// Bytes received for the current reply.
    reply: Vec<u8>,

    error: Option<ProxyError>,
}

impl ProxyConnector {
    /// Prepares a connection to `remote`, through `proxy` unless `kind` is
    /// [`ProxyKind::None`]. Nothing touches the network until the first
    /// [`process`](Self::process).
    pub fn new(
        kind: ProxyKind,
        remote: SocketAddr,
        proxy: SocketAddr,
        credentials: Option<Credentials>,
    ) -> Result<Self, ProxyError> {
        let mut auth = None;
        let mut connect = Vec::new();

        let request = match kind {
            ProxyKind::None => Vec::new(),
            ProxyKind::Http => http_request(remote, credentials.as_ref()),
            ProxyKind::Socks4 => socks4_request(remote)?,
            ProxyKind::Socks5 => {
                if let Some(creds) = &credentials {
                    auth = Some(socks5_auth(creds)?);
                }
                connect = socks5_connect(remote);
                socks5_greeting(auth.is_some())
            }
        };

        Ok(Self::build(kind, remote, proxy, request, auth, connect))
    }

    /// Connects straight to `remote`.
    pub fn direct(remote: SocketAddr) -> Self {
        Self::build(ProxyKind::None, remote, remote, Vec::new(), None, Vec::new())
    }

    fn build(
        kind: ProxyKind,
        remote: SocketAddr,
        proxy: SocketAddr,
        request: Vec<u8>,
        auth: Option<Vec<u8>>,
        connect: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            remote,
            proxy,
            stream: None,
            step: ProxyStep::Start,
            trace: vec![ProxyStep::Start],
            request,
            auth,
            connect,
            out: Vec::new(),
            sent: 0,
            reply: Vec::new(),
            error: None,
        }
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// Final destination.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Current handshake step.
    pub fn step(&self) -> ProxyStep {
        self.step
    }

    /// Steps entered so far, starting with [`ProxyStep::Start`].
    pub fn steps(&self) -> &[ProxyStep] {
        &self.trace
    }

    /// The failure, once [`process`](Self::process) reported one.
    pub fn error(&self) -> Option<&ProxyError> {
        self.error.as_ref()
    }

    /// Numeric code of the failure, 0 while none occurred.
    pub fn error_code(&self) -> i32 {
        self.error.as_ref().map_or(0, ProxyError::code)
    }

    /// The underlying stream, once the connect has been issued.
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    /// Takes the tunnelled stream. `None` unless traversal completed.
    pub fn into_stream(self) -> Option<TcpStream> {
        match self.step {
            ProxyStep::Connected => self.stream,
            _ => None,
        }
    }

    /// Advances the handshake as far as it can go without blocking.
    pub fn process(&mut self) -> ProxyStatus {
        match self.step {
            ProxyStep::Connected => return ProxyStatus::Connected,
            ProxyStep::Failed => return self.failed(),
            _ => {}
        }

        loop {
            let before = self.step;
            if let Err(err) = self.advance() {
                self.step = ProxyStep::Failed;
                self.trace.push(ProxyStep::Failed);
                debug!(
                    kind = ?self.kind,
                    remote = %self.remote,
                    code = err.code(),
                    error = %err,
                    steps = ?self.trace,
                    "Proxy traversal failed"
                );
                self.error = Some(err);
                return self.failed();
            }
            if self.step != before {
                self.trace.push(self.step);
            }
            if self.step == ProxyStep::Connected {
                debug!(kind = ?self.kind, remote = %self.remote, "Proxy traversal complete");
                return ProxyStatus::Connected;
            }
            if self.step == before {
                return ProxyStatus::Pending;
            }
        }
    }

    fn failed(&self) -> ProxyStatus {
        match &self.error {
            Some(err) => ProxyStatus::Failed(err.clone()),
            None => ProxyStatus::Failed(ProxyError::ConnectFailed("unknown".into())),
        }
    }

    /// Runs the current step once. Leaves `self.step` unchanged if it would block.
    fn advance(&mut self) -> Result<(), ProxyError> {
        match self.step {
            ProxyStep::Start => {
                let target = match self.kind {
                    ProxyKind::None => self.remote,
                    _ => self.proxy,
                };
                let stream = TcpStream::connect(target)
                    .map_err(|e| ProxyError::ConnectRejected(e.to_string()))?;
                self.stream = Some(stream);
                self.step = ProxyStep::Connecting;
            }
            ProxyStep::Connecting => {
                if self.poll_connected()? {
                    if self.kind == ProxyKind::None {
                        self.step = ProxyStep::Connected;
                    } else {
                        let request = std::mem::take(&mut self.request);
                        self.begin_send(request, ProxyStep::SendRequest);
                    }
                }
            }
            ProxyStep::SendRequest => {
                if self.flush().map_err(|e| ProxyError::RequestSend(e.to_string()))? {
                    self.begin_recv(ProxyStep::RecvReply);
                }
            }
            ProxyStep::RecvReply => match self.kind {
                ProxyKind::Http => self.recv_http_reply()?,
                ProxyKind::Socks4 => self.recv_socks4_reply()?,
                ProxyKind::Socks5 => self.recv_socks5_method()?,
                ProxyKind::None => self.step = ProxyStep::Connected,
            },
            ProxyStep::SendAuth => {
                if self
                    .flush()
                    .map_err(|e| ProxyError::Socks5AuthSend(e.to_string()))?
                {
                    self.begin_recv(ProxyStep::RecvAuth);
                }
            }
            ProxyStep::RecvAuth => {
                if self
                    .fill(2)
                    .map_err(|e| ProxyError::Socks5AuthRecv(e.to_string()))?
                {
                    if self.reply[1] != 0 {
                        return Err(ProxyError::Socks5AuthRejected(self.reply[1]));
                    }
                    self.start_socks5_connect();
                }
            }
            ProxyStep::SendConnect => {
                if self
                    .flush()
                    .map_err(|e| ProxyError::Socks5ConnectSend(e.to_string()))?
                {
                    self.begin_recv(ProxyStep::RecvConnect);
                }
            }
            ProxyStep::RecvConnect => self.recv_socks5_connect()?,
            ProxyStep::Connected | ProxyStep::Failed => {}
        }
        Ok(())
    }

    /// Zero-wait check of an in-progress connect.
    fn poll_connected(&mut self) -> Result<bool, ProxyError> {
        let Some(stream) = &self.stream else {
            return Err(ProxyError::ConnectFailed("no socket".into()));
        };
        match stream.take_error() {
            Ok(Some(err)) | Err(err) => return Err(ProxyError::ConnectFailed(err.to_string())),
            Ok(None) => {}
        }
        match stream.peer_addr() {
            Ok(_) => Ok(true),
            Err(err)
                if err.kind() == io::ErrorKind::NotConnected
                    || err.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(false)
            }
            Err(err) => Err(ProxyError::ConnectFailed(err.to_string())),
        }
    }

    fn begin_send(&mut self, message: Vec<u8>, step: ProxyStep) {
        self.out = message;
        self.sent = 0;
        self.step = step;
    }

    fn begin_recv(&mut self, step: ProxyStep) {
        self.reply.clear();
        self.step = step;
    }

    /// Writes the pending message. `Ok(true)` once all of it went out.
    fn flush(&mut self) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        while self.sent < self.out.len() {
            match stream.write(&self.out[self.sent..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Reads until the reply holds `want` bytes, never more.
    ///
    /// `Ok(true)` once it does; a closed stream is an error.
    fn fill(&mut self, want: usize) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        let mut chunk = [0u8; 256];
        while self.reply.len() < want {
            let room = (want - self.reply.len()).min(chunk.len());
            match stream.read(&mut chunk[..room]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.reply.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Reads one byte at a time so nothing past the blank line is consumed.
    fn recv_http_reply(&mut self) -> Result<(), ProxyError> {
        loop {
            if self.reply.len() >= HTTP_REPLY_LIMIT {
                return Err(ProxyError::HttpReplyTooLong(HTTP_REPLY_LIMIT));
            }
            let want = self.reply.len() + 1;
            if !self
                .fill(want)
                .map_err(|e| ProxyError::HttpRecv(e.to_string()))?
            {
                return Ok(());
            }
            if self.reply.ends_with(b"\r\n\r\n") {
                break;
            }
        }

        if self.reply.starts_with(b"HTTP/1.0 200") || self.reply.starts_with(b"HTTP/1.1 200") {
            self.step = ProxyStep::Connected;
            return Ok(());
        }
        let status = String::from_utf8_lossy(&self.reply)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        Err(ProxyError::HttpRejected(status))
    }

    // ========================================================================
    // SOCKS4
    // ========================================================================

    fn recv_socks4_reply(&mut self) -> Result<(), ProxyError> {
        if self
            .fill(8)
            .map_err(|e| ProxyError::Socks4Recv(e.to_string()))?
        {
            if self.reply[1] != SOCKS4_GRANTED {
                return Err(ProxyError::Socks4Rejected(self.reply[1]));
            }
            self.step = ProxyStep::Connected;
        }
        Ok(())
    }

    // ========================================================================
    // SOCKS5
    // ========================================================================

    fn recv_socks5_method(&mut self) -> Result<(), ProxyError> {
        if !self
            .fill(2)
            .map_err(|e| ProxyError::Socks5MethodRecv(e.to_string()))?
        {
            return Ok(());
        }

        let (version, method) = (self.reply[0], self.reply[1]);
        let offered_auth = self.auth.is_some();
        let rejected = |method| {
            if offered_auth {
                ProxyError::Socks5AuthMethodRejected(method)
            } else {
                ProxyError::Socks5MethodRejected(method)
            }
        };
        if version != SOCKS5_VERSION {
            return Err(rejected(method));
        }
        match (method, self.auth.take()) {
            (SOCKS5_NO_AUTH, _) => self.start_socks5_connect(),
            (SOCKS5_USER_PASS, Some(auth)) => self.begin_send(auth, ProxyStep::SendAuth),
            (method, auth) => {
                self.auth = auth;
                return Err(rejected(method));
            }
        }
        Ok(())
    }

    fn start_socks5_connect(&mut self) {
        let connect = std::mem::take(&mut self.connect);
        self.begin_send(connect, ProxyStep::SendConnect);
    }

    /// The reply length depends on the bound address type in byte 3.
    fn recv_socks5_connect(&mut self) -> Result<(), ProxyError> {
        let recv_err = |e: io::Error| ProxyError::Socks5ConnectRecv(e.to_string());

        if !self.fill(4).map_err(recv_err)? {
            return Ok(());
        }
        if self.reply[0] != SOCKS5_VERSION || self.reply[1] != 0 {
            return Err(ProxyError::Socks5ConnectRejected(self.reply[1]));
        }

        let total = match self.reply[3] {
            SOCKS5_ATYP_V4 => 4 + 4 + 2,
            SOCKS5_ATYP_V6 => 4 + 16 + 2,
            SOCKS5_ATYP_DOMAIN => {
                if !self.fill(5).map_err(recv_err)? {
                    return Ok(());
                }
                4 + 1 + self.reply[4] as usize + 2
            }
            other => {
                return Err(ProxyError::Socks5ConnectRecv(format!(
                    "unknown address type {}",
                    other
                )))
            }
        };
        if self.fill(total).map_err(recv_err)? {
            self.step = ProxyStep::Connected;
        }
        Ok(())
    }
}

fn http_request(remote: SocketAddr, credentials: Option<&Credentials>) -> Vec<u8> {
    let mut request = format!("CONNECT {} HTTP/1.0\r\n", remote);
    if let Some(creds) = credentials {
        let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
    }
    request.push_str("\r\n");
    request.into_bytes()
}

fn socks4_request(remote: SocketAddr) -> Result<Vec<u8>, ProxyError> {
    let IpAddr::V4(ip) = remote.ip() else {
        return Err(ProxyError::Socks4NeedsIpv4);
    };
    let mut request = Vec::with_capacity(9);
    request.push(SOCKS4_VERSION);
    request.push(1);
    request.extend_from_slice(&remote.port().to_be_bytes());
    request.extend_from_slice(&ip.octets());
    // Empty user id, NUL terminated.
    request.push(0);
    Ok(request)
}

fn socks5_greeting(with_auth: bool) -> Vec<u8> {
    if with_auth {
        vec![SOCKS5_VERSION, 2, SOCKS5_NO_AUTH, SOCKS5_USER_PASS]
    } else {
        vec![SOCKS5_VERSION, 1, SOCKS5_NO_AUTH]
    }
}

fn socks5_auth(creds: &Credentials) -> Result<Vec<u8>, ProxyError> {
    let user = creds.username.as_bytes();
    let pass = creds.password.as_bytes();
    if user.is_empty() || user.len() > 255 || pass.is_empty() || pass.len() > 255 {
        return Err(ProxyError::Socks5CredentialsTooLong);
    }
    let mut auth = Vec::with_capacity(3 + user.len() + pass.len());
    auth.push(1);
    auth.push(user.len() as u8);
    auth.extend_from_slice(user);
    auth.push(pass.len() as u8);
    auth.extend_from_slice(pass);
    Ok(auth)
}

fn socks5_connect(remote: SocketAddr) -> Vec<u8> {
    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_CONNECT, 0];
    match remote.ip() {
        IpAddr::V4(ip) => {
            request.push(SOCKS5_ATYP_V4);
            request.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            request.push(SOCKS5_ATYP_V6);
            request.extend_from_slice(&ip.octets());
        }
    }
    request.extend_from_slice(&remote.port().to_be_bytes());
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_http_request_layout() {
        let plain = http_request(addr("10.0.0.1:443"), None);
        assert_eq!(plain, b"CONNECT 10.0.0.1:443 HTTP/1.0\r\n\r\n");

        let authed = http_request(
            addr("10.0.0.1:443"),
            Some(&Credentials::new("user", "pass")),
        );
        assert_eq!(
            authed,
            b"CONNECT 10.0.0.1:443 HTTP/1.0\r\nProxy-Authorization: Basic dXNlcjpwYXNz\r\n\r\n"
        );
    }

    #[test]
    fn test_socks4_request_layout() {
        let request = socks4_request(addr("1.2.3.4:80")).unwrap();
        assert_eq!(request, vec![4, 1, 0, 80, 1, 2, 3, 4, 0]);
        assert_eq!(
            socks4_request(addr("[::1]:80")).unwrap_err(),
            ProxyError::Socks4NeedsIpv4
        );
    }

    #[test]
    fn test_socks5_messages() {
        assert_eq!(socks5_greeting(false), vec![5, 1, 0]);
        assert_eq!(socks5_greeting(true), vec![5, 2, 0, 2]);
        assert_eq!(
            socks5_auth(&Credentials::new("ab", "xyz")).unwrap(),
            vec![1, 2, b'a', b'b', 3, b'x', b'y', b'z']
        );
        assert!(socks5_auth(&Credentials::new("", "x")).is_err());
        assert!(socks5_auth(&Credentials::new("u", "p".repeat(256))).is_err());
        assert_eq!(
            socks5_connect(addr("9.8.7.6:258")),
            vec![5, 1, 0, 1, 9, 8, 7, 6, 1, 2]
        );
        assert_eq!(socks5_connect(addr("[::1]:1")).len(), 4 + 16 + 2);
    }

    #[test]
    fn test_new_rejects_socks4_v6_destination() {
        let err = ProxyConnector::new(
            ProxyKind::Socks4,
            addr("[::1]:80"),
            addr("127.0.0.1:1080"),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProxyStatus::Connected.as_i32(), 1);
        assert_eq!(ProxyStatus::Pending.as_i32(), 0);
        assert_eq!(ProxyStatus::Failed(ProxyError::Socks4Rejected(91)).as_i32(), -1);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
