//! Proxy traversal against in-process mock proxies on loopback.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use netmux_networking::{Credentials, ProxyConnector, ProxyKind, ProxyStatus, ProxyStep};

/// Destination the proxies pretend to reach.
const REMOTE: &str = "10.1.2.3:8443";

/// Spawns a one-shot mock proxy running `script` on the accepted stream.
fn mock_proxy<F>(script: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        script(stream);
    });
    (addr, handle)
}

fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn read_http_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Calls `process` until it stops reporting `Pending`.
fn drive(connector: &mut ProxyConnector) -> (ProxyStatus, usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut calls = 0;
    loop {
        calls += 1;
        let status = connector.process();
        if status != ProxyStatus::Pending || Instant::now() > deadline {
            return (status, calls);
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn process_counted(connector: &mut ProxyConnector, calls: &mut usize) -> ProxyStatus {
    *calls += 1;
    connector.process()
}

fn read_tunnel(stream: &mut mio::net::TcpStream, n: usize) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    while out.len() < n && Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(k) => out.extend_from_slice(&buf[..k]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(2)),
            Err(e) => panic!("tunnel read failed: {e}"),
        }
    }
    out
}

#[test]
fn test_direct_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut connector = ProxyConnector::direct(addr);
    let (status, _) = drive(&mut connector);
    assert_eq!(status, ProxyStatus::Connected);
    assert_eq!(connector.error_code(), 0);
    assert!(connector.into_stream().is_some());
}

#[test]
fn test_direct_connect_refused() {
    // Grab a free port, then close it so nothing listens there.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let mut connector = ProxyConnector::direct(addr);
    let (status, _) = drive(&mut connector);
    assert_eq!(status.as_i32(), -1);
    assert!(matches!(connector.error_code(), 1 | 2));
    assert!(connector.into_stream().is_none());
}

#[test]
fn test_http_connect_tunnel() {
    let (proxy, server) = mock_proxy(|mut stream| {
        let head = read_http_head(&mut stream);
        assert!(head.starts_with("CONNECT 10.1.2.3:8443 HTTP/1.0\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic YWxpY2U6c2VjcmV0\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\nhello")
            .unwrap();
    });

    let mut connector = ProxyConnector::new(
        ProxyKind::Http,
        REMOTE.parse().unwrap(),
        proxy,
        Some(Credentials::new("alice", "secret")),
    )
    .unwrap();
    let (status, _) = drive(&mut connector);
    assert_eq!(status, ProxyStatus::Connected);

    // Bytes after the blank line belong to the tunnel, not the handshake.
    let mut stream = connector.into_stream().unwrap();
    assert_eq!(read_tunnel(&mut stream, 5), b"hello");
    server.join().unwrap();
}

#[test]
fn test_http_connect_refused_by_proxy() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_http_head(&mut stream);
        stream
            .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
            .unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Http, REMOTE.parse().unwrap(), proxy, None).unwrap();
    let (status, _) = drive(&mut connector);
    match status {
        ProxyStatus::Failed(err) => {
            assert_eq!(err.code(), 11);
            assert!(err.to_string().contains("407"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn test_socks4_granted() {
    let (proxy, server) = mock_proxy(|mut stream| {
        assert_eq!(read_n(&mut stream, 9), vec![4, 1, 0x20, 0xfb, 10, 1, 2, 3, 0]);
        stream.write_all(&[0, 90, 0, 0, 0, 0, 0, 0]).unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks4, REMOTE.parse().unwrap(), proxy, None).unwrap();
    assert_eq!(drive(&mut connector).0, ProxyStatus::Connected);
    server.join().unwrap();
}

#[test]
fn test_socks4_rejected() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_n(&mut stream, 9);
        stream.write_all(&[0, 91, 0, 0, 0, 0, 0, 0]).unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks4, REMOTE.parse().unwrap(), proxy, None).unwrap();
    drive(&mut connector);
    assert_eq!(connector.error_code(), 21);
    server.join().unwrap();
}

#[test]
fn test_socks5_without_auth() {
    // The mock reports each request it reads and holds its reply until told to send it.
    let (seen_tx, seen_rx) = mpsc::channel::<&'static str>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (proxy, server) = mock_proxy(move |mut stream| {
        assert_eq!(read_n(&mut stream, 3), vec![5, 1, 0]);
        seen_tx.send("greeting").unwrap();
        go_rx.recv().unwrap();
        stream.write_all(&[5, 0]).unwrap();
        seen_tx.send("method reply").unwrap();

        assert_eq!(
            read_n(&mut stream, 10),
            vec![5, 1, 0, 1, 10, 1, 2, 3, 0x20, 0xfb]
        );
        seen_tx.send("connect").unwrap();
        go_rx.recv().unwrap();
        stream
            .write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0x04, 0x38])
            .unwrap();
        seen_tx.send("connect reply").unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks5, REMOTE.parse().unwrap(), proxy, None).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert_eq!(connector.process(), ProxyStatus::Pending);
        if let Ok(seen) = seen_rx.try_recv() {
            assert_eq!(seen, "greeting");
            break;
        }
        assert!(Instant::now() < deadline, "greeting never reached the proxy");
        thread::sleep(Duration::from_millis(2));
    }

    // Greeting sent, method reply withheld.
    let mut calls = 0;
    for _ in 0..3 {
        assert_eq!(process_counted(&mut connector, &mut calls), ProxyStatus::Pending);
        assert_eq!(connector.step(), ProxyStep::RecvReply);
    }

    go_tx.send(()).unwrap();
    assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)), Ok("method reply"));
    assert_eq!(process_counted(&mut connector, &mut calls), ProxyStatus::Pending);
    assert_eq!(connector.step(), ProxyStep::RecvConnect);

    // CONNECT sent, its reply withheld.
    assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)), Ok("connect"));
    assert_eq!(process_counted(&mut connector, &mut calls), ProxyStatus::Pending);
    assert_eq!(connector.step(), ProxyStep::RecvConnect);

    go_tx.send(()).unwrap();
    assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)), Ok("connect reply"));
    assert_eq!(process_counted(&mut connector, &mut calls), ProxyStatus::Connected);
    assert_eq!(calls, 6);

    assert_eq!(
        connector.steps(),
        &[
            ProxyStep::Start,
            ProxyStep::Connecting,
            ProxyStep::SendRequest,
            ProxyStep::RecvReply,
            ProxyStep::SendConnect,
            ProxyStep::RecvConnect,
            ProxyStep::Connected,
        ]
    );
    assert_eq!(connector.process(), ProxyStatus::Connected);
    assert_eq!(connector.steps().len(), 7);
    server.join().unwrap();
}

#[test]
fn test_socks5_with_credentials() {
    let (proxy, server) = mock_proxy(|mut stream| {
        assert_eq!(read_n(&mut stream, 4), vec![5, 2, 0, 2]);
        stream.write_all(&[5, 2]).unwrap();
        assert_eq!(
            read_n(&mut stream, 3 + 3 + 4),
            vec![1, 3, b'b', b'o', b'b', 4, b'p', b'a', b's', b's']
        );
        stream.write_all(&[1, 0]).unwrap();
        read_n(&mut stream, 10);
        // Bound address as a domain name this time.
        stream
            .write_all(&[5, 0, 0, 3, 4, b'h', b'o', b's', b't', 0, 80])
            .unwrap();
    });

    let mut connector = ProxyConnector::new(
        ProxyKind::Socks5,
        REMOTE.parse().unwrap(),
        proxy,
        Some(Credentials::new("bob", "pass")),
    )
    .unwrap();
    assert_eq!(drive(&mut connector).0, ProxyStatus::Connected);
    server.join().unwrap();
}

#[test]
fn test_socks5_credentials_rejected() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_n(&mut stream, 4);
        stream.write_all(&[5, 2]).unwrap();
        read_n(&mut stream, 3 + 1 + 1);
        stream.write_all(&[1, 1]).unwrap();
    });

    let mut connector = ProxyConnector::new(
        ProxyKind::Socks5,
        REMOTE.parse().unwrap(),
        proxy,
        Some(Credentials::new("u", "p")),
    )
    .unwrap();
    drive(&mut connector);
    assert_eq!(connector.error_code(), 42);
    server.join().unwrap();
}

#[test]
fn test_socks5_no_acceptable_method() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_n(&mut stream, 3);
        stream.write_all(&[5, 0xff]).unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks5, REMOTE.parse().unwrap(), proxy, None).unwrap();
    drive(&mut connector);
    assert_eq!(connector.error_code(), 32);
    assert!(connector.error().unwrap().is_rejection());
    server.join().unwrap();
}

#[test]
fn test_socks5_connect_rejected() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_n(&mut stream, 3);
        stream.write_all(&[5, 0]).unwrap();
        read_n(&mut stream, 10);
        stream.write_all(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]).unwrap();
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks5, REMOTE.parse().unwrap(), proxy, None).unwrap();
    drive(&mut connector);
    assert_eq!(connector.error_code(), 52);
    server.join().unwrap();
}

#[test]
fn test_proxy_hangs_up_mid_handshake() {
    let (proxy, server) = mock_proxy(|mut stream| {
        read_n(&mut stream, 3);
        // Drop without answering.
    });

    let mut connector =
        ProxyConnector::new(ProxyKind::Socks5, REMOTE.parse().unwrap(), proxy, None).unwrap();
    drive(&mut connector);
    assert_eq!(connector.error_code(), 31);
    server.join().unwrap();
}
