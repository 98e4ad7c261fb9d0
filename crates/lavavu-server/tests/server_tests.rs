//! Control server tests over a real socket

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use lavavu_core::{Session, SessionConfig, SessionMode};
use lavavu_server::{Server, ServerConfig};
use serde_json::{json, Value};

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One HTTP/1.1 request on a fresh connection
fn request(port: u16, method: &str, target: &str, body: &str) -> Reply {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
        method,
        target,
        body.len(),
        body
    )
    .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();
    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let mut lines = head.lines();
    let status = lines.next().unwrap().split_whitespace().nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Reply {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

fn get(port: u16, target: &str) -> Reply {
    request(port, "GET", target, "")
}

fn start() -> (Session, Server) {
    let session = Session::new(SessionConfig::default().with_mode(SessionMode::Thread)).unwrap();
    let server = Server::start(&session, &ServerConfig::default().with_port(0)).unwrap();
    (session, server)
}

#[test]
fn test_image_is_jpeg() {
    let (_session, server) = start();
    let reply = get(server.port(), "/image?width=64&height=48");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("content-type"), Some("image/jpeg"));
    assert_eq!(reply.header("access-control-allow-origin"), Some("*"));
    assert_eq!(reply.header("x-colab-notebook-cache-control"), Some("no-cache"));
    assert!(reply.body.len() > 2);
    assert_eq!(&reply.body[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_getstate_sections() {
    let (session, server) = start();
    assert_eq!(session.server_port(), Some(server.port()));
    let reply = get(server.port(), "/getstate");
    assert_eq!(reply.header("content-type"), Some("application/json"));
    let state: Value = serde_json::from_slice(&reply.body).unwrap();
    for key in ["properties", "views", "objects", "colourmaps"] {
        assert!(state.get(key).is_some(), "missing {}", key);
    }
}

#[test]
fn test_command_then_state() {
    let (session, server) = start();
    session.points(Some("pts"), Value::Null).unwrap();

    let reply = get(server.port(), "/command=zoom%202");
    assert_eq!(reply.status, 200);
    assert!(reply.body.is_empty());
    assert_eq!(session.state().unwrap()["views"][0]["zoom"], json!(2.0));

    let reply = request(server.port(), "POST", "/", "<pts>pointsize=3");
    assert_eq!(reply.status, 200);
    assert_eq!(session.state().unwrap()["objects"][0]["pointsize"], json!(3));

    let reply = get(server.port(), "/icommand=zoom%202?width=32&height=24");
    assert_eq!(reply.header("content-type"), Some("image/jpeg"));
    assert_eq!(&reply.body[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_bad_command_answers_empty() {
    let (_session, server) = start();
    let reply = get(server.port(), "/command=no_such_command");
    assert_eq!(reply.status, 200);
    assert!(reply.body.is_empty());
}

#[test]
fn test_connect_keeps_first_url() {
    let (session, server) = start();
    let reply = get(server.port(), "/connect?url=http%3A%2F%2Fhost%2Fa");
    assert_eq!(reply.text(), session.id().to_string());
    get(server.port(), "/connect?url=http%3A%2F%2Fhost%2Fb");
    assert_eq!(session.connected_url().as_deref(), Some("http://host/a"));
}

#[test]
fn test_index_is_the_shell() {
    let (_session, server) = start();
    let reply = get(server.port(), "/");
    assert!(reply.header("content-type").unwrap_or_default().starts_with("text/html"));
    assert!(reply.text().contains(&format!("\"port\":{}", server.port())));
}

#[test]
fn test_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("viewer.css"), "body {}").unwrap();
    let session = Session::new(SessionConfig::default()).unwrap();
    let config = ServerConfig {
        port: 0,
        static_path: Some(dir.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let server = Server::start(&session, &config).unwrap();

    let reply = get(server.port(), "/viewer.css");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("content-type"), Some("text/css"));
    assert_eq!(reply.text(), "body {}");

    assert_eq!(get(server.port(), "/missing.css").status, 404);
    assert_eq!(get(server.port(), "/../viewer.css").status, 404);
}

#[test]
fn test_close_stops_serving() {
    let (_session, mut server) = start();
    let port = server.port();
    assert_eq!(get(port, "/getstate").status, 200);
    server.close();
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}
