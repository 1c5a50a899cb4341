// courier-test-utils: wire-level test client for the integration suites.
//
// Connects over real TCP, sends `{action, data}` requests, and decodes the
// server's frame stream with the same streaming decoder production clients
// use.  Assertion helpers panic with context, test-style.

use courier_protocol::FrameDecoder;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Generous bound for a localhost round trip.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestClient {
    stream: TcpStream,
    decoder: FrameDecoder<Value>,
}

impl TestClient {
    /// Connect to a server on localhost and consume the welcome frame.
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to server");
        let mut client = Self {
            stream,
            decoder: FrameDecoder::new(),
        };
        let welcome = client.expect_frame().await;
        assert_eq!(welcome["action"], "welcome", "greeting first: {welcome}");
        client
    }

    /// Send one `{action, data}` request object.
    pub async fn send(&mut self, action: &str, data: Value) {
        let bytes = serde_json::to_vec(&json!({ "action": action, "data": data }))
            .expect("serialize request");
        self.stream.write_all(&bytes).await.expect("send request");
    }

    /// Send raw bytes, valid JSON or not.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("send raw bytes");
    }

    /// Next frame, or `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<Value> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next().expect("server sent valid JSON") {
                return Some(frame);
            }
            let n = timeout(RECV_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for a frame")
                .expect("read from server");
            if n == 0 {
                return None;
            }
            self.decoder.extend(&chunk[..n]);
        }
    }

    /// Next frame; the connection must still be open.
    pub async fn expect_frame(&mut self) -> Value {
        self.recv().await.expect("connection closed unexpectedly")
    }

    /// Next frame must carry `action`; returns it.
    pub async fn expect_action(&mut self, action: &str) -> Value {
        let frame = self.expect_frame().await;
        assert_eq!(frame["action"], action, "unexpected frame: {frame}");
        frame
    }

    /// Skip frames until one carries `action`; returns it.  Useful where
    /// the ordering of a status reply and a pushed event is unspecified.
    pub async fn expect_event(&mut self, action: &str) -> Value {
        loop {
            let frame = self.expect_frame().await;
            if frame["action"] == action {
                return frame;
            }
        }
    }

    /// Next frame must be `{action, {status, ...}}` with this status code.
    pub async fn expect_status(&mut self, action: &str, status: i64) -> Value {
        let frame = self.expect_action(action).await;
        assert_eq!(frame["data"]["status"], status, "unexpected frame: {frame}");
        frame
    }

    /// The server must close the connection without further frames.
    pub async fn expect_closed(&mut self) {
        if let Some(frame) = self.recv().await {
            panic!("expected close, got frame: {frame}");
        }
    }

    /// Register and ride the automatic login; returns the auth frame.
    pub async fn register(&mut self, login: &str, pass: &str, nick: &str) -> Value {
        self.send(
            "register",
            json!({ "login": login, "pass": pass, "nick": nick }),
        )
        .await;
        self.expect_status("register", 0).await;
        self.expect_status("auth", 0).await
    }

    /// Authenticate an existing user; returns the auth frame.
    pub async fn auth(&mut self, login: &str, pass: &str) -> Value {
        self.send("auth", json!({ "login": login, "pass": pass }))
            .await;
        self.expect_status("auth", 0).await
    }
}
