//! Shared harness for integration tests: a scripted local WebSocket server
//! and polling helpers.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kimchi_premium::ConnectionConfig;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Frames a server plays to every client after it connects.
#[derive(Clone, Default)]
pub struct Script {
    pub frames: Vec<Message>,
    pub repeat_every: Option<Duration>,
}

impl Script {
    pub fn text<S: AsRef<str>>(frames: &[S]) -> Self {
        Self {
            frames: frames
                .iter()
                .map(|f| Message::Text(f.as_ref().to_string().into()))
                .collect(),
            repeat_every: None,
        }
    }
}

pub struct TestServer {
    pub url: String,
    pub accepted: Arc<AtomicUsize>,
    pub received: mpsc::UnboundedReceiver<String>,
    /// When each connection was accepted, in order.
    pub accept_times: Arc<Mutex<Vec<Instant>>>,
    /// When each client stopped sending, in order.
    pub close_times: Arc<Mutex<Vec<Instant>>>,
}

impl TestServer {
    /// Next text frame sent by any client.
    pub async fn next_text(&mut self) -> String {
        timeout(Duration::from_secs(3), self.received.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server stopped")
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Accepts any number of connections. Each one plays the script, then keeps
/// reading until the client goes away.
pub async fn spawn_server(script: Script) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let accept_times = Arc::new(Mutex::new(Vec::new()));
    let close_times = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::unbounded_channel();

    let counter = Arc::clone(&accepted);
    let accepts = Arc::clone(&accept_times);
    let closes = Arc::clone(&close_times);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            accepts.lock().push(Instant::now());
            let tx = tx.clone();
            let script = script.clone();
            let closes = Arc::clone(&closes);

            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();

                let reader = tokio::spawn(async move {
                    while let Some(Ok(msg)) = read.next().await {
                        if let Message::Text(text) = msg {
                            let _ = tx.send(text.to_string());
                        }
                    }
                    closes.lock().push(Instant::now());
                });

                // Let the client subscribe before streaming.
                sleep(Duration::from_millis(20)).await;
                for frame in &script.frames {
                    if write.send(frame.clone()).await.is_err() {
                        return;
                    }
                }
                if let (Some(every), Some(last)) = (script.repeat_every, script.frames.last()) {
                    loop {
                        sleep(every).await;
                        if write.send(last.clone()).await.is_err() {
                            break;
                        }
                    }
                }
                let _ = reader.await;
            });
        }
    });

    TestServer {
        url: format!("ws://{addr}"),
        accepted,
        received: rx,
        accept_times,
        close_times,
    }
}

/// Connection config with a generous liveness timeout and a short throttle.
pub fn fast_config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new(url)
        .with_socket_timeout(Duration::from_secs(2))
        .with_throttle_interval(Duration::from_millis(50))
}

/// Poll `check` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Upbit SIMPLE-format ticker frame.
pub fn upbit_ticker(code: &str, price: &str, acc_trade_price: &str) -> String {
    format!(
        r#"{{"ty":"ticker","cd":"{code}","op":{price},"hp":{price},"lp":{price},"tp":{price},"c":"EVEN","scp":0,"scr":0,"atv24h":1,"atp24h":{acc_trade_price},"tms":1700000000000,"st":"REALTIME"}}"#
    )
}

/// Binance combined-stream 24h ticker frame.
pub fn binance_ticker(symbol: &str, price: &str, quote_volume: &str) -> String {
    format!(
        r#"{{"stream":"{stream}@ticker","data":{{"e":"24hrTicker","E":1700000000000,"s":"{symbol}","p":"0","P":"0","o":"{price}","h":"{price}","l":"{price}","c":"{price}","v":"1","q":"{quote_volume}"}}}}"#,
        stream = symbol.to_lowercase()
    )
}
