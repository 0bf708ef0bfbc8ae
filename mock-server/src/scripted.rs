//! Raw TCP responder that replays a fixed byte script.
//!
//! Every accepted connection gets the same treatment: read the request head,
//! record it, write each part of the script with `delay` between parts, then
//! close or hold the connection open.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HOLD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct Script {
    pub parts: Vec<Vec<u8>>,
    /// Pause before each part after the first.
    pub delay: Duration,
    /// Close after the last part; otherwise keep the socket open.
    pub close: bool,
}

impl Script {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            close: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hold_open(mut self) -> Self {
        self.close = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    /// Bind an ephemeral loopback port and serve `script` from a background
    /// thread for the rest of the process.
    pub fn start(script: Script) -> std::io::Result<Self> {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        std_listener.set_nonblocking(true)?;
        let addr = std_listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::error!(error = %err, "failed to build runtime");
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match TcpListener::from_std(std_listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        tracing::error!(error = %err, %addr, "failed to adopt listener");
                        return;
                    }
                };
                serve(listener, Arc::new(script), recorded).await;
            });
        });

        Ok(Self { addr, requests })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://<addr><path>`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request heads received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn serve(listener: TcpListener, script: Arc<Script>, requests: Arc<Mutex<Vec<String>>>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        let script = Arc::clone(&script);
        let requests = Arc::clone(&requests);
        tokio::spawn(async move {
            if let Err(err) = replay(stream, &script, &requests).await {
                tracing::debug!(error = %err, %peer, "scripted connection ended early");
            }
        });
    }
}

async fn replay(
    mut stream: TcpStream,
    script: &Script,
    requests: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let head = read_head(&mut stream).await?;
    if let Ok(mut requests) = requests.lock() {
        requests.push(head);
    }

    for (i, part) in script.parts.iter().enumerate() {
        if i > 0 && !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        stream.write_all(part).await?;
        stream.flush().await?;
    }

    if script.close {
        stream.shutdown().await
    } else {
        tokio::time::sleep(HOLD).await;
        Ok(())
    }
}

async fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
