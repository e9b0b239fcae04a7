//! Server network layer handling the TCP accept loop and per-connection framing

use crate::session_manager::{SessionError, SessionLog, SessionManager};
use log::{debug, error, info, warn};
use shared::framing::{Framer, FramingError};
use shared::{TelemetryEvent, SENTINEL};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

/// Settings for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:4444`
    pub addr: String,
    /// Directory holding one sub-directory per session
    pub root: PathBuf,
    /// Extra roots receiving a copy of every session log
    pub mirrors: Vec<PathBuf>,
    /// Longest a single read may block before the connection is dropped
    pub read_timeout: Duration,
    /// Size of the socket read buffer
    pub buffer_size: usize,
    /// Most bytes buffered for one message before it is dropped
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:4444".to_string(),
            root: PathBuf::from("Monitorization"),
            mirrors: Vec::new(),
            read_timeout: Duration::from_secs(300),
            buffer_size: 8192,
            max_message_size: 1 << 20,
        }
    }
}

/// Reasons a connection ends early. None of them stop the accept loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// How a connection came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The client closed the stream
    Closed,
    /// No data arrived within the read timeout
    TimedOut,
    /// The server was asked to stop
    Shutdown,
}

/// Counters for one served connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub messages_persisted: u64,
    pub messages_dropped: u64,
    pub sessions_opened: u32,
    /// Bytes of an unterminated message left when the connection ended
    pub bytes_discarded: usize,
}

/// State of the connection currently being served: the framer's carry
/// buffer and the open session log, if the client has registered.
pub struct Connection<'a> {
    sessions: &'a SessionManager,
    framer: Framer,
    log: Option<SessionLog>,
    stats: ConnectionStats,
}

impl<'a> Connection<'a> {
    pub fn new(sessions: &'a SessionManager) -> Self {
        Self {
            sessions,
            framer: Framer::new(),
            log: None,
            stats: ConnectionStats::default(),
        }
    }

    /// Drops any message that grows past `limit` bytes without ending.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.framer = Framer::with_limit(limit);
        self
    }

    pub fn log(&self) -> Option<&SessionLog> {
        self.log.as_ref()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Processes the bytes of one socket read.
    pub async fn handle_bytes(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        for result in self.framer.feed(bytes) {
            match result {
                Ok(message) => self.handle_message(&message).await?,
                Err(e) => {
                    warn!("Dropping message: {}", e);
                    self.stats.messages_dropped += 1;
                }
            }
        }
        Ok(())
    }

    /// Registers the session if the message asks for it, then persists the
    /// message.
    async fn handle_message(&mut self, message: &str) -> Result<(), SessionError> {
        // Cheap substring check first; most messages are camera updates.
        if message.contains("REGISTRATION") {
            match TelemetryEvent::parse(message).map_err(FramingError::from) {
                Ok(event) if event.is_registration() => self.register(event).await?,
                Ok(_) => {}
                Err(e) => warn!("Could not inspect possible registration: {}", e),
            }
        }

        match self.log.as_mut() {
            Some(log) => {
                log.append(message).await?;
                self.stats.messages_persisted += 1;
            }
            None => {
                warn!("Dropping message received before registration");
                self.stats.messages_dropped += 1;
            }
        }
        Ok(())
    }

    async fn register(&mut self, event: TelemetryEvent) -> Result<(), SessionError> {
        let Some(user_name) = event.user_name else {
            warn!("Registration without user_name ignored");
            return Ok(());
        };

        if let Some(previous) = self.log.take() {
            info!("Session {} registered again", previous.session_id());
            previous.close().await?;
        }

        self.log = Some(self.sessions.open_session(&user_name).await?);
        self.stats.sessions_opened += 1;
        Ok(())
    }

    /// Closes the open log and reports what happened on the connection.
    pub async fn finish(mut self) -> Result<ConnectionStats, SessionError> {
        let remainder = self.framer.take_pending();
        if !remainder.is_empty() {
            warn!(
                "Discarding {} bytes of an unterminated message (no {} seen)",
                remainder.len(),
                SENTINEL
            );
            self.stats.bytes_discarded = remainder.len();
        }

        if let Some(log) = self.log.take() {
            log.close().await?;
        }
        Ok(self.stats)
    }
}

/// Ingestion server serving one connection at a time
pub struct Server {
    listener: TcpListener,
    sessions: SessionManager,
    read_timeout: Duration,
    buffer_size: usize,
    max_message_size: usize,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            sessions: SessionManager::new(config.root, config.mirrors),
            read_timeout: config.read_timeout,
            buffer_size: config.buffer_size.max(1),
            max_message_size: config.max_message_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns once `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            info!("Waiting for a connection");

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Connected by {}", addr);
                        match self.handle_connection(stream, &mut shutdown).await {
                            Ok((end, stats)) => info!(
                                "Connection from {} ended ({:?}): {} persisted, {} dropped, {} sessions",
                                addr,
                                end,
                                stats.messages_persisted,
                                stats.messages_dropped,
                                stats.sessions_opened
                            ),
                            Err(e) => error!("Connection from {} failed: {}", addr, e),
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Server shutting down");
    }

    /// Serves one connection until it closes, times out or the server stops.
    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(ConnectionEnd, ConnectionStats), ConnectionError> {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut connection =
            Connection::new(&self.sessions).with_message_limit(self.max_message_size);

        let end = loop {
            let read = tokio::select! {
                read = timeout(self.read_timeout, stream.read(&mut buffer)) => read,
                _ = shutdown.changed() => break ConnectionEnd::Shutdown,
            };

            match read {
                Err(_) => {
                    warn!("No data for {:?}, closing connection", self.read_timeout);
                    break ConnectionEnd::TimedOut;
                }
                Ok(Err(e)) => {
                    // Keep what was already persisted before reporting.
                    connection.finish().await?;
                    return Err(ConnectionError::Socket(e));
                }
                Ok(Ok(0)) => break ConnectionEnd::Closed,
                Ok(Ok(n)) => {
                    debug!("Read {} bytes", n);
                    connection.handle_bytes(&buffer[..n]).await?;
                }
            }
        };

        let stats = connection.finish().await?;
        Ok((end, stats))
    }
}
