//! # Telemetry Ingestion Server Library
//!
//! This library receives the telemetry stream of the AR driving game and
//! stores it as per-session log files for later replay and analysis.
//!
//! ## Core Responsibilities
//!
//! ### Stream Reassembly
//! The application writes JSON objects back to back on a TCP stream with no
//! length prefix. Every object ends with the same `messageEnd` field, whose
//! text acts as the boundary. A socket read can hold several messages or end
//! in the middle of one, so the server keeps a carry buffer per connection
//! and only ever persists complete messages.
//!
//! ### Session Management
//! A `REGISTRATION` message names the participant. The server maps the name
//! to a session directory and opens the first unused numbered log in it.
//! Every later message on the connection is appended to that log as one
//! line, flushed as it is written.
//!
//! ## Architecture Design
//!
//! ### Single Connection Accept Loop
//! The study runs one phone against one server. The accept loop serves the
//! active connection inline and only accepts the next one after it ends, so
//! the open log files never need locking. A read timeout and a shutdown
//! signal bound how long a stalled client can hold the server.
//!
//! ### Contained Failures
//! Malformed messages are dropped individually. Filesystem failures end the
//! current connection only; the accept loop keeps running.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - TCP listener and accept loop with retry
//! - Per-connection framing and registration handling
//! - Per-message size limit
//! - Read timeout and graceful shutdown
//!
//! ### Session Manager Module (`session_manager`)
//! - Session directory creation (idempotent)
//! - Log file numbering and append-only writes
//! - Optional mirror roots
//!
//! ### Test Client (`bin/test_client`)
//! - Streams a short sample game to a running server for manual checks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig {
//!         addr: "0.0.0.0:4444".to_string(),
//!         ..ServerConfig::default()
//!     })
//!     .await?;
//!
//!     // Keep the sender alive; sending `true` stops the server.
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     server.run(shutdown_rx).await;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod session_manager;
