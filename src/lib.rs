#![warn(missing_docs)]

//! A small interactive chat client built from simple tokio tasks and channels.
//!
//! The `parley` binary connects to a chat server, prints the server's
//! greeting, then races operator input against server pushes until either
//! side sends the text `exit`. Every message and lifecycle event is appended
//! to a transcript file.

use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize the console subscriber at the address indicated.
pub fn init_console_subscriber(addr: SocketAddr) {
    console_subscriber::ConsoleLayer::builder()
        .retention(Duration::from_secs(60))
        .server_addr(addr)
        .init();
}

/// Initialize stderr logging, filtered by `RUST_LOG`.
///
/// Diagnostics go to stderr so chat output on stdout stays clean.
pub fn init_fmt_subscriber() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Command line arguments.
pub mod arguments;

/// Resolve, connect, take the greeting, and shut the socket down.
pub mod connection;

/// Forward completed console lines onto a channel, one read at a time.
pub mod input;

/// The duplex interaction loop: race console lines against server pushes
/// over a single socket until either side sends the exit token.
pub mod session;

/// Append-only record of every message and lifecycle event.
pub mod transcript;

pub use arguments::Arguments;
