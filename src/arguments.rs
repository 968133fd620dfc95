use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Command Line Arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Arguments {
    /// Host name or IP address of the chat server.
    #[clap(value_parser)]
    pub host: String,

    /// Port the chat server listens on.
    ///
    /// The parser tolerates leaving this out, but connecting requires it.
    /// A missing port is reported before any connection attempt.
    #[clap(value_parser)]
    pub port: Option<u16>,

    /// File the session transcript is appended to.
    #[clap(short, long, value_parser, default_value = "chat_client_log.txt")]
    pub transcript: PathBuf,

    /// Address to publish console events on.
    #[clap(short, long, value_parser)]
    pub console: Option<SocketAddr>,
}
