use anyhow::Context;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        lookup_host,
        tcp::{ReadHalf, WriteHalf},
        TcpStream,
    },
};

/// A live connection to the chat server.
///
/// Holds the one socket used for the whole session. There is no
/// reconnection; once [`Connection::close`] has run, the connection is
/// spent.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl Connection {
    /// Resolve `host` and connect to the first candidate address.
    ///
    /// A failed connect is terminal; no further candidates are tried.
    pub async fn open(host: &str, port: u16) -> anyhow::Result<Self> {
        let mut candidates = lookup_host((host, port))
            .await
            .with_context(|| format!("Failed to resolve {host}"))?;
        let address = candidates
            .next()
            .with_context(|| format!("No addresses found for {host}"))?;
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("Failed to connect to {address}"))?;
        Ok(Self {
            stream: Some(stream),
            peer: address,
        })
    }

    /// Address of the server this connection points at.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Receive the server's welcome text.
    ///
    /// Performs exactly one receive and hands back whatever arrived,
    /// undecoded beyond UTF-8. Returns `None` if the server already hung up
    /// (the receive came back empty).
    pub async fn greeting(&mut self) -> anyhow::Result<Option<String>> {
        let stream = self.stream.as_mut().context("Connection is closed")?;
        let mut buffer = [0u8; 1024];
        let count = stream
            .read(&mut buffer)
            .await
            .context("Failed to receive greeting")?;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buffer[..count]).into_owned()))
    }

    /// Borrow the read and write halves of the socket.
    pub fn split(&mut self) -> anyhow::Result<(ReadHalf<'_>, WriteHalf<'_>)> {
        let stream = self.stream.as_mut().context("Connection is closed")?;
        Ok(stream.split())
    }

    /// Shut the socket down in both directions and release it.
    ///
    /// Safe to call more than once; anything after the first call is a
    /// no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.shutdown().await {
                tracing::debug!("Socket shutdown failed: {error}");
            }
        }
    }
}
