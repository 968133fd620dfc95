use anyhow::Context;
use chrono::Local;
use std::path::Path;
use tokio::{
    fs::{File, OpenOptions},
    io::{self, AsyncWrite, AsyncWriteExt},
};

/// Append-only record of a chat session.
///
/// Recording is best-effort: a failed append is logged and the session
/// carries on.
#[derive(Debug)]
pub struct Transcript<Sink> {
    sink: Sink,
}

impl<Sink> Transcript<Sink>
where
    Sink: AsyncWrite + Unpin,
{
    /// Wrap any writer as a transcript sink.
    pub fn new(sink: Sink) -> Self {
        Self { sink }
    }

    /// Append one line to the transcript.
    pub async fn record(&mut self, line: &str) {
        if let Err(error) = self.append(line).await {
            tracing::warn!("Failed to append to transcript: {error}");
        }
    }

    /// Take the sink back out.
    pub fn into_inner(self) -> Sink {
        self.sink
    }

    async fn append(&mut self, line: &str) -> io::Result<()> {
        self.sink.write_all(line.as_bytes()).await?;
        self.sink.write_all(b"\n").await?;
        self.sink.flush().await
    }
}

impl Transcript<File> {
    /// Open (or create) the transcript file at `path` and stamp a header.
    pub async fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open transcript at {}", path.display()))?;
        let mut transcript = Self::new(file);
        let header = format!(
            "Chat client log generated at: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        transcript.record(&header).await;
        transcript.record("").await;
        Ok(transcript)
    }
}
