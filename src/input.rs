use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Read lines from `console` and forward them on `lines`.
///
/// Line endings are trimmed before forwarding. One read is pending at a
/// time; the next line is only read once the previous one has been handed
/// off.
///
/// # Termination
/// If EOF is signalled on `console` by `Ok(0)`, the future terminates.
/// If the receiving end of `lines` is gone, the future terminates.
/// If the `token` is cancelled, the future terminates. A read already in
/// flight on a real console has no cancel primitive and is abandoned.
pub async fn forward_lines<Console>(
    console: Console,
    lines: mpsc::Sender<String>,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    Console: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(console);
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            read = reader.read_line(&mut line) => {
                let bytes_read = read.context("Failed to read line from console")?;
                if bytes_read == 0 {
                    break Ok(()); // EOF detected.
                }
                if line.ends_with('\n') {
                    line.pop();
                }
                if line.ends_with('\r') {
                    line.pop();
                }
                if lines.send(line.clone()).await.is_err() {
                    break Ok(());
                }
            },
            _ = token.cancelled() => {
                break Ok(());
            },
        }
    }
}
