use crate::transcript::Transcript;
use anyhow::Context;
use chrono::{DateTime, Local};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

/// The in-band token either side sends to end the session.
pub const SENTINEL: &str = "exit";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Socket opened, greeting not yet received.
    Connecting,
    /// Greeting received, interaction loop may run.
    Connected,
    /// Interaction is over, socket not yet released.
    Closing,
    /// Socket released.
    Closed,
}

/// Why the interaction loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The operator typed the exit token.
    LocalExit,
    /// The server sent the exit token.
    RemoteExit,
    /// The receive came back empty, or a transmission failed.
    ConnectionLost,
}

impl CloseReason {
    /// The line shown and recorded when the loop winds down.
    pub fn notice(self) -> &'static str {
        match self {
            Self::LocalExit => "Exit sent, initiating disconnect.",
            Self::RemoteExit => "Exit received, initiating disconnect.",
            Self::ConnectionLost => "Connection lost.",
        }
    }
}

/// The single chat session of one process run.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    state: State,
    last_activity: DateTime<Local>,
}

impl Session {
    /// A fresh session against `peer`, not yet connected.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: State::Connecting,
            last_activity: Local::now(),
        }
    }

    /// Address of the server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Mark the greeting as received.
    pub fn established(&mut self) {
        self.state = State::Connected;
    }

    /// Mark the socket as released.
    pub fn closed(&mut self) {
        self.state = State::Closed;
    }

    fn touch(&mut self) {
        self.last_activity = Local::now();
    }

    /// Race console lines against server pushes until either side exits.
    ///
    /// Each receive on `reader` is treated as one message: if it decodes to
    /// the exit token the loop winds down, otherwise the text is shown on
    /// `screen` and recorded. Note that TCP gives no message boundaries;
    /// peer writes may arrive split or merged, and no reassembly is
    /// attempted.
    ///
    /// Each line on `lines` is a completed operator read: an empty line is
    /// discarded, the exit token is sent verbatim as the final transmission,
    /// and any other line is sent with a timestamp prefix, then shown and
    /// recorded. Sends are awaited one at a time; a failed send ends the
    /// session.
    ///
    /// # Termination
    /// If the receive returns `Ok(0)` or an error, the loop ends with
    /// [`CloseReason::ConnectionLost`].
    /// If the received text is the exit token, the loop ends with
    /// [`CloseReason::RemoteExit`], without transmitting anything.
    /// If the operator line is the exit token, or `lines` is exhausted, the
    /// token is sent and the loop ends with [`CloseReason::LocalExit`],
    /// without waiting for a reply.
    /// In every case the state moves to [`State::Closing`] and the reason's
    /// notice is written to `screen` and `transcript`.
    pub async fn run<Reader, Writer, Screen, Sink>(
        &mut self,
        mut reader: Reader,
        mut writer: Writer,
        mut lines: mpsc::Receiver<String>,
        mut screen: Screen,
        transcript: &mut Transcript<Sink>,
    ) -> anyhow::Result<CloseReason>
    where
        Reader: AsyncRead + Unpin,
        Writer: AsyncWrite + Unpin,
        Screen: AsyncWrite + Unpin,
        Sink: AsyncWrite + Unpin,
    {
        let mut buffer = [0u8; 1024];
        let reason = loop {
            tokio::select! {
                received = reader.read(&mut buffer) => {
                    let count = match received {
                        Ok(count) => count,
                        Err(error) => {
                            tracing::debug!("Receive failed: {error}");
                            break CloseReason::ConnectionLost;
                        }
                    };
                    if count == 0 {
                        break CloseReason::ConnectionLost; // EOF detected.
                    }
                    self.touch();
                    let message = String::from_utf8_lossy(&buffer[..count]).into_owned();
                    if is_sentinel(&message) {
                        break CloseReason::RemoteExit;
                    }
                    screen
                        .write_all(format!("{message}\n").as_bytes())
                        .await
                        .context("Failed to display message")?;
                    transcript.record(&message).await;
                },
                line = lines.recv() => {
                    let line = match line {
                        Some(line) => line,
                        // Console went away; wind down like a typed exit.
                        None => break self.send_sentinel(&mut writer, transcript).await,
                    };
                    if line.is_empty() {
                        continue;
                    }
                    self.touch();
                    if line == SENTINEL {
                        break self.send_sentinel(&mut writer, transcript).await;
                    }
                    let message = outbound(self.last_activity, &line);
                    if let Err(error) = writer.write_all(message.as_bytes()).await {
                        tracing::debug!("Send failed: {error}");
                        break CloseReason::ConnectionLost;
                    }
                    screen
                        .write_all(format!("{message}\n").as_bytes())
                        .await
                        .context("Failed to display message")?;
                    transcript.record(&message).await;
                },
            }
        };
        self.state = State::Closing;
        screen
            .write_all(format!("{}\n", reason.notice()).as_bytes())
            .await
            .context("Failed to display notice")?;
        transcript.record(reason.notice()).await;
        Ok(reason)
    }

    async fn send_sentinel<Writer, Sink>(
        &mut self,
        writer: &mut Writer,
        transcript: &mut Transcript<Sink>,
    ) -> CloseReason
    where
        Writer: AsyncWrite + Unpin,
        Sink: AsyncWrite + Unpin,
    {
        if let Err(error) = writer.write_all(SENTINEL.as_bytes()).await {
            tracing::debug!("Send failed: {error}");
            return CloseReason::ConnectionLost;
        }
        transcript.record(SENTINEL).await;
        CloseReason::LocalExit
    }
}

/// `true` for the exact exit token, tolerating a trailing line break.
pub fn is_sentinel(text: &str) -> bool {
    text == SENTINEL || text == "exit\n" || text == "exit\r\n"
}

/// Compose the line sent for operator `input` at time `at`.
pub fn outbound(at: DateTime<Local>, input: &str) -> String {
    format!("[{}] client: {}", at.format("%H:%M:%S"), input)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::io::Builder as Mock;

    fn session() -> Session {
        Session::new("127.0.0.1:5000".parse().unwrap())
    }

    #[test]
    fn composes_prefixed_outbound_message() {
        let at = Local.with_ymd_and_hms(2017, 10, 23, 12, 0, 0).unwrap();
        assert_eq!(outbound(at, "hello"), "[12:00:00] client: hello");
    }

    #[test]
    fn sentinel_matches_exactly() {
        assert!(is_sentinel("exit"));
        assert!(is_sentinel("exit\n"));
        assert!(is_sentinel("exit\r\n"));
        assert!(!is_sentinel("exit now"));
        assert!(!is_sentinel("Exit"));
        assert!(!is_sentinel("please exit"));
    }

    #[tokio::test]
    async fn displays_and_records_server_messages() {
        let reader = Mock::new().read(b"Welcome").build();
        let mut writer = Vec::new();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (_tx, lines) = mpsc::channel(4);

        let mut session = session();
        let reason = session
            .run(reader, &mut writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        // The mock is exhausted after "Welcome", so the next receive is EOF.
        assert_eq!(reason, CloseReason::ConnectionLost);
        assert_eq!(session.state(), State::Closing);
        assert!(writer.is_empty());
        assert_eq!(
            String::from_utf8(screen).unwrap(),
            "Welcome\nConnection lost.\n"
        );
        assert_eq!(
            String::from_utf8(transcript.into_inner()).unwrap(),
            "Welcome\nConnection lost.\n"
        );
    }

    #[tokio::test]
    async fn empty_receive_closes_the_session() {
        let reader = Mock::new().build();
        let mut writer = Vec::new();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (_tx, lines) = mpsc::channel(4);

        let mut session = session();
        let reason = session
            .run(reader, &mut writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::ConnectionLost);
        assert!(writer.is_empty());
        assert_eq!(String::from_utf8(screen).unwrap(), "Connection lost.\n");
    }

    #[tokio::test]
    async fn remote_exit_transmits_nothing() {
        let reader = Mock::new().read(b"exit").build();
        let mut writer = Vec::new();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (_tx, lines) = mpsc::channel(4);

        let mut session = session();
        let reason = session
            .run(reader, &mut writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::RemoteExit);
        assert_eq!(session.state(), State::Closing);
        assert!(writer.is_empty());
        assert_eq!(
            String::from_utf8(screen).unwrap(),
            "Exit received, initiating disconnect.\n"
        );
    }

    #[tokio::test]
    async fn local_exit_sends_the_bare_token() {
        // The far end of the duplex is kept open so the socket stays quiet.
        let (reader, _server) = tokio::io::duplex(64);
        let writer = Mock::new().write(b"exit").build();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (tx, lines) = mpsc::channel(4);

        tx.send("exit".to_string()).await.unwrap();

        let mut session = session();
        let reason = session
            .run(reader, writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::LocalExit);
        assert_eq!(
            String::from_utf8(screen).unwrap(),
            "Exit sent, initiating disconnect.\n"
        );
        assert_eq!(
            String::from_utf8(transcript.into_inner()).unwrap(),
            "exit\nExit sent, initiating disconnect.\n"
        );
    }

    #[tokio::test]
    async fn empty_lines_are_discarded() {
        let (reader, _server) = tokio::io::duplex(64);
        let writer = Mock::new().write(b"exit").build();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (tx, lines) = mpsc::channel(4);

        tx.send(String::new()).await.unwrap();
        tx.send("exit".to_string()).await.unwrap();

        let mut session = session();
        let reason = session
            .run(reader, writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        // The empty line caused no transmission; the mock writer only saw
        // the exit token.
        assert_eq!(reason, CloseReason::LocalExit);
    }

    #[tokio::test]
    async fn sends_prefixed_message_and_echoes_it() {
        let (reader, _server) = tokio::io::duplex(64);
        let mut writer = Vec::new();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (tx, lines) = mpsc::channel(4);

        tx.send("hello".to_string()).await.unwrap();
        tx.send("exit".to_string()).await.unwrap();

        let mut session = session();
        let reason = session
            .run(reader, &mut writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::LocalExit);
        let sent = String::from_utf8(writer).unwrap();
        assert!(sent.starts_with('['));
        assert!(sent.contains("] client: hello"));
        assert!(sent.ends_with("exit"));
        let shown = String::from_utf8(screen).unwrap();
        assert!(shown.contains("] client: hello\n"));
    }

    #[tokio::test]
    async fn console_gone_winds_down_like_a_typed_exit() {
        let (reader, _server) = tokio::io::duplex(64);
        let writer = Mock::new().write(b"exit").build();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (tx, lines) = mpsc::channel(4);
        drop(tx);

        let mut session = session();
        let reason = session
            .run(reader, writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::LocalExit);
    }

    #[tokio::test]
    async fn failed_send_is_a_lost_connection() {
        let (reader, _server) = tokio::io::duplex(64);
        let writer = Mock::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            ))
            .build();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (tx, lines) = mpsc::channel(4);

        tx.send("hello".to_string()).await.unwrap();

        let mut session = session();
        let reason = session
            .run(reader, writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::ConnectionLost);
    }

    #[tokio::test]
    async fn failed_receive_is_a_lost_connection() {
        let reader = Mock::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
            .build();
        let mut writer = Vec::new();
        let mut screen = Vec::new();
        let mut transcript = Transcript::new(Vec::new());
        let (_tx, lines) = mpsc::channel(4);

        let mut session = session();
        let reason = session
            .run(reader, &mut writer, lines, &mut screen, &mut transcript)
            .await
            .unwrap();

        assert_eq!(reason, CloseReason::ConnectionLost);
        assert!(writer.is_empty());
    }

    #[test]
    fn state_follows_the_session_lifecycle() {
        let mut session = session();
        assert_eq!(session.state(), State::Connecting);
        session.established();
        assert_eq!(session.state(), State::Connected);
        session.closed();
        assert_eq!(session.state(), State::Closed);
    }
}
