use anyhow::Context;
use clap::Parser;
use parley::{
    connection::Connection,
    init_console_subscriber, init_fmt_subscriber, input,
    session::{CloseReason, Session},
    transcript::Transcript,
    Arguments,
};
use tokio::{io, sync::mpsc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    if let Some(addr) = args.console {
        init_console_subscriber(addr);
    } else {
        init_fmt_subscriber();
    }

    let mut transcript = Transcript::create(&args.transcript)
        .await
        .context("Failed to open transcript")?;

    // The parser lets the port be omitted; connecting cannot.
    let port = args.port.context("Parameters: <host> <port>")?;

    let mut connection = match Connection::open(&args.host, port).await {
        Ok(connection) => connection,
        Err(error) => {
            let notice = format!("Unable to connect to server.\n{error:#}");
            println!("{notice}");
            transcript.record(&notice).await;
            return Ok(());
        }
    };

    let mut session = Session::new(connection.peer());

    let peer = session.peer();
    let notice = format!("Connected with {} at port {}", peer.ip(), peer.port());
    println!("{notice}");
    transcript.record(&notice).await;

    match connection.greeting().await? {
        Some(greeting) => {
            println!("{greeting}");
            transcript.record(&greeting).await;
            session.established();
        }
        None => {
            let notice = CloseReason::ConnectionLost.notice();
            println!("{notice}");
            transcript.record(notice).await;
            connection.close().await;
            return Ok(());
        }
    }

    let token = CancellationToken::new();
    let (tx, lines) = mpsc::channel(1);
    let console = tokio::spawn(input::forward_lines(io::stdin(), tx, token.clone()));

    let (reader, writer) = connection.split()?;
    let outcome = session
        .run(reader, writer, lines, io::stdout(), &mut transcript)
        .await;

    let notice = "Disconnecting from server...";
    println!("{notice}");
    transcript.record(notice).await;

    connection.close().await;
    session.closed();

    // The console has no cancel primitive; a read still in flight is
    // abandoned along with its task.
    token.cancel();
    console.abort();

    outcome?;
    Ok(())
}
