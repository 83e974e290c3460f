use clap::Parser;
use huddle_client::{
    models::RenderedLine, ChannelTranscriptClient, ClientConfig, ConnectionState,
    TranscriptEvent, TranscriptHandle,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Follow a channel transcript; lines typed on stdin are sent to the channel.
#[derive(Parser, Debug)]
#[command(name = "huddle-tail", version)]
struct Args {
    /// Channel to open.
    channel_id: String,

    /// Bearer token (overrides HUDDLE_TOKEN).
    #[arg(long, env = "HUDDLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Load history without opening a live connection.
    #[arg(long)]
    history_only: bool,
}

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if args.token.is_some() {
        config.token = args.token.clone();
    }
    if args.history_only {
        config.token = None;
    }

    let client = match ChannelTranscriptClient::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    let handle = match client.open(&args.channel_id, &config.session()) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    run(handle).await;
}

async fn run(mut handle: TranscriptHandle) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line() => match line {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    if let Err(e) = handle.send(text) {
                        eprintln!("! {}", e);
                    }
                }
                Ok(Some(_)) => {}
                // stdin closed; keep following
                Ok(None) | Err(_) => {
                    handle_events(&mut handle, &mut printed).await;
                    break;
                }
            },
            event = handle.next_event() => match event {
                Some(event) => on_event(&handle, event, &mut printed),
                None => break,
            },
        }
    }

    handle.shutdown().await;
}

/// Follows the transcript until the live connection ends.
async fn handle_events(handle: &mut TranscriptHandle, printed: &mut usize) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return,
            event = handle.next_event() => match event {
                Some(event) => on_event(handle, event, printed),
                None => return,
            },
        }
        if matches!(
            handle.connection_state(),
            ConnectionState::Closed | ConnectionState::Errored
        ) {
            return;
        }
    }
}

fn on_event(handle: &TranscriptHandle, event: TranscriptEvent, printed: &mut usize) {
    match event {
        // Older history can land above lines already printed, so reprint
        TranscriptEvent::HistoryLoaded { .. } => {
            for line in handle.rendered() {
                print_line(&line);
            }
            *printed = handle.len();
        }
        TranscriptEvent::ScrollToLatest => {
            let lines = handle.rendered();
            for line in lines.iter().skip(*printed) {
                print_line(line);
            }
            *printed = lines.len();
        }
        TranscriptEvent::HistoryUnavailable { reason } => eprintln!("! history unavailable: {}", reason),
        TranscriptEvent::LiveTransportError { reason } => eprintln!("! live connection: {}", reason),
        TranscriptEvent::SendFailed { content } => eprintln!("! not sent: {}", content),
        TranscriptEvent::ConnectionChanged(state) => eprintln!("* {:?}", state),
        TranscriptEvent::UserJoined { user_id, username } => {
            eprintln!("* {} joined", username.unwrap_or(user_id))
        }
        TranscriptEvent::UserLeft { user_id, username } => {
            eprintln!("* {} left", username.unwrap_or(user_id))
        }
        TranscriptEvent::MessageEdited(message) => {
            eprintln!("* message {} edited: {}", message.id, message.content)
        }
        TranscriptEvent::MessageDeleted { id } => eprintln!("* message {} deleted", id),
        TranscriptEvent::Typing { .. } | TranscriptEvent::MessageAppended(_) => {}
    }
}

fn print_line(line: &RenderedLine) {
    let edited = if line.edited { " (edited)" } else { "" };
    println!(
        "[{}] {}: {}{}",
        line.created_at.format("%H:%M:%S"),
        line.sender,
        line.content,
        edited
    );
}
