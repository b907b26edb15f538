use std::fs::OpenOptions;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod handler;
mod identity;
mod launcher;
mod processor;
mod protocol;
mod socket;
mod tui;
mod ui;

use app::App;
use config::{Config, Overrides};
use handler::{ChatLink, Session};
use identity::IdentityStore;
use processor::MessageProcessor;
use socket::{SocketClient, SocketConfig};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "botchat")]
#[command(about = "Terminal chat widget for a socket-connected conversational agent")]
struct Cli {
    /// Agent endpoint, e.g. localhost:3000 or wss://bot.example.org
    #[arg(long)]
    href: Option<String>,

    /// Header title shown above the transcript
    #[arg(long)]
    title: Option<String>,

    /// Header subtitle, also used as the agent's name
    #[arg(long)]
    subtitle: Option<String>,

    /// Upper bound of the random reconnect delay in milliseconds
    #[arg(long)]
    reconnect_jitter_ms: Option<u64>,

    /// Log at info level instead of warn
    #[arg(long)]
    debug: bool,

    /// Forget the stored client identity and generate a new one
    #[arg(long)]
    reset_identity: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.debug)?;

    let settings = Config::load()?.resolve(Overrides {
        endpoint: cli.href,
        title: cli.title,
        subtitle: cli.subtitle,
        reconnect_jitter_ms: cli.reconnect_jitter_ms,
    })?;

    let store = IdentityStore::default_location()?;
    if cli.reset_identity {
        store.clear()?;
    }
    let identity = store.get_or_create_identity()?;
    info!(path = %store.path().display(), "client identity loaded");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let (socket_tx, socket_rx) = mpsc::unbounded_channel();
    events.attach_socket(socket_rx);

    let socket = SocketClient::new(
        identity,
        SocketConfig {
            reconnect_jitter: settings.reconnect_jitter,
        },
        socket_tx,
    );
    info!(identity = socket.identity(), endpoint = %settings.endpoint, "starting chat session");
    let processor = MessageProcessor::spawn(events.sender());
    let mut session = Session::new(settings.endpoint, socket, processor);
    let mut app = App::new(settings.title, settings.subtitle);

    let result = run(&mut terminal, &mut app, &mut events, &mut session).await;

    session.teardown();
    // Let the socket task send its close frame before the runtime goes away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut EventHandler,
    session: &mut Session,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, session, event);
    }
    Ok(())
}

/// The terminal belongs to the UI, so logs go to a file under the data dir.
fn init_logging(debug: bool) -> Result<WorkerGuard> {
    let log_dir = config::data_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let mut log_file_opts = OpenOptions::new();
    log_file_opts.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        log_file_opts.mode(0o600);
    }

    let log_file = log_file_opts.open(log_dir.join("botchat.log"))?;
    let (non_blocking, guard) = non_blocking(log_file);

    let default_filter = if debug { "botchat=info" } else { "botchat=warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(false)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(file_layer).try_init();
    Ok(guard)
}
