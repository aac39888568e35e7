//! `sessionbroker` binary entry point: parses CLI flags, binds the TCP
//! listener, and runs the accept loop alongside the supervisor task until a
//! shutdown signal arrives.

use std::net::SocketAddr;

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use sessionbroker::action::{ActionSender, SupervisorAction};
use sessionbroker::config::Config;
use sessionbroker::error::StartupError;
use sessionbroker::{limits, session, supervisor};

/// TCP session relay for collaborative live-editing clients.
#[derive(Parser, Debug)]
#[command(name = "sessionbroker", version, about)]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = limits::DEFAULT_PORT)]
    port: u16,

    /// Interface to bind.
    #[arg(long, default_value = limits::DEFAULT_BIND)]
    bind: String,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::new(cli.port, cli.bind, cli.verbose);
    init_logging(config.verbosity);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

fn init_logging(verbosity: log::LevelFilter) {
    env_logger::Builder::new().filter_level(verbosity).format_timestamp_millis().init();
}

async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.listen_address().parse().map_err(StartupError::InvalidAddress)?;

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = StartupError::Bind { addr: addr.to_string(), source };
            error!("{err}");
            return Err(err.into());
        }
    };
    info!("sessionbroker listening on {addr}");

    let (actions_tx, actions_rx) = mpsc::unbounded_channel::<SupervisorAction>();
    let supervisor_handle = tokio::spawn(supervisor::run(actions_tx.clone(), actions_rx));

    tokio::select! {
        result = accept_loop(listener, actions_tx.clone()) => result?,
        () = shutdown_signal() => {
            info!("shutdown signal received, closing listener");
        }
    }

    drop(actions_tx);
    let _ = supervisor_handle.await;
    Ok(())
}

/// Accept connections until the listener errors. Never blocks on a slow
/// client: each accepted socket is handed off to its own reader/writer pair
/// immediately.
async fn accept_loop(listener: TcpListener, actions: ActionSender) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("accepted connection from {peer}");
        session::spawn(stream, actions.clone()).await;
    }
}

/// Resolves on SIGINT (all platforms) or SIGTERM (Unix). No graceful drain is
/// attempted: sockets and timers are simply dropped as tasks unwind.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
