// Draft board server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database
// 4. Build the notifier and draft board
// 5. Spawn WebSocket server task
// 6. Wait for Ctrl+C, then shut down

use std::sync::Arc;

use anyhow::Context;
use draftboard_core::board::DraftBoard;
use draftboard_core::db::Database;
use draftboard_core::notify::Notifier;
use draftboard_server::{config, ws_server};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft board starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    let db_path = config
        .database_path()
        .context("failed to resolve database path")?;
    info!(
        "Config loaded: listen={}, mailbox_capacity={}",
        config.listen_addr(),
        config.notifications.mailbox_capacity
    );

    // 3. Open database
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db_path_str = db_path
        .to_str()
        .context("database path is not valid UTF-8")?;
    let db = Database::open(db_path_str).context("failed to open database")?;
    info!("Database opened at {}", db_path.display());

    // 4. Notifier and board
    let notifier = Notifier::new(config.notifications.mailbox_capacity);
    let board = Arc::new(DraftBoard::new(db, notifier));

    // 5. Spawn WebSocket server task
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, board).await {
            error!("WebSocket server error: {}", e);
        }
    });

    // 6. Run until Ctrl+C
    info!("Draft board ready on ws://{listen_addr}");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    server_handle.abort();
    info!("Draft board shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftboard=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
