use anyhow::Context;
use secret_friend_backend::{app, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr;
    match &config.persist_path {
        Some(path) => info!(path = %path.display(), "persisting state to file"),
        None => info!("no PERSIST_PATH set, state is kept in memory only"),
    }

    let state = AppState::from_config(config)
        .await
        .context("failed to open the store")?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(%bind_addr, "starting server");
    axum::serve(listener, app(state))
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("secret_friend_backend=info,tower_http=info")),
        )
        .with_target(true)
        .init();
}
