use anyhow::Result;
use obix_server::infra::{config::Config, startup};
use tracing::info;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    startup::init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.multi_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    info!(
        listen = %config.listen_socket,
        backup_period = ?config.dev_backup_period,
        "starting obix-server"
    );
    let listen_socket = config.listen_socket;
    let state = startup::build_state(config)?;
    let app = obix_server::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(listen_socket).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.core.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
