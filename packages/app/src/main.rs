use app::{bootstrap, init_tracing, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let app = bootstrap(config).await?;
    tracing::info!(
        "Dispatch running with {} workers, Ctrl-C to stop",
        app.pool.worker_count().await?
    );

    tokio::signal::ctrl_c().await?;
    app.shutdown(true).await?;
    Ok(())
}
