use clap::Parser;
use mailrelay::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting mailrelay...");
    tracing::info!("Address: {}", config.listen);
    tracing::info!("SMTP server: {}:{}", config.smtp.host, config.smtp.port);

    if let Err(e) = mailrelay::http::serve(config).await {
        tracing::error!("Failed to start server: {e}");
        std::process::exit(1);
    }
}
