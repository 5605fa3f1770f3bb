use airq_server::{app, logging, AppConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(Some(&args.config))?;

    logging::init_logging(&config.logging)?;
    tracing::info!("Starting air quality pipeline with config: {}", args.config);

    app::run(config).await
}
