use clap::Parser;
use timestampbot::config::setup_logging;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = timestampbot::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let config = match cli.bot_config() {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };

    if let Err(err) = timestampbot::web::setup_server(config).await {
        error!("Application error: {}", err);
    }
}
