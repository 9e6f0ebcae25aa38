use clap::Parser;

use muster::cli::command::Cli;
use muster::cli::{handler, output, paths};
use muster::retry::CancelToken;
use muster::settings::Settings;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let settings = match Settings::load(&paths::default_config()) {
        Ok(s) => s,
        Err(e) => {
            output::failure(format!("failed to load settings: {e}"));
            std::process::exit(1);
        }
    };

    let mut logging = settings.logging.clone();
    if cli.quiet {
        logging.level = "warn".into();
    } else if cli.verbose == 1 {
        logging.level = "debug".into();
    } else if cli.verbose >= 2 {
        logging.level = "trace".into();
    }
    logging.init();

    if let Err(e) = paths::ensure_home_dir() {
        output::failure(format!("failed to create {}: {e}", paths::home_dir().display()));
        std::process::exit(1);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let Err(e) = handler::dispatch(cli, settings, cancel).await {
        output::failure(e);
        std::process::exit(1);
    }
}
