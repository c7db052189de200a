//! `doom` command-line entry point.

use clap::Parser;
use scpi_doom::{
    app::{self, App},
    cli::Cli,
    config::DoomConfig,
    console::Reporter,
    interrupt::Interrupt,
    logging,
};
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match DoomConfig::load_from(app::config_path(cli.config.clone())) {
        Ok(config) => config,
        Err(e) => {
            Reporter::stdout(true).error(format!("❌ {}", e));
            std::process::exit(1);
        }
    };
    logging::init(&config.application.log_level, config.application.color);
    debug!(?config, "Configuration loaded");

    let reporter = Reporter::stdout(config.application.color);
    let interrupt = Interrupt::new();
    interrupt.install_ctrl_c();

    let app = App::new(config, reporter.clone(), interrupt)
        .with_dry_run(cli.dry_run)
        .with_csv(cli.csv);

    if let Err(e) = app.run(cli.command).await {
        reporter.error(format!("❌ {}", e));
        std::process::exit(1);
    }
}
