use clap::Parser;

use ffbuilder::cli::{self, Cli};
use ffbuilder::config::AppConfig;
use ffbuilder::core::error::FfxError;
use ffbuilder::logging;

fn main() {
    let cli = Cli::parse();
    let use_tui = cli.command.wants_tui();
    // The full-screen view owns the terminal, so stderr logging stays off.
    if !use_tui {
        logging::init(cli.verbose);
    }

    if let Err(err) = run(cli, use_tui) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, use_tui: bool) -> Result<(), FfxError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env();
    cli::execute(cli.command, &config, use_tui)
}
