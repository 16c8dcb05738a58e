use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use xtag_cli::cli::{Cli, Commands, ConfigCommands};
use xtag_cli::{run, ExitStatus, Printer, RunConfig};
use xtag_config::logging::init_logging;
use xtag_config::{log_cli_debug, log_cli_info, Config};
use xtag_record::XattrStore;

fn main() -> ExitCode {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Exit status 2 is reserved for runs with soft errors.
            return if e.use_stderr() {
                ExitCode::from(ExitStatus::HardFailure.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match real_main(cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("xtag: {:#}", e);
            ExitCode::from(ExitStatus::HardFailure.code())
        }
    }
}

fn real_main(cli: Cli) -> Result<ExitStatus> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(cli.log_level.unwrap_or(config.log.level));

    if let Commands::Config {
        command: ConfigCommands::Show { defaults },
    } = &cli.command
    {
        let rendered = if *defaults {
            Config::default_toml()?
        } else {
            config.to_toml()?
        };
        print!("{}", rendered);
        return Ok(ExitStatus::Success);
    }

    let cfg = RunConfig::from_cli(cli, &config)?;
    log_cli_debug!(
        "Starting run",
        command = cfg.command.name(),
        roots = cfg.paths.len(),
        multithread = cfg.multithread
    );

    let outcome = run(&cfg, &XattrStore::new(), &Printer::stdout())
        .with_context(|| format!("{} failed", cfg.command.name()))?;
    log_cli_info!(
        "Run finished",
        soft_errors = outcome.soft_errors,
        worker_errors = outcome.worker_errors
    );
    Ok(outcome.status())
}
