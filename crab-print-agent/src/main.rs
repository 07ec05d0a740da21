use clap::Parser;
use crab_print_agent::AgentSettings;
use crab_print_agent::cli::{self, Cli, Commands, EXIT_FAILED, EXIT_OK};
use crab_print_agent::utils::{init_logger, init_logger_with_file};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = AgentSettings::load(cli.work_dir());

    if let Commands::Run = cli.command {
        init_logger_with_file(Some(&settings.log_level), Some(settings.log_dir().as_path()));
        return run(settings);
    }

    init_logger("warn");
    match cli::execute(&cli.command, &settings) {
        Ok(line) => {
            println!("{line}");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(cli::exit_code(&e))
        }
    }
}

fn run(settings: AgentSettings) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build tokio runtime");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    tracing::info!(work_dir = %settings.work_dir.display(), "Crab print agent starting");
    match runtime.block_on(cli::run_service(settings)) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            tracing::error!("Print agent exited: {e:#}");
            ExitCode::from(cli::exit_code(&e))
        }
    }
}
