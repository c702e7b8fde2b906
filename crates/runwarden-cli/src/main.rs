// Runwarden CLI Entry Point

use clap::Parser;
use runwarden_cli::{
    cli::{Cli, Commands, ConfigAction},
    error::CliError,
    logging, runner, signals,
};
use runwarden_config::{ConfigManager, ConfigManagerTrait, RunnerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet, &config.log_level) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    let code = match execute(cli.command, config).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("{}", e.user_message());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, CliError> {
    let mut manager = match &cli.config_file {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = manager.load_config()?;
    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config);
        manager.validate_config(&config)?;
    }
    Ok(config)
}

async fn execute(command: Commands, config: RunnerConfig) -> Result<(), CliError> {
    match command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            signals::cancel_on_shutdown(cancel.clone());

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let count = runner::run_program(&config, args.argv, cancel.clone(), &mut out).await;
            cancel.cancel();
            debug!(result = ?count.as_ref().ok(), "Run complete");
            count.map(|_| ())
        }
        Commands::Config(ConfigAction::Show) => {
            let text = toml::to_string(&config).map_err(runwarden_config::ConfigError::from)?;
            print!("{}", text);
            Ok(())
        }
    }
}
