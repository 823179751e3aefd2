use clap::Parser;
use logos_test::cli::{exit_status, Cli, INTERRUPTED_EXIT_CODE};
use logos_test::config::HarnessConfig;
use logos_test::harness::Harness;
use logos_test::host::{DynamicCore, InMemoryCore, LogosCore};
use logos_test::{logging, paths, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{e}");
    }

    match run(config, cli.simulate).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: HarnessConfig, simulate: bool) -> Result<u8> {
    let exe = std::env::current_exe()?;

    let plugins_dir = config.resolve_plugins_dir(&exe);
    if config.plugins_dir.is_some() {
        println!("Using custom module path: {}", plugins_dir.display());
    } else {
        println!("Using default module path: {}", plugins_dir.display());
    }

    let core: Arc<dyn LogosCore> = if simulate {
        info!("Using the in-process core");
        Arc::new(InMemoryCore::simulated())
    } else {
        let env_override = std::env::var_os(paths::CORE_LIBRARY_ENV).map(PathBuf::from);
        let library = config.resolve_core_library(&exe, env_override);
        let core = DynamicCore::open(&library)?;
        info!("Core library loaded from {}", core.path().display());
        Arc::new(core)
    };

    // The event loop blocks the main thread; Ctrl+C is handled from the runtime.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
        }
    });

    let summary = Harness::new(core, config, plugins_dir).run().await?;
    Ok(exit_status(summary.exit_code))
}
