use clap::Parser;
use energy_sim::{shutdown::wait_for_signal, Cli, SimConfig, Simulator};
use log::{debug, error, info};
use std::process::ExitCode;


#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    let default_filter = std::env::var("SIM_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let cli = Cli::parse();
    let config = match SimConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("{:#?}", config);

    let mut simulator = match Simulator::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        let signal = wait_for_signal().await;
        info!("Stopping simulation on {signal:?}");
    };

    match simulator.run(shutdown).await {
        Ok(summary) => {
            info!("Done: {} sent, {} failed{}", summary.sent, summary.failed,
                  if summary.interrupted { " (interrupted)" } else { "" });
            return ExitCode::SUCCESS;
        },
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }
}
