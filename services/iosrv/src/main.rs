//! Pulse I/O gateway (`iosrv`)

use std::time::Duration;

use clap::Parser;
use common::bootstrap_args::ServiceArgs;
use common::logging::{self, LogConfig};
use errors::{GatewayError, GatewayResult};
use tracing::{error, info};

use iosrv::{Gateway, IoSrvConfig};

const SERVICE_NAME: &str = "iosrv";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let args = ServiceArgs::parse();

    // ============ Phase 1: Logging ============
    let log_dir = args.log_dir();
    logging::init_with_config(LogConfig {
        service_name: SERVICE_NAME.to_string(),
        log_dir: log_dir.clone(),
        console_level: args.parse_log_level(),
        file_level: tracing::Level::DEBUG,
        enable_json: args.json_logs,
        enable_ansi: !args.no_color,
    })
    .map_err(|e| GatewayError::Internal(format!("Failed to initialize logging: {}", e)))?;

    // ============ Phase 2: Configuration ============
    info!("Loading configuration from {}", args.config.display());
    let config = match IoSrvConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        },
    };

    if args.validate {
        let yaml = config.to_yaml()?;
        println!("{}", yaml);
        info!("Validation completed successfully");
        return Ok(());
    }

    info!(
        "Machine {} ({}): inputs {} x{}, outputs {} x{}",
        config.machine.machine_id,
        config.machine.device_name,
        config.input_device.address,
        config.input_device.number_of_inputs,
        config.output_device.address,
        config.output_device.number_of_outputs
    );

    // ============ Phase 3: Services ============
    let gateway = Gateway::start(&config).await?;
    let compression_token = common::CancellationToken::new();
    let compression = logging::start_log_compression_task(
        log_dir,
        SERVICE_NAME.to_string(),
        compression_token.clone(),
    );

    info!("iosrv running, press Ctrl+C to stop");
    let reason = common::shutdown::wait_for_shutdown(&gateway.token()).await;
    info!("Shutdown ({}), stopping iosrv", reason);

    // ============ Phase 4: Teardown ============
    gateway.shutdown(SHUTDOWN_GRACE).await;
    compression_token.cancel();
    let _ = compression.await;

    info!("iosrv stopped");
    Ok(())
}
