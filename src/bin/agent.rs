use std::sync::Arc;

use clap::Parser;
use compose_monitor::{
    actions::compose_runner,
    api::{ApiConfig, ApiState, spawn_api_server},
    collector::default_registry,
    compose::ComposeClient,
    config::load_config,
    dispatcher::Dispatcher,
    telemetry::TelemetryHandle,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Log level for the agent's own targets
    #[arg(long, default_value_t = LevelFilter::DEBUG)]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("compose_monitor", level),
        ("compose_agent", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = load_config(args.file.as_deref())?;

    let compose = ComposeClient::from_config(&config);
    info!("managing {}", compose.compose_file().display());

    let registry = Arc::new(default_registry(&config, &compose));
    let runner = Arc::new(compose_runner(&compose));
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let telemetry = TelemetryHandle::spawn(
        Arc::clone(&dispatcher),
        config.collect_interval(),
        config.dispatch_interval(),
    );

    let addr = spawn_api_server(ApiConfig::from(&config), ApiState::new(runner, dispatcher)).await?;
    info!("agent ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    telemetry.shutdown().await;

    Ok(())
}
