//! Process entrypoint. Grounded on the teacher's `bin/main.rs`: init logging
//! first, load config, wire a crossbeam shutdown publisher into a signal
//! handler, build the engine, run the background tickers and the HTTP server
//! side by side, and let a shutdown event stop all of them.

use clap::Parser;
use osctrl_tls::config::AppConfig;
use osctrl_tls::engine::Engine;
use osctrl_tls::event::{pub_sub, EventPublisher, ShutdownEvent};
use osctrl_tls::http;
use osctrl_tls::logging::Logging;
use osctrl_tls::logsink::SinkRegistry;
use osctrl_tls::registry::{env as env_registry, settings as settings_registry};
use osctrl_tls::store::{MemoryStore, Store};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "osctrl-tlsd", about = "osquery TLS ingestion endpoint")]
struct Cli {
    /// Path to the process's YAML configuration file.
    #[arg(long, default_value = "/etc/osctrl-tls/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    Logging::try_init()?;

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    info!(config = ?cli.config, "osctrl-tlsd starting");

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let dispatcher = SinkRegistry::build_dispatcher(
        config.logsink.primary.as_str(),
        &config.logsink.rotating_dir,
        config.logsink.always_on,
        &config.logsink.always_on_dir,
        config.logsink.cache_capacity,
    )?;

    let engine = Arc::new(Engine::new(
        store.clone(),
        dispatcher,
        config.tls_host.clone(),
        config.carve.destination_dir.clone(),
    ));

    let (env_publisher, env_consumer) = pub_sub::<ShutdownEvent>();
    let (settings_publisher, settings_consumer) = pub_sub::<ShutdownEvent>();
    let (server_publisher, server_consumer) = pub_sub::<ShutdownEvent>();

    install_shutdown_handler(vec![env_publisher, settings_publisher, server_publisher])?;

    let env_task = env_registry::spawn_refresh_task(
        engine.environments.clone(),
        store.clone(),
        config.refresh_seconds,
        env_consumer,
    );
    let settings_task = settings_registry::spawn_refresh_task(
        engine.settings.clone(),
        store.clone(),
        config.refresh_seconds,
        settings_consumer,
    );

    let server_result = http::server::run(engine, config.server, server_consumer).await;

    env_task.await?;
    settings_task.await?;

    server_result.map_err(|err| -> Box<dyn Error> { Box::new(err) })?;

    info!("osctrl-tlsd stopped");
    Ok(())
}

fn install_shutdown_handler(
    publishers: Vec<EventPublisher<ShutdownEvent>>,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        for publisher in &publishers {
            if let Err(err) = publisher.publish(ShutdownEvent) {
                error!(error = %err, "failed to publish shutdown event");
            }
        }
    })
    .map_err(|err| {
        error!("could not install signal handler: {}", err);
        err
    })
}
