//! HTTP server bring-up. Grounded on the teacher's `run_status_server` /
//! `run_server` split: bind synchronously so bind errors surface before the
//! caller commits to awaiting the server, hand the `ServerHandle` back so a
//! shutdown signal can stop it gracefully.

use super::config::{ServerConfig, DEFAULT_WORKERS};
use super::handlers;
use crate::engine::Engine;
use crate::event::EventConsumer;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(
    engine: Arc<Engine>,
    server_config: ServerConfig,
    mut shutdown: EventConsumer<crate::event::ShutdownEvent>,
) -> Result<(), ServerError> {
    let host: String = server_config.host.to_string();
    let port: u16 = server_config.port.clone().into();

    info!(host = %host, port, "starting osctrl-tls HTTP server");

    let engine_data = web::Data::new(engine);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(engine_data.clone())
            .app_data(web::JsonConfig::default().limit(16 * 1024 * 1024))
            .configure(handlers::configure)
    })
    .workers(DEFAULT_WORKERS)
    .bind((host.clone(), port))
    .map_err(|source| ServerError::Bind { host, port, source })?
    .run();

    let handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            debug!("http server task exited on its own");
            result?.map_err(|source| ServerError::Bind { host: String::new(), port: 0, source })?;
        }
        _ = shutdown.recv() => {
            info!("shutdown signal received, stopping http server gracefully");
            handle.stop(true).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::logsink::{LogDispatcher, NoneSink, TailCache};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn test_engine() -> Arc<Engine> {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemoryStore::new());
        let dispatcher = LogDispatcher::new(
            Box::new(NoneSink),
            Box::new(NoneSink),
            Arc::new(TailCache::new(8)),
        );
        Arc::new(Engine::new(
            store,
            dispatcher,
            "tls.example.com".into(),
            std::env::temp_dir(),
        ))
    }

    #[tokio::test]
    async fn server_stops_on_shutdown_signal() {
        let engine = test_engine();
        let (publisher, consumer) = crate::event::pub_sub();
        let config = ServerConfig {
            port: super::super::config::Port::from(0u16),
            host: super::super::config::Host::from("127.0.0.1".to_string()),
        };

        let server = tokio::spawn(run(engine, config, consumer));
        publisher.publish(crate::event::ShutdownEvent).unwrap();
        let result = server.await.unwrap();
        assert!(result.is_ok());
    }
}
