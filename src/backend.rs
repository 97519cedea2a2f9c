//! Where one-shot commands are executed.
//!
//! A running `filetask run` owns the control address, and commands are sent
//! to it. When nothing answers there, the command takes the address itself,
//! hosts the engine for its own duration, and talks to that. Either way a
//! database only ever has one live engine.

use std::time::Duration;

use anyhow::Context;
use filetask_api::{ApiClient, ApiServer};
use filetask_config::Config;
use tokio::net::TcpListener;
use tracing::debug;

use crate::server::{self, Service};

/// Time given to a process that holds the address but is still starting.
const HOST_STARTUP_ATTEMPTS: u32 = 20;
const HOST_STARTUP_POLL: Duration = Duration::from_millis(100);

struct LocalHost {
    service: Service,
    api: ApiServer,
    shutdown_timeout_secs: u64,
}

pub(crate) struct Backend {
    client: ApiClient,
    host: Option<LocalHost>,
}

impl Backend {
    /// Reach the running engine, or host one for this command.
    pub(crate) async fn connect(config: &Config, in_memory: bool) -> anyhow::Result<Self> {
        if in_memory {
            // private engine with no database to guard
            let listener = TcpListener::bind((config.api.host.as_str(), 0))
                .await
                .context("failed to bind a local control address")?;
            return Self::host(config, true, listener).await;
        }

        let client = ApiClient::new(config.api.base_url());
        if client.health().await.is_ok() {
            debug!(url = client.base_url(), "Sending command to the running engine");
            return Ok(Self { client, host: None });
        }

        match server::bind_control(&config.api).await {
            Ok(listener) => Self::host(config, false, listener).await,
            Err(e) => {
                for _ in 0..HOST_STARTUP_ATTEMPTS {
                    tokio::time::sleep(HOST_STARTUP_POLL).await;
                    if client.health().await.is_ok() {
                        return Ok(Self { client, host: None });
                    }
                }
                Err(e).with_context(|| {
                    format!(
                        "{} is taken but no filetask engine answers there",
                        config.api.addr()
                    )
                })
            }
        }
    }

    async fn host(config: &Config, in_memory: bool, listener: TcpListener) -> anyhow::Result<Self> {
        let service = Service::open(config, in_memory).await?;
        // holding the address means no other engine is alive for this store
        service.recover().await?;
        let api = ApiServer::start(listener, service.app_state())?;
        let client = ApiClient::new(api.base_url());
        debug!(url = client.base_url(), "Hosting the engine for this command");
        Ok(Self {
            client,
            host: Some(LocalHost {
                service,
                api,
                shutdown_timeout_secs: config.queue.shutdown_timeout_secs,
            }),
        })
    }

    pub(crate) fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Shut down the engine this command hosted, if any.
    pub(crate) async fn close(self) {
        if let Some(host) = self.host {
            host.service
                .shutdown(host.api, host.shutdown_timeout_secs)
                .await;
        }
    }
}
