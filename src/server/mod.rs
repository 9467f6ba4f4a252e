//! Service bootstrap
//!
//! Binds the listener, mounts the router, runs the presence sweeper
//! and tears the hub down on shutdown.

use std::future::Future;
use std::sync::Arc;

use log::*;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::{create_router, AppState};
use crate::config::HubConfig;
use crate::hub::Hub;
use crate::storage::LocationStore;
use crate::types::HubResult;

/// Run the service until Ctrl-C
pub async fn run(config: HubConfig, store: Arc<dyn LocationStore>) -> HubResult<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    let hub = Arc::new(Hub::with_outbox_capacity(store, config.outbox_capacity));
    serve(listener, config, hub, shutdown_signal()).await
}

/// Serve `hub` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    config: HubConfig,
    hub: Arc<Hub>,
    shutdown: F,
) -> HubResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = spawn_presence_sweeper(&hub, &config);
    let app = create_router(Arc::new(AppState::new(hub.clone())), &config.ws_path);

    info!(
        "Location hub listening on {} (ws path {})",
        listener.local_addr()?,
        config.ws_path
    );

    let closing = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            closing.shutdown();
        })
        .await?;

    sweeper.abort();
    Ok(())
}

/// Periodic presence housekeeping: the idle-timeout offline policy when
/// configured, then forgetting long-offline devices
fn spawn_presence_sweeper(hub: &Arc<Hub>, config: &HubConfig) -> JoinHandle<()> {
    let idle = config.presence_idle_timeout;
    let retention = config.presence_retention;
    let every = config.presence_sweep_interval;
    let hub = hub.clone();

    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            if let Some(idle) = idle {
                let expired = hub.expire_idle_devices(idle).await;
                if expired > 0 {
                    info!("Marked {} idle device(s) offline", expired);
                }
            }
            let pruned = hub.prune_devices(retention);
            if pruned > 0 {
                debug!("Forgot {} long-offline device(s)", pruned);
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
