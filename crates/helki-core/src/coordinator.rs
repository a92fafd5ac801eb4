// ── Coordinator facade ──
//
// The consumer-facing entry point: owns the store, the supervisor task,
// and the refresh flag. Cheaply cloneable via `Arc<CoordinatorInner>`;
// one long-running task drives the supervisor and is the sole writer of
// session ids and connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use helki_api::{PollingSession, RestClient, TokenProvider, TransportConfig};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::fallback::FallbackFetcher;
use crate::model::DeviceContext;
use crate::router::EventRouter;
use crate::store::{Snapshot, ZoneStore};
use crate::stream::SnapshotStream;
use crate::supervisor::{ConnectionState, Supervisor, SupervisorTuning};

/// The synchronization engine's public handle.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: SyncConfig,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<ZoneStore>,
    state: Arc<watch::Sender<ConnectionState>>,
    refresh_requested: Arc<AtomicBool>,
    ctx: Mutex<Option<DeviceContext>>,
    fallback: Mutex<Option<Arc<FallbackFetcher>>>,
    runtime: Mutex<Option<ListenerRuntime>>,
}

struct ListenerRuntime {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Coordinator {
    /// Create a coordinator. Does not touch the network --
    /// call [`start()`](Self::start) to discover the device and begin
    /// listening.
    pub fn new(config: SyncConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                tokens,
                store: Arc::new(ZoneStore::new()),
                state: Arc::new(state),
                refresh_requested: Arc::new(AtomicBool::new(false)),
                ctx: Mutex::new(None),
                fallback: Mutex::new(None),
                runtime: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Discover the bound device and spawn the listener task. Idempotent.
    ///
    /// Device discovery is the only hard-failing bootstrap step: zero
    /// devices is fatal ([`CoreError::NoData`]) and a directory failure
    /// propagates. Everything after that -- connecting, snapshots,
    /// reconnects -- is absorbed by the supervisor.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.is_some() {
            debug!("listener already running");
            return Ok(());
        }

        let config = &self.inner.config;
        let transport = TransportConfig {
            timeout: config.request_timeout,
            ..TransportConfig::default()
        };

        let mut rest = RestClient::new(
            config.api_base.clone(),
            &transport,
            Arc::clone(&self.inner.tokens),
        )?;
        if let Some(ref serial_id) = config.serial_id {
            rest = rest.with_serial_id(serial_id.clone());
        }

        let devices = rest.list_devices().await?;
        let record = devices.first().ok_or(CoreError::NoData)?;
        let ctx = DeviceContext::from_record(record);
        info!(device = %ctx.device_name, dev_id = %ctx.dev_id, "bound to device");
        *self.inner.ctx.lock().await = Some(ctx.clone());

        let fallback = Arc::new(FallbackFetcher::new(
            rest,
            Arc::clone(&self.inner.store),
            ctx.clone(),
            config.bootstrap_zone_addrs.clone(),
        ));
        *self.inner.fallback.lock().await = Some(Arc::clone(&fallback));

        let session = PollingSession::new(
            config.api_base.clone(),
            config.socketio_path.clone(),
            config.namespace.clone(),
            &transport,
        )?;
        let router = EventRouter::new(
            Arc::clone(&self.inner.store),
            ctx.clone(),
            config.namespace.clone(),
        );
        let supervisor = Supervisor::new(
            session,
            Arc::clone(&self.inner.tokens),
            router,
            fallback,
            SupervisorTuning {
                poll_timeout: config.poll_timeout,
                poll_pause: config.poll_pause,
                backoff_base: config.backoff_base,
                backoff_ceiling: config.backoff_ceiling,
                idle_window: config.idle_window,
                stale_window: config.stale_window,
                keepalive_poll_cycles: config.keepalive_poll_cycles,
                fallback_threshold: config.fallback_threshold,
                reconnect_cooldown: config.reconnect_cooldown,
            },
            Arc::clone(&self.inner.state),
            Arc::clone(&self.inner.refresh_requested),
            ctx.dev_id,
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));
        *runtime = Some(ListenerRuntime { cancel, handle });
        Ok(())
    }

    /// Stop the listener and reset to disconnected. Idempotent.
    ///
    /// Cancels the supervisor task and awaits it; in-flight network calls
    /// are dropped, not awaited.
    pub async fn stop(&self) {
        let runtime = self.inner.runtime.lock().await.take();
        let Some(runtime) = runtime else {
            return;
        };
        runtime.cancel.cancel();
        let _ = runtime.handle.await;
        let _ = self.inner.state.send(ConnectionState::Idle);
        debug!("listener stopped");
    }

    // ── State observation ────────────────────────────────────────────

    /// Current published zone map. Wait-free.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.store.snapshot()
    }

    /// Watch every published snapshot. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.store.subscribe()
    }

    /// Snapshot subscription as a `Stream`.
    pub fn snapshots(&self) -> SnapshotStream {
        SnapshotStream::new(self.inner.store.subscribe())
    }

    /// Watch connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The discovered device/group identity, once [`start()`](Self::start)
    /// has succeeded.
    pub async fn device_context(&self) -> Option<DeviceContext> {
        self.inner.ctx.lock().await.clone()
    }

    /// The underlying store, for read access.
    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.inner.store
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Ask for fresh zone data.
    ///
    /// While the push channel is up this is fire-and-forget: the
    /// supervisor re-requests the full snapshot and the result arrives
    /// through the normal event path. While it is down, every known zone
    /// is refreshed over REST before returning, bounded by the request
    /// timeout per zone.
    pub async fn request_refresh(&self) -> Result<(), CoreError> {
        let connected = matches!(
            *self.inner.state.borrow(),
            ConnectionState::Joined | ConnectionState::Polling
        );
        if connected {
            self.inner.refresh_requested.store(true, Ordering::Release);
            debug!("refresh requested over the push channel");
            return Ok(());
        }

        let fallback = self.inner.fallback.lock().await.clone();
        let Some(fallback) = fallback else {
            return Err(CoreError::Disconnected);
        };
        debug!("push channel down, refreshing over REST");
        fallback.refresh().await;
        Ok(())
    }
}
