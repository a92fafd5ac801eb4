// ── Connection supervisor ──
//
// Drives the connect → join → poll state machine over the polling session:
// exponential backoff on connect failures, idle/staleness watchdogs over
// the poll loop, periodic snapshot keepalive, and a latched REST-fallback
// escalation. Transport errors in steady state are absorbed into the
// reconnect path and never propagated.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use helki_api::frame::Message;
use helki_api::{PollingSession, SessionHandle, TokenProvider};

use crate::fallback::FallbackFetcher;
use crate::router::EventRouter;

/// Connection lifecycle, observable by consumers through a watch channel.
///
/// The event router writes to the store only while the supervisor is in
/// `Joined`/`Polling`; the single-task design enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Joined,
    Polling,
    Stale,
    Error,
    ShuttingDown,
}

/// Timing and escalation knobs, extracted from [`SyncConfig`](crate::SyncConfig).
#[derive(Debug, Clone)]
pub(crate) struct SupervisorTuning {
    pub poll_timeout: Duration,
    pub poll_pause: Duration,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    pub idle_window: Duration,
    pub stale_window: Duration,
    pub keepalive_poll_cycles: u64,
    pub fallback_threshold: u32,
    pub reconnect_cooldown: Duration,
}

/// Why the poll loop handed control back to the reconnect loop.
enum PollEnd {
    Cancelled,
    /// Server sent a close frame or the stream went quiet per watchdog.
    Stale,
    /// Transport or protocol failure mid-session.
    Error,
}

/// Owns the connect/poll/reconnect loop. One instance per listener task;
/// the sole writer of session ids and connection state.
pub(crate) struct Supervisor {
    session: PollingSession,
    tokens: Arc<dyn TokenProvider>,
    router: EventRouter,
    fallback: Arc<FallbackFetcher>,
    tuning: SupervisorTuning,
    state: Arc<watch::Sender<ConnectionState>>,
    refresh_requested: Arc<AtomicBool>,
    dev_id: String,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: PollingSession,
        tokens: Arc<dyn TokenProvider>,
        router: EventRouter,
        fallback: Arc<FallbackFetcher>,
        tuning: SupervisorTuning,
        state: Arc<watch::Sender<ConnectionState>>,
        refresh_requested: Arc<AtomicBool>,
        dev_id: String,
    ) -> Self {
        Self {
            session,
            tokens,
            router,
            fallback,
            tuning,
            state,
            refresh_requested,
            dev_id,
        }
    }

    /// Main loop: connect → poll → on failure, backoff → reconnect.
    ///
    /// Runs until the token is cancelled; never returns an error.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.tuning.backoff_base, self.tuning.backoff_ceiling);
        let mut fallback_trigger = FallbackTrigger::new(self.tuning.fallback_threshold);

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let handle = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.connect() => match result {
                    Ok(handle) => handle,
                    Err(e) => {
                        let delay = backoff.next_delay();
                        warn!(
                            error = %e,
                            failures = backoff.consecutive_failures(),
                            delay_ms = delay.as_millis() as u64,
                            "connect failed, retrying"
                        );
                        self.set_state(ConnectionState::Error);

                        if fallback_trigger.should_fire(backoff.consecutive_failures()) {
                            info!("push channel repeatedly failing, refreshing over REST");
                            self.fallback.refresh().await;
                        }

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                },
            };

            backoff.reset();
            fallback_trigger.reset();
            self.set_state(ConnectionState::Joined);
            info!(sid = %handle.sid, "push channel connected");

            self.set_state(ConnectionState::Polling);
            match self.poll_loop(&handle, &cancel).await {
                PollEnd::Cancelled => break,
                PollEnd::Stale => self.set_state(ConnectionState::Stale),
                PollEnd::Error => self.set_state(ConnectionState::Error),
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.tuning.reconnect_cooldown) => {}
            }
        }

        self.set_state(ConnectionState::ShuttingDown);
        debug!("supervisor stopped");
    }

    /// Handshake, join the namespace, and request the first snapshot.
    async fn connect(&self) -> Result<SessionHandle, helki_api::Error> {
        let token = self.tokens.access_token().await?;
        let handle = self.session.handshake(&token, &self.dev_id).await?;
        self.session.join_namespace(&handle).await?;
        self.session.request_snapshot(&handle).await?;
        Ok(handle)
    }

    /// Steady-state polling until cancellation, a watchdog trip, a close
    /// frame, or a transport failure.
    async fn poll_loop(&mut self, handle: &SessionHandle, cancel: &CancellationToken) -> PollEnd {
        let mut watchdog = LivenessWatchdog::new(
            self.tuning.idle_window,
            self.tuning.stale_window,
            Instant::now(),
        );
        let mut cycles: u64 = 0;

        loop {
            match watchdog.check(Instant::now()) {
                Some(WatchdogTrip::Stale) => {
                    warn!("no substantive update within the staleness window, reconnecting");
                    return PollEnd::Stale;
                }
                Some(WatchdogTrip::Idle) => {
                    info!("no frames within the idle window, reconnecting");
                    return PollEnd::Stale;
                }
                None => {}
            }

            cycles += 1;
            let keepalive_due = cycles % self.tuning.keepalive_poll_cycles == 0;
            let refresh_due = self.refresh_requested.swap(false, Ordering::AcqRel);
            if keepalive_due || refresh_due {
                debug!(keepalive_due, refresh_due, "requesting full snapshot");
                if let Err(e) = self.session.request_snapshot(handle).await {
                    warn!(error = %e, "snapshot request failed, reconnecting");
                    return PollEnd::Error;
                }
            }

            let messages = tokio::select! {
                biased;
                () = cancel.cancelled() => return PollEnd::Cancelled,
                result = self.session.poll(handle, self.tuning.poll_timeout) => match result {
                    Ok(messages) => messages,
                    Err(e) if e.is_poll_timeout() => {
                        debug!("poll timed out, continuing");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "poll failed, reconnecting");
                        return PollEnd::Error;
                    }
                },
            };

            let now = Instant::now();
            for message in messages {
                watchdog.frame_seen(now);
                match message {
                    Message::Ping => {
                        debug!("ping received, sending pong");
                        if let Err(e) = self.session.pong(handle).await {
                            warn!(error = %e, "pong failed, reconnecting");
                            return PollEnd::Error;
                        }
                    }
                    Message::Close => {
                        info!("server closed the session, reconnecting");
                        return PollEnd::Error;
                    }
                    Message::Event(envelope) => {
                        watchdog.update_seen(now);
                        self.router.route(&envelope);
                    }
                    Message::Handshake(_) => {
                        debug!("unexpected handshake frame ignored");
                    }
                    Message::Other(raw) => {
                        debug!(raw = %raw, "unclassified frame ignored");
                    }
                    Message::NamespaceAck | Message::Pong | Message::Noop => {}
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return PollEnd::Cancelled,
                () = tokio::time::sleep(self.tuning.poll_pause) => {}
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Exponential backoff over consecutive connection failures.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    ceiling: Duration,
    failures: u32,
}

impl Backoff {
    pub(crate) fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            failures: 0,
        }
    }

    /// Delay before the next retry: base on the first failure, doubling
    /// per consecutive failure, capped at the ceiling.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let exponent = self.failures.min(16);
        let delay = self
            .base
            .saturating_mul(1_u32 << exponent)
            .min(self.ceiling);
        self.failures += 1;
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

// ── Fallback escalation latch ────────────────────────────────────────

/// Fires the REST fallback exactly once per crossing of the failure
/// threshold; re-arms only after a successful connect.
#[derive(Debug)]
pub(crate) struct FallbackTrigger {
    threshold: u32,
    fired: bool,
}

impl FallbackTrigger {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold,
            fired: false,
        }
    }

    pub(crate) fn should_fire(&mut self, consecutive_failures: u32) -> bool {
        if consecutive_failures >= self.threshold && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    pub(crate) fn reset(&mut self) {
        self.fired = false;
    }
}

// ── Liveness watchdog ────────────────────────────────────────────────

/// Two independent liveness windows over the poll loop: the idle window
/// trips when no frame at all (no-ops included) arrives; the much longer
/// staleness window trips when no substantive update arrives even though
/// frames keep flowing.
#[derive(Debug)]
pub(crate) struct LivenessWatchdog {
    idle_window: Duration,
    stale_window: Duration,
    last_frame: Instant,
    last_update: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchdogTrip {
    Idle,
    Stale,
}

impl LivenessWatchdog {
    pub(crate) fn new(idle_window: Duration, stale_window: Duration, now: Instant) -> Self {
        Self {
            idle_window,
            stale_window,
            last_frame: now,
            last_update: now,
        }
    }

    /// Any decoded frame counts.
    pub(crate) fn frame_seen(&mut self, now: Instant) {
        self.last_frame = now;
    }

    /// Only substantive (event) frames count.
    pub(crate) fn update_seen(&mut self, now: Instant) {
        self.last_update = now;
    }

    pub(crate) fn check(&self, now: Instant) -> Option<WatchdogTrip> {
        if now.duration_since(self.last_update) > self.stale_window {
            return Some(WatchdogTrip::Stale);
        }
        if now.duration_since(self.last_frame) > self.idle_window {
            return Some(WatchdogTrip::Idle);
        }
        None
    }
}

// ── Tests ────────────────────────────────────────────────────────────
