//! Event-stream connection supervision.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use homelink_core::ConnectionState;

use crate::{
    Backoff, PlatformClient, PlatformError, SseFrame, SseParser, StreamMessage, decode_frame,
};

/// Timing knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Reconnect proactively after this much stream silence. The provider
    /// drops stale connections without an error signal.
    pub idle_timeout: Duration,

    /// First backoff delay.
    pub backoff_initial: Duration,

    /// Backoff ceiling.
    pub backoff_max: Duration,

    /// Reset the backoff streak after this long connected.
    pub sustained_reset: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            backoff_initial: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
            sustained_reset: Duration::from_secs(600),
        }
    }
}

/// What the supervisor hands to the event router.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    /// A decoded platform message.
    Message(StreamMessage),

    /// The stream (re)established after a gap. Missed events are not
    /// replayed; the router must trigger a status refresh for all devices.
    Resynced,
}

/// Handle to a running supervisor task.
pub struct StreamHandle {
    /// Decoded messages and resync signals, in arrival order.
    pub notices: mpsc::Receiver<StreamNotice>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl StreamHandle {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection-state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the supervisor and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join_handle.await;
    }
}

/// Owns the single event-stream connection and its state machine:
/// `Disconnected → Connecting → Connected → {Disconnected | RateLimited} →
/// Backoff → Connecting → …`.
pub struct ConnectionSupervisor {
    client: PlatformClient,
    config: StreamConfig,
}

impl ConnectionSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub const fn new(client: PlatformClient, config: StreamConfig) -> Self {
        Self { client, config }
    }

    /// Spawn the supervision task.
    #[must_use]
    pub fn spawn(self) -> StreamHandle {
        let (notice_tx, notices) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join_handle = tokio::spawn(run_supervisor(
            self.client,
            self.config,
            notice_tx,
            state_tx,
            shutdown_rx,
        ));

        StreamHandle {
            notices,
            state_rx,
            shutdown_tx,
            join_handle,
        }
    }
}

enum PumpEnd {
    Shutdown,
    ReceiverDropped,
    Idle,
    Failed(PlatformError),
}

async fn run_supervisor(
    client: PlatformClient,
    config: StreamConfig,
    notice_tx: mpsc::Sender<StreamNotice>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(config.backoff_initial, config.backoff_max);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let _ = state_tx.send(ConnectionState::Connecting);

        match pump_stream(
            &client,
            &config,
            &notice_tx,
            &state_tx,
            &mut shutdown_rx,
            &mut backoff,
        )
        .await
        {
            PumpEnd::Shutdown | PumpEnd::ReceiverDropped => break,
            PumpEnd::Idle => {
                // A silently-dead connection produces no error signal;
                // reconnect immediately without a backoff penalty.
                info!(
                    idle_s = config.idle_timeout.as_secs(),
                    "Stream idle, re-synchronizing"
                );
                let _ = state_tx.send(ConnectionState::Disconnected);
            }
            PumpEnd::Failed(err) if err.is_rate_limit() => {
                let until = rate_limit_until(Utc::now(), err.retry_after());
                warn!(%until, "Call budget exhausted, suspending reconnect attempts");
                let _ = state_tx.send(ConnectionState::RateLimited { until });
                backoff.reset();
                if wait_until(until, &mut shutdown_rx).await {
                    break;
                }
            }
            PumpEnd::Failed(err) => {
                let delay = backoff.next_delay();
                let attempt = backoff.attempt();
                warn!(
                    error = %err,
                    attempt,
                    delay_s = delay.as_secs(),
                    "Stream failed, backing off"
                );
                let next_attempt_at =
                    Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
                let _ = state_tx.send(ConnectionState::Backoff {
                    attempt,
                    next_attempt_at,
                });
                if sleep_or_shutdown(delay, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    info!("Stream supervisor stopped");
}

async fn pump_stream(
    client: &PlatformClient,
    config: &StreamConfig,
    notice_tx: &mpsc::Sender<StreamNotice>,
    state_tx: &watch::Sender<ConnectionState>,
    shutdown_rx: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> PumpEnd {
    let response = match client.open_event_stream().await {
        Ok(response) => response,
        Err(err) => return PumpEnd::Failed(err),
    };

    let mut bytes = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut connected_at: Option<Instant> = None;
    let mut streak_cleared = false;

    loop {
        let polled = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return PumpEnd::Shutdown;
                }
                continue;
            }
            polled = tokio::time::timeout(config.idle_timeout, bytes.next()) => polled,
        };

        let chunk: bytes::Bytes = match polled {
            Err(_) => return PumpEnd::Idle,
            Ok(None) => {
                return PumpEnd::Failed(PlatformError::Stream(
                    "event stream closed by provider".into(),
                ));
            }
            Ok(Some(Err(err))) => return PumpEnd::Failed(err.into()),
            Ok(Some(Ok(chunk))) => chunk,
        };

        for frame in parser.push(&chunk) {
            // The first complete frame, event or keep-alive, proves the
            // connection is live.
            if connected_at.is_none() {
                connected_at = Some(Instant::now());
                info!("Event stream connected");
                let _ = state_tx.send(ConnectionState::Connected);
                if notice_tx.send(StreamNotice::Resynced).await.is_err() {
                    return PumpEnd::ReceiverDropped;
                }
            }

            if !streak_cleared
                && connected_at.is_some_and(|at| at.elapsed() >= config.sustained_reset)
            {
                backoff.reset();
                streak_cleared = true;
            }

            match frame {
                SseFrame::Comment(_) => debug!("Stream keep-alive"),
                SseFrame::Event(event) => match decode_frame(&event) {
                    Ok(Some(message)) => {
                        if notice_tx
                            .send(StreamNotice::Message(message))
                            .await
                            .is_err()
                        {
                            return PumpEnd::ReceiverDropped;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // One malformed event must not take down the stream.
                        warn!(error = %err, event = ?event.event, "Malformed stream payload, dropping");
                    }
                },
            }
        }
    }
}

/// Sleep, returning `true` if shutdown was requested meanwhile.
async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}

async fn wait_until(until: DateTime<Utc>, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    let remaining = (until - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    sleep_or_shutdown(remaining, shutdown_rx).await
}

/// When reconnect attempts may resume after a rate-limit signal.
///
/// Uses the provider's reset hint when present, otherwise the next UTC
/// midnight (daily budgets reset there).
fn rate_limit_until(now: DateTime<Utc>, retry_after: Option<Duration>) -> DateTime<Utc> {
    retry_after.map_or_else(
        || next_utc_midnight(now),
        |d| now + TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX),
    )
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}
