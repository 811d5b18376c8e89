//! # Front WSS Ingestor
//!
//! Owns the authenticated WebSocket session that streams front changes.
//!
//! ## Lifecycle
//! `Disconnected → Connecting → Authenticating → Ready → Disconnected`
//!
//! - The authenticate frame goes out as soon as the socket opens; no
//!   acknowledgement is awaited, the session counts as `Ready` once it is sent.
//! - A keep-alive `ping` text frame is sent on a fixed interval while `Ready`.
//! - Undecodable frames are dropped one at a time and never end the session.
//! - Transport errors and remote closes end the session; `run` reconnects with
//!   exponential backoff and resumes against the existing engine state.
//! - A handshake that stalls past `connect_timeout` counts as a failed attempt.
//!
//! Location: lib_indicator/src/ingestors/front_wss.rs

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::protocol::Message};

use crate::engine::model::FrontChange;

use super::frame::{decode_frame, Frame};

/// Production socket endpoint.
pub const DEFAULT_SOCKET_URL: &str = "wss://api.apparyllis.com/v1/socket";

const KEEPALIVE_PAYLOAD: &str = "ping";

/// Where the session is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; initial state and the state between attempts.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, sending the authenticate frame.
    Authenticating,
    /// Authenticated; frames are being applied and keep-alives sent.
    Ready,
}

/// Errors that end a session or the whole reconnect loop.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connect, send or receive failed.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The WebSocket handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The reconnect policy ran out of attempts.
    #[error("gave up after {0} consecutive failed session attempts")]
    RetriesExhausted(u32),
}

/// Configuration for the front WebSocket stream.
#[derive(Debug, Clone)]
pub struct FrontStreamConfig {
    /// Socket endpoint.
    pub socket_url: String,
    /// Credential sent in the authenticate frame.
    pub token: String,
    /// Spacing of keep-alive pings.
    pub keepalive_interval: Duration,
    /// Upper bound for the TCP connect plus WebSocket upgrade.
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles per consecutive failure.
    pub reconnect_base_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Consecutive failed sessions tolerated before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl FrontStreamConfig {
    /// Production endpoint and default timings for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            token: token.into(),
            keepalive_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(60_000),
            max_reconnect_attempts: None,
        }
    }

    /// Delay before attempt number `failures` (1-based): `base * 2^(failures-1)`, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.reconnect_base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.reconnect_max_delay)
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
}

/// The Stream Session Manager.
pub struct FrontStreamSession {
    config: FrontStreamConfig,
    front_tx: mpsc::UnboundedSender<FrontChange>,
    state_tx: watch::Sender<SessionState>,
}

impl FrontStreamSession {
    /// Creates a disconnected session that forwards decoded changes to `front_tx`.
    pub fn new(config: FrontStreamConfig, front_tx: mpsc::UnboundedSender<FrontChange>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            front_tx,
            state_tx,
        }
    }

    /// Watches state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Runs sessions until `shutdown` fires or the reconnect policy gives up.
    pub async fn run(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), StreamError> {
        let mut failures: u32 = 0;

        loop {
            let mut reached_ready = false;
            let result = self.run_once(shutdown, &mut reached_ready).await;
            self.set_state(SessionState::Disconnected);

            match result {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("Front socket shut down.");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => tracing::warn!("Front socket closed by remote host."),
                Err(e) => tracing::error!("Front socket error: {}", e),
            }

            if reached_ready {
                failures = 0;
            }
            failures += 1;
            if let Some(max) = self.config.max_reconnect_attempts {
                if failures > max {
                    return Err(StreamError::RetriesExhausted(max));
                }
            }

            let delay = self.config.backoff(failures);
            tracing::info!("Reconnecting in {}ms (attempt {}).", delay.as_millis(), failures);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested while waiting to reconnect.");
                    return Ok(());
                }
            }
        }
    }

    /// One connection: connect, authenticate, then pump frames and keep-alives.
    ///
    /// Connect and authenticate are each bounded by `connect_timeout` and
    /// abandoned as soon as shutdown fires.
    async fn run_once(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        reached_ready: &mut bool,
    ) -> Result<SessionEnd, StreamError> {
        self.set_state(SessionState::Connecting);
        tracing::info!("Connecting to front socket: {}", self.config.socket_url);
        let connect = timeout(self.config.connect_timeout, connect_async(self.config.socket_url.as_str()));
        let (ws_stream, _) = tokio::select! {
            _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
            res = connect => res.map_err(|_| StreamError::ConnectTimeout(self.config.connect_timeout))??,
        };
        let (mut write, mut read) = ws_stream.split();

        self.set_state(SessionState::Authenticating);
        let auth = json!({ "op": "authenticate", "token": self.config.token }).to_string();
        let send_auth = timeout(self.config.connect_timeout, write.send(Message::Text(auth.into())));
        tokio::select! {
            _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
            res = send_auth => res.map_err(|_| StreamError::ConnectTimeout(self.config.connect_timeout))??,
        }

        self.set_state(SessionState::Ready);
        *reached_ready = true;
        tracing::info!("Front socket authenticated.");

        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = write.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = keepalive.tick() => {
                    write.send(Message::Text(KEEPALIVE_PAYLOAD.to_string().into())).await?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "Close frame received.");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Closed),
                }
            }
        }
    }

    /// Decodes one text frame and forwards it if it is a front change.
    ///
    /// Returns whether a change was forwarded. Malformed frames are dropped.
    pub fn handle_text(&self, text: &str) -> bool {
        match decode_frame(text) {
            Ok(Frame::Front(change)) => {
                tracing::debug!(member = %change.member, live = change.live, "Front change received.");
                if self.front_tx.send(change).is_err() {
                    tracing::warn!("Front change receiver is gone; dropping change.");
                    return false;
                }
                true
            }
            Ok(Frame::Other(target)) => {
                tracing::trace!(?target, "Ignoring frame.");
                false
            }
            Err(e) => {
                tracing::trace!("Discarding frame: {}", e);
                false
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "Session state changed.");
        }
    }
}
