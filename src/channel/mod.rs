//! The ingest channel: state machine, double-buffered write path, flush
//! gate, periodic timers, continuation/offset-token handling, and the
//! adaptive-backoff committed-offset poller.

mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, warn};

pub use state::ChannelState;

use crate::client::{GzipSettings, IngestClient};
use crate::config::{ChannelTimers, FlushPolicy};
use crate::errors::Error;
use crate::normalize::{self, RawValue};
use crate::payload;
use crate::schema::{PipeCoords, TableSchema};

type Row = HashMap<String, RawValue>;

/// Hard cap on a single append request body, independent of `FlushPolicy`'s
/// `max_bytes` trigger (which should keep buffers well under this in
/// practice).
const MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024;

struct Buffers {
    active: Vec<Row>,
    spare: Vec<Row>,
    estimated_bytes: usize,
}

/// Data mutated only while the flush gate is held. The continuation token is
/// owned by the channel and only ever advances under that lock.
struct FlushState {
    continuation_token: Option<String>,
    pending_offset_token: Option<String>,
}

#[derive(Default)]
struct BackgroundTasks {
    flush_timer: Option<JoinHandle<()>>,
    health_timer: Option<JoinHandle<()>>,
}

/// A single append stream into a pipe. Exclusively owns its two row buffers
/// and its two timers; shares its `IngestClient` (and, transitively, the
/// process-wide `AuthProvider`) with every other channel.
pub struct Channel {
    name: String,
    pipe: PipeCoords,
    schema: TableSchema,
    policy: FlushPolicy,
    timers: ChannelTimers,
    gzip: GzipSettings,
    client: Arc<IngestClient>,
    state: Mutex<ChannelState>,
    buffers: Mutex<Buffers>,
    flush_gate: Mutex<FlushState>,
    latest_committed_offset: Mutex<Option<String>>,
    last_append_at: Mutex<Option<Instant>>,
    background: Mutex<BackgroundTasks>,
    disposed: AtomicBool,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        pipe: PipeCoords,
        schema: TableSchema,
        policy: FlushPolicy,
        timers: ChannelTimers,
        gzip: GzipSettings,
        client: Arc<IngestClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            pipe,
            schema,
            policy,
            timers,
            gzip,
            client,
            state: Mutex::new(ChannelState::Created),
            buffers: Mutex::new(Buffers {
                active: Vec::new(),
                spare: Vec::new(),
                estimated_bytes: 0,
            }),
            flush_gate: Mutex::new(FlushState {
                continuation_token: None,
                pending_offset_token: None,
            }),
            latest_committed_offset: Mutex::new(None),
            last_append_at: Mutex::new(None),
            background: Mutex::new(BackgroundTasks::default()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.lock().await
    }

    pub async fn latest_committed_offset_token(&self) -> Option<String> {
        self.latest_committed_offset.lock().await.clone()
    }

    /// Issues `open_channel`; requires a SUCCESS status and a continuation
    /// token, seeds the latest committed offset, and (re)starts both timers.
    /// A no-op if already `Open`; errors if `Dropped`.
    pub async fn open(self: &Arc<Self>) -> Result<(), Error> {
        if *self.state.lock().await == ChannelState::Open {
            return Ok(());
        }
        self.force_reopen().await
    }

    /// Unconditionally issues `open_channel` and re-seeds the continuation
    /// token, regardless of whether the channel is currently `Open`. Errors
    /// if `Dropped`.
    ///
    /// `open()` short-circuits when already `Open`; the drift-triggered
    /// reopen in `flush` must not, since the channel's state is still `Open`
    /// at the moment a 400/409 response reveals the held continuation token
    /// is stale. Calling `open()` there would be a no-op and the retry would
    /// reuse the same token that just drew the rejection.
    async fn force_reopen(self: &Arc<Self>) -> Result<(), Error> {
        if *self.state.lock().await == ChannelState::Dropped {
            return Err(Error::ChannelState(format!(
                "channel {} is dropped and cannot be reopened",
                self.name
            )));
        }
        *self.state.lock().await = ChannelState::Opening;

        let response = match self.client.open_channel(&self.pipe, &self.name).await {
            Ok(r) => r,
            Err(err) => {
                *self.state.lock().await = ChannelState::Error;
                return Err(err);
            }
        };

        if !response.channel_status.is_success() {
            *self.state.lock().await = ChannelState::Error;
            return Err(Error::InvariantFailure(format!(
                "open_channel for {} returned status {}",
                self.name, response.channel_status.status_code
            )));
        }
        let Some(next_token) = response.next_continuation_token else {
            *self.state.lock().await = ChannelState::Error;
            return Err(Error::InvariantFailure(format!(
                "open_channel for {} did not return a continuation token",
                self.name
            )));
        };

        self.flush_gate.lock().await.continuation_token = Some(next_token);
        *self.latest_committed_offset.lock().await =
            response.channel_status.last_committed_offset_token.clone();
        *self.state.lock().await = ChannelState::Open;
        self.start_timers().await;
        Ok(())
    }

    /// Appends one row to the active buffer.
    pub async fn insert_row(self: &Arc<Self>, row: Row) -> Result<(), Error> {
        self.insert_rows(vec![row]).await
    }

    /// Appends rows to the active buffer under the (non-suspending) buffer
    /// lock; schedules a background flush if a size/count threshold is
    /// crossed.
    pub async fn insert_rows(self: &Arc<Self>, rows: Vec<Row>) -> Result<(), Error> {
        let current = *self.state.lock().await;
        if current != ChannelState::Open {
            return Err(Error::ChannelState(format!(
                "cannot insert into channel {} while in state {current:?}",
                self.name
            )));
        }

        let mut added_bytes = 0usize;
        for row in &rows {
            let normalized = normalize::normalize_row(&self.schema, row)?;
            added_bytes += serde_json::to_vec(&normalized).map(|v| v.len() + 1).unwrap_or(0);
        }

        let should_flush = {
            let mut buffers = self.buffers.lock().await;
            buffers.active.extend(rows);
            buffers.estimated_bytes += added_bytes;
            buffers.active.len() >= self.policy.max_rows || buffers.estimated_bytes >= self.policy.max_bytes
        };

        if should_flush {
            let channel = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = channel.flush(None).await {
                    warn!(channel = %channel.name, error = %err, "channel.threshold_flush_failed");
                }
            });
        }
        Ok(())
    }

    /// Stores a non-empty token to be attached to the next flush. Offset
    /// tokens attach to the next *flush*, not to individual rows.
    pub async fn set_offset_token_for_next_flush(&self, token: impl Into<String>) -> Result<(), Error> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::InvariantFailure("offset token must be non-empty".into()));
        }
        self.flush_gate.lock().await.pending_offset_token = Some(token);
        Ok(())
    }

    /// Builds and appends the current buffer snapshot, single-writer via the
    /// flush gate; a drift-triggered reopen-and-retry-once on HTTP 400/409.
    pub async fn flush(self: &Arc<Self>, offset_token: Option<String>) -> Result<(), Error> {
        let mut flush_state = self.flush_gate.lock().await;

        let mut snapshot = {
            let mut buffers = self.buffers.lock().await;
            if buffers.active.is_empty() {
                return Ok(());
            }
            std::mem::swap(&mut buffers.active, &mut buffers.spare);
            buffers.estimated_bytes = 0;
            std::mem::take(&mut buffers.spare)
        };

        let Some(continuation_token) = flush_state.continuation_token.clone() else {
            return Err(Error::InvariantFailure(format!(
                "channel {} has no continuation token; open() must succeed before flush()",
                self.name
            )));
        };

        let offset_from_pending = offset_token.is_none() && flush_state.pending_offset_token.is_some();
        let effective_offset = offset_token.or_else(|| flush_state.pending_offset_token.clone());

        let chunk = payload::build_chunk(&self.name, &self.schema, &snapshot, effective_offset.clone())?;
        if chunk.data.len() > MAX_REQUEST_SIZE {
            snapshot.clear();
            {
                let mut buffers = self.buffers.lock().await;
                buffers.spare = snapshot;
            }
            return Err(Error::DataTooLarge(chunk.data.len(), MAX_REQUEST_SIZE));
        }

        // The rows are serialized into `chunk.data`; return the buffer for
        // reuse regardless of how the append below turns out.
        snapshot.clear();
        {
            let mut buffers = self.buffers.lock().await;
            buffers.spare = snapshot;
        }

        let first_attempt = self
            .client
            .append_rows(
                &self.pipe,
                &self.name,
                &chunk.data,
                &continuation_token,
                effective_offset.as_deref(),
                self.gzip,
            )
            .await;

        let outcome = match first_attempt {
            Ok(response) => Ok(response),
            Err(Error::Service { status, .. }) if status.as_u16() == 400 || status.as_u16() == 409 => {
                drop(flush_state);
                tokio::time::sleep(self.timers.drift_retry_delay).await;
                self.force_reopen().await?;
                flush_state = self.flush_gate.lock().await;
                let reopened_token = flush_state.continuation_token.clone().ok_or_else(|| {
                    Error::InvariantFailure(format!(
                        "reopen of channel {} did not seed a continuation token",
                        self.name
                    ))
                })?;
                self.client
                    .append_rows(
                        &self.pipe,
                        &self.name,
                        &chunk.data,
                        &reopened_token,
                        effective_offset.as_deref(),
                        self.gzip,
                    )
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(response) => {
                flush_state.continuation_token = Some(response.next_continuation_token);
                *self.last_append_at.lock().await = Some(Instant::now());
                if offset_from_pending {
                    flush_state.pending_offset_token = None;
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Polls `get_channel_status` with adaptive backoff until a non-empty
    /// committed offset appears or `timeout` elapses.
    pub async fn fetch_latest_committed_offset(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut last_seen = self.latest_committed_offset.lock().await.clone();

        loop {
            if last_seen.as_deref().is_some_and(|s| !s.is_empty()) {
                return last_seen;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return last_seen;
            }

            match self.client.get_channel_status(&self.pipe, &self.name).await {
                Ok(status) => {
                    if let Some(token) = status.last_committed_offset_token.clone() {
                        *self.latest_committed_offset.lock().await = Some(token.clone());
                        last_seen = Some(token);
                        if last_seen.as_deref().is_some_and(|s| !s.is_empty()) {
                            return last_seen;
                        }
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return last_seen;
                    }
                    let mut delay = poll_interval;
                    if let Some(avg_ms) = status.snowflake_avg_processing_latency_ms {
                        if avg_ms > 0 {
                            delay = delay.max(Duration::from_millis(avg_ms as u64 / 4));
                        }
                    }
                    delay = delay.min(remaining / 2);
                    if delay.is_zero() {
                        return last_seen;
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(channel = %self.name, error = %err, "channel.poll_status_failed");
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return last_seen;
                    }
                    tokio::time::sleep(poll_interval.min(remaining)).await;
                }
            }
        }
    }

    /// Idempotent w.r.t. already-`Closed`/`Dropped`; sleeps to satisfy
    /// `min_hold_after_append`, then deletes the channel.
    pub async fn drop_channel(self: &Arc<Self>) -> Result<(), Error> {
        let current = *self.state.lock().await;
        if current == ChannelState::Closed || current == ChannelState::Dropped {
            return Ok(());
        }

        if let Some(last_append) = *self.last_append_at.lock().await {
            let elapsed = last_append.elapsed();
            if elapsed < self.policy.min_hold_after_append {
                tokio::time::sleep(self.policy.min_hold_after_append - elapsed).await;
            }
        }

        self.client.delete_channel(&self.pipe, &self.name).await?;
        *self.state.lock().await = ChannelState::Dropped;
        self.stop_timers().await;
        Ok(())
    }

    /// Stops both timers, flushes remaining buffered rows (swallowing flush
    /// errors), and sets state to `Closed`. Safe to call repeatedly.
    pub async fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_timers().await;
        if let Err(err) = self.flush(None).await {
            warn!(channel = %self.name, error = %err, "channel.dispose_flush_failed");
        }
        *self.state.lock().await = ChannelState::Closed;
    }

    async fn start_timers(self: &Arc<Self>) {
        let flush_channel = Arc::clone(self);
        let flush_interval = self.policy.flush_interval;
        let flush_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = flush_channel.flush(None).await {
                    error!(channel = %flush_channel.name, error = %err, "channel.periodic_flush_failed");
                    *flush_channel.state.lock().await = ChannelState::Error;
                }
            }
        });

        let health_channel = Arc::clone(self);
        let status_interval = self.timers.status_interval;
        let health_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(status_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                health_channel.health_tick().await;
            }
        });

        let mut background = self.background.lock().await;
        if let Some(old) = background.flush_timer.take() {
            old.abort();
        }
        if let Some(old) = background.health_timer.take() {
            old.abort();
        }
        background.flush_timer = Some(flush_handle);
        background.health_timer = Some(health_handle);
    }

    async fn stop_timers(&self) {
        let mut background = self.background.lock().await;
        if let Some(handle) = background.flush_timer.take() {
            handle.abort();
        }
        if let Some(handle) = background.health_timer.take() {
            handle.abort();
        }
    }

    /// Fires at `status_interval`; updates the committed offset, and on a
    /// non-SUCCESS status transitions to `Error` and reopens after a backoff.
    /// A failed tick is caught here and never tears down the process.
    async fn health_tick(self: &Arc<Self>) {
        if *self.state.lock().await != ChannelState::Open {
            return;
        }
        let status = match self.client.get_channel_status(&self.pipe, &self.name).await {
            Ok(status) => status,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "channel.health_check_failed");
                self.enter_error_and_reopen().await;
                return;
            }
        };
        if let Some(token) = status.last_committed_offset_token.clone() {
            *self.latest_committed_offset.lock().await = Some(token);
        }
        if !status.is_success() {
            self.enter_error_and_reopen().await;
        }
    }

    async fn enter_error_and_reopen(self: &Arc<Self>) {
        *self.state.lock().await = ChannelState::Error;
        tokio::time::sleep(self.timers.reopen_backoff).await;
        if let Err(err) = self.open().await {
            error!(channel = %self.name, error = %err, "channel.reopen_failed");
        }
    }
}
