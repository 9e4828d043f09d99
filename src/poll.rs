use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::api::response::{pares, CurrentlyPlaying};
use crate::api::{SpotifyResponse, NOW_PLAYING_URL};
use crate::api::pkce::TokenManager;
use crate::Error;

/// Backoff before retrying a failed playback read.
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(15_000);

/// Pad past the predicted track end so the next poll likely lands after the
/// track transition.
pub(crate) const TRACK_END_PAD_MS: u64 = 500;

/// Delay until the next poll: the remainder of the current track plus the
/// transition pad. A progress report past the track end clamps to the pad.
pub(crate) fn next_poll_delay(duration_ms: u64, progress_ms: u64) -> Duration {
    Duration::from_millis(duration_ms.saturating_sub(progress_ms) + TRACK_END_PAD_MS)
}

/// Cancels a scheduled task when invoked. Dropping the handle lets the task
/// run to completion; the poller itself never withdraws a pending poll.
pub struct CancellationHandle(Box<dyn FnOnce() + Send>);

impl CancellationHandle {
    pub fn new<F: FnOnce() + Send + 'static>(cancel: F) -> Self {
        Self(Box::new(cancel))
    }

    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn cancel(self) {
        (self.0)()
    }
}

/// Timer capability the poller schedules itself through, injected so tests
/// can observe and drive scheduling deterministically.
pub trait Scheduler: Send + Sync {
    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> CancellationHandle;
}

/// Production scheduler: one spawned tokio task per delay.
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> CancellationHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        let abort = handle.abort_handle();
        CancellationHandle::new(move || abort.abort())
    }
}

pub(crate) enum FetchOutcome {
    Playing(CurrentlyPlaying),
    Empty,
    Failed { code: u16, body: String },
}

pub type RenderFn = Box<dyn Fn(&CurrentlyPlaying) + Send + Sync>;

/// Maintains an approximately current view of the remote now-playing state
/// by scheduling each poll near the predicted end of the current track
/// rather than on a fixed interval.
pub struct NowPlayingPoller {
    tokens: TokenManager,
    scheduler: Arc<dyn Scheduler>,
    render: RenderFn,
}

impl NowPlayingPoller {
    pub fn new(
        tokens: TokenManager,
        scheduler: Arc<dyn Scheduler>,
        render: RenderFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            scheduler,
            render,
        })
    }

    fn schedule(self: &Arc<Self>, delay: Duration) -> CancellationHandle {
        let poller = self.clone();
        self.scheduler
            .after(delay, Box::pin(async move { poller.poll_once().await }))
    }

    async fn fetch_outcome(&self) -> Result<FetchOutcome, Error> {
        let token = self.tokens.valid_access_token().await?;
        let response = reqwest::Client::new()
            .get(NOW_PLAYING_URL)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        let response = SpotifyResponse::from_response(response).await?;
        if response.status == reqwest::StatusCode::NO_CONTENT {
            return Ok(FetchOutcome::Empty);
        }
        if !response.status.is_success() {
            return Ok(FetchOutcome::Failed {
                code: response.status.as_u16(),
                body: response.body,
            });
        }

        Ok(FetchOutcome::Playing(pares!(&response.body)?))
    }

    fn resolve(self: &Arc<Self>, outcome: FetchOutcome) -> Option<CurrentlyPlaying> {
        match outcome {
            FetchOutcome::Playing(playing) => Some(playing),
            FetchOutcome::Empty => None,
            FetchOutcome::Failed { code, body } => {
                log::error!("playback read failed [{code}]: {body}");
                self.schedule(RETRY_BACKOFF);
                None
            }
        }
    }

    /// Read the remote playback state. A 204 reports nothing playing; any
    /// other non-success status is logged and earns exactly one retry after
    /// the fixed backoff, also reporting nothing playing.
    pub async fn fetch_current_track(self: &Arc<Self>) -> Result<Option<CurrentlyPlaying>, Error> {
        let outcome = self.fetch_outcome().await?;
        Ok(self.resolve(outcome))
    }

    fn present(self: &Arc<Self>, playing: CurrentlyPlaying) {
        if let Some(track) = playing.track() {
            let delay = next_poll_delay(track.duration_ms, playing.progress_ms.unwrap_or(0));
            (self.render)(&playing);
            self.schedule(delay);
        }
    }

    /// One poll step: fetch, render, and schedule the successor near the
    /// track end. With nothing playing the chain ends here and polling
    /// stays halted until restarted externally.
    pub async fn poll_once(self: Arc<Self>) {
        match self.fetch_current_track().await {
            Ok(Some(playing)) => self.present(playing),
            Ok(None) => {}
            Err(err) => log::error!("now-playing poll halted: {err}"),
        }
    }

    /// Kick off the poll chain immediately.
    pub fn start(self: &Arc<Self>) -> CancellationHandle {
        self.schedule(Duration::ZERO)
    }
}
