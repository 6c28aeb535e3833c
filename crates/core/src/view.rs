//! Keyed remote resource with a single live fetch.
//!
//! A [`ResourceView`] owns a background task that holds the current
//! [`FetchState`]. Every key change bumps a generation counter; a fetch result is
//! applied only if it carries the current generation, so a slow response for an
//! old key can never overwrite the state of a newer one. Fetches are not aborted,
//! their results are dropped.

use crate::error::FetchError;
use crate::format;
use anyhow::Context;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

const DEFAULT_SLOW_NOTICE_MS: u64 = 3000;

#[async_trait::async_trait]
pub trait ResourceFetcher<K, T>: Send + Sync {
    async fn fetch(&self, key: &K) -> Result<T, FetchError>;
}

/// Anything usable as a view key.
pub trait ViewKey: Clone + PartialEq + fmt::Display + fmt::Debug + Send + Sync + 'static {}

impl<K> ViewKey for K where K: Clone + PartialEq + fmt::Display + fmt::Debug + Send + Sync + 'static {}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<K, T> {
    Idle,
    Loading { since: Instant, key: K },
    Ready { key: K, data: T },
    Failed { key: K, message: String },
}

impl<K, T> FetchState<K, T> {
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Idle => None,
            Self::Loading { key, .. } | Self::Ready { key, .. } | Self::Failed { key, .. } => {
                Some(key)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Which text a `Loading` state shows. Changes with time, not with the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingNotice {
    Standard,
    LongRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot<K, T> {
    pub generation: u64,
    pub state: FetchState<K, T>,
    pub notice: LoadingNotice,
}

impl<K: fmt::Display, T> ViewSnapshot<K, T> {
    fn idle() -> Self {
        Self {
            generation: 0,
            state: FetchState::Idle,
            notice: LoadingNotice::Standard,
        }
    }

    /// User-facing status line, if the state has one.
    pub fn message(&self) -> Option<String> {
        match (&self.state, self.notice) {
            (FetchState::Loading { key, .. }, LoadingNotice::Standard) => {
                Some(format::loading_message(key))
            }
            (FetchState::Loading { .. }, LoadingNotice::LongRunning) => {
                Some(format::SLOW_NOTICE_MESSAGE.to_string())
            }
            (FetchState::Failed { message, .. }, _) => Some(message.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub slow_notice_after: Duration,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            slow_notice_after: Duration::from_millis(DEFAULT_SLOW_NOTICE_MS),
        }
    }
}

#[derive(Debug)]
enum Command<K> {
    Observe { generation: u64, key: Option<K> },
    Refresh { generation: u64 },
}

struct Completion<T> {
    generation: u64,
    result: Result<T, FetchError>,
}

type NoticeTimer = Option<Pin<Box<Sleep>>>;

pub struct ResourceView<K, T> {
    commands: mpsc::UnboundedSender<Command<K>>,
    state: watch::Receiver<ViewSnapshot<K, T>>,
    generation: u64,
    task: JoinHandle<()>,
}

impl<K, T> ResourceView<K, T>
where
    K: ViewKey,
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn<F>(fetcher: Arc<F>, options: ViewOptions) -> Self
    where
        F: ResourceFetcher<K, T> + ?Sized + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (publish, state) = watch::channel(ViewSnapshot::idle());

        let actor = ViewActor {
            fetcher,
            options,
            generation: 0,
            current: None,
            publish,
            completions: completions_tx,
        };
        let task = tokio::spawn(actor.run(commands_rx, completions_rx));

        Self {
            commands: commands_tx,
            state,
            generation: 0,
            task,
        }
    }

    /// Switches to `key` (or back to idle for `None`) and returns the generation
    /// that identifies this change.
    pub fn observe(&mut self, key: Option<K>) -> anyhow::Result<u64> {
        self.generation += 1;
        let generation = self.generation;
        self.commands
            .send(Command::Observe { generation, key })
            .ok()
            .context("resource view task has stopped")?;
        Ok(generation)
    }

    /// Fetches the current key again. Idle views stay idle.
    pub fn refresh(&mut self) -> anyhow::Result<u64> {
        self.generation += 1;
        let generation = self.generation;
        self.commands
            .send(Command::Refresh { generation })
            .ok()
            .context("resource view task has stopped")?;
        Ok(generation)
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot<K, T>> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ViewSnapshot<K, T> {
        self.state.borrow().clone()
    }

    /// Waits until `generation` has been applied and is no longer loading.
    pub async fn settled(&self, generation: u64) -> anyhow::Result<ViewSnapshot<K, T>> {
        let mut rx = self.state.clone();
        let snapshot = rx
            .wait_for(|s| s.generation >= generation && !s.state.is_loading())
            .await
            .context("resource view task has stopped")?;
        Ok(snapshot.clone())
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let Self { commands, task, .. } = self;
        drop(commands);
        task.await.context("resource view task panicked")
    }
}

struct ViewActor<K, T, F: ?Sized> {
    fetcher: Arc<F>,
    options: ViewOptions,
    generation: u64,
    current: Option<K>,
    publish: watch::Sender<ViewSnapshot<K, T>>,
    completions: mpsc::UnboundedSender<Completion<T>>,
}

impl<K, T, F> ViewActor<K, T, F>
where
    K: ViewKey,
    T: Clone + Send + Sync + 'static,
    F: ResourceFetcher<K, T> + ?Sized + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<K>>,
        mut completions: mpsc::UnboundedReceiver<Completion<T>>,
    ) {
        let mut slow_notice: NoticeTimer = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Observe { generation, key }) => {
                        slow_notice = self.on_key(generation, key);
                    }
                    Some(Command::Refresh { generation }) => {
                        let key = self.current.clone();
                        slow_notice = self.on_key(generation, key);
                    }
                    None => break,
                },
                Some(done) = completions.recv() => {
                    if self.on_completion(done) {
                        slow_notice = None;
                    }
                }
                () = wait_notice(&mut slow_notice), if slow_notice.is_some() => {
                    slow_notice = None;
                    self.on_slow_notice();
                }
            }
        }

        tracing::debug!(generation = self.generation, "resource view stopped");
    }

    fn on_key(&mut self, generation: u64, key: Option<K>) -> NoticeTimer {
        self.generation = generation;
        self.current = key.clone();

        let Some(key) = key else {
            self.publish(FetchState::Idle, LoadingNotice::Standard);
            return None;
        };

        tracing::info!(%key, generation, "fetch started");
        self.publish(
            FetchState::Loading {
                since: Instant::now(),
                key: key.clone(),
            },
            LoadingNotice::Standard,
        );

        let fetcher = Arc::clone(&self.fetcher);
        let completions = self.completions.clone();
        let fetch_key = key.clone();
        let fetch = tokio::spawn(async move {
            let t0 = Instant::now();
            let result = fetcher.fetch(&fetch_key).await;
            tracing::debug!(
                key = %fetch_key,
                generation,
                ok = result.is_ok(),
                elapsed_ms = t0.elapsed().as_millis(),
                "fetch finished"
            );
            result
        });
        // A panicking fetcher still settles the view.
        tokio::spawn(async move {
            let result = match fetch.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(%key, generation, error = %err, "fetch task failed");
                    Err(FetchError::network(format!("fetch task failed: {err}")))
                }
            };
            let _ = completions.send(Completion { generation, result });
        });

        Some(Box::pin(tokio::time::sleep(self.options.slow_notice_after)))
    }

    /// Returns whether the completion was applied.
    fn on_completion(&mut self, done: Completion<T>) -> bool {
        if done.generation != self.generation {
            tracing::debug!(
                stale_generation = done.generation,
                generation = self.generation,
                "discarding stale fetch result"
            );
            return false;
        }
        let Some(key) = self.current.clone() else {
            return false;
        };

        let state = match done.result {
            Ok(data) => FetchState::Ready { key, data },
            Err(err) => {
                tracing::warn!(%key, generation = self.generation, error = %err, "fetch failed");
                let message = format::failure_message(&key, err.user_detail());
                FetchState::Failed { key, message }
            }
        };
        self.publish(state, LoadingNotice::Standard);
        true
    }

    fn on_slow_notice(&mut self) {
        let still_loading = self.publish.borrow().state.is_loading();
        if !still_loading {
            return;
        }
        tracing::info!(generation = self.generation, "fetch is slow; showing long-running notice");
        self.publish.send_modify(|s| s.notice = LoadingNotice::LongRunning);
    }

    fn publish(&self, state: FetchState<K, T>, notice: LoadingNotice) {
        self.publish.send_replace(ViewSnapshot {
            generation: self.generation,
            state,
            notice,
        });
    }
}

async fn wait_notice(timer: &mut NoticeTimer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedFetcher {
        script: HashMap<String, (u64, Result<String, FetchError>)>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn with(mut self, key: &str, delay_ms: u64, result: Result<&str, FetchError>) -> Self {
            self.script
                .insert(key.to_string(), (delay_ms, result.map(str::to_string)));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ResourceFetcher<String, String> for ScriptedFetcher {
        async fn fetch(&self, key: &String) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay_ms, result) = self
                .script
                .get(key)
                .cloned()
                .unwrap_or((0, Err(FetchError::network("unscripted key"))));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            result
        }
    }

    fn spawn(fetcher: ScriptedFetcher) -> (ResourceView<String, String>, Arc<ScriptedFetcher>) {
        let fetcher = Arc::new(fetcher);
        let view = ResourceView::spawn(Arc::clone(&fetcher), ViewOptions::default());
        (view, fetcher)
    }

    fn key(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_key_stays_idle_without_fetch() {
        let (mut view, fetcher) = spawn(ScriptedFetcher::default());
        let g = view.observe(None).unwrap();
        let snapshot = view.settled(g).await.unwrap();
        assert_eq!(snapshot.state, FetchState::Idle);
        assert_eq!(snapshot.message(), None);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loads_then_becomes_ready() {
        let (mut view, _) = spawn(ScriptedFetcher::default().with("AAPL", 100, Ok("report")));
        let mut rx = view.subscribe();
        let g = view.observe(key("AAPL")).unwrap();

        let loading = rx.wait_for(|s| s.generation == g).await.unwrap().clone();
        assert!(loading.state.is_loading());
        assert_eq!(loading.state.key(), Some(&"AAPL".to_string()));
        assert_eq!(loading.message().as_deref(), Some("Loading data for AAPL..."));

        let ready = view.settled(g).await.unwrap();
        assert_eq!(
            ready.state,
            FetchState::Ready {
                key: "AAPL".to_string(),
                data: "report".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_message_uses_server_detail_or_fallback() {
        let fetcher = ScriptedFetcher::default()
            .with(
                "ZZZZ",
                10,
                Err(FetchError::Server {
                    status: 404,
                    detail: Some("No score found for ticker 'ZZZZ'.".to_string()),
                }),
            )
            .with("DOWN", 10, Err(FetchError::network("connection refused")));
        let (mut view, _) = spawn(fetcher);

        let g = view.observe(key("ZZZZ")).unwrap();
        let failed = view.settled(g).await.unwrap();
        assert_eq!(
            failed.message().as_deref(),
            Some("Failed to fetch data for ZZZZ. No score found for ticker 'ZZZZ'.")
        );

        let g = view.observe(key("DOWN")).unwrap();
        let failed = view.settled(g).await.unwrap();
        assert_eq!(
            failed.state,
            FetchState::Failed {
                key: "DOWN".to_string(),
                message: "Failed to fetch data for DOWN. Please check the ticker and try again."
                    .to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_never_overwrites_newer_key() {
        let fetcher = ScriptedFetcher::default()
            .with("K1", 200, Ok("first"))
            .with("K2", 50, Ok("second"));
        let (mut view, fetcher) = spawn(fetcher);

        view.observe(key("K1")).unwrap();
        let g2 = view.observe(key("K2")).unwrap();

        let ready = view.settled(g2).await.unwrap();
        assert_eq!(ready.state.data().map(String::as_str), Some("second"));

        // Let K1's slower response arrive.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let after = view.snapshot();
        assert_eq!(after.generation, g2);
        assert_eq!(
            after.state,
            FetchState::Ready {
                key: "K2".to_string(),
                data: "second".to_string()
            }
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notice_appears_after_threshold_while_loading() {
        let (mut view, _) = spawn(ScriptedFetcher::default().with("NEW", 10_000, Ok("done")));
        view.observe(key("NEW")).unwrap();

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(view.snapshot().notice, LoadingNotice::Standard);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = view.snapshot();
        assert!(snapshot.state.is_loading());
        assert_eq!(snapshot.notice, LoadingNotice::LongRunning);
        assert_eq!(
            snapshot.message().as_deref(),
            Some(format::SLOW_NOTICE_MESSAGE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notice_cancelled_when_fetch_settles_first() {
        let (mut view, _) = spawn(ScriptedFetcher::default().with("FAST", 1_000, Ok("done")));
        let g = view.observe(key("FAST")).unwrap();
        view.settled(g).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        let snapshot = view.snapshot();
        assert_eq!(snapshot.notice, LoadingNotice::Standard);
        assert_eq!(snapshot.state.data().map(String::as_str), Some("done"));
        assert_eq!(snapshot.message(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notice_cancelled_when_fetch_fails_first() {
        let fetcher = ScriptedFetcher::default().with(
            "DOWN",
            1_000,
            Err(FetchError::Server {
                status: 503,
                detail: None,
            }),
        );
        let (mut view, _) = spawn(fetcher);
        let g = view.observe(key("DOWN")).unwrap();
        view.settled(g).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        let snapshot = view.snapshot();
        assert_eq!(snapshot.generation, g);
        assert_eq!(snapshot.notice, LoadingNotice::Standard);
        assert!(matches!(snapshot.state, FetchState::Failed { .. }));
        assert_eq!(
            snapshot.message().as_deref(),
            Some("Failed to fetch data for DOWN. Please check the ticker and try again.")
        );
    }

    struct PanickingFetcher;

    #[async_trait::async_trait]
    impl ResourceFetcher<String, String> for PanickingFetcher {
        async fn fetch(&self, key: &String) -> Result<String, FetchError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            panic!("fetcher exploded for {key}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_fetch_settles_as_failed() {
        let mut view: ResourceView<String, String> =
            ResourceView::spawn(Arc::new(PanickingFetcher), ViewOptions::default());
        let g = view.observe(key("BOOM")).unwrap();

        let snapshot = view.settled(g).await.unwrap();
        assert_eq!(
            snapshot.state,
            FetchState::Failed {
                key: "BOOM".to_string(),
                message: "Failed to fetch data for BOOM. Please check the ticker and try again."
                    .to_string()
            }
        );
        view.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notice_restarts_on_key_change() {
        let fetcher = ScriptedFetcher::default()
            .with("K1", 10_000, Ok("first"))
            .with("K2", 10_000, Ok("second"));
        let (mut view, _) = spawn(fetcher);

        view.observe(key("K1")).unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        view.observe(key("K2")).unwrap();

        // 3.5s after K1, 1.5s after K2: K1's timer must not fire.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(view.snapshot().notice, LoadingNotice::Standard);

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(view.snapshot().notice, LoadingNotice::LongRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn resubmitting_same_key_fetches_again() {
        let (mut view, fetcher) = spawn(ScriptedFetcher::default().with("AAPL", 10, Ok("r")));
        let g = view.observe(key("AAPL")).unwrap();
        view.settled(g).await.unwrap();
        let g = view.observe(key("AAPL")).unwrap();
        view.settled(g).await.unwrap();
        assert_eq!(fetcher.calls(), 2);

        let g = view.refresh().unwrap();
        let snapshot = view.settled(g).await.unwrap();
        assert_eq!(snapshot.generation, g);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_key_discards_inflight_result() {
        let (mut view, _) = spawn(ScriptedFetcher::default().with("AAPL", 500, Ok("late")));
        view.observe(key("AAPL")).unwrap();
        let g = view.observe(None).unwrap();
        view.settled(g).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(view.snapshot().state, FetchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let (mut view, _) = spawn(ScriptedFetcher::default());
        view.observe(None).unwrap();
        view.shutdown().await.unwrap();
    }
}
