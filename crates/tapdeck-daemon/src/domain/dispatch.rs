//! Dispatcher and input workers
//!
//! One worker per physical input source. Each worker blocks on its
//! hardware, debounces raw reads, and hands accepted triggers to the
//! [`Dispatcher`], which resolves them, plays the feedback cue and runs the
//! bound action. A failing action is logged and counted; it never ends the
//! worker. Workers stop when the shutdown signal is raised and release their
//! hardware on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tapdeck_common::{Action, LatestResult, ReadError, TagUid};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::debounce::Debouncer;
use super::execute::{execute, ActionContext};
use super::latest::LatestCell;
use crate::infra::feedback::{FeedbackCue, FeedbackPlayer};
use crate::infra::hardware::{ButtonSource, ReleaseGuard, TagReader};
use crate::infra::registry::Registry;

/// Dispatch counters
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub triggers: AtomicU64,
    pub suppressed: AtomicU64,
    pub unknown_tags: AtomicU64,
    pub failed_actions: AtomicU64,
    pub read_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub triggers: u64,
    pub suppressed: u64,
    pub unknown_tags: u64,
    pub failed_actions: u64,
    pub read_errors: u64,
}

impl DispatchMetrics {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            triggers: self.triggers.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            unknown_tags: self.unknown_tags.load(Ordering::Relaxed),
            failed_actions: self.failed_actions.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolves triggers and runs their actions
pub struct Dispatcher {
    registry: Arc<Registry>,
    latest: Arc<LatestCell>,
    ctx: ActionContext,
    feedback: Arc<dyn FeedbackPlayer>,
    metrics: DispatchMetrics,
    stop: Option<watch::Sender<bool>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        latest: Arc<LatestCell>,
        ctx: ActionContext,
        feedback: Arc<dyn FeedbackPlayer>,
    ) -> Self {
        Self {
            registry,
            latest,
            ctx,
            feedback,
            metrics: DispatchMetrics::default(),
            stop: None,
        }
    }

    /// Raise `stop` once the host has been told to power off
    pub fn with_stop(mut self, stop: watch::Sender<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Ask every worker and the API to stop
    pub fn request_stop(&self) {
        if let Some(stop) = &self.stop {
            stop.send_replace(true);
        }
    }

    /// Handle one accepted tag trigger and publish the result
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn handle_tag(&self, uid: TagUid) -> LatestResult {
        DispatchMetrics::bump(&self.metrics.triggers);
        let scanned_at = Utc::now();

        let resolved = match self.registry.get(&uid) {
            Some(binding) => {
                info!(binding = %binding.label(), action = %binding.action, "Triggering action of registered tag");
                self.feedback.play(FeedbackCue::Success).await;
                self.run(&binding.action).await;
                // The binding may have been unregistered while the action ran
                Some(
                    self.registry
                        .mark_scanned(&uid, scanned_at)
                        .unwrap_or(binding),
                )
            }
            None => {
                warn!("Tag is not registered, doing nothing");
                DispatchMetrics::bump(&self.metrics.unknown_tags);
                self.feedback.play(FeedbackCue::Failure).await;
                None
            }
        };

        let result = LatestResult {
            uid,
            resolved,
            scanned_at,
        };
        self.latest.publish(result.clone());
        result
    }

    /// Handle one accepted button press
    #[instrument(skip(self, action), fields(action = %action))]
    pub async fn handle_button(&self, pin: u8, action: &Action) {
        DispatchMetrics::bump(&self.metrics.triggers);
        info!(pin, "Button pressed");
        self.feedback.play(FeedbackCue::Success).await;
        self.run(action).await;
    }

    async fn run(&self, action: &Action) {
        match execute(action, &self.ctx).await {
            Ok(()) if *action == Action::Shutdown => {
                info!("Power-off issued, stopping");
                self.request_stop();
            }
            Ok(()) => {}
            Err(e) => {
                DispatchMetrics::bump(&self.metrics.failed_actions);
                error!(action = %action, error = %e, "Action failed");
            }
        }
    }

    fn read_failed(&self, source: &str, err: &ReadError) {
        DispatchMetrics::bump(&self.metrics.read_errors);
        warn!(source, error = %err, "Hardware read failed, skipping cycle");
    }
}

/// Whether the shutdown signal has been raised
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Tag reader worker
///
/// Runs until `shutdown` is raised, its sender is dropped, or the reader
/// disconnects. The reader is released on exit.
pub async fn run_tag_worker<R>(
    reader: R,
    dispatcher: Arc<Dispatcher>,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    R: TagReader + 'static,
{
    let mut reader = ReleaseGuard::new(reader);
    let mut debouncer: Debouncer<TagUid> = Debouncer::new(window);
    info!(window_ms = window.as_millis() as u64, "Tag reader worker started");

    while !stopping(&shutdown) {
        let read = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            read = reader.read_tag() => read,
        };

        let raw = match read {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                dispatcher.read_failed("tag reader", &e);
                continue;
            }
            Err(e) => {
                error!(error = %e, "Tag reader disconnected, stopping worker");
                break;
            }
        };

        let uid = match TagUid::parse(&raw) {
            Ok(uid) => uid,
            Err(e) => {
                dispatcher.read_failed("tag reader", &ReadError::Transient(e.to_string()));
                continue;
            }
        };

        if !debouncer.accept(&uid, Instant::now()) {
            DispatchMetrics::bump(&dispatcher.metrics.suppressed);
            debug!(uid = %uid, "Suppressed repeated read");
            continue;
        }

        info!(uid = %uid, "Tag read");
        dispatcher.handle_tag(uid).await;
    }

    info!("Tag reader worker stopped");
}

/// Button worker
///
/// Presses on pins without a binding are ignored; releases never trigger.
/// Each pin is debounced on its own.
pub async fn run_button_worker<S>(
    source: S,
    bindings: HashMap<u8, Action>,
    dispatcher: Arc<Dispatcher>,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: ButtonSource + 'static,
{
    let mut source = ReleaseGuard::new(source);
    let mut debouncers: HashMap<u8, Debouncer<()>> = bindings
        .keys()
        .map(|pin| (*pin, Debouncer::new(window)))
        .collect();
    source.set_indicator(true);
    info!(pins = ?bindings.keys().collect::<Vec<_>>(), "Button worker started");

    while !stopping(&shutdown) {
        let edge = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            edge = source.next_edge() => edge,
        };

        let edge = match edge {
            Ok(edge) => edge,
            Err(e) if e.is_transient() => {
                dispatcher.read_failed("buttons", &e);
                continue;
            }
            Err(e) => {
                error!(error = %e, "Button source disconnected, stopping worker");
                break;
            }
        };

        if !edge.pressed {
            continue;
        }
        let (Some(action), Some(debouncer)) =
            (bindings.get(&edge.pin), debouncers.get_mut(&edge.pin))
        else {
            debug!(pin = edge.pin, "Press on unbound pin ignored");
            continue;
        };

        if !debouncer.accept(&(), Instant::now()) {
            DispatchMetrics::bump(&dispatcher.metrics.suppressed);
            debug!(pin = edge.pin, "Suppressed switch bounce");
            continue;
        }

        dispatcher.handle_button(edge.pin, action).await;
    }

    source.set_indicator(false);
    info!("Button worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::feedback::SystemControl;
    use crate::infra::hardware::{ButtonEdge, Release};
    use crate::infra::playback::MockPlayback;
    use crate::infra::registry::MemorySnapshot;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tapdeck_common::{ActionKind, ExecutionError};

    #[derive(Default)]
    struct RecordingFeedback {
        cues: Mutex<Vec<FeedbackCue>>,
    }

    #[async_trait]
    impl FeedbackPlayer for RecordingFeedback {
        async fn play(&self, cue: FeedbackCue) {
            self.cues.lock().push(cue);
        }
    }

    struct NoSystem;

    #[async_trait]
    impl SystemControl for NoSystem {
        async fn power_off(&self) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    struct ScriptedReader {
        reads: VecDeque<Result<String, ReadError>>,
        released: Arc<AtomicUsize>,
    }

    impl Release for ScriptedReader {
        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TagReader for ScriptedReader {
        async fn read_tag(&mut self) -> Result<String, ReadError> {
            match self.reads.pop_front() {
                Some(read) => read,
                None => std::future::pending().await,
            }
        }
    }

    struct ScriptedButtons {
        edges: VecDeque<Result<ButtonEdge, ReadError>>,
        indicator: Arc<Mutex<Vec<bool>>>,
        released: Arc<AtomicUsize>,
    }

    impl Release for ScriptedButtons {
        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ButtonSource for ScriptedButtons {
        async fn next_edge(&mut self) -> Result<ButtonEdge, ReadError> {
            match self.edges.pop_front() {
                Some(edge) => edge,
                None => std::future::pending().await,
            }
        }

        fn set_indicator(&mut self, on: bool) {
            self.indicator.lock().push(on);
        }
    }

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        registry: Arc<Registry>,
        latest: Arc<LatestCell>,
        feedback: Arc<RecordingFeedback>,
    }

    fn fixture(playback: MockPlayback) -> Fixture {
        let registry = Arc::new(Registry::open(MemorySnapshot::new()).unwrap());
        let latest = Arc::new(LatestCell::new());
        let feedback = Arc::new(RecordingFeedback::default());
        let ctx = ActionContext::new(Arc::new(playback), Arc::new(NoSystem));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            latest.clone(),
            ctx,
            feedback.clone(),
        ));
        Fixture {
            dispatcher,
            registry,
            latest,
            feedback,
        }
    }

    fn tracklist_playback() -> MockPlayback {
        let mut playback = MockPlayback::new();
        playback.expect_playlists().returning(|| Ok(vec![]));
        playback.expect_browse().returning(|_| Ok(vec![]));
        playback.expect_clear_tracklist().times(1).returning(|| Ok(()));
        playback
            .expect_add_tracks()
            .withf(|uris| uris == &vec!["local:track:foo".to_string()])
            .times(1)
            .returning(|_| Ok(()));
        playback.expect_play().times(1).returning(|| Ok(()));
        playback
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_registered_tag_runs_action_and_publishes() {
        let f = fixture(tracklist_playback());
        f.registry
            .register(
                ActionKind::ReplaceTracklist,
                "04A1B2",
                Some("Bedtime"),
                Some("local:track:foo"),
            )
            .unwrap();

        let uid = TagUid::parse("04a1b2").unwrap();
        let result = f.dispatcher.handle_tag(uid).await;

        let resolved = result.resolved.unwrap();
        assert_eq!(resolved.uid.as_str(), "04A1B2");
        assert_eq!(resolved.last_scanned, Some(result.scanned_at));
        assert_eq!(*f.feedback.cues.lock(), vec![FeedbackCue::Success]);

        let latest = f.latest.get().unwrap();
        assert_eq!(latest.uid.as_str(), "04A1B2");
        assert!(latest.is_registered());
    }

    #[tokio::test]
    async fn test_unknown_tag_plays_failure_cue() {
        let f = fixture(MockPlayback::new());

        let result = f.dispatcher.handle_tag(TagUid::parse("DEAD").unwrap()).await;

        assert!(result.resolved.is_none());
        assert_eq!(*f.feedback.cues.lock(), vec![FeedbackCue::Failure]);
        assert_eq!(f.latest.get().unwrap().uid.as_str(), "DEAD");
        assert_eq!(f.dispatcher.metrics().snapshot().unknown_tags, 1);
    }

    #[tokio::test]
    async fn test_failed_action_still_publishes() {
        let mut playback = MockPlayback::new();
        playback.expect_next().returning(|| {
            Err(ExecutionError::Backend {
                method: "core.playback.next".into(),
                reason: "connection refused".into(),
            })
        });
        let f = fixture(playback);
        f.registry
            .register(ActionKind::NextTrack, "01", None, None)
            .unwrap();

        f.dispatcher.handle_tag(TagUid::parse("01").unwrap()).await;

        assert!(f.latest.get().unwrap().is_registered());
        assert_eq!(f.dispatcher.metrics().snapshot().failed_actions, 1);
    }

    #[tokio::test]
    async fn test_tag_worker_debounces_and_stops_on_shutdown() {
        let f = fixture(tracklist_playback());
        f.registry
            .register(ActionKind::ReplaceTracklist, "04A1B2", None, Some("local:track:foo"))
            .unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedReader {
            reads: VecDeque::from(vec![
                Ok("04a1b2".to_string()),
                Ok("04A1B2".to_string()),
                Err(ReadError::Transient("checksum mismatch".into())),
                Ok("not-a-uid".to_string()),
                Ok(" 04a1b2 ".to_string()),
            ]),
            released: released.clone(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(run_tag_worker(
            reader,
            f.dispatcher.clone(),
            Duration::from_secs(60),
            stop_rx,
        ));

        let dispatcher = f.dispatcher.clone();
        wait_for(move || dispatcher.metrics().snapshot().suppressed == 2).await;
        let stats = f.dispatcher.metrics().snapshot();
        assert_eq!(stats.triggers, 1);
        assert_eq!(stats.read_errors, 2);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_power_off_is_the_last_action() {
        // Any playback call after the power-off would fail the mock
        let f = fixture(MockPlayback::new());
        f.registry
            .register(ActionKind::Shutdown, "01", None, None)
            .unwrap();
        f.registry
            .register(ActionKind::NextTrack, "02", None, None)
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = Arc::new(
            Dispatcher::new(
                f.registry.clone(),
                f.latest.clone(),
                ActionContext::new(Arc::new(MockPlayback::new()), Arc::new(NoSystem)),
                f.feedback.clone(),
            )
            .with_stop(stop_tx),
        );

        let released = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedReader {
            reads: VecDeque::from(vec![Ok("01".to_string()), Ok("02".to_string())]),
            released: released.clone(),
        };

        tokio::time::timeout(
            Duration::from_secs(5),
            run_tag_worker(reader, dispatcher.clone(), Duration::from_secs(1), stop_rx.clone()),
        )
        .await
        .unwrap();

        assert!(*stop_rx.borrow());
        assert_eq!(dispatcher.metrics().snapshot().triggers, 1);
        assert_eq!(f.latest.get().unwrap().uid.as_str(), "01");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_power_off_keeps_running() {
        struct BrokenSystem;

        #[async_trait]
        impl SystemControl for BrokenSystem {
            async fn power_off(&self) -> Result<(), ExecutionError> {
                Err(ExecutionError::System("sudo: not permitted".into()))
            }
        }

        let registry = Arc::new(Registry::open(MemorySnapshot::new()).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(LatestCell::new()),
            ActionContext::new(Arc::new(MockPlayback::new()), Arc::new(BrokenSystem)),
            Arc::new(RecordingFeedback::default()),
        )
        .with_stop(stop_tx);

        dispatcher.handle_button(11, &Action::Shutdown).await;

        assert!(!*stop_rx.borrow());
        assert_eq!(dispatcher.metrics().snapshot().failed_actions, 1);
    }

    #[tokio::test]
    async fn test_tag_worker_ends_on_disconnect() {
        let f = fixture(MockPlayback::new());
        let released = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedReader {
            reads: VecDeque::from(vec![
                Ok("AA".to_string()),
                Err(ReadError::Disconnected("unplugged".into())),
            ]),
            released: released.clone(),
        };

        let (_stop_tx, stop_rx) = watch::channel(false);
        run_tag_worker(reader, f.dispatcher.clone(), Duration::from_secs(1), stop_rx).await;

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(f.latest.get().unwrap().uid.as_str(), "AA");
    }

    #[tokio::test]
    async fn test_button_worker_triggers_on_press_only() {
        let mut playback = MockPlayback::new();
        playback.expect_stop().times(1).returning(|| Ok(()));
        let f = fixture(playback);

        let indicator = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(AtomicUsize::new(0));
        let source = ScriptedButtons {
            edges: VecDeque::from(vec![
                Ok(ButtonEdge { pin: 11, pressed: true }),
                Ok(ButtonEdge { pin: 11, pressed: false }),
                Ok(ButtonEdge { pin: 11, pressed: true }),
                Ok(ButtonEdge { pin: 40, pressed: true }),
                Err(ReadError::Disconnected("gpio closed".into())),
            ]),
            indicator: indicator.clone(),
            released: released.clone(),
        };

        let bindings = HashMap::from([(11u8, Action::Stop)]);
        let (_stop_tx, stop_rx) = watch::channel(false);
        run_button_worker(
            source,
            bindings,
            f.dispatcher.clone(),
            Duration::from_secs(60),
            stop_rx,
        )
        .await;

        let stats = f.dispatcher.metrics().snapshot();
        assert_eq!(stats.triggers, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(*f.feedback.cues.lock(), vec![FeedbackCue::Success]);
        assert_eq!(*indicator.lock(), vec![true, false]);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        // Button presses never touch the latest scan
        assert!(f.latest.get().is_none());
    }
}
