//! A monitoring session owns its window, alert list and two periodic tasks.
//!
//! The capture poll and the model analysis run as separate tasks so a slow
//! model never delays ingestion. Stopping flips a `watch` channel that both
//! loops select on. A model call already in flight still completes, but each
//! run has a generation number and results from an older generation are
//! discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::MonitoringSettings;
use crate::detection::{build_traffic_prompt, AnomalyReportBuilder, RiskScorer, SlidingWindowAggregator, WindowStats};
use crate::inference::InferenceClient;
use crate::input::ObservationSource;
use crate::models::{AnomalyVerdict, ScoredObservation};

struct SessionState {
    window: RwLock<SlidingWindowAggregator>,
    alerts: Mutex<VecDeque<AnomalyVerdict>>,
    last_verdict: Mutex<Option<AnomalyVerdict>>,
    anomaly_count: AtomicU64,
    generation: AtomicU64,
    active: AtomicBool,
}

/// The parts of a session its background tasks need
struct SessionCore<S, C> {
    source: Arc<S>,
    client: Arc<C>,
    settings: MonitoringSettings,
    scorer: RiskScorer,
    state: SessionState,
    verdict_tx: Option<mpsc::Sender<AnomalyVerdict>>,
}

impl<S: ObservationSource, C: InferenceClient> SessionCore<S, C> {
    fn is_current(&self, generation: u64) -> bool {
        self.state.generation.load(Ordering::SeqCst) == generation
    }

    async fn ingest(&self, generation: u64) -> usize {
        let observations = match self.source.poll().await {
            Ok(observations) => observations,
            Err(e) => {
                log::warn!("Capture poll failed: {}", e);
                return 0;
            }
        };

        let scored: Vec<ScoredObservation> = observations
            .into_iter()
            .map(|obs| self.scorer.assess(obs))
            .collect();
        let count = scored.len();

        let mut window = self.state.window.write().await;
        if !self.is_current(generation) {
            return 0;
        }
        window.extend(scored);
        count
    }

    async fn analyze(&self, generation: u64) -> Option<AnomalyVerdict> {
        let snapshot = self
            .state
            .window
            .read()
            .await
            .recent(self.settings.analysis_slice);
        if snapshot.is_empty() {
            log::debug!("Window empty, skipping analysis");
            return None;
        }

        let prompt = build_traffic_prompt(&WindowStats::from_entries(snapshot.iter()));
        let response = self.client.invoke_model(&self.settings.model_id, &prompt).await;

        if !response.success {
            log::warn!(
                "Anomaly analysis failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
            return None;
        }

        let verdict = AnomalyReportBuilder::new(&self.settings.model_id).build(&snapshot, &response.text);

        {
            // start() clears alerts under this lock after bumping the generation
            let mut alerts = self.state.alerts.lock().await;
            if !self.is_current(generation) {
                log::debug!("Dropping analysis result from a stopped run");
                return None;
            }

            if verdict.is_alert_worthy() {
                self.state.anomaly_count.fetch_add(1, Ordering::SeqCst);
                alerts.push_front(verdict.clone());
                alerts.truncate(self.settings.max_alerts);
                log::warn!(
                    "Anomaly detected: {} (risk {}/10)",
                    verdict.severity,
                    verdict.risk_score
                );
            }

            *self.state.last_verdict.lock().await = Some(verdict.clone());
        }

        if let Some(ref tx) = self.verdict_tx {
            if tx.send(verdict.clone()).await.is_err() {
                log::debug!("Verdict receiver dropped");
            }
        }

        Some(verdict)
    }
}

/// A start/stop-able monitoring run over one observation source and one model
pub struct MonitoringSession<S, C> {
    core: Arc<SessionCore<S, C>>,
    stop_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S, C> MonitoringSession<S, C>
where
    S: ObservationSource + 'static,
    C: InferenceClient + 'static,
{
    pub fn new(source: Arc<S>, client: Arc<C>, settings: MonitoringSettings) -> Self {
        Self::build(source, client, settings, None)
    }

    /// Like [`MonitoringSession::new`], also forwarding every verdict to `verdict_tx`
    pub fn with_verdict_sink(
        source: Arc<S>,
        client: Arc<C>,
        settings: MonitoringSettings,
        verdict_tx: mpsc::Sender<AnomalyVerdict>,
    ) -> Self {
        Self::build(source, client, settings, Some(verdict_tx))
    }

    fn build(
        source: Arc<S>,
        client: Arc<C>,
        settings: MonitoringSettings,
        verdict_tx: Option<mpsc::Sender<AnomalyVerdict>>,
    ) -> Self {
        let settings = settings.clamped();
        let state = SessionState {
            window: RwLock::new(SlidingWindowAggregator::new(settings.window_capacity)),
            alerts: Mutex::new(VecDeque::new()),
            last_verdict: Mutex::new(None),
            anomaly_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            active: AtomicBool::new(false),
        };

        MonitoringSession {
            core: Arc::new(SessionCore {
                source,
                client,
                settings,
                scorer: RiskScorer::new(),
                state,
                verdict_tx,
            }),
            stop_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Start both periodic tasks.
    ///
    /// Clears the window, alerts and anomaly counter left by a previous run.
    /// Must be called from within a tokio runtime.
    pub async fn start(&mut self) {
        if self.is_active() {
            self.stop();
        }

        // Bump first so late results from the previous run fail their check
        let state = &self.core.state;
        let generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;

        state.window.write().await.clear();
        {
            let mut alerts = state.alerts.lock().await;
            alerts.clear();
            *state.last_verdict.lock().await = None;
            state.anomaly_count.store(0, Ordering::SeqCst);
        }
        let (stop_tx, stop_rx) = watch::channel(false);

        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(ingest_loop(
            Arc::clone(&self.core),
            stop_rx.clone(),
            generation,
        )));
        self.tasks.push(tokio::spawn(analysis_loop(
            Arc::clone(&self.core),
            stop_rx,
            generation,
        )));
        self.stop_tx = Some(stop_tx);
        state.active.store(true, Ordering::SeqCst);

        log::info!(
            "Monitoring started (poll every {:?}, analysis every {:?})",
            self.core.settings.poll_interval,
            self.core.settings.analysis_interval
        );
    }

    /// Cancel both tasks. Results of calls still in flight are discarded.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.core.state.generation.fetch_add(1, Ordering::SeqCst);
        if self.core.state.active.swap(false, Ordering::SeqCst) {
            log::info!("Monitoring stopped");
        }
    }

    /// Stop and wait for both tasks to exit
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::error!("Monitoring task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.core.state.active.load(Ordering::SeqCst)
    }

    /// Run one capture poll now, returning how many observations were added
    pub async fn ingest_tick(&self) -> usize {
        let generation = self.core.state.generation.load(Ordering::SeqCst);
        self.core.ingest(generation).await
    }

    /// Run one analysis now
    pub async fn analysis_tick(&self) -> Option<AnomalyVerdict> {
        let generation = self.core.state.generation.load(Ordering::SeqCst);
        self.core.analyze(generation).await
    }

    /// Copy of the window, oldest first
    pub async fn window_snapshot(&self) -> Vec<ScoredObservation> {
        self.core.state.window.read().await.snapshot()
    }

    pub async fn window_stats(&self) -> WindowStats {
        self.core.state.window.read().await.stats()
    }

    /// Alert-worthy verdicts, newest first
    pub async fn alerts(&self) -> Vec<AnomalyVerdict> {
        self.core.state.alerts.lock().await.iter().cloned().collect()
    }

    pub async fn last_verdict(&self) -> Option<AnomalyVerdict> {
        self.core.state.last_verdict.lock().await.clone()
    }

    /// Alert-worthy verdicts seen since the last start
    pub fn anomaly_count(&self) -> u64 {
        self.core.state.anomaly_count.load(Ordering::SeqCst)
    }
}

impl<S, C> Drop for MonitoringSession<S, C> {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

async fn ingest_loop<S, C>(core: Arc<SessionCore<S, C>>, mut stop: watch::Receiver<bool>, generation: u64)
where
    S: ObservationSource,
    C: InferenceClient,
{
    let period = core.settings.poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let added = core.ingest(generation).await;
                if added > 0 {
                    log::debug!("Captured {} observations", added);
                }
            }
        }
    }
}

async fn analysis_loop<S, C>(core: Arc<SessionCore<S, C>>, mut stop: watch::Receiver<bool>, generation: u64)
where
    S: ObservationSource,
    C: InferenceClient,
{
    let period = core.settings.analysis_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                core.analyze(generation).await;
            }
        }
    }
}
