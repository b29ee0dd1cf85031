use crate::common::{CapturedFrame, LandmarkId, NarrationText, PlacementPolicy};
use crate::config::Configuration;
use crate::error::{panic_message, AppError, StageError};
use crate::pipeline::asset_load::{
    AssetLoadDispatcher, AssetLoadReport, LoadReportHub, PendingLoad,
};
use crate::pipeline::guard::{FlightPermit, SingleFlight};
use crate::pipeline::observer::{ObserverSet, PipelineObserver};
use crate::pipeline::run::{PipelineRun, RunReport};
use crate::pipeline::state::{Outcome, PipelineState};
use crate::ports::{
    AssetLoader, AssetLookupService, Collaborators, FrameSource, NarrationService,
    RecognitionService, SpatialPlacer, SpeechService, ViewerTracker,
};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

/// Result of pressing "start".
#[derive(Debug)]
pub enum Trigger {
    Started(RunHandle),
    /// A run was already in progress; nothing happened.
    Busy,
}

impl Trigger {
    pub fn is_started(&self) -> bool {
        matches!(self, Trigger::Started(_))
    }

    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            Trigger::Started(handle) => Some(handle),
            Trigger::Busy => None,
        }
    }
}

/// Awaitable handle to a started run
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    report_rx: oneshot::Receiver<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the run to return to `Idle`.
    pub async fn wait(self) -> RunReport {
        let run_id = self.run_id;
        self.report_rx
            .await
            .unwrap_or_else(|_| RunReport::lost(run_id, "run task ended without a report"))
    }

    pub async fn outcome(self) -> Outcome {
        self.wait().await.outcome
    }
}

struct ActiveRun {
    run_id: Uuid,
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct CoordinatorInner {
    configuration: Configuration,
    collaborators: Collaborators,
    policy: PlacementPolicy,
    loads: AssetLoadDispatcher,
    observers: tokio::sync::Mutex<ObserverSet>,
    state_tx: Arc<watch::Sender<PipelineState>>,
}

/// Sequences capture, recognition, lookup, placement, narration and speech for one run at a time.
///
/// Runs execute on a spawned task, so [`PipelineCoordinator::trigger`] must be called from
/// inside a tokio runtime.
pub struct PipelineCoordinator {
    inner: Arc<CoordinatorInner>,
    flight: SingleFlight,
    cancel_token: CancellationToken,
    active: Mutex<Option<ActiveRun>>,
    state_rx: watch::Receiver<PipelineState>,
}

impl PipelineCoordinator {
    pub fn builder(configuration: Configuration) -> CoordinatorBuilder {
        CoordinatorBuilder::new(configuration)
    }

    fn new(
        configuration: Configuration,
        collaborators: Collaborators,
        observers: ObserverSet,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let loads = AssetLoadDispatcher::new(
            Arc::clone(&collaborators.loader),
            LoadReportHub::new(),
            configuration.asset_load_timeout(),
            cancel_token.clone(),
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                policy: PlacementPolicy::new(configuration.placement_distance),
                configuration,
                collaborators,
                loads,
                observers: tokio::sync::Mutex::new(observers),
                state_tx: Arc::new(state_tx),
            }),
            flight: SingleFlight::new(),
            cancel_token,
            active: Mutex::new(None),
            state_rx,
        }
    }

    /// Start a run unless one is already in progress.
    pub fn trigger(&self) -> Trigger {
        // held across spawn and insert so `cancel` never sees a stale run
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(permit) = self.flight.try_acquire() else {
            debug!("Run already in progress; trigger ignored");
            return Trigger::Busy;
        };

        let run_id = Uuid::new_v4();
        let token = self.cancel_token.child_token();
        let (report_tx, report_rx) = oneshot::channel();
        let run = PipelineRun::new(run_id, Arc::clone(&self.inner.state_tx));
        let task = tokio::spawn(Self::drive(
            Arc::clone(&self.inner),
            run,
            permit,
            token.clone(),
            report_tx,
        ));

        *active = Some(ActiveRun {
            run_id,
            token,
            task,
        });

        Trigger::Started(RunHandle { run_id, report_rx })
    }

    /// Cancel the active run, if any. Returns whether there was one to cancel.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.flight.is_running() {
            return false;
        }
        match active.as_ref() {
            Some(active) => {
                info!("Cancelling run {}", active.run_id);
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    /// Receiver that sees every published state change
    pub fn state_changes(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }

    /// Subscribe to asset load reports. Only the first caller gets the stream; loads that
    /// finish before anyone subscribes are not buffered.
    pub fn asset_load_reports(&self) -> Option<UnboundedReceiverStream<AssetLoadReport>> {
        self.inner
            .loads
            .reports()
            .subscribe()
            .map(UnboundedReceiverStream::new)
    }

    /// Destroy the anchor and whatever is attached to it.
    pub fn clear_anchor(&self) {
        self.inner.collaborators.placer.clear();
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    /// Cancel everything and wait for the active run to wind down.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            if let Err(e) = active.task.await {
                error!("Run {} task failed during shutdown: {}", active.run_id, e);
            }
        }
        info!("Pipeline coordinator stopped");
    }

    async fn drive(
        inner: Arc<CoordinatorInner>,
        mut run: PipelineRun,
        permit: FlightPermit,
        token: CancellationToken,
        report_tx: oneshot::Sender<RunReport>,
    ) {
        let span = tracing::info_span!("pipeline_run", run_id = %run.id());
        async move {
            info!("Starting capture");
            let context = RunContext {
                inner: &inner,
                token: &token,
            };

            let result = AssertUnwindSafe(context.execute(&mut run))
                .catch_unwind()
                .await;
            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!("Run failed in {}: {}", run.state(), e);
                    Outcome::Failed(e.to_string())
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!("Run panicked in {}: {}", run.state(), reason);
                    Outcome::Failed(format!("internal error: {}", reason))
                }
            };

            let report = run.finish(outcome);
            info!("Run finished with {} in {}ms", report.outcome, report.total_ms);
            inner.observers.lock().await.notify_run(&report);

            drop(permit);
            let _ = report_tx.send(report);
        }
        .instrument(span)
        .await
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Borrowed view of the coordinator for a single run
struct RunContext<'a> {
    inner: &'a CoordinatorInner,
    token: &'a CancellationToken,
}

impl RunContext<'_> {
    /// Await `fut`, bounded by `limit` and by run cancellation.
    async fn bounded<F: Future>(
        &self,
        stage: PipelineState,
        limit: Duration,
        fut: F,
    ) -> Result<F::Output, StageError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StageError::Cancelled { stage }),
            res = tokio::time::timeout(limit, fut) => {
                res.map_err(|_| StageError::TimedOut { stage, timeout: limit })
            }
        }
    }

    async fn execute(&self, run: &mut PipelineRun) -> Result<Outcome, StageError> {
        let configuration = &self.inner.configuration;
        let collaborators = &self.inner.collaborators;

        run.advance(PipelineState::CapturingFrame)?;
        let frame = self
            .bounded(
                PipelineState::CapturingFrame,
                configuration.capture_timeout(),
                self.poll_frame(),
            )
            .await?;
        let viewer = collaborators.viewer.viewer_pose();
        info!(
            "Frame {} captured ({}x{})",
            frame.id(),
            frame.width(),
            frame.height()
        );

        run.advance(PipelineState::Recognizing)?;
        let recognized = self
            .bounded(
                PipelineState::Recognizing,
                configuration.recognition_timeout(),
                collaborators.recognition.identify(&frame),
            )
            .await;
        frame.release();

        let landmark = match recognized? {
            Ok(landmark) => landmark,
            Err(e) => {
                warn!("Recognition failed: {}", e);
                LandmarkId::Unidentified
            }
        };
        if !landmark.is_identified() {
            warn!("No landmark identified");
            return Ok(Outcome::AbortedNoLandmark);
        }
        info!("Identified landmark: {}", landmark);
        run.record_landmark(landmark.clone());

        run.advance(PipelineState::LookingUpAsset)?;
        let asset = match self
            .bounded(
                PipelineState::LookingUpAsset,
                configuration.lookup_timeout(),
                collaborators.lookup.search(&landmark),
            )
            .await?
        {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Asset lookup failed: {}", e);
                None
            }
        };
        let Some(asset) = asset else {
            warn!("No asset found for {}", landmark);
            return Ok(Outcome::AbortedNoAsset);
        };
        info!("Asset reference: {}", asset);
        run.record_asset(asset.clone());

        run.advance(PipelineState::PlacingAndLoading)?;
        let placement = self.inner.policy.place_in_front(&viewer);
        let anchor = collaborators.placer.place(placement);
        info!("Anchor {} placed at {}", anchor.id(), placement.position);
        run.record_anchor(anchor.clone());
        let pending_load = self.inner.loads.dispatch(run.id(), asset, anchor);

        run.advance(PipelineState::Narrating)?;
        let narration = match self
            .bounded(
                PipelineState::Narrating,
                configuration.narration_timeout(),
                collaborators.narration.narrate(&landmark),
            )
            .await?
        {
            Ok(narration) => narration,
            Err(e) => {
                warn!("Narration failed: {}", e);
                NarrationText::empty()
            }
        };
        if narration.is_empty() {
            warn!("No narration for {}", landmark);
            return Ok(Outcome::AbortedNoNarration);
        }
        info!("Narration received ({} words)", narration.word_count());
        run.record_narration(narration.clone());

        run.advance(PipelineState::Synthesizing)?;
        match self
            .bounded(
                PipelineState::Synthesizing,
                configuration.speech_timeout(),
                collaborators.speech.speak(&narration),
            )
            .await?
        {
            Ok(()) => info!("Narration played"),
            Err(e) => error!("Speech playback failed: {}", e),
        }

        if configuration.require_asset_load {
            self.await_asset_load(pending_load).await?;
        }

        Ok(Outcome::Success)
    }

    #[instrument(skip(self))]
    async fn poll_frame(&self) -> CapturedFrame {
        let interval = self.inner.configuration.frame_poll_interval();
        let mut misses: u32 = 0;
        loop {
            if let Some(frame) = self.inner.collaborators.frames.acquire().await {
                debug!("Frame available after {} empty polls", misses);
                return frame;
            }
            misses += 1;
            tokio::time::sleep(interval).await;
        }
    }

    async fn await_asset_load(&self, pending: PendingLoad) -> Result<(), StageError> {
        // the load task applies its own asset_load_timeout
        let report = self
            .bounded(
                PipelineState::Synthesizing,
                self.inner.configuration.asset_load_timeout() + Duration::from_secs(1),
                pending.wait(),
            )
            .await?;
        match report {
            Some(report) => report.result.map_err(StageError::AssetLoad),
            None => Err(StageError::AssetLoad("load task ended without a report".to_string())),
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    frames: Option<Arc<dyn FrameSource>>,
    viewer: Option<Arc<dyn ViewerTracker>>,
    recognition: Option<Arc<dyn RecognitionService>>,
    lookup: Option<Arc<dyn AssetLookupService>>,
    placer: Option<Arc<dyn SpatialPlacer>>,
    loader: Option<Arc<dyn AssetLoader>>,
    narration: Option<Arc<dyn NarrationService>>,
    speech: Option<Arc<dyn SpeechService>>,
    observers: ObserverSet,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            frames: None,
            viewer: None,
            recognition: None,
            lookup: None,
            placer: None,
            loader: None,
            narration: None,
            speech: None,
            observers: ObserverSet::new(),
        }
    }

    /// Overrides the configured capture timeout.
    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.configuration.capture_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Overrides the configured frame poll interval.
    pub fn frame_poll_interval(mut self, interval: Duration) -> Self {
        self.configuration.frame_poll_interval_ms =
            u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Folds the asset load result into the run outcome.
    pub fn require_asset_load(mut self, require: bool) -> Self {
        self.configuration.require_asset_load = require;
        self
    }

    pub fn frame_source(mut self, frames: Arc<dyn FrameSource>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn viewer_tracker(mut self, viewer: Arc<dyn ViewerTracker>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn recognition(mut self, recognition: Arc<dyn RecognitionService>) -> Self {
        self.recognition = Some(recognition);
        self
    }

    pub fn asset_lookup(mut self, lookup: Arc<dyn AssetLookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn spatial_placer(mut self, placer: Arc<dyn SpatialPlacer>) -> Self {
        self.placer = Some(placer);
        self
    }

    pub fn asset_loader(mut self, loader: Arc<dyn AssetLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn narration(mut self, narration: Arc<dyn NarrationService>) -> Self {
        self.narration = Some(narration);
        self
    }

    pub fn speech(mut self, speech: Arc<dyn SpeechService>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observers = self.observers.add_observer(observer);
        self
    }

    pub fn build(self) -> Result<PipelineCoordinator, AppError> {
        self.configuration.validate()?;
        let collaborators = Collaborators {
            frames: required(self.frames, "frame source")?,
            viewer: required(self.viewer, "viewer tracker")?,
            recognition: required(self.recognition, "recognition service")?,
            lookup: required(self.lookup, "asset lookup service")?,
            placer: required(self.placer, "spatial placer")?,
            loader: required(self.loader, "asset loader")?,
            narration: required(self.narration, "narration service")?,
            speech: required(self.speech, "speech service")?,
        };
        Ok(PipelineCoordinator::new(
            self.configuration,
            collaborators,
            self.observers,
        ))
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Pipeline(format!("{} not set", name)))
}
