use crate::common::AssetReference;
use crate::error::panic_message;
use crate::ports::AssetLoader;
use crate::spatial::AnchorHandle;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// Result of one fire-and-observe asset load, tied to the run that started it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetLoadReport {
    pub run_id: Uuid,
    pub asset: AssetReference,
    pub anchor_id: Uuid,
    pub result: Result<(), String>,
}

impl AssetLoadReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Receiver side of a single load, used when the run waits for the load after all.
#[derive(Debug)]
pub struct PendingLoad {
    rx: oneshot::Receiver<AssetLoadReport>,
}

impl PendingLoad {
    /// `None` if the load task went away without reporting.
    pub async fn wait(self) -> Option<AssetLoadReport> {
        self.rx.await.ok()
    }
}

/// Delivers load reports to at most one subscriber.
///
/// Reports produced while nobody is subscribed are dropped, so an unobserved
/// coordinator holds no backlog.
#[derive(Clone, Default)]
pub struct LoadReportHub {
    subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<AssetLoadReport>>>>,
    taken: Arc<AtomicBool>,
}

impl LoadReportHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the report channel. Only the first caller gets a receiver.
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<AssetLoadReport>> {
        if self.taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Some(rx)
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn publish(&self, report: AssetLoadReport) {
        let mut subscriber = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = subscriber.as_ref() else {
            debug!("No subscriber; load report for run {} dropped", report.run_id);
            return;
        };
        if tx.send(report).is_err() {
            debug!("Load report subscriber went away");
            *subscriber = None;
        }
    }
}

/// Spawns asset loads as independent tasks and publishes their reports.
pub struct AssetLoadDispatcher {
    loader: Arc<dyn AssetLoader>,
    reports: LoadReportHub,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl AssetLoadDispatcher {
    pub fn new(
        loader: Arc<dyn AssetLoader>,
        reports: LoadReportHub,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            loader,
            reports,
            timeout,
            shutdown,
        }
    }

    pub fn reports(&self) -> &LoadReportHub {
        &self.reports
    }

    /// Start loading `asset` under `anchor` without waiting for it.
    pub fn dispatch(
        &self,
        run_id: Uuid,
        asset: AssetReference,
        anchor: AnchorHandle,
    ) -> PendingLoad {
        let (tx, rx) = oneshot::channel();
        let loader = Arc::clone(&self.loader);
        let reports = self.reports.clone();
        let timeout = self.timeout;
        let shutdown = self.shutdown.clone();
        let anchor_id = anchor.id();
        let span = tracing::info_span!("asset_load", run_id = %run_id, asset = %asset);

        tokio::spawn(
            async move {
                info!("Loading asset");
                let load = AssertUnwindSafe(loader.load(asset.clone(), anchor)).catch_unwind();
                let result = tokio::select! {
                    _ = shutdown.cancelled() => Err("coordinator shut down".to_string()),
                    res = tokio::time::timeout(timeout, load) => match res {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(e))) => Err(e.to_string()),
                        Ok(Err(panic)) => {
                            Err(format!("internal error: {}", panic_message(panic.as_ref())))
                        }
                        Err(_) => Err(format!("timed out after {:?}", timeout)),
                    },
                };

                match &result {
                    Ok(()) => info!("Asset loaded"),
                    Err(reason) => error!("Asset load failed: {}", reason),
                }

                let report = AssetLoadReport {
                    run_id,
                    asset,
                    anchor_id,
                    result,
                };
                reports.publish(report.clone());
                let _ = tx.send(report);
            }
            .instrument(span),
        );

        PendingLoad { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Placement;
    use crate::error::ServiceError;
    use crate::ports::SpatialPlacer;
    use crate::spatial::SingleAnchorPlacer;
    use async_trait::async_trait;
    use nalgebra::{Point3, UnitQuaternion};

    struct SlowLoader(Duration, bool);

    #[async_trait]
    impl AssetLoader for SlowLoader {
        async fn load(
            &self,
            _reference: AssetReference,
            _anchor: AnchorHandle,
        ) -> Result<(), ServiceError> {
            tokio::time::sleep(self.0).await;
            if self.1 {
                Ok(())
            } else {
                Err(ServiceError::Malformed("not a glb".into()))
            }
        }
    }

    struct CrashingLoader;

    #[async_trait]
    impl AssetLoader for CrashingLoader {
        async fn load(
            &self,
            _reference: AssetReference,
            _anchor: AnchorHandle,
        ) -> Result<(), ServiceError> {
            panic!("decoder blew up");
        }
    }

    fn anchor() -> AnchorHandle {
        SingleAnchorPlacer::new().place(Placement::new(
            Point3::origin(),
            UnitQuaternion::identity(),
        ))
    }

    fn asset() -> AssetReference {
        AssetReference::parse("https://example.com/model.glb").unwrap()
    }

    fn dispatcher(loader: Arc<dyn AssetLoader>, timeout: Duration) -> AssetLoadDispatcher {
        AssetLoadDispatcher::new(loader, LoadReportHub::new(), timeout, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn report_is_published_on_channel_and_pending_load() {
        let dispatcher = dispatcher(
            Arc::new(SlowLoader(Duration::from_millis(300), true)),
            Duration::from_secs(5),
        );
        let mut rx = dispatcher.reports().subscribe().expect("subscriber");
        let run_id = Uuid::new_v4();

        let pending = dispatcher.dispatch(run_id, asset(), anchor());
        let direct = pending.wait().await.expect("report");
        let published = rx.recv().await.expect("published report");

        assert!(direct.succeeded());
        assert_eq!(direct, published);
        assert_eq!(published.run_id, run_id);
    }

    #[tokio::test(start_paused = true)]
    async fn loader_error_is_reported_not_raised() {
        let dispatcher = dispatcher(
            Arc::new(SlowLoader(Duration::from_millis(10), false)),
            Duration::from_secs(5),
        );
        let mut rx = dispatcher.reports().subscribe().expect("subscriber");

        dispatcher.dispatch(Uuid::new_v4(), asset(), anchor());
        let report = rx.recv().await.expect("report");
        assert_eq!(
            report.result,
            Err("Malformed service response: not a glb".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_load_times_out() {
        let dispatcher = dispatcher(
            Arc::new(SlowLoader(Duration::from_secs(3600), true)),
            Duration::from_secs(2),
        );

        let report = dispatcher
            .dispatch(Uuid::new_v4(), asset(), anchor())
            .wait()
            .await
            .expect("report");
        assert!(report.result.unwrap_err().contains("timed out"));
    }

    #[tokio::test]
    async fn loader_panic_is_reported() {
        let dispatcher = dispatcher(Arc::new(CrashingLoader), Duration::from_secs(5));
        let mut rx = dispatcher.reports().subscribe().expect("subscriber");
        let run_id = Uuid::new_v4();

        let direct = dispatcher
            .dispatch(run_id, asset(), anchor())
            .wait()
            .await
            .expect("pending load resolves");
        let published = rx.recv().await.expect("published report");

        assert_eq!(direct, published);
        assert_eq!(published.run_id, run_id);
        let reason = published.result.unwrap_err();
        assert!(reason.starts_with("internal error"));
        assert!(reason.contains("decoder blew up"));
    }

    #[tokio::test]
    async fn reports_without_subscriber_are_not_retained() {
        let dispatcher = dispatcher(
            Arc::new(SlowLoader(Duration::ZERO, true)),
            Duration::from_secs(5),
        );

        for _ in 0..50 {
            let report = dispatcher
                .dispatch(Uuid::new_v4(), asset(), anchor())
                .wait()
                .await
                .expect("report");
            assert!(report.succeeded());
        }
        assert!(!dispatcher.reports().has_subscriber());

        let mut rx = dispatcher.reports().subscribe().expect("subscriber");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_forgotten() {
        let hub = LoadReportHub::new();
        drop(hub.subscribe().expect("subscriber"));
        hub.publish(AssetLoadReport {
            run_id: Uuid::new_v4(),
            asset: asset(),
            anchor_id: Uuid::new_v4(),
            result: Ok(()),
        });

        assert!(!hub.has_subscriber());
        assert!(hub.subscribe().is_none());
    }
}
