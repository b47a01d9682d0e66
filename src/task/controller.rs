use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tracing::{info, warn};

use crate::chem::{ChemToolkit, Descriptors};
use crate::error::TaskError;
use crate::{AppContext, Settings};
use super::backend::RecognitionBackend;
use super::registry::TaskRegistry;
use super::runner::RecognitionRunner;
use super::types::{Outcome, Recognition, Task};

pub const STARTED_MESSAGE: &str = "Process started...";
pub const HEARTBEAT_MESSAGE: &str = ":heartbeat";

/// Terminal success payload sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub status: String,
    pub smiles: String,
    pub canonical_smiles: String,
    pub structure_key: String,
    pub molecule_svg: String,
    pub contains_r_group: bool,
    pub mol_weight: String,
    pub mol_formula: String,
    pub logp: String,
    pub h_donors: u32,
    pub h_acceptors: u32,
    pub tpsa: String,
    pub molecule_sdf: String,
}

impl SuccessPayload {
    pub fn new(recognition: &Recognition, d: Descriptors) -> Self {
        Self {
            status: "success".to_string(),
            smiles: recognition.smiles.clone(),
            canonical_smiles: d.canonical_smiles,
            structure_key: d.structure_key,
            molecule_svg: d.svg,
            contains_r_group: recognition.contains_r_group,
            mol_weight: format!("{:.3}", d.mol_weight),
            mol_formula: d.formula,
            logp: format!("{:.3}", d.logp),
            h_donors: d.h_donors,
            h_acceptors: d.h_acceptors,
            tpsa: format!("{:.2}", d.tpsa),
            molecule_sdf: d.sdf,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Started,
    Heartbeat,
    Failed { message: String },
    Completed(Box<SuccessPayload>),
}

impl StreamEvent {
    pub fn failed(err: &TaskError) -> Self {
        StreamEvent::Failed { message: err.to_string() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Failed { .. } | StreamEvent::Completed(_))
    }

    /// Text carried by the event's `data:` line.
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Started => STARTED_MESSAGE.to_string(),
            StreamEvent::Heartbeat => HEARTBEAT_MESSAGE.to_string(),
            StreamEvent::Failed { message } => error_json(message),
            StreamEvent::Completed(payload) => match serde_json::to_string(payload) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize success payload: {}", e);
                    error_json(&TaskError::EnrichmentFailed(e.to_string()).to_string())
                }
            },
        }
    }
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "status": "error", "message": message }).to_string()
}

enum Step {
    Tick,
    Finished,
    Cancelled,
}

/// Drives one task from registration to its terminal event: starts the
/// runner, keeps the connection alive while it works, notices cancellation
/// and enriches the accepted structure.
pub struct StreamController {
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn RecognitionBackend>,
    toolkit: Arc<dyn ChemToolkit>,
    settings: Settings,
}

impl StreamController {
    pub fn new(
        registry: Arc<TaskRegistry>,
        backend: Arc<dyn RecognitionBackend>,
        toolkit: Arc<dyn ChemToolkit>,
        settings: Settings,
    ) -> Self {
        Self { registry, backend, toolkit, settings }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(
            Arc::clone(&ctx.registry),
            Arc::clone(&ctx.backend),
            Arc::clone(&ctx.toolkit),
            ctx.settings.clone(),
        )
    }

    fn heartbeat(&self) -> Duration {
        self.settings.heartbeat_interval.max(Duration::from_millis(1))
    }

    /// The event sequence for `task`. Nothing happens until the stream is
    /// first polled; dropping it early deregisters the task and stops the
    /// runner.
    pub fn events(self, task: Task) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let registration = self.registry.register(&task.id);
            let runner = RecognitionRunner::new(
                Arc::clone(&self.backend),
                Arc::clone(&self.toolkit),
                self.settings.recognition_timeout,
                self.settings.stop_timeout,
            );
            let (mut handle, mut rx) = runner.spawn(task.clone(), registration.token().clone());
            yield StreamEvent::Started;

            let mut ticker = tokio::time::interval(self.heartbeat());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let step = tokio::select! {
                    _ = &mut handle => Step::Finished,
                    _ = registration.token().cancelled() => Step::Cancelled,
                    _ = ticker.tick() => {
                        if registration.is_active() { Step::Tick } else { Step::Cancelled }
                    }
                };
                match step {
                    Step::Tick => {
                        yield StreamEvent::Heartbeat;
                    }
                    Step::Finished => break,
                    Step::Cancelled => {
                        info!(task_id = %task.id, "Cancellation observed by stream");
                        break;
                    }
                }
            }

            let event = self.finalize(&task, &mut rx).await;
            if let StreamEvent::Failed { message } = &event {
                info!(task_id = %task.id, "Stream ending with error: {}", message);
            } else {
                info!(task_id = %task.id, "Stream ending with success");
            }
            yield event;

            registration.release();
            info!(
                task_id = %task.id,
                started = %task.created_at.to_rfc3339(),
                elapsed_ms = task.elapsed().num_milliseconds(),
                "Task deregistered"
            );
        }
    }

    /// Takes the outcome without waiting and turns it into the terminal event.
    async fn finalize(&self, task: &Task, rx: &mut oneshot::Receiver<Outcome>) -> StreamEvent {
        let outcome = rx.try_recv().unwrap_or(Err(TaskError::TaskVanished));
        let recognition = match outcome {
            Ok(recognition) => recognition,
            Err(e) => return StreamEvent::failed(&e),
        };

        let toolkit = Arc::clone(&self.toolkit);
        let smiles = recognition.smiles.clone();
        match tokio::task::spawn_blocking(move || toolkit.describe(&smiles)).await {
            Ok(Ok(descriptors)) => {
                StreamEvent::Completed(Box::new(SuccessPayload::new(&recognition, descriptors)))
            }
            Ok(Err(e)) => {
                warn!(task_id = %task.id, "Descriptor computation failed: {}", e);
                StreamEvent::failed(&TaskError::EnrichmentFailed(e.to_string()))
            }
            Err(e) => {
                warn!(task_id = %task.id, "Descriptor computation aborted: {}", e);
                StreamEvent::failed(&TaskError::EnrichmentFailed(format!(
                    "Descriptor computation aborted: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::{ChemError, Molecule, NativeToolkit};
    use crate::task::backend::testing::ScriptBackend;
    use std::path::Path;
    use tokio_stream::StreamExt;

    fn settings() -> Settings {
        Settings {
            recognition_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(1),
            ..Settings::default()
        }
    }

    fn controller(registry: &Arc<TaskRegistry>, script: &str) -> StreamController {
        StreamController::new(
            Arc::clone(registry),
            Arc::new(ScriptBackend::new(script)),
            Arc::new(NativeToolkit::new()),
            settings(),
        )
    }

    fn task(id: &str) -> Task {
        Task::new(id, "mol.png", Path::new("/tmp"))
    }

    async fn run_to_end(controller: StreamController, id: &str) -> Vec<StreamEvent> {
        tokio::time::timeout(Duration::from_secs(10), controller.events(task(id)).collect::<Vec<_>>())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_flow() {
        let registry = Arc::new(TaskRegistry::new());
        let events = run_to_end(controller(&registry, "sleep 0.2; echo 'CCO'"), "ok").await;

        assert_eq!(events.first(), Some(&StreamEvent::Started));
        assert!(events[1..events.len() - 1].iter().all(|e| *e == StreamEvent::Heartbeat));
        match events.last() {
            Some(StreamEvent::Completed(payload)) => {
                assert_eq!(payload.status, "success");
                assert_eq!(payload.smiles, "CCO");
                assert_eq!(payload.mol_formula, "C2H6O");
                assert_eq!(payload.mol_weight, "46.069");
                assert_eq!(payload.tpsa, "20.23");
                assert!(!payload.molecule_svg.is_empty());
                assert!(!payload.molecule_sdf.is_empty());
                assert!(!payload.contains_r_group);
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert!(!registry.is_active("ok"));
    }

    #[tokio::test]
    async fn test_wildcard_structure_still_succeeds() {
        let registry = Arc::new(TaskRegistry::new());
        let events = run_to_end(controller(&registry, "echo '*CCO'"), "rgroup").await;
        match events.last() {
            Some(StreamEvent::Completed(payload)) => {
                assert!(payload.contains_r_group);
                assert!(payload.molecule_sdf.is_empty());
                assert_eq!(payload.mol_formula, "C2H5O*");
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_flow() {
        let registry = Arc::new(TaskRegistry::new());
        let events = run_to_end(controller(&registry, "echo 'garbage'"), "bad").await;
        assert_eq!(events.last(), Some(&StreamEvent::failed(&TaskError::InvalidStructure)));
        assert!(!registry.is_active("bad"));

        let data = events.last().unwrap().data();
        let json: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], TaskError::InvalidStructure.to_string());
    }

    #[tokio::test]
    async fn test_cancel_during_polling() {
        let registry = Arc::new(TaskRegistry::new());
        let stream = controller(&registry, "sleep 30").events(task("cancel-me"));
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(StreamEvent::Started));
        assert!(registry.is_active("cancel-me"));
        assert!(registry.deregister("cancel-me"));

        let rest: Vec<StreamEvent> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .unwrap();
        let last = rest.last().unwrap();
        let cancelled = [
            StreamEvent::failed(&TaskError::TaskVanished),
            StreamEvent::failed(&TaskError::RecognitionCancelled),
        ];
        assert!(cancelled.contains(last), "unexpected terminal event {:?}", last);
        assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(!registry.is_active("cancel-me"));
    }

    #[tokio::test]
    async fn test_dropped_stream_deregisters() {
        let registry = Arc::new(TaskRegistry::new());
        {
            let stream = controller(&registry, "sleep 30").events(task("gone"));
            tokio::pin!(stream);
            assert_eq!(stream.next().await, Some(StreamEvent::Started));
            assert!(registry.is_active("gone"));
        }
        assert!(!registry.is_active("gone"));
    }

    #[tokio::test]
    async fn test_empty_channel_means_task_vanished() {
        let registry = Arc::new(TaskRegistry::new());
        let ctl = controller(&registry, "true");
        let (tx, mut rx) = oneshot::channel::<Outcome>();
        drop(tx);
        let event = ctl.finalize(&task("v"), &mut rx).await;
        assert_eq!(event, StreamEvent::failed(&TaskError::TaskVanished));

        let (_tx, mut rx) = oneshot::channel::<Outcome>();
        let event = ctl.finalize(&task("v"), &mut rx).await;
        assert_eq!(event, StreamEvent::failed(&TaskError::TaskVanished));
    }

    struct PanickingToolkit;

    impl ChemToolkit for PanickingToolkit {
        fn parse(&self, _smiles: &str) -> Result<Molecule, ChemError> {
            Ok(Molecule::new())
        }

        fn describe(&self, _smiles: &str) -> Result<Descriptors, ChemError> {
            panic!("descriptor backend crashed")
        }
    }

    #[tokio::test]
    async fn test_enrichment_panic_becomes_error_event() {
        let registry = Arc::new(TaskRegistry::new());
        let ctl = StreamController::new(
            Arc::clone(&registry),
            Arc::new(ScriptBackend::new("echo CCO")),
            Arc::new(PanickingToolkit),
            settings(),
        );
        let events = run_to_end(ctl, "boom").await;
        match events.last() {
            Some(StreamEvent::Failed { message }) => assert!(message.contains("aborted")),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert!(!registry.is_active("boom"));
    }

    #[test]
    fn test_event_data_lines() {
        assert_eq!(StreamEvent::Started.data(), "Process started...");
        assert_eq!(StreamEvent::Heartbeat.data(), ":heartbeat");
    }
}
