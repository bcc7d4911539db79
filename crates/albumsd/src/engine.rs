use albums_core::classifier::ClassifierError;
use albums_core::detector::DetectorError;
use albums_core::{
    ClassificationPipeline, ClassificationResult, FaceDetection, FaceDetector, ImageClassification,
    ImageClassifier, Preprocessor,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Classify {
        path: PathBuf,
        reply: oneshot::Sender<ClassificationResult>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Classify the image at `path`. Only fails if the engine thread is gone;
    /// classification problems come back as the `{other, 0.0}` fallback.
    pub async fn classify(&self, path: PathBuf) -> Result<ClassificationResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Classify {
                path,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Load both ONNX models and spawn the engine on a dedicated OS thread.
///
/// Fails fast at startup if either model is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let scrfd_path = config.scrfd_model_path();
    let detector = FaceDetector::load(&scrfd_path)?;
    tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

    let classifier_path = config.classifier_model_path();
    let classifier = ImageClassifier::load(&classifier_path, &config.labels_path())?;
    tracing::info!(path = %classifier_path, "MobileNetV2 classifier loaded");

    let pipeline = ClassificationPipeline::new(
        detector,
        classifier,
        Preprocessor::new(config.preprocess_config()),
        config.pipeline_config(),
    );
    spawn_pipeline(pipeline)
}

/// Run `pipeline` on its own thread. Requests are served one at a time,
/// so the model instances never see concurrent inference calls.
pub fn spawn_pipeline<D, C>(mut pipeline: ClassificationPipeline<D, C>) -> Result<EngineHandle, EngineError>
where
    D: FaceDetection + Send + 'static,
    C: ImageClassification + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("albums-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Classify { path, reply } => {
                        let result = pipeline.classify(&path);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
