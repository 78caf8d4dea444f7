use crate::config::Config;
use likeness_core::{
    AnalyzerError, FaceAnalyzer, GenerationError, GenerationOutput, GenerationRequest, Generator,
    OrtFaceAnalyzer, StyleBook, StyleError, Synthesizer,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Requests queued ahead of the one being processed.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("style table error: {0}")]
    Styles(#[from] StyleError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent to the engine thread.
enum EngineRequest {
    Generate {
        request: Box<GenerationRequest>,
        reply: oneshot::Sender<Result<GenerationOutput, GenerationError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Queue a generation request and wait for its result.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Generate {
                request: Box::new(request),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Build the generator from configuration: load both face models and the
/// style table. Fails fast if any resource is unavailable.
pub fn load_generator<S: Synthesizer>(
    config: &Config,
    synthesizer: S,
) -> Result<Generator<OrtFaceAnalyzer, S>, EngineError> {
    let styles: StyleBook = config.load_styles()?;
    let analyzer = OrtFaceAnalyzer::load(
        &config.model_dir,
        &config.detector_model,
        &config.recognizer_model,
        config.intra_threads,
    )?;
    tracing::info!(model_dir = %config.model_dir.display(), "face analyzer loaded");

    Ok(Generator::new(analyzer, synthesizer, styles)
        .with_resize(config.resize_spec())
        .with_face_selection(config.face_selection))
}

/// Move the generator onto a dedicated OS thread.
///
/// Requests are handled one at a time, in arrival order.
pub fn spawn_engine<A, S>(mut generator: Generator<A, S>) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
    S: Synthesizer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("likeness-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Generate { request, reply } => {
                        let result = generator.generate(&request);
                        if let Err(err) = &result {
                            if err.is_user_facing() {
                                tracing::info!(%err, "request rejected");
                            } else {
                                tracing::warn!(%err, "generation failed");
                            }
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
