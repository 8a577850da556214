use std::{sync::mpsc, thread::JoinHandle};

use thiserror::Error;
use tokio::sync::oneshot::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{
    apis::ApiTrait,
    models::{config::ModelConfig, ModelError, ModelId, ModelTrait},
};

const MODEL_THREAD_NAME: &str = "text2sql-model";

/// A single generation request sent to the model thread, together with the
/// channel its result is sent back on.
pub struct ModelThreadCommand<I, O> {
    input: I,
    sender: oneshot::Sender<Result<O, ModelError>>,
}

#[derive(Debug, Error)]
pub enum ModelThreadError {
    #[error("Failed to load model: `{0}`")]
    LoadError(ModelError),
    #[error("Model error: `{0}`")]
    ModelError(ModelError),
    #[error("Failed to spawn model thread: `{0}`")]
    SpawnError(std::io::Error),
    #[error("Model thread shutdown")]
    Shutdown,
    #[error("Model thread dropped the response channel: `{0}`")]
    ResponseDropped(#[from] RecvError),
}

pub struct ModelThreadHandle {
    join_handle: JoinHandle<()>,
}

impl ModelThreadHandle {
    /// Blocks until the model thread exits. The thread exits once every
    /// [`ModelThreadDispatcher`] clone has been dropped.
    pub fn stop(self) {
        if self.join_handle.join().is_err() {
            error!("Model thread panicked");
        }
    }

    /// Joins the model thread from an async context, off the runtime workers.
    async fn stop_async(self) {
        if let Err(e) = tokio::task::spawn_blocking(move || self.stop()).await {
            error!(
                target = "text2sql-inference",
                event = "model_thread_join_error",
                error = %e,
                "Failed to join the model thread"
            );
        }
    }
}

/// Owns the model and serves generation commands, one at a time.
pub struct ModelThread<M: ModelTrait> {
    model: M,
    receiver: mpsc::Receiver<ModelThreadCommand<M::Input, M::Output>>,
}

impl<M> ModelThread<M>
where
    M: ModelTrait,
{
    pub fn run(mut self) {
        debug!("Start Model thread");

        while let Ok(command) = self.receiver.recv() {
            let ModelThreadCommand { input, sender } = command;

            let output = self.model.run(input);
            if let Err(e) = &output {
                error!(
                    target = "text2sql-inference",
                    event = "model_run_error",
                    model_id = self.model.model_id(),
                    error = %e,
                    "Failed to run model"
                );
            }
            if sender.send(output).is_err() {
                warn!("Requester dropped before receiving the model output");
            }
        }

        info!("Model thread stopped, all dispatchers dropped");
    }
}

/// Cloneable entry point to the model thread.
pub struct ModelThreadDispatcher<I, O> {
    sender: mpsc::Sender<ModelThreadCommand<I, O>>,
    model_id: ModelId,
}

impl<I, O> Clone for ModelThreadDispatcher<I, O> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            model_id: self.model_id.clone(),
        }
    }
}

impl<I, O> ModelThreadDispatcher<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawns the model thread, which fetches and loads the model through `api`.
    ///
    /// Resolves once the model is ready to serve requests, or with the error
    /// that prevented it from loading.
    pub async fn start<M, A>(
        api: A,
        config: ModelConfig,
    ) -> Result<(Self, ModelThreadHandle), ModelThreadError>
    where
        M: ModelTrait<Input = I, Output = O> + 'static,
        A: ApiTrait + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<ModelThreadCommand<I, O>>();
        let (ready_sender, ready_receiver) = oneshot::channel();

        let join_handle = std::thread::Builder::new()
            .name(MODEL_THREAD_NAME.to_string())
            .spawn(move || {
                let model = match M::fetch(&api, &config).and_then(M::load) {
                    Ok(model) => model,
                    Err(e) => {
                        error!(
                            target = "text2sql-inference",
                            event = "model_load_error",
                            model_id = config.model_id,
                            error = %e,
                            "Failed to load model"
                        );
                        ready_sender.send(Err(e)).ok();
                        return;
                    }
                };
                ready_sender.send(Ok(model.model_id())).ok();
                ModelThread { model, receiver }.run();
            })
            .map_err(ModelThreadError::SpawnError)?;
        let handle = ModelThreadHandle { join_handle };

        match ready_receiver.await {
            Ok(Ok(model_id)) => {
                info!(
                    target = "text2sql-inference",
                    event = "model_ready",
                    model_id,
                    "Model loaded, ready to serve requests"
                );
                Ok((Self { sender, model_id }, handle))
            }
            Ok(Err(e)) => {
                handle.stop_async().await;
                Err(ModelThreadError::LoadError(e))
            }
            Err(e) => {
                handle.stop_async().await;
                Err(ModelThreadError::ResponseDropped(e))
            }
        }
    }

    /// Runs the model on `input` and waits for its output.
    pub async fn run_inference(&self, input: I) -> Result<O, ModelThreadError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(ModelThreadCommand { input, sender })
            .map_err(|_| ModelThreadError::Shutdown)?;
        receiver.await?.map_err(ModelThreadError::ModelError)
    }

    /// Identifier of the loaded model.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}
