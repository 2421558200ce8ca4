use facerec_core::FaceAnalyzer;
use facerec_service::{FaceService, Outcome, ServiceError};
use facerec_store::FaceStore;
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Predict {
        frame: RgbImage,
        reply: Reply<RgbImage>,
    },
    Preview {
        frame: RgbImage,
        reply: oneshot::Sender<RgbImage>,
    },
    Register {
        name: String,
        snapshot: Option<RgbImage>,
        reply: Reply<Outcome>,
    },
    Rename {
        old_name: String,
        new_name: String,
        password: String,
        reply: Reply<Outcome>,
    },
    Delete {
        name: String,
        password: String,
        reply: Reply<Outcome>,
    },
    ListNames {
        reply: Reply<Vec<String>>,
    },
    Count {
        reply: Reply<u64>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Annotate a frame with recognised names.
    pub async fn predict(&self, frame: RgbImage) -> Result<RgbImage, EngineError> {
        self.call(|reply| EngineRequest::Predict { frame, reply }).await
    }

    /// Annotate a frame with the face a registration would use.
    pub async fn preview(&self, frame: RgbImage) -> Result<RgbImage, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Preview { frame, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn register(&self, name: String, snapshot: Option<RgbImage>) -> Result<Outcome, EngineError> {
        self.call(|reply| EngineRequest::Register { name, snapshot, reply }).await
    }

    pub async fn rename(
        &self,
        old_name: String,
        new_name: String,
        password: String,
    ) -> Result<Outcome, EngineError> {
        self.call(|reply| EngineRequest::Rename {
            old_name,
            new_name,
            password,
            reply,
        })
        .await
    }

    pub async fn delete(&self, name: String, password: String) -> Result<Outcome, EngineError> {
        self.call(|reply| EngineRequest::Delete { name, password, reply }).await
    }

    pub async fn list_names(&self) -> Result<Vec<String>, EngineError> {
        self.call(|reply| EngineRequest::ListNames { reply }).await
    }

    pub async fn count(&self) -> Result<u64, EngineError> {
        self.call(|reply| EngineRequest::Count { reply }).await
    }
}

/// Move the workflow onto a dedicated OS thread.
///
/// Requests are served one at a time in arrival order, so the single
/// workflow instance needs no locking. The thread exits once every handle
/// has been dropped.
pub fn spawn_engine<A, S>(mut service: FaceService<A, S>) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
    S: FaceStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facerec-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut service, req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn handle_request<A: FaceAnalyzer, S: FaceStore>(service: &mut FaceService<A, S>, req: EngineRequest) {
    // A dropped receiver only means the HTTP client went away.
    match req {
        EngineRequest::Predict { frame, reply } => {
            let _ = reply.send(service.predict_frame(&frame));
        }
        EngineRequest::Preview { frame, reply } => {
            let _ = reply.send(service.preview_frame(&frame));
        }
        EngineRequest::Register { name, snapshot, reply } => {
            let _ = reply.send(service.register(&name, snapshot.as_ref()));
        }
        EngineRequest::Rename {
            old_name,
            new_name,
            password,
            reply,
        } => {
            let _ = reply.send(service.rename(&old_name, &new_name, &password));
        }
        EngineRequest::Delete { name, password, reply } => {
            let _ = reply.send(service.delete(&name, &password));
        }
        EngineRequest::ListNames { reply } => {
            let _ = reply.send(service.list_names());
        }
        EngineRequest::Count { reply } => {
            let _ = reply.send(service.count());
        }
    }
}
