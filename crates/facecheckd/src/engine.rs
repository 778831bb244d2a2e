use facecheck_core::{
    EnrollmentInfo, EnrollmentResult, ImageSource, VerificationDecision, Verifier, VerifierError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verifier(#[from] VerifierError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        user_id: String,
        source: ImageSource,
        reply: oneshot::Sender<Result<EnrollmentResult, VerifierError>>,
    },
    Verify {
        user_id: String,
        source: ImageSource,
        reply: oneshot::Sender<Result<VerificationDecision, VerifierError>>,
    },
    IsEnrolled {
        user_id: String,
        reply: oneshot::Sender<Result<bool, VerifierError>>,
    },
    Remove {
        user_id: String,
        reply: oneshot::Sender<Result<bool, VerifierError>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<EnrollmentInfo>, VerifierError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn enroll(
        &self,
        user_id: String,
        source: ImageSource,
    ) -> Result<EnrollmentResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll { user_id, source, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn verify(
        &self,
        user_id: String,
        source: ImageSource,
    ) -> Result<VerificationDecision, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Verify { user_id, source, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn is_enrolled(&self, user_id: String) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::IsEnrolled { user_id, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn remove_enrollment(&self, user_id: String) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Remove { user_id, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn enrollments(&self) -> Result<Vec<EnrollmentInfo>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::List { reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The verifier (and the detector model it owns) lives on that thread for the
/// life of the daemon; requests are processed one at a time in arrival order.
pub fn spawn_engine(verifier: Verifier) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facecheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&verifier, req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn handle_request(verifier: &Verifier, req: EngineRequest) {
    // A dropped receiver means the D-Bus caller went away; nothing to report.
    match req {
        EngineRequest::Enroll { user_id, source, reply } => {
            let _ = reply.send(verifier.enroll(&user_id, &source));
        }
        EngineRequest::Verify { user_id, source, reply } => {
            let _ = reply.send(verifier.verify(&user_id, &source));
        }
        EngineRequest::IsEnrolled { user_id, reply } => {
            let _ = reply.send(verifier.is_enrolled(&user_id));
        }
        EngineRequest::Remove { user_id, reply } => {
            let _ = reply.send(verifier.remove_enrollment(&user_id));
        }
        EngineRequest::List { reply } => {
            let _ = reply.send(verifier.enrollments());
        }
    }
}
