use crate::engine::{EngineError, EngineHandle};
use facecheck_core::{ImageSource, Settings};
use serde::Serialize;
use zbus::interface;

pub const BUS_NAME: &str = "org.facecheck.FaceCheck1";
pub const OBJECT_PATH: &str = "/org/facecheck/FaceCheck1";

/// D-Bus interface for the facecheck daemon.
///
/// Bus name: org.facecheck.FaceCheck1
/// Object path: /org/facecheck/FaceCheck1
pub struct FaceCheckService {
    pub engine: EngineHandle,
    pub status: DaemonStatus,
}

/// Static facts reported by `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub version: &'static str,
    pub store: String,
    pub model_path: String,
    pub threshold: f64,
    pub resolution: u32,
}

impl DaemonStatus {
    pub fn from_settings(settings: &Settings) -> Self {
        let store = match settings.store {
            facecheck_core::StoreBackend::Sqlite => settings.db_path.display().to_string(),
            facecheck_core::StoreBackend::File => settings.encodings_dir.display().to_string(),
        };
        Self {
            version: env!("CARGO_PKG_VERSION"),
            store,
            model_path: settings.model_path.display().to_string(),
            threshold: settings.verifier.threshold,
            resolution: settings.verifier.resolution,
        }
    }
}

#[interface(name = "org.facecheck.FaceCheck1")]
impl FaceCheckService {
    /// Enroll the face in an encoded image (PNG, JPEG, ...) for `user`.
    async fn enroll(&self, user: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(user, bytes = image.len(), "enroll requested");
        let result = self
            .engine
            .enroll(user.to_string(), ImageSource::Bytes(image))
            .await
            .map_err(to_fdo)?;
        to_json(&result)
    }

    /// Enroll from a `data:image/...;base64,` URL.
    async fn enroll_data_url(&self, user: &str, url: String) -> zbus::fdo::Result<String> {
        tracing::info!(user, "enroll (data url) requested");
        let result = self
            .engine
            .enroll(user.to_string(), ImageSource::DataUrl(url))
            .await
            .map_err(to_fdo)?;
        to_json(&result)
    }

    /// Verify the face in an encoded image against `user`'s enrollment.
    async fn verify(&self, user: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(user, bytes = image.len(), "verify requested");
        let decision = self
            .engine
            .verify(user.to_string(), ImageSource::Bytes(image))
            .await
            .map_err(to_fdo)?;
        to_json(&decision)
    }

    async fn verify_data_url(&self, user: &str, url: String) -> zbus::fdo::Result<String> {
        tracing::info!(user, "verify (data url) requested");
        let decision = self
            .engine
            .verify(user.to_string(), ImageSource::DataUrl(url))
            .await
            .map_err(to_fdo)?;
        to_json(&decision)
    }

    async fn is_enrolled(&self, user: &str) -> zbus::fdo::Result<bool> {
        self.engine
            .is_enrolled(user.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Remove `user`'s enrollment. Returns false if there was none.
    async fn remove_enrollment(&self, user: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(user, "remove_enrollment requested");
        self.engine
            .remove_enrollment(user.to_string())
            .await
            .map_err(to_fdo)
    }

    async fn list_enrollments(&self) -> zbus::fdo::Result<String> {
        let infos = self.engine.enrollments().await.map_err(to_fdo)?;
        to_json(&infos)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.status)
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    tracing::error!(error = %err, "request failed");
    zbus::fdo::Error::Failed(err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecheck_core::StoreBackend;
    use std::path::PathBuf;

    #[test]
    fn test_status_reports_active_store_path() {
        let settings = Settings {
            store: StoreBackend::File,
            encodings_dir: PathBuf::from("/srv/faces"),
            ..Settings::default()
        };
        let status = DaemonStatus::from_settings(&settings);
        assert_eq!(status.store, "/srv/faces");
        assert_eq!(status.threshold, 0.7);

        let json: serde_json::Value = serde_json::from_str(&to_json(&status).unwrap()).unwrap();
        assert_eq!(json["resolution"], 128);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_engine_errors_map_to_failed() {
        let err = to_fdo(EngineError::ChannelClosed);
        assert!(matches!(err, zbus::fdo::Error::Failed(msg) if msg == "engine thread exited"));
    }
}
