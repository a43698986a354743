//! Shared test fixtures for scdha-web integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::{Local, TimeZone};
use http_body_util::BodyExt;
use scdha_common::config::TomlConfig;
use scdha_common::time::FixedClock;
use scdha_common::{ArtifactSet, StorageLayout};
use scdha_web::analysis::{AnalysisBackend, AnalysisError, AnalysisJob};
use scdha_web::{build_router, AppState};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Timestamp part of every prefix produced under [`frozen_clock`]
pub const FROZEN_STAMP: &str = "20230517143005";

const BOUNDARY: &str = "scdha-test-boundary-7MA4YWxkTrZu0gW";

pub fn frozen_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Local.with_ymd_and_hms(2023, 5, 17, 14, 30, 5).unwrap(),
    ))
}

/// What the fake backend should do
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Write the three artifacts and succeed
    Succeed,
    /// Return a non-success flag
    Reject(Value),
    /// Fail as if the process crashed
    Fail,
    /// Panic inside the backend
    Panic,
    /// Never finish on its own
    Hang,
}

/// Backend that records its jobs and acts per [`Behavior`]
pub struct FakeBackend {
    behavior: Behavior,
    layout: StorageLayout,
    pub jobs: Mutex<Vec<AnalysisJob>>,
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(&self, job: &AnalysisJob) -> Result<ArtifactSet, AnalysisError> {
        self.jobs.lock().unwrap().push(job.clone());
        match &self.behavior {
            Behavior::Succeed => {
                let artifacts = ArtifactSet::for_prefix(&job.prefix);
                let paths = artifacts.paths(&self.layout);
                std::fs::write(&paths.image, b"\x89PNG fake").unwrap();
                std::fs::write(&paths.latent, b"cell\tl1\tl2\n").unwrap();
                std::fs::write(&paths.result, b"cell\tpt\n").unwrap();
                Ok(artifacts)
            }
            Behavior::Reject(flag) => Err(AnalysisError::Rejected(flag.clone())),
            Behavior::Fail => Err(AnalysisError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "Error in timeInferenceFunc".to_string(),
            }),
            Behavior::Panic => panic!("analysis exploded"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AnalysisError::Crashed("woke up".to_string()))
            }
        }
    }
}

/// Isolated storage root plus a router wired to a [`FakeBackend`]
pub struct TestEnv {
    pub dir: TempDir,
    pub layout: StorageLayout,
    pub backend: Arc<FakeBackend>,
    pub state: AppState,
}

impl TestEnv {
    pub fn new(behavior: Behavior) -> Self {
        Self::with_config(behavior, |_| {})
    }

    pub fn with_config(behavior: Behavior, adjust: impl FnOnce(&mut TomlConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TomlConfig::default();
        config.storage.root = dir.path().to_path_buf();
        adjust(&mut config);

        let layout = StorageLayout::from_config(&config.storage);
        layout.ensure_directories().unwrap();

        let backend = Arc::new(FakeBackend {
            behavior,
            layout: layout.clone(),
            jobs: Mutex::new(Vec::new()),
        });
        let state = AppState::new(&config, backend.clone()).with_clock(frozen_clock());

        Self {
            dir,
            layout,
            backend,
            state,
        }
    }

    pub fn app(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn uploaded_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.layout.uploads_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tsv"))
            .collect();
        names.sort();
        names
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.layout.uploads_dir().join(name)
    }

    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.backend.jobs.lock().unwrap().clone()
    }
}

/// Build a multipart/form-data body from `(field, filename, bytes)` parts
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (field, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/tab-separated-values\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

/// POST a multipart upload, optionally with a session cookie
pub fn upload_request(
    uri: &str,
    parts: &[(&str, &str, &[u8])],
    session: Option<&str>,
) -> Request<Body> {
    let (content_type, body) = multipart_body(parts);
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("scDHA_session_id={}", session));
    }
    builder.body(Body::from(body)).unwrap()
}

/// POST a JSON body
pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Poll `uri` until its JSON body satisfies `check` (or give up after ~2s)
pub async fn eventually_json(app: &Router, uri: &str, check: impl Fn(&Value) -> bool) -> Value {
    let mut last = Value::Null;
    for _ in 0..200 {
        let response = app.clone().oneshot(get_request(uri)).await.unwrap();
        last = json_parts(response).await.1;
        if check(&last) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    last
}

pub async fn json_parts(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body_bytes(response).await;
    (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
}
