//! MLflow tracking server client (REST API 2.0).

use super::{ExperimentTracker, RunStatus, TrackedRun};
use crate::error::MlError;
use async_trait::async_trait;
use mlpipe_core::{SecretResolveError, TrackerConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::OnceCell;
use url::Url;

const API_PREFIX: &str = "api/2.0/mlflow/";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts/";
const PROXY_SCHEME: &str = "mlflow-artifacts:";

/// HTTP basic-auth credentials for the tracking server.
#[derive(Clone, PartialEq, Eq)]
pub struct MlflowCredentials {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for MlflowCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl MlflowCredentials {
    /// Resolve the configured secret references. No username means no auth.
    ///
    /// A username whose password reference names an unset variable is an
    /// error rather than a silent unauthenticated client.
    pub fn resolve(config: &TrackerConfig) -> Result<Option<Self>, SecretResolveError> {
        let Some(username) = config.username.resolve_optional() else {
            return Ok(None);
        };
        let password = match config.password.resolve() {
            Ok(password) => Some(password),
            Err(SecretResolveError::Empty) => None,
            Err(e) => return Err(e),
        };
        Ok(Some(Self { username, password }))
    }
}

// Wire types. Only the fields this client reads are declared.

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunEnvelope,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Metric<'a> {
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

#[derive(Debug, Serialize)]
struct Param<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct LogBatchRequest<'a> {
    run_id: &'a str,
    metrics: Vec<Metric<'a>>,
    params: Vec<Param<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

pub struct MlflowTracker {
    base: Url,
    experiment_name: String,
    credentials: Option<MlflowCredentials>,
    client: reqwest::Client,
    experiment_id: OnceCell<String>,
}

impl MlflowTracker {
    pub fn new(
        base: Url,
        experiment_name: &str,
        credentials: Option<MlflowCredentials>,
    ) -> Result<Self, MlError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mlpipe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base: with_trailing_slash(base),
            experiment_name: experiment_name.to_string(),
            credentials,
            client,
            experiment_id: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MlError> {
        self.base
            .join(path)
            .map_err(|e| MlError::tracking(format!("bad tracker url for {path}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, c.password.as_deref()),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, MlError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let api: ApiError = serde_json::from_str(&body).unwrap_or_default();
        let detail = if api.message.is_empty() { body } else { api.message };
        Err(MlError::tracking(format!("{what} failed with {status}: {detail}")))
    }

    async fn post<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<Resp, MlError> {
        let url = self.endpoint(&format!("{API_PREFIX}{method}"))?;
        let response = self.send(self.client.post(url).json(body), method).await?;
        Ok(response.json().await?)
    }

    /// Experiment id for `experiment_name`, resolved once per tracker.
    async fn experiment_id(&self) -> Result<&str, MlError> {
        let id = self
            .experiment_id
            .get_or_try_init(|| self.find_or_create_experiment())
            .await?;
        Ok(id.as_str())
    }

    async fn find_or_create_experiment(&self) -> Result<String, MlError> {
        if let Some(id) = self.find_experiment().await? {
            return Ok(id);
        }
        let created: CreateExperimentResponse = self
            .post(
                "experiments/create",
                &serde_json::json!({ "name": self.experiment_name }),
            )
            .await?;
        tracing::info!(
            experiment = %self.experiment_name,
            experiment_id = %created.experiment_id,
            "Created MLflow experiment"
        );
        Ok(created.experiment_id)
    }

    async fn find_experiment(&self) -> Result<Option<String>, MlError> {
        let url = self.endpoint(&format!("{API_PREFIX}experiments/get-by-name"))?;
        let request = self
            .client
            .get(url)
            .query(&[("experiment_name", self.experiment_name.as_str())]);
        let response = self.authorize(request).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let api: ApiError = response.json().await.unwrap_or_default();
            tracing::debug!(code = %api.error_code, "Experiment not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::tracking(format!(
                "experiments/get-by-name failed with {status}: {body}"
            )));
        }
        let found: GetExperimentResponse = response.json().await?;
        Ok(Some(found.experiment.experiment_id))
    }

    /// Proxy path for `file_name` under the run's artifact root.
    fn artifact_path(run: &TrackedRun, file_name: &str) -> String {
        let root = run
            .artifact_uri
            .strip_prefix(PROXY_SCHEME)
            .map(|rest| rest.trim_start_matches('/').trim_end_matches('/').to_string())
            .filter(|rest| !rest.is_empty())
            .unwrap_or_else(|| format!("{}/{}/artifacts", run.experiment_id, run.run_id));
        format!("{ARTIFACTS_PREFIX}{root}/{file_name}")
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl ExperimentTracker for MlflowTracker {
    fn name(&self) -> &str {
        "mlflow"
    }

    async fn start_run(&self, run_name: Option<&str>) -> Result<TrackedRun, MlError> {
        let experiment_id = self.experiment_id().await?.to_string();
        let created: CreateRunResponse = self
            .post(
                "runs/create",
                &CreateRunRequest {
                    experiment_id: &experiment_id,
                    start_time: now_millis(),
                    run_name,
                },
            )
            .await?;
        tracing::info!(run_id = %created.run.info.run_id, "MLflow run started");
        Ok(TrackedRun {
            run_id: created.run.info.run_id,
            experiment_id,
            artifact_uri: created.run.info.artifact_uri,
        })
    }

    async fn log_params(
        &self,
        run: &TrackedRun,
        params: &BTreeMap<String, String>,
    ) -> Result<(), MlError> {
        let request = LogBatchRequest {
            run_id: &run.run_id,
            metrics: Vec::new(),
            params: params
                .iter()
                .map(|(key, value)| Param { key, value })
                .collect(),
        };
        let _: serde_json::Value = self.post("runs/log-batch", &request).await?;
        Ok(())
    }

    async fn log_metrics(
        &self,
        run: &TrackedRun,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<(), MlError> {
        let timestamp = now_millis();
        let request = LogBatchRequest {
            run_id: &run.run_id,
            metrics: metrics
                .iter()
                .map(|(key, value)| Metric {
                    key,
                    value: *value,
                    timestamp,
                    step: 0,
                })
                .collect(),
            params: Vec::new(),
        };
        let _: serde_json::Value = self.post("runs/log-batch", &request).await?;
        Ok(())
    }

    async fn log_artifact(&self, run: &TrackedRun, path: &Path) -> Result<(), MlError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MlError::tracking(format!("{} has no file name", path.display())))?;
        let url = self.endpoint(&Self::artifact_path(run, file_name))?;
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        self.send(self.client.put(url).body(bytes), "artifact upload")
            .await?;
        tracing::info!(artifact = %file_name, bytes = size, "Artifact uploaded");
        Ok(())
    }

    async fn end_run(&self, run: &TrackedRun, status: RunStatus) -> Result<(), MlError> {
        let _: serde_json::Value = self
            .post(
                "runs/update",
                &UpdateRunRequest {
                    run_id: &run.run_id,
                    status,
                    end_time: now_millis(),
                },
            )
            .await?;
        tracing::info!(run_id = %run.run_id, status = %status, "MLflow run ended");
        Ok(())
    }
}
