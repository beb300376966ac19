//! MLflow REST API 2.0 client.

use super::artifacts::ArtifactLocation;
use super::types::{Experiment, KeyValue, ModelVersion, Run, RunInfo, RunStatus};
use super::{RESOURCE_DOES_NOT_EXIST, TrackingClient, TrackingError};
use async_trait::async_trait;
use modelops_core::config::TrackingConfig;
use modelops_core::proxy::ProxyPolicy;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use std::time::Duration;
use url::Url;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const VERSION_PAGE_SIZE: usize = 200;

/// Client for an MLflow-compatible tracking server.
///
/// One `reqwest::Client` with the configured timeout; no retries.
pub struct MlflowClient {
    base: String,
    http: Client,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<Run>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersion,
}

#[derive(Deserialize)]
struct SearchModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DownloadUriResponse {
    artifact_uri: String,
}

impl MlflowClient {
    pub fn new(config: &TrackingConfig) -> Result<Self, TrackingError> {
        let uri = Url::parse(&config.uri).map_err(|e| TrackingError::Unreachable {
            uri: config.uri.clone(),
            reason: format!("invalid tracking URI: {e}"),
        })?;
        let policy = ProxyPolicy::resolve(&uri, config.disable_proxies, |var| {
            std::env::var(var).ok()
        });

        let mut builder =
            Client::builder().timeout(Duration::from_secs_f64(config.http_timeout_secs));
        builder = match &policy {
            ProxyPolicy::Disabled | ProxyPolicy::FromEnv { proxy_url: None, .. } => {
                builder.no_proxy()
            }
            ProxyPolicy::FromEnv {
                proxy_url: Some(proxy),
                no_proxy,
            } => builder.proxy(
                reqwest::Proxy::all(proxy.as_str())?
                    .no_proxy(reqwest::NoProxy::from_string(no_proxy)),
            ),
        };
        tracing::debug!(uri = %uri, ?policy, "building tracking client");

        Ok(Self {
            base: config.uri.trim_end_matches('/').to_string(),
            http: builder.build()?,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base)
    }

    fn artifact_url(&self, proxied_path: &str) -> String {
        format!(
            "{}/{ARTIFACTS_PREFIX}/{}",
            self.base,
            ArtifactLocation::encoded_proxy_path(proxied_path)
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, TrackingError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(endpoint, status = status.as_u16(), "tracking response");
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| TrackingError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TrackingError> {
        let request = self.http.get(self.endpoint(path)).query(query);
        self.send(path, request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, TrackingError> {
        let request = self.http.post(self.endpoint(path)).json(&body);
        self.send(path, request).await
    }
}

fn api_error(status: u16, body: &str) -> TrackingError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = if parsed.error_code.is_empty() {
        format!("HTTP_{status}")
    } else {
        parsed.error_code
    };
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message
    };
    TrackingError::Api {
        status,
        code,
        message,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl TrackingClient for MlflowClient {
    fn tracking_uri(&self) -> &str {
        &self.base
    }

    async fn probe(&self, experiment_name: &str) -> Result<(), TrackingError> {
        let response = self
            .http
            .get(self.endpoint("experiments/get-by-name"))
            .query(&[("experiment_name", experiment_name)])
            .send()
            .await
            .map_err(|e| TrackingError::Unreachable {
                uri: self.base.clone(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if status.is_server_error() {
            return Err(TrackingError::Unreachable {
                uri: self.base.clone(),
                reason: format!("server answered HTTP {}", status.as_u16()),
            });
        }
        Ok(())
    }

    async fn get_experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Experiment>, TrackingError> {
        match self
            .get::<GetExperimentResponse>("experiments/get-by-name", &[("experiment_name", name)])
            .await
        {
            Ok(resp) => Ok(Some(resp.experiment)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let resp: CreateExperimentResponse = self
            .post("experiments/create", json!({ "name": name }))
            .await?;
        tracing::info!(experiment = name, id = %resp.experiment_id, "created experiment");
        Ok(resp.experiment_id)
    }

    async fn search_runs(
        &self,
        experiment_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Run>, TrackingError> {
        let mut runs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({
                "experiment_ids": experiment_ids,
                "max_results": max_results - runs.len(),
            });
            if let Some(token) = &page_token {
                body["page_token"] = json!(token);
            }
            let page: SearchRunsResponse = self.post("runs/search", body).await?;
            runs.extend(page.runs);
            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() || runs.len() >= max_results {
                break;
            }
        }
        runs.truncate(max_results);
        Ok(runs)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
    ) -> Result<RunInfo, TrackingError> {
        let resp: RunResponse = self
            .post(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": now_millis(),
                    "tags": [KeyValue::new("mlflow.runName", run_name)],
                }),
            )
            .await?;
        Ok(resp.run.info)
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "runs/log-metric",
                json!({
                    "run_id": run_id,
                    "key": key,
                    "value": value,
                    "timestamp": now_millis(),
                    "step": 0,
                }),
            )
            .await?;
        Ok(())
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "runs/log-parameter",
                json!({ "run_id": run_id, "key": key, "value": value }),
            )
            .await?;
        Ok(())
    }

    async fn set_run_tag(
        &self,
        run_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "runs/set-tag",
                json!({ "run_id": run_id, "key": key, "value": value }),
            )
            .await?;
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "runs/update",
                json!({
                    "run_id": run_id,
                    "status": status.as_str(),
                    "end_time": now_millis(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn upload_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
        bytes: Vec<u8>,
    ) -> Result<(), TrackingError> {
        match ArtifactLocation::parse(artifact_uri)?.join(relative_path) {
            ArtifactLocation::Proxied(path) => {
                let request = self.http.put(self.artifact_url(&path)).body(bytes);
                let _: IgnoredAny = self.send("mlflow-artifacts", request).await?;
            }
            ArtifactLocation::Local(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, bytes).await?;
            }
        }
        tracing::debug!(artifact_uri, relative_path, "uploaded artifact");
        Ok(())
    }

    async fn download_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, TrackingError> {
        match ArtifactLocation::parse(artifact_uri)?.join(relative_path) {
            ArtifactLocation::Proxied(path) => {
                let response = self.http.get(self.artifact_url(&path)).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(api_error(status.as_u16(), &body));
                }
                Ok(response.bytes().await?.to_vec())
            }
            ArtifactLocation::Local(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TrackingError::api(
                    404,
                    RESOURCE_DOES_NOT_EXIST,
                    format!("artifact {} not found", path.display()),
                )),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn create_registered_model(&self, name: &str) -> Result<(), TrackingError> {
        match self
            .post::<IgnoredAny>("registered-models/create", json!({ "name": name }))
            .await
        {
            Ok(_) => {
                tracing::info!(model = name, "created registered model");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError> {
        let resp: ModelVersionResponse = self
            .post(
                "model-versions/create",
                json!({ "name": name, "source": source, "run_id": run_id }),
            )
            .await?;
        Ok(resp.model_version)
    }

    async fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>, TrackingError> {
        let filter = format!("name='{}'", name.replace('\'', "\\'"));
        let page_size = VERSION_PAGE_SIZE.to_string();
        let mut versions = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut query = vec![
                ("filter", filter.as_str()),
                ("max_results", page_size.as_str()),
            ];
            if !page_token.is_empty() {
                query.push(("page_token", page_token.as_str()));
            }
            let page: SearchModelVersionsResponse =
                self.get("model-versions/search", &query).await?;
            versions.extend(page.model_versions);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = token,
                None => break,
            }
        }
        Ok(versions)
    }

    async fn set_registered_model_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "registered-models/alias",
                json!({ "name": name, "alias": alias, "version": version }),
            )
            .await?;
        Ok(())
    }

    async fn get_model_version_by_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<ModelVersion, TrackingError> {
        let resp: ModelVersionResponse = self
            .get(
                "registered-models/alias",
                &[("name", name), ("alias", alias)],
            )
            .await?;
        Ok(resp.model_version)
    }

    async fn set_model_version_tag(
        &self,
        name: &str,
        version: &str,
        key: &str,
        value: &str,
    ) -> Result<(), TrackingError> {
        let _: IgnoredAny = self
            .post(
                "model-versions/set-tag",
                json!({ "name": name, "version": version, "key": key, "value": value }),
            )
            .await?;
        Ok(())
    }

    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: &str,
        archive_existing: bool,
    ) -> Result<ModelVersion, TrackingError> {
        let resp: ModelVersionResponse = self
            .post(
                "model-versions/transition-stage",
                json!({
                    "name": name,
                    "version": version,
                    "stage": stage,
                    "archive_existing_versions": archive_existing,
                }),
            )
            .await?;
        Ok(resp.model_version)
    }

    async fn get_model_version_download_uri(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, TrackingError> {
        let resp: DownloadUriResponse = self
            .get(
                "model-versions/get-download-uri",
                &[("name", name), ("version", version)],
            )
            .await?;
        Ok(resp.artifact_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> TrackingConfig {
        TrackingConfig {
            uri: uri.to_string(),
            ..TrackingConfig::default()
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let client = MlflowClient::new(&config("http://127.0.0.1:5000/")).unwrap();
        assert_eq!(client.tracking_uri(), "http://127.0.0.1:5000");
        assert_eq!(
            client.endpoint("runs/search"),
            "http://127.0.0.1:5000/api/2.0/mlflow/runs/search"
        );
        assert_eq!(
            client.artifact_url("1/abc/artifacts/model/model.json"),
            "http://127.0.0.1:5000/api/2.0/mlflow-artifacts/artifacts/1/abc/artifacts/model/model.json"
        );
    }

    #[test]
    fn test_api_error_decoding() {
        let err = api_error(
            404,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"Experiment 'x' does not exist."}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "RESOURCE_DOES_NOT_EXIST (HTTP 404): Experiment 'x' does not exist."
        );
    }

    #[test]
    fn test_api_error_with_plain_body() {
        match api_error(502, "Bad Gateway") {
            TrackingError::Api { code, message, .. } => {
                assert_eq!(code, "HTTP_502");
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unparsable_uri() {
        assert!(matches!(
            MlflowClient::new(&config("not a uri")),
            Err(TrackingError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_unreachable_port() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = MlflowClient::new(&config(&format!("http://127.0.0.1:{port}"))).unwrap();
        assert!(matches!(
            client.probe("anything").await,
            Err(TrackingError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_artifact_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = MlflowClient::new(&config("http://127.0.0.1:5000")).unwrap();
        let root = url::Url::from_directory_path(dir.path()).unwrap().to_string();

        client
            .upload_artifact(&root, "model/model.json", b"{}".to_vec())
            .await
            .unwrap();
        assert!(dir.path().join("model/model.json").exists());
        assert_eq!(
            client.download_artifact(&root, "model/model.json").await.unwrap(),
            b"{}".to_vec()
        );
        let missing = client.download_artifact(&root, "nope.json").await.unwrap_err();
        assert!(missing.is_not_found());
    }
}
