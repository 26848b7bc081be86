use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tempfile::Builder;

use crate::domain::{DatasetId, DatasetState, HistoryId, JobId};
use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: HistoryId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: DatasetId,
    pub name: String,
    pub history_content_type: String,
    #[serde(default)]
    pub state: Option<DatasetState>,
    #[serde(default)]
    pub deleted: bool,
}

impl HistoryItem {
    pub fn is_dataset(&self) -> bool {
        self.history_content_type == "dataset" && !self.deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    #[serde(default)]
    pub name: String,
    pub state: DatasetState,
    #[serde(default)]
    pub creating_job: Option<JobId>,
    #[serde(default)]
    pub file_ext: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Tool output name (e.g. `output`, `classified_out`) → created dataset.
    #[serde(default)]
    pub outputs: BTreeMap<String, JobOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    pub id: DatasetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDataset {
    pub id: DatasetId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutputs {
    #[serde(default)]
    pub outputs: Vec<OutputDataset>,
}

impl ToolOutputs {
    pub fn ids(&self) -> Vec<DatasetId> {
        self.outputs.iter().map(|output| output.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRequest {
    pub tool_id: String,
    pub inputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadInfo {
    pub is_zip: bool,
}

/// The subset of the Galaxy API the pipeline stages rely on.
pub trait GalaxyClient: Send + Sync {
    fn find_histories(&self, name: &str) -> Result<Vec<HistorySummary>, PipelineError>;
    fn create_history(&self, name: &str) -> Result<HistorySummary, PipelineError>;
    fn list_history_contents(&self, history: &HistoryId)
    -> Result<Vec<HistoryItem>, PipelineError>;
    fn show_dataset(
        &self,
        history: &HistoryId,
        dataset: &DatasetId,
    ) -> Result<DatasetInfo, PipelineError>;
    fn show_job(&self, job: &JobId) -> Result<JobInfo, PipelineError>;
    fn run_tool(
        &self,
        history: &HistoryId,
        request: &ToolRequest,
    ) -> Result<ToolOutputs, PipelineError>;
    fn upload_file(&self, history: &HistoryId, path: &Path) -> Result<ToolOutputs, PipelineError>;
    fn upload_from_ftp(
        &self,
        history: &HistoryId,
        ftp_path: &str,
    ) -> Result<ToolOutputs, PipelineError>;
    fn download_dataset(
        &self,
        dataset: &DatasetId,
        destination: &Path,
    ) -> Result<DownloadInfo, PipelineError>;

    fn dataset_state(
        &self,
        history: &HistoryId,
        dataset: &DatasetId,
    ) -> Result<DatasetState, PipelineError> {
        Ok(self.show_dataset(history, dataset)?.state)
    }
}

#[derive(Clone)]
pub struct GalaxyHttpClient {
    client: Client,
    base_url: String,
}

impl GalaxyHttpClient {
    pub fn new(galaxy_url: &str, api_key: &str) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("galaxy-pipeline/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::GalaxyHttp(err.to_string()))?,
        );
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|err| PipelineError::GalaxyHttp(format!("invalid API key: {err}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| PipelineError::GalaxyHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: api_base_url(galaxy_url),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(request: RequestBuilder) -> Result<Response, PipelineError> {
        let response = request
            .send()
            .map_err(|err| PipelineError::GalaxyHttp(err.to_string()))?;
        Self::handle_status(response)
    }

    fn handle_status(response: Response) -> Result<Response, PipelineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Galaxy request failed".to_string());
        Err(PipelineError::GalaxyStatus { status, message })
    }

    fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, PipelineError> {
        Self::send(request)?
            .json()
            .map_err(|err| PipelineError::UnexpectedResponse(err.to_string()))
    }

    fn show_dataset_by_id(&self, dataset: &DatasetId) -> Result<DatasetInfo, PipelineError> {
        let url = self.url(&format!("datasets/{}", dataset.as_str()));
        Self::json(self.client.get(&url))
    }
}

impl GalaxyClient for GalaxyHttpClient {
    fn find_histories(&self, name: &str) -> Result<Vec<HistorySummary>, PipelineError> {
        let url = self.url("histories");
        let histories: Vec<HistorySummary> = Self::json(
            self.client
                .get(&url)
                .query(&[("q", "name"), ("qv", name)]),
        )?;
        Ok(histories
            .into_iter()
            .filter(|history| history.name == name)
            .collect())
    }

    fn create_history(&self, name: &str) -> Result<HistorySummary, PipelineError> {
        let url = self.url("histories");
        Self::json(self.client.post(&url).json(&json!({ "name": name })))
    }

    fn list_history_contents(
        &self,
        history: &HistoryId,
    ) -> Result<Vec<HistoryItem>, PipelineError> {
        let url = self.url(&format!("histories/{}/contents", history.as_str()));
        Self::json(self.client.get(&url))
    }

    fn show_dataset(
        &self,
        history: &HistoryId,
        dataset: &DatasetId,
    ) -> Result<DatasetInfo, PipelineError> {
        let url = self.url(&format!(
            "histories/{}/contents/{}",
            history.as_str(),
            dataset.as_str()
        ));
        Self::json(self.client.get(&url))
    }

    fn show_job(&self, job: &JobId) -> Result<JobInfo, PipelineError> {
        let url = self.url(&format!("jobs/{}", job.as_str()));
        Self::json(self.client.get(&url))
    }

    fn run_tool(
        &self,
        history: &HistoryId,
        request: &ToolRequest,
    ) -> Result<ToolOutputs, PipelineError> {
        let url = self.url("tools");
        let mut body = serde_json::to_value(request)
            .map_err(|err| PipelineError::UnexpectedResponse(err.to_string()))?;
        if let Some(map) = body.as_object_mut() {
            map.insert("history_id".to_string(), json!(history.as_str()));
        }
        Self::json(self.client.post(&url).json(&body))
    }

    fn upload_file(&self, history: &HistoryId, path: &Path) -> Result<ToolOutputs, PipelineError> {
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .ok_or_else(|| PipelineError::Filesystem(format!("invalid file name {}", path.display())))?;
        let targets = json!([{
            "destination": { "type": "hdas" },
            "elements": [{ "src": "files", "name": name, "ext": "auto", "dbkey": "?" }],
        }]);
        let form = Form::new()
            .text("history_id", history.as_str().to_string())
            .text("targets", targets.to_string())
            .file("files_0|file_data", path)
            .map_err(|err| PipelineError::Filesystem(format!("open {}: {err}", path.display())))?;
        let url = self.url("tools/fetch");
        Self::json(
            self.client
                .post(&url)
                .multipart(form)
                .timeout(Duration::from_secs(3600)),
        )
    }

    fn upload_from_ftp(
        &self,
        history: &HistoryId,
        ftp_path: &str,
    ) -> Result<ToolOutputs, PipelineError> {
        let body = json!({
            "history_id": history.as_str(),
            "targets": [{
                "destination": { "type": "hdas" },
                "elements": [{ "src": "ftp_import", "ftp_path": ftp_path, "ext": "auto", "dbkey": "?" }],
            }],
        });
        let url = self.url("tools/fetch");
        Self::json(self.client.post(&url).json(&body))
    }

    fn download_dataset(
        &self,
        dataset: &DatasetId,
        destination: &Path,
    ) -> Result<DownloadInfo, PipelineError> {
        let info = self.show_dataset_by_id(dataset)?;
        let url = self.url(&format!("datasets/{}/display", dataset.as_str()));
        let mut request = self.client.get(&url).timeout(Duration::from_secs(3600));
        if let Some(ext) = info.file_ext.as_deref() {
            request = request.query(&[("to_ext", ext)]);
        }
        let mut response = Self::send(request)?;
        let is_zip = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("zip"))
            .unwrap_or(false);

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = Builder::new()
            .prefix(".download")
            .tempfile_in(parent)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(DownloadInfo { is_zip })
    }
}

/// Normalises a server URL such as `https://usegalaxy.eu/` to its API root.
pub fn api_base_url(galaxy_url: &str) -> String {
    let trimmed = galaxy_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api")
    }
}
