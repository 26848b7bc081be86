//! Which tool produced a history dataset, and which parameters it ran with.
//!
//! Provenance comes from the creating job's `tool_id`. The dataset display
//! name is only consulted when the job cannot be looked up, and every such
//! guess is logged as a warning.

use serde::Serialize;
use serde_json::Value;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{DatasetId, DatasetState, HistoryId, JobId};
use crate::error::PipelineError;
use crate::galaxy::{GalaxyClient, HistoryItem, JobInfo};
use crate::tools::{ToolIds, ToolKind};

pub const KRAKEN_DATABASE_PARAM: &str = "kraken_database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvenanceSource {
    JobMetadata,
    DisplayName,
}

/// A history dataset attributed to one of the pipeline tools.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub id: DatasetId,
    pub name: String,
    pub state: DatasetState,
    pub creating_job: Option<JobId>,
    pub job: Option<JobInfo>,
    pub source: ProvenanceSource,
}

/// Returns the datasets in `contents` produced by `kind`, in history order.
pub fn select_outputs<C: GalaxyClient + ?Sized>(
    client: &C,
    history: &HistoryId,
    contents: &[HistoryItem],
    kind: ToolKind,
    tools: &ToolIds,
    sink: &dyn ProgressSink,
) -> Vec<StageInput> {
    let mut selected = Vec::new();
    for item in contents.iter().filter(|item| item.is_dataset()) {
        let name_matches = item.name.contains(kind.name_hint());

        let dataset = match client.show_dataset(history, &item.id) {
            Ok(dataset) => dataset,
            Err(err) => {
                if name_matches {
                    sink.event(ProgressEvent::warn(format!(
                        "WARNING: could not inspect '{}' ({err}); assuming {kind} output from its name",
                        item.name
                    )));
                    selected.push(StageInput {
                        id: item.id.clone(),
                        name: item.name.clone(),
                        state: item
                            .state
                            .clone()
                            .unwrap_or_else(|| DatasetState::Other("unknown".to_string())),
                        creating_job: None,
                        job: None,
                        source: ProvenanceSource::DisplayName,
                    });
                }
                continue;
            }
        };

        let job = match dataset.creating_job.as_ref() {
            Some(job_id) => match client.show_job(job_id) {
                Ok(job) => Some(job),
                Err(err) => {
                    tracing::debug!("show_job {job_id} failed: {err}");
                    None
                }
            },
            None => None,
        };

        let source = match job.as_ref() {
            Some(job) => match tools.identify(&job.tool_id) {
                Some(found) if found == kind => {
                    if !is_primary_output(job, &dataset.id, kind, name_matches) {
                        tracing::debug!("'{}' is a secondary {kind} output; skipping", item.name);
                        continue;
                    }
                    ProvenanceSource::JobMetadata
                }
                _ => {
                    if name_matches {
                        sink.event(ProgressEvent::warn(format!(
                            "WARNING: '{}' looks like a {kind} output but was created by '{}'; skipping",
                            item.name, job.tool_id
                        )));
                    }
                    continue;
                }
            },
            None if name_matches => {
                sink.event(ProgressEvent::warn(format!(
                    "WARNING: no creating job for '{}'; assuming {kind} output from its name",
                    item.name
                )));
                ProvenanceSource::DisplayName
            }
            None => continue,
        };

        selected.push(StageInput {
            id: dataset.id,
            name: item.name.clone(),
            state: dataset.state,
            creating_job: dataset.creating_job,
            job,
            source,
        });
    }
    selected
}

/// Whether `dataset` is an output of `job` that the next stage consumes.
/// Jobs that do not report their outputs fall back to the display name.
fn is_primary_output(
    job: &JobInfo,
    dataset: &DatasetId,
    kind: ToolKind,
    name_matches: bool,
) -> bool {
    let Some(names) = kind.primary_outputs() else {
        return true;
    };
    if job.outputs.is_empty() {
        return name_matches;
    }
    names
        .iter()
        .any(|name| job.outputs.get(*name).is_some_and(|output| &output.id == dataset))
}

/// Strips surrounding whitespace and quote characters from a job parameter.
pub fn clean_param_value(raw: &str) -> &str {
    raw.trim_matches(|ch: char| ch.is_whitespace() || ch == '"' || ch == '\'')
}

/// Reads `name` from a job's parameter record. Galaxy stores `params` values
/// JSON-encoded; `inputs.<name>.value` is checked as a fallback.
pub fn job_parameter(job: &JobInfo, name: &str) -> Result<String, PipelineError> {
    let from_params = job.params.get(name).and_then(value_text);
    let from_inputs = || {
        job.inputs
            .get(name)
            .and_then(|input| input.get("value"))
            .and_then(value_text)
    };

    from_params
        .or_else(from_inputs)
        .ok_or_else(|| PipelineError::MissingParameter {
            job: job.id.to_string(),
            name: name.to_string(),
        })
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => clean_param_value(text).to_string(),
        Value::Null => return None,
        Value::Number(_) | Value::Bool(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Recovers the Kraken database a classification dataset was produced with,
/// so the dependent translate job can run against the same database.
pub fn kraken_database_for<C: GalaxyClient + ?Sized>(
    client: &C,
    input: &StageInput,
) -> Result<String, PipelineError> {
    if let Some(job) = input.job.as_ref() {
        return job_parameter(job, KRAKEN_DATABASE_PARAM);
    }
    let job_id = input
        .creating_job
        .as_ref()
        .ok_or_else(|| PipelineError::MissingCreatingJob(input.name.clone()))?;
    let job = client.show_job(job_id)?;
    job_parameter(&job, KRAKEN_DATABASE_PARAM)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn job(value: Value) -> JobInfo {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn strips_whitespace_and_quotes() {
        let job = job(json!({
            "id": "j1",
            "tool_id": "kraken",
            "params": { "kraken_database": " \"Bacteria\" " },
        }));
        assert_eq!(job_parameter(&job, KRAKEN_DATABASE_PARAM).unwrap(), "Bacteria");
    }

    #[test]
    fn falls_back_to_inputs_value() {
        let job = job(json!({
            "id": "j2",
            "tool_id": "kraken",
            "inputs": { "kraken_database": { "value": "Viral" } },
        }));
        assert_eq!(job_parameter(&job, KRAKEN_DATABASE_PARAM).unwrap(), "Viral");
    }

    #[test]
    fn missing_or_blank_parameter_fails() {
        let job = job(json!({
            "id": "j3",
            "tool_id": "kraken",
            "params": { "kraken_database": "\"\"" },
        }));
        assert_matches!(
            job_parameter(&job, KRAKEN_DATABASE_PARAM),
            Err(PipelineError::MissingParameter { .. })
        );
    }

    #[test]
    fn kraken_keeps_only_classification_output() {
        let job = job(json!({
            "id": "j4",
            "tool_id": "kraken",
            "outputs": {
                "output": { "id": "k1", "src": "hda" },
                "classified_out": { "id": "k2", "src": "hda" },
                "unclassified_out": { "id": "k3", "src": "hda" },
            },
        }));
        assert!(is_primary_output(&job, &"k1".into(), ToolKind::Kraken, false));
        assert!(!is_primary_output(&job, &"k2".into(), ToolKind::Kraken, true));
        assert!(!is_primary_output(&job, &"k3".into(), ToolKind::Kraken, true));
    }

    #[test]
    fn jobs_without_output_map_fall_back_to_name() {
        let job = job(json!({ "id": "j5", "tool_id": "kraken" }));
        assert!(is_primary_output(&job, &"k1".into(), ToolKind::Kraken, true));
        assert!(!is_primary_output(&job, &"k2".into(), ToolKind::Kraken, false));
        assert!(is_primary_output(&job, &"m1".into(), ToolKind::Megahit, false));
    }

    #[test]
    fn clean_param_value_keeps_inner_text() {
        assert_eq!(clean_param_value("'Plasmid'\n"), "Plasmid");
        assert_eq!(clean_param_value("a \"b\" c"), "a \"b\" c");
    }
}
