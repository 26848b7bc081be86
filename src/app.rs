use std::fs;
use std::path::PathBuf;

use camino::Utf8Path;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{DatasetId, DownloadTarget, HistoryId, KrakenDatabase, Stage};
use crate::error::PipelineError;
use crate::fastq;
use crate::fs_util;
use crate::galaxy::{GalaxyClient, HistorySummary, ToolOutputs, ToolRequest};
use crate::pairing::PairMatcher;
use crate::provenance::{self, StageInput};
use crate::tools::{self, ToolKind};
use crate::waiter::{JobWaiter, WaitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Error,
            message: message.into(),
        }
    }
}

/// Destination for run progress. Every stage receives one explicitly.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadSource {
    /// Send the file contents from the local input directory.
    Local,
    /// Import a file of the same name from the user's Galaxy FTP area.
    Ftp,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub source: UploadSource,
    pub verify: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub target: DownloadTarget,
    pub extract_archives: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub label: String,
    pub outputs: Vec<DatasetId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skipped {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Downloaded {
    pub dataset_id: DatasetId,
    pub name: String,
    pub path: String,
    pub extracted_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub history: HistorySummary,
    pub submissions: Vec<Submission>,
    pub skipped: Vec<Skipped>,
    pub statuses: WaitOutcome,
    pub downloads: Vec<Downloaded>,
    #[serde(skip)]
    tool: Option<ToolKind>,
}

impl StageResult {
    fn new(stage: Stage, history: HistorySummary, tool: Option<ToolKind>) -> Self {
        Self {
            stage,
            history,
            submissions: Vec::new(),
            skipped: Vec::new(),
            statuses: WaitOutcome::default(),
            downloads: Vec::new(),
            tool,
        }
    }

    pub fn submitted_ids(&self) -> Vec<DatasetId> {
        self.submissions
            .iter()
            .flat_map(|submission| submission.outputs.iter().cloned())
            .collect()
    }

    /// Turns a run whose outputs did not all reach `ok` into an error.
    pub fn ensure_success(self) -> Result<Self, PipelineError> {
        let failed: Vec<String> = self
            .statuses
            .failed()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        if failed.is_empty() {
            return Ok(self);
        }
        let tool = self
            .tool
            .map(|tool| tool.label().to_string())
            .unwrap_or_else(|| "upload".to_string());
        Err(PipelineError::JobsFailed { tool, ids: failed })
    }

    fn skip(&mut self, sink: &dyn ProgressSink, item: &str, reason: String) {
        sink.event(ProgressEvent::warn(format!("Skipping '{item}': {reason}")));
        self.skipped.push(Skipped {
            item: item.to_string(),
            reason,
        });
    }
}

pub struct App<C: GalaxyClient> {
    client: C,
    config: ResolvedConfig,
}

impl<C: GalaxyClient> App<C> {
    pub fn new(client: C, config: ResolvedConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn find_or_create_history(
        &self,
        name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<HistorySummary, PipelineError> {
        let existing = self.client.find_histories(name)?;
        if let Some(history) = existing.into_iter().next() {
            sink.event(ProgressEvent::info(format!(
                "Using existing history: {} (ID: {})",
                history.name, history.id
            )));
            return Ok(history);
        }
        let history = self.client.create_history(name)?;
        sink.event(ProgressEvent::info(format!(
            "Created new history: {} (ID: {})",
            history.name, history.id
        )));
        Ok(history)
    }

    pub fn find_history(
        &self,
        name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<HistorySummary, PipelineError> {
        let history = self
            .client
            .find_histories(name)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::HistoryNotFound(name.to_string()))?;
        sink.event(ProgressEvent::info(format!(
            "Using history '{}' (ID: {})",
            history.name, history.id
        )));
        Ok(history)
    }

    pub fn upload(
        &self,
        history_name: &str,
        options: UploadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        let history = self.find_or_create_history(history_name, sink)?;
        let mut result = StageResult::new(Stage::Upload, history.clone(), None);

        let input_dir = &self.config.paths.input_dir;
        let files = fastq::list_fastq_files(input_dir.as_std_path())?;
        if files.is_empty() {
            sink.event(ProgressEvent::warn(format!(
                "WARNING: No .fastq.gz files found in {input_dir}"
            )));
            return Ok(result);
        }

        for file_name in &files {
            let path = input_dir.join(file_name);
            if options.verify && options.source == UploadSource::Local {
                if let Err(err) = fastq::check_gzip_fastq(path.as_std_path()) {
                    result.skip(sink, file_name, err.to_string());
                    continue;
                }
            }

            let response = match options.source {
                UploadSource::Local => self.client.upload_file(&history.id, path.as_std_path()),
                UploadSource::Ftp => self.client.upload_from_ftp(&history.id, file_name),
            };
            match response {
                Ok(outputs) if !outputs.outputs.is_empty() => {
                    for output in &outputs.outputs {
                        sink.event(ProgressEvent::info(format!(
                            "Started upload for {file_name}, dataset ID: {}",
                            output.id
                        )));
                    }
                    result.submissions.push(Submission {
                        label: file_name.clone(),
                        outputs: outputs.ids(),
                    });
                }
                Ok(_) => {
                    sink.event(ProgressEvent::warn(format!(
                        "WARNING: Upload of {file_name} returned no datasets"
                    )));
                }
                Err(err) => {
                    sink.event(ProgressEvent::error(format!(
                        "ERROR uploading {file_name}: {err}"
                    )));
                }
            }
        }

        if result.submissions.is_empty() {
            return Err(PipelineError::NoJobsSubmitted("upload".to_string()));
        }

        sink.event(ProgressEvent::info("Waiting for uploads to complete..."));
        self.wait_for(&mut result, sink);
        if result.statuses.all_ok() {
            sink.event(ProgressEvent::info("All uploads completed successfully."));
        }
        Ok(result)
    }

    pub fn assemble(
        &self,
        history_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        let history = self.find_history(history_name, sink)?;
        let mut result = StageResult::new(Stage::Assembly, history.clone(), Some(ToolKind::Megahit));

        let input_dir = &self.config.paths.input_dir;
        let files = fastq::list_fastq_files(input_dir.as_std_path())?;
        if files.is_empty() {
            return Err(PipelineError::NoInputFiles(input_dir.to_string()));
        }
        sink.event(ProgressEvent::info(format!(
            "Looking for uploaded files: {files:?}"
        )));

        let contents = self.client.list_history_contents(&history.id)?;
        // History order, so a later duplicate upload replaces an earlier one.
        let uploaded: Vec<(String, DatasetId)> = contents
            .iter()
            .filter(|item| item.is_dataset() && files.contains(&item.name))
            .map(|item| (item.name.clone(), item.id.clone()))
            .collect();
        let missing: Vec<String> = files
            .iter()
            .filter(|name| !uploaded.iter().any(|(uploaded, _)| uploaded == *name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::DatasetsMissing(missing));
        }

        let groups = PairMatcher::group(uploaded);
        for name in &groups.unmatched {
            sink.event(ProgressEvent::warn(format!(
                "WARNING: filename {name} does not match *_1.fastq.gz or *_2.fastq.gz pattern; skipping"
            )));
        }
        for (sample, pair) in groups.incomplete() {
            result.skip(
                sink,
                sample,
                format!("incomplete pair ({:?})", pair.present_sides()),
            );
        }

        for (sample, forward, reverse) in groups.complete() {
            if !self.is_ok(&history.id, forward) || !self.is_ok(&history.id, reverse) {
                result.skip(
                    sink,
                    sample,
                    "one of the datasets is not in state 'ok'".to_string(),
                );
                continue;
            }
            sink.event(ProgressEvent::info(format!(
                "Launching MEGAHIT (paired) for '{sample}'..."
            )));
            let request = tools::megahit_paired(&self.config.tools, forward, reverse);
            self.submit(&history.id, sample, &request, &mut result, sink);
        }

        self.finish_submissions(&mut result, sink)?;
        Ok(result)
    }

    pub fn assess_assemblies(
        &self,
        history_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        let history = self.find_history(history_name, sink)?;
        let mut result = StageResult::new(Stage::AssemblyQc, history.clone(), Some(ToolKind::Quast));
        let assemblies = self.stage_inputs(&history.id, ToolKind::Megahit, sink)?;

        for input in &assemblies {
            sink.event(ProgressEvent::info(format!("Processing file: '{}'", input.name)));
            if !input.state.is_ok() {
                result.skip(sink, &input.name, "Dataset not in 'ok' state.".to_string());
                continue;
            }
            sink.event(ProgressEvent::info(format!(
                "Launching QUAST (metagenome mode) for '{}'...",
                input.name
            )));
            let request = tools::quast_metagenome(&self.config.tools, &input.id);
            self.submit(&history.id, &input.name, &request, &mut result, sink);
        }

        self.finish_submissions(&mut result, sink)?;
        Ok(result)
    }

    pub fn classify(
        &self,
        history_name: &str,
        databases: &[KrakenDatabase],
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        if databases.is_empty() {
            return Err(PipelineError::NoDatabasesSelected);
        }
        let history = self.find_history(history_name, sink)?;
        let mut result =
            StageResult::new(Stage::Classification, history.clone(), Some(ToolKind::Kraken));
        let assemblies = self.stage_inputs(&history.id, ToolKind::Megahit, sink)?;
        let names: Vec<&str> = databases.iter().map(|db| db.as_str()).collect();
        sink.event(ProgressEvent::info(format!("Selected databases: {names:?}")));

        for input in &assemblies {
            if !input.state.is_ok() {
                result.skip(sink, &input.name, "Dataset not in 'ok' state.".to_string());
                continue;
            }
            for db in databases {
                sink.event(ProgressEvent::info(format!(
                    "Launching Kraken for '{}' using database '{db}'...",
                    input.name
                )));
                let request = tools::kraken_classify(&self.config.tools, &input.id, *db);
                let label = format!("{} with '{db}'", input.name);
                self.submit(&history.id, &label, &request, &mut result, sink);
            }
        }

        self.finish_submissions(&mut result, sink)?;
        Ok(result)
    }

    pub fn translate(
        &self,
        history_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        let history = self.find_history(history_name, sink)?;
        let mut result = StageResult::new(
            Stage::Translation,
            history.clone(),
            Some(ToolKind::KrakenTranslate),
        );
        let classifications = self.stage_inputs(&history.id, ToolKind::Kraken, sink)?;

        for input in &classifications {
            sink.event(ProgressEvent::info(format!(
                "Submitting Kraken Translate for '{}'",
                input.name
            )));
            let database = match provenance::kraken_database_for(&self.client, input) {
                Ok(database) => database,
                Err(err) => {
                    result.skip(
                        sink,
                        &input.name,
                        format!("could not determine Kraken database ({err})"),
                    );
                    continue;
                }
            };
            sink.event(ProgressEvent::info(format!(
                "  Detected Kraken database: {database}"
            )));
            let request = tools::kraken_translate(&self.config.tools, &input.id, &database);
            self.submit(&history.id, &input.name, &request, &mut result, sink);
        }

        self.finish_submissions(&mut result, sink)?;
        Ok(result)
    }

    pub fn download(
        &self,
        history_name: &str,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, PipelineError> {
        let history = self.find_history(history_name, sink)?;
        let stage = Stage::from(options.target);
        let (kind, dir) = match options.target {
            DownloadTarget::Qc => (ToolKind::Quast, &self.config.paths.qc_download_dir),
            DownloadTarget::Taxonomy => (
                ToolKind::KrakenTranslate,
                &self.config.paths.taxonomy_download_dir,
            ),
        };
        let mut result = StageResult::new(stage, history.clone(), Some(kind));
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("create {dir}: {err}")))?;
        let outputs = self.stage_inputs(&history.id, kind, sink)?;

        for input in &outputs {
            let destination = download_path(dir, options.target, input);
            sink.event(ProgressEvent::info(format!(
                "Attempting to download dataset '{}' (ID: {}) to '{}'...",
                input.name,
                input.id,
                destination.display()
            )));
            let info = match self.client.download_dataset(&input.id, &destination) {
                Ok(info) => info,
                Err(err) => {
                    sink.event(ProgressEvent::error(format!(
                        "ERROR downloading dataset ID '{}': {err}",
                        input.id
                    )));
                    result.skipped.push(Skipped {
                        item: input.name.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            sink.event(ProgressEvent::info(format!(
                "Successfully downloaded dataset ID '{}'",
                input.id
            )));

            let mut extracted_to = None;
            if info.is_zip && options.extract_archives {
                let target = fs_util::extraction_dir(&destination);
                match fs_util::extract_zip(&destination, &target) {
                    Ok(()) => {
                        sink.event(ProgressEvent::info(format!(
                            "  Extracted archive to '{}'",
                            target.display()
                        )));
                        extracted_to = Some(target.display().to_string());
                    }
                    Err(err) => sink.event(ProgressEvent::warn(format!(
                        "  WARNING: could not extract '{}': {err}",
                        destination.display()
                    ))),
                }
            }
            result.downloads.push(Downloaded {
                dataset_id: input.id.clone(),
                name: input.name.clone(),
                path: destination.display().to_string(),
                extracted_to,
            });
        }

        sink.event(ProgressEvent::info("Download script completed."));
        Ok(result)
    }

    fn stage_inputs(
        &self,
        history: &HistoryId,
        kind: ToolKind,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<StageInput>, PipelineError> {
        let contents = self.client.list_history_contents(history)?;
        let inputs = provenance::select_outputs(
            &self.client,
            history,
            &contents,
            kind,
            &self.config.tools,
            sink,
        );
        if inputs.is_empty() {
            return Err(PipelineError::NoMatchingDatasets(kind.label().to_string()));
        }
        let names: Vec<&str> = inputs.iter().map(|input| input.name.as_str()).collect();
        sink.event(ProgressEvent::info(format!("Found {kind} outputs: {names:?}")));
        Ok(inputs)
    }

    fn is_ok(&self, history: &HistoryId, dataset: &DatasetId) -> bool {
        self.client
            .dataset_state(history, dataset)
            .map(|state| state.is_ok())
            .unwrap_or(false)
    }

    fn submit(
        &self,
        history: &HistoryId,
        label: &str,
        request: &ToolRequest,
        result: &mut StageResult,
        sink: &dyn ProgressSink,
    ) {
        match self.client.run_tool(history, request) {
            Ok(ToolOutputs { outputs }) => {
                let ids: Vec<DatasetId> = outputs.into_iter().map(|output| output.id).collect();
                let shown: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                sink.event(ProgressEvent::info(format!("  '{label}' -> outputs: {shown:?}")));
                result.submissions.push(Submission {
                    label: label.to_string(),
                    outputs: ids,
                });
            }
            Err(err) => {
                sink.event(ProgressEvent::error(format!(
                    "  ERROR submitting '{label}': {err}"
                )));
                result.skipped.push(Skipped {
                    item: label.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn finish_submissions(
        &self,
        result: &mut StageResult,
        sink: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        let tool = result.tool.map(|tool| tool.label()).unwrap_or("upload");
        if result.submitted_ids().is_empty() {
            return Err(PipelineError::NoJobsSubmitted(tool.to_string()));
        }
        sink.event(ProgressEvent::info(format!(
            "Waiting for {} {tool} job(s) to finish...",
            result.submitted_ids().len()
        )));
        self.wait_for(result, sink);
        if result.statuses.all_ok() {
            sink.event(ProgressEvent::info(format!(
                "All {tool} jobs completed successfully!"
            )));
        }
        Ok(())
    }

    fn wait_for(&self, result: &mut StageResult, sink: &dyn ProgressSink) {
        let ids = result.submitted_ids();
        let waiter = JobWaiter::new(self.config.poll_interval(result.stage));
        let history = result.history.id.clone();
        result.statuses = waiter.wait(
            &ids,
            |id| self.client.dataset_state(&history, id),
            sink,
        );
    }
}

fn download_path(dir: &Utf8Path, target: DownloadTarget, input: &StageInput) -> PathBuf {
    match target {
        DownloadTarget::Qc => dir.as_std_path().join(input.id.as_str()),
        DownloadTarget::Taxonomy => dir
            .as_std_path()
            .join(format!("{}.txt", fs_util::safe_file_name(&input.name))),
    }
}
