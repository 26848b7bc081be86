use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("Galaxy API key file not found: {0}")]
    MissingApiKeyFile(PathBuf),

    #[error("accession file not found: {0}")]
    MissingAccessionFile(PathBuf),

    #[error("{0} is empty")]
    EmptyCredential(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Galaxy request failed: {0}")]
    GalaxyHttp(String),

    #[error("Galaxy returned status {status}: {message}")]
    GalaxyStatus { status: u16, message: String },

    #[error("unexpected Galaxy response: {0}")]
    UnexpectedResponse(String),

    #[error("history '{0}' not found")]
    HistoryNotFound(String),

    #[error("no .fastq.gz files in {0}")]
    NoInputFiles(String),

    #[error("these uploaded files were not found in history: {0:?}")]
    DatasetsMissing(Vec<String>),

    #[error("no {0} outputs found")]
    NoMatchingDatasets(String),

    #[error("no {0} jobs were submitted")]
    NoJobsSubmitted(String),

    #[error("{} {tool} job(s) failed: {ids:?}", ids.len())]
    JobsFailed { tool: String, ids: Vec<String> },

    #[error("could not find creating job for dataset '{0}'")]
    MissingCreatingJob(String),

    #[error("job {job} has no '{name}' parameter")]
    MissingParameter { job: String, name: String },

    #[error("invalid database selection: {0} (use only V, B, P or A)")]
    InvalidDatabaseSelection(String),

    #[error("no Kraken databases selected")]
    NoDatabasesSelected,

    #[error("not a gzipped FASTQ file: {0}")]
    InvalidFastq(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
