use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(HistoryId);
string_id!(DatasetId);
string_id!(JobId);

/// Lifecycle state of a Galaxy dataset as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatasetState {
    New,
    Upload,
    Queued,
    Running,
    SettingMetadata,
    Ok,
    Error,
    FailedMetadata,
    Deleted,
    Discarded,
    Paused,
    Deferred,
    Other(String),
}

impl DatasetState {
    pub fn as_str(&self) -> &str {
        match self {
            DatasetState::New => "new",
            DatasetState::Upload => "upload",
            DatasetState::Queued => "queued",
            DatasetState::Running => "running",
            DatasetState::SettingMetadata => "setting_metadata",
            DatasetState::Ok => "ok",
            DatasetState::Error => "error",
            DatasetState::FailedMetadata => "failed_metadata",
            DatasetState::Deleted => "deleted",
            DatasetState::Discarded => "discarded",
            DatasetState::Paused => "paused",
            DatasetState::Deferred => "deferred",
            DatasetState::Other(value) => value,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, DatasetState::Ok)
    }
}

impl From<String> for DatasetState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "new" => DatasetState::New,
            "upload" => DatasetState::Upload,
            "queued" => DatasetState::Queued,
            "running" => DatasetState::Running,
            "setting_metadata" => DatasetState::SettingMetadata,
            "ok" => DatasetState::Ok,
            "error" => DatasetState::Error,
            "failed_metadata" => DatasetState::FailedMetadata,
            "deleted" => DatasetState::Deleted,
            "discarded" => DatasetState::Discarded,
            "paused" => DatasetState::Paused,
            "deferred" => DatasetState::Deferred,
            _ => DatasetState::Other(value),
        }
    }
}

impl From<DatasetState> for String {
    fn from(value: DatasetState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KrakenDatabase {
    Viral,
    Bacteria,
    Plasmid,
    Archaea,
}

impl KrakenDatabase {
    pub const ALL: [KrakenDatabase; 4] = [
        KrakenDatabase::Viral,
        KrakenDatabase::Bacteria,
        KrakenDatabase::Plasmid,
        KrakenDatabase::Archaea,
    ];

    pub fn code(self) -> char {
        match self {
            KrakenDatabase::Viral => 'V',
            KrakenDatabase::Bacteria => 'B',
            KrakenDatabase::Plasmid => 'P',
            KrakenDatabase::Archaea => 'A',
        }
    }

    /// Value of the `kraken_database` tool parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            KrakenDatabase::Viral => "Viral",
            KrakenDatabase::Bacteria => "Bacteria",
            KrakenDatabase::Plasmid => "Plasmid",
            KrakenDatabase::Archaea => "Archaea",
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|db| db.code() == code.to_ascii_uppercase())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|db| db.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for KrakenDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parses a selection such as `"VB"` or `"b p"`. Spaces are ignored, every
/// remaining letter must be a known code and may appear only once.
pub fn parse_database_codes(input: &str) -> Result<Vec<KrakenDatabase>, PipelineError> {
    let choice = input.to_uppercase().replace(' ', "");
    if choice.is_empty() {
        return Err(PipelineError::NoDatabasesSelected);
    }
    let mut selected = Vec::new();
    for ch in choice.chars() {
        let db = KrakenDatabase::from_code(ch)
            .ok_or_else(|| PipelineError::InvalidDatabaseSelection(input.to_string()))?;
        if selected.contains(&db) {
            return Err(PipelineError::InvalidDatabaseSelection(input.to_string()));
        }
        selected.push(db);
    }
    Ok(selected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadTarget {
    /// QUAST assembly reports
    Qc,
    /// Kraken-translate taxonomy tables
    Taxonomy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Upload,
    Assembly,
    AssemblyQc,
    Classification,
    Translation,
    DownloadQc,
    DownloadTaxonomy,
}

impl Stage {
    pub fn log_file_name(self) -> &'static str {
        match self {
            Stage::Upload => "upload_from_ftp.log",
            Stage::Assembly => "megahit_paired.log",
            Stage::AssemblyQc => "quast_metagenomic.log",
            Stage::Classification => "kraken_taxonomy.log",
            Stage::Translation => "kraken_translate.log",
            Stage::DownloadQc => "quast_download.log",
            Stage::DownloadTaxonomy => "kraken_translate_download.log",
        }
    }

    pub fn default_poll_interval(self) -> Duration {
        match self {
            Stage::Upload => Duration::from_secs(10),
            _ => Duration::from_secs(30),
        }
    }
}

impl From<DownloadTarget> for Stage {
    fn from(value: DownloadTarget) -> Self {
        match value {
            DownloadTarget::Qc => Stage::DownloadQc,
            DownloadTarget::Taxonomy => Stage::DownloadTaxonomy,
        }
    }
}

impl FromStr for KrakenDatabase {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let mut chars = trimmed.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if let Some(db) = KrakenDatabase::from_code(ch) {
                return Ok(db);
            }
        }
        KrakenDatabase::from_name(trimmed)
            .ok_or_else(|| PipelineError::InvalidDatabaseSelection(value.to_string()))
    }
}
