use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{KrakenDatabase, Stage};
use crate::error::PipelineError;
use crate::tools::ToolIds;

pub const DEFAULT_GALAXY_URL: &str = "https://usegalaxy.eu";
pub const CONFIG_FILE_NAME: &str = "galaxy-pipeline.json";
pub const API_KEY_ENV: &str = "GALAXY_API_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub galaxy_url: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub accession_file: Option<String>,
    #[serde(default)]
    pub databases_file: Option<String>,
    #[serde(default)]
    pub input_dir: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub qc_download_dir: Option<String>,
    #[serde(default)]
    pub taxonomy_download_dir: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub upload_poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub tools: ToolConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub megahit: Option<String>,
    #[serde(default)]
    pub quast: Option<String>,
    #[serde(default)]
    pub kraken: Option<String>,
    #[serde(default)]
    pub kraken_translate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub api_key_file: Utf8PathBuf,
    pub accession_file: Utf8PathBuf,
    pub databases_file: Utf8PathBuf,
    pub input_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
    pub qc_download_dir: Utf8PathBuf,
    pub taxonomy_download_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub galaxy_url: String,
    pub paths: PipelinePaths,
    pub poll_interval: Duration,
    pub upload_poll_interval: Duration,
    pub tools: ToolIds,
}

impl ResolvedConfig {
    pub fn poll_interval(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Upload => self.upload_poll_interval,
            _ => self.poll_interval,
        }
    }

    /// Overrides the interval used by `stage`.
    pub fn set_poll_interval(&mut self, stage: Stage, interval: Duration) {
        match stage {
            Stage::Upload => self.upload_poll_interval = interval,
            _ => self.poll_interval = interval,
        }
    }

    pub fn log_path(&self, stage: Stage) -> Utf8PathBuf {
        self.paths.log_dir.join(stage.log_file_name())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `./galaxy-pipeline.json`
    /// and then the user config directory are tried before falling back to
    /// built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => default_config_candidates()
                .into_iter()
                .find(|candidate| candidate.exists()),
        };

        let config = match config_path {
            Some(config_path) => Self::read(&config_path)?,
            None => Config::default(),
        };
        Ok(Self::resolve_config(config))
    }

    fn read(path: &Path) -> Result<Config, PipelineError> {
        let content =
            fs::read_to_string(path).map_err(|_| PipelineError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| PipelineError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let path = |value: Option<String>, default: &str| {
            Utf8PathBuf::from(value.unwrap_or_else(|| default.to_string()))
        };
        let defaults = ToolIds::default();
        let tools = ToolIds {
            megahit: config.tools.megahit.unwrap_or(defaults.megahit),
            quast: config.tools.quast.unwrap_or(defaults.quast),
            kraken: config.tools.kraken.unwrap_or(defaults.kraken),
            kraken_translate: config
                .tools
                .kraken_translate
                .unwrap_or(defaults.kraken_translate),
        };

        ResolvedConfig {
            galaxy_url: config
                .galaxy_url
                .unwrap_or_else(|| DEFAULT_GALAXY_URL.to_string()),
            paths: PipelinePaths {
                api_key_file: path(config.api_key_file, "galaxy/key.txt"),
                accession_file: path(config.accession_file, "download/accession.txt"),
                databases_file: path(config.databases_file, "galaxy/databases.txt"),
                input_dir: path(config.input_dir, "../outputs/fastq_trimmed"),
                log_dir: path(config.log_dir, "../outputs/galaxy"),
                qc_download_dir: path(config.qc_download_dir, "../outputs/galaxy/quast_downloads"),
                taxonomy_download_dir: path(config.taxonomy_download_dir, "../outputs/taxonomy"),
            },
            poll_interval: config
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| Stage::Assembly.default_poll_interval()),
            upload_poll_interval: config
                .upload_poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| Stage::Upload.default_poll_interval()),
            tools,
        }
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dirs) = BaseDirs::new() {
        candidates.push(dirs.config_dir().join("galaxy-pipeline").join("config.json"));
    }
    candidates
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub history_name: String,
}

impl Credentials {
    /// Reads the API key (the `GALAXY_API_KEY` variable wins over the key
    /// file) and the history name. Both must be present and non-empty.
    pub fn load(paths: &PipelinePaths) -> Result<Self, PipelineError> {
        let env_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self::load_with_key(paths, env_key)
    }

    pub fn load_with_key(
        paths: &PipelinePaths,
        api_key: Option<String>,
    ) -> Result<Self, PipelineError> {
        let api_key = match api_key {
            Some(key) => key,
            None => read_trimmed(paths.api_key_file.as_std_path(), || {
                PipelineError::MissingApiKeyFile(paths.api_key_file.clone().into_std_path_buf())
            })?,
        };
        let history_name = read_trimmed(paths.accession_file.as_std_path(), || {
            PipelineError::MissingAccessionFile(paths.accession_file.clone().into_std_path_buf())
        })?;
        Ok(Self {
            api_key,
            history_name,
        })
    }
}

fn read_trimmed<F>(path: &Path, missing: F) -> Result<String, PipelineError>
where
    F: FnOnce() -> PipelineError,
{
    if !path.exists() {
        return Err(missing());
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", path.display())))?;
    let value = content.trim().to_string();
    if value.is_empty() {
        return Err(PipelineError::EmptyCredential(path.to_path_buf()));
    }
    Ok(value)
}

/// Writes a database selection as space-separated names, e.g. `Viral Bacteria`.
pub fn save_database_selection(
    path: &Path,
    databases: &[KrakenDatabase],
) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    let names: Vec<&str> = databases.iter().map(|db| db.as_str()).collect();
    fs::write(path, format!("{}\n", names.join(" ")))
        .map_err(|err| PipelineError::Filesystem(format!("write {}: {err}", path.display())))
}

/// Reads a selection written by [`save_database_selection`]. Returns `None`
/// when the file does not exist.
pub fn load_database_selection(path: &Path) -> Result<Option<Vec<KrakenDatabase>>, PipelineError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", path.display())))?;
    let databases = content
        .split_whitespace()
        .map(|name| name.parse::<KrakenDatabase>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((!databases.is_empty()).then_some(databases))
}
