use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use galaxy_pipeline::app::{ProgressEvent, ProgressSink};
use galaxy_pipeline::config::{
    Config, ConfigLoader, Credentials, load_database_selection, save_database_selection,
};
use galaxy_pipeline::domain::{KrakenDatabase, Stage};
use galaxy_pipeline::error::PipelineError;
use galaxy_pipeline::log::RunLog;

fn config_in(root: &Utf8PathBuf) -> Config {
    Config {
        api_key_file: Some(root.join("galaxy/key.txt").to_string()),
        accession_file: Some(root.join("download/accession.txt").to_string()),
        databases_file: Some(root.join("galaxy/databases.txt").to_string()),
        log_dir: Some(root.join("logs").to_string()),
        ..Config::default()
    }
}

fn utf8_root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

#[test]
fn loads_trimmed_credentials() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let resolved = ConfigLoader::resolve_config(config_in(&root));
    fs::create_dir_all(root.join("galaxy")).unwrap();
    fs::create_dir_all(root.join("download")).unwrap();
    fs::write(root.join("galaxy/key.txt"), "  abc123\n").unwrap();
    fs::write(root.join("download/accession.txt"), "SRR0001\n").unwrap();

    let credentials = Credentials::load_with_key(&resolved.paths, None).unwrap();
    assert_eq!(credentials.api_key, "abc123");
    assert_eq!(credentials.history_name, "SRR0001");

    let overridden =
        Credentials::load_with_key(&resolved.paths, Some("from-env".to_string())).unwrap();
    assert_eq!(overridden.api_key, "from-env");
}

#[test]
fn missing_or_empty_credentials_fail() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let resolved = ConfigLoader::resolve_config(config_in(&root));

    assert_matches!(
        Credentials::load_with_key(&resolved.paths, None),
        Err(PipelineError::MissingApiKeyFile(_))
    );

    fs::create_dir_all(root.join("galaxy")).unwrap();
    fs::write(root.join("galaxy/key.txt"), "abc123").unwrap();
    assert_matches!(
        Credentials::load_with_key(&resolved.paths, None),
        Err(PipelineError::MissingAccessionFile(_))
    );

    fs::create_dir_all(root.join("download")).unwrap();
    fs::write(root.join("download/accession.txt"), " \n").unwrap();
    assert_matches!(
        Credentials::load_with_key(&resolved.paths, None),
        Err(PipelineError::EmptyCredential(_))
    );
}

#[test]
fn explicit_config_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let result = ConfigLoader::resolve(missing.to_str());
    assert_matches!(result, Err(PipelineError::ConfigRead(_)));
}

#[test]
fn reads_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("galaxy-pipeline.json");
    fs::write(
        &path,
        r#"{"galaxy_url": "https://usegalaxy.org/", "upload_poll_interval_secs": 2}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.galaxy_url, "https://usegalaxy.org/");
    assert_eq!(resolved.poll_interval(Stage::Upload).as_secs(), 2);
    assert_eq!(resolved.poll_interval(Stage::Classification).as_secs(), 30);
}

#[test]
fn database_selection_is_remembered() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("galaxy").join("databases.txt");
    assert_eq!(load_database_selection(&path).unwrap(), None);

    save_database_selection(&path, &[KrakenDatabase::Viral, KrakenDatabase::Archaea]).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "Viral Archaea\n");
    assert_eq!(
        load_database_selection(&path).unwrap(),
        Some(vec![KrakenDatabase::Viral, KrakenDatabase::Archaea])
    );
}

#[test]
fn run_log_appends_timestamped_lines_per_stage() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let resolved = ConfigLoader::resolve_config(config_in(&root));
    let path = resolved.log_path(Stage::Translation);

    {
        let log = RunLog::open(path.as_std_path(), false).unwrap();
        log.event(ProgressEvent::info("Found Kraken outputs: []"));
        log.event(ProgressEvent::error("ERROR: no Kraken outputs found"));
    }

    let content = fs::read_to_string(root.join("logs/kraken_translate.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('['));
    assert!(lines[1].ends_with("] ERROR: no Kraken outputs found"));
}
