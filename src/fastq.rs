use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::PipelineError;

pub const FASTQ_SUFFIX: &str = ".fastq.gz";

/// File names (not paths) of `*.fastq.gz` files directly inside `dir`,
/// sorted.
pub fn list_fastq_files(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(FASTQ_SUFFIX) {
                files.push(name.to_string());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Cheap sanity check before upload: the file must decompress and its first
/// record must start with `@`.
pub fn check_gzip_fastq(path: &Path) -> Result<(), PipelineError> {
    let file = File::open(path)
        .map_err(|err| PipelineError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let mut first = [0u8; 1];
    match decoder.read(&mut first) {
        Ok(1) if first[0] == b'@' => Ok(()),
        Ok(0) => Err(PipelineError::InvalidFastq(format!(
            "{} is empty",
            path.display()
        ))),
        Ok(_) => Err(PipelineError::InvalidFastq(format!(
            "{} does not start with a FASTQ record",
            path.display()
        ))),
        Err(err) => Err(PipelineError::InvalidFastq(format!("{}: {err}", path.display()))),
    }
}
