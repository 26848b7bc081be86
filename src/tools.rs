use std::fmt;

use serde::Serialize;
use serde_json::json;

use crate::domain::{DatasetId, KrakenDatabase};
use crate::galaxy::ToolRequest;

pub const MEGAHIT_TOOL_ID: &str = "toolshed.g2.bx.psu.edu/repos/iuc/megahit/megahit/1.2.9+galaxy2";
pub const QUAST_TOOL_ID: &str = "toolshed.g2.bx.psu.edu/repos/iuc/quast/quast/5.3.0+galaxy0";
pub const KRAKEN_TOOL_ID: &str = "toolshed.g2.bx.psu.edu/repos/devteam/kraken/kraken/1.3.1";
pub const KRAKEN_TRANSLATE_TOOL_ID: &str =
    "toolshed.g2.bx.psu.edu/repos/devteam/kraken_translate/kraken-translate/1.3.1";

/// Which pipeline tool produced a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Megahit,
    Quast,
    Kraken,
    KrakenTranslate,
}

impl ToolKind {
    pub fn label(self) -> &'static str {
        match self {
            ToolKind::Megahit => "MEGAHIT",
            ToolKind::Quast => "QUAST",
            ToolKind::Kraken => "Kraken",
            ToolKind::KrakenTranslate => "Kraken Translate",
        }
    }

    /// Output names, as the tool declares them, that feed the next stage.
    /// `None` means every output of the job is taken.
    pub fn primary_outputs(self) -> Option<&'static [&'static str]> {
        match self {
            // `split_reads` adds `classified_out` / `unclassified_out` FASTA.
            ToolKind::Kraken => Some(&["output"]),
            ToolKind::Megahit | ToolKind::Quast | ToolKind::KrakenTranslate => None,
        }
    }

    /// Substring Galaxy puts in the display name of this tool's outputs.
    pub fn name_hint(self) -> &'static str {
        match self {
            ToolKind::Megahit => "MEGAHIT",
            ToolKind::Quast => "Quast",
            ToolKind::Kraken => "Classification",
            ToolKind::KrakenTranslate => "Translated",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolIds {
    pub megahit: String,
    pub quast: String,
    pub kraken: String,
    pub kraken_translate: String,
}

impl Default for ToolIds {
    fn default() -> Self {
        Self {
            megahit: MEGAHIT_TOOL_ID.to_string(),
            quast: QUAST_TOOL_ID.to_string(),
            kraken: KRAKEN_TOOL_ID.to_string(),
            kraken_translate: KRAKEN_TRANSLATE_TOOL_ID.to_string(),
        }
    }
}

impl ToolIds {
    pub fn id_for(&self, kind: ToolKind) -> &str {
        match kind {
            ToolKind::Megahit => &self.megahit,
            ToolKind::Quast => &self.quast,
            ToolKind::Kraken => &self.kraken,
            ToolKind::KrakenTranslate => &self.kraken_translate,
        }
    }

    /// Maps a job's `tool_id` back to a pipeline tool, ignoring the version.
    pub fn identify(&self, tool_id: &str) -> Option<ToolKind> {
        let short = short_tool_id(tool_id);
        [
            ToolKind::Megahit,
            ToolKind::Quast,
            ToolKind::Kraken,
            ToolKind::KrakenTranslate,
        ]
        .into_iter()
        .find(|kind| short_tool_id(self.id_for(*kind)) == short)
    }
}

/// `toolshed.../repos/<owner>/<repo>/<tool>/<version>` → `<tool>`.
/// Ids without a toolshed path are returned unchanged.
pub fn short_tool_id(tool_id: &str) -> &str {
    let parts: Vec<&str> = tool_id.split('/').collect();
    if parts.len() >= 6 && parts[1] == "repos" {
        parts[parts.len() - 2]
    } else {
        tool_id
    }
}

pub fn megahit_paired(tools: &ToolIds, forward: &DatasetId, reverse: &DatasetId) -> ToolRequest {
    ToolRequest {
        tool_id: tools.megahit.clone(),
        inputs: json!({
            "input_option|choice": "paired",
            "input_option|fastq_input1": [{ "src": "hda", "id": forward.as_str() }],
            "input_option|fastq_input2": [{ "src": "hda", "id": reverse.as_str() }],
        }),
        input_format: Some("legacy".to_string()),
    }
}

pub fn quast_metagenome(tools: &ToolIds, assembly: &DatasetId) -> ToolRequest {
    ToolRequest {
        tool_id: tools.quast.clone(),
        inputs: json!({
            "mode|mode": "individual",
            "mode|in|custom": "false",
            "mode|in|inputs": { "src": "hda", "id": assembly.as_str() },
            "assembly|type": "metagenome",
        }),
        input_format: None,
    }
}

pub fn kraken_classify(
    tools: &ToolIds,
    sequences: &DatasetId,
    database: KrakenDatabase,
) -> ToolRequest {
    ToolRequest {
        tool_id: tools.kraken.clone(),
        inputs: json!({
            "mode|mode": "individual",
            "kraken_database": database.as_str(),
            "split_reads": true,
            "single_paired|input_sequences": { "src": "hda", "id": sequences.as_str() },
        }),
        input_format: None,
    }
}

pub fn kraken_translate(tools: &ToolIds, classification: &DatasetId, database: &str) -> ToolRequest {
    ToolRequest {
        tool_id: tools.kraken_translate.clone(),
        inputs: json!({
            "kraken_database": database,
            "input": { "src": "hda", "id": classification.as_str() },
        }),
        input_format: None,
    }
}
