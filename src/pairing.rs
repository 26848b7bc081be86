//! Grouping of uploaded read files into forward/reverse mates.
//!
//! File names follow `<base>[._-]<1|2>.fastq.gz`; the suffix match is
//! case-insensitive. Files that do not follow the convention and samples with
//! only one mate are reported back to the caller rather than treated as
//! errors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::DatasetId;

static MATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)[._-]([12])\.fastq\.gz$").expect("mate pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MateSide {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFileName {
    pub base: String,
    pub side: MateSide,
}

impl SampleFileName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = MATE_PATTERN.captures(file_name)?;
        let side = if &caps[2] == "1" {
            MateSide::Forward
        } else {
            MateSide::Reverse
        };
        Some(Self {
            base: caps[1].to_string(),
            side,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatePair {
    pub forward: Option<DatasetId>,
    pub reverse: Option<DatasetId>,
}

impl MatePair {
    pub fn is_complete(&self) -> bool {
        self.forward.is_some() && self.reverse.is_some()
    }

    /// Names of the sides that are present, for log messages.
    pub fn present_sides(&self) -> Vec<&'static str> {
        let mut sides = Vec::new();
        if self.forward.is_some() {
            sides.push("forward");
        }
        if self.reverse.is_some() {
            sides.push("reverse");
        }
        sides
    }

    fn set(&mut self, side: MateSide, id: DatasetId) {
        match side {
            MateSide::Forward => self.forward = Some(id),
            MateSide::Reverse => self.reverse = Some(id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleGroups {
    pub samples: BTreeMap<String, MatePair>,
    pub unmatched: Vec<String>,
}

impl SampleGroups {
    /// Samples with both mates, ready for submission.
    pub fn complete(&self) -> impl Iterator<Item = (&str, &DatasetId, &DatasetId)> {
        self.samples.iter().filter_map(|(base, pair)| {
            match (pair.forward.as_ref(), pair.reverse.as_ref()) {
                (Some(fwd), Some(rev)) => Some((base.as_str(), fwd, rev)),
                _ => None,
            }
        })
    }

    pub fn incomplete(&self) -> impl Iterator<Item = (&str, &MatePair)> {
        self.samples
            .iter()
            .filter(|(_, pair)| !pair.is_complete())
            .map(|(base, pair)| (base.as_str(), pair))
    }
}

pub struct PairMatcher;

impl PairMatcher {
    /// Groups `(file name, dataset id)` entries by sample base name. When two
    /// files map to the same base and side the later one wins.
    pub fn group<I, S>(files: I) -> SampleGroups
    where
        I: IntoIterator<Item = (S, DatasetId)>,
        S: AsRef<str>,
    {
        let mut groups = SampleGroups::default();
        for (name, id) in files {
            let name = name.as_ref();
            match SampleFileName::parse(name) {
                Some(parsed) => groups
                    .samples
                    .entry(parsed.base)
                    .or_default()
                    .set(parsed.side, id),
                None => groups.unmatched.push(name.to_string()),
            }
        }
        groups
    }
}
