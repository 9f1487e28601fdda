//! Pipeline configuration

use serde::{Deserialize, Serialize};

use crate::irgen::ENTRY_FUNCTION;

/// Pipeline stages, in the order they run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Unranked graph straight out of the builder
    Built,
    /// Parameter shapes assigned, exit casts inserted
    Shaped,
    /// Shapes propagated to a fixed point
    Inferred,
    /// Exit casts removed, result types published
    Erased,
    /// Rewritten to the generic tensor vocabulary
    Lowered,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Built => "built",
            Stage::Shaped => "shaped",
            Stage::Inferred => "inferred",
            Stage::Erased => "erased",
            Stage::Lowered => "lowered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Function receiving the anonymous top-level code
    pub entry: String,
    /// Keep comments in the syntax tree
    pub keep_comments: bool,
    /// Last stage to run
    pub stop_after: Stage,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }

    pub fn stop_after(mut self, stage: Stage) -> Self {
        self.stop_after = stage;
        self
    }

    /// Whether `stage` is part of this run
    pub fn runs(&self, stage: Stage) -> bool {
        stage <= self.stop_after
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entry: ENTRY_FUNCTION.to_string(),
            keep_comments: false,
            stop_after: Stage::Lowered,
        }
    }
}
