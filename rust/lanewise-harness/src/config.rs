//! Configuration file parsing for `lanewise.toml`.
//!
//! Searches the current directory then its ancestors. A missing file means
//! the defaults: every mode, every tier, all scenarios, text report.

use std::path::{Path, PathBuf};

use lanewise_codegen::{LoweringMode, Tier};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::HarnessError;
use crate::runner::ExecConfig;

pub const FILE_NAME: &str = "lanewise.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct LanewiseConfig {
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    /// Lowering modes to run; empty means all.
    #[serde(default)]
    pub modes: Vec<LoweringMode>,
    /// Tiers to run; empty means all.
    #[serde(default)]
    pub tiers: Vec<Tier>,
    /// Substring a scenario name must contain.
    pub filter: Option<String>,
    #[serde(default)]
    pub report: ReportFormat,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl LanewiseConfig {
    /// Load `lanewise.toml` from the current directory or the nearest
    /// ancestor that has one. Returns `Default` when none exists.
    pub fn load() -> Result<Self, HarnessError> {
        Ok(Self::load_with_path()?.map(|(_, cfg)| cfg).unwrap_or_default())
    }

    /// Like [`load`](Self::load), also returning the file that was read.
    pub fn load_with_path() -> Result<Option<(PathBuf, Self)>, HarnessError> {
        let dir = std::env::current_dir()
            .map_err(|e| HarnessError::Config(format!("cannot read current dir: {e}")))?;
        match find_upwards(&dir) {
            Some(path) => {
                let cfg = Self::load_from(&path)?;
                Ok(Some((path, cfg)))
            }
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read '{}': {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| HarnessError::Config(format!("invalid toml in '{}': {e}", path.display())))
    }

    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// The configuration matrix the `[run]` section selects.
    pub fn matrix(&self) -> Vec<ExecConfig> {
        let modes = if self.run.modes.is_empty() {
            LoweringMode::iter().collect()
        } else {
            self.run.modes.clone()
        };
        let tiers = if self.run.tiers.is_empty() {
            Tier::iter().collect()
        } else {
            self.run.tiers.clone()
        };
        ExecConfig::product(&modes, &tiers)
    }
}

fn find_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
