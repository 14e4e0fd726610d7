//! Configuration types for a monitored tree.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::event::ChangeMask;
use crate::filter::PathFilter;

/// Configuration for one monitored directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Root of the tree.
    pub root: PathBuf,

    /// Mask every directory is registered with.
    #[serde(default)]
    pub mask: ChangeMask,

    /// Ignore/notice rules applied in order before seeding.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl MonitorConfig {
    /// Create a new config with the default mask and no rules.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mask: ChangeMask::default(),
            rules: Vec::new(),
        }
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the watch mask.
    pub fn with_mask(mut self, mask: ChangeMask) -> Self {
        self.mask = mask;
        self
    }

    /// Add an ignore rule.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(RuleConfig {
            pattern: pattern.into(),
            action: RuleAction::Ignore,
        });
        self
    }

    /// Add a notice rule.
    pub fn notice(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(RuleConfig {
            pattern: pattern.into(),
            action: RuleAction::Notice,
        });
        self
    }

    /// Check the mask can keep the tree in sync.
    pub fn validate(&self) -> Result<()> {
        if !self.mask.contains(ChangeMask::STRUCTURAL) {
            return Err(MonitorError::Config(format!(
                "mask must include {:?} to follow directory changes, got {:?}",
                ChangeMask::STRUCTURAL,
                self.mask
            )));
        }
        Ok(())
    }

    /// Compile the configured rules in order.
    pub fn build_filter(&self) -> Result<PathFilter> {
        let mut filter = PathFilter::new();
        for rule in &self.rules {
            match rule.action {
                RuleAction::Ignore => filter.ignore(&rule.pattern)?,
                RuleAction::Notice => filter.notice(&rule.pattern)?,
            }
        }
        Ok(filter)
    }
}

/// A configured ignore/notice rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Case-insensitive regular expression.
    pub pattern: String,

    /// What a match does.
    pub action: RuleAction,
}

/// Effect of a matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Suppress events.
    Ignore,

    /// Deliver events.
    Notice,
}
