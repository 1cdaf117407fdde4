//! Tunables shared by grouping, statistics and the branch manager.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};

pub const DEFAULT_GROUPING_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Maximum number of changes in one change group.
    pub grouping_threshold: usize,
    /// Root key of the markdown body.
    pub content_field: String,
    /// Root key of the comment threads map.
    pub comments_field: String,
    /// Multi-line regex whose first capture is a heading's text.
    pub heading_pattern: String,
    /// Prefix of auto-suggested branch names.
    pub branch_name_prefix: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            grouping_threshold: DEFAULT_GROUPING_THRESHOLD,
            content_field: "content".to_string(),
            comments_field: "commentThreads".to_string(),
            heading_pattern: r"(?m)^##\s(.*)".to_string(),
            branch_name_prefix: "Untitled branch".to_string(),
        }
    }
}

impl HistoryConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HistoryError::Config(format!("config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grouping_threshold == 0 {
            return Err(HistoryError::Config(
                "groupingThreshold must be at least 1".to_string(),
            ));
        }
        self.heading_regex()?;
        Ok(())
    }

    pub fn heading_regex(&self) -> Result<Regex> {
        Regex::new(&self.heading_pattern)
            .map_err(|e| HistoryError::Config(format!("headingPattern: {e}")))
    }
}
