//! Program configuration a crash was produced under.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Product, platform and OS of a crashing program, plus how it was invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfiguration {
    pub product: String,
    pub platform: String,
    pub os: String,
    pub version: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

impl ProgramConfiguration {
    pub fn new(product: &str, platform: &str, os: &str, version: Option<&str>) -> Self {
        Self {
            product: product.to_string(),
            platform: platform.to_string(),
            os: os.to_string(),
            version: version.map(|v| v.to_string()),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        self.args = args.to_vec();
        self
    }

    /// Attach `"KEY=VALUE"` environment entries. Entries without `=` are skipped.
    pub fn with_env(mut self, entries: &[String]) -> Self {
        self.env = to_map(entries);
        self
    }

    /// Attach `"KEY=VALUE"` metadata entries. Entries without `=` are skipped.
    pub fn with_metadata(mut self, entries: &[String]) -> Self {
        self.metadata = to_map(entries);
        self
    }
}

fn to_map(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
