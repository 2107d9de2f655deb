use serde::{Deserialize, Serialize};

/// On-disk title rules (`--rules rules.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub block: Vec<String>,
}

/// One line of `split` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub index: usize,
    pub title: String,
    pub line_count: usize,
    pub preview: String,
}
