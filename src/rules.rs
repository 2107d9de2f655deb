use std::path::Path;

use anyhow::Context as _;
use regex::RegexSet;
use sha2::Digest as _;

use crate::formats::RulesFile;

/// Matches the common `第…章` chapter headings of Chinese web novels.
pub const DEFAULT_ALLOW_PATTERN: &str = "第.*章.*";

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("invalid title pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Allow/block rules deciding which lines open a new chapter.
///
/// A line is a title iff at least one allow pattern matches at its start and it
/// contains none of the block substrings. Blank entries in either list are ignored.
#[derive(Debug, Clone)]
pub struct TitleRules {
    allow_sources: Vec<String>,
    allow: RegexSet,
    block: Vec<String>,
}

impl TitleRules {
    pub fn new<A, B>(allow: A, block: B) -> Result<Self, RulesError>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        let allow_sources = allow
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect::<Vec<_>>();

        // Validate one by one so the error names the offending pattern.
        for pattern in &allow_sources {
            regex::Regex::new(&anchored(pattern)).map_err(|source| RulesError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        let allow = RegexSet::new(allow_sources.iter().map(|p| anchored(p))).map_err(|source| {
            RulesError::InvalidPattern {
                pattern: allow_sources.join("\n"),
                source,
            }
        })?;

        let block = block
            .into_iter()
            .map(Into::into)
            .filter(|b: &String| !b.is_empty())
            .collect();

        Ok(Self {
            allow_sources,
            allow,
            block,
        })
    }

    /// Rules using only [`DEFAULT_ALLOW_PATTERN`].
    pub fn default_rules() -> Result<Self, RulesError> {
        Self::new([DEFAULT_ALLOW_PATTERN], Vec::<String>::new())
    }

    pub fn allow_patterns(&self) -> &[String] {
        &self.allow_sources
    }

    pub fn block_substrings(&self) -> &[String] {
        &self.block
    }

    pub fn is_title(&self, line: &str) -> bool {
        if self.is_blocked(line) {
            return false;
        }
        self.allow.is_match(line)
    }

    /// First allow pattern (in list order) matching the line, ignoring the block list.
    pub fn matching_pattern(&self, line: &str) -> Option<&str> {
        self.allow
            .matches(line)
            .iter()
            .next()
            .map(|idx| self.allow_sources[idx].as_str())
    }

    pub fn is_blocked(&self, line: &str) -> bool {
        self.block.iter().any(|b| line.contains(b.as_str()))
    }

    /// Literal entries present in both lists, in allow-list order.
    pub fn shared_entries(&self) -> Vec<&str> {
        let mut shared = Vec::new();
        for pattern in &self.allow_sources {
            if self.block.contains(pattern) && !shared.contains(&pattern.as_str()) {
                shared.push(pattern.as_str());
            }
        }
        shared
    }

    /// Feeds a length-prefixed encoding of both lists into `hasher`.
    pub fn digest_into(&self, hasher: &mut sha2::Sha256) {
        for (tag, list) in [(b'a', &self.allow_sources), (b'b', &self.block)] {
            hasher.update([tag]);
            hasher.update((list.len() as u64).to_le_bytes());
            for entry in list {
                hasher.update((entry.len() as u64).to_le_bytes());
                hasher.update(entry.as_bytes());
            }
        }
    }
}

fn anchored(pattern: &str) -> String {
    format!(r"\A(?:{pattern})")
}

/// Builds rules from a YAML rules file (if any) plus command-line entries.
///
/// Command-line allow patterns come after the file's. When neither source provides
/// an allow pattern, [`DEFAULT_ALLOW_PATTERN`] is used.
pub fn load(
    rules_path: Option<&Path>,
    allow: &[String],
    block: &[String],
) -> anyhow::Result<TitleRules> {
    let mut file = match rules_path {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("read rules: {}", path.display()))?;
            serde_yaml::from_str::<RulesFile>(&yaml)
                .with_context(|| format!("parse rules: {}", path.display()))?
        }
        None => RulesFile::default(),
    };

    file.allow.extend(allow.iter().cloned());
    file.block.extend(block.iter().cloned());
    if file.allow.iter().all(|p| p.is_empty()) {
        file.allow = vec![DEFAULT_ALLOW_PATTERN.to_owned()];
    }

    let rules = TitleRules::new(file.allow, file.block).context("compile title rules")?;
    tracing::debug!(
        allow = ?rules.allow_patterns(),
        block = ?rules.block_substrings(),
        "loaded title rules"
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use sha2::Digest as _;

    use super::*;

    fn rules(allow: &[&str], block: &[&str]) -> TitleRules {
        TitleRules::new(allow.iter().copied(), block.iter().copied()).expect("valid rules")
    }

    #[test]
    fn allow_patterns_match_at_line_start_only() {
        let rules = rules(&["第.*章"], &[]);
        assert!(rules.is_title("第一章 開始"));
        assert!(rules.is_title("第022章 結局"));
        assert!(!rules.is_title("  第一章 indented"));
        assert!(!rules.is_title("序 第一章"));
    }

    #[test]
    fn pattern_alternation_is_anchored_as_a_whole() {
        let rules = rules(&["Chapter|第"], &[]);
        assert!(rules.is_title("Chapter 1"));
        assert!(rules.is_title("第1章"));
        assert!(!rules.is_title("The Chapter"));
    }

    #[test]
    fn digit_pattern_rejects_chinese_numerals() {
        let rules = rules(&[r"第\d*章"], &[]);
        assert!(rules.is_title("第2345章 你想不到吧"));
        assert!(!rules.is_title("第三十三章 你想不到吧"));
    }

    #[test]
    fn no_allow_patterns_never_match() {
        let rules = rules(&[], &[]);
        assert!(!rules.is_title("第一章"));
        assert!(!rules.is_title(""));
    }

    #[test]
    fn block_substring_wins_over_allow_match() {
        let rules = rules(&["第.*章"], &["end"]);
        assert!(rules.is_title("第一章 start"));
        assert!(!rules.is_title("第二章 end"));
        assert!(!rules.is_title("第二章 the end of it"));
    }

    #[test]
    fn block_matching_is_case_sensitive() {
        let rules = rules(&["第.*章"], &["end"]);
        assert!(rules.is_title("第二章 END"));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let rules = rules(&["", "第.*章"], &[""]);
        assert_eq!(rules.allow_patterns(), ["第.*章"]);
        assert!(rules.block_substrings().is_empty());
        assert!(rules.is_title("第一章"));
    }

    #[test]
    fn matching_pattern_reports_first_in_list_order() {
        let rules = rules(&["第", "第.*章"], &[]);
        assert_eq!(rules.matching_pattern("第一章"), Some("第"));
        assert_eq!(rules.matching_pattern("序"), None);
    }

    #[test]
    fn shared_entries_are_reported_but_both_lists_apply() {
        let rules = rules(&["序章", "第.*章"], &["序章", "end"]);
        assert_eq!(rules.shared_entries(), vec!["序章"]);
        assert!(!rules.is_title("序章"));
        assert!(rules.is_title("第一章"));
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let err = TitleRules::new(["第(.*章"], Vec::<String>::new()).unwrap_err();
        match err {
            RulesError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "第(.*章"),
        }
    }

    #[test]
    fn digest_distinguishes_allow_from_block() {
        let a = rules(&["x"], &[]);
        let b = rules(&[], &["x"]);

        let mut ha = sha2::Sha256::new();
        a.digest_into(&mut ha);
        let mut hb = sha2::Sha256::new();
        b.digest_into(&mut hb);

        assert_ne!(ha.finalize(), hb.finalize());
    }

    #[test]
    fn load_merges_file_and_cli_entries() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("rules.yaml");
        std::fs::write(&path, "allow:\n  - '^Chapter'\nblock:\n  - draft\n")?;

        let rules = load(Some(&path), &["第.*章".to_owned()], &["end".to_owned()])?;
        assert_eq!(rules.allow_patterns(), ["^Chapter", "第.*章"]);
        assert_eq!(rules.block_substrings(), ["draft", "end"]);
        Ok(())
    }

    #[test]
    fn load_falls_back_to_default_pattern() -> anyhow::Result<()> {
        let rules = load(None, &[], &["end".to_owned()])?;
        assert_eq!(rules.allow_patterns(), [DEFAULT_ALLOW_PATTERN]);
        assert_eq!(rules.block_substrings(), ["end"]);
        Ok(())
    }
}
