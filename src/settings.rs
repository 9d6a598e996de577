use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::store::normalize_domain;

const DEFAULT_CONFIG_FILE: &str = "curation.toml";

/// Engine configuration: store location, domain sets and classifier tuning.
///
/// Layered as defaults, then `curation.toml` (if present), then `TOS_*`
/// environment variables. List values in the environment are comma separated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub database_path: PathBuf,
    /// Domains eligible to be reported valid.
    pub allowlist: Vec<String>,
    /// Non-commercial records reset unconditionally on every pass.
    pub meta_domains: Vec<String>,
    /// Phrases that mark content as template or test copy.
    pub indicators: Vec<String>,
    /// Content shorter than this (in chars) is a placeholder.
    pub placeholder_max_len: usize,
    /// Content must be longer than this (in chars) to count as substantive.
    pub substantive_min_len: usize,
    /// A transparency score equal to this is treated as fabricated.
    pub fabricated_score: i32,
}

impl Default for CurationConfig {
    fn default() -> Self {
        CurationConfig {
            database_path: PathBuf::from("data/tos.sqlite"),
            allowlist: Vec::new(),
            meta_domains: Vec::new(),
            indicators: [
                "placeholder",
                "this is a test",
                "analysis would be performed",
                "lorem ipsum",
                "sample terms",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            placeholder_max_len: 300,
            substantive_min_len: 1000,
            fabricated_score: 100,
        }
    }
}

impl CurationConfig {
    /// Load from an explicit file, or `curation.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("TOS")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowlist")
                    .with_list_parse_key("meta_domains")
                    .with_list_parse_key("indicators"),
            )
            .build()
            .context("Failed to read curation config")?;
        let cfg: CurationConfig = settings
            .try_deserialize()
            .context("Invalid curation config")?;
        Ok(cfg.normalized())
    }

    /// Canonicalize domains and drop empty entries.
    pub fn normalized(mut self) -> Self {
        let clean = |list: Vec<String>| -> Vec<String> {
            let mut out: Vec<String> = list
                .iter()
                .map(|d| normalize_domain(d))
                .filter(|d| !d.is_empty())
                .collect();
            out.sort();
            out.dedup();
            out
        };
        self.allowlist = clean(self.allowlist);
        self.meta_domains = clean(self.meta_domains);
        self.indicators.retain(|p| !p.trim().is_empty());
        self
    }

    pub fn is_allowlisted(&self, domain: &str) -> bool {
        self.allowlist.binary_search(&normalize_domain(domain)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_curation_thresholds() {
        let cfg = CurationConfig::default();
        assert_eq!(cfg.placeholder_max_len, 300);
        assert_eq!(cfg.substantive_min_len, 1000);
        assert_eq!(cfg.fabricated_score, 100);
        assert!(cfg.indicators.iter().any(|p| p == "this is a test"));
    }

    #[test]
    fn normalization_canonicalizes_and_dedups_domains() {
        let cfg = CurationConfig {
            allowlist: vec!["www.GitHub.com".into(), "github.com".into(), " ".into()],
            meta_domains: vec!["https://www.khanacademy.org/".into()],
            ..CurationConfig::default()
        }
        .normalized();
        assert_eq!(cfg.allowlist, vec!["github.com".to_string()]);
        assert_eq!(cfg.meta_domains, vec!["khanacademy.org".to_string()]);
        assert!(cfg.is_allowlisted("WWW.github.com"));
        assert!(!cfg.is_allowlisted("gitlab.com"));
    }

    #[test]
    fn loads_toml_file_over_defaults() {
        let dir = std::env::temp_dir().join(format!("tos_curator_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("curation.toml");
        std::fs::write(
            &path,
            "allowlist = [\"www.Spotify.com\", \"netflix.com\"]\nsubstantive_min_len = 2000\n",
        )
        .unwrap();

        let cfg = CurationConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.allowlist, vec!["netflix.com".to_string(), "spotify.com".to_string()]);
        assert_eq!(cfg.substantive_min_len, 2000);
        assert_eq!(cfg.placeholder_max_len, 300);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
