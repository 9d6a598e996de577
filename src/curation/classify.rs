use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::settings::CurationConfig;

/// Content-quality defect detected on a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Defect {
    /// Perfect transparency score, only ever seen on synthetic rows.
    Fabricated,
    /// Content too short to be a real ToS.
    Placeholder,
    /// Content carries template or test copy.
    Generic,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Defect::Fabricated => "fabricated",
            Defect::Placeholder => "placeholder",
            Defect::Generic => "generic",
        })
    }
}

/// The set of defects found for one document. Empty means clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict(Vec<Defect>);

impl Verdict {
    pub fn is_clean(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, defect: Defect) -> bool {
        self.0.contains(&defect)
    }

    /// Highest-precedence defect: fabricated, then placeholder, then generic.
    pub fn primary(&self) -> Option<Defect> {
        self.0.first().copied()
    }

    pub fn defects(&self) -> &[Defect] {
        &self.0
    }

    fn insert(&mut self, defect: Defect) {
        if let Err(pos) = self.0.binary_search(&defect) {
            self.0.insert(pos, defect);
        }
    }

    pub fn merge(&mut self, other: Verdict) {
        for d in other.0 {
            self.insert(d);
        }
    }
}

/// Compiled classifier tuning.
pub struct ContentRules {
    indicators: Option<Regex>,
    placeholder_max_len: usize,
    fabricated_score: i32,
}

impl ContentRules {
    pub fn from_config(cfg: &CurationConfig) -> Result<Self, regex::Error> {
        Self::new(&cfg.indicators, cfg.placeholder_max_len, cfg.fabricated_score)
    }

    pub fn new(
        indicators: &[String],
        placeholder_max_len: usize,
        fabricated_score: i32,
    ) -> Result<Self, regex::Error> {
        let indicators = if indicators.is_empty() {
            None
        } else {
            let alternation = indicators
                .iter()
                .map(|p| regex::escape(p.trim()))
                .collect::<Vec<_>>()
                .join("|");
            Some(RegexBuilder::new(&alternation).case_insensitive(true).build()?)
        };
        Ok(ContentRules {
            indicators,
            placeholder_max_len,
            fabricated_score,
        })
    }

    /// Classify one document's content against one analysis score.
    ///
    /// Null content is already clean and never yields a defect.
    pub fn classify(&self, content: Option<&str>, transparency_score: Option<i32>) -> Verdict {
        let mut verdict = Verdict::default();
        let Some(content) = content else {
            return verdict;
        };
        if transparency_score == Some(self.fabricated_score) {
            verdict.insert(Defect::Fabricated);
        }
        if content.chars().count() < self.placeholder_max_len {
            verdict.insert(Defect::Placeholder);
        }
        if self.indicators.as_ref().is_some_and(|re| re.is_match(content)) {
            verdict.insert(Defect::Generic);
        }
        verdict
    }

    /// Union of `classify` over every score attached to a document.
    pub fn classify_document(&self, content: Option<&str>, scores: &[Option<i32>]) -> Verdict {
        if scores.is_empty() {
            return self.classify(content, None);
        }
        let mut verdict = Verdict::default();
        for score in scores {
            verdict.merge(self.classify(content, *score));
        }
        verdict
    }
}
