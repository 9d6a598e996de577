use std::collections::HashSet;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info};

use super::classify::{ContentRules, Defect};
use super::reset::{reset_document, Failure};
use crate::settings::CurationConfig;
use crate::store::{Company, CompanyEntry, CurationStore};

/// Per-company outcome of a scan. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Valid,
    NeedsCleaning,
    Skipped,
}

/// A company that currently holds a genuine analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidCompany {
    pub company: Company,
    pub document_id: i64,
    pub transparency_score: Option<i32>,
    pub flag_count: usize,
    pub content_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResult {
    /// Sorted by name.
    pub valid: Vec<ValidCompany>,
    pub needs_cleaning: Vec<Company>,
    pub skipped: Vec<Company>,
}

/// Evaluate one company. Only the first document the store returned is
/// considered.
pub fn evaluate(entry: &CompanyEntry, cfg: &CurationConfig) -> (Outcome, Option<ValidCompany>) {
    let has_analysis = entry.analyses().next().is_some();
    let first = entry.documents.first();

    if cfg.is_allowlisted(&entry.company.domain) && has_analysis {
        if let Some(doc) = first {
            if let Some(len) = doc.document.content_chars() {
                if len > cfg.substantive_min_len {
                    // Prefer the first document's own analysis for the reported score.
                    let analysis = doc.analyses.first().or_else(|| entry.analyses().next());
                    let valid = ValidCompany {
                        company: entry.company.clone(),
                        document_id: doc.document.id,
                        transparency_score: analysis.and_then(|a| a.transparency_score),
                        flag_count: analysis.map_or(0, |a| a.concerning_clauses.len()),
                        content_length: len,
                    };
                    return (Outcome::Valid, Some(valid));
                }
            }
        }
    }

    if first.is_some() || has_analysis || cfg.is_allowlisted(&entry.company.domain) {
        (Outcome::NeedsCleaning, None)
    } else {
        (Outcome::Skipped, None)
    }
}

/// Sort every company of the corpus into valid / needs-cleaning / skipped.
pub fn classify_companies(corpus: &[CompanyEntry], cfg: &CurationConfig) -> ScanResult {
    let mut result = ScanResult::default();
    for entry in corpus {
        let (outcome, valid) = evaluate(entry, cfg);
        debug!(domain = %entry.company.domain, ?outcome, "Classified company");
        match (outcome, valid) {
            (Outcome::Valid, Some(v)) => result.valid.push(v),
            (Outcome::Skipped, _) => result.skipped.push(entry.company.clone()),
            _ => result.needs_cleaning.push(entry.company.clone()),
        }
    }
    result.valid.sort_by(|a, b| {
        a.company
            .name
            .cmp(&b.company.name)
            .then_with(|| a.company.domain.cmp(&b.company.domain))
    });
    result
}

/// Documents reset by the defect sweep, grouped by their primary defect.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanOutcome {
    pub examined: usize,
    pub fabricated: usize,
    pub placeholder: usize,
    pub generic: usize,
    pub analyses_deleted: usize,
    /// Defective documents found but left alone because of a dry run.
    pub would_reset: Vec<(i64, Defect)>,
    pub failures: Vec<Failure>,
}

impl CleanOutcome {
    pub fn documents_reset(&self) -> usize {
        self.fabricated + self.placeholder + self.generic
    }

    fn record(&mut self, defect: Defect) {
        match defect {
            Defect::Fabricated => self.fabricated += 1,
            Defect::Placeholder => self.placeholder += 1,
            Defect::Generic => self.generic += 1,
        }
    }
}

/// Run the classifier over every document that still has content, across
/// the whole corpus, and cascade-reset the defective ones.
pub fn clean_defective(
    store: &dyn CurationStore,
    corpus: &[CompanyEntry],
    rules: &ContentRules,
    dry_run: bool,
    progress: &ProgressBar,
) -> CleanOutcome {
    let mut outcome = CleanOutcome::default();
    let documents: Vec<_> = corpus
        .iter()
        .flat_map(|e| e.documents.iter().map(move |d| (e, d)))
        .filter(|(_, d)| d.document.raw_content.is_some())
        .collect();
    progress.set_length(documents.len() as u64);

    for (entry, doc) in documents {
        outcome.examined += 1;
        let scores: Vec<Option<i32>> = doc.analyses.iter().map(|a| a.transparency_score).collect();
        let verdict = rules.classify_document(doc.document.raw_content.as_deref(), &scores);
        let Some(primary) = verdict.primary() else {
            progress.inc(1);
            continue;
        };

        let document_id = doc.document.id;
        if dry_run {
            info!(
                document_id,
                domain = %entry.company.domain,
                defect = %primary,
                "Would reset document (dry run)"
            );
            outcome.would_reset.push((document_id, primary));
            progress.inc(1);
            continue;
        }

        match reset_document(store, document_id) {
            Ok(count) => {
                outcome.record(primary);
                outcome.analyses_deleted += count.analyses_deleted;
            }
            Err(failure) => outcome.failures.push(failure),
        }
        progress.inc(1);
    }
    outcome
}

/// Apply the resets a dry run found to an in-memory copy of the corpus, so
/// classification sees the state a real pass would leave behind.
fn with_pending_resets(mut corpus: Vec<CompanyEntry>, pending: &[(i64, Defect)]) -> Vec<CompanyEntry> {
    if pending.is_empty() {
        return corpus;
    }
    let ids: HashSet<i64> = pending.iter().map(|(id, _)| *id).collect();
    for doc in corpus.iter_mut().flat_map(|e| e.documents.iter_mut()) {
        if ids.contains(&doc.document.id) {
            doc.analyses.clear();
            doc.document.raw_content = None;
            doc.document.cleaned_content = None;
            doc.document.content_length = None;
            doc.document.is_analyzed = false;
        }
    }
    corpus
}

/// Clean the corpus, then classify companies against the cleaned state.
/// A dry run classifies against the state the pending resets would produce.
pub fn scan(
    store: &dyn CurationStore,
    cfg: &CurationConfig,
    rules: &ContentRules,
    dry_run: bool,
    progress: &ProgressBar,
) -> Result<(ScanResult, CleanOutcome), crate::error::StoreError> {
    let corpus = store.fetch_corpus()?;
    let clean = clean_defective(store, &corpus, rules, dry_run, progress);

    // A failed reset may still have deleted analyses.
    let corpus = if dry_run {
        with_pending_resets(corpus, &clean.would_reset)
    } else if clean.documents_reset() > 0 || !clean.failures.is_empty() {
        store.fetch_corpus()?
    } else {
        corpus
    };
    let result = classify_companies(&corpus, cfg);
    info!(
        valid = result.valid.len(),
        needs_cleaning = result.needs_cleaning.len(),
        skipped = result.skipped.len(),
        reset = clean.documents_reset(),
        "Scan complete"
    );
    Ok((result, clean))
}
