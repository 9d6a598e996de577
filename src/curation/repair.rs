use serde::Serialize;
use tracing::{info, warn};

use super::reset::{reset_document, Failure, ResetStep, Target};
use crate::error::StoreError;
use crate::store::{CurationStore, DocumentState};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairOutcome {
    /// Analyses were gone but content was still marked analyzed.
    pub interrupted_resets: usize,
    /// Content was null but some other content column was not.
    pub partial_nulls: usize,
    pub lengths_corrected: usize,
    pub failures: Vec<Failure>,
}

impl RepairOutcome {
    pub fn total(&self) -> usize {
        self.interrupted_resets + self.partial_nulls + self.lengths_corrected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fix {
    FinishReset,
    NullOut,
    Length(i64),
}

fn diagnose(doc: &DocumentState) -> Option<Fix> {
    match doc.raw_chars {
        Some(_) if doc.is_analyzed && doc.analysis_count == 0 => Some(Fix::FinishReset),
        Some(chars) if doc.content_length != Some(chars) => Some(Fix::Length(chars)),
        Some(_) => None,
        None if doc.is_analyzed || doc.has_cleaned_content || doc.content_length.is_some() => {
            Some(Fix::NullOut)
        }
        None => None,
    }
}

/// Bring every document back to either the populated or the fully null
/// content state. Finishes cascades whose second step failed on an earlier
/// pass. Documents with content that are still waiting for analysis are left
/// alone.
///
/// Nulling a document that still has analyses goes through the full cascade,
/// so analyses are always gone before content is touched.
pub fn repair(store: &dyn CurationStore) -> Result<RepairOutcome, StoreError> {
    let mut outcome = RepairOutcome::default();

    for doc in store.fetch_document_states()? {
        let Some(fix) = diagnose(&doc) else { continue };
        let result = match fix {
            Fix::FinishReset | Fix::NullOut if doc.analysis_count > 0 => {
                reset_document(store, doc.id).map(|_| ())
            }
            Fix::FinishReset | Fix::NullOut => store
                .reset_document_content(doc.id)
                .map(|_| ())
                .map_err(|e| content_failure(doc.id, &e)),
            Fix::Length(n) => store
                .set_content_length(doc.id, n)
                .map(|_| ())
                .map_err(|e| content_failure(doc.id, &e)),
        };
        match result {
            Ok(()) => {
                info!(document_id = doc.id, company_id = doc.company_id, ?fix, "Repaired document");
                match fix {
                    Fix::FinishReset => outcome.interrupted_resets += 1,
                    Fix::NullOut => outcome.partial_nulls += 1,
                    Fix::Length(_) => outcome.lengths_corrected += 1,
                }
            }
            Err(failure) => {
                warn!(document_id = doc.id, error = %failure.error, "Repair failed");
                outcome.failures.push(failure);
            }
        }
    }
    Ok(outcome)
}

fn content_failure(document_id: i64, e: &StoreError) -> Failure {
    Failure::new(Target::Document { id: document_id }, ResetStep::ContentReset, e)
}
