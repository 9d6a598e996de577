use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::CurationStore;

/// Which half of a cascade failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetStep {
    /// Finding the record to reset.
    Lookup,
    /// Deleting dependent analyses. Content was left untouched.
    AnalysisDelete,
    /// Nulling document content after the analyses were gone.
    ContentReset,
}

/// What a cascade is being applied to, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Document { id: i64 },
    Company { id: i64, domain: String },
    Domain { domain: String },
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Document { id } => write!(f, "document {}", id),
            Target::Company { id, domain } => write!(f, "company {} ({})", domain, id),
            Target::Domain { domain } => write!(f, "domain {}", domain),
        }
    }
}

/// A per-row failure, kept for the report instead of aborting the pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub target: Target,
    pub step: ResetStep,
    pub error: String,
    /// Rejected by the store; a retry will not help.
    pub needs_manual: bool,
}

impl Failure {
    pub fn new(target: Target, step: ResetStep, err: &StoreError) -> Self {
        Failure {
            target,
            step,
            error: err.to_string(),
            needs_manual: err.needs_manual_remediation(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetCount {
    pub analyses_deleted: usize,
    pub documents_reset: usize,
}

/// Soft-reset one document: drop its analyses, then null its content.
///
/// Content is only touched after the analyses are gone. Safe to repeat.
pub fn reset_document(store: &dyn CurationStore, document_id: i64) -> Result<ResetCount, Failure> {
    let target = Target::Document { id: document_id };

    let analyses_deleted = store.delete_analyses_for_document(document_id).map_err(|e| {
        warn!(document_id, error = %e, "Analysis delete failed; document left untouched");
        Failure::new(target.clone(), ResetStep::AnalysisDelete, &e)
    })?;

    let documents_reset = store.reset_document_content(document_id).map_err(|e| {
        warn!(
            document_id,
            analyses_deleted,
            error = %e,
            "Content reset failed after analyses were deleted; will retry next pass"
        );
        Failure::new(target.clone(), ResetStep::ContentReset, &e)
    })?;

    if documents_reset == 0 {
        debug!(document_id, "No such document; nothing to reset");
    } else {
        info!(document_id, analyses_deleted, "Document reset");
    }
    Ok(ResetCount {
        analyses_deleted,
        documents_reset,
    })
}

/// Company-scoped cascade: drop every analysis of the company, then null the
/// content of all of its documents.
pub fn reset_company(
    store: &dyn CurationStore,
    company_id: i64,
    domain: &str,
) -> Result<ResetCount, Failure> {
    let target = Target::Company {
        id: company_id,
        domain: domain.to_string(),
    };

    let analyses_deleted = store.delete_analyses_for_company(company_id).map_err(|e| {
        warn!(company_id, domain, error = %e, "Analysis delete failed; documents left untouched");
        Failure::new(target.clone(), ResetStep::AnalysisDelete, &e)
    })?;

    let documents_reset = store.reset_company_documents(company_id).map_err(|e| {
        warn!(
            company_id,
            domain,
            analyses_deleted,
            error = %e,
            "Content reset failed after analyses were deleted; will retry next pass"
        );
        Failure::new(target.clone(), ResetStep::ContentReset, &e)
    })?;

    info!(company_id, domain, analyses_deleted, documents_reset, "Company reset");
    Ok(ResetCount {
        analyses_deleted,
        documents_reset,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::fixtures;
    use crate::store::memory::MemoryStore;

    const TEXT: &str = "You agree to these terms.";

    #[test]
    fn reset_clears_analyses_and_content_but_keeps_rows() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "alpha.com", "Alpha");
        let d = fixtures::document(&s, c, Some(TEXT));
        for score in [10, 20, 30] {
            fixtures::analysis(&s, d, Some(score));
        }

        let count = reset_document(&s, d).unwrap();
        assert_eq!(
            count,
            ResetCount {
                analyses_deleted: 3,
                documents_reset: 1
            }
        );
        assert_eq!(fixtures::analyses_for(&s, d), 0);

        let (id, title, company_id, raw, cleaned, len, analyzed): (
            i64,
            String,
            i64,
            Option<String>,
            Option<String>,
            Option<i64>,
            bool,
        ) = s
            .conn()
            .query_row(
                "SELECT id, title, company_id, raw_content, cleaned_content, content_length, is_analyzed
                 FROM documents WHERE id = ?1",
                [d],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
            )
            .unwrap();
        assert_eq!((id, title.as_str(), company_id), (d, "Terms of Service", c));
        assert_eq!((raw, cleaned, len, analyzed), (None, None, None, false));
    }

    #[test]
    fn reset_is_idempotent() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "alpha.com", "Alpha");
        let d = fixtures::document(&s, c, Some(TEXT));
        fixtures::analysis(&s, d, Some(100));

        reset_document(&s, d).unwrap();
        let once = s.fetch_corpus().unwrap();
        let second = reset_document(&s, d).unwrap();
        let twice = s.fetch_corpus().unwrap();

        assert_eq!(second.analyses_deleted, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_document_is_a_no_op() {
        let s = fixtures::store();
        assert_eq!(reset_document(&s, 999).unwrap(), ResetCount::default());
    }

    #[test]
    fn failed_analysis_delete_leaves_content_alone() {
        let m = MemoryStore::new();
        let c = m.add_company("alpha.com", "Alpha");
        let d = m.add_document(c, Some(TEXT));
        m.add_analysis(d, Some(100));
        m.fail_analysis_delete.borrow_mut().insert(d);

        let failure = reset_document(&m, d).unwrap_err();
        assert_eq!(failure.step, ResetStep::AnalysisDelete);
        assert!(failure.needs_manual);
        assert_eq!(failure.target, Target::Document { id: d });

        let doc = m.document(d).unwrap();
        assert_eq!(doc.raw_content.as_deref(), Some(TEXT));
        assert!(doc.is_analyzed);
        assert_eq!(m.analyses_for_document(d), 1);
    }

    #[test]
    fn failed_content_reset_is_retryable() {
        let m = MemoryStore::new();
        let c = m.add_company("alpha.com", "Alpha");
        let d = m.add_document(c, Some(TEXT));
        m.add_analysis(d, Some(50));
        m.fail_content_reset.borrow_mut().insert(d);

        let failure = reset_document(&m, d).unwrap_err();
        assert_eq!(failure.step, ResetStep::ContentReset);
        assert!(!failure.needs_manual);
        assert_eq!(m.analyses_for_document(d), 0);

        m.fail_content_reset.borrow_mut().clear();
        reset_document(&m, d).unwrap();
        assert!(m.document(d).unwrap().raw_content.is_none());
    }

    #[test]
    fn sqlite_constraint_rejection_is_reported_per_document() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "alpha.com", "Alpha");
        let d = fixtures::document(&s, c, Some(TEXT));
        fixtures::analysis(&s, d, Some(100));
        s.conn()
            .execute_batch(
                "CREATE TRIGGER keep_analyses BEFORE DELETE ON analysis_results
                 BEGIN SELECT RAISE(ABORT, 'analysis is locked'); END;",
            )
            .unwrap();

        let failure = reset_document(&s, d).unwrap_err();
        assert_eq!(failure.step, ResetStep::AnalysisDelete);
        assert!(failure.needs_manual);
        assert_eq!(fixtures::analyses_for(&s, d), 1);
    }

    #[test]
    fn company_reset_covers_all_documents() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "khanacademy.org", "Khan Academy");
        let d1 = fixtures::document(&s, c, Some(TEXT));
        let d2 = fixtures::document(&s, c, Some(TEXT));
        fixtures::analysis(&s, d1, Some(70));
        fixtures::analysis(&s, d2, Some(80));

        let count = reset_company(&s, c, "khanacademy.org").unwrap();
        assert_eq!(count.analyses_deleted, 2);
        assert_eq!(count.documents_reset, 2);
        assert_eq!(s.corpus_stats().unwrap().with_content, 0);
    }
}
