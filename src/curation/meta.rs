use serde::Serialize;
use tracing::{info, warn};

use super::reset::{reset_company, Failure, ResetStep, Target};
use crate::error::StoreError;
use crate::store::{normalize_domain, CurationStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetaStatus {
    Reset {
        analyses_deleted: usize,
        documents_reset: usize,
    },
    /// No company with this domain exists yet.
    Absent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEntry {
    pub domain: String,
    #[serde(flatten)]
    pub status: MetaStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaOutcome {
    pub entries: Vec<MetaEntry>,
    pub failures: Vec<Failure>,
}

impl MetaOutcome {
    pub fn reset_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, MetaStatus::Reset { .. }))
            .count()
    }
}

/// Unconditionally reset every meta domain that exists in the store.
pub fn reset_meta(store: &dyn CurationStore, domains: &[String]) -> MetaOutcome {
    let mut outcome = MetaOutcome::default();

    for raw in domains {
        let domain = normalize_domain(raw);
        let company = match store.find_company_by_domain(&domain) {
            Ok(c) => c,
            Err(StoreError::NotFound(_)) => {
                info!(domain = %domain, "Meta record not present; skipping");
                outcome.entries.push(MetaEntry {
                    domain,
                    status: MetaStatus::Absent,
                });
                continue;
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "Meta lookup failed");
                outcome.failures.push(Failure::new(
                    Target::Domain {
                        domain: domain.clone(),
                    },
                    ResetStep::Lookup,
                    &e,
                ));
                outcome.entries.push(MetaEntry {
                    domain,
                    status: MetaStatus::Failed,
                });
                continue;
            }
        };

        let status = match reset_company(store, company.id, &company.domain) {
            Ok(count) => MetaStatus::Reset {
                analyses_deleted: count.analyses_deleted,
                documents_reset: count.documents_reset,
            },
            Err(failure) => {
                outcome.failures.push(failure);
                MetaStatus::Failed
            }
        };
        outcome.entries.push(MetaEntry { domain, status });
    }
    outcome
}
