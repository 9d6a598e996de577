pub mod classify;
pub mod meta;
pub mod repair;
pub mod report;
pub mod reset;
pub mod scan;

use indicatif::ProgressBar;
use tracing::info;

use crate::error::StoreError;
use crate::settings::CurationConfig;
use crate::store::CurationStore;
use classify::ContentRules;
use report::Report;

/// Full pass: consistency sweep, meta resets, defect sweep, classification.
///
/// A dry run skips every mutating stage and only classifies. Only errors that
/// prevent reading the corpus abort the pass; per-row failures end up in the
/// report.
pub fn run_pass(
    store: &dyn CurationStore,
    cfg: &CurationConfig,
    rules: &ContentRules,
    dry_run: bool,
    progress: &ProgressBar,
) -> Result<Report, StoreError> {
    let repair = if dry_run {
        None
    } else {
        Some(repair::repair(store)?)
    };

    let meta = if dry_run {
        None
    } else {
        Some(meta::reset_meta(store, &cfg.meta_domains))
    };

    let (scan, clean) = scan::scan(store, cfg, rules, dry_run, progress)?;

    let report = Report {
        generated_at: chrono::Utc::now(),
        dry_run,
        repair,
        clean,
        meta,
        scan,
    };
    info!(failures = report.failures().len(), dry_run, "Curation pass finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::fixtures;
    use crate::store::memory::content_state_consistent;

    fn genuine(len: usize) -> String {
        "Users grant a worldwide licence to uploaded content. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn full_pass_keeps_every_company_and_leaves_consistent_documents() {
        let s = fixtures::store();
        let a = fixtures::company(&s, "spotify.com", "Spotify");
        let da = fixtures::document(&s, a, Some(&genuine(4000)));
        fixtures::analysis(&s, da, Some(58));
        let f = fixtures::company(&s, "fakeco.com", "FakeCo");
        let df = fixtures::document(&s, f, Some(&genuine(4000)));
        fixtures::analysis(&s, df, Some(100));
        let k = fixtures::company(&s, "khanacademy.org", "Khan Academy");
        let dk1 = fixtures::document(&s, k, Some(&genuine(2000)));
        let dk2 = fixtures::document(&s, k, Some(&genuine(2000)));
        fixtures::analysis(&s, dk1, Some(70));
        fixtures::analysis(&s, dk2, Some(71));
        fixtures::company(&s, "nothing.io", "Nothing");
        s.conn()
            .execute_batch(
                "CREATE TRIGGER no_company_deletes BEFORE DELETE ON companies
                 BEGIN SELECT RAISE(ABORT, 'companies are permanent'); END;",
            )
            .unwrap();

        let cfg = CurationConfig {
            allowlist: vec!["spotify.com".into(), "fakeco.com".into()],
            meta_domains: vec!["khanacademy.org".into(), "wikipedia.org".into()],
            ..CurationConfig::default()
        }
        .normalized();
        let rules = ContentRules::from_config(&cfg).unwrap();

        let report = run_pass(&s, &cfg, &rules, false, &ProgressBar::hidden()).unwrap();

        assert!(report.failures().is_empty());
        assert_eq!(report.clean.fabricated, 1);
        assert_eq!(report.meta.as_ref().unwrap().reset_count(), 1);
        assert_eq!(
            report.scan.valid.iter().map(|v| v.company.domain.as_str()).collect::<Vec<_>>(),
            vec!["spotify.com"]
        );
        assert_eq!(
            report
                .scan
                .needs_cleaning
                .iter()
                .map(|c| c.domain.as_str())
                .collect::<Vec<_>>(),
            vec!["fakeco.com", "khanacademy.org"]
        );
        assert_eq!(report.scan.skipped.len(), 1);

        let stats = s.corpus_stats().unwrap();
        assert_eq!(stats.companies, 4);
        assert_eq!(stats.documents, 4);
        assert_eq!(stats.analyses, 1);
        assert_eq!(stats.partial, 0);
        assert!(content_state_consistent(&s));
    }

    #[test]
    fn analyses_of_a_half_reset_document_do_not_make_a_company_valid() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "a.com", "A");
        let awaiting = fixtures::document(&s, c, Some(&genuine(3000)));
        let half_reset = fixtures::document(&s, c, Some(&genuine(3000)));
        fixtures::analysis(&s, half_reset, Some(70));
        s.conn()
            .execute("UPDATE documents SET raw_content = NULL WHERE id = ?1", [half_reset])
            .unwrap();
        let cfg = CurationConfig {
            allowlist: vec!["a.com".into()],
            ..CurationConfig::default()
        }
        .normalized();
        let rules = ContentRules::from_config(&cfg).unwrap();

        let report = run_pass(&s, &cfg, &rules, false, &ProgressBar::hidden()).unwrap();

        assert_eq!(report.repair.as_ref().unwrap().partial_nulls, 1);
        assert_eq!(fixtures::analyses_for(&s, half_reset), 0);
        assert!(report.scan.valid.is_empty());
        assert_eq!(report.scan.needs_cleaning.len(), 1);
        assert!(s.fetch_corpus().unwrap()[0].documents[0].document.raw_content.is_some());
        assert_eq!(s.fetch_corpus().unwrap()[0].documents[0].document.id, awaiting);
        assert!(content_state_consistent(&s));
    }

    #[test]
    fn undecodable_content_does_not_abort_the_pass() {
        let s = fixtures::store();
        let good = fixtures::company(&s, "spotify.com", "Spotify");
        let dg = fixtures::document(&s, good, Some(&genuine(4000)));
        fixtures::analysis(&s, dg, Some(58));
        let bad = fixtures::company(&s, "garbled.io", "Garbled");
        let db = fixtures::document(&s, bad, Some("x"));
        s.conn()
            .execute(
                "UPDATE documents SET raw_content = CAST(X'FFFE41' AS TEXT) WHERE id = ?1",
                [db],
            )
            .unwrap();
        let cfg = CurationConfig {
            allowlist: vec!["spotify.com".into()],
            ..CurationConfig::default()
        }
        .normalized();
        let rules = ContentRules::from_config(&cfg).unwrap();

        let report = run_pass(&s, &cfg, &rules, false, &ProgressBar::hidden()).unwrap();

        assert!(report.failures().is_empty());
        assert_eq!(report.clean.placeholder, 1);
        assert_eq!(report.scan.valid.len(), 1);
        assert_eq!(report.scan.valid[0].company.domain, "spotify.com");
        assert!(content_state_consistent(&s));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "stub.io", "Stub");
        let d = fixtures::document(&s, c, Some("lorem ipsum"));
        fixtures::analysis(&s, d, Some(20));
        let cfg = CurationConfig::default();
        let rules = ContentRules::from_config(&cfg).unwrap();

        let first = run_pass(&s, &cfg, &rules, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(first.clean.documents_reset(), 1);
        let before = s.fetch_corpus().unwrap();

        let second = run_pass(&s, &cfg, &rules, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(second.clean.documents_reset(), 0);
        assert_eq!(second.repair.unwrap().total(), 0);
        assert_eq!(s.fetch_corpus().unwrap(), before);
    }

    #[test]
    fn dry_run_pass_does_not_mutate() {
        let s = fixtures::store();
        let c = fixtures::company(&s, "khanacademy.org", "Khan Academy");
        let d = fixtures::document(&s, c, Some("placeholder"));
        fixtures::analysis(&s, d, Some(100));
        let cfg = CurationConfig {
            meta_domains: vec!["khanacademy.org".into()],
            ..CurationConfig::default()
        };
        let rules = ContentRules::from_config(&cfg).unwrap();
        let before = s.fetch_corpus().unwrap();

        let report = run_pass(&s, &cfg, &rules, true, &ProgressBar::hidden()).unwrap();
        assert!(report.repair.is_none());
        assert!(report.meta.is_none());
        assert_eq!(report.clean.would_reset.len(), 1);
        assert_eq!(s.fetch_corpus().unwrap(), before);
    }
}
