use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::meta::{MetaOutcome, MetaStatus};
use super::repair::RepairOutcome;
use super::reset::{Failure, ResetStep};
use super::scan::{CleanOutcome, ScanResult};

/// Everything a curation pass did, ready to print. Holds no store handle.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub repair: Option<RepairOutcome>,
    pub clean: CleanOutcome,
    pub meta: Option<MetaOutcome>,
    pub scan: ScanResult,
}

impl Report {
    /// Every failure of the pass, in the order the stages ran.
    pub fn failures(&self) -> Vec<&Failure> {
        self.repair
            .iter()
            .flat_map(|r| r.failures.iter())
            .chain(self.clean.failures.iter())
            .chain(self.meta.iter().flat_map(|m| m.failures.iter()))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { "dry run" } else { "applied" };
        let _ = writeln!(
            out,
            "Curation pass {} ({})",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            mode
        );
        let _ = writeln!(out, "{}", "=".repeat(60));

        if let Some(r) = &self.repair {
            let _ = writeln!(out, "\n--- Consistency ---");
            let _ = writeln!(out, "Interrupted resets finished: {}", r.interrupted_resets);
            let _ = writeln!(out, "Partial nulls cleared:       {}", r.partial_nulls);
            let _ = writeln!(out, "Lengths corrected:           {}", r.lengths_corrected);
        }

        let c = &self.clean;
        let _ = writeln!(out, "\n--- Content resets ---");
        let _ = writeln!(out, "Documents examined: {}", c.examined);
        if self.dry_run {
            let _ = writeln!(out, "Would reset:        {}", c.would_reset.len());
            for (id, defect) in &c.would_reset {
                let _ = writeln!(out, "  document {:>6}  {}", id, defect);
            }
        } else {
            let _ = writeln!(out, "Fabricated:         {}", c.fabricated);
            let _ = writeln!(out, "Placeholder:        {}", c.placeholder);
            let _ = writeln!(out, "Generic:            {}", c.generic);
            let _ = writeln!(out, "Documents reset:    {}", c.documents_reset());
            let _ = writeln!(out, "Analyses deleted:   {}", c.analyses_deleted);
        }

        if let Some(m) = &self.meta {
            let _ = writeln!(out, "\n--- Meta records ---");
            if m.entries.is_empty() {
                let _ = writeln!(out, "No meta domains configured.");
            }
            for e in &m.entries {
                let status = match &e.status {
                    MetaStatus::Reset {
                        analyses_deleted,
                        documents_reset,
                    } => format!(
                        "reset ({} documents, {} analyses)",
                        documents_reset, analyses_deleted
                    ),
                    MetaStatus::Absent => "not present".to_string(),
                    MetaStatus::Failed => "FAILED".to_string(),
                };
                let _ = writeln!(out, "  {:<28} {}", truncate(&e.domain, 28), status);
            }
        }

        let s = &self.scan;
        let _ = writeln!(out, "\n--- Valid ({}) ---", s.valid.len());
        if !s.valid.is_empty() {
            let _ = writeln!(
                out,
                "{:<28} | {:<24} | {:>5} | {:>5} | {:>8}",
                "Company", "Domain", "Score", "Flags", "Length"
            );
            let _ = writeln!(out, "{}", "-".repeat(82));
            for v in &s.valid {
                let score = v
                    .transparency_score
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".into());
                let _ = writeln!(
                    out,
                    "{:<28} | {:<24} | {:>5} | {:>5} | {:>8}",
                    truncate(&v.company.name, 28),
                    truncate(&v.company.domain, 24),
                    score,
                    v.flag_count,
                    v.content_length
                );
            }
        }

        let _ = writeln!(out, "\n--- Needs cleaning ({}) ---", s.needs_cleaning.len());
        for company in &s.needs_cleaning {
            let _ = writeln!(out, "  {} ({})", company.name, company.domain);
        }
        let _ = writeln!(out, "\n--- Skipped ({}) ---", s.skipped.len());
        for company in &s.skipped {
            let _ = writeln!(out, "  {} ({})", company.name, company.domain);
        }

        let failures = self.failures();
        if !failures.is_empty() {
            let _ = writeln!(out, "\n--- Failures ({}) ---", failures.len());
            for f in failures {
                let step = match f.step {
                    ResetStep::Lookup => "lookup",
                    ResetStep::AnalysisDelete => "analysis delete",
                    ResetStep::ContentReset => "content reset",
                };
                let action = if f.needs_manual {
                    "needs manual remediation"
                } else {
                    "will retry next pass"
                };
                let _ = writeln!(out, "  {} [{}] {} -> {}", f.target, step, f.error, action);
            }
        }
        out
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
