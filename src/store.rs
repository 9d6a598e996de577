use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ── Records ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: i64,
    pub domain: String,
    pub name: String,
    pub industry: Option<String>,
    pub business_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub company_id: i64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub document_type: String,
    pub raw_content: Option<String>,
    pub cleaned_content: Option<String>,
    pub content_length: Option<i64>,
    pub is_analyzed: bool,
}

impl Document {
    /// Character length of the raw content, if any.
    pub fn content_chars(&self) -> Option<usize> {
        self.raw_content.as_deref().map(|c| c.chars().count())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub category: String,
    pub concern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub document_id: i64,
    pub company_id: i64,
    pub transparency_score: Option<i32>,
    pub overall_risk_score: Option<i32>,
    pub privacy_risk_score: Option<i32>,
    pub legal_risk_score: Option<i32>,
    pub concerning_clauses: Vec<Clause>,
    pub manipulation_tactics: Vec<String>,
    pub summary: Option<String>,
    pub recommendations: Option<String>,
}

/// A document together with the analyses hanging off it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    pub document: Document,
    pub analyses: Vec<Analysis>,
}

/// One company with everything the corpus join returned for it, in store order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyEntry {
    pub company: Company,
    pub documents: Vec<DocumentEntry>,
}

impl CompanyEntry {
    pub fn analyses(&self) -> impl Iterator<Item = &Analysis> {
        self.documents.iter().flat_map(|d| d.analyses.iter())
    }
}

/// Content-bearing columns of a document, used by the consistency sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub id: i64,
    pub company_id: i64,
    pub raw_chars: Option<i64>,
    pub has_cleaned_content: bool,
    pub content_length: Option<i64>,
    pub is_analyzed: bool,
    pub analysis_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub companies: usize,
    pub documents: usize,
    pub with_content: usize,
    pub analyzed: usize,
    pub analyses: usize,
    pub partial: usize,
}

// ── Repository seam ──

/// Everything the curation engine asks of the relational store.
///
/// Companies are never deleted, so there is no method for it.
pub trait CurationStore {
    /// Companies joined with their documents and analyses, ordered by
    /// company id, document id, analysis id.
    fn fetch_corpus(&self) -> Result<Vec<CompanyEntry>, StoreError>;

    /// Exact lookup on the canonical domain. `NotFound` when absent.
    fn find_company_by_domain(&self, domain: &str) -> Result<Company, StoreError>;

    fn delete_analyses_for_document(&self, document_id: i64) -> Result<usize, StoreError>;

    fn delete_analyses_for_company(&self, company_id: i64) -> Result<usize, StoreError>;

    /// Null the content columns of one document and clear `is_analyzed`.
    fn reset_document_content(&self, document_id: i64) -> Result<usize, StoreError>;

    /// Same as `reset_document_content` for every document of a company.
    fn reset_company_documents(&self, company_id: i64) -> Result<usize, StoreError>;

    fn fetch_document_states(&self) -> Result<Vec<DocumentState>, StoreError>;

    fn set_content_length(&self, document_id: i64, length: i64) -> Result<usize, StoreError>;

    fn corpus_stats(&self) -> Result<CorpusStats, StoreError>;
}

/// Canonical form of a company domain: lowercase, no scheme, no `www.`, no path.
pub fn normalize_domain(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let no_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = no_scheme.split('/').next().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_canonicalized() {
        assert_eq!(normalize_domain("WWW.Example.com"), "example.com");
        assert_eq!(normalize_domain("https://www.khanacademy.org/about"), "khanacademy.org");
        assert_eq!(normalize_domain("  github.com "), "github.com");
    }
}
