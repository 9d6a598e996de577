use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{
    Analysis, Clause, Company, CompanyEntry, CorpusStats, CurationStore, Document, DocumentEntry,
    DocumentState,
};

/// Curation store backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open an existing curation database. A missing file or a database
    /// without the curation tables is `Unavailable`.
    pub fn connect(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_connection(conn)?;
        store.probe()?;
        Ok(store)
    }

    /// Open (creating if needed) and lay down the schema. Used by `init` only.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_connection(conn)?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(SqliteStore { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn probe(&self) -> Result<(), StoreError> {
        for table in ["companies", "documents", "analysis_results"] {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |r| r.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(StoreError::Unavailable(format!(
                    "table '{}' missing; run 'init' first",
                    table
                )));
            }
        }
        Ok(())
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS companies (
                id             INTEGER PRIMARY KEY,
                domain         TEXT UNIQUE NOT NULL,
                name           TEXT NOT NULL,
                industry       TEXT,
                business_model TEXT,
                created_at     TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at     TEXT
            );

            CREATE TABLE IF NOT EXISTS documents (
                id              INTEGER PRIMARY KEY,
                company_id      INTEGER NOT NULL REFERENCES companies(id),
                url             TEXT,
                title           TEXT,
                document_type   TEXT NOT NULL DEFAULT 'terms_of_service',
                raw_content     TEXT,
                cleaned_content TEXT,
                content_length  INTEGER,
                is_analyzed     BOOLEAN NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_documents_company ON documents(company_id);

            CREATE TABLE IF NOT EXISTS analysis_results (
                id                   INTEGER PRIMARY KEY,
                document_id          INTEGER NOT NULL REFERENCES documents(id),
                company_id           INTEGER NOT NULL REFERENCES companies(id),
                transparency_score   INTEGER CHECK(transparency_score BETWEEN 0 AND 100),
                overall_risk_score   INTEGER,
                privacy_risk_score   INTEGER,
                legal_risk_score     INTEGER,
                concerning_clauses   TEXT,
                manipulation_tactics TEXT,
                summary              TEXT,
                recommendations      TEXT,
                created_at           TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_document ON analysis_results(document_id);
            CREATE INDEX IF NOT EXISTS idx_analysis_company ON analysis_results(company_id);
            ",
        )?;
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn decode_json<T: serde::de::DeserializeOwned + Default>(
    column: &'static str,
    analysis_id: i64,
    raw: Option<String>,
) -> T {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return T::default();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(analysis_id, column, error = %e, "Malformed JSON column; using empty value");
        T::default()
    })
}

/// Read an optional text column, replacing invalid UTF-8 instead of failing
/// the whole row.
fn lossy_text(row: &Row, idx: usize, column: &'static str) -> rusqlite::Result<Option<String>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Some(text.to_owned())),
            Err(e) => {
                warn!(column, error = %e, "Invalid UTF-8 in stored text; replacing bad bytes");
                Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
            }
        },
        ValueRef::Integer(n) => Ok(Some(n.to_string())),
        ValueRef::Real(f) => Ok(Some(f.to_string())),
    }
}

fn company_from(row: &Row) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        domain: row.get(1)?,
        name: row.get(2)?,
        industry: row.get(3)?,
        business_model: row.get(4)?,
    })
}

// Column offsets in the corpus join below.
const DOC_COL: usize = 5;
const ANALYSIS_COL: usize = 14;

fn document_from(row: &Row) -> rusqlite::Result<Option<Document>> {
    let Some(id) = row.get::<_, Option<i64>>(DOC_COL)? else {
        return Ok(None);
    };
    Ok(Some(Document {
        id,
        company_id: row.get(DOC_COL + 1)?,
        url: lossy_text(row, DOC_COL + 2, "url")?,
        title: lossy_text(row, DOC_COL + 3, "title")?,
        document_type: row.get(DOC_COL + 4)?,
        raw_content: lossy_text(row, DOC_COL + 5, "raw_content")?,
        cleaned_content: lossy_text(row, DOC_COL + 6, "cleaned_content")?,
        content_length: row.get(DOC_COL + 7)?,
        is_analyzed: row.get(DOC_COL + 8)?,
    }))
}

fn analysis_from(row: &Row) -> rusqlite::Result<Option<Analysis>> {
    let Some(id) = row.get::<_, Option<i64>>(ANALYSIS_COL)? else {
        return Ok(None);
    };
    let clauses = lossy_text(row, ANALYSIS_COL + 7, "concerning_clauses")?;
    let tactics = lossy_text(row, ANALYSIS_COL + 8, "manipulation_tactics")?;
    Ok(Some(Analysis {
        id,
        document_id: row.get(ANALYSIS_COL + 1)?,
        company_id: row.get(ANALYSIS_COL + 2)?,
        transparency_score: row.get(ANALYSIS_COL + 3)?,
        overall_risk_score: row.get(ANALYSIS_COL + 4)?,
        privacy_risk_score: row.get(ANALYSIS_COL + 5)?,
        legal_risk_score: row.get(ANALYSIS_COL + 6)?,
        concerning_clauses: decode_json::<Vec<Clause>>("concerning_clauses", id, clauses),
        manipulation_tactics: decode_json::<Vec<String>>("manipulation_tactics", id, tactics),
        summary: lossy_text(row, ANALYSIS_COL + 9, "summary")?,
        recommendations: lossy_text(row, ANALYSIS_COL + 10, "recommendations")?,
    }))
}

impl CurationStore for SqliteStore {
    fn fetch_corpus(&self) -> Result<Vec<CompanyEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.domain, c.name, c.industry, c.business_model,
                    d.id, d.company_id, d.url, d.title, d.document_type,
                    d.raw_content, d.cleaned_content, d.content_length, d.is_analyzed,
                    a.id, a.document_id, a.company_id, a.transparency_score,
                    a.overall_risk_score, a.privacy_risk_score, a.legal_risk_score,
                    a.concerning_clauses, a.manipulation_tactics, a.summary, a.recommendations
             FROM companies c
             LEFT JOIN documents d ON d.company_id = c.id
             LEFT JOIN analysis_results a ON a.document_id = d.id
             ORDER BY c.id, d.id, a.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((company_from(row)?, document_from(row)?, analysis_from(row)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut corpus: Vec<CompanyEntry> = Vec::new();
        for (company, document, analysis) in rows {
            if corpus.last().map(|e| e.company.id) != Some(company.id) {
                corpus.push(CompanyEntry {
                    company,
                    documents: Vec::new(),
                });
            }
            let Some(entry) = corpus.last_mut() else { continue };
            let Some(document) = document else { continue };
            if entry.documents.last().map(|d| d.document.id) != Some(document.id) {
                entry.documents.push(DocumentEntry {
                    document,
                    analyses: Vec::new(),
                });
            }
            if let (Some(doc), Some(analysis)) = (entry.documents.last_mut(), analysis) {
                doc.analyses.push(analysis);
            }
        }
        debug!(companies = corpus.len(), "Fetched corpus");
        Ok(corpus)
    }

    fn find_company_by_domain(&self, domain: &str) -> Result<Company, StoreError> {
        self.conn
            .query_row(
                "SELECT id, domain, name, industry, business_model
                 FROM companies WHERE domain = ?1",
                [domain],
                company_from,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("company with domain '{}'", domain)))
    }

    fn delete_analyses_for_document(&self, document_id: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "DELETE FROM analysis_results WHERE document_id = ?1",
            [document_id],
        )?)
    }

    fn delete_analyses_for_company(&self, company_id: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "DELETE FROM analysis_results WHERE company_id = ?1",
            [company_id],
        )?)
    }

    fn reset_document_content(&self, document_id: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE documents
             SET raw_content = NULL, cleaned_content = NULL, content_length = NULL,
                 is_analyzed = 0, updated_at = ?2
             WHERE id = ?1",
            params![document_id, now()],
        )?)
    }

    fn reset_company_documents(&self, company_id: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE documents
             SET raw_content = NULL, cleaned_content = NULL, content_length = NULL,
                 is_analyzed = 0, updated_at = ?2
             WHERE company_id = ?1",
            params![company_id, now()],
        )?)
    }

    fn fetch_document_states(&self) -> Result<Vec<DocumentState>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.company_id, LENGTH(d.raw_content), d.cleaned_content IS NOT NULL,
                    d.content_length, d.is_analyzed,
                    (SELECT COUNT(*) FROM analysis_results a WHERE a.document_id = d.id)
             FROM documents d
             ORDER BY d.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentState {
                    id: row.get(0)?,
                    company_id: row.get(1)?,
                    raw_chars: row.get(2)?,
                    has_cleaned_content: row.get(3)?,
                    content_length: row.get(4)?,
                    is_analyzed: row.get(5)?,
                    analysis_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_content_length(&self, document_id: i64, length: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE documents SET content_length = ?2, updated_at = ?3 WHERE id = ?1",
            params![document_id, length, now()],
        )?)
    }

    fn corpus_stats(&self) -> Result<CorpusStats, StoreError> {
        let count = |sql: &str| -> Result<usize, StoreError> {
            Ok(self.conn.query_row(sql, [], |r| r.get(0))?)
        };
        Ok(CorpusStats {
            companies: count("SELECT COUNT(*) FROM companies")?,
            documents: count("SELECT COUNT(*) FROM documents")?,
            with_content: count("SELECT COUNT(*) FROM documents WHERE raw_content IS NOT NULL")?,
            analyzed: count("SELECT COUNT(*) FROM documents WHERE is_analyzed = 1")?,
            analyses: count("SELECT COUNT(*) FROM analysis_results")?,
            partial: count(
                "SELECT COUNT(*) FROM documents
                 WHERE raw_content IS NULL
                   AND (is_analyzed = 1 OR cleaned_content IS NOT NULL OR content_length IS NOT NULL)",
            )?,
        })
    }
}
