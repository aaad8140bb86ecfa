use anyhow::Result;
use serde::Serialize;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{info, warn};

mod csv_store;
mod pg_store;

pub use csv_store::CsvCorpus;
pub use pg_store::PgCorpus;

use crate::languages::LanguageLabel;
use crate::settings::{Settings, StorageBackend};

/// One persisted caption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusRecord {
    pub language: LanguageLabel,
    pub text: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    Rejected,
    /// No admin secret is configured, so wiping is not possible.
    Disabled,
}

pub enum CorpusStore {
    Csv(CsvCorpus),
    Postgres(PgCorpus),
}

impl CorpusStore {
    /// Opens the configured backend. For PostgreSQL this connects and creates
    /// the table; failure here is meant to stop startup.
    pub async fn open(settings: &Settings) -> Result<Self> {
        match settings.storage_backend {
            StorageBackend::Csv => Ok(CorpusStore::Csv(CsvCorpus::open(&settings.csv_path)?)),
            StorageBackend::Postgres => {
                Ok(CorpusStore::Postgres(PgCorpus::connect(&settings.postgres).await?))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            CorpusStore::Csv(_) => "csv",
            CorpusStore::Postgres(_) => "postgres",
        }
    }

    pub async fn append(&self, language: LanguageLabel, text: &str) -> Result<()> {
        match self {
            CorpusStore::Csv(store) => store.append(language, text),
            CorpusStore::Postgres(store) => store.append(language, text).await,
        }
    }

    /// All records, newest first.
    pub async fn read_all(&self) -> Result<Vec<CorpusRecord>> {
        match self {
            CorpusStore::Csv(store) => store.read_all(),
            CorpusStore::Postgres(store) => store.read_all().await,
        }
    }

    pub async fn clear(&self, admin_secret: Option<&str>, supplied: &str) -> Result<ClearOutcome> {
        let Some(expected) = admin_secret else {
            warn!("corpus clear requested but no admin password is configured");
            return Ok(ClearOutcome::Disabled);
        };
        if !secrets_match(expected, supplied) {
            warn!("corpus clear rejected: incorrect password");
            return Ok(ClearOutcome::Rejected);
        }
        match self {
            CorpusStore::Csv(store) => store.clear()?,
            CorpusStore::Postgres(store) => store.clear().await?,
        }
        info!("corpus cleared ({})", self.backend_name());
        Ok(ClearOutcome::Cleared)
    }
}

/// Constant-time comparison; differing lengths never match.
pub fn secrets_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
