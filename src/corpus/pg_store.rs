use anyhow::{Context, Result, anyhow};
use time::PrimitiveDateTime;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{error, info, warn};

use super::CorpusRecord;
use crate::languages::LanguageLabel;
use crate::settings::PostgresSettings;

const DEFAULT_PORT: u16 = 5432;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS meme_corpus (
    id SERIAL PRIMARY KEY,
    language VARCHAR(50),
    text TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";
const INSERT_SQL: &str = "INSERT INTO meme_corpus (language, text) VALUES ($1, $2)";
const SELECT_SQL: &str =
    "SELECT language, text, created_at FROM meme_corpus ORDER BY created_at DESC, id DESC";
const TRUNCATE_SQL: &str = "TRUNCATE TABLE meme_corpus RESTART IDENTITY";

/// `meme_corpus` table in PostgreSQL.
pub struct PgCorpus {
    client: Client,
}

impl PgCorpus {
    pub fn connection_config(settings: &PostgresSettings) -> Result<Config> {
        let host = required(settings.host.as_deref(), "DB_HOST")?;
        let dbname = required(settings.dbname.as_deref(), "DB_NAME")?;
        let user = required(settings.user.as_deref(), "DB_USER")?;
        let mut config = Config::new();
        config
            .host(host)
            .port(settings.port.unwrap_or(DEFAULT_PORT))
            .dbname(dbname)
            .user(user)
            .application_name("desi-meme-creator");
        if let Some(password) = settings.password.as_deref() {
            config.password(password);
        }
        Ok(config)
    }

    pub async fn connect(settings: &PostgresSettings) -> Result<Self> {
        let config = Self::connection_config(settings)?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .with_context(|| "Error connecting to database")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("database connection closed: {}", err);
            }
        });
        client
            .batch_execute(CREATE_TABLE_SQL)
            .await
            .with_context(|| "Error initializing database")?;
        info!("connected to PostgreSQL corpus");
        Ok(Self { client })
    }

    pub async fn append(&self, language: LanguageLabel, text: &str) -> Result<()> {
        self.client
            .execute(INSERT_SQL, &[&language.name(), &text])
            .await
            .with_context(|| "Error saving to database")?;
        Ok(())
    }

    pub async fn read_all(&self) -> Result<Vec<CorpusRecord>> {
        let rows = self
            .client
            .query(SELECT_SQL, &[])
            .await
            .with_context(|| "Error retrieving corpus")?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(record) = record_from_row(&row)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn clear(&self) -> Result<()> {
        self.client
            .batch_execute(TRUNCATE_SQL)
            .await
            .with_context(|| "Error clearing database")?;
        Ok(())
    }
}

fn record_from_row(row: &Row) -> Result<Option<CorpusRecord>> {
    let language: Option<String> = row.try_get(0)?;
    let text: Option<String> = row.try_get(1)?;
    let created_at: Option<PrimitiveDateTime> = row.try_get(2)?;
    let (Some(language), Some(text)) = (language, text) else {
        return Ok(None);
    };
    let Some(label) = LanguageLabel::from_name(&language) else {
        warn!("ignoring corpus row with unknown language '{}'", language);
        return Ok(None);
    };
    Ok(Some(CorpusRecord {
        language: label,
        text,
        created_at: created_at.map(PrimitiveDateTime::assume_utc),
    }))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("{} is not set", name))
}
