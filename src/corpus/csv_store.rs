use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::CorpusRecord;
use crate::languages::LanguageLabel;

/// Wide CSV table: one column per language, one caption per row.
pub struct CsvCorpus {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct CsvTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn column_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.columns.iter().position(|column| column == name) {
            return index;
        }
        self.columns.push(name.to_string());
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        width - 1
    }
}

impl CsvCorpus {
    /// Creates the file with a single `Unknown` column when it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let corpus = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        if !corpus.path.exists() {
            let table = CsvTable {
                columns: vec![LanguageLabel::Unknown.name().to_string()],
                rows: Vec::new(),
            };
            corpus
                .save(&table)
                .with_context(|| "Error creating CSV file")?;
        }
        Ok(corpus)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, language: LanguageLabel, text: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut table = self.load()?;
        let index = table.column_index(language.name());
        let mut row = vec![String::new(); table.columns.len()];
        row[index] = text.to_string();
        table.rows.push(row);
        self.save(&table)
            .with_context(|| "Error saving to CSV")?;
        debug!(language = %language, path = %self.path.display(), "caption appended");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<CorpusRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let table = self.load()?;
        let labels: Vec<Option<LanguageLabel>> = table
            .columns
            .iter()
            .map(|column| {
                let label = LanguageLabel::from_name(column);
                if label.is_none() && !column.trim().is_empty() {
                    warn!("ignoring corpus column '{}': not a known language", column);
                }
                label
            })
            .collect();

        let mut records = Vec::new();
        for row in &table.rows {
            for (cell, label) in row.iter().zip(&labels) {
                let Some(label) = label else {
                    continue;
                };
                if cell.is_empty() {
                    continue;
                }
                records.push(CorpusRecord {
                    language: *label,
                    text: cell.clone(),
                    created_at: None,
                });
            }
        }
        records.reverse();
        Ok(records)
    }

    /// Truncates the file to a table with no columns.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save(&CsvTable::default())
    }

    fn load(&self) -> Result<CsvTable> {
        if !self.path.exists() {
            return Ok(CsvTable::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read corpus: {}", self.path.display()))?;
        parse_table(&content)
            .with_context(|| format!("failed to parse corpus: {}", self.path.display()))
    }

    fn save(&self, table: &CsvTable) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create corpus dir: {}", dir.display()))?;
        let mut file = tempfile::Builder::new()
            .prefix(".meme-corpus-")
            .suffix(".csv")
            .tempfile_in(&dir)?;
        file.write_all(render_table(table)?.as_bytes())?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write corpus: {}", self.path.display()))?;
        Ok(())
    }
}

fn parse_table(content: &str) -> Result<CsvTable> {
    if content.trim().is_empty() {
        return Ok(CsvTable::default());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|value| value.to_string())
        .collect();
    if columns.iter().all(|column| column.trim().is_empty()) {
        return Ok(CsvTable::default());
    }
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|value| value.to_string()).collect();
        row.resize(columns.len(), String::new());
        rows.push(row);
    }
    Ok(CsvTable { columns, rows })
}

fn render_table(table: &CsvTable) -> Result<String> {
    if table.columns.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_unknown_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("meme_corpus.csv");
        let corpus = CsvCorpus::open(&path).unwrap();
        assert_eq!(fs::read_to_string(corpus.path()).unwrap(), "Unknown\n");
        assert!(corpus.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_grows_record_set_by_one() {
        let dir = tempdir().unwrap();
        let corpus = CsvCorpus::open(dir.path().join("corpus.csv")).unwrap();
        corpus.append(LanguageLabel::English, "hiii").unwrap();
        let before = corpus.read_all().unwrap().len();
        corpus.append(LanguageLabel::Hindi, "मजेदार मीम").unwrap();
        let records = corpus.read_all().unwrap();
        assert_eq!(records.len(), before + 1);
        assert_eq!(records[0].language, LanguageLabel::Hindi);
        assert_eq!(records[0].text, "मजेदार मीम");
        assert_eq!(records[1].language, LanguageLabel::English);
    }

    #[test]
    fn tolerates_files_without_columns() {
        let dir = tempdir().unwrap();
        for content in ["", "\n", "\"\"\n"] {
            let path = dir.path().join("empty.csv");
            fs::write(&path, content).unwrap();
            let corpus = CsvCorpus::open(&path).unwrap();
            assert!(corpus.read_all().unwrap().is_empty());
            corpus.append(LanguageLabel::Telugu, "తమాషా మీమ్").unwrap();
            assert_eq!(
                fs::read_to_string(&path).unwrap(),
                "Telugu\nతమాషా మీమ్\n"
            );
        }
    }

    #[test]
    fn captions_with_separators_survive() {
        let dir = tempdir().unwrap();
        let corpus = CsvCorpus::open(dir.path().join("corpus.csv")).unwrap();
        corpus
            .append(LanguageLabel::English, "one, \"two\"\nthree")
            .unwrap();
        let records = corpus.read_all().unwrap();
        assert_eq!(records[0].text, "one, \"two\"\nthree");
    }

    #[test]
    fn skips_columns_that_are_not_languages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        fs::write(&path, "Notes,Tamil\nremember this,\n,நகைச்சுவை\n").unwrap();
        let corpus = CsvCorpus::open(&path).unwrap();
        let records = corpus.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].language, LanguageLabel::Tamil);
    }

    #[test]
    fn clear_leaves_an_empty_table() {
        let dir = tempdir().unwrap();
        let corpus = CsvCorpus::open(dir.path().join("corpus.csv")).unwrap();
        corpus.append(LanguageLabel::Urdu, "مزاحیہ میم").unwrap();
        corpus.clear().unwrap();
        assert!(corpus.read_all().unwrap().is_empty());
        corpus.append(LanguageLabel::Urdu, "مزاحیہ میم").unwrap();
        assert_eq!(corpus.read_all().unwrap().len(), 1);
    }
}
