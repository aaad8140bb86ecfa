use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEMPLATE_COUNT: usize = 10;

/// One of the predefined meme backgrounds (`meme1.jpg` .. `meme10.jpg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: String,
    pub file: String,
    #[serde(skip)]
    pub path: PathBuf,
}

pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Templates whose image file exists, in numeric order.
    pub fn list(&self) -> Vec<Template> {
        (1..=TEMPLATE_COUNT)
            .map(|index| self.template(index))
            .filter(|template| template.path.is_file())
            .collect()
    }

    /// Accepts "Meme 3", "3", "meme3" or "meme3.jpg".
    pub fn select(&self, query: &str) -> Result<Template> {
        let index = parse_template_index(query).ok_or_else(|| {
            anyhow!(
                "unknown template '{}' (expected Meme 1 .. Meme {})",
                query.trim(),
                TEMPLATE_COUNT
            )
        })?;
        let template = self.template(index);
        if !template.path.is_file() {
            return Err(anyhow!(
                "template image missing: {}",
                template.path.display()
            ));
        }
        Ok(template)
    }

    pub fn read(&self, template: &Template) -> Result<Vec<u8>> {
        fs::read(&template.path)
            .with_context(|| format!("failed to read template: {}", template.path.display()))
    }

    fn template(&self, index: usize) -> Template {
        let file = format!("meme{}.jpg", index);
        Template {
            name: format!("Meme {}", index),
            path: self.dir.join(&file),
            file,
        }
    }
}

fn parse_template_index(query: &str) -> Option<usize> {
    let lower = query.trim().to_lowercase();
    let stem = lower.strip_suffix(".jpg").unwrap_or(&lower);
    let digits = stem.strip_prefix("meme").unwrap_or(stem).trim();
    let index = digits.parse::<usize>().ok()?;
    (1..=TEMPLATE_COUNT).contains(&index).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_every_naming_style() {
        assert_eq!(parse_template_index("Meme 3"), Some(3));
        assert_eq!(parse_template_index("3"), Some(3));
        assert_eq!(parse_template_index("meme10"), Some(10));
        assert_eq!(parse_template_index("MEME7.JPG"), Some(7));
        assert_eq!(parse_template_index("Meme 11"), None);
        assert_eq!(parse_template_index("0"), None);
        assert_eq!(parse_template_index("cat"), None);
    }

    #[test]
    fn lists_only_existing_templates() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meme2.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("meme10.jpg"), b"jpg").unwrap();
        let gallery = Gallery::new(dir.path());
        let names: Vec<String> = gallery.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Meme 2", "Meme 10"]);
    }

    #[test]
    fn select_reports_missing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meme1.jpg"), b"jpg").unwrap();
        let gallery = Gallery::new(dir.path());
        let template = gallery.select("Meme 1").unwrap();
        assert_eq!(gallery.read(&template).unwrap(), b"jpg");
        assert!(gallery.select("Meme 4").unwrap_err().to_string().contains("missing"));
    }
}
