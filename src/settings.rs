use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    Whatlang,
    Script,
}

impl ClassifierBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "whatlang" => Ok(ClassifierBackend::Whatlang),
            "script" => Ok(ClassifierBackend::Script),
            other => Err(anyhow!(
                "unknown classifier backend '{}' (expected whatlang or script)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Csv,
    Postgres,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(StorageBackend::Csv),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(anyhow!(
                "unknown storage backend '{}' (expected csv or postgres)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgresSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub classifier_backend: ClassifierBackend,
    pub classifier_min_chars: usize,
    pub classifier_min_confidence: f64,
    pub font_size_default: u32,
    pub font_size_min: u32,
    pub font_size_max: u32,
    pub fill_color: String,
    pub outline_color: String,
    pub outline_offset: i32,
    pub bottom_margin: i32,
    pub font_dir: Option<PathBuf>,
    pub font_base_url: String,
    pub font_auto_fetch: bool,
    pub fallback_font_path: Option<PathBuf>,
    pub fallback_font_families: Vec<String>,
    pub storage_backend: StorageBackend,
    pub csv_path: PathBuf,
    pub postgres: PostgresSettings,
    pub admin_password: Option<String>,
    pub images_dir: PathBuf,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            classifier_backend: ClassifierBackend::Whatlang,
            classifier_min_chars: 5,
            classifier_min_confidence: 0.0,
            font_size_default: 50,
            font_size_min: 20,
            font_size_max: 100,
            fill_color: "#ffffff".to_string(),
            outline_color: "#000000".to_string(),
            outline_offset: 2,
            bottom_margin: 10,
            font_dir: None,
            font_base_url: crate::fonts::DEFAULT_FONT_BASE_URL.to_string(),
            font_auto_fetch: true,
            fallback_font_path: None,
            fallback_font_families: vec!["Noto Sans".to_string(), "sans-serif".to_string()],
            storage_backend: StorageBackend::Csv,
            csv_path: PathBuf::from("meme_corpus.csv"),
            postgres: PostgresSettings::default(),
            admin_password: None,
            images_dir: PathBuf::from("images"),
            server_addr: "127.0.0.1:8501".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    classifier: Option<ClassifierSettings>,
    render: Option<RenderSettings>,
    fonts: Option<FontSettings>,
    storage: Option<StorageSettings>,
    admin: Option<AdminSettings>,
    gallery: Option<GallerySettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierSettings {
    backend: Option<String>,
    min_chars: Option<usize>,
    min_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    font_size: Option<u32>,
    font_size_min: Option<u32>,
    font_size_max: Option<u32>,
    fill_color: Option<String>,
    outline_color: Option<String>,
    outline_offset: Option<i32>,
    bottom_margin: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    dir: Option<String>,
    base_url: Option<String>,
    auto_fetch: Option<bool>,
    fallback_path: Option<String>,
    fallback_families: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSettings {
    backend: Option<String>,
    csv_path: Option<String>,
    postgres: Option<PostgresFileSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PostgresFileSettings {
    host: Option<String>,
    port: Option<u16>,
    dbname: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminSettings {
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GallerySettings {
    images_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

/// Loads defaults, then every settings file that exists (later files win),
/// then environment overrides.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = paths::base_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

impl Settings {
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    /// Applies `DB_*`, `ADMIN_PASSWORD` and `DESI_MEME_STORAGE` overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(backend) = get("DESI_MEME_STORAGE") {
            self.storage_backend = StorageBackend::parse(&backend)?;
        }
        if let Some(host) = get("DB_HOST") {
            self.postgres.host = Some(host);
        }
        if let Some(port) = get("DB_PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid DB_PORT '{}'", port))?;
            self.postgres.port = Some(port);
        }
        if let Some(name) = get("DB_NAME") {
            self.postgres.dbname = Some(name);
        }
        if let Some(user) = get("DB_USER") {
            self.postgres.user = Some(user);
        }
        if let Some(password) = get("DB_PASSWORD") {
            self.postgres.password = Some(password);
        }
        if let Some(password) = get("ADMIN_PASSWORD") {
            self.admin_password = Some(password);
        }
        Ok(())
    }

    pub fn font_dir(&self) -> PathBuf {
        self.font_dir.clone().unwrap_or_else(paths::font_dir)
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(classifier) = incoming.classifier {
            if let Some(backend) = classifier.backend {
                self.classifier_backend = ClassifierBackend::parse(&backend)?;
            }
            if let Some(min_chars) = classifier.min_chars {
                self.classifier_min_chars = min_chars;
            }
            if let Some(confidence) = classifier.min_confidence {
                self.classifier_min_confidence = confidence;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(size) = render.font_size {
                if size > 0 {
                    self.font_size_default = size;
                }
            }
            if let Some(size) = render.font_size_min {
                self.font_size_min = size;
            }
            if let Some(size) = render.font_size_max {
                self.font_size_max = size;
            }
            if let Some(color) = render.fill_color {
                if !color.trim().is_empty() {
                    self.fill_color = color;
                }
            }
            if let Some(color) = render.outline_color {
                if !color.trim().is_empty() {
                    self.outline_color = color;
                }
            }
            if let Some(offset) = render.outline_offset {
                self.outline_offset = offset;
            }
            if let Some(margin) = render.bottom_margin {
                self.bottom_margin = margin;
            }
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(dir) = non_blank(fonts.dir) {
                self.font_dir = Some(paths::expand_path(&dir));
            }
            if let Some(url) = non_blank(fonts.base_url) {
                self.font_base_url = url;
            }
            if let Some(auto_fetch) = fonts.auto_fetch {
                self.font_auto_fetch = auto_fetch;
            }
            if let Some(path) = non_blank(fonts.fallback_path) {
                self.fallback_font_path = Some(paths::expand_path(&path));
            }
            if let Some(families) = fonts.fallback_families {
                self.fallback_font_families = families;
            }
        }
        if let Some(storage) = incoming.storage {
            if let Some(backend) = storage.backend {
                self.storage_backend = StorageBackend::parse(&backend)?;
            }
            if let Some(path) = non_blank(storage.csv_path) {
                self.csv_path = paths::expand_path(&path);
            }
            if let Some(pg) = storage.postgres {
                if let Some(host) = non_blank(pg.host) {
                    self.postgres.host = Some(host);
                }
                if let Some(port) = pg.port {
                    self.postgres.port = Some(port);
                }
                if let Some(dbname) = non_blank(pg.dbname) {
                    self.postgres.dbname = Some(dbname);
                }
                if let Some(user) = non_blank(pg.user) {
                    self.postgres.user = Some(user);
                }
                if let Some(password) = non_blank(pg.password) {
                    self.postgres.password = Some(password);
                }
            }
        }
        if let Some(admin) = incoming.admin {
            if let Some(password) = non_blank(admin.password) {
                self.admin_password = Some(password);
            }
        }
        if let Some(gallery) = incoming.gallery {
            if let Some(dir) = non_blank(gallery.images_dir) {
                self.images_dir = paths::expand_path(&dir);
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_blank(server.addr) {
                self.server_addr = addr;
            }
        }
        if self.font_size_min > self.font_size_max {
            return Err(anyhow!(
                "render.font_size_min ({}) exceeds render.font_size_max ({})",
                self.font_size_min,
                self.font_size_max
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
