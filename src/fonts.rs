use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use crate::languages::LanguageLabel;
use crate::settings::Settings;

pub const DEFAULT_FONT_BASE_URL: &str =
    "https://github.com/googlefonts/noto-fonts/raw/main/hinted/ttf";

pub const GENERIC_FONT_FILE: &str = "NotoSans-Regular.ttf";

/// Every script family the corpus languages need, one file each.
pub const FONT_FILES: [&str; 12] = [
    "NotoSansDevanagari-Regular.ttf",
    "NotoSansTamil-Regular.ttf",
    "NotoSansTelugu-Regular.ttf",
    "NotoSansBengali-Regular.ttf",
    "NotoSansOriya-Regular.ttf",
    "NotoSansGujarati-Regular.ttf",
    "NotoSansKannada-Regular.ttf",
    "NotoSansMalayalam-Regular.ttf",
    "NotoSansGurmukhi-Regular.ttf",
    "NotoSansArabic-Regular.ttf",
    "NotoSansOlChiki-Regular.ttf",
    GENERIC_FONT_FILE,
];

pub fn font_file_for(label: LanguageLabel) -> &'static str {
    match label {
        LanguageLabel::Hindi | LanguageLabel::Marathi => "NotoSansDevanagari-Regular.ttf",
        LanguageLabel::Tamil => "NotoSansTamil-Regular.ttf",
        LanguageLabel::Telugu => "NotoSansTelugu-Regular.ttf",
        LanguageLabel::Bengali | LanguageLabel::Assamese => "NotoSansBengali-Regular.ttf",
        LanguageLabel::Odia => "NotoSansOriya-Regular.ttf",
        LanguageLabel::Gujarati => "NotoSansGujarati-Regular.ttf",
        LanguageLabel::Kannada => "NotoSansKannada-Regular.ttf",
        LanguageLabel::Malayalam => "NotoSansMalayalam-Regular.ttf",
        LanguageLabel::Punjabi => "NotoSansGurmukhi-Regular.ttf",
        LanguageLabel::Urdu => "NotoSansArabic-Regular.ttf",
        LanguageLabel::Santali => "NotoSansOlChiki-Regular.ttf",
        LanguageLabel::English | LanguageLabel::Unknown => GENERIC_FONT_FILE,
    }
}

/// `NotoSansTamil-Regular.ttf` lives under `<base>/NotoSansTamil/`.
pub fn font_url(base_url: &str, file: &str) -> String {
    let family_dir = file.split('-').next().unwrap_or(file);
    format!("{}/{}/{}", base_url.trim_end_matches('/'), family_dir, file)
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn ascender_px(&self, font_size: f32) -> f32 {
        self.ascender as f32 * font_size / self.units_per_em.max(1) as f32
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("bytes", &self.data.len())
            .finish()
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Font chosen for one render, plus the warning raised if it is a substitute.
#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub metrics: Option<FontMetrics>,
    pub family: String,
    pub warning: Option<String>,
}

/// Script fonts on disk plus the fallback chain used when one is unreadable.
pub struct FontLibrary {
    dir: PathBuf,
    fallback_path: Option<PathBuf>,
    fallback_families: Vec<String>,
    system_fallback: OnceLock<Option<FontMetrics>>,
}

impl FontLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback_path: None,
            fallback_families: vec!["sans-serif".to_string()],
            system_fallback: OnceLock::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dir: settings.font_dir(),
            fallback_path: settings.fallback_font_path.clone(),
            fallback_families: settings.fallback_font_families.clone(),
            system_fallback: OnceLock::new(),
        }
    }

    pub fn with_fallback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, label: LanguageLabel) -> PathBuf {
        self.dir.join(font_file_for(label))
    }

    pub fn resolve(&self, label: LanguageLabel) -> ResolvedFont {
        let file = font_file_for(label);
        let path = self.dir.join(file);
        match load_font_metrics(&path) {
            Ok(metrics) => {
                debug!(font = %path.display(), "loaded script font");
                let family = metrics.family().unwrap_or("sans-serif").to_string();
                ResolvedFont {
                    metrics: Some(metrics),
                    family,
                    warning: None,
                }
            }
            Err(err) => {
                let warning = format!(
                    "Font {} not found ({}). Using default font (may not support Indian scripts well).",
                    file, err
                );
                warn!("{}", warning);
                let metrics = self.fallback_metrics();
                let family = metrics
                    .as_ref()
                    .and_then(|m| m.family())
                    .unwrap_or("sans-serif")
                    .to_string();
                ResolvedFont {
                    metrics,
                    family,
                    warning: Some(warning),
                }
            }
        }
    }

    fn fallback_metrics(&self) -> Option<FontMetrics> {
        if let Some(path) = self.fallback_path.as_deref() {
            match load_font_metrics(path) {
                Ok(metrics) => return Some(metrics),
                Err(err) => warn!("fallback font unusable: {}", err),
            }
        }
        self.system_fallback
            .get_or_init(|| {
                let mut db = fontdb::Database::new();
                db.load_system_fonts();
                for family in &self.fallback_families {
                    if let Ok(metrics) = load_font_metrics_from_family(&db, family) {
                        return Some(metrics);
                    }
                }
                warn!("no system fallback font found");
                None
            })
            .clone()
    }
}

/// Sum of glyph advances in pixels. Indic vowel signs and viramas add no
/// width; characters the face lacks count as a space.
pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    let Some(font) = font else {
        return estimate_text_width_units(text) * font_size;
    };
    let Ok(face) = Face::parse(&font.data, font.face_index) else {
        return estimate_text_width_units(text) * font_size;
    };
    let units = text
        .chars()
        .filter(|ch| *ch != '\n' && !is_combining_mark(*ch))
        .map(|ch| {
            let advance = match ch {
                ' ' => None,
                _ => face
                    .glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph)),
            };
            advance.unwrap_or(font.space_advance) as u32
        })
        .fold(0u32, u32::saturating_add);
    units as f32 * font_size / font.units_per_em.max(1) as f32
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.6
    } else if ch.is_ascii() {
        0.35
    } else if is_combining_mark(ch) {
        0.0
    } else {
        0.7
    }
}

// Indic vowel signs and viramas sit on the previous consonant.
fn is_combining_mark(ch: char) -> bool {
    let cp = ch as u32;
    if !(0x0900..=0x0DFF).contains(&cp) {
        return false;
    }
    matches!(cp & 0x7F, 0x00..=0x03 | 0x3A..=0x4D | 0x51..=0x57 | 0x62..=0x63)
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(&data, Some(family))
}

// Typographic family ("Noto Sans") beats the legacy family name.
fn extract_family_name(face: &Face<'_>) -> Option<String> {
    [name_id::TYPOGRAPHIC_FAMILY, name_id::FAMILY]
        .into_iter()
        .find_map(|wanted| {
            face.names()
                .into_iter()
                .filter(|name| name.name_id == wanted)
                .find_map(|name| name.to_string())
        })
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: Vec<String>,
    pub present: Vec<String>,
    pub warnings: Vec<String>,
}

/// Downloads every missing script font into `dir`. Files already on disk are
/// left alone; a failed download becomes a warning, not an error.
pub async fn ensure_fonts(dir: &Path, base_url: &str) -> Result<FetchReport> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create font dir: {}", dir.display()))?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .with_context(|| "failed to build http client")?;

    let mut report = FetchReport::default();
    for file in FONT_FILES {
        let dest = dir.join(file);
        if dest.exists() {
            report.present.push(file.to_string());
            continue;
        }
        let url = font_url(base_url, file);
        info!("downloading font {} from {}", file, url);
        match download_font(&client, &url, &dest).await {
            Ok(()) => report.downloaded.push(file.to_string()),
            Err(err) => {
                let warning = format!(
                    "Error downloading font {}: {:#}. Using default font.",
                    file, err
                );
                warn!("{}", warning);
                report.warnings.push(warning);
            }
        }
    }
    Ok(report)
}

async fn download_font(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to download font: {}", url))?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "failed to download font: {} (status {})",
            url,
            response.status()
        ));
    }

    let tmp = dest.with_extension("ttf.part");
    let mut file = fs::File::create(&tmp)
        .with_context(|| format!("failed to write font: {}", tmp.display()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| "failed to read font bytes")?;
        std::io::Write::write_all(&mut file, &chunk)?;
    }
    fs::rename(&tmp, dest)
        .with_context(|| format!("failed to finalize font: {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shared_scripts_share_font_files() {
        assert_eq!(
            font_file_for(LanguageLabel::Hindi),
            font_file_for(LanguageLabel::Marathi)
        );
        assert_eq!(
            font_file_for(LanguageLabel::Bengali),
            font_file_for(LanguageLabel::Assamese)
        );
        assert_eq!(font_file_for(LanguageLabel::Unknown), GENERIC_FONT_FILE);
        for label in LanguageLabel::ALL {
            assert!(FONT_FILES.contains(&font_file_for(label)));
        }
    }

    #[test]
    fn font_url_uses_family_directory() {
        assert_eq!(
            font_url("https://example.test/ttf/", "NotoSansOlChiki-Regular.ttf"),
            "https://example.test/ttf/NotoSansOlChiki/NotoSansOlChiki-Regular.ttf"
        );
    }

    #[test]
    fn unreadable_font_falls_back_with_warning() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("NotoSansTamil-Regular.ttf"), b"not a font").unwrap();
        let library = FontLibrary::new(dir.path());
        let resolved = library.resolve(LanguageLabel::Tamil);
        let warning = resolved.warning.expect("warning");
        assert!(warning.contains("NotoSansTamil-Regular.ttf"));
        assert!(!resolved.family.is_empty());
    }

    #[test]
    fn estimated_width_ignores_vowel_signs() {
        let with_sign = estimate_text_width_units("कि");
        let bare = estimate_text_width_units("क");
        assert_eq!(with_sign, bare);
        assert!(measure_text_width_px("ABC", 10.0, None) > 0.0);
    }

    #[test]
    fn measured_width_ignores_vowel_signs() {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let Ok(metrics) = load_font_metrics_from_family(&db, "sans-serif") else {
            return;
        };
        let with_sign = measure_text_width_px("कि", 40.0, Some(&metrics));
        let bare = measure_text_width_px("क", 40.0, Some(&metrics));
        assert_eq!(with_sign, bare);
        assert!(measure_text_width_px("AB", 40.0, Some(&metrics)) > 0.0);
    }

    #[tokio::test]
    async fn ensure_fonts_skips_files_already_present() {
        let dir = tempdir().expect("tempdir");
        for file in FONT_FILES {
            fs::write(dir.path().join(file), b"cached").unwrap();
        }
        // Unroutable base URL: any download attempt would produce a warning.
        let report = ensure_fonts(dir.path(), "http://127.0.0.1:9").await.unwrap();
        assert_eq!(report.present.len(), FONT_FILES.len());
        assert!(report.downloaded.is_empty());
        assert!(report.warnings.is_empty());
    }
}
