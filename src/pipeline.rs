use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

use crate::classifier::{Classification, LanguageClassifier};
use crate::corpus::{ClearOutcome, CorpusRecord, CorpusStore};
use crate::fonts::FontLibrary;
use crate::gallery::Gallery;
use crate::languages::LanguageLabel;
use crate::render::{MemeStyle, RenderedMeme, render_meme};
use crate::settings::Settings;

/// Problems with what the user supplied; nothing was classified or stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    MissingImage,
    EmptyCaption,
    FontSizeOutOfRange { size: u32, min: u32, max: u32 },
    UnsupportedImage { mime: String },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::MissingImage | InputError::EmptyCaption => f.write_str(
                "Please upload an image and enter a caption to generate a meme.",
            ),
            InputError::FontSizeOutOfRange { size, min, max } => write!(
                f,
                "font size {} is out of range (expected {}..={})",
                size, min, max
            ),
            InputError::UnsupportedImage { mime } => write!(
                f,
                "unsupported image type {} (expected JPG or PNG)",
                mime
            ),
        }
    }
}

impl std::error::Error for InputError {}

#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    /// Accepts JPEG/PNG bytes. Unrecognised bytes are let through and fail
    /// later as a render error.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        if let Some(kind) = infer::get(&bytes) {
            let mime = kind.mime_type();
            if !matches!(mime, "image/png" | "image/jpeg") {
                return Err(InputError::UnsupportedImage {
                    mime: mime.to_string(),
                }
                .into());
            }
        }
        Ok(Self {
            name: name.into(),
            bytes,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image")
            .to_string();
        Self::from_bytes(name, bytes)
    }

    pub fn from_template(gallery: &Gallery, query: &str) -> Result<Self> {
        let template = gallery.select(query)?;
        let bytes = gallery.read(&template)?;
        Ok(Self {
            name: template.name,
            bytes,
        })
    }
}

/// Per-user state carried between actions.
#[derive(Debug, Default)]
pub struct Session {
    pub selected_image: Option<SelectedImage>,
    pub last_meme: Option<RenderedMeme>,
}

impl Session {
    pub fn with_image(image: SelectedImage) -> Self {
        Self {
            selected_image: Some(image),
            last_meme: None,
        }
    }
}

#[derive(Debug)]
pub struct MemeOutcome {
    pub language: LanguageLabel,
    pub meme: Option<RenderedMeme>,
    pub render_error: Option<String>,
    pub saved: bool,
    pub storage_error: Option<String>,
    pub warnings: Vec<String>,
}

pub struct MemeCreator {
    settings: Settings,
    classifier: LanguageClassifier,
    fonts: FontLibrary,
    style: MemeStyle,
    store: CorpusStore,
    gallery: Gallery,
}

impl MemeCreator {
    pub fn new(
        settings: Settings,
        classifier: LanguageClassifier,
        fonts: FontLibrary,
        store: CorpusStore,
    ) -> Self {
        let style = MemeStyle::from_settings(&settings);
        let gallery = Gallery::new(settings.images_dir.clone());
        Self {
            settings,
            classifier,
            fonts,
            style,
            store,
            gallery,
        }
    }

    /// Opens the configured store; a storage connection failure is returned
    /// before any interaction can happen.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let store = CorpusStore::open(&settings)
            .await
            .with_context(|| "failed to open corpus storage")?;
        let classifier = LanguageClassifier::from_settings(&settings);
        let fonts = FontLibrary::from_settings(&settings);
        info!(
            classifier = classifier.backend_name(),
            storage = store.backend_name(),
            "meme creator ready"
        );
        Ok(Self::new(settings, classifier, fonts, store))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    pub fn classify(&self, caption: &str) -> Classification {
        self.classifier.classify(caption)
    }

    pub fn validate(&self, session: &Session, caption: &str, font_size: u32) -> Result<(), InputError> {
        if session.selected_image.is_none() {
            return Err(InputError::MissingImage);
        }
        if caption.trim().is_empty() {
            return Err(InputError::EmptyCaption);
        }
        let (min, max) = (self.settings.font_size_min, self.settings.font_size_max);
        if font_size < min || font_size > max {
            return Err(InputError::FontSizeOutOfRange {
                size: font_size,
                min,
                max,
            });
        }
        Ok(())
    }

    /// classify -> render -> persist. The caption is stored only when the
    /// meme was rendered; render and storage failures land in the outcome.
    pub async fn generate(
        &self,
        session: &mut Session,
        caption: &str,
        font_size: u32,
    ) -> Result<MemeOutcome> {
        self.validate(session, caption, font_size)?;
        let Some(image) = session.selected_image.as_ref() else {
            return Err(InputError::MissingImage.into());
        };

        let classification = self.classifier.classify(caption);
        let language = classification.label;
        let mut warnings: Vec<String> = classification.warning.into_iter().collect();

        let meme = match render_meme(
            &image.bytes,
            caption,
            font_size,
            language,
            &self.fonts,
            &self.style,
        ) {
            Ok(meme) => meme,
            Err(err) => {
                let message = format!("Error creating meme: {:#}", err);
                error!("{}", message);
                return Ok(MemeOutcome {
                    language,
                    meme: None,
                    render_error: Some(message),
                    saved: false,
                    storage_error: None,
                    warnings,
                });
            }
        };
        warnings.extend(meme.warnings.iter().cloned());

        let (saved, storage_error) = match self.store.append(language, caption).await {
            Ok(()) => {
                info!("Text saved in {} column of the corpus", language);
                (true, None)
            }
            Err(err) => {
                let message = format!("{:#}", err);
                warn!("corpus append failed: {}", message);
                (false, Some(message))
            }
        };

        session.last_meme = Some(meme.clone());
        Ok(MemeOutcome {
            language,
            meme: Some(meme),
            render_error: None,
            saved,
            storage_error,
            warnings,
        })
    }

    pub async fn corpus(&self) -> Result<Vec<CorpusRecord>> {
        self.store.read_all().await
    }

    pub async fn clear_corpus(&self, password: &str) -> Result<ClearOutcome> {
        self.store
            .clear(self.settings.admin_password.as_deref(), password)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ScriptDetector;
    use crate::corpus::CsvCorpus;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::{TempDir, tempdir};

    fn creator(dir: &TempDir) -> MemeCreator {
        let mut settings = Settings::default();
        settings.admin_password = Some("bala".to_string());
        settings.images_dir = dir.path().join("images");
        let store = CorpusStore::Csv(CsvCorpus::open(dir.path().join("corpus.csv")).unwrap());
        let classifier = LanguageClassifier::new(Box::new(ScriptDetector), 5, 0.0);
        let fonts = FontLibrary::new(dir.path().join("fonts"));
        MemeCreator::new(settings, classifier, fonts, store)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 90, 160])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn successful_render_is_persisted() {
        let dir = tempdir().unwrap();
        let creator = creator(&dir);
        let image = SelectedImage::from_bytes("upload.png", png(80, 80)).unwrap();
        let mut session = Session::with_image(image);

        let outcome = creator
            .generate(&mut session, "நகைச்சுவை படம்", 30)
            .await
            .unwrap();
        assert_eq!(outcome.language, LanguageLabel::Tamil);
        assert!(outcome.saved);
        assert!(outcome.render_error.is_none());
        assert!(session.last_meme.is_some());

        let records = creator.corpus().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].language, LanguageLabel::Tamil);
        assert_eq!(records[0].text, "நகைச்சுவை படம்");
    }

    #[tokio::test]
    async fn failed_render_is_not_persisted() {
        let dir = tempdir().unwrap();
        let creator = creator(&dir);
        let image = SelectedImage::from_bytes("broken", b"garbage bytes".to_vec()).unwrap();
        let mut session = Session::with_image(image);

        let outcome = creator
            .generate(&mut session, "hello world", 40)
            .await
            .unwrap();
        assert!(outcome.meme.is_none());
        assert!(outcome.render_error.unwrap().contains("Error creating meme"));
        assert!(!outcome.saved);
        assert!(session.last_meme.is_none());
        assert!(creator.corpus().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_missing_inputs_before_classifying() {
        let dir = tempdir().unwrap();
        let creator = creator(&dir);
        let mut empty = Session::default();
        let err = creator.generate(&mut empty, "caption", 50).await.unwrap_err();
        assert_eq!(err.downcast_ref::<InputError>(), Some(&InputError::MissingImage));

        let mut session =
            Session::with_image(SelectedImage::from_bytes("a.png", png(10, 10)).unwrap());
        let err = creator.generate(&mut session, "   ", 50).await.unwrap_err();
        assert_eq!(err.downcast_ref::<InputError>(), Some(&InputError::EmptyCaption));

        let err = creator.generate(&mut session, "caption", 101).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::FontSizeOutOfRange { size: 101, .. })
        ));
        assert!(creator.corpus().await.unwrap().is_empty());
    }

    #[test]
    fn rejects_non_jpeg_png_uploads() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
        let err = SelectedImage::from_bytes("anim.gif", gif).unwrap_err();
        assert!(err.to_string().contains("image/gif"));
    }

    #[tokio::test]
    async fn clear_uses_configured_password() {
        let dir = tempdir().unwrap();
        let creator = creator(&dir);
        let mut session =
            Session::with_image(SelectedImage::from_bytes("a.png", png(60, 60)).unwrap());
        creator.generate(&mut session, "hiii", 20).await.unwrap();
        assert_eq!(
            creator.clear_corpus("wrong").await.unwrap(),
            ClearOutcome::Rejected
        );
        assert_eq!(creator.corpus().await.unwrap().len(), 1);
        assert_eq!(
            creator.clear_corpus("bala").await.unwrap(),
            ClearOutcome::Cleared
        );
        assert!(creator.corpus().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_selection_reads_gallery_image() {
        let dir = tempdir().unwrap();
        let creator = creator(&dir);
        std::fs::create_dir_all(creator.gallery().dir()).unwrap();
        std::fs::write(creator.gallery().dir().join("meme5.jpg"), png(40, 30)).unwrap();
        let image = SelectedImage::from_template(creator.gallery(), "Meme 5").unwrap();
        assert_eq!(image.name, "Meme 5");
        let mut session = Session::with_image(image);
        let outcome = creator.generate(&mut session, "hiii", 20).await.unwrap();
        let meme = outcome.meme.unwrap();
        assert_eq!((meme.width, meme.height), (40, 30));
        assert_eq!(meme.language, LanguageLabel::English);
    }
}
