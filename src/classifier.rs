use anyhow::{Result, anyhow};
use tracing::{debug, warn};
use whatlang::{Detector, Lang};

use crate::languages::LanguageLabel;
use crate::settings::{ClassifierBackend, Settings};

/// Raw output of a detection backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub code: String,
    pub confidence: f64,
}

/// A third-party (or built-in) text language detector.
pub trait LanguageDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when the backend has no opinion on the text.
    fn detect(&self, text: &str) -> Result<Option<Detection>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: LanguageLabel,
    pub warning: Option<String>,
}

impl Classification {
    fn clean(label: LanguageLabel) -> Self {
        Self {
            label,
            warning: None,
        }
    }
}

pub struct LanguageClassifier {
    detector: Box<dyn LanguageDetector>,
    min_chars: usize,
    min_confidence: f64,
}

impl LanguageClassifier {
    pub fn new(detector: Box<dyn LanguageDetector>, min_chars: usize, min_confidence: f64) -> Self {
        Self {
            detector,
            min_chars,
            min_confidence,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let detector: Box<dyn LanguageDetector> = match settings.classifier_backend {
            ClassifierBackend::Whatlang => Box::new(WhatlangDetector::new()),
            ClassifierBackend::Script => Box::new(ScriptDetector),
        };
        Self::new(
            detector,
            settings.classifier_min_chars,
            settings.classifier_min_confidence,
        )
    }

    pub fn backend_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Short captions are always English; failures and results below
    /// `min_confidence` are `Unknown`, with a warning for failures.
    pub fn classify(&self, text: &str) -> Classification {
        if text.trim().chars().count() < self.min_chars {
            return Classification::clean(LanguageLabel::English);
        }
        match self.detector.detect(text) {
            Ok(Some(detection)) => {
                debug!(
                    backend = self.detector.name(),
                    code = %detection.code,
                    confidence = detection.confidence,
                    "language detected"
                );
                if detection.confidence < self.min_confidence {
                    return Classification::clean(LanguageLabel::Unknown);
                }
                Classification::clean(LanguageLabel::from_code(&detection.code))
            }
            Ok(None) => {
                let message = format!(
                    "Error detecting language: {} could not identify the caption",
                    self.detector.name()
                );
                warn!("{}", message);
                Classification {
                    label: LanguageLabel::Unknown,
                    warning: Some(message),
                }
            }
            Err(err) => {
                let message = format!("Error detecting language: {}", err);
                warn!("{}", message);
                Classification {
                    label: LanguageLabel::Unknown,
                    warning: Some(message),
                }
            }
        }
    }
}

const WHATLANG_ALLOWLIST: [Lang; 12] = [
    Lang::Eng,
    Lang::Hin,
    Lang::Tam,
    Lang::Tel,
    Lang::Ben,
    Lang::Mar,
    Lang::Guj,
    Lang::Kan,
    Lang::Mal,
    Lang::Pan,
    Lang::Urd,
    Lang::Ori,
];

/// Trigram classifier from the `whatlang` crate, limited to the languages
/// the corpus tracks so close neighbours (Nepali, Persian) cannot win.
/// Scripts whatlang does not know (Ol Chiki) go to the script detector.
pub struct WhatlangDetector {
    detector: Detector,
    fallback: ScriptDetector,
}

impl WhatlangDetector {
    pub fn new() -> Self {
        Self {
            detector: Detector::with_allowlist(WHATLANG_ALLOWLIST.to_vec()),
            fallback: ScriptDetector,
        }
    }
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for WhatlangDetector {
    fn name(&self) -> &'static str {
        "whatlang"
    }

    fn detect(&self, text: &str) -> Result<Option<Detection>> {
        match self.detector.detect(text) {
            Some(info) => Ok(Some(Detection {
                code: info.lang().code().to_string(),
                confidence: info.confidence(),
            })),
            None => {
                debug!("whatlang has no opinion, using script detector");
                self.fallback.detect(text)
            }
        }
    }
}

/// Picks the language whose script covers most of the letters.
pub struct ScriptDetector;

impl LanguageDetector for ScriptDetector {
    fn name(&self) -> &'static str {
        "script"
    }

    fn detect(&self, text: &str) -> Result<Option<Detection>> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        let mut letters = 0usize;
        for ch in text.chars() {
            let Some(code) = script_code(ch) else {
                continue;
            };
            letters += 1;
            match counts.iter_mut().find(|(known, _)| *known == code) {
                Some((_, count)) => *count += 1,
                None => counts.push((code, 1)),
            }
        }
        if letters == 0 {
            return Err(anyhow!("no letters found in text"));
        }
        // First-seen script wins ties.
        let mut best: Option<(&'static str, usize)> = None;
        for (code, count) in counts {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((code, count));
            }
        }
        Ok(best.map(|(code, count)| Detection {
            code: code.to_string(),
            confidence: count as f64 / letters as f64,
        }))
    }
}

fn script_code(ch: char) -> Option<&'static str> {
    let code = match ch as u32 {
        0x0900..=0x097F | 0xA8E0..=0xA8FF => "hi",
        0x0980..=0x09FF => "bn",
        0x0A00..=0x0A7F => "pa",
        0x0A80..=0x0AFF => "gu",
        0x0B00..=0x0B7F => "or",
        0x0B80..=0x0BFF => "ta",
        0x0C00..=0x0C7F => "te",
        0x0C80..=0x0CFF => "kn",
        0x0D00..=0x0D7F => "ml",
        0x0600..=0x06FF | 0x0750..=0x077F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => "ur",
        0x1C50..=0x1C7F => "sat",
        _ if ch.is_ascii_alphabetic() => "en",
        0x00C0..=0x024F if ch.is_alphabetic() => "en",
        _ => return None,
    };
    Some(code)
}
