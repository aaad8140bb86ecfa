use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Human-readable language of a caption, drawn from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageLabel {
    English,
    Hindi,
    Tamil,
    Telugu,
    Bengali,
    Marathi,
    Gujarati,
    Kannada,
    Malayalam,
    Punjabi,
    Urdu,
    Odia,
    Assamese,
    Santali,
    Unknown,
}

impl LanguageLabel {
    pub const ALL: [LanguageLabel; 15] = [
        LanguageLabel::English,
        LanguageLabel::Hindi,
        LanguageLabel::Tamil,
        LanguageLabel::Telugu,
        LanguageLabel::Bengali,
        LanguageLabel::Marathi,
        LanguageLabel::Gujarati,
        LanguageLabel::Kannada,
        LanguageLabel::Malayalam,
        LanguageLabel::Punjabi,
        LanguageLabel::Urdu,
        LanguageLabel::Odia,
        LanguageLabel::Assamese,
        LanguageLabel::Santali,
        LanguageLabel::Unknown,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LanguageLabel::English => "English",
            LanguageLabel::Hindi => "Hindi",
            LanguageLabel::Tamil => "Tamil",
            LanguageLabel::Telugu => "Telugu",
            LanguageLabel::Bengali => "Bengali",
            LanguageLabel::Marathi => "Marathi",
            LanguageLabel::Gujarati => "Gujarati",
            LanguageLabel::Kannada => "Kannada",
            LanguageLabel::Malayalam => "Malayalam",
            LanguageLabel::Punjabi => "Punjabi",
            LanguageLabel::Urdu => "Urdu",
            LanguageLabel::Odia => "Odia",
            LanguageLabel::Assamese => "Assamese",
            LanguageLabel::Santali => "Santali",
            LanguageLabel::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.name().eq_ignore_ascii_case(name))
    }

    /// Maps a raw classifier code (ISO 639-1 or 639-3) to a label.
    /// Codes outside the table become `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match normalize_code(code).as_str() {
            "en" | "eng" => LanguageLabel::English,
            "hi" | "hin" => LanguageLabel::Hindi,
            "ta" | "tam" => LanguageLabel::Tamil,
            "te" | "tel" => LanguageLabel::Telugu,
            "bn" | "ben" => LanguageLabel::Bengali,
            "mr" | "mar" => LanguageLabel::Marathi,
            "gu" | "guj" => LanguageLabel::Gujarati,
            "kn" | "kan" => LanguageLabel::Kannada,
            "ml" | "mal" => LanguageLabel::Malayalam,
            "pa" | "pan" => LanguageLabel::Punjabi,
            "ur" | "urd" => LanguageLabel::Urdu,
            "or" | "ori" | "ory" => LanguageLabel::Odia,
            "as" | "asm" => LanguageLabel::Assamese,
            "sat" => LanguageLabel::Santali,
            _ => LanguageLabel::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, LanguageLabel::Unknown)
    }
}

impl fmt::Display for LanguageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LanguageLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for LanguageLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LanguageLabel::from_name(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown language '{}'", raw)))
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_both_iso_code_widths() {
        assert_eq!(LanguageLabel::from_code("hi"), LanguageLabel::Hindi);
        assert_eq!(LanguageLabel::from_code("hin"), LanguageLabel::Hindi);
        assert_eq!(LanguageLabel::from_code(" OR "), LanguageLabel::Odia);
        assert_eq!(LanguageLabel::from_code("ori"), LanguageLabel::Odia);
        assert_eq!(LanguageLabel::from_code("sat"), LanguageLabel::Santali);
    }

    #[test]
    fn unmapped_codes_are_unknown() {
        assert_eq!(LanguageLabel::from_code("fr"), LanguageLabel::Unknown);
        assert_eq!(LanguageLabel::from_code("nep"), LanguageLabel::Unknown);
        assert_eq!(LanguageLabel::from_code(""), LanguageLabel::Unknown);
    }

    #[test]
    fn names_round_trip_through_from_name() {
        for label in LanguageLabel::ALL {
            assert_eq!(LanguageLabel::from_name(label.name()), Some(label));
        }
        assert_eq!(LanguageLabel::from_name("tamil"), Some(LanguageLabel::Tamil));
        assert_eq!(LanguageLabel::from_name("Klingon"), None);
    }

    #[test]
    fn serializes_as_display_name() {
        let json = serde_json::to_string(&LanguageLabel::Malayalam).unwrap();
        assert_eq!(json, "\"Malayalam\"");
        let parsed: LanguageLabel = serde_json::from_str("\"Punjabi\"").unwrap();
        assert_eq!(parsed, LanguageLabel::Punjabi);
    }
}
