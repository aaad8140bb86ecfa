use serde::{Deserialize, Serialize};

use crate::corpus::CorpusRecord;
use crate::gallery::Template;
use crate::languages::LanguageLabel;

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MemeRequest {
    pub caption: String,
    pub image_base64: Option<String>,
    pub image_name: Option<String>,
    pub template: Option<String>,
    pub font_size: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MemeResponse {
    pub language: LanguageLabel,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub saved: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CorpusResponse {
    pub(crate) records: Vec<CorpusRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplatesResponse {
    pub(crate) templates: Vec<Template>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClearRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
