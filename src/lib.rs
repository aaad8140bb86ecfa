use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use tracing::info;

pub mod classifier;
pub mod corpus;
pub mod fonts;
pub mod gallery;
pub mod languages;
pub mod logging;
mod paths;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod settings;

pub use classifier::{Classification, LanguageClassifier, LanguageDetector};
pub use corpus::{ClearOutcome, CorpusRecord, CorpusStore};
pub use languages::LanguageLabel;
pub use pipeline::{MemeCreator, MemeOutcome, SelectedImage, Session};
pub use render::{RenderedMeme, render_meme};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: Option<String>,
    pub template: Option<String>,
    pub caption: Option<String>,
    pub font_size: Option<u32>,
    pub output: Option<String>,
    pub show_corpus: bool,
    pub clear_corpus: bool,
    pub password: Option<String>,
    pub list_templates: bool,
    pub fetch_fonts: bool,
    pub server: Option<String>,
    pub settings_path: Option<String>,
}

impl Config {
    fn wants_render(&self) -> bool {
        self.caption.is_some() || self.server.is_some()
    }
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let mut lines = Vec::new();

    if config.list_templates {
        let gallery = gallery::Gallery::new(settings.images_dir.clone());
        let templates = gallery.list();
        if templates.is_empty() {
            lines.push(format!("no templates found in {}", gallery.dir().display()));
        }
        for template in templates {
            lines.push(format!("{}\t{}", template.name, template.file));
        }
        if !(config.fetch_fonts
            || config.wants_render()
            || config.show_corpus
            || config.clear_corpus)
        {
            return Ok(lines.join("\n"));
        }
    }

    if config.fetch_fonts || (settings.font_auto_fetch && config.wants_render()) {
        let report = fonts::ensure_fonts(&settings.font_dir(), &settings.font_base_url).await?;
        if config.fetch_fonts {
            lines.push(format!(
                "fonts: {} downloaded, {} already present",
                report.downloaded.len(),
                report.present.len()
            ));
        }
        lines.extend(report.warnings.iter().map(|warning| format!("warning: {}", warning)));
    }

    let needs_store =
        config.wants_render() || config.show_corpus || config.clear_corpus;
    if !needs_store {
        if lines.is_empty() {
            return Err(anyhow!(
                "nothing to do (pass --caption, --show-corpus, --clear-corpus, --list-templates, --fetch-fonts or --server)"
            ));
        }
        return Ok(lines.join("\n"));
    }

    let server_addr = config.server.clone();
    let creator = MemeCreator::from_settings(settings).await?;

    if let Some(addr) = server_addr {
        let addr = if addr.trim().is_empty() {
            creator.settings().server_addr.clone()
        } else {
            addr
        };
        server::run_server(creator, &addr).await?;
        return Ok(lines.join("\n"));
    }

    if config.clear_corpus {
        let password = config
            .password
            .as_deref()
            .ok_or_else(|| anyhow!("--clear-corpus requires --password"))?;
        match creator.clear_corpus(password).await? {
            ClearOutcome::Cleared => lines.push("Database cleared successfully!".to_string()),
            ClearOutcome::Rejected => {
                return Err(anyhow!("Incorrect password. Database not cleared."));
            }
            ClearOutcome::Disabled => {
                return Err(anyhow!(
                    "no admin password configured (set ADMIN_PASSWORD or [admin] password)"
                ));
            }
        }
    }

    if let Some(caption) = config.caption.as_deref() {
        lines.extend(generate_meme(&creator, &config, caption).await?);
    }

    if config.show_corpus {
        lines.push(format_corpus(&creator.corpus().await?));
    }

    Ok(lines.join("\n"))
}

async fn generate_meme(creator: &MemeCreator, config: &Config, caption: &str) -> Result<Vec<String>> {
    let image = match (config.image.as_deref(), config.template.as_deref()) {
        (Some(_), Some(_)) => return Err(anyhow!("--image and --template cannot be used together")),
        (Some(path), None) => Some(SelectedImage::from_path(Path::new(path))?),
        (None, Some(name)) => Some(SelectedImage::from_template(creator.gallery(), name)?),
        (None, None) => None,
    };
    let mut session = Session {
        selected_image: image,
        last_meme: None,
    };
    let font_size = config
        .font_size
        .unwrap_or(creator.settings().font_size_default);

    let outcome = creator.generate(&mut session, caption, font_size).await?;
    let mut lines = vec![format!("language: {}", outcome.language)];
    lines.extend(outcome.warnings.iter().map(|warning| format!("warning: {}", warning)));

    let Some(meme) = outcome.meme else {
        let message = outcome
            .render_error
            .unwrap_or_else(|| "meme was not generated".to_string());
        return Err(anyhow!(message));
    };
    let output = PathBuf::from(config.output.as_deref().unwrap_or("meme.png"));
    std::fs::write(&output, &meme.png)
        .with_context(|| format!("failed to write meme: {}", output.display()))?;
    info!("meme written to {}", output.display());
    lines.push(format!("meme: {} ({}x{})", output.display(), meme.width, meme.height));

    match outcome.storage_error {
        None if outcome.saved => {
            lines.push(format!("Text saved in {} column of the corpus!", outcome.language))
        }
        Some(err) => lines.push(format!("error: Error saving to corpus: {}", err)),
        None => {}
    }
    Ok(lines)
}

fn format_corpus(records: &[CorpusRecord]) -> String {
    if records.is_empty() {
        return "Corpus is empty.".to_string();
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    records
        .iter()
        .map(|record| {
            let created = record
                .created_at
                .and_then(|at| at.format(&format).ok())
                .unwrap_or_else(|| "-".to_string());
            format!("{}\t{}\t{}", created, record.language, record.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
