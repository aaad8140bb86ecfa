use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, RgbImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::debug;
use usvg::{Options, Tree, fontdb};

use crate::fonts::{FontLibrary, ResolvedFont, measure_text_width_px};
use crate::languages::LanguageLabel;
use crate::settings::Settings;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemeStyle {
    pub fill_color: String,
    pub outline_color: String,
    pub outline_offset: i32,
    pub bottom_margin: i32,
}

impl Default for MemeStyle {
    fn default() -> Self {
        Self {
            fill_color: "#ffffff".to_string(),
            outline_color: "#000000".to_string(),
            outline_offset: 2,
            bottom_margin: 10,
        }
    }
}

impl MemeStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fill_color: settings.fill_color.clone(),
            outline_color: settings.outline_color.clone(),
            outline_offset: settings.outline_offset,
            bottom_margin: settings.bottom_margin,
        }
    }
}

/// An encoded meme, held in memory only.
#[derive(Debug, Clone)]
pub struct RenderedMeme {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub language: LanguageLabel,
    pub warnings: Vec<String>,
}

/// Top-left corner of the caption: centred horizontally (floored), and
/// `font_size + margin` above the bottom edge.
pub fn text_placement(
    image_width: u32,
    image_height: u32,
    text_width: f32,
    font_size: u32,
    bottom_margin: i32,
) -> (f32, f32) {
    let x = ((image_width as f32 - text_width) / 2.0).floor();
    let y = image_height as f32 - font_size as f32 - bottom_margin as f32;
    (x, y)
}

/// The eight neighbours of the origin at distance `offset`, row by row.
pub fn outline_offsets(offset: i32) -> Vec<(i32, i32)> {
    let mut offsets = Vec::with_capacity(8);
    for dx in [-offset, 0, offset] {
        for dy in [-offset, 0, offset] {
            if dx != 0 || dy != 0 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

pub fn render_meme(
    image_bytes: &[u8],
    caption: &str,
    font_size: u32,
    language: LanguageLabel,
    fonts: &FontLibrary,
    style: &MemeStyle,
) -> Result<RenderedMeme> {
    let decoded = image::load_from_memory(image_bytes).with_context(|| "failed to decode image")?;
    if decoded.color().has_alpha() {
        debug!("flattening alpha channel");
    }
    let mut canvas: RgbImage = decoded.to_rgb8();
    let (width, height) = canvas.dimensions();

    let font = fonts.resolve(language);
    let text = caption.to_uppercase();
    let text_width = measure_text_width_px(&text, font_size as f32, font.metrics.as_ref());
    let (x, y) = text_placement(width, height, text_width, font_size, style.bottom_margin);
    debug!(
        width,
        height,
        text_width,
        x,
        y,
        family = %font.family,
        "placing caption"
    );

    let svg = caption_svg(&text, width, height, x, y, font_size, &font, style);
    let layer = rasterize_svg(&svg, width, height, &font)?;
    composite_over(&mut canvas, &layer);

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .with_context(|| "failed to encode meme as PNG")?;

    Ok(RenderedMeme {
        png,
        width,
        height,
        language,
        warnings: font.warning.into_iter().collect(),
    })
}

#[allow(clippy::too_many_arguments)]
fn caption_svg(
    text: &str,
    width: u32,
    height: u32,
    x: f32,
    y: f32,
    font_size: u32,
    font: &ResolvedFont,
    style: &MemeStyle,
) -> String {
    let ascent = font
        .metrics
        .as_ref()
        .map(|metrics| metrics.ascender_px(font_size as f32))
        .unwrap_or(font_size as f32 * 0.8);
    let baseline = y + ascent;
    let escaped = escape_xml(text);
    let family = escape_xml(&font.family);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    let mut push_text = |dx: i32, dy: i32, color: &str| {
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{color}" xml:space="preserve">{text}</text>"#,
            x = x + dx as f32,
            y = baseline + dy as f32,
            size = font_size,
            family = family,
            color = escape_xml(color),
            text = escaped
        ));
    };
    for (dx, dy) in outline_offsets(style.outline_offset) {
        push_text(dx, dy, &style.outline_color);
    }
    push_text(0, 0, &style.fill_color);
    svg.push_str("</svg>");
    svg
}

fn rasterize_svg(svg: &str, width: u32, height: u32, font: &ResolvedFont) -> Result<Pixmap> {
    let mut db = fontdb::Database::new();
    match font.metrics.as_ref() {
        Some(metrics) => db.load_font_data(metrics.data().to_vec()),
        None => db.load_system_fonts(),
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse caption SVG")?;
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("image has no pixels"))?;
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    Ok(pixmap)
}

// Pixmap data is premultiplied RGBA, so "over" is src + dst * (1 - a).
fn composite_over(canvas: &mut RgbImage, layer: &Pixmap) {
    for (dst, src) in canvas.pixels_mut().zip(layer.data().chunks_exact(4)) {
        let alpha = src[3] as u32;
        if alpha == 0 {
            continue;
        }
        for channel in 0..3 {
            let under = dst.0[channel] as u32 * (255 - alpha);
            let value = src[channel] as u32 + (under + 127) / 255;
            dst.0[channel] = value.min(255) as u8;
        }
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
