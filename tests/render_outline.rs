use desi_meme_creator::fonts::FontLibrary;
use desi_meme_creator::languages::LanguageLabel;
use desi_meme_creator::render::{MemeStyle, render_meme};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use usvg::fontdb;

const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);

fn copy_system_font(dir: &Path) -> Option<PathBuf> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let id = db.query(&fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    })?;
    let data = db.with_face_data(id, |data, _index| data.to_vec())?;
    let path = dir.join("fallback.ttf");
    std::fs::write(&path, data).ok()?;
    Some(path)
}

#[test]
fn caption_is_white_with_black_outline_near_the_bottom() {
    // Needs at least one installed font to draw glyphs.
    let dir = tempfile::tempdir().unwrap();
    let Some(font_file) = copy_system_font(dir.path()) else {
        return;
    };
    let fonts = FontLibrary::new(dir.path()).with_fallback_path(font_file);

    let mut source = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 160, BACKGROUND))
        .write_to(&mut Cursor::new(&mut source), ImageFormat::Png)
        .unwrap();

    let meme = render_meme(
        &source,
        "hello world",
        40,
        LanguageLabel::English,
        &fonts,
        &MemeStyle::default(),
    )
    .unwrap();
    let rendered = image::load_from_memory(&meme.png).unwrap().to_rgb8();

    // Caption box spans y = 160 - 40 - 10 .. 160 - 10, plus outline slack.
    let band = 108..152;
    let mut white = 0;
    let mut black = 0;
    for (_, y, pixel) in rendered.enumerate_pixels() {
        if !band.contains(&y) {
            continue;
        }
        match pixel.0 {
            [255, 255, 255] => white += 1,
            [0, 0, 0] => black += 1,
            _ => {}
        }
    }
    assert!(white > 0, "no fill pixels");
    assert!(black > 0, "no outline pixels");

    for x in 0..rendered.width() {
        assert_eq!(rendered.get_pixel(x, 0), &BACKGROUND);
    }
}
