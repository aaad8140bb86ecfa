use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use desi_meme_creator::classifier::{LanguageClassifier, ScriptDetector};
use desi_meme_creator::corpus::{CorpusStore, CsvCorpus};
use desi_meme_creator::fonts::FontLibrary;
use desi_meme_creator::pipeline::MemeCreator;
use desi_meme_creator::server::serve;
use desi_meme_creator::settings::Settings;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::io::Cursor;
use tempfile::TempDir;
use tokio::net::TcpListener;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn background_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(160, 120, Rgb([30, 60, 90])))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

async fn start_server(dir: &TempDir) -> String {
    let mut settings = Settings::default();
    settings.admin_password = Some("bala".to_string());
    settings.images_dir = dir.path().join("images");
    std::fs::create_dir_all(&settings.images_dir).unwrap();
    std::fs::write(settings.images_dir.join("meme3.jpg"), background_png()).unwrap();

    let store = CorpusStore::Csv(CsvCorpus::open(dir.path().join("corpus.csv")).unwrap());
    let classifier = LanguageClassifier::new(Box::new(ScriptDetector), 5, 0.0);
    let fonts = FontLibrary::new(dir.path().join("fonts"));
    let creator = MemeCreator::new(settings, classifier, fonts, store);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, creator).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test(flavor = "multi_thread")]
async fn meme_corpus_and_clear_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_server(&dir).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let response = client
        .post(format!("{}/meme", base))
        .json(&json!({
            "caption": "नमस्ते दोस्तों",
            "image_base64": BASE64.encode(background_png()),
            "font_size": 40
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let meme: Value = response.json().await.unwrap();
    assert_eq!(meme["language"], "Hindi");
    assert_eq!(meme["mime"], "image/png");
    assert_eq!(meme["saved"], true);
    let png = BASE64
        .decode(meme["image_base64"].as_str().unwrap())
        .unwrap();
    assert!(png.starts_with(PNG_SIGNATURE));

    let response = client
        .post(format!("{}/meme", base))
        .json(&json!({ "caption": "hiii", "template": "Meme 3", "font_size": 20 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let meme: Value = response.json().await.unwrap();
    assert_eq!(meme["language"], "English");

    let corpus: Value = client
        .get(format!("{}/corpus", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let records = corpus["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["text"], "hiii");
    assert_eq!(records[1]["language"], "Hindi");

    let rejected = client
        .post(format!("{}/corpus/clear", base))
        .json(&json!({ "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 403);

    let cleared = client
        .post(format!("{}/corpus/clear", base))
        .json(&json!({ "password": "bala" }))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), 200);
    let body: Value = cleared.json().await.unwrap();
    assert_eq!(body["cleared"], true);

    let corpus: Value = client
        .get(format!("{}/corpus", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(corpus["records"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_requests_are_rejected_without_storing() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_server(&dir).await;
    let client = reqwest::Client::new();

    let cases = [
        json!({ "caption": "no image here" }),
        json!({ "caption": "  ", "template": "Meme 3" }),
        json!({ "caption": "too big", "template": "Meme 3", "font_size": 150 }),
        json!({ "caption": "missing", "template": "Meme 9" }),
        json!({ "caption": "bad", "image_base64": "%%%" }),
    ];
    for payload in cases {
        let response = client
            .post(format!("{}/meme", base))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "{}", payload);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
    }

    let templates: Value = client
        .get(format!("{}/templates", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(templates["templates"], json!([{ "name": "Meme 3", "file": "meme3.jpg" }]));

    let corpus: Value = client
        .get(format!("{}/corpus", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(corpus["records"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn preflight_and_responses_allow_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_server(&dir).await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/meme", base))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        preflight.headers()["access-control-allow-methods"],
        "GET,POST,OPTIONS"
    );

    let corpus = client
        .get(format!("{}/corpus", base))
        .send()
        .await
        .unwrap();
    assert_eq!(corpus.status(), 200);
    assert_eq!(corpus.headers()["access-control-allow-origin"], "*");
}
