use std::sync::Arc;

use page_overlay_rust::ocr::{
    self, JsonDetector, OverlayStyle, SurfacePoint, hit_test, render, scan_page, to_render_space,
};
use page_overlay_rust::translation::{TranslateFuture, translate_page};
use page_overlay_rust::{
    BatchTranslator, Detector, FileStore, Language, PageImage, PageStore, ScanError,
    ScriptLanguageIdentifier, WriteMode,
};
use tempfile::tempdir;

struct Dictionary;

impl BatchTranslator for Dictionary {
    fn translate_batch(&self, texts: Vec<String>, _target_lang: &str) -> TranslateFuture {
        Box::pin(async move {
            Ok(texts
                .into_iter()
                .map(|text| match text.as_str() {
                    "你好世界" => "Hello world".to_string(),
                    "こんにちは" => "Good afternoon".to_string(),
                    other => other.to_string(),
                })
                .collect())
        })
    }
}

fn mono(text: &str, font_size: f32) -> (f32, f32) {
    (text.chars().count() as f32 * font_size * 0.6, font_size * 1.2)
}

#[tokio::test]
async fn scan_store_translate_edit_render() {
    let dir = tempdir().expect("tempdir");
    let chi = dir.path().join("chi_sim.json");
    let jpn = dir.path().join("jpn.json");
    let eng = dir.path().join("eng.json");
    std::fs::write(
        &chi,
        r#"[{"rect":{"left":100,"top":100,"right":700,"bottom":200},"text":"你好世界","confidence":0.93}]"#,
    )
    .expect("write chi");
    std::fs::write(
        &jpn,
        r#"[{"rect":{"left":100,"top":400,"right":700,"bottom":500},"text":"こんにちは"}]"#,
    )
    .expect("write jpn");
    std::fs::write(
        &eng,
        r#"[{"rect":{"left":100,"top":100,"right":700,"bottom":200},"text":"你好世界"},
            {"rect":{"left":100,"top":700,"right":700,"bottom":800},"text":"Menu"}]"#,
    )
    .expect("write eng");

    let detectors: Vec<Arc<dyn Detector>> = vec![
        Arc::new(JsonDetector::new("chi_sim", &chi)),
        Arc::new(JsonDetector::new("jpn", &jpn)),
        Arc::new(JsonDetector::new("eng", &eng)),
    ];
    let data = scan_page(
        PageImage::with_size(1000, 1000),
        detectors,
        &ScriptLanguageIdentifier,
    )
    .await
    .expect("scan");
    assert_eq!(data.regions.len(), 3);
    assert_eq!(data.regions[0].language, Language::Zh);
    assert_eq!(data.regions[1].language, Language::Ja);
    assert_eq!(data.regions[2].language, Language::En);

    let store = FileStore::new(dir.path().join("pages"));
    store.save("menu", &data).expect("save");
    let mut data = store.load("menu").expect("load").expect("page");

    let menu_id = data.regions[2].id.clone();
    data.region_mut(&menu_id)
        .expect("menu region")
        .apply_manual_edit("Carte");
    let report = translate_page(&mut data, &Dictionary, "en", WriteMode::RespectManualEdits)
        .await
        .expect("translate");
    assert_eq!(report.written, 2);
    assert_eq!(data.regions[0].translated_text, "Hello world");
    assert_eq!(data.regions[2].translated_text, "Carte");
    store.save("menu", &data).expect("save again");

    let reloaded = store.load("menu").expect("load").expect("page");
    assert_eq!(reloaded, data);

    // Landscape surface: the square page is letterboxed horizontally.
    let instructions = render(&data, 2000.0, 1000.0, &OverlayStyle::default(), &mono);
    assert_eq!(instructions.len(), 3);
    for (instruction, region) in instructions.iter().zip(&data.regions) {
        let rect = to_render_space(region, 1000, 1000, 2000.0, 1000.0);
        assert_eq!(instruction.rect, rect);
        assert!(rect.x >= 500.0 && rect.right() <= 1500.0);
        for line in &instruction.lines {
            assert!(line.y <= rect.bottom() + 1e-3);
        }
    }
    assert_eq!(joined(&instructions[0].lines), "Hello world");

    let centre = to_render_space(&data.regions[1], 1000, 1000, 2000.0, 1000.0);
    let hit = hit_test(
        SurfacePoint::new(centre.x + 1.0, centre.y + 1.0),
        &data.regions,
        1000,
        1000,
        2000.0,
        1000.0,
    );
    assert_eq!(hit.map(|region| region.original_text.as_str()), Some("こんにちは"));
    assert!(
        hit_test(SurfacePoint::new(100.0, 150.0), &data.regions, 1000, 1000, 2000.0, 1000.0)
            .is_none()
    );
}

#[tokio::test]
async fn broken_detectors_are_reported_as_scan_failure() {
    let dir = tempdir().expect("tempdir");
    let detectors: Vec<Arc<dyn Detector>> = vec![
        Arc::new(JsonDetector::new("chi_sim", dir.path().join("missing.json"))),
        Arc::new(JsonDetector::new("eng", dir.path().join("missing.json"))),
    ];
    let err = ocr::scan_page(
        PageImage::with_size(100, 100),
        detectors,
        &ScriptLanguageIdentifier,
    )
    .await
    .expect_err("every pass failed");
    assert!(matches!(err, ScanError::NoDetections { passes: 2, .. }));
}

fn joined(lines: &[ocr::DrawnLine]) -> String {
    lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
