use serde_json::json;
use time::macros::datetime;
use url::Url;
use uuid::Uuid;

use pagepress::application::render::{PageMetadata, RenderInput, RenderOptions, StaticRenderer};

fn renderer() -> StaticRenderer {
    StaticRenderer::new(RenderOptions {
        published_domain: "pagepress.site".to_string(),
        asset_base_url: Url::parse("https://assets.pagepress.site").expect("asset base"),
        stylesheet_href: "https://assets.pagepress.site/published.css".to_string(),
        form_script_src: "https://assets.pagepress.site/form.js".to_string(),
        analytics_script_src: "https://assets.pagepress.site/a.js".to_string(),
    })
}

fn metadata() -> PageMetadata {
    PageMetadata {
        page_id: Uuid::nil(),
        slug: "launch".to_string(),
        title: "Launch day".to_string(),
        description: Some("Everything ships today".to_string()),
        preview_image: None,
        generated_at: datetime!(2026-01-02 03:04:05 UTC),
    }
}

fn input() -> RenderInput {
    RenderInput::from_content_model(
        &["hero".to_string(), "features".to_string()],
        &json!({
            "hero": {
                "headline": "Launch day",
                "subheadline": "Pages that publish themselves",
                "image": "/img/hero.png",
                "cta_text": "Start",
                "cta_url": "/signup"
            },
            "features": {
                "title": "Why us",
                "background_image": "http://cdn.example.com/bg.png",
                "items": [{ "title": "Fast" }, { "title": "Safe" }]
            },
            "forms": { "contact": { "fields": ["email"] } }
        }),
        &json!({ "colors": { "accentColor": "#3366ff" } }),
        true,
    )
}

#[test]
fn snapshot_published_document() {
    let document = renderer().render(&input(), &metadata()).expect("render");
    assert_eq!(document.stats.rewritten_assets, 2);
    assert_eq!(document.stats.invalid_assets, 0);
    insta::assert_snapshot!("published_document", document.html);
}
