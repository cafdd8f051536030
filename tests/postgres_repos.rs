//! Repository tests against a real Postgres.
//!
//! Marked `#[ignore]`; run with `DATABASE_URL` pointing at a disposable server:
//! `cargo test --test postgres_repos -- --ignored`.

use pagepress::application::repos::{
    CreatePageParams, NewVersionParams, PagesRepo, PublishTransition, RepoError, RoutesRepo,
    VersionsRepo,
};
use pagepress::domain::entities::{RouteEntry, StoredContent};
use pagepress::domain::types::{PublishState, VersionOrder, VersionStatus};
use pagepress::infra::db::PostgresRepositories;
use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;

fn page_params(slug: &str, token: &str) -> CreatePageParams {
    CreatePageParams {
        slug: slug.to_string(),
        owner_id: "owner-1".to_string(),
        project_token: token.to_string(),
        title: "Postgres page".to_string(),
        description: Some("stored".to_string()),
        preview_image: None,
        content: StoredContent {
            sections: vec!["hero".to_string()],
            content: json!({ "hero": { "headline": "Hi" } }),
            theme: json!({}),
            analytics_opt_in: true,
        },
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn page_lifecycle_round_trips(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let page = repos
        .create_page(page_params("postgres", "token-1"))
        .await
        .expect("create page");
    assert_eq!(page.publish_state, PublishState::None);
    assert_eq!(page.content.sections, vec!["hero".to_string()]);

    let duplicate = repos.create_page(page_params("postgres", "token-2")).await;
    assert!(matches!(duplicate, Err(RepoError::Duplicate { .. })));

    let version = repos
        .append_version(NewVersionParams {
            page_id: page.id,
            version_label: "v1-1.0.0-aaaaaaaa".to_string(),
            artifact_key: format!("pages/{}/v1-1.0.0-aaaaaaaa/index.html", page.id),
            artifact_url: "https://cdn.test/a".to_string(),
            size_bytes: 42,
            checksum: "abc".to_string(),
            status: VersionStatus::Active,
        })
        .await
        .expect("append version");

    let published = repos
        .apply_transition(
            page.id,
            PublishTransition::Published {
                version_id: version.id,
                at: OffsetDateTime::now_utc(),
            },
        )
        .await
        .expect("published");
    assert_eq!(published.publish_state, PublishState::Published);
    assert_eq!(published.current_version_id, Some(version.id));

    let failed = repos
        .apply_transition(
            page.id,
            PublishTransition::Failed {
                message: "boom".to_string(),
            },
        )
        .await
        .expect("failed");
    assert_eq!(failed.publish_error.as_deref(), Some("boom"));
    assert_eq!(failed.current_version_id, Some(version.id));

    let listed = repos
        .list_versions(page.id, VersionOrder::MostRecentFirst)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);

    repos
        .mark_pruned(version.id, OffsetDateTime::now_utc())
        .await
        .expect("prune");
    assert!(matches!(
        repos.mark_pruned(version.id, OffsetDateTime::now_utc()).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn route_replacement_overwrites_existing_hosts(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let page = repos
        .create_page(page_params("routed", "token-1"))
        .await
        .expect("create page");

    for label in ["v1", "v2"] {
        repos
            .replace_routes(vec![RouteEntry {
                hostname: "routed.pagepress.test".to_string(),
                page_id: page.id,
                version_label: label.to_string(),
                artifact_url: format!("https://cdn.test/{label}"),
                updated_at: OffsetDateTime::now_utc(),
            }])
            .await
            .expect("replace routes");
    }

    let route = repos
        .find_route("routed.pagepress.test")
        .await
        .expect("lookup")
        .expect("route");
    assert_eq!(route.version_label, "v2");
}
