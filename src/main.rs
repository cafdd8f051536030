use std::{process, sync::Arc};

use pagepress::{
    application::{
        artifacts::{ArtifactClient, ArtifactStore},
        delivery::DeliveryService,
        error::AppError,
        plans::{ConfiguredPlanLimiter, PlanLimiter},
        publish::{PublishService, PublishSettings},
        render::{PageMetadata, RenderInput, RenderOptions, StaticRenderer},
        repos::{PagesRepo, RoutesRepo, VersionsRepo},
        retention::RetentionSweeper,
        routes::RoutePublisher,
    },
    config::{self, ArtifactBackend},
    domain::entities::StoredContent,
    infra::{
        artifacts::{FilesystemArtifactStore, HttpArtifactStore},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, PublicState, RouterState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Sweep(args) => run_sweep(settings, args).await,
    }
}

struct Repositories {
    pages: Arc<dyn PagesRepo>,
    versions: Arc<dyn VersionsRepo>,
    routes: Arc<dyn RoutesRepo>,
    postgres: Option<Arc<PostgresRepositories>>,
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "pagepress::bootstrap",
            "no database url configured; pages and versions are kept in memory"
        );
        let memory = Arc::new(InMemoryRepositories::new());
        return Ok(Repositories {
            pages: memory.clone(),
            versions: memory.clone(),
            routes: memory,
            postgres: None,
        });
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let postgres = Arc::new(PostgresRepositories::new(pool));
    Ok(Repositories {
        pages: postgres.clone(),
        versions: postgres.clone(),
        routes: postgres.clone(),
        postgres: Some(postgres),
    })
}

fn build_artifact_client(settings: &config::Settings) -> Result<ArtifactClient, AppError> {
    let store: Arc<dyn ArtifactStore> = match &settings.artifacts.backend {
        ArtifactBackend::Filesystem { directory } => Arc::new(
            FilesystemArtifactStore::new(directory.clone())
                .map_err(|err| AppError::from(InfraError::Io(err)))?,
        ),
        ArtifactBackend::Http { endpoint, token } => Arc::new(
            HttpArtifactStore::new(endpoint.clone(), token.clone())
                .map_err(|err| AppError::from(InfraError::artifacts(err.to_string())))?,
        ),
    };

    Ok(ArtifactClient::new(
        store,
        settings.artifacts.public_base_url.as_str(),
        settings.artifacts.upload_timeout,
    ))
}

fn build_renderer(settings: &config::Settings) -> Arc<StaticRenderer> {
    let publish = &settings.publish;
    Arc::new(StaticRenderer::new(RenderOptions {
        published_domain: publish.published_domain.clone(),
        asset_base_url: publish.asset_base_url.clone(),
        stylesheet_href: publish.stylesheet_href.clone(),
        form_script_src: publish.form_script_src.clone(),
        analytics_script_src: publish.analytics_script_src.clone(),
    }))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let artifacts = build_artifact_client(&settings)?;
    let renderer = build_renderer(&settings);
    let routes = RoutePublisher::new(repositories.routes.clone());
    let plans: Arc<dyn PlanLimiter> = Arc::new(ConfiguredPlanLimiter::new(
        settings.plans.published_page_limit,
    ));

    let publish = Arc::new(PublishService::new(
        repositories.pages.clone(),
        repositories.versions.clone(),
        routes.clone(),
        artifacts.clone(),
        plans,
        renderer.clone(),
        PublishSettings {
            published_domain: settings.publish.published_domain.clone(),
            keep_count: settings.publish.keep_count as usize,
            bundle_version: settings.publish.bundle_version.clone(),
        },
    ));
    let delivery = Arc::new(DeliveryService::new(
        routes,
        repositories.pages.clone(),
        repositories.versions.clone(),
        artifacts,
        renderer,
        settings.publish.published_domain.clone(),
    ));

    let state = RouterState {
        public: PublicState {
            delivery,
            db: repositories.postgres.clone(),
        },
        api: ApiState { publish },
    };

    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "pagepress::bootstrap",
        addr = %settings.server.addr,
        published_domain = %settings.publish.published_domain,
        "listening"
    );

    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
    };
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "pagepress::bootstrap",
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "pagepress::bootstrap",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Deserialize)]
struct RenderDocument {
    #[serde(flatten)]
    content: StoredContent,
    description: Option<String>,
    preview_image: Option<String>,
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    let document: RenderDocument = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("invalid render input: {err}")))?;

    let renderer = build_renderer(&settings);
    let input = RenderInput::from_content_model(
        &document.content.sections,
        &document.content.content,
        &document.content.theme,
        document.content.analytics_opt_in,
    );
    let metadata = PageMetadata {
        page_id: Uuid::nil(),
        title: args.title.unwrap_or_else(|| args.slug.clone()),
        slug: args.slug,
        description: document.description,
        preview_image: document.preview_image,
        generated_at: OffsetDateTime::now_utc(),
    };

    let rendered = renderer
        .render(&input, &metadata)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    info!(
        target = "pagepress::render",
        size_bytes = rendered.stats.size_bytes,
        sections = rendered.stats.section_count,
        invalid_assets = rendered.stats.invalid_assets,
        "document rendered"
    );
    println!("{}", rendered.html);
    Ok(())
}

async fn run_sweep(settings: config::Settings, args: config::SweepArgs) -> Result<(), AppError> {
    if settings.database.url.is_none() {
        return Err(AppError::from(InfraError::configuration(
            "sweep requires a database url",
        )));
    }

    let repositories = init_repositories(&settings).await?;
    let artifacts = build_artifact_client(&settings)?;
    let sweeper = RetentionSweeper::new(repositories.pages, repositories.versions, artifacts);
    let keep = args.keep.unwrap_or(settings.publish.keep_count) as usize;

    let report = sweeper.sweep(args.page_id, keep).await.map_err(|err| {
        AppError::unexpected(format!("sweep of page {} failed: {err}", args.page_id))
    })?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{json}");
    Ok(())
}
