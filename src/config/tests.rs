use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_describe_a_local_in_memory_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.database.url.is_none());
    assert_eq!(
        settings.artifacts.backend,
        ArtifactBackend::Filesystem {
            directory: PathBuf::from(DEFAULT_ARTIFACT_DIR)
        }
    );
    assert_eq!(
        settings.artifacts.upload_timeout,
        Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS)
    );
    assert_eq!(settings.publish.published_domain, DEFAULT_PUBLISHED_DOMAIN);
    assert_eq!(settings.publish.keep_count, DEFAULT_KEEP_COUNT);
    assert_eq!(settings.plans.published_page_limit, -1);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn http_backend_requires_endpoint() {
    let mut raw = RawSettings::default();
    raw.artifacts.backend = Some("http".to_string());

    let err = Settings::from_raw(raw.clone()).expect_err("endpoint missing");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "artifacts.endpoint",
            ..
        }
    ));

    raw.artifacts.endpoint = Some("https://objects.example.com/bucket".to_string());
    raw.artifacts.token = Some("  secret ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    match settings.artifacts.backend {
        ArtifactBackend::Http { endpoint, token } => {
            assert_eq!(endpoint.as_str(), "https://objects.example.com/bucket");
            assert_eq!(token.as_deref(), Some("secret"));
        }
        other => panic!("unexpected backend {other:?}"),
    }
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.artifacts.backend = Some("s3".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_upload_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.artifacts.upload_timeout_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "artifacts.upload_timeout_seconds",
            ..
        })
    ));
}

#[test]
fn published_domain_is_normalised() {
    let mut raw = RawSettings::default();
    raw.publish.published_domain = Some(".Pages.Example.COM.".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.publish.published_domain, "pages.example.com");
}

#[test]
fn plan_limit_below_unlimited_is_rejected() {
    let mut raw = RawSettings::default();
    raw.plans.published_page_limit = Some(-2);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pagepress"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "pagepress",
        "render",
        "--input",
        "/tmp/page.json",
        "--title",
        "Launch",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.input, std::path::Path::new("/tmp/page.json"));
            assert_eq!(render.slug, "preview");
            assert_eq!(render.title.as_deref(), Some("Launch"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_sweep_arguments() {
    let args = CliArgs::parse_from([
        "pagepress",
        "sweep",
        "--database-url",
        "postgres://example",
        "--page-id",
        "00000000-0000-0000-0000-000000000000",
        "--keep",
        "3",
    ]);

    match args.command.expect("sweep command") {
        Command::Sweep(sweep) => {
            assert_eq!(
                sweep.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(sweep.page_id, Uuid::nil());
            assert_eq!(sweep.keep, Some(3));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "pagepress",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--artifacts-backend",
        "http",
        "--plans-published-page-limit",
        "-1",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.artifacts_backend.as_deref(), Some("http"));
            assert_eq!(serve.overrides.plans_published_page_limit, Some(-1));
        }
        _ => panic!("wrong command parsed"),
    }
}
