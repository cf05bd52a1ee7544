use super::*;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.database.table, "articles");
    assert!(settings.database.url.is_none());
    assert!(settings.webhook.token.is_none());
    assert!(settings.upstream.url.is_none());
    assert!(settings.upstream.cache_enabled);
    assert_eq!(settings.upstream.rewrite_selector, "h1");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.ttl_minutes = Some(30);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_ttl_minutes: Some(2),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.ttl_minutes, 2);
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
fn upstream_ttl_follows_cache_ttl_unless_set() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_minutes = Some(12);
    let settings = Settings::from_raw(raw.clone()).expect("valid settings");
    assert_eq!(settings.upstream.ttl_minutes, 12);

    raw.upstream.ttl_minutes = Some(1);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.upstream.ttl_minutes, 1);
}

#[test]
fn non_positive_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_minutes = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_minutes",
            ..
        }
    ));
}

#[test]
fn postgres_backend_requires_database_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("Postgres".to_string());
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.database.url = Some("postgres://localhost/readthrough".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackend::Postgres);
}

#[test]
fn blank_secrets_are_treated_as_absent() {
    let mut raw = RawSettings::default();
    raw.webhook.token = Some("   ".to_string());
    raw.database.url = Some(String::new());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.webhook.token.is_none());
    assert!(settings.database.url.is_none());
}

#[test]
fn table_must_be_a_plain_identifier() {
    let mut raw = RawSettings::default();
    raw.database.table = Some("articles; drop table x".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn upstream_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.upstream.url = Some("ftp://origin.test".to_string());
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.upstream.url = Some("https://origin.test".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.upstream.url.map(String::from).as_deref(),
        Some("https://origin.test/")
    );
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["readthrough"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from([
        "readthrough",
        "migrate",
        "--database-url",
        "postgres://example",
    ]);

    match args.command.expect("migrate command") {
        Command::Migrate(database) => {
            assert_eq!(database.database_url.as_deref(), Some("postgres://example"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
