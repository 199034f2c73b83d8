use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.body_limit_bytes.get(), 1024 * 1024);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.render.max_sessions.get(), 4);
    assert_eq!(settings.render.max_concurrent_pages.get(), 8);
    assert_eq!(settings.render.max_pages.get(), 100);
    assert_eq!(settings.render.request_timeout, Duration::from_secs(60));
    assert_eq!(settings.render.settle, Duration::from_millis(500));
    assert!(settings.render.chrome_path.is_none());
    assert!(settings.render.temp_dir.ends_with("presswork"));
}

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
fn render_overrides_apply() {
    let mut raw = RawSettings::default();
    raw.render.max_pages = Some(10);

    let overrides = ServeOverrides {
        render: RenderOverrides {
            max_pages: Some(3),
            max_concurrent_pages: Some(2),
            temp_dir: Some(PathBuf::from("/var/tmp/presswork-test")),
            request_timeout_seconds: Some(5),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.render.max_pages.get(), 3);
    assert_eq!(settings.render.max_concurrent_pages.get(), 2);
    assert_eq!(
        settings.render.temp_dir,
        PathBuf::from("/var/tmp/presswork-test")
    );
    assert_eq!(settings.render.request_timeout, Duration::from_secs(5));
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
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.render.max_concurrent_pages = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero concurrency is invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.max_concurrent_pages",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.server.body_limit_bytes = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.render.request_timeout_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["presswork"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "presswork",
        "serve",
        "--server-port",
        "8080",
        "--render-max-pages",
        "12",
        "--log-json",
        "yes",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_port, Some(8080));
            assert_eq!(serve.overrides.render.max_pages, Some(12));
            assert_eq!(serve.overrides.log_json, Some(true));
        }
    }
}
