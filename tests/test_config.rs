use onvif_server::config::{CONFIG_ENV, Config, LISTEN_ENV};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
    assert_eq!(cfg.server.worker_count, 4);
    assert_eq!(cfg.server.max_connections, 32);
    assert_eq!(cfg.server.idle_timeout().as_secs(), 15);
    assert_eq!(cfg.server.poll_interval().as_millis(), 100);
    assert!(cfg.auth.enabled);
    assert_eq!(cfg.auth.realm, "ONVIF Server");
    assert!(!cfg.auth.allow_basic);
    assert_eq!(cfg.buffer_pool.buffers, 50);
    assert_eq!(cfg.buffer_pool.buffer_size, 32 * 1024);
    assert!(cfg.ptz.presets_path.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_empty_yaml_gives_defaults() {
    let cfg = Config::from_yaml_str("  \n").unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
}

#[test]
fn test_partial_yaml_keeps_other_defaults() {
    let cfg = Config::from_yaml_str(
        r#"
server:
  listen_addr: "127.0.0.1:9000"
  max_connections: 8
auth:
  realm: "Camera"
  users:
    - username: admin
      password_hash: "07070707070707070707070707070707$00"
    - username: guest
      password_hash: "x$y"
      active: false
ptz:
  presets_path: /var/lib/onvif/presets.yaml
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.server.max_connections, 8);
    assert_eq!(cfg.server.worker_count, 4);
    assert_eq!(cfg.auth.realm, "Camera");
    assert_eq!(cfg.auth.nonce_validity_secs, 300);
    assert_eq!(cfg.auth.users.len(), 2);
    assert!(cfg.auth.users[0].active);
    assert!(!cfg.auth.users[1].active);
    assert_eq!(
        cfg.ptz.presets_path.as_deref(),
        Some(std::path::Path::new("/var/lib/onvif/presets.yaml"))
    );
}

#[test]
fn test_malformed_yaml_is_an_error() {
    assert!(Config::from_yaml_str("server: [1, 2").is_err());
    assert!(Config::from_yaml_str("server:\n  worker_count: many\n").is_err());
}

#[test]
fn test_validate_rejects_zero_limits() {
    let mutations: Vec<fn(&mut Config)> = vec![
        |c: &mut Config| c.server.listen_addr = " ".to_string(),
        |c: &mut Config| c.server.worker_count = 0,
        |c: &mut Config| c.server.max_connections = 0,
        |c: &mut Config| c.server.idle_timeout_ms = 0,
        |c: &mut Config| c.server.poll_interval_ms = 0,
        |c: &mut Config| c.server.max_requests_per_connection = 0,
        |c: &mut Config| c.auth.realm.clear(),
        |c: &mut Config| c.auth.nonce_validity_secs = 0,
        |c: &mut Config| c.buffer_pool.buffers = 0,
        |c: &mut Config| c.buffer_pool.buffer_size = 0,
    ];
    for (i, mutate) in mutations.into_iter().enumerate() {
        let mut cfg = Config::default();
        mutate(&mut cfg);
        assert!(cfg.validate().is_err(), "mutation {}", i);
    }
}

#[test]
fn test_empty_realm_allowed_without_auth() {
    let mut cfg = Config::default();
    cfg.auth.enabled = false;
    cfg.auth.realm.clear();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_missing_config_file() {
    let err = Config::from_file(std::path::Path::new("/nonexistent/onvif.yaml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/onvif.yaml"));
}

// Both variables are process-wide, so every env case lives in one test.
#[test]
fn test_load_from_environment() {
    let path = std::env::temp_dir().join(format!("onvif-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  listen_addr: \"127.0.0.1:7000\"\n  worker_count: 2\n")
        .unwrap();

    unsafe {
        std::env::remove_var(LISTEN_ENV);
        std::env::remove_var(CONFIG_ENV);
    }
    assert_eq!(Config::load().unwrap().server.listen_addr, "0.0.0.0:8080");

    unsafe {
        std::env::set_var(CONFIG_ENV, &path);
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:7000");
    assert_eq!(cfg.server.worker_count, 2);

    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.server.worker_count, 2);

    std::fs::write(&path, "server:\n  worker_count: 0\n").unwrap();
    assert!(Config::load().is_err());

    unsafe {
        std::env::remove_var(LISTEN_ENV);
        std::env::remove_var(CONFIG_ENV);
    }
    std::fs::remove_file(&path).unwrap();
}
