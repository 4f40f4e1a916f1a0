use bitsave_proxy::config::Config;
use bitsave_proxy::proxy::{AllowListMode, Backoff};
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:3001");
    assert_eq!(cfg.server.proxy_paths, vec!["/proxy-endpoint", "/proxy"]);
    assert_eq!(cfg.proxy.allow_list_mode, AllowListMode::Enforce);
    assert_eq!(cfg.proxy.allowed_domains.len(), 10);
    assert!(cfg.rate_limit.enabled);
    assert_eq!(cfg.rate_limit.max_requests, 1000);
    assert_eq!(cfg.rate_limit.window(), Duration::from_secs(900));

    let policy = cfg.proxy.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.attempt_timeout, Duration::from_millis(30_000));
    assert_eq!(policy.backoff_unit, Duration::from_millis(1_000));
    assert_eq!(policy.backoff, Backoff::Linear);

    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_empty_document_is_default() {
    let cfg = Config::from_yaml_str("").unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:3001");
}

#[test]
fn test_config_partial_yaml_keeps_other_defaults() {
    let cfg = Config::from_yaml_str(
        r#"
server:
  listen_addr: "0.0.0.0:8080"
proxy:
  allow_list_mode: permissive
  max_attempts: 5
  backoff: exponential
  allowed_domains:
    - example.org
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
    assert_eq!(cfg.server.proxy_paths.len(), 2);
    assert_eq!(cfg.proxy.allow_list_mode, AllowListMode::Permissive);
    assert_eq!(cfg.proxy.max_attempts, 5);
    assert_eq!(cfg.proxy.backoff, Backoff::Exponential);
    assert_eq!(cfg.proxy.attempt_timeout_ms, 30_000);
    assert!(cfg.proxy.allow_list().permits("api.example.org"));
    assert!(!cfg.proxy.allow_list().permits("api.coinbase.com"));
}

#[test]
fn test_config_rejects_unknown_fields_and_bad_modes() {
    assert!(Config::from_yaml_str("proxy:\n  retries: 3\n").is_err());
    assert!(Config::from_yaml_str("proxy:\n  allow_list_mode: sometimes\n").is_err());
}

#[test]
fn test_config_validation() {
    let zero_attempts = Config::from_yaml_str("proxy:\n  max_attempts: 0\n").unwrap();
    assert!(zero_attempts.validate().is_err());

    let empty_enforced = Config::from_yaml_str("proxy:\n  allowed_domains: []\n").unwrap();
    assert!(empty_enforced.validate().is_err());

    let empty_permissive =
        Config::from_yaml_str("proxy:\n  allowed_domains: []\n  allow_list_mode: permissive\n")
            .unwrap();
    assert!(empty_permissive.validate().is_ok());

    let relative_path = Config::from_yaml_str("server:\n  proxy_paths: [proxy]\n").unwrap();
    assert!(relative_path.validate().is_err());
}

#[test]
fn test_config_from_file_and_listen_override() {
    let path = std::env::temp_dir().join(format!("bitsave-proxy-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  listen_addr: \"127.0.0.1:9000\"\n").unwrap();

    let from_file = Config::from_file(&path).unwrap();
    assert_eq!(from_file.server.listen_addr, "127.0.0.1:9000");

    // The only test touching these variables.
    unsafe {
        std::env::set_var("BITSAVE_PROXY_CONFIG", &path);
        std::env::set_var("LISTEN", "0.0.0.0:5000");
    }
    let loaded = Config::load();
    unsafe {
        std::env::remove_var("BITSAVE_PROXY_CONFIG");
        std::env::remove_var("LISTEN");
    }
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.unwrap().server.listen_addr, "0.0.0.0:5000");
}

#[test]
fn test_config_missing_file_is_an_error() {
    let err = Config::from_file("/nonexistent/bitsave-proxy.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
