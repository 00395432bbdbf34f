//! Integration tests for environment configuration and the HTTP listener.
//!
//! These tests read `SECRET_MIRROR_*` variables from the process environment
//! and serve real requests over TCP.

mod common;

use std::env;
use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{credentials, Harness, SCOPE};
use secret_mirror::{
    api::{start_api_server, AppState},
    config::AppConfig,
    secrets::InMemoryBackend,
    Result,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

// Serializes tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "SECRET_MIRROR_NAMESPACE",
    "SECRET_MIRROR_HOST",
    "SECRET_MIRROR_PORT",
    "SECRET_MIRROR_DECODE_POLICY",
];

/// Run `f` with the given variables set, restoring the previous values after.
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<_> = VARS.iter().map(|k| (*k, env::var(k).ok())).collect();

    for key in VARS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = f();

    for (key, value) in saved {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }
    result
}

fn find_available_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("an ephemeral port should be available")
}

async fn http_get(port: u16, path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[test]
fn test_config_reads_environment() -> Result<()> {
    let config = with_env(
        &[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_PORT", "18001"),
            ("SECRET_MIRROR_DECODE_POLICY", "base64"),
        ],
        AppConfig::from_env,
    )?;

    assert_eq!(config.scope.namespace, "payments");
    assert_eq!(config.server.port, 18001);
    assert_eq!(config.cache.decode_policy.as_str(), "base64");
    Ok(())
}

#[test]
fn test_invalid_port_is_rejected() {
    for invalid in ["abc", "-1", "99999", "0"] {
        let result = with_env(
            &[("SECRET_MIRROR_NAMESPACE", "payments"), ("SECRET_MIRROR_PORT", invalid)],
            AppConfig::from_env,
        );
        assert!(result.is_err(), "Config should reject invalid port: {}", invalid);
    }
}

#[tokio::test]
async fn test_server_serves_credentials_and_shuts_down() -> Result<()> {
    let port = find_available_port();
    let port_value = port.to_string();
    let config = with_env(
        &[
            ("SECRET_MIRROR_NAMESPACE", SCOPE),
            ("SECRET_MIRROR_HOST", "127.0.0.1"),
            ("SECRET_MIRROR_PORT", &port_value),
        ],
        AppConfig::from_env,
    )?;

    let harness =
        Harness::new(InMemoryBackend::new(SCOPE).with_records([credentials("admin", "s3cret")]));
    let watcher = harness.start_watcher().await;
    let state = AppState::new(
        Arc::clone(&harness.cache),
        watcher.state_changes(),
        config.server.credentials_secret.clone(),
        config.cache.fetch_timeout(),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_config = config.server.clone();
    let server = tokio::spawn(async move {
        start_api_server(&server_config, state, async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    let mut connected = false;
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(connected, "server should accept connections");

    let response = http_get(port, "/").await;
    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {}", response);
    assert!(response.contains("\"username\":\"admin\""));

    let health = http_get(port, "/healthz").await;
    assert!(health.contains("\"watcher\":\"streaming\""));

    shutdown_tx.send(()).unwrap();
    let served = timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop within the timeout")
        .expect("server task should not panic");
    assert!(served.is_ok());

    watcher.stop().await;
    Ok(())
}
