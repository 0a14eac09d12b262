use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use qastream::config::{RetryConfig, ServiceConfig, StreamConfig};
use qastream::notify::RecordingNotifier;
use qastream::{Dispatcher, ServiceClient, SessionStore};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn client_for(base_url: &str, retry: RetryConfig) -> ServiceClient {
    let service = ServiceConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        connect_timeout_seconds: 2,
    };
    ServiceClient::new(&service, retry).expect("client should build")
}

/// Dispatcher with no pacing and a recording notifier
#[allow(dead_code)]
pub fn dispatcher_for(
    base_url: &str,
    retry: RetryConfig,
) -> (Dispatcher, SessionStore, Arc<RecordingNotifier>) {
    let store = SessionStore::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let stream = StreamConfig {
        pacing_ms: 0,
        ..StreamConfig::default()
    };
    let dispatcher = Dispatcher::new(
        client_for(base_url, retry),
        store.clone(),
        notifier.clone(),
        &stream,
    );
    (dispatcher, store, notifier)
}

/// Encode `payloads` as `data:` frames
#[allow(dead_code)]
pub fn sse_body(payloads: &[&str]) -> Vec<u8> {
    payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect::<String>()
        .into_bytes()
}
