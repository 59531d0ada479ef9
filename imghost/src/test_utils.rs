//! Shared fixtures for handler and router tests.

use std::path::Path;

use crate::{Application, config::Config};

/// Default configuration pointed at `root`, bound to an ephemeral local port
pub fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.storage.root = root.to_path_buf();
    config
}

pub async fn create_test_app(config: Config) -> axum_test::TestServer {
    Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Sorted names of the files directly under `root`; empty if it cannot be read
pub fn stored_files(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
