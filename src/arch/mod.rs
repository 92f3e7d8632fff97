//! Platform seams: path resolution and logging setup.
//!
//! This module is intentionally "plumbing only": everything else should be
//! portable across the desktop targets.

use std::path::PathBuf;

use log::LevelFilter;
use tauri::Manager;
use tauri_plugin_log::{Target, TargetKind};

/// All filesystem paths should be resolved via Tauri app directories.
///
/// This keeps storage locations consistent and cross-platform.
pub fn app_data_dir(app: &tauri::AppHandle) -> tauri::Result<PathBuf> {
    app.path().app_data_dir()
}

pub fn app_log_dir(app: &tauri::AppHandle) -> tauri::Result<PathBuf> {
    app.path().app_log_dir()
}

/// Log to the platform log dir plus stdout. Secrets are never logged; only
/// identities and outcomes are.
pub fn log_builder() -> tauri_plugin_log::Builder {
    tauri_plugin_log::Builder::new()
        .level(LevelFilter::Info)
        .target(Target::new(TargetKind::LogDir {
            file_name: Some("edgedesk".to_string()),
        }))
        .target(Target::new(TargetKind::Stdout))
}
