// Learn more about Tauri commands at https://tauri.app/develop/calling-rust/
mod api;
mod arch;
mod auth;

use std::sync::Arc;

use log::info;
use serde_json::Value;
use tauri::{Manager, State};
use tauri_plugin_opener::OpenerExt;

use crate::api::client::DEFAULT_BASE_URL;
use crate::auth::secrets;
use crate::auth::session::{AuthStatus, SessionManager};
use crate::auth::store::CredentialStore;

pub struct AppState {
    session: SessionManager,
}

#[tauri::command]
async fn auth_login(
    state: State<'_, Arc<AppState>>,
    email: String,
    key: String,
) -> Result<(), String> {
    state
        .session
        .login(&email, &key)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn auth_check(state: State<'_, Arc<AppState>>) -> Result<AuthStatus, String> {
    Ok(state.session.resume().await)
}

#[tauri::command]
async fn auth_logout(state: State<'_, Arc<AppState>>) -> Result<(), String> {
    state.session.logout().await.map_err(|e| e.to_string())
}

/// The one door from the webview to the remote API. Only allow-listed
/// operation names pass; everything else fails closed in the gateway.
#[tauri::command]
async fn api_invoke(
    state: State<'_, Arc<AppState>>,
    method: String,
    args: Option<Vec<Value>>,
) -> Result<Value, String> {
    state
        .session
        .gateway()
        .dispatch(&method, args.unwrap_or_default())
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn app_get_version(app: tauri::AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn app_get_log_path(app: tauri::AppHandle) -> Result<String, String> {
    arch::app_log_dir(&app)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn app_open_log_folder(app: tauri::AppHandle) -> Result<(), String> {
    let dir = arch::app_log_dir(&app).map_err(|e| e.to_string())?;
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    app.opener()
        .open_path(dir.to_string_lossy(), None::<&str>)
        .map_err(|e| e.to_string())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(arch::log_builder().build())
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            info!("app starting, version {}", app.package_info().version);
            let data_dir = arch::app_data_dir(&app.handle())?;
            let store = CredentialStore::new(data_dir, secrets::default_cipher());
            let state = Arc::new(AppState {
                session: SessionManager::new(store, DEFAULT_BASE_URL),
            });
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            auth_login,
            auth_check,
            auth_logout,
            api_invoke,
            app_get_version,
            app_get_log_path,
            app_open_log_folder,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
