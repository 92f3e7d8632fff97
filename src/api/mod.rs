//! Remote API access: the typed HTTP client and the allow-listed gateway
//! the webview goes through.

pub mod client;
pub mod gateway;
