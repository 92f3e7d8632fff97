use std::fmt;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use super::store::{CredentialStore, StoreError};
use crate::api::client::EdgeClient;
use crate::api::gateway::Gateway;
use crate::auth::secrets::CipherError;

#[derive(Debug)]
pub enum AuthError {
    /// Platform cannot protect the secret at rest; login is refused.
    EncryptionUnavailable(String),
    /// Remote rejected the credentials or the verification call failed.
    AuthenticationFailed(String),
    /// Credentials verified but could not be persisted; the session is not
    /// established because it could not survive a restart.
    PersistenceFailed(String),
    /// Logout left the on-disk record behind; the session itself is gone.
    LogoutIncomplete(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::EncryptionUnavailable(msg) => {
                write!(f, "cannot store credentials securely: {msg}")
            }
            AuthError::AuthenticationFailed(msg) => {
                write!(f, "authentication failed: {msg}")
            }
            AuthError::PersistenceFailed(msg) => {
                write!(f, "credentials verified but could not be saved: {msg}")
            }
            AuthError::LogoutIncomplete(msg) => {
                write!(f, "logged out, but saved credentials were not removed: {msg}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// What the webview sees after a resume attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthStatus {
    fn unauthenticated(error: Option<String>) -> Self {
        Self {
            authenticated: false,
            email: None,
            error,
        }
    }
}

/// Sole owner of session state. Drives the credential store and the gateway
/// together so they never disagree: the gateway holds a configured client
/// exactly while a session is authenticated.
pub struct SessionManager {
    store: CredentialStore,
    gateway: Gateway,
    base_url: String,
    // Serializes login/resume/logout; also guards the current identity so a
    // logout racing a login cannot leave gateway and state mismatched.
    current: Mutex<Option<String>>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, base_url: impl Into<String>) -> Self {
        Self {
            store,
            gateway: Gateway::new(),
            base_url: base_url.into(),
            current: Mutex::new(None),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Verify credentials against the remote, persist them, and open the
    /// session. On any failure the client built for this attempt is
    /// discarded and state stays unauthenticated.
    pub async fn login(&self, email: &str, api_key: &str) -> Result<(), AuthError> {
        let mut current = self.current.lock().await;

        let client = EdgeClient::new(&self.base_url, email, api_key)
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;
        client
            .verify_token()
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;

        self.store.save(email, api_key).map_err(|e| match e {
            StoreError::Encryption(CipherError::Unavailable(msg)) => {
                AuthError::EncryptionUnavailable(msg)
            }
            other => AuthError::PersistenceFailed(other.to_string()),
        })?;

        self.gateway.install(client);
        *current = Some(email.to_string());
        info!("logged in as {email}");
        Ok(())
    }

    /// Try to pick up the previous session at startup. Absence of a saved
    /// credential is a normal outcome, not an error. A saved credential
    /// that no longer verifies is left in place so the user can recover by
    /// fixing connectivity or the key and restarting. A failed resume ends
    /// any session that was already open; the gateway must never stay
    /// configured while the reported state is unauthenticated.
    pub async fn resume(&self) -> AuthStatus {
        let mut current = self.current.lock().await;

        let saved = match self.store.load() {
            Some(saved) => saved,
            None => {
                self.drop_session(&mut current);
                return AuthStatus::unauthenticated(None);
            }
        };

        let client = match EdgeClient::new(&self.base_url, &saved.email, &saved.key) {
            Ok(client) => client,
            Err(e) => {
                warn!("saved credentials unusable: {e}");
                self.drop_session(&mut current);
                return AuthStatus::unauthenticated(Some("Saved token invalid".into()));
            }
        };
        match client.verify_token().await {
            Ok(_) => {
                self.gateway.install(client);
                *current = Some(saved.email.clone());
                info!("resumed session for {}", saved.email);
                AuthStatus {
                    authenticated: true,
                    email: Some(saved.email),
                    error: None,
                }
            }
            Err(e) => {
                warn!("saved token no longer verifies: {e}");
                self.drop_session(&mut current);
                AuthStatus::unauthenticated(Some("Saved token invalid".into()))
            }
        }
    }

    /// Drop the session. The in-memory side is always torn down; a failed
    /// file delete is reported rather than leaving a phantom session.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut current = self.current.lock().await;
        self.drop_session(&mut current);
        info!("logged out");
        self.store
            .clear()
            .map_err(|e| AuthError::LogoutIncomplete(e.to_string()))
    }

    /// Tear down the in-memory session: gateway and identity change
    /// together, under the caller's lock.
    fn drop_session(&self, current: &mut Option<String>) {
        self.gateway.unconfigure();
        *current = None;
    }

    #[cfg(test)]
    pub async fn current_email(&self) -> Option<String> {
        self.current.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::secrets::testing::{MemoryCipher, UnavailableCipher};

    fn manager(dir: &tempfile::TempDir, base_url: &str) -> SessionManager {
        let store = CredentialStore::new(dir.path().to_path_buf(), Box::new(MemoryCipher));
        SessionManager::new(store, base_url)
    }

    async fn verify_ok(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(r#"{"success":true,"result":{"id":"u1","email":"ops@example.com"}}"#)
            .create_async()
            .await
    }

    async fn verify_rejected(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/user")
            .with_status(403)
            .with_body(r#"{"success":false,"errors":[{"code":9103,"message":"Unknown X-Auth-Key"}]}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn login_dispatch_logout_scenario() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;
        let _zones = server
            .mock("GET", "/zones?per_page=50")
            .with_status(200)
            .with_body(r#"{"success":true,"result":[{"id":"z1","name":"example.com"}]}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        session.login("ops@example.com", "key123").await.unwrap();
        assert_eq!(session.current_email().await.as_deref(), Some("ops@example.com"));

        let zones = session.gateway().dispatch("getZones", vec![]).await.unwrap();
        assert_eq!(zones[0]["name"], "example.com");

        session.logout().await.unwrap();
        let err = session.gateway().dispatch("getZones", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::api::gateway::GatewayError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn rejected_login_leaves_state_and_vault_untouched() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_rejected(&mut server).await;

        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        let err = session.login("ops@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed(_)));
        assert!(session.current_email().await.is_none());
        assert!(!session.gateway().is_configured());
        // No stale file from a rejected attempt.
        assert!(!dir.path().join("user-secrets.json").exists());
    }

    #[tokio::test]
    async fn login_fails_without_encryption_and_opens_no_session() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().to_path_buf(), Box::new(UnavailableCipher));
        let session = SessionManager::new(store, server.url());

        let err = session.login("ops@example.com", "key123").await.unwrap_err();
        assert!(matches!(err, AuthError::EncryptionUnavailable(_)));
        assert!(!session.gateway().is_configured());
    }

    #[tokio::test]
    async fn seal_failure_reports_persistence_not_unavailability() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(
            dir.path().to_path_buf(),
            Box::new(crate::auth::secrets::testing::SealFailureCipher),
        );
        let session = SessionManager::new(store, server.url());

        let err = session.login("ops@example.com", "key123").await.unwrap_err();
        assert!(matches!(err, AuthError::PersistenceFailed(_)));
        assert!(!session.gateway().is_configured());
    }

    #[tokio::test]
    async fn resume_without_saved_record_is_quietly_unauthenticated() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        let status = session.resume().await;
        assert!(!status.authenticated);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn resume_after_restart_with_valid_credential() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;
        let dir = tempfile::tempdir().unwrap();

        manager(&dir, &server.url())
            .login("ops@example.com", "key123")
            .await
            .unwrap();

        // Fresh manager over the same data dir, as after a process restart.
        let session = manager(&dir, &server.url());
        let status = session.resume().await;
        assert!(status.authenticated);
        assert_eq!(status.email.as_deref(), Some("ops@example.com"));
        assert!(session.gateway().is_configured());
    }

    #[tokio::test]
    async fn failed_resume_keeps_saved_record_and_stays_unauthenticated() {
        let mut server = mockito::Server::new_async().await;
        let verify = verify_ok(&mut server).await;
        let dir = tempfile::tempdir().unwrap();

        manager(&dir, &server.url())
            .login("ops@example.com", "key123")
            .await
            .unwrap();

        // Key revoked since last run.
        verify.remove_async().await;
        let _rejected = verify_rejected(&mut server).await;

        let session = manager(&dir, &server.url());
        let status = session.resume().await;
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("Saved token invalid"));
        assert!(!session.gateway().is_configured());
        // Record stays for a retry after the key/connectivity is fixed.
        assert!(dir.path().join("user-secrets.json").exists());
    }

    #[tokio::test]
    async fn failed_resume_ends_an_open_session() {
        let mut server = mockito::Server::new_async().await;
        let verify = verify_ok(&mut server).await;
        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        session.login("ops@example.com", "key123").await.unwrap();
        assert!(session.gateway().is_configured());

        // Key revoked while the session was open; the next check must tear
        // the session down, not just report unauthenticated.
        verify.remove_async().await;
        let _rejected = verify_rejected(&mut server).await;

        let status = session.resume().await;
        assert!(!status.authenticated);
        assert!(!session.gateway().is_configured());
        assert!(session.current_email().await.is_none());
        let err = session.gateway().dispatch("getZones", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::api::gateway::GatewayError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn resume_with_missing_record_ends_an_open_session() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;
        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        session.login("ops@example.com", "key123").await.unwrap();
        std::fs::remove_file(dir.path().join("user-secrets.json")).unwrap();

        let status = session.resume().await;
        assert!(!status.authenticated);
        assert!(!session.gateway().is_configured());
        assert!(session.current_email().await.is_none());
    }

    #[tokio::test]
    async fn login_overwrites_previous_credential() {
        let mut server = mockito::Server::new_async().await;
        let _verify = verify_ok(&mut server).await;
        let dir = tempfile::tempdir().unwrap();
        let session = manager(&dir, &server.url());

        session.login("first@example.com", "key-a").await.unwrap();
        session.login("second@example.com", "key-b").await.unwrap();
        assert_eq!(session.current_email().await.as_deref(), Some("second@example.com"));

        let session2 = manager(&dir, &server.url());
        let status = session2.resume().await;
        assert_eq!(status.email.as_deref(), Some("second@example.com"));
    }
}
