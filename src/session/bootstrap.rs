//! Session bootstrap: inject credentials and prove the session is logged in.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::CredentialBundle;
use crate::browser::BrowserSession;
use crate::config::SessionConfig;
use crate::error::HarvestError;

/// Turns a fresh browser session into an authenticated one.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `Ok(false)` when the session could not be authenticated, and
    /// `Err` only for browser failures.
    async fn authenticate(&self, session: &dyn BrowserSession) -> Result<bool, HarvestError>;
}

/// Where the bootstrapper gets its cookies.
enum CredentialSource {
    Loaded(Arc<CredentialBundle>),
    /// Re-read on every bootstrap.
    File(PathBuf),
}

/// Authenticates sessions from a read-only credential bundle.
pub struct SessionBootstrapper {
    config: SessionConfig,
    credentials: CredentialSource,
}

impl SessionBootstrapper {
    pub fn new(config: SessionConfig, credentials: Arc<CredentialBundle>) -> Self {
        Self {
            config,
            credentials: CredentialSource::Loaded(credentials),
        }
    }

    /// Read the bundle from `path` each time a session is bootstrapped, so
    /// a refreshed export takes effect without a restart.
    pub fn from_file(config: SessionConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            credentials: CredentialSource::File(path.into()),
        }
    }

    fn credentials(&self) -> Result<Arc<CredentialBundle>, HarvestError> {
        match &self.credentials {
            CredentialSource::Loaded(bundle) => Ok(Arc::clone(bundle)),
            CredentialSource::File(path) => Ok(Arc::new(CredentialBundle::load(path)?)),
        }
    }

    async fn identity_present(&self, session: &dyn BrowserSession) -> Result<bool, HarvestError> {
        let cookies = session.cookies().await?;
        Ok(cookies
            .iter()
            .any(|c| c.name == self.config.identity_cookie && !c.value.is_empty()))
    }

    async fn reload_and_verify(
        &self,
        session: &dyn BrowserSession,
        pass: u32,
    ) -> Result<bool, HarvestError> {
        session.reload().await?;
        tokio::time::sleep(self.config.settle()).await;
        let present = self.identity_present(session).await?;
        if !present {
            warn!(
                pass,
                cookie = %self.config.identity_cookie,
                "Identity cookie missing after reload"
            );
        }
        Ok(present)
    }
}

#[async_trait]
impl Authenticator for SessionBootstrapper {
    async fn authenticate(&self, session: &dyn BrowserSession) -> Result<bool, HarvestError> {
        session.navigate(&self.config.base_url).await?;

        let credentials = self.credentials()?;
        if !credentials.contains(&self.config.identity_cookie) {
            warn!(
                cookie = %self.config.identity_cookie,
                "Credential bundle has no identity cookie; refusing to inject"
            );
            return Ok(false);
        }

        session.clear_cookies().await?;

        let cookies = credentials.normalized(&self.config.cookie_domain);
        let mut injected = 0usize;
        for cookie in &cookies {
            match session.set_cookie(cookie).await {
                Ok(()) => injected += 1,
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => warn!("Failed to set cookie {}: {}", cookie.name, e),
            }
        }
        debug!(injected, total = cookies.len(), "Injected credential cookies");

        // Verified twice: the platform sometimes drops a session on the
        // first authenticated load.
        if !self.reload_and_verify(session, 1).await? {
            return Ok(false);
        }
        if !self.reload_and_verify(session, 2).await? {
            return Ok(false);
        }

        info!("Session authenticated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionCookie;
    use std::sync::Mutex;

    /// Records calls and keeps a cookie jar; can drop the identity cookie
    /// after a number of reloads.
    #[derive(Default)]
    struct FakeSession {
        calls: Mutex<Vec<String>>,
        jar: Mutex<Vec<SessionCookie>>,
        reloads: Mutex<u32>,
        drop_identity_on_reload: Option<u32>,
    }

    impl FakeSession {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
            self.calls.lock().unwrap().push(format!("navigate {}", url));
            Ok(())
        }

        async fn reload(&self) -> Result<(), HarvestError> {
            self.calls.lock().unwrap().push("reload".to_string());
            let mut reloads = self.reloads.lock().unwrap();
            *reloads += 1;
            if Some(*reloads) == self.drop_identity_on_reload {
                self.jar.lock().unwrap().retain(|c| c.name != "c_user");
            }
            Ok(())
        }

        async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, HarvestError> {
            Ok(serde_json::Value::Null)
        }

        async fn cookies(&self) -> Result<Vec<SessionCookie>, HarvestError> {
            Ok(self.jar.lock().unwrap().clone())
        }

        async fn clear_cookies(&self) -> Result<(), HarvestError> {
            self.calls.lock().unwrap().push("clear".to_string());
            self.jar.lock().unwrap().clear();
            Ok(())
        }

        async fn set_cookie(&self, cookie: &SessionCookie) -> Result<(), HarvestError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("set {}@{}", cookie.name, cookie.domain));
            self.jar.lock().unwrap().push(cookie.clone());
            Ok(())
        }

        async fn close(&self) -> Result<(), HarvestError> {
            Ok(())
        }
    }

    fn bootstrapper(bundle: &str) -> SessionBootstrapper {
        let config = SessionConfig {
            settle_ms: 0,
            ..Default::default()
        };
        SessionBootstrapper::new(
            config,
            Arc::new(CredentialBundle::from_json(bundle).unwrap()),
        )
    }

    #[tokio::test]
    async fn refuses_bundle_without_identity_cookie() {
        let session = FakeSession::default();
        let auth = bootstrapper(r#"[{"name": "xs", "value": "abc"}]"#);

        assert!(!auth.authenticate(&session).await.unwrap());

        let calls = session.calls();
        assert_eq!(calls, vec!["navigate https://www.facebook.com/".to_string()]);
    }

    #[tokio::test]
    async fn injects_into_parent_domain_and_verifies_twice() {
        let session = FakeSession::default();
        let auth = bootstrapper(
            r#"[{"name": "c_user", "value": "1", "domain": "www.facebook.com"},
                {"name": "xs", "value": "abc", "domain": "m.facebook.com"}]"#,
        );

        assert!(auth.authenticate(&session).await.unwrap());

        let calls = session.calls();
        assert_eq!(
            calls,
            vec![
                "navigate https://www.facebook.com/",
                "clear",
                "set c_user@.facebook.com",
                "set xs@.facebook.com",
                "reload",
                "reload",
            ]
        );
    }

    #[tokio::test]
    async fn fails_when_identity_disappears_on_second_load() {
        let session = FakeSession {
            drop_identity_on_reload: Some(2),
            ..Default::default()
        };
        let auth = bootstrapper(r#"[{"name": "c_user", "value": "1"}]"#);

        assert!(!auth.authenticate(&session).await.unwrap());
    }

    #[tokio::test]
    async fn rereads_bundle_file_on_each_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, r#"[{"name": "xs", "value": "abc"}]"#).unwrap();

        let config = SessionConfig {
            settle_ms: 0,
            ..Default::default()
        };
        let auth = SessionBootstrapper::from_file(config, path.clone());

        assert!(!auth.authenticate(&FakeSession::default()).await.unwrap());

        std::fs::write(&path, r#"[{"name": "c_user", "value": "1"}]"#).unwrap();
        assert!(auth.authenticate(&FakeSession::default()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_bundle_file_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SessionBootstrapper::from_file(
            SessionConfig::default(),
            dir.path().join("missing.json"),
        );

        let err = auth.authenticate(&FakeSession::default()).await.unwrap_err();
        assert!(matches!(err, HarvestError::Credentials(_)));
        assert!(!err.is_session_fatal());
    }
}
