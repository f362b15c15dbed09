//! Credential context management
//!
//! A sweep may run under an alternate identity. The identity is established
//! once by a [`CredentialProvider`], shared read-only with every probe as a
//! [`CredentialContext`], and reverted by the [`CredentialGuard`] that owns it.

use crate::error::SweepError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Explicit credentials for the probing identity
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub domain: Option<String>,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: None,
            password: password.into(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// `DOMAIN\user`, or just `user` when no domain is set
    pub fn identity(&self) -> String {
        match &self.domain {
            Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, self.username),
            _ => self.username.clone(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
struct ContextInner {
    identity: String,
    handle: u64,
    credential: Option<Credential>,
}

/// Opaque handle for an established identity
///
/// Clones share the same underlying handle.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    inner: Arc<ContextInner>,
}

impl CredentialContext {
    /// Build a context. `handle` is whatever token the provider needs to
    /// revert the identity later.
    pub fn new(identity: impl Into<String>, handle: u64, credential: Option<Credential>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                identity: identity.into(),
                handle,
                credential,
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn handle(&self) -> u64 {
        self.inner.handle
    }

    /// Credential material for probes that authenticate explicitly
    pub fn credential(&self) -> Option<&Credential> {
        self.inner.credential.as_ref()
    }
}

/// Establishes and reverts the probing identity
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Establish the identity. Called at most once per sweep.
    async fn acquire(&self, credential: &Credential) -> Result<CredentialContext, SweepError>;

    /// Revert to the previous identity. Must not panic.
    fn release(&self, context: &CredentialContext);

    fn name(&self) -> &str;
}

/// Provider that performs no identity switch
///
/// The credential is validated and carried inside the context so probes can
/// pass it to the services they talk to.
#[derive(Debug, Default)]
pub struct PassThroughProvider;

#[async_trait]
impl CredentialProvider for PassThroughProvider {
    async fn acquire(&self, credential: &Credential) -> Result<CredentialContext, SweepError> {
        if credential.username.trim().is_empty() {
            return Err(SweepError::CredentialAcquisition(
                "username cannot be empty".to_string(),
            ));
        }

        let handle = rand::random::<u64>();
        log::debug!("Established pass-through context for {}", credential.identity());
        Ok(CredentialContext::new(
            credential.identity(),
            handle,
            Some(credential.clone()),
        ))
    }

    fn release(&self, context: &CredentialContext) {
        log::debug!("Released pass-through context for {}", context.identity());
    }

    fn name(&self) -> &str {
        "pass-through"
    }
}

/// Scoped owner of a credential context
///
/// The context is released exactly once: either by [`CredentialGuard::release`]
/// or, on every other exit path, when the guard is dropped.
pub struct CredentialGuard {
    provider: Option<Arc<dyn CredentialProvider>>,
    context: Option<CredentialContext>,
}

impl CredentialGuard {
    /// A guard that holds nothing; releasing it is a no-op
    pub fn empty() -> Self {
        Self {
            provider: None,
            context: None,
        }
    }

    /// Acquire `credential` through `provider`
    pub async fn acquire(
        provider: Arc<dyn CredentialProvider>,
        credential: &Credential,
    ) -> Result<Self, SweepError> {
        let context = provider.acquire(credential).await?;
        log::info!(
            "Acquired credential context for {} via {}",
            context.identity(),
            provider.name()
        );
        Ok(Self {
            provider: Some(provider),
            context: Some(context),
        })
    }

    pub fn context(&self) -> Option<&CredentialContext> {
        self.context.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.context.is_some()
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let (Some(provider), Some(context)) = (self.provider.as_ref(), self.context.take()) {
            provider.release(&context);
            log::info!("Reverted credential context for {}", context.identity());
        }
    }
}

impl Drop for CredentialGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGuard")
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn acquire(&self, credential: &Credential) -> Result<CredentialContext, SweepError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(CredentialContext::new(credential.identity(), 7, None))
        }

        fn release(&self, _context: &CredentialContext) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_identity_formatting() {
        let cred = Credential::new("alice", "s3cret").with_domain("CORP");
        assert_eq!(cred.identity(), "CORP\\alice");

        let local = Credential::new("admin", "pw");
        assert_eq!(local.identity(), "admin");
    }

    #[test]
    fn test_debug_redacts_password() {
        let cred = Credential::new("alice", "s3cret");
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_explicit_release_happens_once() {
        let provider = Arc::new(CountingProvider::default());
        let guard = CredentialGuard::acquire(provider.clone(), &Credential::new("bob", "pw"))
            .await
            .unwrap();
        assert!(guard.is_held());
        assert_eq!(guard.context().unwrap().handle(), 7);

        guard.release();
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let provider = Arc::new(CountingProvider::default());
        {
            let _guard = CredentialGuard::acquire(provider.clone(), &Credential::new("bob", "pw"))
                .await
                .unwrap();
        }
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_guard_release_is_noop() {
        let guard = CredentialGuard::empty();
        assert!(!guard.is_held());
        guard.release();
    }

    #[tokio::test]
    async fn test_pass_through_rejects_blank_user() {
        let provider = PassThroughProvider;
        let result = provider.acquire(&Credential::new("  ", "pw")).await;
        assert!(matches!(result, Err(SweepError::CredentialAcquisition(_))));
    }

    #[tokio::test]
    async fn test_pass_through_carries_credential() {
        let provider = PassThroughProvider;
        let ctx = provider
            .acquire(&Credential::new("carol", "pw").with_domain("LAB"))
            .await
            .unwrap();
        assert_eq!(ctx.identity(), "LAB\\carol");
        assert_eq!(ctx.credential().map(|c| c.password.as_str()), Some("pw"));
    }
}
