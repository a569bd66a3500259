//! Boundary collaborators consumed by the core.
//!
//! Credential issuance and binary object storage live outside this crate;
//! the core consumes them through the [`AuthVerifier`] and [`ObjectStore`]
//! traits. The implementations shipped here back the binary and the test
//! suite — production deployments plug in their own.

use std::collections::HashMap;

use courier_proto::message::PrincipalId;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Error returned when a connection token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The token is empty.
    #[error("empty token")]
    EmptyToken,
    /// The token does not map to a known principal.
    #[error("invalid credentials")]
    InvalidToken,
}

/// Validates an opaque connection token into a verified principal.
///
/// The core trusts the returned identifier without re-validating
/// credentials on later requests from the same connection.
pub trait AuthVerifier: Send + Sync {
    /// Verifies `token` and returns the principal it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the token is rejected.
    fn verify(&self, token: &str) -> Result<PrincipalId, AuthError>;
}

/// Development verifier: any non-empty token names its own principal.
///
/// Used by the binary when no real identity provider is wired in, and by
/// most tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenVerifier;

impl AuthVerifier for OpenVerifier {
    fn verify(&self, token: &str) -> Result<PrincipalId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(PrincipalId::new(token))
    }
}

/// Verifier backed by a fixed token-to-principal table.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, PrincipalId>,
}

impl StaticTokenVerifier {
    /// Creates an empty table rejecting every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token mapping to the table.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: PrincipalId) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl AuthVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<PrincipalId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Error returned by object-storage uploads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectStoreError {
    /// The upload carried no bytes.
    #[error("empty upload")]
    Empty,
    /// The storage backend is unreachable or refused the upload.
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

/// Accepts raw bytes plus a logical folder tag and returns a stable,
/// resolvable URL.
///
/// The core only ever stores and forwards the returned URL; the raw bytes
/// never enter a message record.
pub trait ObjectStore: Send + Sync + 'static {
    /// Uploads `bytes` under the given folder and returns the object URL.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the upload is rejected or the
    /// backend is unreachable.
    fn put(
        &self,
        bytes: Vec<u8>,
        folder: &str,
    ) -> impl std::future::Future<Output = Result<String, ObjectStoreError>> + Send;
}

/// In-process object store handing out `mem://` URLs.
///
/// Backs the binary and the test suite; contents are retrievable by URL
/// for assertions.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bytes stored under `url`, if any.
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(url).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns true when nothing has been uploaded yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bytes: Vec<u8>, folder: &str) -> Result<String, ObjectStoreError> {
        if bytes.is_empty() {
            return Err(ObjectStoreError::Empty);
        }
        let url = format!("mem://{folder}/{}", Uuid::new_v4());
        self.objects.write().await.insert(url.clone(), bytes);
        Ok(url)
    }
}
