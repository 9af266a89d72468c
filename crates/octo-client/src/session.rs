//! Session: root document negotiation and typed CRUD over the transport.
//!
//! # Design
//!
//! - Establishment is an explicit state machine (`Uninitialized -> Establishing -> Ready | Failed`)
//!   behind an async mutex, so concurrent first callers run it once and share its outcome.
//! - A failed establishment is terminal; every later call returns the same error.
//! - Every path except the initial `/api` fetch goes through the [`LinkResolver`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::codec::{Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::link::{LinkResolver, QueryString};
use crate::model::{Resource, RootDocument};
use crate::transport::Transport;
use crate::version::VersionRange;

/// Path of the root capability document.
pub const ROOT_PATH: &str = "/api";

/// Observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Root document not fetched yet.
    Uninitialized,
    /// Root document fetch in flight.
    Establishing,
    /// Root document fetched and version validated.
    Ready,
    /// Establishment failed; the session is unusable.
    Failed,
}

const UNINITIALIZED: u8 = 0;
const ESTABLISHING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

enum SessionState {
    Uninitialized,
    Ready(Arc<RootDocument>),
    Failed(ClientError),
}

/// One logical conversation with a server.
pub struct Session<C: Codec = JsonCodec> {
    transport: Transport<C>,
    resolver: LinkResolver,
    supported_versions: VersionRange,
    state: Mutex<SessionState>,
    lifecycle: AtomicU8,
}

impl Session<JsonCodec> {
    /// Build a JSON session from configuration. No request is sent until first use.
    ///
    /// # Errors
    ///
    /// See [`Transport::new`].
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::from_parts(
            Transport::new(config)?,
            LinkResolver::new(&config.server),
            config.supported_versions.clone(),
        ))
    }
}

impl<C: Codec> Session<C> {
    /// Assemble a session from an existing transport and resolver.
    pub fn from_parts(
        transport: Transport<C>,
        resolver: LinkResolver,
        supported_versions: VersionRange,
    ) -> Self {
        Self {
            transport,
            resolver,
            supported_versions,
            state: Mutex::new(SessionState::Uninitialized),
            lifecycle: AtomicU8::new(UNINITIALIZED),
        }
    }

    /// Link resolver used for every request.
    pub const fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    /// Current lifecycle state. Never waits on the establishment lock.
    pub fn status(&self) -> SessionStatus {
        match self.lifecycle.load(Ordering::Acquire) {
            READY => SessionStatus::Ready,
            FAILED => SessionStatus::Failed,
            // An abandoned establishment leaves the marker behind but releases the lock.
            ESTABLISHING if self.state.try_lock().is_err() => SessionStatus::Establishing,
            _ => SessionStatus::Uninitialized,
        }
    }

    /// Establish the session now instead of on first use.
    ///
    /// # Errors
    ///
    /// See [`Session::root_document`].
    pub async fn initialize(&self) -> ClientResult<()> {
        self.root_document().await.map(|_| ())
    }

    /// Root capability document, fetched and validated at most once.
    ///
    /// # Errors
    ///
    /// Returns the transport error from the root fetch, or
    /// [`ClientError::IncompatibleServer`] when the server's API version is missing or
    /// outside the supported range. Either failure is cached for the session's lifetime.
    pub async fn root_document(&self) -> ClientResult<Arc<RootDocument>> {
        let mut state = self.state.lock().await;
        match &*state {
            SessionState::Ready(root) => return Ok(Arc::clone(root)),
            SessionState::Failed(err) => return Err(err.clone()),
            SessionState::Uninitialized => {}
        }

        self.lifecycle.store(ESTABLISHING, Ordering::Release);
        match self.establish().await {
            Ok(root) => {
                let root = Arc::new(root);
                *state = SessionState::Ready(Arc::clone(&root));
                self.lifecycle.store(READY, Ordering::Release);
                Ok(root)
            }
            Err(err) => {
                *state = SessionState::Failed(err.clone());
                self.lifecycle.store(FAILED, Ordering::Release);
                Err(err)
            }
        }
    }

    async fn establish(&self) -> ClientResult<RootDocument> {
        let uri = self.resolver.resolve(ROOT_PATH)?;
        debug!(uri = %uri, "establishing session");
        let root: RootDocument = self.transport.get(&uri).await?;
        let version = self.supported_versions.check(&root.api_version)?;
        info!(
            api_version = %version,
            server_version = root.version.as_deref().unwrap_or("unknown"),
            "session established"
        );
        Ok(root)
    }

    /// Resolve a path and make sure the session is ready before it is used.
    async fn qualify(&self, path: &str, query: Option<&QueryString>) -> ClientResult<Url> {
        let uri = match query {
            Some(query) => self.resolver.resolve_with_query(path, query)?,
            None => self.resolver.resolve(path)?,
        };
        self.root_document().await?;
        Ok(uri)
    }

    /// Fetch a resource.
    ///
    /// # Errors
    ///
    /// Establishment, transport, or decode errors.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let uri = self.qualify(path, None).await?;
        self.transport.get(&uri).await
    }

    /// Fetch a resource with query parameters merged into the path's own query.
    ///
    /// # Errors
    ///
    /// Establishment, transport, or decode errors.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryString,
    ) -> ClientResult<T> {
        let uri = self.qualify(path, Some(query)).await?;
        self.transport.get(&uri).await
    }

    /// Fetch a JSON array of resources.
    ///
    /// # Errors
    ///
    /// Establishment, transport, or decode errors.
    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> ClientResult<Vec<T>> {
        self.get(path).await
    }

    /// Fetch a JSON array of resources with query parameters.
    ///
    /// # Errors
    ///
    /// Establishment, transport, or decode errors.
    pub async fn list_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryString,
    ) -> ClientResult<Vec<T>> {
        self.get_with_query(path, query).await
    }

    /// Create a resource and return the server's representation of it.
    ///
    /// The resource is re-read from the `Location` the server reports; the request body is
    /// never echoed back.
    ///
    /// # Errors
    ///
    /// Establishment, transport, encode or decode errors, or
    /// [`ClientError::MissingLocation`].
    pub async fn create<T: Resource>(&self, path: &str, resource: &T) -> ClientResult<T> {
        let uri = self.qualify(path, None).await?;
        let location = self.transport.post(&uri, resource).await?;
        let created = self.resolver.resolve(&location)?;
        self.transport.get(&created).await
    }

    /// Replace a resource, then re-read it from the same path.
    ///
    /// # Errors
    ///
    /// Establishment, transport, encode or decode errors.
    pub async fn update<T: Resource>(&self, path: &str, resource: &T) -> ClientResult<T> {
        let uri = self.qualify(path, None).await?;
        self.transport.put(&uri, resource).await?;
        let mut canonical = uri;
        canonical.set_query(None);
        self.transport.get(&canonical).await
    }

    /// Delete a resource.
    ///
    /// # Errors
    ///
    /// Establishment or transport errors.
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        let uri = self.qualify(path, None).await?;
        self.transport.delete(&uri).await
    }

    /// Browser URL for a path on the server's web interface.
    ///
    /// # Errors
    ///
    /// See [`LinkResolver::web_link`].
    pub fn web_link(&self, path: &str) -> ClientResult<Url> {
        self.resolver.web_link(path)
    }
}
