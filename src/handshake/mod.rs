//! The NTLM handshake as a `tower` layer.
//!
//! Flow Overview:
//! 1) Requests without `Authorization: NTLM` either reuse a principal already
//!    bound to their session or get a bare `401` challenge.
//! 2) A type 1 message gets a fresh server challenge, remembered per client,
//!    and the engine's type 2 reply.
//! 3) Any other message consumes the remembered challenge, is validated by the
//!    engine and, on success, binds the principal to the session before the
//!    request is forwarded.

mod identity;
mod message;
mod response;
mod service;

pub use message::{ntlm_payload, NtlmMessage, NEGOTIATE, SCHEME};
pub use service::NtlmService;

use axum::{extract::Request, response::Response};
use std::{fmt, sync::Arc};
use tower::Layer;
use tracing::info;

use crate::{
    cache::{ChallengeCache, MemoryChallengeCache},
    config::{CacheSettings, ConfigSnapshot, ConfigSource},
    engine::CryptoEngine,
    error::{AuthenticationError, InitializationError},
    session::{MemorySessionStore, SessionBinder, DEFAULT_SESSION_COOKIE},
};

/// Authenticated user name, inserted into request extensions next to the
/// full [`crate::Principal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteUser(pub String);

impl RemoteUser {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Decides whether a request goes through the handshake at all.
pub type RequestFilter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Builds the response for a rejected authenticate message, given the
/// request that carried it.
pub type FailureHandler = Arc<dyn Fn(&Request, &AuthenticationError) -> Response + Send + Sync>;

type CacheFactory<'a> =
    Box<dyn FnOnce(CacheSettings) -> Result<Arc<dyn ChallengeCache>, InitializationError> + 'a>;
type EngineFactory<'a> =
    Box<dyn FnOnce(&ConfigSnapshot) -> Result<Arc<dyn CryptoEngine>, InitializationError> + 'a>;

/// Everything a running handshake needs; shared by all service clones.
pub(crate) struct Handshake {
    pub(crate) cache: Arc<dyn ChallengeCache>,
    pub(crate) engine: Arc<dyn CryptoEngine>,
    pub(crate) sessions: Arc<dyn SessionBinder>,
    pub(crate) cookie_name: String,
    pub(crate) secure_cookie: bool,
    pub(crate) trust_forwarded: bool,
    pub(crate) should_handle: Option<RequestFilter>,
    pub(crate) on_failure: Option<FailureHandler>,
}

/// `tower` layer running the NTLM handshake in front of the wrapped service.
///
/// A disabled layer holds no cache or engine and forwards every request.
#[derive(Clone, Default)]
pub struct NtlmLayer {
    handshake: Option<Arc<Handshake>>,
}

impl NtlmLayer {
    /// Start building a layer from `config`. Nothing is validated or
    /// constructed until [`NtlmLayerBuilder::build`].
    pub fn builder(config: &dyn ConfigSource) -> NtlmLayerBuilder<'_> {
        NtlmLayerBuilder {
            config,
            cache: None,
            engine: None,
            sessions: None,
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            secure_cookie: false,
            trust_forwarded: false,
            should_handle: None,
            on_failure: None,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { handshake: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.handshake.is_some()
    }

    /// Dispose the challenge cache. Call once when the server stops.
    pub async fn shutdown(&self) {
        if let Some(handshake) = &self.handshake {
            handshake.cache.dispose().await;
        }
    }
}

impl fmt::Debug for NtlmLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmLayer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<S> Layer<S> for NtlmLayer {
    type Service = NtlmService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NtlmService::new(inner, self.handshake.clone())
    }
}

pub struct NtlmLayerBuilder<'a> {
    config: &'a dyn ConfigSource,
    cache: Option<CacheFactory<'a>>,
    engine: Option<EngineFactory<'a>>,
    sessions: Option<Arc<dyn SessionBinder>>,
    cookie_name: String,
    secure_cookie: bool,
    trust_forwarded: bool,
    should_handle: Option<RequestFilter>,
    on_failure: Option<FailureHandler>,
}

impl<'a> NtlmLayerBuilder<'a> {
    /// Challenge cache backend; defaults to [`MemoryChallengeCache`].
    #[must_use]
    pub fn cache<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(CacheSettings) -> Result<Arc<dyn ChallengeCache>, InitializationError> + 'a,
    {
        self.cache = Some(Box::new(factory));
        self
    }

    /// Crypto engine, built from the validated configuration. Required.
    #[must_use]
    pub fn engine<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&ConfigSnapshot) -> Result<Arc<dyn CryptoEngine>, InitializationError> + 'a,
    {
        self.engine = Some(Box::new(factory));
        self
    }

    /// Session store; defaults to a fresh [`MemorySessionStore`].
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<dyn SessionBinder>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Mark the session cookie `Secure` (serve over HTTPS only).
    #[must_use]
    pub fn secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    /// Key challenges by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only safe behind a proxy that overwrites these headers.
    #[must_use]
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Requests for which `filter` returns `false` skip the handshake.
    #[must_use]
    pub fn should_handle<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Some(Arc::new(filter));
        self
    }

    /// Response for rejected authenticate messages. Defaults to a bare `401`
    /// restarting the handshake.
    #[must_use]
    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request, &AuthenticationError) -> Response + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration and construct the collaborators.
    ///
    /// When the configuration is disabled neither factory runs.
    ///
    /// # Errors
    /// Returns an `InitializationError` for invalid configuration, a missing
    /// engine, or a failing cache/engine factory.
    pub fn build(self) -> Result<NtlmLayer, InitializationError> {
        if !self.config.is_enabled() {
            info!("NTLMv2 filter disabled");
            return Ok(NtlmLayer::disabled());
        }

        info!("Initializing NTLMv2 filter");

        let snapshot = ConfigSnapshot::load(self.config)?;
        let engine_factory = self.engine.ok_or(InitializationError::MissingEngine)?;

        // Engine first: a failing engine must not leave a live cache behind.
        let engine = engine_factory(&snapshot)?;

        let cache: Arc<dyn ChallengeCache> = match self.cache {
            Some(factory) => factory(snapshot.cache())?,
            None => Arc::new(MemoryChallengeCache::new(snapshot.cache())?),
        };

        let sessions: Arc<dyn SessionBinder> = match self.sessions {
            Some(sessions) => sessions,
            None => Arc::new(MemorySessionStore::new()),
        };

        info!("NTLMv2 filter initialized");

        Ok(NtlmLayer {
            handshake: Some(Arc::new(Handshake {
                cache,
                engine,
                sessions,
                cookie_name: self.cookie_name,
                secure_cookie: self.secure_cookie,
                trust_forwarded: self.trust_forwarded,
                should_handle: self.should_handle,
                on_failure: self.on_failure,
            })),
        })
    }
}
