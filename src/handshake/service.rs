use axum::{extract::Request, http::header::SET_COOKIE, response::Response};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::Service;
use tracing::{debug, debug_span, error, field, info, warn, Instrument, Span};

use super::{identity, message::ntlm_payload, response, Handshake, NtlmMessage, RemoteUser};
use crate::{
    cache::{ClientIdentity, ServerChallenge},
    engine::{EngineError, Principal},
    error::AuthenticationError,
    session::{extract_session_id, session_cookie, SessionId},
};

/// Service produced by [`super::NtlmLayer`].
#[derive(Clone)]
pub struct NtlmService<S> {
    inner: S,
    handshake: Option<Arc<Handshake>>,
}

impl<S> NtlmService<S> {
    pub(crate) fn new(inner: S, handshake: Option<Arc<Handshake>>) -> Self {
        Self { inner, handshake }
    }
}

impl<S> Service<Request> for NtlmService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone may not be ready; keep the one `poll_ready` was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let Some(handshake) = self.handshake.clone() else {
            return Box::pin(inner.call(request));
        };

        let span = debug_span!("ntlm.handshake", client = field::Empty);
        Box::pin(handshake.handle(inner, request).instrument(span))
    }
}

impl Handshake {
    async fn handle<S>(
        self: Arc<Self>,
        mut inner: S,
        mut request: Request,
    ) -> Result<Response, S::Error>
    where
        S: Service<Request, Response = Response>,
    {
        if self
            .should_handle
            .as_ref()
            .is_some_and(|filter| !filter(&request))
        {
            debug!("Request exempt from NTLM authentication");
            return inner.call(request).await;
        }

        if request.extensions().get::<RemoteUser>().is_some() {
            return inner.call(request).await;
        }

        let session = extract_session_id(request.headers(), &self.cookie_name);

        let payload = ntlm_payload(request.headers()).map(str::to_owned);
        let Some(payload) = payload else {
            return match self.session_principal(session.as_ref()).await {
                Some(principal) => {
                    debug!(user = %principal.username, "Principal restored from session");
                    decorate(&mut request, principal);
                    inner.call(request).await
                }
                None => Ok(response::start_handshake()),
            };
        };

        let message = match NtlmMessage::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                debug!("Restarting handshake: {err}");
                return Ok(response::start_handshake());
            }
        };

        let client = identity::resolve(&request, self.trust_forwarded);
        let Some(client) = client else {
            debug!("Restarting handshake: {}", AuthenticationError::UnknownClient);
            return Ok(response::start_handshake());
        };
        Span::current().record("client", client.as_str());

        if message.is_negotiate() {
            return Ok(self.negotiate(&client, &message).await);
        }

        let principal = match self.authenticate(&client, &message).await {
            Ok(principal) => principal,
            Err(Rejection::Restart) => return Ok(response::start_handshake()),
            Err(Rejection::Fault) => return Ok(response::fault()),
            Err(Rejection::Failed(err)) => {
                warn!("{err}");
                return Ok(self
                    .on_failure
                    .as_ref()
                    .map_or_else(response::start_handshake, |handler| handler(&request, &err)));
            }
        };

        let binding = match self.sessions.bind(session.as_ref(), &principal).await {
            Ok(binding) => binding,
            Err(err) => {
                error!("Failed to bind principal to session: {err}");
                return Ok(response::fault());
            }
        };

        info!(user = %principal.username, "NTLM authentication succeeded");
        decorate(&mut request, principal);

        let mut response = inner.call(request).await?;
        if binding.created {
            match session_cookie(&self.cookie_name, &binding.session, self.secure_cookie) {
                Ok(cookie) => {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
                Err(err) => warn!("Failed to build session cookie: {err}"),
            }
        }
        Ok(response)
    }

    /// Type 1: issue a fresh challenge and answer with the engine's type 2.
    async fn negotiate(&self, client: &ClientIdentity, message: &NtlmMessage) -> Response {
        let challenge = match ServerChallenge::generate() {
            Ok(challenge) => challenge,
            Err(err) => {
                error!("Failed to generate server challenge: {err}");
                return response::fault();
            }
        };

        let type2 = match self.engine.negotiate(message.as_bytes(), &challenge).await {
            Ok(type2) => type2,
            Err(EngineError::Rejected(reason)) => {
                debug!("Negotiate message rejected: {reason}");
                return response::start_handshake();
            }
            Err(EngineError::Fault(err)) => {
                error!("NTLM engine failed to negotiate: {err:#}");
                return response::fault();
            }
        };

        self.cache.put(client, challenge).await;
        debug!("Issued server challenge");

        response::challenge(&type2)
    }

    /// Type 3: consume the challenge and validate the response.
    async fn authenticate(
        &self,
        client: &ClientIdentity,
        message: &NtlmMessage,
    ) -> Result<Principal, Rejection> {
        let Some(challenge) = self.cache.get(client).await else {
            debug!(
                "Restarting handshake: {}",
                AuthenticationError::ChallengeNotFound(client.to_string())
            );
            return Err(Rejection::Restart);
        };

        let outcome = self.engine.authenticate(message.as_bytes(), &challenge).await;
        // Single use, whatever the outcome.
        self.cache.remove(client).await;

        match outcome {
            Ok(principal) => Ok(principal),
            Err(EngineError::Rejected(reason)) => {
                Err(Rejection::Failed(AuthenticationError::Rejected(reason)))
            }
            Err(EngineError::Fault(err)) => {
                error!("NTLM engine failed to authenticate: {err:#}");
                Err(Rejection::Fault)
            }
        }
    }

    async fn session_principal(&self, session: Option<&SessionId>) -> Option<Principal> {
        match self.sessions.lookup(session).await {
            Ok(principal) => principal,
            Err(err) => {
                warn!("Session lookup failed: {err}");
                None
            }
        }
    }
}

/// Why an authenticate message did not produce a principal.
enum Rejection {
    /// No challenge in flight; answered with a bare challenge.
    Restart,
    /// The engine rejected the response; answered by the failure hook.
    Failed(AuthenticationError),
    Fault,
}

fn decorate(request: &mut Request, principal: Principal) {
    let extensions = request.extensions_mut();
    extensions.insert(RemoteUser(principal.username.clone()));
    extensions.insert(principal);
}
