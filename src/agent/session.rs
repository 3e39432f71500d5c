//! Per-connection protocol state machine.
//!
//! A [`Session`] owns one client conversation: it accumulates session
//! bindings, gates everything on the manager lock, and answers one reply per
//! request in order. The transport hands it either decoded requests
//! ([`Session::handle`]) or raw byte batches ([`Session::ingest`]); the
//! byte-level entry point parses as many complete frames as are present and
//! buffers only the remainder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ssh_encoding::Decode;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, warn};

use super::hooks::SessionHooks;
use crate::codec::Codec;
use crate::crypto::{self, CryptoError};
use crate::error::AgentError;
use crate::key::events::SessionId;
use crate::key::identity::identity_permitted;
use crate::key::manager::KeySnapshot;
use crate::key::KeyManager;
use crate::proto::extension::{MatchInfo, MessageExtension, SessionBind};
use crate::proto::message::Identity;
use crate::proto::{Extension, ProtoError, Request, Response, SignRequest, UserAuthRequest};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One accepted `session-bind@openssh.com` binding.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SessionBinding {
    /// Host key the client bound to, as a raw public wire blob.
    pub host_key: Vec<u8>,

    /// Session identifier from the client's key exchange.
    pub session_id: Vec<u8>,

    /// Whether the binding is for forwarding.
    pub forwarded: bool,
}

/// Borrowed view of a session's binding state, as consumed by the
/// constraint evaluator and [`KeyManager::list`].
#[derive(Clone, Copy, Debug)]
pub struct SessionScope<'a> {
    /// Accepted bindings, in arrival order.
    pub bindings: &'a [SessionBinding],

    /// Whether any session-bind failed; a failed session never signs again.
    pub binding_failed: bool,
}

/// A single agent ↔ client conversation.
pub struct Session {
    id: SessionId,
    manager: Arc<KeyManager>,
    hooks: Arc<dyn SessionHooks>,
    client: String,
    bindings: Vec<SessionBinding>,
    binding_failed: bool,
    is_forwarded: bool,
    match_info: MatchInfo,
    waiting_for_confirmation: bool,
    waiting_for_key_selection: bool,
    buffer: BytesMut,
    codec: Codec<Request, Response>,
}

impl Session {
    /// Create a session bound to a shared key manager and embedder hooks.
    ///
    /// `client` is a display string describing the peer (socket address,
    /// peer credentials, pipe client PID).
    pub fn new(
        manager: Arc<KeyManager>,
        hooks: Arc<dyn SessionHooks>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            manager,
            hooks,
            client: client.into(),
            bindings: Vec::new(),
            binding_failed: false,
            is_forwarded: false,
            match_info: MatchInfo::default(),
            waiting_for_confirmation: false,
            waiting_for_key_selection: false,
            buffer: BytesMut::new(),
            codec: Codec::default(),
        }
    }

    /// This session's identifier, as reported in key events.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display string describing the connected client.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Accepted session bindings, in arrival order.
    pub fn bindings(&self) -> &[SessionBinding] {
        &self.bindings
    }

    /// Whether any binding on this session was a forwarding bind.
    pub fn is_forwarded(&self) -> bool {
        self.is_forwarded
    }

    /// Whether a session-bind failed, poisoning this session.
    pub fn binding_failed(&self) -> bool {
        self.binding_failed
    }

    /// Feed raw transport bytes; returns the serialized replies, one per
    /// complete frame, in request order.
    ///
    /// Malformed frames produce a FAILURE reply and the session continues;
    /// only programmer errors ([`AgentError::ConcurrentRequest`]) surface as
    /// `Err`, and the caller must then drop the session.
    pub async fn ingest(&mut self, bytes: &[u8]) -> Result<Vec<u8>, AgentError> {
        self.buffer.extend_from_slice(bytes);

        let mut replies = BytesMut::new();
        loop {
            let response = match self.codec.decode(&mut self.buffer) {
                Ok(Some(request)) => self.handle(request).await?,
                Ok(None) => break,
                // An over-limit length leaves the stream unframeable; there
                // is no boundary to resynchronize on, so the session dies.
                Err(error @ AgentError::Proto(ProtoError::MessageTooLarge { .. })) => {
                    return Err(error)
                }
                Err(error) => {
                    warn!(session = self.id, %error, "failed to parse frame");
                    Response::Failure
                }
            };
            self.codec.encode(response, &mut replies)?;
        }

        Ok(replies.to_vec())
    }

    /// Process one decoded request and produce its reply.
    pub async fn handle(&mut self, request: Request) -> Result<Response, AgentError> {
        if self.manager.is_locked() && !matches!(request, Request::Unlock(_)) {
            warn!(
                session = self.id,
                message = request.type_name(),
                "agent is locked; rejecting message"
            );
            return Ok(Response::Failure);
        }

        debug!(session = self.id, message = request.type_name(), "processing message");
        match request {
            Request::AddIdentity(add) => {
                Ok(self.reply(self.manager.add(add.credential).map(|_| ())))
            }
            Request::AddIdConstrained(add) => Ok(self.reply(
                self.manager
                    .add_constrained(add.identity.credential, &add.constraints)
                    .map(|_| ()),
            )),
            Request::RemoveIdentity(remove) => {
                self.manager.remove(&remove.pubkey);
                Ok(Response::Success)
            }
            Request::RemoveAllIdentities | Request::RemoveAllRsaIdentities => {
                self.manager.remove_all();
                Ok(Response::Success)
            }
            Request::SignRequest(request) => self.handle_sign(request).await,
            Request::RequestIdentities => self.handle_request_identities().await,
            Request::Extension(extension) => self.handle_extension(extension).await,
            Request::Lock(passphrase) => {
                Ok(self.reply(self.manager.lock(passphrase.as_slice())))
            }
            Request::Unlock(passphrase) => {
                Ok(self.reply(self.manager.unlock(passphrase.as_slice())))
            }
            Request::AddSmartcardKey(_)
            | Request::RemoveSmartcardKey(_)
            | Request::AddSmartcardKeyConstrained(_) => {
                warn!(session = self.id, "smartcard keys are not supported");
                Ok(Response::Failure)
            }
        }
    }

    fn reply<E: std::fmt::Display>(&self, outcome: Result<(), E>) -> Response {
        match outcome {
            Ok(()) => Response::Success,
            Err(error) => {
                error!(session = self.id, %error, "request failed");
                Response::Failure
            }
        }
    }

    async fn handle_sign(&mut self, request: SignRequest) -> Result<Response, AgentError> {
        if self.waiting_for_confirmation {
            return Err(AgentError::ConcurrentRequest);
        }
        self.waiting_for_confirmation = true;
        let response = self.sign_gated(request).await;
        self.waiting_for_confirmation = false;
        self.match_info.clear();
        response
    }

    async fn sign_gated(&mut self, request: SignRequest) -> Result<Response, AgentError> {
        let Some(snapshot) = self.manager.snapshot(&request.pubkey) else {
            error!(session = self.id, "key not found for signing");
            return Ok(Response::Failure);
        };

        if !snapshot.dest_constraints.is_empty()
            && !self.check_destination(&snapshot, &request.data)
        {
            return Ok(Response::Failure);
        }

        let needs_confirmation = snapshot.confirm_required
            || self.hooks.requires_confirmation(&snapshot.info).await;
        if needs_confirmation && !self.hooks.confirm(&snapshot.info, &self.match_info).await {
            warn!(session = self.id, "sign request not confirmed by user");
            self.manager.emit_key_declined(&snapshot.info, self.id);
            return Ok(Response::Failure);
        }

        match self.manager.sign(&request.pubkey, &request.data, request.flags) {
            Ok(signature) => {
                self.manager.emit_key_used(&snapshot.info, self.id);
                Ok(Response::SignResponse(signature))
            }
            Err(error) => {
                error!(session = self.id, %error, "signing failed");
                Ok(Response::Failure)
            }
        }
    }

    /// Destination gating for a constrained key: the data to be signed must
    /// be a hostbound userauth request whose user passes the constraint walk
    /// and whose session identifier equals the last accepted binding's.
    fn check_destination(&mut self, snapshot: &KeySnapshot, data: &[u8]) -> bool {
        debug!(
            session = self.id,
            bindings = self.bindings.len(),
            "key has destination constraints, checking session bindings"
        );

        if self.bindings.is_empty() {
            warn!(session = self.id, "refusing sign request: no session bindings");
            return false;
        }

        let userauth = match UserAuthRequest::decode(&mut &data[..]) {
            Ok(userauth) => userauth,
            Err(error) => {
                warn!(session = self.id, %error, "data to sign is not a userauth request");
                return false;
            }
        };

        let scope = SessionScope {
            bindings: &self.bindings,
            binding_failed: self.binding_failed,
        };
        if !identity_permitted(
            &snapshot.dest_constraints,
            &scope,
            &userauth.username,
            Some(&mut self.match_info),
            &snapshot.info.comment,
        ) {
            warn!(session = self.id, "key not permitted by destination constraints");
            return false;
        }

        let last = self.bindings.last().expect("bindings checked non-empty");
        if userauth.session_id != last.session_id {
            warn!(session = self.id, "session ID is not the last bound session ID");
            return false;
        }

        true
    }

    async fn handle_request_identities(&mut self) -> Result<Response, AgentError> {
        if self.waiting_for_key_selection {
            return Err(AgentError::ConcurrentRequest);
        }
        self.waiting_for_key_selection = true;

        let scope = SessionScope {
            bindings: &self.bindings,
            binding_failed: self.binding_failed,
        };
        let items = self.manager.list(&scope);
        let items = self.hooks.select_identities(items).await;

        self.waiting_for_key_selection = false;

        Ok(Response::IdentitiesAnswer(
            items
                .into_iter()
                .map(|item| Identity {
                    pubkey: item.blob,
                    comment: item.comment,
                })
                .collect(),
        ))
    }

    async fn handle_extension(&mut self, extension: Extension) -> Result<Response, AgentError> {
        debug!(session = self.id, name = %extension.name, "processing extension");

        match self.hooks.process_extension(&extension).await {
            Ok(true) => return Ok(Response::Success),
            Ok(false) => {}
            Err(error) => {
                error!(session = self.id, %error, "extension hook failed");
                return Ok(Response::Failure);
            }
        }

        if extension.name != SessionBind::NAME {
            error!(session = self.id, name = %extension.name, "unsupported extension");
            return Ok(Response::Failure);
        }

        match self.session_bind(&extension) {
            Ok(()) => Ok(Response::Success),
            Err(error) => {
                // A failed bind poisons the session: all accumulated
                // bindings are dropped and no constrained key signs again.
                error!(session = self.id, %error, "session-bind failed");
                self.binding_failed = true;
                self.bindings.clear();
                Ok(Response::Failure)
            }
        }
    }

    fn session_bind(&mut self, extension: &Extension) -> Result<(), AgentError> {
        let bind = extension
            .parse_message::<SessionBind>()?
            .expect("extension name checked");

        if !crypto::verify(&bind.host_key, &bind.session_id, &bind.signature)? {
            return Err(CryptoError::VerificationFailed.into());
        }

        debug!(
            session = self.id,
            forwarding = bind.is_forwarding,
            "session-bind verified"
        );
        self.is_forwarded |= bind.is_forwarding;
        self.bindings.push(SessionBinding {
            host_key: bind.host_key,
            session_id: bind.session_id,
            forwarded: bind.is_forwarding,
        });
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("client", &self.client)
            .field("bindings", &self.bindings.len())
            .field("binding_failed", &self.binding_failed)
            .finish_non_exhaustive()
    }
}
