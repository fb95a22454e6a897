use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use uuid::Uuid;

use super::{Channel, ChannelEvent, MatchedDocument, PresentationRequest, SessionFailure, Transition};
use crate::engine::{
    DisclosedDocuments, EngineError, EngineHandle, ProcessedRequest, RequestedDocument,
    TransferEvent, TransferListener,
};
use crate::error::HolderKitError;

struct PendingRequest {
    processed: Arc<dyn ProcessedRequest>,
    requested: Vec<RequestedDocument>,
}

#[derive(Default)]
struct Inner {
    pending: Option<PendingRequest>,
    listener: Option<Arc<dyn TransferListener>>,
    generation: u64,
    channel_open: bool,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.listener.is_some() && self.generation == generation
    }
}

struct Shared<C: Channel> {
    id: Uuid,
    engine: EngineHandle,
    state: watch::Sender<C::State>,
    inner: Mutex<Inner>,
}

/// One presentation session on channel `C`.
///
/// The session registers a single transfer listener while it runs and is the
/// only writer of its state. Events from a listener that was detached (after
/// `stop`, `deny` or a transfer error) are dropped. Dropping the session
/// releases the transport.
pub struct PresentationSession<C: Channel> {
    shared: Arc<Shared<C>>,
}

impl<C: Channel> fmt::Debug for PresentationSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationSession")
            .field("channel", &C::NAME)
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: Channel> PresentationSession<C> {
    /// Creates an idle session on `engine`.
    #[must_use]
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                engine,
                state: watch::Sender::new(C::idle()),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Session id, used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> C::State {
        self.shared.state.borrow().clone()
    }

    /// Observes state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<C::State> {
        self.shared.state.subscribe()
    }

    /// Starts the channel.
    ///
    /// Calling `start` on a session that is not idle logs a warning and does
    /// nothing. Any transfer listener left on the engine by an earlier
    /// session is removed first.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::Engine`] if the engine refused to start the
    /// transport. The session is then in its error state.
    pub async fn start(&self, input: C::Input) -> Result<(), HolderKitError> {
        let shared = &self.shared;
        let listener = {
            let mut inner = shared.lock();
            let idle = C::is_idle(&shared.state.borrow());
            if !idle {
                tracing::warn!(channel = C::NAME, session = %shared.id, "session already started");
                return Ok(());
            }
            inner.generation += 1;
            let listener: Arc<dyn TransferListener> = Arc::new(SessionListener::<C> {
                shared: Arc::downgrade(shared),
                generation: inner.generation,
            });
            inner.listener = Some(Arc::clone(&listener));
            inner.channel_open = true;
            inner.pending = None;
            shared.state.send_replace(C::starting());
            listener
        };

        shared.engine.remove_all_transfer_listeners();
        shared.engine.add_transfer_listener(listener);
        tracing::info!(channel = C::NAME, session = %shared.id, "presentation started");

        let engine = shared.engine.clone();
        let started = tokio::task::spawn_blocking(move || C::start(&*engine, input)).await;
        let failure = match started {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(error)) => error,
            Err(join) => EngineError::failure(join.to_string()),
        };

        tracing::error!(channel = C::NAME, session = %shared.id, error = %failure, "failed to start presentation");
        shared.fail(
            None,
            SessionFailure {
                message: format!("Failed to start presentation: {failure}"),
                result_payload: failure.result_payload().cloned(),
            },
        );
        Err(HolderKitError::engine("start presentation", failure))
    }

    /// Discloses the requested items of `document_ids` to the verifier.
    ///
    /// Every item the verifier requested from an approved document is
    /// disclosed. Ids that are not part of the pending request are ignored.
    /// The pending request is consumed, so a second call fails.
    ///
    /// # Arguments
    ///
    /// * `document_ids` - Holder document ids the user agreed to share.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::NoActiveRequest`] when no request is pending. The
    ///   engine is not called.
    /// - [`HolderKitError::Transfer`] if the response could not be generated
    ///   or sent.
    pub async fn approve(&self, document_ids: &[String]) -> Result<(), HolderKitError> {
        let shared = &self.shared;
        let pending = {
            let mut inner = shared.lock();
            let pending = inner.pending.take();
            if pending.is_some() {
                shared.state.send_replace(C::sending_response());
            } else {
                shared
                    .state
                    .send_replace(C::failed(SessionFailure::new("No active request to approve")));
            }
            pending
        };
        let Some(pending) = pending else {
            tracing::warn!(channel = C::NAME, session = %shared.id, "approve without a pending request");
            return Err(HolderKitError::NoActiveRequest);
        };

        let selected: Vec<&RequestedDocument> = pending
            .requested
            .iter()
            .filter(|requested| document_ids.contains(&requested.document_id))
            .collect();
        if selected.len() < document_ids.len() {
            tracing::warn!(channel = C::NAME, session = %shared.id, "approval names documents that were not requested");
        }
        let disclosed = DisclosedDocuments::all_requested(selected);

        let engine = shared.engine.clone();
        let processed = pending.processed;
        let sent = tokio::task::spawn_blocking(move || {
            let response = processed.generate_response(&disclosed)?;
            engine.send_response(response)
        })
        .await;

        let failure = match sent {
            Ok(Ok(())) => {
                tracing::info!(channel = C::NAME, session = %shared.id, "response handed to engine");
                return Ok(());
            }
            Ok(Err(error)) => error,
            Err(join) => EngineError::failure(join.to_string()),
        };

        let message = format!("Failed to send response: {failure}");
        tracing::error!(channel = C::NAME, session = %shared.id, error = %failure, "response failed");
        shared.fail(
            None,
            SessionFailure {
                message: message.clone(),
                result_payload: failure.result_payload().cloned(),
            },
        );
        Err(HolderKitError::Transfer { message })
    }

    /// Refuses the pending request and ends the session.
    pub fn deny(&self) {
        tracing::info!(channel = C::NAME, session = %self.shared.id, "request denied");
        self.shared.release(None, C::denied());
    }

    /// Ends the session and releases the transport. Safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.release(None, C::idle());
    }
}

impl<C: Channel> Drop for PresentationSession<C> {
    fn drop(&mut self) {
        self.shared.release(None, C::idle());
    }
}

impl<C: Channel> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // inner only holds handles, a panicking holder leaves it usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, generation: u64, event: TransferEvent) {
        let channel_event = match event {
            TransferEvent::RequestReceived(Ok(processed)) => {
                return self.on_request(generation, processed);
            }
            TransferEvent::RequestReceived(Err(error)) => {
                tracing::error!(channel = C::NAME, session = %self.id, %error, "request could not be processed");
                return self.fail(
                    Some(generation),
                    SessionFailure {
                        message: format!("Failed to process request: {error}"),
                        result_payload: error.result_payload().cloned(),
                    },
                );
            }
            TransferEvent::Error(error) => {
                tracing::error!(channel = C::NAME, session = %self.id, %error, "transfer failed");
                return self.fail(Some(generation), SessionFailure::from_engine(&error));
            }
            TransferEvent::QrEngagementReady { content } => ChannelEvent::QrEngagementReady { content },
            TransferEvent::Connecting => ChannelEvent::Connecting,
            TransferEvent::Connected => ChannelEvent::Connected,
            TransferEvent::ResponseSent => ChannelEvent::ResponseSent,
            TransferEvent::Redirect { uri } => ChannelEvent::Redirect { uri },
            TransferEvent::Disconnected => ChannelEvent::Disconnected,
            TransferEvent::IntentToSend(payload) => ChannelEvent::IntentToSend(payload),
        };

        match C::on_event(channel_event) {
            Transition::Enter(state) => {
                let inner = self.lock();
                if inner.is_current(generation) {
                    self.state.send_replace(state);
                }
            }
            Transition::Close(state) => self.release(Some(generation), state),
            Transition::Release => self.release(Some(generation), C::idle()),
            Transition::Ignore => {
                tracing::trace!(channel = C::NAME, session = %self.id, "event ignored");
            }
        }
    }

    fn on_request(&self, generation: u64, processed: Arc<dyn ProcessedRequest>) {
        let verifier_name = processed.reader_common_name().unwrap_or_else(|error| {
            tracing::warn!(channel = C::NAME, session = %self.id, %error, "verifier name unreadable");
            None
        });

        let mut documents = BTreeMap::new();
        let mut requested = Vec::new();
        for document in processed.requested_documents() {
            match self.engine.get_document_by_id(&document.document_id) {
                Some(stored) if stored.is_issued() => {
                    documents.insert(
                        document.document_id.clone(),
                        MatchedDocument {
                            requested: document.clone(),
                            document: stored,
                        },
                    );
                    requested.push(document);
                }
                _ => {
                    tracing::debug!(channel = C::NAME, session = %self.id, document_id = %document.document_id, "requested document not available");
                }
            }
        }

        let mut inner = self.lock();
        if !inner.is_current(generation) {
            tracing::debug!(channel = C::NAME, session = %self.id, "late request dropped");
            return;
        }
        tracing::info!(
            channel = C::NAME,
            session = %self.id,
            verifier = verifier_name.as_deref().unwrap_or("unknown"),
            documents = documents.len(),
            "request received"
        );
        inner.pending = Some(PendingRequest {
            processed,
            requested,
        });
        self.state.send_replace(C::request_received(PresentationRequest {
            verifier_name,
            documents,
        }));
    }

    /// Enters the error state and detaches the listener. The transport stays
    /// open until the session is stopped.
    fn fail(&self, generation: Option<u64>, failure: SessionFailure) {
        let listener = {
            let mut inner = self.lock();
            if generation.is_some_and(|generation| !inner.is_current(generation)) {
                return;
            }
            inner.pending = None;
            self.state.send_replace(C::failed(failure));
            inner.listener.take()
        };
        if let Some(listener) = listener {
            self.engine.remove_transfer_listener(&listener);
        }
    }

    fn release(&self, generation: Option<u64>, next: C::State) {
        let (listener, channel_open) = {
            let mut inner = self.lock();
            if generation.is_some_and(|generation| !inner.is_current(generation)) {
                return;
            }
            inner.pending = None;
            self.state.send_replace(next);
            (inner.listener.take(), std::mem::take(&mut inner.channel_open))
        };

        if let Some(listener) = listener {
            self.engine.remove_transfer_listener(&listener);
        }
        if channel_open {
            match C::stop(&*self.engine) {
                Ok(()) => tracing::debug!(channel = C::NAME, session = %self.id, "transport released"),
                Err(error) => {
                    tracing::warn!(channel = C::NAME, session = %self.id, %error, "transport stop failed");
                }
            }
        }
    }
}

struct SessionListener<C: Channel> {
    shared: Weak<Shared<C>>,
    generation: u64,
}

impl<C: Channel> TransferListener for SessionListener<C> {
    fn on_transfer_event(&self, event: TransferEvent) {
        match self.shared.upgrade() {
            Some(shared) => shared.handle(self.generation, event),
            None => tracing::debug!(channel = C::NAME, "event for dropped session"),
        }
    }
}
