use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;

use super::{IssuanceEvent, IssuanceStream};
use crate::engine::{
    CredentialOffer, EngineError, EngineIssueEvent, IssuanceManager, IssueEventListener,
};
use crate::error::HolderKitError;
use crate::lifecycle::EngineLifecycle;

#[derive(Default)]
struct SessionSlot {
    manager: Option<Arc<dyn IssuanceManager>>,
    stream: Option<IssuanceStream>,
}

/// Runs offer resolution and issuance, one session at a time.
///
/// The session (issuance manager plus its event stream) lives from the first
/// `resolve_offer` or `issue` until the stream terminates. While it is live,
/// `issue` hands out the same stream instead of starting a second issuance.
pub struct IssuanceCoordinator {
    lifecycle: Arc<EngineLifecycle>,
    slot: Arc<Mutex<SessionSlot>>,
}

impl fmt::Debug for IssuanceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = lock(&self.slot);
        f.debug_struct("IssuanceCoordinator")
            .field("has_manager", &slot.manager.is_some())
            .field("stream", &slot.stream.as_ref().map(IssuanceStream::id))
            .finish_non_exhaustive()
    }
}

fn lock(slot: &Mutex<SessionSlot>) -> MutexGuard<'_, SessionSlot> {
    // slot holds plain handles, a panicking holder cannot leave it half written
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IssuanceCoordinator {
    /// Creates a coordinator using the engine owned by `lifecycle`.
    #[must_use]
    pub fn new(lifecycle: Arc<EngineLifecycle>) -> Self {
        Self {
            lifecycle,
            slot: Arc::default(),
        }
    }

    /// Whether the engine is initialized.
    #[must_use]
    pub fn is_engine_ready(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn manager(&self) -> Result<Arc<dyn IssuanceManager>, HolderKitError> {
        let engine = self.lifecycle.handle()?;
        let mut slot = lock(&self.slot);
        if let Some(manager) = &slot.manager {
            return Ok(Arc::clone(manager));
        }
        let manager = engine
            .create_issuance_manager()
            .map_err(|e| HolderKitError::engine("create issuance manager", e))?;
        slot.manager = Some(Arc::clone(&manager));
        Ok(manager)
    }

    /// Resolves a credential offer URI.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::NotInitialized`] before the engine is initialized.
    /// - [`HolderKitError::Engine`] if the engine fails to resolve the offer.
    pub async fn resolve_offer(&self, offer_uri: &str) -> Result<CredentialOffer, HolderKitError> {
        let manager = self.manager()?;
        let (sender, receiver) = oneshot::channel();
        tracing::debug!(offer_uri, "resolving offer");
        manager.resolve_document_offer(
            offer_uri,
            Box::new(move |result| {
                let _ = sender.send(result);
            }),
        );

        match receiver.await {
            Ok(Ok(offer)) => {
                tracing::info!(issuer = %offer.issuer_name, documents = offer.offered_documents.len(), "offer resolved");
                Ok(offer)
            }
            Ok(Err(e)) => Err(HolderKitError::engine("resolve offer", e)),
            Err(_) => Err(HolderKitError::engine(
                "resolve offer",
                EngineError::failure("offer callback dropped without a result"),
            )),
        }
    }

    /// Issues the documents of `offer` and returns the session stream.
    ///
    /// If a session is live its stream is returned unchanged and the engine
    /// is not called; `offer` and `tx_code` are ignored in that case.
    ///
    /// The caller owns the resume requests of the session: the engine stays
    /// blocked on each `DocumentNeedsSettings` and `DocumentNeedsAuth` event
    /// until an observer resumes it, or until
    /// [`IssuanceStream::resume_pending`] answers it with a policy.
    /// [`crate::issuance::IssuanceFlow`] does both.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::NotInitialized`] before the engine is initialized.
    /// - [`HolderKitError::Engine`] if no issuance manager can be created.
    pub fn issue(
        &self,
        offer: CredentialOffer,
        tx_code: Option<String>,
    ) -> Result<IssuanceStream, HolderKitError> {
        let manager = self.manager()?;
        let stream = {
            let mut slot = lock(&self.slot);
            if let Some(live) = &slot.stream {
                tracing::debug!(session = %live.id(), "attaching to live issuance");
                return Ok(live.clone());
            }
            let stream = IssuanceStream::new();
            slot.stream = Some(stream.clone());
            stream
        };

        tracing::info!(session = %stream.id(), "starting issuance");
        let listener = Arc::new(StreamListener {
            stream: stream.clone(),
            slot: Arc::downgrade(&self.slot),
        });
        // listener may fire synchronously, the slot lock is released
        manager.issue_document_by_offer(offer, tx_code, listener);
        Ok(stream)
    }

    /// Continues an issuance that waits for external authorization.
    ///
    /// Returns `false` if no session is live or the engine rejected the
    /// redirect. Issuance then has to restart from offer resolution.
    #[must_use]
    pub fn resume_authorization(&self, redirect_uri: &str) -> bool {
        let manager = lock(&self.slot).manager.clone();
        let Some(manager) = manager else {
            tracing::warn!("authorization redirect without a live issuance session");
            return false;
        };
        match manager.resume_with_authorization(redirect_uri) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "engine rejected authorization redirect");
                false
            }
        }
    }

    /// The stream of the live session, if any.
    #[must_use]
    pub fn active_stream(&self) -> Option<IssuanceStream> {
        lock(&self.slot).stream.clone()
    }

    /// Drops the live session, ending its stream for every observer.
    ///
    /// Used when the engine that created the manager is torn down.
    pub fn abandon(&self) {
        let stream = {
            let mut slot = lock(&self.slot);
            slot.manager = None;
            slot.stream.take()
        };
        if let Some(stream) = stream {
            tracing::info!(session = %stream.id(), "issuance session abandoned");
            stream.close();
        }
    }
}

struct StreamListener {
    stream: IssuanceStream,
    slot: Weak<Mutex<SessionSlot>>,
}

impl StreamListener {
    fn release(&self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut slot = lock(&slot);
        if slot
            .stream
            .as_ref()
            .is_some_and(|live| live.ptr_eq(&self.stream))
        {
            slot.stream = None;
            slot.manager = None;
        }
    }
}

impl IssueEventListener for StreamListener {
    fn on_issue_event(&self, event: EngineIssueEvent) {
        let event = IssuanceEvent::from(event);
        match &event {
            IssuanceEvent::DocumentFailed { document_id, cause } => {
                tracing::warn!(session = %self.stream.id(), document_id, %cause, "document failed");
            }
            IssuanceEvent::Failed { cause } => {
                tracing::error!(session = %self.stream.id(), %cause, "issuance failed");
            }
            other => tracing::debug!(session = %self.stream.id(), event = ?other, "issuance event"),
        }

        if event.is_terminal() {
            // observers that see the terminal event find the session released
            self.release();
            if self.stream.publish(event) && self.stream.close() {
                tracing::info!(session = %self.stream.id(), "issuance session ended");
            }
        } else if !self.stream.publish(event) {
            tracing::debug!(session = %self.stream.id(), "event after termination dropped");
        }
    }
}
