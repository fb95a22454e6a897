use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{IssuanceCoordinator, IssuanceEvent, IssuancePolicy, IssuanceStream};
use crate::defaults::OFFER_URI_KEY;
use crate::engine::CredentialOffer;
use crate::error::HolderKitError;
use crate::flow_store::FlowStateStore;

/// State of offer resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferState {
    /// Nothing resolved yet.
    Idle,
    /// Resolution in progress.
    Resolving,
    /// The offer is ready to be shown and issued.
    Resolved(CredentialOffer),
    /// Resolution failed.
    Error {
        /// Message for the holder.
        message: String,
        /// Underlying failure.
        cause: HolderKitError,
    },
}

/// State of document issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceProgress {
    /// No issuance running.
    Idle,
    /// Issuance running.
    Issuing {
        /// Documents announced by the engine.
        total: usize,
        /// Documents issued so far.
        issued: usize,
    },
    /// Issuance finished.
    Success {
        /// Ids of the issued documents, in issuance order.
        document_ids: Vec<String>,
    },
    /// Issuance failed or could not be resumed.
    Error {
        /// Message for the holder.
        message: String,
        /// Underlying failure.
        cause: HolderKitError,
    },
}

/// Folds issuance events into [`IssuanceProgress`] and answers resume requests.
#[derive(Debug, Default)]
struct ProgressTracker {
    total: usize,
    issued: Vec<String>,
}

impl ProgressTracker {
    /// A tracker continuing from what `stream` recorded so far.
    fn resuming(stream: &IssuanceStream) -> Self {
        let (total, issued) = stream.issued_so_far();
        Self { total, issued }
    }

    fn apply(
        &mut self,
        event: IssuanceEvent,
        policy: &dyn IssuancePolicy,
    ) -> Option<IssuanceProgress> {
        match event {
            IssuanceEvent::Started { total } => {
                self.total = total;
                self.issued.clear();
                Some(self.issuing())
            }
            IssuanceEvent::DocumentNeedsSettings { .. } | IssuanceEvent::DocumentNeedsAuth { .. } => {
                // a replayed request was answered by an earlier observer
                if event.answer(policy) {
                    tracing::debug!(?event, "resume request answered");
                }
                None
            }
            IssuanceEvent::DocumentIssued { document_id } => {
                if !self.issued.contains(&document_id) {
                    self.issued.push(document_id);
                }
                Some(self.issuing())
            }
            IssuanceEvent::DocumentFailed { document_id, cause } => {
                tracing::warn!(document_id, %cause, "document not issued");
                None
            }
            IssuanceEvent::DocumentDeferred { document_id } => {
                tracing::info!(document_id, "document deferred by issuer");
                None
            }
            IssuanceEvent::Finished => Some(IssuanceProgress::Success {
                document_ids: self.issued.clone(),
            }),
            IssuanceEvent::Failed { cause } => Some(IssuanceProgress::Error {
                message: "Issuance failed".to_string(),
                cause: HolderKitError::engine("issue documents", cause),
            }),
        }
    }

    fn issuing(&self) -> IssuanceProgress {
        IssuanceProgress::Issuing {
            total: self.total,
            issued: self.issued.len(),
        }
    }
}

/// Drives the issuance screens: offer resolution, issuance, and resumption
/// after the external authorization step.
///
/// State is published through [`watch`] channels. Only the offer URI is
/// persisted, under [`OFFER_URI_KEY`].
pub struct IssuanceFlow {
    coordinator: Arc<IssuanceCoordinator>,
    store: Arc<dyn FlowStateStore>,
    policy: Arc<dyn IssuancePolicy>,
    offer: watch::Sender<OfferState>,
    progress: Arc<watch::Sender<IssuanceProgress>>,
    collector: Mutex<Option<Collector>>,
}

struct Collector {
    task: JoinHandle<()>,
    stream: IssuanceStream,
}

impl fmt::Debug for IssuanceFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuanceFlow")
            .field("offer", &*self.offer.borrow())
            .field("progress", &*self.progress.borrow())
            .finish_non_exhaustive()
    }
}

impl IssuanceFlow {
    /// Creates a flow on top of `coordinator`.
    #[must_use]
    pub fn new(
        coordinator: Arc<IssuanceCoordinator>,
        store: Arc<dyn FlowStateStore>,
        policy: Arc<dyn IssuancePolicy>,
    ) -> Self {
        Self {
            coordinator,
            store,
            policy,
            offer: watch::Sender::new(OfferState::Idle),
            progress: Arc::new(watch::Sender::new(IssuanceProgress::Idle)),
            collector: Mutex::new(None),
        }
    }

    /// Current offer state.
    #[must_use]
    pub fn offer_state(&self) -> OfferState {
        self.offer.borrow().clone()
    }

    /// Observes offer state changes.
    #[must_use]
    pub fn watch_offer(&self) -> watch::Receiver<OfferState> {
        self.offer.subscribe()
    }

    /// Current issuance progress.
    #[must_use]
    pub fn progress(&self) -> IssuanceProgress {
        self.progress.borrow().clone()
    }

    /// Observes issuance progress changes.
    #[must_use]
    pub fn watch_progress(&self) -> watch::Receiver<IssuanceProgress> {
        self.progress.subscribe()
    }

    /// The offer URI saved by the last `resolve_offer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow state store cannot be read.
    pub fn saved_offer_uri(&self) -> Result<Option<String>, HolderKitError> {
        self.store.get(OFFER_URI_KEY)
    }

    /// Resolves `offer_uri`, publishing `Resolving` then `Resolved` or `Error`.
    ///
    /// # Errors
    ///
    /// Returns the failure that was published as [`OfferState::Error`].
    pub async fn resolve_offer(&self, offer_uri: &str) -> Result<CredentialOffer, HolderKitError> {
        if !self.coordinator.is_engine_ready() {
            return Err(self.offer_failed("Engine not initialized", HolderKitError::NotInitialized));
        }

        self.offer.send_replace(OfferState::Resolving);
        if let Err(error) = self.store.put(OFFER_URI_KEY, offer_uri) {
            tracing::warn!(%error, "offer URI not saved, issuance cannot resume after restart");
        }

        match self.coordinator.resolve_offer(offer_uri).await {
            Ok(offer) => {
                self.offer.send_replace(OfferState::Resolved(offer.clone()));
                Ok(offer)
            }
            Err(error) => Err(self.offer_failed("Failed to resolve offer", error)),
        }
    }

    /// Starts issuing `offer`, or attaches to the issuance already running.
    ///
    /// Progress is published as events arrive; create-settings and key-unlock
    /// requests are answered by the flow's [`IssuancePolicy`].
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::InvalidInput`] if the offer needs a transaction code
    ///   and none was given.
    /// - Coordinator failures, also published as [`IssuanceProgress::Error`].
    ///
    /// Must be called within a Tokio runtime; progress is collected on a
    /// spawned task.
    pub fn issue(
        &self,
        offer: CredentialOffer,
        tx_code: Option<String>,
    ) -> Result<IssuanceStream, HolderKitError> {
        if offer.requires_tx_code() && tx_code.as_deref().is_none_or(str::is_empty) {
            return Err(self.issuance_failed(
                "Transaction code required",
                HolderKitError::InvalidInput {
                    attribute: "tx_code".to_string(),
                    reason: "the offer requires a transaction code".to_string(),
                },
            ));
        }

        let stream = self
            .coordinator
            .issue(offer, tx_code)
            .map_err(|error| self.issuance_failed("Issuance failed", error))?;
        self.progress
            .send_replace(IssuanceProgress::Issuing { total: 0, issued: 0 });
        self.collect(&stream);
        Ok(stream)
    }

    /// Handles the authorization redirect of a suspended issuance.
    ///
    /// Returns `false` and publishes an error if the session is gone; the
    /// holder then has to restart from the saved offer URI.
    ///
    /// Must be called within a Tokio runtime.
    pub fn resume_authorization(&self, redirect_uri: &str) -> bool {
        // taken first, the stream is released as soon as issuance completes
        let live = self.coordinator.active_stream();
        if !self.coordinator.resume_authorization(redirect_uri) {
            self.issuance_failed("Authorization failed", HolderKitError::ResumeLost);
            return false;
        }
        let Some(stream) = live else {
            self.issuance_failed("Issuance state lost", HolderKitError::ResumeLost);
            return false;
        };
        self.collect(&stream);
        true
    }

    /// Returns both states to idle and forgets the saved offer URI.
    ///
    /// Resume requests of the observed issuance that were not answered yet
    /// are answered with the flow's policy, so the engine is never left
    /// waiting on a flow that stopped observing.
    pub fn reset(&self) {
        self.stop_collector();
        self.offer.send_replace(OfferState::Idle);
        self.progress.send_replace(IssuanceProgress::Idle);
        if let Err(error) = self.store.remove(OFFER_URI_KEY) {
            tracing::warn!(%error, "saved offer URI not removed");
        }
    }

    fn collect(&self, stream: &IssuanceStream) {
        let mut events = stream.subscribe();
        // the replay window is bounded, counts come from the session record
        let mut tracker = ProgressTracker::resuming(stream);
        let progress = Arc::clone(&self.progress);
        let policy = Arc::clone(&self.policy);
        let session = stream.id();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Some(state) = tracker.apply(event, policy.as_ref()) {
                    progress.send_replace(state);
                }
            }
            tracing::debug!(%session, "issuance stream drained");
        });

        let previous = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Collector {
                task,
                stream: stream.clone(),
            });
        if let Some(previous) = previous {
            previous.task.abort();
            // the new collector replays its own stream's requests
            if !previous.stream.ptr_eq(stream) {
                previous.stream.resume_pending(self.policy.as_ref());
            }
        }
    }

    fn stop_collector(&self) {
        let collector = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(collector) = collector {
            collector.task.abort();
            collector.stream.resume_pending(self.policy.as_ref());
        }
    }

    fn offer_failed(&self, message: &str, cause: HolderKitError) -> HolderKitError {
        tracing::warn!(%cause, "{message}");
        self.offer.send_replace(OfferState::Error {
            message: message.to_string(),
            cause: cause.clone(),
        });
        cause
    }

    fn issuance_failed(&self, message: &str, cause: HolderKitError) -> HolderKitError {
        tracing::warn!(%cause, "{message}");
        self.progress.send_replace(IssuanceProgress::Error {
            message: message.to_string(),
            cause: cause.clone(),
        });
        cause
    }
}

impl Drop for IssuanceFlow {
    fn drop(&mut self) {
        self.stop_collector();
    }
}
