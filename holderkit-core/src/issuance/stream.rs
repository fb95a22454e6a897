use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{IssuancePolicy, ResumeSlot};
use crate::bridge::{EventBridge, Subscription, DEFAULT_REPLAY};
use crate::engine::{
    CreateDocumentSettings, EngineError, EngineIssueEvent, KeyUnlockMap, OfferedDocument,
};

/// Issuance progress as seen by observers of an [`IssuanceStream`].
#[derive(Debug, Clone)]
pub enum IssuanceEvent {
    /// Issuance started for `total` documents.
    Started {
        /// Number of documents to issue.
        total: usize,
    },
    /// The engine waits for create settings of `document`.
    DocumentNeedsSettings {
        /// The document being created.
        document: OfferedDocument,
        /// Resume with the settings.
        resume: ResumeSlot<CreateDocumentSettings>,
    },
    /// The engine waits for unlock data of some keys.
    DocumentNeedsAuth {
        /// The document being issued.
        document_id: String,
        /// Key aliases that require unlocking.
        keys: Vec<String>,
        /// Resume with the unlock data.
        resume: ResumeSlot<KeyUnlockMap>,
    },
    /// A document was issued.
    DocumentIssued {
        /// Id of the stored document.
        document_id: String,
    },
    /// One document failed; the others continue.
    DocumentFailed {
        /// Id of the failed document.
        document_id: String,
        /// The failure.
        cause: EngineError,
    },
    /// The issuer deferred a document.
    DocumentDeferred {
        /// Id of the deferred document.
        document_id: String,
    },
    /// Issuance completed.
    Finished,
    /// Issuance failed as a whole.
    Failed {
        /// The failure.
        cause: EngineError,
    },
}

impl IssuanceEvent {
    /// Whether this event ends the issuance.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed { .. })
    }
}

impl From<EngineIssueEvent> for IssuanceEvent {
    fn from(event: EngineIssueEvent) -> Self {
        match event {
            EngineIssueEvent::Started { total } => Self::Started { total },
            EngineIssueEvent::DocumentRequiresCreateSettings { document, resume } => {
                Self::DocumentNeedsSettings {
                    document,
                    resume: ResumeSlot::new(resume),
                }
            }
            EngineIssueEvent::DocumentRequiresUserAuth {
                document_id,
                keys,
                resume,
            } => Self::DocumentNeedsAuth {
                document_id,
                keys,
                resume: ResumeSlot::new(resume),
            },
            EngineIssueEvent::DocumentIssued { document_id } => Self::DocumentIssued { document_id },
            EngineIssueEvent::DocumentFailed { document_id, cause } => {
                Self::DocumentFailed { document_id, cause }
            }
            EngineIssueEvent::DocumentDeferred { document_id } => {
                Self::DocumentDeferred { document_id }
            }
            EngineIssueEvent::Finished => Self::Finished,
            EngineIssueEvent::Failure(cause) => Self::Failed { cause },
        }
    }
}

/// What a session has done so far, kept beside the bounded replay.
#[derive(Debug, Default)]
struct SessionRecord {
    total: usize,
    issued: Vec<String>,
    // resume requests not yet answered
    pending: Vec<IssuanceEvent>,
}

impl SessionRecord {
    fn record(&mut self, event: &IssuanceEvent) {
        self.pending.retain(|pending| !pending.is_answered());
        match event {
            IssuanceEvent::Started { total } => {
                self.total = *total;
                self.issued.clear();
            }
            IssuanceEvent::DocumentIssued { document_id } => {
                if !self.issued.contains(document_id) {
                    self.issued.push(document_id.clone());
                }
            }
            IssuanceEvent::DocumentNeedsSettings { .. } | IssuanceEvent::DocumentNeedsAuth { .. } => {
                self.pending.push(event.clone());
            }
            IssuanceEvent::Finished | IssuanceEvent::Failed { .. } => self.pending.clear(),
            IssuanceEvent::DocumentFailed { .. } | IssuanceEvent::DocumentDeferred { .. } => {}
        }
    }
}

impl IssuanceEvent {
    fn is_answered(&self) -> bool {
        match self {
            Self::DocumentNeedsSettings { resume, .. } => resume.is_resumed(),
            Self::DocumentNeedsAuth { resume, .. } => resume.is_resumed(),
            _ => true,
        }
    }

    /// Answers a resume request with `policy`. Returns `false` for other
    /// events and for requests that were already answered.
    pub(crate) fn answer(&self, policy: &dyn IssuancePolicy) -> bool {
        match self {
            Self::DocumentNeedsSettings { document, resume } => {
                resume.resume(policy.create_settings(document))
            }
            Self::DocumentNeedsAuth {
                document_id,
                keys,
                resume,
            } => resume.resume(policy.unlock_keys(document_id, keys)),
            _ => false,
        }
    }
}

/// The shared, replayable event stream of one issuance session.
///
/// Clones observe the same session; [`IssuanceStream::ptr_eq`] tells whether
/// two streams are the same session.
///
/// The engine blocks on every `DocumentNeedsSettings` and `DocumentNeedsAuth`
/// event until one observer resumes it. Observers that stop early hand the
/// open requests to [`IssuanceStream::resume_pending`].
#[derive(Debug, Clone)]
pub struct IssuanceStream {
    id: Uuid,
    bridge: Arc<EventBridge<IssuanceEvent>>,
    record: Arc<Mutex<SessionRecord>>,
}

impl IssuanceStream {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            bridge: Arc::new(EventBridge::new(DEFAULT_REPLAY)),
            record: Arc::default(),
        }
    }

    /// Session id, used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Attaches an observer. It replays up to the last ten events first.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<IssuanceEvent> {
        self.bridge.subscribe()
    }

    /// Whether both values are the same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bridge, &other.bridge)
    }

    /// Whether the session reached `Finished` or `Failed`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.bridge.is_closed()
    }

    /// Announced document count and the ids issued so far, over the whole
    /// session rather than the replay window.
    #[must_use]
    pub fn issued_so_far(&self) -> (usize, Vec<String>) {
        let record = self.lock_record();
        (record.total, record.issued.clone())
    }

    /// Resume requests the engine is still blocked on.
    #[must_use]
    pub fn open_requests(&self) -> usize {
        self.lock_record()
            .pending
            .iter()
            .filter(|event| !event.is_answered())
            .count()
    }

    /// Answers every resume request no observer answered yet with `policy`.
    /// Returns how many requests were answered.
    #[allow(clippy::must_use_candidate)]
    pub fn resume_pending(&self, policy: &dyn IssuancePolicy) -> usize {
        let pending = std::mem::take(&mut self.lock_record().pending);
        // answered outside the lock, the engine may publish from the continuation
        let mut answered = 0;
        for event in &pending {
            if event.answer(policy) {
                answered += 1;
            }
        }
        if answered > 0 {
            tracing::info!(session = %self.id, answered, "open resume requests answered by policy");
        }
        answered
    }

    pub(crate) fn publish(&self, event: IssuanceEvent) -> bool {
        if self.bridge.is_closed() {
            return false;
        }
        self.lock_record().record(&event);
        self.bridge.publish(event)
    }

    pub(crate) fn close(&self) -> bool {
        self.bridge.close()
    }

    fn lock_record(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
