//! In-memory engine for tests and demos.
//!
//! [`MemoryEngine`] keeps documents in a map and lets the caller drive
//! transfers with [`MemoryEngine::emit`]. [`MemoryIssuanceManager`] replays a
//! scripted issuance on its own thread, blocking on resume continuations and
//! authorization the way a real engine does.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::{
    BrowserRequest, CreateDocumentSettings, CredentialEngine, CredentialOffer, DisclosedDocuments,
    DocumentFormat, DocumentState, EngineError, EngineFactory, EngineIssueEvent, EngineResponse,
    HolderDocument, IssuanceManager, IssueEventListener, KeyUnlockMap, OfferCallback,
    OfferedDocument, ProcessedRequest, RequestedDocument, TransferEvent, TransferListener,
};
use crate::config::HolderConfig;
use crate::paths::EnginePaths;

const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type DocumentStore = Arc<Mutex<BTreeMap<String, HolderDocument>>>;

/// A call the memory engine received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `start_proximity`
    StartProximity,
    /// `start_remote`
    StartRemote(String),
    /// `start_browser_mediated`
    StartBrowserMediated(BrowserRequest),
    /// `stop_proximity`
    StopProximity,
    /// `stop_remote`
    StopRemote,
    /// `stop_browser_mediated`
    StopBrowserMediated,
    /// `send_response`
    SendResponse(EngineResponse),
    /// `shutdown`
    Shutdown,
}

/// Credential engine backed by memory.
pub struct MemoryEngine {
    documents: DocumentStore,
    listeners: Mutex<Vec<Arc<dyn TransferListener>>>,
    calls: Mutex<Vec<EngineCall>>,
    issuance: Arc<MemoryIssuanceManager>,
    managers_created: AtomicUsize,
    start_failure: Mutex<Option<EngineError>>,
    shutdown_failure: Mutex<Option<EngineError>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        let documents = DocumentStore::default();
        Self {
            issuance: Arc::new(MemoryIssuanceManager::new(Arc::clone(&documents))),
            documents,
            listeners: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            managers_created: AtomicUsize::new(0),
            start_failure: Mutex::new(None),
            shutdown_failure: Mutex::new(None),
        }
    }

    /// Stores a document.
    pub fn insert_document(&self, document: HolderDocument) {
        lock(&self.documents).insert(document.id.clone(), document);
    }

    /// Stores an issued mdoc with the given id and doc type.
    pub fn insert_issued_mdoc(&self, id: &str, doc_type: &str) {
        self.insert_document(issued_mdoc(id, doc_type));
    }

    /// Makes the next `start_*` call fail with `error`.
    pub fn fail_next_start(&self, error: EngineError) {
        *lock(&self.start_failure) = Some(error);
    }

    /// Makes the next `shutdown` fail with `error` after releasing listeners.
    pub fn fail_next_shutdown(&self, error: EngineError) {
        *lock(&self.shutdown_failure) = Some(error);
    }

    /// Delivers `event` to every registered transfer listener.
    ///
    /// Listeners run on the calling thread, outside any engine lock.
    pub fn emit(&self, event: TransferEvent) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_transfer_event(event.clone());
        }
    }

    /// Number of registered transfer listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    /// Responses sent so far.
    #[must_use]
    pub fn sent_responses(&self) -> Vec<EngineResponse> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::SendResponse(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    /// The issuance manager handed out by `create_issuance_manager`.
    #[must_use]
    pub fn issuance(&self) -> Arc<MemoryIssuanceManager> {
        Arc::clone(&self.issuance)
    }

    /// How many times `create_issuance_manager` was called.
    #[must_use]
    pub fn managers_created(&self) -> usize {
        self.managers_created.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) {
        lock(&self.calls).push(call);
    }

    fn start(&self, call: EngineCall) -> Result<(), EngineError> {
        self.record(call);
        lock(&self.start_failure).take().map_or(Ok(()), Err)
    }
}

impl CredentialEngine for MemoryEngine {
    fn create_issuance_manager(&self) -> Result<Arc<dyn IssuanceManager>, EngineError> {
        self.managers_created.fetch_add(1, Ordering::SeqCst);
        Ok(self.issuance.clone())
    }

    fn start_proximity(&self) -> Result<(), EngineError> {
        self.start(EngineCall::StartProximity)
    }

    fn start_remote(&self, request_uri: &str) -> Result<(), EngineError> {
        self.start(EngineCall::StartRemote(request_uri.to_string()))
    }

    fn start_browser_mediated(&self, request: &BrowserRequest) -> Result<(), EngineError> {
        self.start(EngineCall::StartBrowserMediated(request.clone()))
    }

    fn stop_proximity(&self) -> Result<(), EngineError> {
        self.record(EngineCall::StopProximity);
        Ok(())
    }

    fn stop_remote(&self) -> Result<(), EngineError> {
        self.record(EngineCall::StopRemote);
        Ok(())
    }

    fn stop_browser_mediated(&self) -> Result<(), EngineError> {
        self.record(EngineCall::StopBrowserMediated);
        Ok(())
    }

    fn add_transfer_listener(&self, listener: Arc<dyn TransferListener>) {
        lock(&self.listeners).push(listener);
    }

    fn remove_transfer_listener(&self, listener: &Arc<dyn TransferListener>) {
        lock(&self.listeners).retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    fn remove_all_transfer_listeners(&self) {
        lock(&self.listeners).clear();
    }

    fn send_response(&self, response: EngineResponse) -> Result<(), EngineError> {
        self.record(EngineCall::SendResponse(response));
        Ok(())
    }

    fn documents(&self) -> Vec<HolderDocument> {
        lock(&self.documents).values().cloned().collect()
    }

    fn get_document_by_id(&self, document_id: &str) -> Option<HolderDocument> {
        lock(&self.documents).get(document_id).cloned()
    }

    fn delete_document_by_id(&self, document_id: &str) -> Result<(), EngineError> {
        lock(&self.documents)
            .remove(document_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::failure(format!("no document {document_id}")))
    }

    fn shutdown(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Shutdown);
        self.remove_all_transfer_listeners();
        lock(&self.shutdown_failure).take().map_or(Ok(()), Err)
    }
}

/// Builds an issued mdoc record.
#[must_use]
pub fn issued_mdoc(id: &str, doc_type: &str) -> HolderDocument {
    HolderDocument {
        id: id.to_string(),
        name: doc_type.to_string(),
        format: DocumentFormat::MsoMdoc {
            doc_type: doc_type.to_string(),
        },
        state: DocumentState::Issued,
        credentials_count: 1,
    }
}

/// One step of a scripted issuance.
#[derive(Debug, Clone)]
pub enum IssueStep {
    /// Emit `Started`.
    Started {
        /// Announced document count.
        total: usize,
    },
    /// Ask for create settings and wait for them.
    RequireSettings(OfferedDocument),
    /// Ask for key unlock data and wait for it.
    RequireUserAuth {
        /// Document being issued.
        document_id: String,
        /// Keys needing authentication.
        keys: Vec<String>,
    },
    /// Wait until `resume_with_authorization` is called.
    AwaitAuthorization,
    /// Store an issued document and emit `DocumentIssued`.
    Issued {
        /// Id of the stored document.
        document_id: String,
        /// Its doc type.
        doc_type: String,
    },
    /// Emit `DocumentFailed`.
    DocumentFailed {
        /// Failed document.
        document_id: String,
        /// Failure message.
        message: String,
    },
    /// Emit `DocumentDeferred`.
    Deferred {
        /// Deferred document.
        document_id: String,
    },
    /// Emit `Finished`.
    Finished,
    /// Emit `Failure`.
    Failure(String),
}

/// Scripted issuance manager.
pub struct MemoryIssuanceManager {
    documents: DocumentStore,
    offers: Mutex<HashMap<String, Result<CredentialOffer, EngineError>>>,
    script: Mutex<Vec<IssueStep>>,
    authorization: Mutex<Option<mpsc::Sender<String>>>,
    resolve_calls: AtomicUsize,
    issue_calls: AtomicUsize,
    resume_timeout_ms: AtomicU64,
    received_settings: Arc<Mutex<Vec<CreateDocumentSettings>>>,
    received_unlocks: Arc<Mutex<Vec<KeyUnlockMap>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl MemoryIssuanceManager {
    fn new(documents: DocumentStore) -> Self {
        Self {
            documents,
            offers: Mutex::new(HashMap::new()),
            script: Mutex::new(Vec::new()),
            authorization: Mutex::new(None),
            resolve_calls: AtomicUsize::new(0),
            issue_calls: AtomicUsize::new(0),
            resume_timeout_ms: AtomicU64::new(
                u64::try_from(DEFAULT_RESUME_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            ),
            received_settings: Arc::default(),
            received_unlocks: Arc::default(),
            authorizations: Arc::default(),
        }
    }

    /// Registers the result of resolving `offer_uri`.
    pub fn add_offer(&self, offer_uri: &str, offer: Result<CredentialOffer, EngineError>) {
        lock(&self.offers).insert(offer_uri.to_string(), offer);
    }

    /// Sets the steps run by the next issuance.
    pub fn set_script(&self, steps: Vec<IssueStep>) {
        *lock(&self.script) = steps;
    }

    /// How long a scripted issuance waits for a continuation before failing.
    pub fn set_resume_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.resume_timeout_ms.store(millis, Ordering::SeqCst);
    }

    /// How many times an offer was resolved.
    #[must_use]
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// How many times issuance was started.
    #[must_use]
    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    /// Create settings supplied through resume continuations.
    #[must_use]
    pub fn received_settings(&self) -> Vec<CreateDocumentSettings> {
        lock(&self.received_settings).clone()
    }

    /// Unlock data supplied through resume continuations.
    #[must_use]
    pub fn received_unlocks(&self) -> Vec<KeyUnlockMap> {
        lock(&self.received_unlocks).clone()
    }

    /// Redirect URIs that resumed an issuance.
    #[must_use]
    pub fn authorizations(&self) -> Vec<String> {
        lock(&self.authorizations).clone()
    }
}

impl IssuanceManager for MemoryIssuanceManager {
    fn resolve_document_offer(&self, offer_uri: &str, callback: OfferCallback) {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let result = lock(&self.offers)
            .get(offer_uri)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::failure(format!("unknown offer {offer_uri}"))));
        thread::spawn(move || callback(result));
    }

    fn issue_document_by_offer(
        &self,
        _offer: CredentialOffer,
        _tx_code: Option<String>,
        listener: Arc<dyn IssueEventListener>,
    ) {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        let (authorization_tx, authorization_rx) = mpsc::channel();
        *lock(&self.authorization) = Some(authorization_tx);

        let run = ScriptRun {
            steps: lock(&self.script).clone(),
            timeout: Duration::from_millis(self.resume_timeout_ms.load(Ordering::SeqCst)),
            listener,
            documents: Arc::clone(&self.documents),
            authorization: authorization_rx,
            received_settings: Arc::clone(&self.received_settings),
            received_unlocks: Arc::clone(&self.received_unlocks),
            authorizations: Arc::clone(&self.authorizations),
        };
        thread::spawn(move || run.execute());
    }

    fn resume_with_authorization(&self, redirect_uri: &str) -> Result<(), EngineError> {
        let sender = lock(&self.authorization).clone().ok_or(EngineError::NoSession)?;
        sender
            .send(redirect_uri.to_string())
            .map_err(|_| EngineError::NoSession)
    }
}

struct ScriptRun {
    steps: Vec<IssueStep>,
    timeout: Duration,
    listener: Arc<dyn IssueEventListener>,
    documents: DocumentStore,
    authorization: mpsc::Receiver<String>,
    received_settings: Arc<Mutex<Vec<CreateDocumentSettings>>>,
    received_unlocks: Arc<Mutex<Vec<KeyUnlockMap>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl ScriptRun {
    fn execute(mut self) {
        for step in std::mem::take(&mut self.steps) {
            if let Err(stalled) = self.step(step) {
                self.listener
                    .on_issue_event(EngineIssueEvent::Failure(EngineError::failure(stalled)));
                return;
            }
        }
    }

    fn step(&self, step: IssueStep) -> Result<(), String> {
        let event = match step {
            IssueStep::Started { total } => EngineIssueEvent::Started { total },
            IssueStep::RequireSettings(document) => {
                let (tx, rx) = mpsc::channel();
                self.listener
                    .on_issue_event(EngineIssueEvent::DocumentRequiresCreateSettings {
                        document,
                        resume: Box::new(move |settings| {
                            let _ = tx.send(settings);
                        }),
                    });
                let settings = rx
                    .recv_timeout(self.timeout)
                    .map_err(|_| "create settings were never supplied".to_string())?;
                lock(&self.received_settings).push(settings);
                return Ok(());
            }
            IssueStep::RequireUserAuth { document_id, keys } => {
                let (tx, rx) = mpsc::channel();
                self.listener
                    .on_issue_event(EngineIssueEvent::DocumentRequiresUserAuth {
                        document_id,
                        keys,
                        resume: Box::new(move |unlock| {
                            let _ = tx.send(unlock);
                        }),
                    });
                let unlock = rx
                    .recv_timeout(self.timeout)
                    .map_err(|_| "key unlock data was never supplied".to_string())?;
                lock(&self.received_unlocks).push(unlock);
                return Ok(());
            }
            IssueStep::AwaitAuthorization => {
                let uri = self
                    .authorization
                    .recv_timeout(self.timeout)
                    .map_err(|_| "authorization never completed".to_string())?;
                lock(&self.authorizations).push(uri);
                return Ok(());
            }
            IssueStep::Issued {
                document_id,
                doc_type,
            } => {
                lock(&self.documents)
                    .insert(document_id.clone(), issued_mdoc(&document_id, &doc_type));
                EngineIssueEvent::DocumentIssued { document_id }
            }
            IssueStep::DocumentFailed {
                document_id,
                message,
            } => EngineIssueEvent::DocumentFailed {
                document_id,
                cause: EngineError::failure(message),
            },
            IssueStep::Deferred { document_id } => {
                EngineIssueEvent::DocumentDeferred { document_id }
            }
            IssueStep::Finished => EngineIssueEvent::Finished,
            IssueStep::Failure(message) => {
                EngineIssueEvent::Failure(EngineError::failure(message))
            }
        };
        self.listener.on_issue_event(event);
        Ok(())
    }
}

/// A processed request with fixed content.
#[derive(Debug)]
pub struct MemoryProcessedRequest {
    requested: Vec<RequestedDocument>,
    reader: Result<Option<String>, EngineError>,
    generation_failure: Option<EngineError>,
    generated: AtomicUsize,
    last_disclosure: Mutex<Option<DisclosedDocuments>>,
}

impl MemoryProcessedRequest {
    /// A request for `requested`, without reader authentication.
    #[must_use]
    pub const fn new(requested: Vec<RequestedDocument>) -> Self {
        Self {
            requested,
            reader: Ok(None),
            generation_failure: None,
            generated: AtomicUsize::new(0),
            last_disclosure: Mutex::new(None),
        }
    }

    /// Sets the reader common name.
    #[must_use]
    pub fn with_reader_name(mut self, name: &str) -> Self {
        self.reader = Ok(Some(name.to_string()));
        self
    }

    /// Makes reading the reader name fail.
    #[must_use]
    pub fn with_unreadable_reader(mut self, error: EngineError) -> Self {
        self.reader = Err(error);
        self
    }

    /// Makes response generation fail.
    #[must_use]
    pub fn failing_generation(mut self, error: EngineError) -> Self {
        self.generation_failure = Some(error);
        self
    }

    /// How many responses were generated.
    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    /// The last disclosure a response was generated for.
    #[must_use]
    pub fn last_disclosure(&self) -> Option<DisclosedDocuments> {
        lock(&self.last_disclosure).clone()
    }
}

impl ProcessedRequest for MemoryProcessedRequest {
    fn requested_documents(&self) -> Vec<RequestedDocument> {
        self.requested.clone()
    }

    fn reader_common_name(&self) -> Result<Option<String>, EngineError> {
        self.reader.clone()
    }

    fn generate_response(
        &self,
        disclosed: &DisclosedDocuments,
    ) -> Result<EngineResponse, EngineError> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_disclosure) = Some(disclosed.clone());
        if let Some(error) = &self.generation_failure {
            return Err(error.clone());
        }
        let bytes = serde_json::to_vec(disclosed).map_err(|e| EngineError::failure(e.to_string()))?;
        Ok(EngineResponse { bytes })
    }
}

/// Factory returning one shared [`MemoryEngine`].
pub struct MemoryEngineFactory {
    engine: Arc<MemoryEngine>,
    failure: Option<EngineError>,
    delay: Duration,
    constructions: AtomicUsize,
    last_paths: Mutex<Option<EnginePaths>>,
}

impl MemoryEngineFactory {
    /// A factory that always succeeds with `engine`.
    #[must_use]
    pub const fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            failure: None,
            delay: Duration::ZERO,
            constructions: AtomicUsize::new(0),
            last_paths: Mutex::new(None),
        }
    }

    /// Makes construction fail with `error`.
    #[must_use]
    pub fn failing(mut self, error: EngineError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Makes construction take `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many constructions were attempted.
    #[must_use]
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// The paths of the last construction.
    #[must_use]
    pub fn last_paths(&self) -> Option<EnginePaths> {
        lock(&self.last_paths).clone()
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn create(
        &self,
        _config: &HolderConfig,
        paths: &EnginePaths,
    ) -> Result<Arc<dyn CredentialEngine>, EngineError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_paths) = Some(paths.clone());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.engine.clone()),
        }
    }
}
