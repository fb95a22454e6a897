#![allow(dead_code, missing_docs)]

//! Common test utilities shared across integration tests.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use holderkit_core::engine::memory::{MemoryEngine, MemoryEngineFactory};
use holderkit_core::engine::{
    CredentialOffer, DocumentFormat, OfferedDocument, RequestedDocument, RequestedItem,
};
use holderkit_core::{HolderConfig, HolderKit};
use tokio::sync::watch;
use uuid::Uuid;

pub const PID_DOC_TYPE: &str = "eu.europa.ec.eudi.pid.1";
pub const MDL_DOC_TYPE: &str = "org.iso.18013.5.1.mDL";

/// Installs a test subscriber honoring `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates a unique directory path under the system temp dir.
pub fn temp_root(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("holderkit-{prefix}-{}", Uuid::new_v4()))
}

pub fn cleanup_root(root: &PathBuf) {
    let _ = std::fs::remove_dir_all(root);
}

pub fn config(root: &PathBuf) -> HolderConfig {
    HolderConfig::new(
        "test-license",
        "https://org.example",
        root.join("no_backup"),
        root.join("cache"),
    )
}

/// A kit over a fresh memory engine, not yet initialized.
pub fn kit_with(engine: &Arc<MemoryEngine>, root: &PathBuf) -> HolderKit {
    let factory = MemoryEngineFactory::new(Arc::clone(engine));
    HolderKit::new(config(root), Arc::new(factory))
}

/// A kit over a fresh memory engine, initialized.
pub async fn initialized_kit(prefix: &str) -> (Arc<MemoryEngine>, HolderKit, PathBuf) {
    init_tracing();
    let root = temp_root(prefix);
    let engine = Arc::new(MemoryEngine::new());
    let kit = kit_with(&engine, &root);
    kit.initialize().await.expect("initialize kit");
    (engine, kit, root)
}

pub fn pid_offer(documents: usize) -> CredentialOffer {
    CredentialOffer {
        issuer_name: "EUDI Remote Verifier Issuer".to_string(),
        offered_documents: (0..documents)
            .map(|i| OfferedDocument {
                name: format!("PID {i}"),
                configuration_id: format!("eu.europa.ec.eudi.pid_mso_mdoc_{i}"),
                format: DocumentFormat::MsoMdoc {
                    doc_type: PID_DOC_TYPE.to_string(),
                },
            })
            .collect(),
        tx_code_spec: None,
    }
}

pub fn requested(document_id: &str, items: &[&str]) -> RequestedDocument {
    RequestedDocument {
        document_id: document_id.to_string(),
        requested_items: items
            .iter()
            .map(|id| RequestedItem {
                id: (*id).to_string(),
                intent_to_retain: false,
            })
            .collect(),
    }
}

/// Waits until `receiver` holds a value matching `done`, failing after five seconds.
pub async fn wait_for<T, F>(receiver: &mut watch::Receiver<T>, done: F) -> T
where
    T: Clone + std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(done))
        .await
        .expect("timed out waiting for state")
        .expect("state sender dropped")
        .clone();
    value
}

/// Runs `future` with a five second bound.
pub async fn bounded<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
