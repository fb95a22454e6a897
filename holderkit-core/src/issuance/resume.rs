use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{HolderConfig, KeyCreationConfig};
use crate::engine::{CreateDocumentSettings, KeyUnlockMap, OfferedDocument};

type Continuation<T> = Box<dyn FnOnce(T) + Send>;

/// One-shot continuation the engine is blocked on.
///
/// Clones share the continuation: whichever clone resumes first wins and every
/// later call is a no-op returning `false`. An issuance whose slot is never
/// resumed stalls until the engine gives up.
pub struct ResumeSlot<T> {
    continuation: Arc<Mutex<Option<Continuation<T>>>>,
}

impl<T> ResumeSlot<T> {
    pub(crate) fn new(continuation: Continuation<T>) -> Self {
        Self {
            continuation: Arc::new(Mutex::new(Some(continuation))),
        }
    }

    /// Hands `value` to the engine. Returns `false` if the slot was already used.
    #[must_use]
    pub fn resume(&self, value: T) -> bool {
        let continuation = self
            .continuation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // called outside the lock, the engine may re-enter
        match continuation {
            Some(resume) => {
                resume(value);
                true
            }
            None => false,
        }
    }

    /// Whether the slot was used.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.continuation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Clone for ResumeSlot<T> {
    fn clone(&self) -> Self {
        Self {
            continuation: Arc::clone(&self.continuation),
        }
    }
}

impl<T> fmt::Debug for ResumeSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeSlot")
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

/// Supplies the answers the engine asks for while issuing.
pub trait IssuancePolicy: Send + Sync {
    /// Settings for creating the keys of `document`.
    fn create_settings(&self, document: &OfferedDocument) -> CreateDocumentSettings;

    /// Unlock data for the `keys` of `document_id`.
    fn unlock_keys(&self, document_id: &str, keys: &[String]) -> KeyUnlockMap;
}

/// One rotating credential per document with keys created per the
/// configured [`KeyCreationConfig`]. Unlock requests get no user
/// authentication data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultIssuancePolicy {
    key_creation: KeyCreationConfig,
}

impl DefaultIssuancePolicy {
    /// A policy creating keys as `key_creation` describes.
    #[must_use]
    pub const fn new(key_creation: KeyCreationConfig) -> Self {
        Self { key_creation }
    }

    /// A policy using the key creation section of `config`.
    #[must_use]
    pub const fn from_config(config: &HolderConfig) -> Self {
        Self::new(config.key_creation)
    }
}

impl IssuancePolicy for DefaultIssuancePolicy {
    fn create_settings(&self, _document: &OfferedDocument) -> CreateDocumentSettings {
        CreateDocumentSettings {
            user_authentication_required: self.key_creation.user_authentication_required,
            use_strongbox: self.key_creation.use_strongbox,
            ..CreateDocumentSettings::default()
        }
    }

    fn unlock_keys(&self, _document_id: &str, keys: &[String]) -> KeyUnlockMap {
        keys.iter().map(|key| (key.clone(), None)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DocumentFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slot_resumes_once_across_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ResumeSlot::new(Box::new(move |value: u32| {
            counter.fetch_add(value as usize, Ordering::SeqCst);
        }));
        let other = slot.clone();

        assert!(!slot.is_resumed());
        assert!(other.resume(3));
        assert!(!slot.resume(5));
        assert!(slot.is_resumed());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    fn offered() -> OfferedDocument {
        OfferedDocument {
            name: "PID".to_string(),
            configuration_id: "pid_mso_mdoc".to_string(),
            format: DocumentFormat::MsoMdoc {
                doc_type: "eu.europa.ec.eudi.pid.1".to_string(),
            },
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = DefaultIssuancePolicy::default();
        assert_eq!(policy.create_settings(&offered()), CreateDocumentSettings::default());
        let unlock = policy.unlock_keys("d1", &["k1".to_string(), "k2".to_string()]);
        assert_eq!(unlock.len(), 2);
        assert!(unlock.values().all(Option::is_none));
    }

    #[test]
    fn test_policy_carries_key_creation_config() {
        let mut config = HolderConfig::new("lic", "https://org.example", "/s", "/c");
        config.key_creation = KeyCreationConfig {
            user_authentication_required: true,
            use_strongbox: false,
        };
        let settings = DefaultIssuancePolicy::from_config(&config).create_settings(&offered());

        assert!(settings.user_authentication_required);
        assert!(!settings.use_strongbox);
        assert_eq!(settings.number_of_credentials, 1);
    }
}
