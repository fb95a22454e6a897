//! Records exchanged with the credential engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque bytes handed back to the caller of a browser-mediated request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ResultPayload {
    /// The encoded result, passed through untouched.
    pub bytes: Vec<u8>,
}

impl ResultPayload {
    /// Wraps raw result bytes.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// A browser-mediated credential request as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct BrowserRequest {
    /// The platform action the request arrived with.
    pub action: String,
    /// Opaque request payload, forwarded to the engine as is.
    pub payload: Vec<u8>,
}

/// Encoded presentation response produced by a processed request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EngineResponse {
    /// The encoded response.
    pub bytes: Vec<u8>,
}

/// Credential format of an offered or stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DocumentFormat {
    /// ISO 18013-5 mobile document.
    #[strum(serialize = "mso_mdoc")]
    MsoMdoc {
        /// The mdoc document type, e.g. `eu.europa.ec.eudi.pid.1`.
        doc_type: String,
    },
    /// SD-JWT verifiable credential.
    #[strum(serialize = "sd-jwt-vc")]
    SdJwtVc {
        /// The verifiable credential type.
        vct: String,
    },
}

impl DocumentFormat {
    /// The document type (`doc_type` for mdoc, `vct` for SD-JWT VC).
    #[must_use]
    pub fn doc_type(&self) -> &str {
        match self {
            Self::MsoMdoc { doc_type } => doc_type,
            Self::SdJwtVc { vct } => vct,
        }
    }
}

/// How a transaction code must be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "lowercase")]
pub enum TxCodeInputMode {
    /// Digits only.
    Numeric,
    /// Free text.
    Text,
}

/// Transaction code requirement attached to a credential offer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TxCodeSpec {
    /// Expected input mode.
    pub input_mode: TxCodeInputMode,
    /// Expected length, when the issuer announced one.
    pub length: Option<u32>,
    /// Issuer supplied guidance for the user.
    pub description: Option<String>,
}

/// A document the issuer offers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OfferedDocument {
    /// Display name announced by the issuer. May be empty.
    pub name: String,
    /// Issuer credential configuration identifier.
    pub configuration_id: String,
    /// Format and type of the offered credential.
    pub format: DocumentFormat,
}

/// A resolved credential offer. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CredentialOffer {
    /// Display name of the issuer.
    pub issuer_name: String,
    /// Documents that can be issued from this offer.
    pub offered_documents: Vec<OfferedDocument>,
    /// Transaction code the user has to enter, if any.
    pub tx_code_spec: Option<TxCodeSpec>,
}

impl CredentialOffer {
    /// Whether issuing this offer needs a transaction code.
    #[must_use]
    pub const fn requires_tx_code(&self) -> bool {
        self.tx_code_spec.is_some()
    }
}

/// How issued credentials of a document are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "snake_case")]
pub enum CredentialPolicy {
    /// Credentials are reused, rotating between the available ones.
    RotateUse,
    /// Each credential is presented once and then discarded.
    OneTimeUse,
}

/// Settings the engine needs before creating the keys of a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CreateDocumentSettings {
    /// How many credentials to request for the document.
    pub number_of_credentials: u32,
    /// Consumption policy for those credentials.
    pub credential_policy: CredentialPolicy,
    /// Whether each use of the new keys requires user authentication.
    pub user_authentication_required: bool,
    /// Whether the keys go into the dedicated secure element when present.
    pub use_strongbox: bool,
}

impl Default for CreateDocumentSettings {
    fn default() -> Self {
        Self {
            number_of_credentials: 1,
            credential_policy: CredentialPolicy::RotateUse,
            user_authentication_required: false,
            use_strongbox: true,
        }
    }
}

/// Unlock data per key alias. `None` means no user authentication supplied.
pub type KeyUnlockMap = BTreeMap<String, Option<Vec<u8>>>;

/// Lifecycle state of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "snake_case")]
pub enum DocumentState {
    /// Fully issued and presentable.
    Issued,
    /// Keys created, issuance not completed.
    Unsigned,
    /// Issuance deferred by the issuer.
    Deferred,
}

/// A document held in the engine's store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HolderDocument {
    /// Engine assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Format and type.
    pub format: DocumentFormat,
    /// Lifecycle state.
    pub state: DocumentState,
    /// Number of credentials still available for presentation.
    pub credentials_count: u32,
}

impl HolderDocument {
    /// Whether the document can be presented.
    #[must_use]
    pub fn is_issued(&self) -> bool {
        self.state == DocumentState::Issued
    }
}

/// A single data element asked for by a verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RequestedItem {
    /// Element identifier, namespaced where the format has namespaces.
    pub id: String,
    /// Whether the verifier declared it will retain the element.
    pub intent_to_retain: bool,
}

/// One document asked for by a verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RequestedDocument {
    /// Id of the holder document the engine matched for this request.
    pub document_id: String,
    /// Requested elements.
    pub requested_items: Vec<RequestedItem>,
}

/// The elements of one document the holder agrees to disclose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DisclosedDocument {
    /// Holder document id.
    pub document_id: String,
    /// Disclosed element identifiers.
    pub disclosed_items: Vec<String>,
}

/// The disclosure decision submitted for a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DisclosedDocuments {
    /// One entry per disclosed document.
    pub documents: Vec<DisclosedDocument>,
}

impl DisclosedDocuments {
    /// Discloses every requested item of every given requested document.
    #[must_use]
    pub fn all_requested<'a>(
        requested: impl IntoIterator<Item = &'a RequestedDocument>,
    ) -> Self {
        let documents = requested
            .into_iter()
            .map(|document| DisclosedDocument {
                document_id: document.document_id.clone(),
                disclosed_items: document
                    .requested_items
                    .iter()
                    .map(|item| item.id.clone())
                    .collect(),
            })
            .collect();
        Self { documents }
    }
}
