use crate::engine::CredentialOffer;

/// Display data for one offered document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OfferedDocumentSummary {
    /// Name to show. Falls back to the doc type when the issuer sent none.
    pub name: String,
    /// Document type.
    pub doc_type: String,
    /// Format label, `mso_mdoc` or `sd-jwt-vc`.
    pub format: String,
}

/// What the holder is shown before accepting an offer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OfferSummary {
    /// Issuer display name.
    pub issuer_name: String,
    /// Offered documents.
    pub documents: Vec<OfferedDocumentSummary>,
    /// Whether a transaction code has to be entered.
    pub requires_tx_code: bool,
    /// Issuer guidance for the transaction code.
    pub tx_code_description: Option<String>,
}

impl From<&CredentialOffer> for OfferSummary {
    fn from(offer: &CredentialOffer) -> Self {
        let documents = offer
            .offered_documents
            .iter()
            .map(|document| {
                let doc_type = document.format.doc_type().to_string();
                let name = if document.name.trim().is_empty() {
                    doc_type.clone()
                } else {
                    document.name.clone()
                };
                OfferedDocumentSummary {
                    name,
                    doc_type,
                    format: document.format.to_string(),
                }
            })
            .collect();

        Self {
            issuer_name: offer.issuer_name.clone(),
            documents,
            requires_tx_code: offer.requires_tx_code(),
            tx_code_description: offer
                .tx_code_spec
                .as_ref()
                .and_then(|spec| spec.description.clone()),
        }
    }
}
