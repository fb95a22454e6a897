//! Credential offer resolution and document issuance.
//!
//! [`IssuanceCoordinator`] owns the engine-facing session and its replayable
//! event stream. [`IssuanceFlow`] sits on top of it and turns the stream into
//! observable screen state.

mod coordinator;
pub use coordinator::IssuanceCoordinator;

mod flow;
pub use flow::{IssuanceFlow, IssuanceProgress, OfferState};

mod offer;
pub use offer::{OfferSummary, OfferedDocumentSummary};

mod resume;
pub use resume::{DefaultIssuancePolicy, IssuancePolicy, ResumeSlot};

mod stream;
pub use stream::{IssuanceEvent, IssuanceStream};
