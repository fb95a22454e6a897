//! Default endpoints, schemes and actions.

/// Issuer used when the configuration does not name one.
pub const DEFAULT_ISSUER_URL: &str = "https://dev.issuer-backend.eudiw.dev";

/// OAuth client id presented to the issuer.
pub const DEFAULT_CLIENT_ID: &str = "wallet-dev";

/// Scheme of the issuance authorization redirect.
pub const AUTHORIZATION_REDIRECT_SCHEME: &str = "eudi-openid4ci";

/// Host of the issuance authorization redirect.
pub const AUTHORIZATION_REDIRECT_HOST: &str = "authorize";

/// Scheme the engine registers for remote presentation requests.
pub const PRESENTATION_REQUEST_SCHEME: &str = "mdoc-openid4vp";

/// Every scheme accepted as a remote presentation request.
pub const PRESENTATION_REQUEST_SCHEMES: [&str; 3] =
    [PRESENTATION_REQUEST_SCHEME, "openid4vp", "openid-vc"];

/// Scheme of credential offer links.
pub const CREDENTIAL_OFFER_SCHEME: &str = "openid-credential-offer";

/// Query parameter or path fragment identifying a credential offer.
pub const CREDENTIAL_OFFER_MARKER: &str = "credential_offer";

/// Platform actions that carry a browser-mediated credential request.
pub const BROWSER_MEDIATED_ACTIONS: [&str; 2] = [
    "androidx.credentials.registry.provider.action.GET_CREDENTIAL",
    "androidx.identitycredentials.action.GET_CREDENTIALS",
];

/// Flow state key under which the issuance flow keeps the offer URI.
pub const OFFER_URI_KEY: &str = "openid4vci_offer_uri";

/// The default authorization redirect URI.
#[must_use]
pub fn authorization_redirect_uri() -> String {
    format!("{AUTHORIZATION_REDIRECT_SCHEME}://{AUTHORIZATION_REDIRECT_HOST}")
}
