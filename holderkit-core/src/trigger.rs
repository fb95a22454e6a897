//! Classification of links and platform intents that start or resume a flow.

use url::Url;

use crate::config::HolderConfig;
use crate::defaults::{
    AUTHORIZATION_REDIRECT_HOST, AUTHORIZATION_REDIRECT_SCHEME, BROWSER_MEDIATED_ACTIONS,
    CREDENTIAL_OFFER_MARKER, CREDENTIAL_OFFER_SCHEME, PRESENTATION_REQUEST_SCHEMES,
};
use crate::engine::BrowserRequest;
use crate::error::HolderKitError;

/// Something the host received from outside that a flow must handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalTrigger {
    /// A credential offer to resolve with the issuance flow.
    CredentialOffer {
        /// The offer link.
        uri: String,
    },
    /// The issuer's authorization redirect for a suspended issuance.
    AuthorizationRedirect {
        /// The redirect link, with its query intact.
        uri: String,
    },
    /// A remote presentation request.
    PresentationRequest {
        /// The request link.
        uri: String,
    },
    /// A browser-mediated presentation request.
    BrowserMediated(BrowserRequest),
}

impl ExternalTrigger {
    /// Classifies a link opened by the host.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::InvalidInput`] if `uri` is not a URL or not one of the
    /// recognized links.
    pub fn from_uri(uri: &str) -> Result<Self, HolderKitError> {
        let parsed = Url::parse(uri).map_err(|e| HolderKitError::InvalidInput {
            attribute: "uri".to_string(),
            reason: e.to_string(),
        })?;
        let scheme = parsed.scheme();
        let uri = uri.to_string();

        if scheme == AUTHORIZATION_REDIRECT_SCHEME
            && parsed.host_str() == Some(AUTHORIZATION_REDIRECT_HOST)
        {
            return Ok(Self::AuthorizationRedirect { uri });
        }
        if PRESENTATION_REQUEST_SCHEMES.contains(&scheme) {
            return Ok(Self::PresentationRequest { uri });
        }
        if scheme == CREDENTIAL_OFFER_SCHEME || uri.contains(CREDENTIAL_OFFER_MARKER) {
            return Ok(Self::CredentialOffer { uri });
        }

        Err(HolderKitError::InvalidInput {
            attribute: "uri".to_string(),
            reason: format!("unsupported link scheme `{scheme}`"),
        })
    }

    /// Classifies a platform intent. Returns `None` for actions that do not
    /// carry a browser-mediated request, and for every action when `config`
    /// disables browser-mediated requests.
    #[must_use]
    pub fn from_action(config: &HolderConfig, action: &str, payload: Vec<u8>) -> Option<Self> {
        if !config.browser_mediated_enabled {
            tracing::debug!(action, "browser-mediated requests disabled, intent ignored");
            return None;
        }
        BROWSER_MEDIATED_ACTIONS.contains(&action).then(|| {
            Self::BrowserMediated(BrowserRequest {
                action: action.to_string(),
                payload,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("eudi-openid4ci://authorize?code=abc&state=s" ; "redirect")]
    fn test_authorization_redirect(uri: &str) {
        assert_eq!(
            ExternalTrigger::from_uri(uri).unwrap(),
            ExternalTrigger::AuthorizationRedirect {
                uri: uri.to_string()
            }
        );
    }

    #[test_case("mdoc-openid4vp://?request_uri=https://verifier.example/r/1" ; "mdoc")]
    #[test_case("openid4vp://?client_id=x&request_uri=https://v.example/r" ; "openid4vp")]
    #[test_case("openid-vc://?request_uri=https://v.example/r" ; "openid-vc")]
    fn test_presentation_request(uri: &str) {
        assert!(matches!(
            ExternalTrigger::from_uri(uri).unwrap(),
            ExternalTrigger::PresentationRequest { .. }
        ));
    }

    #[test_case("openid-credential-offer://?credential_offer_uri=https://i.example/o/1" ; "scheme")]
    #[test_case("https://issuer.example/start?credential_offer=%7B%7D" ; "marker")]
    fn test_credential_offer(uri: &str) {
        assert!(matches!(
            ExternalTrigger::from_uri(uri).unwrap(),
            ExternalTrigger::CredentialOffer { .. }
        ));
    }

    #[test_case("eudi-openid4ci://other?code=abc" ; "redirect with other host")]
    #[test_case("https://example.com/" ; "plain web link")]
    #[test_case("not a uri" ; "garbage")]
    fn test_rejected(uri: &str) {
        assert!(matches!(
            ExternalTrigger::from_uri(uri).unwrap_err(),
            HolderKitError::InvalidInput { .. }
        ));
    }

    fn config() -> HolderConfig {
        HolderConfig::new("lic", "https://org.example", "/s", "/c")
    }

    #[test]
    fn test_from_action() {
        let trigger = ExternalTrigger::from_action(
            &config(),
            "androidx.credentials.registry.provider.action.GET_CREDENTIAL",
            vec![7],
        );
        assert!(matches!(
            trigger,
            Some(ExternalTrigger::BrowserMediated(BrowserRequest { ref payload, .. })) if payload == &[7]
        ));
        assert_eq!(
            ExternalTrigger::from_action(&config(), "android.intent.action.VIEW", vec![]),
            None
        );
    }

    #[test_case("androidx.credentials.registry.provider.action.GET_CREDENTIAL" ; "registry")]
    #[test_case("androidx.identitycredentials.action.GET_CREDENTIALS" ; "identity credentials")]
    fn test_from_action_disabled(action: &str) {
        let mut config = config();
        config.browser_mediated_enabled = false;
        assert_eq!(ExternalTrigger::from_action(&config, action, vec![1]), None);
    }
}
