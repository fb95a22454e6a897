//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::defaults;
use crate::error::HolderKitError;

/// Configuration handed to the engine at construction.
///
/// Only the license key, organization URL and the two storage roots are
/// required; every other section falls back to [`crate::defaults`].
///
/// ```rust
/// use holderkit_core::HolderConfig;
///
/// let config = HolderConfig::from_json(
///     r#"{
///         "license_key": "lic-123",
///         "organization_url": "https://org.example",
///         "storage_dir": "/data/no_backup",
///         "cache_dir": "/data/cache"
///     }"#,
/// )
/// .unwrap();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.openid4vci.client_id, "wallet-dev");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderConfig {
    /// License credential for the engine.
    pub license_key: String,
    /// Organization endpoint the license belongs to.
    pub organization_url: String,
    /// Root for data that must survive restarts and stay out of backups.
    pub storage_dir: PathBuf,
    /// Root for disposable engine data.
    pub cache_dir: PathBuf,
    /// Issuance settings.
    #[serde(default)]
    pub openid4vci: OpenId4VciConfig,
    /// Remote presentation settings.
    #[serde(default)]
    pub openid4vp: OpenId4VpConfig,
    /// Proximity transport settings.
    #[serde(default)]
    pub proximity: ProximityConfig,
    /// Document key creation settings.
    #[serde(default)]
    pub key_creation: KeyCreationConfig,
    /// Whether browser-mediated requests are accepted.
    #[serde(default = "enabled")]
    pub browser_mediated_enabled: bool,
    /// Redirect URI of the organization sign-up login, when used.
    #[serde(default)]
    pub signup_redirect_uri: Option<String>,
}

/// OpenID4VCI issuer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenId4VciConfig {
    /// Credential issuer URL.
    pub issuer_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// Redirect URI the authorization server returns to.
    pub authorization_redirect_uri: String,
    /// Whether PAR is used for the authorization request.
    pub use_pushed_authorization: bool,
}

impl Default for OpenId4VciConfig {
    fn default() -> Self {
        Self {
            issuer_url: defaults::DEFAULT_ISSUER_URL.to_string(),
            client_id: defaults::DEFAULT_CLIENT_ID.to_string(),
            authorization_redirect_uri: defaults::authorization_redirect_uri(),
            use_pushed_authorization: true,
        }
    }
}

/// OpenID4VP verifier-facing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenId4VpConfig {
    /// URI schemes the engine answers remote requests on.
    pub schemes: Vec<String>,
    /// Accepted credential formats with their signing algorithm.
    pub formats: Vec<String>,
    /// Accepted client identifier schemes.
    pub client_id_schemes: Vec<String>,
}

impl Default for OpenId4VpConfig {
    fn default() -> Self {
        Self {
            schemes: vec![defaults::PRESENTATION_REQUEST_SCHEME.to_string()],
            formats: vec!["dc+sd-jwt:ES256".to_string(), "mso_mdoc:ES256".to_string()],
            client_id_schemes: vec![
                "redirect_uri".to_string(),
                "x509_hash".to_string(),
                "x509_san_dns".to_string(),
            ],
        }
    }
}

/// Proximity transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Advertise as BLE peripheral.
    pub ble_peripheral_mode: bool,
    /// Scan as BLE central.
    pub ble_central_mode: bool,
    /// Clear the BLE service cache between sessions.
    pub clear_ble_cache: bool,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            ble_peripheral_mode: true,
            ble_central_mode: true,
            clear_ble_cache: true,
        }
    }
}

/// Settings for keys created for new documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyCreationConfig {
    /// Whether each key use requires user authentication.
    pub user_authentication_required: bool,
    /// Whether keys go into the dedicated secure element when present.
    pub use_strongbox: bool,
}

impl Default for KeyCreationConfig {
    fn default() -> Self {
        Self {
            user_authentication_required: false,
            use_strongbox: true,
        }
    }
}

const fn enabled() -> bool {
    true
}

impl HolderConfig {
    /// Builds a configuration with defaults for every optional section.
    #[must_use]
    pub fn new(
        license_key: impl Into<String>,
        organization_url: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            license_key: license_key.into(),
            organization_url: organization_url.into(),
            storage_dir: storage_dir.into(),
            cache_dir: cache_dir.into(),
            openid4vci: OpenId4VciConfig::default(),
            openid4vp: OpenId4VpConfig::default(),
            proximity: ProximityConfig::default(),
            key_creation: KeyCreationConfig::default(),
            browser_mediated_enabled: true,
            signup_redirect_uri: None,
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HolderKitError::InvalidInput`] if the JSON does not describe a configuration.
    pub fn from_json(json: &str) -> Result<Self, HolderKitError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the values the engine cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`HolderKitError::Configuration`] naming the first invalid attribute.
    pub fn validate(&self) -> Result<(), HolderKitError> {
        if self.license_key.trim().is_empty() {
            return Err(HolderKitError::configuration(
                "license_key",
                "License key not configured",
            ));
        }
        if self.organization_url.trim().is_empty() {
            return Err(HolderKitError::configuration(
                "organization_url",
                "Organization URL not configured",
            ));
        }
        parse_url("organization_url", &self.organization_url)?;
        parse_url("openid4vci.issuer_url", &self.openid4vci.issuer_url)?;
        parse_url(
            "openid4vci.authorization_redirect_uri",
            &self.openid4vci.authorization_redirect_uri,
        )?;
        if let Some(uri) = &self.signup_redirect_uri {
            parse_url("signup_redirect_uri", uri)?;
        }
        Ok(())
    }
}

fn parse_url(attribute: &str, value: &str) -> Result<Url, HolderKitError> {
    Url::parse(value).map_err(|e| HolderKitError::configuration(attribute, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HolderConfig {
        HolderConfig::new("lic-123", "https://org.example", "/data/nb", "/data/cache")
    }

    #[test]
    fn test_defaults_applied() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.openid4vci.issuer_url, defaults::DEFAULT_ISSUER_URL);
        assert_eq!(
            config.openid4vci.authorization_redirect_uri,
            "eudi-openid4ci://authorize"
        );
        assert_eq!(config.openid4vp.schemes, vec!["mdoc-openid4vp"]);
        assert!(config.proximity.ble_central_mode);
        assert!(!config.key_creation.user_authentication_required);
        assert!(config.browser_mediated_enabled);
    }

    #[test]
    fn test_blank_license_rejected() {
        let mut config = config();
        config.license_key = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            HolderKitError::configuration("license_key", "License key not configured")
        );
    }

    #[test]
    fn test_blank_organization_rejected() {
        let mut config = config();
        config.organization_url = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            HolderKitError::Configuration { ref attribute, .. } if attribute == "organization_url"
        ));
    }

    #[test]
    fn test_malformed_organization_rejected() {
        let mut config = config();
        config.organization_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_from_json_partial_sections() {
        let config = HolderConfig::from_json(
            r#"{
                "license_key": "lic",
                "organization_url": "https://org.example",
                "storage_dir": "/s",
                "cache_dir": "/c",
                "proximity": { "clear_ble_cache": false },
                "browser_mediated_enabled": false
            }"#,
        )
        .expect("parse");

        assert!(!config.proximity.clear_ble_cache);
        assert!(config.proximity.ble_peripheral_mode);
        assert!(!config.browser_mediated_enabled);
        assert_eq!(config.openid4vci.client_id, "wallet-dev");
    }

    #[test]
    fn test_from_json_missing_license() {
        let err = HolderConfig::from_json(r#"{ "organization_url": "https://org.example" }"#)
            .unwrap_err();
        assert!(matches!(err, HolderKitError::InvalidInput { .. }));
    }
}
