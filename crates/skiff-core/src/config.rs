//! Client configuration: credentials, region and endpoints.
//!
//! A [`Config`] is resolved once, when a [`Client`](crate::Client) is
//! constructed, and is immutable afterwards.

use crate::error::Error;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Credential material used by the transport.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id for control-endpoint calls.
    pub access_key_id: Option<String>,
    /// Access key secret for control-endpoint calls.
    pub access_key_secret: Option<String>,
    /// Optional short-lived security token paired with the access key.
    pub security_token: Option<String>,
    /// Pre-issued data-plane token. Sufficient on its own for
    /// data-endpoint operations.
    pub data_token: Option<String>,
}

impl Credentials {
    /// Whether a complete access-key pair is present.
    pub fn has_access_key(&self) -> bool {
        non_empty(&self.access_key_id) && non_empty(&self.access_key_secret)
    }

    /// Whether a data-plane token is present.
    pub fn has_data_token(&self) -> bool {
        non_empty(&self.data_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id.as_deref().map(mask_secret))
            .field(
                "access_key_secret",
                &self.access_key_secret.as_deref().map(mask_secret),
            )
            .field("security_token", &self.security_token.as_deref().map(mask_secret))
            .field("data_token", &self.data_token.as_deref().map(mask_secret))
            .finish()
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential material.
    pub credentials: Credentials,
    /// Account id; required to derive the default data endpoint.
    pub account_id: Option<String>,
    /// Region id (default: `cn-hangzhou`).
    pub region: String,
    /// Override for the control endpoint.
    pub control_endpoint: Option<String>,
    /// Override for the data endpoint.
    pub data_endpoint: Option<String>,
    /// Per-request timeout (default: 600s).
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            account_id: None,
            region: DEFAULT_REGION.to_string(),
            control_endpoint: None,
            data_endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Create a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// For each field the first variable that is set wins.
    ///
    /// | Field | Variables |
    /// |-------|-----------|
    /// | access key id | `SKIFF_ACCESS_KEY_ID`, `ALIBABA_CLOUD_ACCESS_KEY_ID` |
    /// | access key secret | `SKIFF_ACCESS_KEY_SECRET`, `ALIBABA_CLOUD_ACCESS_KEY_SECRET` |
    /// | security token | `SKIFF_SECURITY_TOKEN`, `ALIBABA_CLOUD_SECURITY_TOKEN` |
    /// | data token | `SKIFF_DATA_TOKEN` |
    /// | account id | `SKIFF_ACCOUNT_ID`, `FC_ACCOUNT_ID` |
    /// | region | `SKIFF_REGION`, `FC_REGION` (default `cn-hangzhou`) |
    /// | control endpoint | `SKIFF_CONTROL_ENDPOINT` |
    /// | data endpoint | `SKIFF_DATA_ENDPOINT` |
    /// | timeout | `SKIFF_TIMEOUT_SECS` (default `600`) |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k))
                .filter(|v| !v.is_empty())
        };
        let default = Self::default();

        Self {
            credentials: Credentials {
                access_key_id: first(&["SKIFF_ACCESS_KEY_ID", "ALIBABA_CLOUD_ACCESS_KEY_ID"]),
                access_key_secret: first(&[
                    "SKIFF_ACCESS_KEY_SECRET",
                    "ALIBABA_CLOUD_ACCESS_KEY_SECRET",
                ]),
                security_token: first(&["SKIFF_SECURITY_TOKEN", "ALIBABA_CLOUD_SECURITY_TOKEN"]),
                data_token: first(&["SKIFF_DATA_TOKEN"]),
            },
            account_id: first(&["SKIFF_ACCOUNT_ID", "FC_ACCOUNT_ID"]),
            region: first(&["SKIFF_REGION", "FC_REGION"]).unwrap_or(default.region),
            control_endpoint: first(&["SKIFF_CONTROL_ENDPOINT"]),
            data_endpoint: first(&["SKIFF_DATA_ENDPOINT"]),
            timeout: first(&["SKIFF_TIMEOUT_SECS"])
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.timeout),
            headers: default.headers,
        }
    }

    /// Validate that the configuration can authenticate at least one
    /// endpoint.
    pub fn validate(&self) -> Result<(), Error> {
        if self.region.trim().is_empty() {
            return Err(Error::Config("region must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be > 0".into()));
        }
        if !self.credentials.has_access_key() && !self.credentials.has_data_token() {
            return Err(Error::Config(
                "either an access key pair or a data token is required".into(),
            ));
        }
        if self.data_endpoint.is_none() && !non_empty(&self.account_id) {
            tracing::debug!("no account id configured, data endpoint must be set explicitly");
        }
        Ok(())
    }

    /// Endpoint for template and sandbox management.
    pub fn control_endpoint(&self) -> String {
        match &self.control_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://agentrun.{}.aliyuncs.com", self.region),
        }
    }

    /// Endpoint for sandbox-internal operations.
    pub fn data_endpoint(&self) -> Result<String, Error> {
        if let Some(endpoint) = &self.data_endpoint {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }
        let account = self.account_id()?;
        Ok(format!(
            "https://{}.agentrun-data.{}.aliyuncs.com",
            account, self.region
        ))
    }

    /// Account id, failing when it was never configured.
    pub fn account_id(&self) -> Result<&str, Error> {
        self.account_id
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "account id is not set; set SKIFF_ACCOUNT_ID or configure it explicitly"
                        .into(),
                )
            })
    }
}

/// Builder for Config.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the access-key pair.
    pub fn access_key(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.credentials.access_key_id = Some(id.into());
        self.config.credentials.access_key_secret = Some(secret.into());
        self
    }

    /// Set the short-lived security token.
    pub fn security_token(mut self, token: impl Into<String>) -> Self {
        self.config.credentials.security_token = Some(token.into());
        self
    }

    /// Set a pre-issued data-plane token.
    pub fn data_token(mut self, token: impl Into<String>) -> Self {
        self.config.credentials.data_token = Some(token.into());
        self
    }

    /// Set the account id.
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.config.account_id = Some(account_id.into());
        self
    }

    /// Set the region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Override the control endpoint.
    pub fn control_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.control_endpoint = Some(endpoint.into());
        self
    }

    /// Override the data endpoint.
    pub fn data_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.data_endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(self) -> Result<Config, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Mask a secret for logging, keeping at most two leading and two trailing
/// characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n @ 1..=2 => "*".repeat(n),
        n @ 3..=4 => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
        n => format!(
            "{}{}{}",
            chars[..2].iter().collect::<String>(),
            "*".repeat(n - 4),
            chars[n - 2..].iter().collect::<String>()
        ),
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.region, "cn-hangzhou");
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_from_lookup_prefers_first_variable() {
        let config = Config::from_lookup(lookup(&[
            ("SKIFF_ACCESS_KEY_ID", "primary"),
            ("ALIBABA_CLOUD_ACCESS_KEY_ID", "fallback"),
            ("ALIBABA_CLOUD_ACCESS_KEY_SECRET", "secret"),
            ("FC_ACCOUNT_ID", "12345"),
            ("SKIFF_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.credentials.access_key_id.as_deref(), Some("primary"));
        assert_eq!(config.credentials.access_key_secret.as_deref(), Some("secret"));
        assert_eq!(config.account_id.as_deref(), Some("12345"));
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_ignores_empty_values() {
        let config = Config::from_lookup(lookup(&[("SKIFF_REGION", ""), ("FC_REGION", "")]));
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_default_endpoints() {
        let config = Config::builder()
            .access_key("id", "secret")
            .account_id("1234")
            .region("cn-shanghai")
            .build()
            .expect("valid config");
        assert_eq!(
            config.control_endpoint(),
            "https://agentrun.cn-shanghai.aliyuncs.com"
        );
        assert_eq!(
            config.data_endpoint().unwrap(),
            "https://1234.agentrun-data.cn-shanghai.aliyuncs.com"
        );
    }

    #[test]
    fn test_explicit_endpoints_strip_trailing_slash() {
        let config = Config::builder()
            .data_token("tok")
            .control_endpoint("http://localhost:9000/")
            .data_endpoint("http://localhost:9001/")
            .build()
            .unwrap();
        assert_eq!(config.control_endpoint(), "http://localhost:9000");
        assert_eq!(config.data_endpoint().unwrap(), "http://localhost:9001");
    }

    #[test]
    fn test_data_endpoint_requires_account() {
        let config = Config::builder().data_token("tok").build().unwrap();
        assert!(matches!(config.data_endpoint(), Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_requires_credentials() {
        let result = Config::builder().account_id("1").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_data_token_alone_is_valid() {
        assert!(Config::builder().data_token("tok").build().is_ok());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("ab"), "**");
        assert_eq!(mask_secret("abc"), "a*c");
        assert_eq!(mask_secret("password123"), "pa*******23");
    }

    #[test]
    fn test_debug_masks_credentials() {
        let config = Config::builder()
            .access_key("LTAIabcdefgh", "supersecretvalue")
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("supersecretvalue"));
        assert!(debug.contains("su************ue"));
    }
}
