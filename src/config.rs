use std::collections::BTreeSet;

use chrono::Duration;
use serde::Deserialize;
use url::Url;

/// Settings of the authorization server this library runs in.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub issuer: BaseUrl,
    pub token_endpoint: Url,
    /// Tolerated difference between the clocks of clients and the server, in seconds.
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew: u32,
    /// Also accept client assertions addressed to the issuer identifier.
    #[serde(default = "default_accept_issuer_as_audience")]
    pub accept_issuer_as_audience: bool,
}

fn default_max_clock_skew() -> u32 {
    60
}

fn default_accept_issuer_as_audience() -> bool {
    true
}

impl ServerConfig {
    pub fn new(issuer: BaseUrl, token_endpoint: Url) -> Self {
        Self {
            issuer,
            token_endpoint,
            max_clock_skew: default_max_clock_skew(),
            accept_issuer_as_audience: default_accept_issuer_as_audience(),
        }
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::seconds(self.max_clock_skew.into())
    }

    /// The audiences a client authentication assertion may be addressed to.
    pub fn expected_audience(&self) -> BTreeSet<String> {
        let mut audience = BTreeSet::from([self.token_endpoint.to_string()]);
        if self.accept_issuer_as_audience {
            audience.insert(self.issuer.to_string());
            // Issuer identifiers are commonly written without the trailing slash.
            audience.insert(self.issuer.as_str().trim_end_matches('/').to_owned());
        }
        audience
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_and_audience() {
        let config: ServerConfig = serde_json::from_value(json!({
            "issuer": "https://server.example.com",
            "token_endpoint": "https://server.example.com/token",
        }))
        .unwrap();
        assert_eq!(config.max_clock_skew(), Duration::seconds(60));
        assert_eq!(config.issuer.as_str(), "https://server.example.com/");
        assert_eq!(
            config.expected_audience(),
            BTreeSet::from([
                "https://server.example.com".to_owned(),
                "https://server.example.com/".to_owned(),
                "https://server.example.com/token".to_owned(),
            ])
        );
    }

    #[test]
    fn issuer_audience_can_be_disabled() {
        let config: ServerConfig = serde_json::from_value(json!({
            "issuer": "https://server.example.com/tenant",
            "token_endpoint": "https://server.example.com/tenant/token",
            "max_clock_skew": 5,
            "accept_issuer_as_audience": false,
        }))
        .unwrap();
        assert_eq!(
            config.expected_audience(),
            BTreeSet::from(["https://server.example.com/tenant/token".to_owned()])
        );
        assert_eq!(config.max_clock_skew(), Duration::seconds(5));
        assert_eq!(config.issuer.join("jwks").unwrap().path(), "/tenant/jwks");
    }
}
