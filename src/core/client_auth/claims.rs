//! Structural checks on JWT client assertions, independent of their signature.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    core::authorization_request::parameters::ClientId,
    utils::{one_or_many, serialize_one_or_many},
};

/// Claims of a JWT used for client authentication (RFC 7523, section 3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtAuthenticationClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        serialize_with = "serialize_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aud: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("missing 'iss' claim")]
    MissingIssuer,
    #[error("missing 'sub' claim")]
    MissingSubject,
    #[error("'iss' and 'sub' claims must both be the client identifier")]
    IssuerSubjectMismatch,
    #[error("assertion subject does not match the claimed client '{0}'")]
    ClientIdMismatch(ClientId),
    #[error("missing 'aud' claim")]
    MissingAudience,
    #[error("'aud' claim must have exactly one value")]
    MultipleAudiences,
    #[error("'aud' claim '{0}' is not an accepted audience")]
    AudienceMismatch(String),
    #[error("missing 'exp' claim")]
    MissingExpiration,
    #[error("assertion has expired")]
    Expired,
    #[error("assertion is not valid yet")]
    NotYetValid,
}

/// Validates the claims of client authentication assertions against the audiences accepted by
/// this server.
#[derive(Debug, Clone)]
pub struct JwtClaimsVerifier {
    expected_audience: BTreeSet<String>,
    max_clock_skew: Duration,
}

impl JwtClaimsVerifier {
    pub fn new(expected_audience: BTreeSet<String>, max_clock_skew: Duration) -> Self {
        Self {
            expected_audience,
            max_clock_skew,
        }
    }

    pub fn expected_audience(&self) -> &BTreeSet<String> {
        &self.expected_audience
    }

    pub fn verify(
        &self,
        client_id: &ClientId,
        claims: &JwtAuthenticationClaims,
    ) -> Result<(), ClaimsError> {
        self.verify_at(client_id, claims, Utc::now())
    }

    pub fn verify_at(
        &self,
        client_id: &ClientId,
        claims: &JwtAuthenticationClaims,
        now: DateTime<Utc>,
    ) -> Result<(), ClaimsError> {
        let iss = claims.iss.as_deref().ok_or(ClaimsError::MissingIssuer)?;
        let sub = claims.sub.as_deref().ok_or(ClaimsError::MissingSubject)?;
        if iss != sub {
            return Err(ClaimsError::IssuerSubjectMismatch);
        }
        if sub != client_id.as_str() {
            return Err(ClaimsError::ClientIdMismatch(client_id.clone()));
        }

        let aud = match claims.aud.as_slice() {
            [] => return Err(ClaimsError::MissingAudience),
            [aud] => aud,
            _ => return Err(ClaimsError::MultipleAudiences),
        };
        if !self.expected_audience.contains(aud) {
            return Err(ClaimsError::AudienceMismatch(aud.clone()));
        }

        let now = now.timestamp();
        let skew = self.max_clock_skew.num_seconds();
        let exp = claims.exp.ok_or(ClaimsError::MissingExpiration)?;
        if exp.saturating_add(skew) <= now {
            return Err(ClaimsError::Expired);
        }
        if claims
            .nbf
            .is_some_and(|nbf| nbf.saturating_sub(skew) > now)
        {
            return Err(ClaimsError::NotYetValid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TOKEN_ENDPOINT: &str = "https://server.example.com/token";

    fn verifier() -> JwtClaimsVerifier {
        JwtClaimsVerifier::new(
            BTreeSet::from([TOKEN_ENDPOINT.to_owned()]),
            Duration::seconds(60),
        )
    }

    fn claims(now: DateTime<Utc>) -> JwtAuthenticationClaims {
        JwtAuthenticationClaims {
            iss: Some("s6BhdRkqt3".into()),
            sub: Some("s6BhdRkqt3".into()),
            aud: vec![TOKEN_ENDPOINT.into()],
            exp: Some(now.timestamp() + 300),
            ..Default::default()
        }
    }

    fn client_id() -> ClientId {
        ClientId::new("s6BhdRkqt3").unwrap()
    }

    #[test]
    fn accepts_well_formed_claims() {
        let now = Utc::now();
        verifier().verify_at(&client_id(), &claims(now), now).unwrap();
    }

    #[test]
    fn issuer_must_be_subject_and_client() {
        let now = Utc::now();
        let mut c = claims(now);
        c.iss = Some("someone-else".into());
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::IssuerSubjectMismatch)
        );

        assert!(matches!(
            verifier().verify_at(&ClientId::new("other").unwrap(), &claims(now), now),
            Err(ClaimsError::ClientIdMismatch(_))
        ));

        let mut c = claims(now);
        c.sub = None;
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::MissingSubject)
        );
    }

    #[test]
    fn audience_must_be_single_and_expected() {
        let now = Utc::now();
        let mut c = claims(now);
        c.aud.push("https://server.example.com".into());
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::MultipleAudiences)
        );

        c.aud = vec!["https://elsewhere.example.com/token".into()];
        assert!(matches!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::AudienceMismatch(_))
        ));

        c.aud.clear();
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::MissingAudience)
        );
    }

    #[test]
    fn expiration_is_required_and_checked_with_skew() {
        let now = Utc::now();
        let mut c = claims(now);
        c.exp = None;
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::MissingExpiration)
        );

        c.exp = Some(now.timestamp() - 30);
        assert!(verifier().verify_at(&client_id(), &c, now).is_ok());

        c.exp = Some(now.timestamp() - 3600);
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::Expired)
        );
    }

    #[test]
    fn not_before_is_checked_with_skew() {
        let now = Utc::now();
        let mut c = claims(now);
        c.nbf = Some(now.timestamp() + 30);
        assert!(verifier().verify_at(&client_id(), &c, now).is_ok());

        c.nbf = Some(now.timestamp() + 3600);
        assert_eq!(
            verifier().verify_at(&client_id(), &c, now),
            Err(ClaimsError::NotYetValid)
        );
    }

    #[test]
    fn audience_may_be_a_string() {
        let c: JwtAuthenticationClaims = serde_json::from_value(serde_json::json!({
            "iss": "s6BhdRkqt3",
            "sub": "s6BhdRkqt3",
            "aud": TOKEN_ENDPOINT,
            "exp": 1311281970,
            "jti": "id501",
        }))
        .unwrap();
        assert_eq!(c.aud, vec![TOKEN_ENDPOINT.to_owned()]);
        assert_eq!(c.jti.as_deref(), Some("id501"));
    }
}
