use std::collections::BTreeSet;

use chrono::Duration;
use jsonwebtoken::DecodingKey;
use thiserror::Error;
use tracing::debug;

use super::{
    claims::JwtClaimsVerifier, store::ClientCredentialsSelector, ClientAuthentication,
    ClientAuthenticationMethod, JwtAssertion, Secret,
};
use crate::core::jose::{decoding_key, is_hmac, verify_signature};

/// A fault in the cryptographic library, as opposed to a credential that does not verify.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("unable to construct a verification key")]
    InvalidKey(#[source] anyhow::Error),
    #[error("unable to verify signature")]
    Signature(#[source] anyhow::Error),
}

/// Verifies client authentication against the credentials of a [ClientCredentialsSelector].
///
/// Holds no per-call state, so one verifier can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct ClientAuthenticationVerifier<S> {
    store: S,
    max_clock_skew: Duration,
}

impl<S: ClientCredentialsSelector> ClientAuthenticationVerifier<S> {
    pub fn new(store: S, max_clock_skew: Duration) -> Self {
        Self {
            store,
            max_clock_skew,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `authentication` proves the identity of the client it claims.
    ///
    /// A JWT assertion must be addressed to one of `expected_audience`, typically the token
    /// endpoint and optionally the issuer. Its claims are checked before any credentials are
    /// selected.
    ///
    /// Unknown clients, wrong secrets, bad signatures and malformed claims all give `false`.
    pub async fn verify(
        &self,
        authentication: &ClientAuthentication,
        expected_audience: &BTreeSet<String>,
        context: &S::Context,
    ) -> Result<bool, VerificationError> {
        let client_id = authentication.client_id();
        let method = authentication.method();

        match authentication {
            ClientAuthentication::ClientSecretBasic { secret, .. }
            | ClientAuthentication::ClientSecretPost { secret, .. } => {
                let candidates = self.store.select_secrets(client_id, method, context).await;
                Ok(matches_any_secret(secret, &candidates, method))
            }
            ClientAuthentication::ClientSecretJwt(assertion) => {
                if !self.claims_are_valid(assertion, expected_audience, method) {
                    return Ok(false);
                }
                if !is_hmac(assertion.algorithm()) {
                    debug!(%method, alg = ?assertion.algorithm(), "assertion is not HMAC signed");
                    return Ok(false);
                }
                let candidates = self.store.select_secrets(client_id, method, context).await;
                for secret in live_secrets(&candidates) {
                    let key = DecodingKey::from_secret(secret.as_bytes());
                    if verify_assertion(assertion, &key)? {
                        return Ok(true);
                    }
                }
                debug!(%method, candidates = candidates.len(), "no secret verifies the assertion");
                Ok(false)
            }
            ClientAuthentication::PrivateKeyJwt(assertion) => {
                if !self.claims_are_valid(assertion, expected_audience, method) {
                    return Ok(false);
                }
                if is_hmac(assertion.algorithm()) {
                    debug!(%method, alg = ?assertion.algorithm(), "assertion is not signed with a private key");
                    return Ok(false);
                }
                let candidates = self
                    .store
                    .select_public_keys(client_id, method, assertion.header(), context)
                    .await;
                for jwk in &candidates {
                    let Some(key) = decoding_key(jwk, assertion.algorithm())
                        .map_err(VerificationError::InvalidKey)?
                    else {
                        continue;
                    };
                    if verify_assertion(assertion, &key)? {
                        return Ok(true);
                    }
                }
                debug!(%method, candidates = candidates.len(), "no key verifies the assertion");
                Ok(false)
            }
        }
    }

    fn claims_are_valid(
        &self,
        assertion: &JwtAssertion,
        expected_audience: &BTreeSet<String>,
        method: ClientAuthenticationMethod,
    ) -> bool {
        let verifier = JwtClaimsVerifier::new(expected_audience.clone(), self.max_clock_skew);
        match verifier.verify(assertion.client_id(), assertion.claims()) {
            Ok(()) => true,
            Err(e) => {
                debug!(%method, "rejecting client assertion: {e}");
                false
            }
        }
    }
}

fn live_secrets(candidates: &[Secret]) -> impl Iterator<Item = &Secret> {
    candidates.iter().filter(|secret| {
        let expired = secret.has_expired();
        if expired {
            debug!(expiration = ?secret.expiration(), "skipping expired secret");
        }
        !expired
    })
}

fn matches_any_secret(
    presented: &Secret,
    candidates: &[Secret],
    method: ClientAuthenticationMethod,
) -> bool {
    // Compare against every candidate so the time taken does not depend on which one matches.
    let matched = live_secrets(candidates).fold(false, |matched, candidate| {
        (candidate == presented) | matched
    });
    if !matched {
        debug!(%method, candidates = candidates.len(), "no secret matches");
    }
    matched
}

fn verify_assertion(assertion: &JwtAssertion, key: &DecodingKey) -> Result<bool, VerificationError> {
    verify_signature(
        assertion.signing_input(),
        assertion.signature(),
        key,
        assertion.algorithm(),
    )
    .map_err(VerificationError::Signature)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::core::{
        authorization_request::parameters::ClientId,
        client_auth::store::{MemoryCredentialStore, RegisteredClient},
    };

    fn verifier(secrets: Vec<Secret>) -> ClientAuthenticationVerifier<MemoryCredentialStore> {
        let mut client = RegisteredClient::new(
            ClientId::new("s6BhdRkqt3").unwrap(),
            ClientAuthenticationMethod::ClientSecretPost,
        );
        client.secrets = secrets;
        ClientAuthenticationVerifier::new(
            MemoryCredentialStore::new([client]),
            Duration::seconds(60),
        )
    }

    fn post(secret: &str) -> ClientAuthentication {
        ClientAuthentication::ClientSecretPost {
            client_id: ClientId::new("s6BhdRkqt3").unwrap(),
            secret: Secret::new(secret),
        }
    }

    #[tokio::test]
    async fn expired_secrets_do_not_match() {
        let expired = Secret::new("old").with_expiration(Utc::now() - Duration::hours(1));
        let verifier = verifier(vec![expired, Secret::new("new")]);
        let audience = BTreeSet::new();
        assert!(!verifier.verify(&post("old"), &audience, &()).await.unwrap());
        assert!(verifier.verify(&post("new"), &audience, &()).await.unwrap());
    }

    #[tokio::test]
    async fn method_must_match_registration() {
        let verifier = verifier(vec![Secret::new("s")]);
        let basic = ClientAuthentication::ClientSecretBasic {
            client_id: ClientId::new("s6BhdRkqt3").unwrap(),
            secret: Secret::new("s"),
        };
        assert!(!verifier.verify(&basic, &BTreeSet::new(), &()).await.unwrap());
    }
}
