use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use jsonwebtoken::{jwk::Jwk, Header};

use super::{ClientAuthenticationMethod, Secret};
use crate::core::authorization_request::parameters::ClientId;

/// Source of the credentials registered for a client.
///
/// An empty result means the client is unknown, or not registered for the requested method, and
/// fails authentication. Several results model credential rotation: authentication succeeds
/// if any of them matches.
#[async_trait]
pub trait ClientCredentialsSelector: Debug + Send + Sync {
    /// Caller-provided context forwarded to every lookup, such as a tenant or a database handle.
    type Context: Send + Sync + ?Sized;

    /// Shared secrets for `client_secret_basic`, `client_secret_post` and `client_secret_jwt`.
    async fn select_secrets(
        &self,
        client_id: &ClientId,
        method: ClientAuthenticationMethod,
        context: &Self::Context,
    ) -> Vec<Secret>;

    /// Public keys for `private_key_jwt`. The JWS header of the assertion is passed so that
    /// candidates can be narrowed by `kid` or `alg`.
    async fn select_public_keys(
        &self,
        client_id: &ClientId,
        method: ClientAuthenticationMethod,
        header: &Header,
        context: &Self::Context,
    ) -> Vec<Jwk>;
}

/// A client registration held by a [MemoryCredentialStore].
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client_id: ClientId,
    pub method: ClientAuthenticationMethod,
    pub secrets: Vec<Secret>,
    pub keys: Vec<Jwk>,
}

impl RegisteredClient {
    pub fn new(client_id: ClientId, method: ClientAuthenticationMethod) -> Self {
        Self {
            client_id,
            method,
            secrets: vec![],
            keys: vec![],
        }
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn with_key(mut self, key: Jwk) -> Self {
        self.keys.push(key);
        self
    }
}

/// A local in-memory credential store.
///
/// Registrations are fixed at construction, so the store can be shared between concurrent
/// verifications without locking.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    clients: BTreeMap<String, RegisteredClient>,
}

impl MemoryCredentialStore {
    pub fn new(clients: impl IntoIterator<Item = RegisteredClient>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|client| (client.client_id.0.clone(), client))
                .collect(),
        }
    }

    fn registration(
        &self,
        client_id: &ClientId,
        method: ClientAuthenticationMethod,
    ) -> Option<&RegisteredClient> {
        self.clients
            .get(client_id.as_str())
            .filter(|client| client.method == method)
    }
}

#[async_trait]
impl ClientCredentialsSelector for MemoryCredentialStore {
    type Context = ();

    async fn select_secrets(
        &self,
        client_id: &ClientId,
        method: ClientAuthenticationMethod,
        _context: &(),
    ) -> Vec<Secret> {
        self.registration(client_id, method)
            .map(|client| client.secrets.clone())
            .unwrap_or_default()
    }

    async fn select_public_keys(
        &self,
        client_id: &ClientId,
        method: ClientAuthenticationMethod,
        header: &Header,
        _context: &(),
    ) -> Vec<Jwk> {
        let Some(client) = self.registration(client_id, method) else {
            return vec![];
        };
        client
            .keys
            .iter()
            .filter(|key| match (&header.kid, &key.common.key_id) {
                (Some(kid), Some(key_id)) => kid == key_id,
                _ => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    use super::*;

    fn ec_key(kid: &str) -> Jwk {
        serde_json::from_value(json!({
            "kty": "EC",
            "crv": "P-256",
            "kid": kid,
            "x": "TLPzWYyg_uMInoCfSKr6LBjgBvsuQE-o0rvYrmmNKbc",
            "y": "Wo2tue0mVGw3P7Hm-gocvmoS0mj6BHQ3OgVQjLjnnao",
        }))
        .unwrap()
    }

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new([
            RegisteredClient::new(
                ClientId::new("basic-client").unwrap(),
                ClientAuthenticationMethod::ClientSecretBasic,
            )
            .with_secret(Secret::new("old"))
            .with_secret(Secret::new("new")),
            RegisteredClient::new(
                ClientId::new("jwt-client").unwrap(),
                ClientAuthenticationMethod::PrivateKeyJwt,
            )
            .with_key(ec_key("k1"))
            .with_key(ec_key("k2")),
        ])
    }

    #[tokio::test]
    async fn secrets_are_selected_by_client_and_method() {
        let store = store();
        let client_id = ClientId::new("basic-client").unwrap();
        let secrets = store
            .select_secrets(&client_id, ClientAuthenticationMethod::ClientSecretBasic, &())
            .await;
        assert_eq!(secrets, vec![Secret::new("old"), Secret::new("new")]);

        assert!(store
            .select_secrets(&client_id, ClientAuthenticationMethod::ClientSecretPost, &())
            .await
            .is_empty());
        assert!(store
            .select_secrets(
                &ClientId::new("unknown").unwrap(),
                ClientAuthenticationMethod::ClientSecretBasic,
                &()
            )
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn keys_are_narrowed_by_key_id() {
        let store = store();
        let client_id = ClientId::new("jwt-client").unwrap();

        let mut header = Header::new(Algorithm::ES256);
        let keys = store
            .select_public_keys(&client_id, ClientAuthenticationMethod::PrivateKeyJwt, &header, &())
            .await;
        assert_eq!(keys.len(), 2);

        header.kid = Some("k2".into());
        let keys = store
            .select_public_keys(&client_id, ClientAuthenticationMethod::PrivateKeyJwt, &header, &())
            .await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].common.key_id.as_deref(), Some("k2"));
    }
}
