//! Client authentication at the token endpoint.
//!
//! A client presents one of four [ClientAuthentication] methods. The
//! [ClientAuthenticationVerifier](verifier::ClientAuthenticationVerifier) checks the presented
//! credential against the candidates returned by a
//! [ClientCredentialsSelector](store::ClientCredentialsSelector).

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::{bail, Context, Error, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use http::StatusCode;
use jsonwebtoken::{Algorithm, Header};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::{
    authorization_request::parameters::ClientId,
    error::{ErrorCode, ErrorObject},
    jose::{is_hmac, JoseKind, JoseObject},
};

use self::claims::JwtAuthenticationClaims;

pub mod claims;
pub mod store;
pub mod verifier;

pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const CLIENT_SECRET_BASIC: &str = "client_secret_basic";
const CLIENT_SECRET_POST: &str = "client_secret_post";
const CLIENT_SECRET_JWT: &str = "client_secret_jwt";
const PRIVATE_KEY_JWT: &str = "private_key_jwt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientAuthenticationMethod {
    ClientSecretBasic,
    ClientSecretPost,
    ClientSecretJwt,
    PrivateKeyJwt,
}

impl ClientAuthenticationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthenticationMethod::ClientSecretBasic => CLIENT_SECRET_BASIC,
            ClientAuthenticationMethod::ClientSecretPost => CLIENT_SECRET_POST,
            ClientAuthenticationMethod::ClientSecretJwt => CLIENT_SECRET_JWT,
            ClientAuthenticationMethod::PrivateKeyJwt => PRIVATE_KEY_JWT,
        }
    }

    /// The `invalid_client` error to return when authentication with this method fails, and
    /// the `WWW-Authenticate` challenge to send with it, if any.
    pub fn invalid_client_error(&self) -> (ErrorObject, Option<&'static str>) {
        let error = ErrorObject::new(ErrorCode::InvalidClient).with_http_status(StatusCode::UNAUTHORIZED);
        match self {
            ClientAuthenticationMethod::ClientSecretBasic => (error, Some("Basic")),
            _ => (error, None),
        }
    }
}

impl FromStr for ClientAuthenticationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            CLIENT_SECRET_BASIC => ClientAuthenticationMethod::ClientSecretBasic,
            CLIENT_SECRET_POST => ClientAuthenticationMethod::ClientSecretPost,
            CLIENT_SECRET_JWT => ClientAuthenticationMethod::ClientSecretJwt,
            PRIVATE_KEY_JWT => ClientAuthenticationMethod::PrivateKeyJwt,
            _ => bail!("unknown client authentication method '{s}'"),
        })
    }
}

impl fmt::Display for ClientAuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared secret, optionally expiring.
///
/// Comparison runs in constant time with respect to the secret values.
#[derive(Clone)]
pub struct Secret {
    value: String,
    expiration: Option<DateTime<Utc>>,
}

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Utc::now())
    }

    /// The secret value, for use as an HMAC key.
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        // Digests have a fixed length, so the comparison leaks nothing about the value lengths.
        let this = Sha256::digest(self.value.as_bytes());
        let other = Sha256::digest(other.value.as_bytes());
        this.ct_eq(&other).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A JWT client assertion (RFC 7523), signed by the client it identifies.
#[derive(Debug, Clone)]
pub struct JwtAssertion {
    object: JoseObject,
    header: Header,
    claims: JwtAuthenticationClaims,
    client_id: ClientId,
}

impl JwtAssertion {
    pub fn parse(serialized: &str) -> Result<Self> {
        let object = JoseObject::parse(serialized).context("client assertion is not a JWS")?;
        if object.kind() != JoseKind::Signed {
            bail!("client assertion must be signed")
        }
        let header: Header = serde_json::from_value(Json::Object(object.header().clone()))
            .context("client assertion header could not be parsed")?;
        let claims: JwtAuthenticationClaims = serde_json::from_slice(&object.payload()?)
            .context("client assertion claims could not be parsed")?;
        let client_id = claims
            .sub
            .clone()
            .context("client assertion has no 'sub' claim")
            .and_then(ClientId::new)?;
        Ok(Self {
            object,
            header,
            claims,
            client_id,
        })
    }

    /// The client identifier the assertion claims, taken from its subject.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    pub fn claims(&self) -> &JwtAuthenticationClaims {
        &self.claims
    }

    pub fn signing_input(&self) -> &str {
        self.object.signing_input()
    }

    pub fn signature(&self) -> &str {
        self.object.signature()
    }

    pub fn as_str(&self) -> &str {
        self.object.as_str()
    }
}

/// Why client authentication could not be read from a token request.
#[derive(Debug, Error)]
pub enum ClientAuthenticationError {
    #[error("no client authentication found")]
    Missing,
    #[error("more than one client authentication method was used")]
    MultipleMethods,
    #[error("malformed HTTP Basic authorization header")]
    MalformedBasic,
    #[error("missing '{0}' parameter")]
    MissingParameter(&'static str),
    #[error("unsupported client assertion type '{0}'")]
    UnsupportedAssertionType(String),
    #[error("malformed client assertion")]
    MalformedAssertion(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("'client_id' does not match the client assertion subject")]
    ClientIdMismatch,
}

impl ClientAuthenticationError {
    /// Always `invalid_client`, as the reason must not be disclosed to the requester. `Basic`
    /// credentials get a 401 with a challenge, anything else a 400.
    pub fn error_object(&self) -> ErrorObject {
        let status = match self {
            ClientAuthenticationError::MalformedBasic => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        ErrorObject::new(ErrorCode::InvalidClient).with_http_status(status)
    }
}

/// Client authentication as presented in a token request.
#[derive(Debug, Clone)]
pub enum ClientAuthentication {
    ClientSecretBasic { client_id: ClientId, secret: Secret },
    ClientSecretPost { client_id: ClientId, secret: Secret },
    ClientSecretJwt(JwtAssertion),
    PrivateKeyJwt(JwtAssertion),
}

impl ClientAuthentication {
    /// `client_secret_jwt` authentication, requiring an HMAC-signed assertion.
    pub fn client_secret_jwt(assertion: JwtAssertion) -> Result<Self> {
        if !is_hmac(assertion.algorithm()) {
            bail!(
                "client_secret_jwt requires an HMAC algorithm, found {:?}",
                assertion.algorithm()
            )
        }
        Ok(Self::ClientSecretJwt(assertion))
    }

    /// `private_key_jwt` authentication, requiring an asymmetrically signed assertion.
    pub fn private_key_jwt(assertion: JwtAssertion) -> Result<Self> {
        if is_hmac(assertion.algorithm()) {
            bail!(
                "private_key_jwt requires an asymmetric algorithm, found {:?}",
                assertion.algorithm()
            )
        }
        Ok(Self::PrivateKeyJwt(assertion))
    }

    pub fn method(&self) -> ClientAuthenticationMethod {
        match self {
            ClientAuthentication::ClientSecretBasic { .. } => {
                ClientAuthenticationMethod::ClientSecretBasic
            }
            ClientAuthentication::ClientSecretPost { .. } => {
                ClientAuthenticationMethod::ClientSecretPost
            }
            ClientAuthentication::ClientSecretJwt(_) => ClientAuthenticationMethod::ClientSecretJwt,
            ClientAuthentication::PrivateKeyJwt(_) => ClientAuthenticationMethod::PrivateKeyJwt,
        }
    }

    /// The client identifier being claimed.
    pub fn client_id(&self) -> &ClientId {
        match self {
            ClientAuthentication::ClientSecretBasic { client_id, .. }
            | ClientAuthentication::ClientSecretPost { client_id, .. } => client_id,
            ClientAuthentication::ClientSecretJwt(assertion)
            | ClientAuthentication::PrivateKeyJwt(assertion) => assertion.client_id(),
        }
    }

    /// Read client authentication from a token request: its `Authorization` header value and
    /// its form parameters.
    pub fn parse(
        authorization: Option<&str>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ClientAuthenticationError> {
        let basic = authorization
            .map(|header| {
                header
                    .strip_prefix("Basic ")
                    .ok_or(ClientAuthenticationError::MalformedBasic)
            })
            .transpose()?;
        let has_secret = params.contains_key("client_secret");
        let has_assertion =
            params.contains_key("client_assertion") || params.contains_key("client_assertion_type");

        match (basic, has_secret, has_assertion) {
            (None, false, false) => Err(ClientAuthenticationError::Missing),
            (Some(credentials), false, false) => parse_basic(credentials.trim()),
            (None, true, false) => {
                let client_id = params
                    .get("client_id")
                    .ok_or(ClientAuthenticationError::MissingParameter("client_id"))?;
                Ok(Self::ClientSecretPost {
                    client_id: ClientId::new(client_id.as_str())
                        .map_err(|_| ClientAuthenticationError::MissingParameter("client_id"))?,
                    secret: Secret::new(
                        params
                            .get("client_secret")
                            .map(String::as_str)
                            .unwrap_or_default(),
                    ),
                })
            }
            (None, false, true) => parse_assertion(params),
            _ => Err(ClientAuthenticationError::MultipleMethods),
        }
    }
}

fn parse_basic(credentials: &str) -> Result<ClientAuthentication, ClientAuthenticationError> {
    let decoded = BASE64_STANDARD
        .decode(credentials)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(ClientAuthenticationError::MalformedBasic)?;
    let (client_id, secret) = decoded
        .split_once(':')
        .ok_or(ClientAuthenticationError::MalformedBasic)?;
    let client_id = form_urldecode(client_id)?;
    let secret = form_urldecode(secret)?;
    Ok(ClientAuthentication::ClientSecretBasic {
        client_id: ClientId::new(client_id).map_err(|_| ClientAuthenticationError::MalformedBasic)?,
        secret: Secret::new(secret),
    })
}

/// Basic credentials are form-urlencoded before being base64 encoded (RFC 6749, section 2.3.1).
fn form_urldecode(value: &str) -> Result<String, ClientAuthenticationError> {
    urlencoding::decode(&value.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ClientAuthenticationError::MalformedBasic)
}

fn parse_assertion(
    params: &HashMap<String, String>,
) -> Result<ClientAuthentication, ClientAuthenticationError> {
    let assertion_type = params
        .get("client_assertion_type")
        .ok_or(ClientAuthenticationError::MissingParameter("client_assertion_type"))?;
    if assertion_type != JWT_BEARER_ASSERTION_TYPE {
        return Err(ClientAuthenticationError::UnsupportedAssertionType(
            assertion_type.clone(),
        ));
    }
    let assertion = params
        .get("client_assertion")
        .ok_or(ClientAuthenticationError::MissingParameter("client_assertion"))?;
    let assertion = JwtAssertion::parse(assertion)
        .map_err(|e| ClientAuthenticationError::MalformedAssertion(e.into()))?;

    if let Some(client_id) = params.get("client_id") {
        if client_id != assertion.client_id().as_str() {
            return Err(ClientAuthenticationError::ClientIdMismatch);
        }
    }

    if is_hmac(assertion.algorithm()) {
        Ok(ClientAuthentication::ClientSecretJwt(assertion))
    } else {
        Ok(ClientAuthentication::PrivateKeyJwt(assertion))
    }
}
