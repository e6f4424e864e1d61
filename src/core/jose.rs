//! JOSE objects and the ports used to obtain and decode request objects.
//!
//! Signing, encryption and key management stay outside of this crate: a [JoseRetriever] turns a
//! `request_uri` into a [JoseObject], and a [JoseDecoder] turns a [JoseObject] into its verified
//! JSON payload. [HttpRetriever] and [JwsDecoder] are provided as default implementations.

use std::str::FromStr;

use anyhow::{bail, Context, Error, Result};
use async_trait::async_trait;
use base64::prelude::*;
use jsonwebtoken::{
    jwk::{AlgorithmParameters, Jwk},
    Algorithm, DecodingKey,
};
use serde_json::{Map, Value as Json};
use tracing::debug;
use url::Url;

use super::util::{request_object_request, AsyncHttpClient};

const ALG_NONE: &str = "none";

/// How a [JoseObject] is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoseKind {
    /// A JWT with `"alg": "none"` and an empty signature.
    Unsecured,
    /// A JWS in compact serialization.
    Signed,
    /// A JWE in compact serialization.
    Encrypted,
}

/// A JOSE object in compact serialization, with its protected header parsed.
#[derive(Debug, Clone)]
pub struct JoseObject {
    serialized: String,
    header: Map<String, Json>,
    kind: JoseKind,
}

impl JoseObject {
    pub fn parse(serialized: &str) -> Result<Self> {
        let serialized = serialized.trim();
        let segments: Vec<&str> = serialized.split('.').collect();

        let header_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(segments[0])
            .context("JOSE header was not valid base64url")?;
        let header = serde_json::from_slice::<Map<String, Json>>(&header_bytes)
            .context("JOSE header was not a JSON object")?;

        let Some(Json::String(alg)) = header.get("alg") else {
            bail!("'alg' was missing from JOSE header")
        };

        let kind = match segments.len() {
            3 if alg == ALG_NONE => {
                if !segments[2].is_empty() {
                    bail!("unsecured JWT must have an empty signature")
                }
                JoseKind::Unsecured
            }
            3 => {
                BASE64_URL_SAFE_NO_PAD
                    .decode(segments[2])
                    .context("JWS signature was not valid base64url")?;
                JoseKind::Signed
            }
            5 => JoseKind::Encrypted,
            n => bail!("expected 3 or 5 segments in JOSE compact serialization, found {n}"),
        };

        Ok(Self {
            serialized: serialized.to_owned(),
            header,
            kind,
        })
    }

    pub fn kind(&self) -> JoseKind {
        self.kind
    }

    pub fn header(&self) -> &Map<String, Json> {
        &self.header
    }

    /// The `alg` header parameter.
    pub fn algorithm(&self) -> &str {
        match self.header.get("alg") {
            Some(Json::String(alg)) => alg,
            _ => ALG_NONE,
        }
    }

    /// The `kid` header parameter, if present.
    pub fn key_id(&self) -> Option<&str> {
        match self.header.get("kid") {
            Some(Json::String(kid)) => Some(kid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// The JWS signing input, `<header>.<payload>`.
    ///
    /// Only meaningful for [JoseKind::Unsecured] and [JoseKind::Signed] objects.
    pub fn signing_input(&self) -> &str {
        match self.serialized.rfind('.') {
            Some(i) => &self.serialized[..i],
            None => &self.serialized,
        }
    }

    /// The base64url encoded JWS signature.
    pub fn signature(&self) -> &str {
        match self.serialized.rfind('.') {
            Some(i) => &self.serialized[i + 1..],
            None => "",
        }
    }

    /// The decoded JWS payload.
    pub fn payload(&self) -> Result<Vec<u8>> {
        if self.kind == JoseKind::Encrypted {
            bail!("the payload of an encrypted JOSE object cannot be read without decryption")
        }
        let payload = self.serialized.split('.').nth(1).unwrap_or_default();
        BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .context("JWS payload was not valid base64url")
    }
}

impl FromStr for JoseObject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Retrieves request objects passed by reference.
#[async_trait]
pub trait JoseRetriever: Send + Sync {
    /// Download the JOSE object at `uri`.
    ///
    /// Retries, caching and network restrictions are the responsibility of the implementation.
    async fn download(&self, uri: &Url) -> Result<JoseObject>;
}

/// Verifies and/or decrypts JOSE objects.
#[async_trait]
pub trait JoseDecoder: Send + Sync {
    /// Return the JSON payload of `object` once its signature has been verified, or once it has
    /// been decrypted.
    async fn decode(&self, object: &JoseObject) -> Result<Json>;
}

/// A [JoseRetriever] fetching request objects with an [AsyncHttpClient].
#[derive(Debug, Clone)]
pub struct HttpRetriever<H> {
    http_client: H,
}

impl<H> HttpRetriever<H> {
    pub fn new(http_client: H) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl<H: AsyncHttpClient + Send + Sync> JoseRetriever for HttpRetriever<H> {
    async fn download(&self, uri: &Url) -> Result<JoseObject> {
        let request = request_object_request(uri.as_str())?;

        let response = self
            .http_client
            .execute(request)
            .await
            .context(format!("failed to make request object request at {uri}"))?;

        let status = response.status();
        let Ok(body) = String::from_utf8(response.into_body()) else {
            bail!("failed to parse request object response as UTF-8 from {uri} (status: {status})")
        };

        if !status.is_success() {
            bail!("request object request was unsuccessful (status: {status}): {body}")
        }

        JoseObject::parse(&body).context(format!("invalid request object at {uri}"))
    }
}

/// A [JoseDecoder] verifying signed request objects against a fixed set of keys.
///
/// Encrypted objects are rejected, unsecured objects only pass when explicitly allowed.
#[derive(Debug, Clone)]
pub struct JwsDecoder {
    keys: Vec<Jwk>,
    algorithms: Vec<Algorithm>,
    accept_unsecured: bool,
}

impl JwsDecoder {
    pub fn new(keys: Vec<Jwk>, algorithms: Vec<Algorithm>) -> Self {
        Self {
            keys,
            algorithms,
            accept_unsecured: false,
        }
    }

    /// Also accept request objects with `"alg": "none"`.
    pub fn accept_unsecured(mut self) -> Self {
        self.accept_unsecured = true;
        self
    }
}

#[async_trait]
impl JoseDecoder for JwsDecoder {
    async fn decode(&self, object: &JoseObject) -> Result<Json> {
        match object.kind() {
            JoseKind::Encrypted => bail!("encrypted request objects are not supported"),
            JoseKind::Unsecured if !self.accept_unsecured => {
                bail!("unsecured request objects are not accepted")
            }
            JoseKind::Unsecured => {}
            JoseKind::Signed => {
                let alg = Algorithm::from_str(object.algorithm())
                    .context(format!("unknown JWS algorithm '{}'", object.algorithm()))?;
                if !self.algorithms.contains(&alg) {
                    bail!("request object was signed with unsupported algorithm: {alg:?}")
                }

                let mut verified = false;
                for key in self.keys.iter().filter(|key| {
                    match (object.key_id(), key.common.key_id.as_deref()) {
                        (Some(kid), Some(key_kid)) => kid == key_kid,
                        _ => true,
                    }
                }) {
                    let Some(key) = decoding_key(key, alg)? else {
                        continue;
                    };
                    if verify_signature(object.signing_input(), object.signature(), &key, alg)? {
                        verified = true;
                        break;
                    }
                }
                if !verified {
                    bail!("request object signature could not be verified")
                }
            }
        }

        let payload: Json = serde_json::from_slice(&object.payload()?)
            .context("request object payload was not valid JSON")?;
        if !payload.is_object() {
            bail!("request object payload was not a JSON object")
        }
        Ok(payload)
    }
}

/// Whether `alg` is an HMAC algorithm, keyed with a shared secret.
pub(crate) fn is_hmac(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Build a [DecodingKey] for `alg` from a JWK.
///
/// Returns `None` when the key type cannot be used with `alg`.
pub(crate) fn decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<Option<DecodingKey>> {
    let compatible = match (&jwk.algorithm, alg) {
        (AlgorithmParameters::EllipticCurve(_), Algorithm::ES256 | Algorithm::ES384) => true,
        (
            AlgorithmParameters::RSA(_),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => true,
        (AlgorithmParameters::OctetKeyPair(_), Algorithm::EdDSA) => true,
        (AlgorithmParameters::OctetKey(_), alg) => is_hmac(alg),
        _ => false,
    };
    if !compatible {
        debug!(key_id = ?jwk.common.key_id, ?alg, "key type cannot verify this algorithm");
        return Ok(None);
    }
    DecodingKey::from_jwk(jwk)
        .map(Some)
        .context("unable to construct verification key from JWK")
}

/// Verify a JWS signature over `signing_input`.
pub(crate) fn verify_signature(
    signing_input: &str,
    signature: &str,
    key: &DecodingKey,
    alg: Algorithm,
) -> Result<bool> {
    jsonwebtoken::crypto::verify(signature, signing_input.as_bytes(), key, alg)
        .context("signature verification failed unexpectedly")
}

#[cfg(test)]
mod test {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    fn unsecured(payload: &Json) -> String {
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = BASE64_URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.")
    }

    fn oct_jwk(secret: &[u8]) -> Jwk {
        serde_json::from_value(json!({
            "kty": "oct",
            "k": BASE64_URL_SAFE_NO_PAD.encode(secret),
        }))
        .unwrap()
    }

    #[test]
    fn classifies_compact_serializations() {
        let object = JoseObject::parse(&unsecured(&json!({ "a": 1 }))).unwrap();
        assert_eq!(object.kind(), JoseKind::Unsecured);
        assert_eq!(object.payload().unwrap(), br#"{"a":1}"#);

        let jwe = format!(
            "{}.key.iv.ciphertext.tag",
            BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA-OAEP","enc":"A256GCM"}"#)
        );
        let object = JoseObject::parse(&jwe).unwrap();
        assert_eq!(object.kind(), JoseKind::Encrypted);
        assert!(object.payload().is_err());

        assert!(JoseObject::parse("abc.def").is_err());
        assert!(JoseObject::parse("!!.e30.").is_err());
    }

    #[tokio::test]
    async fn unsecured_objects_need_opt_in() {
        let object = JoseObject::parse(&unsecured(&json!({ "nonce": "n" }))).unwrap();
        assert!(JwsDecoder::new(vec![], vec![]).decode(&object).await.is_err());
        let payload = JwsDecoder::new(vec![], vec![])
            .accept_unsecured()
            .decode(&object)
            .await
            .unwrap();
        assert_eq!(payload, json!({ "nonce": "n" }));
    }

    #[tokio::test]
    async fn verifies_signed_objects() {
        let secret = b"a-request-object-signing-secret!!";
        let jws = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &json!({ "state": "xyz" }),
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        let object = JoseObject::parse(&jws).unwrap();
        assert_eq!(object.kind(), JoseKind::Signed);

        let decoder = JwsDecoder::new(vec![oct_jwk(b"wrong-secret"), oct_jwk(secret)], vec![Algorithm::HS256]);
        assert_eq!(decoder.decode(&object).await.unwrap(), json!({ "state": "xyz" }));

        let decoder = JwsDecoder::new(vec![oct_jwk(secret)], vec![Algorithm::RS256]);
        assert!(decoder.decode(&object).await.is_err());

        let decoder = JwsDecoder::new(vec![oct_jwk(b"wrong-secret")], vec![Algorithm::HS256]);
        assert!(decoder.decode(&object).await.is_err());
    }

    struct StaticClient {
        status: u16,
        body: String,
    }

    #[async_trait]
    impl AsyncHttpClient for StaticClient {
        async fn execute(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<Vec<u8>>> {
            assert_eq!(request.uri(), "https://client.example.org/request.jwt");
            Ok(http::Response::builder()
                .status(self.status)
                .body(self.body.clone().into_bytes())?)
        }
    }

    #[tokio::test]
    async fn downloads_request_objects() {
        let uri: Url = "https://client.example.org/request.jwt".parse().unwrap();
        let serialized = unsecured(&json!({ "scope": "openid" }));

        let retriever = HttpRetriever::new(StaticClient {
            status: 200,
            body: format!("{serialized}\n"),
        });
        let object = retriever.download(&uri).await.unwrap();
        assert_eq!(object.as_str(), serialized);

        let retriever = HttpRetriever::new(StaticClient {
            status: 404,
            body: "not found".into(),
        });
        assert!(retriever.download(&uri).await.is_err());

        let retriever = HttpRetriever::new(StaticClient {
            status: 200,
            body: "<html></html>".into(),
        });
        assert!(retriever.download(&uri).await.is_err());
    }
}
