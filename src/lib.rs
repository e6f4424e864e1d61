//! This library provides the request-processing core of an [OpenID Connect 1.0] authorization
//! server: verifying who a client is at the token endpoint, and resolving authorization
//! requests protected by a [request object].
//!
//! [OpenID Connect 1.0]: <https://openid.net/specs/openid-connect-core-1_0.html>
//! [request object]: <https://openid.net/specs/openid-connect-core-1_0.html#JWTRequests>
//!
//! # Client Authentication
//!
//! Token endpoint handlers read the client authentication from the request with
//! [`ClientAuthentication::parse`], and check it with a [`ClientAuthenticationVerifier`]:
//!
//! ```ignore
//! use oidc_authz_core::config::ServerConfig;
//! use oidc_authz_core::core::client_auth::{
//!     verifier::ClientAuthenticationVerifier, ClientAuthentication,
//! };
//!
//! let verifier = ClientAuthenticationVerifier::new(store, config.max_clock_skew());
//!
//! let authentication = ClientAuthentication::parse(authorization_header, &form_params)
//!     .map_err(|e| e.error_object())?;
//!
//! if !verifier
//!     .verify(&authentication, &config.expected_audience(), &())
//!     .await?
//! {
//!     let (error, challenge) = authentication.method().invalid_client_error();
//!     return Err(unauthorized(error, challenge));
//! }
//! ```
//!
//! Credentials are supplied by a [`ClientCredentialsSelector`]. Several candidates may be
//! returned for one client to rotate secrets and keys without downtime.
//!
//! [`ClientAuthentication::parse`]: crate::core::client_auth::ClientAuthentication::parse
//! [`ClientAuthenticationVerifier`]: crate::core::client_auth::verifier::ClientAuthenticationVerifier
//! [`ClientCredentialsSelector`]: crate::core::client_auth::store::ClientCredentialsSelector
//!
//! # Authorization Requests
//!
//! Authorization endpoint handlers parse the request and resolve it with an
//! [`AuthorizationRequestResolver`], which fetches and decodes the request object if there is
//! one, and checks that it agrees with the plain request parameters:
//!
//! ```ignore
//! use oidc_authz_core::core::authorization_request::{
//!     resolver::AuthorizationRequestResolver, AuthorizationRequest,
//! };
//! use oidc_authz_core::core::jose::{HttpRetriever, JwsDecoder};
//! use oidc_authz_core::core::util::ReqwestClient;
//!
//! let resolver = AuthorizationRequestResolver::new(
//!     HttpRetriever::new(ReqwestClient::new()?),
//!     JwsDecoder::new(client_keys, vec![Algorithm::ES256]),
//! );
//!
//! let request = AuthorizationRequest::from_query_params(query)?;
//! match resolver.resolve(&request).await {
//!     Ok(resolved) => start_login(resolved),
//!     Err(e) => match e.redirect_url() {
//!         Some(url) => redirect(url),
//!         None => bad_request(e.error_object()),
//!     },
//! }
//! ```
//!
//! The resolved request carries the claims requested for the ID token and the UserInfo
//! response, derived from the scope and from the `claims` member of the request object.
//!
//! [`AuthorizationRequestResolver`]: crate::core::authorization_request::resolver::AuthorizationRequestResolver

pub mod config;
pub mod core;
pub mod utils;
