use std::fmt;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::authorization_request::parameters::{ResponseMode, State};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// OAuth 2.0 and OpenID Connect error codes returned by the authorization and token endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    InteractionRequired,
    LoginRequired,
    AccountSelectionRequired,
    ConsentRequired,
    InvalidRequestUri,
    InvalidOpenidRequestObject,
    RequestNotSupported,
    RequestUriNotSupported,
    RegistrationNotSupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::ServerError => "server_error",
            ErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::InteractionRequired => "interaction_required",
            ErrorCode::LoginRequired => "login_required",
            ErrorCode::AccountSelectionRequired => "account_selection_required",
            ErrorCode::ConsentRequired => "consent_required",
            ErrorCode::InvalidRequestUri => "invalid_request_uri",
            ErrorCode::InvalidOpenidRequestObject => "invalid_openid_request_object",
            ErrorCode::RequestNotSupported => "request_not_supported",
            ErrorCode::RequestUriNotSupported => "request_uri_not_supported",
            ErrorCode::RegistrationNotSupported => "registration_not_supported",
        }
    }

    pub fn default_description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::UnauthorizedClient => "Unauthorized client",
            ErrorCode::AccessDenied => "Access denied by resource owner or authorization server",
            ErrorCode::UnsupportedResponseType => "Unsupported response type",
            ErrorCode::InvalidScope => "Invalid, unknown or malformed scope",
            ErrorCode::ServerError => "Unexpected server error",
            ErrorCode::TemporarilyUnavailable => "The authorization server is temporarily unavailable",
            ErrorCode::InvalidClient => "Client authentication failed",
            ErrorCode::InvalidGrant => "Invalid grant",
            ErrorCode::UnsupportedGrantType => "Unsupported grant type",
            ErrorCode::InteractionRequired => "User interaction required",
            ErrorCode::LoginRequired => "Login required",
            ErrorCode::AccountSelectionRequired => "Session selection required",
            ErrorCode::ConsentRequired => "Consent required",
            ErrorCode::InvalidRequestUri => "Invalid request URI",
            ErrorCode::InvalidOpenidRequestObject => "Invalid OpenID request object",
            ErrorCode::RequestNotSupported => "Request parameter not supported",
            ErrorCode::RequestUriNotSupported => "Request URI parameter not supported",
            ErrorCode::RegistrationNotSupported => "Registration parameter not supported",
        }
    }

    /// The status used when the error cannot be delivered by redirection.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidClient => StatusCode::UNAUTHORIZED,
            ErrorCode::AccessDenied => StatusCode::FORBIDDEN,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An error as reported to the client, in the body of a response or in redirect parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    #[serde(rename = "error")]
    pub code: ErrorCode,
    #[serde(rename = "error_description")]
    pub description: String,
    #[serde(skip)]
    pub http_status: StatusCode,
}

impl ErrorObject {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            description: code.default_description().to_owned(),
            http_status: code.http_status(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_http_status(mut self, http_status: StatusCode) -> Self {
        self.http_status = http_status;
        self
    }
}

impl From<ErrorCode> for ErrorObject {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// Why an authorization request could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveFailure {
    #[error("'request' and 'request_uri' are mutually exclusive")]
    ConflictingRequestObject,
    #[error("unable to retrieve request object from '{uri}'")]
    Retrieval {
        uri: Url,
        #[source]
        source: BoxError,
    },
    #[error("unable to decode request object")]
    Decode(#[source] BoxError),
    #[error("request object payload is not a JSON object")]
    NotAnObject,
    #[error("request object parameter '{parameter}' is invalid")]
    InvalidParameter {
        parameter: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("request object parameter '{parameter}' does not match the authorization request")]
    Mismatch { parameter: &'static str },
}

impl ResolveFailure {
    pub fn retrieval(uri: Url, source: anyhow::Error) -> Self {
        ResolveFailure::Retrieval {
            uri,
            source: source.into(),
        }
    }

    pub fn decode(source: anyhow::Error) -> Self {
        ResolveFailure::Decode(source.into())
    }

    pub fn invalid_parameter(parameter: &'static str, source: anyhow::Error) -> Self {
        ResolveFailure::InvalidParameter {
            parameter,
            source: source.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveFailure::ConflictingRequestObject | ResolveFailure::Mismatch { .. } => {
                ErrorCode::InvalidRequest
            }
            ResolveFailure::Retrieval { .. } => ErrorCode::InvalidRequestUri,
            ResolveFailure::Decode(_)
            | ResolveFailure::NotAnObject
            | ResolveFailure::InvalidParameter { .. } => ErrorCode::InvalidOpenidRequestObject,
        }
    }
}

/// A failed authorization request resolution.
///
/// Carries the redirect URI and state known at the time of failure, so the error can be returned
/// to the client by redirection.
#[derive(Debug, Error)]
#[error("{}: {failure}", .failure.code())]
pub struct ResolveError {
    #[source]
    failure: ResolveFailure,
    redirect_uri: Option<Url>,
    state: Option<State>,
    response_mode: ResponseMode,
}

impl ResolveError {
    pub fn new(
        failure: ResolveFailure,
        redirect_uri: Option<Url>,
        state: Option<State>,
        response_mode: ResponseMode,
    ) -> Self {
        Self {
            failure,
            redirect_uri,
            state,
            response_mode,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.failure.code()
    }

    pub fn failure(&self) -> &ResolveFailure {
        &self.failure
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    pub fn error_object(&self) -> ErrorObject {
        ErrorObject::new(self.code()).with_description(self.failure.to_string())
    }

    /// 302 when the error can be delivered to the redirect URI, the error code's status otherwise.
    pub fn http_status(&self) -> StatusCode {
        if self.redirect_uri.is_some() {
            StatusCode::FOUND
        } else {
            self.code().http_status()
        }
    }

    /// The redirect URI with `error`, `error_description` and `state` appended in the query or
    /// fragment, per the response mode of the request.
    pub fn redirect_url(&self) -> Option<Url> {
        let mut url = self.redirect_uri.clone()?;
        let error = self.error_object();
        let mut params = vec![
            ("error", error.code.as_str().to_owned()),
            ("error_description", error.description),
        ];
        if let Some(state) = &self.state {
            params.push(("state", state.0.clone()));
        }
        match self.response_mode {
            ResponseMode::Query => {
                url.query_pairs_mut().extend_pairs(params);
            }
            ResponseMode::Fragment => {
                let fragment = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish();
                url.set_fragment(Some(&fragment));
            }
        }
        Some(url)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn error(response_mode: ResponseMode) -> ResolveError {
        ResolveError::new(
            ResolveFailure::Mismatch { parameter: "scope" },
            Some("https://client.example.org/cb?x=1".parse().unwrap()),
            Some(State("af0ifjsldkj".into())),
            response_mode,
        )
    }

    #[test]
    fn redirect_in_query() {
        let err = error(ResponseMode::Query);
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.http_status(), StatusCode::FOUND);
        let url = err.redirect_url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("x".into(), "1".into()));
        assert_eq!(pairs[1], ("error".into(), "invalid_request".into()));
        assert_eq!(pairs[3], ("state".into(), "af0ifjsldkj".into()));
        assert!(url.fragment().is_none());
    }

    #[test]
    fn redirect_in_fragment() {
        let url = error(ResponseMode::Fragment).redirect_url().unwrap();
        assert_eq!(url.query(), Some("x=1"));
        assert!(url.fragment().unwrap().starts_with("error=invalid_request&"));
    }

    #[test]
    fn no_redirect_uri_means_plain_status() {
        let err = ResolveError::new(
            ResolveFailure::NotAnObject,
            None,
            None,
            ResponseMode::Query,
        );
        assert!(err.redirect_url().is_none());
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code().as_str(), "invalid_openid_request_object");
    }

    #[test]
    fn error_object_serializes_with_protocol_names() {
        let value = serde_json::to_value(ErrorObject::new(ErrorCode::InvalidClient)).unwrap();
        assert_eq!(value["error"], "invalid_client");
        assert_eq!(value["error_description"], "Client authentication failed");
        assert!(value.get("http_status").is_none());
    }
}
