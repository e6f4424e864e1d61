//! Reconciles an authorization request with its request object.
//!
//! Parameters of the request object take part in the final request only when they are
//! consistent with the top-level request: a request object can fill in optional parameters that
//! the top-level request omits, but it can neither redirect elsewhere nor widen the requested
//! response types or scope.

use tracing::debug;
use url::Url;

use crate::core::{
    claims::{ClaimsRequest, IdTokenClaimsRequest, UserInfoClaimsRequest},
    error::{ResolveError, ResolveFailure},
    jose::{JoseDecoder, JoseObject, JoseRetriever},
    object::{TypedParameter, UntypedObject},
};

use super::{
    parameters::{
        Claims, ClientId, Display, IdTokenHint, LoginHint, Nonce, Prompt, RedirectUri,
        ResponseMode, ResponseType, Scope, State,
    },
    AuthorizationRequest, RequestIndirection,
};

/// The final parameters of an authorization request, once its request object has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAuthorizationRequest {
    response_type: ResponseType,
    scope: Scope,
    client_id: ClientId,
    redirect_uri: Url,
    state: Option<State>,
    nonce: Option<Nonce>,
    display: Display,
    prompt: Option<Prompt>,
    id_token_hint: Option<IdTokenHint>,
    login_hint: Option<LoginHint>,
    id_token_claims: Option<IdTokenClaimsRequest>,
    userinfo_claims: Option<UserInfoClaimsRequest>,
}

impl ResolvedAuthorizationRequest {
    pub fn response_type(&self) -> &ResponseType {
        &self.response_type
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }

    pub fn display(&self) -> Display {
        self.display
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn id_token_hint(&self) -> Option<&IdTokenHint> {
        self.id_token_hint.as_ref()
    }

    pub fn login_hint(&self) -> Option<&LoginHint> {
        self.login_hint.as_ref()
    }

    /// Claims requested for the ID token, `None` if no ID token will be issued.
    pub fn id_token_claims(&self) -> Option<&IdTokenClaimsRequest> {
        self.id_token_claims.as_ref()
    }

    /// Claims requested from the UserInfo endpoint, `None` if no access token will be issued.
    pub fn userinfo_claims(&self) -> Option<&UserInfoClaimsRequest> {
        self.userinfo_claims.as_ref()
    }
}

/// Resolves [AuthorizationRequests](AuthorizationRequest), fetching and decoding their request
/// objects with the provided ports.
///
/// Holds no per-request state: one resolver can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestResolver<R, D> {
    retriever: R,
    decoder: D,
}

/// The redirect URI and state to report failures to, updated as parameters are resolved.
struct ErrorContext {
    redirect_uri: Url,
    state: Option<State>,
    response_mode: ResponseMode,
}

impl ErrorContext {
    fn error(&self, failure: ResolveFailure) -> ResolveError {
        ResolveError::new(
            failure,
            Some(self.redirect_uri.clone()),
            self.state.clone(),
            self.response_mode,
        )
    }
}

impl<R: JoseRetriever, D: JoseDecoder> AuthorizationRequestResolver<R, D> {
    pub fn new(retriever: R, decoder: D) -> Self {
        Self { retriever, decoder }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub async fn resolve(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ResolvedAuthorizationRequest, ResolveError> {
        let mut context = ErrorContext {
            redirect_uri: request.redirect_uri().clone(),
            state: request.state().cloned(),
            response_mode: request.response_type().default_response_mode(),
        };

        let indirection = request
            .request_indirection()
            .map_err(|_| context.error(ResolveFailure::ConflictingRequestObject))?;

        let request_object = match indirection {
            Some(indirection) => self
                .fetch_and_decode(indirection)
                .await
                .map_err(|failure| context.error(failure))?,
            None => UntypedObject::default(),
        };

        reconcile(request, &request_object, &mut context).map_err(|failure| {
            debug!(client_id = %request.client_id(), %failure, "unable to resolve authorization request");
            context.error(failure)
        })
    }

    async fn fetch_and_decode(
        &self,
        indirection: RequestIndirection<'_>,
    ) -> Result<UntypedObject, ResolveFailure> {
        let object = match indirection {
            RequestIndirection::ByValue(serialized) => {
                JoseObject::parse(serialized).map_err(ResolveFailure::decode)?
            }
            RequestIndirection::ByReference(uri) => {
                debug!(%uri, "retrieving request object");
                self.retriever
                    .download(uri)
                    .await
                    .map_err(|e| ResolveFailure::retrieval(uri.clone(), e))?
            }
        };

        let payload = self
            .decoder
            .decode(&object)
            .await
            .map_err(ResolveFailure::decode)?;

        UntypedObject::try_from(payload).map_err(|_| ResolveFailure::NotAnObject)
    }
}

/// Resolve one parameter.
///
/// The top-level value is kept when the request object omits the parameter, the request object's
/// value is adopted when the top-level request omits it, and otherwise both must be `consistent`.
fn resolve_parameter<T: TypedParameter>(
    top_level: Option<&T>,
    request_object: &UntypedObject,
    consistent: impl Fn(&T, &T) -> bool,
) -> Result<Option<T>, ResolveFailure> {
    let from_object = request_object
        .get::<T>()
        .transpose()
        .map_err(|e| ResolveFailure::invalid_parameter(T::KEY, e))?;

    match (top_level, from_object) {
        (top_level, None) => Ok(top_level.cloned()),
        (None, Some(from_object)) => Ok(Some(from_object)),
        (Some(top_level), Some(from_object)) if consistent(top_level, &from_object) => {
            Ok(Some(top_level.clone()))
        }
        (Some(_), Some(_)) => Err(ResolveFailure::Mismatch { parameter: T::KEY }),
    }
}

/// Resolve a parameter that the top-level request always carries.
fn resolve_required<T: TypedParameter>(
    top_level: &T,
    request_object: &UntypedObject,
    consistent: impl Fn(&T, &T) -> bool,
) -> Result<T, ResolveFailure> {
    Ok(resolve_parameter(Some(top_level), request_object, consistent)?
        .unwrap_or_else(|| top_level.clone()))
}

fn reconcile(
    request: &AuthorizationRequest,
    request_object: &UntypedObject,
    context: &mut ErrorContext,
) -> Result<ResolvedAuthorizationRequest, ResolveFailure> {
    let client_id = resolve_required(request.client_id(), request_object, PartialEq::eq)?;

    let redirect_uri = resolve_required(
        &RedirectUri(request.redirect_uri().clone()),
        request_object,
        PartialEq::eq,
    )?
    .0;
    context.redirect_uri = redirect_uri.clone();

    let state = resolve_parameter(request.state(), request_object, PartialEq::eq)?;
    context.state = state.clone();

    let response_type = resolve_required(
        request.response_type(),
        request_object,
        ResponseType::is_superset,
    )?;
    context.response_mode = response_type.default_response_mode();

    let scope = resolve_required(request.scope(), request_object, Scope::is_superset)?;
    let nonce = resolve_parameter(request.nonce(), request_object, PartialEq::eq)?;
    let display = resolve_parameter(request.display().as_ref(), request_object, PartialEq::eq)?
        .unwrap_or_default();
    let prompt = resolve_parameter(request.prompt(), request_object, PartialEq::eq)?;
    let id_token_hint = resolve_parameter(request.id_token_hint(), request_object, PartialEq::eq)?;
    let login_hint = resolve_parameter(request.login_hint(), request_object, PartialEq::eq)?;

    let claims = request_object
        .get::<Claims>()
        .transpose()
        .map_err(|e| ResolveFailure::invalid_parameter(Claims::KEY, e))?
        .unwrap_or_default();

    let id_token_claims = if response_type.implies_id_token() {
        let requested = claims
            .id_token()
            .map(ClaimsRequest::from_json)
            .transpose()
            .map_err(|e| ResolveFailure::invalid_parameter(Claims::KEY, e))?
            .unwrap_or_default();
        Some(IdTokenClaimsRequest(requested))
    } else {
        None
    };

    let userinfo_claims = if response_type.implies_userinfo() {
        let mut requested = ClaimsRequest::from_scope(&scope);
        if let Some(userinfo) = claims.userinfo() {
            requested.merge(
                ClaimsRequest::from_json(userinfo)
                    .map_err(|e| ResolveFailure::invalid_parameter(Claims::KEY, e))?,
            );
        }
        Some(UserInfoClaimsRequest(requested))
    } else {
        None
    };

    Ok(ResolvedAuthorizationRequest {
        response_type,
        scope,
        client_id,
        redirect_uri,
        state,
        nonce,
        display,
        prompt,
        id_token_hint,
        login_hint,
        id_token_claims,
        userinfo_claims,
    })
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::core::error::ErrorCode;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::builder(
            ResponseType::code(),
            "openid profile email".parse().unwrap(),
            ClientId::new("s6BhdRkqt3").unwrap(),
            "https://client.example.org/cb".parse().unwrap(),
        )
        .with_state(State("af0ifjsldkj".into()))
        .build()
        .unwrap()
    }

    fn object(value: serde_json::Value) -> UntypedObject {
        value.try_into().unwrap()
    }

    fn context() -> ErrorContext {
        ErrorContext {
            redirect_uri: "https://client.example.org/cb".parse().unwrap(),
            state: None,
            response_mode: ResponseMode::Query,
        }
    }

    #[test]
    fn empty_request_object_keeps_top_level_parameters() {
        let request = request();
        let resolved = reconcile(&request, &UntypedObject::default(), &mut context()).unwrap();
        assert_eq!(resolved.client_id(), request.client_id());
        assert_eq!(resolved.scope(), request.scope());
        assert_eq!(resolved.state(), request.state());
        assert_eq!(resolved.display(), Display::Page);
        assert!(resolved.nonce().is_none());
    }

    #[test]
    fn request_object_fills_in_missing_parameters() {
        let resolved = reconcile(
            &request(),
            &object(json!({
                "nonce": "n-0S6_WzA2Mj",
                "display": "touch",
                "login_hint": "janedoe@example.com",
                "state": "af0ifjsldkj",
            })),
            &mut context(),
        )
        .unwrap();
        assert_eq!(resolved.nonce().unwrap().0, "n-0S6_WzA2Mj");
        assert_eq!(resolved.display(), Display::Touch);
        assert_eq!(resolved.login_hint().unwrap().0, "janedoe@example.com");
    }

    #[test]
    fn conflicting_values_are_rejected() {
        for (member, value) in [
            ("client_id", json!("other")),
            ("redirect_uri", json!("https://attacker.example.com/cb")),
            ("state", json!("other")),
            ("response_type", json!("code token")),
            ("scope", json!("openid phone")),
        ] {
            let mut members = serde_json::Map::new();
            members.insert(member.to_owned(), value);
            let failure = reconcile(&request(), &UntypedObject(members), &mut context()).unwrap_err();
            assert!(
                matches!(&failure, ResolveFailure::Mismatch { parameter } if *parameter == member),
                "{member}: {failure:?}"
            );
            assert_eq!(failure.code(), ErrorCode::InvalidRequest);
        }
    }

    #[test]
    fn malformed_request_object_parameter() {
        let failure = reconcile(
            &request(),
            &object(json!({ "display": "tv" })),
            &mut context(),
        )
        .unwrap_err();
        assert!(matches!(
            &failure,
            ResolveFailure::InvalidParameter { parameter: "display", .. }
        ));
        assert_eq!(failure.code(), ErrorCode::InvalidOpenidRequestObject);
    }

    #[test]
    fn resolved_redirect_uri_and_state_are_reported() {
        let request = AuthorizationRequest::builder(
            ResponseType::code(),
            "openid".parse().unwrap(),
            ClientId::new("s6BhdRkqt3").unwrap(),
            "https://client.example.org/cb".parse().unwrap(),
        )
        .build()
        .unwrap();
        let mut context = context();
        reconcile(
            &request,
            &object(json!({ "state": "from-object", "scope": "openid email" })),
            &mut context,
        )
        .unwrap_err();
        assert_eq!(context.state, Some(State("from-object".into())));
    }
}
