use anyhow::{bail, Context, Error, Result};
use url::Url;

use self::parameters::{
    ClientId, Display, IdTokenHint, LoginHint, Nonce, Prompt, RedirectUri, RequestObject,
    RequestUri, ResponseType, Scope, State, OPENID,
};

use super::object::{ParsingErrorContext, UntypedObject};

pub mod parameters;
pub mod resolver;

/// An OpenID Connect authentication request, as received at the authorization endpoint.
///
/// The parameters may be extended or protected by a request object, passed by value in
/// `request` or by reference in `request_uri`, see [resolver].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    response_type: ResponseType,
    scope: Scope,
    client_id: ClientId,
    redirect_uri: RedirectUri,
    state: Option<State>,
    nonce: Option<Nonce>,
    display: Option<Display>,
    prompt: Option<Prompt>,
    id_token_hint: Option<IdTokenHint>,
    login_hint: Option<LoginHint>,
    request: Option<RequestObject>,
    request_uri: Option<RequestUri>,
}

/// A request object, passed by value or by reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestIndirection<'a> {
    ByValue(&'a str),
    ByReference(&'a Url),
}

impl AuthorizationRequest {
    pub fn builder(
        response_type: ResponseType,
        scope: Scope,
        client_id: ClientId,
        redirect_uri: Url,
    ) -> AuthorizationRequestBuilder {
        AuthorizationRequestBuilder {
            request: Self {
                response_type,
                scope,
                client_id,
                redirect_uri: RedirectUri(redirect_uri),
                state: None,
                nonce: None,
                display: None,
                prompt: None,
                id_token_hint: None,
                login_hint: None,
                request: None,
                request_uri: None,
            },
        }
    }

    /// Parse from urlencoded query parameters.
    ///
    /// A request carrying both `request` and `request_uri` is accepted here, so that the
    /// conflict can be reported to the client's redirect URI during resolution.
    /// ```
    /// # use oidc_authz_core::core::authorization_request::AuthorizationRequest;
    /// let query = "response_type=code&scope=openid%20email&client_id=s6BhdRkqt3\
    ///     &redirect_uri=https%3A%2F%2Fclient.example.org%2Fcb&state=af0ifjsldkj";
    ///
    /// let authorization_request = AuthorizationRequest::from_query_params(query).unwrap();
    ///
    /// assert_eq!(authorization_request.client_id().as_str(), "s6BhdRkqt3");
    /// assert_eq!(authorization_request.state().unwrap().0, "af0ifjsldkj");
    /// ```
    pub fn from_query_params(query_params: &str) -> Result<Self> {
        UntypedObject::from_query_params(query_params)?
            .try_into()
            .context("unable to parse Authorization Request from query params")
    }

    /// Encode as [Url], using the `authorization_endpoint` as a base.
    pub fn to_url(&self, mut authorization_endpoint: Url) -> Result<Url> {
        let query = UntypedObject::from(self.clone()).to_query_params()?;
        authorization_endpoint.set_query(Some(&query));
        Ok(authorization_endpoint)
    }

    fn validate(&self) -> Result<()> {
        if !self.scope.contains(OPENID) {
            bail!("scope must contain '{OPENID}'")
        }
        if self.response_type.implies_implicit_flow() && self.nonce.is_none() {
            bail!(
                "nonce is required for response_type '{}'",
                self.response_type
            )
        }
        Ok(())
    }

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
        &self.redirect_uri.0
    }

    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }

    pub fn display(&self) -> Option<Display> {
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

    pub fn request_object(&self) -> Option<&RequestObject> {
        self.request.as_ref()
    }

    pub fn request_uri(&self) -> Option<&Url> {
        self.request_uri.as_ref().map(|uri| &uri.0)
    }

    /// The request object of this request, if any.
    ///
    /// # Errors
    /// Returns an error if both `request` and `request_uri` are present.
    pub fn request_indirection(&self) -> Result<Option<RequestIndirection<'_>>> {
        match (&self.request, &self.request_uri) {
            (Some(_), Some(_)) => bail!("'request' and 'request_uri' are mutually exclusive"),
            (Some(by_value), None) => Ok(Some(RequestIndirection::ByValue(&by_value.0))),
            (None, Some(by_reference)) => Ok(Some(RequestIndirection::ByReference(&by_reference.0))),
            (None, None) => Ok(None),
        }
    }
}

/// Builds an [AuthorizationRequest], checking its invariants.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestBuilder {
    request: AuthorizationRequest,
}

impl AuthorizationRequestBuilder {
    pub fn with_state(mut self, state: State) -> Self {
        self.request.state = Some(state);
        self
    }

    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.request.nonce = Some(nonce);
        self
    }

    pub fn with_display(mut self, display: Display) -> Self {
        self.request.display = Some(display);
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.request.prompt = Some(prompt);
        self
    }

    pub fn with_id_token_hint(mut self, id_token_hint: IdTokenHint) -> Self {
        self.request.id_token_hint = Some(id_token_hint);
        self
    }

    pub fn with_login_hint(mut self, login_hint: LoginHint) -> Self {
        self.request.login_hint = Some(login_hint);
        self
    }

    /// Pass a request object by value in the `request` parameter.
    pub fn with_request_object(mut self, request: RequestObject) -> Self {
        self.request.request = Some(request);
        self
    }

    /// Pass a request object by reference in the `request_uri` parameter.
    pub fn with_request_uri(mut self, request_uri: Url) -> Self {
        self.request.request_uri = Some(RequestUri(request_uri));
        self
    }

    pub fn build(self) -> Result<AuthorizationRequest> {
        let request = self.request;
        request.validate()?;
        request.request_indirection()?;
        Ok(request)
    }
}

impl From<AuthorizationRequest> for UntypedObject {
    fn from(value: AuthorizationRequest) -> Self {
        let mut object = UntypedObject::default();
        let _ = object.insert(value.response_type);
        let _ = object.insert(value.scope);
        let _ = object.insert(value.client_id);
        let _ = object.insert(value.redirect_uri);
        if let Some(state) = value.state {
            let _ = object.insert(state);
        }
        if let Some(nonce) = value.nonce {
            let _ = object.insert(nonce);
        }
        if let Some(display) = value.display {
            let _ = object.insert(display);
        }
        if let Some(prompt) = value.prompt {
            let _ = object.insert(prompt);
        }
        if let Some(id_token_hint) = value.id_token_hint {
            let _ = object.insert(id_token_hint);
        }
        if let Some(login_hint) = value.login_hint {
            let _ = object.insert(login_hint);
        }
        if let Some(request) = value.request {
            let _ = object.insert(request);
        }
        if let Some(request_uri) = value.request_uri {
            let _ = object.insert(request_uri);
        }
        object
    }
}

impl TryFrom<UntypedObject> for AuthorizationRequest {
    type Error = Error;

    fn try_from(value: UntypedObject) -> std::result::Result<Self, Self::Error> {
        let request = Self {
            response_type: value.get().parsing_error()?,
            scope: value.get().parsing_error()?,
            client_id: value.get().parsing_error()?,
            redirect_uri: value.get().parsing_error()?,
            state: value.get_optional()?,
            nonce: value.get_optional()?,
            display: value.get_optional()?,
            prompt: value.get_optional()?,
            id_token_hint: value.get_optional()?,
            login_hint: value.get_optional()?,
            request: value.get_optional()?,
            request_uri: value.get_optional()?,
        };
        request.validate()?;
        Ok(request)
    }
}
