use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::core::object::{TypedParameter, UntypedObject};
use anyhow::{bail, Context, Error};
use serde_json::Value as Json;
use url::Url;

const CODE: &str = "code";
const TOKEN: &str = "token";
const ID_TOKEN: &str = "id_token";
const NONE: &str = "none";

const PAGE: &str = "page";
const POPUP: &str = "popup";
const TOUCH: &str = "touch";
const WAP: &str = "wap";

const LOGIN: &str = "login";
const CONSENT: &str = "consent";
const SELECT_ACCOUNT: &str = "select_account";

pub const OPENID: &str = "openid";

/// Reads a JSON string, as found in query parameters and request objects.
fn json_string(value: Json) -> Result<String, Error> {
    match value {
        Json::String(s) => Ok(s),
        other => bail!("expected a string, found '{other}'"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            bail!("client identifier must not be empty")
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TypedParameter for ClientId {
    const KEY: &'static str = "client_id";
}

impl TryFrom<Json> for ClientId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Self::new(json_string(value)?)
    }
}

impl From<ClientId> for Json {
    fn from(value: ClientId) -> Self {
        Json::String(value.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `redirect_uri` field in the Authorization Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUri(pub Url);

impl TypedParameter for RedirectUri {
    const KEY: &'static str = "redirect_uri";
}

impl From<RedirectUri> for Json {
    fn from(value: RedirectUri) -> Self {
        value.0.to_string().into()
    }
}

impl TryFrom<Json> for RedirectUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(RedirectUri)?)
    }
}

/// A single `response_type` value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResponseTypeValue {
    Code,
    IdToken,
    Token,
    None,
    /// An extension value that is not understood by this library.
    Unsupported(String),
}

impl From<&str> for ResponseTypeValue {
    fn from(s: &str) -> Self {
        match s {
            CODE => ResponseTypeValue::Code,
            ID_TOKEN => ResponseTypeValue::IdToken,
            TOKEN => ResponseTypeValue::Token,
            NONE => ResponseTypeValue::None,
            _ => ResponseTypeValue::Unsupported(s.to_owned()),
        }
    }
}

impl fmt::Display for ResponseTypeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseTypeValue::Code => CODE,
            ResponseTypeValue::IdToken => ID_TOKEN,
            ResponseTypeValue::Token => TOKEN,
            ResponseTypeValue::None => NONE,
            ResponseTypeValue::Unsupported(u) => u,
        })
    }
}

/// `response_type` field in the Authorization Request: an unordered, non-empty set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseType(BTreeSet<ResponseTypeValue>);

/// How authorization response parameters are returned to the redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseType {
    pub fn new(values: impl IntoIterator<Item = ResponseTypeValue>) -> Result<Self, Error> {
        let values: BTreeSet<_> = values.into_iter().collect();
        if values.is_empty() {
            bail!("response type must not be empty")
        }
        if values.contains(&ResponseTypeValue::None) && values.len() > 1 {
            bail!("response type 'none' cannot be combined with other values")
        }
        Ok(Self(values))
    }

    pub fn code() -> Self {
        Self(BTreeSet::from([ResponseTypeValue::Code]))
    }

    pub fn contains(&self, value: &ResponseTypeValue) -> bool {
        self.0.contains(value)
    }

    pub fn values(&self) -> impl Iterator<Item = &ResponseTypeValue> {
        self.0.iter()
    }

    /// Whether every value of `other` is also requested here.
    pub fn is_superset(&self, other: &ResponseType) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Tokens are returned from the authorization endpoint without a code.
    pub fn implies_implicit_flow(&self) -> bool {
        self.contains(&ResponseTypeValue::Token)
            || (self.contains(&ResponseTypeValue::IdToken)
                && !self.contains(&ResponseTypeValue::Code))
    }

    /// An ID token will be issued, either directly or from the token endpoint.
    pub fn implies_id_token(&self) -> bool {
        self.contains(&ResponseTypeValue::Code) || self.contains(&ResponseTypeValue::IdToken)
    }

    /// An access token usable at the UserInfo endpoint will be issued.
    pub fn implies_userinfo(&self) -> bool {
        self.contains(&ResponseTypeValue::Code) || self.contains(&ResponseTypeValue::Token)
    }

    /// The default response mode: fragment whenever a token is returned from the authorization
    /// endpoint, query otherwise.
    pub fn default_response_mode(&self) -> ResponseMode {
        if self.contains(&ResponseTypeValue::Token) || self.contains(&ResponseTypeValue::IdToken) {
            ResponseMode::Fragment
        } else {
            ResponseMode::Query
        }
    }
}

impl FromStr for ResponseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split_whitespace().map(ResponseTypeValue::from))
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&values.join(" "))
    }
}

impl TypedParameter for ResponseType {
    const KEY: &'static str = "response_type";
}

impl TryFrom<Json> for ResponseType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        json_string(value)?.parse()
    }
}

impl From<ResponseType> for Json {
    fn from(value: ResponseType) -> Self {
        Json::String(value.to_string())
    }
}

/// `scope` field in the Authorization Request: scope tokens in the order they were first given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn new<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Self {
        let mut scope = Self(Vec::new());
        for token in tokens {
            scope.push(token);
        }
        scope
    }

    pub fn push(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !token.is_empty() && !self.contains(&token) {
            self.0.push(token)
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every token of `other` is also present here.
    pub fn is_superset(&self, other: &Scope) -> bool {
        other.tokens().all(|token| self.contains(token))
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split_whitespace()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl TypedParameter for Scope {
    const KEY: &'static str = "scope";
}

impl TryFrom<Json> for Scope {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        json_string(value)?.parse()
    }
}

impl From<Scope> for Json {
    fn from(value: Scope) -> Self {
        Json::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(pub String);

impl TypedParameter for Nonce {
    const KEY: &'static str = "nonce";
}

impl TryFrom<Json> for Nonce {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(json_string(value)?))
    }
}

impl From<Nonce> for Json {
    fn from(value: Nonce) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State(pub String);

impl TypedParameter for State {
    const KEY: &'static str = "state";
}

impl TryFrom<Json> for State {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(json_string(value)?))
    }
}

impl From<State> for Json {
    fn from(value: State) -> Self {
        Json::String(value.0)
    }
}

/// How the authorization server displays authentication and consent pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    #[default]
    Page,
    Popup,
    Touch,
    Wap,
}

impl FromStr for Display {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            PAGE => Display::Page,
            POPUP => Display::Popup,
            TOUCH => Display::Touch,
            WAP => Display::Wap,
            _ => bail!("unknown display value '{s}'"),
        })
    }
}

impl fmt::Display for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Display::Page => PAGE,
            Display::Popup => POPUP,
            Display::Touch => TOUCH,
            Display::Wap => WAP,
        })
    }
}

impl TypedParameter for Display {
    const KEY: &'static str = "display";
}

impl TryFrom<Json> for Display {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        json_string(value)?.parse()
    }
}

impl From<Display> for Json {
    fn from(value: Display) -> Self {
        Json::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromptValue {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl FromStr for PromptValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            NONE => PromptValue::None,
            LOGIN => PromptValue::Login,
            CONSENT => PromptValue::Consent,
            SELECT_ACCOUNT => PromptValue::SelectAccount,
            _ => bail!("unknown prompt value '{s}'"),
        })
    }
}

impl fmt::Display for PromptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptValue::None => NONE,
            PromptValue::Login => LOGIN,
            PromptValue::Consent => CONSENT,
            PromptValue::SelectAccount => SELECT_ACCOUNT,
        })
    }
}

/// `prompt` field in the Authorization Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(BTreeSet<PromptValue>);

impl Prompt {
    pub fn new(values: impl IntoIterator<Item = PromptValue>) -> Result<Self, Error> {
        let values: BTreeSet<_> = values.into_iter().collect();
        if values.is_empty() {
            bail!("prompt must not be empty")
        }
        if values.contains(&PromptValue::None) && values.len() > 1 {
            bail!("prompt 'none' cannot be combined with other values")
        }
        Ok(Self(values))
    }

    pub fn contains(&self, value: &PromptValue) -> bool {
        self.0.contains(value)
    }
}

impl FromStr for Prompt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(
            s.split_whitespace()
                .map(PromptValue::from_str)
                .collect::<Result<Vec<_>, _>>()?,
        )
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&values.join(" "))
    }
}

impl TypedParameter for Prompt {
    const KEY: &'static str = "prompt";
}

impl TryFrom<Json> for Prompt {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        json_string(value)?.parse()
    }
}

impl From<Prompt> for Json {
    fn from(value: Prompt) -> Self {
        Json::String(value.to_string())
    }
}

/// A previously issued ID token, passed as a hint about the end-user's current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTokenHint(pub String);

impl TypedParameter for IdTokenHint {
    const KEY: &'static str = "id_token_hint";
}

impl TryFrom<Json> for IdTokenHint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(json_string(value)?))
    }
}

impl From<IdTokenHint> for Json {
    fn from(value: IdTokenHint) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginHint(pub String);

impl TypedParameter for LoginHint {
    const KEY: &'static str = "login_hint";
}

impl TryFrom<Json> for LoginHint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(json_string(value)?))
    }
}

impl From<LoginHint> for Json {
    fn from(value: LoginHint) -> Self {
        Json::String(value.0)
    }
}

/// `request` field: a request object passed by value, in JOSE compact serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestObject(pub String);

impl TypedParameter for RequestObject {
    const KEY: &'static str = "request";
}

impl TryFrom<Json> for RequestObject {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(json_string(value)?))
    }
}

impl From<RequestObject> for Json {
    fn from(value: RequestObject) -> Self {
        Json::String(value.0)
    }
}

/// `request_uri` field: a request object passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUri(pub Url);

impl TypedParameter for RequestUri {
    const KEY: &'static str = "request_uri";
}

impl TryFrom<Json> for RequestUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(Self)?)
    }
}

impl From<RequestUri> for Json {
    fn from(value: RequestUri) -> Self {
        value.0.to_string().into()
    }
}

/// `claims` field: individual claims requested for the ID token and the UserInfo response.
///
/// Carried as a JSON object in request objects and as JSON text in query parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Claims(pub UntypedObject);

impl Claims {
    /// The `id_token` member, if present.
    pub fn id_token(&self) -> Option<&Json> {
        self.0.get_raw("id_token")
    }

    /// The `userinfo` member, if present.
    pub fn userinfo(&self) -> Option<&Json> {
        self.0.get_raw("userinfo")
    }
}

impl TypedParameter for Claims {
    const KEY: &'static str = "claims";
}

impl TryFrom<Json> for Claims {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let value = match value {
            Json::String(s) => {
                serde_json::from_str(&s).context("'claims' was not valid JSON text")?
            }
            other => other,
        };
        UntypedObject::try_from(value).map(Self)
    }
}

impl From<Claims> for Json {
    fn from(value: Claims) -> Self {
        value.0.into()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_type_is_a_set() {
        let a: ResponseType = "id_token code".parse().unwrap();
        let b: ResponseType = "code id_token".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "code id_token");
        assert!(a.is_superset(&ResponseType::code()));
        assert!(!ResponseType::code().is_superset(&a));
    }

    #[test]
    fn response_type_flows() {
        let implicit: ResponseType = "id_token".parse().unwrap();
        assert!(implicit.implies_implicit_flow());
        assert!(implicit.implies_id_token());
        assert!(!implicit.implies_userinfo());
        assert_eq!(implicit.default_response_mode(), ResponseMode::Fragment);

        let token: ResponseType = "id_token token".parse().unwrap();
        assert!(token.implies_implicit_flow());
        assert!(token.implies_userinfo());

        let code = ResponseType::code();
        assert!(!code.implies_implicit_flow());
        assert!(code.implies_id_token());
        assert!(code.implies_userinfo());
        assert_eq!(code.default_response_mode(), ResponseMode::Query);

        let hybrid: ResponseType = "code id_token".parse().unwrap();
        assert!(!hybrid.implies_implicit_flow());
    }

    #[test]
    fn response_type_rejects_empty_and_mixed_none() {
        assert!("".parse::<ResponseType>().is_err());
        assert!("none code".parse::<ResponseType>().is_err());
        assert!("none".parse::<ResponseType>().is_ok());
    }

    #[test]
    fn scope_keeps_first_occurrence_order() {
        let scope: Scope = "openid email openid profile".parse().unwrap();
        assert_eq!(scope.to_string(), "openid email profile");
        assert!(scope.is_superset(&"profile openid".parse().unwrap()));
        assert!(!scope.is_superset(&"openid phone".parse().unwrap()));
    }

    #[test]
    fn prompt_none_must_stand_alone() {
        assert!("none login".parse::<Prompt>().is_err());
        let prompt: Prompt = "consent login".parse().unwrap();
        assert!(prompt.contains(&PromptValue::Login));
        assert_eq!(prompt, "login consent".parse::<Prompt>().unwrap());
    }

    #[test]
    fn display_rejects_unknown_values() {
        assert!(Display::try_from(json!("tv")).is_err());
        assert_eq!(Display::try_from(json!("popup")).unwrap(), Display::Popup);
        assert_eq!(Display::default(), Display::Page);
    }

    #[test]
    fn claims_from_query_text() {
        let claims = Claims::try_from(json!(r#"{"userinfo":{"email":null}}"#)).unwrap();
        assert_eq!(claims.userinfo(), Some(&json!({ "email": null })));
        assert!(claims.id_token().is_none());
        assert!(Claims::try_from(json!("not json")).is_err());
    }

    #[test]
    fn client_id_must_not_be_empty() {
        assert!(ClientId::try_from(json!("")).is_err());
        assert!(ClientId::try_from(json!(7)).is_err());
    }
}
