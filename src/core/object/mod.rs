use anyhow::{bail, Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// An untyped (JSON) Object from which [TypedParameters](TypedParameter) can be parsed.
///
/// Represents both the top-level parameters of an authorization request and the decoded
/// payload of a request object.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A strongly typed parameter that can represent request parameters or request object members.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + Into<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    /// Parse from urlencoded query parameters.
    ///
    /// Every value is kept as a JSON string, parameters carrying JSON (such as `claims`) are
    /// parsed when the corresponding [TypedParameter] is read.
    ///
    /// # Errors
    /// Returns an error if a parameter appears more than once (RFC 6749, section 3.1).
    pub fn from_query_params(query_params: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query_params)
            .context("unable to parse query params")?;
        let mut object = Map::new();
        for (key, value) in pairs {
            if object.contains_key(&key) {
                bail!("parameter '{key}' appears more than once")
            }
            object.insert(key, Json::String(value));
        }
        Ok(Self(object))
    }

    /// Encode as urlencoded query parameters. Non-string values are serialized as JSON text.
    pub fn to_query_params(&self) -> Result<String> {
        let pairs: Vec<(&str, String)> = self
            .0
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Json::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.as_str(), value)
            })
            .collect();
        serde_urlencoded::to_string(pairs).context("unable to encode query params")
    }

    /// Get a [TypedParameter] from the Object.
    ///
    /// Note that this method clones the underlying data.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        Some(self.0.get(T::KEY)?.clone().try_into())
    }

    /// Get a [TypedParameter] that may be absent, failing only if it is present but malformed.
    pub fn get_optional<T: TypedParameter>(&self) -> Result<Option<T>> {
        self.get::<T>()
            .transpose()
            .context(format!("'{}' could not be parsed", T::KEY))
    }

    /// Get an untyped member of the Object.
    pub fn get_raw(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    /// Insert a [TypedParameter].
    ///
    /// Returns the existing [TypedParameter] if one already exists.
    ///
    /// # Errors
    /// Returns an error if there was already an entry in the Object, but it could not be parsed from JSON.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Option<Result<T>> {
        Some(self.0.insert(T::KEY.to_owned(), t.into())?.try_into())
    }
}

impl TryFrom<Json> for UntypedObject {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            other => Err(Error::msg(format!(
                "expected a JSON object, found '{}'",
                json_kind(&other)
            ))),
        }
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' is missing", T::KEY))?
            .context(format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' could not be parsed", T::KEY))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::core::authorization_request::parameters::{LoginHint, Nonce, State};

    #[test]
    fn query_params_are_strings() {
        let object = UntypedObject::from_query_params("nonce=n-0S6&state=af0ifjsldkj").unwrap();
        assert_eq!(object.get::<Nonce>().unwrap().unwrap().0, "n-0S6");
        assert_eq!(object.get::<State>().unwrap().unwrap().0, "af0ifjsldkj");
        assert!(object.get::<LoginHint>().is_none());
    }

    #[test]
    fn repeated_query_params_are_rejected() {
        let result = UntypedObject::from_query_params(
            "redirect_uri=https%3A%2F%2Fgood.example%2Fcb\
             &redirect_uri=https%3A%2F%2Fevil.example%2Fcb",
        );
        assert!(result.is_err());
    }

    #[test]
    fn malformed_optional_parameter_is_an_error() {
        let object: UntypedObject = json!({ "nonce": 12 }).try_into().unwrap();
        assert!(object.get_optional::<Nonce>().is_err());
        assert!(object.get_optional::<State>().unwrap().is_none());
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(UntypedObject::try_from(json!(["a"])).is_err());
    }
}
