//! Claims requested for the ID token and the UserInfo response.
//!
//! A claims request starts from the standard scope values of the authorization request and can
//! be refined by the `claims` member of a request object.

use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value as Json};

use super::authorization_request::parameters::{Scope, OPENID};

const PROFILE_CLAIMS: &[&str] = &[
    "name",
    "family_name",
    "given_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "profile",
    "picture",
    "website",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "updated_at",
];
const EMAIL_CLAIMS: &[&str] = &["email", "email_verified"];
const ADDRESS_CLAIMS: &[&str] = &["address"];
const PHONE_CLAIMS: &[&str] = &["phone_number", "phone_number_verified"];

/// Whether a requested claim is needed for the authorization to make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimRequirement {
    Essential,
    #[default]
    Voluntary,
}

/// How a single claim is requested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimsRequestEntry {
    pub requirement: ClaimRequirement,
    /// A specific value the claim is requested to have.
    pub value: Option<Json>,
    /// A set of values, one of which the claim is requested to have.
    pub values: Option<Vec<Json>>,
    /// Members other than `essential`, `value` and `values`.
    pub additional: Map<String, Json>,
}

impl ClaimsRequestEntry {
    pub fn new(requirement: ClaimRequirement) -> Self {
        Self {
            requirement,
            ..Default::default()
        }
    }

    pub fn is_essential(&self) -> bool {
        self.requirement == ClaimRequirement::Essential
    }

    fn from_json(value: &Json) -> Result<Self> {
        let members = match value {
            Json::Null => return Ok(Self::default()),
            Json::Object(members) => members,
            other => bail!("expected null or an object, found '{other}'"),
        };

        let mut entry = Self::default();
        for (key, member) in members {
            match key.as_str() {
                "essential" => {
                    let Json::Bool(essential) = member else {
                        bail!("'essential' must be a boolean")
                    };
                    if *essential {
                        entry.requirement = ClaimRequirement::Essential;
                    }
                }
                "value" => entry.value = Some(member.clone()),
                "values" => {
                    let Json::Array(values) = member else {
                        bail!("'values' must be an array")
                    };
                    entry.values = Some(values.clone());
                }
                _ => {
                    entry.additional.insert(key.clone(), member.clone());
                }
            }
        }
        Ok(entry)
    }

    fn to_json(&self) -> Json {
        if self.requirement == ClaimRequirement::Voluntary
            && self.value.is_none()
            && self.values.is_none()
            && self.additional.is_empty()
        {
            return Json::Null;
        }
        let mut members = self.additional.clone();
        if self.is_essential() {
            members.insert("essential".into(), Json::Bool(true));
        }
        if let Some(value) = &self.value {
            members.insert("value".into(), value.clone());
        }
        if let Some(values) = &self.values {
            members.insert("values".into(), Json::Array(values.clone()));
        }
        Json::Object(members)
    }
}

/// Claim names mapped to how each claim is requested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimsRequest(BTreeMap<String, ClaimsRequestEntry>);

impl ClaimsRequest {
    /// The claims implied by the standard scope values. `sub` is essential when `openid` is
    /// requested, all other claims are voluntary.
    pub fn from_scope(scope: &Scope) -> Self {
        let mut request = Self::default();
        for token in scope.tokens() {
            let claims = match token {
                OPENID => {
                    request.insert("sub", ClaimsRequestEntry::new(ClaimRequirement::Essential));
                    continue;
                }
                "profile" => PROFILE_CLAIMS,
                "email" => EMAIL_CLAIMS,
                "address" => ADDRESS_CLAIMS,
                "phone" => PHONE_CLAIMS,
                _ => continue,
            };
            for claim in claims {
                request.insert(*claim, ClaimsRequestEntry::new(ClaimRequirement::Voluntary));
            }
        }
        request
    }

    /// Parse the `id_token` or `userinfo` member of a `claims` request.
    pub fn from_json(value: &Json) -> Result<Self> {
        let Json::Object(members) = value else {
            bail!("claims request must be a JSON object")
        };
        members
            .iter()
            .map(|(name, entry)| {
                ClaimsRequestEntry::from_json(entry)
                    .context(format!("invalid request for claim '{name}'"))
                    .map(|entry| (name.clone(), entry))
            })
            .collect::<Result<_>>()
            .map(Self)
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.0
                .iter()
                .map(|(name, entry)| (name.clone(), entry.to_json()))
                .collect(),
        )
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ClaimsRequestEntry) {
        self.0.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&ClaimsRequestEntry> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimsRequestEntry)> {
        self.0.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Names of the claims with the given requirement.
    pub fn names_with(&self, requirement: ClaimRequirement) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(move |(_, entry)| entry.requirement == requirement)
            .map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add every entry of `other`, replacing entries of the same name.
    pub fn merge(&mut self, other: ClaimsRequest) {
        self.0.extend(other.0);
    }
}

/// Claims to be returned in the ID token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdTokenClaimsRequest(pub ClaimsRequest);

/// Claims to be returned from the UserInfo endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserInfoClaimsRequest(pub ClaimsRequest);

impl Deref for IdTokenClaimsRequest {
    type Target = ClaimsRequest;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for IdTokenClaimsRequest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Deref for UserInfoClaimsRequest {
    type Target = ClaimsRequest;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UserInfoClaimsRequest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
