// Origins used for outbound targeting and inbound filtering
use crate::{MessengerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Wildcard target origin: deliver anywhere, accept from anyone.
pub const WILDCARD: &str = "*";

/// Normalized tuple origin, e.g. `https://a.example` or `http://localhost:8080`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parse any absolute URL and keep only its origin.
    ///
    /// Path, query and fragment are dropped and default ports are elided,
    /// so `https://A.example:443/page` becomes `https://a.example`.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| MessengerError::InvalidOrigin(format!("{}: {}", input, e)))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(MessengerError::InvalidOrigin(format!(
                "{} has an opaque origin",
                input
            )));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Origin {
    type Err = MessengerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Origin {
    type Error = MessengerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

/// Where outbound messages may go and which inbound messages are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetOrigin {
    /// `"*"`: no restriction in either direction.
    #[default]
    Any,
    /// Only this exact origin.
    Exact(Origin),
}

impl TargetOrigin {
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim() == WILDCARD {
            Ok(TargetOrigin::Any)
        } else {
            Origin::parse(input).map(TargetOrigin::Exact)
        }
    }

    /// Whether a message reporting `origin` passes this filter.
    pub fn accepts(&self, origin: &str) -> bool {
        match self {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(expected) => expected.as_str() == origin,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TargetOrigin::Any)
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOrigin::Any => f.write_str(WILDCARD),
            TargetOrigin::Exact(origin) => f.write_str(origin.as_str()),
        }
    }
}

impl FromStr for TargetOrigin {
    type Err = MessengerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetOrigin {
    type Error = MessengerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TargetOrigin> for String {
    fn from(target: TargetOrigin) -> Self {
        target.to_string()
    }
}

impl From<Origin> for TargetOrigin {
    fn from(origin: Origin) -> Self {
        TargetOrigin::Exact(origin)
    }
}
