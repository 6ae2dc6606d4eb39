use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A named enforcement outcome supported by a service, e.g. `ban` or `captcha`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    /// Name of the built-in ban action
    pub const BAN: &'static str = "ban";

    /// Name of the captcha action
    pub const CAPTCHA: &'static str = "captcha";

    /// Create an action from its name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The ban action
    #[must_use]
    pub fn ban() -> Self {
        Self::new(Self::BAN)
    }

    /// The action name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Actions supported without extra configuration.
    ///
    /// Only `ban` has a built-in body; `captcha` and custom actions need
    /// one configured before they can be enabled.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![Self::ban()]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Action {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Self(s)
    }
}
