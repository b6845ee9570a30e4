//! Button presentation policy
//!
//! Whether a control the principal lacks is hidden or shown disabled is a
//! UI decision, not an authorization one. The resolver always returns the
//! full set of granted button codes; this module maps codes to states.

use crate::error::AuthzError;
use crate::resolver::PermissionBundle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How ungranted buttons are presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonPolicy {
    #[default]
    Hide,
    Disable,
}

/// Rendered state of one button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    Enabled,
    Hidden,
    Disabled,
}

impl ButtonPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonPolicy::Hide => "hide",
            ButtonPolicy::Disable => "disable",
        }
    }

    /// State of the button carrying `code` for this bundle
    pub fn state_for(&self, bundle: &PermissionBundle, code: &str) -> ButtonState {
        if bundle.has_button(code) {
            ButtonState::Enabled
        } else {
            match self {
                ButtonPolicy::Hide => ButtonState::Hidden,
                ButtonPolicy::Disable => ButtonState::Disabled,
            }
        }
    }

    /// States for every code a page renders
    pub fn states<'a, I>(&self, bundle: &PermissionBundle, codes: I) -> BTreeMap<String, ButtonState>
    where
        I: IntoIterator<Item = &'a str>,
    {
        codes
            .into_iter()
            .map(|code| (code.to_string(), self.state_for(bundle, code)))
            .collect()
    }
}

impl fmt::Display for ButtonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ButtonPolicy {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hide" => Ok(ButtonPolicy::Hide),
            "disable" => Ok(ButtonPolicy::Disable),
            other => Err(AuthzError::Config(format!(
                "button_policy must be 'hide' or 'disable', got '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for ButtonPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
