//! The authenticated user's profile.

use serde::{Deserialize, Serialize};

/// Profile of the authenticated user as returned by the Auth Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Home region, used to pick regional defaults (e.g. "Ouest").
    #[serde(default)]
    pub region: Option<String>,
    /// Preferred display currency ("HTG" or "USD").
    #[serde(default)]
    pub default_currency: Option<String>,
}

impl UserProfile {
    /// Human-readable name for greetings and logs, falling back to the
    /// email or id when no name is set.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone().unwrap_or_else(|| self.id.clone()),
        }
    }
}
