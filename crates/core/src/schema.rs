//! Context schemas — reusable background-information records a user can
//! attach to a prompt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of background a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextType {
    Business,
    RoleSpecific,
    ProjectSpecific,
    #[default]
    #[serde(other)]
    Other,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Business => "business",
            ContextType::RoleSpecific => "role-specific",
            ContextType::ProjectSpecific => "project-specific",
            ContextType::Other => "other",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selectable background-context record, as returned by the service.
///
/// Immutable once fetched. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSchema {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub company_name: String,

    #[serde(rename = "type", default)]
    pub context_type: ContextType,

    #[serde(default)]
    pub target_audience: Vec<String>,

    #[serde(default)]
    pub key_goals: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_published: bool,
}

impl ContextSchema {
    /// Case-insensitive match on name, company name, or type.
    /// An empty term matches everything.
    pub fn matches(&self, term: &str) -> bool {
        let q = term.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.company_name.to_lowercase().contains(&q)
            || self.context_type.as_str().contains(&q)
    }
}
