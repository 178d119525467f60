//! Report visibility rules.
//!
//! Stored access rules are free-form JSON written by older admin screens, so
//! they are normalized on every read: roles and users become sorted sets and
//! an empty role set falls back to the policy defaults.

use crate::types::{Report, RequesterContext};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    /// Always allowed.
    pub super_role: String,
    /// Never allowed, whatever the report's rules say.
    pub denied_role: String,
    pub default_roles: Vec<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            super_role: "super_admin".to_string(),
            denied_role: "guest".to_string(),
            default_roles: vec![
                "admin".to_string(),
                "manager".to_string(),
                "finance".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessRules {
    pub roles: BTreeSet<String>,
    pub users: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn normalize(&self, raw: Option<&JsonValue>) -> AccessRules {
        let mut rules = raw.map(parse_rules).unwrap_or_default();
        if rules.roles.is_empty() {
            rules.roles = self
                .default_roles
                .iter()
                .filter(|role| !role.trim().is_empty())
                .map(|role| role.trim().to_string())
                .collect();
        }
        if rules.roles.is_empty() {
            rules.roles.insert(self.super_role.clone());
        }
        rules
    }

    pub fn can_access(&self, report: &Report, requester: &RequesterContext) -> bool {
        if requester.role == self.denied_role {
            return false;
        }
        if requester.role == self.super_role || requester.user_id == report.creator_id {
            return true;
        }
        let rules = self.normalize(report.config.access_rules.as_ref());
        rules.roles.contains(&requester.role) || rules.users.contains(&requester.user_id)
    }
}

pub fn normalize_access_rules(raw: Option<&JsonValue>) -> AccessRules {
    AccessPolicy::default().normalize(raw)
}

pub fn can_access_report(report: &Report, requester: &RequesterContext) -> bool {
    AccessPolicy::default().can_access(report, requester)
}

fn parse_rules(raw: &JsonValue) -> AccessRules {
    match raw {
        // Some rows hold the rules as a JSON document inside a text column.
        JsonValue::String(text) => serde_json::from_str::<JsonValue>(text)
            .ok()
            .filter(JsonValue::is_object)
            .map(|inner| parse_rules(&inner))
            .unwrap_or_default(),
        JsonValue::Object(map) => AccessRules {
            roles: string_set(map.get("roles")),
            users: string_set(map.get("users")),
        },
        _ => AccessRules::default(),
    }
}

fn string_set(raw: Option<&JsonValue>) -> BTreeSet<String> {
    let Some(JsonValue::Array(items)) = raw else {
        return BTreeSet::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            JsonValue::String(s) => Some(s.trim().to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
