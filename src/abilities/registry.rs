//! Ability registry.
//!
//! Holds every ability exposed to the model, keyed by its unique name.
//! Built once at startup, then shared read-only across requests.
//!
//! The registry also owns the inverse of [`sanitize_name`]: it maps each
//! declared (sanitized) function name back to the registered name, and
//! refuses registrations that would make that mapping ambiguous.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use super::schema::{sanitize_name, MAX_DECLARED_NAME_LEN};
use super::Ability;

/// What `register()` does when the name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first registration and return an error.
    #[default]
    Reject,
    /// Replace the existing ability, keeping its position.
    Overwrite,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("ability '{0}' is already registered")]
    Duplicate(String),
    #[error("ability '{name}' collides with '{existing}' (both declared as '{declared}')")]
    SanitizedCollision {
        name: String,
        existing: String,
        declared: String,
    },
    #[error("invalid ability name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

pub struct AbilityRegistry {
    abilities: Vec<Box<dyn Ability>>,
    by_name: HashMap<String, usize>,
    /// Declared (sanitized) name → registered name.
    by_declared: HashMap<String, String>,
    policy: DuplicatePolicy,
}

impl AbilityRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            abilities: Vec::new(),
            by_name: HashMap::new(),
            by_declared: HashMap::new(),
            policy,
        }
    }

    pub fn register(&mut self, ability: Box<dyn Ability>) -> Result<(), RegistryError> {
        let name = ability.name().to_string();
        validate_name(&name)?;

        if let Some(&index) = self.by_name.get(&name) {
            return match self.policy {
                DuplicatePolicy::Reject => Err(RegistryError::Duplicate(name)),
                DuplicatePolicy::Overwrite => {
                    warn!("Ability '{name}' registered twice, replacing previous definition");
                    self.abilities[index] = ability;
                    Ok(())
                }
            };
        }

        let declared = sanitize_name(&name);
        if let Some(existing) = self.by_declared.get(&declared) {
            return Err(RegistryError::SanitizedCollision {
                name,
                existing: existing.clone(),
                declared,
            });
        }

        debug!("Registered ability '{name}' (declared as '{declared}')");
        self.by_name.insert(name.clone(), self.abilities.len());
        self.by_declared.insert(declared, name);
        self.abilities.push(ability);
        Ok(())
    }

    /// Exact-match lookup by registered name.
    pub fn get(&self, name: &str) -> Option<&dyn Ability> {
        self.by_name
            .get(name)
            .map(|&index| self.abilities[index].as_ref())
    }

    /// All abilities in registration order.
    pub fn list_all(&self) -> impl Iterator<Item = &dyn Ability> + '_ {
        self.abilities.iter().map(|ability| ability.as_ref())
    }

    /// Maps a declared function name back to the registered ability name.
    pub fn resolve_declared(&self, declared: &str) -> Option<&str> {
        self.by_declared.get(declared).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        self.list_all().map(|ability| ability.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}

impl Default for AbilityRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid("must start with a letter or underscore"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')))
    {
        return Err(invalid(&format!("character '{c}' is not allowed")));
    }
    if sanitize_name(name).len() > MAX_DECLARED_NAME_LEN {
        return Err(invalid(&format!(
            "longer than {MAX_DECLARED_NAME_LEN} characters"
        )));
    }
    Ok(())
}
