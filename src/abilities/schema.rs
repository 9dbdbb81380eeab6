//! Translation of abilities into function declarations.
//!
//! The declaration is provider-neutral (`name`, `description`,
//! `parameters`); each model client maps it onto its own wire format.

use serde::Serialize;
use serde_json::{json, Value};

use super::{Ability, AbilityRegistry};

/// Longest function name providers accept.
pub const MAX_DECLARED_NAME_LEN: usize = 64;

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    /// Sanitized ability name (see [`sanitize_name`]).
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Maps a registry name onto the function-name character set.
///
/// The namespace separator `/` is not accepted by providers and becomes `_`.
/// The inverse lives in [`AbilityRegistry::resolve_declared`], which only
/// holds names that survived the collision check at registration.
pub fn sanitize_name(name: &str) -> String {
    name.replace('/', "_")
}

/// Returns `schema` when it is a well-formed object schema, otherwise
/// an empty object schema.
pub fn normalize_parameters(schema: &Value) -> Value {
    if is_well_formed(schema) {
        schema.clone()
    } else {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }
}

fn is_well_formed(schema: &Value) -> bool {
    let Some(obj) = schema.as_object() else {
        return false;
    };
    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return false;
    }
    if !obj.get("properties").is_some_and(Value::is_object) {
        return false;
    }
    match obj.get("required") {
        None => true,
        Some(Value::Array(items)) => items.iter().all(Value::is_string),
        Some(_) => false,
    }
}

pub fn to_declaration(ability: &dyn Ability) -> FunctionDeclaration {
    FunctionDeclaration {
        name: sanitize_name(ability.name()),
        description: ability.description().to_string(),
        parameters: normalize_parameters(&ability.input_schema()),
    }
}

/// Declarations for every registered ability, in registry order.
pub fn declarations(registry: &AbilityRegistry) -> Vec<FunctionDeclaration> {
    registry.list_all().map(to_declaration).collect()
}

/// Operator-facing view of one ability: its registry name, the declaration
/// the model receives and the documented result shape.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub ability: String,
    #[serde(flatten)]
    pub declaration: FunctionDeclaration,
    pub output_schema: Value,
}

pub fn catalog(registry: &AbilityRegistry) -> Vec<CatalogEntry> {
    registry
        .list_all()
        .map(|ability| CatalogEntry {
            ability: ability.name().to_string(),
            declaration: to_declaration(ability),
            output_schema: ability.output_schema(),
        })
        .collect()
}
