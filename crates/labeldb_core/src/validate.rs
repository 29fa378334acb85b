//! Entity and label validation.
//!
//! Validators are pure functions over the request payload; they never touch
//! the document engine.

use crate::entity::{is_meta_label, Entity};
use crate::error::{StoreError, StoreResult};

/// Names that can never be used as entity types.
///
/// These collide with route segments and introspection endpoints.
pub const RESERVED_TYPE_NAMES: [&str; 7] = [
    "entities", "entity", "query", "stats", "metrics", "status", "changes",
];

/// Validates entity types, labels, and write payloads.
///
/// The validator is constructed with the entity types the store serves;
/// construction itself rejects reserved or malformed type names.
#[derive(Debug, Clone)]
pub struct Validator {
    entity_types: Vec<String>,
}

impl Validator {
    /// Creates a validator for the given entity types.
    ///
    /// # Errors
    ///
    /// Fails if any type name is a reserved word or not a valid name.
    pub fn new<I, S>(entity_types: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entity_types: Vec<String> = entity_types.into_iter().map(Into::into).collect();
        for ty in &entity_types {
            if RESERVED_TYPE_NAMES.contains(&ty.as_str()) {
                return Err(StoreError::reserved_entity_type(ty));
            }
            if !is_valid_label_name(ty) {
                return Err(StoreError::invalid_entity_type(ty));
            }
        }
        Ok(Self { entity_types })
    }

    /// Returns the configured entity types.
    #[must_use]
    pub fn entity_types(&self) -> &[String] {
        &self.entity_types
    }

    /// Checks that `entity_type` is configured and not reserved.
    pub fn entity_type(&self, entity_type: &str) -> StoreResult<()> {
        if RESERVED_TYPE_NAMES.contains(&entity_type)
            || !self.entity_types.iter().any(|t| t == entity_type)
        {
            return Err(StoreError::invalid_entity_type(entity_type));
        }
        Ok(())
    }

    /// Validates write payloads (create entities or update patches).
    ///
    /// Rejects reserved meta labels, which only the store may set, and
    /// malformed label names.
    pub fn entities(&self, entities: &[Entity]) -> StoreResult<()> {
        for entity in entities {
            for label in entity.as_map().keys() {
                if is_meta_label(label) {
                    return Err(StoreError::invalid_label(format!(
                        "cannot set reserved label '{label}'"
                    )));
                }
                if !is_valid_label_name(label) {
                    return Err(StoreError::invalid_label(format!(
                        "invalid label name '{label}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validates a label-delete target.
    pub fn delete_label(&self, label: &str) -> StoreResult<()> {
        if is_meta_label(label) {
            return Err(StoreError::invalid_label(format!(
                "cannot delete reserved label '{label}'"
            )));
        }
        if !is_valid_label_name(label) {
            return Err(StoreError::invalid_label(format!(
                "invalid label name '{label}'"
            )));
        }
        Ok(())
    }
}

/// Checks a label name against `[A-Za-z_][A-Za-z0-9_.-]*`.
#[must_use]
pub(crate) fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    head_ok && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
