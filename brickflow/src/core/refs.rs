//! Identifiers for bricks and mod component owners.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A namespaced brick identifier (e.g., `brickflow/state/assign`).
///
/// Brick ids are globally unique within a registry; registering a second
/// brick under the same id overwrites the first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrickId(String);

impl BrickId {
    /// Creates a new brick id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BrickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BrickId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BrickId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifies the mod component that owns a run, a trace, or a variable
/// namespace.
///
/// State keys and trace logs are namespaced by these fields, so two mods
/// (or two tabs running the same mod) never observe each other's data
/// unless a variable's sync policy says so.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModComponentRef {
    /// The installed mod's registry id.
    pub mod_id: String,
    /// The specific component instance within the mod.
    pub mod_component_id: Uuid,
    /// The tab the component is attached to.
    pub tab_id: String,
}

impl ModComponentRef {
    /// Creates a new component reference.
    #[must_use]
    pub fn new(mod_id: impl Into<String>, mod_component_id: Uuid, tab_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            mod_component_id,
            tab_id: tab_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_id_display() {
        let id = BrickId::new("brickflow/transform/echo");
        assert_eq!(id.to_string(), "brickflow/transform/echo");
        assert_eq!(id.as_str(), "brickflow/transform/echo");
    }

    #[test]
    fn test_brick_id_serde_transparent() {
        let id = BrickId::new("a/b");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""a/b""#);

        let back: BrickId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_mod_component_ref_roundtrip() {
        let component = ModComponentRef::new("@scope/my-mod", Uuid::new_v4(), "tab-1");
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["modId"], "@scope/my-mod");

        let back: ModComponentRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, component);
    }
}
