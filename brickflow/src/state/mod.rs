//! Mod variable state with per-variable synchronization policies.
//!
//! The controller is an explicitly constructed service object shared by
//! all runs in one execution context. The backing storage is the sole
//! shared mutable resource across runs; writes are last-write-wins with
//! no transactional isolation.

mod storage;

pub use storage::{MemoryStore, StorageArea, StorageEvent, Subscription, VariableStore};

use crate::core::ModComponentRef;
use crate::errors::BrickflowError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Which scope a state read/write addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Shared across all components of a mod; honors sync policies.
    Mod,
    /// Scoped to the owning tab.
    Tab,
    /// Scoped to the owning component's session.
    Session,
}

/// How a write combines with the existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Replaces the namespace value wholesale.
    Replace,
    /// Overwrites top-level keys only.
    Shallow,
    /// Deep-merges, with the incoming data taking precedence at every
    /// level.
    Deep,
}

/// Whether a mod variable's storage is broadcast across contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Local to the writing context.
    None,
    /// Shared across frames of the same tab.
    Tab,
    /// Shared across the whole browser session.
    Session,
}

/// A declared mod variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModVariableDeclaration {
    /// The variable's synchronization policy.
    pub sync_policy: SyncPolicy,
    /// Optional author-facing description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A mod's declared variable schema (name to declaration).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModVariablesDefinition {
    /// Declarations keyed by variable name.
    pub schema: HashMap<String, ModVariableDeclaration>,
}

impl ModVariablesDefinition {
    /// Returns the declared policy for a variable, defaulting to local.
    #[must_use]
    pub fn policy_for(&self, name: &str) -> SyncPolicy {
        self.schema
            .get(name)
            .map_or(SyncPolicy::None, |declaration| declaration.sync_policy)
    }
}

/// Maintains named variable namespaces with declared sync policies.
pub struct StateController {
    store: Arc<dyn VariableStore>,
    schemas: RwLock<HashMap<String, ModVariablesDefinition>>,
}

impl StateController {
    /// Creates a controller over the given backing store.
    #[must_use]
    pub fn new(store: Arc<dyn VariableStore>) -> Self {
        Self {
            store,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a controller over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Associates a mod id with its declared variable schema.
    ///
    /// The deletion routines consult this registry to know which stored
    /// keys correspond to which policy, since the backing storage itself
    /// is flat key/value.
    pub fn register_mod_variables(&self, mod_id: impl Into<String>, definition: ModVariablesDefinition) {
        self.schemas.write().insert(mod_id.into(), definition);
    }

    /// Reads the current merged value for the given owner.
    pub async fn get_state(
        &self,
        namespace: Namespace,
        component: &ModComponentRef,
    ) -> Result<Value, BrickflowError> {
        match namespace {
            Namespace::Mod => {
                let mut merged = Map::new();
                for (area, key) in Self::mod_partition_keys(component) {
                    if let Some(Value::Object(map)) = self.store.get(area, &key).await? {
                        for (k, v) in map {
                            merged.insert(k, v);
                        }
                    }
                }
                Ok(Value::Object(merged))
            }
            Namespace::Tab | Namespace::Session => {
                let key = Self::owner_key(namespace, component);
                Ok(self
                    .store
                    .get(StorageArea::Local, &key)
                    .await?
                    .unwrap_or_else(|| Value::Object(Map::new())))
            }
        }
    }

    /// Writes data into the owner's namespace and returns the new value.
    ///
    /// Synchronous with respect to subsequent reads from the same
    /// context; synchronized variables are additionally broadcast by the
    /// backing store. Last write wins across concurrent runs.
    pub async fn set_state(
        &self,
        namespace: Namespace,
        data: Value,
        strategy: MergeStrategy,
        component: &ModComponentRef,
    ) -> Result<Value, BrickflowError> {
        let current = self.get_state(namespace, component).await?;
        let next = apply_merge_strategy(current, data, strategy);

        debug!(
            mod_id = %component.mod_id,
            namespace = ?namespace,
            strategy = ?strategy,
            "state write"
        );

        match namespace {
            Namespace::Mod => {
                let Value::Object(ref entries) = next else {
                    return Err(BrickflowError::State(
                        "mod state must be a JSON object".to_string(),
                    ));
                };
                let definition = self
                    .schemas
                    .read()
                    .get(&component.mod_id)
                    .cloned()
                    .unwrap_or_default();

                for (policy, (area, key)) in [
                    (SyncPolicy::None, Self::mod_key(SyncPolicy::None, component)),
                    (SyncPolicy::Tab, Self::mod_key(SyncPolicy::Tab, component)),
                    (SyncPolicy::Session, Self::mod_key(SyncPolicy::Session, component)),
                ] {
                    let partition: Map<String, Value> = entries
                        .iter()
                        .filter(|(name, _)| definition.policy_for(name) == policy)
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();

                    if partition.is_empty() {
                        self.store.remove(area, &key).await?;
                    } else {
                        self.store.set(area, &key, Value::Object(partition)).await?;
                    }
                }
            }
            Namespace::Tab | Namespace::Session => {
                let key = Self::owner_key(namespace, component);
                self.store.set(StorageArea::Local, &key, next.clone()).await?;
            }
        }

        Ok(next)
    }

    /// Removes the synchronized entries belonging to a mod, leaving
    /// purely local state untouched.
    ///
    /// Local-only variables are cleaned up by normal teardown;
    /// synchronized ones need this explicit broadcast-and-delete.
    pub async fn delete_synchronized_variables_for_mod(
        &self,
        mod_id: &str,
    ) -> Result<(), BrickflowError> {
        let suffix = format!("mod/{mod_id}");
        for key in self.store.keys(StorageArea::Synchronized).await? {
            if key == suffix || key.ends_with(&format!("/{suffix}")) {
                self.store.remove(StorageArea::Synchronized, &key).await?;
            }
        }
        Ok(())
    }

    /// Removes the synchronized entries belonging to a tab.
    pub async fn delete_synchronized_variables_for_tab(
        &self,
        tab_id: &str,
    ) -> Result<(), BrickflowError> {
        let prefix = format!("tab/{tab_id}/");
        for key in self.store.keys(StorageArea::Synchronized).await? {
            if key.starts_with(&prefix) {
                self.store.remove(StorageArea::Synchronized, &key).await?;
            }
        }
        Ok(())
    }

    /// Subscribes to synchronized variable changes.
    pub fn subscribe(
        &self,
        listener: Arc<dyn Fn(&StorageEvent) + Send + Sync>,
    ) -> Subscription {
        self.store.subscribe(listener)
    }

    fn mod_key(policy: SyncPolicy, component: &ModComponentRef) -> (StorageArea, String) {
        match policy {
            SyncPolicy::None => (StorageArea::Local, format!("mod/{}", component.mod_id)),
            SyncPolicy::Tab => (
                StorageArea::Synchronized,
                format!("tab/{}/mod/{}", component.tab_id, component.mod_id),
            ),
            SyncPolicy::Session => {
                (StorageArea::Synchronized, format!("mod/{}", component.mod_id))
            }
        }
    }

    fn mod_partition_keys(component: &ModComponentRef) -> [(StorageArea, String); 3] {
        [
            Self::mod_key(SyncPolicy::None, component),
            Self::mod_key(SyncPolicy::Tab, component),
            Self::mod_key(SyncPolicy::Session, component),
        ]
    }

    fn owner_key(namespace: Namespace, component: &ModComponentRef) -> String {
        match namespace {
            Namespace::Mod => format!("mod/{}", component.mod_id),
            Namespace::Tab => format!("tab/{}/mod/{}", component.tab_id, component.mod_id),
            Namespace::Session => format!("component/{}", component.mod_component_id),
        }
    }
}

impl std::fmt::Debug for StateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateController")
            .field("registered_mods", &self.schemas.read().len())
            .finish()
    }
}

/// Applies a merge strategy, with `data` taking precedence.
#[must_use]
pub fn apply_merge_strategy(current: Value, data: Value, strategy: MergeStrategy) -> Value {
    match strategy {
        MergeStrategy::Replace => data,
        MergeStrategy::Shallow => match (current, data) {
            (Value::Object(mut base), Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key, value);
                }
                Value::Object(base)
            }
            (_, data) => data,
        },
        MergeStrategy::Deep => deep_merge(current, data),
    }
}

fn deep_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}
