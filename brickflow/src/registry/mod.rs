//! The brick registry: id to implementation catalogue.
//!
//! The registry is an explicitly constructed service object (one per
//! execution context), not ambient module state. It is append/overwrite
//! during a population phase and read-only during execution; `clear` is
//! for test harnesses and documented unsafe while a run is executing.

use crate::bricks::Brick;
use crate::core::{BrickId, BrickKind};
use crate::errors::{BrickflowError, NotFoundError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered brick together with its kind discriminant.
///
/// The kind is resolved once, at registration, from the brick's own
/// metadata.
#[derive(Clone)]
pub struct TypedBrick {
    /// The implementation.
    pub brick: Arc<dyn Brick>,
    /// The capability kind.
    pub kind: BrickKind,
}

impl std::fmt::Debug for TypedBrick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedBrick")
            .field("id", self.brick.id())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Process-wide catalogue mapping brick ids to implementations.
#[derive(Default)]
pub struct BrickRegistry {
    bricks: RwLock<HashMap<BrickId, TypedBrick>>,
}

impl BrickRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with bricks.
    #[must_use]
    pub fn with_bricks(bricks: Vec<Arc<dyn Brick>>) -> Self {
        let registry = Self::new();
        registry.register(bricks);
        registry
    }

    /// Idempotently adds or overwrites entries keyed by id.
    ///
    /// The whole batch lands under one write lock, so concurrent lookups
    /// observe either the previous or the fully-updated catalogue, never
    /// a partially-populated one. In-flight executions that already
    /// resolved an implementation keep the `Arc` they hold.
    pub fn register(&self, bricks: Vec<Arc<dyn Brick>>) {
        let mut map = self.bricks.write();
        for brick in bricks {
            let id = brick.id().clone();
            let kind = brick.kind();
            debug!(brick_id = %id, kind = %kind, "registering brick");
            map.insert(id, TypedBrick { brick, kind });
        }
    }

    /// Resolves a brick by id.
    pub fn lookup(&self, id: &BrickId) -> Result<Arc<dyn Brick>, BrickflowError> {
        self.bricks
            .read()
            .get(id)
            .map(|typed| typed.brick.clone())
            .ok_or_else(|| NotFoundError::new(id.clone()).into())
    }

    /// Returns an immutable snapshot of the typed catalogue.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            typed: Arc::new(self.bricks.read().clone()),
        }
    }

    /// Returns the typed entries (id, brick, kind).
    #[must_use]
    pub fn all_typed(&self) -> HashMap<BrickId, TypedBrick> {
        self.bricks.read().clone()
    }

    /// Returns the number of registered bricks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bricks.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bricks.read().is_empty()
    }

    /// Empties the registry.
    ///
    /// Test harnesses only; not safe to call while a run is executing.
    pub fn clear(&self) {
        self.bricks.write().clear();
    }
}

impl std::fmt::Debug for BrickRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrickRegistry")
            .field("brick_count", &self.len())
            .finish()
    }
}

/// An immutable view of the registry taken at a point in time.
///
/// Visitors and executors hold a snapshot for the duration of a
/// traversal/run, so later re-registration never changes their world
/// mid-flight.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    typed: Arc<HashMap<BrickId, TypedBrick>>,
}

impl RegistrySnapshot {
    /// Creates an empty snapshot (static analysis of unregistered
    /// definitions).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves a brick, tolerating misses.
    #[must_use]
    pub fn get(&self, id: &BrickId) -> Option<Arc<dyn Brick>> {
        self.typed.get(id).map(|typed| typed.brick.clone())
    }

    /// Resolves a typed entry, tolerating misses.
    #[must_use]
    pub fn get_typed(&self, id: &BrickId) -> Option<&TypedBrick> {
        self.typed.get(id)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.typed.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.typed.is_empty()
    }
}

impl std::fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("brick_count", &self.len())
            .finish()
    }
}
