//! Persistence abstraction.
//!
//! The layout stores each object as a flat, ordered string map keyed by
//! `(kind, id)`. How those maps end up on disk is up to the [`EntityStore`].
//! A whole layout is saved with one [`EntityStore::apply_batch`] call.

use std::collections::BTreeMap;

use core::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Flat field map of one persisted object.
pub type Fields = BTreeMap<String, String>;

/// Kind of a persisted object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Feedback sensor.
    Feedback,
    /// Switch, signal or plain accessory.
    Accessory,
    /// Locomotive.
    Loco,
    /// Track segment.
    Track,
    /// Route.
    Route,
}

impl EntityKind {
    /// Lowercase name, used as a key prefix.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Feedback => "feedback",
            EntityKind::Accessory => "accessory",
            EntityKind::Loco => "loco",
            EntityKind::Track => "track",
            EntityKind::Route => "route",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_text(s: &str) -> Option<Self> {
        match s {
            "feedback" => Some(EntityKind::Feedback),
            "accessory" => Some(EntityKind::Accessory),
            "loco" => Some(EntityKind::Loco),
            "track" => Some(EntityKind::Track),
            "route" => Some(EntityKind::Route),
            _ => None,
        }
    }
}

/// Key of a persisted object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// Object kind.
    pub kind: EntityKind,
    /// Raw numeric id.
    pub id: u32,
}

impl EntityKey {
    /// Create a key.
    pub const fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }

    /// Parse the `kind/id` form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once('/')?;
        Some(Self {
            kind: EntityKind::from_text(kind)?,
            id: id.parse().ok()?,
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

/// Backing store for layout objects.
pub trait EntityStore: Send + Sync {
    /// Load one object, `None` if it was never saved.
    fn load_entity(&self, key: EntityKey) -> anyhow::Result<Option<Fields>>;

    /// Create or overwrite one object.
    fn save_entity(&self, key: EntityKey, fields: &Fields) -> anyhow::Result<()>;

    /// Remove one object. Removing a missing object is not an error.
    fn delete_entity(&self, key: EntityKey) -> anyhow::Result<()>;

    /// All keys of one kind, ascending by id.
    fn entity_keys(&self, kind: EntityKind) -> anyhow::Result<Vec<EntityKey>>;

    /// Apply a set of deletions and saves together.
    ///
    /// Stores that persist on every change override this to write once.
    fn apply_batch(&self, delete: &[EntityKey], save: &[(EntityKey, Fields)]) -> anyhow::Result<()> {
        for key in delete {
            self.delete_entity(*key)
                .with_context(|| format!("deleting {}", key))?;
        }
        for (key, fields) in save {
            self.save_entity(*key, fields)
                .with_context(|| format!("saving {}", key))?;
        }
        Ok(())
    }
}
