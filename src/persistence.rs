//! Layout persistence.
//!
//! Every object is saved as a flat [`Fields`] map under its [`EntityKey`].
//! [`JsonFileStore`] writes each map as a JSON object keyed by `kind/id`.
//!
//! ```rust
//! use rs_railcontrol::persistence::MemoryStore;
//! use rs_railcontrol::{Layout, TrackConfig, TrackId};
//!
//! let layout = Layout::new();
//! layout.add_track(TrackConfig::new(TrackId(1), "Yard").with_length(12)).unwrap();
//!
//! let store = MemoryStore::new();
//! layout.save_to(&store).unwrap();
//!
//! let restored = Layout::new();
//! restored.load_from(&store).unwrap();
//! assert_eq!(restored.track(TrackId(1)).unwrap().length(), 12);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::accessory::{AccessoryConfig, AccessoryKind};
use crate::error::LayoutError;
use crate::feedback::{FeedbackConfig, Loco};
use crate::layout::Layout;
use crate::route::{PushpullType, Relation, RouteConfig, SpeedSensors};
use crate::selector::SelectRouteApproach;
use crate::track::{TrackConfig, TrackKind};
use crate::traits::{AccessoryState, EntityKey, EntityKind, EntityStore, Fields, Protocol};
use crate::types::{AccessoryId, FeedbackId, LocoId, Orientation, RouteId, TrackId};

// ============================================================================
// Entity <-> fields
// ============================================================================

struct Reader<'a> {
    key: EntityKey,
    fields: &'a Fields,
}

impl<'a> Reader<'a> {
    fn new(key: EntityKey, fields: &'a Fields) -> Self {
        Self { key, fields }
    }

    fn invalid(&self, field: &'static str) -> LayoutError {
        LayoutError::InvalidField {
            key: self.key,
            field,
        }
    }

    fn text(&self, field: &'static str) -> Result<String, LayoutError> {
        self.fields
            .get(field)
            .cloned()
            .ok_or_else(|| self.invalid(field))
    }

    fn parse<T: FromStr>(&self, field: &'static str) -> Result<T, LayoutError> {
        self.fields
            .get(field)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| self.invalid(field))
    }

    /// Parse an optional field; absent means `default`, malformed is an error.
    fn parse_or<T: FromStr>(&self, field: &'static str, default: T) -> Result<T, LayoutError> {
        match self.fields.get(field) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| self.invalid(field)),
        }
    }

    fn flag(&self, field: &'static str) -> Result<bool, LayoutError> {
        Ok(self.parse_or::<u8>(field, 0)? != 0)
    }

    fn optional_id(&self, field: &'static str) -> Result<Option<u32>, LayoutError> {
        match self.fields.get(field).map(String::as_str) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| self.invalid(field)),
        }
    }
}

fn fields<const N: usize>(pairs: [(&str, String); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn flag(b: bool) -> String {
    u8::from(b).to_string()
}

fn id_list(ids: impl Iterator<Item = u32>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Fields of a sensor.
pub fn feedback_to_fields(config: &FeedbackConfig) -> Fields {
    fields([
        ("name", config.name.clone()),
        ("address", config.address.to_string()),
    ])
}

/// Sensor from fields.
pub fn feedback_from_fields(id: u32, f: &Fields) -> Result<FeedbackConfig, LayoutError> {
    let r = Reader::new(EntityKey::new(EntityKind::Feedback, id), f);
    Ok(FeedbackConfig::new(FeedbackId(id), r.text("name")?, r.parse("address")?))
}

/// Fields of an accessory.
pub fn accessory_to_fields(config: &AccessoryConfig) -> Fields {
    fields([
        ("name", config.name.clone()),
        ("kind", config.kind.as_u8().to_string()),
        ("protocol", config.protocol.as_u8().to_string()),
        ("address", config.address.to_string()),
        ("state", config.state.as_u8().to_string()),
    ])
}

/// Accessory from fields.
pub fn accessory_from_fields(id: u32, f: &Fields) -> Result<AccessoryConfig, LayoutError> {
    let r = Reader::new(EntityKey::new(EntityKind::Accessory, id), f);
    let protocol = Protocol::from_u8(r.parse_or("protocol", 0)?).ok_or_else(|| r.invalid("protocol"))?;
    let mut config = AccessoryConfig::new(
        AccessoryId(id),
        r.text("name")?,
        AccessoryKind::from_u8(r.parse_or("kind", 0)?),
        r.parse("address")?,
    )
    .with_protocol(protocol);
    config.state = AccessoryState::from_u8(r.parse_or("state", 0)?);
    Ok(config)
}

/// Fields of a locomotive.
pub fn loco_to_fields(loco: &Loco) -> Fields {
    fields([
        ("name", loco.name.clone()),
        ("length", loco.length.to_string()),
        ("pushpull", flag(loco.push_pull)),
    ])
}

/// Locomotive from fields.
pub fn loco_from_fields(id: u32, f: &Fields) -> Result<Loco, LayoutError> {
    let r = Reader::new(EntityKey::new(EntityKind::Loco, id), f);
    Ok(Loco::new(LocoId(id), r.text("name")?)
        .with_length(r.parse_or("length", 0)?)
        .with_push_pull(r.flag("pushpull")?))
}

/// Fields of a segment.
pub fn track_to_fields(config: &TrackConfig) -> Fields {
    fields([
        ("name", config.name.clone()),
        ("kind", config.kind.as_u8().to_string()),
        ("length", config.length.to_string()),
        ("feedbacks", id_list(config.feedbacks.iter().map(|f| f.0))),
        ("releasewhenfree", flag(config.release_when_free)),
        ("selectrouteapproach", config.approach.as_u8().to_string()),
        ("blocked", flag(config.blocked)),
        ("orientation", config.orientation.as_u8().to_string()),
    ])
}

/// Segment from fields.
pub fn track_from_fields(id: u32, f: &Fields) -> Result<TrackConfig, LayoutError> {
    let r = Reader::new(EntityKey::new(EntityKind::Track, id), f);
    let feedbacks = match f.get("feedbacks").map(String::as_str) {
        None | Some("") => Vec::new(),
        Some(list) => list
            .split(',')
            .map(|s| s.trim().parse().map(FeedbackId))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| r.invalid("feedbacks"))?,
    };
    Ok(TrackConfig::new(TrackId(id), r.text("name")?)
        .with_kind(TrackKind::from_u8(r.parse_or("kind", 0)?))
        .with_length(r.parse("length")?)
        .with_feedbacks(feedbacks)
        .with_release_when_free(r.flag("releasewhenfree")?)
        .with_approach(SelectRouteApproach::from_u8(r.parse_or("selectrouteapproach", 0)?))
        .with_blocked(r.flag("blocked")?)
        .with_orientation(Orientation::from_u8(r.parse_or("orientation", 1)?)))
}

fn encode_relation(relation: &Relation) -> String {
    match relation {
        Relation::Accessory { id, state } => format!("a:{}:{}", id.0, state.as_u8()),
        Relation::Track { id } => format!("t:{}", id.0),
    }
}

fn decode_relation(s: &str) -> Option<Relation> {
    let mut parts = s.trim().split(':');
    let relation = match parts.next()? {
        "a" => Relation::Accessory {
            id: AccessoryId(parts.next()?.parse().ok()?),
            state: AccessoryState::from_u8(parts.next()?.parse().ok()?),
        },
        "t" => Relation::Track {
            id: TrackId(parts.next()?.parse().ok()?),
        },
        _ => return None,
    };
    parts.next().is_none().then_some(relation)
}

/// Fields of a route, including its last-used stamp.
pub fn route_to_fields(config: &RouteConfig, last_used: u64) -> Fields {
    let sensor = |f: Option<FeedbackId>| f.map(|f| f.0.to_string()).unwrap_or_default();
    fields([
        ("name", config.name.clone()),
        ("priority", config.priority.to_string()),
        ("fromtrack", config.from_track.0.to_string()),
        ("fromorientation", config.from_orientation.as_u8().to_string()),
        ("totrack", config.to_track.0.to_string()),
        ("toorientation", config.to_orientation.as_u8().to_string()),
        (
            "relations",
            config
                .relations
                .iter()
                .map(encode_relation)
                .collect::<Vec<_>>()
                .join(","),
        ),
        ("feedbackreduced", sensor(config.speed_sensors.reduced)),
        ("feedbackcreep", sensor(config.speed_sensors.creep)),
        ("feedbackstop", sensor(config.speed_sensors.stop)),
        ("feedbackover", sensor(config.speed_sensors.over)),
        ("mintrainlength", config.min_train_length.to_string()),
        ("maxtrainlength", config.max_train_length.to_string()),
        ("pushpull", config.pushpull.as_u8().to_string()),
        ("lastused", last_used.to_string()),
    ])
}

/// Route and its last-used stamp from fields.
pub fn route_from_fields(id: u32, f: &Fields) -> Result<(RouteConfig, u64), LayoutError> {
    let r = Reader::new(EntityKey::new(EntityKind::Route, id), f);
    let relations = match f.get("relations").map(String::as_str) {
        None | Some("") => Vec::new(),
        Some(list) => list
            .split(',')
            .map(decode_relation)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| r.invalid("relations"))?,
    };
    let speed_sensors = SpeedSensors {
        reduced: r.optional_id("feedbackreduced")?.map(FeedbackId),
        creep: r.optional_id("feedbackcreep")?.map(FeedbackId),
        stop: r.optional_id("feedbackstop")?.map(FeedbackId),
        over: r.optional_id("feedbackover")?.map(FeedbackId),
    };
    let mut config = RouteConfig::new(
        RouteId(id),
        r.text("name")?,
        TrackId(r.parse("fromtrack")?),
        TrackId(r.parse("totrack")?),
    )
    .with_priority(r.parse_or("priority", 0)?)
    .with_from_orientation(Orientation::from_u8(r.parse_or("fromorientation", 1)?))
    .with_to_orientation(Orientation::from_u8(r.parse_or("toorientation", 1)?))
    .with_speed_sensors(speed_sensors)
    .with_train_length(r.parse_or("mintrainlength", 0)?, r.parse_or("maxtrainlength", 0)?)
    .with_pushpull(PushpullType::from_u8(r.parse_or("pushpull", 0)?));
    config.relations = relations;
    Ok((config, r.parse_or("lastused", 0)?))
}

// ============================================================================
// Stores
// ============================================================================

/// In-memory store, for tests and layouts that are never saved.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: Mutex<BTreeMap<EntityKey, Fields>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }
}

impl EntityStore for MemoryStore {
    fn load_entity(&self, key: EntityKey) -> anyhow::Result<Option<Fields>> {
        Ok(self.entities.lock().get(&key).cloned())
    }

    fn save_entity(&self, key: EntityKey, fields: &Fields) -> anyhow::Result<()> {
        self.entities.lock().insert(key, fields.clone());
        Ok(())
    }

    fn delete_entity(&self, key: EntityKey) -> anyhow::Result<()> {
        self.entities.lock().remove(&key);
        Ok(())
    }

    fn entity_keys(&self, kind: EntityKind) -> anyhow::Result<Vec<EntityKey>> {
        Ok(self
            .entities
            .lock()
            .keys()
            .filter(|k| k.kind == kind)
            .copied()
            .collect())
    }
}

/// Store backed by one JSON file mapping `kind/id` to the object's fields.
///
/// The file is read once on open and rewritten on every change; a batch is
/// one rewrite.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entities: Mutex<BTreeMap<EntityKey, Fields>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entities = BTreeMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let raw: BTreeMap<String, Fields> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            for (key, fields) in raw {
                let key = EntityKey::parse(&key)
                    .with_context(|| format!("invalid entity key '{}' in {}", key, path.display()))?;
                entities.insert(key, fields);
            }
            debug!(path = %path.display(), count = entities.len(), "store opened");
        }
        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entities: &BTreeMap<EntityKey, Fields>) -> anyhow::Result<()> {
        let raw: BTreeMap<String, &Fields> =
            entities.iter().map(|(k, v)| (k.to_string(), v)).collect();
        let json = serde_json::to_string_pretty(&raw)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        trace!(path = %self.path.display(), count = raw.len(), "store written");
        Ok(())
    }
}

impl EntityStore for JsonFileStore {
    fn load_entity(&self, key: EntityKey) -> anyhow::Result<Option<Fields>> {
        Ok(self.entities.lock().get(&key).cloned())
    }

    fn save_entity(&self, key: EntityKey, fields: &Fields) -> anyhow::Result<()> {
        let mut entities = self.entities.lock();
        entities.insert(key, fields.clone());
        self.write(&entities)
    }

    fn delete_entity(&self, key: EntityKey) -> anyhow::Result<()> {
        let mut entities = self.entities.lock();
        if entities.remove(&key).is_some() {
            self.write(&entities)?;
        }
        Ok(())
    }

    fn entity_keys(&self, kind: EntityKind) -> anyhow::Result<Vec<EntityKey>> {
        Ok(self
            .entities
            .lock()
            .keys()
            .filter(|k| k.kind == kind)
            .copied()
            .collect())
    }

    fn apply_batch(&self, delete: &[EntityKey], save: &[(EntityKey, Fields)]) -> anyhow::Result<()> {
        let mut entities = self.entities.lock();
        for key in delete {
            entities.remove(key);
        }
        for (key, fields) in save {
            entities.insert(*key, fields.clone());
        }
        self.write(&entities)
    }
}

// ============================================================================
// Layout save / load
// ============================================================================

const LOAD_ORDER: [EntityKind; 5] = [
    EntityKind::Feedback,
    EntityKind::Accessory,
    EntityKind::Loco,
    EntityKind::Track,
    EntityKind::Route,
];

impl Layout {
    /// Write every object to `store` and drop stored objects that no longer
    /// exist.
    pub fn save_to(&self, store: &dyn EntityStore) -> anyhow::Result<()> {
        let mut saved: Vec<(EntityKey, Fields)> = Vec::new();
        for id in self.feedback_ids() {
            if let Some(f) = self.feedback(id) {
                saved.push((EntityKey::new(EntityKind::Feedback, id.0), feedback_to_fields(f.config())));
            }
        }
        for id in self.accessory_ids() {
            if let Some(a) = self.accessory(id) {
                saved.push((EntityKey::new(EntityKind::Accessory, id.0), accessory_to_fields(&a.config())));
            }
        }
        for loco in self.locos() {
            saved.push((EntityKey::new(EntityKind::Loco, loco.id.0), loco_to_fields(&loco)));
        }
        for id in self.track_ids() {
            if let Some(t) = self.track(id) {
                saved.push((EntityKey::new(EntityKind::Track, id.0), track_to_fields(&t.config())));
            }
        }
        for id in self.route_ids() {
            if let Some(r) = self.route(id) {
                saved.push((
                    EntityKey::new(EntityKind::Route, id.0),
                    route_to_fields(r.config(), r.last_used()),
                ));
            }
        }

        let mut stale = Vec::new();
        for kind in LOAD_ORDER {
            for key in store.entity_keys(kind)? {
                if !saved.iter().any(|(k, _)| *k == key) {
                    stale.push(key);
                }
            }
        }
        store
            .apply_batch(&stale, &saved)
            .context("saving layout")?;
        info!(count = saved.len(), deleted = stale.len(), "layout saved");
        Ok(())
    }

    /// Restore every object from `store` in dependency order.
    ///
    /// Fails on malformed fields, duplicates and dangling references; objects
    /// loaded before the failure stay registered.
    pub fn load_from(&self, store: &dyn EntityStore) -> anyhow::Result<()> {
        let mut count = 0usize;
        let mut max_used = 0u64;
        for kind in LOAD_ORDER {
            for key in store.entity_keys(kind)? {
                let Some(f) = store.load_entity(key)? else {
                    continue;
                };
                let id = key.id;
                let loaded: Result<(), LayoutError> = match kind {
                    EntityKind::Feedback => feedback_from_fields(id, &f).and_then(|c| self.add_feedback(c)),
                    EntityKind::Accessory => accessory_from_fields(id, &f).and_then(|c| self.add_accessory(c)),
                    EntityKind::Loco => loco_from_fields(id, &f).map(|l| self.add_loco(l)),
                    EntityKind::Track => track_from_fields(id, &f).and_then(|c| self.add_track(c)),
                    EntityKind::Route => route_from_fields(id, &f).and_then(|(c, last_used)| {
                        self.add_route(c)?;
                        if let Some(route) = self.route(RouteId(id)) {
                            route.mark_used(last_used);
                        }
                        max_used = max_used.max(last_used);
                        Ok(())
                    }),
                };
                loaded.with_context(|| format!("loading {}", key))?;
                count += 1;
            }
        }
        self.restore_use_counter(max_used);
        info!(count, "layout loaded");
        Ok(())
    }
}
