// Dataset store: the two role slots, their markers and the durable copy

use crate::data::{Dataset, DatasetId, Role, Row, Schema};
use crate::error::{PipelineError, Result, Status};
use crate::markers::{extract_markers, Marker};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Minimal key-value contract the store persists through.
pub trait KvStore {
    fn put(&mut self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// In-process store, lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KvStore for FileKv {
    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::persistence(key, e))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| PipelineError::persistence(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| PipelineError::persistence(key, e))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::persistence(key, e)),
        }
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::persistence(key, e)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredDataset {
    schema: Schema,
    rows: Vec<Row>,
}

/// Roles restored by [`DatasetStore::load`] and the keys that could not be read.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadSummary {
    pub restored: Vec<Role>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub id: DatasetId,
    pub markers: usize,
    /// `Ok` unless the durable write failed; the in-memory copy is kept either way.
    pub status: Status,
}

/// Owns the primary and secondary datasets plus the markers derived from the
/// geodata role. Each role is independent: saving or clearing one leaves the
/// other untouched.
pub struct DatasetStore<K: KvStore> {
    kv: K,
    geodata_role: Role,
    primary: Dataset,
    secondary: Dataset,
    markers: Vec<Marker>,
    markers_origin: Option<DatasetId>,
    next_id: u64,
}

impl<K: KvStore> DatasetStore<K> {
    pub fn new(kv: K, geodata_role: Role) -> Self {
        Self {
            kv,
            geodata_role,
            primary: Dataset::empty(Role::Primary),
            secondary: Dataset::empty(Role::Secondary),
            markers: Vec::new(),
            markers_origin: None,
            next_id: 0,
        }
    }

    /// Create a store and restore whatever the backend holds.
    pub fn open(kv: K, geodata_role: Role) -> Self {
        let mut store = Self::new(kv, geodata_role);
        store.load();
        store
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn slot(&self, role: Role) -> &Dataset {
        match role {
            Role::Primary => &self.primary,
            Role::Secondary => &self.secondary,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Dataset {
        match role {
            Role::Primary => &mut self.primary,
            Role::Secondary => &mut self.secondary,
        }
    }

    fn assign_id(&mut self) -> DatasetId {
        self.next_id += 1;
        DatasetId(self.next_id)
    }

    /// Current dataset for `role`; an empty dataset when nothing is stored.
    pub fn get(&self, role: Role) -> &Dataset {
        self.slot(role)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn geodata_role(&self) -> Role {
        self.geodata_role
    }

    /// Restore both roles from the backend. Unreadable or corrupt entries are
    /// logged and leave that role empty.
    pub fn load(&mut self) -> LoadSummary {
        let mut summary = LoadSummary::default();

        for role in Role::ALL {
            let key = role.data_key();
            let restored = match self.kv.get(&key) {
                Ok(Some(text)) => match decode_dataset(role, &text) {
                    Ok(ds) => Some(ds),
                    Err(e) => {
                        error!("discarding corrupt {}: {}", key, e);
                        summary.failures.push(key.clone());
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    error!("failed to load {}: {}", key, e);
                    summary.failures.push(key.clone());
                    None
                }
            };

            let mut dataset = restored.unwrap_or_else(|| Dataset::empty(role));
            if !dataset.is_empty() {
                dataset.file_name = self.load_file_name(role);
                dataset.id = self.assign_id();
                summary.restored.push(role);
                debug!("restored {} rows for {}", dataset.rows.len(), role);
            }
            *self.slot_mut(role) = dataset;
        }

        self.markers = self.load_markers();
        self.markers_origin = Some(self.slot(self.geodata_role).id);
        summary
    }

    fn load_file_name(&self, role: Role) -> Option<String> {
        let key = role.name_key();
        match self.kv.get(&key) {
            Ok(Some(text)) => serde_json::from_str::<String>(&text)
                .map_err(|e| warn!("ignoring unreadable {}: {}", key, e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("failed to load {}: {}", key, e);
                None
            }
        }
    }

    /// Stored markers when readable, otherwise re-derived from the restored rows.
    fn load_markers(&self) -> Vec<Marker> {
        let key = self.geodata_role.markers_key();
        let rows = &self.slot(self.geodata_role).rows;
        match self.kv.get(&key) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<Marker>>(&text) {
                Ok(markers) => return markers,
                Err(e) => warn!("re-deriving markers, stored {} unreadable: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => warn!("re-deriving markers, failed to load {}: {}", key, e),
        }
        extract_markers(rows)
    }

    /// Replace the dataset for its role, derive markers if it is the geodata
    /// role, and write both to the backend. A failed write is reported in the
    /// returned status but never rolls back the in-memory copy.
    pub fn save(&mut self, mut dataset: Dataset) -> SaveReport {
        let role = dataset.role;
        let id = self.assign_id();
        dataset.id = id;

        let mut failures: Vec<String> = Vec::new();
        if let Err(e) = self.persist_dataset(&dataset) {
            error!("{}", e);
            failures.push(e.to_string());
        }
        *self.slot_mut(role) = dataset;

        let mut marker_count = 0;
        if let Some((origin, markers)) = self.derive_markers(role) {
            marker_count = markers.len();
            if self.apply_markers(role, origin, markers) {
                if let Err(e) = self.persist_markers() {
                    error!("{}", e);
                    failures.push(e.to_string());
                }
            }
        }

        let status = if failures.is_empty() {
            Status::Ok
        } else {
            Status::PersistenceFailure {
                message: failures.join("; "),
            }
        };
        SaveReport {
            id,
            markers: marker_count,
            status,
        }
    }

    fn persist_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        let role = dataset.role;
        let stored = StoredDataset {
            schema: dataset.schema.clone(),
            rows: dataset.rows.clone(),
        };
        let text = serde_json::to_string(&stored)?;
        self.kv.put(&role.data_key(), &text)?;
        match &dataset.file_name {
            Some(name) => self.kv.put(&role.name_key(), &serde_json::to_string(name)?),
            None => self.kv.delete(&role.name_key()),
        }
    }

    fn persist_markers(&mut self) -> Result<()> {
        let text = serde_json::to_string(&self.markers)?;
        self.kv.put(&self.geodata_role.markers_key(), &text)
    }

    /// Compute markers for the dataset currently in `role`, tagged with that
    /// dataset's id. `None` when `role` does not carry geodata.
    pub fn derive_markers(&self, role: Role) -> Option<(DatasetId, Vec<Marker>)> {
        if role != self.geodata_role {
            return None;
        }
        let dataset = self.slot(role);
        Some((dataset.id, extract_markers(&dataset.rows)))
    }

    /// Install markers derived from dataset `origin`. Ignored (returns false)
    /// when a newer dataset has replaced `origin` in the meantime.
    pub fn apply_markers(&mut self, role: Role, origin: DatasetId, markers: Vec<Marker>) -> bool {
        if role != self.geodata_role || self.slot(role).id != origin {
            debug!("dropping stale markers from dataset {:?}", origin);
            return false;
        }
        self.markers = markers;
        self.markers_origin = Some(origin);
        true
    }

    /// Remove `role` (or both roles when `None`) from memory and the backend.
    pub fn clear(&mut self, role: Option<Role>) -> Status {
        let roles: Vec<Role> = match role {
            Some(r) => vec![r],
            None => Role::ALL.to_vec(),
        };

        let mut failures = Vec::new();
        for role in roles {
            *self.slot_mut(role) = Dataset::empty(role);
            let mut keys = vec![role.data_key(), role.name_key()];
            if role == self.geodata_role {
                self.markers.clear();
                self.markers_origin = None;
                keys.push(role.markers_key());
            }
            for key in keys {
                if let Err(e) = self.kv.delete(&key) {
                    error!("{}", e);
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            Status::Ok
        } else {
            Status::PersistenceFailure {
                message: failures.join("; "),
            }
        }
    }
}

/// Accepts the `{schema, rows}` layout and the bare array-of-objects layout
/// written by earlier exports.
fn decode_dataset(role: Role, text: &str) -> Result<Dataset> {
    match serde_json::from_str::<StoredDataset>(text) {
        Ok(stored) => Ok(Dataset::new(role, stored.schema, stored.rows)),
        Err(e) => {
            let value: serde_json::Value = serde_json::from_str(text).map_err(|_| e)?;
            Dataset::from_json_records(role, &value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use pretty_assertions::assert_eq;

    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn put(&mut self, key: &str, _value: &str) -> Result<()> {
            Err(PipelineError::persistence(key, "quota exceeded"))
        }
        fn get(&self, key: &str) -> Result<Option<String>> {
            Err(PipelineError::persistence(key, "unavailable"))
        }
        fn delete(&mut self, key: &str) -> Result<()> {
            Err(PipelineError::persistence(key, "unavailable"))
        }
    }

    fn geo_dataset(lat: &str) -> Dataset {
        let schema = Schema::from_raw_headers(&["VirtualDistance (m)", "Latitude", "Longitude"]);
        let rows = vec![
            schema.row_from_values(vec![Value::text("0"), Value::text(lat), Value::text("77.1")]),
            schema.row_from_values(vec![Value::text("10"), Value::text("bad"), Value::text("77.2")]),
        ];
        Dataset::new(Role::Primary, schema, rows).with_file_name("xli.csv")
    }

    #[test]
    fn test_get_empty_role() {
        let store = DatasetStore::new(MemoryKv::new(), Role::Primary);
        assert!(store.get(Role::Secondary).is_empty());
        assert!(store.markers().is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut store = DatasetStore::new(MemoryKv::new(), Role::Primary);
        let ds = geo_dataset("12.5");
        let report = store.save(ds.clone());
        assert_eq!(report.status, Status::Ok);
        assert_eq!(report.markers, 1);

        let reopened = DatasetStore::open(store.kv().clone(), Role::Primary);
        let restored = reopened.get(Role::Primary);
        assert!(restored.same_content(&ds));
        assert_eq!(restored.file_name.as_deref(), Some("xli.csv"));
        assert_eq!(reopened.markers(), &[Marker { lat: 12.5, lng: 77.1 }]);
    }

    #[test]
    fn test_save_replaces_and_roles_are_independent() {
        let mut store = DatasetStore::new(MemoryKv::new(), Role::Primary);
        store.save(geo_dataset("1"));
        let schema = Schema::from_raw_headers(&["Chainage (m)"]);
        let ice = Dataset::new(Role::Secondary, schema.clone(), vec![schema.row_from_values(vec![Value::text("5")])]);
        store.save(ice.clone());
        store.save(geo_dataset("2"));

        assert_eq!(store.get(Role::Primary).rows.len(), 2);
        assert_eq!(store.markers(), &[Marker { lat: 2.0, lng: 77.1 }]);
        assert!(store.get(Role::Secondary).same_content(&ice));

        store.clear(Some(Role::Primary));
        assert!(store.get(Role::Primary).is_empty());
        assert!(store.markers().is_empty());
        assert!(store.get(Role::Secondary).same_content(&ice));
        assert_eq!(store.kv().get("datasetXLI").unwrap(), None);
        assert!(store.kv().get("datasetICE").unwrap().is_some());
    }

    #[test]
    fn test_stale_markers_are_dropped() {
        let mut store = DatasetStore::new(MemoryKv::new(), Role::Primary);
        store.save(geo_dataset("1"));
        let (old_id, old_markers) = store.derive_markers(Role::Primary).unwrap();
        store.save(geo_dataset("2"));
        assert!(!store.apply_markers(Role::Primary, old_id, old_markers));
        assert_eq!(store.markers(), &[Marker { lat: 2.0, lng: 77.1 }]);
    }

    #[test]
    fn test_secondary_role_has_no_markers() {
        let store = DatasetStore::new(MemoryKv::new(), Role::Primary);
        assert!(store.derive_markers(Role::Secondary).is_none());
    }

    #[test]
    fn test_corrupt_entry_falls_back_to_empty() {
        let mut kv = MemoryKv::new();
        kv.put("datasetXLI", "{not json").unwrap();
        kv.put("datasetICE", r#"[{"Chainage (m)": 1}]"#).unwrap();
        let mut store = DatasetStore::new(kv, Role::Primary);
        let summary = store.load();
        assert_eq!(summary.failures, vec!["datasetXLI".to_string()]);
        assert_eq!(summary.restored, vec![Role::Secondary]);
        assert!(store.get(Role::Primary).is_empty());
        assert_eq!(store.get(Role::Secondary).rows.len(), 1);
    }

    #[test]
    fn test_legacy_records_restore_in_file_column_order() {
        let mut kv = MemoryKv::new();
        kv.put("datasetICE", r#"[{"Elevation (m)": 5, "Chainage (m)": 1, "Area": "A"}]"#)
            .unwrap();
        let store = DatasetStore::open(kv, Role::Primary);
        assert_eq!(
            store.get(Role::Secondary).schema.names(),
            &["Elevation (m)", "Chainage (m)", "Area"]
        );
    }

    #[test]
    fn test_backend_failure_keeps_memory_copy() {
        let mut store = DatasetStore::open(BrokenKv, Role::Primary);
        assert!(store.get(Role::Primary).is_empty());
        let report = store.save(geo_dataset("3"));
        assert!(matches!(report.status, Status::PersistenceFailure { .. }));
        assert_eq!(store.get(Role::Primary).rows.len(), 2);
        assert_eq!(store.markers().len(), 1);
        assert!(matches!(store.clear(None), Status::PersistenceFailure { .. }));
        assert!(store.get(Role::Primary).is_empty());
    }

    #[test]
    fn test_file_kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = FileKv::new(dir.path().join("store"));
        assert_eq!(kv.get("datasetICE").unwrap(), None);
        kv.put("datasetICE", "[1]").unwrap();
        assert_eq!(kv.get("datasetICE").unwrap().as_deref(), Some("[1]"));
        kv.delete("datasetICE").unwrap();
        kv.delete("datasetICE").unwrap();
        assert_eq!(kv.get("datasetICE").unwrap(), None);
    }
}
