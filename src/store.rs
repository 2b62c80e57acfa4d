use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist {collection} to {path}: {source}")]
    Persist {
        collection: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {collection}: {source}")]
    Serialize {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{collection} at {path} is not a valid record array: {source}")]
    Corrupt {
        collection: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid fields for {collection}: {source}")]
    InvalidPatch {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A record kept in one JSON array file per collection.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// File stem of the backing collection.
    const COLLECTION: &'static str;
    /// Prefix of every generated `_id`; identity dispatch relies on it.
    const ID_PREFIX: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// Fill creation-time defaults such as `createdAt`.
    fn on_create(&mut self, _now: DateTime<Utc>) {}

    /// Relative file reference owned by this record.
    fn attachment(&self) -> Option<&str> {
        None
    }
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `<prefix><millis>`, bumped past the last issued value so two ids handed out
/// in the same millisecond still differ.
pub fn next_id(prefix: &str) -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::SeqCst);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_ID_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => return format!("{}{}", prefix, candidate),
            Err(actual) => last = actual,
        }
    }
}

/// Result of a closure run under the collection's write lock.
pub enum Mutation<R> {
    Changed(R),
    Unchanged(R),
}

pub struct JsonStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> JsonStore<T> {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(format!("{}.json", T::COLLECTION)),
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    /// Whole collection in file order. Absent or unreadable files read as empty.
    pub fn list(&self) -> Vec<T> {
        load_collection(&self.path, T::COLLECTION)
    }

    pub fn get_by_id(&self, id: &str) -> Option<T> {
        self.list().into_iter().find(|r| r.id() == id)
    }

    pub fn add(&self, mut record: T) -> Result<T, StoreError> {
        self.transact(move |items| {
            record.set_id(next_id(T::ID_PREFIX));
            record.on_create(Utc::now());
            items.push(record.clone());
            Ok(Mutation::Changed(record))
        })
    }

    /// Shallow merge of `patch` onto the record with `id`. `None` when no record matched.
    pub fn update(&self, id: &str, patch: &serde_json::Value) -> Result<Option<T>, StoreError> {
        self.transact(|items| {
            let Some(slot) = items.iter_mut().find(|r| r.id() == id) else {
                return Ok(Mutation::Unchanged(None));
            };
            let merged = shallow_merge(slot, patch)?;
            *slot = merged.clone();
            Ok(Mutation::Changed(Some(merged)))
        })
    }

    /// Removes the record with `id`, returning it.
    pub fn remove(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.transact(|items| {
            let Some(pos) = items.iter().position(|r| r.id() == id) else {
                return Ok(Mutation::Unchanged(None));
            };
            Ok(Mutation::Changed(Some(items.remove(pos))))
        })
    }

    /// Index 0 of a singleton collection.
    pub fn first(&self) -> Option<T> {
        self.list().into_iter().next()
    }

    /// Singleton write: creates the record on first use, merges into index 0 afterwards.
    pub fn upsert_first(&self, patch: &serde_json::Value) -> Result<T, StoreError> {
        self.transact(|items| {
            if let Some(current) = items.first_mut() {
                let merged = shallow_merge(current, patch)?;
                *current = merged.clone();
                return Ok(Mutation::Changed(merged));
            }
            let mut created: T =
                serde_json::from_value(strip_nulls(patch)).map_err(|source| {
                    StoreError::InvalidPatch {
                        collection: T::COLLECTION,
                        source,
                    }
                })?;
            created.set_id(next_id(T::ID_PREFIX));
            created.on_create(Utc::now());
            items.push(created.clone());
            Ok(Mutation::Changed(created))
        })
    }

    /// Read-modify-write of the whole collection under this store's lock.
    /// The file is rewritten only when the closure reports a change, and never
    /// when the current file cannot be read back.
    pub fn transact<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> Result<Mutation<R>, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut items = load_strict(&self.path, T::COLLECTION).map_err(|e| {
            error!(collection = T::COLLECTION, "refusing to rewrite collection: {e}");
            e
        })?;
        match f(&mut items)? {
            Mutation::Unchanged(r) => Ok(r),
            Mutation::Changed(r) => {
                self.save(&items)?;
                Ok(r)
            }
        }
    }

    fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(items).map_err(|source| StoreError::Serialize {
            collection: T::COLLECTION,
            source,
        })?;
        write_atomic(&self.path, text.as_bytes()).map_err(|source| {
            error!(collection = T::COLLECTION, path = %self.path.display(), "persist failed: {source}");
            StoreError::Persist {
                collection: T::COLLECTION,
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(collection = T::COLLECTION, count = items.len(), "collection saved");
        Ok(())
    }
}

/// Absent or blank files are an empty collection; anything else that does not
/// read back as a record array is an error.
fn load_strict<T: DeserializeOwned>(path: &Path, collection: &'static str) -> Result<Vec<T>, StoreError> {
    let text = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(collection, "collection file absent, treating as empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(StoreError::Persist {
                collection,
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
        collection,
        path: path.to_path_buf(),
        source,
    })
}

fn load_collection<T: DeserializeOwned>(path: &Path, collection: &'static str) -> Vec<T> {
    load_strict(path, collection).unwrap_or_else(|e| {
        warn!(collection, "treating collection as empty: {e}");
        Vec::new()
    })
}

/// Writes to a sibling temp file then renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Fields present and non-null in `patch` overwrite; everything else is kept.
/// `_id` is never taken from a patch.
pub fn shallow_merge<T: Record>(existing: &T, patch: &serde_json::Value) -> Result<T, StoreError> {
    let mut base = serde_json::to_value(existing).map_err(|source| StoreError::Serialize {
        collection: T::COLLECTION,
        source,
    })?;
    if let (Some(target), Some(fields)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            if key == "_id" || value.is_null() {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(base).map_err(|source| StoreError::InvalidPatch {
        collection: T::COLLECTION,
        source,
    })
}

/// Copy of an object without `_id` and null fields.
pub fn strip_nulls(patch: &serde_json::Value) -> serde_json::Value {
    match patch.as_object() {
        Some(fields) => serde_json::Value::Object(
            fields
                .iter()
                .filter(|(k, v)| k.as_str() != "_id" && !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        None => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{NoticeRecord, OverviewRecord, StudentRecord};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn student(name: &str, roll: &str) -> StudentRecord {
        StudentRecord {
            name: name.to_string(),
            roll_number: roll.to_string(),
            class: "X".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_lists_empty() {
        let dir = temp_dir("colleged-store-missing");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        assert!(store.list().is_empty());
        assert!(store.get_by_id("student_1").is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_file_lists_empty() {
        let dir = temp_dir("colleged-store-corrupt");
        std::fs::write(dir.join("students.json"), "{ not json").expect("write corrupt");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        assert!(store.list().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unreadable_collection_is_never_rewritten() {
        let dir = temp_dir("colleged-store-corrupt-write");
        let seeded = r#"[{"_id":"student_1","name":"A","rollNumber":"R1","class":10}]"#;
        let path = dir.join("students.json");
        std::fs::write(&path, seeded).expect("seed");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        assert!(store.list().is_empty());

        assert!(matches!(
            store.add(student("C", "R3")),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            store.update("student_1", &json!({ "name": "B" })),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            store.remove("student_1"),
            Err(StoreError::Corrupt { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), seeded);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn legacy_branch_and_unknown_fields_survive_writes() {
        let dir = temp_dir("colleged-store-legacy");
        std::fs::write(
            dir.join("students.json"),
            r#"[
                {"_id":"student_1","name":"A","rollNumber":"R1","class":"X","branch":"CS"},
                {"_id":"student_2","name":"B","rollNumber":"R2","class":"X","branch":"Mechanical","email":"b@x.org"}
            ]"#,
        )
        .expect("seed");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        assert_eq!(store.list().len(), 2);

        store.add(student("C", "R3")).expect("add");
        let updated = store
            .update("student_1", &json!({ "email": "a@x.org" }))
            .expect("update")
            .expect("matched");
        assert_eq!(updated.extra.get("email"), Some(&json!("a@x.org")));

        let all = store.list();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].extra.get("email"), Some(&json!("a@x.org")));
        assert_eq!(all[1].branch.as_deref(), Some("Mechanical"));
        assert_eq!(all[1].extra.get("email"), Some(&json!("b@x.org")));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = temp_dir("colleged-store-persist");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        let a = store.add(student("A", "R1")).expect("add a");
        let path = dir.join("students.json");
        let before = std::fs::read_to_string(&path).expect("read");

        // The temp file slot is taken by a directory, so the write cannot land.
        std::fs::create_dir_all(dir.join("students.json.tmp")).expect("block tmp");
        assert!(matches!(
            store.add(student("B", "R2")),
            Err(StoreError::Persist { .. })
        ));
        assert!(matches!(
            store.update(&a.id, &json!({ "class": "XI" })),
            Err(StoreError::Persist { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
        assert_eq!(store.list(), vec![a]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn add_assigns_prefixed_id_and_round_trips() {
        let dir = temp_dir("colleged-store-add");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        let created = store.add(student("A", "R1")).expect("add");
        assert!(created.id.starts_with("student_"));
        assert!(created.id["student_".len()..].parse::<i64>().is_ok());
        assert_eq!(store.get_by_id(&created.id), Some(created.clone()));
        assert_eq!(store.list().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn ids_are_distinct_within_one_millisecond() {
        let a = next_id("x_");
        let b = next_id("x_");
        let c = next_id("x_");
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn update_merges_only_supplied_fields() {
        let dir = temp_dir("colleged-store-merge");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        let created = store.add(student("A", "R1")).expect("add");

        let updated = store
            .update(&created.id, &json!({ "class": "XI", "name": null, "_id": "student_0" }))
            .expect("update")
            .expect("matched");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.class, "XI");
        assert_eq!(updated.name, "A");
        assert_eq!(updated.roll_number, "R1");
        assert_eq!(store.get_by_id(&created.id), Some(updated));

        assert!(store
            .update("student_404", &json!({ "class": "XII" }))
            .expect("update miss")
            .is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn update_rejects_wrongly_typed_fields() {
        let dir = temp_dir("colleged-store-badpatch");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        let created = store.add(student("A", "R1")).expect("add");
        let res = store.update(&created.id, &json!({ "name": 12 }));
        assert!(matches!(res, Err(StoreError::InvalidPatch { .. })));
        assert_eq!(store.get_by_id(&created.id).map(|s| s.name), Some("A".to_string()));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = temp_dir("colleged-store-delete");
        let store: JsonStore<StudentRecord> = JsonStore::open(&dir);
        let a = store.add(student("A", "R1")).expect("add a");
        let b = store.add(student("B", "R2")).expect("add b");
        assert_eq!(store.remove(&a.id).expect("first delete"), Some(a.clone()));
        let after_first = store.list();
        assert_eq!(store.remove(&a.id).expect("second delete"), None);
        assert_eq!(store.list(), after_first);
        assert_eq!(after_first, vec![b]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn free_form_fields_survive_merge() {
        let dir = temp_dir("colleged-store-extra");
        let store: JsonStore<NoticeRecord> = JsonStore::open(&dir);
        let notice: NoticeRecord =
            serde_json::from_value(json!({ "title": "Exam", "pinned": true })).expect("notice");
        let created = store.add(notice).expect("add");
        assert!(created.created_at.is_some());
        let updated = store
            .update(&created.id, &json!({ "title": "Exam moved" }))
            .expect("update")
            .expect("matched");
        assert_eq!(updated.extra.get("pinned"), Some(&json!(true)));
        assert_eq!(updated.created_at, created.created_at);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn singleton_first_write_creates() {
        let dir = temp_dir("colleged-store-singleton");
        let store: JsonStore<OverviewRecord> = JsonStore::open(&dir);
        assert!(store.first().is_none());
        let created = store
            .upsert_first(&json!({ "title": "Welcome", "students": 1200 }))
            .expect("create");
        assert!(created.id.starts_with("overview_"));
        let merged = store
            .upsert_first(&json!({ "students": 1250 }))
            .expect("merge");
        assert_eq!(merged.id, created.id);
        assert_eq!(merged.content.get("title"), Some(&json!("Welcome")));
        assert_eq!(merged.content.get("students"), Some(&json!(1250)));
        assert_eq!(store.list().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
