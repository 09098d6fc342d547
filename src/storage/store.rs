//! Record store.
//!
//! The database itself lives outside this crate. `RecordStore` is the seam
//! the triage workflows read and write through; `InMemoryStore` backs tests
//! and embedding hosts that keep records in process.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::StoreError;

use super::models::{Bucket, Bug, BugProvider, Collection, CrashEntry, Repository};

/// Persistence operations used by the triage workflows.
pub trait RecordStore: Send + Sync {
    fn crash_entry(&self, pk: i64) -> Result<CrashEntry, StoreError>;
    /// Insert or update; returns the primary key.
    fn save_crash_entry(&self, entry: &CrashEntry) -> Result<i64, StoreError>;

    fn bucket(&self, pk: i64) -> Result<Bucket, StoreError>;
    fn buckets(&self) -> Result<Vec<Bucket>, StoreError>;
    fn save_bucket(&self, bucket: &Bucket) -> Result<i64, StoreError>;
    /// Delete a bucket and clear the bucket reference of its entries.
    /// Returns the number of orphaned entries.
    fn delete_bucket(&self, pk: i64) -> Result<usize, StoreError>;

    fn bug(&self, pk: i64) -> Result<Bug, StoreError>;
    fn save_bug(&self, bug: &Bug) -> Result<i64, StoreError>;

    fn bug_provider(&self, pk: i64) -> Result<BugProvider, StoreError>;
    fn save_bug_provider(&self, provider: &BugProvider) -> Result<i64, StoreError>;

    fn repository(&self, pk: i64) -> Result<Repository, StoreError>;
    fn save_repository(&self, repository: &Repository) -> Result<i64, StoreError>;

    fn collection(&self, pk: i64) -> Result<Collection, StoreError>;
    fn save_collection(&self, collection: &Collection) -> Result<i64, StoreError>;
}

/// A row type with an optional primary key.
trait Row: Clone {
    const TABLE: &'static str;
    fn pk(&self) -> Option<i64>;
    fn set_pk(&mut self, pk: i64);
}

macro_rules! impl_row {
    ($ty:ty, $table:expr) => {
        impl Row for $ty {
            const TABLE: &'static str = $table;
            fn pk(&self) -> Option<i64> {
                self.pk
            }
            fn set_pk(&mut self, pk: i64) {
                self.pk = Some(pk);
            }
        }
    };
}

impl_row!(CrashEntry, "crashentry");
impl_row!(Bucket, "bucket");
impl_row!(Bug, "bug");
impl_row!(BugProvider, "bugprovider");
impl_row!(Repository, "repository");
impl_row!(Collection, "collection");

#[derive(Debug)]
struct Table<T> {
    next_pk: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_pk: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Row> Table<T> {
    fn get(&self, pk: i64) -> Result<T, StoreError> {
        self.rows.get(&pk).cloned().ok_or(StoreError::NotFound {
            table: T::TABLE,
            pk,
        })
    }

    fn save(&mut self, row: &T) -> Result<i64, StoreError> {
        let pk = match row.pk() {
            Some(pk) if !self.rows.contains_key(&pk) => {
                return Err(StoreError::NotFound {
                    table: T::TABLE,
                    pk,
                })
            }
            Some(pk) => pk,
            None => {
                let pk = self.next_pk;
                self.next_pk += 1;
                pk
            }
        };
        let mut stored = row.clone();
        stored.set_pk(pk);
        self.rows.insert(pk, stored);
        Ok(pk)
    }
}

#[derive(Debug, Default)]
struct Tables {
    crash_entries: Table<CrashEntry>,
    buckets: Table<Bucket>,
    bugs: Table<Bug>,
    bug_providers: Table<BugProvider>,
    repositories: Table<Repository>,
    collections: Table<Collection>,
}

/// Process-local `RecordStore`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All crash entries currently assigned to `bucket_pk`.
    pub fn entries_in_bucket(&self, bucket_pk: i64) -> Vec<CrashEntry> {
        self.tables
            .lock()
            .crash_entries
            .rows
            .values()
            .filter(|entry| entry.bucket_id == Some(bucket_pk))
            .cloned()
            .collect()
    }
}

impl RecordStore for InMemoryStore {
    fn crash_entry(&self, pk: i64) -> Result<CrashEntry, StoreError> {
        self.tables.lock().crash_entries.get(pk)
    }

    fn save_crash_entry(&self, entry: &CrashEntry) -> Result<i64, StoreError> {
        self.tables.lock().crash_entries.save(&entry.unloaded())
    }

    fn bucket(&self, pk: i64) -> Result<Bucket, StoreError> {
        self.tables.lock().buckets.get(pk)
    }

    fn buckets(&self) -> Result<Vec<Bucket>, StoreError> {
        Ok(self.tables.lock().buckets.rows.values().cloned().collect())
    }

    fn save_bucket(&self, bucket: &Bucket) -> Result<i64, StoreError> {
        self.tables.lock().buckets.save(bucket)
    }

    fn delete_bucket(&self, pk: i64) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock();
        if tables.buckets.rows.remove(&pk).is_none() {
            return Err(StoreError::NotFound { table: "bucket", pk });
        }
        let mut orphaned = 0;
        for entry in tables.crash_entries.rows.values_mut() {
            if entry.bucket_id == Some(pk) {
                entry.bucket_id = None;
                orphaned += 1;
            }
        }
        Ok(orphaned)
    }

    fn bug(&self, pk: i64) -> Result<Bug, StoreError> {
        self.tables.lock().bugs.get(pk)
    }

    fn save_bug(&self, bug: &Bug) -> Result<i64, StoreError> {
        self.tables.lock().bugs.save(bug)
    }

    fn bug_provider(&self, pk: i64) -> Result<BugProvider, StoreError> {
        self.tables.lock().bug_providers.get(pk)
    }

    fn save_bug_provider(&self, provider: &BugProvider) -> Result<i64, StoreError> {
        self.tables.lock().bug_providers.save(provider)
    }

    fn repository(&self, pk: i64) -> Result<Repository, StoreError> {
        self.tables.lock().repositories.get(pk)
    }

    fn save_repository(&self, repository: &Repository) -> Result<i64, StoreError> {
        self.tables.lock().repositories.save(repository)
    }

    fn collection(&self, pk: i64) -> Result<Collection, StoreError> {
        self.tables.lock().collections.get(pk)
    }

    fn save_collection(&self, collection: &Collection) -> Result<i64, StoreError> {
        self.tables.lock().collections.save(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Client, Os, Platform, Product};

    fn entry() -> CrashEntry {
        CrashEntry::new(
            Platform { name: "x86-64".to_string() },
            Product { name: "mozilla-central".to_string(), version: None },
            Os { name: "linux".to_string(), version: None },
            Client { name: "fuzzer-01".to_string() },
        )
    }

    #[test]
    fn test_save_assigns_and_reuses_pk() {
        let store = InMemoryStore::new();
        let mut bucket = Bucket::new(r#"{"symptoms": []}"#, "first");
        let pk = bucket.save(&store).unwrap();
        assert_eq!(bucket.pk, Some(pk));

        bucket.short_description = "renamed".to_string();
        assert_eq!(bucket.save(&store).unwrap(), pk);
        assert_eq!(store.bucket(pk).unwrap().short_description, "renamed");
        assert_eq!(store.buckets().unwrap().len(), 1);
    }

    #[test]
    fn test_loaded_entry_has_unloaded_lists() {
        let store = InMemoryStore::new();
        let mut entry = entry();
        entry.set_env(vec!["PATH=/usr/bin".to_string()]).unwrap();
        entry.set_args(vec!["-v".to_string()]).unwrap();
        let pk = entry.save(&store).unwrap();
        assert!(entry.env_list().is_some());

        let mut loaded = store.crash_entry(pk).unwrap();
        assert!(loaded.env_list().is_none());
        assert!(loaded.args_list().is_none());
        assert_eq!(loaded.env_text(), entry.env_text());

        loaded.deserialize_fields().unwrap();
        assert_eq!(loaded.env_list().unwrap(), ["PATH=/usr/bin"]);
    }

    #[test]
    fn test_save_unknown_pk_fails() {
        let store = InMemoryStore::new();
        let mut bucket = Bucket::new("{}", "ghost");
        bucket.pk = Some(99);
        assert!(matches!(
            store.save_bucket(&bucket),
            Err(StoreError::NotFound { table: "bucket", pk: 99 })
        ));
    }

    #[test]
    fn test_delete_bucket_orphans_entries() {
        let store = InMemoryStore::new();
        let bucket_pk = Bucket::new("{}", "doomed").save(&store).unwrap();

        let mut first = entry();
        first.bucket_id = Some(bucket_pk);
        let first_pk = first.save(&store).unwrap();
        let mut second = entry();
        second.save(&store).unwrap();

        assert_eq!(store.entries_in_bucket(bucket_pk).len(), 1);
        assert_eq!(store.delete_bucket(bucket_pk).unwrap(), 1);
        assert_eq!(store.crash_entry(first_pk).unwrap().bucket_id, None);
        assert!(store.bucket(bucket_pk).is_err());
    }

    #[test]
    fn test_bucket_save_normalizes_signature() {
        let store = InMemoryStore::new();
        let crlf = Bucket::new("CRASH\r\nADDRESS\r\n", "crlf").save(&store).unwrap();
        let lf = Bucket::new("CRASH\nADDRESS\n", "lf").save(&store).unwrap();
        assert_eq!(
            store.bucket(crlf).unwrap().signature.as_bytes(),
            store.bucket(lf).unwrap().signature.as_bytes()
        );
    }
}
