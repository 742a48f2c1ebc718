//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Writes that read the previous record first (index maintenance and the
//! conditional writes) are serialized by a writer lock; plain reads are not.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexswap_core::{OwnerId, SessionId};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{SessionStatus, SwapSession};
use crate::{apply_transition, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Write a session and its index entries. Caller must hold `write_lock`.
    fn write_locked(&self, session: &SwapSession, previous: Option<SessionStatus>) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_owner = self.cf(cf::SESSIONS_BY_OWNER)?;
        let cf_by_status = self.cf(cf::SESSIONS_BY_STATUS)?;

        let session_key = keys::session_key(&session.session_id);
        let owner_key = keys::owner_session_key(&session.owner, &session.session_id);
        let status_key = keys::status_session_key(session.status.as_u8(), &session.session_id);
        let value = Self::serialize(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_sessions, &session_key, &value);
        batch.put_cf(&cf_by_owner, &owner_key, []);

        if let Some(old) = previous {
            if old != session.status {
                let old_key = keys::status_session_key(old.as_u8(), &session.session_id);
                batch.delete_cf(&cf_by_status, &old_key);
            }
        }
        batch.put_cf(&cf_by_status, &status_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Collect the sessions referenced by an index prefix scan.
    fn scan_index(
        &self,
        cf_name: &str,
        prefix: &[u8],
        decode: fn(&[u8]) -> Result<SessionId>,
    ) -> Result<Vec<SwapSession>> {
        let cf_index = self.cf(cf_name)?;

        let mut sessions = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop once we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            let session_id = decode(&key)?;
            if let Some(session) = self.get_session(&session_id)? {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }
}

impl Store for RocksStore {
    fn put_session(&self, session: &SwapSession) -> Result<()> {
        let _guard = self.write_lock.lock();
        let previous = self.get_session(&session.session_id)?.map(|s| s.status);
        self.write_locked(session, previous)
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<SwapSession>> {
        let cf = self.cf(cf::SESSIONS)?;
        let key = keys::session_key(session_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_owner = self.cf(cf::SESSIONS_BY_OWNER)?;
        let cf_by_status = self.cf(cf::SESSIONS_BY_STATUS)?;

        let session = self.get_session(session_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_sessions, keys::session_key(session_id));
        batch.delete_cf(
            &cf_by_owner,
            keys::owner_session_key(&session.owner, session_id),
        );
        batch.delete_cf(
            &cf_by_status,
            keys::status_session_key(session.status.as_u8(), session_id),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_sessions_by_owner(&self, owner: &OwnerId) -> Result<Vec<SwapSession>> {
        self.scan_index(
            cf::SESSIONS_BY_OWNER,
            &keys::owner_prefix(owner),
            keys::session_id_from_owner_key,
        )
    }

    fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<SwapSession>> {
        self.scan_index(
            cf::SESSIONS_BY_STATUS,
            &keys::status_prefix(status.as_u8()),
            keys::session_id_from_status_key,
        )
    }

    fn list_all_sessions(&self) -> Result<Vec<SwapSession>> {
        let cf = self.cf(cf::SESSIONS)?;

        let mut sessions = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            sessions.push(Self::deserialize(&value)?);
        }

        Ok(sessions)
    }

    fn update_if_processing(&self, session: &SwapSession) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match self.get_session(&session.session_id)? {
            Some(stored) if stored.status == SessionStatus::Processing => {
                self.write_locked(session, Some(stored.status))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn transition_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SwapSession>> {
        let _guard = self.write_lock.lock();
        let mut session = self.get_session(session_id)?.ok_or(StoreError::NotFound)?;
        let previous = session.status;

        if !apply_transition(&mut session, status, message, now) {
            return Ok(None);
        }

        self.write_locked(&session, Some(previous))?;
        tracing::debug!(session_id = %session_id, status = %status, "Session status persisted");
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleSwapTarget;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_session(owner: &OwnerId) -> SwapSession {
        SwapSession::new(
            *owner,
            vec![ModuleSwapTarget::from_input("80271", "80275, 80276")],
            Utc::now(),
            chrono::Duration::hours(2),
        )
    }

    #[test]
    fn session_crud() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::from_bytes([1u8; 32]);
        let session = create_test_session(&owner);

        store.put_session(&session).unwrap();

        let retrieved = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(retrieved.targets, session.targets);
        assert_eq!(retrieved.status, SessionStatus::Processing);

        store.delete_session(&session.session_id).unwrap();
        assert!(store.get_session(&session.session_id).unwrap().is_none());
        assert!(matches!(
            store.delete_session(&session.session_id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_sessions_by_owner() {
        let (store, _dir) = create_test_store();
        let alice = OwnerId::from_bytes([1u8; 32]);
        let bob = OwnerId::from_bytes([2u8; 32]);

        for _ in 0..3 {
            store.put_session(&create_test_session(&alice)).unwrap();
        }
        store.put_session(&create_test_session(&bob)).unwrap();

        assert_eq!(store.list_sessions_by_owner(&alice).unwrap().len(), 3);
        assert_eq!(store.list_sessions_by_owner(&bob).unwrap().len(), 1);
        assert_eq!(store.list_all_sessions().unwrap().len(), 4);
    }

    #[test]
    fn status_index_follows_transitions() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::from_bytes([1u8; 32]);
        let session = create_test_session(&owner);
        store.put_session(&session).unwrap();

        assert_eq!(
            store
                .list_sessions_by_status(SessionStatus::Processing)
                .unwrap()
                .len(),
            1
        );

        store
            .transition_status(&session.session_id, SessionStatus::Stopped, "stopped", Utc::now())
            .unwrap()
            .unwrap();

        assert!(store
            .list_sessions_by_status(SessionStatus::Processing)
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .list_sessions_by_status(SessionStatus::Stopped)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn transition_happens_once() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::from_bytes([1u8; 32]);
        let session = create_test_session(&owner);
        store.put_session(&session).unwrap();

        let first = store
            .transition_status(&session.session_id, SessionStatus::Stopped, "stopped", Utc::now())
            .unwrap();
        assert!(first.unwrap().finished_at.is_some());

        let second = store
            .transition_status(&session.session_id, SessionStatus::TimedOut, "late", Utc::now())
            .unwrap();
        assert!(second.is_none());

        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Stopped);
        assert_eq!(stored.message, "stopped");
    }

    #[test]
    fn update_if_processing_respects_terminal_state() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::from_bytes([1u8; 32]);
        let mut session = create_test_session(&owner);
        store.put_session(&session).unwrap();

        session.targets[0].message = "Index 80275, 80276 have no vacancies.".to_string();
        assert!(store.update_if_processing(&session).unwrap());

        store
            .transition_status(&session.session_id, SessionStatus::Stopped, "stopped", Utc::now())
            .unwrap();

        session.targets[0].swapped = true;
        assert!(!store.update_if_processing(&session).unwrap());

        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Stopped);
        assert!(!stored.targets[0].swapped);
    }

    #[test]
    fn update_if_processing_on_missing_session() {
        let (store, _dir) = create_test_store();
        let session = create_test_session(&OwnerId::from_bytes([1u8; 32]));
        assert!(!store.update_if_processing(&session).unwrap());
        assert!(store.get_session(&session.session_id).unwrap().is_none());
    }

    #[test]
    fn sessions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let owner = OwnerId::from_bytes([7u8; 32]);
        let session = create_test_session(&owner);

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.put_session(&session).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let reloaded = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(reloaded.owner, owner);
        assert_eq!(reloaded.deadline_at, session.deadline_at);
    }
}
