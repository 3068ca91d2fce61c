//! Box record storage.

use rusqlite::{ErrorCode, OptionalExtension, params};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use super::{Database, db_err};
use crate::sandbox::{BoxConfig, BoxState};

/// Box records keyed by id, with a unique optional name.
#[derive(Clone)]
pub(crate) struct BoxStore {
    db: Database,
}

type Row = (String, String);

impl BoxStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record. A taken name maps to `NameConflict`.
    pub(crate) fn add(&self, config: &BoxConfig, state: &BoxState) -> BoxleaseResult<()> {
        let config_json = to_json(config)?;
        let state_json = to_json(state)?;
        let conn = self.db.conn();

        let result = conn.execute(
            "INSERT INTO boxes (id, name, created_at, status, config, state) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                config.id,
                config.name,
                config.created_at.to_rfc3339(),
                state.status.as_str(),
                config_json,
                state_json
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation && config.name.is_some() =>
            {
                Err(BoxleaseError::NameConflict(
                    config.name.clone().unwrap_or_default(),
                ))
            }
            Err(e) => Err(BoxleaseError::Database(e.to_string())),
        }
    }

    /// Persist a state change. Missing records map to `NotFound`.
    pub(crate) fn save_state(&self, id: &str, state: &BoxState) -> BoxleaseResult<()> {
        let state_json = to_json(state)?;
        let conn = self.db.conn();
        let updated = db_err!(conn.execute(
            "UPDATE boxes SET status = ?1, state = ?2 WHERE id = ?3",
            params![state.status.as_str(), state_json, id],
        ))?;
        if updated == 0 {
            return Err(BoxleaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Look a record up by exact id or by name.
    pub(crate) fn find(&self, id_or_name: &str) -> BoxleaseResult<Option<(BoxConfig, BoxState)>> {
        let conn = self.db.conn();
        let row: Option<Row> = db_err!(
            conn.query_row(
                "SELECT config, state FROM boxes WHERE id = ?1 OR name = ?1 ORDER BY id = ?1 DESC LIMIT 1",
                params![id_or_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        )?;
        row.map(decode).transpose()
    }

    pub(crate) fn name_exists(&self, name: &str) -> BoxleaseResult<bool> {
        let conn = self.db.conn();
        let count: i64 = db_err!(conn.query_row(
            "SELECT COUNT(*) FROM boxes WHERE name = ?1",
            params![name],
            |row| row.get(0)
        ))?;
        Ok(count > 0)
    }

    /// All records, newest first. Ids are ULIDs, so id order is creation order.
    pub(crate) fn list(&self) -> BoxleaseResult<Vec<(BoxConfig, BoxState)>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT config, state FROM boxes ORDER BY id DESC"))?;
        let rows = db_err!(stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?))))?;

        let mut records = Vec::new();
        for row in rows {
            let row: Row = db_err!(row)?;
            records.push(decode(row)?);
        }
        Ok(records)
    }

    /// Delete a record. Returns whether a row existed.
    pub(crate) fn remove(&self, id: &str) -> BoxleaseResult<bool> {
        let conn = self.db.conn();
        let deleted = db_err!(conn.execute("DELETE FROM boxes WHERE id = ?1", params![id]))?;
        Ok(deleted > 0)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> BoxleaseResult<String> {
    serde_json::to_string(value)
        .map_err(|e| BoxleaseError::Database(format!("failed to serialize record: {}", e)))
}

fn decode((config, state): Row) -> BoxleaseResult<(BoxConfig, BoxState)> {
    let config: BoxConfig = serde_json::from_str(&config)
        .map_err(|e| BoxleaseError::Database(format!("corrupt box config: {}", e)))?;
    let state: BoxState = serde_json::from_str(&state)
        .map_err(|e| BoxleaseError::Database(format!("corrupt box state: {}", e)))?;
    Ok((config, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::options::BoxOptions;
    use crate::sandbox::BoxStatus;
    use chrono::Utc;
    use std::path::PathBuf;

    fn store() -> BoxStore {
        BoxStore::new(Database::open_in_memory().unwrap())
    }

    fn config(id: &str, name: Option<&str>) -> BoxConfig {
        BoxConfig {
            id: id.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
            image: "docker.io/library/alpine:latest".into(),
            cpus: 1,
            memory_mib: 512,
            options: BoxOptions::default(),
            box_home: PathBuf::from("/tmp").join(id),
            rootfs_dir: PathBuf::from("/tmp").join(id).join("rootfs"),
        }
    }

    #[test]
    fn test_add_and_find_by_id_and_name() {
        let store = store();
        store
            .add(&config("01A", Some("n1")), &BoxState::new())
            .unwrap();

        let (by_id, _) = store.find("01A").unwrap().unwrap();
        let (by_name, _) = store.find("n1").unwrap().unwrap();
        assert_eq!(by_id.id, "01A");
        assert_eq!(by_name.id, "01A");
        assert!(store.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_is_conflict() {
        let store = store();
        store
            .add(&config("01A", Some("web")), &BoxState::new())
            .unwrap();
        let err = store
            .add(&config("01B", Some("web")), &BoxState::new())
            .unwrap_err();
        assert!(matches!(err, BoxleaseError::NameConflict(ref n) if n == "web"));
        assert!(store.name_exists("web").unwrap());
    }

    #[test]
    fn test_unnamed_boxes_do_not_conflict() {
        let store = store();
        store.add(&config("01A", None), &BoxState::new()).unwrap();
        store.add(&config("01B", None), &BoxState::new()).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_save_state_persists_status() {
        let store = store();
        store.add(&config("01A", None), &BoxState::new()).unwrap();

        let mut state = BoxState::new();
        state.transition_to(BoxStatus::Running).unwrap();
        state.set_pid(Some(77));
        store.save_state("01A", &state).unwrap();

        let (_, loaded) = store.find("01A").unwrap().unwrap();
        assert_eq!(loaded.status, BoxStatus::Running);
        assert_eq!(loaded.pid, Some(77));
    }

    #[test]
    fn test_save_state_missing_record() {
        let store = store();
        let err = store.save_state("nope", &BoxState::new()).unwrap_err();
        assert!(matches!(err, BoxleaseError::NotFound(_)));
    }

    #[test]
    fn test_list_newest_first() {
        let store = store();
        for id in ["01A", "01C", "01B"] {
            store.add(&config(id, None), &BoxState::new()).unwrap();
        }
        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        assert_eq!(ids, vec!["01C", "01B", "01A"]);
    }

    #[test]
    fn test_remove_frees_name() {
        let store = store();
        store
            .add(&config("01A", Some("tmp")), &BoxState::new())
            .unwrap();
        assert!(store.remove("01A").unwrap());
        assert!(!store.remove("01A").unwrap());
        assert!(!store.name_exists("tmp").unwrap());
        store
            .add(&config("01B", Some("tmp")), &BoxState::new())
            .unwrap();
    }
}
