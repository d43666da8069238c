//! SQLite-backed storage.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Storage, StorageError, StorageResult, TaskPatch};
use crate::task::{Task, TaskId, TaskResult, TaskStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    user_message TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    origin_chat_ref TEXT NOT NULL,
    origin_message_ref TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS task_results (
    task_id TEXT PRIMARY KEY REFERENCES tasks(id),
    success INTEGER NOT NULL,
    summary TEXT NOT NULL,
    files_changed TEXT NOT NULL DEFAULT '[]',
    commit_hash TEXT,
    screenshot_path TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at DESC);
"#;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        // journal_mode returns a row, so it cannot go through execute().
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::info!("SQLite storage initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(id: &str, millis: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::Corrupt {
            task_id: id.to_string(),
            reason: format!("invalid timestamp {}", millis),
        })
}

struct TaskRow {
    id: String,
    user_message: String,
    status: String,
    origin_chat_ref: String,
    origin_message_ref: String,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_message: row.get("user_message")?,
            status: row.get("status")?,
            origin_chat_ref: row.get("origin_chat_ref")?,
            origin_message_ref: row.get("origin_message_ref")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_task(self) -> StorageResult<Task> {
        let status = TaskStatus::parse(&self.status).ok_or_else(|| StorageError::Corrupt {
            task_id: self.id.clone(),
            reason: format!("unknown status '{}'", self.status),
        })?;
        let created_at = from_millis(&self.id, self.created_at)?;
        let updated_at = from_millis(&self.id, self.updated_at)?;
        Ok(Task {
            id: TaskId::from(self.id),
            user_message: self.user_message,
            status,
            origin_chat_ref: self.origin_chat_ref,
            origin_message_ref: self.origin_message_ref,
            created_at,
            updated_at,
        })
    }
}

struct ResultRow {
    task_id: String,
    success: bool,
    summary: String,
    files_changed: String,
    commit_hash: Option<String>,
    screenshot_path: Option<String>,
    error: Option<String>,
}

impl ResultRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get("task_id")?,
            success: row.get("success")?,
            summary: row.get("summary")?,
            files_changed: row.get("files_changed")?,
            commit_hash: row.get("commit_hash")?,
            screenshot_path: row.get("screenshot_path")?,
            error: row.get("error")?,
        })
    }

    fn into_result(self) -> StorageResult<TaskResult> {
        Ok(TaskResult {
            task_id: TaskId::from(self.task_id),
            success: self.success,
            summary: self.summary,
            files_changed: serde_json::from_str(&self.files_changed)?,
            commit_hash: self.commit_hash,
            screenshot_path: self.screenshot_path,
            error: self.error,
        })
    }
}

impl Storage for SqliteStorage {
    fn save_task(&self, task: &Task) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO tasks (id, user_message, status, origin_chat_ref, origin_message_ref, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id.as_str(),
                task.user_message,
                task.status.as_str(),
                task.origin_chat_ref,
                task.origin_message_ref,
                to_millis(task.created_at),
                to_millis(task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT * FROM tasks WHERE id = ?1",
                params![id.as_str()],
                TaskRow::read,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn update_task(&self, id: &TaskId, patch: TaskPatch) -> StorageResult<()> {
        let conn = self.conn()?;
        let now = to_millis(Utc::now());
        match patch.status {
            Some(status) => conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id.as_str()],
            )?,
            None => conn.execute(
                "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
                params![now, id.as_str()],
            )?,
        };
        Ok(())
    }

    fn list_tasks(&self, limit: usize, offset: usize) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], TaskRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_task()?);
        }
        Ok(out)
    }

    fn save_task_result(&self, result: &TaskResult) -> StorageResult<()> {
        let files_changed = serde_json::to_string(&result.files_changed)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO task_results (task_id, success, summary, files_changed, commit_hash, screenshot_path, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.task_id.as_str(),
                result.success,
                result.summary,
                files_changed,
                result.commit_hash,
                result.screenshot_path,
                result.error,
            ],
        )?;
        Ok(())
    }

    fn get_task_result(&self, task_id: &TaskId) -> StorageResult<Option<TaskResult>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT * FROM task_results WHERE task_id = ?1",
                params![task_id.as_str()],
                ResultRow::read,
            )
            .optional()?;
        row.map(ResultRow::into_result).transpose()
    }

    fn list_task_results(&self, limit: usize, offset: usize) -> StorageResult<Vec<TaskResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM task_results LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], ResultRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_result()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_task_lifecycle_persists() {
        let temp = tempdir().unwrap();
        let storage = SqliteStorage::open(&temp.path().join("tasks.sqlite")).unwrap();

        let task = Task::with_id("t-1".into(), "fix the footer", "chat-1", "msg-7");
        storage.save_task(&task).unwrap();

        let loaded = storage.get_task(&"t-1".into()).unwrap().unwrap();
        assert_eq!(loaded.user_message, "fix the footer");
        assert_eq!(loaded.origin_message_ref, "msg-7");
        assert_eq!(loaded.status, TaskStatus::Queued);
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            task.created_at.timestamp_millis()
        );

        storage
            .update_task(&"t-1".into(), TaskPatch::status(TaskStatus::Running))
            .unwrap();
        let loaded = storage.get_task(&"t-1".into()).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Running);

        assert!(storage.get_task(&"nope".into()).unwrap().is_none());
    }

    #[test]
    fn test_results_round_trip_and_overwrite() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .save_task(&Task::with_id("t-1".into(), "a", "c", "m"))
            .unwrap();

        let mut result = TaskResult::failed("t-1".into(), "first try");
        result.files_changed.insert("index.html".to_string());
        storage.save_task_result(&result).unwrap();

        let mut updated = result.clone();
        updated.success = true;
        updated.error = None;
        updated.commit_hash = Some("abc123".to_string());
        storage.save_task_result(&updated).unwrap();

        let all = storage.list_task_results(50, 0).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], updated);
        assert_eq!(
            storage.get_task_result(&"t-1".into()).unwrap(),
            Some(updated)
        );
    }

    #[test]
    fn test_list_tasks_newest_first_with_offset() {
        let storage = SqliteStorage::in_memory().unwrap();
        let first = Task::with_id("a".into(), "1", "c", "m");
        let mut second = Task::with_id("b".into(), "2", "c", "m");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        storage.save_task(&first).unwrap();
        storage.save_task(&second).unwrap();

        let ids: Vec<String> = storage
            .list_tasks(10, 0)
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(storage.list_tasks(10, 1).unwrap().len(), 1);
    }
}
