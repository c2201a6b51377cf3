use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::types::{Worker, WorkerDraft};

const WORKER_COLUMNS: &str = "id, name, ip, port, api_key, private_key, public_key, cidr";

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        name: row.get(1)?,
        ip: row.get(2)?,
        port: row.get(3)?,
        api_key: row.get(4)?,
        private_key: row.get(5)?,
        public_key: row.get(6)?,
        cidr: row.get(7)?,
    })
}

/// Persist a new worker and return the id assigned by the store
pub fn insert_worker(conn: &Connection, draft: &WorkerDraft) -> Result<i64> {
    conn.execute(
        "INSERT INTO workers (name, ip, port, api_key, private_key, public_key, cidr)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            draft.name,
            draft.ip,
            draft.port,
            draft.api_key,
            draft.private_key,
            draft.public_key,
            draft.cidr
        ],
    )
    .context("Failed to insert worker")?;

    Ok(conn.last_insert_rowid())
}

/// List all workers in ascending id order
pub fn list_workers(conn: &Connection) -> Result<Vec<Worker>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM workers ORDER BY id", WORKER_COLUMNS))
        .context("Failed to prepare statement")?;

    let workers = stmt
        .query_map([], worker_from_row)
        .context("Failed to query workers")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect workers")?;

    Ok(workers)
}

pub fn get_worker(conn: &Connection, id: i64) -> Result<Option<Worker>> {
    conn.query_row(
        &format!("SELECT {} FROM workers WHERE id = ?1", WORKER_COLUMNS),
        rusqlite::params![id],
        worker_from_row,
    )
    .optional()
    .context("Failed to get worker")
}

/// Overlay addresses currently held by workers (input to the allocator)
pub fn list_cidrs(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT cidr FROM workers WHERE cidr <> ''")
        .context("Failed to prepare statement")?;

    let cidrs = stmt
        .query_map([], |row| row.get(0))
        .context("Failed to query worker addresses")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect worker addresses")?;

    Ok(cidrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    fn draft(name: &str, cidr: &str) -> WorkerDraft {
        WorkerDraft {
            name: name.to_string(),
            ip: "192.168.1.10".to_string(),
            port: 8080,
            api_key: format!("key-{}", name),
            private_key: format!("priv-{}", name),
            public_key: format!("pub-{}", name),
            cidr: cidr.to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let dir = TempDir::new().unwrap();
        let pool = init_db(&dir.path().join("master.db")).unwrap();
        let conn = pool.get().unwrap();

        let a = insert_worker(&conn, &draft("a", "10.100.0.1/32")).unwrap();
        let b = insert_worker(&conn, &draft("b", "10.100.0.2/32")).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_list_and_get() {
        let dir = TempDir::new().unwrap();
        let pool = init_db(&dir.path().join("master.db")).unwrap();
        let conn = pool.get().unwrap();

        for (name, cidr) in [("a", "10.100.0.1/32"), ("b", "10.100.0.2/32")] {
            insert_worker(&conn, &draft(name, cidr)).unwrap();
        }

        let workers = list_workers(&conn).unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].id, 1);
        assert_eq!(workers[0].name, "a");
        assert_eq!(workers[1].public_key, "pub-b");

        let b = get_worker(&conn, 2).unwrap().unwrap();
        assert_eq!(b, workers[1]);
        assert!(get_worker(&conn, 99).unwrap().is_none());

        assert_eq!(
            list_cidrs(&conn).unwrap(),
            vec!["10.100.0.1/32".to_string(), "10.100.0.2/32".to_string()]
        );
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.db");

        {
            let pool = init_db(&path).unwrap();
            let conn = pool.get().unwrap();
            insert_worker(&conn, &draft("a", "10.100.0.1/32")).unwrap();
        }

        let pool = init_db(&path).unwrap();
        let conn = pool.get().unwrap();
        let workers = list_workers(&conn).unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].cidr, "10.100.0.1/32");
    }
}
