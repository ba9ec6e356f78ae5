use rusqlite::{Connection, ErrorCode, Result as SqliteResult, Row, params};
use serde::{Deserialize, Serialize};

use crate::base32::base32_encode;
use crate::migration::OtpRecord;
use crate::uri::provisioning_uri;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEntry {
    pub(crate) id: Option<i64>,
    pub(crate) name: String,
    pub(crate) secret: String,
    pub(crate) issuer: Option<String>,
    pub(crate) algorithm: String,
    pub(crate) digits: u32,
    pub(crate) kind: String,
    pub(crate) counter: u64,
    pub(crate) uri: String,
    pub(crate) created_at: String,
}

impl MigrationEntry {
    pub(crate) fn from_record(record: &OtpRecord) -> Self {
        Self {
            id: None,
            name: record.account.clone(),
            secret: base32_encode(&record.secret),
            issuer: if record.issuer.is_empty() { None } else { Some(record.issuer.clone()) },
            algorithm: record.algorithm.uri_name().to_string(),
            digits: record.digits.count() as u32,
            kind: record.kind.uri_name().to_string(),
            counter: record.counter,
            uri: provisioning_uri(record),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn from_row(row: &Row<'_>) -> SqliteResult<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            secret: row.get(2)?,
            issuer: {
                let issuer: String = row.get(3)?;
                if issuer.is_empty() { None } else { Some(issuer) }
            },
            algorithm: row.get(4)?,
            digits: row.get(5)?,
            kind: row.get(6)?,
            counter: row.get::<_, i64>(7)? as u64,
            uri: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, secret, issuer, algorithm, digits, kind, counter, uri, created_at FROM migration_entries";

// Local vault of imported credentials
pub struct MigrationDatabase {
    conn: Connection,
}

impl MigrationDatabase {
    pub(crate) fn new(db_path: &str) -> SqliteResult<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS migration_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                secret TEXT NOT NULL,
                issuer TEXT,
                algorithm TEXT NOT NULL,
                digits INTEGER NOT NULL,
                kind TEXT NOT NULL,
                counter INTEGER NOT NULL,
                uri TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    // Ok(false) when an entry with the same name already exists
    pub(crate) fn add_entry(&self, entry: &MigrationEntry) -> SqliteResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT INTO migration_entries (name, secret, issuer, algorithm, digits, kind, counter, uri, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.name,
                entry.secret,
                entry.issuer.as_deref().unwrap_or(""),
                entry.algorithm,
                entry.digits,
                entry.kind,
                entry.counter as i64,
                entry.uri,
                now,
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(name = %entry.name, "stored migration entry");
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                tracing::debug!(name = %entry.name, "entry already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // HOTP codes are single use, so each one shown moves the counter on
    pub(crate) fn advance_counter(&self, name: &str) -> SqliteResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE migration_entries SET counter = counter + 1 WHERE name = ?1",
            [name],
        )?;

        Ok(rows_affected > 0)
    }

    pub(crate) fn get_all_entries(&self) -> SqliteResult<Vec<MigrationEntry>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY name"))?;
        let entries = stmt.query_map([], MigrationEntry::from_row)?;
        entries.collect()
    }

    pub(crate) fn get_entry_by_name(&self, name: &str) -> SqliteResult<Option<MigrationEntry>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} WHERE name = ?1"))?;
        let mut entries = stmt.query_map([name], MigrationEntry::from_row)?;

        match entries.next() {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }

    pub(crate) fn delete_entry(&self, name: &str) -> SqliteResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM migration_entries WHERE name = ?1",
            [name],
        )?;

        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{Algorithm, Digits, OtpKind};

    fn record(account: &str, issuer: &str) -> OtpRecord {
        OtpRecord {
            secret: b"Hello!\xde\xad\xbe\xef".to_vec(),
            account: account.to_string(),
            issuer: issuer.to_string(),
            algorithm: Algorithm::Sha1,
            digits: Digits::Six,
            kind: OtpKind::Totp,
            counter: 0,
        }
    }

    #[test]
    fn entry_from_record_carries_base32_secret_and_uri() {
        let entry = MigrationEntry::from_record(&record("alice@example.com", "Example"));
        assert_eq!(entry.secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(entry.issuer.as_deref(), Some("Example"));
        assert_eq!(entry.digits, 6);
        assert!(entry.uri.starts_with("otpauth://totp/alice@example.com?secret=JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn stores_and_lists_entries_by_name() {
        let db = MigrationDatabase::open_in_memory().unwrap();
        db.add_entry(&MigrationEntry::from_record(&record("zed", "Z"))).unwrap();
        db.add_entry(&MigrationEntry::from_record(&record("amy", ""))).unwrap();

        let entries = db.get_all_entries().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["amy", "zed"]);
        assert_eq!(entries[0].issuer, None);
        assert!(entries[0].id.is_some());
    }

    #[test]
    fn rejects_duplicate_names() {
        let db = MigrationDatabase::open_in_memory().unwrap();
        let entry = MigrationEntry::from_record(&record("amy", "A"));
        assert!(db.add_entry(&entry).unwrap());
        assert!(!db.add_entry(&entry).unwrap());
        assert_eq!(db.get_all_entries().unwrap().len(), 1);
    }

    #[test]
    fn propagates_failures_other_than_duplicates() {
        let db = MigrationDatabase::open_in_memory().unwrap();
        db.conn.execute("DROP TABLE migration_entries", []).unwrap();

        let entry = MigrationEntry::from_record(&record("amy", "A"));
        assert!(db.add_entry(&entry).is_err());
    }

    #[test]
    fn advances_hotp_counter() {
        let db = MigrationDatabase::open_in_memory().unwrap();
        let mut hotp = record("amy", "A");
        hotp.kind = OtpKind::Hotp;
        hotp.counter = 7;
        db.add_entry(&MigrationEntry::from_record(&hotp)).unwrap();

        assert!(db.advance_counter("amy").unwrap());
        assert!(db.advance_counter("amy").unwrap());
        assert_eq!(db.get_entry_by_name("amy").unwrap().unwrap().counter, 9);
        assert!(!db.advance_counter("bob").unwrap());
    }

    #[test]
    fn gets_and_deletes_by_name() {
        let db = MigrationDatabase::open_in_memory().unwrap();
        db.add_entry(&MigrationEntry::from_record(&record("amy", "A"))).unwrap();

        let entry = db.get_entry_by_name("amy").unwrap().unwrap();
        assert_eq!(entry.secret, "JBSWY3DPEHPK3PXP");
        assert!(db.get_entry_by_name("bob").unwrap().is_none());

        assert!(db.delete_entry("amy").unwrap());
        assert!(!db.delete_entry("amy").unwrap());
    }
}
