//! Domain store over the SQLite handle.

use super::{Database, db_err};
use crate::errors::ShipwrightResult;
use crate::image::LayerRecord;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub id: String,
    pub image: String,
    pub profile: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BootRecord {
    pub id: String,
    pub image: String,
    pub status: String,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Store for builds, layer cache keys, and boot attempts.
#[derive(Clone)]
pub struct BuildStore {
    db: Database,
}

impl BuildStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn record_build_started(
        &self,
        build_id: &str,
        image: &str,
        profile: &str,
    ) -> ShipwrightResult<()> {
        let now = Utc::now().to_rfc3339();
        db_err!(self.db.conn().execute(
            "INSERT INTO builds (id, image, profile, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'running', ?4, ?4)",
            params![build_id, image, profile, now],
        ))?;
        Ok(())
    }

    pub fn mark_build(&self, build_id: &str, status: &str) -> ShipwrightResult<()> {
        let now = Utc::now().to_rfc3339();
        db_err!(self.db.conn().execute(
            "UPDATE builds SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![build_id, status, now],
        ))?;
        Ok(())
    }

    /// Layer cache keys of the last successful build of `image`, by layer name.
    pub fn cached_layer_keys(&self, image: &str) -> ShipwrightResult<HashMap<String, String>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare(
            "SELECT name, key FROM layers WHERE image = ?1 ORDER BY position"
        ))?;
        let rows = db_err!(
            stmt.query_map(params![image], |row| Ok((row.get(0)?, row.get(1)?)))
        )?;
        let mut keys = HashMap::new();
        for row in rows {
            let (name, key): (String, String) = db_err!(row)?;
            keys.insert(name, key);
        }
        Ok(keys)
    }

    /// Replace the recorded layer chain for `image` with this build's layers.
    pub fn replace_layers(
        &self,
        image: &str,
        build_id: &str,
        layers: &[LayerRecord],
    ) -> ShipwrightResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.db.conn();
        let tx = db_err!(conn.transaction())?;
        db_err!(tx.execute("DELETE FROM layers WHERE image = ?1", params![image]))?;
        for (position, layer) in layers.iter().enumerate() {
            db_err!(tx.execute(
                "INSERT INTO layers (image, position, name, key, parent, build_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    image,
                    position as i64,
                    layer.name,
                    layer.key,
                    layer.parent,
                    build_id,
                    now
                ],
            ))?;
        }
        db_err!(tx.commit())?;
        Ok(())
    }

    /// Latest build per image, newest first.
    pub fn list_images(&self) -> ShipwrightResult<Vec<BuildRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare(
            "SELECT id, image, profile, status, created_at FROM builds
             WHERE created_at = (
                 SELECT MAX(b2.created_at) FROM builds b2 WHERE b2.image = builds.image
             )
             ORDER BY created_at DESC"
        ))?;
        let rows = db_err!(stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        }))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, image, profile, status, created_at) = db_err!(row)?;
            records.push(BuildRecord {
                id,
                image,
                profile,
                status,
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(records)
    }

    pub fn record_boot_started(&self, boot_id: &str, image: &str) -> ShipwrightResult<()> {
        let now = Utc::now().to_rfc3339();
        db_err!(self.db.conn().execute(
            "INSERT INTO boots (id, image, status, created_at, updated_at)
             VALUES (?1, ?2, 'created', ?3, ?3)",
            params![boot_id, image, now],
        ))?;
        Ok(())
    }

    pub fn update_boot(
        &self,
        boot_id: &str,
        status: &str,
        pid: Option<u32>,
        exit_code: Option<i32>,
    ) -> ShipwrightResult<()> {
        let now = Utc::now().to_rfc3339();
        db_err!(self.db.conn().execute(
            "UPDATE boots SET status = ?2, pid = ?3, exit_code = ?4, updated_at = ?5 WHERE id = ?1",
            params![boot_id, status, pid, exit_code, now],
        ))?;
        Ok(())
    }

    pub fn get_boot(&self, boot_id: &str) -> ShipwrightResult<Option<BootRecord>> {
        use rusqlite::OptionalExtension;
        let conn = self.db.conn();
        let row = db_err!(
            conn.query_row(
                "SELECT id, image, status, pid, exit_code, created_at FROM boots WHERE id = ?1",
                params![boot_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<u32>>(3)?,
                        row.get::<_, Option<i32>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
        )?;
        Ok(row.map(|(id, image, status, pid, exit_code, created_at)| BootRecord {
            id,
            image,
            status,
            pid,
            exit_code,
            created_at: parse_timestamp(&created_at),
        }))
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, BuildStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, BuildStore::new(db))
    }

    fn layer(name: &str, key: &str, parent: Option<&str>) -> LayerRecord {
        LayerRecord {
            name: name.into(),
            key: key.into(),
            parent: parent.map(Into::into),
            cached: false,
        }
    }

    #[test]
    fn layer_keys_round_trip() {
        let (_dir, store) = store();
        store.record_build_started("b1", "api", "production").unwrap();
        store
            .replace_layers(
                "api",
                "b1",
                &[layer("deps", "aa", None), layer("source", "bb", Some("aa"))],
            )
            .unwrap();
        store.mark_build("b1", "succeeded").unwrap();

        let keys = store.cached_layer_keys("api").unwrap();
        assert_eq!(keys.get("deps").map(String::as_str), Some("aa"));
        assert_eq!(keys.get("source").map(String::as_str), Some("bb"));
        assert!(store.cached_layer_keys("other").unwrap().is_empty());
    }

    #[test]
    fn replace_layers_overwrites_previous_chain() {
        let (_dir, store) = store();
        store.record_build_started("b1", "api", "production").unwrap();
        store
            .replace_layers("api", "b1", &[layer("deps", "aa", None)])
            .unwrap();
        store
            .replace_layers("api", "b2", &[layer("deps", "cc", None)])
            .unwrap();

        let keys = store.cached_layer_keys("api").unwrap();
        assert_eq!(keys.get("deps").map(String::as_str), Some("cc"));
    }

    #[test]
    fn boot_lifecycle_is_recorded() {
        let (_dir, store) = store();
        store.record_boot_started("boot1", "api").unwrap();
        store
            .update_boot("boot1", "migrating", None, None)
            .unwrap();
        store
            .update_boot("boot1", "failed", None, Some(12))
            .unwrap();

        let record = store.get_boot("boot1").unwrap().unwrap();
        assert_eq!(record.status, "failed");
        assert_eq!(record.exit_code, Some(12));
    }

    #[test]
    fn list_images_returns_latest_build() {
        let (_dir, store) = store();
        store.record_build_started("b1", "api", "production").unwrap();
        store.mark_build("b1", "succeeded").unwrap();

        let images = store.list_images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image, "api");
        assert_eq!(images[0].status, "succeeded");
    }
}
