//! SQLite-backed city storage.
//!
//! One table, `cities`, keyed by an autoincrement id with a case-insensitive
//! unique index on the canonical name. The connection sits behind a mutex so a
//! `CityStore` can be cloned into background tasks.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::{path::Path, sync::Arc};

use crate::{
    error::{StoreError, StoreResult},
    model::{City, NewCity},
};

const SCHEMA_VERSION: i64 = 3;

const CITY_COLUMNS: &str = "id, name, pinned, sort_order, name_ko, country";

/// Outcome of a single insert. A uniqueness conflict on the canonical name is
/// reported as `Duplicate`, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct CityStore {
    conn: Arc<Mutex<Connection>>,
}

impl CityStore {
    /// Open (or create) the store at `path`, migrating older schemas in place.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> StoreResult<Self> {
        migrate(&mut conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `op` against a clone of this store on tokio's blocking pool.
    ///
    /// Async callers go through here so SQLite work never runs on a runtime
    /// worker thread.
    pub async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&CityStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    fn row_to_city(row: &Row<'_>) -> rusqlite::Result<City> {
        Ok(City {
            id: row.get(0)?,
            name: row.get(1)?,
            pinned: row.get::<_, i64>(2)? != 0,
            sort_order: row.get(3)?,
            localized_name: row.get(4)?,
            country: row.get(5)?,
        })
    }

    fn query_cities(&self, sql: &str, args: impl rusqlite::Params) -> StoreResult<Vec<City>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, Self::row_to_city)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_city(&self, sql: &str, args: impl rusqlite::Params) -> StoreResult<Option<City>> {
        let conn = self.conn.lock();
        Ok(conn.query_row(sql, args, Self::row_to_city).optional()?)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<City>> {
        self.query_city(
            &format!("SELECT {CITY_COLUMNS} FROM cities WHERE id = ?1"),
            params![id],
        )
    }

    /// Exact, case-insensitive match on the canonical name.
    pub fn find_by_name(&self, name: &str) -> StoreResult<Option<City>> {
        self.query_city(
            &format!(
                "SELECT {CITY_COLUMNS} FROM cities WHERE name = ?1 COLLATE NOCASE LIMIT 1"
            ),
            params![name],
        )
    }

    /// Exact, case-insensitive match on either the canonical or the localized name.
    pub fn find_by_any_name(&self, name: &str) -> StoreResult<Option<City>> {
        self.query_city(
            &format!(
                "SELECT {CITY_COLUMNS} FROM cities
                 WHERE name = ?1 COLLATE NOCASE OR name_ko = ?1 COLLATE NOCASE
                 ORDER BY (name = ?1 COLLATE NOCASE) DESC, id ASC
                 LIMIT 1"
            ),
            params![name],
        )
    }

    /// Partial, case-insensitive match on either name.
    pub fn search(&self, fragment: &str) -> StoreResult<Vec<City>> {
        let pattern = format!("%{}%", escape_like(fragment.trim()));
        self.query_cities(
            &format!(
                "SELECT {CITY_COLUMNS} FROM cities
                 WHERE name LIKE ?1 ESCAPE '\\' OR name_ko LIKE ?1 ESCAPE '\\'
                 ORDER BY pinned DESC, sort_order ASC, name COLLATE NOCASE ASC"
            ),
            params![pattern],
        )
    }

    /// Insert a city, reporting a name conflict as [`InsertOutcome::Duplicate`].
    pub fn insert(&self, city: &NewCity) -> StoreResult<InsertOutcome> {
        let conn = self.conn.lock();
        let changed = insert_ignoring_conflict(&conn, city)?;

        if changed == 0 {
            tracing::debug!(name = %city.name, "insert suppressed by name conflict");
            return Ok(InsertOutcome::Duplicate);
        }

        let id = conn.last_insert_rowid();
        tracing::debug!(id, name = %city.name, "inserted city");
        Ok(InsertOutcome::Inserted(id))
    }

    /// Insert many cities in one transaction, skipping name conflicts.
    /// Returns the number of rows actually inserted.
    pub fn insert_all(&self, cities: &[NewCity]) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for city in cities {
            inserted += insert_ignoring_conflict(&tx, city)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn set_pinned(&self, id: i64, pinned: bool) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cities SET pinned = ?2 WHERE id = ?1",
            params![id, pinned as i64],
        )?;
        Ok(())
    }

    /// Fill in localized name and country only where they are still null.
    pub fn backfill_metadata(
        &self,
        id: i64,
        localized_name: Option<&str>,
        country: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cities
             SET name_ko = COALESCE(name_ko, ?2), country = COALESCE(country, ?3)
             WHERE id = ?1",
            params![id, localized_name, country],
        )?;
        Ok(())
    }

    /// Assign sort orders 0..n to `ids` in the given order, atomically.
    pub fn reorder(&self, ids: &[i64]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE cities SET sort_order = ?2 WHERE id = ?1")?;
            for (index, id) in ids.iter().enumerate() {
                stmt.execute(params![id, index as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Highest sort order among all cities, or -1 for an empty store.
    pub fn max_sort_order(&self) -> StoreResult<i64> {
        let conn = self.conn.lock();
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) FROM cities",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Every city, pinned first, then by sort order and name.
    pub fn list_all(&self) -> StoreResult<Vec<City>> {
        self.query_cities(
            &format!(
                "SELECT {CITY_COLUMNS} FROM cities
                 ORDER BY pinned DESC, sort_order ASC, name COLLATE NOCASE ASC"
            ),
            [],
        )
    }

    pub fn list_pinned(&self) -> StoreResult<Vec<City>> {
        self.query_cities(
            &format!(
                "SELECT {CITY_COLUMNS} FROM cities
                 WHERE pinned = 1
                 ORDER BY sort_order ASC, name COLLATE NOCASE ASC"
            ),
            [],
        )
    }
}

fn insert_ignoring_conflict(conn: &Connection, city: &NewCity) -> StoreResult<usize> {
    Ok(conn.execute(
        "INSERT OR IGNORE INTO cities (name, pinned, sort_order, name_ko, country)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            city.name,
            city.pinned as i64,
            city.sort_order,
            city.localized_name,
            city.country
        ],
    )?)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn table_exists(conn: &Connection) -> StoreResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cities'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// v1 had only `id, name, pinned`; v2 added `sort_order`; v3 added `name_ko`
/// and `country`. An unversioned existing table is treated as v1. All steps
/// and the version bump commit together or not at all.
fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let tx = conn.transaction()?;
    let mut version: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema(version));
    }

    if version == 0 {
        if table_exists(&tx)? {
            version = 1;
        } else {
            tx.execute_batch(
                r#"
                CREATE TABLE cities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    pinned INTEGER NOT NULL DEFAULT 0,
                    sort_order INTEGER NOT NULL DEFAULT 0,
                    name_ko TEXT,
                    country TEXT
                );
                "#,
            )?;
            version = SCHEMA_VERSION;
        }
    }

    if version == 1 {
        tracing::info!("migrating city store from v1 to v2");
        tx.execute_batch("ALTER TABLE cities ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0;")?;
        version = 2;
    }

    if version == 2 {
        tracing::info!("migrating city store from v2 to v3");
        tx.execute_batch(
            "ALTER TABLE cities ADD COLUMN name_ko TEXT;
             ALTER TABLE cities ADD COLUMN country TEXT;",
        )?;
        version = 3;
    }

    tx.execute_batch(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_cities_name ON cities(name COLLATE NOCASE);
         CREATE INDEX IF NOT EXISTS idx_cities_name_ko ON cities(name_ko COLLATE NOCASE);
         CREATE INDEX IF NOT EXISTS idx_cities_pinned_order ON cities(pinned DESC, sort_order ASC);
         PRAGMA user_version = {version};"
    ))?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned(name: &str, order: i64) -> NewCity {
        NewCity { pinned: true, sort_order: order, ..NewCity::named(name) }
    }

    #[test]
    fn insert_and_find_case_insensitive() {
        let store = CityStore::in_memory().unwrap();
        let outcome = store.insert(&pinned("Seoul", 0)).unwrap();
        let InsertOutcome::Inserted(id) = outcome else {
            panic!("expected insert, got {outcome:?}");
        };

        let found = store.find_by_name("seoul").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "Seoul");
        assert!(found.pinned);
    }

    #[test]
    fn duplicate_name_is_reported_not_raised() {
        let store = CityStore::in_memory().unwrap();
        store.insert(&NewCity::named("Busan")).unwrap();

        assert_eq!(store.insert(&NewCity::named("BUSAN")).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn find_by_any_name_matches_localized() {
        let store = CityStore::in_memory().unwrap();
        store
            .insert(&NewCity {
                localized_name: Some("서울".into()),
                country: Some("KR".into()),
                ..NewCity::named("Seoul")
            })
            .unwrap();

        let by_local = store.find_by_any_name("서울").unwrap().unwrap();
        assert_eq!(by_local.name, "Seoul");
        assert!(store.find_by_name("서울").unwrap().is_none());
    }

    #[test]
    fn search_is_partial_and_escapes_wildcards() {
        let store = CityStore::in_memory().unwrap();
        let cities = [NewCity::named("Seoul"), NewCity::named("Seongnam"), NewCity::named("Tokyo")];
        store.insert_all(&cities).unwrap();

        let hits: Vec<_> = store.search("SEO").unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(hits, vec!["Seongnam", "Seoul"]);
        assert!(store.search("%").unwrap().is_empty());
    }

    #[test]
    fn insert_all_skips_conflicts() {
        let store = CityStore::in_memory().unwrap();
        let inserted = store
            .insert_all(&[NewCity::named("Paris"), NewCity::named("paris"), NewCity::named("Rome")])
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn backfill_only_fills_nulls() {
        let store = CityStore::in_memory().unwrap();
        let InsertOutcome::Inserted(id) = store
            .insert(&NewCity { country: Some("JP".into()), ..NewCity::named("Tokyo") })
            .unwrap()
        else {
            panic!("expected insert");
        };

        store.backfill_metadata(id, Some("도쿄"), Some("XX")).unwrap();

        let city = store.get(id).unwrap().unwrap();
        assert_eq!(city.localized_name.as_deref(), Some("도쿄"));
        assert_eq!(city.country.as_deref(), Some("JP"));
    }

    #[test]
    fn max_sort_order_of_empty_store() {
        let store = CityStore::in_memory().unwrap();
        assert_eq!(store.max_sort_order().unwrap(), -1);

        store.insert(&pinned("Oslo", 7)).unwrap();
        assert_eq!(store.max_sort_order().unwrap(), 7);
    }

    #[test]
    fn reorder_round_trip() {
        let store = CityStore::in_memory().unwrap();
        let names = ["Seoul", "Busan", "Daegu", "Incheon"];
        for (i, name) in names.iter().enumerate() {
            store.insert(&pinned(name, i as i64)).unwrap();
        }
        store.insert(&NewCity::named("Unpinned")).unwrap();

        let mut pinned_now = store.list_pinned().unwrap();
        pinned_now.reverse();
        let ids: Vec<i64> = pinned_now.iter().map(|c| c.id).collect();
        store.reorder(&ids).unwrap();

        let read_back = store.list_pinned().unwrap();
        let order: Vec<_> = read_back.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["Incheon", "Daegu", "Busan", "Seoul"]);
        let orders: Vec<_> = read_back.iter().map(|c| c.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn list_all_puts_pinned_first() {
        let store = CityStore::in_memory().unwrap();
        store.insert(&NewCity::named("Athens")).unwrap();
        store.insert(&pinned("Zurich", 0)).unwrap();

        let names: Vec<_> = store.list_all().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Zurich", "Athens"]);
    }

    #[test]
    fn migrates_v1_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE cities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    pinned INTEGER NOT NULL DEFAULT 0
                 );
                 INSERT INTO cities (name, pinned) VALUES ('Seoul', 1);",
            )
            .unwrap();
        }

        let store = CityStore::open(&path).unwrap();
        let city = store.find_by_name("Seoul").unwrap().unwrap();
        assert!(city.pinned);
        assert_eq!(city.sort_order, 0);
        assert_eq!(city.localized_name, None);

        store.backfill_metadata(city.id, Some("서울"), Some("KR")).unwrap();
        drop(store);

        let reopened = CityStore::open(&path).unwrap();
        assert_eq!(reopened.find_by_any_name("서울").unwrap().unwrap().id, city.id);
    }

    #[test]
    fn rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.db");
        Connection::open(&path).unwrap().execute_batch("PRAGMA user_version = 9;").unwrap();

        assert!(matches!(CityStore::open(&path), Err(StoreError::UnsupportedSchema(9))));
    }

    #[test]
    fn failed_migration_leaves_schema_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.db");
        // v1 layout with a stray name_ko column: v1->v2 succeeds, v2->v3 fails.
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE cities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    pinned INTEGER NOT NULL DEFAULT 0,
                    name_ko TEXT
                 );",
            )
            .unwrap();

        assert!(matches!(CityStore::open(&path), Err(StoreError::Sqlite(_))));

        let conn = Connection::open(&path).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        let has_sort_order: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('cities') WHERE name = 'sort_order'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 0);
        assert_eq!(has_sort_order, 0);
    }

    #[tokio::test]
    async fn blocking_runs_store_calls_off_the_runtime() {
        let store = CityStore::in_memory().unwrap();

        let outcome = store.blocking(|s| s.insert(&pinned("Lima", 0))).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        let names: Vec<_> = store
            .blocking(|s| s.list_pinned())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Lima"]);
    }
}
