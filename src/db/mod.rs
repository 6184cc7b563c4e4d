use crate::errors::{AppError, AppResult};
use crate::models::{Slot, Tag, Task};
use crate::store::{QuerySpec, RawRow, RayQuery, SlotStore, StoreSession};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const ROW_COLUMNS: &str = "s.id, s.fst, s.lst, t.id, t.name";

/// SQLite-backed slot store. Holds only the path; connections live in sessions.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Creates the database file and schema if needed.
    pub fn create(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|err| AppError::StoreUnavailable(err.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    /// Points at an existing database without touching it.
    pub fn at(path: &Path) -> Self {
        Self {
            db_path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl SlotStore for SqliteStore {
    type Session = SqliteSession;

    fn open_session(&self) -> AppResult<Self::Session> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| {
            AppError::StoreUnavailable(format!("{}: {}", self.db_path.display(), err))
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|err| AppError::StoreUnavailable(err.to_string()))?;
        Ok(SqliteSession { conn })
    }
}

/// One connection, owned by the thread that opened it.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Connection,
}

impl StoreSession for SqliteSession {
    fn query(&mut self, spec: &QuerySpec) -> AppResult<Vec<RawRow>> {
        match spec {
            QuerySpec::Ray(ray) => self.query_ray(ray),
            QuerySpec::ActiveSlots { zone } => self.query_active(zone),
        }
    }

    fn close(self) -> AppResult<()> {
        self.conn
            .close()
            .map_err(|(_, err)| AppError::QueryFailed(format!("failed to close session: {}", err)))
    }
}

impl SqliteSession {
    fn query_ray(&self, ray: &RayQuery) -> AppResult<Vec<RawRow>> {
        let ray_op = match ray.direction {
            crate::models::Direction::PastToFuture => ">=",
            crate::models::Direction::FutureToPast => "<=",
        };
        let dates = ray.dates_dir.sql_order();
        let times = ray.times_dir.sql_order();
        let (tag_columns, tag_joins, tag_order) = if ray.with_tags {
            (
                "g.id, g.name",
                "LEFT JOIN slot_tags st ON st.slot_id = s.id LEFT JOIN tags g ON g.id = st.tag_id",
                ", g.id ASC",
            )
        } else {
            ("NULL, NULL", "", "")
        };

        let sql = format!(
            "WITH kept_dates AS (
               SELECT DISTINCT date(s.fst, ?1) AS day
               FROM slots s
               WHERE s.fst {ray_op} ?2
               ORDER BY day {dates}
               LIMIT ?3 OFFSET ?4
             )
             SELECT {ROW_COLUMNS}, {tag_columns}
             FROM slots s
             JOIN tasks t ON t.id = s.task_id
             {tag_joins}
             WHERE date(s.fst, ?1) IN (SELECT day FROM kept_dates)
             ORDER BY date(s.fst, ?1) {dates}, s.fst {times}, s.id {times}{tag_order}"
        );

        let zone = ray.zone();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    zone_modifier(&zone),
                    to_store_text(&ray.dt_offset),
                    sql_count(ray.date_limit()),
                    sql_count(ray.slice_fst),
                ],
                read_columns,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let rows = rows
            .into_iter()
            .map(|columns| columns.into_raw_row(&zone))
            .collect::<AppResult<Vec<_>>>()?;
        tracing::debug!(
            rows = rows.len(),
            direction = ray.direction.as_str(),
            slice_fst = ray.slice_fst,
            slice_lst = ray.slice_lst,
            "ray query finished"
        );
        Ok(rows)
    }

    fn query_active(&self, zone: &FixedOffset) -> AppResult<Vec<RawRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS}, g.id, g.name
             FROM slots s
             JOIN tasks t ON t.id = s.task_id
             LEFT JOIN slot_tags st ON st.slot_id = s.id
             LEFT JOIN tags g ON g.id = st.tag_id
             WHERE s.lst IS NULL
             ORDER BY s.fst ASC, s.id ASC, g.id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|columns| columns.into_raw_row(zone))
            .collect()
    }

    pub fn add_task(&mut self, name: &str) -> AppResult<Task> {
        let id = upsert_named(&self.conn, "tasks", name)?;
        Ok(Task {
            id: Some(id),
            name: name.to_string(),
        })
    }

    pub fn add_tag(&mut self, name: &str) -> AppResult<Tag> {
        let id = upsert_named(&self.conn, "tags", name)?;
        Ok(Tag {
            id: Some(id),
            name: name.to_string(),
        })
    }

    /// Persists a slot for `task` with `tags`. A running slot is refused while
    /// another one exists.
    pub fn add_slot(&mut self, task: &Task, slot: &Slot, tags: &[Tag]) -> AppResult<Slot> {
        let checked = Slot::new(slot.fst, slot.lst)?;
        let tx = self.conn.transaction()?;
        if checked.is_active() {
            let running: i64 =
                tx.query_row("SELECT COUNT(*) FROM slots WHERE lst IS NULL", [], |row| row.get(0))?;
            if running > 0 {
                return Err(AppError::InvariantViolation(
                    "another slot is already running".to_string(),
                ));
            }
        }

        let task_id = match task.id {
            Some(id) => id,
            None => upsert_named(&tx, "tasks", &task.name)?,
        };
        tx.execute(
            "INSERT INTO slots (task_id, fst, lst) VALUES (?1, ?2, ?3)",
            params![
                task_id,
                to_store_text(&checked.fst),
                checked.lst.as_ref().map(to_store_text),
            ],
        )?;
        let slot_id = tx.last_insert_rowid();

        for tag in tags {
            let tag_id = match tag.id {
                Some(id) => id,
                None => upsert_named(&tx, "tags", &tag.name)?,
            };
            tx.execute(
                "INSERT OR IGNORE INTO slot_tags (slot_id, tag_id) VALUES (?1, ?2)",
                params![slot_id, tag_id],
            )?;
        }
        tx.commit()?;

        Ok(Slot {
            id: Some(slot_id),
            ..checked
        })
    }

    pub fn start_timer(&mut self, task: &Task, at: DateTime<FixedOffset>, tags: &[Tag]) -> AppResult<Slot> {
        let slot = Slot::new(at, None)?;
        let started = self.add_slot(task, &slot, tags)?;
        tracing::info!(task = %task.name, slot_id = ?started.id, "timer started");
        Ok(started)
    }

    /// Closes the running slot at `at`. Returns `None` when nothing is running.
    pub fn stop_timer(&mut self, at: DateTime<FixedOffset>) -> AppResult<Option<Slot>> {
        let tx = self.conn.transaction()?;
        let running = {
            let mut stmt = tx.prepare("SELECT id, fst FROM slots WHERE lst IS NULL")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        if running.len() > 1 {
            return Err(AppError::InvariantViolation(format!(
                "{} slots are running at once",
                running.len()
            )));
        }
        let Some((slot_id, fst)) = running.into_iter().next() else {
            return Ok(None);
        };

        let zone = *at.offset();
        let started = from_store_text(&fst, &zone)?;
        if at <= started {
            return Err(AppError::InvalidRequest(format!(
                "stop time {} is not after slot start {}",
                at.to_rfc3339(),
                started.to_rfc3339()
            )));
        }
        let stopped = Slot {
            id: Some(slot_id),
            fst: started,
            lst: Some(at),
        };
        tx.execute(
            "UPDATE slots SET lst = ?1 WHERE id = ?2",
            params![to_store_text(&at), slot_id],
        )?;
        tx.commit()?;
        tracing::info!(slot_id, "timer stopped");
        Ok(Some(stopped))
    }
}

struct RowColumns {
    slot_id: i64,
    fst: String,
    lst: Option<String>,
    task_id: i64,
    task_name: String,
    tag_id: Option<i64>,
    tag_name: Option<String>,
}

impl RowColumns {
    fn into_raw_row(self, zone: &FixedOffset) -> AppResult<RawRow> {
        let slot = Slot {
            id: Some(self.slot_id),
            fst: from_store_text(&self.fst, zone)?,
            lst: self
                .lst
                .as_deref()
                .map(|lst| from_store_text(lst, zone))
                .transpose()?,
        };
        let tag = match (self.tag_id, self.tag_name) {
            (Some(id), Some(name)) => Some(Tag { id: Some(id), name }),
            _ => None,
        };
        Ok(RawRow {
            slot,
            task: Task {
                id: Some(self.task_id),
                name: self.task_name,
            },
            tag,
        })
    }
}

fn read_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowColumns> {
    Ok(RowColumns {
        slot_id: row.get(0)?,
        fst: row.get(1)?,
        lst: row.get(2)?,
        task_id: row.get(3)?,
        task_name: row.get(4)?,
        tag_id: row.get(5)?,
        tag_name: row.get(6)?,
    })
}

fn upsert_named(conn: &Connection, table: &str, name: &str) -> AppResult<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} name cannot be empty", table)));
    }
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)"),
        [name],
    )?;
    let id = conn
        .query_row(&format!("SELECT id FROM {table} WHERE name = ?1"), [name], |row| {
            row.get(0)
        })
        .optional()?;
    id.ok_or_else(|| AppError::Internal(format!("{} row `{}` vanished after insert", table, name)))
}

/// Fixed-width UTC text so lexicographic order matches time order.
fn to_store_text(at: &DateTime<FixedOffset>) -> String {
    at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn from_store_text(raw: &str, zone: &FixedOffset) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(zone))
        .map_err(|err| AppError::InvariantViolation(format!("unreadable timestamp `{}`: {}", raw, err)))
}

/// LIMIT/OFFSET value. Anything past `i64::MAX` selects nothing either way.
fn sql_count(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// SQLite `date()` modifier that shifts UTC text into `zone`.
fn zone_modifier(zone: &FixedOffset) -> String {
    format!("{:+} seconds", zone.local_minus_utc())
}
