use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            code TEXT,
            name TEXT NOT NULL,
            credit_hours REAL,
            created_at TEXT NOT NULL,
            UNIQUE(school_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_school ON subjects(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_systems(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            system_type TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            applicable_grades TEXT NOT NULL DEFAULT '[]',
            applicable_subjects TEXT NOT NULL DEFAULT '[]',
            configuration TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grading_systems_school ON grading_systems(school_id)",
        [],
    )?;
    // At most one primary system per school.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_grading_systems_primary
         ON grading_systems(school_id) WHERE is_primary = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_scales(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            grading_system_id TEXT,
            name TEXT NOT NULL,
            scale_type TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            passing_threshold REAL NOT NULL DEFAULT 60,
            gpa_scale_max REAL NOT NULL DEFAULT 4,
            decimal_places INTEGER NOT NULL DEFAULT 2,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(grading_system_id) REFERENCES grading_systems(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_scales_school ON grade_scales(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_scales_system ON grade_scales(grading_system_id)",
        [],
    )?;
    // At most one default scale per owning scope (a system, or the school's
    // standalone scales).
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_grade_scales_default
         ON grade_scales(school_id, COALESCE(grading_system_id, '')) WHERE is_default = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_levels(
            id TEXT PRIMARY KEY,
            grade_scale_id TEXT NOT NULL,
            grade_value TEXT NOT NULL,
            display_value TEXT NOT NULL,
            numeric_value REAL,
            gpa_points REAL,
            percentage_min REAL NOT NULL,
            percentage_max REAL NOT NULL,
            description TEXT,
            color_code TEXT,
            is_passing INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(grade_scale_id) REFERENCES grade_scales(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_levels_scale
         ON grade_levels(grade_scale_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT,
            term INTEGER,
            title TEXT,
            grade_scale_id TEXT,
            grade_level_id TEXT,
            raw_score REAL,
            points_earned REAL,
            points_possible REAL,
            percentage_score REAL,
            letter_grade TEXT,
            weight REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(grade_scale_id) REFERENCES grade_scales(id),
            FOREIGN KEY(grade_level_id) REFERENCES grade_levels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_student
         ON grade_entries(school_id, student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_level ON grade_entries(grade_level_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_scale ON grade_entries(grade_scale_id)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
