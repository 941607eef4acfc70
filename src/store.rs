//! Tenant-scoped persistence for grading systems, scales, levels, subjects and
//! grade entries. Every call takes the owning `school_id` explicitly; rows of
//! other schools are reported as not found.

use crate::entry::{self, Derivation, GradeEntry};
use crate::error::{GradingError, GradingResult};
use crate::gpa::GpaInput;
use crate::scale::{self, GradeLevel, GradeScale, ScaleConfiguration, ScaleType};
use crate::system::{self, GradingSystem, SystemType};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

impl FromSql for SystemType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        SystemType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown system_type {s}").into()))
    }
}

impl ToSql for SystemType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScaleType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ScaleType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown scale_type {s}").into()))
    }
}

impl ToSql for ScaleType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn json_col<T: serde::de::DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json_text<T: Serialize>(value: &T) -> GradingResult<String> {
    serde_json::to_string(value).map_err(|e| GradingError::InvalidInput(e.to_string()))
}

// ---------------------------------------------------------------------------
// Grading systems
// ---------------------------------------------------------------------------

const SYSTEM_COLUMNS: &str = "id, school_id, name, description, system_type, is_primary,
     applicable_grades, applicable_subjects, configuration";

fn system_from_row(r: &Row<'_>) -> rusqlite::Result<GradingSystem> {
    Ok(GradingSystem {
        id: r.get(0)?,
        school_id: r.get(1)?,
        name: r.get(2)?,
        description: r.get(3)?,
        system_type: r.get(4)?,
        is_primary: r.get(5)?,
        applicable_grades: json_col(r, 6)?,
        applicable_subjects: json_col(r, 7)?,
        configuration: json_col(r, 8)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewSystem {
    pub school_id: String,
    pub name: String,
    pub description: Option<String>,
    pub system_type: SystemType,
    pub make_primary: bool,
    pub applicable_grades: Vec<String>,
    pub applicable_subjects: Vec<String>,
    pub configuration: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct SystemPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub applicable_grades: Option<Vec<String>>,
    pub applicable_subjects: Option<Vec<String>>,
    pub configuration: Option<serde_json::Value>,
}

pub fn list_systems(conn: &Connection, school_id: &str) -> GradingResult<Vec<GradingSystem>> {
    let sql = format!(
        "SELECT {SYSTEM_COLUMNS} FROM grading_systems WHERE school_id = ?
         ORDER BY is_primary DESC, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([school_id], system_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_system(
    conn: &Connection,
    school_id: &str,
    system_id: &str,
) -> GradingResult<GradingSystem> {
    let sql =
        format!("SELECT {SYSTEM_COLUMNS} FROM grading_systems WHERE id = ? AND school_id = ?");
    conn.query_row(&sql, (system_id, school_id), system_from_row)
        .optional()?
        .ok_or(GradingError::NotFound("grading system"))
}

/// Creates a grading system together with its seeded default scale. The first
/// system of a school becomes primary even when not asked to.
pub fn create_system(
    conn: &Connection,
    new: NewSystem,
    scale_config: ScaleConfiguration,
    seed_levels: bool,
) -> GradingResult<(GradingSystem, GradeScale)> {
    let tx = conn.unchecked_transaction()?;

    let has_primary: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM grading_systems WHERE school_id = ? AND is_primary = 1)",
        [&new.school_id],
        |r| r.get(0),
    )?;
    let is_primary = new.make_primary || !has_primary;
    if is_primary {
        tx.execute(
            "UPDATE grading_systems SET is_primary = 0 WHERE school_id = ? AND is_primary = 1",
            [&new.school_id],
        )?;
    }

    let created_at = now();
    let sys = GradingSystem {
        id: new_id(),
        school_id: new.school_id,
        name: new.name,
        description: new.description,
        system_type: new.system_type,
        is_primary,
        applicable_grades: new.applicable_grades,
        applicable_subjects: new.applicable_subjects,
        configuration: new.configuration,
    };
    tx.execute(
        "INSERT INTO grading_systems(id, school_id, name, description, system_type, is_primary,
           applicable_grades, applicable_subjects, configuration, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            sys.id,
            sys.school_id,
            sys.name,
            sys.description,
            sys.system_type,
            sys.is_primary,
            to_json_text(&sys.applicable_grades)?,
            to_json_text(&sys.applicable_subjects)?,
            to_json_text(&sys.configuration)?,
            created_at,
            created_at,
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::ExclusivityViolation("primary grading system")
        } else {
            GradingError::Db(e)
        }
    })?;

    let mut default_scale = system::seed_default_scale(&sys, scale_config, seed_levels);
    insert_scale_rows(&tx, &mut default_scale)?;

    tx.commit()?;
    info!(
        school_id = %sys.school_id,
        system_id = %sys.id,
        system_type = sys.system_type.as_str(),
        is_primary,
        seeded_levels = default_scale.levels.len(),
        "grading system created"
    );
    Ok((sys, default_scale))
}

pub fn update_system(
    conn: &Connection,
    school_id: &str,
    system_id: &str,
    patch: &SystemPatch,
) -> GradingResult<GradingSystem> {
    let mut sys = get_system(conn, school_id, system_id)?;
    if let Some(v) = &patch.name {
        sys.name = v.clone();
    }
    if let Some(v) = &patch.description {
        sys.description = v.clone();
    }
    if let Some(v) = &patch.applicable_grades {
        sys.applicable_grades = v.clone();
    }
    if let Some(v) = &patch.applicable_subjects {
        sys.applicable_subjects = v.clone();
    }
    if let Some(v) = &patch.configuration {
        sys.configuration = v.clone();
    }
    conn.execute(
        "UPDATE grading_systems
         SET name = ?, description = ?, applicable_grades = ?, applicable_subjects = ?,
             configuration = ?, updated_at = ?
         WHERE id = ? AND school_id = ?",
        params![
            sys.name,
            sys.description,
            to_json_text(&sys.applicable_grades)?,
            to_json_text(&sys.applicable_subjects)?,
            to_json_text(&sys.configuration)?,
            now(),
            system_id,
            school_id,
        ],
    )?;
    Ok(sys)
}

/// Clears the school's current primary and sets the new one in one
/// transaction, so no reader ever sees two primaries or none.
pub fn set_primary_system(
    conn: &Connection,
    school_id: &str,
    system_id: &str,
) -> GradingResult<()> {
    let tx = conn.unchecked_transaction()?;
    let exists: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM grading_systems WHERE id = ? AND school_id = ?",
            (system_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(GradingError::NotFound("grading system"));
    }

    tx.execute(
        "UPDATE grading_systems SET is_primary = 0, updated_at = ?
         WHERE school_id = ? AND is_primary = 1 AND id <> ?",
        (now(), school_id, system_id),
    )?;
    tx.execute(
        "UPDATE grading_systems SET is_primary = 1, updated_at = ? WHERE id = ?",
        (now(), system_id),
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::ExclusivityViolation("primary grading system")
        } else {
            GradingError::Db(e)
        }
    })?;
    tx.commit()?;
    info!(%school_id, %system_id, "primary grading system changed");
    Ok(())
}

pub fn delete_system(conn: &Connection, school_id: &str, system_id: &str) -> GradingResult<()> {
    let sys = get_system(conn, school_id, system_id)?;
    if sys.is_primary {
        return Err(GradingError::PrimaryDeletion);
    }

    let tx = conn.unchecked_transaction()?;
    let in_use: i64 = tx.query_row(
        "SELECT COUNT(*) FROM grade_entries
         WHERE grade_scale_id IN (SELECT id FROM grade_scales WHERE grading_system_id = ?)",
        [system_id],
        |r| r.get(0),
    )?;
    if in_use > 0 {
        return Err(GradingError::ScaleInUse(in_use));
    }

    tx.execute(
        "DELETE FROM grade_levels
         WHERE grade_scale_id IN (SELECT id FROM grade_scales WHERE grading_system_id = ?)",
        [system_id],
    )?;
    tx.execute("DELETE FROM grade_scales WHERE grading_system_id = ?", [system_id])?;
    tx.execute(
        "DELETE FROM grading_systems WHERE id = ? AND school_id = ?",
        (system_id, school_id),
    )?;
    tx.commit()?;
    info!(%school_id, %system_id, "grading system deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Grade scales
// ---------------------------------------------------------------------------

const SCALE_COLUMNS: &str = "id, school_id, grading_system_id, name, scale_type, is_default,
     passing_threshold, gpa_scale_max, decimal_places";

fn scale_from_row(r: &Row<'_>) -> rusqlite::Result<GradeScale> {
    Ok(GradeScale {
        id: r.get(0)?,
        school_id: r.get(1)?,
        grading_system_id: r.get(2)?,
        name: r.get(3)?,
        scale_type: r.get(4)?,
        is_default: r.get(5)?,
        configuration: ScaleConfiguration {
            passing_threshold: r.get(6)?,
            gpa_scale_max: r.get(7)?,
            decimal_places: r.get(8)?,
        },
        levels: Vec::new(),
    })
}

const LEVEL_COLUMNS: &str = "id, grade_value, display_value, numeric_value, gpa_points,
     percentage_min, percentage_max, description, color_code, is_passing, sort_order";

fn level_from_row(r: &Row<'_>) -> rusqlite::Result<GradeLevel> {
    Ok(GradeLevel {
        id: r.get(0)?,
        grade_value: r.get(1)?,
        display_value: r.get(2)?,
        numeric_value: r.get(3)?,
        gpa_points: r.get(4)?,
        percentage_min: r.get(5)?,
        percentage_max: r.get(6)?,
        description: r.get(7)?,
        color_code: r.get(8)?,
        is_passing: r.get(9)?,
        sort_order: r.get(10)?,
    })
}

fn load_levels(conn: &Connection, scale_id: &str) -> GradingResult<Vec<GradeLevel>> {
    let sql = format!(
        "SELECT {LEVEL_COLUMNS} FROM grade_levels WHERE grade_scale_id = ?
         ORDER BY sort_order, percentage_max DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([scale_id], level_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_level_row(
    conn: &Connection,
    scale_id: &str,
    level: &mut GradeLevel,
) -> GradingResult<()> {
    if level.id.is_empty() {
        level.id = new_id();
    }
    conn.execute(
        "INSERT INTO grade_levels(id, grade_scale_id, grade_value, display_value,
           numeric_value, gpa_points, percentage_min, percentage_max, description,
           color_code, is_passing, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            level.id,
            scale_id,
            level.grade_value,
            level.display_value,
            level.numeric_value,
            level.gpa_points,
            level.percentage_min,
            level.percentage_max,
            level.description,
            level.color_code,
            level.is_passing,
            level.sort_order,
        ],
    )?;
    Ok(())
}

/// Inserts the scale and its levels, assigning ids. The caller owns the
/// transaction and has already cleared any competing default.
fn insert_scale_rows(conn: &Connection, scale: &mut GradeScale) -> GradingResult<()> {
    if scale.id.is_empty() {
        scale.id = new_id();
    }
    let created_at = now();
    conn.execute(
        "INSERT INTO grade_scales(id, school_id, grading_system_id, name, scale_type, is_default,
           passing_threshold, gpa_scale_max, decimal_places, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            scale.id,
            scale.school_id,
            scale.grading_system_id,
            scale.name,
            scale.scale_type,
            scale.is_default,
            scale.configuration.passing_threshold,
            scale.configuration.gpa_scale_max,
            scale.configuration.decimal_places,
            created_at,
            created_at,
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::ExclusivityViolation("default grade scale")
        } else {
            GradingError::Db(e)
        }
    })?;
    let scale_id = scale.id.clone();
    for level in &mut scale.levels {
        insert_level_row(conn, &scale_id, level)?;
    }
    scale.sort_levels();
    Ok(())
}

pub fn load_scale(conn: &Connection, school_id: &str, scale_id: &str) -> GradingResult<GradeScale> {
    let sql = format!("SELECT {SCALE_COLUMNS} FROM grade_scales WHERE id = ? AND school_id = ?");
    let mut scale = conn
        .query_row(&sql, (scale_id, school_id), scale_from_row)
        .optional()?
        .ok_or(GradingError::NotFound("grade scale"))?;
    scale.levels = load_levels(conn, &scale.id)?;
    Ok(scale)
}

/// Lists a school's scales. `system_id` narrows to one grading system.
pub fn list_scales(
    conn: &Connection,
    school_id: &str,
    system_id: Option<&str>,
) -> GradingResult<Vec<GradeScale>> {
    let sql = format!(
        "SELECT {SCALE_COLUMNS} FROM grade_scales
         WHERE school_id = ?1 AND (?2 IS NULL OR grading_system_id = ?2)
         ORDER BY is_default DESC, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut scales = stmt
        .query_map((school_id, system_id), scale_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for s in &mut scales {
        s.levels = load_levels(conn, &s.id)?;
    }
    Ok(scales)
}

#[derive(Debug, Clone)]
pub struct NewScale {
    pub school_id: String,
    pub grading_system_id: Option<String>,
    pub name: String,
    pub scale_type: ScaleType,
    pub configuration: ScaleConfiguration,
    pub make_default: bool,
    pub levels: Vec<GradeLevel>,
}

/// A scale created into a scope without a default becomes the default.
pub fn create_scale(conn: &Connection, new: NewScale) -> GradingResult<GradeScale> {
    scale::validate_levels(&new.levels, &new.configuration)?;
    if let Some(system_id) = &new.grading_system_id {
        get_system(conn, &new.school_id, system_id)?;
    }

    let tx = conn.unchecked_transaction()?;
    let scope_has_default: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM grade_scales
                       WHERE school_id = ? AND grading_system_id IS ? AND is_default = 1)",
        (&new.school_id, &new.grading_system_id),
        |r| r.get(0),
    )?;
    let is_default = new.make_default || !scope_has_default;
    if is_default {
        clear_default_scope(&tx, &new.school_id, new.grading_system_id.as_deref())?;
    }

    let mut scale = GradeScale {
        id: String::new(),
        school_id: new.school_id,
        grading_system_id: new.grading_system_id,
        name: new.name,
        scale_type: new.scale_type,
        is_default,
        configuration: new.configuration,
        levels: new.levels,
    };
    insert_scale_rows(&tx, &mut scale)?;
    tx.commit()?;
    debug!(scale_id = %scale.id, is_default, levels = scale.levels.len(), "grade scale created");
    Ok(scale)
}

#[derive(Debug, Clone, Default)]
pub struct ScalePatch {
    pub name: Option<String>,
    pub configuration: Option<ScaleConfiguration>,
}

pub fn update_scale(
    conn: &Connection,
    school_id: &str,
    scale_id: &str,
    patch: &ScalePatch,
) -> GradingResult<GradeScale> {
    let mut scale = load_scale(conn, school_id, scale_id)?;
    if let Some(name) = &patch.name {
        scale.name = name.clone();
    }
    if let Some(cfg) = patch.configuration {
        // Existing grade points must still fit a lowered gpa_scale_max.
        for level in &scale.levels {
            scale::validate_level(level, &cfg)?;
        }
        scale.configuration = cfg;
    }
    conn.execute(
        "UPDATE grade_scales
         SET name = ?, passing_threshold = ?, gpa_scale_max = ?, decimal_places = ?, updated_at = ?
         WHERE id = ? AND school_id = ?",
        params![
            scale.name,
            scale.configuration.passing_threshold,
            scale.configuration.gpa_scale_max,
            scale.configuration.decimal_places,
            now(),
            scale_id,
            school_id,
        ],
    )?;
    Ok(scale)
}

fn clear_default_scope(
    conn: &Connection,
    school_id: &str,
    system_id: Option<&str>,
) -> GradingResult<()> {
    conn.execute(
        "UPDATE grade_scales SET is_default = 0, updated_at = ?
         WHERE school_id = ? AND grading_system_id IS ? AND is_default = 1",
        (now(), school_id, system_id),
    )?;
    Ok(())
}

/// Makes `scale_id` the only default within its owning scope. Clearing the
/// previous default and setting the new one share a single transaction.
pub fn set_default_scale(conn: &Connection, school_id: &str, scale_id: &str) -> GradingResult<()> {
    let tx = conn.unchecked_transaction()?;
    let scope: Option<Option<String>> = tx
        .query_row(
            "SELECT grading_system_id FROM grade_scales WHERE id = ? AND school_id = ?",
            (scale_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(system_id) = scope else {
        return Err(GradingError::NotFound("grade scale"));
    };

    clear_default_scope(&tx, school_id, system_id.as_deref())?;
    tx.execute(
        "UPDATE grade_scales SET is_default = 1, updated_at = ? WHERE id = ?",
        (now(), scale_id),
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::ExclusivityViolation("default grade scale")
        } else {
            GradingError::Db(e)
        }
    })?;
    tx.commit()?;
    info!(%school_id, %scale_id, system_id = ?system_id, "default grade scale changed");
    Ok(())
}

/// Deleting a scope's default hands the flag to the scope's next scale by
/// name. A grading system's last scale cannot go; delete the system instead.
pub fn delete_scale(conn: &Connection, school_id: &str, scale_id: &str) -> GradingResult<()> {
    let tx = conn.unchecked_transaction()?;
    let found: Option<(Option<String>, bool)> = tx
        .query_row(
            "SELECT grading_system_id, is_default FROM grade_scales WHERE id = ? AND school_id = ?",
            (scale_id, school_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((system_id, is_default)) = found else {
        return Err(GradingError::NotFound("grade scale"));
    };
    let in_use: i64 = tx.query_row(
        "SELECT COUNT(*) FROM grade_entries WHERE grade_scale_id = ?",
        [scale_id],
        |r| r.get(0),
    )?;
    if in_use > 0 {
        return Err(GradingError::ScaleInUse(in_use));
    }

    let successor: Option<String> = if is_default {
        tx.query_row(
            "SELECT id FROM grade_scales
             WHERE school_id = ? AND grading_system_id IS ? AND id <> ?
             ORDER BY name, id LIMIT 1",
            (school_id, &system_id, scale_id),
            |r| r.get(0),
        )
        .optional()?
    } else {
        None
    };
    if is_default && successor.is_none() && system_id.is_some() {
        return Err(GradingError::LastSystemScale);
    }

    tx.execute("DELETE FROM grade_levels WHERE grade_scale_id = ?", [scale_id])?;
    tx.execute("DELETE FROM grade_scales WHERE id = ?", [scale_id])?;
    if let Some(next) = &successor {
        tx.execute(
            "UPDATE grade_scales SET is_default = 1, updated_at = ? WHERE id = ?",
            (now(), next),
        )?;
    }
    tx.commit()?;
    if let Some(next) = successor {
        info!(
            %school_id,
            %scale_id,
            new_default = %next,
            "default grade scale deleted, flag moved"
        );
    }
    Ok(())
}

/// The scale used when a request names none: the primary system's default
/// scale, else the school's standalone default scale.
pub fn active_scale(conn: &Connection, school_id: &str) -> GradingResult<Option<GradeScale>> {
    let from_primary: Option<String> = conn
        .query_row(
            "SELECT s.id
             FROM grade_scales s
             JOIN grading_systems g ON g.id = s.grading_system_id
             WHERE g.school_id = ? AND g.is_primary = 1 AND s.is_default = 1",
            [school_id],
            |r| r.get(0),
        )
        .optional()?;
    let scale_id = match from_primary {
        Some(id) => Some(id),
        None => conn
            .query_row(
                "SELECT id FROM grade_scales
                 WHERE school_id = ? AND grading_system_id IS NULL AND is_default = 1",
                [school_id],
                |r| r.get(0),
            )
            .optional()?,
    };
    match scale_id {
        Some(id) => load_scale(conn, school_id, &id).map(Some),
        None => Ok(None),
    }
}

pub fn resolve_scale(
    conn: &Connection,
    school_id: &str,
    scale_id: Option<&str>,
) -> GradingResult<Option<GradeScale>> {
    match scale_id {
        Some(id) => load_scale(conn, school_id, id).map(Some),
        None => active_scale(conn, school_id),
    }
}

// ---------------------------------------------------------------------------
// Grade levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LevelPatch {
    pub grade_value: Option<String>,
    pub display_value: Option<String>,
    pub numeric_value: Option<Option<f64>>,
    pub gpa_points: Option<Option<f64>>,
    pub percentage_min: Option<f64>,
    pub percentage_max: Option<f64>,
    pub description: Option<Option<String>>,
    pub color_code: Option<Option<String>>,
    pub is_passing: Option<bool>,
    pub sort_order: Option<i64>,
}

impl LevelPatch {
    pub fn apply(&self, level: &mut GradeLevel) {
        if let Some(v) = &self.grade_value {
            level.grade_value = v.clone();
        }
        if let Some(v) = &self.display_value {
            level.display_value = v.clone();
        }
        if let Some(v) = self.numeric_value {
            level.numeric_value = v;
        }
        if let Some(v) = self.gpa_points {
            level.gpa_points = v;
        }
        if let Some(v) = self.percentage_min {
            level.percentage_min = v;
        }
        if let Some(v) = self.percentage_max {
            level.percentage_max = v;
        }
        if let Some(v) = &self.description {
            level.description = v.clone();
        }
        if let Some(v) = &self.color_code {
            level.color_code = v.clone();
        }
        if let Some(v) = self.is_passing {
            level.is_passing = v;
        }
        if let Some(v) = self.sort_order {
            level.sort_order = v;
        }
    }
}

/// Adds a level after checking its fields and that its range overlaps no
/// sibling. A negative `sort_order` appends after the last level.
pub fn create_level(
    conn: &Connection,
    school_id: &str,
    scale_id: &str,
    mut level: GradeLevel,
) -> GradingResult<GradeLevel> {
    let scale = load_scale(conn, school_id, scale_id)?;
    level.id = String::new();
    scale::validate_level(&level, &scale.configuration)?;
    scale::check_overlap(&level, &scale.levels)?;
    if level.sort_order < 0 {
        level.sort_order = scale.levels.iter().map(|l| l.sort_order + 1).max().unwrap_or(0);
    }
    insert_level_row(conn, scale_id, &mut level)?;
    Ok(level)
}

fn level_scale_id(conn: &Connection, school_id: &str, level_id: &str) -> GradingResult<String> {
    conn.query_row(
        "SELECT l.grade_scale_id
         FROM grade_levels l
         JOIN grade_scales s ON s.id = l.grade_scale_id
         WHERE l.id = ? AND s.school_id = ?",
        (level_id, school_id),
        |r| r.get(0),
    )
    .optional()?
    .ok_or(GradingError::NotFound("grade level"))
}

pub fn update_level(
    conn: &Connection,
    school_id: &str,
    level_id: &str,
    patch: &LevelPatch,
) -> GradingResult<GradeLevel> {
    let scale_id = level_scale_id(conn, school_id, level_id)?;
    let scale = load_scale(conn, school_id, &scale_id)?;
    let mut level = scale
        .levels
        .iter()
        .find(|l| l.id == level_id)
        .cloned()
        .ok_or(GradingError::NotFound("grade level"))?;
    patch.apply(&mut level);
    scale::validate_level(&level, &scale.configuration)?;
    scale::check_overlap(&level, &scale.levels)?;

    conn.execute(
        "UPDATE grade_levels
         SET grade_value = ?, display_value = ?, numeric_value = ?, gpa_points = ?,
             percentage_min = ?, percentage_max = ?, description = ?, color_code = ?,
             is_passing = ?, sort_order = ?
         WHERE id = ?",
        params![
            level.grade_value,
            level.display_value,
            level.numeric_value,
            level.gpa_points,
            level.percentage_min,
            level.percentage_max,
            level.description,
            level.color_code,
            level.is_passing,
            level.sort_order,
            level.id,
        ],
    )?;
    Ok(level)
}

/// Levels that any grade entry points at stay.
pub fn delete_level(conn: &Connection, school_id: &str, level_id: &str) -> GradingResult<()> {
    level_scale_id(conn, school_id, level_id)?;
    let in_use: i64 = conn.query_row(
        "SELECT COUNT(*) FROM grade_entries WHERE grade_level_id = ?",
        [level_id],
        |r| r.get(0),
    )?;
    if in_use > 0 {
        return Err(GradingError::LevelInUse(in_use));
    }
    conn.execute("DELETE FROM grade_levels WHERE id = ?", [level_id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub school_id: String,
    pub code: Option<String>,
    pub name: String,
    pub credit_hours: Option<f64>,
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        school_id: r.get(1)?,
        code: r.get(2)?,
        name: r.get(3)?,
        credit_hours: r.get(4)?,
    })
}

pub fn list_subjects(conn: &Connection, school_id: &str) -> GradingResult<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, code, name, credit_hours FROM subjects
         WHERE school_id = ? ORDER BY name",
    )?;
    let rows = stmt
        .query_map([school_id], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_subject(conn: &Connection, school_id: &str, subject_id: &str) -> GradingResult<Subject> {
    conn.query_row(
        "SELECT id, school_id, code, name, credit_hours FROM subjects
         WHERE id = ? AND school_id = ?",
        (subject_id, school_id),
        subject_from_row,
    )
    .optional()?
    .ok_or(GradingError::NotFound("subject"))
}

pub fn create_subject(
    conn: &Connection,
    school_id: &str,
    code: Option<String>,
    name: String,
    credit_hours: Option<f64>,
) -> GradingResult<Subject> {
    let subject = Subject {
        id: new_id(),
        school_id: school_id.to_string(),
        code,
        name,
        credit_hours,
    };
    conn.execute(
        "INSERT INTO subjects(id, school_id, code, name, credit_hours, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            subject.id,
            subject.school_id,
            subject.code,
            subject.name,
            subject.credit_hours,
            now(),
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::InvalidInput(format!("subject {} already exists", subject.name))
        } else {
            GradingError::Db(e)
        }
    })?;
    Ok(subject)
}

pub fn update_subject(
    conn: &Connection,
    school_id: &str,
    subject_id: &str,
    name: Option<String>,
    code: Option<Option<String>>,
    credit_hours: Option<Option<f64>>,
) -> GradingResult<Subject> {
    let mut subject = get_subject(conn, school_id, subject_id)?;
    if let Some(v) = name {
        subject.name = v;
    }
    if let Some(v) = code {
        subject.code = v;
    }
    if let Some(v) = credit_hours {
        subject.credit_hours = v;
    }
    conn.execute(
        "UPDATE subjects SET name = ?, code = ?, credit_hours = ? WHERE id = ? AND school_id = ?",
        params![subject.name, subject.code, subject.credit_hours, subject_id, school_id],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            GradingError::InvalidInput(format!("subject {} already exists", subject.name))
        } else {
            GradingError::Db(e)
        }
    })?;
    Ok(subject)
}

// ---------------------------------------------------------------------------
// Grade entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub id: String,
    pub school_id: String,
    pub student_id: String,
    pub subject_id: Option<String>,
    pub term: Option<i64>,
    pub title: Option<String>,
    pub grade_scale_id: Option<String>,
    pub grade_level_id: Option<String>,
    #[serde(flatten)]
    pub entry: GradeEntry,
    pub created_at: String,
    pub updated_at: String,
}

const ENTRY_COLUMNS: &str = "id, school_id, student_id, subject_id, term, title, grade_scale_id,
     grade_level_id, raw_score, points_earned, points_possible, percentage_score, letter_grade,
     weight, created_at, updated_at";

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    Ok(StoredEntry {
        id: r.get(0)?,
        school_id: r.get(1)?,
        student_id: r.get(2)?,
        subject_id: r.get(3)?,
        term: r.get(4)?,
        title: r.get(5)?,
        grade_scale_id: r.get(6)?,
        grade_level_id: r.get(7)?,
        entry: GradeEntry {
            raw_score: r.get(8)?,
            points_earned: r.get(9)?,
            points_possible: r.get(10)?,
            percentage_score: r.get(11)?,
            letter_grade: r.get(12)?,
            weight: r.get(13)?,
        },
        created_at: r.get(14)?,
        updated_at: r.get(15)?,
    })
}

/// Caller-side rule: earned points may not exceed possible points.
pub fn validate_points(entry: &GradeEntry) -> GradingResult<()> {
    if let (Some(earned), Some(possible)) = (entry.points_earned, entry.points_possible) {
        if earned > possible {
            return Err(GradingError::InvalidInput(format!(
                "pointsEarned ({earned}) must not exceed pointsPossible ({possible})"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub school_id: String,
    pub student_id: String,
    pub subject_id: Option<String>,
    pub term: Option<i64>,
    pub title: Option<String>,
    pub grade_scale_id: Option<String>,
    pub entry: GradeEntry,
}

pub fn get_entry(conn: &Connection, school_id: &str, entry_id: &str) -> GradingResult<StoredEntry> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM grade_entries WHERE id = ? AND school_id = ?");
    conn.query_row(&sql, (entry_id, school_id), entry_from_row)
        .optional()?
        .ok_or(GradingError::NotFound("grade entry"))
}

/// Derives the missing percentage and letter grade, then stores the entry.
pub fn create_entry(conn: &Connection, new: NewEntry) -> GradingResult<(StoredEntry, Derivation)> {
    validate_points(&new.entry)?;
    if let Some(subject_id) = &new.subject_id {
        get_subject(conn, &new.school_id, subject_id)?;
    }
    let scale = resolve_scale(conn, &new.school_id, new.grade_scale_id.as_deref())?;

    let mut entry = new.entry;
    let derivation = entry::derive(&mut entry, scale.as_ref());
    let ts = now();
    let stored = StoredEntry {
        id: new_id(),
        school_id: new.school_id,
        student_id: new.student_id,
        subject_id: new.subject_id,
        term: new.term,
        title: new.title,
        grade_scale_id: scale.map(|s| s.id),
        grade_level_id: derivation.grade_level_id.clone(),
        entry,
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO grade_entries(id, school_id, student_id, subject_id, term, title,
           grade_scale_id, grade_level_id, raw_score, points_earned, points_possible,
           percentage_score, letter_grade, weight, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            stored.id,
            stored.school_id,
            stored.student_id,
            stored.subject_id,
            stored.term,
            stored.title,
            stored.grade_scale_id,
            stored.grade_level_id,
            stored.entry.raw_score,
            stored.entry.points_earned,
            stored.entry.points_possible,
            stored.entry.percentage_score,
            stored.entry.letter_grade,
            stored.entry.weight,
            stored.created_at,
            stored.updated_at,
        ],
    )?;
    Ok((stored, derivation))
}

#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub raw_score: Option<Option<f64>>,
    pub points_earned: Option<Option<f64>>,
    pub points_possible: Option<Option<f64>>,
    pub percentage_score: Option<Option<f64>>,
    pub letter_grade: Option<Option<String>>,
    pub weight: Option<Option<f64>>,
    pub term: Option<Option<i64>>,
    pub title: Option<Option<String>>,
}

/// Applies the patch and re-derives. Changing a score input without naming a
/// percentage drops the stored percentage; a changed percentage without a
/// letter drops the stored letter. Derivation then refills whatever was
/// dropped. A letter is otherwise kept as stored, with or without a percentage.
pub fn update_entry(
    conn: &Connection,
    school_id: &str,
    entry_id: &str,
    patch: &EntryPatch,
) -> GradingResult<(StoredEntry, Derivation)> {
    let mut stored = get_entry(conn, school_id, entry_id)?;
    let e = &mut stored.entry;

    let inputs_changed = patch.raw_score.is_some()
        || patch.points_earned.is_some()
        || patch.points_possible.is_some();
    if let Some(v) = patch.raw_score {
        e.raw_score = v;
    }
    if let Some(v) = patch.points_earned {
        e.points_earned = v;
    }
    if let Some(v) = patch.points_possible {
        e.points_possible = v;
    }
    if let Some(v) = patch.weight {
        e.weight = v;
    }
    validate_points(e)?;

    let mut percentage_changed = false;
    if let Some(v) = patch.percentage_score {
        percentage_changed = e.percentage_score != v;
        e.percentage_score = v;
    } else if inputs_changed {
        percentage_changed = e.percentage_score.is_some();
        e.percentage_score = None;
    }
    match &patch.letter_grade {
        Some(v) => e.letter_grade = v.clone(),
        None if percentage_changed => e.letter_grade = None,
        None => {}
    }
    if let Some(v) = patch.term {
        stored.term = v;
    }
    if let Some(v) = &patch.title {
        stored.title = v.clone();
    }

    let scale = resolve_scale(conn, school_id, stored.grade_scale_id.as_deref())?;
    let derivation = entry::derive(&mut stored.entry, scale.as_ref());
    stored.grade_scale_id = scale.map(|s| s.id);
    stored.grade_level_id = derivation.grade_level_id.clone();
    stored.updated_at = now();

    conn.execute(
        "UPDATE grade_entries
         SET term = ?, title = ?, grade_scale_id = ?, grade_level_id = ?, raw_score = ?,
             points_earned = ?, points_possible = ?, percentage_score = ?, letter_grade = ?,
             weight = ?, updated_at = ?
         WHERE id = ? AND school_id = ?",
        params![
            stored.term,
            stored.title,
            stored.grade_scale_id,
            stored.grade_level_id,
            stored.entry.raw_score,
            stored.entry.points_earned,
            stored.entry.points_possible,
            stored.entry.percentage_score,
            stored.entry.letter_grade,
            stored.entry.weight,
            stored.updated_at,
            entry_id,
            school_id,
        ],
    )?;
    Ok((stored, derivation))
}

#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub term: Option<i64>,
}

pub fn list_entries(
    conn: &Connection,
    school_id: &str,
    filter: &EntryFilter,
) -> GradingResult<Vec<StoredEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM grade_entries
         WHERE school_id = ?1
           AND (?2 IS NULL OR student_id = ?2)
           AND (?3 IS NULL OR subject_id = ?3)
           AND (?4 IS NULL OR term = ?4)
         ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![school_id, filter.student_id, filter.subject_id, filter.term],
            entry_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_entry(conn: &Connection, school_id: &str, entry_id: &str) -> GradingResult<()> {
    let changed = conn.execute(
        "DELETE FROM grade_entries WHERE id = ? AND school_id = ?",
        (entry_id, school_id),
    )?;
    if changed == 0 {
        return Err(GradingError::NotFound("grade entry"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: Option<String>,
    pub subject_name: Option<String>,
    pub percentage: f64,
    pub credits: f64,
    pub entry_count: usize,
}

/// Collapses a student's entries into one weighted average per subject,
/// carrying the subject's credit hours (or `default_credits`). Entries with no
/// subject share one bucket. Entries without a percentage are ignored.
pub fn student_subject_averages(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    term: Option<i64>,
    default_credits: f64,
) -> GradingResult<Vec<SubjectAverage>> {
    let mut stmt = conn.prepare(
        "SELECT e.subject_id, s.name, s.credit_hours, e.percentage_score, e.weight
         FROM grade_entries e
         LEFT JOIN subjects s ON s.id = e.subject_id
         WHERE e.school_id = ?1 AND e.student_id = ?2
           AND e.percentage_score IS NOT NULL
           AND (?3 IS NULL OR e.term = ?3)
         ORDER BY s.name, e.rowid",
    )?;
    let rows = stmt
        .query_map(params![school_id, student_id, term], |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<f64>>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, Option<f64>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    struct Acc {
        name: Option<String>,
        credits: f64,
        weighted_sum: f64,
        weight_total: f64,
        plain_sum: f64,
        count: usize,
    }

    let mut order: Vec<Option<String>> = Vec::new();
    let mut by_subject: HashMap<Option<String>, Acc> = HashMap::new();
    for (subject_id, name, credit_hours, percentage, weight) in rows {
        let acc = by_subject.entry(subject_id.clone()).or_insert_with(|| {
            order.push(subject_id.clone());
            Acc {
                name,
                credits: credit_hours.unwrap_or(default_credits),
                weighted_sum: 0.0,
                weight_total: 0.0,
                plain_sum: 0.0,
                count: 0,
            }
        });
        let w = weight.unwrap_or(1.0).max(0.0);
        acc.weighted_sum += percentage * w;
        acc.weight_total += w;
        acc.plain_sum += percentage;
        acc.count += 1;
    }

    Ok(order
        .into_iter()
        .filter_map(|subject_id| {
            let acc = by_subject.remove(&subject_id)?;
            let percentage = if acc.weight_total > 0.0 {
                acc.weighted_sum / acc.weight_total
            } else {
                acc.plain_sum / acc.count as f64
            };
            Some(SubjectAverage {
                subject_id,
                subject_name: acc.name,
                percentage,
                credits: acc.credits,
                entry_count: acc.count,
            })
        })
        .collect())
}

pub fn gpa_inputs(averages: &[SubjectAverage]) -> Vec<GpaInput> {
    averages
        .iter()
        .map(|a| GpaInput {
            percentage: a.percentage,
            credits: a.credits,
        })
        .collect()
}
