use crate::entry::{self, GradeEntry};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::store::{self, EntryFilter, EntryPatch, NewEntry};
use serde_json::{json, Map, Value};

fn non_negative(v: Option<f64>, key: &str) -> Result<Option<f64>, HandlerErr> {
    match v {
        Some(n) if n < 0.0 => Err(HandlerErr::bad_params(format!("{key} must be >= 0"))),
        other => Ok(other),
    }
}

fn parse_entry(p: &Value) -> Result<GradeEntry, HandlerErr> {
    let entry = GradeEntry {
        raw_score: helpers::opt_f64(p, "rawScore")?,
        points_earned: non_negative(helpers::opt_f64(p, "pointsEarned")?, "pointsEarned")?,
        points_possible: non_negative(helpers::opt_f64(p, "pointsPossible")?, "pointsPossible")?,
        percentage_score: helpers::opt_f64(p, "percentageScore")?,
        letter_grade: helpers::opt_str(p, "letterGrade")?.filter(|s| !s.is_empty()),
        weight: non_negative(helpers::opt_f64(p, "weight")?, "weight")?,
    };
    store::validate_points(&entry)?;
    Ok(entry)
}

fn parse_entry_patch(patch: &Map<String, Value>) -> Result<EntryPatch, HandlerErr> {
    let non_negative_patch = |key: &str| -> Result<Option<Option<f64>>, HandlerErr> {
        match helpers::patch_f64(patch, key)? {
            Some(Some(n)) if n < 0.0 => {
                Err(HandlerErr::bad_params(format!("patch.{key} must be >= 0")))
            }
            other => Ok(other),
        }
    };
    Ok(EntryPatch {
        raw_score: helpers::patch_f64(patch, "rawScore")?,
        points_earned: non_negative_patch("pointsEarned")?,
        points_possible: non_negative_patch("pointsPossible")?,
        percentage_score: helpers::patch_f64(patch, "percentageScore")?,
        letter_grade: helpers::patch_str(patch, "letterGrade")?
            .map(|l| l.filter(|s| !s.is_empty())),
        weight: non_negative_patch("weight")?,
        term: helpers::patch_i64(patch, "term")?,
        title: helpers::patch_str(patch, "title")?.map(|t| t.filter(|s| !s.is_empty())),
    })
}

fn handle_entries_derive(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::opt_str(&req.params, "gradeScaleId")?.filter(|s| !s.is_empty());
    let mut entry = parse_entry(&req.params)?;

    let scale = store::resolve_scale(conn, &school_id, scale_id.as_deref())?;
    let derivation = entry::derive(&mut entry, scale.as_ref());
    Ok(json!({
        "entry": helpers::to_value(&entry)?,
        "derivation": helpers::to_value(&derivation)?,
        "gradeScaleId": scale.map(|s| s.id),
    }))
}

fn handle_entries_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let p = &req.params;
    let new = NewEntry {
        school_id: helpers::school_id(p)?,
        student_id: helpers::req_str(p, "studentId")?,
        subject_id: helpers::opt_str(p, "subjectId")?.filter(|s| !s.is_empty()),
        term: helpers::opt_i64(p, "term")?,
        title: helpers::opt_str(p, "title")?.filter(|s| !s.is_empty()),
        grade_scale_id: helpers::opt_str(p, "gradeScaleId")?.filter(|s| !s.is_empty()),
        entry: parse_entry(p)?,
    };
    let (stored, derivation) = store::create_entry(conn, new)?;
    Ok(json!({
        "entry": helpers::to_value(&stored)?,
        "derivation": helpers::to_value(&derivation)?,
    }))
}

fn handle_entries_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let p = &req.params;
    let school_id = helpers::school_id(p)?;
    let filter = EntryFilter {
        student_id: helpers::opt_str(p, "studentId")?.filter(|s| !s.is_empty()),
        subject_id: helpers::opt_str(p, "subjectId")?.filter(|s| !s.is_empty()),
        term: helpers::opt_i64(p, "term")?,
    };
    let entries = store::list_entries(conn, &school_id, &filter)?;
    Ok(json!({ "entries": helpers::to_value(&entries)? }))
}

fn handle_entries_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let entry_id = helpers::req_str(&req.params, "gradeEntryId")?;
    let patch = parse_entry_patch(helpers::patch_obj(&req.params)?)?;
    let (stored, derivation) = store::update_entry(conn, &school_id, &entry_id, &patch)?;
    Ok(json!({
        "entry": helpers::to_value(&stored)?,
        "derivation": helpers::to_value(&derivation)?,
    }))
}

fn handle_entries_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let entry_id = helpers::req_str(&req.params, "gradeEntryId")?;
    store::delete_entry(conn, &school_id, &entry_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gradeEntries.derive" => Some(respond(&req.id, handle_entries_derive(state, req))),
        "gradeEntries.create" => Some(respond(&req.id, handle_entries_create(state, req))),
        "gradeEntries.list" => Some(respond(&req.id, handle_entries_list(state, req))),
        "gradeEntries.update" => Some(respond(&req.id, handle_entries_update(state, req))),
        "gradeEntries.delete" => Some(respond(&req.id, handle_entries_delete(state, req))),
        _ => None,
    }
}
