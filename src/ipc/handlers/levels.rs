use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::scale::GradeLevel;
use crate::store::{self, LevelPatch};
use serde_json::{json, Value};

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

/// Builds a level from request JSON. `isPassing` defaults to whether the band
/// starts at or above the scale's passing threshold; a missing `sortOrder`
/// is left negative so the store appends the level.
pub fn parse_level(v: &Value, passing_threshold: f64) -> Result<GradeLevel, HandlerErr> {
    if !v.is_object() {
        return Err(HandlerErr::bad_params("level must be an object"));
    }
    let grade_value = helpers::req_str(v, "gradeValue")?;
    let percentage_min = helpers::req_f64(v, "percentageMin")?;
    let percentage_max = helpers::req_f64(v, "percentageMax")?;
    Ok(GradeLevel {
        id: String::new(),
        display_value: non_empty(helpers::opt_str(v, "displayValue")?)
            .unwrap_or_else(|| grade_value.clone()),
        grade_value,
        numeric_value: helpers::opt_f64(v, "numericValue")?,
        gpa_points: helpers::opt_f64(v, "gpaPoints")?,
        percentage_min,
        percentage_max,
        description: non_empty(helpers::opt_str(v, "description")?),
        color_code: non_empty(helpers::opt_str(v, "colorCode")?),
        is_passing: helpers::opt_bool(v, "isPassing")?
            .unwrap_or(percentage_min >= passing_threshold),
        sort_order: helpers::opt_i64(v, "sortOrder")?.unwrap_or(-1),
    })
}

fn parse_level_patch(patch: &serde_json::Map<String, Value>) -> Result<LevelPatch, HandlerErr> {
    let required_f64 = |key: &str| -> Result<Option<f64>, HandlerErr> {
        match helpers::patch_f64(patch, key)? {
            None => Ok(None),
            Some(Some(n)) => Ok(Some(n)),
            Some(None) => Err(HandlerErr::bad_params(format!("patch.{key} must not be null"))),
        }
    };
    let is_passing = match patch.get("isPassing") {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(HandlerErr::bad_params("patch.isPassing must be boolean")),
    };
    let sort_order = match helpers::patch_i64(patch, "sortOrder")? {
        None => None,
        Some(Some(n)) if n >= 0 => Some(n),
        Some(_) => return Err(HandlerErr::bad_params("patch.sortOrder must be >= 0")),
    };
    Ok(LevelPatch {
        grade_value: helpers::patch_required_str(patch, "gradeValue")?,
        display_value: helpers::patch_required_str(patch, "displayValue")?,
        numeric_value: helpers::patch_f64(patch, "numericValue")?,
        gpa_points: helpers::patch_f64(patch, "gpaPoints")?,
        percentage_min: required_f64("percentageMin")?,
        percentage_max: required_f64("percentageMax")?,
        description: helpers::patch_str(patch, "description")?.map(non_empty),
        color_code: helpers::patch_str(patch, "colorCode")?.map(non_empty),
        is_passing,
        sort_order,
    })
}

fn handle_levels_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    let scale = store::load_scale(conn, &school_id, &scale_id)?;
    let raw = req
        .params
        .get("level")
        .ok_or_else(|| HandlerErr::bad_params("missing level"))?;
    let level = parse_level(raw, scale.configuration.passing_threshold)?;
    let level = store::create_level(conn, &school_id, &scale_id, level)?;
    Ok(json!({ "level": helpers::to_value(&level)? }))
}

fn handle_levels_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let level_id = helpers::req_str(&req.params, "gradeLevelId")?;
    let patch = parse_level_patch(helpers::patch_obj(&req.params)?)?;
    let level = store::update_level(conn, &school_id, &level_id, &patch)?;
    Ok(json!({ "level": helpers::to_value(&level)? }))
}

fn handle_levels_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let level_id = helpers::req_str(&req.params, "gradeLevelId")?;
    store::delete_level(conn, &school_id, &level_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gradeLevels.create" => Some(respond(&req.id, handle_levels_create(state, req))),
        "gradeLevels.update" => Some(respond(&req.id, handle_levels_update(state, req))),
        "gradeLevels.delete" => Some(respond(&req.id, handle_levels_delete(state, req))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_defaults_follow_the_passing_threshold() {
        let pass = parse_level(
            &json!({ "gradeValue": "P", "percentageMin": 60, "percentageMax": 100 }),
            60.0,
        )
        .expect("pass level");
        assert!(pass.is_passing);
        assert_eq!(pass.display_value, "P");
        assert_eq!(pass.sort_order, -1);

        let fail = parse_level(
            &json!({
                "gradeValue": "F",
                "percentageMin": 0,
                "percentageMax": 59.9,
                "colorCode": ""
            }),
            60.0,
        )
        .expect("fail level");
        assert!(!fail.is_passing);
        assert_eq!(fail.color_code, None);
    }

    #[test]
    fn level_requires_bounds() {
        let e = parse_level(&json!({ "gradeValue": "A" }), 60.0).expect_err("no bounds");
        assert_eq!(e.code, "bad_params");
    }

    #[test]
    fn patch_distinguishes_clearing_from_leaving() {
        let patch = json!({ "gpaPoints": null, "description": "Top band" });
        let parsed = parse_level_patch(patch.as_object().expect("object")).expect("patch");
        assert_eq!(parsed.gpa_points, Some(None));
        assert_eq!(parsed.numeric_value, None);
        assert_eq!(parsed.description, Some(Some("Top band".to_string())));

        let bad = json!({ "percentageMin": null });
        assert!(parse_level_patch(bad.as_object().expect("object")).is_err());
    }
}
