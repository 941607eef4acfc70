use super::levels::parse_level;
use super::setup::grading_defaults;
use crate::error::GradingError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::scale::{GradeLevel, ScaleConfiguration, ScaleType};
use crate::store::{self, NewScale, ScalePatch};
use crate::templates;
use serde_json::{json, Value};
use tracing::warn;

/// Reads an optional configuration object; fields left out keep `defaults`.
pub fn parse_scale_configuration(
    v: Option<&Value>,
    defaults: ScaleConfiguration,
) -> Result<ScaleConfiguration, HandlerErr> {
    let obj = match v {
        None | Some(Value::Null) => return Ok(defaults),
        Some(Value::Object(obj)) => obj,
        Some(_) => return Err(HandlerErr::bad_params("configuration must be an object")),
    };
    let mut cfg = defaults;
    for (k, v) in obj {
        match k.as_str() {
            "passingThreshold" => {
                let n = v.as_f64().filter(|n| (0.0..=100.0).contains(n)).ok_or_else(|| {
                    HandlerErr::bad_params("passingThreshold must be a number in 0..=100")
                })?;
                cfg.passing_threshold = n;
            }
            "gpaScaleMax" => {
                let n = v.as_f64().filter(|n| *n > 0.0 && *n <= 10.0).ok_or_else(|| {
                    HandlerErr::bad_params("gpaScaleMax must be a number in (0, 10]")
                })?;
                cfg.gpa_scale_max = n;
            }
            "decimalPlaces" => {
                let n = v.as_u64().filter(|n| *n <= 4).ok_or_else(|| {
                    HandlerErr::bad_params("decimalPlaces must be an integer in 0..=4")
                })?;
                cfg.decimal_places = n as u32;
            }
            other => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown configuration field: {other}"
                )))
            }
        }
    }
    Ok(cfg)
}

fn parse_scale_type(params: &Value) -> Result<ScaleType, HandlerErr> {
    let raw = helpers::req_str(params, "scaleType")?;
    ScaleType::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "scaleType must be one of letter, percentage, points, standards (got {raw})"
        ))
    })
}

fn parse_levels(
    params: &Value,
    scale_type: ScaleType,
    cfg: &ScaleConfiguration,
) -> Result<Vec<GradeLevel>, HandlerErr> {
    let use_template = helpers::opt_bool(params, "useTemplate")?.unwrap_or(false);
    let mut levels = match params.get("levels") {
        None | Some(Value::Null) if use_template => templates::levels_for_scale_type(scale_type),
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            if use_template {
                return Err(HandlerErr::bad_params(
                    "levels and useTemplate are mutually exclusive",
                ));
            }
            items
                .iter()
                .map(|item| parse_level(item, cfg.passing_threshold))
                .collect::<Result<Vec<_>, _>>()?
        }
        Some(_) => return Err(HandlerErr::bad_params("levels must be an array")),
    };
    for (i, level) in levels.iter_mut().enumerate() {
        if level.sort_order < 0 {
            level.sort_order = i as i64;
        }
    }
    Ok(levels)
}

fn handle_scales_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let system_id = helpers::opt_str(&req.params, "systemId")?.filter(|s| !s.is_empty());
    let scales = store::list_scales(conn, &school_id, system_id.as_deref())?;
    Ok(json!({ "scales": helpers::to_value(&scales)? }))
}

fn handle_scales_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    let scale = store::load_scale(conn, &school_id, &scale_id)?;
    Ok(json!({ "scale": helpers::to_value(&scale)? }))
}

fn handle_scales_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let p = &req.params;
    let school_id = helpers::school_id(p)?;
    let name = helpers::req_str(p, "name")?;
    let scale_type = parse_scale_type(p)?;
    let defaults = grading_defaults(conn)?;
    let configuration = parse_scale_configuration(p.get("configuration"), defaults.scale)?;
    let levels = parse_levels(p, scale_type, &configuration)?;

    let scale = store::create_scale(
        conn,
        NewScale {
            school_id,
            grading_system_id: helpers::opt_str(p, "systemId")?.filter(|s| !s.is_empty()),
            name,
            scale_type,
            configuration,
            make_default: helpers::opt_bool(p, "makeDefault")?.unwrap_or(false),
            levels,
        },
    )?;
    Ok(json!({ "scale": helpers::to_value(&scale)? }))
}

fn handle_scales_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    let patch = helpers::patch_obj(&req.params)?;
    for key in ["scaleType", "isDefault", "levels"] {
        if patch.contains_key(key) {
            return Err(HandlerErr::bad_params(format!(
                "patch.{key} cannot be changed with gradeScales.update"
            )));
        }
    }

    let configuration = match patch.get("configuration") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let current = store::load_scale(conn, &school_id, &scale_id)?;
            Some(parse_scale_configuration(Some(v), current.configuration)?)
        }
    };
    let update = ScalePatch {
        name: helpers::patch_required_str(patch, "name")?,
        configuration,
    };
    let scale = store::update_scale(conn, &school_id, &scale_id, &update)?;
    Ok(json!({ "scale": helpers::to_value(&scale)? }))
}

fn handle_scales_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    store::delete_scale(conn, &school_id, &scale_id)?;
    Ok(json!({ "ok": true }))
}

fn handle_scales_set_default(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    store::set_default_scale(conn, &school_id, &scale_id)?;
    let scale = store::load_scale(conn, &school_id, &scale_id)?;
    Ok(json!({ "scale": helpers::to_value(&scale)? }))
}

fn handle_scales_lookup(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let percentage = helpers::req_f64(&req.params, "percentage")?;
    let scale_id = helpers::opt_str(&req.params, "gradeScaleId")?.filter(|s| !s.is_empty());

    let Some(scale) = store::resolve_scale(conn, &school_id, scale_id.as_deref())? else {
        warn!(%school_id, "lookup without an active grade scale");
        return Err(GradingError::NoActiveScale.into());
    };
    let level = match scale.lookup(percentage) {
        Ok(level) => Some(helpers::to_value(level)?),
        Err(GradingError::NotFoundInScale(_)) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(json!({
        "gradeScaleId": scale.id,
        "percentage": percentage,
        "displayPercentage": scale.configuration.display_percentage(percentage),
        "found": level.is_some(),
        "level": level,
    }))
}

fn handle_scales_coverage(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let scale_id = helpers::req_str(&req.params, "gradeScaleId")?;
    let scale = store::load_scale(conn, &school_id, &scale_id)?;
    let gaps = scale.coverage_gaps();
    Ok(json!({
        "gradeScaleId": scale.id,
        "complete": gaps.is_empty(),
        "gaps": helpers::to_value(&gaps)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gradeScales.list" => Some(respond(&req.id, handle_scales_list(state, req))),
        "gradeScales.get" => Some(respond(&req.id, handle_scales_get(state, req))),
        "gradeScales.create" => Some(respond(&req.id, handle_scales_create(state, req))),
        "gradeScales.update" => Some(respond(&req.id, handle_scales_update(state, req))),
        "gradeScales.delete" => Some(respond(&req.id, handle_scales_delete(state, req))),
        "gradeScales.setDefault" => Some(respond(&req.id, handle_scales_set_default(state, req))),
        "gradeScales.lookup" => Some(respond(&req.id, handle_scales_lookup(state, req))),
        "gradeScales.coverage" => Some(respond(&req.id, handle_scales_coverage(state, req))),
        _ => None,
    }
}
