use super::scales::parse_scale_configuration;
use super::setup::grading_defaults;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::store::{self, NewSystem, SystemPatch};
use crate::system::SystemType;
use serde_json::{json, Value};

fn parse_system_type(params: &Value) -> Result<SystemType, HandlerErr> {
    let raw = helpers::req_str(params, "systemType")?;
    SystemType::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "systemType must be one of traditional_letter, percentage, points, \
             standards_based, narrative (got {raw})"
        ))
    })
}

fn configuration_object(v: Option<&Value>, key: &str) -> Result<Option<Value>, HandlerErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(_)) => Ok(v.cloned()),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be an object"))),
    }
}

fn handle_systems_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let systems = store::list_systems(conn, &school_id)?;

    let mut rows = Vec::with_capacity(systems.len());
    for sys in &systems {
        let scales = store::list_scales(conn, &school_id, Some(&sys.id))?;
        let default_scale = scales.iter().find(|s| s.is_default).map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "scaleType": s.scale_type,
                "levelCount": s.levels.len(),
            })
        });
        let mut row = helpers::to_value(sys)?;
        row["scaleCount"] = json!(scales.len());
        row["defaultScale"] = default_scale.unwrap_or(Value::Null);
        rows.push(row);
    }
    Ok(json!({ "systems": rows }))
}

fn handle_systems_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let system_id = helpers::req_str(&req.params, "systemId")?;
    let sys = store::get_system(conn, &school_id, &system_id)?;
    let scales = store::list_scales(conn, &school_id, Some(&system_id))?;
    Ok(json!({
        "system": helpers::to_value(&sys)?,
        "scales": helpers::to_value(&scales)?,
    }))
}

fn handle_systems_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let p = &req.params;
    let school_id = helpers::school_id(p)?;
    let name = helpers::req_str(p, "name")?;
    let system_type = parse_system_type(p)?;
    let defaults = grading_defaults(conn)?;

    let scale_config = parse_scale_configuration(p.get("scaleConfiguration"), defaults.scale)?;
    let seed_levels = helpers::opt_bool(p, "seedLevels")?.unwrap_or(defaults.seed_default_levels);
    let new = NewSystem {
        school_id,
        name,
        description: helpers::opt_str(p, "description")?.filter(|s| !s.is_empty()),
        system_type,
        make_primary: helpers::opt_bool(p, "makePrimary")?.unwrap_or(false),
        applicable_grades: helpers::opt_string_list(p, "applicableGrades")?.unwrap_or_default(),
        applicable_subjects: helpers::opt_string_list(p, "applicableSubjects")?.unwrap_or_default(),
        configuration: configuration_object(p.get("configuration"), "configuration")?
            .unwrap_or_else(|| json!({})),
    };

    let (sys, scale) = store::create_system(conn, new, scale_config, seed_levels)?;
    Ok(json!({
        "system": helpers::to_value(&sys)?,
        "defaultScale": helpers::to_value(&scale)?,
    }))
}

fn handle_systems_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let system_id = helpers::req_str(&req.params, "systemId")?;
    let patch = helpers::patch_obj(&req.params)?;

    let mut update = SystemPatch {
        name: helpers::patch_required_str(patch, "name")?,
        description: helpers::patch_str(patch, "description")?.map(|d| d.filter(|s| !s.is_empty())),
        ..Default::default()
    };
    for key in ["systemType", "isPrimary"] {
        if patch.contains_key(key) {
            return Err(HandlerErr::bad_params(format!(
                "patch.{key} cannot be changed with gradingSystems.update"
            )));
        }
    }
    let patch_value = Value::Object(patch.clone());
    update.applicable_grades = helpers::opt_string_list(&patch_value, "applicableGrades")?;
    update.applicable_subjects = helpers::opt_string_list(&patch_value, "applicableSubjects")?;
    update.configuration = configuration_object(patch.get("configuration"), "patch.configuration")?;

    let sys = store::update_system(conn, &school_id, &system_id, &update)?;
    Ok(json!({ "system": helpers::to_value(&sys)? }))
}

fn handle_systems_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let system_id = helpers::req_str(&req.params, "systemId")?;
    store::delete_system(conn, &school_id, &system_id)?;
    Ok(json!({ "ok": true }))
}

fn handle_systems_set_primary(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let system_id = helpers::req_str(&req.params, "systemId")?;
    store::set_primary_system(conn, &school_id, &system_id)?;
    let sys = store::get_system(conn, &school_id, &system_id)?;
    Ok(json!({ "system": helpers::to_value(&sys)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gradingSystems.list" => Some(respond(&req.id, handle_systems_list(state, req))),
        "gradingSystems.get" => Some(respond(&req.id, handle_systems_get(state, req))),
        "gradingSystems.create" => Some(respond(&req.id, handle_systems_create(state, req))),
        "gradingSystems.update" => Some(respond(&req.id, handle_systems_update(state, req))),
        "gradingSystems.delete" => Some(respond(&req.id, handle_systems_delete(state, req))),
        "gradingSystems.setPrimary" => {
            Some(respond(&req.id, handle_systems_set_primary(state, req)))
        }
        _ => None,
    }
}
