use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::{json, Value};

fn credit_hours(v: Option<f64>) -> Result<Option<f64>, HandlerErr> {
    match v {
        Some(n) if n < 0.0 => Err(HandlerErr::bad_params("creditHours must be >= 0")),
        other => Ok(other),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let subjects = store::list_subjects(conn, &school_id)?;
    Ok(json!({ "subjects": helpers::to_value(&subjects)? }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let name = helpers::req_str(&req.params, "name")?;
    let code = helpers::opt_str(&req.params, "code")?.filter(|c| !c.is_empty());
    let credits = credit_hours(helpers::opt_f64(&req.params, "creditHours")?)?;
    let subject = store::create_subject(conn, &school_id, code, name, credits)?;
    Ok(json!({ "subject": helpers::to_value(&subject)? }))
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let subject_id = helpers::req_str(&req.params, "subjectId")?;
    let patch = helpers::patch_obj(&req.params)?;

    let name = helpers::patch_required_str(patch, "name")?;
    let code = helpers::patch_str(patch, "code")?.map(|c| c.filter(|s| !s.is_empty()));
    let credits = match helpers::patch_f64(patch, "creditHours")? {
        Some(v) => Some(credit_hours(v)?),
        None => None,
    };
    let subject = store::update_subject(conn, &school_id, &subject_id, name, code, credits)?;
    Ok(json!({ "subject": helpers::to_value(&subject)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(&req.id, handle_subjects_list(state, req))),
        "subjects.create" => Some(respond(&req.id, handle_subjects_create(state, req))),
        "subjects.update" => Some(respond(&req.id, handle_subjects_update(state, req))),
        _ => None,
    }
}
