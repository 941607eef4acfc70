use super::setup::grading_defaults;
use crate::gpa::{self, GpaInput, GpaSummary};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::{json, Value};
use tracing::warn;

fn parse_gpa_inputs(params: &Value, default_credits: f64) -> Result<Vec<GpaInput>, HandlerErr> {
    let Some(items) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(HandlerErr::bad_params(format!("entries[{i}] must be an object")));
            }
            let percentage = helpers::req_f64(item, "percentage")
                .map_err(|e| HandlerErr::bad_params(format!("entries[{i}]: {}", e.message)))?;
            let credits = helpers::opt_f64(item, "credits")
                .map_err(|e| HandlerErr::bad_params(format!("entries[{i}]: {}", e.message)))?
                .unwrap_or(default_credits);
            if credits < 0.0 {
                return Err(HandlerErr::bad_params(format!(
                    "entries[{i}]: credits must be >= 0"
                )));
            }
            Ok(GpaInput { percentage, credits })
        })
        .collect()
}

fn summary_json(
    summary: GpaSummary,
    scale_id: Option<String>,
    include_lines: bool,
) -> Result<Value, HandlerErr> {
    let mut out = helpers::to_value(&summary)?;
    out["gradeScaleId"] = json!(scale_id);
    if !include_lines {
        if let Some(obj) = out.as_object_mut() {
            obj.remove("lines");
        }
    }
    Ok(out)
}

fn handle_gpa_calculate(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let defaults = grading_defaults(conn)?;
    let inputs = parse_gpa_inputs(&req.params, defaults.default_credit_hours)?;
    let scale_id = helpers::opt_str(&req.params, "gradeScaleId")?.filter(|s| !s.is_empty());
    let include_lines =
        helpers::opt_bool(&req.params, "includeLines")?.unwrap_or(defaults.include_lines);

    let scale = store::resolve_scale(conn, &school_id, scale_id.as_deref())?;
    if scale.is_none() && !inputs.is_empty() {
        warn!(%school_id, entries = inputs.len(), "gpa requested without an active grade scale");
    }
    let summary = gpa::gpa_summary(&inputs, scale.as_ref());
    summary_json(summary, scale.map(|s| s.id), include_lines)
}

fn handle_gpa_student(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = helpers::db(state)?;
    let school_id = helpers::school_id(&req.params)?;
    let student_id = helpers::req_str(&req.params, "studentId")?;
    let term = helpers::opt_i64(&req.params, "term")?;
    let scale_id = helpers::opt_str(&req.params, "gradeScaleId")?.filter(|s| !s.is_empty());
    let defaults = grading_defaults(conn)?;
    let include_lines =
        helpers::opt_bool(&req.params, "includeLines")?.unwrap_or(defaults.include_lines);

    let averages = store::student_subject_averages(
        conn,
        &school_id,
        &student_id,
        term,
        defaults.default_credit_hours,
    )?;
    let scale = store::resolve_scale(conn, &school_id, scale_id.as_deref())?;
    if scale.is_none() && !averages.is_empty() {
        warn!(%school_id, %student_id, "student gpa requested without an active grade scale");
    }
    let summary = gpa::gpa_summary(&store::gpa_inputs(&averages), scale.as_ref());

    let mut out = summary_json(summary, scale.map(|s| s.id), include_lines)?;
    out["studentId"] = json!(student_id);
    out["term"] = json!(term);
    out["subjects"] = helpers::to_value(&averages)?;
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gpa.calculate" => Some(respond(&req.id, handle_gpa_calculate(state, req))),
        "gpa.student" => Some(respond(&req.id, handle_gpa_student(state, req))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_fall_back_to_the_workspace_default() {
        let params = json!({
            "entries": [{ "percentage": 95 }, { "percentage": 65, "credits": 3 }]
        });
        let inputs = parse_gpa_inputs(&params, 1.5).expect("inputs");
        assert_eq!(inputs[0].credits, 1.5);
        assert_eq!(inputs[1].credits, 3.0);
    }

    #[test]
    fn negative_credits_and_missing_percentages_are_rejected() {
        let neg = json!({ "entries": [{ "percentage": 95, "credits": -1 }] });
        let e = parse_gpa_inputs(&neg, 1.0).expect_err("negative credits");
        assert!(e.message.starts_with("entries[0]"), "{}", e.message);
        let missing = json!({ "entries": [{ "credits": 1 }] });
        assert!(parse_gpa_inputs(&missing, 1.0).is_err());
        assert!(parse_gpa_inputs(&json!({}), 1.0).is_err());
    }
}
