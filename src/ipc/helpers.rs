use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::Connection;
use serde_json::{Map, Value};

pub fn db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or(HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".into(),
        details: None,
    })
}

pub fn req_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let Some(v) = params.get(key).and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params(format!("missing {key}")));
    };
    let v = v.trim();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{key} must not be empty")));
    }
    Ok(v.to_string())
}

pub fn school_id(params: &Value) -> Result<String, HandlerErr> {
    req_str(params, "schoolId")
}

pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be a string or null"))),
    }
}

fn finite(v: &Value, key: &str) -> Result<f64, HandlerErr> {
    match v.as_f64() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(HandlerErr::bad_params(format!("{key} must be a number"))),
    }
}

pub fn opt_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => finite(v, key).map(Some),
    }
}

pub fn req_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    opt_f64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer"))),
    }
}

pub fn opt_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be boolean"))),
    }
}

pub fn opt_string_list(params: &Value, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| {
                        HandlerErr::bad_params(format!("{key} must be a list of strings"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be a list of strings"))),
    }
}

pub fn patch_obj(params: &Value) -> Result<&Map<String, Value>, HandlerErr> {
    params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing/invalid patch"))
}

/// Absent => `None`, explicit null => `Some(None)`.
pub fn patch_f64(
    patch: &Map<String, Value>,
    key: &str,
) -> Result<Option<Option<f64>>, HandlerErr> {
    match patch.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => finite(v, &format!("patch.{key}")).map(|n| Some(Some(n))),
    }
}

pub fn patch_i64(
    patch: &Map<String, Value>,
    key: &str,
) -> Result<Option<Option<i64>>, HandlerErr> {
    match patch.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => v
            .as_i64()
            .map(|n| Some(Some(n)))
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("patch.{key} must be an integer or null"))
            }),
    }
}

pub fn patch_str(
    patch: &Map<String, Value>,
    key: &str,
) -> Result<Option<Option<String>>, HandlerErr> {
    match patch.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.trim().to_string()))),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "patch.{key} must be a string or null"
        ))),
    }
}

/// Like `patch_str` but null is not allowed and the value must be non-empty.
pub fn patch_required_str(
    patch: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match patch_str(patch, key)? {
        None => Ok(None),
        Some(Some(s)) if !s.is_empty() => Ok(Some(s)),
        Some(_) => Err(HandlerErr::bad_params(format!("patch.{key} must not be empty"))),
    }
}

pub fn to_value<T: serde::Serialize>(v: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })
}
