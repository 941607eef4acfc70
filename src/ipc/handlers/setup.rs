use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scale::ScaleConfiguration;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Gpa,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "gpa" => Some(Self::Gpa),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Gpa => "setup.gpa",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "passingThreshold": 60.0,
            "gpaScaleMax": 4.0,
            "decimalPlaces": 2,
            "seedDefaultLevels": true
        }),
        SetupSection::Gpa => json!({
            "defaultCreditHours": 1.0,
            "includeLines": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{} must be a number", key))?;
    if n < min || n > max {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "passingThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                "gpaScaleMax" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 1.0, 10.0)?));
                }
                "decimalPlaces" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 4)?));
                }
                "seedDefaultLevels" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Gpa => match k.as_str() {
                "defaultCreditHours" => {
                    let n = parse_f64_range(v, k, 0.0, 20.0)?;
                    if n <= 0.0 {
                        return Err(format!("{} must be greater than 0", k));
                    }
                    obj.insert(k.clone(), Value::from(n));
                }
                "includeLines" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown gpa field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Field by field, so one malformed historical value does not drop the rest.
            for (k, v) in saved_obj {
                let single: Map<String, Value> = std::iter::once((k.clone(), v.clone())).collect();
                let _ = merge_section_patch(section, &mut current, &single);
            }
        }
    }
    Ok(current)
}

/// Effective workspace defaults used when a request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingDefaults {
    pub scale: ScaleConfiguration,
    pub seed_default_levels: bool,
    pub default_credit_hours: f64,
    pub include_lines: bool,
}

pub fn grading_defaults(conn: &rusqlite::Connection) -> anyhow::Result<GradingDefaults> {
    let grading = load_section(conn, SetupSection::Grading)?;
    let gpa = load_section(conn, SetupSection::Gpa)?;
    let fallback = ScaleConfiguration::default();
    Ok(GradingDefaults {
        scale: ScaleConfiguration {
            passing_threshold: grading["passingThreshold"]
                .as_f64()
                .unwrap_or(fallback.passing_threshold),
            gpa_scale_max: grading["gpaScaleMax"].as_f64().unwrap_or(fallback.gpa_scale_max),
            decimal_places: grading["decimalPlaces"]
                .as_u64()
                .map(|n| n as u32)
                .unwrap_or(fallback.decimal_places),
        },
        seed_default_levels: grading["seedDefaultLevels"].as_bool().unwrap_or(true),
        default_credit_hours: gpa["defaultCreditHours"].as_f64().unwrap_or(1.0),
        include_lines: gpa["includeLines"].as_bool().unwrap_or(true),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grading = match load_section(conn, SetupSection::Grading) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let gpa = match load_section(conn, SetupSection::Gpa) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "grading": grading, "gpa": gpa }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
