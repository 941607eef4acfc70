mod common;

use common::{str_at, Sidecar};
use serde_json::json;

#[test]
fn create_seeds_default_scale_and_first_system_is_primary() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-system-create");

    let created = sidecar.ok(
        "gradingSystems.create",
        json!({
            "schoolId": "s1",
            "name": "High School Letters",
            "systemType": "traditional_letter",
            "applicableGrades": ["9", "10", "11", "12"]
        }),
    );
    assert_eq!(created.pointer("/system/isPrimary").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(str_at(&created, "/system/systemType"), "traditional_letter");
    assert_eq!(str_at(&created, "/defaultScale/name"), "Standard Letter Grades");
    assert_eq!(created.pointer("/defaultScale/isDefault").and_then(|v| v.as_bool()), Some(true));

    let levels = created
        .pointer("/defaultScale/levels")
        .and_then(|v| v.as_array())
        .expect("levels");
    assert_eq!(levels.len(), 12);
    assert_eq!(str_at(&levels[0], "/gradeValue"), "A+");
    assert_eq!(str_at(&levels[11], "/gradeValue"), "F");
    let failing: Vec<_> = levels
        .iter()
        .filter(|l| l.get("isPassing").and_then(|v| v.as_bool()) == Some(false))
        .collect();
    assert_eq!(failing.len(), 1);

    let standards = sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Elementary", "systemType": "standards_based" }),
    );
    assert_eq!(standards.pointer("/system/isPrimary").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(str_at(&standards, "/defaultScale/scaleType"), "standards");
    let displays: Vec<_> = standards
        .pointer("/defaultScale/levels")
        .and_then(|v| v.as_array())
        .expect("levels")
        .iter()
        .map(|l| str_at(l, "/displayValue").to_string())
        .collect();
    assert_eq!(
        displays,
        vec![
            "Exceeds Standards",
            "Meets Standards",
            "Approaching Standards",
            "Below Standards"
        ]
    );

    let listed = sidecar.ok("gradingSystems.list", json!({ "schoolId": "s1" }));
    let systems = listed.get("systems").and_then(|v| v.as_array()).expect("systems");
    assert_eq!(systems.len(), 2);
    assert_eq!(str_at(&systems[0], "/name"), "High School Letters");
    assert_eq!(systems[0].pointer("/defaultScale/levelCount").and_then(|v| v.as_u64()), Some(12));
}

#[test]
fn set_primary_is_exclusive_and_primary_cannot_be_deleted() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-system-primary");

    let first = sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Letters", "systemType": "traditional_letter" }),
    );
    let first_id = str_at(&first, "/system/id").to_string();
    let second = sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Percent", "systemType": "percentage" }),
    );
    let second_id = str_at(&second, "/system/id").to_string();
    assert_eq!(
        second.pointer("/defaultScale/levels").and_then(|v| v.as_array()).map(|l| l.len()),
        Some(11)
    );

    sidecar.ok(
        "gradingSystems.setPrimary",
        json!({ "schoolId": "s1", "systemId": second_id }),
    );
    let listed = sidecar.ok("gradingSystems.list", json!({ "schoolId": "s1" }));
    let primaries: Vec<_> = listed
        .get("systems")
        .and_then(|v| v.as_array())
        .expect("systems")
        .iter()
        .filter(|s| s.get("isPrimary").and_then(|v| v.as_bool()) == Some(true))
        .map(|s| str_at(s, "/id").to_string())
        .collect();
    assert_eq!(primaries, vec![second_id.clone()]);

    assert_eq!(
        sidecar.err_code(
            "gradingSystems.delete",
            json!({ "schoolId": "s1", "systemId": second_id })
        ),
        "primary_system_delete"
    );

    sidecar.ok(
        "gradingSystems.delete",
        json!({ "schoolId": "s1", "systemId": first_id }),
    );
    assert_eq!(
        sidecar.err_code("gradingSystems.get", json!({ "schoolId": "s1", "systemId": first_id })),
        "not_found"
    );
    let scales = sidecar.ok("gradeScales.list", json!({ "schoolId": "s1" }));
    assert_eq!(scales.get("scales").and_then(|v| v.as_array()).map(|s| s.len()), Some(1));
}

#[test]
fn schools_are_isolated() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-system-tenants");
    let created = sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Letters", "systemType": "traditional_letter" }),
    );
    let system_id = str_at(&created, "/system/id").to_string();

    assert_eq!(
        sidecar.err_code("gradingSystems.get", json!({ "schoolId": "s2", "systemId": system_id })),
        "not_found"
    );
    assert_eq!(
        sidecar.err_code(
            "gradingSystems.setPrimary",
            json!({ "schoolId": "s2", "systemId": system_id })
        ),
        "not_found"
    );
    let other = sidecar.ok("gradingSystems.list", json!({ "schoolId": "s2" }));
    assert_eq!(other.get("systems").and_then(|v| v.as_array()).map(|s| s.len()), Some(0));
}

#[test]
fn update_and_unseeded_creation() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-system-update");
    let created = sidecar.ok(
        "gradingSystems.create",
        json!({
            "schoolId": "s1",
            "name": "Points",
            "systemType": "narrative",
            "seedLevels": false,
            "scaleConfiguration": { "passingThreshold": 50 }
        }),
    );
    assert_eq!(
        created.pointer("/defaultScale/levels").and_then(|v| v.as_array()).map(|l| l.len()),
        Some(0)
    );
    assert_eq!(
        created
            .pointer("/defaultScale/configuration/passingThreshold")
            .and_then(|v| v.as_f64()),
        Some(50.0)
    );
    let system_id = str_at(&created, "/system/id").to_string();

    let updated = sidecar.ok(
        "gradingSystems.update",
        json!({
            "schoolId": "s1",
            "systemId": system_id,
            "patch": {
                "name": "Narrative K-2",
                "description": "Report card comments",
                "applicableGrades": ["K", "1", "2"]
            }
        }),
    );
    assert_eq!(str_at(&updated, "/system/name"), "Narrative K-2");
    assert_eq!(str_at(&updated, "/system/applicableGrades/0"), "K");

    assert_eq!(
        sidecar.err_code(
            "gradingSystems.update",
            json!({ "schoolId": "s1", "systemId": system_id, "patch": { "isPrimary": false } })
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "gradingSystems.create",
            json!({ "schoolId": "s1", "name": "X", "systemType": "pass_fail" })
        ),
        "bad_params"
    );
}
