mod common;

use common::{f64_at, str_at, Sidecar};
use serde_json::json;

#[test]
fn calculate_over_the_primary_default_scale() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-gpa-calc");
    sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Letters", "systemType": "traditional_letter" }),
    );

    let empty = sidecar.ok("gpa.calculate", json!({ "schoolId": "s1", "entries": [] }));
    assert_eq!(f64_at(&empty, "/gpa"), 0.0);
    assert_eq!(empty.get("includedCount").and_then(|v| v.as_u64()), Some(0));

    let single = sidecar.ok(
        "gpa.calculate",
        json!({ "schoolId": "s1", "entries": [{ "percentage": 95, "credits": 1 }] }),
    );
    assert_eq!(f64_at(&single, "/gpa"), 4.0);

    let pair = sidecar.ok(
        "gpa.calculate",
        json!({ "schoolId": "s1", "entries": [{ "percentage": 95 }, { "percentage": 65 }] }),
    );
    assert_eq!(f64_at(&pair, "/gpa"), 2.5);
    assert_eq!(pair.get("lines").and_then(|v| v.as_array()).map(|l| l.len()), Some(2));

    let weighted = sidecar.ok(
        "gpa.calculate",
        json!({
            "schoolId": "s1",
            "entries": [{ "percentage": 95, "credits": 3 }, { "percentage": 85, "credits": 1 }],
            "includeLines": false
        }),
    );
    assert_eq!(f64_at(&weighted, "/gpa"), 3.75);
    assert!(weighted.get("lines").is_none());

    // 96.95 falls between A (93-96.9) and A+ (97-100) and is skipped.
    let skipped = sidecar.ok(
        "gpa.calculate",
        json!({ "schoolId": "s1", "entries": [{ "percentage": 96.95 }, { "percentage": 85 }] }),
    );
    assert_eq!(f64_at(&skipped, "/gpa"), 3.0);
    assert_eq!(skipped.get("skippedCount").and_then(|v| v.as_u64()), Some(1));

    assert_eq!(
        sidecar.err_code(
            "gpa.calculate",
            json!({ "schoolId": "s1", "entries": [{ "percentage": 95, "credits": -1 }] })
        ),
        "bad_params"
    );
}

#[test]
fn narrative_scale_yields_zero() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-gpa-narrative");
    sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Comments", "systemType": "narrative" }),
    );
    let gpa = sidecar.ok(
        "gpa.calculate",
        json!({ "schoolId": "s1", "entries": [{ "percentage": 95 }, { "percentage": 70 }] }),
    );
    assert_eq!(f64_at(&gpa, "/gpa"), 0.0);
    assert_eq!(gpa.get("includedCount").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(gpa.get("skippedCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(str_at(&gpa, "/lines/0/gradeValue"), "O");
}

#[test]
fn missing_scale_is_not_an_error() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-gpa-no-scale");
    let gpa = sidecar.ok(
        "gpa.calculate",
        json!({ "schoolId": "s1", "entries": [{ "percentage": 95 }] }),
    );
    assert_eq!(f64_at(&gpa, "/gpa"), 0.0);
    assert!(gpa.get("gradeScaleId").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn student_gpa_weights_subjects_by_credit_hours() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-gpa-student");
    sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Letters", "systemType": "traditional_letter" }),
    );
    let math = sidecar.ok(
        "subjects.create",
        json!({ "schoolId": "s1", "name": "Math", "code": "MTH", "creditHours": 3 }),
    );
    let math_id = str_at(&math, "/subject/id").to_string();
    let art = sidecar.ok("subjects.create", json!({ "schoolId": "s1", "name": "Art" }));
    let art_id = str_at(&art, "/subject/id").to_string();

    let rows = [
        (&math_id, 94, 1),
        (&math_id, 96, 1),
        (&art_id, 85, 1),
        (&art_id, 40, 2),
    ];
    for (subject, pct, term) in rows {
        sidecar.ok(
            "gradeEntries.create",
            json!({
                "schoolId": "s1",
                "studentId": "stu-1",
                "subjectId": subject,
                "term": term,
                "percentageScore": pct
            }),
        );
    }

    let term1 = sidecar.ok(
        "gpa.student",
        json!({ "schoolId": "s1", "studentId": "stu-1", "term": 1 }),
    );
    assert_eq!(f64_at(&term1, "/gpa"), 3.75);
    let subjects = term1.get("subjects").and_then(|v| v.as_array()).expect("subjects");
    assert_eq!(subjects.len(), 2);
    let math_row = subjects
        .iter()
        .find(|s| s.get("subjectName").and_then(|v| v.as_str()) == Some("Math"))
        .expect("math row");
    assert_eq!(f64_at(math_row, "/percentage"), 95.0);
    assert_eq!(f64_at(math_row, "/credits"), 3.0);

    // Art without credit hours uses the workspace default.
    sidecar.ok(
        "setup.update",
        json!({ "section": "gpa", "patch": { "defaultCreditHours": 3 } }),
    );
    let even = sidecar.ok(
        "gpa.student",
        json!({ "schoolId": "s1", "studentId": "stu-1", "term": 1 }),
    );
    assert_eq!(f64_at(&even, "/gpa"), 3.5);

    let nobody = sidecar.ok("gpa.student", json!({ "schoolId": "s1", "studentId": "stu-9" }));
    assert_eq!(f64_at(&nobody, "/gpa"), 0.0);
    assert_eq!(nobody.get("subjects").and_then(|v| v.as_array()).map(|s| s.len()), Some(0));
}
