mod common;

use common::{f64_at, str_at, Sidecar};
use serde_json::json;

fn letter_school(sidecar: &mut Sidecar) {
    sidecar.ok(
        "gradingSystems.create",
        json!({ "schoolId": "s1", "name": "Letters", "systemType": "traditional_letter" }),
    );
}

#[test]
fn derive_fills_percentage_and_letter_from_points() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-derive");
    letter_school(&mut sidecar);

    let derived = sidecar.ok(
        "gradeEntries.derive",
        json!({ "schoolId": "s1", "pointsEarned": 45, "pointsPossible": 50 }),
    );
    assert_eq!(f64_at(&derived, "/entry/percentageScore"), 90.0);
    assert_eq!(str_at(&derived, "/entry/letterGrade"), "A-");
    assert_eq!(str_at(&derived, "/derivation/percentageSource"), "points");
    assert_eq!(derived.pointer("/derivation/letterDerived").and_then(|v| v.as_bool()), Some(true));

    // Feeding the result back changes nothing.
    let mut again_params = derived.get("entry").cloned().expect("entry");
    again_params["schoolId"] = json!("s1");
    let again = sidecar.ok("gradeEntries.derive", again_params);
    assert_eq!(again.get("entry"), derived.get("entry"));
    assert_eq!(again.pointer("/derivation/letterDerived").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(str_at(&again, "/derivation/percentageSource"), "supplied");
}

#[test]
fn derive_precedence_clamp_and_supplied_letters() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-derive-precedence");
    letter_school(&mut sidecar);

    let raw = sidecar.ok("gradeEntries.derive", json!({ "schoolId": "s1", "rawScore": 130 }));
    assert_eq!(f64_at(&raw, "/entry/percentageScore"), 100.0);
    assert_eq!(str_at(&raw, "/entry/letterGrade"), "A+");
    assert_eq!(str_at(&raw, "/derivation/percentageSource"), "raw_score");

    let points_win = sidecar.ok(
        "gradeEntries.derive",
        json!({ "schoolId": "s1", "rawScore": 10, "pointsEarned": 40, "pointsPossible": 50 }),
    );
    assert_eq!(f64_at(&points_win, "/entry/percentageScore"), 80.0);

    let supplied = sidecar.ok(
        "gradeEntries.derive",
        json!({ "schoolId": "s1", "percentageScore": 72, "letterGrade": "B" }),
    );
    assert_eq!(str_at(&supplied, "/entry/letterGrade"), "B");
    assert_eq!(
        supplied.pointer("/derivation/letterDerived").and_then(|v| v.as_bool()),
        Some(false)
    );

    let nothing = sidecar.ok("gradeEntries.derive", json!({ "schoolId": "s1", "weight": 2 }));
    assert!(nothing.pointer("/entry/percentageScore").map(|v| v.is_null()).unwrap_or(false));
    assert!(nothing.pointer("/entry/letterGrade").map(|v| v.is_null()).unwrap_or(false));

    let gap = sidecar.ok(
        "gradeEntries.derive",
        json!({ "schoolId": "s1", "percentageScore": 89.95 }),
    );
    assert!(gap.pointer("/entry/letterGrade").map(|v| v.is_null()).unwrap_or(false));

    assert_eq!(
        sidecar.err_code(
            "gradeEntries.derive",
            json!({ "schoolId": "s1", "pointsEarned": 55, "pointsPossible": 50 })
        ),
        "bad_params"
    );
}

#[test]
fn derive_without_a_scale_only_computes_the_percentage() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-derive-no-scale");
    let derived = sidecar.ok(
        "gradeEntries.derive",
        json!({ "schoolId": "nobody", "pointsEarned": 18, "pointsPossible": 20 }),
    );
    assert_eq!(f64_at(&derived, "/entry/percentageScore"), 90.0);
    assert!(derived.pointer("/entry/letterGrade").map(|v| v.is_null()).unwrap_or(false));
    assert!(derived.get("gradeScaleId").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn stored_entries_are_derived_on_write() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-entries");
    letter_school(&mut sidecar);

    let created = sidecar.ok(
        "gradeEntries.create",
        json!({
            "schoolId": "s1",
            "studentId": "stu-1",
            "term": 1,
            "title": "Unit 1 test",
            "pointsEarned": 45,
            "pointsPossible": 50
        }),
    );
    let entry_id = str_at(&created, "/entry/id").to_string();
    assert_eq!(str_at(&created, "/entry/letterGrade"), "A-");
    assert!(created.pointer("/entry/gradeScaleId").and_then(|v| v.as_str()).is_some());
    sidecar.ok(
        "gradeEntries.create",
        json!({ "schoolId": "s1", "studentId": "stu-2", "term": 1, "percentageScore": 50 }),
    );

    let listed = sidecar.ok("gradeEntries.list", json!({ "schoolId": "s1", "studentId": "stu-1" }));
    let entries = listed.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(str_at(&entries[0], "/title"), "Unit 1 test");

    let all = sidecar.ok("gradeEntries.list", json!({ "schoolId": "s1", "term": 1 }));
    assert_eq!(all.get("entries").and_then(|v| v.as_array()).map(|e| e.len()), Some(2));
    let other_school = sidecar.ok("gradeEntries.list", json!({ "schoolId": "s2" }));
    assert_eq!(other_school.get("entries").and_then(|v| v.as_array()).map(|e| e.len()), Some(0));

    let updated = sidecar.ok(
        "gradeEntries.update",
        json!({ "schoolId": "s1", "gradeEntryId": entry_id, "patch": { "pointsEarned": 30 } }),
    );
    assert_eq!(f64_at(&updated, "/entry/percentageScore"), 60.0);
    assert_eq!(str_at(&updated, "/entry/letterGrade"), "D");

    assert_eq!(
        sidecar.err_code(
            "gradeEntries.update",
            json!({ "schoolId": "s1", "gradeEntryId": entry_id, "patch": { "pointsEarned": 80 } })
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "gradeEntries.create",
            json!({
                "schoolId": "s1",
                "studentId": "stu-1",
                "subjectId": "missing",
                "percentageScore": 70
            })
        ),
        "not_found"
    );

    sidecar.ok("gradeEntries.delete", json!({ "schoolId": "s1", "gradeEntryId": entry_id }));
    assert_eq!(
        sidecar.err_code(
            "gradeEntries.delete",
            json!({ "schoolId": "s1", "gradeEntryId": entry_id })
        ),
        "not_found"
    );
}

#[test]
fn update_keeps_supplied_fields_until_cleared() {
    let mut sidecar = Sidecar::with_workspace("gradebookd-entries-supplied");
    letter_school(&mut sidecar);

    let letter_only = sidecar.ok(
        "gradeEntries.create",
        json!({ "schoolId": "s1", "studentId": "stu-1", "letterGrade": "B+" }),
    );
    let letter_id = str_at(&letter_only, "/entry/id").to_string();
    let retitled = sidecar.ok(
        "gradeEntries.update",
        json!({ "schoolId": "s1", "gradeEntryId": letter_id, "patch": { "title": "Quiz 1" } }),
    );
    assert_eq!(str_at(&retitled, "/entry/letterGrade"), "B+");
    assert_eq!(str_at(&retitled, "/entry/title"), "Quiz 1");
    assert!(retitled
        .pointer("/entry/percentageScore")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let both = sidecar.ok(
        "gradeEntries.create",
        json!({
            "schoolId": "s1",
            "studentId": "stu-1",
            "percentageScore": 72,
            "letterGrade": "B"
        }),
    );
    let both_id = str_at(&both, "/entry/id").to_string();
    let reweighted = sidecar.ok(
        "gradeEntries.update",
        json!({ "schoolId": "s1", "gradeEntryId": both_id, "patch": { "weight": 2 } }),
    );
    assert_eq!(f64_at(&reweighted, "/entry/percentageScore"), 72.0);
    assert_eq!(str_at(&reweighted, "/entry/letterGrade"), "B");
    assert_eq!(f64_at(&reweighted, "/entry/weight"), 2.0);

    let cleared = sidecar.ok(
        "gradeEntries.update",
        json!({ "schoolId": "s1", "gradeEntryId": both_id, "patch": { "letterGrade": null } }),
    );
    assert_eq!(str_at(&cleared, "/entry/letterGrade"), "C-");
    assert_eq!(
        cleared.pointer("/derivation/letterDerived").and_then(|v| v.as_bool()),
        Some(true)
    );

    let listed = sidecar.ok("gradeEntries.list", json!({ "schoolId": "s1", "studentId": "stu-1" }));
    let letters: Vec<_> = listed
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .iter()
        .map(|e| str_at(e, "/letterGrade").to_string())
        .collect();
    assert_eq!(letters, vec!["B+", "C-"]);
}
