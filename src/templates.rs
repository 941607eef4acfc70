//! Built-in level sets used to seed a new grading system's default scale.

use crate::scale::{GradeLevel, ScaleType};
use crate::system::SystemType;

#[allow(clippy::too_many_arguments)]
fn band(
    value: &str,
    display: &str,
    numeric: Option<f64>,
    gpa: Option<f64>,
    min: f64,
    max: f64,
    passing: bool,
    color: &str,
    description: &str,
    sort_order: i64,
) -> GradeLevel {
    GradeLevel {
        id: String::new(),
        grade_value: value.to_string(),
        display_value: display.to_string(),
        numeric_value: numeric,
        gpa_points: gpa,
        percentage_min: min,
        percentage_max: max,
        description: Some(description.to_string()),
        color_code: Some(color.to_string()),
        is_passing: passing,
        sort_order,
    }
}

pub fn template_levels(system_type: SystemType, scale_type: ScaleType) -> Vec<GradeLevel> {
    if system_type == SystemType::Narrative {
        return narrative_levels();
    }
    levels_for_scale_type(scale_type)
}

/// Points-type scales have no sensible default bands and start empty.
pub fn levels_for_scale_type(scale_type: ScaleType) -> Vec<GradeLevel> {
    match scale_type {
        ScaleType::Letter => letter_levels(),
        ScaleType::Percentage => percentage_levels(),
        ScaleType::Standards => standards_levels(),
        ScaleType::Points => Vec::new(),
    }
}

pub fn letter_levels() -> Vec<GradeLevel> {
    let rows: [(&str, f64, f64, f64, &str, &str); 12] = [
        ("A+", 4.0, 97.0, 100.0, "#15803d", "Exceptional"),
        ("A", 4.0, 93.0, 96.9, "#16a34a", "Excellent"),
        ("A-", 3.7, 90.0, 92.9, "#22c55e", "Excellent"),
        ("B+", 3.3, 87.0, 89.9, "#2563eb", "Very Good"),
        ("B", 3.0, 83.0, 86.9, "#3b82f6", "Good"),
        ("B-", 2.7, 80.0, 82.9, "#60a5fa", "Good"),
        ("C+", 2.3, 77.0, 79.9, "#ca8a04", "Satisfactory"),
        ("C", 2.0, 73.0, 76.9, "#eab308", "Satisfactory"),
        ("C-", 1.7, 70.0, 72.9, "#facc15", "Satisfactory"),
        ("D+", 1.3, 67.0, 69.9, "#ea580c", "Below Average"),
        ("D", 1.0, 60.0, 66.9, "#f97316", "Poor"),
        ("F", 0.0, 0.0, 59.9, "#dc2626", "Failing"),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (value, gpa, min, max, color, description))| {
            band(
                value,
                value,
                Some(*gpa),
                Some(*gpa),
                *min,
                *max,
                *value != "F",
                color,
                description,
                i as i64,
            )
        })
        .collect()
}

/// Eleven bands labelled by the nearest multiple of ten.
pub fn percentage_levels() -> Vec<GradeLevel> {
    (0..=10)
        .rev()
        .enumerate()
        .map(|(i, decile)| {
            let label = decile * 10;
            let value = label as f64;
            let min = if label == 0 { 0.0 } else { value - 5.0 };
            let max = if label == 100 { 100.0 } else { value + 4.9 };
            let passing = label >= 60;
            band(
                &label.to_string(),
                &format!("{label}%"),
                Some(value),
                Some(value / 25.0),
                min,
                max,
                passing,
                if passing { "#16a34a" } else { "#dc2626" },
                &format!("Around {label}%"),
                i as i64,
            )
        })
        .collect()
}

pub fn standards_levels() -> Vec<GradeLevel> {
    let rows: [(&str, &str, f64, f64, f64, &str, &str); 4] = [
        (
            "4",
            "Exceeds Standards",
            4.0,
            90.0,
            100.0,
            "#15803d",
            "Consistently exceeds grade-level standards",
        ),
        ("3", "Meets Standards", 3.0, 80.0, 89.9, "#2563eb", "Meets grade-level standards"),
        (
            "2",
            "Approaching Standards",
            2.0,
            70.0,
            79.9,
            "#ca8a04",
            "Approaching grade-level standards",
        ),
        ("1", "Below Standards", 1.0, 0.0, 69.9, "#dc2626", "Below grade-level standards"),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (value, display, points, min, max, color, description))| {
            band(
                value,
                display,
                Some(*points),
                Some(*points),
                *min,
                *max,
                *value != "1",
                color,
                description,
                i as i64,
            )
        })
        .collect()
}

/// Descriptive bands without grade points; entries graded on them never count
/// towards a GPA.
pub fn narrative_levels() -> Vec<GradeLevel> {
    let rows: [(&str, &str, f64, f64, &str, &str); 4] = [
        ("O", "Outstanding", 90.0, 100.0, "#15803d", "Outstanding progress"),
        ("G", "Good", 75.0, 89.9, "#2563eb", "Good progress"),
        ("S", "Satisfactory", 60.0, 74.9, "#ca8a04", "Satisfactory progress"),
        ("N", "Needs Improvement", 0.0, 59.9, "#dc2626", "Needs improvement"),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (value, display, min, max, color, description))| {
            band(
                value,
                display,
                None,
                None,
                *min,
                *max,
                *value != "N",
                color,
                description,
                i as i64,
            )
        })
        .collect()
}
