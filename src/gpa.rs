use crate::scale::GradeScale;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// GPA results are always reported to two decimal places.
pub const GPA_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaInput {
    pub percentage: f64,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaLine {
    pub percentage: f64,
    pub credits: f64,
    pub grade_value: Option<String>,
    pub gpa_points: Option<f64>,
    pub included: bool,
}

/// The counts let a caller tell "earned 0.0" apart from "nothing computable".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub gpa: f64,
    pub included_count: usize,
    pub skipped_count: usize,
    pub total_credits: f64,
    pub quality_points: f64,
    pub lines: Vec<GpaLine>,
}

pub fn round_to(x: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (x * factor).round() / factor
}

pub fn calculate_gpa(entries: &[GpaInput], scale: &GradeScale) -> f64 {
    gpa_summary(entries, Some(scale)).gpa
}

/// Credit-weighted GPA. Entries whose percentage maps to no level, or to a
/// level without grade points, are left out of both sums. With no scale every
/// entry is skipped.
pub fn gpa_summary(entries: &[GpaInput], scale: Option<&GradeScale>) -> GpaSummary {
    let mut quality_points = 0.0;
    let mut total_credits = 0.0;
    let mut included_count = 0;
    let mut lines = Vec::with_capacity(entries.len());

    for entry in entries {
        let level = scale.and_then(|s| s.grade_for_percentage(entry.percentage));
        let points = level.and_then(|l| l.gpa_points);
        let included = points.is_some();
        if let Some(p) = points {
            quality_points += p * entry.credits;
            total_credits += entry.credits;
            included_count += 1;
        } else {
            debug!(
                percentage = entry.percentage,
                grade = ?level.map(|l| l.grade_value.as_str()),
                "gpa entry skipped"
            );
        }
        lines.push(GpaLine {
            percentage: entry.percentage,
            credits: entry.credits,
            grade_value: level.map(|l| l.grade_value.clone()),
            gpa_points: points,
            included,
        });
    }

    let gpa = if included_count > 0 && total_credits > 0.0 {
        round_to(quality_points / total_credits, GPA_DECIMAL_PLACES)
    } else {
        0.0
    };

    GpaSummary {
        gpa,
        included_count,
        skipped_count: entries.len() - included_count,
        total_credits,
        quality_points,
        lines,
    }
}
