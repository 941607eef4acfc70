use crate::scale::GradeScale;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub raw_score: Option<f64>,
    pub points_earned: Option<f64>,
    pub points_possible: Option<f64>,
    pub percentage_score: Option<f64>,
    pub letter_grade: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentageSource {
    Supplied,
    Points,
    RawScore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    pub percentage_source: Option<PercentageSource>,
    pub letter_derived: bool,
    /// Level matching the entry's letter grade, whether supplied or derived.
    pub grade_level_id: Option<String>,
}

pub fn clamp_percentage(p: f64) -> f64 {
    p.clamp(0.0, 100.0)
}

fn percentage_from_points(earned: Option<f64>, possible: Option<f64>) -> Option<f64> {
    match (earned, possible) {
        (Some(e), Some(p)) if p > 0.0 => Some(e * 100.0 / p),
        _ => None,
    }
}

/// Fills `percentage_score` and `letter_grade` when absent. Fields already
/// present are never replaced, so running this twice changes nothing.
pub fn derive(entry: &mut GradeEntry, scale: Option<&GradeScale>) -> Derivation {
    let mut out = Derivation::default();

    if entry.percentage_score.is_some() {
        out.percentage_source = Some(PercentageSource::Supplied);
    } else if let Some(p) = percentage_from_points(entry.points_earned, entry.points_possible) {
        entry.percentage_score = Some(p);
        out.percentage_source = Some(PercentageSource::Points);
    } else if let Some(raw) = entry.raw_score {
        entry.percentage_score = Some(raw);
        out.percentage_source = Some(PercentageSource::RawScore);
    }

    entry.percentage_score = entry.percentage_score.map(clamp_percentage);

    let Some(scale) = scale else {
        return out;
    };

    if let Some(letter) = entry.letter_grade.as_deref() {
        out.grade_level_id = scale.level_by_value(letter).map(|l| l.id.clone());
        return out;
    }
    if let Some(level) = entry
        .percentage_score
        .and_then(|p| scale.grade_for_percentage(p))
    {
        entry.letter_grade = Some(level.grade_value.clone());
        out.letter_derived = true;
        out.grade_level_id = Some(level.id.clone());
    }

    out
}
