use crate::error::{GradingError, GradingResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    Letter,
    Percentage,
    Points,
    Standards,
}

impl ScaleType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "letter" => Some(Self::Letter),
            "percentage" => Some(Self::Percentage),
            "points" => Some(Self::Points),
            "standards" => Some(Self::Standards),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::Percentage => "percentage",
            Self::Points => "points",
            Self::Standards => "standards",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfiguration {
    pub passing_threshold: f64,
    pub gpa_scale_max: f64,
    /// Precision for percentages shown to users. Lookup and derivation always
    /// work on the unrounded value.
    pub decimal_places: u32,
}

impl ScaleConfiguration {
    pub fn display_percentage(&self, percentage: f64) -> f64 {
        let factor = 10_f64.powi(self.decimal_places as i32);
        (percentage * factor).round() / factor
    }
}

impl Default for ScaleConfiguration {
    fn default() -> Self {
        Self {
            passing_threshold: 60.0,
            gpa_scale_max: 4.0,
            decimal_places: 2,
        }
    }
}

/// One band of a grade scale. Both ends of the percentage range are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeLevel {
    #[serde(default)]
    pub id: String,
    pub grade_value: String,
    pub display_value: String,
    pub numeric_value: Option<f64>,
    pub gpa_points: Option<f64>,
    pub percentage_min: f64,
    pub percentage_max: f64,
    pub description: Option<String>,
    pub color_code: Option<String>,
    pub is_passing: bool,
    pub sort_order: i64,
}

impl GradeLevel {
    pub fn contains(&self, percentage: f64) -> bool {
        self.percentage_min <= percentage && percentage <= self.percentage_max
    }

    /// A shared boundary counts as an overlap.
    pub fn overlaps(&self, other: &GradeLevel) -> bool {
        self.percentage_min <= other.percentage_max && other.percentage_min <= self.percentage_max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub id: String,
    pub school_id: String,
    pub grading_system_id: Option<String>,
    pub name: String,
    pub scale_type: ScaleType,
    pub is_default: bool,
    pub configuration: ScaleConfiguration,
    pub levels: Vec<GradeLevel>,
}

/// Percentages strictly between `from` and `to` map to no level. At the outer
/// edges the bound itself is uncovered as well (`from == 0` or `to == 100`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageGap {
    pub from: f64,
    pub to: f64,
}

impl GradeScale {
    /// First level, in `sort_order`, whose range contains `percentage`.
    pub fn grade_for_percentage(&self, percentage: f64) -> Option<&GradeLevel> {
        self.levels.iter().find(|l| l.contains(percentage))
    }

    pub fn lookup(&self, percentage: f64) -> GradingResult<&GradeLevel> {
        self.grade_for_percentage(percentage)
            .ok_or(GradingError::NotFoundInScale(percentage))
    }

    pub fn level_by_value(&self, grade_value: &str) -> Option<&GradeLevel> {
        self.levels.iter().find(|l| l.grade_value == grade_value)
    }

    pub fn sort_levels(&mut self) {
        self.levels.sort_by(|a, b| {
            a.sort_order.cmp(&b.sort_order).then_with(|| {
                b.percentage_max
                    .partial_cmp(&a.percentage_max)
                    .unwrap_or(Ordering::Equal)
            })
        });
    }

    pub fn coverage_gaps(&self) -> Vec<CoverageGap> {
        let mut ranges: Vec<(f64, f64)> = self
            .levels
            .iter()
            .map(|l| (l.percentage_min, l.percentage_max))
            .collect();
        ranges.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut gaps = Vec::new();
        let mut covered_to: Option<f64> = None;
        for (min, max) in ranges {
            match covered_to {
                None if min > 0.0 => gaps.push(CoverageGap { from: 0.0, to: min.min(100.0) }),
                Some(c) if min > c => gaps.push(CoverageGap { from: c, to: min }),
                _ => {}
            }
            covered_to = Some(covered_to.map_or(max, |c| c.max(max)));
        }
        match covered_to {
            None => gaps.push(CoverageGap { from: 0.0, to: 100.0 }),
            Some(c) if c < 100.0 => gaps.push(CoverageGap { from: c, to: 100.0 }),
            _ => {}
        }
        gaps
    }
}

/// Field-level checks for a single level.
pub fn validate_level(level: &GradeLevel, config: &ScaleConfiguration) -> GradingResult<()> {
    if level.grade_value.trim().is_empty() {
        return Err(GradingError::ConfigurationError(
            "gradeValue must not be empty".into(),
        ));
    }
    let (min, max) = (level.percentage_min, level.percentage_max);
    if !min.is_finite() || !max.is_finite() {
        return Err(GradingError::ConfigurationError(
            "percentage bounds must be finite numbers".into(),
        ));
    }
    if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) {
        return Err(GradingError::ConfigurationError(format!(
            "percentage range {min}-{max} must lie within 0-100"
        )));
    }
    if min >= max {
        return Err(GradingError::ConfigurationError(format!(
            "percentageMin ({min}) must be less than percentageMax ({max})"
        )));
    }
    if let Some(points) = level.gpa_points {
        if !points.is_finite() || points < 0.0 || points > config.gpa_scale_max {
            return Err(GradingError::ConfigurationError(format!(
                "gpaPoints {points} must be within 0-{}",
                config.gpa_scale_max
            )));
        }
    }
    Ok(())
}

/// Rejects `candidate` when its range overlaps any other level in `existing`.
/// A level with the same id as the candidate is the row being updated and is
/// ignored.
pub fn check_overlap(candidate: &GradeLevel, existing: &[GradeLevel]) -> GradingResult<()> {
    for other in existing {
        if !candidate.id.is_empty() && other.id == candidate.id {
            continue;
        }
        if candidate.overlaps(other) {
            return Err(GradingError::ConfigurationError(format!(
                "range {}-{} overlaps level {} ({}-{})",
                candidate.percentage_min,
                candidate.percentage_max,
                other.grade_value,
                other.percentage_min,
                other.percentage_max
            )));
        }
    }
    Ok(())
}

pub fn validate_levels(levels: &[GradeLevel], config: &ScaleConfiguration) -> GradingResult<()> {
    for (i, level) in levels.iter().enumerate() {
        validate_level(level, config)?;
        check_overlap(level, &levels[i + 1..])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_percentage_follows_decimal_places() {
        let mut cfg = ScaleConfiguration::default();
        assert_eq!(cfg.display_percentage(96.954), 96.95);
        cfg.decimal_places = 0;
        assert_eq!(cfg.display_percentage(89.5), 90.0);
        assert_eq!(cfg.display_percentage(89.4), 89.0);
    }

    fn level(value: &str, min: f64, max: f64, gpa: Option<f64>, order: i64) -> GradeLevel {
        GradeLevel {
            id: format!("lvl-{value}"),
            grade_value: value.to_string(),
            display_value: value.to_string(),
            numeric_value: gpa,
            gpa_points: gpa,
            percentage_min: min,
            percentage_max: max,
            description: None,
            color_code: None,
            is_passing: min >= 60.0,
            sort_order: order,
        }
    }

    fn scale(levels: Vec<GradeLevel>) -> GradeScale {
        GradeScale {
            id: "s1".into(),
            school_id: "school".into(),
            grading_system_id: None,
            name: "Test".into(),
            scale_type: ScaleType::Letter,
            is_default: true,
            configuration: ScaleConfiguration::default(),
            levels,
        }
    }

    #[test]
    fn lookup_is_inclusive_on_both_ends() {
        let s = scale(vec![
            level("P", 50.0, 100.0, Some(4.0), 0),
            level("F", 0.0, 49.5, Some(0.0), 1),
        ]);
        assert_eq!(s.grade_for_percentage(100.0).map(|l| l.grade_value.as_str()), Some("P"));
        assert_eq!(s.grade_for_percentage(50.0).map(|l| l.grade_value.as_str()), Some("P"));
        assert_eq!(s.grade_for_percentage(49.5).map(|l| l.grade_value.as_str()), Some("F"));
        assert_eq!(s.grade_for_percentage(0.0).map(|l| l.grade_value.as_str()), Some("F"));
    }

    #[test]
    fn lookup_in_gap_is_not_found() {
        let s = scale(vec![
            level("P", 50.0, 100.0, Some(4.0), 0),
            level("F", 0.0, 49.5, Some(0.0), 1),
        ]);
        assert!(s.grade_for_percentage(49.7).is_none());
        assert!(matches!(
            s.lookup(49.7),
            Err(GradingError::NotFoundInScale(p)) if p == 49.7
        ));
        assert!(s.grade_for_percentage(101.0).is_none());
    }

    #[test]
    fn every_percentage_maps_to_exactly_one_level_on_gap_free_scale() {
        let s = scale(vec![
            level("A", 80.0, 100.0, Some(4.0), 0),
            level("B", 60.0, 79.99999, Some(3.0), 1),
            level("C", 0.0, 59.99999, Some(2.0), 2),
        ]);
        for tenth in 0..=1000 {
            let p = f64::from(tenth) / 10.0;
            let hits: Vec<_> = s.levels.iter().filter(|l| l.contains(p)).collect();
            assert_eq!(hits.len(), 1, "p={p}");
            let found = s.grade_for_percentage(p).expect("level");
            assert!(found.percentage_min <= p && p <= found.percentage_max);
        }
    }

    #[test]
    fn shared_boundary_is_rejected_as_overlap() {
        let existing = vec![level("A", 90.0, 100.0, Some(4.0), 0)];
        let candidate = level("B", 80.0, 90.0, Some(3.0), 1);
        assert!(matches!(
            check_overlap(&candidate, &existing),
            Err(GradingError::ConfigurationError(_))
        ));
        let ok = level("B", 80.0, 89.9, Some(3.0), 1);
        assert!(check_overlap(&ok, &existing).is_ok());
    }

    #[test]
    fn update_does_not_overlap_with_itself() {
        let existing = vec![level("A", 90.0, 100.0, Some(4.0), 0)];
        let mut moved = existing[0].clone();
        moved.percentage_min = 88.0;
        assert!(check_overlap(&moved, &existing).is_ok());
    }

    #[test]
    fn validate_level_rejects_bad_ranges_and_points() {
        let cfg = ScaleConfiguration::default();
        assert!(validate_level(&level("X", 50.0, 50.0, None, 0), &cfg).is_err());
        assert!(validate_level(&level("X", -1.0, 50.0, None, 0), &cfg).is_err());
        assert!(validate_level(&level("X", 10.0, 100.5, None, 0), &cfg).is_err());
        assert!(validate_level(&level("X", 10.0, 20.0, Some(4.5), 0), &cfg).is_err());
        assert!(validate_level(&level(" ", 10.0, 20.0, None, 0), &cfg).is_err());
        assert!(validate_level(&level("X", 10.0, 20.0, Some(4.0), 0), &cfg).is_ok());
    }

    #[test]
    fn coverage_reports_gaps_and_edges() {
        let s = scale(vec![
            level("A", 90.0, 99.0, Some(4.0), 0),
            level("B", 80.0, 89.9, Some(3.0), 1),
            level("C", 10.0, 70.0, Some(2.0), 2),
        ]);
        let gaps = s.coverage_gaps();
        assert_eq!(
            gaps,
            vec![
                CoverageGap { from: 0.0, to: 10.0 },
                CoverageGap { from: 70.0, to: 80.0 },
                CoverageGap { from: 89.9, to: 90.0 },
                CoverageGap { from: 99.0, to: 100.0 },
            ]
        );
        assert_eq!(scale(vec![]).coverage_gaps(), vec![CoverageGap { from: 0.0, to: 100.0 }]);
    }
}
