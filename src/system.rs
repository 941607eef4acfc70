use crate::scale::{GradeScale, ScaleConfiguration, ScaleType};
use crate::templates;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    TraditionalLetter,
    Percentage,
    Points,
    StandardsBased,
    Narrative,
}

impl SystemType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "traditional_letter" => Some(Self::TraditionalLetter),
            "percentage" => Some(Self::Percentage),
            "points" => Some(Self::Points),
            "standards_based" => Some(Self::StandardsBased),
            "narrative" => Some(Self::Narrative),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TraditionalLetter => "traditional_letter",
            Self::Percentage => "percentage",
            Self::Points => "points",
            Self::StandardsBased => "standards_based",
            Self::Narrative => "narrative",
        }
    }

    pub fn default_scale_name(self) -> &'static str {
        match self {
            Self::TraditionalLetter => "Standard Letter Grades",
            Self::Percentage => "Percentage Scale",
            Self::Points => "Points Scale",
            Self::StandardsBased => "Standards-Based Scale",
            Self::Narrative => "Narrative Scale",
        }
    }

    pub fn default_scale_type(self) -> ScaleType {
        match self {
            Self::TraditionalLetter => ScaleType::Letter,
            Self::Percentage => ScaleType::Percentage,
            Self::Points => ScaleType::Points,
            Self::StandardsBased | Self::Narrative => ScaleType::Standards,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSystem {
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub description: Option<String>,
    pub system_type: SystemType,
    pub is_primary: bool,
    pub applicable_grades: Vec<String>,
    pub applicable_subjects: Vec<String>,
    pub configuration: serde_json::Value,
}

/// Builds the default scale a new grading system starts with. Level and scale
/// ids are left empty for the store to assign.
pub fn seed_default_scale(
    system: &GradingSystem,
    configuration: ScaleConfiguration,
    seed_levels: bool,
) -> GradeScale {
    let scale_type = system.system_type.default_scale_type();
    let levels = if seed_levels {
        templates::template_levels(system.system_type, scale_type)
    } else {
        Vec::new()
    };
    GradeScale {
        id: String::new(),
        school_id: system.school_id.clone(),
        grading_system_id: Some(system.id.clone()),
        name: system.system_type.default_scale_name().to_string(),
        scale_type,
        is_default: true,
        configuration,
        levels,
    }
}
