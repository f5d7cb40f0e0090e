//! Validation of the detail-stage response into an [`AnalysisRecord`].
//!
//! Required: subject name, a non-empty ingredient list, nutrition with four
//! non-negative numbers, and at least one preparation step. These are never
//! defaulted. Dietary flags, compliance notes and health scores are optional
//! enrichment and fall back to a conservative baseline when omitted.

use std::collections::BTreeSet;

use super::parse::{RawDetail, RawNutrition, RawPreparation};
use super::Identification;
use crate::record::{
    AnalysisRecord, ComplianceNotes, DietaryFlags, HealthScore, Nutrition, Preparation,
    BASELINE_HEALTH_SCORE,
};

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn non_negative(field: &str, value: Option<f64>) -> Result<f64, String> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(format!("{} must be a non-negative number, got {}", field, v)),
        None => Err(format!("missing {}", field)),
    }
}

fn whole(field: &str, value: Option<f64>, default: u32) -> Result<u32, String> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 && v <= f64::from(u32::MAX) => Ok(v.round() as u32),
        Some(v) => Err(format!("{} must be a non-negative count, got {}", field, v)),
    }
}

fn nutrition(raw: Option<RawNutrition>) -> Result<Nutrition, String> {
    let raw = raw.ok_or("missing nutrition")?;
    Ok(Nutrition {
        calories: non_negative("nutrition.calories", raw.calories)?,
        protein_g: non_negative("nutrition.protein_g", raw.protein_g)?,
        carbs_g: non_negative("nutrition.carbs_g", raw.carbs_g)?,
        fat_g: non_negative("nutrition.fat_g", raw.fat_g)?,
    })
}

fn preparation(raw: Option<RawPreparation>) -> Result<Preparation, String> {
    let raw = raw.ok_or("missing preparation")?;
    let steps: Vec<String> = raw
        .steps
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err("preparation has no steps".to_string());
    }
    Ok(Preparation {
        servings: whole("preparation.servings", raw.servings, 1)?.max(1),
        prep_minutes: whole("preparation.prep_minutes", raw.prep_minutes, 0)?,
        cook_minutes: whole("preparation.cook_minutes", raw.cook_minutes, 0)?,
        steps,
    })
}

/// Turn a detail response into a validated, reconciled record.
///
/// The subject name and category from the identification stage win over
/// whatever the detail model echoed back, unless identification left them
/// blank.
pub fn validate_detail(identified: &Identification, raw: RawDetail) -> Result<AnalysisRecord, String> {
    let subject_name = non_empty(Some(identified.subject_name.clone()))
        .or_else(|| non_empty(raw.subject_name))
        .ok_or("missing subject name")?;
    let category = non_empty(Some(identified.category.clone()))
        .or_else(|| non_empty(raw.category))
        .unwrap_or_else(|| "unspecified".to_string());

    let ingredients: Vec<String> = raw
        .ingredients
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| non_empty(Some(s)))
        .collect();
    if ingredients.is_empty() {
        return Err("ingredient list is empty".to_string());
    }

    let nutrition = nutrition(raw.nutrition)?;
    let preparation = preparation(raw.preparation)?;

    let flags = raw.dietary_flags.unwrap_or_default();
    let dietary_flags = DietaryFlags {
        high_protein: flags.high_protein.unwrap_or(false),
        contains_gluten: flags.contains_gluten.unwrap_or(false),
        contains_dairy: flags.contains_dairy.unwrap_or(false),
        vegan: flags.vegan.unwrap_or(false),
        keto: flags.keto.unwrap_or(false),
    };

    let compliance = match raw.compliance {
        Some(c) => ComplianceNotes {
            permitted: c.permitted.unwrap_or(true),
            note: non_empty(c.note),
            allergens: c
                .allergens
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| non_empty(Some(a)))
                .collect::<BTreeSet<_>>(),
        },
        None => ComplianceNotes::default(),
    };

    let score = raw.health_score.unwrap_or_default();
    let health_score = HealthScore {
        overall: score.overall.unwrap_or(BASELINE_HEALTH_SCORE),
        nutrient_density: score.nutrient_density.unwrap_or(BASELINE_HEALTH_SCORE),
        macro_balance: score.macro_balance.unwrap_or(BASELINE_HEALTH_SCORE),
    };

    Ok(AnalysisRecord {
        subject_name,
        category,
        ingredients,
        nutrition,
        preparation,
        dietary_flags,
        compliance,
        health_score,
    }
    .reconciled())
}
