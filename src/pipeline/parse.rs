//! Parsing of untrusted model text into typed responses.
//!
//! Models are asked for bare JSON but frequently wrap it in markdown fences
//! or a sentence of prose. The outermost `{ ... }` span is extracted and
//! deserialized strictly: wrong types are errors, not guesses. Missing
//! fields deserialize as `None` so the validation stage can tell required
//! fields from optional enrichment.

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Errors that can occur while parsing model text.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// No JSON object could be located in the text.
    #[error("No JSON object found in model output")]
    NoJsonObject,

    /// The located object is not valid for the expected shape.
    #[error("Invalid JSON in model output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locate the outermost JSON object in `text`.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Extract and deserialize the JSON object in `text`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    Ok(serde_json::from_str(json)?)
}

/// Identification stage response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIdentification {
    #[serde(default, alias = "isFood")]
    pub is_food: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, alias = "subjectName", alias = "dish_name", alias = "dishName")]
    pub subject_name: Option<String>,
    #[serde(default, alias = "cuisine")]
    pub category: Option<String>,
}

/// Lightweight subject guess response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubject {
    #[serde(default, alias = "subjectName", alias = "dish_name", alias = "dishName")]
    pub subject_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNutrition {
    pub calories: Option<f64>,
    #[serde(alias = "protein")]
    pub protein_g: Option<f64>,
    #[serde(alias = "carbs")]
    pub carbs_g: Option<f64>,
    #[serde(alias = "fat")]
    pub fat_g: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPreparation {
    #[serde(default)]
    pub servings: Option<f64>,
    #[serde(default, alias = "prepMinutes", alias = "prep_time")]
    pub prep_minutes: Option<f64>,
    #[serde(default, alias = "cookMinutes", alias = "cook_time")]
    pub cook_minutes: Option<f64>,
    #[serde(default, alias = "instructions")]
    pub steps: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDietaryFlags {
    #[serde(default, alias = "highProtein")]
    pub high_protein: Option<bool>,
    #[serde(default, alias = "containsGluten")]
    pub contains_gluten: Option<bool>,
    #[serde(default, alias = "containsDairy")]
    pub contains_dairy: Option<bool>,
    #[serde(default)]
    pub vegan: Option<bool>,
    #[serde(default)]
    pub keto: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCompliance {
    #[serde(default)]
    pub permitted: Option<bool>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub allergens: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHealthScore {
    #[serde(default)]
    pub overall: Option<f64>,
    #[serde(default, alias = "nutrientDensity")]
    pub nutrient_density: Option<f64>,
    #[serde(default, alias = "macroBalance")]
    pub macro_balance: Option<f64>,
}

/// Detail stage response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDetail {
    #[serde(default, alias = "subjectName", alias = "dish_name")]
    pub subject_name: Option<String>,
    #[serde(default, alias = "cuisine")]
    pub category: Option<String>,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
    #[serde(default)]
    pub nutrition: Option<RawNutrition>,
    #[serde(default, alias = "recipe")]
    pub preparation: Option<RawPreparation>,
    #[serde(default, alias = "dietaryFlags")]
    pub dietary_flags: Option<RawDietaryFlags>,
    #[serde(default, alias = "complianceNotes")]
    pub compliance: Option<RawCompliance>,
    #[serde(default, alias = "healthScore")]
    pub health_score: Option<RawHealthScore>,
}
