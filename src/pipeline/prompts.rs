//! Fixed model instructions.
//!
//! Each instruction pins the exact JSON shape the parser in
//! [`super::parse`] accepts.

/// Identification stage: is this food, and what dish is it?
pub const IDENTIFY_INSTRUCTION: &str = r#"You are a food recognition system. Look at the photo.
Decide whether it shows a prepared dish or food item and, if so, name the specific dish.
Respond with ONLY a JSON object, no prose, in exactly this shape:
{"is_food": true, "confidence": 0.0, "subject_name": "specific dish name", "category": "cuisine or style"}
"confidence" is your certainty in [0.0, 1.0] that the photo shows food.
If it is not food, set "is_food" to false and leave the names empty."#;

/// Lightweight subject guess used for semantic cache lookups.
pub const SUBJECT_INSTRUCTION: &str = r#"Name the dish in this photo.
Respond with ONLY a JSON object: {"subject_name": "specific dish name"}
Use an empty string if the photo does not show food."#;

/// Detail stage instruction for an identified dish.
#[must_use]
pub fn detail_instruction(subject_name: &str, category: &str) -> String {
    format!(
        r#"You are a culinary and nutrition assistant. The dish is "{subject_name}" ({category}).
Produce its typical recipe and per-serving nutrition.
Every allergen, compliance note and dietary flag MUST be derived only from the ingredients you list.
Respond with ONLY a JSON object, no prose, in exactly this shape:
{{
  "subject_name": "{subject_name}",
  "category": "{category}",
  "ingredients": ["ingredient", "..."],
  "nutrition": {{"calories": 0, "protein_g": 0, "carbs_g": 0, "fat_g": 0}},
  "preparation": {{"servings": 1, "prep_minutes": 0, "cook_minutes": 0, "steps": ["step", "..."]}},
  "dietary_flags": {{"high_protein": false, "contains_gluten": false, "contains_dairy": false, "vegan": false, "keto": false}},
  "compliance": {{"permitted": true, "note": null, "allergens": ["ingredient-based allergen"]}},
  "health_score": {{"overall": 50, "nutrient_density": 50, "macro_balance": 50}}
}}
All numbers are non-negative. Health scores are 0-100."#
    )
}
