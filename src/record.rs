//! Analysis record data model.
//!
//! An [`AnalysisRecord`] is the unit of value stored in every cache tier.
//! It is produced once by the analysis pipeline and never modified after
//! that; tiers only ever replace a whole record for a given digest.
//!
//! # Consistency rules
//!
//! The ingredient list is the single source of truth:
//!
//! * allergens must name something that appears in `ingredients`
//! * a compliance note may only mention allergen families present in
//!   `ingredients`
//! * `high_protein` holds exactly when `protein_g >= 20`
//! * `keto` cannot hold when `carbs_g > 20`
//! * `vegan` cannot hold when `contains_dairy` does
//!
//! [`AnalysisRecord::reconciled`] applies these rules and
//! [`AnalysisRecord::is_consistent`] checks them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Protein grams at or above which a dish is flagged high-protein.
pub const HIGH_PROTEIN_GRAMS: f64 = 20.0;

/// Carbohydrate grams above which a dish cannot be flagged keto.
pub const KETO_MAX_CARBS_GRAMS: f64 = 20.0;

/// Allergen families a compliance note may mention. Each family lists the
/// word stems that name it, in notes and in ingredients alike.
const ALLERGEN_FAMILIES: &[&[&str]] = &[
    &["peanut"],
    &[
        "almond", "cashew", "walnut", "pecan", "pistachio", "hazelnut", "macadamia",
    ],
    &[
        "shellfish", "shrimp", "prawn", "crab", "lobster", "clam", "mussel", "oyster", "scallop",
    ],
    &["fish", "salmon", "tuna", "cod", "anchov", "sardine", "mackerel"],
    &["egg"],
    &[
        "dairy", "milk", "lactose", "cheese", "butter", "cream", "yogurt", "ghee", "mozzarella",
        "parmesan", "pecorino", "cheddar", "ricotta", "feta",
    ],
    &[
        "gluten", "wheat", "flour", "bread", "pasta", "spaghetti", "noodle", "barley", "rye",
        "couscous",
    ],
    &["soy", "tofu", "edamame", "miso"],
    &["sesame", "tahini"],
];

/// Words that turn a following allergen mention into an absence claim.
const NEGATIONS: &[&str] = &["no", "non", "without"];

/// Health score used when the model omits one.
pub const BASELINE_HEALTH_SCORE: f64 = 50.0;

/// Macro-nutrient summary per serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl Nutrition {
    /// True when every value is finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.calories, self.protein_g, self.carbs_g, self.fat_g]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// How to prepare the dish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preparation {
    pub servings: u32,
    pub prep_minutes: u32,
    pub cook_minutes: u32,
    /// Ordered instruction steps.
    pub steps: Vec<String>,
}

/// Dietary tags derived from nutrition and ingredients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietaryFlags {
    pub high_protein: bool,
    pub contains_gluten: bool,
    pub contains_dairy: bool,
    pub vegan: bool,
    pub keto: bool,
}

/// Dietary compliance verdict and allergen list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceNotes {
    /// Whether the dish is permitted under the compliance rules.
    pub permitted: bool,
    /// Optional free-text explanation.
    pub note: Option<String>,
    /// Allergens, each referencing an ingredient.
    pub allergens: BTreeSet<String>,
}

impl Default for ComplianceNotes {
    fn default() -> Self {
        Self {
            permitted: true,
            note: None,
            allergens: BTreeSet::new(),
        }
    }
}

/// Three 0-100 health scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub overall: f64,
    pub nutrient_density: f64,
    pub macro_balance: f64,
}

impl HealthScore {
    /// Clamp each score into `0..=100`, replacing non-finite values with
    /// the baseline.
    #[must_use]
    pub fn clamped(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_finite() {
                v.clamp(0.0, 100.0)
            } else {
                BASELINE_HEALTH_SCORE
            }
        }
        Self {
            overall: clamp(self.overall),
            nutrient_density: clamp(self.nutrient_density),
            macro_balance: clamp(self.macro_balance),
        }
    }
}

impl Default for HealthScore {
    fn default() -> Self {
        Self {
            overall: BASELINE_HEALTH_SCORE,
            nutrient_density: BASELINE_HEALTH_SCORE,
            macro_balance: BASELINE_HEALTH_SCORE,
        }
    }
}

/// A complete, validated dish analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Model-identified dish name.
    pub subject_name: String,
    /// Cuisine or style.
    pub category: String,
    /// Ordered ingredient list.
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
    pub preparation: Preparation,
    pub dietary_flags: DietaryFlags,
    pub compliance: ComplianceNotes,
    pub health_score: HealthScore,
}

impl AnalysisRecord {
    /// Whether `item` refers to one of the record's ingredients.
    ///
    /// Matching is case-insensitive and accepts containment in either
    /// direction ("wheat" matches "wheat flour", "eggs" matches "egg").
    #[must_use]
    pub fn references_ingredient(&self, item: &str) -> bool {
        let item = item.trim().to_lowercase();
        if item.is_empty() {
            return false;
        }
        self.ingredients.iter().any(|ingredient| {
            let ingredient = ingredient.to_lowercase();
            ingredient.contains(&item) || item.contains(&ingredient)
        })
    }

    /// Whether `note` only mentions allergens backed by the ingredients.
    ///
    /// A mention counts when a word starts with a family stem and is not
    /// negated ("gluten-free", "no peanuts"). Naming any of `dropped`
    /// also disqualifies the note.
    #[must_use]
    pub fn note_is_grounded(&self, note: &str, dropped: &[String]) -> bool {
        let lowered = note.to_lowercase();
        if dropped
            .iter()
            .any(|d| !d.trim().is_empty() && lowered.contains(&d.trim().to_lowercase()))
        {
            return false;
        }

        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let claims = |stem: &str| {
            words.iter().enumerate().any(|(i, w)| {
                w.starts_with(stem)
                    && words.get(i + 1) != Some(&"free")
                    && !(i > 0 && NEGATIONS.contains(&words[i - 1]))
            })
        };
        let ingredients: Vec<String> = self.ingredients.iter().map(|i| i.to_lowercase()).collect();

        ALLERGEN_FAMILIES.iter().all(|family| {
            !family.iter().any(|stem| claims(*stem))
                || family
                    .iter()
                    .any(|stem| ingredients.iter().any(|i| i.contains(*stem)))
        })
    }

    /// Apply the consistency rules, deriving what can be derived.
    #[must_use]
    pub fn reconciled(mut self) -> Self {
        let dropped: Vec<String> = self
            .compliance
            .allergens
            .iter()
            .filter(|a| !self.references_ingredient(a))
            .cloned()
            .collect();
        for allergen in &dropped {
            log::debug!(
                "Dropping allergen '{}' not present in ingredients of '{}'",
                allergen,
                self.subject_name
            );
            self.compliance.allergens.remove(allergen);
        }

        let ungrounded = self
            .compliance
            .note
            .as_deref()
            .is_some_and(|note| !self.note_is_grounded(note, &dropped));
        if ungrounded {
            log::debug!(
                "Dropping compliance note of '{}' that names items outside its ingredients",
                self.subject_name
            );
            self.compliance.note = None;
            self.compliance.permitted = true;
        }

        self.dietary_flags.high_protein = self.nutrition.protein_g >= HIGH_PROTEIN_GRAMS;
        if self.nutrition.carbs_g > KETO_MAX_CARBS_GRAMS {
            self.dietary_flags.keto = false;
        }
        if self.dietary_flags.contains_dairy {
            self.dietary_flags.vegan = false;
        }
        self.health_score = self.health_score.clamped();
        self
    }

    /// Check the consistency rules without changing anything.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let flags = &self.dietary_flags;
        self.compliance
            .allergens
            .iter()
            .all(|a| self.references_ingredient(a))
            && flags.high_protein == (self.nutrition.protein_g >= HIGH_PROTEIN_GRAMS)
            && !(flags.keto && self.nutrition.carbs_g > KETO_MAX_CARBS_GRAMS)
            && !(flags.vegan && flags.contains_dairy)
            && self
                .compliance
                .note
                .as_deref()
                .map_or(true, |note| self.note_is_grounded(note, &[]))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A small consistent record for tests.
    pub fn sample_record(name: &str, category: &str, calories: f64) -> AnalysisRecord {
        AnalysisRecord {
            subject_name: name.to_string(),
            category: category.to_string(),
            ingredients: vec![
                "spaghetti".to_string(),
                "eggs".to_string(),
                "pecorino cheese".to_string(),
                "guanciale".to_string(),
            ],
            nutrition: Nutrition {
                calories,
                protein_g: 25.0,
                carbs_g: 60.0,
                fat_g: 30.0,
            },
            preparation: Preparation {
                servings: 2,
                prep_minutes: 10,
                cook_minutes: 15,
                steps: vec!["Boil pasta".to_string(), "Mix with eggs".to_string()],
            },
            dietary_flags: DietaryFlags {
                high_protein: true,
                contains_gluten: true,
                contains_dairy: true,
                vegan: false,
                keto: false,
            },
            compliance: ComplianceNotes {
                permitted: true,
                note: None,
                allergens: ["eggs".to_string()].into_iter().collect(),
            },
            health_score: HealthScore::default(),
        }
    }
}
