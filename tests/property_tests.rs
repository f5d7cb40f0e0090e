use chrono::{Duration, Utc};
use proptest::prelude::*;
use platelens::cache::{normalize_subject, CacheEntry, LocalTier};
use platelens::imaging::{find_similar, signature_distance, ContentHasher, Signature, SimilarityCandidate};
use platelens::record::{
    AnalysisRecord, ComplianceNotes, DietaryFlags, HealthScore, Nutrition, Preparation,
};

struct Candidate {
    signature: Signature,
    created_at: chrono::DateTime<Utc>,
}

impl SimilarityCandidate for Candidate {
    fn signature(&self) -> Option<&Signature> {
        Some(&self.signature)
    }

    fn created_at(&self) -> chrono::DateTime<Utc> {
        self.created_at
    }
}

fn record(protein: f64, carbs: f64, dairy: bool) -> AnalysisRecord {
    AnalysisRecord {
        subject_name: "Bowl".to_string(),
        category: "Fusion".to_string(),
        ingredients: vec!["rice".to_string(), "tofu".to_string()],
        nutrition: Nutrition {
            calories: 400.0,
            protein_g: protein,
            carbs_g: carbs,
            fat_g: 10.0,
        },
        preparation: Preparation {
            servings: 1,
            prep_minutes: 5,
            cook_minutes: 5,
            steps: vec!["Assemble".to_string()],
        },
        dietary_flags: DietaryFlags {
            high_protein: false,
            contains_gluten: false,
            contains_dairy: dairy,
            vegan: true,
            keto: true,
        },
        compliance: ComplianceNotes {
            permitted: true,
            note: None,
            allergens: ["tofu".to_string(), "shellfish".to_string()]
                .into_iter()
                .collect(),
        },
        health_score: HealthScore {
            overall: 140.0,
            nutrient_density: -3.0,
            macro_balance: 50.0,
        },
    }
}

proptest! {
    #[test]
    fn test_digest_determinism(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let hasher = ContentHasher::new();
        let a = hasher.digest(&bytes);
        let b = hasher.digest(&bytes);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.to_hex().len(), 64);
        prop_assert_eq!(a.to_hex().parse::<platelens::imaging::ContentDigest>().unwrap(), a);
    }

    #[test]
    fn test_single_byte_mutation_changes_digest(
        bytes in prop::collection::vec(any::<u8>(), 1..2048),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let hasher = ContentHasher::new();
        let mut mutated = bytes.clone();
        let i = index.index(mutated.len());
        mutated[i] ^= flip;
        prop_assert_ne!(hasher.digest(&bytes), hasher.digest(&mutated));
    }

    #[test]
    fn test_find_similar_respects_threshold_and_order(
        query in "[A-Za-z0-9+/]{11}",
        sigs in prop::collection::vec("[A-Za-z0-9+/]{9,11}", 0..40),
        threshold in 0u32..12,
        limit in 0usize..10,
    ) {
        let now = Utc::now();
        let query = Signature::new(query);
        let candidates: Vec<Candidate> = sigs
            .into_iter()
            .enumerate()
            .map(|(i, s)| Candidate {
                signature: Signature::new(s),
                created_at: now - Duration::minutes(i as i64),
            })
            .collect();

        let found = find_similar(&query, candidates.iter(), threshold, limit);
        prop_assert!(found.len() <= limit);
        for (distance, c) in &found {
            prop_assert!(*distance <= threshold);
            prop_assert_eq!(*distance, signature_distance(&query, &c.signature));
        }
        for pair in found.windows(2) {
            let ((d1, a), (d2, b)) = (&pair[0], &pair[1]);
            prop_assert!(d1 < d2 || (d1 == d2 && a.created_at >= b.created_at));
        }
    }

    #[test]
    fn test_distance_is_symmetric(a in "[A-Za-z0-9+/]{0,14}", b in "[A-Za-z0-9+/]{0,14}") {
        let (a, b) = (Signature::new(a), Signature::new(b));
        prop_assert_eq!(signature_distance(&a, &b), signature_distance(&b, &a));
        prop_assert_eq!(signature_distance(&a, &a), 0);
    }

    #[test]
    fn test_local_tier_never_exceeds_capacity(
        capacity in 1usize..8,
        puts in prop::collection::vec(0u8..16, 0..40),
    ) {
        let hasher = ContentHasher::new();
        let mut tier = LocalTier::in_memory(capacity, 30);
        for seed in &puts {
            tier.put(CacheEntry::new(hasher.digest(&[*seed]), None, record(10.0, 10.0, false)));
            prop_assert!(tier.len() <= capacity);
        }
        if let Some(last) = puts.last() {
            prop_assert!(tier.lookup_exact(&hasher.digest(&[*last])).is_some());
        }
    }

    #[test]
    fn test_reconciled_records_are_consistent(
        protein in 0.0f64..80.0,
        carbs in 0.0f64..80.0,
        dairy in any::<bool>(),
    ) {
        let rec = record(protein, carbs, dairy).reconciled();
        prop_assert!(rec.is_consistent());
        prop_assert_eq!(rec.dietary_flags.high_protein, protein >= 20.0);
        prop_assert!(!rec.compliance.allergens.contains("shellfish"));
        prop_assert!((0.0..=100.0).contains(&rec.health_score.overall));
        prop_assert!((0.0..=100.0).contains(&rec.health_score.nutrient_density));
    }

    #[test]
    fn test_normalize_subject_idempotent(name in "[ \\tA-Za-zÀ-ÖØ-öø-ÿ]{0,40}") {
        let once = normalize_subject(&name);
        prop_assert_eq!(normalize_subject(&once), once.clone());
        prop_assert_eq!(once.trim(), once.as_str());
    }
}
