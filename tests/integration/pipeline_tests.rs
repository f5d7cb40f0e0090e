use super::support::{jpeg, plate, ScriptedModel};
use platelens::pipeline::{PipelineError, PipelineStage};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_not_food_makes_exactly_one_call() {
    let model = ScriptedModel::not_food();
    let err = model.pipeline().run(&jpeg(&plate(), 90)).await.unwrap_err();

    assert!(matches!(err, PipelineError::NotFood { confidence } if confidence < 0.5));
    assert_eq!(model.total_calls(), 1);
    assert_eq!(model.identify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_borderline_confidence_is_accepted() {
    let model = ScriptedModel::new(
        r#"{"is_food": true, "confidence": 0.5, "subject_name": "Beef Tacos", "category": "Mexican"}"#,
        "{}",
    );
    let record = model.pipeline().run(b"bytes").await.unwrap();
    assert_eq!(record.subject_name, "Beef Tacos");
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generated_record_obeys_ingredient_rules() {
    let model = ScriptedModel::tacos();
    let record = model.pipeline().run(&jpeg(&plate(), 90)).await.unwrap();

    assert_eq!(record.ingredients.len(), 4);
    assert_eq!(record.preparation.steps.len(), 3);
    assert!(record.dietary_flags.high_protein);
    assert!(record.dietary_flags.contains_dairy);
    assert!(!record.dietary_flags.vegan);
    assert!(!record.dietary_flags.keto);
    assert!(record
        .compliance
        .allergens
        .iter()
        .all(|a| record.references_ingredient(a)));
    assert_eq!(record.health_score.overall, 62.0);
    assert!(record.is_consistent());
}

#[tokio::test]
async fn test_garbled_identification_is_malformed() {
    let model = ScriptedModel::new("the photo shows a lovely taco", "{}");
    let err = model.pipeline().run(b"bytes").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MalformedResponse {
            stage: PipelineStage::Identify,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 0);
}
