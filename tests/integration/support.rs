//! Shared fixtures: synthetic dish photos and a scripted model.

#![allow(dead_code)]

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use platelens::pipeline::{
    AnalysisPipeline, ModelClient, ModelError, ModelRequest, ModelResponse, PipelineSettings,
};
use platelens::record::{
    AnalysisRecord, ComplianceNotes, DietaryFlags, HealthScore, Nutrition, Preparation,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A smooth synthetic "plate" that survives JPEG recompression.
pub fn plate() -> RgbImage {
    RgbImage::from_fn(256, 256, |x, y| {
        let (fx, fy) = (x as f64, y as f64);
        let v = 128.0 + 60.0 * (fx / 23.0).sin() + 50.0 * (fy / 37.0).cos()
            - 0.15 * (fx - fy);
        let l = v.clamp(0.0, 255.0) as u8;
        Rgb([l, l.saturating_sub(20), l / 2])
    })
}

/// The photographic negative of [`plate`].
pub fn negative_plate() -> RgbImage {
    let mut img = plate();
    for px in img.pixels_mut() {
        px.0 = [255 - px.0[0], 255 - px.0[1], 255 - px.0[2]];
    }
    img
}

/// Encode as JPEG at `quality`.
pub fn jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .unwrap();
    buf
}

/// Decode JPEG bytes and encode them again at `quality`.
pub fn recompress(bytes: &[u8], quality: u8) -> Vec<u8> {
    let img = image::load_from_memory(bytes).unwrap().to_rgb8();
    jpeg(&img, quality)
}

pub const DETAIL_JSON: &str = r#"Here you go:
```json
{
  "subject_name": "Beef Tacos",
  "category": "Mexican",
  "ingredients": ["corn tortillas", "ground beef", "cheddar cheese", "salsa"],
  "nutrition": {"calories": 620, "protein_g": 32, "carbs_g": 45, "fat_g": 30},
  "preparation": {"servings": 3, "prep_minutes": 10, "cook_minutes": 15,
                  "steps": ["Brown the beef", "Warm the tortillas", "Assemble"]},
  "dietary_flags": {"contains_dairy": true, "contains_gluten": false},
  "compliance": {"permitted": true, "allergens": ["cheddar cheese"]},
  "health_score": {"overall": 62, "nutrient_density": 58, "macro_balance": 66}
}
```"#;

/// Scripted model answering each stage from fixed text.
pub struct ScriptedModel {
    pub identify: String,
    pub subject: String,
    pub detail: String,
    pub identify_calls: AtomicUsize,
    pub subject_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn tacos() -> Arc<Self> {
        Self::new(
            r#"{"is_food": true, "confidence": 0.93, "subject_name": "Beef Tacos", "category": "Mexican"}"#,
            r#"{"subject_name": "beef  tacos"}"#,
        )
    }

    pub fn not_food() -> Arc<Self> {
        Self::new(
            r#"{"is_food": false, "confidence": 0.12, "subject_name": "", "category": ""}"#,
            r#"{"subject_name": ""}"#,
        )
    }

    pub fn new(identify: &str, subject: &str) -> Arc<Self> {
        Arc::new(Self {
            identify: identify.to_string(),
            subject: subject.to_string(),
            detail: DETAIL_JSON.to_string(),
            identify_calls: AtomicUsize::new(0),
            subject_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        })
    }

    pub fn total_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
            + self.subject_calls.load(Ordering::SeqCst)
            + self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn pipeline(self: &Arc<Self>) -> AnalysisPipeline {
        AnalysisPipeline::new(self.clone(), PipelineSettings::default())
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let settings = PipelineSettings::default();
        let text = if request.image.is_none() {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            &self.detail
        } else if request.model == settings.subject_model
            && request.max_tokens == settings.subject_max_tokens
        {
            self.subject_calls.fetch_add(1, Ordering::SeqCst);
            &self.subject
        } else {
            self.identify_calls.fetch_add(1, Ordering::SeqCst);
            &self.identify
        };
        Ok(ModelResponse::new(text.clone()))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// A model that is always down.
pub struct DownModel;

#[async_trait]
impl ModelClient for DownModel {
    async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::Status {
            status: 503,
            body: "maintenance".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "down"
    }
}

/// A consistent record built outside the pipeline.
pub fn record(subject: &str, category: &str, calories: f64) -> AnalysisRecord {
    AnalysisRecord {
        subject_name: subject.to_string(),
        category: category.to_string(),
        ingredients: vec!["rice".to_string(), "chicken".to_string(), "peanuts".to_string()],
        nutrition: Nutrition {
            calories,
            protein_g: 28.0,
            carbs_g: 70.0,
            fat_g: 18.0,
        },
        preparation: Preparation {
            servings: 2,
            prep_minutes: 15,
            cook_minutes: 20,
            steps: vec!["Cook rice".to_string(), "Stir-fry chicken".to_string()],
        },
        dietary_flags: DietaryFlags::default(),
        compliance: ComplianceNotes::default(),
        health_score: HealthScore::default(),
    }
    .reconciled()
}
