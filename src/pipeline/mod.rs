//! Two-stage analysis pipeline.
//!
//! A photo moves through `Identify -> Detail -> Validate`. Each stage either
//! advances or ends the run with a [`PipelineError`]; nothing is retried and
//! no partial record ever leaves this module.
//!
//! # Example
//!
//! ```no_run
//! use platelens::pipeline::{AnalysisPipeline, HttpModelClient, PipelineSettings};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpModelClient::new("https://api.openai.com/v1", "key", Duration::from_secs(30))?;
//! let pipeline = AnalysisPipeline::new(Arc::new(client), PipelineSettings::default());
//! let record = pipeline.run(&bytes).await?;
//! println!("{} ({} kcal)", record.subject_name, record.nutrition.calories);
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod model;
pub mod parse;
pub mod prompts;
pub mod validate;

pub use http::HttpModelClient;
pub use model::{ImagePayload, ModelClient, ModelError, ModelRequest, ModelResponse};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::imaging::sniff_mime_type;
use crate::record::AnalysisRecord;
use parse::{parse_json, RawDetail, RawIdentification, RawSubject};

/// Identification confidence below which a photo is rejected as not food.
pub const MIN_FOOD_CONFIDENCE: f64 = 0.5;

/// MIME type sent when the bytes cannot be sniffed.
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Pipeline stages, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Image to dish identity.
    Identify,
    /// Dish identity to recipe and nutrition.
    Detail,
    /// Detail response to a checked record.
    Validate,
    /// Lightweight subject guess for semantic lookups.
    SubjectGuess,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identify => "identify",
            Self::Detail => "detail",
            Self::Validate => "validate",
            Self::SubjectGuess => "subject-guess",
        };
        f.write_str(name)
    }
}

/// Terminal outcomes of a pipeline run other than success.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The photo does not show food. A normal outcome, never cached.
    #[error("Image does not appear to show food (confidence {confidence:.2})")]
    NotFood {
        /// Identification confidence in `[0, 1]`
        confidence: f64,
    },

    /// The model could not be reached or did not answer in time.
    #[error("Model unavailable during {stage} stage: {source}")]
    ModelUnavailable {
        /// Stage that failed
        stage: PipelineStage,
        /// Underlying transport failure
        #[source]
        source: ModelError,
    },

    /// The model answered with something that does not fit the contract.
    #[error("Malformed model response during {stage} stage: {reason}")]
    MalformedResponse {
        /// Stage that failed
        stage: PipelineStage,
        /// What was wrong
        reason: String,
    },
}

impl PipelineError {
    /// True for failures a caller may retry later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_rejection()
    }

    /// True when the photo was rejected as not food.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::NotFood { .. })
    }

    fn from_model(stage: PipelineStage, err: ModelError) -> Self {
        match err {
            ModelError::EmptyResponse => Self::MalformedResponse {
                stage,
                reason: err.to_string(),
            },
            other => Self::ModelUnavailable {
                stage,
                source: other,
            },
        }
    }
}

/// Result of the identification stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub is_food: bool,
    /// Certainty in `[0, 1]` that the photo shows food.
    pub confidence: f64,
    pub subject_name: String,
    pub category: String,
}

impl Identification {
    fn from_raw(raw: RawIdentification) -> Result<Self, String> {
        let is_food = raw.is_food.ok_or("missing is_food")?;
        let confidence = raw.confidence.ok_or("missing confidence")?;
        if !confidence.is_finite() {
            return Err(format!("confidence is not a number: {}", confidence));
        }
        Ok(Self {
            is_food,
            confidence: confidence.clamp(0.0, 1.0),
            subject_name: raw.subject_name.unwrap_or_default().trim().to_string(),
            category: raw.category.unwrap_or_default().trim().to_string(),
        })
    }

    /// True when the detail stage should run.
    #[must_use]
    pub fn accepts(&self) -> bool {
        self.is_food && self.confidence >= MIN_FOOD_CONFIDENCE
    }
}

/// Models and budgets used by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub identify_model: String,
    pub detail_model: String,
    /// Cheaper model for subject guesses.
    pub subject_model: String,
    /// Upper bound on every model call.
    pub timeout: Duration,
    pub identify_max_tokens: u32,
    pub detail_max_tokens: u32,
    pub subject_max_tokens: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            identify_model: "gpt-4o-mini".to_string(),
            detail_model: "gpt-4o".to_string(),
            subject_model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            identify_max_tokens: 300,
            detail_max_tokens: 2000,
            subject_max_tokens: 60,
        }
    }
}

/// Runs the identify/detail/validate sequence against a [`ModelClient`].
#[derive(Clone)]
pub struct AnalysisPipeline {
    client: Arc<dyn ModelClient>,
    settings: PipelineSettings,
}

impl fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("provider", &self.client.provider_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl AnalysisPipeline {
    /// Create a pipeline over `client`.
    pub fn new(client: Arc<dyn ModelClient>, settings: PipelineSettings) -> Self {
        Self { client, settings }
    }

    /// Run the full pipeline on `image`.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::NotFood`] when identification rejects the photo;
    ///   the detail model is not called.
    /// * [`PipelineError::ModelUnavailable`] on transport failure or timeout.
    /// * [`PipelineError::MalformedResponse`] when a response does not parse
    ///   or fails validation.
    pub async fn run(&self, image: &[u8]) -> Result<AnalysisRecord, PipelineError> {
        let identified = self.identify(image).await?;
        if !identified.accepts() {
            log::info!(
                "Rejected as not food (is_food={}, confidence={:.2})",
                identified.is_food,
                identified.confidence
            );
            return Err(PipelineError::NotFood {
                confidence: identified.confidence,
            });
        }
        log::debug!(
            "Identified '{}' ({}) with confidence {:.2}",
            identified.subject_name,
            identified.category,
            identified.confidence
        );

        let raw = self.detail(&identified).await?;

        validate::validate_detail(&identified, raw).map_err(|reason| {
            log::warn!("Detail response failed validation: {}", reason);
            PipelineError::MalformedResponse {
                stage: PipelineStage::Validate,
                reason,
            }
        })
    }

    /// Identification stage alone.
    pub async fn identify(&self, image: &[u8]) -> Result<Identification, PipelineError> {
        let request = ModelRequest {
            model: self.settings.identify_model.clone(),
            instruction: prompts::IDENTIFY_INSTRUCTION.to_string(),
            image: Some(image_payload(image)),
            temperature: 0.0,
            max_tokens: self.settings.identify_max_tokens,
        };
        let text = self.call(PipelineStage::Identify, &request).await?;
        parse_json::<RawIdentification>(&text)
            .map_err(|e| e.to_string())
            .and_then(Identification::from_raw)
            .map_err(|reason| malformed(PipelineStage::Identify, reason))
    }

    async fn detail(&self, identified: &Identification) -> Result<RawDetail, PipelineError> {
        let request = ModelRequest {
            model: self.settings.detail_model.clone(),
            instruction: prompts::detail_instruction(
                &identified.subject_name,
                &identified.category,
            ),
            image: None,
            temperature: 0.0,
            max_tokens: self.settings.detail_max_tokens,
        };
        let text = self.call(PipelineStage::Detail, &request).await?;
        parse_json::<RawDetail>(&text)
            .map_err(|e| malformed(PipelineStage::Detail, e.to_string()))
    }

    /// Ask the cheap model for the dish name only.
    ///
    /// Returns `Ok(None)` when the model names nothing.
    pub async fn guess_subject(&self, image: &[u8]) -> Result<Option<String>, PipelineError> {
        let request = ModelRequest {
            model: self.settings.subject_model.clone(),
            instruction: prompts::SUBJECT_INSTRUCTION.to_string(),
            image: Some(image_payload(image)),
            temperature: 0.0,
            max_tokens: self.settings.subject_max_tokens,
        };
        let text = self.call(PipelineStage::SubjectGuess, &request).await?;
        let raw: RawSubject = parse_json(&text)
            .map_err(|e| malformed(PipelineStage::SubjectGuess, e.to_string()))?;
        Ok(raw
            .subject_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    async fn call(
        &self,
        stage: PipelineStage,
        request: &ModelRequest,
    ) -> Result<String, PipelineError> {
        log::debug!(
            "{} stage: invoking {} via {}",
            stage,
            request.model,
            self.client.provider_name()
        );
        match tokio::time::timeout(self.settings.timeout, self.client.invoke(request)).await {
            Ok(Ok(response)) => Ok(response.text),
            Ok(Err(err)) => {
                log::warn!("{} stage: {}", stage, err);
                Err(PipelineError::from_model(stage, err))
            }
            Err(_) => {
                log::warn!("{} stage: timed out after {:?}", stage, self.settings.timeout);
                Err(PipelineError::ModelUnavailable {
                    stage,
                    source: ModelError::Timeout(self.settings.timeout),
                })
            }
        }
    }
}

fn malformed(stage: PipelineStage, reason: String) -> PipelineError {
    log::warn!("{} stage: malformed response: {}", stage, reason);
    PipelineError::MalformedResponse { stage, reason }
}

fn image_payload(bytes: &[u8]) -> ImagePayload {
    ImagePayload {
        mime_type: sniff_mime_type(bytes)
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string(),
        bytes: bytes.to_vec(),
    }
}
