use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::constrained::{
    ConstrainedGenerator, GenerationRequest, OutputValidator, decode_schema, parse_json_payload,
};
use crate::{
    error::{Result, Stage, ValidationError},
    types::{AnalysisResult, KeyObject, Scenario, ScenarioMeta, Shot, Transcript},
};

/// Who the scenario is written for.
#[derive(Debug, Clone, PartialEq)]
pub struct Localization {
    pub language: String,
    pub audience: String,
}

impl Default for Localization {
    fn default() -> Self {
        Self {
            language: "русский".to_string(),
            audience: "русскоязычная аудитория 18–35".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct VisualHints<'a> {
    shots: &'a [Shot],
    key_objects: &'a [KeyObject],
}

#[derive(Debug, Serialize)]
struct ScenarioInput<'a> {
    transcript: &'a Transcript,
    visual_hints: VisualHints<'a>,
    topic: &'a str,
}

pub struct ScenarioValidator;

impl OutputValidator for ScenarioValidator {
    type Output = Scenario;

    fn schema_name(&self) -> &'static str {
        "Scenario"
    }

    fn requirements(&self) -> String {
        concat!(
            "Scenario schema: {\"scenes\": [{\"duration_sec\": integer >= 0, ",
            "\"visual_description\": string, \"voice_lines\": [{\"role\": string, \"text\": string}]}], ",
            "\"meta\": {\"topic\": string, \"source\": string}}. ",
            "At least one scene is required."
        )
        .to_string()
    }

    fn schema_hint(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(Scenario)).ok()
    }

    fn validate(&self, raw: &str) -> std::result::Result<Scenario, ValidationError> {
        let scenario: Scenario = decode_schema(parse_json_payload(raw)?, self.schema_name())?;
        if scenario.scenes.is_empty() {
            return Err(ValidationError::Invariant(
                "scenario has no scenes, at least one is required".to_string(),
            ));
        }
        Ok(scenario)
    }
}

/// Writes a localized short-video scenario from an analysed source video.
pub struct ScenarioSynthesizer {
    generator: Arc<ConstrainedGenerator>,
    localization: Localization,
    temperature: f32,
}

impl ScenarioSynthesizer {
    pub fn new(generator: Arc<ConstrainedGenerator>) -> Self {
        Self {
            generator,
            localization: Localization::default(),
            temperature: 0.0,
        }
    }

    pub fn with_localization(mut self, localization: Localization) -> Self {
        self.localization = localization;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn instructions(&self) -> String {
        format!(
            "Ты сценарист коротких вирусных видео. Верни STRICT JSON по схеме Scenario. \
             Перескажи с локализацией: язык {language}, аудитория {audience}. \
             Без цитирования исходника: не воспроизводи реплики дословно, пересказывай своими словами. \
             Используй visual_hints (кадры и ключевые объекты) для описания визуала сцен.",
            language = self.localization.language,
            audience = self.localization.audience,
        )
    }

    #[instrument(skip(self, analysis), fields(subject = %subject, topic = %topic))]
    pub async fn synthesize(
        &self,
        subject: &str,
        analysis: &AnalysisResult,
        topic: &str,
    ) -> Result<Scenario> {
        let payload = serde_json::to_value(ScenarioInput {
            transcript: &analysis.transcript,
            visual_hints: VisualHints {
                shots: &analysis.shots,
                key_objects: &analysis.key_objects,
            },
            topic,
        })?;
        let instructions = self.instructions();

        let mut scenario = self
            .generator
            .generate(
                GenerationRequest {
                    stage: Stage::Scenario,
                    subject,
                    instructions: &instructions,
                    payload: &payload,
                    temperature: self.temperature,
                },
                &ScenarioValidator,
            )
            .await?;

        // The model never sees the video id; meta always names this request.
        if scenario.meta.topic != topic || scenario.meta.source != subject {
            debug!(
                model_topic = %scenario.meta.topic,
                model_source = %scenario.meta.source,
                "replacing scenario meta"
            );
        }
        scenario.meta = ScenarioMeta {
            topic: topic.to_string(),
            source: subject.to_string(),
        };
        Ok(scenario)
    }
}
