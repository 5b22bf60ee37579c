use std::sync::Arc;

use serde_json::{Value, json};
use tracing::instrument;

use super::constrained::{
    ConstrainedGenerator, GenerationRequest, OutputValidator, decode_schema, parse_json_payload,
};
use crate::{
    error::{Result, Stage, ValidationError},
    types::{Scenario, Storyboard, Target},
};

/// Checks the numeric invariants of a decoded storyboard against `target`.
/// Nothing is repaired: a board either satisfies them or is rejected with a
/// message naming the rule it broke.
pub fn check_storyboard(board: &Storyboard, target: Target) -> std::result::Result<(), ValidationError> {
    if board.target != target {
        return Err(ValidationError::Invariant(format!(
            "target is {} but a {target} storyboard was requested",
            board.target
        )));
    }

    let sum = board.scene_duration_sum();
    if sum != u64::from(board.total_duration_sec) {
        return Err(ValidationError::Invariant(format!(
            "total_duration_sec is {} but the scene durations sum to {sum}; they must be equal",
            board.total_duration_sec
        )));
    }

    let window = target.duration_window();
    if !window.contains(&board.total_duration_sec) {
        return Err(ValidationError::Invariant(format!(
            "total_duration_sec is {} but a {target} storyboard must last between {} and {} seconds",
            board.total_duration_sec,
            window.start(),
            window.end()
        )));
    }

    Ok(())
}

pub struct StoryboardValidator {
    target: Target,
}

impl StoryboardValidator {
    pub fn new(target: Target) -> Self {
        Self { target }
    }
}

impl OutputValidator for StoryboardValidator {
    type Output = Storyboard;

    fn schema_name(&self) -> &'static str {
        "Storyboard"
    }

    fn requirements(&self) -> String {
        let window = self.target.duration_window();
        format!(
            "Storyboard schema: {{\"scenes\": [{{\"duration_sec\": integer >= 0, \"visual_description\": string, \
             \"voice_lines\": [{{\"role\": string, \"text\": string}}], \"broll_hints\": [string], \
             \"tempo\": string, \"transitions\": string}}], \"total_duration_sec\": integer, \
             \"target\": \"{target}\"}}. total_duration_sec must equal the sum of scene duration_sec values \
             and lie between {min} and {max} seconds.",
            target = self.target,
            min = window.start(),
            max = window.end(),
        )
    }

    fn schema_hint(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(Storyboard)).ok()
    }

    fn validate(&self, raw: &str) -> std::result::Result<Storyboard, ValidationError> {
        let board: Storyboard = decode_schema(parse_json_payload(raw)?, self.schema_name())?;
        check_storyboard(&board, self.target)?;
        Ok(board)
    }
}

/// Turns a scenario into a timed storyboard for one target format.
pub struct StoryboardPlanner {
    generator: Arc<ConstrainedGenerator>,
    temperature: f32,
}

impl StoryboardPlanner {
    pub fn new(generator: Arc<ConstrainedGenerator>) -> Self {
        Self {
            generator,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn instructions(target: Target) -> String {
        let window = target.duration_window();
        format!(
            "Ты режиссер монтажа. На основе сценария верни STRICT JSON по схеме Storyboard. \
             Учитывай темп, b-roll и транзишны. Формат: {target}. \
             total_duration_sec равен сумме duration_sec всех сцен и лежит в диапазоне от {} до {} секунд включительно.",
            window.start(),
            window.end(),
        )
    }

    #[instrument(skip(self, scenario), fields(subject = %subject, target = %target))]
    pub async fn plan(&self, subject: &str, scenario: &Scenario, target: Target) -> Result<Storyboard> {
        let payload = json!({
            "scenario": scenario,
            "target": target,
        });
        let instructions = Self::instructions(target);

        self.generator
            .generate(
                GenerationRequest {
                    stage: Stage::Storyboard,
                    subject,
                    instructions: &instructions,
                    payload: &payload,
                    temperature: self.temperature,
                },
                &StoryboardValidator::new(target),
            )
            .await
    }
}
