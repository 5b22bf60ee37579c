mod chat_client;
mod constrained;
mod model;
mod scenario;
mod storyboard;

pub use chat_client::ChatCompletionsClient;
pub use constrained::{
    AttemptContext, AttemptObserver, ConstrainedGenerator, GenerationRequest, GenerationSession,
    GenerationState, JsonTrail, MAX_ATTEMPTS, OutputValidator, TracingObserver, Transition,
    decode_schema, parse_json_payload,
};
pub use model::{ChatMessage, CompletionRequest, GenerativeModel, Role};
pub use scenario::{Localization, ScenarioSynthesizer, ScenarioValidator};
pub use storyboard::{StoryboardPlanner, StoryboardValidator, check_storyboard};
