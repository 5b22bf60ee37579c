mod openai_stt;
mod transcription;
mod video_intelligence;
mod vision;
#[cfg(feature = "local-whisper")]
mod whisper_local;

pub use openai_stt::OpenAiTranscriber;
pub use transcription::{
    SegmentRecord, SpeechToText, TranscriptionNormalizer, TranscriptionResponse,
    VerboseTranscription, normalize_transcription,
};
pub use video_intelligence::VideoIntelligenceClient;
pub use vision::{
    AnnotateVideoResponse, AnnotationPayload, AnnotationStatus, Entity, LabelAnnotation,
    LabelSegment, ObjectTrackingAnnotation, ProtoInt64, TimeOffset, VideoAnnotationResults,
    VideoAnnotator, VideoSegment, VisionInsightNormalizer, VisionNormalization,
    normalize_annotations,
};
#[cfg(feature = "local-whisper")]
pub use whisper_local::LocalWhisperTranscriber;
