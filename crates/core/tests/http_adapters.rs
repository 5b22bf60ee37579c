use std::{sync::Arc, time::Duration};

use reelsmith_core::{
    ReelsmithError, TrendingQuery, YoutubeDataApi,
    analysis::{
        OpenAiTranscriber, TranscriptionNormalizer, VideoAnnotator, VideoIntelligenceClient,
        VisionInsightNormalizer,
    },
    generation::{ChatCompletionsClient, ChatMessage, CompletionRequest, GenerativeModel},
    media::{CobaltFetcher, MediaFetcher},
    retry::RetryConfig,
    search_trending,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param},
};

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[tokio::test]
async fn chat_client_requests_json_objects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-5-mini",
            "temperature": 0.0,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionsClient::new(
        format!("{}/v1/chat/completions", server.uri()),
        "gpt-5-mini",
        "sk-test",
        timeout(),
    );
    let reply = client
        .complete(&CompletionRequest {
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("{}")],
            temperature: 0.0,
            schema_hint: None,
        })
        .await
        .unwrap();

    assert_eq!(reply, "{\"ok\": true}");
}

#[tokio::test]
async fn chat_client_sends_the_schema_hint() {
    let server = MockServer::start().await;
    let schema = json!({
        "title": "Storyboard",
        "type": "object",
        "required": ["scenes", "total_duration_sec", "target"]
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "Storyboard", "schema": schema}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionsClient::new(
        format!("{}/v1/chat/completions", server.uri()),
        "m",
        "k",
        timeout(),
    );
    let reply = client
        .complete(&CompletionRequest {
            messages: vec![ChatMessage::user("{}")],
            temperature: 0.0,
            schema_hint: Some(schema.clone()),
        })
        .await
        .unwrap();

    assert_eq!(reply, "{}");
}

#[tokio::test]
async fn chat_client_surfaces_status_and_missing_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fail"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let request = CompletionRequest {
        messages: vec![ChatMessage::user("{}")],
        temperature: 0.0,
        schema_hint: None,
    };

    let failing =
        ChatCompletionsClient::new(format!("{}/fail", server.uri()), "m", "k", timeout());
    let err = failing.complete(&request).await.unwrap_err();
    assert!(matches!(
        err,
        ReelsmithError::UpstreamStatus { status: 401, ref body, .. } if body.contains("invalid api key")
    ));

    let empty = ChatCompletionsClient::new(format!("{}/empty", server.uri()), "m", "k", timeout());
    let err = empty.complete(&request).await.unwrap_err();
    assert!(matches!(err, ReelsmithError::Normalization { .. }));
}

fn youtube(server: &MockServer) -> YoutubeDataApi {
    YoutubeDataApi::new("yt-key", timeout(), 3)
        .with_base_url(server.uri())
        .with_retry(
            RetryConfig::new("youtube-data")
                .with_max_retries(3)
                .with_base_delay(Duration::from_millis(5)),
        )
}

fn trending_query() -> TrendingQuery {
    TrendingQuery {
        topic: "кофе".into(),
        limit: 2,
        region: "RU".into(),
        published_after: "2025-01-01T00:00:00Z".into(),
        shorts_only: true,
    }
}

async fn mount_videos(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "v1,v2"))
        .and(query_param("part", "snippet,contentDetails,statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "v2", "snippet": {"title": "Second", "channelTitle": "B", "publishedAt": "2025-02-01T00:00:00Z"},
                 "statistics": {"viewCount": "500", "likeCount": "5"}},
                {"id": "v1", "snippet": {"title": "First", "channelTitle": "A", "publishedAt": "2025-01-15T00:00:00Z"},
                 "statistics": {"viewCount": "9000", "likeCount": "90"}}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn youtube_search_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("key", "yt-key"))
        .and(query_param("q", "кофе"))
        .and(query_param("order", "viewCount"))
        .and(query_param("videoDuration", "short"))
        .and(query_param("publishedAfter", "2025-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": {"videoId": "v1"}},
                {"id": {"videoId": "v2"}},
                {"id": {"videoId": "v3"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_videos(&server).await;

    let found = search_trending(&youtube(&server), &trending_query())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].video_id, "v1");
    assert_eq!(found[0].view_count, 9000);
    assert_eq!(found[1].title, "Second");
}

#[tokio::test]
async fn youtube_throttling_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rateLimitExceeded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": {"videoId": "v1"}}, {"id": {"videoId": "v2"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_videos(&server).await;

    let found = search_trending(&youtube(&server), &trending_query())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn youtube_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = search_trending(&youtube(&server), &trending_query())
        .await
        .unwrap_err();
    assert!(matches!(err, ReelsmithError::UpstreamStatus { status: 403, .. }));
}

#[tokio::test]
async fn hosted_transcription_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task": "transcribe",
            "language": "russian",
            "duration": 4.0,
            "text": "Привет. Как дела?",
            "segments": [
                {"id": 0, "start": 0.0, "end": 1.8, "text": " Привет."},
                {"id": 1, "start": 1.8, "end": 4.0, "text": " Как дела?"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio.mp3");
    std::fs::write(&audio, vec![0u8; 1024]).unwrap();

    let backend = OpenAiTranscriber::new("sk-test", timeout())
        .with_endpoint(format!("{}/v1/audio/transcriptions", server.uri()));
    let transcript = TranscriptionNormalizer::new(Arc::new(backend))
        .transcribe(&audio)
        .await
        .unwrap();

    assert_eq!(transcript.language.as_deref(), Some("russian"));
    assert_eq!(transcript.segments.len(), 2);
    assert_eq!(transcript.segments[1].text, "Как дела?");
    assert_eq!(transcript.duration_seconds(), 4.0);
}

#[tokio::test]
async fn video_annotation_polls_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos:annotate"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(json!({
            "features": ["SHOT_CHANGE_DETECTION", "LABEL_DETECTION"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "projects/p/operations/42"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/p/operations/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "projects/p/operations/42"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/p/operations/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/p/operations/42",
            "done": true,
            "response": {
                "annotationResults": [{
                    "shotAnnotations": [
                        {"startTimeOffset": "0s", "endTimeOffset": "5s"},
                        {"startTimeOffset": "5s", "endTimeOffset": "4.5s"}
                    ],
                    "segmentLabelAnnotations": [{
                        "entity": {"description": "car"},
                        "categoryEntities": [{"description": "vehicle"}],
                        "segments": [{"segment": {"startTimeOffset": "1s", "endTimeOffset": "4.500s"}, "confidence": 0.9}]
                    }]
                }]
            }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("source.mp4");
    std::fs::write(&video, vec![0u8; 2048]).unwrap();

    let client = VideoIntelligenceClient::with_api_key("g-key", timeout())
        .with_base_url(server.uri())
        .with_poll_interval(Duration::from_millis(10));
    let report = VisionInsightNormalizer::new(Arc::new(client))
        .analyze_with_report(&video)
        .await
        .unwrap();

    assert_eq!(report.insights.shots.len(), 2);
    assert_eq!(report.insights.shots[1].start_sec, 5.0);
    assert_eq!(report.insights.shots[1].end_sec, 5.0);
    assert_eq!(report.clamped_windows, 1);
    assert_eq!(report.insights.key_objects[0].end_sec, 4.5);
    assert_eq!(report.insights.key_objects[0].categories, ["vehicle"]);
}

#[tokio::test]
async fn video_annotation_requests_honour_the_configured_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos:annotate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "operations/slow", "done": false}))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("source.mp4");
    std::fs::write(&video, vec![0u8; 2048]).unwrap();

    let narrowed = VideoIntelligenceClient::with_api_key("g-key", Duration::from_secs(10))
        .with_base_url(server.uri())
        .with_request_timeout(Duration::from_millis(100));
    let err = narrowed.annotate(&video).await.unwrap_err();
    assert!(
        matches!(err, ReelsmithError::Transport { .. }),
        "expected a request timeout, got {err}"
    );
    assert!(err.is_retryable());

    let bounded = VideoIntelligenceClient::with_api_key("g-key", Duration::from_millis(100))
        .with_base_url(server.uri());
    let err = bounded.annotate(&video).await.unwrap_err();
    assert!(matches!(err, ReelsmithError::Timeout { .. } | ReelsmithError::Transport { .. }));
}

#[tokio::test]
async fn cobalt_streams_the_tunnel_into_the_work_dir() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({
            "url": "https://www.youtube.com/watch?v=abc123",
            "videoQuality": "720",
            "audioFormat": "mp3",
            "filenameStyle": "basic",
            "alwaysProxy": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "tunnel",
            "url": format!("{}/tunnel/abc123", server.uri()),
            "filename": "abc123.mp4"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tunnel/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 20_000]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = CobaltFetcher::new(server.uri(), "720", timeout());
    let fetched = fetcher
        .fetch("https://www.youtube.com/watch?v=abc123", dir.path())
        .await
        .unwrap();

    assert_eq!(fetched.path, dir.path().join("source.mp4"));
    assert_eq!(std::fs::metadata(&fetched.path).unwrap().len(), 20_000);
}

#[tokio::test]
async fn cobalt_error_status_is_a_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "error": {"code": "error.api.content.video.unavailable"}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = CobaltFetcher::new(server.uri(), "720", timeout())
        .fetch("https://www.youtube.com/watch?v=abc123", dir.path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("video.unavailable"));
}

