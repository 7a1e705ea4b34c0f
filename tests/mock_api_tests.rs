//! Mock API tests for the detection service and the source fetcher
//!
//! Every request goes to a local wiremock server; nothing leaves the machine.

use peakreel::detect::{DetectionService, GeminiClient, MomentDetector, VideoPayload};
use peakreel::fetch::SourceFetcher;
use peakreel::{ReelError, Workspace};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn candidate(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}

fn small_video() -> VideoPayload {
    VideoPayload {
        bytes: b"tiny video".to_vec(),
        mime_type: "video/mp4",
        file_name: "source.mp4".to_string(),
    }
}

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key".to_string())
        .with_base_url(server.uri())
        .with_retry_delay(Duration::from_millis(1))
}

// ============================================================================
// Gemini API Mock Tests
// ============================================================================

mod gemini_tests {
    use super::*;

    #[tokio::test]
    async fn test_gemini_client_creation() {
        let client = GeminiClient::new("test-api-key".to_string());
        assert_eq!(client.name(), "Google Gemini");
    }

    #[tokio::test]
    async fn test_generate_sends_inline_video_and_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "test-key"))
            .and(body_string_contains("inline_data"))
            .and(body_string_contains("find the peaks"))
            .and(body_string_contains("generationConfig"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("[[1, 3]]")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate("find the peaks", &small_video())
            .await
            .unwrap();

        assert_eq!(text, "[[1, 3]]");
    }

    #[tokio::test]
    async fn test_custom_model_changes_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).with_model("gemini-1.5-pro".to_string());
        assert_eq!(client.generate("x", &small_video()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).generate("x", &small_video()).await;

        match result {
            Err(ReelError::Detection(msg)) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("API key not valid"));
            }
            other => panic!("Expected Detection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("[[4, 6]]")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server).generate("x", &small_video()).await.unwrap();
        assert_eq!(text, "[[4, 6]]");
    }

    #[tokio::test]
    async fn test_server_error_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let result = client_for(&server).generate("x", &small_video()).await;
        assert!(matches!(result, Err(ReelError::Detection(msg)) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_malformed_body_is_detection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).generate("x", &small_video()).await;
        assert!(matches!(result, Err(ReelError::Detection(_))));
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let text = client_for(&server).generate("x", &small_video()).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_large_video_goes_through_files_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(query_param("key", "test-key"))
            .and(header("X-Goog-Upload-Protocol", "raw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": { "uri": "https://files.example/abc123" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains("https://files.example/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("[[2, 5]]")))
            .expect(1)
            .mount(&server)
            .await;

        let video = VideoPayload {
            bytes: vec![0u8; 21 * 1024 * 1024],
            mime_type: "video/mp4",
            file_name: "big.mp4".to_string(),
        };
        let text = client_for(&server).generate("x", &video).await.unwrap();
        assert_eq!(text, "[[2, 5]]");
    }

    #[tokio::test]
    async fn test_detector_over_gemini_parses_fenced_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains("must not exceed 12.0 seconds"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate("```json\n[[5, 8], [20, 23], [9, 7]]\n```")),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("source.mp4");
        std::fs::write(&video, b"video bytes").unwrap();

        let detector = MomentDetector::new(Arc::new(client_for(&server)), 12.0);
        let proposals = detector.detect(&video).await.unwrap();

        let spans: Vec<(f64, f64)> = proposals
            .iter()
            .map(|p| (p.segment.start(), p.segment.end()))
            .collect();
        assert_eq!(spans, vec![(5.0, 8.0), (20.0, 23.0)]);
        assert_eq!(proposals[1].rank, 1);
    }
}

// ============================================================================
// Source Fetcher Mock Tests
// ============================================================================

mod fetch_tests {
    use super::*;

    #[tokio::test]
    async fn test_http_download_into_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/match.webm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let mut workspace = Workspace::open_in(root.path()).unwrap();
        let url = format!("{}/videos/match.webm?token=abc", server.uri());

        let asset = SourceFetcher::new().fetch(&url, &mut workspace).await.unwrap();

        assert_eq!(asset.size_bytes, 4096);
        assert_eq!(asset.url, url);
        assert!(asset.path.starts_with(workspace.path()));
        assert_eq!(asset.path.extension().unwrap(), "webm");
        assert_eq!(std::fs::read(&asset.path).unwrap().len(), 4096);

        workspace.cleanup().unwrap();
        assert!(!asset.path.exists());
    }

    #[tokio::test]
    async fn test_http_error_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let mut workspace = Workspace::open_in(root.path()).unwrap();
        let url = format!("{}/missing.mp4", server.uri());

        let result = SourceFetcher::new().fetch(&url, &mut workspace).await;
        assert!(matches!(result, Err(ReelError::Fetch(msg)) if msg.contains("404")));

        workspace.cleanup().unwrap();
    }

    #[tokio::test]
    async fn test_empty_body_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let mut workspace = Workspace::open_in(root.path()).unwrap();
        let url = format!("{}/empty.mp4", server.uri());

        let result = SourceFetcher::new().fetch(&url, &mut workspace).await;
        assert!(matches!(result, Err(ReelError::Fetch(msg)) if msg.contains("empty")));

        workspace.cleanup().unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_timeout_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let mut workspace = Workspace::open_in(root.path()).unwrap();
        let url = format!("{}/slow.mp4", server.uri());

        let fetcher = SourceFetcher::new().with_timeout(Duration::from_millis(100));
        let result = fetcher.fetch(&url, &mut workspace).await;
        assert!(matches!(result, Err(ReelError::Fetch(_))));

        workspace.cleanup().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let root = TempDir::new().unwrap();
        let mut workspace = Workspace::open_in(root.path()).unwrap();

        // Port 9 (discard) is closed on test machines
        let result = SourceFetcher::new()
            .with_timeout(Duration::from_secs(5))
            .fetch("http://127.0.0.1:9/video.mp4", &mut workspace)
            .await;
        assert!(matches!(result, Err(ReelError::Fetch(_))));

        workspace.cleanup().unwrap();
    }
}
