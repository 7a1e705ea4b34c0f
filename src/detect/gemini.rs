use crate::detect::{DetectionService, VideoPayload};
use crate::error::{ReelError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model used for moment detection.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Threshold for using Files API vs inline data (20 MB).
const INLINE_SIZE_THRESHOLD: usize = 20 * 1024 * 1024;

/// Maximum file size accepted by the Files API (2 GB).
const MAX_FILE_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Google Gemini video understanding client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    base_delay: Duration,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    /// Set the model name.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the base delay for retry backoff.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn generate_content_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn files_upload_url(&self) -> String {
        format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key)
    }

    fn build_request(instruction: &str, media: Part) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    media,
                    Part::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.2),
                max_output_tokens: Some(1024),
            }),
        }
    }

    /// Upload a video using the Files API (for payloads >= 20MB).
    async fn upload_file(&self, video: &VideoPayload) -> Result<String> {
        let response = self
            .client
            .post(self.files_upload_url())
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("Content-Type", video.mime_type)
            .header("X-Goog-Upload-File-Name", video.file_name.as_str())
            .body(video.bytes.clone())
            .send()
            .await
            .map_err(|e| ReelError::Detection(format!("Gemini file upload failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReelError::Detection(format!(
                "Gemini file upload failed ({}): {}",
                status, error_text
            )));
        }

        let upload_response: FileUploadResponse = response
            .json()
            .await
            .map_err(|e| ReelError::Detection(format!("Invalid upload response: {e}")))?;
        Ok(upload_response.file.uri)
    }

    /// Call the generateContent API endpoint.
    async fn call_generate_content(&self, request: GenerateContentRequest) -> Result<String> {
        let url = self.generate_content_url();

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!("Retry attempt {} after {:?} delay", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Gemini API response status: {}", status);

                    if status.is_success() {
                        let parsed: GenerateContentResponse = resp.json().await.map_err(|e| {
                            ReelError::Detection(format!("Invalid Gemini response: {e}"))
                        })?;
                        return Ok(parsed.text());
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    // Don't retry on client errors
                    if status.is_client_error() {
                        return Err(ReelError::Detection(format!(
                            "Gemini API error ({}): {}",
                            status, error_body
                        )));
                    }

                    warn!("Gemini API server error ({}): {}", status, error_body);
                    last_error = Some(ReelError::Detection(format!(
                        "Gemini API server error: {}",
                        status
                    )));
                }
                Err(e) => {
                    warn!("Gemini API request failed: {}", e);
                    last_error = Some(ReelError::Detection(format!(
                        "Gemini API request failed: {e}"
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ReelError::Detection("Unknown error".to_string())))
    }
}

#[async_trait]
impl DetectionService for GeminiClient {
    async fn generate(&self, instruction: &str, video: &VideoPayload) -> Result<String> {
        let size = video.bytes.len();

        if size > MAX_FILE_SIZE {
            return Err(ReelError::Detection(format!(
                "Video too large: {} bytes (max {} bytes)",
                size, MAX_FILE_SIZE
            )));
        }

        let media = if size < INLINE_SIZE_THRESHOLD {
            debug!("Using inline video data ({} bytes)", size);
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: video.mime_type.to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(&video.bytes),
                },
            }
        } else {
            debug!("Uploading video to Files API ({} bytes)", size);
            let file_uri = self.upload_file(video).await?;
            debug!("File uploaded: {}", file_uri);
            Part::FileData {
                file_data: FileData {
                    mime_type: video.mime_type.to_string(),
                    file_uri,
                },
            }
        };

        self.call_generate_content(Self::build_request(instruction, media))
            .await
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}

// Request/Response types

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
    FileData { file_data: FileData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, all parts joined.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    uri: String,
}
