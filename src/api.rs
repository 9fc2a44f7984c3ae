//! HTTP surface for the summarization service.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /summarize` – `{text}` → `{summary}`. Optional `max_length`, `min_length`,
//!   `length_penalty`, and `beam_count` tune beam search.
//! - `POST /generate` – `{prompt}` → `{generated}`. Optional `model`, `max_tokens`,
//!   `temperature`, and `top_p` tune the provider call.
//! - `POST /import_url` – `{url}` → `{content}` with the page's paragraph text.
//! - `POST /upload_file` – multipart `file` part (`.pdf`/`.docx`/`.txt`) → `{content}`.
//! - `GET /health` – liveness plus the device the summarization model runs on.
//! - `GET /commands` – machine-readable catalog of the operations above.
//!
//! Every failure is answered with status 400 and `{"error": "...", "error_kind": "..."}`.

use crate::pipeline::{
    GenerateInput, PipelineApi, PipelineError, ResultEnvelope, SummarizeInput, Upload,
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Largest accepted request body, uploads included.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline operations.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/summarize", post(summarize::<S>))
        .route("/generate", post(generate::<S>))
        .route("/import_url", post(import_url::<S>))
        .route("/upload_file", post(upload_file::<S>))
        .route("/health", get(health::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(trace_request))
        .with_state(service)
}

/// Attach a request id span to every request.
async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

/// Summarize inline text.
async fn summarize<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<SummarizeInput>, JsonRejection>,
) -> Response
where
    S: PipelineApi,
{
    match payload {
        Ok(Json(input)) => respond("summary", service.summarize(input).await),
        Err(rejection) => invalid_body(rejection),
    }
}

/// Generate text from a prompt.
async fn generate<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<GenerateInput>, JsonRejection>,
) -> Response
where
    S: PipelineApi,
{
    match payload {
        Ok(Json(input)) => respond("generated", service.generate(input).await),
        Err(rejection) => invalid_body(rejection),
    }
}

/// Request body for `POST /import_url`.
#[derive(Deserialize)]
struct ImportRequest {
    /// Address of the page to import.
    #[serde(default)]
    url: String,
}

/// Import the paragraph text of a web page.
async fn import_url<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Response
where
    S: PipelineApi,
{
    match payload {
        Ok(Json(request)) => respond("content", service.import_url(request.url).await),
        Err(rejection) => invalid_body(rejection),
    }
}

/// Extract the text of an uploaded file.
async fn upload_file<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response
where
    S: PipelineApi,
{
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return error_response(&PipelineError::validation(rejection.body_text())),
    };
    match read_upload(&mut multipart).await {
        Ok(upload) => respond("content", service.extract_file(upload).await),
        Err(error) => error_response(&error),
    }
}

/// Pull the `file` part out of a multipart body, ignoring any other parts.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| PipelineError::validation(format!("Malformed multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|error| {
            PipelineError::validation(format!("Failed to read uploaded file: {error}"))
        })?;
        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    device: &'static str,
}

/// Report liveness and the summarization device chosen at startup.
async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: PipelineApi,
{
    Json(HealthResponse {
        status: "ok",
        device: service.health().device.as_str(),
    })
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Summarize text with the local seq2seq model. Response returns { \"summary\": string }.",
                request_example: Some(json!({
                    "text": "Long article text",
                    "max_length": 150,
                    "min_length": 30,
                    "length_penalty": 2.0,
                    "beam_count": 4
                })),
            },
            CommandDescriptor {
                name: "generate",
                method: "POST",
                path: "/generate",
                description: "Generate freeform text from a prompt via the chat-completion provider. Response returns { \"generated\": string }.",
                request_example: Some(json!({
                    "prompt": "Write a product description",
                    "model": "jamba-1.5-large",
                    "max_tokens": 2048,
                    "temperature": 0.4,
                    "top_p": 1.0
                })),
            },
            CommandDescriptor {
                name: "import_url",
                method: "POST",
                path: "/import_url",
                description: "Fetch a web page and return the text of its paragraphs. Response returns { \"content\": string }.",
                request_example: Some(json!({ "url": "https://example.org/article" })),
            },
            CommandDescriptor {
                name: "upload_file",
                method: "POST",
                path: "/upload_file",
                description: "Upload a .pdf, .docx, or .txt file as the multipart part `file` and return its text. Response returns { \"content\": string }.",
                request_example: None,
            },
        ],
    })
}

fn respond(key: &'static str, envelope: ResultEnvelope) -> Response {
    match envelope.into_result() {
        Ok(payload) => (StatusCode::OK, Json(json!({ key: payload }))).into_response(),
        Err(error) => error_response(&error),
    }
}

fn error_response(error: &PipelineError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": error.message,
            "error_kind": error.kind,
        })),
    )
        .into_response()
}

fn invalid_body(rejection: JsonRejection) -> Response {
    error_response(&PipelineError::validation(rejection.body_text()))
}
