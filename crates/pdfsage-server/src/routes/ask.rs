//! Question answering over a PDF document.
//!
//! `/ask` waits for the full answer and returns JSON. `/ask-stream` opens a
//! streaming chat with Ollama and relays fragments into a `text/plain`
//! chunked body. Document, extraction and backend-setup failures are reported
//! with an error status before anything is streamed; once the body has
//! started, failures only end it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::error::ApiError;
use crate::state::AppState;
use pdfsage_chat::prompt;
use pdfsage_chat::{AskRequest, AskResponse, ChannelSink, ChatMessage};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ask", post(ask))
        .route("/ask-stream", post(ask_stream))
}

/// POST /ask — answer in a single JSON object.
async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(req) = payload?;
    let (model, messages) = prepare(&state, &req).await?;

    let chunk = state.ollama.chat(&model, &messages).await?;

    Ok(Json(AskResponse {
        answer: chunk.message.content,
    }))
}

/// POST /ask-stream — answer relayed as plain text while it is generated.
async fn ask_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let (model, messages) = prepare(&state, &req).await?;

    let upstream = state.ollama.chat_stream(&model, &messages).await?;

    // Capacity 1: each fragment is handed to the body as soon as it is read.
    let (tx, rx) = mpsc::channel::<String>(1);
    let relay = state.relay();
    let span = tracing::info_span!("relay", filename = %req.filename, model = %model);

    tokio::spawn(
        async move {
            let mut sink = ChannelSink::new(tx);
            relay.run(upstream, &mut sink).await;
        }
        .instrument(span),
    );

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Resolve and read the document, then build the chat messages.
async fn prepare(
    state: &AppState,
    req: &AskRequest,
) -> pdfsage_core::Result<(String, Vec<ChatMessage>)> {
    let context = state.load_document_text(&req.filename).await?;
    let model = state.resolve_model(req.model.as_deref());

    tracing::debug!(
        "Asking {} about {} ({} chars of context)",
        model,
        req.filename,
        context.len()
    );

    Ok((model, prompt::build_messages(&req.question, &context)))
}
