use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    models::FileInfo,
    session::{ApplyReport, UploadedFile},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct FileNamesPayload {
    file_names: Vec<String>,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

/// Los tres campos son `null` cuando no hay información relevante.
#[derive(Serialize, Default)]
pub struct AskResponse {
    answer: Option<String>,
    top_content: Option<String>,
    top_source: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    question: String,
    answer: String,
    source_doc: String,
    source_preview: String,
    asked_at: DateTime<Utc>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    // El límite por defecto de axum (2 MB) se queda corto para muchos PDF.
    let upload_limit = DefaultBodyLimit::max(app_state.config.max_upload_bytes);

    Router::new()
        .route("/api/upload", post(upload_handler).layer(upload_limit))
        .route("/api/sync", post(sync_handler))
        .route("/api/remove", post(remove_handler))
        .route("/api/files", get(files_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/history", get(history_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApplyReport>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), format!("Multipart inválido: {e}")))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), format!("Error leyendo '{name}': {e}")))?;
        let file = UploadedFile::from_bytes(name, &bytes).map_err(|e| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Error guardando el fichero: {e}"))
        })?;
        files.push(file);
    }

    if files.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No se ha recibido ningún fichero."));
    }

    let mut session = state.session.lock().await;
    if files.iter().all(|f| !session.supports(&f.name)) {
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        return Err(api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("Unsupported file type: {}", names.join(", ")),
        ));
    }

    state.set_status(true, format!("Procesando {} fichero(s)...", files.len()), 0.0);
    let result = session.upload(files).await;
    drop(session);

    match result {
        Ok(report) => {
            state.set_status(false, format!("¡Indexación completada! {report}"), 1.0);
            Ok(Json(report))
        }
        Err(err) => {
            error!("Error de ingesta: {err}");
            state.set_status(false, format!("Error en la indexación: {err}"), 0.0);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error al indexar los ficheros: {err}"),
            ))
        }
    }
}

#[axum::debug_handler]
async fn sync_handler(
    State(state): State<AppState>,
    Json(payload): Json<FileNamesPayload>,
) -> Result<Json<ApplyReport>, ApiError> {
    state
        .session
        .lock()
        .await
        .sync(&payload.file_names, Vec::new())
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[axum::debug_handler]
async fn remove_handler(
    State(state): State<AppState>,
    Json(payload): Json<FileNamesPayload>,
) -> Result<Json<ApplyReport>, ApiError> {
    state
        .session
        .lock()
        .await
        .remove(&payload.file_names)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[axum::debug_handler]
async fn files_handler(State(state): State<AppState>) -> Json<Vec<FileInfo>> {
    Json(state.session.lock().await.files().to_vec())
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AskResponse>, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }

    let result = state.session.lock().await.ask(&payload.question).await;
    match result {
        Ok(Some(answer)) => Ok(Json(AskResponse {
            answer: Some(answer.answer),
            top_content: Some(answer.top_content),
            top_source: Some(answer.top_source),
        })),
        Ok(None) => Ok(Json(AskResponse::default())),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error al procesar la consulta RAG: {e}"),
        )),
    }
}

#[axum::debug_handler]
async fn history_handler(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    let session = state.session.lock().await;
    let entries = session
        .history()
        .iter()
        .rev()
        .map(|turn| HistoryEntry {
            question: turn.question.clone(),
            answer: turn.answer.clone(),
            source_doc: turn.source_doc.clone(),
            source_preview: turn.preview(),
            asked_at: turn.asked_at,
        })
        .collect();
    Json(entries)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().map(|s| s.clone()).unwrap_or_default())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().ok().and_then(|mut s| s.take()) {
        let _ = sender.send(());
    }
    StatusCode::OK
}
