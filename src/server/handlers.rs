use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use super::models::{
    ClearRequest, ClearResponse, CorpusResponse, ErrorResponse, MemeRequest, MemeResponse,
    TemplatesResponse,
};
use super::state::ServerState;
use crate::corpus::ClearOutcome;
use crate::pipeline::{InputError, MemeCreator, SelectedImage, Session};
use crate::render::PNG_MIME;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<InputError>().is_some() {
            return ServerError::bad_request(err.to_string());
        }
        ServerError::internal(format!("{:#}", err))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub async fn run_server(creator: MemeCreator, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", listener.local_addr()?);
    serve(listener, creator).await
}

pub async fn serve(listener: TcpListener, creator: MemeCreator) -> Result<()> {
    let state = Arc::new(ServerState { creator });
    let app = Router::new()
        .route("/health", get(health))
        .route("/templates", get(templates))
        .route("/meme", post(meme))
        .route("/corpus", get(corpus))
        .route("/corpus/clear", post(clear_corpus))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware));
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

const CORS_HEADERS: [(&str, &str); 4] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET,POST,OPTIONS"),
    ("access-control-allow-headers", "content-type"),
    ("access-control-max-age", "600"),
];

// Browser front-ends post captions and uploads from any origin.
async fn cors_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let mut response = if req.method() == Method::OPTIONS {
        let mut preflight = Response::new(Body::empty());
        *preflight.status_mut() = StatusCode::NO_CONTENT;
        preflight
    } else {
        next.run(req).await
    };
    allow_any_origin(response.headers_mut());
    response
}

fn allow_any_origin(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

async fn templates(State(state): State<Arc<ServerState>>) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: state.creator.gallery().list(),
    })
}

async fn meme(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<MemeRequest>,
) -> Result<Json<MemeResponse>, ServerError> {
    let image = select_image(&state.creator, &payload)?;
    let font_size = payload
        .font_size
        .unwrap_or(state.creator.settings().font_size_default);
    let caption = payload.caption;

    let outcome = on_blocking_pool(state, move |creator, handle| {
        let mut session = Session::with_image(image);
        handle.block_on(creator.generate(&mut session, &caption, font_size))
    })
    .await??;
    Ok(Json(MemeResponse {
        language: outcome.language,
        mime: PNG_MIME.to_string(),
        image_base64: outcome.meme.map(|meme| BASE64.encode(&meme.png)),
        saved: outcome.saved,
        warnings: outcome.warnings,
        render_error: outcome.render_error,
        storage_error: outcome.storage_error,
    }))
}

fn select_image(creator: &MemeCreator, payload: &MemeRequest) -> Result<SelectedImage, ServerError> {
    match (payload.image_base64.as_deref(), payload.template.as_deref()) {
        (Some(_), Some(_)) => Err(ServerError::bad_request(
            "image_base64 and template cannot be provided together",
        )),
        (Some(encoded), None) => {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|err| ServerError::bad_request(format!("invalid image_base64: {}", err)))?;
            let name = payload.image_name.clone().unwrap_or_else(|| "upload".to_string());
            SelectedImage::from_bytes(name, bytes)
                .map_err(|err| ServerError::bad_request(err.to_string()))
        }
        (None, Some(template)) => SelectedImage::from_template(creator.gallery(), template)
            .map_err(|err| ServerError::bad_request(err.to_string())),
        (None, None) => Err(ServerError::bad_request(InputError::MissingImage.to_string())),
    }
}

// CSV storage does blocking file IO under a mutex, so corpus work stays off
// the async workers.
async fn on_blocking_pool<T, F>(state: Arc<ServerState>, work: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&MemeCreator, &tokio::runtime::Handle) -> T + Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || work(&state.creator, &handle))
        .await
        .map_err(|err| ServerError::internal(format!("server task failed: {}", err)))
}

async fn corpus(State(state): State<Arc<ServerState>>) -> Result<Json<CorpusResponse>, ServerError> {
    let records =
        on_blocking_pool(state, |creator, handle| handle.block_on(creator.corpus())).await??;
    Ok(Json(CorpusResponse { records }))
}

async fn clear_corpus(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ClearRequest>,
) -> (StatusCode, Json<ClearResponse>) {
    let password = payload.password;
    let result = on_blocking_pool(state, move |creator, handle| {
        handle.block_on(creator.clear_corpus(&password))
    })
    .await;
    let (status, cleared, message) = match result {
        Ok(Ok(ClearOutcome::Cleared)) => (StatusCode::OK, true, "Database cleared successfully!".to_string()),
        Ok(Ok(ClearOutcome::Rejected)) => (
            StatusCode::FORBIDDEN,
            false,
            "Incorrect password. Database not cleared.".to_string(),
        ),
        Ok(Ok(ClearOutcome::Disabled)) => (
            StatusCode::CONFLICT,
            false,
            "No admin password configured; clearing is disabled.".to_string(),
        ),
        Ok(Err(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("Error clearing database: {:#}", err),
        ),
        Err(err) => (err.status, false, err.message),
    };
    (status, Json(ClearResponse { cleared, message }))
}
