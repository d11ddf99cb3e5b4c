use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{analyze, stage_upload, AnalysisRequest};
use crate::charts::ChartStore;
use crate::config::{AppConfig, CHARTS_WEB_PREFIX, MANUAL_FILE_NAME};
use crate::dataset::DatasetFormat;
use crate::error::{AnalysisError, ExportError, StoreError};
use crate::export::{export_latest, ExportFormat};
use crate::models::AnalysisResult;
use crate::session::{SessionStore, SESSION_COOKIE};
use crate::views;

const FORM_PATH: &str = "/testscore/";

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
    pub charts: ChartStore,
}

impl AppState {
    pub fn new(config: AppConfig, sessions: SessionStore) -> Self {
        let charts = ChartStore::new(config.charts_dir(), CHARTS_WEB_PREFIX);
        Self {
            config: Arc::new(config),
            sessions,
            charts,
        }
    }
}

/// Failures that are not the uploader's fault. Everything else becomes a flash message.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong on our side. Please try again.",
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();
    let charts_root = state.config.charts_root();

    Router::new()
        .route("/", get(|| async { Redirect::to(FORM_PATH) }))
        .route("/testscore", get(|| async { Redirect::to(FORM_PATH) }))
        .route("/testscore/", get(upload_form).post(upload))
        .route("/testscore/export/:format", post(export))
        .route("/testscore/help", get(help))
        .route("/testscore/about", get(about))
        .route("/testscore/manual", get(manual))
        .nest_service("/static/charts", ServeDir::new(charts_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(state.config.uploads_dir())
        .await
        .context("failed to create the uploads directory")?;
    tokio::fs::create_dir_all(state.config.charts_dir())
        .await
        .context("failed to create the charts directory")?;

    let bind = state.config.bind;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, data_dir = %state.config.data_dir.display(), "listening");
    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}

/// Reads the session id from the cookie, issuing a fresh one when absent or malformed.
fn session(jar: CookieJar) -> (CookieJar, Uuid) {
    if let Some(id) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
    {
        return (jar, id);
    }
    let id = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

async fn back_to_form(
    state: &AppState,
    jar: CookieJar,
    session: Uuid,
    message: &str,
) -> Result<Response, WebError> {
    state.sessions.push_flash(session, message).await?;
    Ok((jar, Redirect::to(FORM_PATH)).into_response())
}

async fn upload_form(State(state): State<AppState>, jar: CookieJar) -> Result<Response, WebError> {
    let (jar, session) = session(jar);
    let flash = state.sessions.take_flash(session).await?;
    Ok((jar, Html(views::upload_form(flash.as_deref()))).into_response())
}

async fn help() -> Html<String> {
    Html(views::help())
}

async fn about() -> Html<String> {
    Html(views::about())
}

#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Vec<u8>,
    disaggregate: bool,
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "on" | "true" | "1"
    )
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm, String> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| format!("The upload could not be read: {}", err.body_text()))?
    {
        match field.name() {
            Some("dataset") => {
                form.file_name = field.file_name().map(str::to_owned);
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|err| format!("The upload could not be read: {}", err.body_text()))?
                    .to_vec();
            }
            Some("disaggregate") => {
                let value = field.text().await.unwrap_or_default();
                form.disaggregate = is_truthy(&value);
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn upload(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    let (jar, session) = session(jar);

    let form = match read_form(&mut multipart).await {
        Ok(form) => form,
        Err(message) => return back_to_form(&state, jar, session, &message).await,
    };
    let Some(file_name) = form.file_name.filter(|name| !name.trim().is_empty()) else {
        return back_to_form(&state, jar, session, "Please choose a file to upload.").await;
    };
    if let Err(err) = DatasetFormat::from_file_name(&file_name) {
        info!(%session, file = %file_name, "upload rejected: unsupported format");
        return back_to_form(&state, jar, session, &err.to_string()).await;
    }

    let uploads_dir = state.config.uploads_dir();
    let limits = state.config.limits();
    let charts = state.charts.clone();
    let disaggregate = form.disaggregate;
    let bytes = form.bytes;
    let source_name = file_name.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<AnalysisResult, AnalysisError> {
        // A rejected upload is dropped here, which deletes its temporary file.
        let staged = stage_upload(&uploads_dir, &source_name, &bytes)?;
        let request = AnalysisRequest {
            source_name: &source_name,
            bytes: &bytes,
            disaggregate,
        };
        let result = analyze(&request, limits, &charts)?;
        let kept = staged.keep()?;
        debug!(path = %kept.display(), "upload kept");
        Ok(result)
    })
    .await?;

    match outcome {
        Ok(result) => {
            info!(
                %session,
                analysis = %result.id,
                file = %file_name,
                valid = result.overall.count,
                charts = result.charts.len(),
                "analysis stored for session"
            );
            let page = views::report(&result);
            state.sessions.save_result(session, result).await?;
            Ok((jar, Html(page)).into_response())
        }
        Err(err) if err.is_user_correctable() => {
            warn!(%session, file = %file_name, error = %err, "analysis rejected");
            back_to_form(&state, jar, session, &err.to_string()).await
        }
        Err(err) => {
            error!(%session, file = %file_name, error = %err, "analysis failed");
            back_to_form(
                &state,
                jar,
                session,
                "The uploaded file could not be saved. Please try again.",
            )
            .await
        }
    }
}

async fn export(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(slug): Path<String>,
) -> Result<Response, WebError> {
    let Some(format) = ExportFormat::from_slug(&slug) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let (jar, session) = session(jar);

    let result = state.sessions.load_result(session).await?;
    let charts = state.charts.clone();
    let outcome =
        tokio::task::spawn_blocking(move || export_latest(result.as_ref(), format, &charts))
            .await?;

    match outcome {
        Ok(document) => Ok((
            jar,
            [
                (header::CONTENT_TYPE, document.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", document.file_name),
                ),
            ],
            document.bytes,
        )
            .into_response()),
        Err(err @ ExportError::NoAnalysisAvailable) => {
            info!(%session, format = format.label(), "export requested before any analysis");
            back_to_form(&state, jar, session, &err.to_string()).await
        }
        Err(err) => {
            warn!(%session, format = format.label(), error = %err, "export failed");
            back_to_form(&state, jar, session, &err.to_string()).await
        }
    }
}

async fn manual(State(state): State<AppState>, jar: CookieJar) -> Result<Response, WebError> {
    let path = state.config.manual_path();
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{MANUAL_FILE_NAME}\""),
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "user manual unavailable");
            let (jar, session) = session(jar);
            back_to_form(
                &state,
                jar,
                session,
                "The user manual is not available at the moment.",
            )
            .await
        }
    }
}
