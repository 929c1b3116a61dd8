use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};

use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::*;

use crate::config::Config;
use crate::export::{export_filename, to_yaml};
use crate::form::IngressFormInput;
use crate::gateway::IngressGateway;
use crate::status::IngressRow;

const LIST_FAILED: &str = "Failed to fetch Tailscale Ingress resources";
const CREATE_FAILED: &str = "Failed to create Tailscale Ingress resource";
const UPDATE_FAILED: &str = "Failed to update Tailscale Ingress resource";
const DELETE_FAILED: &str = "Failed to delete Tailscale Ingress resource";
const EXPORT_FAILED: &str = "Failed to export Tailscale Ingress resources";
const FORM_FAILED: &str = "Failed to load Tailscale Ingress resource";
const PAGE_FAILED: &str = "Failed to load ingress resources";
const MISSING_KEY: &str = "Name and namespace parameters are required";

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<dyn IngressGateway>,
    in_flight: InFlight,
    refresh_secs: u64,
}

impl AppState {
    pub fn new(gateway: Arc<dyn IngressGateway>, refresh_secs: u64) -> Self {
        Self {
            gateway,
            in_flight: InFlight::default(),
            refresh_secs,
        }
    }
}

/// Keys of writes currently waiting on the API server. A second write to
/// the same ingress is refused until the first one returns.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    fn acquire(&self, key: String) -> Option<InFlightGuard> {
        let mut keys = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        keys.insert(key.clone()).then(|| InFlightGuard {
            keys: self.0.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct DashboardTemplate<'a> {
    rows: &'a [IngressRow],
    error: Option<&'a str>,
    refresh_secs: u64,
}

/// `?name=&namespace=` identifying one ingress.
#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    name: Option<String>,
    namespace: Option<String>,
}

impl ObjectQuery {
    fn key(self) -> Option<(String, String)> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let namespace = self.namespace.filter(|ns| !ns.is_empty())?;
        Some((name, namespace))
    }
}

fn error_chain(err: &dyn Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(src) = source {
        let _ = write!(msg, ": {src}");
        source = src.source();
    }
    msg
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn busy_response(key: &str) -> Response {
    error_response(
        StatusCode::CONFLICT,
        &format!("A request for {key} is already in progress"),
    )
}

async fn dashboard(State(state): State<AppState>) -> Response {
    let (rows, error): (Vec<IngressRow>, _) = match state.gateway.list().await {
        Ok(list) => (list.items.iter().map(IngressRow::from).collect(), None),
        Err(e) => {
            error!("Error rendering dashboard: {}", error_chain(&e));
            (Vec::new(), Some(PAGE_FAILED))
        }
    };

    let page = DashboardTemplate {
        rows: &rows,
        error,
        refresh_secs: state.refresh_secs,
    };

    match page.render() {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            error!("Error rendering dashboard template: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_ingresses(State(state): State<AppState>) -> Response {
    match state.gateway.list().await {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            error!("Error in GET /ingress: {}", error_chain(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, LIST_FAILED)
        }
    }
}

async fn edit_form(State(state): State<AppState>, Query(query): Query<ObjectQuery>) -> Response {
    let Some((name, namespace)) = query.key() else {
        return error_response(StatusCode::BAD_REQUEST, MISSING_KEY);
    };

    let list = match state.gateway.list().await {
        Ok(list) => list,
        Err(e) => {
            error!("Error in GET /ingress/form: {}", error_chain(&e));
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, FORM_FAILED);
        }
    };

    let found = list.items.iter().find(|ingress| {
        ingress.metadata.name.as_deref() == Some(name.as_str())
            && ingress.metadata.namespace.as_deref() == Some(namespace.as_str())
    });

    match found {
        Some(ingress) => Json(IngressFormInput::from_resource(ingress)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("Ingress {namespace}/{name} not found"),
        ),
    }
}

/// Body that could not be decoded, answered in the same JSON shape as the
/// other failures.
fn unreadable_body(rejection: JsonRejection) -> Response {
    debug!("Rejected ingress body: {rejection}");
    error_response(rejection.status(), &rejection.body_text())
}

fn invalid_form(form: &IngressFormInput) -> Option<Response> {
    let errors = form.validate().err()?;
    debug!("Rejected ingress form {}/{}: {errors}", form.namespace, form.name);
    Some(
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid ingress form", "fields": errors })),
        )
            .into_response(),
    )
}

async fn create_ingress(
    State(state): State<AppState>,
    body: Result<Json<IngressFormInput>, JsonRejection>,
) -> Response {
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => return unreadable_body(rejection),
    };
    if let Some(rejection) = invalid_form(&form) {
        return rejection;
    }

    let key = format!("{}/{}", form.namespace, form.name);
    let Some(_guard) = state.in_flight.acquire(key.clone()) else {
        return busy_response(&key);
    };

    match state.gateway.create(form.to_create_resource()).await {
        Ok(ingress) => {
            info!("Created ingress {key}");
            Json(ingress).into_response()
        }
        Err(e) => {
            error!("Error in POST /ingress: {}", error_chain(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, CREATE_FAILED)
        }
    }
}

async fn update_ingress(
    State(state): State<AppState>,
    body: Result<Json<IngressFormInput>, JsonRejection>,
) -> Response {
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => return unreadable_body(rejection),
    };
    if let Some(rejection) = invalid_form(&form) {
        return rejection;
    }

    let key = format!("{}/{}", form.namespace, form.name);
    let Some(_guard) = state.in_flight.acquire(key.clone()) else {
        return busy_response(&key);
    };

    match state.gateway.update(form.to_update_resource()).await {
        Ok(ingress) => {
            info!("Updated ingress {key}");
            Json(ingress).into_response()
        }
        Err(e) => {
            error!("Error in PUT /ingress: {}", error_chain(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, UPDATE_FAILED)
        }
    }
}

async fn delete_ingress(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Response {
    let Some((name, namespace)) = query.key() else {
        return error_response(StatusCode::BAD_REQUEST, MISSING_KEY);
    };

    let key = format!("{namespace}/{name}");
    let Some(_guard) = state.in_flight.acquire(key.clone()) else {
        return busy_response(&key);
    };

    match state.gateway.delete(name, namespace).await {
        Ok(deleted) => {
            info!("Deleted ingress {key}");
            Json(deleted).into_response()
        }
        Err(e) => {
            error!("Error in DELETE /ingress: {}", error_chain(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, DELETE_FAILED)
        }
    }
}

async fn export_ingresses(State(state): State<AppState>) -> Response {
    let yaml = match state.gateway.list().await {
        Ok(list) => to_yaml(&list.items).map_err(|e| error_chain(&e)),
        Err(e) => Err(error_chain(&e)),
    };

    match yaml {
        Ok(yaml) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                export_filename(Utc::now().date_naive())
            );
            (
                [
                    (header::CONTENT_TYPE, "application/yaml".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                yaml,
            )
                .into_response()
        }
        Err(msg) => {
            error!("Error in GET /ingress/export: {msg}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, EXPORT_FAILED)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route(
            "/ingress",
            get(list_ingresses)
                .post(create_ingress)
                .put(update_ingress)
                .delete(delete_ingress),
        )
        .route("/ingress/form", get(edit_form))
        .route("/ingress/export", get(export_ingresses))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

pub async fn serve(config: &Config, gateway: Arc<dyn IngressGateway>) -> anyhow::Result<()> {
    let app = router(AppState::new(gateway, config.refresh_secs));

    info!("Starting dashboard on {}", config.listen);
    let listener = TcpListener::bind(config.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
