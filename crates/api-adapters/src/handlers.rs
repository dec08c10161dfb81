//! # api-adapters Handlers
//!
//! This module coordinates the flow between HTTP requests and the comment service.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use domains::{Comment, CommentId, DomainError, NewComment};
use serde::Deserialize;
use serde_json::{json, Value};
use services::CommentService;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::metrics::ApiMetrics;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CommentService>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(service: Arc<CommentService>) -> Self {
        Self {
            service,
            metrics: Arc::new(ApiMetrics::new()),
        }
    }
}

/// Body of `POST /api/comments`. Missing text fields read as empty so the
/// service can report which one is required.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub post_slug: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub content: String,
}

impl From<CreateCommentRequest> for NewComment {
    fn from(req: CreateCommentRequest) -> Self {
        NewComment {
            post_slug: req.post_slug,
            parent_id: req.parent_id,
            author_name: req.author_name,
            author_email: req.author_email,
            content: req.content,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub post_slug: Option<String>,
}

/// `POST /api/comments`
pub async fn create_comment(
    State(state): State<AppState>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(%rejection, "unparseable comment body");
        ApiError::InvalidBody
    })?;

    match state.service.create(request.into()).await {
        Ok(comment) => {
            state.metrics.comments_created.inc();
            Ok((StatusCode::CREATED, Json(comment)))
        }
        Err(err) => {
            if matches!(err, DomainError::RateLimitExceeded(_)) {
                state.metrics.comments_rate_limited.inc();
            } else {
                warn!(error = %err, "comment rejected");
            }
            Err(err.into())
        }
    }
}

/// `GET /api/comments?post_slug=...` returns the post's reply forest.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<ListCommentsQuery>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let post_slug = query.post_slug.unwrap_or_default();
    let forest = state.service.list(&post_slug).await?;
    Ok(Json(forest))
}

/// `DELETE /api/comments/{id}`
pub async fn delete_comment(
    State(state): State<AppState>,
    id: Result<Path<CommentId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::InvalidId)?;
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let tracked = state.service.limiter().tracked_identities();
    state
        .metrics
        .tracked_identities
        .set(i64::try_from(tracked).unwrap_or(i64::MAX));

    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
