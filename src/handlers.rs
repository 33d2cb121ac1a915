//! HTTP handlers for the event routes.
//!
//! Each handler reads the [`Actor`] and [`RequestBody`] attached by the
//! request pipeline, runs one [`EventService`](crate::service::EventService)
//! operation and answers with an [`Envelope`].

use crate::actor::Actor;
use crate::envelope::Envelope;
use crate::error::EventsError;
use crate::log_security_event;
use crate::metrics::{METRICS, RequestMetrics};
use crate::model::{document_to_json, now_millis};
use crate::pipeline::RequestBody;
use crate::service::EventOperation;
use crate::state::AppState;
use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use mongodb::bson::Document;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

pub const LIST_VISIBLE_PATH: &str = "/events/user/list";
pub const LIST_ALL_PATH: &str = "/events/admin/list";
pub const DELETE_PATH: &str = "/events/admin/delete";
pub const VISIBLE_PATH: &str = "/events/admin/visible";
pub const CREATE_PATH: &str = "/events/admin/create";
pub const UPDATE_PATH: &str = "/events/admin/update";
pub const FETCH_PATH: &str = "/events/admin/fetch";

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub time: i64,
    pub version: &'static str,
}

pub async fn root_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        time: now_millis(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_visible(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Envelope {
    run(EventOperation::ListVisible, &actor, async {
        state.service().list_visible().await.map(render_list)
    })
    .await
}

pub async fn list_all(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Envelope {
    run(EventOperation::ListAll, &actor, async {
        state.service().list_all().await.map(render_list)
    })
    .await
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Extension(body): Extension<RequestBody>,
) -> Envelope {
    run(EventOperation::Delete, &actor, async {
        let deleted = state.service().delete(&actor, body.event_id()).await?;
        Ok::<_, EventsError>(Value::Bool(deleted))
    })
    .await
}

pub async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Extension(body): Extension<RequestBody>,
) -> Envelope {
    run(EventOperation::SetVisibility, &actor, async {
        let outcome = state
            .service()
            .set_visibility(&actor, body.event_id(), body.visible())
            .await?;
        Ok::<_, EventsError>(serde_json::to_value(outcome)?)
    })
    .await
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Extension(body): Extension<RequestBody>,
) -> Envelope {
    run(EventOperation::Create, &actor, async {
        let created = state.service().create(&actor, body.event()).await?;
        Ok::<_, EventsError>(Value::Bool(created))
    })
    .await
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Extension(body): Extension<RequestBody>,
) -> Envelope {
    run(EventOperation::Update, &actor, async {
        let updated = state
            .service()
            .update(&actor, body.event_id(), body.event())
            .await?;
        Ok::<_, EventsError>(Value::Bool(updated))
    })
    .await
}

pub async fn fetch_event(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Extension(body): Extension<RequestBody>,
) -> Envelope {
    run(EventOperation::Fetch, &actor, async {
        let event = state.service().fetch(body.event_id()).await?;
        Ok::<_, EventsError>(event.map(document_to_json).unwrap_or(Value::Null))
    })
    .await
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn render_list(events: Vec<Document>) -> Value {
    Value::Array(events.into_iter().map(document_to_json).collect())
}

/// Run one operation inside its span, record metrics and report failures.
async fn run<F>(operation: EventOperation, actor: &Actor, work: F) -> Envelope
where
    F: Future<Output = Result<Value, EventsError>>,
{
    let span = crate::logging::event_span(operation.name(), actor.as_str());
    async move {
        let timer = RequestMetrics::new(operation.name());
        let outcome = work.await;
        timer.finish(outcome.is_ok());

        if let Err(error) = &outcome {
            report(operation, actor, error);
        }
        Envelope::from(outcome)
    }
    .instrument(span)
    .await
}

fn report(operation: EventOperation, actor: &Actor, error: &EventsError) {
    error.track(operation.name());
    match error {
        EventsError::NotAuthorized => {
            METRICS.record_authorization_failure(operation.name());
            log_security_event!(
                "unauthorized_mutation",
                operation = operation.name(),
                actor = %actor,
                "rejected request from unknown actor"
            );
        }
        EventsError::InvalidPayload(_) => {
            tracing::warn!(
                operation = operation.name(),
                error = %error.chain_message(),
                "rejected malformed request"
            );
        }
        _ => {
            tracing::error!(
                operation = operation.name(),
                code = %error.code(),
                error = %error.chain_message(),
                "event operation failed"
            );
        }
    }
}
