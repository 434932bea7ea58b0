use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use axum_helpers::{AppError, ErrorResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::ExpiryError;
use crate::models::{DeliveryOutcome, ExpiringService, Notification, ScanSummary, ServiceType};
use crate::orchestrator::ScanOrchestrator;

const TAG: &str = "expiry";

/// OpenAPI documentation for the expiry API
#[derive(OpenApi)]
#[openapi(
    paths(
        check_expiry,
        send_reminder,
        expiring_services,
        list_client_notifications,
        get_notification,
        mark_notification_read,
    ),
    components(schemas(
        CheckExpiryResponse,
        SendReminderRequest,
        SendReminderResponse,
        ExpiringServicesResponse,
        MarkReadResponse,
        ScanSummary,
        ExpiringService,
        Notification,
        ServiceType,
        ErrorResponse,
    )),
    tags(
        (name = TAG, description = "Expiry monitoring and reminder dispatch")
    )
)]
pub struct ApiDoc;

pub fn router(orchestrator: Arc<ScanOrchestrator>) -> Router {
    Router::new()
        .route("/check-expiry", post(check_expiry))
        .route("/send", post(send_reminder))
        .route("/expiring-services", get(expiring_services))
        .route("/clients/{id}/notifications", get(list_client_notifications))
        .route("/notifications/{id}", get(get_notification))
        .route("/notifications/{id}/read", post(mark_notification_read))
        .with_state(orchestrator)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckExpiryResponse {
    pub success: bool,
    pub new_notifications: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub message: String,
    pub summary: ScanSummary,
}

impl From<ScanSummary> for CheckExpiryResponse {
    fn from(summary: ScanSummary) -> Self {
        let mut message = format!(
            "Created {} notification(s); {} email(s) sent, {} failed",
            summary.created, summary.emails_sent, summary.emails_failed
        );
        if summary.redelivered + summary.redelivery_failed > 0 {
            message.push_str(&format!(
                "; redelivered {}, {} still failing",
                summary.redelivered, summary.redelivery_failed
            ));
        }

        Self {
            success: true,
            new_notifications: summary.created,
            emails_sent: summary.emails_sent,
            emails_failed: summary.emails_failed,
            message,
            summary,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendReminderRequest {
    pub client_id: String,
    pub service_type: ServiceType,
    pub days_until_expiry: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendReminderResponse {
    pub success: bool,
    pub message: String,
    /// Transport calls made
    pub attempts: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ExpiringServicesQuery {
    /// Defaults to 30
    pub within_days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExpiringServicesResponse {
    pub count: usize,
    pub services: Vec<ExpiringService>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkReadResponse {
    pub success: bool,
}

/// Run one expiry scan now
#[utoipa::path(
    post,
    path = "/check-expiry",
    tag = TAG,
    responses(
        (status = 200, description = "Scan finished", body = CheckExpiryResponse),
        (status = 500, description = "Client registry or notification store unavailable", body = ErrorResponse)
    )
)]
async fn check_expiry(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
) -> Result<Json<CheckExpiryResponse>, AppError> {
    let summary = orchestrator.run_triggered("http", Utc::now()).await?;
    Ok(Json(summary.into()))
}

/// Send a reminder to one client without recording a notification
#[utoipa::path(
    post,
    path = "/send",
    tag = TAG,
    request_body = SendReminderRequest,
    responses(
        (status = 200, description = "Reminder delivered", body = SendReminderResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Client not found", body = ErrorResponse),
        (status = 502, description = "Mail transport failed", body = ErrorResponse)
    )
)]
async fn send_reminder(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
    payload: Result<Json<SendReminderRequest>, JsonRejection>,
) -> Result<Json<SendReminderResponse>, AppError> {
    let Json(input) = payload?;
    let outcome = orchestrator
        .send_ad_hoc(&input.client_id, input.service_type, input.days_until_expiry)
        .await?;

    match outcome {
        DeliveryOutcome::Delivered { attempts, .. } => Ok(Json(SendReminderResponse {
            success: true,
            message: format!("Reminder sent to client {}", input.client_id),
            attempts: attempts.len(),
        })),
        DeliveryOutcome::Failed { error, .. } => Err(ExpiryError::Delivery(error).into()),
    }
}

/// Services expiring within a window, already expired ones included
#[utoipa::path(
    get,
    path = "/expiring-services",
    tag = TAG,
    params(ExpiringServicesQuery),
    responses(
        (status = 200, description = "Expiring services", body = ExpiringServicesResponse),
        (status = 500, description = "Client registry unavailable", body = ErrorResponse)
    )
)]
async fn expiring_services(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
    Query(query): Query<ExpiringServicesQuery>,
) -> Result<Json<ExpiringServicesResponse>, AppError> {
    let within_days = query.within_days.unwrap_or(30);
    if within_days < 0 {
        return Err(AppError::BadRequest(
            "withinDays must not be negative".to_string(),
        ));
    }

    let services = orchestrator
        .expiring_services(within_days, Utc::now())
        .await?;
    Ok(Json(ExpiringServicesResponse {
        count: services.len(),
        services,
    }))
}

/// Notifications for a client, newest first
#[utoipa::path(
    get,
    path = "/clients/{id}/notifications",
    tag = TAG,
    params(
        ("id" = String, Path, description = "Client ID"),
        NotificationsQuery
    ),
    responses(
        (status = 200, description = "Notifications", body = Vec<Notification>),
        (status = 500, description = "Notification store unavailable", body = ErrorResponse)
    )
)]
async fn list_client_notifications(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
    Path(client_id): Path<String>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = orchestrator
        .list_for_client(&client_id, query.unread_only)
        .await?;
    Ok(Json(notifications))
}

/// Get a notification by ID
#[utoipa::path(
    get,
    path = "/notifications/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification found", body = Notification),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
async fn get_notification(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(orchestrator.get_notification(id).await?))
}

/// Mark a notification as read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Marked as read", body = MarkReadResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
async fn mark_notification_read(
    State(orchestrator): State<Arc<ScanOrchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    orchestrator.mark_read(id).await?;
    Ok(Json(MarkReadResponse { success: true }))
}
