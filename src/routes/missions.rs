//! HTTP routes for missions and applications
//!
//! - POST /missions                            - Publish a new mission
//! - GET  /missions/:id                        - Fetch one mission
//! - GET  /missions/:id/applications           - List applications for review
//! - POST /missions/:id/applications           - Submit an application
//! - PUT  /missions/:id/applications/:appId    - Accept or reject an application
//! - POST /missions/:id/complete               - Settle the mission

use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{ApplicationDoc, ApplicationStatus, MissionDoc};
use crate::routes::{
    cors_preflight, error_response, json_response, parse_json_body, BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::services::ParticipantResult;
use crate::types::EngineError;

/// Upper bound on mission duration (30 days in minutes)
const MAX_DURATION_MINUTES: i64 = 60 * 24 * 30;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMissionRequest {
    pub org_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub max_participants: i64,
    pub duration_minutes: i64,
    #[serde(default)]
    pub reward_xrp: f64,
    #[serde(default)]
    pub is_volunteer: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionResponse {
    pub mission_id: String,
    pub org_id: String,
    pub title: String,
    pub description: String,
    pub max_participants: i64,
    pub accepted_count: i64,
    pub reward_xrp: f64,
    pub duration_minutes: i64,
    pub points: i64,
    pub is_volunteer: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&MissionDoc> for MissionResponse {
    fn from(doc: &MissionDoc) -> Self {
        Self {
            mission_id: doc.mission_id.clone(),
            org_id: doc.org_id.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            max_participants: doc.max_participants,
            accepted_count: doc.accepted_count,
            reward_xrp: doc.reward_xrp,
            duration_minutes: doc.duration_minutes,
            points: doc.points,
            is_volunteer: doc.is_volunteer,
            status: doc.status.to_string(),
            completed_at: doc.completed_at.and_then(|d| d.try_to_rfc3339_string().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApplicationRequest {
    pub applicant_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewApplicationRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub application_id: String,
    pub mission_id: String,
    pub applicant_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&ApplicationDoc> for ApplicationResponse {
    fn from(doc: &ApplicationDoc) -> Self {
        Self {
            application_id: doc.application_id.clone(),
            mission_id: doc.mission_id.clone(),
            applicant_id: doc.applicant_id.clone(),
            status: doc.status.to_string(),
            message: doc.message.clone(),
            applied_at: doc.applied_at.and_then(|d| d.try_to_rfc3339_string().ok()),
            reviewed_at: doc.reviewed_at.and_then(|d| d.try_to_rfc3339_string().ok()),
            completed_at: doc.completed_at.and_then(|d| d.try_to_rfc3339_string().ok()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub application: ApplicationResponse,
    pub accepted_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationListResponse {
    pub mission_id: String,
    pub applications: Vec<ApplicationResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMissionRequest {
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMissionResponse {
    pub mission: MissionResponse,
    pub results: Vec<ParticipantResult>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /missions
async fn handle_create_mission(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: CreateMissionRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    if body.org_id.is_empty() {
        return error_response(EngineError::Validation("orgId is required".into()));
    }
    if body.title.trim().is_empty() {
        return error_response(EngineError::Validation("title is required".into()));
    }
    if body.max_participants < 1 {
        return error_response(EngineError::Validation(
            "maxParticipants must be at least 1".into(),
        ));
    }
    if !(1..=MAX_DURATION_MINUTES).contains(&body.duration_minutes) {
        return error_response(EngineError::Validation(format!(
            "durationMinutes must be between 1 and {}",
            MAX_DURATION_MINUTES
        )));
    }
    if !(0.0..=100.0).contains(&body.reward_xrp) {
        return error_response(EngineError::Validation(
            "rewardXrp must be between 0 and 100".into(),
        ));
    }

    // The posting account must exist and be an organization
    match state.store.get_user(&body.org_id).await {
        Ok(Some(user)) if user.is_org => {}
        Ok(Some(_)) => {
            return error_response(EngineError::Validation(
                "Only organization accounts can publish missions".into(),
            ))
        }
        Ok(None) => {
            return error_response(EngineError::NotFound(format!(
                "Organization not found: {}",
                body.org_id
            )))
        }
        Err(e) => return error_response(e),
    }

    let mission = MissionDoc::new(
        body.org_id,
        body.title,
        body.description,
        body.duration_minutes,
        body.max_participants,
        body.reward_xrp,
        body.is_volunteer,
    );

    match state.store.insert_mission(mission).await {
        Ok(mission) => {
            info!(mission_id = %mission.mission_id, org_id = %mission.org_id, "mission published");
            json_response(StatusCode::CREATED, &MissionResponse::from(&mission))
        }
        Err(e) => error_response(e),
    }
}

/// GET /missions/:id
async fn handle_get_mission(mission_id: &str, state: Arc<AppState>) -> Response<BoxBody> {
    match state.store.get_mission(mission_id).await {
        Ok(Some(mission)) => json_response(StatusCode::OK, &MissionResponse::from(&mission)),
        Ok(None) => error_response(EngineError::NotFound(format!(
            "Mission not found: {}",
            mission_id
        ))),
        Err(e) => error_response(e),
    }
}

/// GET /missions/:id/applications
async fn handle_list_applications(mission_id: &str, state: Arc<AppState>) -> Response<BoxBody> {
    match state.store.get_mission(mission_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(EngineError::NotFound(format!(
                "Mission not found: {}",
                mission_id
            )))
        }
        Err(e) => return error_response(e),
    }

    match state.store.list_applications(mission_id).await {
        Ok(applications) => json_response(
            StatusCode::OK,
            &ApplicationListResponse {
                mission_id: mission_id.to_string(),
                applications: applications.iter().map(ApplicationResponse::from).collect(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /missions/:id/applications
async fn handle_submit_application(
    req: Request<hyper::body::Incoming>,
    mission_id: &str,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: SubmitApplicationRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .applications
        .submit(mission_id, &body.applicant_id, body.message)
        .await
    {
        Ok(application) => {
            json_response(StatusCode::CREATED, &ApplicationResponse::from(&application))
        }
        Err(e) => error_response(e),
    }
}

/// PUT /missions/:id/applications/:appId
async fn handle_review_application(
    req: Request<hyper::body::Incoming>,
    mission_id: &str,
    application_id: &str,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: ReviewApplicationRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let target = match body.status.as_str() {
        "accepted" => ApplicationStatus::Accepted,
        "rejected" => ApplicationStatus::Rejected,
        other => {
            return error_response(EngineError::Validation(format!(
                "Review status must be 'accepted' or 'rejected', got '{}'",
                other
            )))
        }
    };

    match state
        .applications
        .review(mission_id, application_id, target)
        .await
    {
        Ok(outcome) => json_response(
            StatusCode::OK,
            &ReviewResponse {
                application: ApplicationResponse::from(&outcome.application),
                accepted_count: outcome.accepted_count,
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /missions/:id/complete
async fn handle_complete_mission(
    req: Request<hyper::body::Incoming>,
    mission_id: &str,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: CompleteMissionRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .settlement
        .complete_mission(mission_id, &body.participant_ids)
        .await
    {
        Ok(outcome) => json_response(
            StatusCode::OK,
            &CompleteMissionResponse {
                mission: MissionResponse::from(&outcome.mission),
                results: outcome.results,
            },
        ),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Main Router
// =============================================================================

/// Handle mission-related HTTP requests.
///
/// Returns Some(response) if the request was handled, None if not a
/// mission route.
pub async fn handle_mission_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method().clone();

    if !path.starts_with("/missions") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path).to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::POST, ["missions"]) => handle_create_mission(req, state).await,
        (&Method::GET, ["missions", id]) => handle_get_mission(id, state).await,
        (&Method::GET, ["missions", id, "applications"]) => {
            handle_list_applications(id, state).await
        }
        (&Method::POST, ["missions", id, "applications"]) => {
            let id = id.to_string();
            handle_submit_application(req, &id, state).await
        }
        (&Method::PUT, ["missions", id, "applications", app_id]) => {
            let (id, app_id) = (id.to_string(), app_id.to_string());
            handle_review_application(req, &id, &app_id, state).await
        }
        (&Method::POST, ["missions", id, "complete"]) => {
            let id = id.to_string();
            handle_complete_mission(req, &id, state).await
        }

        (_, ["missions"])
        | (_, ["missions", _])
        | (_, ["missions", _, "applications"])
        | (_, ["missions", _, "applications", _])
        | (_, ["missions", _, "complete"]) => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Mission endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
