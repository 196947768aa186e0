//! HTTP routes for users, citizen levels, and custodial wallets
//!
//! - POST /users             - Register a participant or organization account
//! - GET  /users/:id         - Fetch one user (points, derived level, wallet address)
//! - GET  /users/:id/level   - Citizen level detail with progress to the next tier
//! - POST /users/:id/wallet  - Create and attach a custodial ledger wallet
//!
//! Wallet secrets never leave the engine: responses carry the address only.

use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::UserDoc;
use crate::routes::{
    cors_preflight, error_response, json_response, parse_json_body, BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::services::{level_for_points, LEVELS};
use crate::types::EngineError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: String,
    #[serde(default)]
    pub is_org: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub display_name: String,
    pub points: i64,
    pub is_org: bool,
    pub level: LevelInfo,
    /// Wallet address when a custodial wallet is attached; the signing
    /// secret is never serialized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl From<&UserDoc> for UserResponse {
    fn from(doc: &UserDoc) -> Self {
        Self {
            user_id: doc.user_id.clone(),
            display_name: doc.display_name.clone(),
            points: doc.points,
            is_org: doc.is_org,
            level: LevelInfo::for_points(doc.points),
            wallet_address: doc.wallet.as_ref().map(|w| w.address.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub name: &'static str,
    pub icon: &'static str,
    pub min_points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<i64>,
}

impl LevelInfo {
    fn for_points(points: i64) -> Self {
        let level = level_for_points(points);
        Self {
            name: level.name,
            icon: level.icon,
            min_points: level.min_points,
            max_points: level.max_points,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelResponse {
    pub user_id: String,
    pub points: i64,
    pub level: LevelInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level: Option<LevelInfo>,
    /// Points still needed to reach the next tier; absent at the top tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_to_next: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: String,
    pub address: String,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /users
async fn handle_create_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: CreateUserRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    if body.display_name.trim().is_empty() {
        return error_response(EngineError::Validation("displayName is required".into()));
    }

    match state
        .store
        .insert_user(UserDoc::new(body.display_name, body.is_org))
        .await
    {
        Ok(user) => {
            info!(user_id = %user.user_id, is_org = user.is_org, "user registered");
            json_response(StatusCode::CREATED, &UserResponse::from(&user))
        }
        Err(e) => error_response(e),
    }
}

/// GET /users/:id
async fn handle_get_user(user_id: &str, state: Arc<AppState>) -> Response<BoxBody> {
    match state.store.get_user(user_id).await {
        Ok(Some(user)) => json_response(StatusCode::OK, &UserResponse::from(&user)),
        Ok(None) => error_response(EngineError::NotFound(format!("User not found: {}", user_id))),
        Err(e) => error_response(e),
    }
}

/// GET /users/:id/level
async fn handle_get_level(user_id: &str, state: Arc<AppState>) -> Response<BoxBody> {
    let user = match state.store.get_user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error_response(EngineError::NotFound(format!("User not found: {}", user_id)))
        }
        Err(e) => return error_response(e),
    };

    let level = level_for_points(user.points);
    let next = LEVELS
        .iter()
        .find(|l| l.min_points > level.min_points)
        .copied();

    json_response(
        StatusCode::OK,
        &LevelResponse {
            user_id: user.user_id,
            points: user.points,
            level: LevelInfo::for_points(user.points),
            next_level: next.map(|l| LevelInfo {
                name: l.name,
                icon: l.icon,
                min_points: l.min_points,
                max_points: l.max_points,
            }),
            points_to_next: next.map(|l| l.min_points - user.points),
        },
    )
}

/// POST /users/:id/wallet
///
/// Creates a ledger account and stores it as the user's custodial wallet.
/// Idempotent-hostile on purpose: a user with a wallet keeps it.
async fn handle_create_wallet(user_id: &str, state: Arc<AppState>) -> Response<BoxBody> {
    let user = match state.store.get_user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error_response(EngineError::NotFound(format!("User not found: {}", user_id)))
        }
        Err(e) => return error_response(e),
    };

    if let Some(wallet) = user.wallet {
        return error_response(EngineError::Conflict(format!(
            "User already has a wallet: {}",
            wallet.address
        )));
    }

    let account = match state.ledger.create_account().await {
        Ok(account) => account,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state
        .store
        .set_wallet(user_id, &account.address, account.secret.expose())
        .await
    {
        return error_response(e);
    }

    info!(user_id, address = %account.address, "custodial wallet created");

    json_response(
        StatusCode::CREATED,
        &WalletResponse {
            user_id: user_id.to_string(),
            address: account.address,
        },
    )
}

// =============================================================================
// Main Router
// =============================================================================

/// Handle user-related HTTP requests.
///
/// Returns Some(response) if the request was handled, None if not a
/// user route.
pub async fn handle_user_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method().clone();

    if !path.starts_with("/users") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.split('?').next().unwrap_or(path).to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::POST, ["users"]) => handle_create_user(req, state).await,
        (&Method::GET, ["users", id]) => handle_get_user(id, state).await,
        (&Method::GET, ["users", id, "level"]) => handle_get_level(id, state).await,
        (&Method::POST, ["users", id, "wallet"]) => handle_create_wallet(id, state).await,

        (_, ["users"]) | (_, ["users", _]) | (_, ["users", _, "level"]) | (_, ["users", _, "wallet"]) => {
            json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse {
                    error: "Method not allowed".into(),
                    code: None,
                },
            )
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "User endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
