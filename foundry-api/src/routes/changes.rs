/// Dev-mode change requests
///
/// Mounted only when `dev_mode.enabled` is set. Any signed-in user can file
/// and browse change requests; moving them through the workflow and
/// deleting them is for admins.
///
/// # Endpoints
///
/// - `POST /v1/dev/changes` - File a change request
/// - `GET /v1/dev/changes?status&category&priority&componentId&createdBy&limit&offset`
/// - `GET /v1/dev/changes/:id`
/// - `PATCH /v1/dev/changes/:id/status` - Admin only
/// - `DELETE /v1/dev/changes/:id` - Admin only
///
/// # Request
///
/// ```json
/// {
///   "componentId": "checkout-button",
///   "feedback": "Label is cut off on mobile",
///   "category": "design",
///   "priority": "high",
///   "componentContext": {
///     "componentName": "CheckoutButton",
///     "domPath": "main#app > div.cart > button",
///     "boundingRect": { "x": 16, "y": 540, "width": 120, "height": 40 }
///   },
///   "pageContext": { "url": "http://localhost:3000/cart", "viewport": { "width": 390, "height": 844 } }
/// }
/// ```

use crate::{
    app::AppState,
    audit,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery, RequestMeta},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use foundry_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::{
        audit_log::AuditAction,
        change::{Change, ChangeFilter, ChangeStatus, CreateChange},
        clamp_page, Page,
    },
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: ChangeStatus,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Change not found".to_string())
}

pub async fn create_change(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ApiJson(data): ApiJson<CreateChange>,
) -> ApiResult<(StatusCode, Json<Change>)> {
    let change = Change::create(&state.db, data, Some(auth.user_id)).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::ChangeCreate, &meta)
            .user(auth.user_id)
            .details(json!({
                "changeId": change.id,
                "componentId": change.component_id,
            })),
    )
    .await;

    tracing::info!(change_id = %change.id, component_id = %change.component_id, "Change request filed");

    Ok((StatusCode::CREATED, Json(change)))
}

pub async fn list_changes(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ChangeFilter>,
) -> ApiResult<Json<Page<Change>>> {
    let (limit, offset) = clamp_page(filter.limit, filter.offset);

    let items = Change::list(&state.db, &filter).await?;
    let total = Change::count(&state.db, &filter).await?;

    Ok(Json(Page::new(items, total, limit, offset)))
}

pub async fn get_change(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Change>> {
    let change = Change::find_by_id(&state.db, id).await?.ok_or_else(not_found)?;
    Ok(Json(change))
}

/// Move a change through the workflow
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `404 Not Found`: No such change
/// - `409 Conflict`: Transition not allowed from the current status
pub async fn update_status(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Json<Change>> {
    require_admin(&state.db, &auth).await?;

    let (change, previous) = Change::update_status(&state.db, id, req.status).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::ChangeStatusUpdate, &meta)
            .user(auth.user_id)
            .details(json!({
                "changeId": change.id,
                "from": previous,
                "to": change.status,
            })),
    )
    .await;

    Ok(Json(change))
}

pub async fn delete_change(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    require_admin(&state.db, &auth).await?;

    if !Change::delete(&state.db, id).await? {
        return Err(not_found());
    }

    audit::record(
        &state.db,
        audit::entry(AuditAction::ChangeDelete, &meta)
            .user(auth.user_id)
            .details(json!({ "changeId": id })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_shared::models::change::ChangeCategory;

    #[test]
    fn test_filter_from_query_string() {
        let filter: ChangeFilter =
            serde_json::from_value(json!({ "status": "in_progress", "category": "bug", "componentId": "nav" }))
                .unwrap();
        assert_eq!(filter.status, Some(ChangeStatus::InProgress));
        assert_eq!(filter.category, Some(ChangeCategory::Bug));
        assert_eq!(filter.component_id.as_deref(), Some("nav"));
    }

    #[test]
    fn test_status_request() {
        let req: UpdateStatusRequest = serde_json::from_value(json!({ "status": "completed" })).unwrap();
        assert_eq!(req.status, ChangeStatus::Completed);
    }
}
