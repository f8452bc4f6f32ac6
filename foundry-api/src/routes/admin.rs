/// Admin endpoints
///
/// Mounted behind the admin gate, so every handler here runs for an
/// authenticated admin.
///
/// # Endpoints
///
/// - `GET /v1/admin/users?search&limit&offset` - Users with their roles
/// - `PUT /v1/admin/users/:id/role` - Change a user's role
/// - `GET /v1/admin/audit-logs` - Audit trail of every user

use crate::{
    app::AppState,
    audit,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery, RequestMeta},
};
use axum::{extract::State, Extension, Json};
use foundry_shared::{
    auth::middleware::AuthContext,
    models::{
        audit_log::{AuditAction, AuditLog, AuditLogFilter},
        clamp_page,
        preference::{Role, UserPreference},
        user::{User, UserWithRole},
        Page,
    },
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    /// Case-insensitive substring of email or name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: Role,
}

pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> ApiResult<Json<Page<UserWithRole>>> {
    let (limit, offset) = clamp_page(query.limit, query.offset);
    let search = query.search.as_deref();

    let items = User::list_with_roles(&state.db, search, limit, offset).await?;
    let total = User::count(&state.db, search).await?;

    Ok(Json(Page::new(items, total, limit, offset)))
}

/// Change a user's role
///
/// # Errors
///
/// - `400 Bad Request`: Admins cannot change their own role
/// - `404 Not Found`: No such user
pub async fn update_role(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> ApiResult<Json<UserWithRole>> {
    if user_id == auth.user_id {
        return Err(ApiError::BadRequest("You cannot change your own role".to_string()));
    }

    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let previous = UserPreference::get_role(&state.db, user_id).await?;
    let preference = UserPreference::set_role(&state.db, user_id, req.role).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::RoleUpdate, &meta)
            .user(auth.user_id)
            .details(json!({
                "targetUserId": user_id,
                "from": previous,
                "to": preference.role,
            })),
    )
    .await;

    tracing::info!(
        admin_id = %auth.user_id,
        user_id = %user_id,
        from = %previous,
        to = %preference.role,
        "Role updated"
    );

    Ok(Json(UserWithRole {
        user,
        role: preference.role,
    }))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<AuditLogFilter>,
) -> ApiResult<Json<Page<AuditLog>>> {
    let query = filter.normalize()?;

    let items = AuditLog::query(&state.db, &query).await?;
    let total = AuditLog::count(&state.db, &query).await?;

    Ok(Json(Page::new(items, total, query.limit, query.offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_role_request() {
        let req: UpdateRoleRequest = serde_json::from_value(json!({ "role": "admin" })).unwrap();
        assert_eq!(req.role, Role::Admin);

        assert!(serde_json::from_value::<UpdateRoleRequest>(json!({ "role": "owner" })).is_err());
    }
}
