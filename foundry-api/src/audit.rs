/// Audit trail helpers for handlers
///
/// Writing an audit entry never fails the request: errors are logged and
/// swallowed.

use foundry_shared::models::audit_log::{AuditAction, AuditLog, NewAuditLog};
use sqlx::PgPool;

use crate::extract::RequestMeta;

/// New entry stamped with the client's IP address and user agent
pub fn entry(action: AuditAction, meta: &RequestMeta) -> NewAuditLog {
    NewAuditLog::new(action).client(meta.ip_address.clone(), meta.user_agent.clone())
}

pub async fn record(db: &PgPool, entry: NewAuditLog) {
    let action = entry.action;
    let user_id = entry.user_id;

    if let Err(e) = AuditLog::record(db, entry).await {
        tracing::warn!(
            action = %action,
            user_id = ?user_id,
            error = %e,
            "Failed to write audit log entry"
        );
    }
}
