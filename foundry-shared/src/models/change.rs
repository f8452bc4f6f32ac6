/// Change requests from the dev-mode overlay
///
/// Each change targets one rendered component and carries the context it
/// was filed from: the component's name, DOM path, bounding rect and props,
/// and the page URL, title and viewport. Both contexts are stored as JSONB.
///
/// Status moves through a small workflow, see
/// [`ChangeStatus::can_transition_to`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE changes (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     component_id VARCHAR(200) NOT NULL,
///     feedback TEXT NOT NULL,
///     category change_category NOT NULL DEFAULT 'other',
///     priority change_priority NOT NULL DEFAULT 'medium',
///     status change_status NOT NULL DEFAULT 'pending',
///     component_context JSONB NOT NULL,
///     page_context JSONB NOT NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::clamp_page;
use crate::overlay::geometry::{Rect, Viewport};

pub const MAX_COMPONENT_ID_LENGTH: usize = 200;
pub const MAX_FEEDBACK_LENGTH: usize = 5000;
pub const MAX_DOM_PATH_LENGTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "change_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Bug,
    Design,
    Content,
    Feature,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "change_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "change_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::InProgress => "in_progress",
            ChangeStatus::Completed => "completed",
            ChangeStatus::Rejected => "rejected",
        }
    }

    /// Workflow rules
    ///
    /// - pending → in_progress, completed, rejected
    /// - in_progress → pending, completed, rejected
    /// - completed, rejected → pending (reopen)
    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;

        matches!(
            (self, next),
            (Pending, InProgress | Completed | Rejected)
                | (InProgress, Pending | Completed | Rejected)
                | (Completed | Rejected, Pending)
        )
    }
}

/// Error type for change requests
#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Cannot move change from {from:?} to {to:?}")]
    InvalidTransition { from: ChangeStatus, to: ChangeStatus },

    #[error("Change not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn invalid(field: &'static str, message: impl Into<String>) -> ChangeError {
    ChangeError::Validation {
        field,
        message: message.into(),
    }
}

/// Component the change is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentContext {
    pub component_name: String,

    /// Selector such as `main#app > div.card:nth-of-type(2)`
    pub dom_path: String,

    pub bounding_rect: Rect,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

/// Page the change was filed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub viewport: Option<Viewport>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl PageContext {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            viewport: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: Uuid,
    pub component_id: String,
    pub feedback: String,
    pub category: ChangeCategory,
    pub priority: ChangePriority,
    pub status: ChangeStatus,
    pub component_context: Json<ComponentContext>,
    pub page_context: Json<PageContext>,

    /// Submitting user; `None` once that user is deleted
    pub created_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChange {
    pub component_id: String,
    pub feedback: String,

    /// Defaults to `other`
    #[serde(default)]
    pub category: Option<ChangeCategory>,

    /// Defaults to `medium`
    #[serde(default)]
    pub priority: Option<ChangePriority>,

    pub component_context: ComponentContext,
    pub page_context: PageContext,
}

impl CreateChange {
    pub fn validate(&self) -> Result<(), ChangeError> {
        let component_id = self.component_id.trim();
        if component_id.is_empty() {
            return Err(invalid("componentId", "must not be empty"));
        }
        if component_id.chars().count() > MAX_COMPONENT_ID_LENGTH {
            return Err(invalid(
                "componentId",
                format!("must be at most {} characters", MAX_COMPONENT_ID_LENGTH),
            ));
        }

        let feedback = self.feedback.trim();
        if feedback.is_empty() {
            return Err(invalid("feedback", "must not be empty"));
        }
        if feedback.chars().count() > MAX_FEEDBACK_LENGTH {
            return Err(invalid(
                "feedback",
                format!("must be at most {} characters", MAX_FEEDBACK_LENGTH),
            ));
        }

        let context = &self.component_context;
        if context.dom_path.trim().is_empty() {
            return Err(invalid("componentContext.domPath", "must not be empty"));
        }
        if context.dom_path.len() > MAX_DOM_PATH_LENGTH {
            return Err(invalid(
                "componentContext.domPath",
                format!("must be at most {} bytes", MAX_DOM_PATH_LENGTH),
            ));
        }
        if !context.bounding_rect.is_valid() {
            return Err(invalid(
                "componentContext.boundingRect",
                "must be finite with non-negative width and height",
            ));
        }

        Url::parse(&self.page_context.url)
            .map_err(|e| invalid("pageContext.url", e.to_string()))?;

        if let Some(viewport) = &self.page_context.viewport {
            if !viewport.is_valid() {
                return Err(invalid("pageContext.viewport", "must be finite and non-negative"));
            }
        }

        Ok(())
    }
}

/// List filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFilter {
    pub status: Option<ChangeStatus>,
    pub category: Option<ChangeCategory>,
    pub priority: Option<ChangePriority>,
    pub component_id: Option<String>,
    pub created_by: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, filter: &ChangeFilter) {
    builder.push(" WHERE TRUE");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND priority = ").push_bind(priority);
    }
    if let Some(component_id) = &filter.component_id {
        builder.push(" AND component_id = ").push_bind(component_id.clone());
    }
    if let Some(created_by) = filter.created_by {
        builder.push(" AND created_by = ").push_bind(created_by);
    }
}

const CHANGE_COLUMNS: &str = "id, component_id, feedback, category, priority, status, \
     component_context, page_context, created_by, created_at, updated_at";

impl Change {
    /// Validates and stores a change request with status `pending`
    pub async fn create(pool: &PgPool, data: CreateChange, created_by: Option<Uuid>) -> Result<Self, ChangeError> {
        data.validate()?;

        let change = sqlx::query_as::<_, Change>(&format!(
            r#"
            INSERT INTO changes (component_id, feedback, category, priority,
                                 component_context, page_context, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            CHANGE_COLUMNS
        ))
        .bind(data.component_id.trim())
        .bind(data.feedback.trim())
        .bind(data.category.unwrap_or_default())
        .bind(data.priority.unwrap_or_default())
        .bind(Json(data.component_context))
        .bind(Json(data.page_context))
        .bind(created_by)
        .fetch_one(pool)
        .await?;

        Ok(change)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Change>(&format!("SELECT {} FROM changes WHERE id = $1", CHANGE_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Changes matching `filter`, newest first
    pub async fn list(pool: &PgPool, filter: &ChangeFilter) -> Result<Vec<Self>, sqlx::Error> {
        let (limit, offset) = clamp_page(filter.limit, filter.offset);

        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM changes", CHANGE_COLUMNS));
        push_conditions(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        builder.build_query_as::<Change>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &ChangeFilter) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM changes");
        push_conditions(&mut builder, filter);

        builder.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Moves a change to `status`, enforcing the workflow
    ///
    /// Returns the updated change and the status it had before.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: ChangeStatus,
    ) -> Result<(Self, ChangeStatus), ChangeError> {
        let mut tx = pool.begin().await?;

        let current: ChangeStatus =
            sqlx::query_scalar("SELECT status FROM changes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(ChangeError::NotFound)?;

        if !current.can_transition_to(status) {
            return Err(ChangeError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let change = sqlx::query_as::<_, Change>(&format!(
            "UPDATE changes SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            CHANGE_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((change, current))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM changes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
