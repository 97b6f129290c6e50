//! Workflow row model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::workflows;

/// One stored workflow.
///
/// The full definition lives in the `definition` jsonb column; the scalar
/// columns beside it exist so listings, scheduling flags, and the advisory
/// lock can be queried and updated without touching the payload.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = workflows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkflowRow {
    /// Unique workflow identifier.
    pub id: Uuid,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Full serialized workflow definition.
    pub definition: serde_json::Value,
    /// Whether the workflow has been enqueued at least once.
    pub is_initiated: bool,
    /// Whether a worker is currently advancing it.
    pub in_progress: bool,
    /// Advisory lock holder.
    pub lock_holder: Option<String>,
    /// When the advisory lock was taken.
    pub lock_acquired_at: Option<Timestamp>,
    /// When the row was created.
    pub created_at: Timestamp,
    /// When the row was last written.
    pub updated_at: Timestamp,
}

/// Data for inserting a workflow.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workflows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWorkflowRow {
    /// Workflow id (client-generated, v7).
    pub id: Uuid,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Full serialized workflow definition.
    pub definition: serde_json::Value,
    /// Initial scheduling flag.
    pub is_initiated: bool,
    /// Initial progress flag.
    pub in_progress: bool,
}

/// Data for updating a workflow.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = workflows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateWorkflowRow {
    /// Display name; the inner `Option` clears it.
    pub name: Option<Option<String>>,
    /// Full serialized workflow definition.
    pub definition: Option<serde_json::Value>,
    /// Scheduling flag.
    pub is_initiated: Option<bool>,
    /// Progress flag.
    pub in_progress: Option<bool>,
    /// Row update time.
    pub updated_at: Option<Timestamp>,
}
