//! Batch row model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::workflow_batches;

/// One stored batch of workflows.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = workflow_batches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BatchRow {
    /// Batch id.
    pub id: Uuid,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Member workflow ids, in creation order.
    pub workflow_ids: Vec<Uuid>,
    /// When the batch was created.
    pub created_at: Timestamp,
}

/// Data for inserting a batch.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workflow_batches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBatchRow {
    /// Batch id.
    pub id: Uuid,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Member workflow ids.
    pub workflow_ids: Vec<Uuid>,
}
