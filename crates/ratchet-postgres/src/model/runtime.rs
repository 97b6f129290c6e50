//! Runtime cursor row model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::workflow_runtimes;

/// One stored runtime cursor; shares its workflow's id.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = workflow_runtimes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RuntimeRow {
    /// Workflow id.
    pub id: Uuid,
    /// Serialized cursor state.
    pub state: serde_json::Value,
    /// Terminal flag, denormalized for cheap filtering.
    pub finished: bool,
    /// When the row was created.
    pub created_at: Timestamp,
    /// When the row was last written.
    pub updated_at: Timestamp,
}

/// Data for inserting a runtime cursor.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workflow_runtimes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRuntimeRow {
    /// Workflow id.
    pub id: Uuid,
    /// Serialized cursor state.
    pub state: serde_json::Value,
    /// Terminal flag.
    pub finished: bool,
}

/// Data for updating a runtime cursor.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = workflow_runtimes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateRuntimeRow {
    /// Serialized cursor state.
    pub state: Option<serde_json::Value>,
    /// Terminal flag.
    pub finished: Option<bool>,
    /// Row update time.
    pub updated_at: Option<Timestamp>,
}
