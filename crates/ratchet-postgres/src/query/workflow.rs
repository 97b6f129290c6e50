//! Workflow repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::SignedDuration;
use ratchet_store::{CursorPage, CursorPagination};
use uuid::Uuid;

use crate::error::{PgError, PgResult};
use crate::model::{NewWorkflowRow, UpdateWorkflowRow, WorkflowRow};
use crate::{PgConnection, schema};

/// Repository for workflow rows.
pub trait WorkflowRepository {
    /// Inserts workflow rows in one statement; all-or-none.
    fn create_workflows(
        &mut self,
        new_workflows: Vec<NewWorkflowRow>,
    ) -> impl Future<Output = PgResult<Vec<WorkflowRow>>> + Send;

    /// Finds a workflow by its unique identifier.
    fn find_workflow_by_id(
        &mut self,
        workflow_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<WorkflowRow>>> + Send;

    /// Returns whether a workflow row exists.
    fn workflow_exists(&mut self, workflow_id: Uuid) -> impl Future<Output = PgResult<bool>> + Send;

    /// Updates a workflow row.
    fn update_workflow(
        &mut self,
        workflow_id: Uuid,
        updates: UpdateWorkflowRow,
    ) -> impl Future<Output = PgResult<WorkflowRow>> + Send;

    /// Inserts a workflow row, overwriting the mutable columns on id
    /// conflict. The lock columns are left untouched either way.
    fn upsert_workflow(
        &mut self,
        new_workflow: NewWorkflowRow,
        updates: UpdateWorkflowRow,
    ) -> impl Future<Output = PgResult<WorkflowRow>> + Send;

    /// Deletes a workflow row, returning whether it existed.
    fn delete_workflow(
        &mut self,
        workflow_id: Uuid,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Deletes several workflow rows in one statement.
    fn delete_workflows(
        &mut self,
        workflow_ids: &[Uuid],
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Lists an owner's workflows with cursor pagination, newest first.
    fn cursor_list_workflows(
        &mut self,
        owner: &str,
        pagination: CursorPagination,
    ) -> impl Future<Output = PgResult<CursorPage<WorkflowRow>>> + Send;

    /// Takes the advisory lock with one conditional `UPDATE`.
    ///
    /// The lock is free when no holder is set, when `holder` already owns
    /// it, or when the current lock is older than `ttl`. Returns whether
    /// the lock was taken.
    fn try_acquire_lock(
        &mut self,
        workflow_id: Uuid,
        holder: &str,
        ttl: SignedDuration,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Clears the advisory lock if `holder` still owns it.
    fn release_lock(
        &mut self,
        workflow_id: Uuid,
        holder: &str,
    ) -> impl Future<Output = PgResult<()>> + Send;
}

impl WorkflowRepository for PgConnection {
    async fn create_workflows(
        &mut self,
        new_workflows: Vec<NewWorkflowRow>,
    ) -> PgResult<Vec<WorkflowRow>> {
        use schema::workflows;

        let rows = diesel::insert_into(workflows::table)
            .values(&new_workflows)
            .returning(WorkflowRow::as_returning())
            .get_results(self)
            .await
            .map_err(PgError::from)?;

        Ok(rows)
    }

    async fn find_workflow_by_id(&mut self, workflow_id: Uuid) -> PgResult<Option<WorkflowRow>> {
        use schema::workflows::{self, dsl};

        let row = workflows::table
            .filter(dsl::id.eq(workflow_id))
            .select(WorkflowRow::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn workflow_exists(&mut self, workflow_id: Uuid) -> PgResult<bool> {
        use schema::workflows::{self, dsl};

        let exists = diesel::select(diesel::dsl::exists(
            workflows::table.filter(dsl::id.eq(workflow_id)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)?;

        Ok(exists)
    }

    async fn update_workflow(
        &mut self,
        workflow_id: Uuid,
        updates: UpdateWorkflowRow,
    ) -> PgResult<WorkflowRow> {
        use schema::workflows::{self, dsl};

        let row = diesel::update(workflows::table.filter(dsl::id.eq(workflow_id)))
            .set(&updates)
            .returning(WorkflowRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn upsert_workflow(
        &mut self,
        new_workflow: NewWorkflowRow,
        updates: UpdateWorkflowRow,
    ) -> PgResult<WorkflowRow> {
        use schema::workflows::{self, dsl};

        let row = diesel::insert_into(workflows::table)
            .values(&new_workflow)
            .on_conflict(dsl::id)
            .do_update()
            .set(&updates)
            .returning(WorkflowRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn delete_workflow(&mut self, workflow_id: Uuid) -> PgResult<bool> {
        use schema::workflows::{self, dsl};

        let deleted = diesel::delete(workflows::table.filter(dsl::id.eq(workflow_id)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }

    async fn delete_workflows(&mut self, workflow_ids: &[Uuid]) -> PgResult<usize> {
        use schema::workflows::{self, dsl};

        let deleted = diesel::delete(workflows::table.filter(dsl::id.eq_any(workflow_ids)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted)
    }

    async fn cursor_list_workflows(
        &mut self,
        owner: &str,
        pagination: CursorPagination,
    ) -> PgResult<CursorPage<WorkflowRow>> {
        use schema::workflows::{self, dsl};

        let limit = pagination.fetch_limit();
        let query = workflows::table.filter(dsl::owner.eq(owner)).into_boxed();

        let rows: Vec<WorkflowRow> = if let Some(cursor) = &pagination.after {
            let cursor_time = jiff_diesel::Timestamp::from(cursor.timestamp);

            query
                .filter(
                    dsl::created_at
                        .lt(&cursor_time)
                        .or(dsl::created_at.eq(&cursor_time).and(dsl::id.lt(cursor.id))),
                )
                .select(WorkflowRow::as_select())
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .limit(limit)
                .load(self)
                .await
                .map_err(PgError::from)?
        } else {
            query
                .select(WorkflowRow::as_select())
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .limit(limit)
                .load(self)
                .await
                .map_err(PgError::from)?
        };

        Ok(CursorPage::from_rows(rows, pagination.limit, |row| {
            (row.created_at.into(), row.id)
        }))
    }

    async fn try_acquire_lock(
        &mut self,
        workflow_id: Uuid,
        holder: &str,
        ttl: SignedDuration,
    ) -> PgResult<bool> {
        use schema::workflows::{self, dsl};

        let now = jiff::Timestamp::now();
        let cutoff = jiff_diesel::Timestamp::from(
            now.saturating_sub(ttl)
                .expect("subtracting a SignedDuration from a Timestamp is infallible"),
        );
        let acquired_at = jiff_diesel::Timestamp::from(now);

        let updated = diesel::update(
            workflows::table.filter(dsl::id.eq(workflow_id)).filter(
                dsl::lock_holder
                    .is_null()
                    .or(dsl::lock_holder.eq(holder))
                    .or(dsl::lock_acquired_at.lt(Some(cutoff))),
            ),
        )
        .set((
            dsl::lock_holder.eq(Some(holder)),
            dsl::lock_acquired_at.eq(Some(acquired_at)),
            dsl::updated_at.eq(acquired_at),
        ))
        .execute(self)
        .await
        .map_err(PgError::from)?;

        Ok(updated > 0)
    }

    async fn release_lock(&mut self, workflow_id: Uuid, holder: &str) -> PgResult<()> {
        use schema::workflows::{self, dsl};

        let released = diesel::update(
            workflows::table
                .filter(dsl::id.eq(workflow_id))
                .filter(dsl::lock_holder.eq(holder)),
        )
        .set((
            dsl::lock_holder.eq(None::<String>),
            dsl::lock_acquired_at.eq(None::<jiff_diesel::Timestamp>),
            dsl::updated_at.eq(jiff_diesel::Timestamp::from(jiff::Timestamp::now())),
        ))
        .execute(self)
        .await
        .map_err(PgError::from)?;

        if released == 0 {
            tracing::debug!(
                target: crate::TRACING_TARGET_QUERY,
                workflow_id = %workflow_id,
                holder = %holder,
                "Lock release was a no-op; holder was superseded or absent"
            );
        }
        Ok(())
    }
}
