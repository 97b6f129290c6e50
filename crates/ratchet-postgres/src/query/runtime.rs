//! Runtime cursor repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::error::{PgError, PgResult};
use crate::model::{NewRuntimeRow, RuntimeRow, UpdateRuntimeRow};
use crate::{PgConnection, schema};

/// Repository for runtime cursor rows.
pub trait RuntimeRepository {
    /// Inserts a runtime cursor row.
    fn create_runtime(
        &mut self,
        new_runtime: NewRuntimeRow,
    ) -> impl Future<Output = PgResult<RuntimeRow>> + Send;

    /// Finds the cursor row for a workflow.
    fn find_runtime_by_id(
        &mut self,
        workflow_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<RuntimeRow>>> + Send;

    /// Returns whether a cursor row exists.
    fn runtime_exists(&mut self, workflow_id: Uuid) -> impl Future<Output = PgResult<bool>> + Send;

    /// Updates a cursor row.
    fn update_runtime(
        &mut self,
        workflow_id: Uuid,
        updates: UpdateRuntimeRow,
    ) -> impl Future<Output = PgResult<RuntimeRow>> + Send;

    /// Inserts a cursor row, overwriting it on id conflict.
    fn upsert_runtime(
        &mut self,
        new_runtime: NewRuntimeRow,
        updates: UpdateRuntimeRow,
    ) -> impl Future<Output = PgResult<RuntimeRow>> + Send;

    /// Deletes a cursor row, returning whether it existed.
    fn delete_runtime(
        &mut self,
        workflow_id: Uuid,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl RuntimeRepository for PgConnection {
    async fn create_runtime(&mut self, new_runtime: NewRuntimeRow) -> PgResult<RuntimeRow> {
        use schema::workflow_runtimes;

        let row = diesel::insert_into(workflow_runtimes::table)
            .values(&new_runtime)
            .returning(RuntimeRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn find_runtime_by_id(&mut self, workflow_id: Uuid) -> PgResult<Option<RuntimeRow>> {
        use schema::workflow_runtimes::{self, dsl};

        let row = workflow_runtimes::table
            .filter(dsl::id.eq(workflow_id))
            .select(RuntimeRow::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn runtime_exists(&mut self, workflow_id: Uuid) -> PgResult<bool> {
        use schema::workflow_runtimes::{self, dsl};

        let exists = diesel::select(diesel::dsl::exists(
            workflow_runtimes::table.filter(dsl::id.eq(workflow_id)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)?;

        Ok(exists)
    }

    async fn update_runtime(
        &mut self,
        workflow_id: Uuid,
        updates: UpdateRuntimeRow,
    ) -> PgResult<RuntimeRow> {
        use schema::workflow_runtimes::{self, dsl};

        let row = diesel::update(workflow_runtimes::table.filter(dsl::id.eq(workflow_id)))
            .set(&updates)
            .returning(RuntimeRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn upsert_runtime(
        &mut self,
        new_runtime: NewRuntimeRow,
        updates: UpdateRuntimeRow,
    ) -> PgResult<RuntimeRow> {
        use schema::workflow_runtimes::{self, dsl};

        let row = diesel::insert_into(workflow_runtimes::table)
            .values(&new_runtime)
            .on_conflict(dsl::id)
            .do_update()
            .set(&updates)
            .returning(RuntimeRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn delete_runtime(&mut self, workflow_id: Uuid) -> PgResult<bool> {
        use schema::workflow_runtimes::{self, dsl};

        let deleted = diesel::delete(workflow_runtimes::table.filter(dsl::id.eq(workflow_id)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }
}
