//! Batch repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use ratchet_store::{CursorPage, CursorPagination};
use uuid::Uuid;

use crate::error::{PgError, PgResult};
use crate::model::{BatchRow, NewBatchRow};
use crate::{PgConnection, schema};

/// Repository for batch rows.
pub trait BatchRepository {
    /// Inserts a batch row.
    fn create_batch(
        &mut self,
        new_batch: NewBatchRow,
    ) -> impl Future<Output = PgResult<BatchRow>> + Send;

    /// Finds a batch by its unique identifier.
    fn find_batch_by_id(
        &mut self,
        batch_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<BatchRow>>> + Send;

    /// Returns whether a batch row exists.
    fn batch_exists(&mut self, batch_id: Uuid) -> impl Future<Output = PgResult<bool>> + Send;

    /// Deletes a batch row, returning whether it existed.
    fn delete_batch(&mut self, batch_id: Uuid) -> impl Future<Output = PgResult<bool>> + Send;

    /// Lists an owner's batches with cursor pagination, newest first.
    fn cursor_list_batches(
        &mut self,
        owner: &str,
        pagination: CursorPagination,
    ) -> impl Future<Output = PgResult<CursorPage<BatchRow>>> + Send;
}

impl BatchRepository for PgConnection {
    async fn create_batch(&mut self, new_batch: NewBatchRow) -> PgResult<BatchRow> {
        use schema::workflow_batches;

        let row = diesel::insert_into(workflow_batches::table)
            .values(&new_batch)
            .returning(BatchRow::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn find_batch_by_id(&mut self, batch_id: Uuid) -> PgResult<Option<BatchRow>> {
        use schema::workflow_batches::{self, dsl};

        let row = workflow_batches::table
            .filter(dsl::id.eq(batch_id))
            .select(BatchRow::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)?;

        Ok(row)
    }

    async fn batch_exists(&mut self, batch_id: Uuid) -> PgResult<bool> {
        use schema::workflow_batches::{self, dsl};

        let exists = diesel::select(diesel::dsl::exists(
            workflow_batches::table.filter(dsl::id.eq(batch_id)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)?;

        Ok(exists)
    }

    async fn delete_batch(&mut self, batch_id: Uuid) -> PgResult<bool> {
        use schema::workflow_batches::{self, dsl};

        let deleted = diesel::delete(workflow_batches::table.filter(dsl::id.eq(batch_id)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }

    async fn cursor_list_batches(
        &mut self,
        owner: &str,
        pagination: CursorPagination,
    ) -> PgResult<CursorPage<BatchRow>> {
        use schema::workflow_batches::{self, dsl};

        let limit = pagination.fetch_limit();
        let query = workflow_batches::table
            .filter(dsl::owner.eq(owner))
            .into_boxed();

        let rows: Vec<BatchRow> = if let Some(cursor) = &pagination.after {
            let cursor_time = jiff_diesel::Timestamp::from(cursor.timestamp);

            query
                .filter(
                    dsl::created_at
                        .lt(&cursor_time)
                        .or(dsl::created_at.eq(&cursor_time).and(dsl::id.lt(cursor.id))),
                )
                .select(BatchRow::as_select())
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .limit(limit)
                .load(self)
                .await
                .map_err(PgError::from)?
        } else {
            query
                .select(BatchRow::as_select())
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
}
