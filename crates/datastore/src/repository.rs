//! Generic, permission-enforcing CRUD over one resource table.
//!
//! A [`Repository`] is instantiated once per resource type with a
//! [`RepositoryConfig`] and shared by all requests. Every operation runs on
//! the ambient transaction when one is bound, falling back to the pool
//! otherwise, and applies the acting principal's grants: reads are filtered
//! down to visible rows, writes fail with an explicit authorization error.

use std::marker::PhantomData;

use freightdeck_core::{AppError, AppResult, GrantAction, Pattern, grants_for, has_permission};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::activity::{ActivityAction, ActivityRecorder};
use crate::context::{current_principal, current_transaction};
use crate::criteria::{Criteria, ListQuery, SqlValue, ensure_identifier};

/// A persisted resource shape readable from a Postgres row.
///
/// Every record carries the canonical base columns (`id`, `created_at`,
/// `creator_id`, `owner_id`, and `deleted_at` where soft-delete applies).
pub trait Record: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin + 'static {
    /// Write shape for inserts and upserts.
    type Insert: InsertRecord;
    /// Write shape for updates.
    type Update: UpdateRecord;

    /// Unique, immutable row id.
    fn id(&self) -> Uuid;
}

/// Full-row write shape used by insert and upsert operations.
pub trait InsertRecord: Send + Sync {
    /// Columns written by every insert of this shape, in a fixed order.
    fn columns() -> &'static [&'static str];

    /// Values matching [`InsertRecord::columns`], one per column.
    fn values(&self) -> Vec<SqlValue>;

    /// Owning tenant of the new row, when present on the input.
    fn owner_id(&self) -> Option<Uuid>;
}

/// Partial write shape applied by update operations; unset fields are
/// absent from the assignment list.
pub trait UpdateRecord: Send + Sync {
    /// Column assignments carried by this update.
    fn assignments(&self) -> Vec<(&'static str, SqlValue)>;
}

/// Update shape for append-only resources; it carries no assignments, so
/// `update` always rejects it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpdate;

impl UpdateRecord for NoUpdate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Vec::new()
    }
}

/// Static per-resource-type configuration, created once at startup and
/// shared by all requests for that resource type.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    table: &'static str,
    soft_delete: bool,
    enforce_permissions: bool,
    record_activity: bool,
    upsert_action: ActivityAction,
}

impl RepositoryConfig {
    /// Creates a configuration for `table` with every feature disabled.
    #[must_use]
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            soft_delete: false,
            enforce_permissions: false,
            record_activity: false,
            upsert_action: ActivityAction::Update,
        }
    }

    /// Marks removals as soft deletes via `deleted_at`.
    #[must_use]
    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Applies permission filtering to reads and grant checks to writes.
    #[must_use]
    pub fn enforce_permissions(mut self) -> Self {
        self.enforce_permissions = true;
        self
    }

    /// Records an activity after every successful mutation.
    #[must_use]
    pub fn record_activity(mut self) -> Self {
        self.record_activity = true;
        self
    }

    /// Audits upserts with `action` instead of the historical `update`.
    #[must_use]
    pub fn upsert_action(mut self, action: ActivityAction) -> Self {
        self.upsert_action = action;
        self
    }

    /// Returns the backing table name.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }
}

/// CRUD engine for one resource type.
pub struct Repository<R: Record> {
    pool: PgPool,
    config: RepositoryConfig,
    recorder: Option<ActivityRecorder>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
            recorder: self.recorder.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    /// Creates a repository bound to `pool` with `config`.
    ///
    /// `recorder` is consulted only when the configuration enables
    /// activity recording.
    #[must_use]
    pub fn new(pool: PgPool, config: RepositoryConfig, recorder: Option<ActivityRecorder>) -> Self {
        Self {
            pool,
            config,
            recorder,
            _record: PhantomData,
        }
    }

    /// Returns the static configuration.
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Fetches one row by id.
    ///
    /// Rows hidden by soft-delete or by the acting principal's grants read
    /// as absent, never as a distinct authorization error.
    pub async fn get(&self, id: Uuid) -> AppResult<Option<R>> {
        let mut builder = self.select_builder()?;
        builder.push(" AND id = ");
        builder.push_bind(id);
        self.push_soft_delete_filter(&mut builder, false);
        self.push_permission_filter(&mut builder, GrantAction::Read);
        builder.push(" LIMIT 1");
        self.fetch_optional_row(&mut builder, "get").await
    }

    /// Fetches the first row matching all given fields.
    pub async fn get_by(&self, criteria: Criteria) -> AppResult<Option<R>> {
        self.get_by_inner(criteria, false).await
    }

    /// Fetches the first row matching any of the given fields.
    pub async fn get_by_any(&self, criteria: Criteria) -> AppResult<Option<R>> {
        self.get_by_inner(criteria, true).await
    }

    async fn get_by_inner(&self, criteria: Criteria, match_any: bool) -> AppResult<Option<R>> {
        let mut builder = self.select_builder()?;
        Self::push_criteria(&mut builder, &criteria, match_any)?;
        self.push_soft_delete_filter(&mut builder, false);
        self.push_permission_filter(&mut builder, GrantAction::Read);
        builder.push(" LIMIT 1");
        self.fetch_optional_row(&mut builder, "get_by").await
    }

    /// Lists rows matching the query.
    ///
    /// Default order is creation time ascending; an explicit sort takes
    /// precedence with creation time as the tie-break.
    pub async fn get_all(&self, query: ListQuery) -> AppResult<Vec<R>> {
        let mut builder = self.select_builder()?;
        Self::push_criteria(&mut builder, &query.criteria, false)?;
        self.push_soft_delete_filter(&mut builder, query.only_deleted);
        self.push_permission_filter(&mut builder, GrantAction::Read);

        builder.push(" ORDER BY ");
        if let Some(sort) = &query.sort {
            let column = ensure_identifier(sort.column.as_str())?;
            builder.push(format!("{column} {}, ", sort.direction.as_sql()));
        }
        builder.push("created_at ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        self.fetch_all_rows(&mut builder, "get_all").await
    }

    /// Inserts one row and returns it.
    pub async fn create(&self, input: &R::Insert) -> AppResult<R> {
        self.enforce_create_permission(input)?;
        let mut builder = self.insert_builder(std::slice::from_ref(input))?;
        builder.push(" RETURNING *");
        let row = self.fetch_one_row(&mut builder, "create").await?;
        self.record_mutation(ActivityAction::Create, row.id()).await;
        Ok(row)
    }

    /// Inserts many rows in one statement and returns them.
    pub async fn create_all(&self, inputs: &[R::Insert]) -> AppResult<Vec<R>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        for input in inputs {
            self.enforce_create_permission(input)?;
        }
        let mut builder = self.insert_builder(inputs)?;
        builder.push(" RETURNING *");
        let rows = self.fetch_all_rows(&mut builder, "create_all").await?;
        for row in &rows {
            self.record_mutation(ActivityAction::Create, row.id()).await;
        }
        Ok(rows)
    }

    /// Inserts one row, or merges the input into the existing row on a
    /// `conflict_columns` conflict, keeping its id stable.
    pub async fn create_or_update(
        &self,
        input: &R::Insert,
        conflict_columns: &[&str],
    ) -> AppResult<R> {
        self.enforce_create_permission(input)?;
        let mut builder = self.insert_builder(std::slice::from_ref(input))?;
        Self::push_conflict_merge(&mut builder, conflict_columns)?;
        builder.push(" RETURNING *");
        let row = self.fetch_one_row(&mut builder, "create_or_update").await?;
        self.record_mutation(self.config.upsert_action, row.id())
            .await;
        Ok(row)
    }

    /// Batched form of [`Repository::create_or_update`].
    pub async fn create_or_update_all(
        &self,
        inputs: &[R::Insert],
        conflict_columns: &[&str],
    ) -> AppResult<Vec<R>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        for input in inputs {
            self.enforce_create_permission(input)?;
        }
        let mut builder = self.insert_builder(inputs)?;
        Self::push_conflict_merge(&mut builder, conflict_columns)?;
        builder.push(" RETURNING *");
        let rows = self
            .fetch_all_rows(&mut builder, "create_or_update_all")
            .await?;
        for row in &rows {
            self.record_mutation(self.config.upsert_action, row.id())
                .await;
        }
        Ok(rows)
    }

    /// Updates one row by id, optionally narrowed by `and_where` equality
    /// or null predicates that must also match.
    ///
    /// Failures are told apart: a missing row is `NotFound`, an existing
    /// row failing the narrowing clause is `PreconditionFailed`, and a row
    /// hidden by the permission predicate is `Forbidden`.
    pub async fn update(&self, id: Uuid, input: &R::Update, and_where: Criteria) -> AppResult<R> {
        let assignments = input.assignments();
        if assignments.is_empty() {
            return Err(AppError::Validation(format!(
                "[{}] update carries no assignments",
                self.config.table
            )));
        }

        let table = ensure_identifier(self.config.table)?;
        let mut builder = QueryBuilder::new(format!("UPDATE {table} SET "));
        for (index, (column, value)) in assignments.into_iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            let column = ensure_identifier(column)?;
            builder.push(format!("{column} = "));
            value.push_bind(&mut builder);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        Self::push_criteria(&mut builder, &and_where, false)?;
        self.push_permission_filter(&mut builder, GrantAction::Update);
        builder.push(" RETURNING *");

        let updated = self.fetch_optional_row(&mut builder, "update").await?;
        let Some(row) = updated else {
            return Err(self.classify_write_miss(id, &and_where).await);
        };

        self.record_mutation(ActivityAction::Update, row.id()).await;
        Ok(row)
    }

    /// Removes one row by id and returns whether a row was affected.
    ///
    /// With soft-delete configured this stamps `deleted_at` instead of
    /// physically deleting; there is no undelete.
    pub async fn remove(&self, id: Uuid) -> AppResult<bool> {
        let mut builder = self.delete_builder()?;
        builder.push(" AND id = ");
        builder.push_bind(id);
        self.push_soft_delete_filter(&mut builder, false);
        self.push_permission_filter(&mut builder, GrantAction::Delete);
        builder.push(" RETURNING *");

        let rows = self.fetch_all_rows(&mut builder, "remove").await?;
        if rows.is_empty() {
            return match self.classify_write_miss(id, &Criteria::new()).await {
                AppError::NotFound(_) => Ok(false),
                error => Err(error),
            };
        }

        for row in &rows {
            self.record_mutation(ActivityAction::Delete, row.id()).await;
        }
        Ok(true)
    }

    /// Bulk form of [`Repository::remove`]; returns whether any row was
    /// affected.
    pub async fn remove_by(&self, criteria: Criteria) -> AppResult<bool> {
        let mut builder = self.delete_builder()?;
        Self::push_criteria(&mut builder, &criteria, false)?;
        self.push_soft_delete_filter(&mut builder, false);
        self.push_permission_filter(&mut builder, GrantAction::Delete);
        builder.push(" RETURNING *");

        let rows = self.fetch_all_rows(&mut builder, "remove_by").await?;
        if rows.is_empty() {
            if self.active_row_exists(&criteria).await? {
                return Err(self.forbidden("delete"));
            }
            return Ok(false);
        }

        for row in &rows {
            self.record_mutation(ActivityAction::Delete, row.id()).await;
        }
        Ok(true)
    }

    /// Returns whether any row matches `criteria`.
    ///
    /// Bypasses permission filtering by design: uniqueness validation must
    /// work across tenants.
    pub async fn exists(&self, criteria: Criteria) -> AppResult<bool> {
        let mut builder = self.select_builder()?;
        Self::push_criteria(&mut builder, &criteria, false)?;
        builder.push(" LIMIT 1");
        let row = self.fetch_optional_row(&mut builder, "exists").await?;
        Ok(row.is_some())
    }

    // --- query assembly ---

    fn select_builder(&self) -> AppResult<QueryBuilder<'static, Postgres>> {
        let table = ensure_identifier(self.config.table)?;
        Ok(QueryBuilder::new(format!(
            "SELECT * FROM {table} WHERE TRUE"
        )))
    }

    fn delete_builder(&self) -> AppResult<QueryBuilder<'static, Postgres>> {
        let table = ensure_identifier(self.config.table)?;
        if self.config.soft_delete {
            let mut builder = QueryBuilder::new(format!("UPDATE {table} SET deleted_at = "));
            builder.push_bind(chrono::Utc::now());
            builder.push(" WHERE TRUE");
            Ok(builder)
        } else {
            Ok(QueryBuilder::new(format!("DELETE FROM {table} WHERE TRUE")))
        }
    }

    fn insert_builder(&self, inputs: &[R::Insert]) -> AppResult<QueryBuilder<'static, Postgres>> {
        let table = ensure_identifier(self.config.table)?;
        let mut builder = QueryBuilder::new(format!("INSERT INTO {table} ("));
        for (index, column) in R::Insert::columns().iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(ensure_identifier(column)?);
        }
        builder.push(") ");
        builder.push_values(inputs, |mut row, input| {
            for value in input.values() {
                value.push_bind_separated(&mut row);
            }
        });
        Ok(builder)
    }

    fn push_conflict_merge(
        builder: &mut QueryBuilder<'_, Postgres>,
        conflict_columns: &[&str],
    ) -> AppResult<()> {
        builder.push(" ON CONFLICT (");
        for (index, column) in conflict_columns.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(ensure_identifier(column)?);
        }
        builder.push(") DO UPDATE SET ");

        let mut first = true;
        for column in R::Insert::columns() {
            if conflict_columns.contains(column) {
                continue;
            }
            if !first {
                builder.push(", ");
            }
            first = false;
            let column = ensure_identifier(column)?;
            builder.push(format!("{column} = EXCLUDED.{column}"));
        }
        Ok(())
    }

    fn push_criteria(
        builder: &mut QueryBuilder<'_, Postgres>,
        criteria: &Criteria,
        match_any: bool,
    ) -> AppResult<()> {
        if criteria.is_empty() {
            return Ok(());
        }

        builder.push(" AND (");
        for (index, (column, value)) in criteria.iter().enumerate() {
            if index > 0 {
                builder.push(if match_any { " OR " } else { " AND " });
            }
            let column = ensure_identifier(column.as_str())?;
            if value.is_null() {
                builder.push(format!("{column} IS NULL"));
            } else {
                builder.push(format!("{column} = "));
                value.clone().push_bind(builder);
            }
        }
        builder.push(")");
        Ok(())
    }

    fn push_soft_delete_filter(&self, builder: &mut QueryBuilder<'_, Postgres>, only_deleted: bool) {
        if only_deleted {
            builder.push(" AND deleted_at IS NOT NULL");
        } else if self.config.soft_delete {
            builder.push(" AND deleted_at IS NULL");
        }
    }

    /// Narrows a query to the rows the acting principal's grants cover,
    /// OR-composing one bound condition per applicable grant. No grants
    /// means no visible rows.
    fn push_permission_filter(&self, builder: &mut QueryBuilder<'_, Postgres>, action: GrantAction) {
        if !self.config.enforce_permissions {
            return;
        }
        let Some(principal) = current_principal() else {
            return;
        };

        let grants = grants_for(principal.permissions(), action, self.config.table);
        if grants.is_empty() {
            builder.push(" AND FALSE");
            return;
        }

        builder.push(" AND (");
        for (index, grant) in grants.iter().enumerate() {
            if index > 0 {
                builder.push(" OR ");
            }
            match (&grant.owner_id, &grant.resource_id) {
                (Pattern::Any, Pattern::Any) => {
                    builder.push("TRUE");
                }
                (Pattern::Any, Pattern::Exact(resource_id)) => {
                    builder.push("id = ");
                    builder.push_bind(*resource_id);
                }
                (Pattern::Exact(owner_id), Pattern::Any) => {
                    builder.push("owner_id = ");
                    builder.push_bind(*owner_id);
                }
                (Pattern::Exact(owner_id), Pattern::Exact(resource_id)) => {
                    builder.push("(owner_id = ");
                    builder.push_bind(*owner_id);
                    builder.push(" AND id = ");
                    builder.push_bind(*resource_id);
                    builder.push(")");
                }
            }
        }
        builder.push(")");
    }

    // --- write checks and failure classification ---

    fn enforce_create_permission(&self, input: &R::Insert) -> AppResult<()> {
        if !self.config.enforce_permissions {
            return Ok(());
        }
        let Some(owner_id) = input.owner_id() else {
            return Err(AppError::Validation(format!(
                "[{}] owner id is required for write operations",
                self.config.table
            )));
        };
        let Some(principal) = current_principal() else {
            return Ok(());
        };

        if has_permission(
            principal.permissions(),
            GrantAction::Create,
            self.config.table,
            None,
            owner_id,
        ) {
            Ok(())
        } else {
            Err(self.forbidden("create"))
        }
    }

    /// Tells apart the three reasons a write by id affected no row, using
    /// unfiltered existence checks.
    async fn classify_write_miss(&self, id: Uuid, and_where: &Criteria) -> AppError {
        let by_id = Criteria::new().field("id", id);
        match self.active_row_exists(&by_id).await {
            Ok(false) => AppError::NotFound(format!(
                "[{}] no row with id={id}",
                self.config.table
            )),
            Ok(true) if and_where.is_empty() => self.forbidden("write"),
            Ok(true) => {
                let narrowed = and_where.clone().field("id", id);
                match self.active_row_exists(&narrowed).await {
                    Ok(true) => self.forbidden("write"),
                    Ok(false) => AppError::PreconditionFailed(format!(
                        "[{}] row with id={id} does not satisfy the narrowing clause",
                        self.config.table
                    )),
                    Err(error) => error,
                }
            }
            Err(error) => error,
        }
    }

    async fn active_row_exists(&self, criteria: &Criteria) -> AppResult<bool> {
        let mut builder = self.select_builder()?;
        Self::push_criteria(&mut builder, criteria, false)?;
        self.push_soft_delete_filter(&mut builder, false);
        builder.push(" LIMIT 1");
        let row = self.fetch_optional_row(&mut builder, "exists").await?;
        Ok(row.is_some())
    }

    fn forbidden(&self, operation: &str) -> AppError {
        AppError::Forbidden(format!(
            "[{}] you do not have permission to perform this {operation} operation",
            self.config.table
        ))
    }

    // --- execution ---

    async fn record_mutation(&self, action: ActivityAction, resource_id: Uuid) {
        if !self.config.record_activity {
            return;
        }
        if let Some(recorder) = &self.recorder {
            Box::pin(recorder.record(action, self.config.table, resource_id)).await;
        }
    }

    async fn fetch_one_row(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: &str,
    ) -> AppResult<R> {
        self.fetch_optional_row(builder, operation)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "[{}] {operation} returned no row",
                    self.config.table
                ))
            })
    }

    async fn fetch_optional_row(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: &str,
    ) -> AppResult<Option<R>> {
        let result = match current_transaction() {
            Some(slot) => {
                let mut guard = slot.lock().await;
                let transaction = guard.as_mut().ok_or_else(|| {
                    AppError::Internal("ambient transaction already completed".to_owned())
                })?;
                builder
                    .build_query_as::<R>()
                    .fetch_optional(&mut **transaction)
                    .await
            }
            None => {
                builder
                    .build_query_as::<R>()
                    .fetch_optional(&self.pool)
                    .await
            }
        };
        result.map_err(|error| self.map_sqlx_error(operation, error))
    }

    async fn fetch_all_rows(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: &str,
    ) -> AppResult<Vec<R>> {
        let result = match current_transaction() {
            Some(slot) => {
                let mut guard = slot.lock().await;
                let transaction = guard.as_mut().ok_or_else(|| {
                    AppError::Internal("ambient transaction already completed".to_owned())
                })?;
                builder
                    .build_query_as::<R>()
                    .fetch_all(&mut **transaction)
                    .await
            }
            None => builder.build_query_as::<R>().fetch_all(&self.pool).await,
        };
        result.map_err(|error| self.map_sqlx_error(operation, error))
    }

    fn map_sqlx_error(&self, operation: &str, error: sqlx::Error) -> AppError {
        if let sqlx::Error::Database(database_error) = &error
            && database_error.is_unique_violation()
        {
            return AppError::Conflict(format!(
                "[{}] {operation} violates a unique constraint: {database_error}",
                self.config.table
            ));
        }
        AppError::Internal(format!(
            "[{}] {operation} failed: {error}",
            self.config.table
        ))
    }
}
