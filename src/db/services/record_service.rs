//! SeaORM implementation of the record store.
//!
//! Works against Postgres, MySQL and SQLite; the only dialect-specific piece
//! is the bucketing expression supplied by [`TimeBucketing`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema,
    Select, TransactionTrait,
};
use tracing::{error, info};

use crate::db::StoreError;
use crate::db::bucketing::{BucketRow, BucketUnit, MetricColumn, TimeBucketing};
use crate::db::entities::{failure, hit, prelude::*};
use crate::db::models::{NewFailure, NewHit, Service as ServiceRecord};
use crate::db::store::RecordStore;

#[derive(Clone, Debug)]
pub struct DbRecordStore {
    db: DatabaseConnection,
}

impl DbRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects to `database_url` and makes sure the monitoring tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(10).sqlx_logging(false);
        let db = Database::connect(opt).await?;
        let store = Self::new(db);
        store.create_tables().await?;
        Ok(store)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Creates the `services`, `hits` and `failures` tables if they are missing.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut statements = vec![
            schema.create_table_from_entity(Service),
            schema.create_table_from_entity(Hit),
            schema.create_table_from_entity(Failure),
        ];
        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.db.execute(backend.build(&*statement)).await.map_err(|e| {
                error!(error = %e, "Failed to create monitoring tables.");
                e
            })?;
        }
        info!(backend = ?backend, "Monitoring tables are ready.");
        Ok(())
    }
}

fn hits_for(service_id: i32, since: Option<DateTime<Utc>>) -> Select<Hit> {
    let query = Hit::find().filter(HitColumn::ServiceId.eq(service_id));
    match since {
        Some(since) => query.filter(HitColumn::CreatedAt.gte(since)),
        None => query,
    }
}

fn failures_for(service_id: i32, since: Option<DateTime<Utc>>) -> Select<Failure> {
    let query = Failure::find().filter(FailureColumn::ServiceId.eq(service_id));
    match since {
        Some(since) => query.filter(FailureColumn::CreatedAt.gte(since)),
        None => query,
    }
}

fn metric_column(column: MetricColumn) -> HitColumn {
    match column {
        MetricColumn::Latency => HitColumn::Latency,
    }
}

#[async_trait]
impl RecordStore for DbRecordStore {
    async fn insert_service(&self, service: &ServiceRecord) -> Result<i32, StoreError> {
        let mut active = service.to_active_model();
        active.id = sea_orm::ActiveValue::NotSet;
        let saved = active.insert(&self.db).await?;
        Ok(saved.id)
    }

    async fn update_service(&self, service: &ServiceRecord) -> Result<(), StoreError> {
        match service.to_active_model().update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) | Err(DbErr::RecordNotFound(_)) => {
                Err(StoreError::NotFound(service.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_service(&self, service_id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        Hit::delete_many()
            .filter(HitColumn::ServiceId.eq(service_id))
            .exec(&txn)
            .await?;
        Failure::delete_many()
            .filter(FailureColumn::ServiceId.eq(service_id))
            .exec(&txn)
            .await?;
        let result = Service::delete_by_id(service_id).exec(&txn).await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(StoreError::NotFound(service_id));
        }

        txn.commit().await?;
        Ok(())
    }

    async fn all_services(&self) -> Result<Vec<ServiceRecord>, StoreError> {
        let models = Service::find()
            .order_by_desc(ServiceColumn::OrderId)
            .order_by_asc(ServiceColumn::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(ServiceRecord::from).collect())
    }

    async fn insert_hit(&self, hit: NewHit) -> Result<(), StoreError> {
        hit.into_active_model().insert(&self.db).await?;
        Ok(())
    }

    async fn insert_failure(&self, failure: NewFailure) -> Result<(), StoreError> {
        failure.into_active_model().insert(&self.db).await?;
        Ok(())
    }

    async fn count_hits(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        Ok(hits_for(service_id, since).count(&self.db).await?)
    }

    async fn count_failures(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        Ok(failures_for(service_id, since).count(&self.db).await?)
    }

    async fn sum_latency(
        &self,
        service_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<f64, StoreError> {
        let total = hits_for(service_id, since)
            .select_only()
            .column_as(SimpleExpr::from(Func::sum(Expr::col(HitColumn::Latency))), "total")
            .into_tuple::<Option<f64>>()
            .one(&self.db)
            .await?;
        Ok(total.flatten().unwrap_or(0.0))
    }

    async fn recent_hits(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<hit::Model>, StoreError> {
        Ok(hits_for(service_id, None)
            .order_by_desc(HitColumn::CreatedAt)
            .order_by_desc(HitColumn::Id)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    async fn recent_failures(
        &self,
        service_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<failure::Model>, StoreError> {
        Ok(failures_for(service_id, None)
            .order_by_desc(FailureColumn::CreatedAt)
            .order_by_desc(FailureColumn::Id)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    async fn hits_between(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<hit::Model>, StoreError> {
        Ok(hits_for(service_id, Some(start))
            .filter(HitColumn::CreatedAt.lt(end))
            .order_by_asc(HitColumn::CreatedAt)
            .order_by_asc(HitColumn::Id)
            .all(&self.db)
            .await?)
    }

    async fn bucketed_average(
        &self,
        service_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: BucketUnit,
        column: MetricColumn,
    ) -> Result<Vec<BucketRow>, StoreError> {
        let backend = self.db.get_database_backend();
        let timeframe = backend.bucket_clause(unit, "created_at");

        let results = hits_for(service_id, Some(start))
            .filter(HitColumn::CreatedAt.lt(end))
            .select_only()
            .column_as(Expr::cust(timeframe), "timeframe")
            .column_as(
                SimpleExpr::from(Func::avg(Expr::col(metric_column(column)))),
                "value",
            )
            .group_by(Expr::cust("1")) // group by the bucket
            .order_by(Expr::cust("1"), Order::Asc)
            .into_model::<BucketRow>()
            .all(&self.db)
            .await;

        if let Err(e) = &results {
            error!(service_id, unit = %unit, error = %e, "Bucketed average query failed.");
        }
        Ok(results?)
    }
}
