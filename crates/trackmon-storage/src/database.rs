use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::{Set, Unchanged};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use trackmon_common::{Metric, MetricKind};

use crate::entities::metric::{ActiveModel, Column, Entity, Model};
use crate::{validate_update, Repository, Result, StorageError};

const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Relational repository on sea-orm.
///
/// One row per `(target, id)`; counter accumulation happens in the
/// application layer and every batch is applied inside a single
/// transaction, inserts first (`ON CONFLICT DO NOTHING`), updates second.
pub struct DbStorage {
    db: DatabaseConnection,
}

impl DbStorage {
    /// Parses the DSN into a pooled configuration, connects, pings, and
    /// runs the embedded schema migrations.
    pub async fn open(dsn: &str) -> Result<Self> {
        let mut opts = ConnectOptions::new(dsn.to_string());
        opts.max_connections(10)
            .connect_timeout(Duration::from_secs(3));
        let db = Database::connect(opts).await?;
        db.ping().await?;
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }

    fn model_to_metric(model: Model) -> Result<Metric> {
        let kind = model
            .mtype
            .parse::<MetricKind>()
            .map_err(|_| StorageError::WrongMetricType)?;
        let mut m = match kind {
            MetricKind::Counter => Metric::counter(model.id, model.mdelta.unwrap_or(0)),
            MetricKind::Gauge => Metric::gauge(model.id, model.mvalue.unwrap_or(0.0)),
        };
        m.hash = model.hash;
        Ok(m)
    }

    fn metric_to_model(target: &str, m: &Metric) -> ActiveModel {
        ActiveModel {
            target: Set(target.to_string()),
            id: Set(m.id.clone()),
            hash: Set(m.hash.clone()),
            mtype: Set(m.kind.to_string()),
            mdelta: Set(m.delta),
            mvalue: Set(m.value),
        }
    }

    async fn apply_batch(
        txn: &DatabaseTransaction,
        target: &str,
        for_add: &HashMap<String, Metric>,
        for_update: &HashMap<String, Metric>,
    ) -> Result<()> {
        if !for_add.is_empty() {
            let models: Vec<ActiveModel> = for_add
                .values()
                .map(|m| Self::metric_to_model(target, m))
                .collect();
            Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([Column::Target, Column::Id])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(txn)
                .await?;
        }
        for m in for_update.values() {
            let am = ActiveModel {
                target: Unchanged(target.to_string()),
                id: Unchanged(m.id.clone()),
                hash: Set(m.hash.clone()),
                mtype: Unchanged(m.kind.to_string()),
                mdelta: Set(m.delta),
                mvalue: Set(m.value),
            };
            am.update(txn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for DbStorage {
    async fn get_metric(
        &self,
        target: &str,
        kind: MetricKind,
        id: &str,
    ) -> Result<Option<Metric>> {
        let model = Entity::find()
            .filter(Column::Target.eq(target))
            .filter(Column::Id.eq(id))
            .filter(Column::Mtype.eq(kind.to_string()))
            .one(&self.db)
            .await?
            .ok_or(StorageError::NoRows)?;
        Ok(Some(Self::model_to_metric(model)?))
    }

    async fn update_metric(&self, target: &str, metrics: Vec<Metric>) -> Result<()> {
        for m in &metrics {
            validate_update(target, m)?;
        }

        let old = self.metrics(target).await?;
        let old_map: HashMap<&str, &Metric> = old
            .get(target)
            .map(|mm| mm.iter().map(|m| (m.id.as_str(), m)).collect())
            .unwrap_or_default();

        // Counter accumulation happens here, against both the stored row
        // and earlier records of the same batch.
        let mut for_add: HashMap<String, Metric> = HashMap::new();
        let mut for_update: HashMap<String, Metric> = HashMap::new();
        for mut next in metrics {
            if let Some(pending) = for_add.get(&next.id).or_else(|| for_update.get(&next.id)) {
                if next.kind == MetricKind::Counter {
                    let sum = pending.delta.unwrap_or(0) + next.delta.unwrap_or(0);
                    next.delta = Some(sum);
                }
                if for_add.contains_key(&next.id) {
                    for_add.insert(next.id.clone(), next);
                } else {
                    for_update.insert(next.id.clone(), next);
                }
                continue;
            }
            match old_map.get(next.id.as_str()) {
                None => {
                    for_add.insert(next.id.clone(), next);
                }
                Some(stored) => {
                    if next.kind == MetricKind::Counter {
                        let sum = stored.delta.unwrap_or(0) + next.delta.unwrap_or(0);
                        next.delta = Some(sum);
                    }
                    for_update.insert(next.id.clone(), next);
                }
            }
        }

        let txn = self.db.begin().await?;
        if let Err(err) = Self::apply_batch(&txn, target, &for_add, &for_update).await {
            txn.rollback().await.ok();
            return Err(err);
        }
        txn.commit().await?;
        Ok(())
    }

    async fn metrics(&self, target: &str) -> Result<HashMap<String, Vec<Metric>>> {
        let mut query = Entity::find();
        if !target.is_empty() {
            query = query.filter(Column::Target.eq(target));
        }
        let rows = query.all(&self.db).await?;
        let mut res: HashMap<String, Vec<Metric>> = HashMap::new();
        for row in rows {
            let target = row.target.clone();
            res.entry(target)
                .or_default()
                .push(Self::model_to_metric(row)?);
        }
        Ok(res)
    }

    async fn list(&self) -> Result<HashMap<String, Vec<String>>> {
        let all = self.metrics("").await?;
        let mut res = HashMap::with_capacity(all.len());
        for (target, mm) in all {
            let mut lines: Vec<String> = mm.iter().map(Metric::string_full).collect();
            lines.sort_unstable();
            res.insert(target, lines);
        }
        Ok(res)
    }

    async fn ping(&self) -> Result<()> {
        match tokio::time::timeout(PING_TIMEOUT, self.db.ping()).await {
            Err(_) => Err(StorageError::ContextClosed),
            Ok(res) => Ok(res?),
        }
    }
}
