use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(DOWN_SQL).await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    target TEXT NOT NULL,
    id TEXT NOT NULL,
    hash TEXT NOT NULL DEFAULT '',
    mtype TEXT NOT NULL,
    mdelta BIGINT,
    mvalue DOUBLE PRECISION,
    PRIMARY KEY (target, id)
);
CREATE INDEX IF NOT EXISTS idx_metrics_target ON metrics(target);
";

const DOWN_SQL: &str = "
DROP INDEX IF EXISTS idx_metrics_target;
DROP TABLE IF EXISTS metrics;
";
