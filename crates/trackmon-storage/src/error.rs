/// Errors surfaced by the storage layer.
///
/// The validation variants map onto client-facing statuses in the
/// ingestion service (400/404/501 and their gRPC code counterparts);
/// everything else is an internal error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("wrong metrics target")]
    WrongTarget,

    #[error("wrong metric id")]
    WrongMetricId,

    #[error("no such metric type")]
    WrongMetricType,

    #[error("wrong metric value")]
    WrongMetricValue,

    #[error("wrong value in storage")]
    WrongValueInStorage,

    #[error("wrong metric url")]
    WrongMetricUrl,

    /// The relational store found no row for the requested metric.
    #[error("metric not found")]
    NoRows,

    /// A storage operation exceeded its deadline.
    #[error("storage deadline exceeded")]
    ContextClosed,

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
