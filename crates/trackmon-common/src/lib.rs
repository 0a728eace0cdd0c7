pub mod convert;
pub mod metric;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("trackmon");
}

pub use metric::{Metric, MetricError, MetricKind};
