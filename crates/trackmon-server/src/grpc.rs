use std::net::SocketAddr;

use tonic::{Request, Response, Status, Streaming};
use trackmon_common::proto::monitoring_server::Monitoring;
use trackmon_common::proto::{self, Empty, MetricRequest, UpdateRequest};
use trackmon_common::{convert, Metric};
use trackmon_storage::StorageError;

use crate::handlers::SIGNATURE_MISMATCH;
use crate::AppState;

/// gRPC ingestion surface sharing the repository (and the signing/
/// admission configuration) with the HTTP one. The reporting target is
/// the peer address of the call.
pub struct MonitoringService {
    state: AppState,
}

impl MonitoringService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Resolves the peer IP and applies the trusted-subnet check.
    fn admit_peer(&self, remote: Option<SocketAddr>) -> Result<String, Status> {
        let addr = remote.ok_or_else(|| Status::invalid_argument("access denied, no peer"))?;
        let ip = addr.ip();
        if let Some(trusted) = self.state.trusted {
            if !trusted.contains(ip) {
                return Err(Status::permission_denied("access denied"));
            }
        }
        Ok(ip.to_string())
    }

    async fn save_metric(&self, pm: &proto::Metric, target: &str) -> Result<(), Status> {
        let metric: Metric =
            convert::from_proto(pm).map_err(|err| Status::invalid_argument(err.to_string()))?;
        if !self.state.key.is_empty() && !metric.hash.is_empty() {
            match metric.verify(&self.state.key) {
                Ok(true) => {}
                _ => return Err(Status::invalid_argument(SIGNATURE_MISMATCH)),
            }
        }
        self.state
            .repo
            .update_metric(target, vec![metric])
            .await
            .map_err(status_from_storage)
    }
}

fn status_from_storage(err: StorageError) -> Status {
    match err {
        StorageError::WrongMetricUrl | StorageError::NoRows => Status::not_found(err.to_string()),
        StorageError::WrongTarget
        | StorageError::WrongMetricId
        | StorageError::WrongMetricType
        | StorageError::WrongMetricValue => Status::invalid_argument(err.to_string()),
        StorageError::WrongValueInStorage => Status::unimplemented(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl Monitoring for MonitoringService {
    async fn update(
        &self,
        request: Request<UpdateRequest>,
    ) -> Result<Response<Empty>, Status> {
        let target = self.admit_peer(request.remote_addr())?;
        for pm in &request.get_ref().metrics {
            self.save_metric(pm, &target).await?;
        }
        Ok(Response::new(Empty {}))
    }

    async fn updates(
        &self,
        request: Request<Streaming<proto::Metric>>,
    ) -> Result<Response<Empty>, Status> {
        let target = self.admit_peer(request.remote_addr())?;
        let mut stream = request.into_inner();
        while let Some(pm) = stream.message().await? {
            self.save_metric(&pm, &target).await?;
        }
        Ok(Response::new(Empty {}))
    }

    async fn get_metric(
        &self,
        request: Request<MetricRequest>,
    ) -> Result<Response<proto::Metric>, Status> {
        let target = self.admit_peer(request.remote_addr())?;
        let req = request.get_ref();
        let kind = convert::kind_from_proto(req.r#type())
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        let metric = match self.state.repo.get_metric(&target, kind, &req.id).await {
            Ok(Some(m)) => m,
            Ok(None) => return Err(Status::not_found("metric not found")),
            Err(err) => return Err(Status::not_found(err.to_string())),
        };
        let pm = convert::to_proto(&metric)
            .map_err(|err| Status::internal(err.to_string()))?;
        Ok(Response::new(pm))
    }

    async fn ping(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.admit_peer(request.remote_addr())?;
        self.state
            .repo
            .ping()
            .await
            .map_err(|err| Status::internal(err.to_string()))?;
        Ok(Response::new(Empty {}))
    }
}
