//! RPC Method Handlers
//!
//! Validates requests and forwards them to the jobs service.

use crate::error::{to_rpc_error, validation};
use crate::types::{
    DeclareRequest, DeclareResponse, DestroyRequest, DestroyResponse, PipelinesRequest,
    PipelinesResponse, PushBatchRequest, PushBatchResponse, PushRequest, PushResponse,
    ResetResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use relay_core::domain::Job;
use relay_core::port::IdProvider;
use relay_core::JobsService;
use std::sync::Arc;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    jobs: Arc<JobsService>,
    id_provider: Arc<dyn IdProvider>,
}

impl RpcHandler {
    pub fn new(jobs: Arc<JobsService>, id_provider: Arc<dyn IdProvider>) -> Self {
        Self { jobs, id_provider }
    }

    fn to_job(&self, req: PushRequest) -> Result<Job, ErrorObjectOwned> {
        if req.job.trim().is_empty() {
            return Err(validation("job name must not be empty"));
        }
        if req.options.pipeline.trim().is_empty() {
            return Err(validation("options.pipeline must not be empty"));
        }

        let id = match &req.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.id_provider.generate_id(),
        };
        Ok(req.into_job(id))
    }

    /// jobs.push.v1
    pub async fn push(&self, params: PushRequest) -> Result<PushResponse, ErrorObjectOwned> {
        let job = self.to_job(params)?;
        let response = PushResponse {
            id: job.id.clone(),
            pipeline: job.pipeline().to_string(),
        };

        self.jobs.push(job).await.map_err(to_rpc_error)?;
        debug!(id = %response.id, pipeline = %response.pipeline, "job pushed");
        Ok(response)
    }

    /// jobs.push_batch.v1
    pub async fn push_batch(
        &self,
        params: PushBatchRequest,
    ) -> Result<PushBatchResponse, ErrorObjectOwned> {
        let jobs = params
            .jobs
            .into_iter()
            .map(|req| self.to_job(req))
            .collect::<Result<Vec<_>, _>>()?;
        let ids = jobs.iter().map(|j| j.id.clone()).collect();

        self.jobs.push_batch(jobs).await.map_err(to_rpc_error)?;
        Ok(PushBatchResponse { ids })
    }

    /// jobs.declare.v1
    pub async fn declare(&self, params: DeclareRequest) -> Result<DeclareResponse, ErrorObjectOwned> {
        let name = params.pipeline.name().to_string();
        if name.trim().is_empty() {
            return Err(validation("pipeline.name must not be empty"));
        }

        self.jobs
            .declare(params.pipeline)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeclareResponse { pipeline: name })
    }

    /// jobs.destroy.v1
    pub async fn destroy(&self, params: DestroyRequest) -> Result<DestroyResponse, ErrorObjectOwned> {
        self.jobs
            .destroy(&params.pipeline)
            .await
            .map_err(to_rpc_error)?;
        Ok(DestroyResponse {
            pipeline: params.pipeline,
            destroyed: true,
        })
    }

    /// jobs.pause.v1
    pub async fn pause(&self, params: PipelinesRequest) -> Result<PipelinesResponse, ErrorObjectOwned> {
        self.jobs.pause(&params.pipelines).await;
        Ok(PipelinesResponse {
            pipelines: params.pipelines,
        })
    }

    /// jobs.resume.v1
    pub async fn resume(&self, params: PipelinesRequest) -> Result<PipelinesResponse, ErrorObjectOwned> {
        self.jobs.resume(&params.pipelines).await;
        Ok(PipelinesResponse {
            pipelines: params.pipelines,
        })
    }

    /// jobs.list.v1
    pub async fn list(&self) -> Result<PipelinesResponse, ErrorObjectOwned> {
        let mut pipelines = self.jobs.list();
        pipelines.sort();
        Ok(PipelinesResponse { pipelines })
    }

    /// jobs.reset.v1
    pub async fn reset(&self) -> Result<ResetResponse, ErrorObjectOwned> {
        self.jobs.reset().await.map_err(to_rpc_error)?;
        Ok(ResetResponse { reset: true })
    }
}
