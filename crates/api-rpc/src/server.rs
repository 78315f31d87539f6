//! JSON-RPC Server
//!
//! Serves the jobs API over HTTP/WebSocket on a TCP address.

use crate::handler::RpcHandler;
use crate::types::{DeclareRequest, DestroyRequest, PipelinesRequest, PushBatchRequest, PushRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use relay_core::port::IdProvider;
use relay_core::JobsService;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 6001;

/// RPC Server Configuration (`rpc` section)
#[derive(Debug, Clone, Deserialize)]
pub struct RpcServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    DEFAULT_RPC_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_RPC_PORT
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        jobs: Arc<JobsService>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(jobs, id_provider)),
        }
    }

    /// Build the method table
    pub fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.push.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PushRequest = params.parse()?;
                    handler.push(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.push_batch.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PushBatchRequest = params.parse()?;
                    handler.push_batch(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.declare.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DeclareRequest = params.parse()?;
                    handler.declare(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.destroy.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DestroyRequest = params.parse()?;
                    handler.destroy(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.pause.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PipelinesRequest = params.parse()?;
                    handler.pause(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.resume.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PipelinesRequest = params.parse()?;
                    handler.resume(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.list.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.list().await }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.reset.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.reset().await }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to resolve local address: {}", e))?;

        let module = self.module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started successfully");
        Ok((local_addr, handle))
    }
}

/// Stop accepting calls and wait up to `timeout` for in-flight ones.
///
/// Returns `false` when the server was still running after `timeout`.
pub async fn shutdown(handle: ServerHandle, timeout: Duration) -> bool {
    if let Err(e) = handle.stop() {
        warn!(error = %e, "JSON-RPC server already stopped");
    }
    if tokio::time::timeout(timeout, handle.stopped()).await.is_err() {
        warn!(timeout = ?timeout, "JSON-RPC server did not stop in time");
        return false;
    }
    info!("JSON-RPC server stopped");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::port::executor::mocks::MockExecutorFactory;
    use relay_core::port::id_provider::SequentialIdProvider;
    use relay_core::JobsConfig;
    use relay_infra_memory::{EphemeralConstructor, DRIVER_NAME};
    use jsonrpsee::core::params::{ArrayParams, ObjectParams};
    use serde_json::json;

    fn server() -> RpcServer {
        let mut jobs = JobsService::new(
            Some(JobsConfig::default()),
            Arc::new(MockExecutorFactory::new_success()),
        )
        .unwrap();
        jobs.register_driver(DRIVER_NAME, Arc::new(EphemeralConstructor::new()));

        RpcServer::new(
            RpcServerConfig::default(),
            Arc::new(jobs),
            Arc::new(SequentialIdProvider::new("job")),
        )
    }

    #[tokio::test]
    async fn test_module_registers_jobs_methods() {
        let module = server().module().unwrap();
        let names: Vec<&str> = module.method_names().collect();

        for method in [
            "jobs.push.v1",
            "jobs.push_batch.v1",
            "jobs.declare.v1",
            "jobs.destroy.v1",
            "jobs.pause.v1",
            "jobs.resume.v1",
            "jobs.list.v1",
            "jobs.reset.v1",
        ] {
            assert!(names.contains(&method), "missing {}", method);
        }
    }

    #[tokio::test]
    async fn test_declare_push_list_over_module() {
        let module = server().module().unwrap();

        let mut params = ObjectParams::new();
        params
            .insert("pipeline", json!({"name": "p1", "driver": "ephemeral"}))
            .unwrap();
        let declared: serde_json::Value = module.call("jobs.declare.v1", params).await.unwrap();
        assert_eq!(declared["pipeline"], "p1");

        let mut params = ObjectParams::new();
        params.insert("job", "send_mail").unwrap();
        params.insert("payload", "{}").unwrap();
        params.insert("options", json!({"pipeline": "p1"})).unwrap();
        let pushed: serde_json::Value = module.call("jobs.push.v1", params).await.unwrap();
        assert_eq!(pushed["id"], "job-1");

        let listed: serde_json::Value = module
            .call("jobs.list.v1", ArrayParams::new())
            .await
            .unwrap();
        assert_eq!(listed["pipelines"], json!(["p1"]));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_server() {
        let rpc = RpcServer {
            config: RpcServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            ..server()
        };
        let (addr, handle) = rpc.start().await.unwrap();
        assert_ne!(addr.port(), 0);

        assert!(shutdown(handle.clone(), Duration::from_secs(5)).await);
        // a second stop finds the server gone
        assert!(shutdown(handle, Duration::from_secs(1)).await);
    }
}
