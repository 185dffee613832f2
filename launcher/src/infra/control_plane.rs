//! Control plane client: implements `ControlPlane` over gRPC with `tonic`.
//!
//! The messages and client stub for `PipedService` are generated from
//! `proto/pipedservice.proto` and checked in under `generated/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::application::ports::ControlPlane;
use crate::application::services::desired_state::DESIRED_VERSION_TIMEOUT;
use crate::domain::ControlPlaneEndpoint;

#[path = "generated/pipedservice.rs"]
#[allow(clippy::all, clippy::pedantic)]
mod pipedservice;

pub use pipedservice::piped_service_client::PipedServiceClient;
pub use pipedservice::{GetDesiredVersionRequest, GetDesiredVersionResponse};

/// gRPC client that keeps one channel while the endpoint stays the same.
#[derive(Debug)]
pub struct GrpcControlPlane {
    insecure: bool,
    cert_file: Option<PathBuf>,
    channel: Mutex<Option<(ControlPlaneEndpoint, Channel)>>,
}

impl GrpcControlPlane {
    /// TLS with the system roots unless `insecure`; `cert_file` replaces the
    /// roots with a custom CA.
    #[must_use]
    pub fn new(insecure: bool, cert_file: Option<PathBuf>) -> Self {
        Self {
            insecure,
            cert_file,
            channel: Mutex::new(None),
        }
    }

    async fn connect(&self, endpoint: &ControlPlaneEndpoint) -> Result<Channel> {
        let scheme = if self.insecure { "http" } else { "https" };
        let mut target = Endpoint::from_shared(format!("{scheme}://{}", endpoint.address))
            .with_context(|| format!("invalid control plane address {}", endpoint.address))?
            .connect_timeout(DESIRED_VERSION_TIMEOUT);

        if !self.insecure {
            let tls = match &self.cert_file {
                Some(path) => {
                    let pem = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("reading TLS certificate {}", path.display()))?;
                    ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem))
                }
                None => ClientTlsConfig::new().with_native_roots(),
            };
            target = target.tls_config(tls).context("configuring TLS")?;
        }

        target
            .connect()
            .await
            .with_context(|| format!("failed to connect to control plane {}", endpoint.address))
    }

    async fn channel_for(&self, endpoint: &ControlPlaneEndpoint) -> Result<Channel> {
        let mut slot = self.channel.lock().await;
        if let Some((key, channel)) = slot.as_ref()
            && key == endpoint
        {
            return Ok(channel.clone());
        }
        tracing::info!(address = %endpoint.address, "creating control plane client");
        let channel = self.connect(endpoint).await?;
        *slot = Some((endpoint.clone(), channel.clone()));
        Ok(channel)
    }
}

impl ControlPlane for GrpcControlPlane {
    async fn desired_version(&self, endpoint: &ControlPlaneEndpoint) -> Result<String> {
        let channel = self.channel_for(endpoint).await?;
        let mut client = PipedServiceClient::new(channel);

        let mut request = tonic::Request::new(GetDesiredVersionRequest {});
        let token: MetadataValue<_> = format!("PIPED-TOKEN {}", endpoint.token())
            .parse()
            .context("piped token is not valid metadata")?;
        request.metadata_mut().insert("authorization", token);

        let response = client
            .get_desired_version(request)
            .await
            .context("GetDesiredVersion failed")?;
        Ok(response.into_inner().version)
    }
}
