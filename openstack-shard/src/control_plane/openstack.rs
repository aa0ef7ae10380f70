//! OpenStack REST client.
//!
//! Identity v3 (password auth, project scope), Networking v2.0,
//! Block Storage v3 and Compute v2.1.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::{
    ControlPlane, CreateNetwork, CreateRouter, CreateSecurityGroup, CreateSecurityGroupRule,
    CreateServer, CreateSubnet, CreateVolume, NetworkSnapshot, RouterSnapshot,
    SecurityGroupRuleSnapshot, SecurityGroupSnapshot, ServerSnapshot, SubnetSnapshot,
    VolumeSnapshot,
};
use crate::config::OpenStackConfig;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Base URLs of the services we talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub compute: String,
    pub network: String,
    pub volume: String,
}

pub struct OpenStackClient {
    client: Client,
    token: String,
    endpoints: ServiceEndpoints,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    network: NetworkSnapshot,
}

#[derive(Debug, Deserialize)]
struct SubnetEnvelope {
    subnet: SubnetSnapshot,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupEnvelope {
    security_group: SecurityGroupSnapshot,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupRuleEnvelope {
    security_group_rule: SecurityGroupRuleSnapshot,
}

#[derive(Debug, Deserialize)]
struct VolumeEnvelope {
    volume: VolumeSnapshot,
}

#[derive(Debug, Deserialize)]
struct RouterEnvelope {
    router: RouterSnapshot,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ServerSnapshot,
}

#[derive(Debug, Serialize)]
struct RouterInterfaceRequest<'a> {
    subnet_id: &'a str,
}

fn build_http_client(verify_ssl: bool) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(!verify_ssl)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Pick the public URL of a service type from the token catalog.
fn catalog_url(catalog: &[CatalogEntry], service_types: &[&str]) -> Option<String> {
    service_types.iter().find_map(|wanted| {
        catalog
            .iter()
            .filter(|entry| entry.service_type == *wanted)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|endpoint| endpoint.interface == "public")
            .map(|endpoint| endpoint.url.clone())
    })
}

fn describe_status(status: StatusCode, body: &str) -> String {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("authentication failed ({}): {}", status, body)
        }
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS => {
            format!("quota or rate limit exceeded ({}): {}", status, body)
        }
        _ => format!("({}): {}", status, body),
    }
}

impl OpenStackClient {
    /// Authenticate with a project-scoped password token and resolve service endpoints.
    pub async fn connect(config: &OpenStackConfig) -> Result<Self> {
        let client = build_http_client(config.verify_ssl)?;
        let url = join_url(&config.endpoint, "/auth/tokens");

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": config.username,
                            "domain": { "name": config.domain },
                            "password": config.password,
                        }
                    }
                },
                "scope": {
                    "project": { "id": config.project_id }
                }
            }
        });

        tracing::debug!(
            endpoint = %config.endpoint,
            username = %config.username,
            "Requesting token"
        );
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed POST {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Token request {}", describe_status(status, &body));
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("Token response did not include X-Subject-Token")?;

        let parsed: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        let catalog = parsed.token.catalog;

        let resolve = |explicit: &Option<String>, types: &[&str]| -> Result<String> {
            explicit
                .clone()
                .or_else(|| catalog_url(&catalog, types))
                .with_context(|| format!("No public {} endpoint in service catalog", types[0]))
        };

        let endpoints = ServiceEndpoints {
            compute: resolve(&config.compute_endpoint, &["compute"])?,
            network: resolve(&config.network_endpoint, &["network"])?,
            volume: resolve(&config.volume_endpoint, &["volumev3", "block-storage"])?,
        };

        tracing::info!(
            compute = %endpoints.compute,
            network = %endpoints.network,
            volume = %endpoints.volume,
            "OpenStack client authenticated"
        );

        Ok(Self {
            client,
            token,
            endpoints,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_token(
        token: String,
        endpoints: ServiceEndpoints,
        verify_ssl: bool,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(verify_ssl)?,
            token,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        base: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = join_url(base, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTH_TOKEN_HEADER, &self.token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed {} {}", method, path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} {} failed {}", method, path, describe_status(status, &body));
        }

        Ok(response)
    }

    async fn api_get<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T> {
        let response = self
            .send::<serde_json::Value>(Method::GET, base, path, None)
            .await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse GET {} response", path))
    }

    async fn api_post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::POST, base, path, Some(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse POST {} response", path))
    }

    async fn api_put<B: Serialize + ?Sized>(&self, base: &str, path: &str, body: &B) -> Result<()> {
        self.send(Method::PUT, base, path, Some(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for OpenStackClient {
    async fn create_network(&self, req: &CreateNetwork) -> Result<NetworkSnapshot> {
        let envelope: NetworkEnvelope = self
            .api_post(&self.endpoints.network, "/v2.0/networks", &json!({ "network": req }))
            .await?;
        Ok(envelope.network)
    }

    async fn get_network(&self, id: &str) -> Result<NetworkSnapshot> {
        let envelope: NetworkEnvelope = self
            .api_get(&self.endpoints.network, &format!("/v2.0/networks/{}", id))
            .await?;
        Ok(envelope.network)
    }

    async fn create_subnet(&self, req: &CreateSubnet) -> Result<SubnetSnapshot> {
        let envelope: SubnetEnvelope = self
            .api_post(&self.endpoints.network, "/v2.0/subnets", &json!({ "subnet": req }))
            .await?;
        Ok(envelope.subnet)
    }

    async fn create_security_group(
        &self,
        req: &CreateSecurityGroup,
    ) -> Result<SecurityGroupSnapshot> {
        let envelope: SecurityGroupEnvelope = self
            .api_post(
                &self.endpoints.network,
                "/v2.0/security-groups",
                &json!({ "security_group": req }),
            )
            .await?;
        Ok(envelope.security_group)
    }

    async fn create_security_group_rule(
        &self,
        req: &CreateSecurityGroupRule,
    ) -> Result<SecurityGroupRuleSnapshot> {
        let envelope: SecurityGroupRuleEnvelope = self
            .api_post(
                &self.endpoints.network,
                "/v2.0/security-group-rules",
                &json!({ "security_group_rule": req }),
            )
            .await?;
        Ok(envelope.security_group_rule)
    }

    async fn create_volume(&self, req: &CreateVolume) -> Result<VolumeSnapshot> {
        let envelope: VolumeEnvelope = self
            .api_post(&self.endpoints.volume, "/volumes", &json!({ "volume": req }))
            .await?;
        Ok(envelope.volume)
    }

    async fn get_volume(&self, id: &str) -> Result<VolumeSnapshot> {
        let envelope: VolumeEnvelope = self
            .api_get(&self.endpoints.volume, &format!("/volumes/{}", id))
            .await?;
        Ok(envelope.volume)
    }

    async fn create_router(&self, req: &CreateRouter) -> Result<RouterSnapshot> {
        let envelope: RouterEnvelope = self
            .api_post(&self.endpoints.network, "/v2.0/routers", &json!({ "router": req }))
            .await?;
        Ok(envelope.router)
    }

    async fn attach_router_subnet(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.api_put(
            &self.endpoints.network,
            &format!("/v2.0/routers/{}/add_router_interface", router_id),
            &RouterInterfaceRequest { subnet_id },
        )
        .await
    }

    async fn create_server(&self, req: &CreateServer) -> Result<ServerSnapshot> {
        let envelope: ServerEnvelope = self
            .api_post(&self.endpoints.compute, "/servers", &json!({ "server": req }))
            .await?;
        // The create response carries only the id; status starts at BUILD.
        let mut server = envelope.server;
        if server.name.is_empty() {
            server.name = req.name.clone();
        }
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<ServerSnapshot> {
        let envelope: ServerEnvelope = self
            .api_get(&self.endpoints.compute, &format!("/servers/{}", id))
            .await?;
        Ok(envelope.server)
    }
}

#[cfg(test)]
#[path = "openstack_tests.rs"]
mod openstack_tests;
