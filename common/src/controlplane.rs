use crate::{Error, Result, facade::GatewayType, get_client_name};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::*;

pub static GATEWAYS_SPECS_API: &str = "/api/v3/gateways/specs";

/// Body of the gateway registration endpoint
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_type: Option<String>,
    pub allow_virtual_hosts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl GatewayDeclaration {
    pub fn register(name: &str, gateway_type: GatewayType, allow_virtual_hosts: Option<bool>) -> Self {
        Self {
            name: name.to_string(),
            gateway_type: Some(gateway_type.to_string()),
            allow_virtual_hosts,
            exists: None,
        }
    }

    pub fn drop(name: &str) -> Self {
        Self {
            name: name.to_string(),
            gateway_type: None,
            allow_virtual_hosts: None,
            exists: None,
        }
    }
}

/// The external service routing traffic through the gateways
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn register_gateway(&self, declaration: &GatewayDeclaration) -> Result<()>;
    async fn drop_gateway(&self, name: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct ControlPlaneClient {
    baseurl: String,
    client: Client,
}

impl ControlPlaneClient {
    pub fn new(baseurl: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(get_client_name())
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::ControlPlaneRequest("could not build control-plane client".to_string(), e))?;
        Ok(Self {
            baseurl: baseurl.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn send(&self, method: Method, declaration: &GatewayDeclaration) -> Result<(StatusCode, String)> {
        let url = format!("{}{GATEWAYS_SPECS_API}", self.baseurl);
        debug!("{method} {url} {declaration:?}");
        let response = self
            .client
            .request(method.clone(), &url)
            .json(declaration)
            .send()
            .await
            .map_err(|e| {
                Error::ControlPlaneRequest(
                    format!("{method} request to control-plane {GATEWAYS_SPECS_API} failed with error"),
                    e,
                )
            })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn register_gateway(&self, declaration: &GatewayDeclaration) -> Result<()> {
        info!("Sending gateway registration request to control-plane {declaration:?}");
        let (status, text) = self.send(Method::POST, declaration).await?;
        if status != StatusCode::OK {
            return Err(Error::ControlPlane(format!(
                "gateway registration request got {} error from control-plane with message '{text}'",
                status.as_u16()
            )));
        }
        info!("Gateway {} successfully registered", declaration.name);
        Ok(())
    }

    async fn drop_gateway(&self, name: &str) -> Result<()> {
        info!("Sending gateway {name} drop request to control-plane");
        let (status, text) = self.send(Method::DELETE, &GatewayDeclaration::drop(name)).await?;
        if status == StatusCode::BAD_REQUEST {
            info!("Gateway {name} will not be dropped in control-plane because it still has associated entities");
            return Ok(());
        }
        if status != StatusCode::OK {
            return Err(Error::ControlPlane(format!(
                "gateway drop request got {} error from control-plane with message '{text}'",
                status.as_u16()
            )));
        }
        info!("Gateway {name} dropped successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CONTROL_PLANE_ERROR;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Serve a single request with `status`, handing back the raw request
    async fn control_plane_answering(status: u16) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let reply = format!("HTTP/1.1 {status} Stub\r\ncontent-length: 4\r\nconnection: close\r\n\r\nnope");
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, server)
    }

    #[test]
    fn test_register_body() {
        let body = GatewayDeclaration::register("composite1", GatewayType::Mesh, None);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"name": "composite1", "gatewayType": "mesh", "allowVirtualHosts": null})
        );
    }

    #[test]
    fn test_drop_body() {
        assert_eq!(
            serde_json::to_value(GatewayDeclaration::drop("gw")).unwrap(),
            serde_json::json!({"name": "gw", "allowVirtualHosts": null})
        );
    }

    #[test]
    fn test_baseurl_is_normalized() {
        let client = ControlPlaneClient::new("http://control-plane:8080/").unwrap();
        assert_eq!(client.baseurl, "http://control-plane:8080");
    }

    #[tokio::test]
    async fn test_unreachable_control_plane_is_a_coded_error() {
        let client = ControlPlaneClient::new("http://127.0.0.1:1").unwrap();
        let err = client.drop_gateway("gw").await.unwrap_err();
        assert_eq!(err.code(), Some(CONTROL_PLANE_ERROR));
    }

    #[tokio::test]
    async fn test_register_accepts_ok() {
        let (url, server) = control_plane_answering(200).await;
        let client = ControlPlaneClient::new(&url).unwrap();
        let declaration = GatewayDeclaration::register("composite1", GatewayType::Mesh, Some(true));
        client.register_gateway(&declaration).await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v3/gateways/specs "));
        assert!(request.contains(r#""name":"composite1""#));
    }

    #[tokio::test]
    async fn test_register_failure_is_a_coded_error() {
        let (url, server) = control_plane_answering(500).await;
        let client = ControlPlaneClient::new(&url).unwrap();
        let declaration = GatewayDeclaration::register("composite1", GatewayType::Mesh, None);
        let err = client.register_gateway(&declaration).await.unwrap_err();
        assert_eq!(err.code(), Some(CONTROL_PLANE_ERROR));
        assert!(err.to_string().contains("500"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_tolerates_bad_request() {
        let (url, server) = control_plane_answering(400).await;
        let client = ControlPlaneClient::new(&url).unwrap();
        client.drop_gateway("gw").await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /api/v3/gateways/specs "));
        assert!(request.contains(r#""name":"gw""#));
    }

    #[tokio::test]
    async fn test_drop_accepts_ok() {
        let (url, server) = control_plane_answering(200).await;
        let client = ControlPlaneClient::new(&url).unwrap();
        client.drop_gateway("gw").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_failure_is_a_coded_error() {
        let (url, server) = control_plane_answering(500).await;
        let client = ControlPlaneClient::new(&url).unwrap();
        let err = client.drop_gateway("gw").await.unwrap_err();
        assert_eq!(err.code(), Some(CONTROL_PLANE_ERROR));
        server.await.unwrap();
    }
}
