use reqwest::{Client, Method};

use domain::{
    DomainError, DomainErrorKind, DomainResult,
    models::{AssetResponse, FetchRequest},
    repositories::Network,
};

/// reqwestを使用するネットワーク
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> DomainResult<AssetResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| DomainError {
            kind: DomainErrorKind::Network,
            messages: vec![format!("{} is not a valid HTTP method", request.method).into()],
            source: e.into(),
        })?;
        let response = self
            .client
            .request(method, &request.url)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network_error)?;
        Ok(AssetResponse::new(status, headers, body.to_vec()))
    }
}

fn network_error(e: reqwest::Error) -> DomainError {
    DomainError {
        kind: DomainErrorKind::Network,
        messages: vec![e.to_string().into()],
        source: e.into(),
    }
}
