//! Calls to a microservice's introspection and liveness paths.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;

use crate::identity::ServiceTokenIssuer;
use crate::model::{Microservice, MicroserviceInfo};
use crate::registry::RegistryError;

pub struct InfoClient {
    client: reqwest::Client,
    timeout: Duration,
    tokens: Arc<ServiceTokenIssuer>,
}

impl InfoClient {
    pub fn new(client: reqwest::Client, timeout: Duration, tokens: Arc<ServiceTokenIssuer>) -> Self {
        Self {
            client,
            timeout,
            tokens,
        }
    }

    /// Fetch the `pathInfo` contract, authenticated as a service.
    ///
    /// The minted token is kept on `microservice`.
    pub async fn fetch(
        &self,
        microservice: &mut Microservice,
    ) -> Result<MicroserviceInfo, RegistryError> {
        let url = join(&microservice.url, &microservice.path_info);
        let token = self
            .tokens
            .mint()
            .map_err(|e| RegistryError::InfoFetch(e.to_string()))?;
        microservice.token = Some(token.clone());

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RegistryError::InfoFetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::InfoFetch(format!("{url}: status {status}")));
        }

        response
            .json::<MicroserviceInfo>()
            .await
            .map_err(|e| RegistryError::InvalidInfo(format!("{url}: {e}")))
    }

    /// Probe `pathLive`; any 2xx is alive.
    pub async fn ping(&self, microservice: &Microservice) -> Result<(), String> {
        let url = join(&microservice.url, &microservice.path_live);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("status {}", response.status())),
            Err(e) if e.is_timeout() => Err("timeout".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
