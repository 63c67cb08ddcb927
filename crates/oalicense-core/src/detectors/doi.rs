//! Provider detection by DOI dereference

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::DetectorFault;
use crate::identifier::IdentifierType;
use crate::record::{CacheEntry, Provider};
use crate::registry::Detector;

/// Follows `https://doi.org/<doi>` to the landing page and reports it as the provider
pub struct DoiDereference {
    client: Client,
}

impl DoiDereference {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(super::build_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Detector for DoiDereference {
    type Output = Provider;

    fn name(&self) -> &str {
        "doi_dereference"
    }

    async fn detect(&self, entry: &CacheEntry) -> Result<Option<Provider>, DetectorFault> {
        let identifier = &entry.identifier;
        if identifier.identifier_type != IdentifierType::Doi {
            return Ok(None);
        }
        let Some(resolvable) = identifier.resolver_url() else {
            return Ok(None);
        };

        // reqwest follows the 30x chain; the final URL is the landing page
        let response = self
            .client
            .get(&resolvable)
            .send()
            .await
            .map_err(|e| DetectorFault::Http {
                url: resolvable.clone(),
                reason: e.to_string(),
            })?;

        provider_for(
            &identifier.canonical,
            &resolvable,
            response.status(),
            response.url().as_str(),
        )
    }
}

/// Interpret the end of the redirect chain
///
/// 404 means the DOI is not registered, which is "no provider". Any other
/// failing status is a fault.
fn provider_for(
    canonical: &str,
    resolvable: &str,
    status: StatusCode,
    landing: &str,
) -> Result<Option<Provider>, DetectorFault> {
    if status == StatusCode::NOT_FOUND {
        tracing::debug!("{} is not registered ({})", canonical, landing);
        return Ok(None);
    }
    if !status.is_success() {
        return Err(DetectorFault::Http {
            url: landing.to_string(),
            reason: format!("status {}", status.as_u16()),
        });
    }

    tracing::debug!("{} dereferences to {}", canonical, landing);
    let mut provider = Provider {
        url: Vec::new(),
        doi: Some(canonical.to_string()),
    };
    if landing != resolvable {
        provider.url.push(landing.to_string());
    }
    Ok(Some(provider))
}
