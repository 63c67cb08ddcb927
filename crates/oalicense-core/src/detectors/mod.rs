//! Reference detectors
//!
//! - [`DoiDereference`] finds the provider of a DOI by following the
//!   `doi.org` redirect chain (feature `native`).
//! - [`StatementMatcher`] recognises a license by searching a provider page
//!   for known license statements. Matching is always available; fetching
//!   the page needs the `native` feature.

#[cfg(feature = "native")]
mod doi;
mod statement;

#[cfg(feature = "native")]
pub use doi::DoiDereference;
pub use statement::{match_statement, normalise_text, LicenseStatement, StatementMatcher};

/// Agent string recorded in provenance and sent as the HTTP user agent
pub const AGENT: &str = concat!("oalicense/", env!("CARGO_PKG_VERSION"));

#[cfg(feature = "native")]
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, crate::error::DetectorFault> {
    use crate::error::DetectorFault;

    let http = |reason: String| DetectorFault::Http {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(http(format!("status {}", status.as_u16())));
    }

    response.text().await.map_err(|e| http(e.to_string()))
}

/// HTTP client shared by the detectors: 30 s timeout, [`AGENT`] as user agent
#[cfg(feature = "native")]
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(AGENT)
        .build()
}
