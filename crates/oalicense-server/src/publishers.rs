//! Built-in detector set for the server binary

use std::sync::Arc;

use oalicense_core::detectors::{build_client, DoiDereference, LicenseStatement, StatementMatcher};
use oalicense_core::{DetectionScope, DetectorRegistry, IdentifierType};

const PLOS_HOSTS: &[&str] = &[
    "journals.plos.org",
    "www.plosone.org",
    "www.plosbiology.org",
    "www.plosmedicine.org",
    "www.ploscompbiol.org",
    "www.plosgenetics.org",
    "www.plospathogens.org",
    "www.plosntds.org",
];

fn plos_statements() -> Vec<LicenseStatement> {
    vec![
        LicenseStatement::new(
            "This is an open-access article distributed under the terms of the Creative Commons Attribution License, which permits unrestricted use, distribution, and reproduction in any medium, provided the original author and source are credited.",
            "cc-by",
        )
        .with_open_access(true),
        LicenseStatement::new(
            "This is an open-access article, free of all copyright, and may be freely reproduced, distributed, transmitted, modified, built upon, or otherwise used by anyone for any lawful purpose. The work is made available under the Creative Commons CC0 public domain dedication.",
            "cc-zero",
        )
        .with_open_access(true),
        LicenseStatement::new(
            "This is an open-access article distributed under the terms of the free Open Government License, which permits unrestricted use, distribution and reproduction in any medium, provided the original author and source are credited.",
            "uk-ogl",
        )
        .with_open_access(true),
    ]
}

fn bmc_statements() -> Vec<LicenseStatement> {
    vec![LicenseStatement::new(
        "This is an Open Access article distributed under the terms of the Creative Commons Attribution License",
        "cc-by",
    )
    .with_open_access(true)]
}

/// DOI dereference for provider detection plus page-level statement matchers
pub fn default_registry() -> Result<DetectorRegistry, Box<dyn std::error::Error>> {
    let client = build_client()?;
    let mut registry = DetectorRegistry::new();
    registry.register_provider(
        IdentifierType::Doi,
        Arc::new(DoiDereference::with_client(client.clone())),
    );

    let plos = Arc::new(
        StatementMatcher::new("plos", plos_statements()).with_client(client.clone()),
    );
    for host in PLOS_HOSTS {
        registry.register_license(host, DetectionScope::Page, plos.clone())?;
    }

    let bmc = Arc::new(StatementMatcher::new("bmc", bmc_statements()).with_client(client));
    registry.register_license("www.biomedcentral.com", DetectionScope::Page, bmc)?;

    tracing::info!(
        "registered {} provider and {} license detectors",
        registry.provider_count(),
        registry.license_count()
    );
    Ok(registry)
}
