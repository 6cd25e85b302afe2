//! Domain and controller auto-detection.

use std::env;

use anyhow::{Context, Result};
use tracing::info;
use trust_dns_resolver::TokioAsyncResolver;

/// DNS suffix to probe for, in order: the `USERDNSDOMAIN` environment
/// variable, then the local machine's FQDN with its first label stripped.
pub fn detect_domain() -> Option<String> {
    if let Ok(domain) = env::var("USERDNSDOMAIN") {
        if !domain.is_empty() {
            return Some(domain.to_lowercase());
        }
    }
    let host = hostname::get().ok()?.into_string().ok()?;
    let (_, domain) = host.split_once('.')?;
    if domain.is_empty() {
        return None;
    }
    info!("no USERDNSDOMAIN set, using the machine FQDN as basis");
    Some(domain.to_lowercase())
}

/// Resolve the domain controllers advertised for `domain` via the
/// `_ldap._tcp.dc._msdcs` service records.
pub async fn lookup_controllers(domain: &str) -> Result<Vec<String>> {
    let resolver =
        TokioAsyncResolver::tokio_from_system_conf().context("building DNS resolver")?;
    let records = resolver
        .srv_lookup(format!("_ldap._tcp.dc._msdcs.{domain}"))
        .await
        .with_context(|| format!("SRV lookup of domain controllers for {domain}"))?;
    Ok(records
        .iter()
        .map(|srv| srv.target().to_utf8().trim_end_matches('.').to_string())
        .collect())
}
