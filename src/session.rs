//! LDAP ping sessions.
//!
//! A [`ProbeSession`] is one persistent, unauthenticated connection to a
//! directory server. Workers own their session exclusively and drive it
//! through [`ProbeSession::probe`]; the [`SessionFactory`] seam lets tests
//! substitute the network with an in-process stub.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, ResultEntry, Scope, SearchEntry, SearchResult};

/// Transport mode for directory connections.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TlsMode {
    /// Plain TCP, no encryption
    NoTls,
    /// Plain connect, then upgrade in-band
    StartTls,
    /// TLS from the first byte
    Tls,
}

/// Attribute carrying the NetLogon response blob.
const NETLOGON_ATTR: &str = "Netlogon";

/// noSuchObject; the server has nothing to say, not a failure.
const RC_NO_SUCH_OBJECT: u32 = 32;
/// sizeLimitExceeded; benign for a single-entry ping.
const RC_SIZE_LIMIT: u32 = 4;

/// Two leading bytes of a LOGON_SAM_LOGON_RESPONSE_EX payload, the opcode
/// signalling that the named account exists.
pub fn is_hit(payload: &[u8]) -> bool {
    payload.len() > 2 && payload[0] == 0x17 && payload[1] == 0x00
}

/// NetLogon ping filter, optionally binding a candidate account name.
///
/// The NtVer/AAC values are the LDAP-escaped little-endian constants the
/// directory expects; the candidate is embedded verbatim, which is why the
/// feeder refuses names containing filter metacharacters.
pub fn ping_filter(candidate: Option<&str>) -> String {
    match candidate {
        Some(name) => {
            format!("(&(NtVer=\\06\\00\\00\\00)(AAC=\\10\\00\\00\\00)(User={name}))")
        }
        None => "(&(NtVer=\\06\\00\\00\\00)(AAC=\\10\\00\\00\\00))".to_string(),
    }
}

#[async_trait]
pub trait ProbeSession: Send {
    /// Issue one ping. `Ok(None)` means the server answered without a
    /// payload; `Err` is a per-probe failure the caller logs and skips.
    async fn probe(&mut self, candidate: Option<&str>) -> Result<Option<Vec<u8>>>;

    /// Tear the connection down. Errors during teardown are ignored.
    async fn close(&mut self);
}

#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    async fn connect(&self, server: &str) -> Result<Box<dyn ProbeSession>>;
}

/// Factory producing real LDAP sessions.
pub struct LdapSessionFactory {
    port: u16,
    tls_mode: TlsMode,
    ignore_cert: bool,
}

impl LdapSessionFactory {
    pub fn new(port: u16, tls_mode: TlsMode, ignore_cert: bool) -> Self {
        Self {
            port,
            tls_mode,
            ignore_cert,
        }
    }

    /// Open a raw handle, used by the root DSE dump alongside the pipeline.
    pub async fn open(&self, server: &str) -> Result<Ldap> {
        let (scheme, settings) = match self.tls_mode {
            TlsMode::NoTls => ("ldap", LdapConnSettings::new()),
            TlsMode::StartTls => ("ldap", LdapConnSettings::new().set_starttls(true)),
            TlsMode::Tls => (
                "ldaps",
                LdapConnSettings::new().set_no_tls_verify(self.ignore_cert),
            ),
        };
        let url = format!("{scheme}://{server}:{}", self.port);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        ldap3::drive!(conn);
        Ok(ldap)
    }
}

#[async_trait]
impl SessionFactory for LdapSessionFactory {
    async fn connect(&self, server: &str) -> Result<Box<dyn ProbeSession>> {
        let ldap = self.open(server).await?;
        Ok(Box::new(LdapProbeSession { ldap }))
    }
}

pub struct LdapProbeSession {
    ldap: Ldap,
}

#[async_trait]
impl ProbeSession for LdapProbeSession {
    async fn probe(&mut self, candidate: Option<&str>) -> Result<Option<Vec<u8>>> {
        let filter = ping_filter(candidate);
        let SearchResult(entries, res) = self
            .ldap
            .search("", Scope::Base, &filter, vec![NETLOGON_ATTR])
            .await?;
        match res.rc {
            0 => {}
            RC_NO_SUCH_OBJECT | RC_SIZE_LIMIT => return Ok(None),
            rc => bail!("search returned result code {rc}"),
        }
        Ok(entries.into_iter().next().and_then(first_payload))
    }

    async fn close(&mut self) {
        let _ = self.ldap.unbind().await;
    }
}

/// Pull the first attribute value out of an entry as raw bytes. The blob is
/// usually binary, but short responses can decode as UTF-8 and land in the
/// string map instead.
fn first_payload(entry: ResultEntry) -> Option<Vec<u8>> {
    let entry = SearchEntry::construct(entry);
    if let Some(values) = entry.bin_attrs.into_values().next() {
        return values.into_iter().next();
    }
    entry
        .attrs
        .into_values()
        .next()
        .and_then(|values| values.into_iter().next().map(String::into_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_requires_marker_and_length() {
        assert!(is_hit(&[0x17, 0x00, 0x01]));
        assert!(is_hit(&[0x17, 0x00, 0xff, 0xfe]));
        assert!(!is_hit(&[0x17, 0x00])); // too short
        assert!(!is_hit(&[0x00, 0x17, 0x01])); // wrong marker
        assert!(!is_hit(&[]));
        assert!(!is_hit(&[0x17, 0x01, 0x02]));
    }

    #[test]
    fn filter_embeds_candidate() {
        let f = ping_filter(Some("alice"));
        assert!(f.contains("(User=alice)"));
        assert!(f.starts_with("(&(NtVer="));
    }

    #[test]
    fn bare_filter_has_no_user_clause() {
        assert!(!ping_filter(None).contains("User="));
    }
}
