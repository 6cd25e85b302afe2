//! Root DSE capability dump.
//!
//! Asks the server which root-level attributes it claims to support and
//! fetches each one; servers that don't advertise a list get probed with a
//! fixed set of well-known names instead.

use std::collections::BTreeMap;

use ldap3::{Ldap, Scope, SearchEntry, SearchResult};

/// Well-known root DSE attributes, probed when the server doesn't expose
/// msDS-SupportedRootDSEAttributes.
pub const FALLBACK_ATTRS: &[&str] = &[
    "configurationNamingContext",
    "currentTime",
    "defaultNamingContext",
    "dNSHostName",
    "dsSchemaAttrCount",
    "dsSchemaClassCount",
    "dsSchemaPrefixCount",
    "dsServiceName",
    "highestCommittedUSN",
    "isGlobalCatalogReady",
    "isSynchronized",
    "ldapServiceName",
    "namingContexts",
    "netlogon",
    "pendingPropagations",
    "rootDomainNamingContext",
    "schemaNamingContext",
    "serverName",
    "subschemaSubentry",
    "supportedCapabilities",
    "supportedControl",
    "supportedLDAPPolicies",
    "supportedLDAPVersion",
    "supportedSASLMechanisms",
    "domainControllerFunctionality",
    "domainFunctionality",
    "forestFunctionality",
    "msDS-ReplAllInboundNeighbors",
    "msDS-ReplAllOutboundNeighbors",
    "msDS-ReplConnectionFailures",
    "msDS-ReplLinkFailures",
    "msDS-ReplPendingOps",
    "msDS-ReplQueueStatistics",
    "msDS-TopQuotaUsage",
    "supportedConfigurableSettings",
    "supportedExtension",
    "validFSMOs",
    "dsaVersionString",
    "msDS-PortLDAP",
    "msDS-PortSSL",
    "msDS-PrincipalName",
    "serviceAccountInfo",
    "spnRegistrationResult",
    "tokenGroups",
    "usnAtRifm",
    "approximateHighestInternalObjectID",
    "databaseGuid",
    "schemaIndexUpdateState",
    "dumpLdapNotifications",
    "msDS-ProcessLinksOperations",
    "msDS-SegmentCacheInfo",
    "msDS-ThreadStates",
    "ConfigurableSettingsEffective",
    "LDAPPoliciesEffective",
    "msDS-ArenaInfo",
    "msDS-Anchor",
    "msDS-PrefixTable",
    "msDS-SupportedRootDSEAttributes",
    "msDS-SupportedRootDSEModifications",
];

/// Attribute names to fetch: the advertised list when usable, the
/// well-known fallback otherwise.
pub fn probe_list(advertised: Vec<String>) -> Vec<String> {
    if advertised.is_empty() {
        FALLBACK_ATTRS.iter().map(|s| s.to_string()).collect()
    } else {
        advertised
    }
}

/// Dump every reachable root DSE attribute as name → values.
pub async fn dump_root_dse(ldap: &mut Ldap) -> BTreeMap<String, Vec<String>> {
    let advertised = fetch_attribute(ldap, "msDS-SupportedRootDSEAttributes").await;
    let mut result = BTreeMap::new();
    for attribute in probe_list(advertised) {
        let values = fetch_attribute(ldap, &attribute).await;
        result.insert(attribute, values);
    }
    result
}

/// One scoped base query for a single attribute. A failed query or an
/// unexpected response shape yields no values.
async fn fetch_attribute(ldap: &mut Ldap, attribute: &str) -> Vec<String> {
    let response = ldap
        .search("", Scope::Base, "(objectClass=*)", vec![attribute])
        .await;
    let Ok(SearchResult(mut entries, _)) = response else {
        return Vec::new();
    };
    if entries.len() != 1 {
        return Vec::new();
    }
    let entry = SearchEntry::construct(entries.remove(0));
    if entry.attrs.len() != 1 {
        return Vec::new();
    }
    entry.attrs.into_values().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_advertised_list_falls_back_to_well_known_names() {
        let list = probe_list(Vec::new());
        assert_eq!(list.len(), FALLBACK_ATTRS.len());
        assert!(list.iter().any(|a| a == "supportedCapabilities"));
    }

    #[test]
    fn advertised_list_is_used_verbatim() {
        let advertised = vec!["currentTime".to_string(), "serverName".to_string()];
        assert_eq!(probe_list(advertised.clone()), advertised);
    }
}
