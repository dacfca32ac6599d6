//! Pure data types shared by the discovery engine and the node tree: no I/O,
//! no async, nothing that would pull Kubernetes-client dependencies into
//! this crate.

use std::collections::BTreeMap;

/// A single discovered API resource, frozen after startup discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// `""` denotes the core group.
    pub group: String,
    pub api_version: String,
    pub kind: String,
    pub plural_name: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ResourceDescriptor {
    pub fn supports(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb)
    }
}

/// The two tables built once by discovery and frozen for process lifetime:
/// group → (kind → descriptor), one for namespaced resources and one for
/// cluster-scoped ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryTables {
    pub namespaced: BTreeMap<String, BTreeMap<String, ResourceDescriptor>>,
    pub global: BTreeMap<String, BTreeMap<String, ResourceDescriptor>>,
}

impl DiscoveryTables {
    pub fn for_scope(&self, namespaced: bool) -> &BTreeMap<String, BTreeMap<String, ResourceDescriptor>> {
        if namespaced { &self.namespaced } else { &self.global }
    }
}

/// Partial stat overlay a node may contribute; the adapter fills in
/// defaults for anything left `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_size: Option<u64>,
    pub st_ctime: Option<i64>,
    pub st_mtime: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(group: &str, kind: &str, namespaced: bool) -> ResourceDescriptor {
        ResourceDescriptor {
            group: group.to_string(),
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            plural_name: format!("{}s", kind.to_lowercase()),
            namespaced,
            verbs: vec!["get".to_string(), "list".to_string()],
        }
    }

    #[test]
    fn supports_checks_verb_membership() {
        let d = descriptor("batch", "Job", true);
        assert!(d.supports("get"));
        assert!(d.supports("list"));
        assert!(!d.supports("watch"));
    }

    #[test]
    fn for_scope_selects_correct_table() {
        let mut tables = DiscoveryTables::default();
        tables
            .namespaced
            .entry("apps".to_string())
            .or_default()
            .insert("Deployment".to_string(), descriptor("apps", "Deployment", true));
        tables
            .global
            .entry("".to_string())
            .or_default()
            .insert("Namespace".to_string(), descriptor("", "Namespace", false));

        assert!(tables.for_scope(true).contains_key("apps"));
        assert!(tables.for_scope(false).contains_key(""));
    }
}
