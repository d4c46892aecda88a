use crate::error::PeerError;
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;
use url::Url;

/// Reduce a peer address to `host:port`.
///
/// Accepts `http://host:port` (trailing `/` allowed) and bare `host:port`. A
/// missing port falls back to 80. Peers are fetched over plain HTTP, so any
/// other scheme is rejected.
pub fn normalize_address(address: &str) -> Result<String, PeerError> {
    let invalid = |reason: &str| PeerError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty address"));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;

    if url.scheme() != "http" {
        return Err(invalid("scheme must be http"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("credentials are not allowed"));
    }
    if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("address must not carry a path, query or fragment"));
    }
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Err(invalid("missing host")),
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;
    Ok(format!("{host}:{port}"))
}

/// Known peers, kept sorted so every walk over them is deterministic.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    nodes: RwLock<BTreeSet<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and insert `address`. Returns whether it was new.
    pub fn register_node(&self, address: &str) -> Result<bool, PeerError> {
        let node = normalize_address(address)?;
        let inserted = self
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.clone());
        if inserted {
            info!(%node, "registered peer");
        }
        Ok(inserted)
    }

    /// Register a batch. Every address is normalized before any is inserted,
    /// so a malformed one leaves the registry unchanged. Returns how many were
    /// new.
    pub fn register_nodes<I, S>(&self, addresses: I) -> Result<usize, PeerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let batch = addresses
            .into_iter()
            .map(|address| normalize_address(address.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for node in batch {
            if nodes.insert(node.clone()) {
                info!(%node, "registered peer");
                added += 1;
            }
        }
        Ok(added)
    }

    /// Sorted snapshot of the registered peers.
    pub fn nodes(&self) -> Vec<String> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_forms() {
        for raw in [
            "http://192.168.0.5:5000",
            "http://192.168.0.5:5000/",
            "192.168.0.5:5000",
            "  192.168.0.5:5000 ",
        ] {
            assert_eq!(normalize_address(raw).unwrap(), "192.168.0.5:5000", "{raw}");
        }
        assert_eq!(normalize_address("http://Node-A.local").unwrap(), "node-a.local:80");
        assert_eq!(normalize_address("[::1]:7000").unwrap(), "[::1]:7000");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            "   ",
            "http://",
            "ftp://host:21",
            "https://peer.example",
            "http://user:pw@host:5000",
            "http://host:5000/chain",
            "host:5000?x=1",
            "http://host:5000#frag",
            "host:notaport",
            "http://host:99999",
        ] {
            assert!(
                matches!(normalize_address(raw), Err(PeerError::InvalidAddress { .. })),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn register_node_is_idempotent() {
        let registry = PeerRegistry::new();
        assert!(registry.register_node("http://127.0.0.1:5001").unwrap());
        assert!(!registry.register_node("http://127.0.0.1:5001").unwrap());
        assert!(!registry.register_node("127.0.0.1:5001").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn malformed_registration_leaves_registry_unchanged() {
        let registry = PeerRegistry::new();
        registry.register_node("127.0.0.1:5001").unwrap();
        assert!(registry.register_node("http://host/path").is_err());
        assert_eq!(registry.nodes(), vec!["127.0.0.1:5001".to_string()]);
    }

    #[test]
    fn nodes_are_sorted() {
        let registry = PeerRegistry::new();
        let added = registry
            .register_nodes(["10.0.0.3:5000", "10.0.0.1:5000", "10.0.0.2:5000", "10.0.0.1:5000"])
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(
            registry.nodes(),
            vec!["10.0.0.1:5000", "10.0.0.2:5000", "10.0.0.3:5000"]
        );
    }

    #[test]
    fn register_nodes_rejects_whole_batch_on_error() {
        let registry = PeerRegistry::new();
        registry.register_node("10.0.0.9:5000").unwrap();
        let err = registry
            .register_nodes(["10.0.0.1:5000", "bad host:1", "10.0.0.2:5000"])
            .unwrap_err();
        assert!(matches!(err, PeerError::InvalidAddress { .. }));
        assert_eq!(registry.nodes(), vec!["10.0.0.9:5000"]);
    }
}
