//! JSON-encoded read-write sets used as transaction results.

use serde::{Deserialize, Serialize};
use tokensdk_network::driver::RwSet;
use tokensdk_network::PlatformError;

/// One key write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvWrite {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NamespaceWrites {
    namespace: String,
    writes: Vec<KvWrite>,
}

/// Read-write set that keeps namespaces and writes in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRwSet {
    namespaces: Vec<NamespaceWrites>,
}

impl JsonRwSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RwSet::set_state`].
    pub fn with_write(mut self, namespace: &str, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.push(namespace, key, value.into());
        self
    }

    /// Decode transaction results; empty results are an empty set.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, PlatformError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(raw)
            .map_err(|e| PlatformError::Other(format!("malformed rwset: {e}")))
    }

    /// Encoded form, used as [`ProcessedTransaction::results`](tokensdk_network::types::ProcessedTransaction).
    pub fn encode(&self) -> Vec<u8> {
        // A struct of strings and byte vectors always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    fn push(&mut self, namespace: &str, key: &str, value: Vec<u8>) {
        let write = KvWrite {
            key: key.to_string(),
            value,
        };
        match self.namespaces.iter_mut().find(|ns| ns.namespace == namespace) {
            Some(ns) => match ns.writes.iter_mut().find(|w| w.key == key) {
                Some(existing) => *existing = write,
                None => ns.writes.push(write),
            },
            None => self.namespaces.push(NamespaceWrites {
                namespace: namespace.to_string(),
                writes: vec![write],
            }),
        }
    }

    fn writes(&self, namespace: &str) -> &[KvWrite] {
        self.namespaces
            .iter()
            .find(|ns| ns.namespace == namespace)
            .map_or(&[], |ns| ns.writes.as_slice())
    }
}

impl RwSet for JsonRwSet {
    fn namespaces(&self) -> Vec<String> {
        self.namespaces.iter().map(|ns| ns.namespace.clone()).collect()
    }

    fn num_writes(&self, namespace: &str) -> usize {
        self.writes(namespace).len()
    }

    fn write_at(&self, namespace: &str, index: usize) -> Result<(String, Vec<u8>), PlatformError> {
        self.writes(namespace)
            .get(index)
            .map(|w| (w.key.clone(), w.value.clone()))
            .ok_or_else(|| PlatformError::NotFound(format!("write {index} in namespace [{namespace}]")))
    }

    fn get_state(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        Ok(self
            .writes(namespace)
            .iter()
            .find(|w| w.key == key)
            .map(|w| w.value.clone()))
    }

    fn set_state(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), PlatformError> {
        self.push(namespace, key, value);
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, PlatformError> {
        serde_json::to_vec(self).map_err(|e| PlatformError::Other(e.to_string()))
    }

    fn done(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_keep_insertion_order() {
        let rws = JsonRwSet::new()
            .with_write("zkat", "b", b"2".to_vec())
            .with_write("other", "x", b"9".to_vec())
            .with_write("zkat", "a", b"1".to_vec());

        let decoded = JsonRwSet::from_bytes(&rws.encode()).unwrap();
        assert_eq!(decoded.namespaces(), vec!["zkat".to_string(), "other".to_string()]);
        assert_eq!(decoded.num_writes("zkat"), 2);
        assert_eq!(decoded.write_at("zkat", 0).unwrap(), ("b".to_string(), b"2".to_vec()));
        assert_eq!(decoded.write_at("zkat", 1).unwrap(), ("a".to_string(), b"1".to_vec()));
        assert!(decoded.write_at("zkat", 2).is_err());
    }

    #[test]
    fn test_set_state_overwrites() {
        let mut rws = JsonRwSet::new().with_write("zkat", "k", b"old".to_vec());
        rws.set_state("zkat", "k", b"new".to_vec()).unwrap();
        assert_eq!(rws.num_writes("zkat"), 1);
        assert_eq!(rws.get_state("zkat", "k").unwrap(), Some(b"new".to_vec()));
        assert_eq!(rws.get_state("zkat", "missing").unwrap(), None);
    }

    #[test]
    fn test_empty_results_decode_to_empty_set() {
        assert!(JsonRwSet::from_bytes(&[]).unwrap().namespaces().is_empty());
        assert!(JsonRwSet::from_bytes(b"not json").is_err());
    }
}
