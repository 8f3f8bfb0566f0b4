use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One node as reported by `getClusterNodes`.
///
/// Only `gossip` and `pubkey` are used by the probe and the report; the rest is
/// carried through untouched, including fields this struct does not name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    pub pubkey: String,
    pub gossip: Option<String>,
    pub feature_set: Option<u64>,
    pub rpc: Option<String>,
    pub shred_version: Option<u64>,
    pub tpu: Option<String>,
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClusterNode {
    pub fn gossip_or_empty(&self) -> &str {
        self.gossip.as_deref().unwrap_or("")
    }
}

/// Drop records whose pubkey was already seen, keeping the first one.
pub fn unique_by_pubkey(nodes: Vec<ClusterNode>) -> Vec<ClusterNode> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.pubkey.clone()))
        .collect()
}
