//! Node and subnet records, the inbound upload shape, and the correlator.
//!
//! The correlator joins two independently-fetched datasets (a
//! `subnet id -> [node id]` topology and a `node id -> generation`
//! hardware map) into fully-populated [`SubnetRecord`]s. The hardware
//! map is allowed to be incomplete; missing entries resolve through a
//! [`GenerationFallback`] policy.
//!
//! # Count invariants
//!
//! For every record at rest:
//!
//! - `node_count == nodes.len()`
//! - `gen1_count + gen2_count + unknown_count == node_count`
//!
//! These hold because counts are always rederived from the node list
//! ([`SubnetRecord::recount`]) rather than incremented independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::generation::{Generation, GenerationFallback};

/// A single node within a subnet. Immutable within a snapshot; replaced
/// wholesale on the next full refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id, unique within its subnet's node list.
    pub id: String,
    /// Classified hardware generation.
    pub generation: Generation,
    /// Operator principal.
    pub operator_id: String,
    /// Provider principal.
    pub provider_id: String,
    /// Datacenter the node runs in.
    pub datacenter_id: String,
    /// Geographic region.
    pub region: String,
    /// Operational status as reported by the source.
    pub status: String,
}

/// A subnet with its node list and derived per-generation counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecord {
    /// Subnet id.
    pub id: String,
    /// Subnet type as reported by the source (e.g. `"application"`).
    pub subnet_type: String,
    /// Total nodes; always equals `nodes.len()`.
    pub node_count: u64,
    /// Nodes classified Gen1.
    pub gen1_count: u64,
    /// Nodes classified Gen2.
    pub gen2_count: u64,
    /// Nodes with unknown generation.
    pub unknown_count: u64,
    /// The nodes, in source order.
    pub nodes: Vec<NodeRecord>,
}

impl SubnetRecord {
    /// Creates a record for the given nodes with counts derived from the
    /// node list.
    #[must_use]
    pub fn new(id: impl Into<String>, subnet_type: impl Into<String>, nodes: Vec<NodeRecord>) -> Self {
        let mut record = Self {
            id: id.into(),
            subnet_type: subnet_type.into(),
            node_count: 0,
            gen1_count: 0,
            gen2_count: 0,
            unknown_count: 0,
            nodes,
        };
        record.recount();
        record
    }

    /// Rederives all four counts from the node list.
    ///
    /// This is the only way counts are ever produced, which is what
    /// maintains the count invariants.
    pub fn recount(&mut self) {
        self.node_count = self.nodes.len() as u64;
        self.gen1_count = 0;
        self.gen2_count = 0;
        self.unknown_count = 0;
        for node in &self.nodes {
            match node.generation {
                Generation::Gen1 => self.gen1_count += 1,
                Generation::Gen2 => self.gen2_count += 1,
                Generation::Unknown => self.unknown_count += 1,
            }
        }
    }
}

/// Inbound node record as produced by the upload/parsing collaborator.
///
/// Field names follow the source file format. Records with an empty
/// `subnet_id` are dropped before they reach the correlator or the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNodeRecord {
    /// Node id.
    pub node_id: String,
    /// Explicit generation label, classified by rule (i).
    #[serde(default)]
    pub node_hardware_generation: String,
    /// Operator principal.
    #[serde(default)]
    pub node_operator_id: String,
    /// Provider principal.
    #[serde(default)]
    pub node_provider_id: String,
    /// Datacenter id.
    #[serde(default)]
    pub dc_id: String,
    /// Region.
    #[serde(default)]
    pub region: String,
    /// Operational status.
    #[serde(default)]
    pub status: String,
    /// Owning subnet; empty means unassigned and the record is dropped.
    #[serde(default)]
    pub subnet_id: String,
}

/// Pluggable predicate deciding whether a subnet is "real", i.e. an
/// actual network partition rather than a sentinel bucket for unassigned
/// or boundary nodes.
///
/// The real-subnets-only statistics accessor applies this filter; the
/// all-nodes accessor ignores it.
#[derive(Clone)]
pub struct SubnetFilter {
    predicate: Arc<dyn Fn(&SubnetRecord) -> bool + Send + Sync>,
}

impl SubnetFilter {
    /// A filter excluding the given sentinel subnet ids.
    #[must_use]
    pub fn sentinel_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sentinels: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self {
            predicate: Arc::new(move |subnet| !sentinels.iter().any(|s| s == &subnet.id)),
        }
    }

    /// A filter from an arbitrary predicate.
    #[must_use]
    pub fn custom(predicate: impl Fn(&SubnetRecord) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Whether the subnet counts as a real network partition.
    #[must_use]
    pub fn is_real(&self, subnet: &SubnetRecord) -> bool {
        (self.predicate)(subnet)
    }
}

impl Default for SubnetFilter {
    /// Excludes the `"unassigned"` sentinel bucket.
    fn default() -> Self {
        Self::sentinel_ids(["unassigned"])
    }
}

impl std::fmt::Debug for SubnetFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubnetFilter").finish_non_exhaustive()
    }
}

/// Subnet type assigned to records built by the correlator. The topology
/// endpoint does not expose a type field.
const CORRELATED_SUBNET_TYPE: &str = "application";

/// Joins a topology dataset with a hardware dataset into subnet records.
///
/// Walks each subnet's node id list exactly once; per-subnet counts are
/// accumulated via [`SubnetRecord::recount`]. Node ids missing from the
/// hardware map resolve through the fallback policy. Every subnet in the
/// input topology is represented in the output; there are no partial
/// results.
#[must_use]
pub fn correlate(
    topology: &BTreeMap<String, Vec<String>>,
    generations: &HashMap<String, Generation>,
    fallback: GenerationFallback,
) -> Vec<SubnetRecord> {
    topology
        .iter()
        .map(|(subnet_id, node_ids)| {
            let nodes = node_ids
                .iter()
                .map(|node_id| NodeRecord {
                    id: node_id.clone(),
                    generation: generations
                        .get(node_id)
                        .copied()
                        .unwrap_or_else(|| fallback.as_generation()),
                    operator_id: String::new(),
                    provider_id: String::new(),
                    datacenter_id: String::new(),
                    region: String::new(),
                    status: String::new(),
                })
                .collect();
            SubnetRecord::new(subnet_id.clone(), CORRELATED_SUBNET_TYPE, nodes)
        })
        .collect()
}

/// Builds subnet records from uploaded raw node records.
///
/// Records with an empty `subnet_id` are dropped. The explicit
/// `node_hardware_generation` label is classified by rule (i).
#[must_use]
pub fn from_raw_records(records: Vec<RawNodeRecord>) -> Vec<SubnetRecord> {
    let mut by_subnet: BTreeMap<String, Vec<NodeRecord>> = BTreeMap::new();
    for raw in records {
        if raw.subnet_id.is_empty() {
            continue;
        }
        by_subnet
            .entry(raw.subnet_id.clone())
            .or_default()
            .push(NodeRecord {
                id: raw.node_id,
                generation: Generation::from_label(&raw.node_hardware_generation),
                operator_id: raw.node_operator_id,
                provider_id: raw.node_provider_id,
                datacenter_id: raw.dc_id,
                region: raw.region,
                status: raw.status,
            });
    }
    by_subnet
        .into_iter()
        .map(|(id, nodes)| SubnetRecord::new(id, CORRELATED_SUBNET_TYPE, nodes))
        .collect()
}
