//! Aggregate network statistics.
//!
//! [`NetworkStats`] is a derived entity: it is always recomputed from the
//! current set of subnet records and never hand-edited. The store keeps
//! two variants, one over real subnets only and one over every bucket,
//! both computed in the same mutation pass.

use serde::{Deserialize, Serialize};

use crate::topology::SubnetRecord;

/// Aggregate counts across subnets at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkStats {
    /// Number of subnets included in the aggregation.
    pub total_subnets: u64,
    /// Total nodes across those subnets.
    pub total_nodes: u64,
    /// Nodes classified Gen1.
    pub gen1_nodes: u64,
    /// Nodes classified Gen2.
    pub gen2_nodes: u64,
    /// Nodes with unknown generation.
    pub unknown_nodes: u64,
    /// When this aggregation was computed (Unix nanos).
    pub last_updated_ns: u64,
}

impl NetworkStats {
    /// Zeroed statistics stamped with the given time.
    #[must_use]
    pub const fn zero(last_updated_ns: u64) -> Self {
        Self {
            total_subnets: 0,
            total_nodes: 0,
            gen1_nodes: 0,
            gen2_nodes: 0,
            unknown_nodes: 0,
            last_updated_ns,
        }
    }

    /// Aggregates the given subnet records.
    ///
    /// Global counts are the sum of the per-subnet counts, which are
    /// themselves derived from each record's node list.
    #[must_use]
    pub fn from_subnets<'a>(
        subnets: impl IntoIterator<Item = &'a SubnetRecord>,
        last_updated_ns: u64,
    ) -> Self {
        let mut stats = Self::zero(last_updated_ns);
        for subnet in subnets {
            stats.total_subnets += 1;
            stats.total_nodes += subnet.node_count;
            stats.gen1_nodes += subnet.gen1_count;
            stats.gen2_nodes += subnet.gen2_count;
            stats.unknown_nodes += subnet.unknown_count;
        }
        stats
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::generation::Generation;
    use crate::topology::NodeRecord;

    fn subnet(id: &str, generations: &[Generation]) -> SubnetRecord {
        let nodes = generations
            .iter()
            .enumerate()
            .map(|(i, generation)| NodeRecord {
                id: format!("{id}-n{i}"),
                generation: *generation,
                operator_id: String::new(),
                provider_id: String::new(),
                datacenter_id: String::new(),
                region: String::new(),
                status: String::new(),
            })
            .collect();
        SubnetRecord::new(id, "application", nodes)
    }

    #[test]
    fn test_zero_stats() {
        let stats = NetworkStats::zero(42);
        assert_eq!(stats.total_subnets, 0);
        assert_eq!(stats.total_nodes, 0);
        assert_eq!(stats.last_updated_ns, 42);
    }

    #[test]
    fn test_aggregation_sums_per_subnet_counts() {
        let subnets = vec![
            subnet("sn-1", &[Generation::Gen1, Generation::Gen2]),
            subnet("sn-2", &[Generation::Gen2, Generation::Unknown, Generation::Gen2]),
        ];
        let stats = NetworkStats::from_subnets(&subnets, 7);

        assert_eq!(stats.total_subnets, 2);
        assert_eq!(stats.total_nodes, 5);
        assert_eq!(stats.gen1_nodes, 1);
        assert_eq!(stats.gen2_nodes, 3);
        assert_eq!(stats.unknown_nodes, 1);
        assert_eq!(
            stats.gen1_nodes + stats.gen2_nodes + stats.unknown_nodes,
            stats.total_nodes
        );
        assert_eq!(stats.last_updated_ns, 7);
    }
}
