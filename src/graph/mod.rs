// src/graph/mod.rs
// In-memory relationship graph over entity records. Rebuilt per analysis
// run from relation-typed properties; advisory only. The adjustment it
// produces shifts the combined confidence, it never vetoes a decision.

use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

use crate::config::DedupeConfig;
use crate::models::{EntityId, EntityRecord, PairKey};

/// Typed connection between two entities with a strength value derived
/// from relation multiplicity. Ephemeral: never persisted independently
/// of the source records.
pub struct RelationshipGraph {
    graph: UnGraph<EntityId, f64>,
    node_index: HashMap<EntityId, NodeIndex>,
    component: Vec<usize>,
}

impl RelationshipGraph {
    /// Build nodes for every entity and edges for every relation-typed
    /// property pointing at another known entity. Deterministic for a
    /// fixed input set.
    pub fn build(entities: &[EntityRecord]) -> Self {
        let mut graph = UnGraph::<EntityId, f64>::new_undirected();
        let mut node_index = HashMap::new();

        for record in entities {
            let idx = graph.add_node(record.id.clone());
            node_index.insert(record.id.clone(), idx);
        }

        for record in entities {
            let from = node_index[&record.id];
            for (_field, targets) in record.relation_fields() {
                for target in targets {
                    if target == &record.id {
                        continue;
                    }
                    let Some(&to) = node_index.get(target) else {
                        continue;
                    };
                    match graph.find_edge(from, to) {
                        Some(edge) => {
                            if let Some(weight) = graph.edge_weight_mut(edge) {
                                *weight += 1.0;
                            }
                        }
                        None => {
                            graph.add_edge(from, to, 1.0);
                        }
                    }
                }
            }
        }

        // Community detection: connected components via union-find.
        let mut union_find = UnionFind::new(graph.node_count());
        for edge in graph.edge_references() {
            union_find.union(edge.source().index(), edge.target().index());
        }
        let component = (0..graph.node_count())
            .map(|i| union_find.find(i))
            .collect();

        debug!(
            "Relationship graph built: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Self {
            graph,
            node_index,
            component,
        }
    }

    fn neighbors_of(&self, id: &EntityId) -> HashSet<NodeIndex> {
        match self.node_index.get(id) {
            Some(&idx) => self.graph.neighbors(idx).collect(),
            None => HashSet::new(),
        }
    }

    pub fn degree(&self, id: &EntityId) -> usize {
        self.neighbors_of(id).len()
    }

    pub fn shared_neighbor_count(&self, a: &EntityId, b: &EntityId) -> usize {
        let (Some(&idx_a), Some(&idx_b)) = (self.node_index.get(a), self.node_index.get(b))
        else {
            return 0;
        };
        let neighbors_a: HashSet<NodeIndex> = self.graph.neighbors(idx_a).collect();
        self.graph
            .neighbors(idx_b)
            .filter(|n| neighbors_a.contains(n) && *n != idx_a && *n != idx_b)
            .count()
    }

    pub fn same_community(&self, a: &EntityId, b: &EntityId) -> bool {
        match (self.node_index.get(a), self.node_index.get(b)) {
            (Some(&ia), Some(&ib)) => self.component[ia.index()] == self.component[ib.index()],
            _ => false,
        }
    }

    /// Confidence delta for a candidate pair, in -100..+100 and capped by
    /// configuration. Shared direct neighbors raise it proportionally;
    /// membership in the same community adds a smaller boost; two
    /// well-connected entities embedded in disjoint clusters push an
    /// already-low score further down.
    pub fn adjust(&self, key: &PairKey, raw_score: f64, config: &DedupeConfig) -> f64 {
        let a = &key.id_1;
        let b = &key.id_2;

        let shared = self.shared_neighbor_count(a, b);
        if shared >= 1 {
            let boost = (shared as f64 * config.graph_boost_per_neighbor)
                .min(config.graph_boost_cap);
            debug!(
                "Graph: pair {} shares {} neighbors, boosting by {:.1}",
                key, shared, boost
            );
            return boost.clamp(-100.0, 100.0);
        }

        if self.same_community(a, b) {
            return config.graph_community_boost.clamp(-100.0, 100.0);
        }

        let degree_a = self.degree(a);
        let degree_b = self.degree(b);
        if degree_a >= 1 && degree_b >= 1 && raw_score < config.ai_band_low {
            // Disjoint, never-overlapping clusters on both sides and the
            // raw score is already weak: more likely two distinct
            // same-named entities.
            let penalty = (degree_a.min(degree_b) as f64 * config.graph_boost_per_neighbor / 2.0)
                .min(config.graph_penalty_cap);
            debug!(
                "Graph: pair {} sits in disjoint clusters (degrees {}/{}), lowering by {:.1}",
                key, degree_a, degree_b, penalty
            );
            return (-penalty).clamp(-100.0, 100.0);
        }

        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    fn person_with_orgs(id: &str, orgs: &[&str]) -> EntityRecord {
        EntityRecord::new(id, EntityType::Person)
            .with_text("name", id)
            .with_relations("organizations", orgs)
    }

    fn org(id: &str) -> EntityRecord {
        EntityRecord::new(id, EntityType::Organization).with_text("name", id)
    }

    #[test]
    fn test_shared_neighbor_boost() {
        let entities = vec![
            person_with_orgs("p1", &["o1", "o2"]),
            person_with_orgs("p2", &["o1", "o2"]),
            org("o1"),
            org("o2"),
        ];
        let graph = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("p1"), EntityId::new("p2"));

        assert_eq!(
            graph.shared_neighbor_count(&EntityId::new("p1"), &EntityId::new("p2")),
            2
        );
        let config = DedupeConfig::default();
        let delta = graph.adjust(&key, 70.0, &config);
        assert_eq!(delta, 2.0 * config.graph_boost_per_neighbor);
    }

    #[test]
    fn test_boost_capped() {
        let org_ids: Vec<String> = (0..10).map(|i| format!("o{}", i)).collect();
        let org_refs: Vec<&str> = org_ids.iter().map(|s| s.as_str()).collect();
        let mut entities = vec![
            person_with_orgs("p1", &org_refs),
            person_with_orgs("p2", &org_refs),
        ];
        entities.extend(org_ids.iter().map(|id| org(id)));

        let graph = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("p1"), EntityId::new("p2"));
        let config = DedupeConfig::default();
        assert_eq!(graph.adjust(&key, 70.0, &config), config.graph_boost_cap);
    }

    #[test]
    fn test_same_community_without_shared_neighbor() {
        // p1 - o1 - p3 - o2 - p2: one component, no shared direct neighbor.
        let entities = vec![
            person_with_orgs("p1", &["o1"]),
            person_with_orgs("p3", &["o1", "o2"]),
            person_with_orgs("p2", &["o2"]),
            org("o1"),
            org("o2"),
        ];
        let graph = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("p1"), EntityId::new("p2"));
        let config = DedupeConfig::default();
        assert_eq!(graph.adjust(&key, 70.0, &config), config.graph_community_boost);
    }

    #[test]
    fn test_disjoint_clusters_penalize_low_scores_only() {
        let entities = vec![
            person_with_orgs("p1", &["o1"]),
            person_with_orgs("p2", &["o2"]),
            org("o1"),
            org("o2"),
        ];
        let graph = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("p1"), EntityId::new("p2"));
        let config = DedupeConfig::default();

        let low = graph.adjust(&key, 45.0, &config);
        assert!(low < 0.0, "low raw score should be penalized, got {}", low);

        let high = graph.adjust(&key, 80.0, &config);
        assert_eq!(high, 0.0, "high raw score is left alone");
    }

    #[test]
    fn test_isolated_entities_get_no_adjustment() {
        let entities = vec![org("a"), org("b")];
        let graph = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("a"), EntityId::new("b"));
        assert_eq!(graph.adjust(&key, 45.0, &DedupeConfig::default()), 0.0);
    }

    #[test]
    fn test_deterministic_for_fixed_graph() {
        let entities = vec![
            person_with_orgs("p1", &["o1"]),
            person_with_orgs("p2", &["o1"]),
            org("o1"),
        ];
        let graph_1 = RelationshipGraph::build(&entities);
        let graph_2 = RelationshipGraph::build(&entities);
        let key = PairKey::new(EntityId::new("p1"), EntityId::new("p2"));
        let config = DedupeConfig::default();
        assert_eq!(
            graph_1.adjust(&key, 60.0, &config),
            graph_2.adjust(&key, 60.0, &config)
        );
    }
}
