//! The directed lane-to-lane connectivity graph and its shortest-path
//! search. The heap orders frontier entries by (cost, lane id) and
//! relaxation keeps the first winner, so equal-cost alternatives resolve to
//! the lexicographically first path.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::LaneID;

/// One directed edge: driving from `from_id` may continue into `to_id` at
/// the given cost.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from_id: LaneID,
    pub to_id: LaneID,
    pub weight: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoadGraph {
    to_successors: BTreeMap<LaneID, Vec<LaneID>>,
    to_predecessors: BTreeMap<LaneID, Vec<LaneID>>,
    all_connections: BTreeMap<(LaneID, LaneID), f64>,
}

impl RoadGraph {
    pub fn new() -> RoadGraph {
        RoadGraph::default()
    }

    /// Registers a connection, mirroring it into the successor and
    /// predecessor lists. Re-adding an existing pair is a no-op.
    pub fn add_connection(&mut self, connection: Connection) {
        let key = (connection.from_id, connection.to_id);
        if self.all_connections.contains_key(&key) {
            return;
        }
        self.all_connections.insert(key, connection.weight);
        self.to_successors
            .entry(connection.from_id)
            .or_default()
            .push(connection.to_id);
        self.to_predecessors
            .entry(connection.to_id)
            .or_default()
            .push(connection.from_id);
    }

    pub fn find_connection(&self, from_id: LaneID, to_id: LaneID) -> Option<Connection> {
        self.all_connections
            .get(&(from_id, to_id))
            .map(|weight| Connection {
                from_id,
                to_id,
                weight: *weight,
            })
    }

    pub fn successors(&self, lane_id: LaneID) -> &[LaneID] {
        self.to_successors
            .get(&lane_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, lane_id: LaneID) -> &[LaneID] {
        self.to_predecessors
            .get(&lane_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.all_connections
            .iter()
            .map(|((from_id, to_id), weight)| Connection {
                from_id: *from_id,
                to_id: *to_id,
                weight: *weight,
            })
    }

    pub fn len(&self) -> usize {
        self.all_connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_connections.is_empty()
    }

    /// Dijkstra over the connection weights: the cheapest lane sequence from
    /// `from` to `to`, inclusive. Empty when unreachable.
    pub fn get_best_path(&self, from: LaneID, to: LaneID) -> Vec<LaneID> {
        let mut queue: BinaryHeap<Reverse<(NotNan<f64>, LaneID)>> = BinaryHeap::new();
        let mut shortest: BTreeMap<LaneID, f64> = BTreeMap::new();
        let mut previous: BTreeMap<LaneID, LaneID> = BTreeMap::new();
        let mut visited: BTreeSet<LaneID> = BTreeSet::new();

        queue.push(Reverse((NotNan::new(0.0).unwrap(), from)));
        shortest.insert(from, 0.0);

        while let Some(Reverse((cost, current))) = queue.pop() {
            if !visited.insert(current) {
                continue;
            }
            if current == to {
                return self.reconstruct_path(from, to, &previous);
            }

            for successor in self.successors(current) {
                let weight = match self.all_connections.get(&(current, *successor)) {
                    Some(w) => *w,
                    None => continue,
                };
                let new_cost = cost.into_inner() + weight;
                if shortest
                    .get(successor)
                    .map(|best| new_cost < *best)
                    .unwrap_or(true)
                {
                    shortest.insert(*successor, new_cost);
                    previous.insert(*successor, current);
                    match NotNan::new(new_cost) {
                        Ok(cost) => queue.push(Reverse((cost, *successor))),
                        Err(_) => warn!("skipping NaN-cost connection into {}", successor),
                    }
                }
            }
        }

        warn!("no path from {} to {}", from, to);
        Vec::new()
    }

    fn reconstruct_path(
        &self,
        from: LaneID,
        to: LaneID,
        previous: &BTreeMap<LaneID, LaneID>,
    ) -> Vec<LaneID> {
        let mut path = vec![to];
        let mut current = to;
        while current != from {
            current = previous[&current];
            path.push(current);
        }
        path.reverse();
        path
    }

    /// The induced subgraph whose connections have both endpoints in
    /// `lane_ids`.
    pub fn create_subgraph(&self, lane_ids: &BTreeSet<LaneID>) -> RoadGraph {
        let mut subgraph = RoadGraph::new();
        for connection in self.connections() {
            if lane_ids.contains(&connection.from_id) && lane_ids.contains(&connection.to_id) {
                subgraph.add_connection(connection);
            }
        }
        subgraph
    }
}
