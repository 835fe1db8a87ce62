use crate::{Network, NodeId};

/// A route through the network, as the sequence of nodes a vehicle intends to pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    nodes: Vec<NodeId>,
}

impl Route {
    /// Creates a route passing the given nodes in order.
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    /// Finds the shortest route between two nodes, if one exists.
    pub fn shortest(network: &Network, from: NodeId, to: NodeId) -> Option<Self> {
        let result = pathfinding::directed::dijkstra::dijkstra(
            &from,
            |node| successors(*node, network),
            |node| *node == to,
        );
        result.map(|(nodes, _)| Self { nodes })
    }

    /// Gets the nodes of the route.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Gets the last node of the route.
    pub fn destination(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Gets the index of a node on the route.
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    /// Returns true if `to` directly follows `from` on the route.
    pub fn follows(&self, from: NodeId, to: NodeId) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

/// The nodes reachable over one link, with the link length in mm as the cost.
fn successors(node: NodeId, network: &Network) -> Vec<(NodeId, u64)> {
    network
        .iter_links()
        .filter(|link| link.start() == node)
        .map(|link| (link.end(), (1000.0 * network.link_length(link.id())) as u64))
        .collect()
}
