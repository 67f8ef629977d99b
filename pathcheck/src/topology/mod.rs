// Pathcheck: Path-Integrity Verification for Source-Routed Data Planes
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The forwarding topology, its builders, and the route-tampering scenarios.
//!
//! The topology is a graph of switches, hosts and port-carrying links. It is
//! built once by one of the [builders](build), optionally mutated by exactly
//! one [scenario transform](apply_scenario), and is immutable once the
//! emulated network has been started from it.

mod builders;
mod scenario;

pub use builders::{build, flows, linear_topology, probe_hop, simple_topology, TopologyKind};
pub use scenario::{
    apply_scenario, LinkInsertion, LinkRemoval, ScenarioCase, ScenarioPlan, SwitchInsertion,
};

use petgraph::algo::has_path_connecting;
use petgraph::prelude::*;
use petgraph::stable_graph::StableUnGraph;

use std::net::Ipv4Addr;
use thiserror::Error;

/// Node identification (and index into the topology graph)
pub type NodeId = NodeIndex<u32>;

/// Base TCP port for the per-switch control-plane endpoints. Switch `s<n>`
/// listens on `THRIFT_PORT_BASE + n`.
pub const THRIFT_PORT_BASE: u16 = 50_000;

/// Bandwidth (in Mbps) of every testbed link.
pub const LINK_SPEED: u32 = 10;

/// Topology errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// A scenario removal did not remove exactly one link. This is a
    /// structural bug in the scenario setup and aborts the run before the
    /// network is started.
    #[error("expected to remove exactly 1 link between {a} and {b}, removed {removed}")]
    StructuralPrecondition {
        /// first endpoint of the targeted pair
        a: String,
        /// second endpoint of the targeted pair
        b: String,
        /// how many links were actually removed
        removed: usize,
    },
    /// The node name is not present in the topology.
    #[error("node {0} does not exist in the topology")]
    NodeNotFound(String),
    /// The scenario transform is only defined for a chain of the given
    /// length; anything else would silently mis-index the switch positions.
    #[error("scenario requires a linear chain of {expected} switches, topology has {actual}")]
    WrongTopologySize {
        /// chain length the scenario is written for
        expected: usize,
        /// number of switches in the given topology
        actual: usize,
    },
    /// The transform left the end hosts disconnected. Tampered paths must
    /// still deliver packets; that is the property under test.
    #[error("topology is no longer connected between {a} and {b}")]
    Disconnected {
        /// one end host
        a: String,
        /// the other end host
        b: String,
    },
}

/// A node of the topology graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A forwarding switch.
    Switch {
        /// Switch name (`s1`, `s555`, ...)
        name: String,
        /// TCP port of the switch's control-plane service.
        thrift_port: u16,
    },
    /// An end host attached to a switch.
    Host {
        /// Host name (`h1`, ...)
        name: String,
        /// Address of the host.
        ip: Ipv4Addr,
        /// Hardware address of the host.
        mac: [u8; 6],
    },
}

impl Node {
    /// Name of the node.
    pub fn name(&self) -> &str {
        match self {
            Node::Switch { name, .. } => name,
            Node::Host { name, .. } => name,
        }
    }
}

/// A link between two nodes, with the port numbers on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Port number on the first endpoint (graph edge source).
    pub port_a: u16,
    /// Port number on the second endpoint (graph edge target).
    pub port_b: u16,
    /// Bandwidth of the link in Mbps.
    pub bandwidth: u32,
}

/// # Topology
///
/// Graph of switches, hosts and links. Switches and hosts keep their
/// insertion order, which the scenario transforms use to address chain
/// positions, and the operator menus use for stable numbering.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: StableUnGraph<Node, Link>,
    switches: Vec<NodeId>,
    hosts: Vec<NodeId>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a switch with its control-plane port. Returns the id of the new
    /// node.
    pub fn add_switch(&mut self, name: impl Into<String>, thrift_port: u16) -> NodeId {
        let id = self.graph.add_node(Node::Switch { name: name.into(), thrift_port });
        self.switches.push(id);
        id
    }

    /// Add a host. Returns the id of the new node.
    pub fn add_host(&mut self, name: impl Into<String>, ip: Ipv4Addr, mac: [u8; 6]) -> NodeId {
        let id = self.graph.add_node(Node::Host { name: name.into(), ip, mac });
        self.hosts.push(id);
        id
    }

    /// Add a link between `a` (on `port_a`) and `b` (on `port_b`).
    pub fn add_link(&mut self, a: NodeId, b: NodeId, port_a: u16, port_b: u16, bandwidth: u32) {
        self.graph.add_edge(a, b, Link { port_a, port_b, bandwidth });
    }

    /// Remove all links between `a` and `b`, returning the removed links.
    pub fn del_link_between(&mut self, a: NodeId, b: NodeId) -> Vec<Link> {
        let edges: Vec<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|e| {
                let (x, y) = self.graph.edge_endpoints(*e).expect("edge exists");
                (x == a && y == b) || (x == b && y == a)
            })
            .collect();
        edges
            .into_iter()
            .filter_map(|e| self.graph.remove_edge(e))
            .collect()
    }

    /// All switches, in insertion order.
    pub fn switches(&self) -> &[NodeId] {
        &self.switches
    }

    /// All hosts, in insertion order.
    pub fn hosts(&self) -> &[NodeId] {
        &self.hosts
    }

    /// The node behind an id handed out by this topology.
    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node_weight(id).expect("node id was handed out by this topology")
    }

    /// Look up a node by its name.
    pub fn node_by_name(&self, name: impl AsRef<str>) -> Result<NodeId, TopologyError> {
        let name = name.as_ref();
        self.graph
            .node_indices()
            .find(|id| self.graph[*id].name() == name)
            .ok_or_else(|| TopologyError::NodeNotFound(name.to_string()))
    }

    /// Hardware address of the named host.
    pub fn host_mac(&self, name: impl AsRef<str>) -> Result<[u8; 6], TopologyError> {
        let id = self.node_by_name(name.as_ref())?;
        match self.node(id) {
            Node::Host { mac, .. } => Ok(*mac),
            Node::Switch { .. } => Err(TopologyError::NodeNotFound(name.as_ref().to_string())),
        }
    }

    /// All links, with their endpoint node ids.
    pub fn links(&self) -> Vec<(NodeId, NodeId, Link)> {
        self.graph
            .edge_indices()
            .map(|e| {
                let (a, b) = self.graph.edge_endpoints(e).expect("edge exists");
                (a, b, *self.graph.edge_weight(e).expect("edge exists"))
            })
            .collect()
    }

    /// Number of links between the two nodes.
    pub fn num_links_between(&self, a: NodeId, b: NodeId) -> usize {
        self.links()
            .into_iter()
            .filter(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
            .count()
    }

    /// Port numbers of the (single) link between `a` and `b`, oriented as
    /// `(port on a, port on b)`.
    pub fn ports_between(&self, a: NodeId, b: NodeId) -> Option<(u16, u16)> {
        self.links().into_iter().find_map(|(x, y, link)| {
            if x == a && y == b {
                Some((link.port_a, link.port_b))
            } else if x == b && y == a {
                Some((link.port_b, link.port_a))
            } else {
                None
            }
        })
    }

    /// Number of links touching the node.
    pub fn degree(&self, id: NodeId) -> usize {
        self.links()
            .into_iter()
            .filter(|(a, b, _)| *a == id || *b == id)
            .count()
    }

    /// Whether a path between the two nodes exists.
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        has_path_connecting(&self.graph, a, b, None)
    }

    /// All switch-side interface names, following the `<switch>-eth<port>`
    /// naming convention of the emulator.
    pub fn interfaces(&self) -> Vec<String> {
        let mut ifaces = Vec::new();
        for (a, b, link) in self.links() {
            if let Node::Switch { name, .. } = self.node(a) {
                ifaces.push(format!("{}-eth{}", name, link.port_a));
            }
            if let Node::Switch { name, .. } = self.node(b) {
                ifaces.push(format!("{}-eth{}", name, link.port_b));
            }
        }
        ifaces.sort();
        ifaces
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn link_bookkeeping() {
        let mut topo = Topology::new();
        let s1 = topo.add_switch("s1", THRIFT_PORT_BASE + 1);
        let s2 = topo.add_switch("s2", THRIFT_PORT_BASE + 2);
        let h1 = topo.add_host("h1", Ipv4Addr::new(10, 0, 1, 10), [0, 0, 0, 0, 0, 1]);
        topo.add_link(s1, s2, 2, 2, LINK_SPEED);
        topo.add_link(s1, h1, 1, 0, LINK_SPEED);

        assert_eq!(topo.num_links_between(s1, s2), 1);
        assert_eq!(topo.ports_between(s2, s1), Some((2, 2)));
        assert_eq!(topo.degree(s1), 2);
        assert!(topo.is_connected(h1, s2));

        let removed = topo.del_link_between(s1, s2);
        assert_eq!(removed.len(), 1);
        assert_eq!(topo.num_links_between(s1, s2), 0);
        assert!(!topo.is_connected(h1, s2));
    }

    #[test]
    fn interface_names_follow_the_convention() {
        let mut topo = Topology::new();
        let s1 = topo.add_switch("s1", THRIFT_PORT_BASE + 1);
        let s2 = topo.add_switch("s2", THRIFT_PORT_BASE + 2);
        let h1 = topo.add_host("h1", Ipv4Addr::new(10, 0, 1, 10), [0, 0, 0, 0, 0, 1]);
        topo.add_link(s1, s2, 2, 2, LINK_SPEED);
        topo.add_link(s1, h1, 1, 0, LINK_SPEED);

        let ifaces = topo.interfaces();
        assert_eq!(ifaces, vec!["s1-eth1", "s1-eth2", "s2-eth2"]);
    }

    #[test]
    fn node_lookup_by_name() {
        let mut topo = Topology::new();
        let s1 = topo.add_switch("s1", THRIFT_PORT_BASE + 1);
        assert_eq!(topo.node_by_name("s1"), Ok(s1));
        assert_eq!(
            topo.node_by_name("s9"),
            Err(TopologyError::NodeNotFound(String::from("s9")))
        );
    }
}
