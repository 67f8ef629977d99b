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

//! Prepared testbed topologies and their static flow configuration.
//!
//! Port convention on a chain: port 1 connects the local host, port 2 points
//! towards the previous switch, port 3 towards the next one (the first switch
//! has no previous hop, so its chain link sits on port 2). The scenario
//! transforms and the probe sniffer both rely on this numbering.

use super::{Topology, LINK_SPEED, THRIFT_PORT_BASE};
use crate::flows::{Flow, RouteId};

use maplit::btreemap;
use std::net::Ipv4Addr;

/// Number of switches in the linear topology. The scenario transforms are
/// written against this chain length.
pub const LINEAR_CHAIN_LEN: usize = 10;

/// Number of switches in the simple topology.
const SIMPLE_CHAIN_LEN: usize = 3;

/// Source-route identifiers pre-provisioned on the ingress switches. The
/// values are the route encodings computed offline for the deployed data
/// plane; the controller only moves flows between them.
const H1_H10_PRIMARY: RouteId = 0x9d1c_4a70_23b8_65e1;
const H1_H10_DETOUR: RouteId = 0x53f2_0c9e_b714_a88d;
const H2_H9_PRIMARY: RouteId = 0x7e66_1b02_d4c9_30aa;
const H2_H9_DETOUR: RouteId = 0x1a45_ee83_907b_c2f6;
const H1_H3_PRIMARY: RouteId = 0x08b3_72d1_5a6f_94c4;
const H1_H3_DETOUR: RouteId = 0xc59a_33e8_164d_7b02;

/// The two prepared topology kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    /// A minimal three-switch chain for sanity runs; no scenario transforms.
    Simple,
    /// The ten-switch chain the route-tampering scenarios are written for.
    Linear,
}

/// Build the (unmutated) topology of the given kind.
pub fn build(kind: TopologyKind) -> Topology {
    match kind {
        TopologyKind::Simple => simple_topology(),
        TopologyKind::Linear => linear_topology(),
    }
}

/// The static flow configuration of the given topology kind.
pub fn flows(kind: TopologyKind) -> Vec<Flow> {
    match kind {
        TopologyKind::Simple => simple_flows(),
        TopologyKind::Linear => linear_flows(),
    }
}

/// Hop position the sniffer observes by default: port 2 is every switch's
/// ingress from the previous hop, so probes are seen once per traversed
/// switch.
pub fn probe_hop(kind: TopologyKind) -> u16 {
    match kind {
        TopologyKind::Simple => 2,
        TopologyKind::Linear => 2,
    }
}

/// Build a chain of `n` switches `s1..sn`, each with one host `h<i>` on
/// port 1.
fn chain_topology(n: usize) -> Topology {
    let mut topo = Topology::new();

    let mut switches = Vec::with_capacity(n);
    for i in 1..=n {
        let sw = topo.add_switch(format!("s{}", i), THRIFT_PORT_BASE + i as u16);
        switches.push(sw);
    }

    for i in 1..n {
        // the first switch has no previous hop, its chain link sits on port 2
        let port_left = if i == 1 { 2 } else { 3 };
        topo.add_link(switches[i - 1], switches[i], port_left, 2, LINK_SPEED);
    }

    for i in 1..=n {
        let host = topo.add_host(
            format!("h{}", i),
            host_ip(i),
            host_mac(i),
        );
        topo.add_link(switches[i - 1], host, 1, 0, LINK_SPEED);
    }

    topo
}

/// The ten-switch linear topology `s1 -- s2 -- ... -- s10`.
pub fn linear_topology() -> Topology {
    chain_topology(LINEAR_CHAIN_LEN)
}

/// The three-switch simple topology `s1 -- s2 -- s3`.
pub fn simple_topology() -> Topology {
    chain_topology(SIMPLE_CHAIN_LEN)
}

fn host_ip(i: usize) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, i as u8, 10)
}

fn host_mac(i: usize) -> [u8; 6] {
    [0, 0, 0, 0, 0, i as u8]
}

fn linear_flows() -> Vec<Flow> {
    vec![
        Flow {
            flow_id: None,
            host_src: String::from("h1"),
            host_dst: String::from("h10"),
            ip_src: host_ip(1),
            port_src: 5001,
            ip_dst: host_ip(10),
            port_dst: 5001,
            thrift_port: THRIFT_PORT_BASE + 1,
            routes: btreemap! {0 => H1_H10_PRIMARY, 1 => H1_H10_DETOUR},
            current_route: H1_H10_PRIMARY,
        },
        Flow {
            flow_id: None,
            host_src: String::from("h2"),
            host_dst: String::from("h9"),
            ip_src: host_ip(2),
            port_src: 5002,
            ip_dst: host_ip(9),
            port_dst: 5002,
            thrift_port: THRIFT_PORT_BASE + 2,
            routes: btreemap! {0 => H2_H9_PRIMARY, 1 => H2_H9_DETOUR},
            current_route: H2_H9_PRIMARY,
        },
    ]
}

fn simple_flows() -> Vec<Flow> {
    vec![Flow {
        flow_id: None,
        host_src: String::from("h1"),
        host_dst: String::from("h3"),
        ip_src: host_ip(1),
        port_src: 5001,
        ip_dst: host_ip(3),
        port_dst: 5001,
        thrift_port: THRIFT_PORT_BASE + 1,
        routes: btreemap! {0 => H1_H3_PRIMARY, 1 => H1_H3_DETOUR},
        current_route: H1_H3_PRIMARY,
    }]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flows::FlowRegistry;

    #[test]
    fn linear_chain_shape() {
        let topo = linear_topology();
        assert_eq!(topo.switches().len(), 10);
        assert_eq!(topo.hosts().len(), 10);
        // 9 chain links + 10 host links
        assert_eq!(topo.links().len(), 19);

        let first = topo.hosts()[0];
        let last = topo.hosts()[9];
        assert!(topo.is_connected(first, last));
    }

    #[test]
    fn linear_chain_ports() {
        let topo = linear_topology();
        let s = topo.switches();
        assert_eq!(topo.ports_between(s[0], s[1]), Some((2, 2)));
        assert_eq!(topo.ports_between(s[4], s[5]), Some((3, 2)));
        assert_eq!(topo.ports_between(s[8], s[9]), Some((3, 2)));
    }

    #[test]
    fn flow_tables_are_valid() {
        // the registry asserts that every current route is provisioned
        let linear = FlowRegistry::new(flows(TopologyKind::Linear));
        assert_eq!(linear.len(), 2);
        let simple = FlowRegistry::new(flows(TopologyKind::Simple));
        assert_eq!(simple.len(), 1);
    }

    #[test]
    fn flow_endpoints_exist() {
        let topo = linear_topology();
        for (_, flow) in FlowRegistry::new(flows(TopologyKind::Linear)).flows() {
            assert!(topo.node_by_name(&flow.host_src).is_ok());
            assert!(topo.node_by_name(&flow.host_dst).is_ok());
            assert!(topo.host_mac(&flow.host_dst).is_ok());
        }
    }
}
