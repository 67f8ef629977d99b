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

//! Flow descriptors, identifier derivation and the flow registry.
//!
//! A [`Flow`] is one tracked 4-tuple traffic class, together with the switch
//! control-plane endpoint governing its entry point and its set of
//! pre-provisioned alternate routes. All flows of a run live in a
//! [`FlowRegistry`], an owned value with registry lifetime equal to the run
//! lifetime: flows are never removed, only their `current_route` changes.

use sha2::{Digest, Sha256};

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Identifier of a flow, derived from its four-tuple.
///
/// The derivation is deterministic: the same four-tuple always yields the
/// same identifier, within and across runs, so a previously deployed flow can
/// be re-identified after a route change.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FlowId(pub u128);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifier of one pre-provisioned source route. This is the value
/// programmed into the encap table of the ingress switch (8 bytes on the
/// wire).
pub type RouteId = u64;

/// Derive the flow identifier from the four-tuple.
///
/// SHA-256 over the canonical big-endian encoding of
/// `(ip_src, port_src, ip_dst, port_dst)`, truncated to 128 bits. Not meant
/// to be a secret-keyed construction, only stable and collision-free over the
/// few dozen flows a scenario carries.
pub fn derive_flow_id(
    ip_src: Ipv4Addr,
    port_src: u16,
    ip_dst: Ipv4Addr,
    port_dst: u16,
) -> FlowId {
    let mut hasher = Sha256::new();
    hasher.update(ip_src.octets());
    hasher.update(port_src.to_be_bytes());
    hasher.update(ip_dst.octets());
    hasher.update(port_dst.to_be_bytes());
    let digest = hasher.finalize();
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);
    FlowId(u128::from_be_bytes(id))
}

/// Errors of the flow registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    /// The requested route is not one of the flow's pre-provisioned routes.
    #[error("Route {route:#018x} is not provisioned for flow {flow}")]
    InvalidRoute {
        /// the flow on which the change was requested
        flow: FlowId,
        /// the rejected route identifier
        route: RouteId,
    },
    /// The flow identifier is not known to the registry.
    #[error("Flow {0} is not known")]
    FlowNotFound(FlowId),
}

/// One tracked traffic class, with its deployed route and alternates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Identifier of the flow, assigned exactly once at deployment time.
    pub flow_id: Option<FlowId>,
    /// Name of the host injecting this flow's packets.
    pub host_src: String,
    /// Name of the destination host.
    pub host_dst: String,
    /// Source address of the four-tuple.
    pub ip_src: Ipv4Addr,
    /// Source port of the four-tuple.
    pub port_src: u16,
    /// Destination address. Also the LPM key of the encap entry on the
    /// ingress switch.
    pub ip_dst: Ipv4Addr,
    /// Destination port of the four-tuple.
    pub port_dst: u16,
    /// Control-plane port of the switch governing this flow's entry point.
    pub thrift_port: u16,
    /// Pre-provisioned routes, keyed by their menu index.
    pub routes: BTreeMap<usize, RouteId>,
    /// The route currently programmed on the ingress switch. Always one of
    /// the values in `routes`; mutated only by a successful route change.
    pub current_route: RouteId,
}

impl Flow {
    /// The identifier derived from this flow's four-tuple.
    pub fn derived_id(&self) -> FlowId {
        derive_flow_id(self.ip_src, self.port_src, self.ip_dst, self.port_dst)
    }
}

/// # Flow Registry
///
/// Owned collection of all flows of a run, with stable iteration order for
/// menu presentation. Flows are loaded from the static scenario configuration
/// and live for the whole run.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: Vec<Flow>,
}

impl FlowRegistry {
    /// Create a registry from the static flow configuration of a scenario.
    ///
    /// Panics if a flow's `current_route` is not one of its provisioned
    /// routes. The flow tables are compiled into the testbed, so this is a
    /// configuration bug caught before the network starts.
    pub fn new(flows: Vec<Flow>) -> Self {
        for flow in flows.iter() {
            assert!(
                flow.routes.values().any(|r| *r == flow.current_route),
                "flow {} -> {}: current route {:#018x} is not provisioned",
                flow.host_src,
                flow.host_dst,
                flow.current_route
            );
        }
        Self { flows }
    }

    /// Number of flows in the registry
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns true if the registry holds no flows
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Iterate over all flows in stable insertion order, together with their
    /// menu index.
    pub fn flows(&self) -> impl Iterator<Item = (usize, &Flow)> {
        self.flows.iter().enumerate()
    }

    /// Get the flow at the given menu index.
    pub fn get(&self, index: usize) -> Option<&Flow> {
        self.flows.get(index)
    }

    /// Get a flow by its assigned identifier.
    pub fn get_by_id(&self, flow_id: FlowId) -> Option<&Flow> {
        self.flows.iter().find(|f| f.flow_id == Some(flow_id))
    }

    /// Assign every flow its derived identifier. Identifiers are a pure
    /// function of the four-tuple, so calling this twice is a no-op.
    pub fn assign_ids(&mut self) {
        for flow in self.flows.iter_mut() {
            flow.flow_id = Some(flow.derived_id());
        }
    }

    /// Move a flow onto another of its pre-provisioned routes.
    ///
    /// This only mutates the registry's view; the caller is responsible for
    /// rewriting the ingress switch first and calling this on success only.
    pub fn set_current_route(
        &mut self,
        flow_id: FlowId,
        route_id: RouteId,
    ) -> Result<(), FlowError> {
        let flow = self
            .flows
            .iter_mut()
            .find(|f| f.flow_id == Some(flow_id))
            .ok_or(FlowError::FlowNotFound(flow_id))?;
        if !flow.routes.values().any(|r| *r == route_id) {
            return Err(FlowError::InvalidRoute { flow: flow_id, route: route_id });
        }
        flow.current_route = route_id;
        Ok(())
    }
}
