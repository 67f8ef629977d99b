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

//! Operator actions over the running testbed.
//!
//! The interactive menu is an explicit command dispatcher: the I/O adapter
//! (in the binary crate) parses lines into [`Action`] values, and
//! [`dispatch`] maps each action onto a handler over the session state. The
//! handlers validate every flow and route selection before touching anything;
//! a bad selection is a recoverable [`ControllerError::InvalidSelection`]
//! that the adapter answers with a re-prompt.

use crate::audit::{AuditApi, AuditError, FlowLedger};
use crate::console::EmulatorConsole;
use crate::Session;
use bmv2::codec;
use bmv2::{EntryHandle, StandardClient, ACTION_ADD_SR_HEADER, TABLE_SR_ENCAP};
use pathcheck::flows::{FlowError, FlowId, FlowRegistry, RouteId};
use pathcheck::topology::{Topology, TopologyError};

use log::*;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Selection of one flow, or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSelector {
    /// One flow, by its menu index.
    One(usize),
    /// Every flow in the registry.
    All,
}

/// One operator action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Inject `count` probes, `interval_s` seconds apart, on the selected
    /// flow(s).
    SendProbe {
        /// the audited flow(s)
        flow: FlowSelector,
        /// seconds between probes
        interval_s: f64,
        /// number of probes
        count: u32,
    },
    /// Query the per-probe compliance verdicts.
    QueryCompliance {
        /// the queried flow(s)
        flow: FlowSelector,
    },
    /// Query the consolidated compliance verdict of one flow.
    QueryComplianceConsolidation {
        /// menu index of the queried flow
        flow: usize,
    },
    /// Move one flow onto another of its pre-provisioned routes.
    ChangeRoute {
        /// menu index of the flow
        flow: usize,
        /// menu index of the requested route
        route: usize,
    },
    /// Leave the interactive loop.
    Exit,
}

/// What a dispatched action did, rendered for the operator by the adapter.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Probes are on their way for this many flows.
    ProbesSent(usize),
    /// Compliance reports, one per queried flow.
    Compliance(Vec<String>),
    /// The requested route is already the current one; nothing was done.
    RouteUnchanged(RouteId),
    /// The table entry was rewritten and the ledger notified.
    RouteChanged {
        /// previously active route
        old: RouteId,
        /// newly active route
        new: RouteId,
    },
    /// The operator asked to leave.
    Exit,
}

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The operator picked a flow or route that does not exist. Recovered by
    /// re-prompting.
    #[error("invalid value of {0}")]
    InvalidSelection(String),
    /// Control-plane failure. The route change was aborted and local state
    /// left unchanged; the run continues.
    #[error("control plane: {0}")]
    ControlPlane(#[from] bmv2::Error),
    /// Audit service failure.
    #[error("audit service: {0}")]
    Audit(#[from] AuditError),
    /// The flow registry rejected the update.
    #[error("flow registry: {0}")]
    Flow(#[from] FlowError),
    /// The topology has no such node.
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    /// The emulator console failed.
    #[error("emulator console: {0}")]
    Console(String),
}

/// The two control-plane operations a route change needs. Implemented by a
/// live switch session (closed on drop); tests substitute a recorder.
pub trait RouteProgrammer {
    /// Handle of the entry whose LPM prefix equals `dest`.
    fn find_entry_for_destination(
        &mut self,
        table: &str,
        dest: Ipv4Addr,
    ) -> bmv2::Result<EntryHandle>;

    /// Atomically rewrite the action bound to `handle`.
    fn rewrite_route(
        &mut self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        params: &[Vec<u8>],
    ) -> bmv2::Result<()>;
}

impl RouteProgrammer for StandardClient {
    fn find_entry_for_destination(
        &mut self,
        table: &str,
        dest: Ipv4Addr,
    ) -> bmv2::Result<EntryHandle> {
        StandardClient::find_entry_for_destination(self, table, dest)
    }

    fn rewrite_route(
        &mut self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        params: &[Vec<u8>],
    ) -> bmv2::Result<()> {
        self.modify_entry(table, handle, action, params)
    }
}

/// Dispatch one operator action onto the session.
pub fn dispatch(session: &mut Session, action: Action) -> Result<Outcome, ControllerError> {
    match action {
        Action::SendProbe { flow, interval_s, count } => {
            send_probe(&mut session.console, &session.registry, flow, interval_s, count)
        }
        Action::QueryCompliance { flow } => query_compliance(&session.audit, &session.registry, flow),
        Action::QueryComplianceConsolidation { flow } => {
            query_consolidation(&session.audit, &session.registry, flow)
        }
        Action::ChangeRoute { flow, route } => {
            let host = session.control_plane_host.clone();
            change_route(
                &mut session.registry,
                &session.topology,
                &session.audit,
                |port| StandardClient::connect(&host, port),
                flow,
                route,
            )
        }
        Action::Exit => Ok(Outcome::Exit),
    }
}

/// Inject probes by running `ping` on the source host(s). The data plane
/// turns echo requests entering the source-routing tunnel into probes.
pub fn send_probe(
    console: &mut EmulatorConsole,
    registry: &FlowRegistry,
    flow: FlowSelector,
    interval_s: f64,
    count: u32,
) -> Result<Outcome, ControllerError> {
    let targets: Vec<(String, Ipv4Addr)> = match flow {
        FlowSelector::All => registry
            .flows()
            .map(|(_, f)| (f.host_src.clone(), f.ip_dst))
            .collect(),
        FlowSelector::One(index) => {
            let f = registry
                .get(index)
                .ok_or_else(|| ControllerError::InvalidSelection(String::from("Flow")))?;
            vec![(f.host_src.clone(), f.ip_dst)]
        }
    };
    let num_flows = targets.len();
    for (host, ip_dst) in targets {
        console
            .host_cmd(&host, format!("ping -i {} -c {} {} &", interval_s, count, ip_dst))
            .map_err(|e| ControllerError::Console(e.to_string()))?;
    }
    Ok(Outcome::ProbesSent(num_flows))
}

/// Query the per-probe compliance verdicts for the selected flow(s).
pub fn query_compliance(
    api: &AuditApi,
    registry: &FlowRegistry,
    flow: FlowSelector,
) -> Result<Outcome, ControllerError> {
    let ids: Vec<FlowId> = match flow {
        FlowSelector::All => registry.flows().map(|(_, f)| deployed_id(f)).collect(),
        FlowSelector::One(index) => {
            let f = registry
                .get(index)
                .ok_or_else(|| ControllerError::InvalidSelection(String::from("Flow")))?;
            vec![deployed_id(f)]
        }
    };
    let mut reports = Vec::with_capacity(ids.len());
    for id in ids {
        reports.push(api.flow_compliance(id)?);
    }
    Ok(Outcome::Compliance(reports))
}

/// Query the consolidated verdict of one flow, followed by its per-probe
/// report.
pub fn query_consolidation(
    api: &AuditApi,
    registry: &FlowRegistry,
    flow: usize,
) -> Result<Outcome, ControllerError> {
    let f = registry
        .get(flow)
        .ok_or_else(|| ControllerError::InvalidSelection(String::from("Flow")))?;
    let id = deployed_id(f);
    let consolidation = api.flow_compliance_consolidation(id)?;
    let compliance = api.flow_compliance(id)?;
    Ok(Outcome::Compliance(vec![consolidation, compliance]))
}

fn deployed_id(flow: &pathcheck::flows::Flow) -> FlowId {
    // ids are assigned at deployment; the derivation is idempotent either way
    flow.flow_id.unwrap_or_else(|| flow.derived_id())
}

/// Assign every flow its derived identifier and, when `deploy` is set,
/// register one flow contract per flow.
pub fn deploy_flows<L: FlowLedger + ?Sized>(
    registry: &mut FlowRegistry,
    ledger: &L,
    deploy: bool,
) -> Result<(), ControllerError> {
    registry.assign_ids();
    for (_, flow) in registry.flows() {
        if let Some(id) = flow.flow_id {
            if deploy {
                ledger.deploy_flow_contract(id, flow.current_route)?;
            }
            info!("flow {} ({} -> {}) ready", id, flow.host_src, flow.host_dst);
        }
    }
    Ok(())
}

/// Move a flow onto another of its pre-provisioned routes.
///
/// Opens one fresh control-plane session through `connect`, locates the
/// flow's encap entry by destination, and rewrites it. Local registry state
/// and the ledger are only touched after the remote write succeeded; on any
/// RPC failure the flow stays on its current route. Requesting the route
/// that is already active is a reported no-op: no session is opened at all.
pub fn change_route<P, F, L>(
    registry: &mut FlowRegistry,
    topology: &Topology,
    ledger: &L,
    connect: F,
    flow_index: usize,
    route_index: usize,
) -> Result<Outcome, ControllerError>
where
    P: RouteProgrammer,
    F: FnOnce(u16) -> bmv2::Result<P>,
    L: FlowLedger + ?Sized,
{
    let flow = registry
        .get(flow_index)
        .ok_or_else(|| ControllerError::InvalidSelection(String::from("Flow")))?;
    let route_id = *flow
        .routes
        .get(&route_index)
        .ok_or_else(|| ControllerError::InvalidSelection(String::from("Route")))?;

    if route_id == flow.current_route {
        info!("route {:#018x} is already the current route", route_id);
        return Ok(Outcome::RouteUnchanged(route_id));
    }

    let flow_id = deployed_id(flow);
    let ip_dst = flow.ip_dst;
    let thrift_port = flow.thrift_port;
    let old_route = flow.current_route;
    let dst_mac = topology.host_mac(&flow.host_dst)?;

    let mut session = connect(thrift_port)?;
    let handle = session.find_entry_for_destination(TABLE_SR_ENCAP, ip_dst)?;
    debug!("found entry handle {} for {}", handle, ip_dst);
    let params = codec::add_sourcerouting_header(
        codec::SR_FIELD_COUNT,
        codec::SR_FLAG_ENABLED,
        dst_mac,
        route_id,
    );
    session.rewrite_route(TABLE_SR_ENCAP, handle, ACTION_ADD_SR_HEADER, &params)?;

    // the remote write went through; now update the local view and the ledger
    registry.set_current_route(flow_id, route_id)?;
    ledger.set_new_route(flow_id, route_id)?;
    info!("flow {} moved from route {:#018x} to {:#018x}", flow_id, old_route, route_id);
    Ok(Outcome::RouteChanged { old: old_route, new: route_id })
}

#[cfg(test)]
mod test {
    use super::*;
    use pathcheck::topology::{flows, linear_topology, TopologyKind};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Records every control-plane call; optionally fails the rewrite.
    struct MockSwitch {
        log: Rc<RefCell<Vec<String>>>,
        fail_rewrite: bool,
    }

    impl RouteProgrammer for MockSwitch {
        fn find_entry_for_destination(
            &mut self,
            table: &str,
            dest: Ipv4Addr,
        ) -> bmv2::Result<EntryHandle> {
            self.log.borrow_mut().push(format!("find {} {}", table, dest));
            Ok(7)
        }

        fn rewrite_route(
            &mut self,
            table: &str,
            handle: EntryHandle,
            action: &str,
            params: &[Vec<u8>],
        ) -> bmv2::Result<()> {
            if self.fail_rewrite {
                return Err(bmv2::Error::Remote { table: table.to_string(), code: 13 });
            }
            self.log
                .borrow_mut()
                .push(format!("rewrite {} {} {} {} params", table, handle, action, params.len()));
            Ok(())
        }
    }

    /// Records every ledger call.
    #[derive(Default)]
    struct MockLedger {
        new_routes: RefCell<Vec<(FlowId, RouteId)>>,
        deployed: RefCell<Vec<(FlowId, RouteId)>>,
    }

    impl FlowLedger for MockLedger {
        fn deploy_flow_contract(
            &self,
            flow_id: FlowId,
            route_id: RouteId,
        ) -> Result<(), AuditError> {
            self.deployed.borrow_mut().push((flow_id, route_id));
            Ok(())
        }

        fn set_new_route(&self, flow_id: FlowId, route_id: RouteId) -> Result<(), AuditError> {
            self.new_routes.borrow_mut().push((flow_id, route_id));
            Ok(())
        }
    }

    fn deployed_registry() -> FlowRegistry {
        let mut registry = FlowRegistry::new(flows(TopologyKind::Linear));
        registry.assign_ids();
        registry
    }

    #[test]
    fn change_to_current_route_is_a_noop() {
        let mut registry = deployed_registry();
        let topology = linear_topology();
        let ledger = MockLedger::default();
        let current = registry.get(0).unwrap().current_route;
        let connected = Cell::new(false);

        let outcome = change_route(
            &mut registry,
            &topology,
            &ledger,
            |_| {
                connected.set(true);
                Ok(MockSwitch { log: Rc::default(), fail_rewrite: false })
            },
            0,
            0, // route 0 is the current route
        )
        .unwrap();

        assert_eq!(outcome, Outcome::RouteUnchanged(current));
        assert_eq!(registry.get(0).unwrap().current_route, current);
        // no session was opened, no ledger call was made
        assert!(!connected.get());
        assert!(ledger.new_routes.borrow().is_empty());
    }

    #[test]
    fn change_route_rewrites_then_updates_state() {
        let mut registry = deployed_registry();
        let topology = linear_topology();
        let ledger = MockLedger::default();
        let flow_id = registry.get(0).unwrap().flow_id.unwrap();
        let old = registry.get(0).unwrap().current_route;
        let new = *registry.get(0).unwrap().routes.get(&1).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let outcome = change_route(
            &mut registry,
            &topology,
            &ledger,
            |port| {
                assert_eq!(port, registry_port());
                Ok(MockSwitch { log: log.clone(), fail_rewrite: false })
            },
            0,
            1,
        )
        .unwrap();

        assert_eq!(outcome, Outcome::RouteChanged { old, new });
        assert_eq!(registry.get(0).unwrap().current_route, new);
        assert_eq!(&*ledger.new_routes.borrow(), &vec![(flow_id, new)]);
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("find MyIngress.TunnelEncap.tunnel_encap_process_sr"));
        assert!(log[1].contains("add_sourcerouting_header 4 params"));
    }

    #[test]
    fn failed_rewrite_leaves_state_untouched() {
        let mut registry = deployed_registry();
        let topology = linear_topology();
        let ledger = MockLedger::default();
        let old = registry.get(0).unwrap().current_route;

        let result = change_route(
            &mut registry,
            &topology,
            &ledger,
            |_| Ok(MockSwitch { log: Rc::default(), fail_rewrite: true }),
            0,
            1,
        );

        assert!(matches!(
            result,
            Err(ControllerError::ControlPlane(bmv2::Error::Remote { .. }))
        ));
        assert_eq!(registry.get(0).unwrap().current_route, old);
        assert!(ledger.new_routes.borrow().is_empty());
    }

    #[test]
    fn failed_connect_leaves_state_untouched() {
        let mut registry = deployed_registry();
        let topology = linear_topology();
        let ledger = MockLedger::default();
        let old = registry.get(0).unwrap().current_route;

        let result = change_route(
            &mut registry,
            &topology,
            &ledger,
            |_| -> bmv2::Result<MockSwitch> {
                Err(bmv2::Error::Connect(thrift::Error::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))))
            },
            0,
            1,
        );

        assert!(matches!(
            result,
            Err(ControllerError::ControlPlane(bmv2::Error::Connect(_)))
        ));
        assert_eq!(registry.get(0).unwrap().current_route, old);
        assert!(ledger.new_routes.borrow().is_empty());
    }

    #[test]
    fn invalid_selections_are_recoverable() {
        let mut registry = deployed_registry();
        let topology = linear_topology();
        let ledger = MockLedger::default();

        let bad_flow = change_route(
            &mut registry,
            &topology,
            &ledger,
            |_| Ok(MockSwitch { log: Rc::default(), fail_rewrite: false }),
            99,
            0,
        );
        assert!(matches!(bad_flow, Err(ControllerError::InvalidSelection(_))));

        let bad_route = change_route(
            &mut registry,
            &topology,
            &ledger,
            |_| Ok(MockSwitch { log: Rc::default(), fail_rewrite: false }),
            0,
            99,
        );
        assert!(matches!(bad_route, Err(ControllerError::InvalidSelection(_))));
        assert!(ledger.new_routes.borrow().is_empty());
    }

    #[test]
    fn deploy_assigns_ids_and_registers_contracts() {
        let mut registry = FlowRegistry::new(flows(TopologyKind::Linear));
        let ledger = MockLedger::default();
        deploy_flows(&mut registry, &ledger, true).unwrap();

        assert!(registry.flows().all(|(_, f)| f.flow_id.is_some()));
        assert_eq!(ledger.deployed.borrow().len(), registry.len());
    }

    #[test]
    fn deploy_without_contracts_only_assigns_ids() {
        let mut registry = FlowRegistry::new(flows(TopologyKind::Linear));
        let ledger = MockLedger::default();
        deploy_flows(&mut registry, &ledger, false).unwrap();

        assert!(registry.flows().all(|(_, f)| f.flow_id.is_some()));
        assert!(ledger.deployed.borrow().is_empty());
    }

    /// Control-plane port of the first linear flow (its ingress switch).
    fn registry_port() -> u16 {
        pathcheck::topology::THRIFT_PORT_BASE + 1
    }
}
