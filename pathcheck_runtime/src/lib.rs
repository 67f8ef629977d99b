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

//! # Runtime System
//!
//! This system drives one run of the path-integrity testbed: it builds the
//! topology, applies the chosen tampering scenario, replays the result into
//! the network emulator, deploys the flows, sniffs the probes, and hands
//! control to the interactive operator loop. For simplified usage, check the
//! function [`run_scenario`].

#![deny(missing_docs, missing_debug_implementations)]

pub mod audit;
pub mod console;
pub mod controller;
pub mod probe;
pub mod sniffer;

use audit::AuditApi;
use console::EmulatorConsole;
use pathcheck::flows::FlowRegistry;
use pathcheck::topology::{self, apply_scenario, ScenarioCase, Topology, TopologyKind};
use sniffer::ProbeCallback;

use log::*;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Seconds to wait after network start before deploying flows.
const SETTLE_WAIT_S: u64 = 3;

/// Seconds to let in-flight probes drain before stopping the sniffer.
const DRAIN_WAIT_S: u64 = 2;

/// Options of one testbed run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Local port of the network emulator console.
    pub console_port: u16,
    /// Base URL of the audit service.
    pub audit_api: String,
    /// Host running the switch control-plane services.
    pub control_plane_host: String,
    /// Hop position observed by the sniffer.
    pub probe_hop: u16,
    /// Register each flow with the flow-contract service after start.
    pub deploy_flows: bool,
}

/// Everything the operator loop acts on during a run.
#[derive(Debug)]
pub struct Session {
    /// The flows of this run.
    pub registry: FlowRegistry,
    /// The (possibly tampered) topology the network was started from.
    pub topology: Topology,
    /// Console of the running emulator.
    pub console: EmulatorConsole,
    /// Client for the audit service.
    pub audit: AuditApi,
    /// Host running the switch control-plane services.
    pub control_plane_host: String,
}

/// # Perform one testbed run
///
/// This function does the following:
///
/// 1. Build the topology of the chosen kind, and apply the tampering
///    scenario (every scenario keeps the end hosts reachable; that is the
///    property under test).
/// 2. Replay the topology into the emulator and start the network.
/// 3. Assign flow identifiers, optionally deploying one flow contract each.
/// 4. Start the probe sniffer on the hop interfaces; reference signatures
///    and probe logs go to the audit service as they are captured.
/// 5. Hand control to `operator_loop` (the interactive menu).
/// 6. Tear down in order: let in-flight probes drain, stop the sniffer, then
///    stop the network, so no capture outlives its interfaces.
pub fn run_scenario<F>(
    kind: TopologyKind,
    case: ScenarioCase,
    opts: &RunOptions,
    operator_loop: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&mut Session) -> Result<(), Box<dyn Error>>,
{
    let mut topo = topology::build(kind);
    apply_scenario(&mut topo, case)?;

    let mut console = EmulatorConsole::connect(opts.console_port)?;
    console.build_topology(&topo)?;
    console.start()?;

    info!("waiting for the network to settle");
    thread::sleep(Duration::from_secs(SETTLE_WAIT_S));

    let mut registry = FlowRegistry::new(topology::flows(kind));
    let audit = AuditApi::new(opts.audit_api.clone());
    controller::deploy_flows(&mut registry, &audit, opts.deploy_flows)?;

    let interfaces = sniffer::probe_interfaces(&topo, opts.probe_hop);
    info!("sniffing on {} interfaces at hop {}", interfaces.len(), opts.probe_hop);
    let on_establish: ProbeCallback = {
        let api = audit.clone();
        Arc::new(move |probe| {
            if let Err(e) = api.set_reference_signature(probe) {
                warn!("cannot store the reference signature: {}", e);
            }
        })
    };
    let on_log: ProbeCallback = {
        let api = audit.clone();
        Arc::new(move |probe| {
            if let Err(e) = api.log_probe(probe) {
                warn!("cannot log the probe: {}", e);
            }
        })
    };
    let sniffer = sniffer::start_sniffing(interfaces, on_establish, on_log);

    let mut session = Session {
        registry,
        topology: topo,
        console,
        audit,
        control_plane_host: opts.control_plane_host.clone(),
    };
    let loop_result = operator_loop(&mut session);

    // time to finish writing the logs of in-flight captures
    thread::sleep(Duration::from_secs(DRAIN_WAIT_S));
    info!("stopping the sniffer");
    let sniffer_result = sniffer.stop();

    session.console.stop()?;

    loop_result?;
    sniffer_result?;
    info!("run finished");
    Ok(())
}
