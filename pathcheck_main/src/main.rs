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

use pathcheck::topology::{self, ScenarioCase, TopologyKind};
use pathcheck_runtime::controller::{self, Action, ControllerError, FlowSelector, Outcome};
use pathcheck_runtime::{run_scenario, RunOptions, Session};

use clap::{Parser, ValueEnum};
use log::*;
use std::error::Error;
use std::io::{self, Write};

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = Args::parse();

    let kind = match args.topology {
        Some(t) => t.into(),
        None => choose_topology()?,
    };
    let case = match kind {
        TopologyKind::Linear => match args.case {
            Some(c) => c.into(),
            None => choose_case()?,
        },
        TopologyKind::Simple => ScenarioCase::Default,
    };
    let deploy_flows = args.deploy_flows || ask_deploy()?;

    let opts = RunOptions {
        console_port: args.console_port,
        audit_api: args.audit_api,
        control_plane_host: args.control_plane_host,
        probe_hop: args.probe_hop.unwrap_or_else(|| topology::probe_hop(kind)),
        deploy_flows,
    };
    info!("running the {:?} topology with the {:?} case", kind, case);
    run_scenario(kind, case, &opts, operator_loop)
}

/// This is the binary to operate the path-integrity testbed. It builds the
/// chosen topology, applies the tampering case, starts the network inside
/// the emulator, and drops into the interactive audit menu. Anything not
/// given on the command line is asked interactively.
#[derive(Parser, Debug)]
#[clap(name = "Pathcheck (Binary)", author = "Tibor Schneider")]
struct Args {
    /// Topology to run
    #[clap(long, value_enum)]
    topology: Option<TopologyArg>,
    /// Tampering case, for the linear topology only
    #[clap(long, value_enum)]
    case: Option<CaseArg>,
    /// Local port of the network emulator console
    #[clap(long, default_value_t = 6023)]
    console_port: u16,
    /// Base URL of the audit service
    #[clap(long, default_value = "http://localhost:3000/api")]
    audit_api: String,
    /// Host running the switch control-plane services
    #[clap(long, default_value = "localhost")]
    control_plane_host: String,
    /// Hop position observed by the sniffer (defaults per topology)
    #[clap(long)]
    probe_hop: Option<u16>,
    /// Register each flow with the flow-contract service (skips the prompt)
    #[clap(short = 'd', long)]
    deploy_flows: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TopologyArg {
    Simple,
    Linear,
}

impl From<TopologyArg> for TopologyKind {
    fn from(arg: TopologyArg) -> Self {
        match arg {
            TopologyArg::Simple => TopologyKind::Simple,
            TopologyArg::Linear => TopologyKind::Linear,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum CaseArg {
    Default,
    Addition,
    PartialDetour,
    CompleteDetour,
    OutOfOrder,
    Skipping,
}

impl From<CaseArg> for ScenarioCase {
    fn from(arg: CaseArg) -> Self {
        match arg {
            CaseArg::Default => ScenarioCase::Default,
            CaseArg::Addition => ScenarioCase::Addition,
            CaseArg::PartialDetour => ScenarioCase::PartialDetour,
            CaseArg::CompleteDetour => ScenarioCase::CompleteDetour,
            CaseArg::OutOfOrder => ScenarioCase::OutOfOrder,
            CaseArg::Skipping => ScenarioCase::Skipping,
        }
    }
}

const ACTION_MENU: &str = "
*** (1)-Send Probe
*** (2)-Compliance
*** (3)-Compliance Consolidation
*** (4)-Change Route
*** (5)-Exit";

/// The interactive audit loop: a thin I/O adapter translating menu input
/// into [`Action`] values. Invalid input re-prompts, it never terminates the
/// run; only recoverable errors can come back from the dispatcher.
fn operator_loop(session: &mut Session) -> Result<(), Box<dyn Error>> {
    loop {
        println!("{}", ACTION_MENU);
        let choice = prompt("--- Action: ")?;
        let action = match choice.as_str() {
            "1" => match read_send_probe(session)? {
                Some(action) => action,
                None => continue,
            },
            "2" => match read_flow_selector(session)? {
                Some(flow) => Action::QueryCompliance { flow },
                None => continue,
            },
            "3" => match read_flow_index(session)? {
                Some(flow) => Action::QueryComplianceConsolidation { flow },
                None => continue,
            },
            "4" => match read_change_route(session)? {
                Some(action) => action,
                None => continue,
            },
            "5" => Action::Exit,
            _ => {
                println!("*** Invalid action");
                continue;
            }
        };
        match controller::dispatch(session, action) {
            Ok(Outcome::Exit) => break,
            Ok(outcome) => render(outcome),
            Err(ControllerError::InvalidSelection(what)) => {
                println!("*** Invalid value of {}", what)
            }
            Err(e) => {
                error!("action failed: {}", e);
                println!("*** Action failed: {}", e);
            }
        }
    }
    Ok(())
}

fn render(outcome: Outcome) {
    match outcome {
        Outcome::ProbesSent(n) => println!("*** Probing {} flow(s)", n),
        Outcome::Compliance(reports) => {
            for report in reports {
                println!("{}", report);
            }
        }
        Outcome::RouteUnchanged(_) => println!("*** This route is the current route"),
        Outcome::RouteChanged { old, new } => {
            println!("*** Route changed: {:#018x} -> {:#018x}", old, new)
        }
        Outcome::Exit => {}
    }
}

fn choose_topology() -> Result<TopologyKind, Box<dyn Error>> {
    loop {
        println!("\n*** (1)-Simple\n*** (2)-Linear");
        match prompt("--- Topology: ")?.as_str() {
            "1" => return Ok(TopologyKind::Simple),
            "2" => return Ok(TopologyKind::Linear),
            _ => println!("*** Invalid topology!"),
        }
    }
}

fn choose_case() -> Result<ScenarioCase, Box<dyn Error>> {
    loop {
        println!(
            "\n*** (1)-Default\n*** (2)-Addition\n*** (3)-Partial Detour\
             \n*** (4)-Complete Detour\n*** (5)-Out of Order\n*** (6)-Skipping"
        );
        match prompt("--- Case: ")?.as_str() {
            "1" => return Ok(ScenarioCase::Default),
            "2" => return Ok(ScenarioCase::Addition),
            "3" => return Ok(ScenarioCase::PartialDetour),
            "4" => return Ok(ScenarioCase::CompleteDetour),
            "5" => return Ok(ScenarioCase::OutOfOrder),
            "6" => return Ok(ScenarioCase::Skipping),
            _ => println!("*** Invalid case!"),
        }
    }
}

fn ask_deploy() -> Result<bool, Box<dyn Error>> {
    Ok(prompt("--- Deploy flow[y/n]: ")? == "y")
}

fn print_flows(session: &Session, with_all: bool) {
    println!("\n*** Choose the flow:");
    for (index, flow) in session.registry.flows() {
        println!("    *** ({})-Flow (from {} -> to {})", index, flow.host_src, flow.host_dst);
    }
    if with_all {
        println!("    *** ({})-All flows", session.registry.len());
    }
}

fn read_flow_selector(session: &Session) -> Result<Option<FlowSelector>, Box<dyn Error>> {
    print_flows(session, true);
    let index: usize = match prompt("--- Flow: ")?.parse() {
        Ok(index) => index,
        Err(_) => {
            println!("*** Invalid value of Flow");
            return Ok(None);
        }
    };
    if index == session.registry.len() {
        Ok(Some(FlowSelector::All))
    } else {
        Ok(Some(FlowSelector::One(index)))
    }
}

fn read_flow_index(session: &Session) -> Result<Option<usize>, Box<dyn Error>> {
    print_flows(session, false);
    match prompt("--- Flow: ")?.parse() {
        Ok(index) => Ok(Some(index)),
        Err(_) => {
            println!("*** Invalid value of Flow");
            Ok(None)
        }
    }
}

fn read_send_probe(session: &Session) -> Result<Option<Action>, Box<dyn Error>> {
    let flow = match read_flow_selector(session)? {
        Some(flow) => flow,
        None => return Ok(None),
    };
    let interval = prompt("--- -i(seconds): ")?;
    let count = prompt("--- -c(qtt): ")?;
    match (interval.parse::<f64>(), count.parse::<u32>()) {
        (Ok(interval_s), Ok(count)) => Ok(Some(Action::SendProbe { flow, interval_s, count })),
        _ => {
            println!("*** Invalid values of -i/-c");
            Ok(None)
        }
    }
}

fn read_change_route(session: &Session) -> Result<Option<Action>, Box<dyn Error>> {
    print_flows(session, false);
    let flow: usize = match prompt("--- Flow: ")?.parse() {
        Ok(index) => index,
        Err(_) => {
            println!("*** Invalid value of Flow");
            return Ok(None);
        }
    };
    if let Some(f) = session.registry.get(flow) {
        println!();
        for (route_index, route_id) in f.routes.iter() {
            let marker = if *route_id == f.current_route { " (current)" } else { "" };
            println!("    *** ({})-{:#018x}{}", route_index, route_id, marker);
        }
    }
    let route: usize = match prompt("--- Route: ")?.parse() {
        Ok(index) => index,
        Err(_) => {
            println!("*** Invalid value of Route");
            return Ok(None);
        }
    };
    Ok(Some(Action::ChangeRoute { flow, route }))
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(line.trim().to_string())
}
