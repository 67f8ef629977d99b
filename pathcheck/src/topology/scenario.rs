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

//! Route-tampering scenarios over the linear chain.
//!
//! Every scenario compiles to a declarative [`ScenarioPlan`]: a list of link
//! removals, switch insertions and link insertions, interpreted by the single
//! generic [`Topology::apply_plan`]. New scenarios are data, not code.
//!
//! Each removal must remove exactly one link. Removing zero means the
//! scenario targets a link that is not there; removing two or more means the
//! chain is not the one the scenario was written for. Both abort the run
//! before the network starts.

use super::builders::LINEAR_CHAIN_LEN;
use super::{Topology, TopologyError, LINK_SPEED, THRIFT_PORT_BASE};

use log::*;

/// The route-tampering scenario applied to the linear chain before start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioCase {
    /// Leave the topology untouched.
    Default,
    /// Insert a rogue relay in series on the path: the s5--s6 link is
    /// replaced by s5 -- s555 -- s6.
    Addition,
    /// Bypass s6 through a rogue relay while keeping s6 wired up on a side
    /// path, off the primary route.
    PartialDetour,
    /// Replace the entire chain between the first and the last switch with a
    /// chain of rogue relays.
    CompleteDetour,
    /// Re-link four consecutive switches out of their original sequence
    /// (s4 -> s6 -> s5 -> s7), keeping the chain fully connected.
    OutOfOrder,
    /// Physically exclude s5 from the path by connecting its former
    /// neighbors directly.
    Skipping,
}

/// One planned link removal, addressed by node names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRemoval {
    /// first endpoint
    pub a: String,
    /// second endpoint
    pub b: String,
}

/// One switch inserted by a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInsertion {
    /// name of the new switch
    pub name: String,
    /// control-plane port of the new switch
    pub thrift_port: u16,
}

/// One link inserted by a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInsertion {
    /// first endpoint
    pub a: String,
    /// port on the first endpoint
    pub port_a: u16,
    /// second endpoint
    pub b: String,
    /// port on the second endpoint
    pub port_b: u16,
}

/// Declarative description of one scenario transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioPlan {
    /// links to remove, each removing exactly one link
    pub removals: Vec<LinkRemoval>,
    /// rogue switches to insert
    pub new_switches: Vec<SwitchInsertion>,
    /// links to insert after the removals
    pub new_links: Vec<LinkInsertion>,
}

fn removal(a: &str, b: &str) -> LinkRemoval {
    LinkRemoval { a: a.to_string(), b: b.to_string() }
}

fn attacker(name: &str, n: u16) -> SwitchInsertion {
    SwitchInsertion { name: name.to_string(), thrift_port: THRIFT_PORT_BASE + n }
}

fn link(a: &str, port_a: u16, b: &str, port_b: u16) -> LinkInsertion {
    LinkInsertion { a: a.to_string(), port_a, b: b.to_string(), port_b }
}

impl ScenarioCase {
    /// Compile the scenario into its plan over the given topology.
    ///
    /// The mutating cases address fixed positions of the ten-switch chain;
    /// any other chain length is rejected instead of silently mis-indexed.
    pub fn plan(self, topology: &Topology) -> Result<ScenarioPlan, TopologyError> {
        if self == ScenarioCase::Default {
            return Ok(ScenarioPlan::default());
        }
        let s: Vec<String> = topology
            .switches()
            .iter()
            .map(|id| topology.node(*id).name().to_string())
            .collect();
        if s.len() != LINEAR_CHAIN_LEN {
            return Err(TopologyError::WrongTopologySize {
                expected: LINEAR_CHAIN_LEN,
                actual: s.len(),
            });
        }

        Ok(match self {
            ScenarioCase::Default => unreachable!("handled above"),
            ScenarioCase::Addition => ScenarioPlan {
                removals: vec![removal(&s[4], &s[5])],
                new_switches: vec![attacker("s555", 555)],
                new_links: vec![
                    // the relay takes over the default next-hop port of s5
                    link(&s[4], 3, "s555", 0),
                    link("s555", 1, &s[5], 2),
                ],
            },
            ScenarioCase::PartialDetour => ScenarioPlan {
                removals: vec![removal(&s[4], &s[5]), removal(&s[6], &s[5])],
                new_switches: vec![attacker("s555", 555)],
                new_links: vec![
                    link(&s[4], 3, "s555", 0),
                    link("s555", 1, &s[6], 4),
                    // re-link the bypassed switch on a side path
                    link(&s[4], 4, &s[5], 2),
                    link(&s[5], 4, &s[6], 2),
                ],
            },
            ScenarioCase::CompleteDetour => {
                let mut new_switches = Vec::new();
                let mut new_links = vec![link(&s[0], 2, "s222", 0)];
                let mut previous = String::from("s222");
                new_switches.push(attacker(&previous, 222));
                for i in 3..LINEAR_CHAIN_LEN {
                    let name = format!("s{}{}{}", i, i, i);
                    new_switches.push(attacker(&name, (111 * i) as u16));
                    new_links.push(link(&previous, 1, &name, 0));
                    previous = name;
                }
                new_links.push(link(&previous, 1, &s[9], 2));
                ScenarioPlan {
                    removals: vec![removal(&s[0], &s[1]), removal(&s[9], &s[8])],
                    new_switches,
                    new_links,
                }
            }
            ScenarioCase::OutOfOrder => ScenarioPlan {
                removals: vec![
                    removal(&s[3], &s[4]),
                    removal(&s[4], &s[5]),
                    removal(&s[5], &s[6]),
                ],
                new_switches: vec![],
                new_links: vec![
                    link(&s[3], 3, &s[5], 2),
                    link(&s[5], 3, &s[4], 2),
                    link(&s[4], 3, &s[6], 2),
                ],
            },
            ScenarioCase::Skipping => ScenarioPlan {
                removals: vec![removal(&s[4], &s[5]), removal(&s[4], &s[3])],
                new_switches: vec![],
                new_links: vec![link(&s[3], 3, &s[5], 2)],
            },
        })
    }
}

impl Topology {
    /// Interpret a scenario plan: apply the removals (each must remove
    /// exactly one link), then insert the new switches and links.
    pub fn apply_plan(&mut self, plan: &ScenarioPlan) -> Result<(), TopologyError> {
        for rm in plan.removals.iter() {
            let a = self.node_by_name(&rm.a)?;
            let b = self.node_by_name(&rm.b)?;
            let removed = self.del_link_between(a, b);
            if removed.len() != 1 {
                return Err(TopologyError::StructuralPrecondition {
                    a: rm.a.clone(),
                    b: rm.b.clone(),
                    removed: removed.len(),
                });
            }
            info!("removed link {} -- {}", rm.a, rm.b);
        }
        for sw in plan.new_switches.iter() {
            debug!("inserting switch {} (control plane on {})", sw.name, sw.thrift_port);
            self.add_switch(&sw.name, sw.thrift_port);
        }
        for l in plan.new_links.iter() {
            let a = self.node_by_name(&l.a)?;
            let b = self.node_by_name(&l.b)?;
            self.add_link(a, b, l.port_a, l.port_b, LINK_SPEED);
            info!("created link {}:{} -- {}:{}", l.a, l.port_a, l.b, l.port_b);
        }
        Ok(())
    }
}

/// Apply the scenario to the topology and verify that the end hosts can
/// still reach each other. Tampered paths that drop traffic would not
/// exercise the integrity mechanism at all.
pub fn apply_scenario(
    topology: &mut Topology,
    case: ScenarioCase,
) -> Result<(), TopologyError> {
    if case == ScenarioCase::Default {
        info!("leaving the topology untouched");
        return Ok(());
    }
    info!("applying the {:?} scenario", case);
    let plan = case.plan(topology)?;
    topology.apply_plan(&plan)?;

    let (first, last) = match (topology.hosts().first(), topology.hosts().last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Ok(()),
    };
    if !topology.is_connected(first, last) {
        return Err(TopologyError::Disconnected {
            a: topology.node(first).name().to_string(),
            b: topology.node(last).name().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::builders::{linear_topology, simple_topology};
    use super::*;
    use std::collections::HashSet;

    /// set of links as (name, name) pairs, orientation normalized
    fn link_set(topo: &Topology) -> HashSet<(String, String)> {
        topo.links()
            .into_iter()
            .map(|(a, b, _)| {
                let mut pair =
                    [topo.node(a).name().to_string(), topo.node(b).name().to_string()];
                pair.sort();
                (pair[0].clone(), pair[1].clone())
            })
            .collect()
    }

    fn mutating_cases() -> Vec<ScenarioCase> {
        vec![
            ScenarioCase::Addition,
            ScenarioCase::PartialDetour,
            ScenarioCase::CompleteDetour,
            ScenarioCase::OutOfOrder,
            ScenarioCase::Skipping,
        ]
    }

    #[test]
    fn every_case_keeps_hosts_connected_and_changes_the_path() {
        for case in mutating_cases() {
            let mut topo = linear_topology();
            let before = link_set(&topo);
            apply_scenario(&mut topo, case).unwrap();
            let after = link_set(&topo);

            let h1 = topo.node_by_name("h1").unwrap();
            let h10 = topo.node_by_name("h10").unwrap();
            assert!(topo.is_connected(h1, h10), "{:?} disconnected the end hosts", case);
            assert_ne!(before, after, "{:?} left the link set unchanged", case);
        }
    }

    #[test]
    fn default_case_changes_nothing() {
        let mut topo = linear_topology();
        let before = link_set(&topo);
        apply_scenario(&mut topo, ScenarioCase::Default).unwrap();
        assert_eq!(before, link_set(&topo));
    }

    #[test]
    fn addition_inserts_the_relay_in_series() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::Addition).unwrap();

        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        let s555 = topo.node_by_name("s555").unwrap();
        assert_eq!(topo.num_links_between(s5, s6), 0);
        assert_eq!(topo.ports_between(s5, s555), Some((3, 0)));
        assert_eq!(topo.ports_between(s555, s6), Some((1, 2)));
    }

    #[test]
    fn partial_detour_keeps_the_bypassed_switch_wired() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::PartialDetour).unwrap();

        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        let s7 = topo.node_by_name("s7").unwrap();
        let s555 = topo.node_by_name("s555").unwrap();
        // the relay bridges s5 -> s7 directly
        assert_eq!(topo.ports_between(s5, s555), Some((3, 0)));
        assert_eq!(topo.ports_between(s555, s7), Some((1, 4)));
        // s6 stays physically connected, on a side path
        assert_eq!(topo.ports_between(s5, s6), Some((4, 2)));
        assert_eq!(topo.ports_between(s6, s7), Some((4, 2)));
    }

    #[test]
    fn complete_detour_replaces_the_whole_chain() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::CompleteDetour).unwrap();

        let s1 = topo.node_by_name("s1").unwrap();
        let s2 = topo.node_by_name("s2").unwrap();
        let s9 = topo.node_by_name("s9").unwrap();
        let s10 = topo.node_by_name("s10").unwrap();
        assert_eq!(topo.num_links_between(s1, s2), 0);
        assert_eq!(topo.num_links_between(s9, s10), 0);

        // eight relays wired in series from s1 to s10
        assert_eq!(topo.switches().len(), 18);
        let s222 = topo.node_by_name("s222").unwrap();
        let s999 = topo.node_by_name("s999").unwrap();
        assert_eq!(topo.ports_between(s1, s222), Some((2, 0)));
        assert_eq!(topo.ports_between(s999, s10), Some((1, 2)));
    }

    #[test]
    fn out_of_order_permutes_but_connects() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::OutOfOrder).unwrap();

        let s4 = topo.node_by_name("s4").unwrap();
        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        let s7 = topo.node_by_name("s7").unwrap();
        // new order along the chain: s4 -> s6 -> s5 -> s7
        assert_eq!(topo.ports_between(s4, s6), Some((3, 2)));
        assert_eq!(topo.ports_between(s6, s5), Some((3, 2)));
        assert_eq!(topo.ports_between(s5, s7), Some((3, 2)));
        assert_eq!(topo.num_links_between(s4, s5), 0);
        assert_eq!(topo.num_links_between(s6, s7), 0);
    }

    #[test]
    fn skipping_excludes_the_interior_switch() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::Skipping).unwrap();

        let s4 = topo.node_by_name("s4").unwrap();
        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        assert_eq!(topo.num_links_between(s4, s5), 0);
        assert_eq!(topo.num_links_between(s5, s6), 0);
        assert_eq!(topo.ports_between(s4, s6), Some((3, 2)));
        // only the host link remains on the skipped switch
        assert_eq!(topo.degree(s5), 1);

        // hosts on either side of the skipped switch still reach each other
        let h4 = topo.node_by_name("h4").unwrap();
        let h6 = topo.node_by_name("h6").unwrap();
        assert!(topo.is_connected(h4, h6));
    }

    #[test]
    fn missing_link_violates_the_precondition() {
        let mut topo = linear_topology();
        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        // sabotage the chain: the link targeted by the scenario is gone
        topo.del_link_between(s5, s6);

        let plan = ScenarioCase::Addition.plan(&topo).unwrap();
        assert_eq!(
            topo.apply_plan(&plan),
            Err(TopologyError::StructuralPrecondition {
                a: String::from("s5"),
                b: String::from("s6"),
                removed: 0,
            })
        );
    }

    #[test]
    fn parallel_links_violate_the_precondition() {
        let mut topo = linear_topology();
        let s5 = topo.node_by_name("s5").unwrap();
        let s6 = topo.node_by_name("s6").unwrap();
        topo.add_link(s5, s6, 5, 5, LINK_SPEED);

        let plan = ScenarioCase::Addition.plan(&topo).unwrap();
        assert_eq!(
            topo.apply_plan(&plan),
            Err(TopologyError::StructuralPrecondition {
                a: String::from("s5"),
                b: String::from("s6"),
                removed: 2,
            })
        );
    }

    #[test]
    fn wrong_chain_length_is_rejected() {
        let topo = simple_topology();
        for case in mutating_cases() {
            assert_eq!(
                case.plan(&topo),
                Err(TopologyError::WrongTopologySize { expected: 10, actual: 3 }),
                "{:?} accepted a three-switch chain",
                case
            );
        }
    }
}
