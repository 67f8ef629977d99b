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

//! Live capture of probes across one hop of the topology.
//!
//! The sniffer observes a fixed hop position network-wide: one capture worker
//! per interface named `s<n>-eth<hop>`. Workers run asynchronously to the
//! operator loop, preserve per-interface arrival order (cross-interface order
//! is neither guaranteed nor needed), and stop cooperatively through a shared
//! [`Stopper`]. The sniffer must be stopped before the emulated network is
//! torn down, so no worker decodes frames from an interface that is mid
//! teardown.

use crate::probe::{decode_probe, ProbeError};
use pathcheck::classifier::{classify, CapturedProbe, Classification};
use pathcheck::topology::Topology;
use pathcheck::Stopper;

use log::*;
use pcap::Capture;
use regex::Regex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Snapshot length of the capture. Probes are small; this is generous.
const SNAPLEN: i32 = 2048;

/// Read timeout of the capture in milliseconds. Bounds how long a worker
/// needs to notice the stop flag on a silent interface.
const READ_TIMEOUT_MS: i32 = 100;

/// Callback invoked with a classified probe.
pub type ProbeCallback = Arc<dyn Fn(&CapturedProbe) + Send + Sync>;

/// Errors terminating a capture worker.
#[derive(Debug, Error)]
pub enum SnifferError {
    /// The capture device could not be opened or read.
    #[error("capture failed on {iface}: {source}")]
    Capture {
        /// interface of the failing worker
        iface: String,
        /// underlying capture error
        source: pcap::Error,
    },
    /// A captured frame claimed to be a probe but failed to decode. This is
    /// a testbed-setup bug, not a runtime condition to recover from.
    #[error(transparent)]
    MalformedProbe(#[from] ProbeError),
}

/// The interfaces observing hop position `hop` network-wide: every switch
/// interface matching `s<n>-eth<hop>`.
pub fn probe_interfaces(topology: &Topology, hop: u16) -> Vec<String> {
    let iname = Regex::new(&format!(r"^s\d+-eth{}$", hop)).unwrap();
    topology
        .interfaces()
        .into_iter()
        .filter(|iface| iname.is_match(iface))
        .collect()
}

/// Handle of a running sniffer.
#[derive(Debug)]
pub struct SnifferHandle {
    stopper: Stopper,
    workers: Vec<JoinHandle<Result<(), SnifferError>>>,
}

impl SnifferHandle {
    /// Number of capture workers (one per observed interface).
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers, wait for in-flight captures to flush, and surface
    /// the first worker error if one occurred.
    pub fn stop(self) -> Result<(), SnifferError> {
        self.stopper.send_stop();
        let mut first_error = None;
        for worker in self.workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("capture worker failed: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => warn!("capture worker panicked"),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Start capturing on the given interfaces, dispatching every classified
/// probe to `on_establish` or `on_log`. Capture is asynchronous to the
/// caller; stop it through the returned handle.
pub fn start_sniffing(
    interfaces: Vec<String>,
    on_establish: ProbeCallback,
    on_log: ProbeCallback,
) -> SnifferHandle {
    let stopper = Stopper::new();
    let workers = interfaces
        .into_iter()
        .map(|iface| {
            let stopper = stopper.clone();
            let on_establish = on_establish.clone();
            let on_log = on_log.clone();
            thread::spawn(move || capture_loop(iface, stopper, on_establish, on_log))
        })
        .collect();
    SnifferHandle { stopper, workers }
}

fn capture_loop(
    iface: String,
    stopper: Stopper,
    on_establish: ProbeCallback,
    on_log: ProbeCallback,
) -> Result<(), SnifferError> {
    let mut capture = Capture::from_device(iface.as_str())
        .and_then(|c| c.promisc(true).snaplen(SNAPLEN).timeout(READ_TIMEOUT_MS).open())
        .map_err(|source| SnifferError::Capture { iface: iface.clone(), source })?;
    debug!("capturing on {}", iface);

    while !stopper.is_stop() {
        let packet = match capture.next() {
            Ok(p) => p,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(source) => return Err(SnifferError::Capture { iface: iface.clone(), source }),
        };
        match decode_probe(&iface, packet.data) {
            Ok(Some(probe)) => match classify(&probe) {
                Classification::EstablishReference => on_establish(&probe),
                Classification::LogForCompliance => on_log(&probe),
            },
            Ok(None) => {}
            Err(e) => {
                error!("malformed probe on {}: {}", iface, e);
                return Err(e.into());
            }
        }
    }
    debug!("capture on {} stopped", iface);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pathcheck::topology::{apply_scenario, linear_topology, ScenarioCase};

    #[test]
    fn hop_interfaces_cover_every_switch() {
        let topo = linear_topology();
        let ifaces = probe_interfaces(&topo, 2);
        // every switch has an ingress-from-previous-hop port 2 (for s1 it is
        // the port towards s2)
        assert_eq!(ifaces.len(), 10);
        assert!(ifaces.contains(&String::from("s1-eth2")));
        assert!(ifaces.contains(&String::from("s10-eth2")));
        assert!(!ifaces.iter().any(|i| i.ends_with("eth3")));
    }

    #[test]
    fn hop_interfaces_follow_the_mutated_topology() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::Skipping).unwrap();
        let ifaces = probe_interfaces(&topo, 2);
        // the skipped switch no longer has a hop-2 interface
        assert!(!ifaces.contains(&String::from("s5-eth2")));
        assert!(ifaces.contains(&String::from("s6-eth2")));
        assert_eq!(ifaces.len(), 9);
    }

    #[test]
    fn hop_interfaces_include_inserted_relays() {
        let mut topo = linear_topology();
        apply_scenario(&mut topo, ScenarioCase::Addition).unwrap();
        let ifaces = probe_interfaces(&topo, 2);
        // the relay's ports are 0 and 1, so it never shows up at hop 2, but
        // s6 is still observed through its re-created ingress link
        assert!(ifaces.contains(&String::from("s6-eth2")));
        assert!(!ifaces.iter().any(|i| i.starts_with("s555")));
    }

    #[test]
    fn stopping_without_devices_is_clean() {
        let on_establish: ProbeCallback = Arc::new(|_| {});
        let on_log: ProbeCallback = Arc::new(|_| {});
        // no interfaces: no workers, stop returns immediately
        let handle = start_sniffing(Vec::new(), on_establish, on_log);
        assert_eq!(handle.num_workers(), 0);
        handle.stop().unwrap();
    }
}
