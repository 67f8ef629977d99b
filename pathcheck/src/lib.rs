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

#![deny(missing_docs)]

//! # Pathcheck: Path-Integrity Verification for Source-Routed Data Planes
//!
//! This is a library for operating a path-integrity verification testbed on
//! multi-hop, source-routed data-plane networks. It builds a forwarding
//! topology, optionally mutates it into one of several route-tampering
//! scenarios, and classifies the path-integrity probes captured from the
//! running network.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`Topology`](topology::Topology)**: The forwarding topology as a graph
//!   of switches, hosts and port-carrying links, along with the builders for
//!   the prepared testbed topologies and the
//!   [scenario transforms](topology::ScenarioCase) which tamper with the
//!   default path while keeping the end hosts reachable.
//!
//! - **[`FlowRegistry`](flows::FlowRegistry)**: The tracked traffic classes,
//!   their derived identifiers, and their pre-provisioned alternate routes.
//!   The registry is an owned value, passed explicitly to every component
//!   that needs it.
//!
//! - **[`classify`](classifier::classify)**: The stateless predicate deciding
//!   whether a captured probe establishes the reference signature of its
//!   flow session, or must be logged and checked against that baseline.
//!
//! The capture feed, the switch control plane and the audit service are
//! external collaborators; this crate only defines the data they exchange.

pub mod classifier;
pub mod error;
pub mod flows;
pub mod topology;

pub use error::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stopper, to check when to stop, or to send the stop command. Cloned handles
/// share the same flag.
#[derive(Clone, Debug)]
pub struct Stopper {
    b: Arc<AtomicBool>,
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopper {
    /// Create a new stopper
    pub fn new() -> Self {
        Self { b: Arc::new(AtomicBool::new(false)) }
    }

    /// Send the stop command to every clone of this stopper.
    pub fn send_stop(&self) {
        self.b.store(true, Ordering::SeqCst);
    }

    /// Checks if the stop flag is set.
    pub fn is_stop(&self) -> bool {
        self.b.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stopper_is_shared() {
        let a = Stopper::new();
        let b = a.clone();
        assert!(!a.is_stop());
        b.send_stop();
        assert!(a.is_stop());
        assert!(b.is_stop());
    }
}
