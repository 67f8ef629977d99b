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

//! Stateless classification of captured path-integrity probes.
//!
//! The data plane stamps every probe with the ingress timestamp and
//! accumulates a keyed per-hop hash along the path. The very first probe of a
//! flow session carries `l_hash == timestamp` by construction (the timestamp
//! seeds the hash chain before any hop touched it), which makes it the
//! session's reference signature: it establishes the expected per-hop hash
//! baseline that the audit service compares all later probes against.

/// The decoded layers of one captured echo-request probe.
///
/// This is plain data, produced by the capture boundary; probes whose layers
/// do not decode never reach this type, and probes that are not echo requests
/// are dropped upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedProbe {
    /// Name of the interface the probe was captured on.
    pub interface: String,
    /// Source address of the outer Ethernet frame.
    pub eth_src: [u8; 6],
    /// Destination address of the outer Ethernet frame.
    pub eth_dst: [u8; 6],
    /// Route identifier carried in the source-routing header.
    pub route_id: u128,
    /// Ingress timestamp stamped by the first hop.
    pub timestamp: u32,
    /// Running per-hop hash accumulated along the path so far.
    pub l_hash: u32,
}

/// Outcome of classifying one captured probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// First probe of a flow session: establishes the expected hash-chain
    /// baseline.
    EstablishReference,
    /// Subsequent probe: to be logged and checked against the baseline.
    LogForCompliance,
}

/// Classify a captured echo-request probe.
///
/// Exactly one probe per flow session satisfies `timestamp == l_hash` and
/// becomes the reference signature; every other probe is handed to the audit
/// service for the compliance check.
pub fn classify(probe: &CapturedProbe) -> Classification {
    if probe.timestamp == probe.l_hash {
        Classification::EstablishReference
    } else {
        Classification::LogForCompliance
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn probe(timestamp: u32, l_hash: u32) -> CapturedProbe {
        CapturedProbe {
            interface: String::from("s2-eth2"),
            eth_src: [0, 0, 0, 0, 0, 1],
            eth_dst: [0, 0, 0, 0, 0, 10],
            route_id: 0x1234_5678_9abc_def0,
            timestamp,
            l_hash,
        }
    }

    #[test]
    fn reference_signature_iff_hash_equals_timestamp() {
        assert_eq!(classify(&probe(0, 0)), Classification::EstablishReference);
        assert_eq!(
            classify(&probe(0xdead_beef, 0xdead_beef)),
            Classification::EstablishReference
        );
        assert_eq!(
            classify(&probe(0xdead_beef, 0xdead_bee0)),
            Classification::LogForCompliance
        );
        assert_eq!(classify(&probe(1, 0)), Classification::LogForCompliance);
    }
}
