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

//! Client for the flow-contract and compliance audit service.
//!
//! The audit service keeps the per-flow reference signatures, collects the
//! logged probes, and answers compliance queries against the ledger backing
//! the flow contracts. Its internals are out of scope here; this is the HTTP
//! call boundary only. All calls are fire-and-forget or simple queries:
//! errors are reported to the operator, never retried.

use pathcheck::classifier::CapturedProbe;
use pathcheck::flows::{FlowId, RouteId};

use isahc::prelude::*;
use log::*;
use serde::Serialize;
use thiserror::Error;

/// # Audit service error type
#[derive(Debug, Error)]
pub enum AuditError {
    /// Error during handling of the HTTP request
    #[error("HTTP Error: {0}")]
    Http(#[from] isahc::Error),
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// Cannot serialize the request payload
    #[error("cannot encode the request: {0}")]
    Json(#[from] serde_json::Error),
    /// The service answered with a non-success status
    #[error("audit service answered {0}. Message:\n{1}")]
    Status(u16, String),
}

/// Ledger operations the route controller needs. Implemented by the live
/// [`AuditApi`]; tests substitute a recorder.
pub trait FlowLedger {
    /// Record the deployment of a flow on its initial route.
    fn deploy_flow_contract(&self, flow_id: FlowId, route_id: RouteId) -> Result<(), AuditError>;
    /// Record that a flow moved onto another pre-provisioned route.
    fn set_new_route(&self, flow_id: FlowId, route_id: RouteId) -> Result<(), AuditError>;
}

/// # Audit service client
///
/// Thin HTTP client for the audit service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditApi {
    base: String,
}

#[derive(Debug, Serialize)]
struct ProbeRecord {
    interface: String,
    route_id: String,
    timestamp: u32,
    l_hash: u32,
}

impl From<&CapturedProbe> for ProbeRecord {
    fn from(probe: &CapturedProbe) -> Self {
        Self {
            interface: probe.interface.clone(),
            route_id: format!("{:032x}", probe.route_id),
            timestamp: probe.timestamp,
            l_hash: probe.l_hash,
        }
    }
}

#[derive(Debug, Serialize)]
struct FlowRouteRecord {
    flow_id: String,
    route_id: RouteId,
}

impl AuditApi {
    /// Create a client for the audit service at the given base URL.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Store a probe as the reference signature of its flow session.
    pub fn set_reference_signature(&self, probe: &CapturedProbe) -> Result<(), AuditError> {
        debug!("storing reference signature from {}", probe.interface);
        self.request_post("reference_signature", serde_json::to_string(&ProbeRecord::from(probe))?)?;
        Ok(())
    }

    /// Log a probe for the compliance check against the reference signature.
    pub fn log_probe(&self, probe: &CapturedProbe) -> Result<(), AuditError> {
        self.request_post("probes", serde_json::to_string(&ProbeRecord::from(probe))?)?;
        Ok(())
    }

    /// Query the per-probe compliance verdicts of a flow.
    pub fn flow_compliance(&self, flow_id: FlowId) -> Result<String, AuditError> {
        self.request_get(format!("compliance/{}", flow_id))
    }

    /// Query the consolidated compliance verdict of a flow.
    pub fn flow_compliance_consolidation(&self, flow_id: FlowId) -> Result<String, AuditError> {
        self.request_get(format!("compliance/{}/consolidation", flow_id))
    }

    fn request_get(&self, key: impl AsRef<str>) -> Result<String, AuditError> {
        let addr = format!("{}/{}", self.base, key.as_ref());
        self.handle_response(isahc::get(&addr)?)
    }

    fn request_post(&self, key: impl AsRef<str>, data: String) -> Result<String, AuditError> {
        let addr = format!("{}/{}", self.base, key.as_ref());
        self.handle_response(isahc::post(&addr, data)?)
    }

    fn handle_response(&self, mut response: Response<Body>) -> Result<String, AuditError> {
        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::Status(status.as_u16(), response.text()?));
        }
        Ok(response.text()?)
    }
}

impl FlowLedger for AuditApi {
    fn deploy_flow_contract(&self, flow_id: FlowId, route_id: RouteId) -> Result<(), AuditError> {
        info!("deploying flow contract for {} on route {:#018x}", flow_id, route_id);
        self.request_post(
            "flows",
            serde_json::to_string(&FlowRouteRecord { flow_id: flow_id.to_string(), route_id })?,
        )?;
        Ok(())
    }

    fn set_new_route(&self, flow_id: FlowId, route_id: RouteId) -> Result<(), AuditError> {
        info!("recording new route {:#018x} for flow {}", route_id, flow_id);
        self.request_post(
            "flows/route",
            serde_json::to_string(&FlowRouteRecord { flow_id: flow_id.to_string(), route_id })?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn probe_record_payload() {
        let probe = CapturedProbe {
            interface: String::from("s2-eth2"),
            eth_src: [0; 6],
            eth_dst: [0; 6],
            route_id: 0x2a,
            timestamp: 7,
            l_hash: 7,
        };
        let payload = serde_json::to_string(&ProbeRecord::from(&probe)).unwrap();
        assert_eq!(
            payload,
            "{\"interface\":\"s2-eth2\",\
             \"route_id\":\"0000000000000000000000000000002a\",\
             \"timestamp\":7,\"l_hash\":7}"
        );
    }
}
