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

//! # Switch Control-Plane Client
//!
//! This is a very simple crate to interact with the control-plane service of
//! a software switch: listing the entries of a match-action table, locating
//! the entry for a destination, and atomically rewriting the action bound to
//! an entry.
//!
//! The switch exposes a multiplexed Thrift service named `standard`; this
//! crate hand-writes the two calls it needs in the style of generated Thrift
//! code (see [`types`] for the consumed subset of the service schema).
//!
//! ```no_run
//! use bmv2::{codec, StandardClient, TABLE_SR_ENCAP, ACTION_ADD_SR_HEADER};
//!
//! fn main() -> Result<(), bmv2::Error> {
//!     // one session per action, dropped afterwards
//!     let mut client = StandardClient::connect("localhost", 50_001)?;
//!     let handle =
//!         client.find_entry_for_destination(TABLE_SR_ENCAP, "10.0.10.10".parse().unwrap())?;
//!     let params = codec::add_sourcerouting_header(
//!         codec::SR_FIELD_COUNT,
//!         codec::SR_FLAG_ENABLED,
//!         [0, 0, 0, 0, 0, 10],
//!         0x53f2_0c9e_b714_a88d,
//!     );
//!     client.modify_entry(TABLE_SR_ENCAP, handle, ACTION_ADD_SR_HEADER, &params)?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

pub mod codec;

mod client;
mod types;
pub use client::StandardClient;
pub use types::*;

use thiserror::Error;

/// Encap table holding one source-routing entry per destination, keyed by a
/// longest-prefix match on the destination address.
pub const TABLE_SR_ENCAP: &str = "MyIngress.TunnelEncap.tunnel_encap_process_sr";

/// Action writing the source-routing header; its parameters are encoded by
/// [`codec::add_sourcerouting_header`].
pub const ACTION_ADD_SR_HEADER: &str = "MyIngress.TunnelEncap.add_sourcerouting_header";

/// # Control-plane client error
#[derive(Debug, Error)]
pub enum Error {
    /// The session to the control plane could not be opened. Callers must
    /// not proceed with dependent operations.
    #[error("cannot connect to the switch control plane: {0}")]
    Connect(thrift::Error),
    /// RPC-level failure on an open session.
    #[error("Thrift Error: {0}")]
    Thrift(#[from] thrift::Error),
    /// The switch rejected the table operation.
    #[error("table operation on {table} failed with code {code}")]
    Remote {
        /// table the operation addressed
        table: String,
        /// error code reported by the switch
        code: i32,
    },
    /// No entry of the table matches the destination.
    #[error("no entry of {table} matches destination {dest}")]
    EntryNotFound {
        /// table that was scanned
        table: String,
        /// destination that was looked for
        dest: std::net::Ipv4Addr,
    },
}

/// Control-plane result type
pub type Result<T> = std::result::Result<T, Error>;
