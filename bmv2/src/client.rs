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

//! # Control-plane session

use crate::types::*;
use crate::{Error, Result};

use log::*;
use std::fmt;
use std::net::Ipv4Addr;
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TMessageIdentifier, TMessageType, TMultiplexedOutputProtocol,
    TOutputProtocol, TStructIdentifier, TType,
};
use thrift::transport::{
    ReadHalf, TBufferedReadTransport, TBufferedWriteTransport, TIoChannel, TTcpChannel, WriteHalf,
};
use thrift::{ProtocolError, ProtocolErrorKind};

/// Name of the multiplexed control-plane service.
const SERVICE_NAME: &str = "standard";

/// All calls address the first (and only) device context.
const CXT_ID: i32 = 0;

type InputProtocol = TBinaryInputProtocol<TBufferedReadTransport<ReadHalf<TTcpChannel>>>;
type OutputProtocol =
    TMultiplexedOutputProtocol<TBinaryOutputProtocol<TBufferedWriteTransport<WriteHalf<TTcpChannel>>>>;

/// # Switch control-plane session
///
/// One Thrift session to the `standard` service of a single switch. All calls
/// are synchronous and blocking. Sessions are opened per operator action and
/// dropped right after; there is no pooling, reconnecting or retrying.
///
/// This struct does not implement `Clone`, `Sync` or `Send`, since it wraps a
/// stream from the OS.
pub struct StandardClient {
    i_prot: InputProtocol,
    o_prot: OutputProtocol,
    sequence_number: i32,
}

impl fmt::Debug for StandardClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StandardClient")
    }
}

impl StandardClient {
    /// Open a session to the control-plane service at `host:port`. A refused
    /// or timed-out connection yields [`Error::Connect`]; the caller must not
    /// proceed with dependent operations.
    pub fn connect(host: impl AsRef<str>, port: u16) -> Result<Self> {
        let address = format!("{}:{}", host.as_ref(), port);
        debug!("connecting to the switch control plane at {}", address);
        let mut channel = TTcpChannel::new();
        channel.open(&address).map_err(Error::Connect)?;
        let (read, write) = channel.split().map_err(Error::Connect)?;
        let i_prot = TBinaryInputProtocol::new(TBufferedReadTransport::new(read), true);
        let o_prot = TMultiplexedOutputProtocol::new(
            SERVICE_NAME,
            TBinaryOutputProtocol::new(TBufferedWriteTransport::new(write), true),
        );
        Ok(Self { i_prot, o_prot, sequence_number: 0 })
    }

    /// Release the session. Dropping the client has the same effect; this
    /// only makes the teardown explicit at the call site.
    pub fn disconnect(self) {}

    /// Fetch all entries of the named table.
    pub fn get_entries(&mut self, table: &str) -> Result<Vec<MtEntry>> {
        self.sequence_number += 1;
        self.o_prot.write_message_begin(&TMessageIdentifier::new(
            "bm_mt_get_entries",
            TMessageType::Call,
            self.sequence_number,
        ))?;
        self.o_prot.write_struct_begin(&TStructIdentifier::new("bm_mt_get_entries_args"))?;
        self.write_common_args(table)?;
        self.o_prot.write_field_stop()?;
        self.o_prot.write_struct_end()?;
        self.o_prot.write_message_end()?;
        self.o_prot.flush()?;

        self.read_reply_begin("bm_mt_get_entries")?;
        let mut entries: Vec<MtEntry> = Vec::new();
        let mut remote_code: Option<i32> = None;
        self.i_prot.read_struct_begin()?;
        loop {
            let field = self.i_prot.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match field.id {
                Some(0) => {
                    let list = self.i_prot.read_list_begin()?;
                    for _ in 0..list.size {
                        entries.push(MtEntry::read(&mut self.i_prot)?);
                    }
                    self.i_prot.read_list_end()?;
                }
                Some(1) => remote_code = Some(read_table_operation_code(&mut self.i_prot)?),
                _ => self.i_prot.skip(field.field_type)?,
            }
            self.i_prot.read_field_end()?;
        }
        self.i_prot.read_struct_end()?;
        self.i_prot.read_message_end()?;

        match remote_code {
            Some(code) => Err(Error::Remote { table: table.to_string(), code }),
            None => Ok(entries),
        }
    }

    /// Scan the named table for the first entry whose LPM prefix equals
    /// `dest`, and return its handle. Tables in this testbed hold a handful
    /// of entries, so a linear scan is fine.
    pub fn find_entry_for_destination(
        &mut self,
        table: &str,
        dest: Ipv4Addr,
    ) -> Result<EntryHandle> {
        let entries = self.get_entries(table)?;
        debug!("scanning {} entries of {} for {}", entries.len(), table, dest);
        find_lpm_match(&entries, dest)
            .ok_or_else(|| Error::EntryNotFound { table: table.to_string(), dest })
    }

    /// Atomically replace the action and parameters bound to `handle`. The
    /// parameters are opaque fixed-width byte strings (see [`crate::codec`]).
    pub fn modify_entry(
        &mut self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        params: &[Vec<u8>],
    ) -> Result<()> {
        self.sequence_number += 1;
        self.o_prot.write_message_begin(&TMessageIdentifier::new(
            "bm_mt_modify_entry",
            TMessageType::Call,
            self.sequence_number,
        ))?;
        self.o_prot.write_struct_begin(&TStructIdentifier::new("bm_mt_modify_entry_args"))?;
        self.write_common_args(table)?;
        self.o_prot.write_field_begin(&TFieldIdentifier::new("entry_handle", TType::I32, 3))?;
        self.o_prot.write_i32(handle)?;
        self.o_prot.write_field_end()?;
        self.o_prot.write_field_begin(&TFieldIdentifier::new("action_name", TType::String, 4))?;
        self.o_prot.write_string(action)?;
        self.o_prot.write_field_end()?;
        self.o_prot.write_field_begin(&TFieldIdentifier::new("action_data", TType::List, 5))?;
        self.o_prot
            .write_list_begin(&TListIdentifier::new(TType::String, params.len() as i32))?;
        for param in params {
            self.o_prot.write_bytes(param)?;
        }
        self.o_prot.write_list_end()?;
        self.o_prot.write_field_end()?;
        self.o_prot.write_field_stop()?;
        self.o_prot.write_struct_end()?;
        self.o_prot.write_message_end()?;
        self.o_prot.flush()?;

        self.read_reply_begin("bm_mt_modify_entry")?;
        let mut remote_code: Option<i32> = None;
        self.i_prot.read_struct_begin()?;
        loop {
            let field = self.i_prot.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match field.id {
                Some(1) => remote_code = Some(read_table_operation_code(&mut self.i_prot)?),
                _ => self.i_prot.skip(field.field_type)?,
            }
            self.i_prot.read_field_end()?;
        }
        self.i_prot.read_struct_end()?;
        self.i_prot.read_message_end()?;

        match remote_code {
            Some(code) => Err(Error::Remote { table: table.to_string(), code }),
            None => Ok(()),
        }
    }

    /// Write the `cxt_id` and `table_name` arguments shared by every call.
    fn write_common_args(&mut self, table: &str) -> thrift::Result<()> {
        self.o_prot.write_field_begin(&TFieldIdentifier::new("cxt_id", TType::I32, 1))?;
        self.o_prot.write_i32(CXT_ID)?;
        self.o_prot.write_field_end()?;
        self.o_prot.write_field_begin(&TFieldIdentifier::new("table_name", TType::String, 2))?;
        self.o_prot.write_string(table)?;
        self.o_prot.write_field_end()?;
        Ok(())
    }

    /// Read the reply envelope, surfacing remote application errors.
    fn read_reply_begin(&mut self, method: &str) -> Result<()> {
        let ident = self.i_prot.read_message_begin()?;
        if ident.message_type == TMessageType::Exception {
            let remote = thrift::Error::read_application_error_from_in_protocol(&mut self.i_prot)?;
            self.i_prot.read_message_end()?;
            return Err(Error::Thrift(thrift::Error::Application(remote)));
        }
        if ident.name != method {
            return Err(Error::Thrift(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("expected reply for {}, got {}", method, ident.name),
            ))));
        }
        Ok(())
    }
}

/// Decode each entry's LPM prefix and return the handle of the first entry
/// whose prefix equals `dest`. Only the first match-key field is consulted;
/// non-LPM fields and short keys are skipped.
pub fn find_lpm_match(entries: &[MtEntry], dest: Ipv4Addr) -> Option<EntryHandle> {
    for entry in entries {
        let param = match entry.match_key.first() {
            Some(p) => p,
            None => continue,
        };
        if param.param_type != MatchParamType::Lpm {
            continue;
        }
        let lpm = match param.lpm.as_ref() {
            Some(l) => l,
            None => continue,
        };
        if lpm.key.len() < 4 {
            continue;
        }
        let prefix = Ipv4Addr::new(lpm.key[0], lpm.key[1], lpm.key[2], lpm.key[3]);
        if prefix == dest {
            return Some(entry.entry_handle);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn lpm_entry(addr: [u8; 4], prefix_length: i32, handle: EntryHandle) -> MtEntry {
        MtEntry {
            match_key: vec![MatchParam {
                param_type: MatchParamType::Lpm,
                lpm: Some(MatchParamLpm { key: addr.to_vec(), prefix_length }),
            }],
            entry_handle: handle,
        }
    }

    #[test]
    fn lpm_scan_finds_the_matching_entry() {
        let entries = vec![lpm_entry([10, 0, 0, 2], 32, 7), lpm_entry([10, 0, 0, 3], 32, 9)];
        assert_eq!(find_lpm_match(&entries, Ipv4Addr::new(10, 0, 0, 3)), Some(9));
        assert_eq!(find_lpm_match(&entries, Ipv4Addr::new(10, 0, 0, 2)), Some(7));
    }

    #[test]
    fn lpm_scan_reports_missing_entries() {
        let entries = vec![lpm_entry([10, 0, 0, 2], 32, 7), lpm_entry([10, 0, 0, 3], 32, 9)];
        assert_eq!(find_lpm_match(&entries, Ipv4Addr::new(10, 0, 0, 9)), None);
    }

    #[test]
    fn lpm_scan_skips_foreign_match_kinds() {
        let exact = MtEntry {
            match_key: vec![MatchParam { param_type: MatchParamType::Exact, lpm: None }],
            entry_handle: 3,
        };
        let entries = vec![exact, lpm_entry([10, 0, 0, 2], 32, 7)];
        assert_eq!(find_lpm_match(&entries, Ipv4Addr::new(10, 0, 0, 2)), Some(7));
    }

    #[test]
    fn connect_to_unreachable_switch_fails() {
        // port 9 (discard) is almost certainly not a control plane
        match StandardClient::connect("localhost", 9) {
            Err(Error::Connect(_)) => {}
            Err(e) => panic!("unexpected error kind: {}", e),
            Ok(_) => {} // something actually listens there; skip the test
        }
    }
}
