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

//! # Control-plane wire types
//!
//! The subset of the switch's `standard` service schema this crate consumes:
//!
//! ```text
//! enum BmMatchParamType { EXACT = 0, LPM = 1, TERNARY = 2, VALID = 3, RANGE = 4 }
//!
//! struct BmMatchParamLPM     { 1: binary key, 2: i32 prefix_length }
//! struct BmMatchParam        { 1: BmMatchParamType type,
//!                              2: optional BmMatchParamExact exact,
//!                              3: optional BmMatchParamLPM lpm,
//!                              4: optional BmMatchParamTernary ternary }
//! struct BmMtEntry           { 1: list<BmMatchParam> match_key,
//!                              2: BmActionEntry action_entry,
//!                              3: i32 priority,
//!                              4: i32 entry_handle }
//! exception InvalidTableOperation { 1: i32 code }
//!
//! service Standard {
//!     list<BmMtEntry> bm_mt_get_entries(1: i32 cxt_id, 2: string table_name)
//!         throws (1: InvalidTableOperation ouch),
//!     void bm_mt_modify_entry(1: i32 cxt_id, 2: string table_name,
//!                             3: i32 entry_handle, 4: string action_name,
//!                             5: list<binary> action_data)
//!         throws (1: InvalidTableOperation ouch),
//! }
//! ```
//!
//! Fields the controller never looks at (exact/ternary payloads, action
//! entries, priorities) are skipped generically while reading.

use thrift::protocol::{TInputProtocol, TType};
use thrift::{ProtocolError, ProtocolErrorKind};

/// Handle of one table entry. Owned by the remote switch; only ever observed
/// and passed back.
pub type EntryHandle = i32;

/// Kind of one match-key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchParamType {
    /// exact match
    Exact,
    /// longest-prefix match
    Lpm,
    /// ternary match
    Ternary,
    /// header-validity match
    Valid,
    /// range match
    Range,
}

impl MatchParamType {
    fn from_i32(value: i32) -> thrift::Result<Self> {
        match value {
            0 => Ok(Self::Exact),
            1 => Ok(Self::Lpm),
            2 => Ok(Self::Ternary),
            3 => Ok(Self::Valid),
            4 => Ok(Self::Range),
            other => Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("unknown match param type {}", other),
            ))),
        }
    }
}

/// Longest-prefix-match field of an entry's match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchParamLpm {
    /// Raw prefix bytes (4 bytes for an IPv4 key).
    pub key: Vec<u8>,
    /// Prefix length in bits.
    pub prefix_length: i32,
}

impl MatchParamLpm {
    pub(crate) fn read(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut key: Vec<u8> = Vec::new();
        let mut prefix_length: i32 = 0;
        i_prot.read_struct_begin()?;
        loop {
            let field = i_prot.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match field.id {
                Some(1) => key = i_prot.read_bytes()?,
                Some(2) => prefix_length = i_prot.read_i32()?,
                _ => i_prot.skip(field.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Self { key, prefix_length })
    }
}

/// One field of an entry's match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchParam {
    /// Kind of this field.
    pub param_type: MatchParamType,
    /// LPM payload, present when `param_type` is [`MatchParamType::Lpm`].
    pub lpm: Option<MatchParamLpm>,
}

impl MatchParam {
    pub(crate) fn read(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut param_type: Option<MatchParamType> = None;
        let mut lpm: Option<MatchParamLpm> = None;
        i_prot.read_struct_begin()?;
        loop {
            let field = i_prot.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match field.id {
                Some(1) => param_type = Some(MatchParamType::from_i32(i_prot.read_i32()?)?),
                Some(3) => lpm = Some(MatchParamLpm::read(i_prot)?),
                _ => i_prot.skip(field.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        let param_type = param_type.ok_or_else(|| {
            thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "match param without a type",
            ))
        })?;
        Ok(Self { param_type, lpm })
    }
}

/// One entry of a match-action table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtEntry {
    /// The entry's match-key fields, in schema order.
    pub match_key: Vec<MatchParam>,
    /// Handle used to address this entry in modify calls.
    pub entry_handle: EntryHandle,
}

impl MtEntry {
    pub(crate) fn read(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut match_key: Vec<MatchParam> = Vec::new();
        let mut entry_handle: EntryHandle = 0;
        i_prot.read_struct_begin()?;
        loop {
            let field = i_prot.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match field.id {
                Some(1) => {
                    let list = i_prot.read_list_begin()?;
                    for _ in 0..list.size {
                        match_key.push(MatchParam::read(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                }
                Some(4) => entry_handle = i_prot.read_i32()?,
                _ => i_prot.skip(field.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Self { match_key, entry_handle })
    }
}

/// Read the `InvalidTableOperation` exception payload, returning its code.
pub(crate) fn read_table_operation_code(i_prot: &mut dyn TInputProtocol) -> thrift::Result<i32> {
    let mut code: i32 = 0;
    i_prot.read_struct_begin()?;
    loop {
        let field = i_prot.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        match field.id {
            Some(1) => code = i_prot.read_i32()?,
            _ => i_prot.skip(field.field_type)?,
        }
        i_prot.read_field_end()?;
    }
    i_prot.read_struct_end()?;
    Ok(code)
}
