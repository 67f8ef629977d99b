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

//! Byte encodings of the control-plane action parameters.
//!
//! Action parameters cross the wire as a list of opaque byte strings, one per
//! parameter, each exactly as wide as the parameter's field in the data-plane
//! program. The widths are a contract with the switch: a wrong width is
//! rejected (or worse, misinterpreted) by the device, so every action gets
//! its own encode function here instead of ad hoc packing at the call sites.

/// Number of label fields in the source-routing header.
pub const SR_FIELD_COUNT: u16 = 6;

/// Flag byte marking the source-routing header as active.
pub const SR_FLAG_ENABLED: u8 = 1;

/// Parameters of the `add_sourcerouting_header` encap action.
///
/// Layout, in parameter order:
///
/// | parameter   | width | encoding            |
/// |-------------|-------|---------------------|
/// | field count | 2 B   | big-endian unsigned |
/// | flag        | 1 B   | unsigned            |
/// | dst MAC     | 6 B   | raw hardware bytes  |
/// | route id    | 8 B   | big-endian unsigned |
pub fn add_sourcerouting_header(
    field_count: u16,
    flag: u8,
    dst_mac: [u8; 6],
    route_id: u64,
) -> Vec<Vec<u8>> {
    vec![
        field_count.to_be_bytes().to_vec(),
        vec![flag],
        dst_mac.to_vec(),
        route_id.to_be_bytes().to_vec(),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sourcerouting_params_are_byte_exact() {
        let params = add_sourcerouting_header(
            SR_FIELD_COUNT,
            SR_FLAG_ENABLED,
            [0x00, 0x00, 0x00, 0x00, 0x01, 0x01],
            0x3039,
        );
        assert_eq!(
            params,
            vec![
                vec![0x00, 0x06],
                vec![0x01],
                vec![0x00, 0x00, 0x00, 0x00, 0x01, 0x01],
                vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x39],
            ]
        );
    }

    #[test]
    fn sourcerouting_param_widths() {
        let params = add_sourcerouting_header(1, 0, [0xff; 6], u64::max_value());
        let widths: Vec<usize> = params.iter().map(|p| p.len()).collect();
        assert_eq!(widths, vec![2, 1, 6, 8]);
    }
}
