//! RTP/JPEG depacketization (RFC 2435).
//!
//! The video transport delivers JPEG access units packetized by a
//! conventional payload-type-26 sender (e.g. GStreamer's `rtpjpegpay`).
//! Each RTP packet carries a JPEG payload header with a fragment offset;
//! the scan headers (SOI/DQT/SOF0/DHT/SOS) are elided on the wire and must
//! be reconstructed from the header fields and the standard tables.
//!
//! One access unit is in flight at a time. Any fault scoped to the unit —
//! a sequence gap, a bad fragment offset, an oversized frame — drops just
//! that unit; the next packet with fragment offset zero starts fresh.

use anyhow::{anyhow, Result};

/// RTP/JPEG payload type (conventional, RFC 3551).
pub const RTP_JPEG_PAYLOAD_TYPE: u8 = 26;

/// Hard cap on a reassembled access unit.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// One parsed RTP packet, before JPEG-level interpretation.
#[derive(Debug)]
pub struct RtpPacket<'a> {
    pub sequence: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload: &'a [u8],
}

/// Parse the RTP fixed header, skipping CSRC entries, header extensions,
/// and trailing padding.
pub fn parse_rtp_packet(packet: &[u8]) -> Result<RtpPacket<'_>> {
    if packet.len() < 12 {
        return Err(anyhow!("rtp packet too small"));
    }
    let b0 = packet[0];
    let b1 = packet[1];
    let version = b0 >> 6;
    if version != 2 {
        return Err(anyhow!("unsupported rtp version {}", version));
    }
    let padding = (b0 & 0x20) != 0;
    let extension = (b0 & 0x10) != 0;
    let csrc_count = (b0 & 0x0F) as usize;
    let marker = (b1 & 0x80) != 0;
    let payload_type = b1 & 0x7F;
    if payload_type != RTP_JPEG_PAYLOAD_TYPE {
        return Err(anyhow!(
            "unsupported rtp payload type {}; expected {}",
            payload_type,
            RTP_JPEG_PAYLOAD_TYPE
        ));
    }
    let sequence = u16::from_be_bytes([packet[2], packet[3]]);
    let timestamp = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);

    let mut offset = 12 + csrc_count * 4;
    if packet.len() < offset {
        return Err(anyhow!("rtp packet missing csrc entries"));
    }

    if extension {
        if packet.len() < offset + 4 {
            return Err(anyhow!("rtp extension header truncated"));
        }
        let ext_len = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
        offset += 4 + ext_len * 4;
    }

    if packet.len() < offset {
        return Err(anyhow!("rtp packet truncated"));
    }

    let mut payload_end = packet.len();
    if padding {
        let pad_len = *packet.last().unwrap_or(&0) as usize;
        if pad_len > payload_end - offset {
            return Err(anyhow!("invalid rtp padding"));
        }
        payload_end -= pad_len;
    }

    Ok(RtpPacket {
        sequence,
        timestamp,
        marker,
        payload: &packet[offset..payload_end],
    })
}

/// JPEG payload header fields (RFC 2435 §3.1).
#[derive(Clone, Copy, Debug)]
struct JpegHeader {
    fragment_offset: usize,
    type_field: u8,
    q: u8,
    width: u16,
    height: u16,
}

fn parse_jpeg_header(payload: &[u8]) -> Result<(JpegHeader, usize)> {
    if payload.len() < 8 {
        return Err(anyhow!("jpeg payload header truncated"));
    }
    let fragment_offset =
        u32::from_be_bytes([0, payload[1], payload[2], payload[3]]) as usize;
    let header = JpegHeader {
        fragment_offset,
        type_field: payload[4],
        q: payload[5],
        width: payload[6] as u16 * 8,
        height: payload[7] as u16 * 8,
    };
    if header.type_field & 0x3F > 1 {
        return Err(anyhow!("unsupported jpeg type {}", header.type_field));
    }
    Ok((header, 8))
}

/// A complete, decodable access unit.
#[derive(Debug)]
pub struct AccessUnit {
    pub jpeg: Vec<u8>,
    pub timestamp: u32,
}

struct UnitInProgress {
    expected_next_seq: u16,
    header: JpegHeader,
    qtables: Vec<u8>,
    restart_interval: u16,
    scan: Vec<u8>,
    timestamp: u32,
}

/// Stateful reassembler: feed RTP packets in arrival order, collect access
/// units when the marker bit closes one.
pub struct RtpJpegDepacketizer {
    unit: Option<UnitInProgress>,
    /// Last inline quantization tables seen, per RFC 2435 they may be sent
    /// once and referenced by later frames with a zero-length table header.
    cached_qtables: Option<(u8, Vec<u8>)>,
    units_dropped: u64,
}

impl RtpJpegDepacketizer {
    pub fn new() -> Self {
        Self {
            unit: None,
            cached_qtables: None,
            units_dropped: 0,
        }
    }

    pub fn units_dropped(&self) -> u64 {
        self.units_dropped
    }

    /// Feed one RTP packet. Returns a finished access unit when the packet
    /// carried the marker bit and the unit reassembled without gaps.
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<AccessUnit>> {
        let rtp = parse_rtp_packet(packet)?;
        let (header, mut consumed) = parse_jpeg_header(rtp.payload)?;

        // Types 64-127 carry the restart marker header in every packet of
        // the unit (RFC 2435 section 3.1.7), not just the first fragment.
        let mut restart_interval = 0u16;
        if (64..=127).contains(&header.type_field) {
            if rtp.payload.len() < consumed + 4 {
                return Err(anyhow!("restart marker header truncated"));
            }
            restart_interval =
                u16::from_be_bytes([rtp.payload[consumed], rtp.payload[consumed + 1]]);
            consumed += 4;
        }

        if header.fragment_offset == 0 {
            if self.unit.is_some() {
                // A new unit started before the previous one completed.
                self.drop_unit("new unit started mid-frame");
            }

            let qtables = if header.q >= 128 {
                let (tables, used) = self.parse_qtable_header(&rtp.payload[consumed..], header.q)?;
                consumed += used;
                tables
            } else {
                make_tables(header.q)
            };

            self.unit = Some(UnitInProgress {
                expected_next_seq: rtp.sequence.wrapping_add(1),
                header,
                qtables,
                restart_interval,
                scan: Vec::with_capacity(16 * 1024),
                timestamp: rtp.timestamp,
            });
        } else {
            let fault = match self.unit.as_ref() {
                // Mid-frame fragment with no unit in progress; wait for the
                // next fragment-offset-zero packet.
                None => return Ok(None),
                Some(unit) if rtp.sequence != unit.expected_next_seq => Some("sequence gap"),
                Some(unit) if header.fragment_offset != unit.scan.len() => {
                    Some("fragment offset mismatch")
                }
                Some(_) => None,
            };
            if let Some(reason) = fault {
                self.drop_unit(reason);
                return Ok(None);
            }
        }

        let fragment = &rtp.payload[consumed..];
        let overflow = self
            .unit
            .as_ref()
            .map(|unit| unit.scan.len() + fragment.len() > MAX_JPEG_BYTES)
            .unwrap_or(false);
        if overflow {
            self.drop_unit("access unit exceeds max jpeg size");
            return Ok(None);
        }

        let Some(unit) = self.unit.as_mut() else {
            return Ok(None);
        };
        unit.expected_next_seq = rtp.sequence.wrapping_add(1);
        unit.scan.extend_from_slice(fragment);

        if !rtp.marker {
            return Ok(None);
        }

        match self.unit.take() {
            Some(unit) => Ok(Some(finish_unit(unit))),
            None => Ok(None),
        }
    }

    fn drop_unit(&mut self, reason: &str) {
        if self.unit.take().is_some() {
            self.units_dropped += 1;
            log::debug!("dropped access unit: {reason}");
        }
    }

    /// Parse the quantization table header present when `Q >= 128` at
    /// fragment offset zero. A zero-length header references the tables from
    /// an earlier frame with the same Q.
    fn parse_qtable_header(&mut self, data: &[u8], q: u8) -> Result<(Vec<u8>, usize)> {
        if data.len() < 4 {
            return Err(anyhow!("quantization table header truncated"));
        }
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length == 0 {
            return match &self.cached_qtables {
                Some((cached_q, tables)) if *cached_q == q => Ok((tables.clone(), 4)),
                _ => Err(anyhow!("no cached quantization tables for q={}", q)),
            };
        }
        if data.len() < 4 + length {
            return Err(anyhow!("quantization table data truncated"));
        }
        let tables = data[4..4 + length].to_vec();
        self.cached_qtables = Some((q, tables.clone()));
        Ok((tables, 4 + length))
    }
}

impl Default for RtpJpegDepacketizer {
    fn default() -> Self {
        Self::new()
    }
}

fn finish_unit(unit: UnitInProgress) -> AccessUnit {
    let mut jpeg = make_headers(
        &unit.header,
        &unit.qtables,
        unit.restart_interval,
        unit.scan.len(),
    );
    jpeg.extend_from_slice(&unit.scan);
    if !jpeg.ends_with(&[0xFF, 0xD9]) {
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
    }
    AccessUnit {
        jpeg,
        timestamp: unit.timestamp,
    }
}

// ----------------------------------------------------------------------------
// JPEG header reconstruction (RFC 2435 Appendix A/B)
// ----------------------------------------------------------------------------

#[rustfmt::skip]
const LUMA_QUANTIZER: [u16; 64] = [
    16, 11, 12, 14, 12, 10, 16, 14,
    13, 14, 18, 17, 16, 19, 24, 40,
    26, 24, 22, 22, 24, 49, 35, 37,
    29, 40, 58, 51, 61, 60, 57, 51,
    56, 55, 64, 72, 92, 78, 64, 68,
    87, 69, 55, 56, 80, 109, 81, 87,
    95, 98, 103, 104, 103, 62, 77, 113,
    121, 112, 100, 120, 92, 101, 103, 99,
];

#[rustfmt::skip]
const CHROMA_QUANTIZER: [u16; 64] = [
    17, 18, 18, 24, 21, 24, 47, 26,
    26, 47, 99, 66, 56, 66, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Scale the default quantization tables for a Q factor below 128.
fn make_tables(q: u8) -> Vec<u8> {
    let factor = q.clamp(1, 99) as u32;
    let scale = if factor < 50 {
        5000 / factor
    } else {
        200 - factor * 2
    };

    let mut tables = Vec::with_capacity(128);
    for base in [&LUMA_QUANTIZER, &CHROMA_QUANTIZER] {
        for &value in base.iter() {
            let scaled = (value as u32 * scale + 50) / 100;
            tables.push(scaled.clamp(1, 255) as u8);
        }
    }
    tables
}

const LUM_DC_CODELENS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const LUM_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const LUM_AC_CODELENS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
#[rustfmt::skip]
const LUM_AC_SYMBOLS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const CHM_DC_CODELENS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const CHM_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const CHM_AC_CODELENS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
#[rustfmt::skip]
const CHM_AC_SYMBOLS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

fn push_huffman_table(out: &mut Vec<u8>, codelens: &[u8], symbols: &[u8], class_and_id: u8) {
    out.extend_from_slice(&[0xFF, 0xC4]);
    let length = (3 + codelens.len() + symbols.len()) as u16;
    out.extend_from_slice(&length.to_be_bytes());
    out.push(class_and_id);
    out.extend_from_slice(codelens);
    out.extend_from_slice(symbols);
}

/// Rebuild the JPEG scan headers elided by the packetizer.
fn make_headers(
    header: &JpegHeader,
    qtables: &[u8],
    restart_interval: u16,
    scan_len: usize,
) -> Vec<u8> {
    let table_count = if qtables.len() > 64 { 2 } else { 1 };
    let mut out = Vec::with_capacity(640 + scan_len);

    // SOI
    out.extend_from_slice(&[0xFF, 0xD8]);

    // DQT, one marker segment per table
    for table in 0..table_count {
        let data = &qtables[table * 64..(table * 64 + 64).min(qtables.len())];
        out.extend_from_slice(&[0xFF, 0xDB]);
        out.extend_from_slice(&((3 + data.len()) as u16).to_be_bytes());
        out.push(table as u8);
        out.extend_from_slice(data);
    }

    if restart_interval > 0 {
        out.extend_from_slice(&[0xFF, 0xDD, 0x00, 0x04]);
        out.extend_from_slice(&restart_interval.to_be_bytes());
    }

    // SOF0: baseline, three components; type bit 0 selects 4:2:2 vs 4:2:0
    let luma_sampling = if header.type_field & 0x01 != 0 {
        0x22
    } else {
        0x21
    };
    let chroma_qt = if table_count == 2 { 1 } else { 0 };
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&header.height.to_be_bytes());
    out.extend_from_slice(&header.width.to_be_bytes());
    out.push(0x03);
    out.extend_from_slice(&[0x00, luma_sampling, 0x00]);
    out.extend_from_slice(&[0x01, 0x11, chroma_qt]);
    out.extend_from_slice(&[0x02, 0x11, chroma_qt]);

    push_huffman_table(&mut out, &LUM_DC_CODELENS, &LUM_DC_SYMBOLS, 0x00);
    push_huffman_table(&mut out, &LUM_AC_CODELENS, &LUM_AC_SYMBOLS, 0x10);
    push_huffman_table(&mut out, &CHM_DC_CODELENS, &CHM_DC_SYMBOLS, 0x01);
    push_huffman_table(&mut out, &CHM_AC_CODELENS, &CHM_AC_SYMBOLS, 0x11);

    // SOS
    out.extend_from_slice(&[
        0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x00, 0x00, 0x01, 0x11, 0x02, 0x11, 0x00, 0x3F, 0x00,
    ]);

    out
}
