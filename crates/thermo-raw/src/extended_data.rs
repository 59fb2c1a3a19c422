//! ExtendedDataDecoder (C12): the debug section trailing a packet. Framing
//! errors are not propagated — a malformed sub-segment just ends the loop
//! and whatever decoded before it is kept.

use crate::memory_reader::{LazyBytes, MemoryReader};
use crate::packet::PacketHeader;
use crate::RawError;

const TRANSIENT_BIT: i32 = 0x100;

pub struct DataSegment<'a> {
    pub header: i32,
    pub bytes: LazyBytes<'a>,
}

pub struct TransientSegment {
    pub header: i32,
    pub data: Vec<i32>,
}

pub enum ExtendedSegment<'a> {
    Data(DataSegment<'a>),
    Transient(TransientSegment),
}

pub struct ExtendedData<'a> {
    pub top_level_header: u32,
    pub segments: Vec<ExtendedSegment<'a>>,
}

pub fn decode<'a>(data: &'a [u8], header: &PacketHeader) -> Result<ExtendedData<'a>, RawError> {
    if header.debug_info_words == 0 {
        return Ok(ExtendedData {
            top_level_header: 0,
            segments: Vec::new(),
        });
    }

    let section_end = header.end_offset.min(data.len() as u64);
    let mut reader = MemoryReader::at_offset(data, header.debug_offset);
    let top_level_header = reader.read_u32()?;

    let mut segments = Vec::new();
    while section_end.saturating_sub(reader.position()) >= 8 {
        let sub_header = reader.read_i32()?;
        let word_count = reader.read_u32()?;
        let body_len = word_count as usize * 4;

        if reader.position() + body_len as u64 > section_end {
            break;
        }

        if sub_header & TRANSIENT_BIT != 0 {
            let bytes = reader.read_bytes(body_len)?;
            let ints: Vec<i32> = bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            segments.push(ExtendedSegment::Transient(TransientSegment {
                header: sub_header,
                data: ints,
            }));
        } else {
            let bytes = reader.read_bytes_lazy(body_len)?;
            segments.push(ExtendedSegment::Data(DataSegment {
                header: sub_header,
                bytes,
            }));
        }
    }

    Ok(ExtendedData {
        top_level_header,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_packet(top_header: u32, subs: &[(i32, Vec<u8>)]) -> Vec<u8> {
        let mut debug = Vec::new();
        debug.extend_from_slice(&top_header.to_le_bytes());
        for (sub_header, body) in subs {
            debug.extend_from_slice(&sub_header.to_le_bytes());
            debug.extend_from_slice(&((body.len() / 4) as u32).to_le_bytes());
            debug.extend_from_slice(body);
        }

        let debug_words = debug.len() as u32 / 4;
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // num_segments (no mass ranges)
        data.extend_from_slice(&0u32.to_le_bytes()); // profile words
        data.extend_from_slice(&0u32.to_le_bytes()); // centroid words
        data.extend_from_slice(&0u32.to_le_bytes()); // default_feature_word
        data.extend_from_slice(&0u32.to_le_bytes()); // non-default feature words
        data.extend_from_slice(&0u32.to_le_bytes()); // expansion words
        data.extend_from_slice(&0u32.to_le_bytes()); // noise words
        data.extend_from_slice(&debug_words.to_le_bytes()); // debug words
        data.extend_from_slice(&debug);
        data
    }

    #[test]
    fn decodes_data_and_transient_segments() {
        let data_body = vec![1u8, 2, 3, 4];
        let transient_body = {
            let mut b = Vec::new();
            b.extend_from_slice(&42i32.to_le_bytes());
            b
        };
        let raw = build_packet(7, &[(0x01, data_body.clone()), (0x101, transient_body)]);
        let header = PacketHeader::parse(&raw, 0).unwrap();
        let ext = decode(&raw, &header).unwrap();
        assert_eq!(ext.top_level_header, 7);
        assert_eq!(ext.segments.len(), 2);
        match &ext.segments[0] {
            ExtendedSegment::Data(seg) => assert_eq!(seg.bytes.get(), data_body),
            _ => panic!("expected data segment"),
        }
        match &ext.segments[1] {
            ExtendedSegment::Transient(seg) => assert_eq!(seg.data, vec![42]),
            _ => panic!("expected transient segment"),
        }
    }

    #[test]
    fn truncated_framing_stops_without_error() {
        let raw = build_packet(1, &[(0x01, vec![1, 2, 3, 4, 5, 6, 7, 8])]);
        let mut raw = raw;
        let len = raw.len();
        raw.truncate(len - 4);
        let header = PacketHeader::parse(&raw, 0).unwrap();
        let ext = decode(&raw, &header).unwrap();
        assert_eq!(ext.segments.len(), 0);
    }
}
