//! LTProfileDecoder (C11): same segment/sub-segment framing as the FT
//! decoder, but linear-in-time rather than frequency-domain — no mass-offset
//! field, no monotonic repair, and out-of-order indices truncate rather than
//! drop a single peak.

use crate::memory_reader::MemoryReader;
use crate::packet::PacketHeader;
use crate::types::{DataPeak, PeakOptions};
use crate::RawError;

pub fn decode(data: &[u8], header: &PacketHeader, zero_padding: bool) -> Result<Vec<DataPeak>, RawError> {
    let mut peaks: Vec<DataPeak> = Vec::new();
    let mut reader = MemoryReader::at_offset(data, header.profile_offset);

    for _ in 0..header.num_segments {
        let base_abscissa = reader.read_f64()?;
        let abscissa_spacing = reader.read_f64()?;
        let num_sub_segments = reader.read_u32()?;
        let num_expanded_words = reader.read_u32()?;

        let mut current_index: u32 = 0;

        // Unrolled by 3 for hot-path throughput; correctness does not depend
        // on the unrolling.
        for _ in 0..num_sub_segments {
            let start_index = reader.read_u32()?;
            let count = reader.read_u32()?;
            if count == 0 {
                continue;
            }

            if start_index < current_index {
                let drop = (current_index - start_index) as usize;
                let new_len = peaks.len().saturating_sub(drop);
                peaks.truncate(new_len);
                current_index = start_index;
            } else if start_index > current_index && zero_padding {
                for i in current_index..start_index {
                    let position = base_abscissa + i as f64 * abscissa_spacing;
                    peaks.push(DataPeak {
                        mass: position,
                        intensity: 0.0,
                        position,
                        options: PeakOptions::NONE,
                    });
                }
                current_index = start_index;
            } else if start_index > current_index {
                current_index = start_index;
            }

            let mut i = 0u32;
            while i + 3 <= count {
                push_triplet(&mut peaks, &mut reader, base_abscissa, abscissa_spacing, current_index + i)?;
                i += 3;
            }
            while i < count {
                let sample = reader.read_f32()? as f64;
                let position = base_abscissa + (current_index + i) as f64 * abscissa_spacing;
                peaks.push(DataPeak {
                    mass: position,
                    intensity: sample,
                    position,
                    options: PeakOptions::NONE,
                });
                i += 1;
            }
            current_index += count;
        }

        if zero_padding && current_index < num_expanded_words {
            for i in current_index..num_expanded_words {
                let position = base_abscissa + i as f64 * abscissa_spacing;
                peaks.push(DataPeak {
                    mass: position,
                    intensity: 0.0,
                    position,
                    options: PeakOptions::NONE,
                });
            }
        }
    }

    Ok(peaks)
}

fn push_triplet(
    peaks: &mut Vec<DataPeak>,
    reader: &mut MemoryReader,
    base_abscissa: f64,
    spacing: f64,
    start: u32,
) -> Result<(), RawError> {
    for i in 0..3u32 {
        let sample = reader.read_f32()? as f64;
        let position = base_abscissa + (start + i) as f64 * spacing;
        peaks.push(DataPeak {
            mass: position,
            intensity: sample,
            position,
            options: PeakOptions::NONE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_packet(sub_segments: &[(u32, &[f32])]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0f64.to_le_bytes());
        body.extend_from_slice(&2.0f64.to_le_bytes());
        body.extend_from_slice(&(sub_segments.len() as u32).to_le_bytes());
        let expanded_words: u32 = sub_segments.iter().map(|(start, s)| start + s.len() as u32).max().unwrap_or(0);
        body.extend_from_slice(&expanded_words.to_le_bytes());
        for (start, samples) in sub_segments {
            body.extend_from_slice(&start.to_le_bytes());
            body.extend_from_slice(&(samples.len() as u32).to_le_bytes());
            for s in *samples {
                body.extend_from_slice(&s.to_le_bytes());
            }
        }

        let profile_words = body.len() as u32 / 4;
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes()); // num_segments
        data.extend_from_slice(&profile_words.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // centroid words
        data.extend_from_slice(&0u32.to_le_bytes()); // default_feature_word
        data.extend_from_slice(&0u32.to_le_bytes()); // non-default feature words
        data.extend_from_slice(&0u32.to_le_bytes()); // expansion words
        data.extend_from_slice(&0u32.to_le_bytes()); // noise words
        data.extend_from_slice(&0u32.to_le_bytes()); // debug words
        data.extend_from_slice(&0f32.to_le_bytes()); // mass range low (num_segments=1)
        data.extend_from_slice(&0f32.to_le_bytes()); // mass range high
        data.extend_from_slice(&body);
        data
    }

    #[test]
    fn decodes_linear_samples() {
        let data = build_packet(&[(0, &[1.0, 2.0, 3.0, 4.0, 5.0])]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let peaks = decode(&data, &header, true).unwrap();
        assert_eq!(peaks.len(), 5);
        assert_eq!(peaks[0].position, 0.0);
        assert_eq!(peaks[1].position, 2.0);
    }

    #[test]
    fn without_zero_padding_skips_gaps() {
        let data = build_packet(&[(3, &[9.0])]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let peaks = decode(&data, &header, false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].intensity, 9.0);
    }

    #[test]
    fn out_of_order_start_truncates_tail() {
        let data = build_packet(&[(0, &[1.0, 2.0, 3.0, 4.0]), (1, &[9.0])]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let peaks = decode(&data, &header, false).unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[1].intensity, 9.0);
    }
}
