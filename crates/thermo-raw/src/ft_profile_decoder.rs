//! FTProfileDecoder (C10): frequency-domain profile sections, converted to
//! mass via the scan event's calibrators and monotonic-mass repaired.

use crate::memory_reader::MemoryReader;
use crate::packet::PacketHeader;
use crate::types::{DataPeak, PeakOptions};
use crate::RawError;

const C3_EPSILON: f64 = 1e-12;
const MASS_REPAIR_STEP: f64 = 1e-5;

struct SegmentHeader {
    base_abscissa: f64,
    abscissa_spacing: f64,
    num_sub_segments: u32,
    num_expanded_words: u32,
}

fn freq_to_mass(freq: f64, mass_offset: f64, c1: f64, c2: f64, c3: f64) -> f64 {
    let mut mass = c1 / freq + c2 / (freq * freq);
    if c3.abs() >= C3_EPSILON {
        mass += c3 / (freq * freq * freq * freq);
    }
    mass + mass_offset
}

pub fn decode(
    data: &[u8],
    header: &PacketHeader,
    calibrators: &[f64],
    reference_peaks: &[crate::types::LabelPeak],
    include_ref_peaks: bool,
) -> Result<Vec<DataPeak>, RawError> {
    if calibrators.len() < 4 {
        return Err(RawError::InsufficientCalibrators {
            needed: 4,
            found: calibrators.len(),
        });
    }
    let (c1, c2, c3) = (calibrators[0], calibrators[1], calibrators[2]);

    let mut peaks: Vec<DataPeak> = Vec::new();
    let mut min_mass = f64::NEG_INFINITY;
    let mut ref_cursor = 0usize;

    let mut reader = MemoryReader::at_offset(data, header.profile_offset);
    for _ in 0..header.num_segments {
        let seg_header = SegmentHeader {
            base_abscissa: reader.read_f64()?,
            abscissa_spacing: reader.read_f64()?,
            num_sub_segments: reader.read_u32()?,
            num_expanded_words: reader.read_u32()?,
        };

        let mut current_index: u32 = 0;

        for _ in 0..seg_header.num_sub_segments {
            let start_index = reader.read_u32()?;
            let count = reader.read_u32()?;
            let mass_offset = if header.uses_ft_profile_layout() {
                reader.read_f32()? as f64
            } else {
                0.0
            };

            if count == 0 {
                continue;
            }

            if start_index < current_index {
                peaks.pop();
                current_index = start_index;
            } else if start_index > current_index {
                fill_zero_padding(&mut peaks, &mut min_mass, current_index, start_index, &seg_header, mass_offset, c1, c2, c3);
                current_index = start_index;
            }

            let sub_segment_start = peaks.len();
            for i in 0..count {
                let sample = reader.read_f32()? as f64;
                let freq = seg_header.base_abscissa + (current_index + i) as f64 * seg_header.abscissa_spacing;
                let mut mass = freq_to_mass(freq, mass_offset, c1, c2, c3);
                if mass <= min_mass {
                    mass = min_mass + MASS_REPAIR_STEP;
                }
                min_mass = mass;
                peaks.push(DataPeak {
                    mass,
                    intensity: sample,
                    position: freq,
                    options: PeakOptions::NONE,
                });
            }
            current_index += count;

            tag_reference_peaks(&mut peaks, sub_segment_start, reference_peaks, &mut ref_cursor, include_ref_peaks);
        }

        if current_index < seg_header.num_expanded_words {
            fill_zero_padding(
                &mut peaks,
                &mut min_mass,
                current_index,
                seg_header.num_expanded_words,
                &seg_header,
                0.0,
                c1,
                c2,
                c3,
            );
        }
    }

    Ok(peaks)
}

#[allow(clippy::too_many_arguments)]
fn fill_zero_padding(
    peaks: &mut Vec<DataPeak>,
    min_mass: &mut f64,
    from: u32,
    to: u32,
    seg_header: &SegmentHeader,
    mass_offset: f64,
    c1: f64,
    c2: f64,
    c3: f64,
) {
    for i in from..to {
        let freq = seg_header.base_abscissa + i as f64 * seg_header.abscissa_spacing;
        let mut mass = freq_to_mass(freq, mass_offset, c1, c2, c3);
        if mass <= *min_mass {
            mass = *min_mass + MASS_REPAIR_STEP;
        }
        *min_mass = mass;
        peaks.push(DataPeak {
            mass,
            intensity: 0.0,
            position: freq,
            options: PeakOptions::NONE,
        });
    }
}

/// Advance `ref_cursor` past reference peaks below the sub-segment's first
/// emitted mass, then flag any reference peak that falls inside the emitted
/// range and is at least as intense as an emitted peak.
fn tag_reference_peaks(
    peaks: &mut [DataPeak],
    sub_segment_start: usize,
    reference_peaks: &[crate::types::LabelPeak],
    ref_cursor: &mut usize,
    include_ref_peaks: bool,
) {
    let emitted = &peaks[sub_segment_start..];
    if emitted.is_empty() {
        return;
    }
    let first_mass = emitted[0].mass;
    let last_mass = emitted[emitted.len() - 1].mass;

    while *ref_cursor < reference_peaks.len() && (reference_peaks[*ref_cursor].mass as f64) < first_mass {
        *ref_cursor += 1;
    }

    if *ref_cursor >= reference_peaks.len() {
        return;
    }
    let candidate = &reference_peaks[*ref_cursor];
    if (candidate.mass as f64) > last_mass {
        return;
    }
    let max_intensity = peaks[sub_segment_start..]
        .iter()
        .map(|p| p.intensity)
        .fold(f64::MIN, f64::max);
    if candidate.intensity as f64 >= max_intensity {
        for peak in &mut peaks[sub_segment_start..] {
            peak.options.insert(PeakOptions::REFERENCE | PeakOptions::EXCEPTION);
            if !include_ref_peaks {
                peak.intensity = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::feature_bits;

    fn build_packet(sub_segments: &[(u32, &[f32])], use_ft_layout: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0f64.to_le_bytes());
        body.extend_from_slice(&1.0f64.to_le_bytes());
        body.extend_from_slice(&(sub_segments.len() as u32).to_le_bytes());
        let expanded_words: u32 = sub_segments.iter().map(|(start, s)| start + s.len() as u32).max().unwrap_or(0);
        body.extend_from_slice(&expanded_words.to_le_bytes());
        for (start, samples) in sub_segments {
            body.extend_from_slice(&start.to_le_bytes());
            body.extend_from_slice(&(samples.len() as u32).to_le_bytes());
            if use_ft_layout {
                body.extend_from_slice(&0f32.to_le_bytes());
            }
            for s in *samples {
                body.extend_from_slice(&s.to_le_bytes());
            }
        }

        let profile_words = body.len() as u32 / 4;
        let flags = if use_ft_layout { feature_bits::FT_PROFILE_LAYOUT } else { 0 };
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes()); // num_segments
        data.extend_from_slice(&profile_words.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // centroid words
        data.extend_from_slice(&flags.to_le_bytes());
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
    fn decodes_single_sub_segment() {
        let data = build_packet(&[(0, &[1.0, 2.0, 3.0])], false);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let calibrators = vec![100000.0, 0.0, 0.0, 0.0];
        let peaks = decode(&data, &header, &calibrators, &[], true).unwrap();
        assert_eq!(peaks.len(), 3);
        assert!(peaks[0].mass < peaks[1].mass);
        assert!(peaks[1].mass < peaks[2].mass);
    }

    #[test]
    fn gap_before_sub_segment_is_zero_padded() {
        let data = build_packet(&[(3, &[5.0])], false);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let calibrators = vec![100000.0, 0.0, 0.0, 0.0];
        let peaks = decode(&data, &header, &calibrators, &[], true).unwrap();
        assert_eq!(peaks.len(), 4);
        assert_eq!(peaks[0].intensity, 0.0);
        assert_eq!(peaks[3].intensity, 5.0);
    }

    #[test]
    fn too_few_calibrators_fails() {
        let data = build_packet(&[(0, &[1.0])], false);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let err = decode(&data, &header, &[1.0, 2.0], &[], true).unwrap_err();
        assert!(matches!(err, RawError::InsufficientCalibrators { .. }));
    }
}
