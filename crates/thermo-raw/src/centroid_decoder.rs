//! CentroidDecoder (C9): turns the centroid section of a packet into
//! `label_peaks`/`reference_peaks`, or a bare `(masses, intensities)` pair
//! for callers that only want the simplified fast path.

use crate::memory_reader::MemoryReader;
use crate::packet::PacketHeader;
use crate::types::{LabelPeak, PeakOptions};
use crate::RawError;

pub struct CentroidResult {
    pub label_peaks: Vec<LabelPeak>,
    pub reference_peaks: Vec<LabelPeak>,
}

pub fn decode(data: &[u8], header: &PacketHeader, include_ref_peaks: bool) -> Result<CentroidResult, RawError> {
    let accurate = header.uses_accurate_mass_centroids() && !header.uses_legacy_mass_precision();
    let default_opts = header.default_peak_options();

    let mut peaks = Vec::new();
    let mut reader = MemoryReader::at_offset(data, header.centroid_offset);
    for _ in 0..header.num_segments {
        let count = reader.read_u32()? as usize;
        for _ in 0..count {
            let mass = if accurate {
                reader.read_f64()?
            } else {
                reader.read_f32()? as f64
            };
            let intensity = reader.read_f32()?;
            peaks.push(LabelPeak {
                mass,
                intensity,
                resolution: 0.0,
                charge: 0,
                flags: default_opts.bits(),
            });
        }
    }

    apply_non_default_features(data, header, &mut peaks, include_ref_peaks)?;
    apply_expansion_widths(data, header, &mut peaks)?;

    let ref_mask = PeakOptions::REFERENCE | PeakOptions::EXCEPTION;
    let mut label_peaks = Vec::with_capacity(peaks.len());
    let mut reference_peaks = Vec::new();
    for peak in peaks {
        if PeakOptions::from_bits(peak.flags).contains(ref_mask) {
            reference_peaks.push(peak);
            if include_ref_peaks {
                label_peaks.push(peak);
            }
        } else {
            label_peaks.push(peak);
        }
    }

    Ok(CentroidResult {
        label_peaks,
        reference_peaks,
    })
}

fn apply_non_default_features(
    data: &[u8],
    header: &PacketHeader,
    peaks: &mut [LabelPeak],
    include_ref_peaks: bool,
) -> Result<(), RawError> {
    let mut reader = MemoryReader::at_offset(data, header.non_default_feature_offset);
    for _ in 0..header.non_default_feature_words {
        let word = reader.read_u32()?;
        let index = (word & 0x3FFFF) as usize;
        let extra_flags = ((word >> 19) & 0x1F) as u8;
        let charge = ((word >> 24) & 0xFF) as u8;

        let Some(peak) = peaks.get_mut(index) else {
            continue;
        };
        peak.flags |= extra_flags;
        peak.charge = charge;

        let opts = PeakOptions::from_bits(peak.flags);
        if opts.contains(PeakOptions::REFERENCE | PeakOptions::EXCEPTION) && !include_ref_peaks {
            peak.intensity = 0.0;
        }
    }
    Ok(())
}

fn apply_expansion_widths(data: &[u8], header: &PacketHeader, peaks: &mut [LabelPeak]) -> Result<(), RawError> {
    if header.expansion_words == 0 {
        return Ok(());
    }
    let mut reader = MemoryReader::at_offset(data, header.expansion_offset);
    let has_widths = reader.read_i32()?;
    if has_widths == 0 {
        return Ok(());
    }
    for peak in peaks.iter_mut() {
        if reader.remaining() < 4 {
            break;
        }
        peak.resolution = reader.read_f32()?;
    }
    Ok(())
}

/// Masses and intensities only, skipping label/flag assembly entirely.
pub fn decode_simplified(data: &[u8], header: &PacketHeader) -> Result<(Vec<f64>, Vec<f64>), RawError> {
    let accurate = header.uses_accurate_mass_centroids() && !header.uses_legacy_mass_precision();
    let mut masses = Vec::new();
    let mut intensities = Vec::new();
    let mut reader = MemoryReader::at_offset(data, header.centroid_offset);
    for _ in 0..header.num_segments {
        let count = reader.read_u32()? as usize;
        for _ in 0..count {
            let mass = if accurate {
                reader.read_f64()?
            } else {
                reader.read_f32()? as f64
            };
            let intensity = reader.read_f32()? as f64;
            masses.push(mass);
            intensities.push(intensity);
        }
    }
    Ok((masses, intensities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::feature_bits;

    fn build_packet(accurate: bool, segments: &[Vec<(f64, f32)>]) -> Vec<u8> {
        let centroid_words: u32 = segments
            .iter()
            .map(|s| 1 + s.len() as u32 * if accurate { 3 } else { 2 })
            .sum();
        let flags = if accurate { feature_bits::ACCURATE_MASS_CENTROIDS } else { 0 };
        let mut data = Vec::new();
        data.extend_from_slice(&(segments.len() as u32).to_le_bytes()); // num_segments
        data.extend_from_slice(&0u32.to_le_bytes()); // profile words
        data.extend_from_slice(&centroid_words.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // non-default feature words
        data.extend_from_slice(&0u32.to_le_bytes()); // expansion words
        data.extend_from_slice(&0u32.to_le_bytes()); // noise words
        data.extend_from_slice(&0u32.to_le_bytes()); // debug words
        for _ in segments {
            data.extend_from_slice(&0f32.to_le_bytes());
            data.extend_from_slice(&0f32.to_le_bytes());
        }
        for segment in segments {
            data.extend_from_slice(&(segment.len() as u32).to_le_bytes());
            for (mass, intensity) in segment {
                if accurate {
                    data.extend_from_slice(&mass.to_le_bytes());
                } else {
                    data.extend_from_slice(&(*mass as f32).to_le_bytes());
                }
                data.extend_from_slice(&intensity.to_le_bytes());
            }
        }
        data
    }

    #[test]
    fn decodes_legacy_centroids() {
        let data = build_packet(false, &[vec![(100.5, 1000.0), (200.25, 500.0)]]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let result = decode(&data, &header, true).unwrap();
        assert_eq!(result.label_peaks.len(), 2);
        assert!((result.label_peaks[0].mass - 100.5).abs() < 1e-4);
        assert_eq!(result.reference_peaks.len(), 0);
    }

    #[test]
    fn decodes_accurate_mass_centroids() {
        let data = build_packet(true, &[vec![(123.456789, 42.0)]]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let result = decode(&data, &header, true).unwrap();
        assert!((result.label_peaks[0].mass - 123.456789).abs() < 1e-9);
    }

    #[test]
    fn simplified_path_skips_flags() {
        let data = build_packet(false, &[vec![(1.0, 2.0), (3.0, 4.0)]]);
        let header = PacketHeader::parse(&data, 0).unwrap();
        let (masses, intensities) = decode_simplified(&data, &header).unwrap();
        assert_eq!(masses, vec![1.0, 3.0]);
        assert_eq!(intensities, vec![2.0, 4.0]);
    }
}
