//! PacketHeader decoder (C8): the per-scan binary blob layout that the
//! centroid/profile/extended-data decoders read sections out of.
//!
//! Eight `u32` words (`num_segments, num_profile_words, num_centroid_words,
//! default_feature_word, num_non_default_feature_words, num_expansion_words,
//! num_noise_info_words, num_debug_info_words`), then `num_segments` mass
//! ranges, then six word-count-addressed sections back to back: profile,
//! centroid, non-default features, expansion, noise, debug.

use crate::memory_reader::MemoryReader;
use crate::types::{NoiseAndBaseline, PeakOptions};
use crate::RawError;

pub mod feature_bits {
    pub const LEGACY_MASS_PRECISION: u32 = 0x40;
    pub const ACCURATE_MASS_CENTROIDS: u32 = 0x10000;
    pub const FT_PROFILE_LAYOUT: u32 = 0x80;
    pub const EXPANDED_LABELS_FAST_PATH: u32 = 0x20000;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassRangeF32 {
    pub low: f32,
    pub high: f32,
}

#[derive(Debug, Clone)]
pub struct PacketHeader {
    pub num_segments: u32,
    pub profile_words: u32,
    pub centroid_words: u32,
    pub default_feature_word: u32,
    pub non_default_feature_words: u32,
    pub expansion_words: u32,
    pub noise_info_words: u32,
    pub debug_info_words: u32,
    pub mass_ranges: Vec<MassRangeF32>,
    /// Byte offset of the profile section, relative to the packet start.
    pub profile_offset: u64,
    pub centroid_offset: u64,
    pub non_default_feature_offset: u64,
    pub expansion_offset: u64,
    pub noise_offset: u64,
    pub debug_offset: u64,
    pub end_offset: u64,
}

impl PacketHeader {
    pub fn parse(data: &[u8], offset: u64) -> Result<Self, RawError> {
        let mut reader = MemoryReader::at_offset(data, offset);
        let num_segments = reader.read_u32()?;
        let profile_words = reader.read_u32()?;
        let centroid_words = reader.read_u32()?;
        let default_feature_word = reader.read_u32()?;
        let non_default_feature_words = reader.read_u32()?;
        let expansion_words = reader.read_u32()?;
        let noise_info_words = reader.read_u32()?;
        let debug_info_words = reader.read_u32()?;

        let mass_ranges = reader.read_array_of(num_segments as usize, 8, |r| {
            Ok(MassRangeF32 {
                low: r.read_f32()?,
                high: r.read_f32()?,
            })
        })?;

        let profile_offset = reader.position();
        let centroid_offset = profile_offset + profile_words as u64 * 4;
        let non_default_feature_offset = centroid_offset + centroid_words as u64 * 4;
        let expansion_offset = non_default_feature_offset + non_default_feature_words as u64 * 4;
        let noise_offset = expansion_offset + expansion_words as u64 * 4;
        let debug_offset = noise_offset + noise_info_words as u64 * 4;
        let end_offset = debug_offset + debug_info_words as u64 * 4;

        Ok(PacketHeader {
            num_segments,
            profile_words,
            centroid_words,
            default_feature_word,
            non_default_feature_words,
            expansion_words,
            noise_info_words,
            debug_info_words,
            mass_ranges,
            profile_offset,
            centroid_offset,
            non_default_feature_offset,
            expansion_offset,
            noise_offset,
            debug_offset,
            end_offset,
        })
    }

    pub fn uses_legacy_mass_precision(&self) -> bool {
        self.default_feature_word & feature_bits::LEGACY_MASS_PRECISION != 0
    }

    pub fn uses_accurate_mass_centroids(&self) -> bool {
        self.default_feature_word & feature_bits::ACCURATE_MASS_CENTROIDS != 0
    }

    pub fn uses_ft_profile_layout(&self) -> bool {
        self.default_feature_word & feature_bits::FT_PROFILE_LAYOUT != 0
    }

    pub fn uses_expanded_labels_fast_path(&self) -> bool {
        self.default_feature_word & feature_bits::EXPANDED_LABELS_FAST_PATH != 0
    }

    /// Bits 19..23 of `default_feature_word`, expanded to the named
    /// `PeakOptions` every peak in this packet starts with.
    pub fn default_peak_options(&self) -> PeakOptions {
        let bits = ((self.default_feature_word >> 19) & 0x1F) as u8;
        PeakOptions::from_bits(bits)
    }

    /// `{mass, noise, baseline}` triples packed into the noise section.
    pub fn noise_records(&self, data: &[u8]) -> Result<Vec<NoiseAndBaseline>, RawError> {
        let count = (self.noise_info_words as usize * 4) / 12;
        let mut reader = MemoryReader::at_offset(data, self.noise_offset);
        reader.read_array_of(count, 12, |r| {
            Ok(NoiseAndBaseline {
                mass: r.read_f32()?,
                noise: r.read_f32()?,
                baseline: r.read_f32()?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(profile_w: u32, centroid_w: u32, segs: &[(f32, f32)], default_feature: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(segs.len() as u32).to_le_bytes());
        data.extend_from_slice(&profile_w.to_le_bytes());
        data.extend_from_slice(&centroid_w.to_le_bytes());
        data.extend_from_slice(&default_feature.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for (lo, hi) in segs {
            data.extend_from_slice(&lo.to_le_bytes());
            data.extend_from_slice(&hi.to_le_bytes());
        }
        data
    }

    #[test]
    fn section_offsets_follow_word_counts() {
        let data = build(2, 3, &[(100.0, 200.0)], 0);
        let header = PacketHeader::parse(&data, 0).unwrap();
        assert_eq!(header.centroid_offset - header.profile_offset, 8);
        assert_eq!(header.non_default_feature_offset - header.centroid_offset, 12);
        assert_eq!(header.mass_ranges.len(), 1);
        assert_eq!(header.mass_ranges[0].low, 100.0);
    }

    #[test]
    fn default_feature_word_decodes_switches() {
        let flags = feature_bits::LEGACY_MASS_PRECISION | feature_bits::ACCURATE_MASS_CENTROIDS | (0b10101 << 19);
        let data = build(0, 0, &[], flags);
        let header = PacketHeader::parse(&data, 0).unwrap();
        assert!(header.uses_legacy_mass_precision());
        assert!(header.uses_accurate_mass_centroids());
        assert!(!header.uses_ft_profile_layout());
        assert_eq!(header.default_peak_options().bits(), 0b10101);
    }

    #[test]
    fn decodes_noise_records() {
        let mut data = build(0, 0, &[], 0);
        // patch noise_info_words (7th header word) to 3 (1 record * 12 bytes / 4)
        data[6 * 4..6 * 4 + 4].copy_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&1.0f32.to_le_bytes());
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.extend_from_slice(&3.0f32.to_le_bytes());
        let header = PacketHeader::parse(&data, 0).unwrap();
        let records = header.noise_records(&data).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], NoiseAndBaseline { mass: 1.0, noise: 2.0, baseline: 3.0 });
    }
}
