//! Per-scan decode: runs a packet through C8-C12 and folds in the owning
//! `ScanEvent`'s filter-derived metadata.

use crate::centroid_decoder;
use crate::ft_profile_decoder;
use crate::lt_profile_decoder;
use crate::packet::PacketHeader;
use crate::scan_event::ScanEvent;
use crate::scan_index::ScanIndexEntry;
use crate::types::{Activation, Analyser, DataPeak, LabelPeak, Polarity};
use crate::RawError;

/// Decode-time knobs threaded into the centroid/profile decoders.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub include_ref_peaks: bool,
    pub zero_padding: bool,
    /// Reserved for a future tolerant centroid/reference match; unused by
    /// the decoders in this crate today.
    pub smart_tolerance: Option<f64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            include_ref_peaks: false,
            zero_padding: true,
            smart_tolerance: None,
        }
    }
}

/// Precursor step carried over from the owning scan event's last reaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecursorInfo {
    pub mz: f64,
    pub charge: Option<i32>,
    pub isolation_width: Option<f64>,
    pub activation: Option<Activation>,
    pub collision_energy: Option<f64>,
}

/// One decoded scan: index-table summary fields plus packet contents.
pub struct Scan {
    pub scan_number: u32,
    pub retention_time: f64,
    pub tic: f64,
    pub base_peak_mz: f64,
    pub base_peak_intensity: f64,
    pub ms_level: u8,
    pub polarity: Polarity,
    pub filter_string: Option<String>,
    pub precursor: Option<PrecursorInfo>,
    pub label_peaks: Vec<LabelPeak>,
    pub reference_peaks: Vec<LabelPeak>,
    pub profile: Vec<DataPeak>,
}

impl Scan {
    pub fn centroid_mz(&self) -> Vec<f64> {
        self.label_peaks.iter().map(|p| p.mass).collect()
    }

    pub fn centroid_intensity(&self) -> Vec<f64> {
        self.label_peaks.iter().map(|p| p.intensity as f64).collect()
    }
}

pub(crate) fn precursor_from_event(event: &ScanEvent) -> Option<PrecursorInfo> {
    let reaction = event.reactions.last()?;
    Some(PrecursorInfo {
        mz: reaction.precursor_mz,
        charge: None,
        isolation_width: Some(reaction.isolation_width).filter(|&w| w > 0.0),
        activation: Some(reaction.activation),
        collision_energy: Some(reaction.collision_energy),
    })
}

/// Decode the packet at `data_addr + entry.offset` and fold in `event`'s
/// filter-derived fields (MS level, polarity, precursor chain).
pub fn decode_scan(
    data: &[u8],
    data_addr: u64,
    entry: &ScanIndexEntry,
    scan_number: u32,
    event: Option<&ScanEvent>,
    options: DecodeOptions,
) -> Result<Scan, RawError> {
    let offset = data_addr + entry.offset;
    let header = PacketHeader::parse(data, offset)?;

    let centroid = centroid_decoder::decode(data, &header, options.include_ref_peaks)?;

    let profile = if header.profile_words > 0 {
        decode_profile(data, &header, event, &centroid.reference_peaks, options)
    } else {
        Vec::new()
    };

    let ms_level = event.map(|e| e.ms_order).unwrap_or(1);
    let polarity = event.map(|e| e.polarity).unwrap_or_default();
    let precursor = if ms_level > 1 {
        event.and_then(precursor_from_event)
    } else {
        None
    };

    Ok(Scan {
        scan_number,
        retention_time: entry.rt,
        tic: entry.tic,
        base_peak_mz: entry.base_peak_mz,
        base_peak_intensity: entry.base_peak_intensity,
        ms_level,
        polarity,
        filter_string: None,
        precursor,
        label_peaks: centroid.label_peaks,
        reference_peaks: centroid.reference_peaks,
        profile,
    })
}

/// FT detectors (Fourier-transform analysers) decode frequency-domain
/// sub-segments; everything else is linear-trap mass-space.
fn decode_profile(
    data: &[u8],
    header: &PacketHeader,
    event: Option<&ScanEvent>,
    reference_peaks: &[LabelPeak],
    options: DecodeOptions,
) -> Vec<DataPeak> {
    let is_ft = matches!(event.map(|e| e.analyser), Some(Analyser::Ftms));
    if is_ft {
        let calibrators = event.map(|e| e.mass_calibrators.as_slice()).unwrap_or(&[]);
        ft_profile_decoder::decode(data, header, calibrators, reference_peaks, options.include_ref_peaks)
            .unwrap_or_else(|e| {
                log::warn!("FT profile decode failed, returning empty profile: {}", e);
                Vec::new()
            })
    } else {
        lt_profile_decoder::decode(data, header, options.zero_padding).unwrap_or_else(|e| {
            log::warn!("LT profile decode failed, returning empty profile: {}", e);
            Vec::new()
        })
    }
}
