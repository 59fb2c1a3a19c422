//! Versioned struct layout selection (C2).
//!
//! Thermo RAW files carry an integer `fileRevision` that selects, for each
//! structured record this crate reads, which of several fixed-size on-disk
//! layouts is present. `RevisionTable` holds the `(minVersion, fixedByteSize)`
//! pairs for one record kind; `size_for` selects the largest `minVersion` that
//! is `<= fileRevision`. Widening the shadow-sized read into the canonical,
//! always-present-fields record (and filling in defaults for fields that
//! didn't exist yet) is the job of the type owning that record — see
//! `scan_event::apply_scan_event_defaults` / `apply_reaction_defaults`.
//!
//! Key version boundaries (from decompiled ThermoFisher.CommonCore.RawFileReader):
//! - v64: 64-bit addresses, VirtualControllerInfoStruct, RunHeader extended offsets
//! - v65: ScanIndexEntry gains CycleNumber (84→88 bytes with padding),
//!   ScanEventInfoStruct gains new filter flags (128→132 bytes),
//!   RawFileInfo gains BlobOffset/BlobSize,
//!   ScanEvent gains Name field, Reaction gains precursor mass range
//! - v66: RunHeader gains InstrumentType field,
//!   Reaction gains IsolationWidthOffset (48→56 bytes)

use crate::RawError;

/// Minimum supported RAW file version.
pub const MIN_SUPPORTED_VERSION: u32 = 57;
/// Maximum supported RAW file version.
pub const MAX_SUPPORTED_VERSION: u32 = 66;

/// Finnigan file header magic number.
pub const FINNIGAN_MAGIC: u16 = 0xA101;

/// Check whether a RAW file version is supported.
pub fn is_supported(version: u32) -> bool {
    (MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version)
}

/// A `(minVersion, fixedByteSize)` layout table for one record kind, sorted
/// descending by `minVersion` so the first match is the applicable one.
pub struct RevisionTable(&'static [(u32, usize)]);

impl RevisionTable {
    /// Select the largest `minVersion` that is `<= revision`.
    pub fn size_for(&self, revision: u32) -> Result<usize, RawError> {
        self.0
            .iter()
            .find(|(min_version, _)| revision >= *min_version)
            .map(|(_, size)| *size)
            .ok_or(RawError::UnsupportedRevision(revision))
    }
}

/// `ScanEventInfoStruct` shadow sizes, from decompiled `ScanEvent.ReadStructure`
/// version dispatch (entries sorted descending by min version).
pub static SCAN_EVENT_PREAMBLE_SIZES: RevisionTable = RevisionTable(&[
    (65, 132),
    (63, 128),
    (62, 120),
    (57, 80),
    (0, 41),
]);

/// `MsReactionStruct` shadow sizes, from decompiled `Reaction.Load`.
pub static REACTION_SIZES: RevisionTable = RevisionTable(&[
    (66, 56),
    (65, 48),
    (31, 32),
    (0, 24),
]);

/// `ScanIndexStruct` shadow sizes, from decompiled
/// `ScanIndices.GetSizeOfScanIndexStructByFileVersion`.
pub static SCAN_INDEX_SIZES: RevisionTable = RevisionTable(&[(65, 88), (64, 80), (0, 72)]);

pub fn scan_event_preamble_size(version: u32) -> usize {
    SCAN_EVENT_PREAMBLE_SIZES.size_for(version).unwrap_or(41)
}

pub fn reaction_size(version: u32) -> usize {
    REACTION_SIZES.size_for(version).unwrap_or(24)
}

pub fn scan_index_entry_size(version: u32) -> usize {
    SCAN_INDEX_SIZES.size_for(version).unwrap_or(72)
}

/// Whether the version uses 64-bit addresses.
pub fn uses_64bit_addresses(version: u32) -> bool {
    version >= 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_event_size_thresholds() {
        assert_eq!(scan_event_preamble_size(66), 132);
        assert_eq!(scan_event_preamble_size(63), 128);
        assert_eq!(scan_event_preamble_size(60), 80);
        assert_eq!(scan_event_preamble_size(10), 41);
    }

    #[test]
    fn reaction_size_thresholds() {
        assert_eq!(reaction_size(66), 56);
        assert_eq!(reaction_size(65), 48);
        assert_eq!(reaction_size(40), 32);
        assert_eq!(reaction_size(5), 24);
    }
}
