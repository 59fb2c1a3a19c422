//! ScanEvent / Reaction model and the total ordering used for deduplication (C4).
//!
//! The per-event on-disk layout, from decompiled `ScanEvent.Load`:
//!   1. ScanEventInfoStruct (preamble, version-dependent fixed size)
//!   2. Reactions array: u32 count + count * Reaction (version-dependent size per entry)
//!   3. MassRanges: u32 count + count * (f64 low, f64 high)
//!   4. MassCalibrators: u32 count + count * f64
//!   5. SourceFragmentations: u32 count + count * f64
//!   6. SourceFragmentationMassRanges: u32 count + count * (f64, f64)
//!   7. Name: length-prefixed UTF-16 (v65+ only)

use crate::memory_reader::MemoryReader;
use crate::types::{
    Activation, Analyser, DetectorState, IonizationMode, MassRange, Polarity, ScanDataType,
    ScanMode, TriState, VoltageType,
};
use crate::version;
use crate::RawError;
use std::cmp::Ordering;

/// One precursor step in an MS/MS chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub precursor_mz: f64,
    pub isolation_width: f64,
    pub isolation_width_offset: f64,
    pub collision_energy: f64,
    pub energy_valid: bool,
    pub activation: Activation,
    /// Set when this reaction carries one or more additional `@activation[energy]`
    /// phrases chained onto it by the filter parser (C6); never set by the
    /// binary reader, which always produces `false`.
    pub is_multiple: bool,
    pub precursor_range_valid: bool,
    pub first_mz: f64,
    pub last_mz: f64,
}

impl Reaction {
    /// Pack `{energy_valid:1, activation:8, is_multiple:1}` into 16 bits for a
    /// version-compatible comparison key independent of on-disk layout.
    pub fn energy_valid_ex(&self) -> u16 {
        let mut bits: u16 = 0;
        if self.energy_valid {
            bits |= 1;
        }
        bits |= (self.activation.code() as u16) << 1;
        if self.is_multiple {
            bits |= 1 << 9;
        }
        bits
    }

    fn parse(reader: &mut MemoryReader, ver: u32) -> Result<Self, RawError> {
        let size = version::reaction_size(ver);
        let start = reader.position();

        let precursor_mz = reader.read_f64()?;
        let isolation_width = reader.read_f64()?;
        let collision_energy = reader.read_f64()?;

        let (energy_valid, activation) = if ver >= 31 {
            let raw = reader.read_u32()?;
            let energy_valid = raw & 1 != 0;
            let code = ((raw >> 1) & 0xFF) as u8;
            (energy_valid, activation_from_code(code))
        } else {
            (true, Activation::Cid)
        };

        let (precursor_range_valid, first_mz, last_mz) = if ver >= 65 {
            let valid = reader.read_i32()? > 0;
            let first = reader.read_f64()?;
            let last = reader.read_f64()?;
            (valid, first, last)
        } else {
            (false, 0.0, 0.0)
        };

        let isolation_width_offset = if ver >= 66 { reader.read_f64()? } else { 0.0 };

        let expected_end = start + size as u64;
        if reader.position() != expected_end {
            reader.set_position(expected_end);
        }

        let mut reaction = Reaction {
            precursor_mz,
            isolation_width,
            isolation_width_offset,
            collision_energy,
            energy_valid,
            activation,
            is_multiple: false,
            precursor_range_valid,
            first_mz,
            last_mz,
        };
        apply_reaction_defaults(&mut reaction, ver);
        Ok(reaction)
    }
}

/// Map the packed activation code stored in `CollisionEnergyValid` bits 1-8
/// back to an `Activation`. Unknown codes map to `Any` per the decoder's
/// "never silently coerce, map to Any" policy.
fn activation_from_code(code: u8) -> Activation {
    match code {
        0 => Activation::Cid,
        1 => Activation::Mpd,
        2 => Activation::Ecd,
        3 => Activation::Pqd,
        4 => Activation::Etd,
        5 => Activation::Hcd,
        6 => Activation::Any,
        7 => Activation::Sa,
        8 => Activation::Ptr,
        9 => Activation::Netd,
        10 => Activation::Nptr,
        11 => Activation::Uvpd,
        12 => Activation::Eid,
        n if (100..126).contains(&n) => Activation::Mode((n - 100 + b'A') as char),
        _ => Activation::Any,
    }
}

/// `< 66` sets `isolation_width_offset = 0`; `< 65` clears `precursor_range_valid`
/// and zeroes `first_mz`/`last_mz`; `< 31` forces `energy_valid = 1`.
fn apply_reaction_defaults(reaction: &mut Reaction, ver: u32) {
    if ver < 66 {
        reaction.isolation_width_offset = 0.0;
    }
    if ver < 65 {
        reaction.precursor_range_valid = false;
        reaction.first_mz = 0.0;
        reaction.last_mz = 0.0;
    }
    if ver < 31 {
        reaction.energy_valid = true;
    }
}

/// A dissociation feature with a tri-state type and a value significant only
/// when the type is `on`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DissociationValue {
    pub state: TriState,
    pub value: f64,
}

/// Source-fragmentation / compensation-voltage acquisition mode and its
/// `on | off | any` gate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoltageFeature {
    pub enabled: TriState,
    pub kind: VoltageType,
}

/// A 26-letter bitset recording, per letter, whether its tri-state was ever
/// set (`applied`) and what it was set to (`value`). `(applied=0)` is `any`,
/// `(applied=1, value=0)` is `off`, `(applied=1, value=1)` is `on`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LetterFlags {
    applied: u32,
    value: u32,
}

impl LetterFlags {
    fn bit(letter: char) -> u32 {
        1 << (letter.to_ascii_uppercase() as u8 - b'A')
    }

    pub fn get(&self, letter: char) -> TriState {
        let bit = Self::bit(letter);
        if self.applied & bit == 0 {
            TriState::Any
        } else if self.value & bit != 0 {
            TriState::On
        } else {
            TriState::Off
        }
    }

    pub fn set(&mut self, letter: char, state: TriState) {
        let bit = Self::bit(letter);
        match state {
            TriState::Any => {
                self.applied &= !bit;
                self.value &= !bit;
            }
            TriState::On => {
                self.applied |= bit;
                self.value |= bit;
            }
            TriState::Off => {
                self.applied |= bit;
                self.value &= !bit;
            }
        }
    }

    pub fn applied_bits(&self) -> u32 {
        self.applied
    }

    pub fn value_bits(&self) -> u32 {
        self.value
    }
}

/// The canonical scanning-method record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    pub analyser: Analyser,
    pub polarity: Polarity,
    pub scan_mode: ScanMode,
    pub scan_data_type: ScanDataType,
    pub ms_order: u8,
    pub sector_scan: TriState,
    pub free_region: TriState,
    pub detector: DetectorState,
    pub detector_value: f64,
    pub ionization_mode: IonizationMode,
    pub accurate_mass: TriState,

    pub turbo_scan: TriState,
    pub lock: TriState,
    pub multiplex: TriState,
    pub enhanced: TriState,
    pub ultra: TriState,
    pub wideband: TriState,
    pub supplemental_activation: TriState,
    pub multi_state_activation: TriState,
    pub corona: TriState,
    pub photo_ionization: TriState,
    pub dependent: TriState,
    pub param_a: TriState,
    pub param_b: TriState,
    pub param_f: TriState,
    pub param_r: TriState,
    pub param_v: TriState,
    pub sps_multi_notch: TriState,

    pub lower_case_flags: LetterFlags,
    pub upper_case_flags: LetterFlags,

    pub ecd: DissociationValue,
    pub etd: DissociationValue,
    pub mpd: DissociationValue,
    pub pqd: DissociationValue,
    pub hcd: DissociationValue,

    pub source_fragmentation: VoltageFeature,
    pub compensation_voltage: VoltageFeature,
    /// Flat buffer: {single|ramp pair} for source-fragmentation, then the
    /// same for compensation-voltage, then (for SIM) one entry per mass range.
    pub source_fragmentations: Vec<f64>,

    pub reactions: Vec<Reaction>,
    pub mass_ranges: Vec<MassRange>,
    pub source_fragmentation_mass_ranges: Vec<MassRange>,
    pub mass_calibrators: Vec<f64>,
    pub scan_type_index: i32,
    pub name: String,
}

impl Default for ScanEvent {
    fn default() -> Self {
        ScanEvent {
            analyser: Analyser::default(),
            polarity: Polarity::default(),
            scan_mode: ScanMode::default(),
            scan_data_type: ScanDataType::default(),
            ms_order: 1,
            sector_scan: TriState::default(),
            free_region: TriState::default(),
            detector: DetectorState::default(),
            detector_value: 0.0,
            ionization_mode: IonizationMode::default(),
            accurate_mass: TriState::default(),
            turbo_scan: TriState::default(),
            lock: TriState::default(),
            multiplex: TriState::default(),
            enhanced: TriState::default(),
            ultra: TriState::default(),
            wideband: TriState::default(),
            supplemental_activation: TriState::default(),
            multi_state_activation: TriState::default(),
            corona: TriState::default(),
            photo_ionization: TriState::default(),
            dependent: TriState::default(),
            param_a: TriState::default(),
            param_b: TriState::default(),
            param_f: TriState::default(),
            param_r: TriState::default(),
            param_v: TriState::default(),
            sps_multi_notch: TriState::default(),
            lower_case_flags: LetterFlags::default(),
            upper_case_flags: LetterFlags::default(),
            ecd: DissociationValue::default(),
            etd: DissociationValue::default(),
            mpd: DissociationValue::default(),
            pqd: DissociationValue::default(),
            hcd: DissociationValue::default(),
            source_fragmentation: VoltageFeature::default(),
            compensation_voltage: VoltageFeature::default(),
            source_fragmentations: Vec::new(),
            reactions: Vec::new(),
            mass_ranges: Vec::new(),
            source_fragmentation_mass_ranges: Vec::new(),
            mass_calibrators: Vec::new(),
            scan_type_index: -1,
            name: String::new(),
        }
    }
}

/// Relaxation knobs for `ScanEvent::compare`. `smart_factor` multiplies the
/// base tolerance of every field; `dependent` then caps the resulting
/// tolerance at 0.2 (used when comparing dependent-scan events, whose masses
/// drift more than a directly-set event's).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    pub smart_factor: Option<f64>,
    pub dependent: bool,
}

impl CompareOptions {
    pub fn exact() -> Self {
        CompareOptions::default()
    }

    fn tolerance(&self, base: f64) -> f64 {
        let t = match self.smart_factor {
            Some(factor) => base * factor,
            None => base,
        };
        if self.dependent {
            t.min(0.2)
        } else {
            t
        }
    }

    fn mass_tolerance(&self) -> f64 {
        self.tolerance(1e-6)
    }

    fn voltage_tolerance(&self) -> f64 {
        self.tolerance(0.01)
    }
}

fn cmp_f64(a: f64, b: f64, tol: f64) -> Ordering {
    if (a - b).abs() <= tol {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

fn cmp_mass_range(a: &MassRange, b: &MassRange, tol: f64) -> Ordering {
    cmp_f64(a.low, b.low, tol).then_with(|| cmp_f64(a.high, b.high, tol))
}

fn cmp_mass_ranges(a: &[MassRange], b: &[MassRange], tol: f64) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| cmp_mass_range(x, y, tol))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    })
}

fn cmp_reactions(a: &[Reaction], b: &[Reaction], tol: f64) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                cmp_f64(x.precursor_mz, y.precursor_mz, tol)
                    .then_with(|| cmp_f64(x.isolation_width, y.isolation_width, tol))
                    .then_with(|| cmp_f64(x.collision_energy, y.collision_energy, tol))
                    .then_with(|| x.energy_valid_ex().cmp(&y.energy_valid_ex()))
                    .then_with(|| x.precursor_range_valid.cmp(&y.precursor_range_valid))
                    .then_with(|| cmp_f64(x.first_mz, y.first_mz, tol))
                    .then_with(|| cmp_f64(x.last_mz, y.last_mz, tol))
                    .then_with(|| cmp_f64(x.isolation_width_offset, y.isolation_width_offset, tol))
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    })
}

fn cmp_dissociation(a: &DissociationValue, b: &DissociationValue, tol: f64) -> Ordering {
    a.state.cmp(&b.state).then_with(|| {
        if a.state == TriState::On {
            cmp_f64(a.value, b.value, tol)
        } else {
            Ordering::Equal
        }
    })
}

impl ScanEvent {
    /// Total ordering used for deduplication and binary search; stops at the
    /// first non-zero comparison.
    pub fn compare(&self, other: &Self, opts: CompareOptions) -> Ordering {
        let mass_tol = opts.mass_tolerance();
        let volt_tol = opts.voltage_tolerance();

        // Step 1: hashable "part 1" fields.
        self.analyser
            .cmp(&other.analyser)
            .then_with(|| self.polarity.cmp(&other.polarity))
            .then_with(|| self.ms_order.cmp(&other.ms_order))
            .then_with(|| self.scan_data_type.cmp(&other.scan_data_type))
            .then_with(|| self.scan_mode.cmp(&other.scan_mode))
            .then_with(|| self.sector_scan.cmp(&other.sector_scan))
            .then_with(|| self.ionization_mode.cmp(&other.ionization_mode))
            .then_with(|| self.detector.cmp(&other.detector))
            .then_with(|| self.dependent.cmp(&other.dependent))
            // Step 2: reactions.
            .then_with(|| cmp_reactions(&self.reactions, &other.reactions, mass_tol))
            // Step 3: mass ranges.
            .then_with(|| cmp_mass_ranges(&self.mass_ranges, &other.mass_ranges, mass_tol))
            // Step 4: source-fragmentation mass ranges.
            .then_with(|| {
                cmp_mass_ranges(
                    &self.source_fragmentation_mass_ranges,
                    &other.source_fragmentation_mass_ranges,
                    mass_tol,
                )
            })
            // Step 5: voltage types then flat buffer.
            .then_with(|| self.source_fragmentation.kind.cmp(&other.source_fragmentation.kind))
            .then_with(|| self.compensation_voltage.kind.cmp(&other.compensation_voltage.kind))
            .then_with(|| {
                self.source_fragmentations
                    .len()
                    .cmp(&other.source_fragmentations.len())
                    .then_with(|| {
                        self.source_fragmentations
                            .iter()
                            .zip(other.source_fragmentations.iter())
                            .map(|(a, b)| cmp_f64(*a, *b, volt_tol))
                            .find(|o| *o != Ordering::Equal)
                            .unwrap_or(Ordering::Equal)
                    })
            })
            // Step 6: analyser-family flags, then dissociation values.
            .then_with(|| self.turbo_scan.cmp(&other.turbo_scan))
            .then_with(|| self.enhanced.cmp(&other.enhanced))
            .then_with(|| self.ultra.cmp(&other.ultra))
            .then_with(|| self.wideband.cmp(&other.wideband))
            .then_with(|| self.supplemental_activation.cmp(&other.supplemental_activation))
            .then_with(|| self.multi_state_activation.cmp(&other.multi_state_activation))
            .then_with(|| cmp_dissociation(&self.ecd, &other.ecd, volt_tol))
            .then_with(|| cmp_dissociation(&self.etd, &other.etd, volt_tol))
            .then_with(|| cmp_dissociation(&self.mpd, &other.mpd, volt_tol))
            .then_with(|| cmp_dissociation(&self.pqd, &other.pqd, volt_tol))
            .then_with(|| cmp_dissociation(&self.hcd, &other.hcd, volt_tol))
            // Step 7.
            .then_with(|| self.photo_ionization.cmp(&other.photo_ionization))
            .then_with(|| self.scan_type_index.cmp(&other.scan_type_index))
            .then_with(|| self.name.cmp(&other.name))
            // Step 8.
            .then_with(|| self.lock.cmp(&other.lock))
            .then_with(|| self.turbo_scan.cmp(&other.turbo_scan))
            .then_with(|| {
                self.upper_case_flags
                    .applied_bits()
                    .cmp(&other.upper_case_flags.applied_bits())
                    .then_with(|| {
                        self.upper_case_flags
                            .value_bits()
                            .cmp(&other.upper_case_flags.value_bits())
                    })
            })
            .then_with(|| {
                self.lower_case_flags
                    .applied_bits()
                    .cmp(&other.lower_case_flags.applied_bits())
                    .then_with(|| {
                        self.lower_case_flags
                            .value_bits()
                            .cmp(&other.lower_case_flags.value_bits())
                    })
            })
    }

    pub fn eq_under(&self, other: &Self, opts: CompareOptions) -> bool {
        self.compare(other, opts) == Ordering::Equal
    }
}

/// Runs at or below this length fall back to insertion sort.
const INSERTION_SORT_THRESHOLD: usize = 8;

/// Sort `events` in place under `ScanEvent::compare`: in-place quicksort
/// with a median-of-three pivot, insertion sort for runs of 8 or fewer.
/// Unique-event indexing keys into the sorted order this produces, so the
/// algorithm itself (not just the final order) is part of the contract.
pub fn sort_scan_events(events: &mut [ScanEvent], opts: CompareOptions) {
    quicksort_by(events, &|a, b| a.compare(b, opts));
}

/// Same algorithm as `sort_scan_events`, keyed off the `ScanEvent` half of
/// each `(original position, event)` pair — used to sort a decoded batch
/// while keeping track of which scan each event came from.
pub fn sort_scan_events_with_positions(pairs: &mut [(u32, ScanEvent)], opts: CompareOptions) {
    quicksort_by(pairs, &|a, b| a.1.compare(&b.1, opts));
}

fn quicksort_by<T>(slice: &mut [T], cmp: &dyn Fn(&T, &T) -> Ordering) {
    if slice.len() <= INSERTION_SORT_THRESHOLD {
        insertion_sort_by(slice, cmp);
        return;
    }
    let pivot = partition_by(slice, cmp);
    let (left, right) = slice.split_at_mut(pivot);
    quicksort_by(left, cmp);
    quicksort_by(&mut right[1..], cmp);
}

fn insertion_sort_by<T>(slice: &mut [T], cmp: &dyn Fn(&T, &T) -> Ordering) {
    for i in 1..slice.len() {
        let mut j = i;
        while j > 0 && cmp(&slice[j - 1], &slice[j]) == Ordering::Greater {
            slice.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn median_of_three_index<T>(slice: &[T], cmp: &dyn Fn(&T, &T) -> Ordering) -> usize {
    let lo = 0;
    let mid = slice.len() / 2;
    let hi = slice.len() - 1;
    let (a, b, c) = (&slice[lo], &slice[mid], &slice[hi]);
    if cmp(a, b) == Ordering::Less {
        if cmp(b, c) == Ordering::Less {
            mid
        } else if cmp(a, c) == Ordering::Less {
            hi
        } else {
            lo
        }
    } else if cmp(a, c) == Ordering::Less {
        lo
    } else if cmp(b, c) == Ordering::Less {
        hi
    } else {
        mid
    }
}

fn partition_by<T>(slice: &mut [T], cmp: &dyn Fn(&T, &T) -> Ordering) -> usize {
    let pivot_idx = median_of_three_index(slice, cmp);
    let last = slice.len() - 1;
    slice.swap(pivot_idx, last);
    let mut store = 0;
    for i in 0..last {
        if cmp(&slice[i], &slice[last]) == Ordering::Less {
            slice.swap(i, store);
            store += 1;
        }
    }
    slice.swap(store, last);
    store
}

/// `< 65`: `multiplex, paramA, paramB, paramF, sps_multi_notch, paramR, paramV = any`;
/// `name = ""`; precursor mass-range array empty.
/// `< 63`: `supplemental_activation, multi_state_activation,
/// compensation_voltage, compensation_voltage_type = any`.
/// `< 62`: `pqd, etd, hcd` type `= any`, value `= 0`.
/// `< 54`: `analyser, sector_scan, lock, free_region, ultra, enhanced, mpd_type,
/// ecd_type, photo_ionization = any`; their values 0.
/// `< 51`: `accurate_mass = any`.
/// `< 48`: `wideband = any`.
/// `< 31`: `source_fragmentation_type = any`; `scan_type_index = -1`.
/// `< 25`: `ionization_mode = any_ionization`; `corona, detector_state = any`;
/// `detector_value = 0`.
/// `< 14`: `turbo_scan = any`.
pub fn apply_scan_event_defaults(event: &mut ScanEvent, revision: u32) {
    if revision < 65 {
        event.multiplex = TriState::Any;
        event.param_a = TriState::Any;
        event.param_b = TriState::Any;
        event.param_f = TriState::Any;
        event.sps_multi_notch = TriState::Any;
        event.param_r = TriState::Any;
        event.param_v = TriState::Any;
        event.name.clear();
    }
    if revision < 63 {
        event.supplemental_activation = TriState::Any;
        event.multi_state_activation = TriState::Any;
        event.compensation_voltage = VoltageFeature::default();
    }
    if revision < 62 {
        event.pqd = DissociationValue::default();
        event.etd = DissociationValue::default();
        event.hcd = DissociationValue::default();
    }
    if revision < 54 {
        event.analyser = Analyser::Any;
        event.sector_scan = TriState::Any;
        event.lock = TriState::Any;
        event.free_region = TriState::Any;
        event.ultra = TriState::Any;
        event.enhanced = TriState::Any;
        event.mpd = DissociationValue::default();
        event.ecd = DissociationValue::default();
        event.photo_ionization = TriState::Any;
    }
    if revision < 51 {
        event.accurate_mass = TriState::Any;
    }
    if revision < 48 {
        event.wideband = TriState::Any;
    }
    if revision < 31 {
        event.source_fragmentation.kind = VoltageType::Any;
        event.scan_type_index = -1;
    }
    if revision < 25 {
        event.ionization_mode = IonizationMode::Any;
        event.corona = TriState::Any;
        event.detector = DetectorState::Any;
        event.detector_value = 0.0;
    }
    if revision < 14 {
        event.turbo_scan = TriState::Any;
    }
}

/// Read a u32-prefixed array of f64 values.
fn read_doubles_array(reader: &mut MemoryReader) -> Result<Vec<f64>, RawError> {
    let count = reader.read_u32()?;
    reader.read_f64_array(count as usize)
}

/// Read a u32-prefixed array of `(f64, f64)` mass ranges.
fn read_mass_range_array(reader: &mut MemoryReader) -> Result<Vec<MassRange>, RawError> {
    let count = reader.read_u32()?;
    let mut ranges = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let low = reader.read_f64()?;
        let high = reader.read_f64()?;
        ranges.push(MassRange { low, high });
    }
    Ok(ranges)
}

/// Decode the fixed preamble bytes into the subset of `ScanEvent` fields they
/// carry. Field byte offsets are those of the current (v65+) layout; shorter
/// shadows simply have fewer trailing bytes available, handled by bounds
/// checks that fall back to the zero/`Any` default already on the struct.
fn decode_preamble(event: &mut ScanEvent, data: &[u8]) {
    let byte = |i: usize| -> Option<u8> { data.get(i).copied() };

    if let Some(b) = byte(4) {
        event.polarity = match b {
            0 => Polarity::Negative,
            1 => Polarity::Positive,
            _ => Polarity::Unknown,
        };
    }
    if let Some(b) = byte(5) {
        event.scan_data_type = match b {
            0 => ScanDataType::Centroid,
            1 => ScanDataType::Profile,
            _ => ScanDataType::Any,
        };
    }
    if let Some(b) = byte(6) {
        event.ms_order = b.max(1);
    }
    if let Some(b) = byte(7) {
        event.scan_mode = match b {
            0 => ScanMode::Full,
            2 => ScanMode::Sim,
            3 => ScanMode::Srm,
            4 => ScanMode::Crm,
            7 => ScanMode::Q1Ms,
            8 => ScanMode::Q3Ms,
            _ => ScanMode::Full,
        };
    }
    if let Some(b) = byte(10) {
        event.dependent = if b == 1 { TriState::On } else { TriState::Off };
    }
    if let Some(b) = byte(11) {
        event.ionization_mode = match b {
            0 => IonizationMode::Ei,
            1 => IonizationMode::Ci,
            2 => IonizationMode::Fab,
            3 => IonizationMode::Esi,
            4 => IonizationMode::Apci,
            5 => IonizationMode::Nsi,
            8 => IonizationMode::Maldi,
            _ => IonizationMode::Any,
        };
    }
    if let Some(b) = byte(40) {
        event.analyser = match b {
            0 => Analyser::Itms,
            1 => Analyser::Tqms,
            2 => Analyser::Sqms,
            3 => Analyser::Tofms,
            4 => Analyser::Ftms,
            5 => Analyser::Sector,
            _ => Analyser::Any,
        };
    }
}

/// Parse one `ScanEvent` starting at `offset`. Returns the event and the
/// offset immediately following it.
pub fn parse_scan_event(data: &[u8], offset: u64, ver: u32) -> Result<(ScanEvent, u64), RawError> {
    let preamble_size = version::scan_event_preamble_size(ver);
    let mut reader = MemoryReader::at_offset(data, offset);

    let preamble_bytes = reader.read_bytes(preamble_size)?;
    let mut event = ScanEvent::default();
    decode_preamble(&mut event, &preamble_bytes);

    let n_reactions = reader.read_u32()?;
    let mut reactions = Vec::with_capacity(n_reactions as usize);
    for _ in 0..n_reactions {
        reactions.push(Reaction::parse(&mut reader, ver)?);
    }
    event.reactions = reactions;

    event.mass_ranges = read_mass_range_array(&mut reader)?;
    event.mass_calibrators = read_doubles_array(&mut reader)?;
    event.source_fragmentations = read_doubles_array(&mut reader)?;
    event.source_fragmentation_mass_ranges = read_mass_range_array(&mut reader)?;

    if ver >= 65 {
        event.name = reader.read_string_length_prefixed()?;
    }

    apply_scan_event_defaults(&mut event, ver);

    Ok((event, reader.position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ScanEvent {
        let mut e = ScanEvent {
            analyser: Analyser::Ftms,
            polarity: Polarity::Positive,
            ms_order: 2,
            ..ScanEvent::default()
        };
        e.reactions.push(Reaction {
            precursor_mz: 803.4611,
            isolation_width: 2.0,
            isolation_width_offset: 0.0,
            collision_energy: 35.0,
            energy_valid: true,
            activation: Activation::Hcd,
            is_multiple: false,
            precursor_range_valid: false,
            first_mz: 0.0,
            last_mz: 0.0,
        });
        e
    }

    #[test]
    fn identical_events_compare_equal() {
        let a = sample_event();
        let b = sample_event();
        assert_eq!(a.compare(&b, CompareOptions::exact()), Ordering::Equal);
    }

    #[test]
    fn differing_precursor_mz_breaks_tie() {
        let a = sample_event();
        let mut b = sample_event();
        b.reactions[0].precursor_mz += 1.0;
        assert_ne!(a.compare(&b, CompareOptions::exact()), Ordering::Equal);
    }

    #[test]
    fn smart_tolerance_collapses_small_mass_difference() {
        let a = sample_event();
        let mut b = sample_event();
        b.reactions[0].precursor_mz += 1e-7;
        let opts = CompareOptions {
            smart_factor: Some(10.0),
            dependent: false,
        };
        assert_eq!(a.compare(&b, opts), Ordering::Equal);
    }

    #[test]
    fn letter_flags_round_trip() {
        let mut flags = LetterFlags::default();
        assert_eq!(flags.get('c'), TriState::Any);
        flags.set('c', TriState::On);
        assert_eq!(flags.get('c'), TriState::On);
        flags.set('c', TriState::Off);
        assert_eq!(flags.get('c'), TriState::Off);
    }

    #[test]
    fn defaults_clear_name_before_v65() {
        let mut event = ScanEvent {
            name: "x".into(),
            ..ScanEvent::default()
        };
        apply_scan_event_defaults(&mut event, 60);
        assert_eq!(event.name, "");
        assert_eq!(event.multiplex, TriState::Any);
    }

    fn with_ms_order(order: u8) -> ScanEvent {
        ScanEvent {
            ms_order: order,
            ..ScanEvent::default()
        }
    }

    fn is_sorted(events: &[ScanEvent], opts: CompareOptions) -> bool {
        events.windows(2).all(|w| w[0].compare(&w[1], opts) != Ordering::Greater)
    }

    #[test]
    fn sort_small_run_uses_insertion_sort_path() {
        let mut events: Vec<ScanEvent> = vec![5, 3, 1, 4, 2].into_iter().map(with_ms_order).collect();
        sort_scan_events(&mut events, CompareOptions::exact());
        let orders: Vec<u8> = events.iter().map(|e| e.ms_order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn sort_large_run_uses_quicksort_path() {
        let mut orders: Vec<u8> = (0..100).map(|i| (i * 37 % 101) as u8).collect();
        orders.push(0);
        let mut events: Vec<ScanEvent> = orders.into_iter().map(with_ms_order).collect();
        sort_scan_events(&mut events, CompareOptions::exact());
        assert!(is_sorted(&events, CompareOptions::exact()));
        assert_eq!(events.len(), 101);
    }

    #[test]
    fn sort_groups_equal_events_contiguously() {
        let mut events = vec![
            with_ms_order(2),
            with_ms_order(1),
            with_ms_order(2),
            with_ms_order(1),
            with_ms_order(2),
        ];
        sort_scan_events(&mut events, CompareOptions::exact());
        let orders: Vec<u8> = events.iter().map(|e| e.ms_order).collect();
        assert_eq!(orders, vec![1, 1, 2, 2, 2]);
    }
}
