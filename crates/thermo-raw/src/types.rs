//! Shared primitives used across the scan-event model, filter grammar, and
//! packet decoders.

/// A closed (low, high) mass window. Empty ranges (`low == high == 0.0`, or
/// any range with `low == high`) are permitted and mean "any".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassRange {
    pub low: f64,
    pub high: f64,
}

impl MassRange {
    pub fn new(low: f64, high: f64) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self { low: high, high: low }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low == 0.0 && self.high == 0.0
    }
}

/// A boolean feature whose absence is distinguishable from both states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TriState {
    #[default]
    Any,
    On,
    Off,
}

impl TriState {
    pub fn from_applied(applied: bool, flag: bool) -> Self {
        match (applied, flag) {
            (false, _) => TriState::Any,
            (true, true) => TriState::On,
            (true, false) => TriState::Off,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, TriState::On)
    }
}

/// Mass spectrometry polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Polarity {
    Positive,
    Negative,
    #[default]
    Unknown,
}

/// The mass analyser used for a scanning method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Analyser {
    #[default]
    Any,
    Itms,
    Ftms,
    Tqms,
    Sqms,
    Tofms,
    Sector,
}

/// Whether the acquired spectrum is centroided or profile (continuum) data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ScanDataType {
    #[default]
    Any,
    Centroid,
    Profile,
}

/// Single vs. multiply-segmented / enhanced scan acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ScanMode {
    #[default]
    Full,
    Sim,
    Srm,
    Crm,
    Q1Ms,
    Q3Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IonizationMode {
    #[default]
    Any,
    Esi,
    Nsi,
    Apci,
    Apcimaldi,
    Ei,
    Ci,
    Fab,
    Thermo,
    Glow,
    Fi,
    Fd,
    Maldi,
    Cimaldi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DetectorState {
    #[default]
    Any,
    Valid,
}

/// Source-fragmentation / compensation-voltage acquisition style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VoltageType {
    #[default]
    Any,
    None,
    Single,
    Ramp,
    Sim,
}

/// Dissociation / activation method. `Mode(letter)` covers the 26 opaque
/// single-letter activation modes the grammar calls `modeA`..`modeZ` beyond
/// the named methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Activation {
    #[default]
    Any,
    Cid,
    Hcd,
    Etd,
    Ecd,
    Mpd,
    Pqd,
    Ptr,
    Netd,
    Nptr,
    Uvpd,
    Eid,
    Ee,
    Sa,
    Mode(char),
}

impl Activation {
    /// 8-bit code used to pack `energy_valid_ex`. Stable across file
    /// revisions since it's an in-memory comparison key, never persisted.
    pub fn code(&self) -> u8 {
        match self {
            Activation::Any => 0,
            Activation::Cid => 1,
            Activation::Hcd => 2,
            Activation::Etd => 3,
            Activation::Ecd => 4,
            Activation::Mpd => 5,
            Activation::Pqd => 6,
            Activation::Ptr => 7,
            Activation::Netd => 8,
            Activation::Nptr => 9,
            Activation::Uvpd => 10,
            Activation::Eid => 11,
            Activation::Ee => 12,
            Activation::Sa => 13,
            Activation::Mode(c) => 100 + (*c as u8 - b'A'),
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "cid" => Some(Activation::Cid),
            "hcd" => Some(Activation::Hcd),
            "etd" => Some(Activation::Etd),
            "ecd" => Some(Activation::Ecd),
            "mpd" => Some(Activation::Mpd),
            "pqd" => Some(Activation::Pqd),
            "ptr" => Some(Activation::Ptr),
            "netd" => Some(Activation::Netd),
            "nptr" => Some(Activation::Nptr),
            "uvpd" => Some(Activation::Uvpd),
            "eid" => Some(Activation::Eid),
            "ee" => Some(Activation::Ee),
            "sa" => Some(Activation::Sa),
            t if t.len() == 5 && t.starts_with("mode") => {
                let c = t.as_bytes()[4].to_ascii_uppercase();
                if c.is_ascii_uppercase() {
                    Some(Activation::Mode(c as char))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn token(&self) -> String {
        match self {
            Activation::Any => String::new(),
            Activation::Cid => "cid".into(),
            Activation::Hcd => "hcd".into(),
            Activation::Etd => "etd".into(),
            Activation::Ecd => "ecd".into(),
            Activation::Mpd => "mpd".into(),
            Activation::Pqd => "pqd".into(),
            Activation::Ptr => "ptr".into(),
            Activation::Netd => "netd".into(),
            Activation::Nptr => "nptr".into(),
            Activation::Uvpd => "uvpd".into(),
            Activation::Eid => "eid".into(),
            Activation::Ee => "ee".into(),
            Activation::Sa => "sa".into(),
            Activation::Mode(c) => format!("mode{}", c),
        }
    }
}

/// A bitset of per-peak decode flags. Named bits, never exposed as a raw
/// integer to callers of the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeakOptions(u8);

impl PeakOptions {
    pub const NONE: PeakOptions = PeakOptions(0);
    pub const FRAGMENTED: PeakOptions = PeakOptions(1 << 0);
    pub const MERGED: PeakOptions = PeakOptions(1 << 1);
    pub const EXCEPTION: PeakOptions = PeakOptions(1 << 2);
    pub const REFERENCE: PeakOptions = PeakOptions(1 << 3);
    pub const MODIFIED: PeakOptions = PeakOptions(1 << 4);
    pub const SATURATED: PeakOptions = PeakOptions(1 << 5);

    pub fn from_bits(bits: u8) -> Self {
        PeakOptions(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: PeakOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: PeakOptions) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: PeakOptions) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for PeakOptions {
    type Output = PeakOptions;
    fn bitor(self, rhs: PeakOptions) -> PeakOptions {
        PeakOptions(self.0 | rhs.0)
    }
}

/// One decoded profile or centroid sample before it is split into the
/// label/reference peak lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPeak {
    pub mass: f64,
    pub intensity: f64,
    /// Frequency for FT profile points pre-calibration, otherwise equal to `mass`.
    pub position: f64,
    pub options: PeakOptions,
}

/// A centroid peak, annotated with the fields the accurate-mass/legacy
/// centroid blob and non-default feature words can carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPeak {
    pub mass: f64,
    pub intensity: f32,
    pub resolution: f32,
    pub charge: u8,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseAndBaseline {
    pub mass: f32,
    pub noise: f32,
    pub baseline: f32,
}
