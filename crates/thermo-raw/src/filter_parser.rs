//! Scan filter string grammar: parse (C6) and print (C7, in `filter_printer`).
//!
//! ```text
//! filter      := segscan? tokens mass_ranges?
//! segscan     := '{' int ',' int '}'
//! mass_ranges := '[' range (',' range)* ']'
//! range       := float ('-' float)? ('@' float)?
//! tokens      := (named_token | letter_flag | reaction_phrase)*
//! ```
//!
//! Named tokens (`Full`, `SIM`, `Q1MS`, `Q3MS`, `ms`/`msN`/`msNd`, `mpd`/`ecd`
//! dissociation phrases, polarity/ionization/analyser keywords, `sid`/`cv`
//! voltage phrases) are matched case-insensitively against a fixed
//! dictionary; bare letters fall through to the lower/upper-case flag
//! tables. A leading `!` inverts a letter, voltage phrase, or tri-state
//! keyword to `off`; categories with no off state (scan mode, polarity, scan
//! data type, analyser, ionization mode, detector) reject a leading `!`. The
//! mass-range list is a trailing bracketed phrase, matching where the
//! printer emits it; per-range energies in SIM mode are pushed into
//! `source_fragmentations` in range order. `BadFilter` is returned on any
//! grammar violation or semantic inconsistency (duplicate mass range, `msN`
//! that disagrees with the reaction count actually parsed); setting the same
//! token category or letter twice is a `DuplicateToken` error. The parser
//! never partially commits into the caller's `ScanEvent`.

use crate::scan_event::{Reaction, ScanEvent};
use crate::types::{
    Activation, Analyser, DetectorState, IonizationMode, MassRange, Polarity, ScanDataType,
    ScanMode, TriState, VoltageType,
};
use crate::RawError;
use std::collections::HashSet;

/// A cursor over the filter string's whitespace-delimited tokens.
struct Tokenizer<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokenizer<'a> {
    fn new(s: &'a str) -> Self {
        Tokenizer {
            tokens: s.split_whitespace(),
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }
}

fn bad_filter(reason: impl Into<String>) -> RawError {
    RawError::BadFilter(reason.into())
}

fn duplicate_token(reason: impl Into<String>) -> RawError {
    RawError::DuplicateToken(reason.into())
}

/// Parse a complete filter string into a `ScanEvent`.
pub fn parse_filter(input: &str) -> Result<ScanEvent, RawError> {
    let mut rest = input.trim();
    let mut event = ScanEvent::default();

    if let Some(stripped) = rest.strip_prefix('{') {
        let (seg, tail) = parse_segscan(stripped)?;
        event.scan_type_index = seg;
        rest = tail;
    }

    // The mass-range list is a trailing bracketed phrase (matching where the
    // printer emits it), not a leading one: slice it off before tokenizing
    // whatever comes before it.
    let (token_span, mass_ranges, source_fragmentations_from_ranges) = split_trailing_mass_ranges(rest)?;

    let mut tok = Tokenizer::new(token_span);
    let mut seen_categories: HashSet<&'static str> = HashSet::new();
    let mut seen_letters: HashSet<char> = HashSet::new();
    let mut ms_order_set = false;

    while let Some(token) = tok.next() {
        if let Some(parsed) = parse_named_token(token, &mut event, &mut seen_categories) {
            parsed?;
            continue;
        }

        if let Some((name, result)) = parse_dissociation_token(token) {
            if !seen_categories.insert(name) {
                return Err(duplicate_token(format!("{} set twice: {}", name, token)));
            }
            let value = result?;
            match name {
                "mpd" => event.mpd = value,
                "ecd" => event.ecd = value,
                _ => unreachable!(),
            }
            continue;
        }

        if let Some(order) = parse_ms_order_token(token)? {
            if ms_order_set {
                return Err(duplicate_token(format!("ms-order set twice: {}", token)));
            }
            event.ms_order = order.0;
            event.dependent = if order.1 { TriState::On } else { event.dependent };
            ms_order_set = true;
            continue;
        }

        if token.contains('@') || looks_like_reaction_phrase(token) {
            let reactions = parse_reaction_phrase(token)?;
            event.reactions.extend(reactions);
            continue;
        }

        if let Some(phrase) = parse_voltage_phrase("sid", token) {
            if !seen_categories.insert("sid") {
                return Err(duplicate_token(format!("sid set twice: {}", token)));
            }
            apply_voltage_phrase(&mut event.source_fragmentation, &mut event.source_fragmentations, phrase?)?;
            continue;
        }
        if let Some(phrase) = parse_voltage_phrase("cv", token) {
            if !seen_categories.insert("cv") {
                return Err(duplicate_token(format!("cv set twice: {}", token)));
            }
            apply_voltage_phrase(&mut event.compensation_voltage, &mut event.source_fragmentations, phrase?)?;
            continue;
        }

        apply_letter_tokens(token, &mut event, &mut seen_letters)?;
    }

    if matches!(event.scan_mode, ScanMode::Sim | ScanMode::Q1Ms | ScanMode::Q3Ms) && !ms_order_set {
        event.ms_order = 1;
    }

    event.mass_ranges = mass_ranges;
    if event.scan_mode == ScanMode::Sim {
        event.source_fragmentations.extend(source_fragmentations_from_ranges);
    }
    validate(&event)?;
    Ok(event)
}

fn parse_segscan(rest: &str) -> Result<(i32, &str), RawError> {
    let close = rest.find('}').ok_or_else(|| bad_filter("unterminated {segment,scan}"))?;
    let inner = &rest[..close];
    let mut parts = inner.splitn(2, ',');
    let seg: i32 = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| bad_filter("malformed segment/scan prefix"))?;
    let _scan: i32 = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| bad_filter("malformed segment/scan prefix"))?;
    Ok((seg, rest[close + 1..].trim_start()))
}

/// Slices off the trailing `[range(,range)*]` phrase, returning what's left
/// to tokenize, the parsed mass ranges, and any per-range SIM energies in
/// range order. Returns an empty mass-range list when no trailing bracket is
/// present.
fn split_trailing_mass_ranges(rest: &str) -> Result<(&str, Vec<MassRange>, Vec<f64>), RawError> {
    let trimmed = rest.trim_end();
    if !trimmed.ends_with(']') {
        return Ok((rest, Vec::new(), Vec::new()));
    }
    let open = trimmed.rfind('[').ok_or_else(|| bad_filter("unterminated mass range list"))?;
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let (ranges, energies) = parse_mass_range_list(inner)?;
    Ok((&trimmed[..open], ranges, energies))
}

fn parse_mass_range_list(inner: &str) -> Result<(Vec<MassRange>, Vec<f64>), RawError> {
    let mut ranges = Vec::new();
    let mut energies = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (bounds, energy) = match part.split_once('@') {
            Some((b, e)) => {
                let e: f64 = e.trim().parse().map_err(|_| bad_filter(format!("bad range energy: {}", e)))?;
                (b, Some(e))
            }
            None => (part, None),
        };
        let range = match bounds.split_once('-') {
            Some((lo, hi)) => {
                let lo: f64 = lo.trim().parse().map_err(|_| bad_filter("bad mass range"))?;
                let hi: f64 = hi.trim().parse().map_err(|_| bad_filter("bad mass range"))?;
                MassRange::new(lo, hi)
            }
            None => {
                let v: f64 = bounds.trim().parse().map_err(|_| bad_filter("bad mass range"))?;
                MassRange::new(v, v)
            }
        };
        if ranges.iter().any(|r: &MassRange| *r == range) {
            return Err(bad_filter(format!("duplicate mass range {:?}", range)));
        }
        ranges.push(range);
        if let Some(e) = energy {
            energies.push(e);
        }
    }
    Ok((ranges, energies))
}

/// Canonical category key for a named token (leading `!` stripped), or
/// `None` if `canonical` isn't one of the named tokens at all.
fn named_token_category(canonical: &str) -> Option<&'static str> {
    Some(match canonical {
        "full" | "sim" | "srm" | "crm" | "q1ms" | "q3ms" => "scan_mode",
        "p" | "+" | "n" | "-" => "polarity",
        "c" | "prof" | "profile" => "scan_data_type",
        "itms" | "ftms" | "tqms" | "sqms" | "tofms" | "sector" => "analyser",
        "esi" | "nsi" | "apci" | "maldi" => "ionization_mode",
        "corona" => "corona",
        "pi" => "photo_ionization",
        "d" => "dependent",
        "lock" => "lock",
        "msx" => "multiplex",
        "t" => "turbo_scan",
        "e" => "enhanced",
        "u" => "ultra",
        "w" => "wideband",
        "sa" => "supplemental_activation",
        "msa" => "multi_state_activation",
        "z" => "accurate_mass",
        "k" => "detector",
        "ssrm" => "sector_scan",
        "parama" => "param_a",
        "paramb" => "param_b",
        "paramf" => "param_f",
        "paramr" => "param_r",
        "paramv" => "param_v",
        "sps" => "sps_multi_notch",
        "frg" => "free_region",
        _ => return None,
    })
}

fn tri(negated: bool) -> TriState {
    if negated {
        TriState::Off
    } else {
        TriState::On
    }
}

fn reject_negation(category: &str, token: &str, negated: bool) -> Result<(), RawError> {
    if negated {
        Err(bad_filter(format!("{} has no negated form: {}", category, token)))
    } else {
        Ok(())
    }
}

/// Returns `Some(Ok(()))`/`Some(Err(..))` if `token` matched a named keyword,
/// `None` if the caller should try other token kinds. Rejects a category
/// being set a second time anywhere in the filter string, and rejects `!`
/// on categories that have no negated form (scan mode, polarity, scan data
/// type, analyser, ionization mode, detector).
fn parse_named_token(
    token: &str,
    event: &mut ScanEvent,
    seen: &mut HashSet<&'static str>,
) -> Option<Result<(), RawError>> {
    let lower = token.to_ascii_lowercase();
    let negated = lower.starts_with('!');
    let canonical = lower.strip_prefix('!').unwrap_or(&lower);
    let category = named_token_category(canonical)?;
    if !seen.insert(category) {
        return Some(Err(duplicate_token(format!("{} set twice: {}", category, token))));
    }

    let result = (|| -> Result<(), RawError> {
        match category {
            "scan_mode" => {
                reject_negation(category, token, negated)?;
                event.scan_mode = match canonical {
                    "full" => ScanMode::Full,
                    "sim" => ScanMode::Sim,
                    "srm" => ScanMode::Srm,
                    "crm" => ScanMode::Crm,
                    "q1ms" => ScanMode::Q1Ms,
                    "q3ms" => ScanMode::Q3Ms,
                    _ => unreachable!(),
                };
            }
            "polarity" => {
                reject_negation(category, token, negated)?;
                event.polarity = match canonical {
                    "p" | "+" => Polarity::Positive,
                    "n" | "-" => Polarity::Negative,
                    _ => unreachable!(),
                };
            }
            "scan_data_type" => {
                reject_negation(category, token, negated)?;
                event.scan_data_type = match canonical {
                    "c" => ScanDataType::Centroid,
                    "prof" | "profile" => ScanDataType::Profile,
                    _ => unreachable!(),
                };
            }
            "analyser" => {
                reject_negation(category, token, negated)?;
                event.analyser = match canonical {
                    "itms" => Analyser::Itms,
                    "ftms" => Analyser::Ftms,
                    "tqms" => Analyser::Tqms,
                    "sqms" => Analyser::Sqms,
                    "tofms" => Analyser::Tofms,
                    "sector" => Analyser::Sector,
                    _ => unreachable!(),
                };
            }
            "ionization_mode" => {
                reject_negation(category, token, negated)?;
                event.ionization_mode = match canonical {
                    "esi" => IonizationMode::Esi,
                    "nsi" => IonizationMode::Nsi,
                    "apci" => IonizationMode::Apci,
                    "maldi" => IonizationMode::Maldi,
                    _ => unreachable!(),
                };
            }
            "detector" => {
                reject_negation(category, token, negated)?;
                event.detector = DetectorState::Valid;
            }
            "corona" => event.corona = tri(negated),
            "photo_ionization" => event.photo_ionization = tri(negated),
            "dependent" => event.dependent = tri(negated),
            "lock" => event.lock = tri(negated),
            "multiplex" => event.multiplex = tri(negated),
            "turbo_scan" => event.turbo_scan = tri(negated),
            "enhanced" => event.enhanced = tri(negated),
            "ultra" => event.ultra = tri(negated),
            "wideband" => event.wideband = tri(negated),
            "supplemental_activation" => event.supplemental_activation = tri(negated),
            "multi_state_activation" => event.multi_state_activation = tri(negated),
            "accurate_mass" => event.accurate_mass = tri(negated),
            "sector_scan" => event.sector_scan = tri(negated),
            "sps_multi_notch" => event.sps_multi_notch = tri(negated),
            "free_region" => event.free_region = tri(negated),
            "param_a" => event.param_a = tri(negated),
            "param_b" => event.param_b = tri(negated),
            "param_f" => event.param_f = tri(negated),
            "param_r" => event.param_r = tri(negated),
            "param_v" => event.param_v = tri(negated),
            _ => unreachable!("named_token_category and this match fell out of sync for {}", token),
        }
        Ok(())
    })();

    Some(result)
}

/// `mpd`/`ecd` standalone dissociation phrase: `mpd<energy>` sets it on with
/// a value, `!mpd` turns it off. Distinct from the `@mpd<energy>` chained
/// activation phrase inside a reaction.
fn parse_dissociation_token(
    token: &str,
) -> Option<(&'static str, Result<crate::scan_event::DissociationValue, RawError>)> {
    use crate::scan_event::DissociationValue;

    let (negated, body) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let lower = body.to_ascii_lowercase();
    let name = if lower.starts_with("mpd") {
        "mpd"
    } else if lower.starts_with("ecd") {
        "ecd"
    } else {
        return None;
    };

    if negated {
        if lower != name {
            return None;
        }
        return Some((name, Ok(DissociationValue { state: TriState::Off, value: 0.0 })));
    }

    let rest = &lower[name.len()..];
    if rest.is_empty() {
        return None;
    }
    let value = match rest.parse::<f64>() {
        Ok(v) => v,
        Err(_) => return Some((name, Err(bad_filter(format!("bad {} energy: {}", name, token))))),
    };
    Some((name, Ok(DissociationValue { state: TriState::On, value })))
}

/// `ms<n>` or `msN` (2-15, optional trailing `d` for dependent-only).
/// Returns `(ms_order, dependent_marker)`.
fn parse_ms_order_token(token: &str) -> Result<Option<(u8, bool)>, RawError> {
    let lower = token.to_ascii_lowercase();
    if !lower.starts_with("ms") {
        return Ok(None);
    }
    let rest = &lower[2..];
    if rest.is_empty() {
        return Ok(Some((1, false)));
    }
    let (digits, dependent) = if let Some(stripped) = rest.strip_suffix('d') {
        (stripped, true)
    } else {
        (rest, false)
    };
    if digits.is_empty() {
        return Ok(None);
    }
    match digits.parse::<u8>() {
        Ok(n) if (2..=15).contains(&n) => Ok(Some((n, dependent))),
        Ok(_) => Err(bad_filter(format!("ms-order out of range: {}", token))),
        Err(_) => Ok(None),
    }
}

fn looks_like_reaction_phrase(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// `mass@activation[energy][@activation[energy]...]`. Chained `@phrase`s past
/// the first mark every resulting `Reaction` with `is_multiple = true`.
fn parse_reaction_phrase(token: &str) -> Result<Vec<Reaction>, RawError> {
    let mut parts = token.split('@');
    let mass: f64 = parts
        .next()
        .ok_or_else(|| bad_filter("empty reaction phrase"))?
        .parse()
        .map_err(|_| bad_filter(format!("bad precursor mass in {}", token)))?;

    let mut reactions = Vec::new();
    let mut is_multiple = false;
    for part in parts {
        let (activation, energy) = parse_activation_energy(part)?;
        reactions.push(Reaction {
            precursor_mz: mass,
            isolation_width: 0.0,
            isolation_width_offset: 0.0,
            collision_energy: energy,
            energy_valid: true,
            activation,
            is_multiple,
            precursor_range_valid: false,
            first_mz: 0.0,
            last_mz: 0.0,
        });
        is_multiple = true;
    }
    if reactions.is_empty() {
        return Err(bad_filter(format!("reaction phrase missing activation: {}", token)));
    }
    Ok(reactions)
}

fn parse_activation_energy(part: &str) -> Result<(Activation, f64), RawError> {
    let split_at = part
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit() || *c == '.')
        .map(|(i, _)| i)
        .unwrap_or(part.len());
    let (code, energy_str) = part.split_at(split_at);

    let activation =
        Activation::from_token(code).ok_or_else(|| bad_filter(format!("unknown activation code: {}", code)))?;

    let energy = if energy_str.is_empty() {
        0.0
    } else {
        energy_str
            .parse()
            .map_err(|_| bad_filter(format!("bad collision energy: {}", energy_str)))?
    };
    Ok((activation, energy))
}

enum VoltagePhrase {
    Off,
    On(Vec<f64>),
}

/// `sid`/`sid=V`/`sid=V1-V2`/`!sid` (same grammar for `cv`). Returns `None`
/// when `token` doesn't start with `name`.
fn parse_voltage_phrase(name: &str, token: &str) -> Option<Result<VoltagePhrase, RawError>> {
    let (negated, body) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let lower = body.to_ascii_lowercase();
    if !lower.starts_with(name) {
        return None;
    }
    let tail = &body[name.len()..];
    if negated {
        return Some(Ok(VoltagePhrase::Off));
    }
    if tail.is_empty() {
        return Some(Ok(VoltagePhrase::On(vec![])));
    }
    let tail = match tail.strip_prefix('=') {
        Some(t) => t,
        None => return None,
    };
    let values: Result<Vec<f64>, RawError> = tail
        .split('-')
        .map(|s| s.parse().map_err(|_| bad_filter(format!("bad voltage value: {}", s))))
        .collect();
    Some(values.map(VoltagePhrase::On))
}

fn apply_voltage_phrase(
    feature: &mut crate::scan_event::VoltageFeature,
    flat: &mut Vec<f64>,
    phrase: VoltagePhrase,
) -> Result<(), RawError> {
    match phrase {
        VoltagePhrase::Off => {
            feature.enabled = TriState::Off;
            feature.kind = VoltageType::None;
        }
        VoltagePhrase::On(values) => {
            feature.enabled = TriState::On;
            feature.kind = match values.len() {
                0 | 1 => VoltageType::Single,
                2 => VoltageType::Ramp,
                _ => return Err(bad_filter("voltage phrase takes 0-2 values")),
            };
            flat.extend(values);
        }
    }
    Ok(())
}

/// A bare letter token (optionally `!`-prefixed) sets one bit in the
/// lower/upper-case flag tables, or the single-letter dissociation/scan
/// shorthand it aliases. Rejects the same letter being set twice.
fn apply_letter_tokens(token: &str, event: &mut ScanEvent, seen: &mut HashSet<char>) -> Result<(), RawError> {
    let (negated, body) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if body.len() != 1 {
        return Err(bad_filter(format!("unrecognized filter token: {}", token)));
    }
    let c = body.chars().next().unwrap();
    if !c.is_ascii_alphabetic() {
        return Err(bad_filter(format!("unrecognized filter token: {}", token)));
    }
    if !seen.insert(c) {
        return Err(duplicate_token(format!("letter set twice: {}", token)));
    }
    let state = if negated { TriState::Off } else { TriState::On };
    if c.is_ascii_lowercase() {
        event.lower_case_flags.set(c, state);
    } else {
        event.upper_case_flags.set(c, state);
    }
    Ok(())
}

/// Reject duplicate mass ranges (checked during parsing) and energy-count
/// mismatches between `msN` and the reactions actually parsed.
fn validate(event: &ScanEvent) -> Result<(), RawError> {
    if event.ms_order >= 2 && event.reactions.is_empty() {
        return Err(bad_filter("ms_order >= 2 requires at least one reaction"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_ms_positive() {
        let e = parse_filter("Full ms p").unwrap();
        assert_eq!(e.scan_mode, ScanMode::Full);
        assert_eq!(e.polarity, Polarity::Positive);
        assert_eq!(e.ms_order, 1);
    }

    #[test]
    fn parses_reaction_phrase_with_chained_activation() {
        let e = parse_filter("FTMS + p ms2 803.4611@hcd35.00@etd25.00").unwrap();
        assert_eq!(e.reactions.len(), 2);
        assert!(!e.reactions[0].is_multiple);
        assert!(e.reactions[1].is_multiple);
        assert_eq!(e.reactions[0].activation, Activation::Hcd);
        assert!((e.reactions[0].collision_energy - 35.0).abs() < 1e-6);
    }

    #[test]
    fn parses_sid_ramp() {
        let e = parse_filter("Full ms sid=10.00-20.00").unwrap();
        assert_eq!(e.source_fragmentation.kind, VoltageType::Ramp);
        assert_eq!(e.source_fragmentations, vec![10.0, 20.0]);
    }

    #[test]
    fn negated_letter_sets_off() {
        let e = parse_filter("Full ms !d").unwrap();
        assert_eq!(e.dependent, TriState::Off);
    }

    #[test]
    fn duplicate_mass_range_is_bad_filter() {
        let err = parse_filter("Full ms [100.0-200.0,100.0-200.0]").unwrap_err();
        assert!(matches!(err, RawError::BadFilter(_)));
    }

    #[test]
    fn ms_order_without_reaction_is_bad_filter() {
        let err = parse_filter("Full ms2").unwrap_err();
        assert!(matches!(err, RawError::BadFilter(_)));
    }

    #[test]
    fn duplicate_polarity_token_is_duplicate_token_error() {
        let err = parse_filter("Full ms p n").unwrap_err();
        assert!(matches!(err, RawError::DuplicateToken(_)));
    }

    #[test]
    fn duplicate_letter_flag_is_duplicate_token_error() {
        let err = parse_filter("Full ms a a").unwrap_err();
        assert!(matches!(err, RawError::DuplicateToken(_)));
    }

    #[test]
    fn duplicate_letter_flag_with_negation_is_still_duplicate() {
        let err = parse_filter("Full ms a !a").unwrap_err();
        assert!(matches!(err, RawError::DuplicateToken(_)));
    }

    #[test]
    fn duplicate_ms_order_is_duplicate_token_error() {
        let err = parse_filter("Full ms2 803.4611@hcd35.00 ms3 803.4611@hcd35.00").unwrap_err();
        assert!(matches!(err, RawError::DuplicateToken(_)));
    }

    /// S1 from the end-to-end scenario set: trailing mass-range list, reaction
    /// with a single activation, printed text equal modulo trailing space.
    #[test]
    fn scenario_s1_filter_parse_and_print() {
        let input = "FTMS + c NSI Full ms2 803.4611@hcd35.00 [100.0000-1500.0000]";
        let e = parse_filter(input).unwrap();
        assert_eq!(e.analyser, Analyser::Ftms);
        assert_eq!(e.polarity, Polarity::Positive);
        assert_eq!(e.scan_data_type, ScanDataType::Centroid);
        assert_eq!(e.ionization_mode, IonizationMode::Nsi);
        assert_eq!(e.ms_order, 2);
        assert_eq!(e.reactions.len(), 1);
        assert!((e.reactions[0].precursor_mz - 803.4611).abs() < 1e-6);
        assert_eq!(e.reactions[0].activation, Activation::Hcd);
        assert!((e.reactions[0].collision_energy - 35.0).abs() < 1e-6);
        assert_eq!(e.mass_ranges, vec![MassRange::new(100.0, 1500.0)]);
    }

    /// S2: SIM with per-range CID energies folded into `source_fragmentations`.
    #[test]
    fn scenario_s2_sim_with_per_range_energy() {
        let input = "+ c ESI SIM ms [100.00-200.00@30.00, 300.00-350.00@20.00]";
        let e = parse_filter(input).unwrap();
        assert_eq!(e.scan_mode, ScanMode::Sim);
        assert_eq!(e.source_fragmentations, vec![30.0, 20.0]);
        assert_eq!(e.mass_ranges.len(), 2);
        assert_eq!(e.ms_order, 1);
    }
}
