//! Scan filter string printing (C7): the inverse of `filter_parser::parse_filter`.
//!
//! Phrases are emitted in one fixed order regardless of which fields are set:
//! analyser, segscan, polarity, scan-data-type, ionization, corona,
//! photo-ionization, sid, cv, detector, turbo-scan, enhanced, paramA, paramB,
//! paramF, sps, paramR, paramV, dependent, wideband, lowercase a-y,
//! uppercase A-Y, sa, msa,
//! accurate-mass, ultra, scan-mode, sector-scan, lock, multiplex,
//! ms-order+reactions, mpd, ecd, free-region, mass-ranges. Each phrase is
//! followed by a single space; trailing whitespace is trimmed from the final
//! string. `parse(print(e)) == e` under the tolerance in
//! `scan_event::CompareOptions::exact` (see the round-trip test below).

use crate::scan_event::ScanEvent;
use crate::types::{Analyser, IonizationMode, Polarity, ScanDataType, ScanMode, TriState, VoltageType};

pub fn print_filter(event: &ScanEvent) -> String {
    let mut out = String::new();

    push_analyser(&mut out, event.analyser);
    push_segscan(&mut out, event.scan_type_index);
    push_polarity(&mut out, event.polarity);
    push_scan_data_type(&mut out, event.scan_data_type);
    push_ionization(&mut out, event.ionization_mode);
    push_tri(&mut out, "corona", event.corona);
    push_tri(&mut out, "pi", event.photo_ionization);
    push_voltage(&mut out, "sid", &event.source_fragmentation, &event.source_fragmentations, 0);
    push_voltage(&mut out, "cv", &event.compensation_voltage, &event.source_fragmentations, voltage_offset(event));
    push_detector(&mut out, event);
    push_tri(&mut out, "t", event.turbo_scan);
    push_tri(&mut out, "e", event.enhanced);
    push_tri(&mut out, "paramA", event.param_a);
    push_tri(&mut out, "paramB", event.param_b);
    push_tri(&mut out, "paramF", event.param_f);
    push_tri(&mut out, "sps", event.sps_multi_notch);
    push_tri(&mut out, "paramR", event.param_r);
    push_tri(&mut out, "paramV", event.param_v);
    push_tri(&mut out, "d", event.dependent);
    push_tri(&mut out, "w", event.wideband);

    for letter in 'a'..='y' {
        push_lower_flag(&mut out, letter, event.lower_case_flags.get(letter));
    }
    for letter in 'A'..='Y' {
        push_upper_flag(&mut out, letter, event.upper_case_flags.get(letter));
    }

    push_tri(&mut out, "sa", event.supplemental_activation);
    push_tri(&mut out, "msa", event.multi_state_activation);
    push_tri(&mut out, "z", event.accurate_mass);
    push_tri(&mut out, "u", event.ultra);
    push_scan_mode(&mut out, event.scan_mode);
    push_tri(&mut out, "ssrm", event.sector_scan);
    push_tri(&mut out, "lock", event.lock);
    push_tri(&mut out, "msx", event.multiplex);
    push_ms_order_and_reactions(&mut out, event);
    push_dissociation(&mut out, "mpd", event.mpd);
    push_dissociation(&mut out, "ecd", event.ecd);
    push_tri(&mut out, "frg", event.free_region);
    push_mass_ranges(&mut out, event);

    out.trim_end().to_string()
}

fn push_analyser(out: &mut String, analyser: Analyser) {
    let s = match analyser {
        Analyser::Any => return,
        Analyser::Itms => "ITMS",
        Analyser::Ftms => "FTMS",
        Analyser::Tqms => "TQMS",
        Analyser::Sqms => "SQMS",
        Analyser::Tofms => "TOFMS",
        Analyser::Sector => "Sector",
    };
    out.push_str(s);
    out.push(' ');
}

fn push_segscan(out: &mut String, scan_type_index: i32) {
    if scan_type_index < 0 {
        return;
    }
    out.push_str(&format!("{{{},0}} ", scan_type_index));
}

fn push_polarity(out: &mut String, polarity: Polarity) {
    match polarity {
        Polarity::Positive => out.push_str("+ "),
        Polarity::Negative => out.push_str("- "),
        Polarity::Unknown => {}
    }
}

fn push_scan_data_type(out: &mut String, kind: ScanDataType) {
    match kind {
        ScanDataType::Centroid => out.push_str("c "),
        ScanDataType::Profile => out.push_str("prof "),
        ScanDataType::Any => {}
    }
}

fn push_ionization(out: &mut String, mode: IonizationMode) {
    let s = match mode {
        IonizationMode::Any => return,
        IonizationMode::Esi => "esi",
        IonizationMode::Nsi => "nsi",
        IonizationMode::Apci => "apci",
        IonizationMode::Maldi => "maldi",
        _ => return,
    };
    out.push_str(s);
    out.push(' ');
}

fn push_tri(out: &mut String, name: &str, state: TriState) {
    match state {
        TriState::Any => {}
        TriState::On => {
            out.push_str(name);
            out.push(' ');
        }
        TriState::Off => {
            out.push('!');
            out.push_str(name);
            out.push(' ');
        }
    }
}

fn push_letter_flag(out: &mut String, letter: char, state: TriState) {
    match state {
        TriState::Any => {}
        TriState::On => {
            out.push(letter);
            out.push(' ');
        }
        TriState::Off => {
            out.push('!');
            out.push(letter);
            out.push(' ');
        }
    }
}

fn push_lower_flag(out: &mut String, letter: char, state: TriState) {
    push_letter_flag(out, letter, state);
}

fn push_upper_flag(out: &mut String, letter: char, state: TriState) {
    push_letter_flag(out, letter, state);
}

/// For SIM, `compensation_voltage`'s values live after `source_fragmentation`'s
/// in the flat buffer; for non-SIM acquisitions both features use a fixed
/// 0-2 value slot starting at 0.
fn voltage_offset(event: &ScanEvent) -> usize {
    match event.source_fragmentation.kind {
        VoltageType::Single => 1,
        VoltageType::Ramp => 2,
        _ => 0,
    }
}

fn push_voltage(
    out: &mut String,
    name: &str,
    feature: &crate::scan_event::VoltageFeature,
    flat: &[f64],
    offset: usize,
) {
    match feature.enabled {
        TriState::Any => {}
        TriState::Off => {
            out.push('!');
            out.push_str(name);
            out.push(' ');
        }
        TriState::On => {
            out.push_str(name);
            match feature.kind {
                VoltageType::Single if flat.len() > offset => {
                    out.push_str(&format!("={:.2} ", flat[offset]));
                }
                VoltageType::Ramp if flat.len() > offset + 1 => {
                    out.push_str(&format!("={:.2}-{:.2} ", flat[offset], flat[offset + 1]));
                }
                _ => out.push(' '),
            }
        }
    }
}

fn push_detector(out: &mut String, event: &ScanEvent) {
    use crate::types::DetectorState;
    if event.detector == DetectorState::Valid {
        out.push_str("k ");
    }
}

fn push_scan_mode(out: &mut String, mode: ScanMode) {
    let s = match mode {
        ScanMode::Full => return,
        ScanMode::Sim => "SIM",
        ScanMode::Srm => "SRM",
        ScanMode::Crm => "CRM",
        ScanMode::Q1Ms => "Q1MS",
        ScanMode::Q3Ms => "Q3MS",
    };
    out.push_str(s);
    out.push(' ');
}

fn push_ms_order_and_reactions(out: &mut String, event: &ScanEvent) {
    if event.ms_order >= 2 {
        out.push_str(&format!("ms{} ", event.ms_order));
    } else if event.ms_order == 1 && event.reactions.is_empty() {
        out.push_str("ms ");
    }

    let mut i = 0;
    while i < event.reactions.len() {
        let r = &event.reactions[i];
        let mut phrase = format!("{:.4}@{}{:.2}", r.precursor_mz, r.activation.token(), r.collision_energy);
        let mut j = i + 1;
        while j < event.reactions.len() && event.reactions[j].is_multiple {
            let chained = &event.reactions[j];
            phrase.push_str(&format!("@{}{:.2}", chained.activation.token(), chained.collision_energy));
            j += 1;
        }
        out.push_str(&phrase);
        out.push(' ');
        i = j;
    }
}

fn push_dissociation(out: &mut String, name: &str, value: crate::scan_event::DissociationValue) {
    match value.state {
        TriState::Any => {}
        TriState::Off => {
            out.push('!');
            out.push_str(name);
            out.push(' ');
        }
        TriState::On => {
            out.push_str(&format!("{}{:.2} ", name, value.value));
        }
    }
}

fn push_mass_ranges(out: &mut String, event: &ScanEvent) {
    if event.mass_ranges.is_empty() {
        return;
    }
    out.push('[');
    for (i, range) in event.mass_ranges.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if range.low == range.high {
            out.push_str(&format!("{:.4}", range.low));
        } else {
            out.push_str(&format!("{:.4}-{:.4}", range.low, range.high));
        }
    }
    out.push_str("] ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_parser::parse_filter;
    use crate::scan_event::CompareOptions;

    #[test]
    fn round_trips_simple_full_ms() {
        let event = parse_filter("FTMS + p ms").unwrap();
        let printed = print_filter(&event);
        let reparsed = parse_filter(&printed).unwrap();
        assert!(event.eq_under(&reparsed, CompareOptions::exact()));
    }

    #[test]
    fn round_trips_reaction_with_chained_activation() {
        let event = parse_filter("FTMS + p ms2 803.4611@hcd35.00@etd25.00").unwrap();
        let printed = print_filter(&event);
        let reparsed = parse_filter(&printed).unwrap();
        assert!(event.eq_under(&reparsed, CompareOptions::exact()));
    }

    #[test]
    fn round_trips_letter_flags() {
        let event = parse_filter("Full ms !d a !b").unwrap();
        let printed = print_filter(&event);
        let reparsed = parse_filter(&printed).unwrap();
        assert!(event.eq_under(&reparsed, CompareOptions::exact()));
    }

    #[test]
    fn round_trips_param_flags_distinct_from_letter_table() {
        let event = parse_filter("Full ms paramA !paramR a !b").unwrap();
        assert_eq!(event.param_a, TriState::On);
        assert_eq!(event.param_r, TriState::Off);
        assert_eq!(event.lower_case_flags.get('a'), TriState::On);
        assert_eq!(event.lower_case_flags.get('b'), TriState::Off);
        let printed = print_filter(&event);
        let reparsed = parse_filter(&printed).unwrap();
        assert!(event.eq_under(&reparsed, CompareOptions::exact()));
    }

    #[test]
    fn round_trips_mass_ranges() {
        let event = parse_filter("Full ms [100.0000-200.0000,300.0000-400.0000]").unwrap();
        let printed = print_filter(&event);
        let reparsed = parse_filter(&printed).unwrap();
        assert!(event.eq_under(&reparsed, CompareOptions::exact()));
    }
}
