//! Top-level entry point: open and read Thermo RAW files.

use crate::file_header::FileHeader;
use crate::filter_parser;
use crate::memory_reader::MemoryReader;
use crate::raw_file_info::RawFileInfo;
use crate::run_header::RunHeader;
use crate::scan::{self, DecodeOptions, Scan};
use crate::scan_event::ScanEvent;
use crate::scan_index::{self, ScanIndexEntry};
use crate::trailer::{self, TrailerLayout, TrailerScanEvents};
use crate::version;
use crate::RawError;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::OnceLock;

/// Diagnostic information for debugging address resolution.
pub struct DebugInfo {
    pub file_size: u64,
    pub version: u32,
    pub run_header_start: u64,
    pub scan_index_addr_32: u32,
    pub data_addr_32: u32,
    pub scan_trailer_addr_32: u32,
    pub scan_params_addr_32: u32,
    pub scan_index_addr_64: Option<u64>,
    pub data_addr_64: Option<u64>,
    pub scan_trailer_addr_64: Option<u64>,
    pub scan_params_addr_64: Option<u64>,
    pub effective_data_addr: u64,
    pub first_scan_entries: Vec<ScanIndexEntry>,
    pub n_scans: u32,
    pub n_scan_events: u32,
    pub instrument_type: i32,
}

/// File-level metadata assembled from the `FileHeader`, `RawFileInfo`, and
/// `RunHeader` collaborators.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub version: u32,
    pub acquisition_date: String,
    pub creation_user: String,
    pub device_name: String,
    pub model: String,
    pub serial_number: String,
    pub software_version: String,
    pub instrument_type: i32,
    pub sample_tags: [String; 3],
}

fn build_metadata(file_header: &FileHeader, raw_file_info: &RawFileInfo, run_header: &RunHeader) -> FileMetadata {
    FileMetadata {
        version: file_header.version,
        acquisition_date: format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            raw_file_info.year,
            raw_file_info.month,
            raw_file_info.day,
            raw_file_info.hour,
            raw_file_info.minute,
            raw_file_info.second
        ),
        creation_user: file_header.creation_user.clone(),
        device_name: run_header.device_name.clone(),
        model: run_header.model.clone(),
        serial_number: run_header.serial_number.clone(),
        software_version: run_header.software_version.clone(),
        instrument_type: run_header.instrument_type,
        sample_tags: [
            run_header.sample_tag1.clone(),
            run_header.sample_tag2.clone(),
            run_header.sample_tag3.clone(),
        ],
    }
}

/// Abstraction over file data sources (owned bytes or memory-mapped).
enum FileData {
    Owned(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl Deref for FileData {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            FileData::Owned(v) => v,
            FileData::Mapped(m) => m,
        }
    }
}

/// A Thermo RAW file opened for reading.
pub struct RawFile {
    /// Raw file bytes (owned or memory-mapped).
    data: FileData,
    /// RAW file format version.
    version: u32,
    /// File-level metadata.
    file_metadata: FileMetadata,
    /// Parsed run header.
    run_header: RunHeader,
    /// Scan index (one entry per scan).
    scan_index: Vec<ScanIndexEntry>,
    /// Base address of the data stream.
    data_addr: u64,
    /// Pre-computed trailer layout (eagerly parsed on open).
    trailer_layout: Option<TrailerLayout>,
    /// Address of the scan events stream (for lazy parsing).
    scan_events_addr: u64,
    /// Lazily parsed, deduplicated scan events (C5).
    trailer_scan_events: OnceLock<Option<TrailerScanEvents>>,
}

impl RawFile {
    /// Open a Thermo RAW file, reading it entirely into memory.
    ///
    /// Parses the Finnigan file header, RawFileInfo, RunHeader, ScanIndex,
    /// and trailer layout. Scan data and scan events are decoded lazily.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RawError> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_data(FileData::Owned(data))
    }

    /// Open a Thermo RAW file using memory-mapping.
    ///
    /// More memory-efficient for large files — the OS pages data on demand.
    ///
    /// # Safety
    /// The file must not be modified while the RawFile is open.
    pub fn open_mmap(path: impl AsRef<Path>) -> Result<Self, RawError> {
        let file = std::fs::File::open(path.as_ref())?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_data(FileData::Mapped(mmap))
    }

    /// Parse RAW file structures from raw data.
    fn from_data(data: FileData) -> Result<Self, RawError> {
        let finnigan_offset = find_finnigan_magic(&data).ok_or(RawError::NotRawFile)?;

        let file_header = FileHeader::parse(&data[finnigan_offset..])
            .map_err(|e| parse_error("FileHeader", finnigan_offset as u64, None, e))?;
        let ver = file_header.version;

        if !version::is_supported(ver) {
            return Err(RawError::UnsupportedVersion(ver));
        }

        let info_base = finnigan_offset as u64 + FileHeader::size() as u64;
        let raw_file_info = find_raw_file_info_sequential(&data, info_base, ver)
            .or_else(|_| find_raw_file_info(&data, info_base, ver))
            .map_err(|e| parse_error("RawFileInfo", info_base, Some(ver), e))?;

        let rh_addr = raw_file_info.run_header_addr();
        if rh_addr == 0 {
            return Err(RawError::StreamNotFound(
                "File has no data controllers (empty/blank acquisition)".to_string(),
            ));
        }
        let run_header = RunHeader::parse(&data, rh_addr, ver)
            .map_err(|e| parse_error("RunHeader", rh_addr, Some(ver), e))?;

        let n_scans = run_header.n_scans();
        let si_addr = run_header.scan_index_addr();
        let scan_index_entries = scan_index::parse_scan_index(&data, si_addr, ver, n_scans)
            .map_err(|e| parse_error("ScanIndex", si_addr, Some(ver), e))?;

        // DataOffset (both 32-bit and 64-bit) is relative to PacketPos (the data stream base).
        // Absolute scan data offset = PacketPos + DataOffset.
        let data_addr = run_header.data_addr();
        let spect_pos = run_header.scan_index_addr();
        let trailer_extra_pos = run_header.scan_params_addr();

        let file_metadata = build_metadata(&file_header, &raw_file_info, &run_header);

        // Eagerly parse trailer layout (header only, not all records).
        // In v66, the GenericDataHeader (field descriptors) is stored before SpectPos,
        // NOT at TrailerScanEventsPos or TrailerExtraPos (which are flat record arrays).
        // We search backward from SpectPos to find the GDH, then point its records_offset
        // at TrailerExtraPos where the actual per-scan records live.
        let trailer_layout = if trailer_extra_pos > 0 && spect_pos > 0 {
            trailer::find_generic_data_header(&data, spect_pos)
                .map(|header| header.with_records_offset(trailer_extra_pos))
                .map(TrailerLayout::from_header)
                .ok()
                .or_else(|| {
                    // Fallback: try legacy approach (GDH at scan_trailer_addr)
                    let trailer_addr = run_header.scan_trailer_addr();
                    if trailer_addr > 0 {
                        trailer::parse_generic_data_header(&data, trailer_addr)
                            .map(TrailerLayout::from_header)
                            .ok()
                    } else {
                        None
                    }
                })
        } else {
            None
        };

        // Store scan events address for lazy parsing (deferred until first access).
        let scan_events_addr = run_header.scan_params_addr();

        Ok(Self {
            data,
            version: ver,
            file_metadata,
            run_header,
            scan_index: scan_index_entries,
            data_addr,
            trailer_layout,
            scan_events_addr,
            trailer_scan_events: OnceLock::new(),
        })
    }

    /// RAW file format version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// File-level metadata.
    pub fn metadata(&self) -> &FileMetadata {
        &self.file_metadata
    }

    /// Total number of scans.
    pub fn n_scans(&self) -> u32 {
        self.scan_index.len() as u32
    }

    /// First scan number.
    pub fn first_scan(&self) -> u32 {
        self.run_header.first_scan
    }

    /// Last scan number.
    pub fn last_scan(&self) -> u32 {
        self.run_header.last_scan
    }

    /// Acquisition start time in minutes.
    pub fn start_time(&self) -> f64 {
        self.run_header.start_time
    }

    /// Acquisition end time in minutes.
    pub fn end_time(&self) -> f64 {
        self.run_header.end_time
    }

    /// Low mass range.
    pub fn low_mass(&self) -> f64 {
        self.run_header.low_mass
    }

    /// High mass range.
    pub fn high_mass(&self) -> f64 {
        self.run_header.high_mass
    }

    /// Read a single scan by scan number, using default decode options.
    ///
    /// Decodes the scan data packet and enriches with trailer-derived
    /// metadata (filter string, MS level, polarity, precursor info).
    pub fn scan(&self, scan_number: u32) -> Result<Scan, RawError> {
        self.scan_with_options(scan_number, DecodeOptions::default())
    }

    /// Like [`scan`](Self::scan), with caller-supplied decode options.
    pub fn scan_with_options(&self, scan_number: u32, options: DecodeOptions) -> Result<Scan, RawError> {
        let idx = scan_number
            .checked_sub(self.run_header.first_scan)
            .ok_or(RawError::ScanOutOfRange(scan_number))? as usize;
        let entry = self
            .scan_index
            .get(idx)
            .ok_or(RawError::ScanOutOfRange(scan_number))?;

        let event = self.event_for_scan(idx);
        let mut scan = scan::decode_scan(&self.data, self.data_addr, entry, scan_number, event, options)?;
        self.enrich_from_trailer(&mut scan, idx as u32);
        Ok(scan)
    }

    /// Read multiple scans in parallel using rayon, with default decode options.
    pub fn scans_parallel(&self, range: std::ops::Range<u32>) -> Result<Vec<Scan>, RawError> {
        self.scans_parallel_with_options(range, DecodeOptions::default())
    }

    /// Like [`scans_parallel`](Self::scans_parallel), with caller-supplied decode options.
    pub fn scans_parallel_with_options(
        &self,
        range: std::ops::Range<u32>,
        options: DecodeOptions,
    ) -> Result<Vec<Scan>, RawError> {
        use rayon::prelude::*;
        let first = self.run_header.first_scan;
        let entries: Vec<_> = range
            .map(|n| ((n - first) as usize, n))
            .filter_map(|(idx, n)| self.scan_index.get(idx).map(|e| (e, n, idx as u32)))
            .collect();

        entries
            .par_iter()
            .map(|(entry, scan_num, scan_idx)| {
                let event = self.event_for_scan(*scan_idx as usize);
                let mut scan = scan::decode_scan(&self.data, self.data_addr, entry, *scan_num, event, options)?;
                self.enrich_from_trailer(&mut scan, *scan_idx);
                Ok(scan)
            })
            .collect()
    }

    /// Fast MS1 check using trailer metadata (no scan data decoding).
    ///
    /// Reads only the "Master Scan Number" i32 field from the trailer record.
    /// Returns `true` if the scan is MS1 (master == 0) or if MS level cannot
    /// be determined (no trailer data).
    pub fn is_ms1_scan(&self, scan_idx: u32) -> bool {
        if let Some(layout) = &self.trailer_layout {
            if let Some(master_idx) = layout.master_scan_idx {
                if let Ok(master) = layout.read_i32(&self.data, scan_idx, master_idx) {
                    return master == 0;
                }
            }
            // Fallback: check filter text if available
            if let Some(fi) = layout.filter_text_idx {
                if let Ok(filter_str) = layout.read_string(&self.data, scan_idx, fi) {
                    return filter_str.contains(" ms ")
                        || filter_str.starts_with("ms ")
                        || filter_str.contains(" Full ms ");
                }
            }
        }
        // No trailer: can't determine MS level, assume MS1
        true
    }

    /// Get trailer extra data for a specific scan as a HashMap.
    pub fn trailer_extra(&self, scan_number: u32) -> Result<HashMap<String, String>, RawError> {
        let layout = self
            .trailer_layout
            .as_ref()
            .ok_or_else(|| RawError::StreamNotFound("trailer extra".to_string()))?;

        let scan_idx = scan_number
            .checked_sub(self.run_header.first_scan)
            .ok_or(RawError::ScanOutOfRange(scan_number))?;

        trailer::parse_trailer_extra(&self.data, &layout.header, scan_idx)
    }

    /// Get the list of trailer extra field labels.
    pub fn trailer_fields(&self) -> Vec<String> {
        match &self.trailer_layout {
            Some(layout) => layout.field_labels(),
            None => vec![],
        }
    }

    /// Get the raw scan index entries.
    pub fn scan_index(&self) -> &[ScanIndexEntry] {
        &self.scan_index
    }

    /// Get the deduplicated scan event templates (lazily parsed on first access).
    pub fn scan_events(&self) -> &[ScanEvent] {
        self.trailer_scan_events()
            .map(|t| t.unique.as_slice())
            .unwrap_or(&[])
    }

    /// Lazily parse and deduplicate the scan events stream on first access.
    fn trailer_scan_events(&self) -> Option<&TrailerScanEvents> {
        self.trailer_scan_events
            .get_or_init(|| {
                if self.scan_events_addr == 0 {
                    return None;
                }
                match TrailerScanEvents::load(&self.data, self.scan_events_addr, self.version) {
                    Ok(events) => Some(events),
                    Err(e) => {
                        log::warn!("failed to load scan events at offset {}: {}", self.scan_events_addr, e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Resolve the deduplicated `ScanEvent` template owning the scan at
    /// `scan_idx` (0-based, matching scan-index order).
    fn event_for_scan(&self, scan_idx: usize) -> Option<&ScanEvent> {
        let events = self.trailer_scan_events()?;
        let unique_idx = *events.index_to_unique.get(scan_idx)? as usize;
        events.unique.get(unique_idx)
    }

    /// Get the parsed RunHeader (for diagnostics).
    pub fn run_header(&self) -> &RunHeader {
        &self.run_header
    }

    /// File size in bytes.
    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    /// Diagnostic info for debugging address resolution.
    pub fn debug_info(&self) -> DebugInfo {
        let rh = &self.run_header;
        let first_entries: Vec<_> = self.scan_index.iter().take(3).cloned().collect();

        DebugInfo {
            file_size: self.data.len() as u64,
            version: self.version,
            run_header_start: rh.start_offset,
            scan_index_addr_32: rh.scan_index_addr_32,
            data_addr_32: rh.data_addr_32,
            scan_trailer_addr_32: rh.scan_trailer_addr_32,
            scan_params_addr_32: rh.scan_params_addr_32,
            scan_index_addr_64: rh.scan_index_addr_64,
            data_addr_64: rh.data_addr_64,
            scan_trailer_addr_64: rh.scan_trailer_addr_64,
            scan_params_addr_64: rh.scan_params_addr_64,
            effective_data_addr: self.data_addr,
            first_scan_entries: first_entries,
            n_scans: self.scan_index.len() as u32,
            n_scan_events: self.scan_events().len() as u32,
            instrument_type: rh.instrument_type,
        }
    }

    /// List OLE2 streams in the file (uses cfb-reader).
    pub fn list_streams(path: impl AsRef<Path>) -> Result<Vec<String>, RawError> {
        let container =
            cfb_reader::Ole2Container::open(path).map_err(|e| RawError::CfbError(e.to_string()))?;
        Ok(container.list_streams())
    }

    /// Fold trailer-derived metadata into an already-decoded scan.
    ///
    /// The trailer's filter text, when present, is re-parsed (C6) and takes
    /// precedence over the owning `ScanEvent`'s own fields: it reflects
    /// exactly what the instrument recorded for this scan, whereas the
    /// `ScanEvent` is a deduplicated template shared by every scan using the
    /// same method.
    fn enrich_from_trailer(&self, scan: &mut Scan, scan_idx: u32) {
        let Some(layout) = &self.trailer_layout else {
            return;
        };
        let Some(fi) = layout.filter_text_idx else {
            return;
        };
        let Ok(filter_str) = layout.read_string(&self.data, scan_idx, fi) else {
            return;
        };
        if filter_str.is_empty() {
            return;
        }

        match filter_parser::parse_filter(&filter_str) {
            Ok(event) => {
                scan.ms_level = event.ms_order;
                scan.polarity = event.polarity;
                if scan.ms_level > 1 {
                    scan.precursor = scan::precursor_from_event(&event);
                }
            }
            Err(e) => log::debug!("scan {}: filter text {:?} failed to parse: {}", scan_idx, filter_str, e),
        }
        scan.filter_string = Some(filter_str);
    }
}

/// Stage-by-stage diagnostic result for a RAW file.
pub struct DiagnosticReport {
    pub file_size: u64,
    pub stages: Vec<DiagnosticStage>,
}

pub struct DiagnosticStage {
    pub name: String,
    pub success: bool,
    pub detail: String,
}

impl DiagnosticReport {
    pub fn print(&self) {
        println!("=== RAW File Diagnostic Report ===");
        println!(
            "File size: {} bytes ({:.1} MB)\n",
            self.file_size,
            self.file_size as f64 / 1e6
        );
        for stage in &self.stages {
            let status = if stage.success { "OK" } else { "FAIL" };
            println!("[{:>4}] {}", status, stage.name);
            for line in stage.detail.lines() {
                println!("       {}", line);
            }
        }
    }
}

/// Run stage-by-stage diagnostics on raw file data without cascading failures.
pub fn diagnose(data: &[u8]) -> DiagnosticReport {
    let file_size = data.len() as u64;
    let mut stages = Vec::new();

    // Stage 1: Find Finnigan magic
    let finnigan_offset = match find_finnigan_magic(data) {
        Some(off) => {
            stages.push(DiagnosticStage {
                name: "Finnigan magic".to_string(),
                success: true,
                detail: format!("Found at offset {}", off),
            });
            off
        }
        None => {
            stages.push(DiagnosticStage {
                name: "Finnigan magic".to_string(),
                success: false,
                detail: "Not found in first 64KB".to_string(),
            });
            return DiagnosticReport { file_size, stages };
        }
    };

    // Stage 2: Parse FileHeader
    let file_header = match FileHeader::parse(&data[finnigan_offset..]) {
        Ok(h) => {
            stages.push(DiagnosticStage {
                name: "FileHeader".to_string(),
                success: true,
                detail: format!("Version: {}, signature: {:?}", h.version, h.tag),
            });
            h
        }
        Err(e) => {
            stages.push(DiagnosticStage {
                name: "FileHeader".to_string(),
                success: false,
                detail: format!("Parse error: {}", e),
            });
            return DiagnosticReport { file_size, stages };
        }
    };
    let ver = file_header.version;

    if !version::is_supported(ver) {
        stages.push(DiagnosticStage {
            name: "Version check".to_string(),
            success: false,
            detail: format!("Version {} not supported (need 57-66)", ver),
        });
        return DiagnosticReport { file_size, stages };
    }

    // Stage 3: Find RawFileInfo (sequential then fallback to search)
    let info_base = finnigan_offset as u64 + FileHeader::size() as u64;
    let (raw_file_info, rfi_method) = match find_raw_file_info_sequential(data, info_base, ver) {
        Ok(info) => (info, "sequential"),
        Err(seq_err) => match find_raw_file_info(data, info_base, ver) {
            Ok(info) => (info, "search"),
            Err(e) => {
                stages.push(DiagnosticStage {
                    name: "RawFileInfo".to_string(),
                    success: false,
                    detail: format!(
                        "Sequential failed: {}\nSearch failed from offset {}: {}",
                        seq_err, info_base, e
                    ),
                });
                return DiagnosticReport { file_size, stages };
            }
        },
    };
    {
        let n_active = raw_file_info
            .controllers
            .iter()
            .filter(|c| c.offset > 0)
            .count();
        stages.push(DiagnosticStage {
            name: "RawFileInfo".to_string(),
            success: true,
            detail: format!(
                "Found via {} reading\nDate: {:04}-{:02}-{:02}, n_controllers: {} ({} active), end_offset: {}",
                rfi_method,
                raw_file_info.year,
                raw_file_info.month,
                raw_file_info.day,
                raw_file_info.n_controllers,
                n_active,
                raw_file_info.end_offset
            ),
        });
    }

    // Stage 4: Parse RunHeader
    let rh_addr = raw_file_info.run_header_addr();
    if rh_addr == 0 {
        stages.push(DiagnosticStage {
            name: "RunHeader".to_string(),
            success: false,
            detail: "No data controllers (run_header_addr = 0)".to_string(),
        });
        return DiagnosticReport { file_size, stages };
    }

    let run_header = match RunHeader::parse(data, rh_addr, ver) {
        Ok(rh) => {
            stages.push(DiagnosticStage {
                name: "RunHeader".to_string(),
                success: true,
                detail: format!(
                    "Scans: {}-{}, RT: {:.2}-{:.2} min, mass: {:.1}-{:.1}\n\
                     ScanIndex64: {:?}, DataAddr64: {:?}\n\
                     TrailerAddr64: {:?}, ParamsAddr64: {:?}\n\
                     Device: {}, Model: {}",
                    rh.first_scan,
                    rh.last_scan,
                    rh.start_time,
                    rh.end_time,
                    rh.low_mass,
                    rh.high_mass,
                    rh.scan_index_addr_64,
                    rh.data_addr_64,
                    rh.scan_trailer_addr_64,
                    rh.scan_params_addr_64,
                    rh.device_name,
                    rh.model,
                ),
            });
            rh
        }
        Err(e) => {
            stages.push(DiagnosticStage {
                name: "RunHeader".to_string(),
                success: false,
                detail: format!("Parse error at offset {}: {}", rh_addr, e),
            });
            return DiagnosticReport { file_size, stages };
        }
    };

    // Stage 5: Parse ScanIndex
    let n_scans = run_header.n_scans();
    let si_addr = run_header.scan_index_addr();
    let scan_index_entries = match scan_index::parse_scan_index(data, si_addr, ver, n_scans) {
        Ok(entries) => {
            let sample = entries
                .iter()
                .take(3)
                .map(|e| format!("offset={}, size={}, rt={:.4}", e.offset, e.data_size, e.rt))
                .collect::<Vec<_>>()
                .join(", ");
            stages.push(DiagnosticStage {
                name: "ScanIndex".to_string(),
                success: true,
                detail: format!(
                    "{} entries parsed at offset {}\nFirst entries: [{}]",
                    entries.len(),
                    si_addr,
                    sample
                ),
            });
            entries
        }
        Err(e) => {
            stages.push(DiagnosticStage {
                name: "ScanIndex".to_string(),
                success: false,
                detail: format!(
                    "Parse error at offset {} ({} scans): {}",
                    si_addr, n_scans, e
                ),
            });
            return DiagnosticReport { file_size, stages };
        }
    };

    // Stage 6: TrailerLayout
    let spect_pos = run_header.scan_index_addr();
    let trailer_extra_pos = run_header.scan_params_addr();
    if trailer_extra_pos > 0 && spect_pos > 0 {
        let layout = trailer::find_generic_data_header(data, spect_pos)
            .map(|h| h.with_records_offset(trailer_extra_pos))
            .and_then(|h| Ok(TrailerLayout::from_header(h)))
            .or_else(|_| {
                let addr = run_header.scan_trailer_addr();
                if addr > 0 {
                    trailer::parse_generic_data_header(data, addr).map(TrailerLayout::from_header)
                } else {
                    Err(RawError::StreamNotFound("No trailer address".to_string()))
                }
            });

        match layout {
            Ok(layout) => stages.push(DiagnosticStage {
                name: "TrailerLayout".to_string(),
                success: true,
                detail: format!(
                    "{} fields, record_size={}, filter_idx={:?}, master_scan_idx={:?}",
                    layout.header.descriptors.len(),
                    layout.record_size,
                    layout.filter_text_idx,
                    layout.master_scan_idx
                ),
            }),
            Err(e) => stages.push(DiagnosticStage {
                name: "TrailerLayout".to_string(),
                success: false,
                detail: format!("GDH search failed: {}", e),
            }),
        }
    } else {
        stages.push(DiagnosticStage {
            name: "TrailerLayout".to_string(),
            success: false,
            detail: format!(
                "Skipped (trailer_extra_pos={}, spect_pos={})",
                trailer_extra_pos, spect_pos
            ),
        });
    }

    // Stage 7: Try decoding scan 1
    if let Some(first_entry) = scan_index_entries.first() {
        let data_addr = run_header.data_addr();
        let scan_num = run_header.first_scan;
        let result = scan::decode_scan(data, data_addr, first_entry, scan_num, None, DecodeOptions::default());

        let (success, detail) = match result {
            Ok(scan) => (
                true,
                format!(
                    "{} centroids, tic={:.2e}, base_peak_mz={:.4}",
                    scan.label_peaks.len(),
                    scan.tic,
                    scan.base_peak_mz
                ),
            ),
            Err(e) => (
                false,
                format!(
                    "Abs offset={}, data_size={}: {}",
                    data_addr + first_entry.offset,
                    first_entry.data_size,
                    e
                ),
            ),
        };

        stages.push(DiagnosticStage {
            name: "Scan decode (first)".to_string(),
            success,
            detail,
        });
    }

    DiagnosticReport { file_size, stages }
}

/// Search for a valid RawFileInfo by scanning forward from the given offset.
///
/// In v66+ files, .NET serialized metadata blobs (SequencerRow, AutoSamplerInfo)
/// sit between the FileHeader and RawFileInfo. This function scans forward in
/// 2-byte steps, attempting to parse RawFileInfo at each candidate offset and
/// validating the result by checking both VCI entries and RunHeader reachability.
fn find_raw_file_info(data: &[u8], start: u64, version: u32) -> Result<RawFileInfo, RawError> {
    let file_size = data.len() as u64;
    // Search up to 16KB past the FileHeader (more than enough for any blob)
    let search_limit = (start + 16384).min(file_size);

    let mut offset = start;
    while offset < search_limit {
        if let Ok(info) = RawFileInfo::parse(data, offset, version) {
            if info.has_valid_controllers(file_size) {
                // Additional validation: verify the RunHeader at the MS address
                // is actually parseable. This eliminates false positives where
                // random data in SequenceRow/ASC looks like valid VCI entries.
                let rh_addr = info.run_header_addr();
                if rh_addr > 0 && RunHeader::parse(data, rh_addr, version).is_ok() {
                    return Ok(info);
                }
            }
        }
        offset += 2;
    }

    Err(RawError::StreamNotFound(
        "RawFileInfo: no valid VCI controllers found within search range".to_string(),
    ))
}

/// Search for the Finnigan magic (0xA101) in the file data.
/// Returns the byte offset of the magic, or None if not found.
fn find_finnigan_magic(data: &[u8]) -> Option<usize> {
    let magic_le = 0xA101u16.to_le_bytes();
    let search_limit = data.len().min(65536);

    for i in 0..search_limit.saturating_sub(1) {
        if data[i] == magic_le[0] && data[i + 1] == magic_le[1] {
            // Verify: version u32 lives at offset +36 from magic
            // (2 magic + 18 signature + 16 unknowns = 36).
            if i + 40 <= data.len() {
                let ver = u32::from_le_bytes(data[i + 36..i + 40].try_into().ok()?);
                if ver > 0 && ver <= 200 {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// Helper to format parse errors with consistent context.
fn parse_error(
    component: &str,
    offset: u64,
    version: Option<u32>,
    error: impl std::fmt::Display,
) -> RawError {
    let version_str = version.map_or(String::new(), |v| format!(" (v{})", v));
    RawError::CorruptedData(format!(
        "{} parsing failed at offset {}{}: {}",
        component, offset, version_str, error
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a PascalStringWin32 in bytes (i32 length + UTF-16LE chars).
    fn make_pascal_string(s: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        let len = s.len() as i32;
        bytes.extend(&len.to_le_bytes());
        for c in s.encode_utf16() {
            bytes.extend(&c.to_le_bytes());
        }
        bytes
    }

    // Tests for skip_sequence_row()

    #[test]
    fn test_skip_sequence_row_version_57() {
        // Version 57: 60 bytes + 13 base strings + 2 extra strings (version >= 25) + 2 extra (version >= 41)
        let mut data = Vec::new();

        // 60-byte fixed struct
        data.extend(vec![0u8; 60]);

        // 13 base PascalStrings (empty strings for simplicity)
        for _ in 0..13 {
            data.extend(&make_pascal_string(""));
        }

        // Version >= 25: Vial, CalibFile
        data.extend(&make_pascal_string("Vial1"));
        data.extend(&make_pascal_string("calib.cal"));

        // Version >= 41: Barcode (string) + BarcodeStatus (i32)
        data.extend(&make_pascal_string("BC12345"));
        data.extend(&[0x01, 0x00, 0x00, 0x00]); // BarcodeStatus: 1

        // Trailing marker
        data.extend(&[0xFF, 0x00, 0x00, 0x00]); // u32: 255

        let mut reader = MemoryReader::new(&data);

        skip_sequence_row(&mut reader, 57).unwrap();

        // Verify cursor advanced correctly (60 + 13*4 + Vial + CalibFile + Barcode + 4)
        let expected_pos = 60 + 13 * 4 + (4 + 10) + (4 + 18) + (4 + 14) + 4;
        assert_eq!(reader.position(), expected_pos as u64);

        // Verify we can read trailing marker
        assert_eq!(reader.read_u32().unwrap(), 255);
    }

    #[test]
    fn test_skip_sequence_row_version_58_with_extra_columns() {
        // Version 58: includes ExtraUserColumns[15]
        let mut data = Vec::new();

        // 60-byte fixed struct
        data.extend(vec![0u8; 60]);

        // 13 base PascalStrings
        for i in 0..13 {
            data.extend(&make_pascal_string(&format!("str{}", i)));
        }

        // Version >= 25: Vial, CalibFile
        data.extend(&make_pascal_string("VialA"));
        data.extend(&make_pascal_string("cal.dat"));

        // Version >= 41: Barcode + BarcodeStatus
        data.extend(&make_pascal_string("XYZ789"));
        data.extend(&[0x02, 0x00, 0x00, 0x00]); // BarcodeStatus: 2

        // Version >= 58: ExtraUserColumns[15]
        for i in 0..15 {
            data.extend(&make_pascal_string(&format!("col{}", i)));
        }

        // Trailing marker
        data.extend(&[0xAA, 0x00, 0x00, 0x00]); // u32: 170

        let mut reader = MemoryReader::new(&data);
        skip_sequence_row(&mut reader, 58).unwrap();

        // Verify we can read trailing marker
        assert_eq!(reader.read_u32().unwrap(), 170);
    }

    #[test]
    fn test_skip_sequence_row_version_24_minimal() {
        // Version 24: only 60 bytes + 13 base strings (no version-dependent strings)
        let mut data = Vec::new();

        // 60-byte fixed struct
        data.extend(vec![0u8; 60]);

        // 13 base PascalStrings (empty)
        for _ in 0..13 {
            data.extend(&make_pascal_string(""));
        }

        // Trailing marker
        data.extend(&[0x42, 0x00, 0x00, 0x00]); // u32: 66

        let mut reader = MemoryReader::new(&data);
        skip_sequence_row(&mut reader, 24).unwrap();

        // Should have skipped exactly 60 + 13*4 = 112 bytes
        assert_eq!(reader.position(), 112);
        assert_eq!(reader.read_u32().unwrap(), 66);
    }

    #[test]
    fn test_skip_sequence_row_version_25_with_vial() {
        // Version 25: 60 bytes + 13 base + 2 extra (Vial, CalibFile), but not Barcode
        let mut data = Vec::new();

        data.extend(vec![0u8; 60]);
        for _ in 0..13 {
            data.extend(&make_pascal_string(""));
        }

        // Version >= 25
        data.extend(&make_pascal_string("V1"));
        data.extend(&make_pascal_string("C1"));

        // Trailing
        data.extend(&[0x99, 0x00, 0x00, 0x00]);

        let mut reader = MemoryReader::new(&data);
        skip_sequence_row(&mut reader, 25).unwrap();

        assert_eq!(reader.read_u32().unwrap(), 153);
    }

    #[test]
    fn test_skip_sequence_row_version_41_with_barcode() {
        // Version 41: includes Barcode but not ExtraUserColumns
        let mut data = Vec::new();

        data.extend(vec![0u8; 60]);
        for _ in 0..13 {
            data.extend(&make_pascal_string(""));
        }

        // Version >= 25
        data.extend(&make_pascal_string(""));
        data.extend(&make_pascal_string(""));

        // Version >= 41: Barcode + BarcodeStatus
        data.extend(&make_pascal_string("ABC"));
        data.extend(&[0x05, 0x00, 0x00, 0x00]); // BarcodeStatus: 5

        // Trailing
        data.extend(&[0x77, 0x00, 0x00, 0x00]);

        let mut reader = MemoryReader::new(&data);
        skip_sequence_row(&mut reader, 41).unwrap();

        assert_eq!(reader.read_u32().unwrap(), 119);
    }

    #[test]
    fn test_skip_sequence_row_insufficient_data_for_fixed_struct() {
        let data = vec![0u8; 30]; // Only 30 bytes, need 60
        let mut reader = MemoryReader::new(&data);
        let err = skip_sequence_row(&mut reader, 57).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("skip"));
        assert!(msg.contains("need 60 bytes"));
    }

    #[test]
    fn test_skip_auto_sampler_config_insufficient_data_for_fixed_struct() {
        let data = vec![0u8; 10]; // Only 10 bytes, need 24
        let mut reader = MemoryReader::new(&data);
        let err = skip_auto_sampler_config(&mut reader, 36).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("need 24 bytes"));
    }

    #[test]
    fn test_skip_auto_sampler_config_insufficient_data_for_tray_name() {
        // 24 bytes fixed struct, then a PascalString claiming len=10 chars (20 bytes) but only 5 available
        let mut data = vec![0u8; 24];
        data.extend(&10i32.to_le_bytes());
        data.extend(vec![0u8; 5]);
        let mut reader = MemoryReader::new(&data);
        let err = skip_auto_sampler_config(&mut reader, 36).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("need 20 bytes"));
    }

    #[test]
    fn test_skip_auto_sampler_config_skipped_for_old_version() {
        let data: Vec<u8> = vec![0xAA, 0x00, 0x00, 0x00]; // just a trailing marker
        let mut reader = MemoryReader::new(&data);
        skip_auto_sampler_config(&mut reader, 24).unwrap(); // version < 36, should no-op
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u32().unwrap(), 170);
    }
}

/// Find RawFileInfo by sequentially reading SequenceRow + AutoSamplerConfig first.
///
/// The .NET DLL reads these structures in order: FileHeader -> SequenceRow ->
/// AutoSamplerConfig -> RawFileInfo. Each consumes a known number of bytes,
/// so the cursor always lands at the correct offset. This avoids the fragile
/// search approach needed when intermediate structures have unknown sizes.
fn find_raw_file_info_sequential(
    data: &[u8],
    info_base: u64,
    version: u32,
) -> Result<RawFileInfo, RawError> {
    let mut reader = MemoryReader::at_offset(data, info_base);

    skip_sequence_row(&mut reader, version)?;
    skip_auto_sampler_config(&mut reader, version)?;

    let rfi_offset = reader.position();
    let info = RawFileInfo::parse(data, rfi_offset, version)?;
    let file_size = data.len() as u64;
    if info.has_valid_controllers(file_size) {
        Ok(info)
    } else {
        Err(RawError::CorruptedData(format!(
            "Sequential reading: RawFileInfo at offset {} has no valid controllers",
            rfi_offset
        )))
    }
}

/// Skip past the SequenceRow structure (variable-length).
///
/// Layout: 60-byte fixed struct + version-dependent PascalStrings.
/// We don't need the data, just need to advance the cursor correctly.
fn skip_sequence_row(reader: &mut MemoryReader, version: u32) -> Result<(), RawError> {
    // SeqRowInfoStruct: 60 bytes fixed
    // Revision(i32) + RowNumber(i32) + SampleType(i32) + VialName(UTF16[4]=8 bytes)
    // + InjectionVolume(f64) + SampleWeight(f64) + SampleVolume(f64)
    // + ISTDAmount(f64) + DilutionFactor(f64)
    reader.skip_checked(60, "SequenceRow fixed struct")?;

    // 13 base PascalStrings:
    // CalLevel, SampleName, SampleId, Comment (4)
    // UserTexts[5] (5)
    // Inst, Method, RawFileName, Path (4)
    for _ in 0..13 {
        reader.skip_pascal_string()?;
    }

    // Version-dependent strings
    if version >= 25 {
        // Vial, CalibFile
        reader.skip_pascal_string()?;
        reader.skip_pascal_string()?;
    }

    if version >= 41 {
        // Barcode (string) + BarcodeStatus (i32)
        reader.skip_pascal_string()?;
        reader.skip(4)?;
    }

    if version >= 58 {
        // ExtraUserColumns[15]
        for _ in 0..15 {
            reader.skip_pascal_string()?;
        }
    }

    // Note: v66+ files written by newer acquisition software may have additional
    // PascalStrings after ExtraUserColumns (e.g., SampleExtensionInfo JSON blobs).
    // These extra strings are NOT part of the standard SequenceRow.Load code in
    // Thermo's v8.0.6 library. We don't try to consume them here because it's
    // impossible to reliably distinguish extra PascalStrings from the start of
    // AutoSamplerConfig (whose TrayIndex=0 looks like an empty PascalString).
    // The fallback scanner in find_raw_file_info() handles these files correctly.

    Ok(())
}

/// Skip past the AutoSamplerConfig structure (version-dependent).
///
/// Only present for version >= 36. Layout: 24-byte fixed struct + TrayName PascalString.
fn skip_auto_sampler_config(reader: &mut MemoryReader, version: u32) -> Result<(), RawError> {
    if version < 36 {
        return Ok(());
    }

    // AutoSamplerConfigStruct: 24 bytes
    // TrayIndex(i32) + VialIndex(i32) + VialsPerTray(i32)
    // + VialsPerTrayX(i32) + VialsPerTrayY(i32) + TrayShape(i32)
    reader.skip_checked(24, "AutoSamplerConfig fixed struct")?;

    // TrayName (PascalString)
    reader.skip_pascal_string()?;

    Ok(())
}
