//! Pure Rust Thermo RAW file reader.
//!
//! This crate provides zero-dependency (no Thermo DLLs) reading of Thermo
//! Scientific RAW mass spectrometry data files. It supports:
//!
//! - File metadata extraction
//! - Scan data reading (centroid and profile)
//! - Scan filter string parsing and printing
//! - Parallel scan decoding via rayon
//!
//! # Example
//!
//! ```no_run
//! use thermo_raw::RawFile;
//!
//! let raw = RawFile::open("sample.raw").unwrap();
//! println!("Scans: {}", raw.n_scans());
//!
//! let scan = raw.scan(1).unwrap();
//! println!("m/z values: {:?}", scan.centroid_mz());
//! ```

pub mod centroid_decoder;
pub mod error;
pub mod extended_data;
pub mod file_header;
pub mod filter_parser;
pub mod filter_printer;
pub mod ft_profile_decoder;
pub mod lt_profile_decoder;
pub mod memory_reader;
pub mod packet;
pub mod raw_file;
pub mod raw_file_info;
pub mod run_header;
pub mod scan;
pub mod scan_event;
pub mod scan_index;
pub mod trailer;
pub mod types;
pub mod version;

pub use error::RawError;
pub use raw_file::{diagnose, DebugInfo, DiagnosticReport, DiagnosticStage, FileMetadata, RawFile};
pub use scan::{DecodeOptions, PrecursorInfo, Scan};
pub use types::*;
