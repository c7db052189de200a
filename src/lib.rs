//! Core library for the `doom` SCPI toolkit.
//!
//! Probes Rigol MSO5000 oscilloscopes over SCPI: runs the known command list,
//! fuzzes and learns new commands, sweeps wordlists, reads waveforms and the
//! installed license options, and offers an interactive SCPI console.

pub mod adapters;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod interrupt;
pub mod licenses;
pub mod logging;
pub mod pinky;
pub mod probe;
pub mod shell;
pub mod storage;
pub mod waveform;
