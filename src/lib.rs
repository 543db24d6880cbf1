//! competitor-iq
//!
//! 競合コースのトピック網羅をAIで判定し、マスタExcelに反映する。

pub mod ai_provider;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod inputs;
pub mod sync;
pub mod workbook;
pub mod writer;
