//! Pre/post test score analysis: load an uploaded dataset, compute descriptive
//! statistics and breakdowns, narrate and chart them, and export reports.

pub mod analysis;
pub mod charts;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod narrative;
pub mod session;
pub mod views;
pub mod web;
