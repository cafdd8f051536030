//! pagepress: publish pipeline for hosted landing pages.
//!
//! Renders editor content into a self-contained HTML document, stores it as
//! an immutable versioned artifact, records it in a version ledger, points
//! the page's public hostname at it and prunes old artifacts.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
