//! Domain model and pure logic for the background-replacement pipeline.
//!
//! Nothing in this crate performs I/O. The remote clients live in
//! `showroom-remote` and the orchestration in `showroom-pipeline`.

pub mod batch;
pub mod error;
pub mod image;
pub mod job;
pub mod replacement;
pub mod seed;
pub mod selection;
pub mod types;
