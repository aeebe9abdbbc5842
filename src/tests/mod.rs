//! Integration testing module
//!
//! Pipeline tests that run without ffmpeg:
//! - fake encoder output directories
//! - master rewriting against them
//! - packing, reading back and extracting containers
