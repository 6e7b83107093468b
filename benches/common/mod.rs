#![allow(missing_docs, dead_code)]
//! Shared benchmark support: backend fixtures and runtime helpers.

pub mod harness;
