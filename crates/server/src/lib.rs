//! HTTP boundary for the building savings engine

pub mod api;
pub mod config;
