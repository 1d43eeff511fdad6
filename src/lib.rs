//! As-built request fulfillment.
//!
//! Reads unfulfilled download requests from an ArcGIS survey layer, runs the
//! as-built and GIS file exports for each, marks the requests fulfilled, and
//! emails the requester and admin.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod models;
pub mod notify;
pub mod processor;
pub mod survey;
pub mod utils;
