//! Data models for survey requests.

mod request;

pub use request::{OutputKind, Request, Utility, UtilitySet};
