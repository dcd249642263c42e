//! Domain and wire types shared by the club client crates.

pub mod domain;
pub mod error;
pub mod protocol;
