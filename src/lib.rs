#![doc = include_str!("../README.md")]

mod bytes;
mod error;

pub mod align;
pub mod envelope;
pub mod record;
pub mod schema;
pub mod timestamp;

pub use error::{Error, FormatError, ParseError, Result};
