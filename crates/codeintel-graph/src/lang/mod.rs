//! Language front ends.
//!
//! Each front end lowers a parsed syntax tree into a [`crate::unit::SourceUnit`].

pub mod python;

pub use python::PythonExtractor;
