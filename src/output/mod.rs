//! Result output: console tables and JSON documents

pub mod json;
pub mod text;
