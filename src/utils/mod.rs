//! Shared utility functions for draft-forge.

pub mod json_extraction;

pub use json_extraction::{
    clean_json_response, extract_embedded_json, find_matching_delimiter, parse_json_response,
    JsonExtractionError,
};
