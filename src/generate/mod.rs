//! Site generation: prompt compilation, the model client and parsing of its
//! output into a file list.

pub mod client;
pub mod parser;
pub mod prompt;

pub use client::{
    ApiStyle, GenerateOptions, Generation, GenerationClient, Generator, HttpTransport,
    ModelTransport, TransportResponse, build_payload,
};
pub use parser::{GeneratedFile, GenerationResult, ResponseParser, parse_json_lenient};
pub use prompt::{PROJECT_SYSTEM_PROMPT, build_project_prompt};
