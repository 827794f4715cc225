//! YAML loading with source-span diagnostics

pub mod diagnostics;

pub use diagnostics::{parse_yaml_file, parse_yaml_str, YamlError, YamlSyntaxError};
