//! Text and binary dataset loading.

pub mod loader;
pub mod parser;
pub mod text_reader;

pub use loader::DatasetLoader;
pub use parser::{create_parser, CsvParser, LibSvmParser, Parser, TsvParser};
pub use text_reader::TextReader;
