//! The XML payload layer: character policy, reader, writer.

pub mod chars;
mod reader;
mod writer;

pub use reader::{read_xml, Kdbx3XmlReader};
pub use writer::write_xml;
