#![warn(missing_docs)]

//! ISO 10303-21 ("STEP Part 21") instance tables.
//!
//! Parses an exchange file into an [`InstanceTable`] that keeps every
//! parameter list as verbatim text, so instances can be moved between files
//! losslessly. Structured values are decoded on demand, and entity
//! references can be rewritten lexically for renumbering.
//!
//! # Example
//!
//! ```no_run
//! use stepasm_part21::{parse_file, StepWriter};
//!
//! let table = parse_file("bracket.stp").unwrap();
//! let pd = table.first_of_type("PRODUCT_DEFINITION");
//! println!("{} instances, root {:?}", table.len(), pd);
//!
//! // Shift every id by 100.
//! let mut writer = StepWriter::new(std::io::stdout());
//! writer.begin(table.header()).unwrap();
//! for instance in table.iter() {
//!     writer.write_renumbered(instance, instance.id + 100, |id| id + 100).unwrap();
//! }
//! writer.finish().unwrap();
//! ```

mod error;
mod lexer;
mod params;
mod parser;
mod refs;
mod table;
mod writer;

pub use error::StepError;
pub use lexer::{Lexer, Position, SpannedToken, Token};
pub use params::{parse_params, ParamsExt, StepValue};
pub use parser::{parse, parse_bytes, parse_file};
pub use refs::{references, renumber};
pub use table::{Instance, InstanceKind, InstanceTable, Record, COMPLEX_TYPE};
pub use writer::{format_instance, format_real, format_real_list, format_string, StepWriter};
