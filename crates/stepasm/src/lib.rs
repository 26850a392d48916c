#![warn(missing_docs)]

//! Multi-file STEP assemblies.
//!
//! A [`ProductTree`] describes an assembly whose products may live in
//! separate STEP files. The [`composer`] merges those files into one file
//! with disjoint ids and synthesized placement records; the [`decomposer`]
//! splits a merged file back into per-product files. Trees are stored as
//! `.arb` JSON lists (see [`arb`]).
//!
//! # Example
//!
//! ```no_run
//! use stepasm::{arb, compose_file, decompose_file, EngineConfig};
//!
//! let config = EngineConfig::load_from("stepasm.toml".as_ref()).unwrap();
//! let mut tree = arb::read_arb("assembly.arb").unwrap();
//! let summary = compose_file(&mut tree, "merged.stp", &config.compose).unwrap();
//! println!("{} files, {} occurrences", summary.files, summary.occurrences);
//!
//! // Split it again, placing each product where the tree says.
//! decompose_file("merged.stp", &tree, &config.decompose).unwrap();
//! ```

pub mod arb;
pub mod composer;
mod config;
pub mod decomposer;
mod error;
pub mod matcher;
mod matrix;
pub mod placement;
pub mod reader;
mod tree;

pub use composer::{compose, compose_file, ComposeSummary};
pub use config::{ComposeConfig, ConfigError, DecomposeConfig, EngineConfig, HeaderConfig};
pub use decomposer::{decompose, decompose_file, DecomposeSummary};
pub use error::{AssemblyError, ErrorKind, Result};
pub use matcher::find_equivalent;
pub use matrix::{Matrix, Placement};
pub use reader::{read_assembly, read_assembly_file, AssemblyStructure, Usage};
pub use tree::{GeometrySource, Link, MeshHandle, Occurrence, Product, ProductKey, ProductTree};
