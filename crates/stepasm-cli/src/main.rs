//! stepasm CLI - merge and split multi-file STEP assemblies
//!
//! Exit codes: 0 success, 2 malformed or unreadable source, 3 ambiguous
//! root, 4 tree/file structure mismatch, 1 anything else.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stepasm::{arb, AssemblyError, EngineConfig, ErrorKind, ProductKey, ProductTree};

#[derive(Parser)]
#[command(name = "stepasm")]
#[command(about = "Compose and decompose multi-file STEP assemblies", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "stepasm.toml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the STEP files of an .arb tree into one file
    Compose {
        /// Input .arb tree
        tree: PathBuf,
        /// Output STEP file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Split a merged STEP file into the files named by an .arb tree
    Decompose {
        /// Merged STEP file
        merged: PathBuf,
        /// Target .arb tree carrying the output paths
        target: PathBuf,
    },
    /// Print (or save) the product tree of a STEP file
    Tree {
        /// STEP file (.step or .stp)
        file: PathBuf,
        /// Write the tree as .arb instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Document id given to every node
        #[arg(long, default_value_t = 1)]
        doc_id: u64,
    },
    /// Display information about a STEP file
    Info {
        /// STEP file (.step or .stp)
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load_from(&cli.config).map_err(AssemblyError::from)?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Compose { tree, output } => {
            let mut product = arb::read_arb(&tree)?;
            let summary = stepasm::compose_file(&mut product, &output, &config.compose)?;
            println!(
                "Composed {} file(s) into {} ({} instances, {} occurrences)",
                summary.files,
                output.display(),
                summary.instances,
                summary.occurrences
            );
            if summary.missing_shapes > 0 {
                println!("  {} product(s) without a shape representation", summary.missing_shapes);
            }
        }
        Commands::Decompose { merged, target } => {
            let product = arb::read_arb(&target)?;
            let summary = stepasm::decompose_file(&merged, &product, &config.decompose)?;
            println!(
                "Wrote {} file(s) ({} instances)",
                summary.files.len(),
                summary.instances
            );
            for file in &summary.files {
                println!("  {}", file.display());
            }
        }
        Commands::Tree {
            file,
            output,
            doc_id,
        } => {
            let structure = stepasm::read_assembly_file(&file, doc_id)?;
            match output {
                Some(path) => {
                    arb::write_arb(&structure.tree, &path)?;
                    println!("Wrote {}", path.display());
                }
                None => print_tree(&structure.tree, structure.tree.root(), 0),
            }
        }
        Commands::Info { file } => show_info(&file)?,
    }

    Ok(())
}

/// Map an error onto the documented exit codes.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<AssemblyError>().map(AssemblyError::kind) {
        Some(ErrorKind::Format | ErrorKind::Io) => 2,
        Some(ErrorKind::MultiRoot) => 3,
        Some(ErrorKind::StructuralMismatch) => 4,
        Some(ErrorKind::Other) | None => 1,
    }
}

fn print_tree(tree: &ProductTree, key: ProductKey, indent: usize) {
    let node = &tree[key];
    match node.geometry {
        Some(slot) => println!("{:indent$}{} [mesh {slot}]", "", node.name),
        None => println!("{:indent$}{}", "", node.name),
    }
    for link in &node.links {
        for occurrence in &link.occurrences {
            let t = occurrence.transform.translation_part();
            println!(
                "{:width$}- {} at ({}, {}, {})",
                "",
                occurrence.name,
                t.x,
                t.y,
                t.z,
                width = indent + 2
            );
        }
        print_tree(tree, link.child, indent + 4);
    }
}

fn show_info(file: &Path) -> Result<()> {
    let table = stepasm_part21::parse_file(file).map_err(|e| AssemblyError::step(file, e))?;

    println!("STEP file: {}", file.display());
    println!("  Instances: {}", table.len());
    println!("  Max id: #{}", table.max_id());
    for record in table.header_records() {
        println!("  {}({})", record.keyword, record.params);
    }

    let root = stepasm::reader::find_root(&table, file)?;
    let name = stepasm::reader::product_name(&table, root).unwrap_or_default();
    println!("  Root: #{root} '{name}'");
    println!("  Products: {}", table.typeinst("PRODUCT_DEFINITION").len());
    println!(
        "  Usage occurrences: {}",
        table.typeinst("NEXT_ASSEMBLY_USAGE_OCCURRENCE").len()
    );
    Ok(())
}
