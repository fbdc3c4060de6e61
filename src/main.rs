use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use patch_librarian::patch::export::export_patches;
use patch_librarian::state::edit::update_patch;
use patch_librarian::{
    import_patches_from_directory, import_selected, CatalogError, Library, PatchFilter,
    PatchUpdate,
};

/// Catalog synthesizer patch banks into a de-duplicated library
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Catalog database file
    #[arg(long, env = "PATCH_LIBRARIAN_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import every new patch found under a directory
    Import {
        /// Root directory containing bank folders (or a library/ folder)
        dir: PathBuf,
        /// Library label; defaults to the directory's name
        #[arg(short, long)]
        library: Option<String>,
    },
    /// List cataloged patches as JSON lines
    Patches {
        #[arg(long)]
        loved: bool,
        #[arg(long)]
        custom: bool,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        library: Option<String>,
    },
    /// List banks as JSON lines
    Banks,
    /// List the patches linked to one bank
    BankPatches { bank_id: i64 },
    /// Edit patch metadata, e.g. '{"loved": true, "category": "Pad"}'
    Update { path: String, changes: String },
    /// Copy patches into a bank-numbered tree under DEST
    Export {
        dest: PathBuf,
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patch_librarian=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CatalogError> {
    let mut library = match &args.db {
        Some(path) => Library::open(path)?,
        None => Library::open_default()?,
    };
    info!(
        "Catalog ready: {} patches in {} banks",
        library.patch_count()?,
        library.bank_count()?
    );

    let result = dispatch(args.command, &mut library).await;
    library.close()?;
    result
}

async fn dispatch(command: Command, library: &mut Library) -> Result<(), CatalogError> {
    match command {
        Command::Import { dir, library: label } => {
            let patches = match label {
                Some(label) => import_patches_from_directory(&dir, &label, library).await?,
                None => import_selected(Some(dir), library).await?,
            };
            print_lines(&patches)?;
        }
        Command::Patches {
            loved,
            custom,
            category,
            tag,
            bank,
            library: library_label,
        } => {
            let filter = PatchFilter {
                loved,
                custom,
                category,
                tag,
                bank,
                library: library_label,
            };
            print_lines(&filter.apply(library.load_patches()?))?;
        }
        Command::Banks => print_lines(&library.load_banks()?)?,
        Command::BankPatches { bank_id } => print_lines(&library.get_patches_for_bank(bank_id)?)?,
        Command::Update { path, changes } => {
            let update = PatchUpdate::from_json(&changes)?;
            if !update_patch(library, &path, &update)? {
                info!("No patch cataloged at {}", path);
            }
        }
        Command::Export { dest, paths } => {
            export_patches(&paths, &dest)?;
        }
    }
    Ok(())
}

fn print_lines<T: Serialize>(items: &[T]) -> Result<(), CatalogError> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}
