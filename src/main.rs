use std::fs;
use std::path::PathBuf;

/// Reset SIGPIPE to default behavior so piping (e.g. `tflens dump | jq`) exits
/// cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::Result;
use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod error;
mod hcl;
mod loader;
mod modules;

use loader::{dependency, LoadResult, Parser, ParserConfig};

/// tflens - Terraform configuration loader for static analysis
#[derive(ClapParser)]
#[command(name = "tflens", version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Resolve external module sources from the download folder
    #[arg(long)]
    download_external_modules: bool,

    /// Folder name external modules were downloaded into
    #[arg(long)]
    external_modules_path: Option<String>,

    /// Path patterns to exclude from the walk (regex, repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Explicit variable-definition files, applied in order (repeatable)
    #[arg(long = "var-file")]
    var_file: Vec<PathBuf>,

    /// Use nested module instance addressing
    #[arg(long)]
    nested_modules: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a directory and print the expanded definitions as JSON
    Dump {
        /// Root directory to load
        directory: PathBuf,
    },

    /// Print the per-directory variable maps
    Vars {
        /// Root directory to load
        directory: PathBuf,
    },

    /// Print the module dependency map
    Deps {
        /// Root directory to load
        directory: PathBuf,
    },
}

fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Dump { ref directory } => cmd_dump(&cli, directory),
        Commands::Vars { ref directory } => cmd_vars(&cli, directory),
        Commands::Deps { ref directory } => cmd_deps(&cli, directory),
    }
}

fn build_config(cli: &Cli) -> ParserConfig {
    let mut config = ParserConfig::from_env();
    config.download_external_modules = cli.download_external_modules;
    if let Some(path) = &cli.external_modules_path {
        config.external_modules_download_path = path.clone();
    }
    config.excluded_paths.extend(cli.exclude.iter().cloned());
    for file in &cli.var_file {
        // Var-files are matched against canonical scanned paths.
        let resolved = fs::canonicalize(file).unwrap_or_else(|_| file.clone());
        config
            .vars_files
            .push(resolved.to_string_lossy().into_owned());
    }
    if cli.nested_modules {
        config.enable_nested_modules = true;
    }
    config
}

fn load(cli: &Cli, directory: &PathBuf) -> Result<LoadResult> {
    let mut parser = Parser::new(build_config(cli));
    let result = parser.parse_directory(directory)?;
    report_errors(&result);
    Ok(result)
}

fn report_errors(result: &LoadResult) {
    for (path, error) in &result.parsing_errors {
        eprintln!("{} {}: {}", "warning:".yellow().bold(), path, error);
    }
    if !result.parsing_errors.is_empty() {
        eprintln!(
            "{} {} file(s) could not be parsed",
            "warning:".yellow().bold(),
            result.parsing_errors.len()
        );
    }
}

fn cmd_dump(cli: &Cli, directory: &PathBuf) -> Result<()> {
    let result = load(cli, directory)?;
    println!("{}", serde_json::to_string_pretty(&result.definitions)?);
    Ok(())
}

fn cmd_vars(cli: &Cli, directory: &PathBuf) -> Result<()> {
    let result = load(cli, directory)?;
    println!("{}", serde_json::to_string_pretty(&result.variables)?);
    Ok(())
}

fn cmd_deps(cli: &Cli, directory: &PathBuf) -> Result<()> {
    let config = build_config(cli);
    let nested = config.enable_nested_modules;
    let mut parser = Parser::new(config);
    let result = parser.parse_directory(directory)?;
    report_errors(&result);

    let (dependency_map, dep_index_mapping) = if nested {
        dependency::module_dependency_map_nested(&result.definitions)
    } else {
        let (map, _, indices) = dependency::module_dependency_map(&result.definitions);
        (map, indices)
    };

    // Tuple keys flatten to "<path> <- <referrer>" for JSON output.
    let indices: serde_json::Map<String, serde_json::Value> = dep_index_mapping
        .into_iter()
        .map(|((path, referrer), nums)| {
            (
                format!("{} <- {}", path, referrer),
                serde_json::json!(nums),
            )
        })
        .collect();

    let output = serde_json::json!({
        "dependency_map": dependency_map,
        "dep_index_mapping": indices,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
