use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use procdb::{DialectKind, InterfaceDecl, generate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "procdb-tool")]
#[command(about = "Developer tooling for procdb stored-procedure interfaces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an interface declaration and report any generation error
    Check {
        declaration: PathBuf,
        #[arg(long, default_value = "postgresql", value_parser = parse_dialect)]
        dialect: DialectKind,
    },
    /// Print the SQL text of every procedure in a declaration
    Sql {
        declaration: PathBuf,
        #[arg(long, default_value = "postgresql", value_parser = parse_dialect)]
        dialect: DialectKind,
    },
    /// Convert a name between code and database conventions
    Naming {
        direction: Direction,
        name: String,
        #[arg(long, default_value = "postgresql", value_parser = parse_dialect)]
        dialect: DialectKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    ToDb,
    FromDb,
}

fn parse_dialect(raw: &str) -> std::result::Result<DialectKind, String> {
    DialectKind::parse(raw).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            declaration,
            dialect,
        } => check(&declaration, dialect),
        Command::Sql {
            declaration,
            dialect,
        } => print_sql(&declaration, dialect),
        Command::Naming {
            direction,
            name,
            dialect,
        } => {
            let dialect = dialect.create();
            let converted = match direction {
                Direction::ToDb => dialect.to_database_name(&name),
                Direction::FromDb => dialect.from_database_name(&name),
            };
            println!("{}", converted);
            Ok(())
        }
    }
}

fn load_declaration(path: &Path) -> Result<InterfaceDecl> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read declaration {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse declaration {}", path.display()))
}

fn check(path: &Path, dialect: DialectKind) -> Result<()> {
    let decl = load_declaration(path)?;
    let implementation = generate(&decl, dialect.create().as_ref())
        .with_context(|| format!("interface '{}' cannot be generated", decl.name))?;

    println!(
        "ok: {} ({} procedure(s), dialect {})",
        implementation.interface_name(),
        implementation.procedures().len(),
        implementation.dialect_name()
    );
    Ok(())
}

fn print_sql(path: &Path, dialect: DialectKind) -> Result<()> {
    let decl = load_declaration(path)?;
    let implementation = generate(&decl, dialect.create().as_ref())
        .with_context(|| format!("interface '{}' cannot be generated", decl.name))?;

    for procedure in implementation.procedures() {
        println!(
            "{:<24} {:<8} {}",
            procedure.name(),
            procedure.returns().kind(),
            procedure.sql()
        );
    }
    Ok(())
}
