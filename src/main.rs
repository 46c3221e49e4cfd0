//! `pirc`: the command-line entry point for the PIR optimizing-compiler
//! core (spec §2.5/§6).
//!
//! Reads a small textual stand-in for a parsed RIR function (real RIR
//! parsing is a front-end concern and out of scope, spec §1/§4): the first
//! line is `name nargs`, each following line is one constant-pool entry in
//! the syntax `pirc::pir::Constant`'s `Display` impl produces.

use clap::{Parser, Subcommand};
use pirc::debug::DebugOptions;
use pirc::driver::{self, Check, CompileOptions};
use pirc::pir::{Closure, Constant, Logical};
use pirc::rir::{self, IdentityBackend};
use rustc_hash::FxHashMap as HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pirc")]
#[command(author, version, about = "PIR optimizing-compiler core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a RIR function, printing the resulting dispatch table.
    Compile {
        /// Path to a RIR stand-in file (see module docs for the format).
        rir_file: PathBuf,
    },
    /// Compile and print the optimized PIR.
    Disassemble {
        rir_file: PathBuf,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Compile and assert one or more diagnostic checks against the result.
    Check {
        rir_file: PathBuf,
        /// Check names: `no-branch`, `ssa`, `version-count=<n>`.
        checks: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let debug = DebugOptions::from_env();

    let result = match cli.command {
        Commands::Compile { rir_file } => compile_cmd(&rir_file, &debug),
        Commands::Disassemble { rir_file, verbose } => disassemble_cmd(&rir_file, &debug, verbose),
        Commands::Check { rir_file, checks } => check_cmd(&rir_file, &debug, &checks),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn compile_cmd(path: &PathBuf, debug: &DebugOptions) -> Result<(), String> {
    let rir = load_rir(path)?;
    let mut closure = Closure::new(rir.name.clone());
    let program = HashMap::default();
    let options = CompileOptions { debug: debug.clone(), ..Default::default() };
    driver::compile(&rir, &mut closure, &IdentityBackend, &program, &options).map_err(|e| e.to_string())?;
    println!("{}", pirc::disassemble::render_closure(&closure, debug.style, false));
    Ok(())
}

fn disassemble_cmd(path: &PathBuf, debug: &DebugOptions, verbose: bool) -> Result<(), String> {
    let rir = load_rir(path)?;
    let mut closure = Closure::new(rir.name.clone());
    let program = HashMap::default();
    let options = CompileOptions { debug: debug.clone(), ..Default::default() };
    driver::compile(&rir, &mut closure, &IdentityBackend, &program, &options).map_err(|e| e.to_string())?;
    print!("{}", driver::disassemble(&closure, debug, verbose));
    Ok(())
}

fn check_cmd(path: &PathBuf, debug: &DebugOptions, checks: &[String]) -> Result<(), String> {
    let rir = load_rir(path)?;
    let mut closure = Closure::new(rir.name.clone());
    let program = HashMap::default();
    let options = CompileOptions { debug: debug.clone(), ..Default::default() };
    driver::compile(&rir, &mut closure, &IdentityBackend, &program, &options).map_err(|e| e.to_string())?;

    let parsed: Vec<Check> = checks.iter().map(|s| parse_check(s)).collect::<Result<_, _>>()?;
    if driver::check(&closure, &parsed) {
        println!("ok");
        Ok(())
    } else {
        Err("check failed".to_string())
    }
}

fn parse_check(s: &str) -> Result<Check, String> {
    match s {
        "no-branch" => Ok(Check::NoBranch),
        "ssa" => Ok(Check::Ssa),
        _ => {
            if let Some(n) = s.strip_prefix("version-count=") {
                n.parse().map(Check::VersionCount).map_err(|_| format!("bad version-count: {n}"))
            } else {
                Err(format!("unknown check '{s}'"))
            }
        }
    }
}

fn load_rir(path: &PathBuf) -> Result<rir::Function, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| "empty RIR file".to_string())?;
    let mut parts = header.split_whitespace();
    let name = parts.next().ok_or_else(|| "missing function name".to_string())?;
    let nargs: usize = parts
        .next()
        .ok_or_else(|| "missing nargs".to_string())?
        .parse()
        .map_err(|_| "nargs is not a number".to_string())?;

    let mut rir = rir::Function::new(name, nargs);
    for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
        rir = rir.with_constant(parse_constant(line)?);
    }
    Ok(rir)
}

fn parse_constant(text: &str) -> Result<Constant, String> {
    match text {
        "NULL" => Ok(Constant::Null),
        "TRUE" => Ok(Constant::Logical(Logical::True)),
        "FALSE" => Ok(Constant::Logical(Logical::False)),
        "NA" => Ok(Constant::Logical(Logical::Na)),
        "NA_integer_" => Ok(Constant::Integer(None)),
        _ if text.starts_with('"') && text.ends_with('"') && text.len() >= 2 => {
            Ok(Constant::Str(text[1..text.len() - 1].to_string()))
        }
        _ if text.ends_with('L') => {
            text[..text.len() - 1].parse().map(|i| Constant::Integer(Some(i))).map_err(|_| format!("bad integer constant '{text}'"))
        }
        _ => text.parse().map(Constant::Real).map_err(|_| format!("unrecognized constant '{text}'")),
    }
}
