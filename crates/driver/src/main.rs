use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use log::info;

use backend::Program;

const EXIT_INPUT: i32 = 1;
const EXIT_PARSE: i32 = 2;
const EXIT_TRANSLATE: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "ll2c",
    about = "LLVM IR to C translator",
    long_about = "Translates a textual LLVM IR module into an equivalent C source file",
    version
)]
struct Cli {
    /// Input LLVM IR file (.ll)
    input: PathBuf,
    /// Output C file; stdout when omitted
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ll2c: cannot read {}: {}", cli.input.display(), e);
            return EXIT_INPUT;
        }
    };

    let module_name = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());

    let module = match parse::parse_module(&source, &module_name) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("ll2c: {}: {}", cli.input.display(), e);
            return EXIT_PARSE;
        }
    };
    info!("IR file successfully parsed");

    let program = match backend::translate(&module) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("ll2c: {}", e);
            return EXIT_TRANSLATE;
        }
    };

    let result = match &cli.output {
        Some(path) => program
            .save(path)
            .with_context(|| format!("cannot write {}", path.display())),
        None => emit_stdout(&program).context("cannot write to stdout"),
    };
    if let Err(e) = result {
        eprintln!("ll2c: {:#}", e);
        return EXIT_INPUT;
    }
    0
}

fn emit_stdout(program: &Program) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    program.print(&mut lock)?;
    lock.flush()
}
