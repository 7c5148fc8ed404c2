use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use koan::interpreter::PrintOutput;
use koan::memory::Heap;
use koan::{EvalConfig, Interpreter};

#[derive(Parser)]
#[command(name = "koan", version, about = "Run a koan program")]
struct Cli {
    /// Source file to run.
    file: PathBuf,

    /// Print the token stream instead of running.
    #[arg(long)]
    dump_tokens: bool,

    /// Print the parsed syntax tree as JSON instead of running.
    #[arg(long)]
    dump_ast: bool,

    /// Print allocation statistics and the leak report after the run.
    #[arg(long)]
    memory_report: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error reading {}: {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.dump_tokens {
        return dump_tokens(&source);
    }

    let heap = Arc::new(Heap::new());
    heap.set_debug(cli.memory_report);

    let mut interp =
        Interpreter::with_parts(Arc::clone(&heap), EvalConfig::default(), PrintOutput::Stdout);

    if cli.dump_ast {
        return dump_ast(&mut interp, &source);
    }

    let status = match interp.run_source(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    };

    if !interp.diagnostics().is_empty() {
        eprint!("{}", interp.diagnostics().render());
    }

    if cli.memory_report {
        let stats = heap.stats();
        eprintln!(
            "memory: {} allocations, {} frees, {} bytes live, {} bytes peak",
            stats.allocation_count,
            stats.free_count,
            stats.current_allocated,
            stats.peak_allocated
        );
        eprint!("{}", heap.leak_report());
    }

    status
}

fn dump_tokens(source: &str) -> ExitCode {
    match koan::lexer::lex(source) {
        Ok(tokens) => {
            for (token, span) in tokens {
                println!("{:>4}..{:<4} {:?}", span.start, span.end, token);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn dump_ast(interp: &mut Interpreter, source: &str) -> ExitCode {
    let tokens = match koan::lexer::lex(source) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = koan::parser::parse(tokens, interp.arena()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let arena = interp.arena();
    let nodes: Vec<_> = arena
        .live_ids()
        .into_iter()
        .filter_map(|id| arena.get(id).map(|node| (id, node)))
        .collect();
    match serde_json::to_string_pretty(&nodes) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("serialization error: {e}");
            ExitCode::FAILURE
        }
    }
}
