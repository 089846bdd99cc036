//! Matrix Expression Optimizer CLI
//!
//! Usage:
//!   matrizer "A: 2 x 3
//!             B: 3 x 4
//!             x: 4 x 1
//!             A B x"
//!   matrizer -f model.mtz
//!   matrizer -f model.mtz --json

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io::{self, Read};

use matrizer::{
    descriptor_of, flops, parse_program, preprocess, resolve_preamble, Optimization, Rewriter,
    DEFAULT_CLOSURE_LIMIT,
};

#[derive(ClapParser, Debug)]
#[command(name = "matrizer")]
#[command(version = "0.1.0")]
#[command(about = "Rewrites matrix expressions to minimize FLOPs and emits NumPy code")]
struct Args {
    /// Program to optimize: preamble lines, then an expression
    #[arg(value_name = "PROGRAM")]
    program: Option<String>,

    /// Read the program from a file
    #[arg(short = 'f', long = "file")]
    input_file: Option<String>,

    /// Bound on the number of candidate trees the search may visit
    #[arg(long = "closure-limit", default_value_t = DEFAULT_CLOSURE_LIMIT)]
    closure_limit: usize,

    /// Output as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Get the program from an argument, a file, or stdin.
    let source = if let Some(program) = args.program {
        program
    } else if let Some(file) = args.input_file {
        fs::read_to_string(&file).unwrap_or_else(|e| {
            eprintln!("{}: failed to read file '{}': {}", "Error".red(), file, e);
            std::process::exit(1);
        })
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).unwrap_or_else(|e| {
            eprintln!("{}: failed to read stdin: {}", "Error".red(), e);
            std::process::exit(1);
        });
        buffer
    };

    let program = match parse_program(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: {}", "Parse error".red(), e);
            std::process::exit(1);
        }
    };

    let table = match resolve_preamble(&program.preamble) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}: {}", "Preamble error".red(), e);
            std::process::exit(1);
        }
    };

    if args.verbose {
        println!("{}", "Matrix Expression Optimizer".bold().blue());
        println!("{}", "=".repeat(35));
        println!();
        let mut names: Vec<_> = table.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            println!("{}: {}", name.to_string().green(), table[&name]);
        }
        println!("{}: {}", "Input".green(), program.expr);
        println!();
    }

    let normalized = match preprocess(&program.expr, &table) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Analysis error".red(), e);
            std::process::exit(1);
        }
    };

    let cost_before = match flops(&normalized, &table) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Analysis error".red(), e);
            std::process::exit(1);
        }
    };

    let rewriter = Rewriter::new().with_closure_limit(args.closure_limit);
    let (cost_after, tree) = match rewriter.optimize(&normalized, &table) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}: {}", "Optimization error".red(), e);
            std::process::exit(1);
        }
    };

    let report = Optimization {
        cost_before,
        cost_after,
        expression: tree.to_string(),
        python: matrizer::emit(&tree),
        tree,
    };

    if args.json_output {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: failed to serialize report: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else {
        print_report(&report, &table, args.verbose);
    }
}

fn print_report(report: &Optimization, table: &matrizer::SymbolTable, verbose: bool) {
    println!("{}", "Optimization Results".bold().green());
    println!("{}", "=".repeat(50));
    println!();
    println!("{}: {} flops", "Before".cyan(), report.cost_before);
    println!("{}: {} flops", "After".cyan(), report.cost_after);
    if report.cost_after > 0 {
        println!(
            "{}: {:.2}x",
            "Speedup".cyan(),
            report.cost_before as f64 / report.cost_after as f64
        );
    }
    println!();
    println!("{}: {}", "Expression".cyan(), report.expression);
    println!("{}:", "NumPy".cyan());
    for line in report.python.lines() {
        println!("  {}", line);
    }

    if verbose {
        if let Ok(m) = descriptor_of(&report.tree, table) {
            println!();
            println!("{}: {}", "Result shape".cyan(), m);
        }
    }
}
