//! vellum CLI: compile, run, and execute signed bundles.
//!
//! Exit codes:
//! - 0: success
//! - 1: usage, input, or compile error
//! - 2: bundle or signature error
//! - 3: runtime error

mod commands;

use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => commands::run(&args[2..]),
        "compile" => commands::compile(&args[2..]),
        "run-bundle" => commands::run_bundle(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: vellum <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <path>                                  Compile and execute a script");
    eprintln!("  compile <path> -o <out> [--sign-key <hex>]  Write a (optionally signed) bundle");
    eprintln!("  run-bundle <path> [--key <hex>]             Execute a bundle, verifying if keyed");
}
