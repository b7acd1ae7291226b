//! Command implementations for the vellum binary.
//!
//! Each command returns `Err(exit_code)` after printing a diagnostic to
//! stderr; successful runs print the program's return value to stdout.

use std::fs;

use vellum_runtime::error::Error;
use vellum_runtime::natives::{NativeFunction, NativeRegistry};
use vellum_runtime::value::Value;
use vellum_runtime::{bundle, compiler};
use vellum_runtime::{Runtime, DEFAULT_ENTRY};

type CommandResult = Result<(), i32>;

/// Natives available to scripts run from the command line.
fn host_natives() -> NativeRegistry {
    let mut natives = NativeRegistry::new();
    natives.register(NativeFunction::new("log", 1, |args| {
        println!("{}", args[0].as_string());
        Ok(Value::Null)
    }));
    natives.register(NativeFunction::new("print", 1, |args| {
        print!("{}", args[0].as_string());
        Ok(Value::Null)
    }));
    natives
}

fn read_source(path: &str) -> Result<String, i32> {
    fs::read_to_string(path).map_err(|err| {
        eprintln!("error: cannot read '{path}': {err}");
        1
    })
}

fn decode_key(hex_key: &str, flag: &str) -> Result<Vec<u8>, i32> {
    hex::decode(hex_key).map_err(|_| {
        eprintln!("error: {flag} must be an even-length hex string");
        1
    })
}

fn report(err: Error) -> CommandResult {
    eprintln!("error: {err}");
    Err(match err {
        Error::Compile(_) => 1,
        Error::Bundle(_) => 2,
        Error::Runtime(_) => 3,
    })
}

pub fn run(args: &[String]) -> CommandResult {
    let [path] = args else {
        eprintln!("Usage: vellum run <path>");
        return Err(1);
    };
    let source = read_source(path)?;
    let runtime = Runtime::new(host_natives());
    match runtime.run_source(&source, DEFAULT_ENTRY) {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(err) => report(err),
    }
}

pub fn compile(args: &[String]) -> CommandResult {
    let usage = || {
        eprintln!("Usage: vellum compile <path> -o <out> [--sign-key <hex>]");
        1
    };
    let mut input: Option<&str> = None;
    let mut output: Option<&str> = None;
    let mut sign_key: Option<&str> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" => output = Some(iter.next().ok_or_else(usage)?.as_str()),
            "--sign-key" => sign_key = Some(iter.next().ok_or_else(usage)?.as_str()),
            other if input.is_none() => input = Some(other),
            other => {
                eprintln!("error: unexpected argument '{other}'");
                return Err(1);
            }
        }
    }
    let input = input.ok_or_else(usage)?;
    let output = output.ok_or_else(usage)?;
    let key = sign_key
        .map(|hex_key| decode_key(hex_key, "--sign-key"))
        .transpose()?;

    let source = read_source(input)?;
    let program = compiler::compile(&source).map_err(|err| {
        eprintln!("error: {err}");
        1
    })?;
    let bytes = bundle::write_bundle(&program, key.as_deref()).map_err(|err| {
        eprintln!("error: {err}");
        2
    })?;
    fs::write(output, bytes).map_err(|err| {
        eprintln!("error: cannot write '{output}': {err}");
        1
    })?;
    eprintln!(
        "compiled {} function(s) to {output}{}",
        program.functions.len(),
        if key.is_some() { " (signed)" } else { "" }
    );
    Ok(())
}

pub fn run_bundle(args: &[String]) -> CommandResult {
    let usage = || {
        eprintln!("Usage: vellum run-bundle <path> [--key <hex>]");
        1
    };
    let mut input: Option<&str> = None;
    let mut key_hex: Option<&str> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--key" => key_hex = Some(iter.next().ok_or_else(usage)?.as_str()),
            other if input.is_none() => input = Some(other),
            other => {
                eprintln!("error: unexpected argument '{other}'");
                return Err(1);
            }
        }
    }
    let input = input.ok_or_else(usage)?;
    let key = key_hex
        .map(|hex_key| decode_key(hex_key, "--key"))
        .transpose()?;

    let bytes = fs::read(input).map_err(|err| {
        eprintln!("error: cannot read '{input}': {err}");
        1
    })?;
    let runtime = Runtime::new(host_natives());
    match runtime.run_bundle(&bytes, key.as_deref(), DEFAULT_ENTRY) {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(err) => report(err),
    }
}
