//! SNEX compiler CLI.

use snex_ir::VariableStorage;
use snexc::{compile_with_settings, render, CompileOutput, CompilerSettings};

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "compile" => {
            if args.len() < 3 {
                eprintln!("Usage: snex compile <file.snex> [--no-optimize]");
                std::process::exit(1);
            }
            let output = compile_path(&args[2], settings_from(&args[3..]));
            println!("ok");
            for entry in output.jit.symbols() {
                println!("  {} {} @ {}", entry.ty, entry.name, entry.offset);
            }
        }
        "dump" => {
            if args.len() < 3 {
                eprintln!("Usage: snex dump <file.snex> [--no-optimize]");
                std::process::exit(1);
            }
            let output = compile_path(&args[2], settings_from(&args[3..]));
            print!("{}", output.syntax_tree);
            println!();
            print!("{}", output.jit.assembly());
        }
        "run" => {
            if args.len() < 4 {
                eprintln!("Usage: snex run <file.snex> <function> [args...]");
                std::process::exit(1);
            }
            let output = compile_path(&args[2], CompilerSettings::all_optimizations());
            let values: Vec<VariableStorage> = args[4..].iter().map(|a| parse_value(a)).collect();
            let mut jit = output.jit;
            match jit.call(&args[3], &values) {
                Ok(result) => println!("{result}"),
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(1);
                }
            }
        }
        other => {
            eprintln!("unknown command '{other}'");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: snex <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compile <file.snex>                  Compile and report diagnostics");
    eprintln!("  dump    <file.snex>                  Print the syntax tree and instruction listing");
    eprintln!("  run     <file.snex> <function> [..]  Compile and call a function");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --no-optimize    Disable the optional optimization passes");
}

fn settings_from(flags: &[String]) -> CompilerSettings {
    if flags.iter().any(|f| f == "--no-optimize") {
        CompilerSettings::default()
    } else {
        CompilerSettings::all_optimizations()
    }
}

fn compile_path(path: &str, settings: CompilerSettings) -> CompileOutput {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            std::process::exit(1);
        }
    };
    match compile_with_settings(&source, settings) {
        Ok(output) => {
            for warning in &output.warnings {
                eprintln!("{}", render(path, warning));
            }
            output
        }
        Err(diagnostic) => {
            eprintln!("{}", render(path, &diagnostic));
            std::process::exit(1);
        }
    }
}

/// Literal arguments on the command line: `42` is an int, `0.5` a double,
/// `0.5f` a float.
fn parse_value(arg: &str) -> VariableStorage {
    if let Ok(v) = arg.parse::<i64>() {
        return VariableStorage::Int(v);
    }
    if let Some(stripped) = arg.strip_suffix('f') {
        if let Ok(v) = stripped.parse::<f32>() {
            return VariableStorage::Float(v);
        }
    }
    match arg.parse::<f64>() {
        Ok(v) => VariableStorage::Double(v),
        Err(_) => {
            eprintln!("error: '{arg}' is not a numeric argument");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
