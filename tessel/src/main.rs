use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, Write},
    process,
};

use tessel::{
    BreakEvent, CompileOptions, ContextCreateInfo, ExecutionContext, LanguageVersion, Unwind,
    Value, disassemble,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "The script files to execute")]
    files: Vec<String>,

    /// Start REPL after executing files (default if no files)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,

    /// Print bytecode and constants instead of executing
    #[arg(long, help = "Dump bytecode + constant tables for inputs")]
    dump_bytecode: bool,

    #[arg(long, default_value_t = 1000, help = "Maximum interpreter call depth")]
    max_call_depth: usize,

    #[arg(long, default_value = "default", help = "Language version, e.g. 1.2 or 150")]
    language_version: LanguageVersion,

    /// Give every function an activation record
    #[arg(long, help = "Compile every function with an activation record")]
    force_activation: bool,

    #[arg(long = "break", value_name = "LINE", help = "Arm a breakpoint on a source line")]
    breakpoints: Vec<u32>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let info = ContextCreateInfo {
        max_call_depth: cli.max_call_depth,
        compile: CompileOptions {
            language_version: cli.language_version,
            force_activation: cli.force_activation,
            ..CompileOptions::default()
        },
        ..ContextCreateInfo::default()
    };
    let mut ctx = ExecutionContext::new(info);
    if !cli.breakpoints.is_empty() {
        ctx.set_debug_hook(report_break);
    }

    for filename in &cli.files {
        let source_code = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", filename, err);
                process::exit(1);
            }
        };

        let unit = match ctx.compile(&source_code, filename) {
            Ok(unit) => unit,
            Err(err) => {
                eprintln!("Error compiling {}: {}", filename, err);
                process::exit(1);
            }
        };

        if cli.dump_bytecode {
            println!("== {} ==", filename);
            print!("{}", disassemble(&unit));
            continue;
        }

        for &line in &cli.breakpoints {
            if unit.set_breakpoint_recursive(line, true) == 0 {
                eprintln!("warning: no code on line {line} of {filename}");
            }
        }

        match ctx.execute(&unit) {
            Ok(_) => {}
            Err(Unwind::Suspended(suspension)) => {
                eprintln!(
                    "{}: script suspended with {:?} at top level",
                    filename, suspension.value
                );
            }
            Err(err) => {
                eprintln!("Error executing {}: {}", filename, err);
                process::exit(1);
            }
        }
    }

    if cli.dump_bytecode {
        return;
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut ctx);
    }
}

fn report_break(event: &BreakEvent) {
    eprintln!(
        "break at {}:{} ({} frames)",
        event.unit_name(),
        event.line,
        event.frame_count
    );
}

fn run_repl(ctx: &mut ExecutionContext) {
    println!("tessel REPL");
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                match ctx.evaluate(input) {
                    Ok(Value::Undefined) => {}
                    Ok(value) => println!("{value:?}"),
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}
