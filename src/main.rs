use regex_syntax::ast::parse::ParserBuilder;
use regex_syntax::hir::translate::TranslatorBuilder;

use regex_thompson_nfa::{Nfa, NfaBuilder};

use std::io::{self, Write};
use std::process;

fn compile_pattern(pattern: &str) -> Nfa {
    let ast = ParserBuilder::new()
        .build()
        .parse(pattern)
        .unwrap_or_else(|e| {
            eprintln!("error: failed to parse pattern: {e}");
            process::exit(1);
        });
    let hir = TranslatorBuilder::new()
        .unicode(false)
        .utf8(false)
        .dot_matches_new_line(true)
        .build()
        .translate(pattern, &ast)
        .unwrap_or_else(|e| {
            eprintln!("error: failed to translate pattern: {e}");
            process::exit(1);
        });
    let mut builder = NfaBuilder::default();
    builder.build_hir(&hir).unwrap_or_else(|e| {
        eprintln!("error: failed to compile pattern: {e}");
        process::exit(1);
    })
}

fn print_usage() {
    eprintln!(
        "\
Usage: rethon <COMMAND>

Commands:
  dot  <pattern>     Output DOT (Graphviz) representation of the NFA
  info <pattern>     Print state/transition counts and memory footprint

Options:
  -h, --help         Print this help message"
    );
}

enum Command {
    Dot { pattern: String },
    Info { pattern: String },
}

fn parse_args() -> Command {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(1);
    }

    let mut positional = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option: {other}");
                print_usage();
                process::exit(1);
            }
            _ => {
                positional.push(arg.clone());
            }
        }
    }

    if positional.is_empty() {
        print_usage();
        process::exit(1);
    }

    match positional[0].as_str() {
        "dot" => {
            if positional.len() != 2 {
                eprintln!("error: 'dot' command takes exactly one pattern argument");
                process::exit(1);
            }
            Command::Dot {
                pattern: positional[1].clone(),
            }
        }
        "info" => {
            if positional.len() != 2 {
                eprintln!("error: 'info' command takes exactly one pattern argument");
                process::exit(1);
            }
            Command::Info {
                pattern: positional[1].clone(),
            }
        }
        other => {
            eprintln!("error: unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn run_dot(pattern: &str) {
    let nfa = compile_pattern(pattern);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    nfa.to_dot(&mut out);
    out.flush().unwrap();
}

fn run_info(pattern: &str) {
    let nfa = compile_pattern(pattern);
    println!("pattern: {pattern}");
    println!("states: {}", nfa.states().len());
    println!("transitions: {}", nfa.transitions().len());
    println!("epsilon transitions: {}", nfa.epsilons().len());
    println!("start: {}", nfa.start());
    println!(
        "final states: {}",
        nfa.finals()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("memory_size: {} bytes", nfa.memory_size());
}

fn main() {
    match parse_args() {
        Command::Dot { pattern } => run_dot(&pattern),
        Command::Info { pattern } => run_info(&pattern),
    }
}
