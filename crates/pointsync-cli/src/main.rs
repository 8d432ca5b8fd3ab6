//! # pointsync CLI
//!
//! Command-line utilities for inspecting wire payloads: HELLO username
//! encoding and history-write expression previews.

use anyhow::{Context, Result};
use pointsync_adapter_haystack::headers::{decode_username, encode_payload};
use pointsync_core::SourceSample;
use pointsync_grid::his_write_expr;
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "encode-username" => {
            if args.len() < 3 {
                eprintln!("Usage: pointsync encode-username <username>");
                std::process::exit(1);
            }
            println!("{}", encode_payload(&args[2]));
        }
        "decode-username" => {
            if args.len() < 3 {
                eprintln!("Usage: pointsync decode-username <encoded>");
                std::process::exit(1);
            }
            let decoded = decode_username(&args[2]).context("Failed to decode")?;
            println!("{decoded}");
        }
        "his-expr" => {
            if args.len() < 5 {
                eprintln!("Usage: pointsync his-expr <entity-ref> <rfc3339-time> <value> [zone]");
                std::process::exit(1);
            }
            let value: f64 = args[4].parse().context("Value is not a number")?;
            let sample = SourceSample {
                name: args[2].clone(),
                time: args[3].clone(),
                value,
                tz: args.get(5).cloned(),
            };
            let bound = sample.bind(&args[2]).context("Failed to build sample")?;
            println!("{}", his_write_expr(&bound));
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"pointsync CLI

USAGE:
    pointsync <COMMAND> [OPTIONS]

COMMANDS:
    encode-username <username>                    Encode a username for the HELLO scheme (base64url, no padding)
    decode-username <encoded>                     Decode a HELLO username payload
    his-expr <ref> <time> <value> [zone]          Preview a history-write expression
    help                                          Show this help message

EXAMPLES:
    pointsync encode-username ops@example.org
    pointsync decode-username b3BzQGV4YW1wbGUub3Jn
    pointsync his-expr r:ent-1 2024-01-01T00:00:00+00:00 21.5 America/New_York
"#
    );
}
