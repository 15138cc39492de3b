//! grid-admin CLI tool
//!
//! Talks to a running grid-node over its admin socket.
//!
//! Usage:
//!   grid-admin resolve <key>
//!   grid-admin mount <prefix> <backend>...
//!   grid-admin unmount <prefix>
//!   grid-admin set-weight <backend> <weight>
//!   grid-admin put <backend> <key> <value>
//!   grid-admin evict <prefix>
//!   grid-admin fetch <backend> <prefix>
//!   grid-admin list-mounts
//!   grid-admin list-backends
//!   grid-admin ping

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use grid_node::admin_socket::{default_socket_path, AdminCommand, AdminResponse};

fn print_usage() {
    eprintln!("grid-admin - Inspect and manage a grid node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  grid-admin resolve <key>                 Resolve a key");
    eprintln!("  grid-admin mount <prefix> <backend>...   Mount backends at a prefix");
    eprintln!("  grid-admin unmount <prefix>              Remove a mount");
    eprintln!("  grid-admin set-weight <backend> <n>      Set a backend weight");
    eprintln!("  grid-admin put <backend> <key> <value>   Write through a backend");
    eprintln!("  grid-admin evict <prefix>                Drop a cached region");
    eprintln!("  grid-admin fetch <backend> <prefix>      Fetch directly from a backend");
    eprintln!("  grid-admin list-mounts                   List mounts");
    eprintln!("  grid-admin list-backends                 List backends");
    eprintln!("  grid-admin ping                          Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GRID_ADMIN_SOCKET  Path to admin socket (default: ./grid-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("GRID_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_socket_path())
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to grid-node at {:?}: {}\n\
             Is the grid-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn require(args: &[String], count: usize, usage: &str) -> Vec<String> {
    if args.len() < count + 2 {
        eprintln!("Error: {} requires {}", args[1], usage);
        std::process::exit(1);
    }
    args[2..].to_vec()
}

fn parse_command(args: &[String]) -> AdminCommand {
    match args[1].as_str() {
        "resolve" => {
            let a = require(args, 1, "a key");
            AdminCommand::Resolve { key: a[0].clone() }
        }
        "mount" => {
            let a = require(args, 2, "a prefix and at least one backend");
            AdminCommand::Mount {
                prefix: a[0].clone(),
                backends: a[1..].to_vec(),
            }
        }
        "unmount" => {
            let a = require(args, 1, "a prefix");
            AdminCommand::Unmount { prefix: a[0].clone() }
        }
        "set-weight" => {
            let a = require(args, 2, "a backend and a weight");
            let weight = a[1].parse().unwrap_or_else(|_| {
                eprintln!("Error: weight must be an integer, got {:?}", a[1]);
                std::process::exit(1);
            });
            AdminCommand::SetWeight {
                backend: a[0].clone(),
                weight,
            }
        }
        "put" => {
            let a = require(args, 3, "a backend, a key and a value");
            AdminCommand::Put {
                backend: a[0].clone(),
                key: a[1].clone(),
                value: a[2].clone(),
            }
        }
        "evict" => {
            let a = require(args, 1, "a prefix");
            AdminCommand::Evict { prefix: a[0].clone() }
        }
        "fetch" => {
            let a = require(args, 2, "a backend and a prefix");
            AdminCommand::Fetch {
                backend: a[0].clone(),
                prefix: a[1].clone(),
            }
        }
        "list-mounts" => AdminCommand::ListMounts,
        "list-backends" => AdminCommand::ListBackends,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = parse_command(&args);

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Completed {
                value,
                consumed,
                args,
            } => {
                println!("{}", value);
                if !args.is_empty() {
                    println!("  (matched {} bytes, args {:?})", consumed, args);
                }
            }
            AdminResponse::NotFound => {
                println!("not found");
                std::process::exit(1);
            }
            AdminResponse::TimedOut => {
                eprintln!("timed out");
                std::process::exit(1);
            }
            AdminResponse::Subtree { tree } => match tree {
                Some(tree) => {
                    for (path, value) in tree.pairs() {
                        println!(
                            "{} = {}",
                            String::from_utf8_lossy(&path),
                            String::from_utf8_lossy(value.as_bytes())
                        );
                    }
                }
                None => println!("(absent)"),
            },
            AdminResponse::Pong => {
                println!("pong - grid-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
