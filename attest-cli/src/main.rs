use std::process;
use std::time::Duration;

use attest::{RunConfig, Verdict, Watchdog, WorkloadConfig, EXIT_INCONCLUSIVE, EXIT_NO_VIOLATION};
use attest_proto::{ErrorCode, KvConnection, Request, TcpConnector, resolve};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::Level;

/// Timeout for one-shot client operations.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "attest")]
#[command(about = "Atomic-consistency tester for key-value stores", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive concurrent traffic against a store and verify atomicity
    Check {
        /// Server address, HOST:PORT
        #[arg(short, long)]
        server: String,

        /// Target number of operation attempts
        #[arg(short = 'n', long, default_value_t = 100_000)]
        requests: u64,

        /// Worker thread count (defaults to a multiple of the CPU count)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Sending-phase budget in seconds
        #[arg(long, default_value_t = 10)]
        send_time: u64,

        /// Connection and per-call timeout in seconds
        #[arg(long, default_value_t = 10)]
        conn_timeout: u64,

        /// Ceiling on total run time in seconds
        #[arg(long, default_value_t = 120)]
        program_timeout: u64,

        /// Disable the write-then-read fast checker
        #[arg(long)]
        no_fast_check: bool,

        /// Seed for reproducible workloads
        #[arg(long)]
        seed: Option<u64>,

        /// Verbose logging
        #[arg(long)]
        debug: bool,
    },
    /// Write a value
    Set {
        /// Server address, HOST:PORT
        #[arg(short, long)]
        server: String,
        key: String,
        value: String,
    },
    /// Read a value
    Get {
        /// Server address, HOST:PORT
        #[arg(short, long)]
        server: String,
        key: String,
    },
    /// Delete a key
    Del {
        /// Server address, HOST:PORT
        #[arg(short, long)]
        server: String,
        key: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Check {
            server,
            requests,
            threads,
            send_time,
            conn_timeout,
            program_timeout,
            no_fast_check,
            seed,
            debug,
        } => run_check(CheckArgs {
            server,
            requests,
            threads,
            send_time,
            conn_timeout,
            program_timeout,
            no_fast_check,
            seed,
            debug,
        }),
        Commands::Set { server, key, value } => run_client_op(&server, Request::Set { key, value }),
        Commands::Get { server, key } => run_client_op(&server, Request::Get { key }),
        Commands::Del { server, key } => run_client_op(&server, Request::Delete { key }),
    };
    process::exit(code);
}

struct CheckArgs {
    server: String,
    requests: u64,
    threads: Option<usize>,
    send_time: u64,
    conn_timeout: u64,
    program_timeout: u64,
    no_fast_check: bool,
    seed: Option<u64>,
    debug: bool,
}

fn run_check(args: CheckArgs) -> i32 {
    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let addr = match resolve(&args.server) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("{} {}", "ERROR:".red().bold(), err);
            return EXIT_INCONCLUSIVE;
        }
    };
    let connector = TcpConnector::new(addr, Duration::from_secs(args.conn_timeout));

    let config = RunConfig {
        workload: WorkloadConfig {
            max_ops: args.requests,
            workers: args
                .threads
                .unwrap_or_else(|| WorkloadConfig::default().workers),
            send_window: Duration::from_secs(args.send_time),
            setup_timeout: Duration::from_secs(args.conn_timeout + 2),
            seed: args.seed,
            ..WorkloadConfig::default()
        },
        fast_check: !args.no_fast_check,
        program_timeout: Duration::from_secs(args.program_timeout),
        ..RunConfig::default()
    };

    // The ceiling on the whole run: exceeding it is itself a verdict.
    let watchdog = Watchdog::arm(config.program_timeout, || {
        println!(
            "{}",
            "no violation found within budget (program timeout)".yellow()
        );
        process::exit(EXIT_NO_VIOLATION);
    });

    match attest::verify(&connector, &config) {
        Ok(outcome) => {
            watchdog.disarm();
            match &outcome.verdict {
                Verdict::Consistent(report) => {
                    println!(
                        "{} ({} operations in {:.1?})",
                        "no violation found within budget".green().bold(),
                        outcome.operations,
                        outcome.elapsed
                    );
                    println!("  {}", report);
                }
                Verdict::Inconsistent(violation) => {
                    println!("{} {}", "violation detected:".red().bold(), violation);
                }
            }
            outcome.verdict.exit_code()
        }
        Err(err) => {
            watchdog.disarm();
            eprintln!("{} {}", "ERROR:".red().bold(), err);
            err.exit_code()
        }
    }
}

fn run_client_op(server: &str, request: Request) -> i32 {
    let addr = match resolve(server) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            return ErrorCode::Error.code();
        }
    };
    let mut connection = match KvConnection::connect(addr, CLIENT_TIMEOUT) {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("ERROR during transmission: {}", err);
            return ErrorCode::Error.code();
        }
    };
    match connection.call(&request) {
        Ok(response) => {
            if response.error == ErrorCode::Success {
                if !response.value.is_empty() {
                    println!("{}", response.value);
                }
                ErrorCode::Success.code()
            } else {
                eprintln!("{}", response.error_text);
                response.error.code()
            }
        }
        Err(err) => {
            eprintln!("ERROR during transmission: {}", err);
            ErrorCode::Error.code()
        }
    }
}
