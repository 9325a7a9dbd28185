//! Collect one snapshot from a device.
//!
//! Runs every command in a command file against one device and writes the
//! output to `<out>/<mode>-<host>-<timestamp>.txt`.
//!
//! Usage:
//!   cargo run --example collect -- --host 192.0.2.10 --user admin --password secret \
//!       --commands commands.txt --mode before
//!
//! Set `RUST_LOG=netsnap=debug` for detailed reader and transport logs.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use netsnap::session::load_command_file;
use netsnap::{
    CollectorConfig, DiffLauncher, ExternalDiffTool, SessionBuilder, SessionEvent, SessionWorker,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<bool, netsnap::Error> {
    let config = match &args.config {
        Some(path) => CollectorConfig::load(path)?,
        None => CollectorConfig::default(),
    };

    let commands = match &args.commands {
        Some(path) => load_command_file(path)?,
        None => vec!["show version".to_string()],
    };
    println!("Loaded {} command(s)", commands.len());

    let mut builder = SessionBuilder::from_address(&args.host)
        .protocol_name(&args.protocol)
        .username(&args.user)
        .password(args.password.clone().unwrap_or_default())
        .commands(&commands)
        .mode_tag(&args.mode);
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Some(out) = &args.out {
        builder = builder.output_dir(out);
    }
    let session = builder.build()?;

    println!(
        "Connecting to {} over {}...",
        session.socket_addr(),
        session.protocol
    );
    let mut worker = SessionWorker::spawn(session, config.clone())?;

    while let Some(event) = worker.blocking_event() {
        match event {
            SessionEvent::Progress { percent, message } => {
                println!("[{percent:>3}%] {message}");
            }
            SessionEvent::Error { category, message } => {
                eprintln!("[{}] {message}", category.as_str());
            }
            SessionEvent::Completed(report) => {
                println!(
                    "\n{} commands: {} completed, {} failed ({} skipped)",
                    report.stats.total_commands,
                    report.stats.completed_commands,
                    report.stats.failed_commands,
                    report.stats.skipped_commands
                );
                println!(
                    "{} bytes in {:.1}s ({:.1} KiB/s)",
                    report.stats.total_bytes,
                    report.duration.as_secs_f64(),
                    report.throughput_kib()
                );
                if let Some(code) = report.connect_error {
                    println!("Hint: {}", code.hint());
                }
            }
        }
    }

    let report = worker.join()?;
    match &report.file_path {
        Some(path) => println!("Output: {}", path.display()),
        None => println!("No output file written"),
    }

    if let (Some(previous), Some(current)) = (&args.compare_with, &report.file_path) {
        let tool = ExternalDiffTool::from_config(config.diff_tool.as_deref())?;
        tool.launch(previous, current)?;
        println!("Opened {} to compare snapshots", tool.program().display());
    }

    Ok(report.success)
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: Option<u16>,
    protocol: String,
    user: String,
    password: Option<String>,
    commands: Option<PathBuf>,
    mode: String,
    out: Option<PathBuf>,
    config: Option<PathBuf>,
    compare_with: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: String::new(),
            port: None,
            protocol: "ssh".to_string(),
            user: env::var("USER").unwrap_or_else(|_| "admin".to_string()),
            password: env::var("NETSNAP_PASSWORD").ok(),
            commands: None,
            mode: "before".to_string(),
            out: None,
            config: None,
            compare_with: None,
        };

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args.get(i + 1).cloned();
            match (flag, value) {
                ("--help", _) => {
                    Self::print_help();
                    std::process::exit(0);
                }
                ("--host" | "-h", Some(v)) => parsed.host = v,
                ("--port" | "-p", Some(v)) => parsed.port = v.parse().ok(),
                ("--protocol", Some(v)) => parsed.protocol = v,
                ("--user" | "-u", Some(v)) => parsed.user = v,
                ("--password" | "-P", Some(v)) => parsed.password = Some(v),
                ("--commands" | "-c", Some(v)) => parsed.commands = Some(PathBuf::from(v)),
                ("--mode" | "-m", Some(v)) => parsed.mode = v,
                ("--out" | "-o", Some(v)) => parsed.out = Some(PathBuf::from(v)),
                ("--config", Some(v)) => parsed.config = Some(PathBuf::from(v)),
                ("--compare-with", Some(v)) => parsed.compare_with = Some(PathBuf::from(v)),
                _ => {
                    eprintln!("Unknown or incomplete argument: {flag}");
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        parsed
    }

    fn print_help() {
        println!(
            r#"netsnap collect example

USAGE:
    cargo run --example collect -- [OPTIONS]

OPTIONS:
    -h, --host <IP[:PORT]>     Device address
    -p, --port <PORT>          Port [default: 22 for ssh, 23 for telnet]
        --protocol <PROTO>     ssh or telnet [default: ssh]
    -u, --user <USER>          Username [default: $USER]
    -P, --password <PASS>      Password [default: $NETSNAP_PASSWORD]
    -c, --commands <FILE>      Command file, one command per line
    -m, --mode <TAG>           Snapshot tag [default: before]
    -o, --out <DIR>            Output directory [default: ./change-<today>]
        --config <FILE>        TOML collector configuration
        --compare-with <FILE>  Open the configured diff tool against this snapshot
    --help                     Print this help message

EXAMPLES:
    # Take the pre-change snapshot over SSH
    cargo run --example collect -- --host 192.0.2.10 --user admin -c commands.txt

    # Take the post-change snapshot over telnet and compare
    cargo run --example collect -- --host 192.0.2.10 --protocol telnet -m after \
        -c commands.txt --config netsnap.toml \
        --compare-with change-20260101/before-192.0.2.10-20260101-100000.txt
"#
        );
    }
}
