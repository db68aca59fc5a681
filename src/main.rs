//! tun-firewall: TUN-based packet filtering firewall
//!
//! This is the main entry point for the firewall daemon.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! sudo ./tun-firewall
//!
//! # Run with custom configuration
//! sudo ./tun-firewall -c /path/to/config.json
//!
//! # Run with environment overrides
//! TUN_FIREWALL_LOG_LEVEL=debug sudo ./tun-firewall
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use tun_firewall::config::{load_config_with_env, Config};
use tun_firewall::error::Result;
use tun_firewall::rules::RuleEngine;
use tun_firewall::session::{FirewallSession, SessionState, SessionStatus};

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: PathBuf,
    /// Generate default configuration
    generate_config: bool,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = PathBuf::from("/etc/tun-firewall/config.json");
        let mut generate_config = false;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = PathBuf::from(path);
                    }
                }
                "-g" | "--generate-config" => {
                    generate_config = true;
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("tun-firewall v{}", tun_firewall::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            generate_config,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"tun-firewall v{}

TUN-based packet filtering firewall.

USAGE:
    tun-firewall [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Configuration file path [default: /etc/tun-firewall/config.json]
    -g, --generate-config   Generate default configuration and exit
    --check                 Check configuration and exit
    -h, --help              Print help information
    -v, --version           Print version information

ENVIRONMENT:
    TUN_FIREWALL_TUN_NAME    Override the interface name
    TUN_FIREWALL_ADDRESS     Override the virtual interface address
    TUN_FIREWALL_LOG_LEVEL   Override log level (trace, debug, info, warn, error)

REQUIREMENTS:
    - Linux kernel with TUN/TAP support
    - CAP_NET_ADMIN capability (or root)
"#,
        tun_firewall::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target);

    if config.log.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    if args.generate_config {
        tun_firewall::config::create_default_config(&args.config_path)?;
        println!("Generated default configuration at {:?}", args.config_path);
        return Ok(());
    }

    let config = match load_config_with_env(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load configuration from {:?}: {e}",
                args.config_path
            );
            return Err(e.into());
        }
    };

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config);

    info!("tun-firewall v{}", tun_firewall::VERSION);
    info!("Configuration loaded from {:?}", args.config_path);

    let engine = Arc::new(RuleEngine::new(config.rules.to_rule_set()));
    info!("Rule engine initialized with {} rules", engine.len());

    let session = FirewallSession::new(config.tunnel, make_provider()?, engine);

    session.start()?;

    info!(
        "Startup complete in {:.2}ms",
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    let mut status_rx = session.subscribe_status();

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, initiating shutdown...");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
        status = wait_for_stopped(&mut status_rx) => {
            if let Some(err) = status.error {
                warn!("Session terminated: {err}");
            } else {
                info!("Session terminated");
            }
        }
    }

    info!("Shutting down...");
    session.stop();

    let stats = session.stats_snapshot();
    info!(
        "Final stats: {} packets, {} analyzed, {} dropped, {} threats blocked",
        stats.total_packets, stats.packets_analyzed, stats.packets_dropped, stats.threats_blocked
    );
    info!(
        "Processed {} over {} (tcp: {}, udp: {}, icmp: {}, other: {})",
        stats.bytes_formatted(),
        stats.uptime_formatted(),
        stats.protocol_breakdown.tcp,
        stats.protocol_breakdown.udp,
        stats.protocol_breakdown.icmp,
        stats.protocol_breakdown.other
    );

    info!("Shutdown complete");

    Ok(())
}

#[cfg(target_os = "linux")]
fn make_provider() -> Result<Arc<dyn tun_firewall::TunnelProvider>> {
    Ok(Arc::new(tun_firewall::tun::LinuxTunProvider::new()))
}

#[cfg(not(target_os = "linux"))]
fn make_provider() -> Result<Arc<dyn tun_firewall::TunnelProvider>> {
    Err(tun_firewall::FirewallError::Tunnel(
        tun_firewall::TunnelError::establishment("no TUN device support on this platform"),
    ))
}

/// Resolve when the session reaches `Stopped` on its own
async fn wait_for_stopped(status_rx: &mut watch::Receiver<SessionStatus>) -> SessionStatus {
    loop {
        {
            let status = status_rx.borrow();
            if status.state == SessionState::Stopped {
                return status.clone();
            }
        }
        if status_rx.changed().await.is_err() {
            return status_rx.borrow().clone();
        }
    }
}

/// Wait for SIGTERM signal
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        std::future::pending::<()>().await;
        return;
    };
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await;
}
