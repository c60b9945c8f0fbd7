//! Simple NTRIP caster example
//!
//! Run with: cargo run --example simple_caster [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example simple_caster                    # binds to 0.0.0.0:2101
//!   cargo run --example simple_caster localhost          # binds to 127.0.0.1:2101
//!   cargo run --example simple_caster 127.0.0.1:2102     # binds to 127.0.0.1:2102
//!
//! ## Mountpoints
//!
//! - `admin`: source password `admin`, subscriber `admin:admin`
//! - `RTCM3`: source password `sourcepass`, public, late joiners are primed
//!   from the last complete RTCM message
//!
//! ## Publishing
//!
//! With str2str (RTKLIB):
//!   str2str -in serial://ttyACM0 -out ntrips://:admin@localhost:2101/admin
//!
//! Or run the bundled simulator:
//!   cargo run --example ntrip_sim
//!
//! ## Subscribing
//!
//!   curl -H 'Ntrip-Version: Ntrip/2.0' -u admin:admin http://localhost:2101/admin --output -
//!
//! The sourcetable is at `http://localhost:2101/`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ntrip_caster::{
    AuthRegistry, CasterServer, MountConfig, MountpointDefinition, PrimePolicy, ServerConfig,
};

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 2101;

    // Replace "localhost" with "127.0.0.1"
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: simple_caster [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:2101)");
}

fn mountpoints() -> Vec<MountpointDefinition> {
    vec![
        MountpointDefinition::new("admin", "admin").subscriber("admin", "admin"),
        MountpointDefinition::new("RTCM3", "sourcepass")
            .config(
                MountConfig::default()
                    .ring_capacity(8 * 1024)
                    .prime_policy(PrimePolicy::FlushFramed),
            )
            .sourcetable_entry(
                "STR;RTCM3;Demo;RTCM 3.2;1005(10),1077(1),1087(1);2;GPS+GLO;DEMO;XXX;0.00;0.00;0;0;ntrip-caster;none;N;N;2400;",
            ),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ntrip_caster=debug".parse()?)
                .add_directive("simple_caster=debug".parse()?),
        )
        .init();

    let config = ServerConfig::default()
        .bind(bind_addr)
        .max_connections(1000)
        .admin("admin", "admin");
    println!("Starting NTRIP caster on {}", config.bind_addr);
    println!("  livesources: curl -u admin:admin http://{}/adm/api/v1/livesources", config.bind_addr);

    let server = Arc::new(CasterServer::new(config, AuthRegistry::new(mountpoints())));

    // Print the livesource listing periodically
    let reporter = Arc::clone(&server);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            for mount in reporter.mounts().await {
                println!(
                    "{:<10} live={:<5} subscribers={:<4} bytes_in={:<10} bitrate={} bps",
                    mount.name,
                    mount.is_live(),
                    mount.subscriber_count,
                    mount.bytes_in,
                    mount.bitrate()
                );
            }
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
