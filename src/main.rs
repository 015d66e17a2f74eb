//! Scanctl binary: list scanners, show their options and scan to a file.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use scanctl::config::{self, ScanProfile};
use scanctl::{
    catalog, pipeline, AccessContext, ConfigurationRequest, OptionCatalog, OptionRequest,
    SaneBackend, Setting,
};

#[derive(Parser)]
#[command(name = "scanctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configure a scanner and acquire one image", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML scan profile; command-line flags override it
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List visible devices
    Devices,

    /// Print the settable options of a device
    Options {
        /// Device name, exact or partial
        device: String,
    },

    /// Configure a device and scan one image
    Scan(ScanArgs),
}

#[derive(clap::Args, Default)]
struct ScanArgs {
    /// Device name, exact or partial; scans every device when omitted
    #[arg(short, long)]
    device: Option<String>,

    /// Destination file (.png, .jpg, .jpeg, .tif, .tiff)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Set an option, e.g. --set resolution=600 (repeatable, applied in order)
    #[arg(short, long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Let the device choose an option's value (applied after --set)
    #[arg(short, long = "auto", value_name = "NAME")]
    auto: Vec<String>,

    /// Print the option catalog before scanning
    #[arg(long)]
    show_options: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scanctl::telemetry::init_tracing(cli.json, level);
    info!(version = env!("CARGO_PKG_VERSION"), "scanctl starting");

    let profile = match &cli.profile {
        Some(path) => ScanProfile::load(path)
            .with_context(|| format!("failed to load profile {}", path.display()))?,
        None => ScanProfile::default(),
    };

    let context =
        AccessContext::init(SaneBackend::new()).context("failed to initialize device access")?;

    match cli.command {
        Some(Commands::Devices) => cmd_devices(&context),
        Some(Commands::Options { device }) => cmd_options(&context, &device),
        Some(Commands::Scan(args)) => cmd_scan(&context, &profile, args),
        None => cmd_scan(&context, &profile, ScanArgs::default()),
    }
}

fn cmd_devices(context: &AccessContext<SaneBackend>) -> Result<()> {
    let devices = context.devices().context("failed to list devices")?;
    if devices.is_empty() {
        println!("No available devices.");
    }
    for device in devices {
        println!(
            "Device {} is a {} {} {}",
            device.name, device.vendor, device.model, device.class
        );
    }
    Ok(())
}

fn cmd_options(context: &AccessContext<SaneBackend>, identifier: &str) -> Result<()> {
    let session = context
        .resolve(identifier)
        .with_context(|| format!("failed to open device {identifier}"))?;
    let options = OptionCatalog::read(&*session).context("failed to read options")?;
    catalog::write_catalog(&*session, &options, &mut io::stdout().lock())?;
    session.close();
    Ok(())
}

fn cmd_scan(
    context: &AccessContext<SaneBackend>,
    profile: &ScanProfile,
    args: ScanArgs,
) -> Result<()> {
    let request = build_request(profile, &args)?;
    let output = args
        .output
        .or_else(|| profile.output.clone())
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_OUTPUT));
    let device = args.device.or_else(|| profile.device.clone());

    let mut stdout = io::stdout().lock();
    let diagnostics: Option<&mut dyn io::Write> = if args.show_options || profile.show_options {
        Some(&mut stdout)
    } else {
        None
    };

    match device {
        Some(identifier) => {
            pipeline::scan(context, &identifier, &request, &output, diagnostics)
                .with_context(|| format!("scan from {identifier} failed"))?;
            println!("{}", output.display());
        }
        None => {
            let written = pipeline::scan_all(context, &request, &output, diagnostics)
                .context("scan failed")?;
            if written.is_empty() {
                println!("No available devices.");
            }
            for path in written {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

/// Profile entries, then `--set`, then `--auto`. Falls back to the reference
/// configuration when nothing is requested.
fn build_request(profile: &ScanProfile, args: &ScanArgs) -> Result<ConfigurationRequest> {
    let mut request = profile.request()?;
    for assignment in &args.set {
        request.push(config::parse_assignment(assignment)?);
    }
    request.extend(
        args.auto
            .iter()
            .map(|name| OptionRequest::new(name, Setting::Auto)),
    );

    if request.is_empty() {
        return Ok(ConfigurationRequest::reference());
    }
    Ok(request)
}
