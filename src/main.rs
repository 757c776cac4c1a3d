//! codesign-scan CLI
//!
//! Entry point for the `codesign-scan` command-line tool.

use clap::{Parser, Subcommand};
use codesign_scan::build::{BuildRequest, XcodebuildRunner};
use codesign_scan::cancel::{install_signal_handler, CancelToken};
use codesign_scan::config::{ConfigLayer, ScanConfig};
use codesign_scan::identity::SecurityIdentitySource;
use codesign_scan::pipeline::{prepare_output_dir, ScanPipeline};
use codesign_scan::profiles::{DirectoryProfileSource, ProfileIndex};
use codesign_scan::resolve::IdentityStatus;
use codesign_scan::summary::{ExitCode, ScanReport};
use codesign_scan::ScanError;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codesign-scan")]
#[command(about = "Collect the code signing files an Xcode archive uses", version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive an Xcode project and export the provisioning profiles it uses
    Xcode {
        /// Path to the .xcodeproj or .xcworkspace
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Scheme to archive
        #[arg(long, short = 's')]
        scheme: String,

        /// Build configuration (e.g. Release)
        #[arg(long)]
        configuration: Option<String>,

        /// Export directory (default: ./codesigndoc_exports)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,

        /// Directory holding installed provisioning profiles
        #[arg(long)]
        profiles_dir: Option<PathBuf>,

        /// Abort the build after this many seconds
        #[arg(long)]
        timeout_seconds: Option<u64>,

        /// Path to the xcodebuild binary
        #[arg(long)]
        xcodebuild: Option<PathBuf>,

        /// Exit with status 2 when a referenced profile is not installed
        #[arg(long)]
        fail_on_unmatched: bool,

        /// Skip the keychain identity lookup
        #[arg(long)]
        no_identity_check: bool,

        /// Path to config file (default: .codesign-scan.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print the scan report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the schemes of a project or workspace
    Schemes {
        /// Path to the .xcodeproj or .xcworkspace
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Path to config file (default: .codesign-scan.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List installed provisioning profiles
    Profiles {
        /// Directory holding installed provisioning profiles
        #[arg(long)]
        profiles_dir: Option<PathBuf>,

        /// Path to config file (default: .codesign-scan.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Xcode {
            file,
            scheme,
            configuration,
            output_dir,
            profiles_dir,
            timeout_seconds,
            xcodebuild,
            fail_on_unmatched,
            no_identity_check,
            config,
            json,
        } => {
            let layer = ConfigLayer {
                xcodebuild,
                profiles_dir,
                output_dir,
                timeout_seconds,
                configuration,
                extra_args: None,
                fail_on_unmatched: fail_on_unmatched.then_some(true),
            };
            run_xcode(file, scheme, layer, config, !no_identity_check, json)
        }
        Commands::Schemes { file, config, json } => run_schemes(file, config, json),
        Commands::Profiles {
            profiles_dir,
            config,
            json,
        } => run_profiles(profiles_dir, config, json),
    };

    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(config_path: Option<PathBuf>, layer: ConfigLayer) -> Result<ScanConfig, i32> {
    ScanConfig::load(config_path.as_deref(), layer).map_err(|e| {
        eprintln!("Error loading config: {}", e);
        ExitCode::Config.as_i32()
    })
}

fn runner_for(config: &ScanConfig) -> XcodebuildRunner {
    XcodebuildRunner::new(&config.xcodebuild)
        .with_configuration(config.configuration.clone())
        .with_extra_args(config.extra_args.clone())
        .with_timeout(config.timeout())
}

fn run_xcode(
    file: PathBuf,
    scheme: String,
    layer: ConfigLayer,
    config_path: Option<PathBuf>,
    check_identity: bool,
    json: bool,
) -> i32 {
    let config = match load_config(config_path, layer) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let request = match BuildRequest::new(file, scheme) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::Config.as_i32();
        }
    };

    let cancel = CancelToken::new();
    if let Err(e) = install_signal_handler(&cancel) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }

    let output_dir = match prepare_output_dir(&config.output_dir) {
        Ok(dir) => dir,
        Err(e) => return report_error(&e),
    };

    let runner = runner_for(&config);
    let profiles = DirectoryProfileSource::new(&config.profiles_dir);
    let identities = SecurityIdentitySource::default();

    let mut pipeline =
        ScanPipeline::new(&runner, &profiles).fail_on_unmatched(config.fail_on_unmatched);
    if check_identity {
        pipeline = pipeline.with_identities(&identities);
    }

    match pipeline.run(&request, &output_dir, &cancel) {
        Ok(outcome) => {
            if json {
                print_json(&outcome.report);
            } else {
                print_human(&outcome.report, &output_dir);
            }
            outcome.report.exit_code
        }
        Err(e) => report_error(&e),
    }
}

fn report_error(err: &ScanError) -> i32 {
    eprintln!("Error: {}", err);
    if let Some(path) = err.transcript_path() {
        eprintln!("Build output saved to {}", path.display());
    }
    err.exit_code().as_i32()
}

fn print_json(report: &ScanReport) {
    match report.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

fn print_human(report: &ScanReport, output_dir: &std::path::Path) {
    if let Some(settings) = &report.settings {
        println!(
            "Team:      {}",
            settings.team_identifier.as_deref().unwrap_or("-")
        );
        println!(
            "Identity:  {}",
            settings.signing_identity_name.as_deref().unwrap_or("-")
        );
    }
    match &report.identity {
        Some(IdentityStatus::Installed { identity }) => {
            println!("           installed ({})", identity.sha1)
        }
        Some(IdentityStatus::Missing { .. }) => println!("           NOT installed in keychain"),
        Some(IdentityStatus::Unknown { reason, .. }) => println!("           not checked: {}", reason),
        Some(IdentityStatus::NotReported) | None => {}
    }

    println!();
    println!("Exported profiles:");
    if report.exported.is_empty() {
        println!("  (none)");
    }
    for file in &report.exported {
        println!("  {} -> {}", file.logical_name, file.destination_path.display());
    }

    if !report.unmatched_refs.is_empty() {
        println!();
        println!("Not installed locally:");
        for r in &report.unmatched_refs {
            println!("  {} (target {})", r.profile_identifier, r.target_name);
        }
    }

    if !report.copy_errors.is_empty() {
        println!();
        println!("Copy errors:");
        for e in &report.copy_errors {
            println!("  {}", e);
        }
    }

    println!();
    println!("{}", report.human_summary);
    println!("Output: {}", output_dir.display());
}

fn run_schemes(file: PathBuf, config_path: Option<PathBuf>, json: bool) -> i32 {
    let config = match load_config(config_path, ConfigLayer::default()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let cancel = CancelToken::new();
    if let Err(e) = install_signal_handler(&cancel) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }

    match runner_for(&config).list_schemes(&file, &cancel) {
        Ok(schemes) => {
            if json {
                match serde_json::to_string_pretty(&schemes) {
                    Ok(s) => println!("{}", s),
                    Err(e) => eprintln!("Error serializing schemes: {}", e),
                }
            } else if schemes.is_empty() {
                println!("No schemes found in {}", file.display());
            } else {
                for scheme in schemes {
                    println!("{}", scheme);
                }
            }
            ExitCode::Success.as_i32()
        }
        Err(e) => {
            eprintln!("Error listing schemes: {}", e);
            ExitCode::BuildFailed.as_i32()
        }
    }
}

fn run_profiles(profiles_dir: Option<PathBuf>, config_path: Option<PathBuf>, json: bool) -> i32 {
    let layer = ConfigLayer {
        profiles_dir,
        ..ConfigLayer::default()
    };
    let config = match load_config(config_path, layer) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let source = DirectoryProfileSource::new(&config.profiles_dir);
    let index = match ProfileIndex::scan(&source) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::ProfileSource.as_i32();
        }
    };

    if json {
        match serde_json::to_string_pretty(index.descriptors()) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing profiles: {}", e),
        }
        return ExitCode::Success.as_i32();
    }

    let now = chrono::Utc::now();
    println!("Profiles in {}:", config.profiles_dir.display());
    for p in index.descriptors() {
        let expired = if p.is_expired(now) { " [expired]" } else { "" };
        println!(
            "  {}  {}  team={}{}",
            p.uuid,
            p.name,
            p.team_identifier.as_deref().unwrap_or("-"),
            expired
        );
    }
    for w in index.warnings() {
        println!("  skipped: {}", w);
    }
    ExitCode::Success.as_i32()
}
