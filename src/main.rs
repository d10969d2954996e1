// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use crtforge::{
    parse_cert_file, provision, resolve_base_dir, Artifact, ArtifactKind, ArtifactStore, Config,
    Error, HostPlatform, ProvisionReport, ProvisionRequest, Result, TrustOutcome,
    CONFIG_FILE_NAME, DEFAULT_INTERMEDIATE_CA_NAME, DEFAULT_ROOT_CA_NAME,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Set to any non-empty value when running inside a container image.
const IN_CONTAINER_ENV: &str = "CRTFORGE_IN_CONTAINER";

/// Password source for --pfx when --pfx-password is not given.
const PFX_PASSWORD_ENV: &str = "CRTFORGE_PFX_PASSWORD";

// ============================================================================
// CLI definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "crtforge")]
#[command(about = "Local root, intermediate and leaf certificates for development HTTPS")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    crtforge web app.test                          # Leaf for app.test under the default CAs
    crtforge api api.test 127.0.0.1 --trust        # Also trust the root CA (needs sudo)
    crtforge web app.test --pfx                    # Also export web.pfx
    crtforge web app.test --root-ca Acme -o ./certs

Artifacts are never overwritten. Delete a file to have it regenerated.")]
struct Cli {
    /// Application name; names the leaf directory and files
    app_name: String,

    /// DNS names or IP addresses; the first becomes the common name
    #[arg(required = true, num_args = 1..)]
    domains: Vec<String>,

    /// Root CA to create or reuse
    #[arg(long = "root-ca", value_name = "NAME", default_value = DEFAULT_ROOT_CA_NAME)]
    root_ca: String,

    /// Intermediate CA to create or reuse
    #[arg(long = "intermediate-ca", value_name = "NAME", default_value = DEFAULT_INTERMEDIATE_CA_NAME)]
    intermediate_ca: String,

    /// Install the root CA into the system trust store
    #[arg(long)]
    trust: bool,

    /// Export a password-protected PKCS#12 bundle
    #[arg(long)]
    pfx: bool,

    /// PKCS#12 password (prefer CRTFORGE_PFX_PASSWORD or the prompt)
    #[arg(long, value_name = "PASSWORD", requires = "pfx")]
    pfx_password: Option<String>,

    /// Base directory for all CA trees
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Show every create/skip decision
    #[arg(long)]
    debug: bool,

    /// Suppress non-essential output
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,
}

// ============================================================================
// Output
// ============================================================================

/// Output helper that respects --quiet and container path hints.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    in_container: bool,
}

impl Output {
    fn new(quiet: bool, in_container: bool) -> Self {
        Self {
            quiet,
            in_container,
        }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    fn path(&self, path: &Path) -> String {
        if self.in_container {
            format!("{} (container path)", path.display())
        } else {
            path.display().to_string()
        }
    }
}

fn warn_user(error: &Error) {
    eprintln!("Warning: {}", error);
    if let Some(hint) = error.remediation() {
        eprintln!("  {}", hint);
    }
}

/// ", expires YYYY-MM-DD (N days)" for certificate artifacts.
fn expiry_note(artifact: &Artifact) -> String {
    match artifact.kind {
        ArtifactKind::RootCert | ArtifactKind::IntermediateCert | ArtifactKind::LeafCert => {
            match parse_cert_file(&artifact.path) {
                Ok(info) => format!(
                    ", expires {} ({} days)",
                    info.expiry_string(),
                    info.days_remaining()
                ),
                Err(e) => {
                    debug!(path = %artifact.path.display(), "expiry unavailable: {}", e);
                    String::new()
                }
            }
        }
        _ => String::new(),
    }
}

fn print_report(out: Output, base: &Path, report: &ProvisionReport) {
    for artifact in &report.artifacts {
        out.print(&format!(
            "{:<28} {} ({}{})",
            artifact.kind,
            out.path(&artifact.path),
            artifact.outcome,
            expiry_note(artifact)
        ));
    }

    match &report.trust {
        Some(TrustOutcome::Installed(target)) => {
            out.print(&format!("Root CA trusted via {}", out.path(target)))
        }
        Some(TrustOutcome::AlreadyTrusted) => out.print("Root CA already trusted"),
        None => {}
    }

    if out.in_container {
        out.print(&format!(
            "\nPaths above are inside the container. Reach them through the volume mounted at {}.",
            base.display()
        ));
    }

    for warning in &report.warnings {
        warn_user(warning);
    }
}

// ============================================================================
// Entry point
// ============================================================================

fn init_logging(debug: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,crtforge={}", level)));

    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        // Plain messages only
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .without_time()
            .with_level(false)
            .with_target(false)
            .init();
    }
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    // This prevents "broken pipe" panics when output is piped to tools like grep/head
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        if !e.is_fatal() {
            warn_user(&e);
            return;
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    let in_container = std::env::var(IN_CONTAINER_ENV)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    let out = Output::new(cli.quiet, in_container);

    let base = resolve_base_dir(cli.output.as_deref())?;
    debug!(base = %base.display(), "resolved base directory");
    let config = Config::load(&base.join(CONFIG_FILE_NAME))?;

    // A missing password skips the bundle, like any other export failure
    let mut password_warning = None;
    let pfx_password = if cli.pfx {
        match get_password(cli.pfx_password, PFX_PASSWORD_ENV, "Enter PKCS#12 password: ") {
            Ok(pwd) => Some(pwd),
            Err(e) => {
                password_warning = Some(e);
                None
            }
        }
    } else {
        None
    };

    let request = ProvisionRequest {
        root_ca_name: cli.root_ca,
        intermediate_ca_name: cli.intermediate_ca,
        app_name: cli.app_name,
        domains: cli.domains,
        trust: cli.trust.then(HostPlatform::current),
        pfx_password,
    };

    let store = ArtifactStore::new(&base);
    let mut report = provision(&store, &config, &request)?;
    report.warnings.extend(password_warning);
    print_report(out, &base, &report);
    Ok(())
}

/// Get password from command line argument, environment variable, or prompt
fn get_password(arg: Option<String>, env_var: &str, prompt: &str) -> Result<String> {
    // First check command line argument
    if let Some(pwd) = arg {
        if pwd.is_empty() {
            return Err(Error::Encoding("PKCS#12 password cannot be empty".to_string()));
        }
        eprintln!(
            "Warning: Password provided via command line is visible in process list.\n\
             Consider using {} env var or interactive prompt instead.",
            env_var
        );
        return Ok(pwd);
    }

    // Then check environment variable
    if let Ok(pwd) = std::env::var(env_var) {
        if pwd.is_empty() {
            return Err(Error::Encoding(format!(
                "{} is set but empty. PKCS#12 password cannot be empty.",
                env_var
            )));
        }
        return Ok(pwd);
    }

    // Finally prompt the user
    let pwd = rpassword::prompt_password(prompt)
        .map_err(|e| Error::Encoding(format!("Failed to read PKCS#12 password: {}", e)))?;

    if pwd.is_empty() {
        return Err(Error::Encoding("PKCS#12 password cannot be empty".to_string()));
    }

    Ok(pwd)
}
