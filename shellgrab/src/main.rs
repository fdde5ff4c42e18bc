//! `shellgrab` command-line entry point.
//!
//! ```bash
//! shellgrab -f hosts.txt -c commands.txt -u admin --threads 16 -v
//! ```
//!
//! Exit status: 0 when every host succeeded, 2 when any host failed, 1 when
//! the run could not start.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::info;
use secrecy::SecretString;

use shellgrab::channel::MatchMode;
use shellgrab::driver::RunContext;
use shellgrab::inventory::{read_command_list, read_host_list};
use shellgrab::output::{ErrorLog, FsSink};
use shellgrab::transport::{AuthMethod, HostKeyVerification, SshConfig, SshConnector};
use shellgrab::{SessionSettings, Verbosity, WorkerPool};

/// Capture configs and command output from many network devices over SSH.
#[derive(Parser, Debug)]
#[command(name = "shellgrab", version, about)]
struct Cli {
    /// File with one host per line
    #[arg(short = 'f', long = "file")]
    hosts: PathBuf,

    /// File with one command per line
    #[arg(short = 'c', long = "commands")]
    commands: PathBuf,

    /// Report per-host progress
    #[arg(short, long)]
    verbose: bool,

    /// Seconds to wait for each prompt [default: 10]
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum number of hosts worked on at once
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..))]
    threads: u64,

    /// Login user (prompted for when omitted)
    #[arg(short, long)]
    user: Option<String>,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    port: u16,

    /// Private key to authenticate with instead of a password
    #[arg(short, long)]
    identity: Option<PathBuf>,

    /// Directory for configuration snapshots
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Directory for session transcripts and the error log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Host key policy
    #[arg(long, value_enum, default_value_t = HostKeyMode::Off)]
    host_key_checking: HostKeyMode,

    /// known_hosts file for `strict` and `accept-new`
    #[arg(long)]
    known_hosts: Option<PathBuf>,

    /// JSON file overriding session settings
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Append diagnostics to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Treat a prompt marker anywhere in the output as the prompt
    #[arg(long)]
    legacy_prompt_matching: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum HostKeyMode {
    Strict,
    AcceptNew,
    Off,
}

impl From<HostKeyMode> for HostKeyVerification {
    fn from(mode: HostKeyMode) -> Self {
        match mode {
            HostKeyMode::Strict => HostKeyVerification::Strict,
            HostKeyMode::AcceptNew => HostKeyVerification::AcceptNew,
            HostKeyMode::Off => HostKeyVerification::Disabled,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::new(cli.verbose);

    if let Err(e) = init_logging(verbosity, cli.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        return ExitCode::from(1);
    }

    match run(cli, verbosity).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbosity: Verbosity, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.default_filter()));
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Run every host; `Ok(false)` means at least one host failed.
async fn run(cli: Cli, verbosity: Verbosity) -> anyhow::Result<bool> {
    let hosts = read_host_list(&cli.hosts)?;
    let commands = read_command_list(&cli.commands)?;
    let settings = session_settings(&cli)?;

    let username = match &cli.user {
        Some(user) => user.clone(),
        None => prompt_line("Username: ")?,
    };

    let (auth, login_password) = match &cli.identity {
        Some(path) => {
            let passphrase = rpassword::prompt_password("Key passphrase (blank for none): ")?;
            let passphrase = (!passphrase.is_empty()).then(|| SecretString::from(passphrase));
            (
                AuthMethod::PrivateKey {
                    path: path.clone(),
                    passphrase,
                },
                None,
            )
        }
        None => {
            let password = rpassword::prompt_password("Password: ")?;
            (AuthMethod::Password(SecretString::from(password.clone())), Some(password))
        }
    };
    let enable = if login_password.is_some() {
        rpassword::prompt_password("Enable password (blank to reuse login password): ")?
    } else {
        rpassword::prompt_password("Enable password: ")?
    };
    let enable_secret = resolve_enable_secret(enable, login_password)?;

    let mut ssh = SshConfig::new(username, auth);
    ssh.port = cli.port;
    ssh.timeout = settings.timeout;
    ssh.host_key_verification = cli.host_key_checking.into();
    ssh.known_hosts_path = cli.known_hosts.clone();

    let sink = Arc::new(FsSink::new(&cli.config_dir, &cli.log_dir));
    sink.prepare().await.context("creating output directories")?;
    let error_log = Arc::new(ErrorLog::new(cli.log_dir.join("errors.log")));

    let ctx = RunContext::new(SshConnector::new(ssh), sink, commands, settings, enable_secret)?
        .with_error_log(error_log)
        .with_verbosity(verbosity);

    let pool = WorkerPool::new(usize::try_from(cli.threads).unwrap_or(usize::MAX));
    info!(
        "Working on {} host(s), up to {} at a time",
        hosts.len(),
        pool.concurrency()
    );
    let report = pool.run_hosts(&hosts, &ctx).await;
    println!("{report}");

    if let Some(path) = &cli.report {
        let json = report.to_json().context("serializing report")?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(report.all_succeeded())
}

/// Defaults, then the settings file, then explicit flags.
fn session_settings(cli: &Cli) -> anyhow::Result<SessionSettings> {
    let mut settings = SessionSettings::default();
    if let Some(path) = &cli.settings {
        settings = settings.load_overrides(path)?;
    }
    if let Some(secs) = cli.timeout {
        settings = settings.with_timeout(Duration::from_secs(secs));
    }
    if cli.legacy_prompt_matching {
        settings = settings.with_match_mode(MatchMode::Anywhere);
    }
    settings.validate()?;
    Ok(settings)
}

/// The enable answer, or the login password when the answer is blank.
///
/// Key authentication has no login password to fall back to, so a blank
/// answer is refused rather than sending an empty secret.
fn resolve_enable_secret(answer: String, login_password: Option<String>) -> anyhow::Result<SecretString> {
    match (answer.is_empty(), login_password) {
        (false, _) => Ok(SecretString::from(answer)),
        (true, Some(password)) => Ok(SecretString::from(password)),
        (true, None) => anyhow::bail!("an enable password is required with --identity"),
    }
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim().to_string();
    anyhow::ensure!(!line.is_empty(), "a username is required");
    Ok(line)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_blank_enable_reuses_login_password() {
        let secret = resolve_enable_secret(String::new(), Some("login-pw".to_string())).unwrap();
        assert_eq!(secret.expose_secret(), "login-pw");

        let secret = resolve_enable_secret("enable-pw".to_string(), Some("login-pw".to_string())).unwrap();
        assert_eq!(secret.expose_secret(), "enable-pw");
    }

    #[test]
    fn test_key_auth_requires_enable_password() {
        let err = resolve_enable_secret(String::new(), None).unwrap_err();
        assert!(err.to_string().contains("--identity"));

        let secret = resolve_enable_secret("enable-pw".to_string(), None).unwrap();
        assert_eq!(secret.expose_secret(), "enable-pw");
    }
}
