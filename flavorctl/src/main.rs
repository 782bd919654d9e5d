//! flavorctl: ensure an OpenStack compute flavor is present or absent.
//!
//! Parameters are layered: OpenStack environment variables, then an optional
//! JSON args file, then command line flags. Later layers win. The result is
//! written to stdout as a single JSON object; logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flavorctl::params::{Scalar, parse_extra_spec};
use flavorctl::{ClientOptions, FlavorParams, ModuleResult, Outcome, RawParams};

/// Reconcile an OpenStack compute flavor
#[derive(Parser, Debug)]
#[command(name = "flavorctl", version, about)]
struct Args {
    /// JSON file with module parameters; flags override its values
    #[arg(long)]
    args_file: Option<PathBuf>,

    /// Identity user name [env: OS_USERNAME] [default: admin]
    #[arg(long)]
    login_username: Option<String>,

    /// Identity password [env: OS_PASSWORD]
    #[arg(long)]
    login_password: Option<String>,

    /// Tenant (project) to scope the token to [env: OS_TENANT_NAME, OS_PROJECT_NAME]
    #[arg(long)]
    login_tenant_name: Option<String>,

    /// Identity endpoint [env: OS_AUTH_URL] [default: http://127.0.0.1:35357/v2.0/]
    #[arg(long)]
    auth_url: Option<String>,

    /// Region of the compute endpoint [env: OS_REGION_NAME]
    #[arg(long)]
    region_name: Option<String>,

    /// Flavor name
    #[arg(long)]
    name: Option<String>,

    /// RAM in MB
    #[arg(long)]
    ram: Option<String>,

    /// Number of vCPUs
    #[arg(long)]
    vcpus: Option<String>,

    /// Root disk size in GB
    #[arg(long)]
    root: Option<String>,

    /// Ephemeral disk size in GB [default: 0]
    #[arg(long)]
    ephemeral: Option<String>,

    /// Swap in MB [default: 0]
    #[arg(long)]
    swap: Option<String>,

    /// Flavor id (assigned by the compute service if omitted)
    #[arg(long)]
    id: Option<String>,

    /// Whether the flavor is public [default: true]
    #[arg(long)]
    is_public: Option<String>,

    /// Extra spec as KEY=VALUE (repeatable)
    #[arg(long = "extra-spec", value_name = "KEY=VALUE")]
    extra_specs: Vec<String>,

    /// present or absent [default: present]
    #[arg(long)]
    state: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,
}

impl Args {
    /// Parameters given on the command line.
    fn flags(&self) -> Result<RawParams> {
        let extra_specs = if self.extra_specs.is_empty() {
            None
        } else {
            let mut specs = BTreeMap::new();
            for spec in &self.extra_specs {
                let (key, value) = parse_extra_spec(spec)?;
                specs.insert(key, Scalar::Str(value));
            }
            Some(specs)
        };

        let scalar = |value: &Option<String>| value.as_deref().map(Scalar::from);

        Ok(RawParams {
            login_username: self.login_username.clone(),
            login_password: self.login_password.clone(),
            login_tenant_name: self.login_tenant_name.clone(),
            auth_url: self.auth_url.clone(),
            region_name: self.region_name.clone(),
            name: self.name.clone(),
            ram: scalar(&self.ram),
            vcpus: scalar(&self.vcpus),
            root: scalar(&self.root),
            ephemeral: scalar(&self.ephemeral),
            swap: scalar(&self.swap),
            id: scalar(&self.id),
            is_public: scalar(&self.is_public),
            extra_specs,
            state: self.state.clone(),
        })
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout),
            insecure: self.insecure,
        }
    }
}

/// Credentials from the conventional OpenStack environment variables. Empty
/// values count as unset.
fn env_params(lookup: impl Fn(&str) -> Option<String>) -> RawParams {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
    RawParams {
        login_username: var("OS_USERNAME"),
        login_password: var("OS_PASSWORD"),
        login_tenant_name: var("OS_TENANT_NAME").or_else(|| var("OS_PROJECT_NAME")),
        auth_url: var("OS_AUTH_URL"),
        region_name: var("OS_REGION_NAME"),
        ..Default::default()
    }
}

fn read_args_file(path: &Path) -> Result<RawParams> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read args file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse args file {}", path.display()))
}

/// Layer environment, args file and flags, then validate.
fn load_params(args: &Args, env: RawParams) -> Result<FlavorParams> {
    let file = match &args.args_file {
        Some(path) => {
            debug!("Loading parameters from {}", path.display());
            read_args_file(path)?
        }
        None => RawParams::default(),
    };

    Ok(env.merge(file).merge(args.flags()?).validate()?)
}

async fn execute(args: &Args, env: RawParams) -> Result<Outcome> {
    let params = load_params(args, env)?;
    info!(
        "Ensuring flavor {} is {}",
        params.desired.name(),
        params.desired.state().as_str()
    );

    let outcome = flavorctl::run(&params, &args.client_options()).await?;
    Ok(outcome)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the JSON result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flavorctl=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let env = env_params(|key| std::env::var(key).ok());

    let result = report(execute(&args, env).await);
    println!("{}", result.to_json());
    result.exit_code()
}

fn report(result: Result<Outcome>) -> ModuleResult {
    match result {
        Ok(outcome) => {
            info!(
                "Flavor {}: {}",
                outcome.name,
                if outcome.changed { "changed" } else { "unchanged" }
            );
            ModuleResult::success(outcome)
        }
        Err(e) => {
            error!("{:#}", e);
            ModuleResult::failure(format!("{:#}", e))
        }
    }
}
