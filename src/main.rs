use anyhow::{Result, bail};
use clap::Parser;
use envpull::config::Config;
use envpull::manager::{PackageManager, PullOutcome, Session};
use envpull::package::{PullSource, USAGE};
use envpull::plugin::PythonLoader;
use envpull::registry::{EnvRegistry, Registry};
use envpull::runtime::RealRuntime;
use envpull::scoreboard::{
    self, DEFAULT_BRANCH, EnvInfo, GitHubHosting, HostingApi, ensure_uploadable,
};
use log::warn;
use std::path::PathBuf;
use std::process::ExitCode;

/// envpull - pull user environments into an environment registry
///
/// Installs environment packages from GitHub with pip, registers the
/// environments they provide and remembers them across runs.
///
/// If the GITHUB_API_KEY environment variable is set, it will be used for
/// authentication against the GitHub API.
///
/// Examples:
///   envpull pull github.com/alice/envpack        # Install and register alice's environments
///   envpull pull github.com/alice/envpack@dev    # Same, from the dev branch
#[derive(Parser, Debug)]
#[command(author, version = env!("ENVPULL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package cache file (also via ENVPULL_CACHE)
    #[arg(long, env = "ENVPULL_CACHE", value_name = "PATH", global = true)]
    pub cache: Option<PathBuf>,

    /// pip executable (defaults to pip3)
    #[arg(long, env = "ENVPULL_PIP", value_name = "EXEC", global = true)]
    pub pip: Option<String>,

    /// Python interpreter that loads environment packages (defaults to python3)
    #[arg(long, env = "ENVPULL_PYTHON", value_name = "EXEC", global = true)]
    pub python: Option<String>,

    /// Package name of the host registry (defaults to gym)
    #[arg(
        long = "host-package",
        env = "ENVPULL_HOST_PACKAGE",
        value_name = "NAME",
        global = true
    )]
    pub host_package: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package from GitHub and register its environments
    Pull(PullArgs),

    /// Register the environments of every cached package
    Load,

    /// List registered user environments
    List,

    /// Show what would be recorded about an environment
    Info(InfoArgs),

    /// Resolve a branch, tag or commit to its full commit hash
    Commit(SourceArgs),

    /// Print a repository's .openai.yml, pinned to the commit of its branch
    EnvConfig(SourceArgs),
}

#[derive(clap::Args, Debug)]
pub struct PullArgs {
    /// The source in the format "github.com/username/repository[@branch]"
    #[arg(value_name = "SOURCE")]
    pub source: String,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    #[arg(value_name = "ENV_ID")]
    pub env_id: String,
}

#[derive(clap::Args, Debug)]
pub struct SourceArgs {
    /// The source in the format "github.com/username/repository[@branch]"
    #[arg(value_name = "SOURCE")]
    pub source: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;
    let config = Config::new(&runtime, cli.cache, cli.pip, cli.python, cli.host_package)?;

    match cli.command {
        Commands::Pull(args) => pull(&runtime, &config, &args.source),
        Commands::Load => {
            let (_, _, count) = load(&runtime, &config)?;
            println!("{} user environment(s) registered", count);
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => list(&runtime, &config),
        Commands::Info(args) => info(&runtime, &config, &args.env_id),
        Commands::Commit(args) => commit(&config, &args.source).await,
        Commands::EnvConfig(args) => env_config(&config, &args.source).await,
    }
}

fn load(runtime: &RealRuntime, config: &Config) -> Result<(Session, EnvRegistry, usize)> {
    let loader = PythonLoader::new(runtime, config.python.clone());
    let manager = PackageManager::new(runtime, &loader, config);
    let mut session = Session::new();
    let mut registry = EnvRegistry::new();
    let count = manager.load_user_envs(&mut session, &mut registry)?;
    Ok((session, registry, count))
}

fn pull(runtime: &RealRuntime, config: &Config, source: &str) -> Result<ExitCode> {
    // a malformed source must not touch the installer, not even to list packages
    if let Err(e) = source.parse::<PullSource>() {
        warn!("{}\n\n{}", e, USAGE);
        println!("{}", PullOutcome::InvalidSource(e.to_string()));
        return Ok(ExitCode::FAILURE);
    }

    let loader = PythonLoader::new(runtime, config.python.clone());
    let manager = PackageManager::new(runtime, &loader, config);
    let mut session = Session::new();
    let mut registry = EnvRegistry::new();
    manager.load_user_envs(&mut session, &mut registry)?;

    let outcome = manager.pull(&mut session, &mut registry, source)?;
    println!("{}", outcome);
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list(runtime: &RealRuntime, config: &Config) -> Result<ExitCode> {
    let (session, registry, _) = load(runtime, config)?;
    for id in registry.list() {
        let Some(binding) = session.bindings.binding(&id) else {
            continue;
        };
        let package = registry
            .spec(&id)
            .and_then(|spec| spec.package.as_deref())
            .unwrap_or(&binding.package_name);
        println!("{}\t{}\t{}", id, package, binding.source);
    }
    Ok(ExitCode::SUCCESS)
}

fn info(runtime: &RealRuntime, config: &Config, env_id: &str) -> Result<ExitCode> {
    let (_, registry, _) = load(runtime, config)?;
    let Some(spec) = registry.spec(env_id) else {
        bail!("Environment {} is not registered", env_id);
    };
    println!("{}", serde_json::to_string_pretty(&EnvInfo::from(spec))?);
    if let Err(e) = ensure_uploadable(env_id) {
        warn!("{}", e);
    }
    Ok(ExitCode::SUCCESS)
}

async fn commit(config: &Config, source: &str) -> Result<ExitCode> {
    let source: PullSource = source.parse()?;
    let hosting = GitHubHosting::new(config.http_client()?, &config.github);
    let reference = source.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
    match hosting
        .commit_hash(&source.owner, &source.repo, reference)
        .await?
    {
        Some(hash) => {
            println!("{}", hash);
            Ok(ExitCode::SUCCESS)
        }
        None => bail!("Could not find the reference '{}' in {}", reference, source),
    }
}

async fn env_config(config: &Config, source: &str) -> Result<ExitCode> {
    let source: PullSource = source.parse()?;
    let hosting = GitHubHosting::new(config.http_client()?, &config.github);
    let env_config = scoreboard::pinned_env_config(&hosting, &source).await?;
    println!("# {} at {}", env_config.id, env_config.commit);
    print!("{}", serde_yaml::to_string(&env_config.values)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_pull_parsing() {
        let cli = Cli::try_parse_from(["envpull", "pull", "github.com/alice/envpack@dev"]).unwrap();
        match cli.command {
            Commands::Pull(args) => {
                assert_eq!(args.source, "github.com/alice/envpack@dev");
            }
            _ => panic!("Expected Pull command"),
        }
    }

    #[test]
    fn test_cli_global_options_parsing() {
        let cli = Cli::try_parse_from([
            "envpull",
            "--cache",
            "/tmp/envs.json",
            "list",
            "--pip",
            "/opt/venv/bin/pip",
            "--host-package",
            "gymnasium",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.cache, Some(PathBuf::from("/tmp/envs.json")));
        assert_eq!(cli.pip.as_deref(), Some("/opt/venv/bin/pip"));
        assert_eq!(cli.host_package.as_deref(), Some("gymnasium"));
    }

    #[test]
    fn test_cli_env_config_parsing() {
        let cli = Cli::try_parse_from(["envpull", "env-config", "github.com/alice/envpack"]).unwrap();
        match cli.command {
            Commands::EnvConfig(args) => assert_eq!(args.source, "github.com/alice/envpack"),
            _ => panic!("Expected EnvConfig command"),
        }
    }

    #[test]
    fn test_cli_pull_requires_source() {
        assert!(Cli::try_parse_from(["envpull", "pull"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        let result = Cli::try_parse_from(["envpull", "github.com/alice/envpack"]);
        assert!(result.is_err());
    }
}
