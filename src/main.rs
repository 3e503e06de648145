use clap::Parser;
use isopkg::commands;
use isopkg::config::Config;
use isopkg::error::InstallError;
use std::path::PathBuf;
use std::process::ExitCode;

/// isopkg - isolated package installer
///
/// Install a package described by a TOML descriptor into its own environment,
/// expose its entry points as symlinks and verify that it runs.
///
/// Examples:
///   isopkg install demo.toml     # Fetch, verify, build, link and smoke test
///   isopkg test demo             # Re-run the smoke test
///   isopkg uninstall demo --yes  # Remove links and environment
#[derive(Parser, Debug)]
#[command(author, version = env!("ISOPKG_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via ISOPKG_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "ISOPKG_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Directory receiving entry point symlinks (defaults to <root>/bin)
    #[arg(
        long = "bin-dir",
        short = 'b',
        env = "ISOPKG_BIN_DIR",
        value_name = "PATH",
        global = true
    )]
    pub bin_dir: Option<PathBuf>,

    /// Upper bound in seconds for fetching an archive, retries included
    #[arg(
        long = "fetch-timeout",
        env = "ISOPKG_FETCH_TIMEOUT",
        value_name = "SECS",
        global = true
    )]
    pub fetch_timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package from a descriptor file
    Install(InstallArgs),

    /// Re-run the smoke test of an installed package
    Test(TestArgs),

    /// Remove an installed package and its links
    Uninstall(UninstallArgs),

    /// List installed packages
    List,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Path to the package descriptor (TOML)
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: PathBuf,

    /// Reinstall even if the same version is already installed
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct TestArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {}", e.stage(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), InstallError> {
    let runtime = isopkg::runtime::RealRuntime;
    let config = Config::resolve(&runtime, cli.install_root, cli.bin_dir, cli.fetch_timeout)?;
    let installer = commands::default_installer(runtime, config)?;

    match cli.command {
        Commands::Install(args) => {
            commands::install(&installer, &args.descriptor, args.force).await
        }
        Commands::Test(args) => commands::test(&installer, &args.name),
        Commands::Uninstall(args) => commands::uninstall(&installer, &args.name, args.yes),
        Commands::List => commands::list(&installer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from(["isopkg", "install", "demo.toml", "--force"]).unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.descriptor, PathBuf::from("demo.toml"));
                assert!(args.force);
            }
            _ => panic!("Expected Install command"),
        }
        assert_eq!(cli.install_root, None);
    }

    #[test]
    fn test_cli_uninstall_parsing() {
        let cli = Cli::try_parse_from(["isopkg", "uninstall", "demo", "-y"]).unwrap();
        match cli.command {
            Commands::Uninstall(args) => {
                assert_eq!(args.name, "demo");
                assert!(args.yes);
            }
            _ => panic!("Expected Uninstall command"),
        }
    }

    #[test]
    fn test_cli_global_options_parsing() {
        let cli = Cli::try_parse_from([
            "isopkg",
            "--root",
            "/tmp/root",
            "list",
            "--bin-dir",
            "/tmp/bin",
            "--fetch-timeout",
            "30",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.install_root, Some(PathBuf::from("/tmp/root")));
        assert_eq!(cli.bin_dir, Some(PathBuf::from("/tmp/bin")));
        assert_eq!(cli.fetch_timeout, Some(30));
    }

    #[test]
    fn test_cli_test_requires_name() {
        assert!(Cli::try_parse_from(["isopkg", "test"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["isopkg", "demo.toml"]).is_err());
    }
}
