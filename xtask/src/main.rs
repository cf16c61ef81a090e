//! Build automation tasks for the larvitdb workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for larvitdb")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all offline checks (format, lint, driver-less build, tests)
    Ci,
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy on every target
    Clippy,
    /// Check that the crates build without the MySQL backend
    NoDefault,
    /// Run the test suite against the mock driver
    Test {
        /// Only test this package
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run the ignored tests against a MySQL container (needs Docker)
    Integration {
        /// Only run tests whose name contains this
        filter: Option<String>,
    },
    /// Generate documentation
    Doc {
        /// Open the docs in a browser
        #[arg(long)]
        open: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            no_default(&sh)?;
            test(&sh, None)?;
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::NoDefault => no_default(&sh)?,
        Command::Test { package } => test(&sh, package.as_deref())?,
        Command::Integration { filter } => integration(&sh, filter.as_deref())?,
        Command::Doc { open } => doc(&sh, open)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let manifest = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;
    PathBuf::from(manifest.trim())
        .parent()
        .map(PathBuf::from)
        .context("failed to get workspace root")
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn no_default(sh: &Shell) -> Result<()> {
    println!("Checking build without the mysql feature...");
    cmd!(
        sh,
        "cargo check -p larvitdb-driver -p larvitdb --no-default-features"
    )
    .run()?;
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>) -> Result<()> {
    println!("Running tests...");
    match package {
        Some(package) => cmd!(sh, "cargo test -p {package}").run()?,
        None => cmd!(sh, "cargo test --workspace").run()?,
    }
    println!("All tests passed.");
    Ok(())
}

fn integration(sh: &Shell, filter: Option<&str>) -> Result<()> {
    println!("Running MySQL container tests...");
    cmd!(
        sh,
        "cargo test -p larvitdb --test mysql_live -- --ignored --test-threads=1 {filter...}"
    )
    .run()?;
    println!("Integration tests passed.");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("Generating documentation...");
    let open = open.then_some("--open");
    cmd!(sh, "cargo doc --workspace --no-deps {open...}").run()?;
    Ok(())
}
