mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use package_health::{Credential, HealthConfig, HealthPipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "package-health")]
#[command(author, version, about = "Profiles the third-party packages a Python project depends on", long_about = None)]
struct Cli {
    /// TOML configuration file; flags below override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory of `*.py` files to scan for imports (repeatable)
    #[arg(long = "source-dir", value_name = "DIR")]
    source_dirs: Vec<PathBuf>,

    /// Conda environment manifest (repeatable)
    #[arg(long = "manifest", value_name = "PATH")]
    manifests: Vec<PathBuf>,

    /// Captured `pip list` output
    #[arg(long, value_name = "PATH")]
    pip_list: Option<PathBuf>,

    /// Captured `conda list` output
    #[arg(long, value_name = "PATH")]
    conda_list: Option<PathBuf>,

    /// Output document path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Maximum packages enriched at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Only count lines starting with `import`/`from` as imports
    #[arg(long)]
    strict_imports: bool,

    /// Drop imports found in neither installed listing
    #[arg(long)]
    skip_unlisted: bool,

    /// Dotenv file holding the hosting credential (default ~/.env)
    #[arg(long, value_name = "PATH")]
    secrets: Option<PathBuf>,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> Result<HealthConfig> {
        let mut config = match &self.config {
            Some(path) => HealthConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HealthConfig::default(),
        };

        config.source_dirs.extend(self.source_dirs);
        config.manifest_paths.extend(self.manifests);
        if self.pip_list.is_some() {
            config.pip_list_path = self.pip_list;
        }
        if self.conda_list.is_some() {
            config.conda_list_path = self.conda_list;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.secrets.is_some() {
            config.secrets_path = self.secrets;
        }
        config.strict_imports |= self.strict_imports;
        config.skip_unlisted_imports |= self.skip_unlisted;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let config = cli.into_config()?;
    info!(
        sources = config.source_dirs.len(),
        manifests = config.manifest_paths.len(),
        "Configuration loaded"
    );

    let credential = Credential::load(config.secrets_path.as_deref());
    let pipeline =
        HealthPipeline::from_config(&config, credential).context("building pipeline")?;
    let outcome = pipeline.execute().await.context("writing package health report")?;

    let stats = &outcome.stats;
    println!(
        "{} conda and {} pip packages profiled ({} failed lookups) -> {}",
        stats.primary_packages,
        stats.secondary_packages,
        stats.failed_sub_records,
        outcome.output_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "package-health",
            "--source-dir",
            "input_py",
            "--source-dir",
            "more_py",
            "--manifest",
            "env.yml",
            "--output",
            "out.json",
            "--concurrency",
            "8",
            "--strict-imports",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);

        let config = cli.into_config().unwrap();
        assert_eq!(config.source_dirs.len(), 2);
        assert_eq!(config.manifest_paths, vec![PathBuf::from("env.yml")]);
        assert_eq!(config.output_path, PathBuf::from("out.json"));
        assert_eq!(config.concurrency, 8);
        assert!(config.strict_imports);
        assert!(!config.skip_unlisted_imports);
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.toml");
        std::fs::write(&path, "concurrency = 2\noutput_path = \"from_file.json\"\n").unwrap();

        let cli = Cli::parse_from([
            "package-health",
            "--config",
            path.to_str().unwrap(),
            "--concurrency",
            "6",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.output_path, PathBuf::from("from_file.json"));
    }
}
