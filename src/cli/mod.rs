use crate::config::Config;
use crate::core::{BlockingResolver, CacheError, ResolutionCache, Resolver};
use crate::trigger::TriggerMatcher;
use crate::utils::{is_file_locked, retry_with_backoff};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "embedcard")]
#[command(about = "Resolve URLs into oEmbed / Open Graph embed cards")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true, default_value = "embedcard.toml")]
    pub config: PathBuf,

    /// Cache snapshot file, overrides the config
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// oEmbed provider catalogue URL, overrides the config
    #[arg(long, global = true)]
    pub providers_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve URLs and print their embed markup
    Resolve {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },
    /// Replace [embed:"<url>"] triggers in text files
    Expand {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let mut config = Config::load(Some(self.config.as_path()))?;
        if let Some(cache) = &self.cache {
            config.cache_path = Some(cache.clone());
        }
        if let Some(url) = &self.providers_url {
            config.provider_catalog_url = url.clone();
        }

        let cache = Arc::new(ResolutionCache::new());
        if let Some(path) = &config.cache_path {
            if let Err(e) = cache.load_snapshot(path) {
                warn!("Ignoring cache snapshot {}: {}", path.display(), e);
            }
        }

        let resolver = Arc::new(
            Resolver::from_config(&config, cache.clone()).context("Failed to create HTTP client")?,
        );

        match &self.command {
            Command::Resolve { urls } => {
                let results = join_all(urls.iter().map(|url| resolver.resolve(url))).await;
                for (url, html) in urls.iter().zip(results) {
                    println!("{}\n{}\n", url, html);
                }
            }
            Command::Expand { files, out_dir } => {
                expand_files(&config, resolver.clone(), files, out_dir).await?;
            }
        }

        if let Some(path) = &config.cache_path {
            save_snapshot(&config, &cache, path).await?;
        }

        Ok(())
    }
}

/// Maps each input to its file in `out_dir`, refusing inputs that would land on the
/// same output file.
fn output_paths(files: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    let mut targets = Vec::with_capacity(files.len());

    for path in files {
        let file_name = path
            .file_name()
            .with_context(|| format!("Not a file: {}", path.display()))?;
        let target = out_dir.join(file_name);

        if let Some(previous) = seen.insert(target.clone(), path) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                path.display(),
                target.display()
            );
        }
        targets.push(target);
    }

    Ok(targets)
}

/// Expands every file on its own blocking worker; resolution inside a document is synchronous.
async fn expand_files(
    config: &Config,
    resolver: Arc<Resolver>,
    files: &[PathBuf],
    out_dir: &Path,
) -> Result<()> {
    let targets = output_paths(files, out_dir)?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let blocking = BlockingResolver::new(resolver, Handle::current());
    let tasks = files.iter().cloned().map(|path| {
        let blocking = blocking.clone();
        tokio::task::spawn_blocking(move || -> Result<(PathBuf, String)> {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let expanded = TriggerMatcher::new(blocking).expand(&text);
            Ok((path, expanded))
        })
    });

    let delay = Duration::from_millis(config.write_retry_delay);
    for (joined, target) in join_all(tasks).await.into_iter().zip(targets) {
        let (path, expanded) = joined??;

        retry_with_backoff(config.write_retries, delay, is_file_locked, || {
            tokio::fs::write(&target, expanded.as_bytes())
        })
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

        info!("Expanded {} -> {}", path.display(), target.display());
    }

    Ok(())
}

async fn save_snapshot(config: &Config, cache: &ResolutionCache, path: &Path) -> Result<()> {
    let delay = Duration::from_millis(config.write_retry_delay);
    retry_with_backoff(
        config.write_retries,
        delay,
        |e: &CacheError| matches!(e, CacheError::Io(io) if is_file_locked(io)),
        || async { cache.save_snapshot(path) },
    )
    .await
    .with_context(|| format!("Failed to save cache snapshot {}", path.display()))
}
