use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sketchwise::classify::classify;
use sketchwise::BloomFilter;
use tracing_subscriber::EnvFilter;

/// Check candidate passwords against a Bloom filter of passwords in use.
#[derive(Clone, Debug, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    #[clap(long, default_value_t = 1000)]
    pub num_bits: usize,

    #[clap(long, default_value_t = 3)]
    pub num_hashes: usize,

    /// A password already in use. May be repeated.
    #[clap(long = "existing")]
    pub existing: Vec<String>,

    /// File with one password in use per line.
    #[clap(long)]
    pub existing_file: Option<PathBuf>,

    /// Passwords to check.
    #[clap(required = true)]
    pub candidates: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let mut bloom = BloomFilter::new(config.num_bits, config.num_hashes)?;

    for password in &config.existing {
        bloom.add(password);
    }
    if let Some(path) = &config.existing_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for password in contents.lines().filter(|line| !line.is_empty()) {
            bloom.add(password);
        }
    }

    println!("Bloom filter initialized. {bloom}\n");

    for candidate in &config.candidates {
        let status = classify(&bloom, Some(candidate.as_str()));
        println!("Password '{candidate}' - {status}.");
    }

    Ok(())
}
