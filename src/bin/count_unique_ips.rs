use clap::Parser;
use clap::ValueEnum;
use sketchwise::log_scan::{self, write_banner, LogSource, DEFAULT_ADDRESS_FIELD};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Exact count with a hash set.
    Set,
    /// Approximate count with HyperLogLog.
    Hyperloglog,
    Both,
}

/// Count unique IP addresses in a JSON-lines access log using a set and
/// HyperLogLog.
#[derive(Clone, Debug, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    /// Path or URL of the access log, or `-` for stdin.
    pub log_file: String,

    #[clap(long, value_enum, default_value_t = Method::Both)]
    pub method: Method,

    /// HyperLogLog precision (4-16). Higher is more accurate and uses more
    /// memory.
    #[clap(long, default_value_t = 5)]
    pub precision: usize,

    /// JSON field holding the client address.
    #[clap(long, default_value = DEFAULT_ADDRESS_FIELD)]
    pub field: String,
}

fn banner(title: &str) {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_banner(&mut out, title);
    print!("{out}");
}

fn print_exact(count: u64) {
    banner("Exact counting using set:");
    println!("Unique IP addresses (exact): {count}\n");
}

fn print_approximate(precision: usize, estimate: u64) {
    banner(&format!(
        "Approximate counting using HyperLogLog (precision={precision}):"
    ));
    println!("Unique IP addresses (HyperLogLog): {estimate}");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let source = LogSource::parse(&config.log_file)?;
    if source.is_remote() {
        println!("Reading log from URL...\n");
    } else {
        println!("Reading log from local file...\n");
    }

    match config.method {
        Method::Set => {
            let (exact, _) = log_scan::count_exact(&source, &config.field)?;
            print_exact(exact);
        }
        Method::Hyperloglog => {
            let (hll, _) = log_scan::count_approximate(&source, &config.field, config.precision)?;
            print_approximate(config.precision, hll.estimate());
        }
        Method::Both => {
            let (comparison, _) =
                log_scan::count_both(&source, &config.field, config.precision)?;
            print_exact(comparison.exact);
            print_approximate(config.precision, comparison.approximate);
            println!("\n{comparison}\n");
        }
    }

    Ok(())
}
