//! Counting distinct client addresses in JSON-lines access logs, exactly
//! with a set or approximately with a [`HyperLogLog`].

use crate::cardinality::hll::HyperLogLog;
use crate::cardinality::Cardinality;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_ADDRESS_FIELD: &str = "remote_addr";
pub const DEFAULT_PRECISION: usize = 14;

/// Rough per-entry cost of an address kept in a hash set.
const SET_BYTES_PER_ENTRY: u64 = 64;

const USER_AGENT: &str = concat!("sketchwise/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSource {
    Stdin,
    File(PathBuf),
    Url(String),
}

impl LogSource {
    /// `-` reads standard input, `http://` and `https://` locations are
    /// fetched, anything else is a local path that must exist.
    pub fn parse(location: &str) -> Result<Self> {
        if location == "-" {
            return Ok(LogSource::Stdin);
        }
        if location.starts_with("https://") || location.starts_with("http://") {
            return Ok(LogSource::Url(location.to_owned()));
        }
        let path = PathBuf::from(location);
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }
        Ok(LogSource::File(path))
    }

    pub fn open(&self) -> Result<Box<dyn BufRead>> {
        match self {
            LogSource::Stdin => Ok(Box::new(io::stdin().lock())),
            LogSource::File(path) => match File::open(path) {
                Ok(file) => Ok(Box::new(BufReader::new(file))),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(Error::NotFound(path.clone()))
                }
                Err(err) => Err(err.into()),
            },
            LogSource::Url(url) => {
                debug!(url, "fetching log");
                let response = http_client(url)?.get(url).send()?.error_for_status()?;
                Ok(Box::new(BufReader::new(response)))
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, LogSource::Url(_))
    }
}

fn http_client(url: &str) -> Result<reqwest::blocking::Client> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| Error::invalid_argument(format!("invalid log url {url}: {err}")))?;
    let mut builder = reqwest::blocking::Client::builder().user_agent(USER_AGENT);
    // Loopback hosts are never reachable through a proxy.
    if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) {
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

impl Display for LogSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSource::Stdin => f.write_str("<stdin>"),
            LogSource::File(path) => write!(f, "{}", path.display()),
            LogSource::Url(url) => f.write_str(url),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: usize,
    pub malformed: usize,
    pub addresses: usize,
}

/// Feeds every non-empty string `field` of every JSON line into `counter`.
///
/// Blank lines and lines that are not valid JSON are skipped. Only read
/// errors from `reader` abort the scan.
pub fn scan_addresses<R, C>(mut reader: R, field: &str, counter: &mut C) -> Result<ScanStats>
where
    R: BufRead,
    C: Cardinality<str> + ?Sized,
{
    let mut stats = ScanStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stats.lines += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(record) => {
                if let Some(address) = address_of(&record, field) {
                    counter.add(address);
                    stats.addresses += 1;
                }
            }
            Err(err) => {
                stats.malformed += 1;
                debug!(line = stats.lines, %err, "skipping malformed log line");
            }
        }
    }

    info!(
        lines = stats.lines,
        malformed = stats.malformed,
        addresses = stats.addresses,
        "scanned log"
    );
    Ok(stats)
}

fn address_of<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|address| !address.is_empty())
}

pub fn count_exact(source: &LogSource, field: &str) -> Result<(u64, ScanStats)> {
    let mut addresses: HashSet<String> = HashSet::new();
    let stats = scan_addresses(source.open()?, field, &mut addresses)?;
    Ok((Cardinality::estimate(&addresses), stats))
}

pub fn count_approximate(
    source: &LogSource,
    field: &str,
    precision: usize,
) -> Result<(HyperLogLog, ScanStats)> {
    let mut hll = HyperLogLog::new(precision)?;
    let stats = scan_addresses(source.open()?, field, &mut hll)?;
    Ok((hll, stats))
}

/// Exact and approximate counts from a single pass, so non-seekable
/// sources such as stdin work.
pub fn count_both(
    source: &LogSource,
    field: &str,
    precision: usize,
) -> Result<(Comparison, ScanStats)> {
    let mut tee = Tee {
        exact: HashSet::new(),
        hll: HyperLogLog::new(precision)?,
    };
    let stats = scan_addresses(source.open()?, field, &mut tee)?;
    let exact = Cardinality::estimate(&tee.exact);
    Ok((Comparison::new(exact, &tee.hll), stats))
}

struct Tee {
    exact: HashSet<String>,
    hll: HyperLogLog,
}

impl Cardinality<str> for Tee {
    fn add(&mut self, item: &str) {
        Cardinality::add(&mut self.exact, item);
        self.hll.add(item);
    }

    fn estimate(&self) -> u64 {
        self.hll.estimate()
    }
}

/// Exact against approximate distinct counts for the same log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    pub exact: u64,
    pub approximate: u64,
    pub sketch_bytes: usize,
}

impl Comparison {
    pub fn new(exact: u64, sketch: &HyperLogLog) -> Self {
        Self {
            exact,
            approximate: sketch.estimate(),
            sketch_bytes: sketch.memory_bytes(),
        }
    }

    pub fn absolute_error(&self) -> u64 {
        self.exact.abs_diff(self.approximate)
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.exact == 0 {
            return 0.0;
        }
        self.absolute_error() as f64 / self.exact as f64 * 100.
    }

    pub fn exact_memory_bytes(&self) -> u64 {
        self.exact * SET_BYTES_PER_ENTRY
    }

    pub fn memory_reduction(&self) -> f64 {
        if self.sketch_bytes == 0 {
            return 0.0;
        }
        self.exact_memory_bytes() as f64 / self.sketch_bytes as f64
    }
}

/// Writes `title` between two rules of `=`.
pub fn write_banner(f: &mut impl std::fmt::Write, title: &str) -> std::fmt::Result {
    let rule = "=".repeat(50);
    writeln!(f, "{rule}")?;
    writeln!(f, "{title}")?;
    writeln!(f, "{rule}")
}

/// `1234567` as `1,234,567`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write_banner(f, "Comparison:")?;
        writeln!(f, "Exact count:        {}", self.exact)?;
        writeln!(f, "HyperLogLog count:  {}", self.approximate)?;
        writeln!(f, "Absolute error:     {}", self.absolute_error())?;
        writeln!(f, "Error rate:         {:.2}%", self.error_rate_percent())?;
        writeln!(f)?;
        writeln!(f, "Memory usage (estimated):")?;
        writeln!(
            f,
            "Set:                ~{} bytes",
            group_thousands(self.exact_memory_bytes())
        )?;
        writeln!(
            f,
            "HyperLogLog:        ~{} bytes",
            group_thousands(self.sketch_bytes as u64)
        )?;
        write!(f, "Memory reduction:   {:.1}x", self.memory_reduction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use googletest::assert_that;
    use googletest::prelude::near;
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Answers one HTTP request on a local port with `status` and `body`.
    fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/access.log", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        (url, handle)
    }

    fn access_log(ips: impl IntoIterator<Item = String>) -> String {
        ips.into_iter()
            .map(|ip| format!(r#"{{"remote_addr": "{ip}", "status": 200}}"#))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_scan_skips_bad_lines() {
        let log = [
            r#"{"remote_addr": "10.0.0.1", "request": "GET /"}"#,
            "",
            "not json at all",
            r#"{"remote_addr": "  10.0.0.2  "}"#,
            r#"{"remote_addr": "10.0.0.1"}"#,
            r#"{"remote_addr": ""}"#,
            r#"{"remote_addr": "   "}"#,
            r#"{"remote_addr": 17}"#,
            r#"{"client": "10.0.0.9"}"#,
            r#"["10.0.0.3"]"#,
            r#"{"remote_addr": "10.0.0.3""#,
        ]
        .join("\n");

        let mut exact: HashSet<String> = HashSet::new();
        let stats = scan_addresses(Cursor::new(log), DEFAULT_ADDRESS_FIELD, &mut exact).unwrap();

        assert_eq!(
            stats,
            ScanStats {
                lines: 11,
                malformed: 2,
                addresses: 3,
            }
        );
        let expected: HashSet<String> = ["10.0.0.1", "10.0.0.2"].map(String::from).into();
        assert_eq!(exact, expected);
    }

    #[test]
    fn test_scan_invalid_utf8() {
        let mut log = b"{\"remote_addr\": \"10.0.0.1\"}\n".to_vec();
        log.extend_from_slice(b"\xff\xfe garbage\n");
        log.extend_from_slice(b"{\"remote_addr\": \"10.0.0.2\"}");

        let mut exact: HashSet<String> = HashSet::new();
        let stats = scan_addresses(Cursor::new(log), DEFAULT_ADDRESS_FIELD, &mut exact).unwrap();

        assert_eq!(stats.malformed, 1);
        assert_eq!(Cardinality::estimate(&exact), 2);
    }

    #[test]
    fn test_scan_custom_field() {
        let log = r#"{"ip": "192.168.1.1"}
{"ip": "192.168.1.2"}"#;
        let mut hll = HyperLogLog::new(DEFAULT_PRECISION).unwrap();
        let stats = scan_addresses(Cursor::new(log), "ip", &mut hll).unwrap();

        assert_eq!(stats.addresses, 2);
        assert_eq!(hll.estimate(), 2);
    }

    #[test]
    fn test_exact_and_approximate_side_by_side() {
        let ips = (0..5000).map(|i| format!("10.0.{}.{}", i / 256, i % 256));
        // Every address appears twice.
        let log = access_log(ips.clone().chain(ips));

        let mut exact: HashSet<String> = HashSet::new();
        scan_addresses(Cursor::new(&log), DEFAULT_ADDRESS_FIELD, &mut exact).unwrap();
        let mut hll = HyperLogLog::new(DEFAULT_PRECISION).unwrap();
        let stats = scan_addresses(Cursor::new(&log), DEFAULT_ADDRESS_FIELD, &mut hll).unwrap();

        assert_eq!(stats.addresses, 10_000);
        let comparison = Comparison::new(Cardinality::estimate(&exact), &hll);
        assert_eq!(comparison.exact, 5000);
        assert_eq!(comparison.approximate, 5024);
        assert_eq!(comparison.absolute_error(), 24);
        assert_that!(comparison.error_rate_percent(), near(0.48, 1e-9));
    }

    #[test]
    fn test_comparison() {
        let hll = HyperLogLog::new(4).unwrap();
        let comparison = Comparison::new(0, &hll);

        assert_eq!(comparison.approximate, 0);
        assert_eq!(comparison.error_rate_percent(), 0.0);
        assert_eq!(comparison.sketch_bytes, 13);

        let comparison = Comparison {
            exact: 130,
            approximate: 117,
            sketch_bytes: 13,
        };
        assert_eq!(comparison.absolute_error(), 13);
        assert_eq!(comparison.error_rate_percent(), 10.0);
        assert_eq!(comparison.exact_memory_bytes(), 8320);
        assert_eq!(comparison.memory_reduction(), 640.0);
    }

    #[test]
    fn test_log_source_parse() {
        assert_eq!(LogSource::parse("-").unwrap(), LogSource::Stdin);

        let source = LogSource::parse("https://example.com/access.log").unwrap();
        assert_eq!(
            source,
            LogSource::Url("https://example.com/access.log".to_string())
        );
        assert!(source.is_remote());
        assert_eq!(source.to_string(), "https://example.com/access.log");

        let err = LogSource::Url("https://".to_string()).open().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = LogSource::parse("/definitely/not/here.log").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_count_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let ips = ["1.1.1.1", "8.8.8.8", "1.1.1.1", "9.9.9.9"].map(String::from);
        writeln!(file, "{}", access_log(ips)).unwrap();
        writeln!(file, "{{broken").unwrap();
        file.flush().unwrap();

        let source = LogSource::parse(file.path().to_str().unwrap()).unwrap();
        assert_eq!(source.to_string(), file.path().display().to_string());

        let (exact, stats) = count_exact(&source, DEFAULT_ADDRESS_FIELD).unwrap();
        assert_eq!(exact, 3);
        assert_eq!(stats.malformed, 1);

        let (hll, stats) = count_approximate(&source, DEFAULT_ADDRESS_FIELD, 10).unwrap();
        assert_eq!(hll.estimate(), 3);
        assert_eq!(stats.addresses, 4);

        let (comparison, stats) = count_both(&source, DEFAULT_ADDRESS_FIELD, 10).unwrap();
        assert_eq!((comparison.exact, comparison.approximate), (3, 3));
        assert_eq!(stats.lines, 5);

        let err = count_approximate(&source, DEFAULT_ADDRESS_FIELD, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_count_from_url() {
        let ips = ["1.1.1.1", "8.8.8.8", "1.1.1.1", "9.9.9.9"].map(String::from);
        let body = format!("{}\nnot json\n", access_log(ips));
        let (url, server) = serve_once("200 OK", body);

        let source = LogSource::parse(&url).unwrap();
        let (comparison, stats) = count_both(&source, DEFAULT_ADDRESS_FIELD, 10).unwrap();
        server.join().unwrap();

        assert_eq!((comparison.exact, comparison.approximate), (3, 3));
        assert_eq!(
            stats,
            ScanStats {
                lines: 5,
                malformed: 1,
                addresses: 4,
            }
        );
    }

    #[test]
    fn test_url_error_status() {
        let (url, server) = serve_once("404 Not Found", "missing".to_string());

        let source = LogSource::parse(&url).unwrap();
        let err = count_exact(&source, DEFAULT_ADDRESS_FIELD).unwrap_err();
        server.join().unwrap();

        assert_eq!(err.kind(), ErrorKind::Http);
    }

    #[test]
    fn test_comparison_report() {
        let comparison = Comparison {
            exact: 5000,
            approximate: 5024,
            sketch_bytes: 12289,
        };
        let expected = "\
==================================================
Comparison:
==================================================
Exact count:        5000
HyperLogLog count:  5024
Absolute error:     24
Error rate:         0.48%

Memory usage (estimated):
Set:                ~320,000 bytes
HyperLogLog:        ~12,289 bytes
Memory reduction:   26.0x";
        assert_eq!(comparison.to_string(), expected);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
