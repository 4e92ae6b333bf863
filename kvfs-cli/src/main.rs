use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kvfs_storage::{
    AdapterOptions, KeyValueStore, LocalClient, Metadata, MetadataSupport, ObjectClient,
    ObjectStoreAdapter, S3Client,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,kvfs_storage=debug";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    S3,
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "kvfs", about = "Key-value filesystem over object storage")]
struct Cli {
    /// Bucket to operate on
    #[arg(long, env = "KVFS_BUCKET")]
    bucket: String,

    /// Backend client
    #[arg(long, env = "KVFS_BACKEND", value_enum, default_value = "s3")]
    backend: Backend,

    /// Root directory for the local backend
    #[arg(long, env = "KVFS_LOCAL_ROOT", default_value = "./kvfs-data")]
    root: PathBuf,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, env = "KVFS_ENDPOINT")]
    endpoint: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, env = "KVFS_DIRECTORY", default_value = "")]
    directory: String,

    /// Region for the client and for bucket creation
    #[arg(long, env = "KVFS_REGION", default_value = "")]
    region: String,

    /// Default canned ACL for writes
    #[arg(long, env = "KVFS_ACL", default_value = "")]
    acl: String,

    /// Create the bucket if it does not exist
    #[arg(long, env = "KVFS_CREATE")]
    create: bool,

    /// Emit JSON logs
    #[arg(long, env = "KVFS_JSON_LOGS")]
    json_logs: bool,

    /// Print backend request counters to stderr when done
    #[arg(long, env = "KVFS_METRICS")]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every key in the bucket, with synthesized directories
    Ls,
    /// Print an object to stdout
    Cat { key: String },
    /// Upload a file (or stdin) under a key
    Put {
        key: String,
        /// Source file, stdin when omitted
        file: Option<PathBuf>,
        /// Request options as a JSON object, e.g. '{"ContentType":"text/plain"}'
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Rename a key
    Mv { source: String, target: String },
    /// Delete a key
    Rm { key: String },
    /// Show size and last-modified time
    Stat { key: String },
    /// Exit with status 1 when the key does not exist
    Exists { key: String },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_observability(cli.json_logs);
    let metrics = cli.metrics.then(init_metrics_recorder).transpose()?;

    let options = AdapterOptions::default()
        .with_directory(cli.directory.clone())
        .with_region(cli.region.clone())
        .with_acl(cli.acl.clone())
        .with_create(cli.create);

    let status = match cli.backend {
        Backend::Local => {
            let client = LocalClient::new(&cli.root)
                .with_context(|| format!("opening local root {}", cli.root.display()))?;
            run(client, &cli, options)?
        }
        Backend::S3 => {
            let client = match &cli.endpoint {
                Some(endpoint) => {
                    let region = if cli.region.is_empty() {
                        "us-east-1"
                    } else {
                        cli.region.as_str()
                    };
                    S3Client::with_endpoint(endpoint.clone(), region)?
                }
                None => S3Client::new()?,
            };
            run(client, &cli, options)?
        }
    };

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }
    Ok(status)
}

fn run<C: ObjectClient>(
    client: C,
    cli: &Cli,
    options: AdapterOptions,
) -> anyhow::Result<ExitCode> {
    info!(backend = client.backend_type(), bucket = %cli.bucket, "starting kvfs");
    let adapter = ObjectStoreAdapter::new(client, cli.bucket.clone(), options);

    match &cli.command {
        Command::Ls => {
            let mut out = std::io::stdout().lock();
            for key in adapter.keys()? {
                writeln!(out, "{key}")?;
            }
        }
        Command::Cat { key } => {
            let body = adapter.read(key).with_context(|| format!("reading {key}"))?;
            std::io::stdout().lock().write_all(&body)?;
        }
        Command::Put {
            key,
            file,
            metadata,
        } => {
            if let Some(raw) = metadata {
                let parsed: Metadata =
                    serde_json::from_str(raw).context("--metadata must be a JSON object")?;
                adapter.set_metadata(key, parsed);
            }
            let body = match file {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let output = adapter.write(key, &body)?;
            debug!(etag = ?output.etag, version = ?output.version_id, "put complete");
        }
        Command::Mv { source, target } => {
            adapter.rename(source, target)?;
        }
        Command::Rm { key } => {
            adapter.delete(key)?;
        }
        Command::Stat { key } => {
            let size = adapter.size(key)?;
            let modified = adapter
                .mtime(key)?
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!("{key}\t{size}\t{modified}");
        }
        Command::Exists { key } => {
            if !adapter.exists(key)? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")
}

fn init_observability(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr so `cat` output stays clean.
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_cli(root: &std::path::Path, args: &[&str]) -> Cli {
        let root = root.to_string_lossy().into_owned();
        let mut argv = vec!["kvfs", "--bucket", "b", "--backend", "local", "--root", &root];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_metrics_flag_defaults_off() {
        let temp = tempfile::tempdir().unwrap();
        assert!(!local_cli(temp.path(), &["ls"]).metrics);
        assert!(local_cli(temp.path(), &["--metrics", "ls"]).metrics);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_exists_reports_missing_key_as_failure() {
        let temp = tempfile::tempdir().unwrap();
        let client = LocalClient::new(temp.path()).unwrap();
        let cli = local_cli(temp.path(), &["--create", "exists", "nope"]);
        let options = AdapterOptions::default().with_create(true);

        let status = run(client, &cli, options).unwrap();
        assert_eq!(status, ExitCode::FAILURE);
    }
}
