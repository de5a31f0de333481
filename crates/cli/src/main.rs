use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use manifold_apply::{ApplyConfig, ApplyEngine, ApplyRequest, Collaborators, MANIFEST_RESOURCE_TYPE};
use manifold_core::{Gvk, Path, SchemaSource, SchemaVariant, Type, Value};
use manifold_kubehub::{get_kube_client, DiscoveryCache, KubeScope, KubeTransport};
use manifold_schema::{CrdSchemaSource, SchemaRegistry};

mod state;

use state::{read_state, StateDoc};

#[derive(Parser, Debug)]
#[command(name = "manifoldctl", version, about = "Manifold CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a planned resource state against the cluster
    Apply {
        /// Planned state document (JSON or YAML)
        #[arg(long)]
        planned: PathBuf,
        /// Prior state document; omitted means the resource does not exist yet
        #[arg(long)]
        prior: Option<PathBuf>,
        /// Type document for built-in kinds, keyed by gvk
        #[arg(long)]
        schemas: Option<PathBuf>,
        /// Resource type name of the states
        #[arg(long = "type", default_value = MANIFEST_RESOURCE_TYPE)]
        resource_type: String,
        /// Computed field path; repeatable. Overrides the planned state's list
        #[arg(long = "computed-field")]
        computed_fields: Vec<String>,
    },
    /// Print the type tree of a kind
    Schema {
        /// GVK key, e.g. "v1/ConfigMap" or "cert-manager.io/v1/Certificate"
        gvk: String,
        /// Include server-populated attributes (status)
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
        #[arg(long)]
        schemas: Option<PathBuf>,
    },
    /// Parse field paths and print their canonical form
    Path {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("MANIFOLD_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("MANIFOLD_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid MANIFOLD_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_registry(path: Option<&PathBuf>) -> Result<SchemaRegistry> {
    match path {
        Some(p) => SchemaRegistry::load(p),
        None => Ok(SchemaRegistry::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply { planned, prior, schemas, resource_type, computed_fields } => {
            let planned = read_state(&planned)?;
            let prior = match prior {
                Some(p) => read_state(&p)?,
                None => Value::null(Type::Dynamic),
            };
            let registry = load_registry(schemas.as_ref())?;
            let client = get_kube_client().await?;
            let cache = DiscoveryCache::global();
            let engine = ApplyEngine::new(
                Collaborators {
                    schemas: Arc::new(CrdSchemaSource::new(client.clone(), Arc::clone(&cache), registry)),
                    scopes: Arc::new(KubeScope::new(client.clone(), cache)),
                    transport: Arc::new(KubeTransport::new(client)),
                    waiter: None,
                },
                ApplyConfig::from_env(),
            );
            let mut req = ApplyRequest::new(resource_type, prior, planned);
            if !computed_fields.is_empty() {
                req.computed_fields = Some(computed_fields);
            }

            let token = CancellationToken::new();
            tokio::spawn({
                let token = token.clone();
                async move {
                    if signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received; cancelling apply");
                        token.cancel();
                    }
                }
            });

            let resp = engine.apply_resource_change(req, &token).await?;
            let new_state = resp.new_state.as_ref().map(StateDoc::from_value).transpose()?;
            match cli.output {
                Output::Human => {
                    for d in &resp.diagnostics {
                        eprintln!("{}", d);
                    }
                    match &new_state {
                        Some(doc) => println!("{}", serde_json::to_string_pretty(doc)?),
                        None => println!("no new state"),
                    }
                }
                Output::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({"diagnostics": &resp.diagnostics, "new_state": &new_state}))?);
                }
            }
            let errors = resp.diagnostics.iter().filter(|d| d.is_error()).count();
            if errors > 0 {
                error!(errors, "apply reported errors");
                return Err(anyhow!("apply reported {} error diagnostic(s)", errors));
            }
        }
        Commands::Schema { gvk, full, schemas } => {
            let gvk = Gvk::parse_key(&gvk)?;
            let variant = if full { SchemaVariant::Full } else { SchemaVariant::Write };
            let registry = load_registry(schemas.as_ref())?;
            info!(gvk = %gvk, full, "schema invoked");
            let ty = if registry.full(&gvk).is_some() {
                registry.type_for_kind(&gvk, variant).await?
            } else {
                let client = get_kube_client().await?;
                CrdSchemaSource::new(client, DiscoveryCache::global(), registry).type_for_kind(&gvk, variant).await?
            };
            match cli.output {
                Output::Human => {
                    println!("{} ({})", gvk, if full { "full" } else { "write" });
                    println!("{}", serde_json::to_string_pretty(&ty.to_json())?);
                }
                Output::Json => println!("{}", serde_json::to_string(&ty)?),
            }
        }
        Commands::Path { paths } => {
            let parsed: Vec<(String, Result<Path, String>)> = paths
                .into_iter()
                .map(|raw| {
                    let res = Path::parse(&raw).map_err(|e| e.to_string());
                    (raw, res)
                })
                .collect();
            match cli.output {
                Output::Human => {
                    for (raw, res) in &parsed {
                        match res {
                            Ok(p) => println!("{} → {}", raw, p),
                            Err(e) => println!("{} ✗ {}", raw, e),
                        }
                    }
                }
                Output::Json => {
                    let rows: Vec<_> = parsed
                        .iter()
                        .map(|(raw, res)| match res {
                            Ok(p) => json!({"input": raw, "canonical": p.to_string()}),
                            Err(e) => json!({"input": raw, "error": e}),
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
            let bad = parsed.iter().filter(|(_, r)| r.is_err()).count();
            if bad > 0 {
                return Err(anyhow!("{} path(s) failed to parse", bad));
            }
        }
    }
    Ok(())
}
