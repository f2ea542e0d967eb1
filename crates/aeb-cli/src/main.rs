//! One-shot CLI for driving a CAD editor through the bridge daemon.
//!
//! Every subcommand prints one JSON document on stdout and exits 1 when
//! the result carries `ok:false`, so agent callers can script against
//! both the payload and the exit code.

mod client;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use aeb_apply::{run_apply, ApplyOptions};
use aeb_audit::AuditStore;
use aeb_compiler::{compile, CompileOptions, RequirementSpec, SearchResolver};
use aeb_protocol::{Action, Command, CommandMeta};

use crate::client::HttpBridgeClient;

#[derive(Parser)]
#[command(name = "aeb")]
#[command(about = "AI EDA bridge CLI", long_about = None)]
struct Cli {
    /// Bridge daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bridge daemon port
    #[arg(long, default_value_t = 8787)]
    port: u16,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check plugin connection status
    Status,

    /// Shut down the bridge daemon
    Stop,

    /// Check editor auth state via the plugin
    CheckAuth {
        /// Include raw adapter probe details
        #[arg(long, default_value_t = false)]
        include_raw: bool,
    },

    /// Diagnostic: adapter type & capabilities
    GetRuntimeStatus,

    /// Read the schematic
    ReadSchema {
        #[arg(long, default_value_t = true)]
        include_wires: bool,
        #[arg(long, default_value_t = false)]
        include_polygons: bool,
        #[arg(long, default_value_t = false)]
        include_selected: bool,
        #[arg(long, default_value_t = false)]
        include_document_source: bool,
        #[arg(long, default_value_t = false)]
        all_pages: bool,
    },

    /// List components
    ListComponents {
        #[arg(long, default_value_t = false)]
        selected_only: bool,
        #[arg(long)]
        limit: Option<u64>,
        /// Comma-separated field names
        #[arg(long)]
        fields: Option<String>,
    },

    /// Modify the schematic
    UpdateSchema {
        /// JSON string with operations
        payload: Option<String>,

        /// Path to JSON payload file (use '-' for stdin)
        #[arg(long)]
        payload_file: Option<String>,

        /// Confirm write operation
        #[arg(long, default_value_t = false)]
        confirm: bool,

        /// Validate only, do not apply
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Skip failed operations instead of aborting
        #[arg(long, default_value_t = false)]
        continue_on_error: bool,
    },

    /// Search the component library by keyword
    Search {
        keyword: String,
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Compile a requirement spec into edit operations
    Compile {
        /// Path to a requirement spec JSON file
        spec_file: PathBuf,

        /// Resolve symbolic keywords against the live component library
        #[arg(long, default_value_t = false)]
        resolve: bool,

        /// Rank of the search candidate to pick (0 = best match)
        #[arg(long, default_value_t = 0)]
        candidate: usize,

        /// Stub line length when the requirement spec does not override it
        #[arg(long, default_value_t = 10.0)]
        stub_length: f64,
    },

    /// Compile a requirement spec and drive the full apply flow
    Apply {
        /// Path to a requirement spec JSON file
        spec_file: PathBuf,

        /// Confirm the real apply
        #[arg(long, default_value_t = false)]
        confirm: bool,

        /// Rehearse only: submit with dry-run semantics, change nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Do not re-read and verify the schema after apply
        #[arg(long, default_value_t = false)]
        skip_verify: bool,

        /// Do not write an audit record for this attempt
        #[arg(long, default_value_t = false)]
        no_audit: bool,

        /// Audit record directory (default: $AEB_AUDIT_DIR or ./audit)
        #[arg(long)]
        audit_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let client = HttpBridgeClient::new(&cli.host, cli.port);

    let value = match cli.cmd {
        Commands::Status => client.get_status().await,
        Commands::Stop => client.shutdown().await,
        Commands::CheckAuth { include_raw } => {
            let mut payload = json!({});
            if include_raw {
                payload["include_raw"] = json!(true);
            }
            send(&client, Action::CheckAuth, payload, CommandMeta::default()).await
        }
        Commands::GetRuntimeStatus => {
            send(
                &client,
                Action::GetRuntimeStatus,
                json!({}),
                CommandMeta::default(),
            )
            .await
        }
        Commands::ReadSchema {
            include_wires,
            include_polygons,
            include_selected,
            include_document_source,
            all_pages,
        } => {
            let payload = json!({
                "include_components": true,
                "include_wires": include_wires,
                "include_polygons": include_polygons,
                "include_selected": include_selected,
                "include_document_source": include_document_source,
                "all_schematic_pages": all_pages,
            });
            send(&client, Action::ReadSchema, payload, CommandMeta::default()).await
        }
        Commands::ListComponents {
            selected_only,
            limit,
            fields,
        } => {
            let mut payload = json!({});
            if selected_only {
                payload["selected_only"] = json!(true);
            }
            if let Some(limit) = limit {
                payload["limit"] = json!(limit);
            }
            if let Some(fields) = fields {
                payload["fields"] = json!(fields.split(',').collect::<Vec<_>>());
            }
            send(
                &client,
                Action::ListComponents,
                payload,
                CommandMeta::default(),
            )
            .await
        }
        Commands::UpdateSchema {
            payload,
            payload_file,
            confirm,
            dry_run,
            continue_on_error,
        } => {
            let meta = CommandMeta {
                confirm,
                dry_run,
                continue_on_error,
            };
            match resolve_payload(payload, payload_file) {
                Ok(payload) => send(&client, Action::UpdateSchema, payload, meta).await,
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        Commands::Search { keyword, limit } => {
            let mut payload = json!({ "keyword": keyword });
            if let Some(limit) = limit {
                payload["limit"] = json!(limit);
            }
            send(
                &client,
                Action::SearchComponent,
                payload,
                CommandMeta::default(),
            )
            .await
        }
        Commands::Compile {
            spec_file,
            resolve,
            candidate,
            stub_length,
        } => {
            let spec = read_spec(&spec_file)?;
            let options = CompileOptions {
                candidate_index: candidate,
                default_stub_length: stub_length,
            };
            let resolver = SearchResolver::new(&client);
            let resolver_ref = resolve.then_some(&resolver as &dyn aeb_compiler::ComponentResolver);
            match compile(&spec, resolver_ref, &options).await {
                Ok(out) => json!({
                    "ok": true,
                    "operations": out.operations,
                    "summary": out.summary,
                    "resolved_components": out.resolved_components,
                }),
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        Commands::Apply {
            spec_file,
            confirm,
            dry_run,
            skip_verify,
            no_audit,
            audit_dir,
        } => {
            let spec = read_spec(&spec_file)?;
            let resolver = SearchResolver::new(&client);
            let compiled = match compile(&spec, Some(&resolver), &CompileOptions::default()).await {
                Ok(out) => out,
                Err(e) => {
                    emit(&json!({"ok": false, "error": e.to_string()}));
                    std::process::exit(1);
                }
            };

            let store = if no_audit {
                None
            } else {
                let dir = audit_dir
                    .or_else(|| std::env::var("AEB_AUDIT_DIR").ok().map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("audit"));
                Some(AuditStore::new(dir)?)
            };
            let options = ApplyOptions {
                confirm,
                dry_run,
                verify: !skip_verify,
                ..ApplyOptions::default()
            };
            let report = run_apply(&client, &compiled.operations, &options, store.as_ref()).await?;
            report.to_json()
        }
    };

    let ok = value
        .get("ok")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    emit(&value);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn send(
    client: &HttpBridgeClient,
    action: Action,
    payload: Value,
    meta: CommandMeta,
) -> Value {
    client
        .send_command(&Command::new(action, payload, meta))
        .await
}

fn emit(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Positional payload wins; `--payload-file -` reads stdin. A UTF-8 BOM
/// from Windows editors is stripped before parsing.
fn resolve_payload(inline: Option<String>, file: Option<String>) -> Result<Value> {
    let raw = if let Some(path) = file {
        if path == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read payload from stdin")?;
            buf
        } else {
            std::fs::read_to_string(&path).with_context(|| format!("read payload file {path}"))?
        }
    } else {
        inline.context("payload is required: pass JSON or --payload-file <path>")?
    };

    let raw = raw.trim_start_matches('\u{feff}');
    let payload: Value = serde_json::from_str(raw).context("invalid JSON payload")?;
    if !payload.is_object() {
        anyhow::bail!("payload must be a JSON object");
    }
    Ok(payload)
}

fn read_spec(path: &PathBuf) -> Result<RequirementSpec> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read spec file {path:?}"))?;
    let raw = raw.trim_start_matches('\u{feff}');
    serde_json::from_str(raw).with_context(|| format!("parse requirement spec {path:?}"))
}
