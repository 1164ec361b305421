//! hyperdoc CLI
//!
//! Renders hypermedia documents from a resource-metadata file and a
//! materialized data file, and emits OpenAPI descriptions of the same
//! metadata. Render failures are printed as problem-detail documents,
//! not bare errors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hyperdoc::{
    emit_openapi, fallback_format, negotiate, problem_document, render_collection, render_item,
    CollectionQuery, Format, IdentityNameConverter, MetadataRegistry, OpenApiOptions,
    OpenApiVersion, PathIriGenerator, RenderContext, RenderError, RenderOptions,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hyperdoc")]
#[command(about = "Render hypermedia documents from resource metadata")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a data file as an item or collection document
    Render {
        /// Data file: a JSON object (item) or array (collection)
        data: PathBuf,

        /// Resource metadata file
        #[arg(long, short)]
        metadata: PathBuf,

        /// Resource short name to render
        #[arg(long, short)]
        resource: String,

        /// Operation name (defaults to get_item / get_collection)
        #[arg(long)]
        operation: Option<String>,

        /// Output format: jsonld, hal, jsonapi or json
        #[arg(long, short, conflicts_with = "accept")]
        format: Option<String>,

        /// Negotiate the format from an Accept header value
        #[arg(long)]
        accept: Option<String>,

        /// Render the data file as a collection page
        #[arg(long)]
        collection: bool,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// Client-requested page size
        #[arg(long)]
        page_size: Option<u64>,

        /// Collection-wide total when known
        #[arg(long)]
        total: Option<u64>,

        /// Request URI used for page links (defaults to the resource path)
        #[arg(long)]
        uri: Option<String>,

        /// Ordering, repeatable: --order title=asc
        #[arg(long)]
        order: Vec<String>,

        /// Equality filter, repeatable: --filter name=Ada
        #[arg(long)]
        filter: Vec<String>,

        /// Base prefix for generated references
        #[arg(long, default_value = "")]
        base: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Emit an OpenAPI description of a metadata file
    Openapi {
        /// Resource metadata file
        #[arg(long, short)]
        metadata: PathBuf,

        /// Specification version: 3.1.0 (default), 3.0.2 or 2.0
        #[arg(long, default_value = "3.1.0")]
        spec_version: String,

        /// info.title of the emitted document
        #[arg(long, default_value = "API")]
        title: String,

        /// info.version of the emitted document
        #[arg(long, default_value = "0.1.0")]
        api_version: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List the supported wire formats
    Formats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            data,
            metadata,
            resource,
            operation,
            format,
            accept,
            collection,
            page,
            page_size,
            total,
            uri,
            order,
            filter,
            base,
            output,
            pretty,
        } => run_render(RenderArgs {
            data,
            metadata,
            resource,
            operation,
            format,
            accept,
            collection,
            page,
            page_size,
            total,
            uri,
            order,
            filter,
            base,
            output,
            pretty,
        }),

        Commands::Openapi {
            metadata,
            spec_version,
            title,
            api_version,
            output,
            pretty,
        } => run_openapi(&metadata, &spec_version, title, api_version, output, pretty),

        Commands::Formats => run_formats(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct RenderArgs {
    data: PathBuf,
    metadata: PathBuf,
    resource: String,
    operation: Option<String>,
    format: Option<String>,
    accept: Option<String>,
    collection: bool,
    page: u64,
    page_size: Option<u64>,
    total: Option<u64>,
    uri: Option<String>,
    order: Vec<String>,
    filter: Vec<String>,
    base: String,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_render(args: RenderArgs) -> Result<(), u8> {
    let registry = load_registry(&args.metadata)?;
    let data = load_json(&args.data).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let meta = registry.get(&args.resource).ok_or_else(|| {
        let e = RenderError::UnknownResource {
            resource: args.resource.clone(),
        };
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let default_operation = if args.collection {
        "get_collection"
    } else {
        "get_item"
    };
    let operation_name = args.operation.as_deref().unwrap_or(default_operation);
    let operation = meta
        .operation_named(operation_name)
        .or_else(|| meta.operations.first())
        .ok_or_else(|| {
            eprintln!(
                "Error: resource \"{}\" declares no operations",
                args.resource
            );
            2u8
        })?;

    let names = IdentityNameConverter;
    let iris = PathIriGenerator::new(args.base.clone());
    let ctx = RenderContext {
        registry: &registry,
        names: &names,
        iris: &iris,
        options: RenderOptions::default(),
    };

    // Explicit --format wins; otherwise negotiate from --accept.
    let format = match &args.format {
        Some(name) => Format::parse(name).ok_or_else(|| {
            eprintln!("Error: unknown format \"{}\"", name);
            2u8
        })?,
        None => match negotiate(args.accept.as_deref(), operation) {
            Ok(format) => format,
            Err(e) => {
                let fallback = fallback_format(args.accept.as_deref(), operation);
                return report_problem(&e, fallback, &args.output, args.pretty);
            }
        },
    };

    let document = if args.collection {
        let instances = data.as_array().cloned().unwrap_or_else(|| vec![data.clone()]);
        let mut params: Vec<(String, String)> = Vec::new();
        for entry in &args.filter {
            if let Some((key, value)) = entry.split_once('=') {
                params.push((key.to_string(), value.to_string()));
            }
        }
        for entry in &args.order {
            if let Some((key, value)) = entry.split_once('=') {
                params.push((format!("order[{}]", key), value.to_string()));
            }
        }
        let query = CollectionQuery {
            params,
            page: args.page,
            page_size: args.page_size,
            total: args.total,
            cursor: None,
            request_uri: args.uri.clone().unwrap_or_else(|| meta.path.clone()),
        };
        render_collection(&instances, &meta, operation, format, &query, &ctx)
    } else {
        render_item(&data, &meta, operation, format, &ctx)
    };

    match document {
        Ok(document) => write_json(&document, &args.output, args.pretty),
        Err(e) => report_problem(&e, format, &args.output, args.pretty),
    }
}

/// Render failures come back as problem-detail documents on stdout with
/// the error's exit code, never as a bare failure.
fn report_problem(
    error: &RenderError,
    format: Format,
    output: &Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    eprintln!("Error: {}", error);
    let document = problem_document(error, format);
    write_json(&document, output, pretty)?;
    Err(error.exit_code() as u8)
}

fn run_openapi(
    metadata: &Path,
    spec_version: &str,
    title: String,
    api_version: String,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let registry = load_registry(metadata)?;
    let spec = OpenApiVersion::parse(spec_version).ok_or_else(|| {
        eprintln!("Error: unknown spec version \"{}\"", spec_version);
        2u8
    })?;

    let document = emit_openapi(
        &registry,
        &OpenApiOptions {
            title,
            api_version,
            spec,
        },
    );
    write_json(&document, &output, pretty)
}

fn run_formats() -> Result<(), u8> {
    for format in Format::ALL {
        println!("{}", format.media_type());
    }
    Ok(())
}

fn load_registry(path: &Path) -> Result<MetadataRegistry, u8> {
    let doc = load_json(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    MetadataRegistry::from_json(&doc).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn load_json(path: &Path) -> Result<Value, RenderError> {
    let content = std::fs::read_to_string(path).map_err(|source| RenderError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| RenderError::InvalidJson { source })
}

fn write_json(document: &Value, output: &Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let rendered = if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}
