//! doccache CLI
//!
//! Command-line interface for inspecting and editing a doccache data
//! directory. Every write goes through a change buffer.

use std::collections::{BTreeMap, BTreeSet};

use clap::{Parser, Subcommand};
use doccache::model::{FieldFilter, Operator, Value};
use doccache::{
    CacheError, Config, Document, DocumentKey, MaybeDocument, NoDocument, Persistence, Query,
    ResourcePath, Result, SnapshotStrategy, SnapshotVersion,
};
use tracing_subscriber::{fmt, EnvFilter};

/// doccache CLI
#[derive(Parser, Debug)]
#[command(name = "doccache-cli")]
#[command(about = "Inspect and edit a local remote-document cache")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./doccache_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read one or more documents
    Get {
        /// Document paths, e.g. rooms/abc
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Store a document
    Put {
        /// Document path, e.g. rooms/abc
        path: String,

        /// Fields as a JSON object
        #[arg(short, long, default_value = "{}")]
        fields: String,

        /// Read time (and version), seconds
        #[arg(short, long)]
        read_time: i64,

        /// Read time, nanoseconds part
        #[arg(long, default_value = "0")]
        nanos: i32,
    },

    /// Record that a document does not exist
    Missing {
        /// Document path
        path: String,

        /// Read time (and version), seconds
        #[arg(short, long)]
        read_time: i64,
    },

    /// Remove a document from the cache
    Remove {
        /// Document path
        path: String,

        /// Read time of the removal, seconds
        #[arg(short, long)]
        read_time: Option<i64>,

        /// Keep a sentinel delete for the change feed
        #[arg(long)]
        track_removals: bool,
    },

    /// List the documents of a collection
    Query {
        /// Collection path, e.g. rooms
        collection: String,

        /// Only documents read after this time, seconds
        #[arg(short, long)]
        since: Option<i64>,

        /// Equality filter FIELD=JSON (repeatable)
        #[arg(short, long = "where")]
        filters: Vec<String>,
    },

    /// Print the aggregate cache size
    Size,

    /// List the parents of every collection with the given id
    Parents {
        collection_id: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,doccache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("doccache CLI v{}", doccache::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .snapshot_strategy(SnapshotStrategy::OnClose)
        .build();
    let persistence = Persistence::open(config)?;

    match args.command {
        Commands::Get { paths } => {
            let keys = paths
                .iter()
                .map(|path| DocumentKey::from_path_string(path))
                .collect::<Result<BTreeSet<_>>>()?;
            let cache = persistence.remote_document_cache()?;
            let docs =
                persistence.run_read_transaction("get", |txn| cache.get_entries(txn, &keys))?;
            for (key, doc) in docs {
                match doc {
                    Some(doc) => println!("{}", describe(&doc)?),
                    None => println!("/{} (not cached)", key),
                }
            }
        }

        Commands::Put {
            path,
            fields,
            read_time,
            nanos,
        } => {
            let key = DocumentKey::from_path_string(&path)?;
            let read_time = SnapshotVersion::new(read_time, nanos)?;
            let doc = Document::new(key.clone(), read_time, parse_fields(&fields)?, false);
            write_entry(&persistence, &key, Some(doc.into()), Some(read_time), false)?;
            println!("OK");
        }

        Commands::Missing { path, read_time } => {
            let key = DocumentKey::from_path_string(&path)?;
            let read_time = SnapshotVersion::new(read_time, 0)?;
            let doc = NoDocument::new(key.clone(), read_time, false);
            write_entry(&persistence, &key, Some(doc.into()), Some(read_time), false)?;
            println!("OK");
        }

        Commands::Remove {
            path,
            read_time,
            track_removals,
        } => {
            let key = DocumentKey::from_path_string(&path)?;
            let read_time = read_time
                .map(|seconds| SnapshotVersion::new(seconds, 0))
                .transpose()?;
            write_entry(&persistence, &key, None, read_time, track_removals)?;
            println!("OK");
        }

        Commands::Query {
            collection,
            since,
            filters,
        } => {
            let mut query = Query::at_path(ResourcePath::from_string(&collection)?);
            for filter in &filters {
                query = query.with_filter(parse_filter(filter)?);
            }
            let since = match since {
                Some(seconds) => SnapshotVersion::new(seconds, 0)?,
                None => SnapshotVersion::MIN,
            };

            let cache = persistence.remote_document_cache()?;
            let docs = persistence.run_read_transaction("query", |txn| {
                cache.get_documents_matching_query(txn, &query, since)
            })?;
            for doc in docs.into_values() {
                println!("{}", describe(&MaybeDocument::Document(doc))?);
            }
        }

        Commands::Size => {
            let cache = persistence.remote_document_cache()?;
            let size = persistence.run_read_transaction("size", |txn| cache.get_size(txn))?;
            println!("{}", size);
        }

        Commands::Parents { collection_id } => {
            for parent in persistence.collection_parents(&collection_id)? {
                println!("/{}", parent);
            }
        }
    }

    persistence.close()
}

/// Upsert (`Some`) or remove (`None`) one entry through a change buffer
fn write_entry(
    persistence: &Persistence,
    key: &DocumentKey,
    doc: Option<MaybeDocument>,
    read_time: Option<SnapshotVersion>,
    track_removals: bool,
) -> Result<()> {
    let cache = persistence.remote_document_cache()?;
    persistence.run_transaction("cli write", |txn| {
        let mut buffer = cache.new_change_buffer(track_removals);
        buffer.get_entry(txn, key)?;
        match (doc, read_time) {
            (Some(doc), Some(read_time)) => buffer.set_entry(doc, read_time)?,
            (Some(_), None) => {
                return Err(CacheError::InvalidArgument(
                    "a read time is required to store a document".to_string(),
                ))
            }
            (None, read_time) => buffer.remove_entry(key, read_time)?,
        }
        buffer.apply(txn)
    })
}

fn parse_fields(json: &str) -> Result<BTreeMap<String, Value>> {
    let parsed: serde_json::Value =
        serde_json::from_str(json).map_err(|e| CacheError::InvalidArgument(e.to_string()))?;
    match parsed {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, Value::from_json(value)))
            .collect()),
        _ => Err(CacheError::InvalidArgument(
            "--fields must be a JSON object".to_string(),
        )),
    }
}

fn parse_filter(filter: &str) -> Result<FieldFilter> {
    let (field, json) = filter.split_once('=').ok_or_else(|| {
        CacheError::InvalidArgument(format!("filter must be FIELD=JSON: {}", filter))
    })?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| CacheError::InvalidArgument(e.to_string()))?;
    Ok(FieldFilter::new(field, Operator::Equal, Value::from_json(value)))
}

fn describe(doc: &MaybeDocument) -> Result<String> {
    let rendered = match doc {
        MaybeDocument::Document(doc) => {
            let fields: serde_json::Map<String, serde_json::Value> = doc
                .fields()
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            let fields = serde_json::to_string(&fields)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            format!("/{} @ {} {}", doc.key(), doc.version(), fields)
        }
        MaybeDocument::NoDocument(doc) => {
            format!("/{} @ {} (missing)", doc.key(), doc.version())
        }
        MaybeDocument::UnknownDocument(doc) => {
            format!("/{} @ {} (contents unknown)", doc.key(), doc.version())
        }
    };
    Ok(rendered)
}
