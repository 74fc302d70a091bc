//! NSDB Server - Unix socket server for the namespace hierarchy
//!
//! Provides a MessagePack-based protocol for hierarchy operations.
//! Multiple clients can connect and share the same hierarchy; every request
//! is executed by a single engine worker.
//!
//! Usage:
//!   nsdb-server /path/to/hierarchy.nsdb [--socket /tmp/nsdb.sock] [--config nsdb.json]
//!   nsdb-server --memory [--socket /tmp/nsdb.sock]
//!
//! Protocol:
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

// Import from library
use nsdb::error::Result;
use nsdb::graph::{filter_by_parent, BackfillReport, PresenceFilter, Violation};
use nsdb::path::{reduce_to_superset, NodeId, TraversalIds};
use nsdb::resolver::{EngineConfig, Order};
use nsdb::storage::NodeRecord;
use nsdb::worker::EngineHandle;

const DEFAULT_SOCKET: &str = "/tmp/nsdb.sock";
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

// ============================================================================
// Wire Protocol Types
// ============================================================================

/// Request from client
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    // Write operations
    CreateNode {
        id: NodeId,
        #[serde(default, rename = "parentId")]
        parent_id: Option<NodeId>,
        #[serde(default)]
        name: Option<String>,
    },
    Reparent {
        id: NodeId,
        #[serde(default, rename = "newParent")]
        new_parent: Option<NodeId>,
    },
    DeleteNode {
        id: NodeId,
        #[serde(default)]
        cascade: bool,
    },

    // Read operations
    GetNode { id: NodeId },
    ListNodes {
        #[serde(default)]
        filter: Option<String>,
    },

    // Hierarchy queries
    Ancestors {
        ids: Vec<NodeId>,
        #[serde(default, rename = "includeSelf")]
        include_self: bool,
        #[serde(default)]
        upto: Vec<NodeId>,
        #[serde(default)]
        order: Order,
    },
    Descendants {
        ids: Vec<NodeId>,
        #[serde(default, rename = "includeSelf")]
        include_self: bool,
    },
    Roots { ids: Vec<NodeId> },
    RootAncestor { id: NodeId },
    Hierarchy { id: NodeId },
    Children { id: NodeId },
    InHierarchy { ids: Vec<NodeId> },
    IsAncestor { ancestor: NodeId, node: NodeId },
    ReduceSuperset { paths: Vec<Vec<NodeId>> },
    ExplainAncestors {
        ids: Vec<NodeId>,
        #[serde(default, rename = "includeSelf")]
        include_self: bool,
        #[serde(default)]
        upto: Vec<NodeId>,
        #[serde(default)]
        order: Order,
    },
    ExplainDescendants {
        ids: Vec<NodeId>,
        #[serde(default, rename = "includeSelf")]
        include_self: bool,
    },

    // Maintenance
    Backfill {
        #[serde(default, rename = "batchSize")]
        batch_size: Option<usize>,
    },
    Verify,

    // Stats
    NodeCount,

    // Control
    Flush,
    Ping,
    Shutdown,
}

/// Response to client
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: bool },
    Error { error: String },
    Node { node: Option<WireNode> },
    Nodes { nodes: Vec<WireNode> },
    Paths { paths: Vec<Vec<NodeId>> },
    Bool { value: bool },
    Sql { sql: Option<String> },
    Count { count: usize },
    Backfill { report: BackfillReport },
    Violations { violations: Vec<Violation> },
    Pong { pong: bool, version: String },
}

/// Node representation for wire protocol
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub traversal_ids: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn record_to_wire_node(record: NodeRecord) -> WireNode {
    WireNode {
        id: record.id,
        parent_id: record.parent_id,
        traversal_ids: record.traversal_ids.into_inner(),
        name: record.name,
    }
}

fn nodes_response(result: Result<Vec<NodeRecord>>) -> Response {
    respond(result, |nodes| Response::Nodes {
        nodes: nodes.into_iter().map(record_to_wire_node).collect(),
    })
}

fn respond<T>(result: Result<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => Response::Error { error: e.to_string() },
    }
}

// ============================================================================
// Request Handler
// ============================================================================

fn handle_request(engine: &EngineHandle, request: Request) -> Response {
    match request {
        // Write operations
        Request::CreateNode { id, parent_id, name } => respond(engine.create_node(id, parent_id, name), |node| {
            Response::Node {
                node: Some(record_to_wire_node(node)),
            }
        }),
        Request::Reparent { id, new_parent } => {
            respond(engine.reparent(id, new_parent), |count| Response::Count { count })
        }
        Request::DeleteNode { id, cascade } => {
            respond(engine.delete_node(id, cascade), |count| Response::Count { count })
        }

        // Read operations
        Request::GetNode { id } => respond(engine.get_node(id), |node| Response::Node {
            node: node.map(record_to_wire_node),
        }),
        Request::ListNodes { filter } => nodes_response(engine.list_nodes(PresenceFilter::Any).and_then(|nodes| {
            match filter.as_deref() {
                Some(name) => filter_by_parent(nodes, name),
                None => Ok(nodes),
            }
        })),

        // Hierarchy queries
        Request::Ancestors {
            ids,
            include_self,
            upto,
            order,
        } => nodes_response(engine.ancestors(ids, include_self, upto, order)),
        Request::Descendants { ids, include_self } => nodes_response(engine.descendants(ids, include_self)),
        Request::Roots { ids } => nodes_response(engine.roots(ids)),
        Request::RootAncestor { id } => respond(engine.root_ancestor(id), |node| Response::Node {
            node: Some(record_to_wire_node(node)),
        }),
        Request::Hierarchy { id } => nodes_response(engine.hierarchy(id)),
        Request::Children { id } => nodes_response(engine.children(id)),
        Request::InHierarchy { ids } => nodes_response(engine.in_hierarchy(ids)),
        Request::IsAncestor { ancestor, node } => {
            respond(engine.is_ancestor_of(ancestor, node), |value| Response::Bool { value })
        }
        Request::ExplainAncestors {
            ids,
            include_self,
            upto,
            order,
        } => respond(engine.explain_ancestors(ids, include_self, upto, order), |sql| Response::Sql { sql }),
        Request::ExplainDescendants { ids, include_self } => {
            respond(engine.explain_descendants(ids, include_self), |sql| Response::Sql { sql })
        }
        Request::ReduceSuperset { paths } => {
            let paths: Vec<TraversalIds> = paths.into_iter().map(TraversalIds::new).collect();
            Response::Paths {
                paths: reduce_to_superset(&paths)
                    .into_iter()
                    .map(TraversalIds::into_inner)
                    .collect(),
            }
        }

        // Maintenance
        Request::Backfill { batch_size } => {
            respond(engine.backfill(batch_size), |report| Response::Backfill { report })
        }
        Request::Verify => respond(engine.verify(), |violations| Response::Violations { violations }),

        // Stats
        Request::NodeCount => respond(engine.node_count(), |count| Response::Count { count }),

        // Control
        Request::Flush => respond(engine.flush(), |()| Response::Ok { ok: true }),
        Request::Ping => Response::Pong {
            pong: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        Request::Shutdown => respond(engine.flush(), |()| Response::Ok { ok: true }),
    }
}

// ============================================================================
// Client Connection Handler
// ============================================================================

fn read_message(stream: &mut UnixStream) -> std::io::Result<Option<Vec<u8>>> {
    // Read 4-byte length prefix (big-endian)
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(Some(buf))
}

fn write_message(stream: &mut UnixStream, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    stream.flush()?;
    Ok(())
}

fn send_response(stream: &mut UnixStream, response: &Response) -> std::io::Result<()> {
    // to_vec_named keeps field names on the wire
    match rmp_serde::to_vec_named(response) {
        Ok(bytes) => write_message(stream, &bytes),
        Err(e) => {
            tracing::error!("Serialize error: {}", e);
            Ok(())
        }
    }
}

fn handle_client(mut stream: UnixStream, engine: Arc<EngineHandle>, socket_path: Arc<PathBuf>, client_id: usize) {
    tracing::info!("Client {} connected", client_id);

    loop {
        let msg = match read_message(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::info!("Client {} disconnected", client_id);
                break;
            }
            Err(e) => {
                tracing::warn!("Client {} read error: {}", client_id, e);
                break;
            }
        };

        let request: Request = match rmp_serde::from_slice(&msg) {
            Ok(req) => req,
            Err(e) => {
                let response = Response::Error {
                    error: format!("Invalid request: {}", e),
                };
                if send_response(&mut stream, &response).is_err() {
                    break;
                }
                continue;
            }
        };

        let is_shutdown = matches!(request, Request::Shutdown);
        let response = handle_request(&engine, request);

        if let Err(e) = send_response(&mut stream, &response) {
            tracing::warn!("Client {} write error: {}", client_id, e);
            break;
        }

        if is_shutdown {
            tracing::info!("Shutdown requested by client {}", client_id);
            let _ = std::fs::remove_file(socket_path.as_path());
            std::process::exit(0);
        }
    }
}

// ============================================================================
// Main
// ============================================================================

struct Args {
    db_path: Option<PathBuf>,
    socket_path: PathBuf,
    config_path: Option<PathBuf>,
    memory: bool,
}

fn print_usage() {
    eprintln!("Usage: nsdb-server <db-path> [--socket <socket-path>] [--config <file.json>]");
    eprintln!("       nsdb-server --memory [--socket <socket-path>] [--config <file.json>]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <db-path>      Path to hierarchy database (.nsdb)");
    eprintln!("  --memory       Keep the hierarchy in memory only");
    eprintln!("  --socket       Unix socket path (default: {})", DEFAULT_SOCKET);
    eprintln!("  --config       JSON engine config (strategy switches, batch size)");
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        db_path: None,
        socket_path: PathBuf::from(DEFAULT_SOCKET),
        config_path: None,
        memory: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--socket" => parsed.socket_path = args.next().context("--socket needs a path")?.into(),
            "--config" => parsed.config_path = Some(args.next().context("--config needs a path")?.into()),
            "--memory" => parsed.memory = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            path => parsed.db_path = Some(PathBuf::from(path)),
        }
    }

    if parsed.db_path.is_none() && !parsed.memory {
        print_usage();
        bail!("either <db-path> or --memory is required");
    }
    Ok(parsed)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = parse_args()?;

    let config = match &args.config_path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))?,
        None => EngineConfig::default(),
    };

    let engine = match (&args.db_path, args.memory) {
        (Some(path), false) => {
            tracing::info!("Opening database: {:?}", path);
            EngineHandle::open(path, config).with_context(|| format!("Failed to open database {:?}", path))?
        }
        _ => {
            tracing::info!("Using in-memory hierarchy");
            EngineHandle::in_memory(config)
        }
    };
    let engine = Arc::new(engine);
    tracing::info!("Hierarchy ready: {} nodes", engine.node_count()?);

    // Remove stale socket file
    let _ = std::fs::remove_file(&args.socket_path);
    let listener = UnixListener::bind(&args.socket_path)
        .with_context(|| format!("Failed to bind socket {:?}", args.socket_path))?;
    tracing::info!("Listening on {:?}", args.socket_path);

    let socket_path = Arc::new(args.socket_path);

    // Set up signal handler for graceful shutdown
    let engine_for_signal = Arc::clone(&engine);
    let socket_path_for_signal = Arc::clone(&socket_path);
    let mut signals = signal_hook::iterator::Signals::new([signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM])
        .context("Failed to register signal handlers")?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("Received signal {}, flushing...", sig);
            match engine_for_signal.flush() {
                Ok(()) => tracing::info!("Flush complete"),
                Err(e) => tracing::error!("Flush failed: {}", e),
            }
            let _ = std::fs::remove_file(socket_path_for_signal.as_path());
            tracing::info!("Exiting");
            std::process::exit(0);
        }
    });

    // Accept connections
    let mut client_id = 0;
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                client_id += 1;
                let engine = Arc::clone(&engine);
                let socket_path = Arc::clone(&socket_path);
                let id = client_id;
                thread::spawn(move || handle_client(stream, engine, socket_path, id));
            }
            Err(e) => {
                tracing::warn!("Accept error: {}", e);
            }
        }
    }

    Ok(())
}
