//! Unix socket server for admin commands.
//!
//! Line-delimited JSON: one command per line in, one response per line out.
//! Used by the grid-admin CLI to resolve keys and manage mounts and weights.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grid_kernel::Reply;
use grid_router::Backend;
use grid_trie::{Key, Subtree};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;
use crate::node::NodeState;

/// Admin command sent over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Resolve a key through a reply port
    Resolve { key: String },
    /// Mount named backends at a prefix
    Mount { prefix: String, backends: Vec<String> },
    /// Remove a mount
    Unmount { prefix: String },
    /// Set a backend's weight
    SetWeight { backend: String, weight: i64 },
    /// List mount prefixes and their backends
    ListMounts,
    /// List named backends
    ListBackends,
    /// Write a value through a named backend
    Put { backend: String, key: String, value: String },
    /// Drop a cached region
    Evict { prefix: String },
    /// Ask one backend for the subtree at a prefix, bypassing the trie
    Fetch { backend: String, prefix: String },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Completed { value: String, consumed: usize, args: String },
    NotFound,
    TimedOut,
    Subtree { tree: Option<Subtree> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: impl AsRef<Path>) -> Self {
        Self {
            state,
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn done(result: Result<()>, message: String) -> AdminResponse {
    match result {
        Ok(()) => {
            tracing::info!("{}", message);
            AdminResponse::Ok { message }
        }
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

/// Run one admin command against the node.
pub async fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    match cmd {
        AdminCommand::Resolve { key } => match state.request(&key).await {
            Ok(Reply::Completed(completion)) => AdminResponse::Completed {
                value: String::from_utf8_lossy(completion.value.as_bytes()).into_owned(),
                consumed: completion.consumed,
                args: String::from_utf8_lossy(completion.args(key.as_bytes())).into_owned(),
            },
            Ok(Reply::NotFound) => AdminResponse::NotFound,
            Ok(Reply::TimedOut) => AdminResponse::TimedOut,
            Ok(Reply::Failed(e)) => AdminResponse::Error {
                error: e.to_string(),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Mount { prefix, backends } => {
            let message = format!("Mounted {:?} -> {}", prefix, backends.join(", "));
            done(state.mount(&prefix, &backends), message)
        }

        AdminCommand::Unmount { prefix } => {
            let message = format!("Unmounted {:?}", prefix);
            done(state.unmount(&prefix), message)
        }

        AdminCommand::SetWeight { backend, weight } => {
            let version = state.kernel().weights().set_weight(backend.as_str(), weight);
            let message = format!("Weight of {} set to {} (version {})", backend, weight, version);
            done(Ok(()), message)
        }

        AdminCommand::ListMounts => {
            let mounts = state.kernel().resolver().mounts();
            let items = mounts
                .iter()
                .map(|m| {
                    let ids: Vec<String> = m.backends.iter().map(|b| b.id().to_string()).collect();
                    format!("{} -> {}", m.prefix, ids.join(", "))
                })
                .collect();
            AdminResponse::List { items }
        }

        AdminCommand::ListBackends => AdminResponse::List {
            items: state.backend_ids(),
        },

        AdminCommand::Put {
            backend,
            key,
            value,
        } => {
            let message = format!("Wrote {:?} via {}", key, backend);
            done(state.put(&backend, &key, &value), message)
        }

        AdminCommand::Evict { prefix } => match state.kernel().evict(prefix.as_bytes()) {
            Ok(evicted) => AdminResponse::Ok {
                message: if evicted {
                    format!("Evicted {:?}", prefix)
                } else {
                    format!("Nothing cached at {:?}", prefix)
                },
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Fetch { backend, prefix } => {
            let node_backend = match state.backend(&backend) {
                Ok(b) => b.as_backend(),
                Err(e) => {
                    return AdminResponse::Error {
                        error: e.to_string(),
                    }
                }
            };
            match node_backend.fetch(&Key::from(prefix)).await {
                Ok(grid_router::Fetched::Subtree(tree)) => AdminResponse::Subtree { tree: Some(tree) },
                Ok(grid_router::Fetched::Absent) => AdminResponse::Subtree { tree: None },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    let data_dir = std::env::var("GRID_DATA_DIR").unwrap_or_else(|_| "./grid-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBackend;
    use grid_kernel::{Kernel, KernelConfig};
    use grid_router::{MemoryBackend, WeightTable};
    use tempfile::tempdir;

    fn state() -> Arc<NodeState> {
        let state = NodeState::new(Kernel::new(KernelConfig::fast(), Arc::new(WeightTable::new())));
        let mem = MemoryBackend::new("mem");
        mem.insert("exec", "run");
        state.add_backend(NodeBackend::Memory(Arc::new(mem))).unwrap();
        Arc::new(state)
    }

    #[test]
    fn commands_use_snake_case_tags() {
        let cmd: AdminCommand = serde_json::from_str(r#"{"cmd":"set_weight","backend":"a","weight":3}"#).unwrap();
        assert_eq!(
            cmd,
            AdminCommand::SetWeight {
                backend: "a".into(),
                weight: 3
            }
        );
        let json = serde_json::to_string(&AdminResponse::Pong).unwrap();
        assert_eq!(json, r#"{"status":"pong"}"#);
    }

    #[tokio::test]
    async fn mount_then_resolve_with_args() {
        let state = state();
        let mounted = execute_command(
            AdminCommand::Mount {
                prefix: "e".into(),
                backends: vec!["mem".into()],
            },
            &state,
        )
        .await;
        assert!(matches!(mounted, AdminResponse::Ok { .. }));

        let resolved = execute_command(AdminCommand::Resolve { key: "exec ls".into() }, &state).await;
        assert_eq!(
            resolved,
            AdminResponse::Completed {
                value: "run".into(),
                consumed: 4,
                args: " ls".into()
            }
        );

        let listed = execute_command(AdminCommand::ListMounts, &state).await;
        assert_eq!(
            listed,
            AdminResponse::List {
                items: vec!["\"e\" -> mem".into()]
            }
        );
    }

    #[tokio::test]
    async fn errors_are_reported_not_raised() {
        let state = state();
        let resp = execute_command(
            AdminCommand::Mount {
                prefix: "x".into(),
                backends: vec!["ghost".into()],
            },
            &state,
        )
        .await;
        assert!(matches!(resp, AdminResponse::Error { .. }));

        let resp = execute_command(AdminCommand::Unmount { prefix: "x".into() }, &state).await;
        assert!(matches!(resp, AdminResponse::Error { .. }));
    }

    #[tokio::test]
    async fn fetch_bypasses_trie() {
        let state = state();
        let resp = execute_command(
            AdminCommand::Fetch {
                backend: "mem".into(),
                prefix: "ex".into(),
            },
            &state,
        )
        .await;
        let AdminResponse::Subtree { tree: Some(tree) } = resp else {
            panic!("expected subtree, got {resp:?}");
        };
        assert_eq!(tree.get(b"ec").and_then(|v| v.as_str()), Some("run"));
        assert_eq!(state.kernel().resolver().node_count(), 1);
    }

    #[tokio::test]
    async fn socket_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let socket = AdminSocket::new(state(), &path);
        let server = tokio::spawn(async move { socket.run().await });

        let stream = loop {
            match UnixStream::connect(&path).await {
                Ok(s) => break s,
                Err(_) => tokio::task::yield_now().await,
            }
        };
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        writer.write_all(b"{\"cmd\":\"ping\"}\nnot json\n").await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(serde_json::from_str::<AdminResponse>(&line).unwrap(), AdminResponse::Pong);

        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(matches!(
            serde_json::from_str::<AdminResponse>(&line).unwrap(),
            AdminResponse::Error { .. }
        ));

        server.abort();
    }
}
