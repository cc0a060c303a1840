use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use tracker_docs::HttpDocsGateway;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, tracker_root};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::scheduler::{DocumentScheduler, SyncJob};

pub const ENV_LOG_JSON: &str = "GRANT_TRACKER_LOG_JSON";

/// State shared by every socket client.
#[derive(Clone)]
struct ServerState {
    home: PathBuf,
    scheduler: DocumentScheduler,
    default_approvers: Arc<Vec<String>>,
    shutdown: broadcast::Sender<()>,
    started_at_unix: u64,
    last_sync_at_unix: Arc<AtomicU64>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let config = tracker_core::config::load_at(home)?;
    let gateway = HttpDocsGateway::from_config(&config, home)?;
    let scheduler = DocumentScheduler::new(Arc::new(gateway), config.provision_concurrency);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), scheduler, config.default_approvers))
}

/// Run the daemon until a `stop` request or ctrl-c.
pub async fn run(
    home: PathBuf,
    scheduler: DocumentScheduler,
    default_approvers: Vec<String>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let state = ServerState {
        home,
        scheduler,
        default_approvers: Arc::new(default_approvers),
        shutdown: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
        last_sync_at_unix: Arc::new(AtomicU64::new(0)),
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(
        socket = %socket_path(&state.home).display(),
        concurrency = state.scheduler.stats().concurrency,
        "daemon started",
    );

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    state: ServerState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, state: ServerState) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state)),
            "sync" => handle_sync(&state, request).await,
            "stop" => {
                let _ = state.shutdown.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn handle_sync(state: &ServerState, request: DaemonRequest) -> DaemonResponse {
    let (Some(document), Some(grant)) = (request.document, request.grant) else {
        return DaemonResponse::error("sync needs both a document and a grant");
    };
    let approvers = request
        .approvers
        .unwrap_or_else(|| state.default_approvers.as_ref().clone());

    let job = SyncJob {
        document,
        grant,
        approvers,
    };
    match state.scheduler.submit(job).await {
        Ok(report) => {
            state
                .last_sync_at_unix
                .store(unix_seconds_now(), Ordering::SeqCst);
            match serde_json::to_value(&report) {
                Ok(data) => DaemonResponse::ok(data),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

fn build_status_payload(state: &ServerState) -> Value {
    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "last_sync_at_unix": state.last_sync_at_unix.load(Ordering::SeqCst),
        "socket": socket_path(&state.home).display().to_string(),
        "scheduler": state.scheduler.stats(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = tracker_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Human-readable logs by default; one JSON object per line when
/// `GRANT_TRACKER_LOG_JSON` is set.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os(ENV_LOG_JSON).is_some() {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{request_status, request_stop, request_sync, send_request};
    use tempfile::TempDir;
    use tracker_core::GrantRecord;
    use tracker_docs::{DocumentBuilder, MemoryDocsGateway, SectionOutcome};

    fn state_for(home: &Path) -> ServerState {
        let (shutdown, _) = broadcast::channel(4);
        ServerState {
            home: home.to_path_buf(),
            scheduler: DocumentScheduler::new(Arc::new(MemoryDocsGateway::new()), 2),
            default_approvers: Arc::new(vec!["Ada Lovelace".to_string()]),
            shutdown,
            started_at_unix: 42,
            last_sync_at_unix: Arc::new(AtomicU64::new(0)),
        }
    }

    #[test]
    fn status_payload_reports_scheduler() {
        let home = TempDir::new().unwrap();
        let payload = build_status_payload(&state_for(home.path()));
        assert_eq!(payload["running"], true);
        assert_eq!(payload["started_at_unix"], 42);
        assert_eq!(payload["last_sync_at_unix"], 0);
        assert_eq!(payload["scheduler"]["concurrency"], 2);
        assert!(payload["socket"].as_str().unwrap().ends_with("daemon.sock"));
    }

    #[tokio::test]
    async fn sync_without_grant_is_rejected() {
        let home = TempDir::new().unwrap();
        let mut request = DaemonRequest::command("sync");
        request.document = Some("doc-1".to_string());
        let response = handle_sync(&state_for(home.path()), request).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("grant"));
    }

    #[test]
    fn stale_socket_file_is_removed() {
        let home = TempDir::new().unwrap();
        let socket = home.path().join("daemon.sock");
        fs::write(&socket, b"").unwrap();
        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_round_trip_syncs_and_stops() {
        let home = TempDir::new().unwrap();
        let docs = Arc::new(MemoryDocsGateway::new());
        docs.insert("doc-1", DocumentBuilder::new().paragraph("Project notes"));
        let scheduler = DocumentScheduler::new(docs.clone(), 2);

        let daemon = tokio::spawn(run(
            home.path().to_path_buf(),
            scheduler,
            vec!["Ada Lovelace".to_string()],
        ));

        let client_home = home.path().to_path_buf();
        let (status, report, unknown) = tokio::task::spawn_blocking(move || {
            let status = request_status(&client_home).expect("status");
            let mut grant = GrantRecord::new("G-1");
            grant.title = "Packaging audit".to_string();
            let report = request_sync(
                &client_home,
                "https://docs.google.com/document/d/doc-1/edit",
                &grant,
                None,
            )
            .expect("sync");
            let unknown =
                send_request(&client_home, &DaemonRequest::command("reload")).expect("send");
            request_stop(&client_home).expect("stop");
            (status, report, unknown)
        })
        .await
        .unwrap();

        daemon.await.unwrap().expect("daemon exits cleanly");

        assert_eq!(status["running"], true);
        assert_eq!(report.metadata, SectionOutcome::Created);
        assert_eq!(report.approvals, SectionOutcome::Created);
        assert!(!unknown.ok);
        assert!(!socket_path(home.path()).exists());
        assert!(docs.batch_count() > 0);
    }
}
