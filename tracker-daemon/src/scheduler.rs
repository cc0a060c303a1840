//! Per-document single-flight scheduling of syncs.
//!
//! Syncs for the same document run strictly one at a time, in the order they
//! were submitted; two interleaved syncs would read each other's half-built
//! sections. Syncs for different documents run concurrently, bounded by a
//! semaphore sized from `provision_concurrency`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Semaphore};

use tracker_core::{DocumentId, GrantRecord};
use tracker_docs::{resolve_document, sync_grant_to_doc, DocsGateway, SyncReport};

use crate::error::DaemonError;

pub type SharedGateway = Arc<dyn DocsGateway + Send + Sync>;

/// One grant to project into one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub document: String,
    pub grant: GrantRecord,
    #[serde(default)]
    pub approvers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub concurrency: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct DocumentScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: SharedGateway,
    permits: Semaphore,
    concurrency: usize,
    /// Ticket and release signal of the most recently submitted job per
    /// document. Removed once that job finishes with nobody queued behind it.
    tails: Mutex<HashMap<DocumentId, (u64, oneshot::Receiver<()>)>>,
    next_ticket: AtomicU64,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// A place in one document's queue. Dropping it lets the next job run.
///
/// It travels into the blocking sync itself, so the document stays locked
/// until the sync returns even if whoever submitted the job stops waiting.
struct Turn {
    inner: Arc<Inner>,
    document_id: DocumentId,
    ticket: u64,
    previous: Option<oneshot::Receiver<()>>,
    _release: oneshot::Sender<()>,
}

impl DocumentScheduler {
    pub fn new(gateway: SharedGateway, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                gateway,
                permits: Semaphore::new(concurrency),
                concurrency,
                tails: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            concurrency: self.inner.concurrency,
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Queue `job` behind earlier jobs for the same document.
    ///
    /// The job is started on the current tokio runtime right away, so its
    /// queue position is taken here rather than when the returned future is
    /// first polled. Dropping the future does not cancel the job.
    pub fn submit(
        &self,
        job: SyncJob,
    ) -> impl Future<Output = Result<SyncReport, DaemonError>> + Send + 'static {
        let spawned = resolve_document(&job.document)
            .map_err(DaemonError::from)
            .and_then(|document_id| {
                let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                    DaemonError::Protocol("sync submitted outside a tokio runtime".to_string())
                })?;
                let turn = Turn::take(&self.inner, document_id);
                Ok(runtime.spawn(Arc::clone(&self.inner).run(turn, job)))
            });

        async move {
            spawned?.await.unwrap_or_else(|err| {
                Err(DaemonError::Protocol(format!("sync task join error: {err}")))
            })
        }
    }

    /// Run every job, concurrently where documents differ, and return the
    /// results in input order.
    pub async fn run_all(&self, jobs: Vec<SyncJob>) -> Vec<(String, Result<SyncReport, DaemonError>)> {
        let pending: Vec<_> = jobs
            .into_iter()
            .map(|job| (job.document.clone(), self.submit(job)))
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for (document, outcome) in pending {
            results.push((document, outcome.await));
        }
        results
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut turn: Turn, job: SyncJob) -> Result<SyncReport, DaemonError> {
        turn.wait().await;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DaemonError::Protocol("scheduler closed".to_string()))?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let document_id = turn.document_id.clone();
        let gateway = Arc::clone(&self.gateway);
        let joined = tokio::task::spawn_blocking(move || {
            let result =
                sync_grant_to_doc(gateway.as_ref(), &job.document, &job.grant, &job.approvers);
            drop(turn);
            result
        })
        .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = match joined {
            Ok(result) => result.map_err(DaemonError::from),
            Err(err) => Err(DaemonError::Protocol(format!("sync task join error: {err}"))),
        };
        match &outcome {
            Ok(report) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    document = %document_id.masked(),
                    metadata = ?report.metadata,
                    approvals = ?report.approvals,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync finished",
                );
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(document = %document_id.masked(), error = %err, "sync failed");
            }
        }
        outcome
    }

    fn lock_tails(&self) -> MutexGuard<'_, HashMap<DocumentId, (u64, oneshot::Receiver<()>)>> {
        self.tails
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Turn {
    fn take(inner: &Arc<Inner>, document_id: DocumentId) -> Self {
        let ticket = inner.next_ticket.fetch_add(1, Ordering::SeqCst);
        let (release, tail) = oneshot::channel();
        let previous = inner
            .lock_tails()
            .insert(document_id.clone(), (ticket, tail))
            .map(|(_, previous)| previous);
        Self {
            inner: Arc::clone(inner),
            document_id,
            ticket,
            previous,
            _release: release,
        }
    }

    async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // An error means the earlier job dropped its turn: it is done.
            let _ = previous.await;
        }
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let mut tails = self.inner.lock_tails();
        if tails
            .get(&self.document_id)
            .is_some_and(|(ticket, _)| *ticket == self.ticket)
        {
            tails.remove(&self.document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use tracker_core::SectionName;
    use tracker_docs::wire::{BatchUpdateResponse, Document, Request};
    use tracker_docs::{
        get_snapshot, locate, DocsError, DocumentBuilder, MemoryDocsGateway, SectionOutcome,
    };

    /// Counts gateway calls that overlap in time.
    struct Probe {
        docs: MemoryDocsGateway,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl Probe {
        fn new(documents: &[&str]) -> Arc<Self> {
            let docs = MemoryDocsGateway::new();
            for id in documents {
                docs.insert(id, DocumentBuilder::new().paragraph("Notes"));
            }
            Arc::new(Self {
                docs,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }

        fn observe<T>(&self, call: impl FnOnce() -> T) -> T {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            let result = call();
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    impl DocsGateway for Probe {
        fn get_document(&self, document_id: &DocumentId) -> Result<Document, DocsError> {
            self.observe(|| self.docs.get_document(document_id))
        }

        fn batch_update(
            &self,
            document_id: &DocumentId,
            requests: &[Request],
        ) -> Result<BatchUpdateResponse, DocsError> {
            self.observe(|| self.docs.batch_update(document_id, requests))
        }
    }

    fn job(document: &str, status: &str) -> SyncJob {
        let mut grant = GrantRecord::new("G-1");
        grant.status = status.to_string();
        SyncJob {
            document: document.to_string(),
            grant,
            approvers: vec!["Ada Lovelace".to_string()],
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_document_jobs_run_one_at_a_time_in_order() {
        let probe = Probe::new(&["doc-a"]);
        let scheduler = DocumentScheduler::new(probe.clone(), 4);

        let results = scheduler
            .run_all(vec![job("doc-a", "Active"), job("doc-a", "Paused"), job("doc-a", "Finished")])
            .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()), "{results:?}");
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);

        let snapshot = get_snapshot(&probe.docs, &DocumentId::from("doc-a")).unwrap();
        let rows = locate(&snapshot, SectionName::Metadata)
            .and_then(|s| s.table)
            .unwrap()
            .field_rows();
        assert_eq!(rows[3].value, "Finished");
        assert_eq!(snapshot.tables().count(), 2);
        assert_eq!(scheduler.stats().completed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn abandoned_sync_still_holds_its_document() {
        let probe = Probe::new(&["doc-a"]);
        let scheduler = DocumentScheduler::new(probe.clone(), 4);

        let first = scheduler.submit(job("doc-a", "Active"));
        let gave_up = tokio::time::timeout(Duration::from_millis(12), first).await;
        assert!(gave_up.is_err(), "first sync should still be running");

        let second = scheduler
            .submit(job("doc-a", "Paused"))
            .await
            .expect("second sync");
        assert_eq!(second.metadata, SectionOutcome::Recreated);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);

        let snapshot = get_snapshot(&probe.docs, &DocumentId::from("doc-a")).unwrap();
        assert_eq!(snapshot.tables().count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finished_documents_leave_no_queue_entry() {
        let probe = Probe::new(&["doc-1", "doc-2"]);
        let scheduler = DocumentScheduler::new(probe.clone(), 2);

        let results = scheduler
            .run_all(vec![job("doc-1", "Active"), job("doc-2", "Active"), job("doc-1", "Paused")])
            .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(scheduler.inner.lock_tails().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cross_document_concurrency_is_bounded() {
        let ids = ["doc-1", "doc-2", "doc-3", "doc-4", "doc-5"];
        let probe = Probe::new(&ids);
        let scheduler = DocumentScheduler::new(probe.clone(), 2);

        let results = scheduler
            .run_all(ids.iter().map(|id| job(id, "Active")).collect())
            .await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        let max = probe.max_active.load(Ordering::SeqCst);
        assert!((1..=2).contains(&max), "max concurrent calls {max}");
        assert_eq!(scheduler.stats().in_flight, 0);
    }

    #[test]
    fn unresolvable_document_fails_without_gateway_calls() {
        let probe = Probe::new(&[]);
        let scheduler = DocumentScheduler::new(probe.clone(), 1);
        let err = tokio_test::block_on(scheduler.submit(job("not a document url", "Active")))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Docs(DocsError::Malformed(_))), "{err:?}");
        assert_eq!(probe.docs.read_count(), 0);
    }
}
