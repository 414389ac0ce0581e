//! Reference [`Network`] implementation.
//!
//! A small pool of OS threads pulls requests from a shared priority queue.
//! `file://` URLs are read from disk; `http(s)` URLs go through a blocking
//! `reqwest` client owned by each worker, so the client is never created or
//! dropped on the reactor thread.
//!
//! ## Configuration
//!
//! - `fetch_workers` / `YOMU_FETCH_WORKERS`: number of worker threads (default 4)
//! - `fetch_timeout_secs` / `YOMU_FETCH_TIMEOUT_SECS`: per-request timeout (default 30)

use super::network::{pending, Network, NetworkReply, NetworkRequest, PendingReply, ReplyCompleter};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

struct Job {
    request: NetworkRequest,
    completer: ReplyCompleter,
    seq: u64,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // Highest priority first, then FIFO within a priority.
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    jobs: BinaryHeap<Job>,
    next_seq: u64,
    closed: bool,
}

type Shared = Arc<(Mutex<Queue>, Condvar)>;

/// Thread-pool backed fetcher.
pub struct HttpFetcher {
    shared: Shared,
    workers: Vec<JoinHandle<()>>,
}

impl HttpFetcher {
    pub fn new(workers: usize, timeout: Duration) -> std::io::Result<Self> {
        let shared: Shared = Arc::new((Mutex::new(Queue::default()), Condvar::new()));
        let handles = (0..workers.max(1))
            .map(|idx| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("yomu-fetch-{idx}"))
                    .spawn(move || worker_loop(&shared, timeout))
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        debug!(workers = handles.len(), "Fetch pool started");
        Ok(Self {
            shared,
            workers: handles,
        })
    }
}

impl Network for HttpFetcher {
    fn handle_request(&self, request: NetworkRequest) -> PendingReply {
        let (completer, pending_reply) = pending(request.url.clone());
        let (lock, cvar) = &*self.shared;
        match lock.lock() {
            Ok(mut queue) => {
                let seq = queue.next_seq;
                queue.next_seq += 1;
                debug!(url = %request.url, priority = ?request.priority, "Fetch queued");
                queue.jobs.push(Job {
                    request,
                    completer,
                    seq,
                });
                cvar.notify_one();
            }
            Err(_) => {
                error!(url = %request.url, "Fetch queue poisoned");
                completer.complete(NetworkReply::failed(request.url, "fetch queue poisoned"));
            }
        }
        pending_reply
    }
}

impl Drop for HttpFetcher {
    // Workers are detached. A fetch still in flight completes against an
    // abandoned completer and the worker exits on its next pass.
    fn drop(&mut self) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut queue) = lock.lock() {
            queue.closed = true;
            queue.jobs.clear();
        }
        cvar.notify_all();
        debug!(workers = self.workers.len(), "Fetch pool closed");
        self.workers.clear();
    }
}

fn worker_loop(shared: &Shared, timeout: Duration) {
    let (lock, cvar) = &**shared;
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(c) => Some(c),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client; only file:// fetches will work");
            None
        }
    };

    loop {
        let job = {
            let Ok(mut queue) = lock.lock() else { return };
            loop {
                if queue.closed {
                    return;
                }
                if let Some(job) = queue.jobs.pop() {
                    break job;
                }
                queue = match cvar.wait(queue) {
                    Ok(q) => q,
                    Err(_) => return,
                };
            }
        };

        if job.completer.is_abandoned() {
            debug!(url = %job.request.url, "Skipping fetch for abandoned request");
            continue;
        }
        let reply = fetch(client.as_ref(), &job.request);
        job.completer.complete(reply);
    }
}

fn fetch(client: Option<&reqwest::blocking::Client>, request: &NetworkRequest) -> NetworkReply {
    let url = request.url.clone();
    match request.url.scheme() {
        "file" => {
            let Ok(path) = url.to_file_path() else {
                return NetworkReply::failed(url, "invalid file url");
            };
            match std::fs::read(&path) {
                Ok(bytes) => NetworkReply::ok(url, bytes),
                Err(e) => NetworkReply::failed(url, e.to_string()),
            }
        }
        "http" | "https" => {
            let Some(client) = client else {
                return NetworkReply::failed(url, "http client unavailable");
            };
            let mut builder = client.get(url.as_str());
            for (k, v) in &request.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            let response = match builder.send() {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %url, error = %e, "Fetch failed");
                    return NetworkReply::failed(url, e.to_string());
                }
            };
            let status = response.status();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
                .collect();
            if !status.is_success() {
                return NetworkReply::failed(url, format!("upstream returned {status}"));
            }
            match response.bytes() {
                Ok(body) => headers
                    .iter()
                    .fold(NetworkReply::ok(url, body.to_vec()), |reply, (k, v)| {
                        reply.with_header(k, v)
                    }),
                Err(e) => NetworkReply::failed(url, e.to_string()),
            }
        }
        other => NetworkReply::failed(url, format!("unsupported scheme `{other}`")),
    }
}
