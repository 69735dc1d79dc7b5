//! Shared test utilities: a scriptable remote API and store helpers.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

use crate::record::PendingRecord;
use crate::remote::{RemoteApi, RemoteError, Result};
use crate::store::LocalStore;

/// How the fake server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accept,
    Reject,
    ServerError,
    Unreachable,
}

/// In-process stand-in for the remote API that records every request.
///
/// A gated remote holds each batch request until [`FakeRemote::release`] is
/// called, so tests can act while a flush is in flight.
#[derive(Debug)]
pub struct FakeRemote {
    reply: Mutex<Reply>,
    creates: Mutex<Vec<PendingRecord>>,
    batches: Mutex<Vec<Vec<PendingRecord>>>,
    gated: bool,
    entered: Notify,
    release: Semaphore,
}

impl FakeRemote {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            creates: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            gated: false,
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    pub fn gated(reply: Reply) -> Self {
        Self {
            gated: true,
            ..Self::new(reply)
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn creates(&self) -> Vec<PendingRecord> {
        self.creates.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<PendingRecord>> {
        self.batches.lock().unwrap().clone()
    }

    /// Wait until a batch request has arrived.
    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("no batch request arrived");
    }

    /// Let one held batch request complete.
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    fn respond(&self, echo: Value) -> Result<Value> {
        let reply = *self.reply.lock().unwrap();
        match reply {
            Reply::Accept => Ok(echo),
            Reply::Reject => Err(RemoteError::Rejected {
                message: "validation failed".to_string(),
            }),
            Reply::ServerError => Err(RemoteError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
            Reply::Unreachable => Err(RemoteError::Unreachable(
                "connection refused".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn create(&self, record: &PendingRecord) -> Result<Value> {
        self.creates.lock().unwrap().push(record.clone());
        self.respond(record.as_value().clone())
    }

    async fn submit_batch(&self, records: &[PendingRecord]) -> Result<Value> {
        self.batches.lock().unwrap().push(records.to_vec());
        self.entered.notify_one();
        if self.gated {
            self.release.acquire().await.unwrap().forget();
        }
        self.respond(Value::Array(
            records.iter().map(|r| r.as_value().clone()).collect(),
        ))
    }

    fn endpoint(&self) -> String {
        "fake://api/pizzas".to_string()
    }
}

pub fn record(name: &str) -> PendingRecord {
    PendingRecord::new(json!({ "pizzaName": name, "size": "Medium" }))
}

pub async fn open_store() -> LocalStore {
    let store = LocalStore::in_memory(0);
    store.open().await.unwrap();
    store
}

/// Poll `check` until it returns true, failing after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition was never reached");
}
