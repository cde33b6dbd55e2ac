use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use tenderflow_core::error::{DatabaseErrorKind, Result, TenderError};
use tenderflow_core::traits::GraphClient;
use tenderflow_core::types::Row;

type Call = (String, serde_json::Map<String, serde_json::Value>);

/// Graph client returning canned rows, optionally failing the first calls.
pub struct StubGraphClient {
    rows: Vec<Row>,
    fail_first: u32,
    fail_kind: DatabaseErrorKind,
    calls: AtomicU32,
    received: Mutex<Vec<Call>>,
    databases: Mutex<Vec<Option<String>>>,
}

impl StubGraphClient {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            fail_first: 0,
            fail_kind: DatabaseErrorKind::ServiceUnavailable,
            calls: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
            databases: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Fail the first `n` calls with a database error of `kind`.
    pub fn fail_first(mut self, n: u32, kind: DatabaseErrorKind) -> Self {
        self.fail_first = n;
        self.fail_kind = kind;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query text and parameters of every call, in order.
    pub fn received(&self) -> Vec<Call> {
        self.received.lock().unwrap().clone()
    }

    /// Target database of every call, `None` meaning the client default.
    pub fn databases(&self) -> Vec<Option<String>> {
        self.databases.lock().unwrap().clone()
    }
}

impl GraphClient for StubGraphClient {
    fn execute_query(
        &self,
        query: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        database: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Row>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap()
            .push((query.to_string(), parameters));
        self.databases
            .lock()
            .unwrap()
            .push(database.map(str::to_string));

        Box::pin(async move {
            if n < self.fail_first {
                return Err(TenderError::database(
                    self.fail_kind,
                    format!("stub failure {}", n + 1),
                ));
            }
            Ok(self.rows.clone())
        })
    }
}
