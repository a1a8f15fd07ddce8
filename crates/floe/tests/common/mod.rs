//! In-memory stand-ins for the engine, the broker and the admin clients.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use floe::Config;
use floe::assess::{BucketAdmin, CatalogAdmin, CatalogAdminSession};
use floe::engine::{Engine, InsertStatement, QueryResult};
use floe::error::{AssessError, EngineError, StreamError};
use floe::stream::{ConsumerFactory, Delivery, MessageSource};
use tokio_util::sync::CancellationToken;

pub const CONFIG: &str = r#"
source:
  stream:
    host: kafka
    topics: [orders]
    group_id: floe
    table: orders
    batch_size: 10
    poll_timeout_secs: 1
  storage:
    s3a:
      host: minio
      access_key: key
      secret: secret
      scope: bucket1
  postgres:
    pgsrc:
      host: pg
      username: reader
      password: s3cr3t-pg
      database: orders

destination:
  catalog:
    alias: lake
    host: pg
    username: lake
    password: s3cr3t-lake
    database: lake_catalog
  storage:
    alias: lake_files
    host: minio
    access_key: key
    secret: secret
    scope: lake
"#;

pub fn config() -> Config {
    Config::parse(CONFIG).unwrap()
}

/// Fragment that only appears in the catalog attach statement.
pub const CATALOG_ATTACH: &str = "ducklake:postgres:";

struct FailRule {
    pattern: String,
    remaining: Option<usize>,
}

#[derive(Default)]
pub struct EngineState {
    pub executed: Vec<String>,
    pub inserts: Vec<InsertStatement>,
    rules: Vec<FailRule>,
    tables: VecDeque<Vec<String>>,
    results: VecDeque<QueryResult>,
    failing_inserts: usize,
}

impl EngineState {
    pub fn position(&self, fragment: &str) -> Option<usize> {
        self.executed.iter().position(|s| s.contains(fragment))
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.executed.iter().filter(|s| s.contains(fragment)).count()
    }

    pub fn rows_inserted(&self) -> usize {
        self.inserts.iter().map(|i| i.row_count()).sum()
    }
}

/// Records every statement and fails the ones matching a rule.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub state: Arc<Mutex<EngineState>>,
}

impl RecordingEngine {
    /// Every `list_tables` call returns `tables`.
    pub fn with_tables(tables: &[&str]) -> Self {
        let engine = Self::default();
        engine.push_tables(tables);
        engine
    }

    /// Queue the result of the next `list_tables` call. The last one repeats.
    pub fn push_tables(&self, tables: &[&str]) -> &Self {
        let tables = tables.iter().map(|t| t.to_string()).collect();
        self.state.lock().unwrap().tables.push_back(tables);
        self
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str) -> &Self {
        self.add_rule(pattern, None)
    }

    /// Fail the next `times` statements containing `pattern`.
    pub fn fail_times(&self, pattern: &str, times: usize) -> &Self {
        self.add_rule(pattern, Some(times))
    }

    /// Queue the result of the next `query` call. Once drained, queries answer 42.
    pub fn push_query(&self, result: QueryResult) -> &Self {
        self.state.lock().unwrap().results.push_back(result);
        self
    }

    pub fn fail_inserts(&self, count: usize) -> &Self {
        self.state.lock().unwrap().failing_inserts = count;
        self
    }

    fn add_rule(&self, pattern: &str, remaining: Option<usize>) -> &Self {
        self.state.lock().unwrap().rules.push(FailRule {
            pattern: pattern.to_string(),
            remaining,
        });
        self
    }

    pub fn snapshot(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }
}

impl Engine for RecordingEngine {
    fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());

        for rule in state.rules.iter_mut() {
            if !sql.contains(&rule.pattern) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                if *remaining == 0 {
                    continue;
                }
                *remaining -= 1;
            }
            // DuckDB echoes the offending statement in its parser errors.
            return Err(EngineError::Execute {
                statement: sql.to_string(),
                source: format!("rejected by rule '{}': {sql}", rule.pattern).into(),
            });
        }
        Ok(())
    }

    fn list_tables(&mut self, _catalog: &str) -> Result<Vec<String>, EngineError> {
        let mut state = self.state.lock().unwrap();
        let tables = if state.tables.len() > 1 {
            state.tables.pop_front()
        } else {
            state.tables.front().cloned()
        };
        Ok(tables.unwrap_or_default())
    }

    fn insert(&mut self, insert: &InsertStatement) -> Result<usize, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            return Err(EngineError::Insert {
                table: insert.table.clone(),
                source: "constraint violated".into(),
            });
        }
        state.inserts.push(insert.clone());
        Ok(insert.row_count())
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult, EngineError> {
        self.execute(sql)?;
        let scripted = self.state.lock().unwrap().results.pop_front();
        Ok(scripted.unwrap_or_else(|| QueryResult {
            columns: vec!["answer".to_string()],
            rows: vec![vec!["42".to_string()]],
        }))
    }
}

/// One scripted poll result.
pub enum Step {
    Deliver(Delivery),
    /// The poll times out.
    Idle,
    /// Every poll from here on waits out its timeout; shutdown must come from elsewhere.
    Stall,
}

pub fn message(offset: i64, payload: &str) -> Step {
    Step::Deliver(Delivery::Message {
        topic: "orders".to_string(),
        partition: 0,
        offset,
        payload: Some(payload.as_bytes().to_vec()),
    })
}

#[derive(Default)]
pub struct SourceLog {
    pub received: usize,
    /// Number of deliveries handed out when each commit happened.
    pub commits: Vec<usize>,
    pub closed: bool,
}

/// Plays back a script, then requests shutdown.
pub struct ScriptedSource {
    script: VecDeque<Step>,
    log: Arc<Mutex<SourceLog>>,
    shutdown: CancellationToken,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<Step>,
        shutdown: &CancellationToken,
    ) -> (Self, Arc<Mutex<SourceLog>>) {
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let source = Self {
            script: script.into(),
            log: Arc::clone(&log),
            shutdown: shutdown.clone(),
        };
        (source, log)
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn recv(&mut self, timeout: Duration) -> Option<Delivery> {
        match self.script.pop_front() {
            Some(Step::Deliver(delivery)) => {
                self.log.lock().unwrap().received += 1;
                Some(delivery)
            }
            Some(Step::Idle) => None,
            Some(Step::Stall) => {
                tokio::time::sleep(timeout).await;
                self.script.push_front(Step::Stall);
                None
            }
            None => {
                self.shutdown.cancel();
                None
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StreamError> {
        let mut log = self.log.lock().unwrap();
        let received = log.received;
        log.commits.push(received);
        Ok(())
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

/// Hands out one prepared source.
pub struct OneShotFactory {
    source: Mutex<Option<ScriptedSource>>,
}

impl OneShotFactory {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            source: Mutex::new(Some(source)),
        }
    }
}

impl ConsumerFactory for OneShotFactory {
    fn open(&self, group: &str, _topics: &[String]) -> Result<Box<dyn MessageSource>, StreamError> {
        match self.source.lock().unwrap().take() {
            Some(source) => Ok(Box::new(source)),
            None => Err(StreamError::CreateConsumer {
                group: group.to_string(),
                source: "no more scripted sources".into(),
            }),
        }
    }
}

/// Object store with a set of existing buckets and an optional outage.
#[derive(Clone, Default)]
pub struct FakeBuckets {
    pub existing: Arc<Mutex<Vec<String>>>,
    pub created: Arc<Mutex<Vec<String>>>,
    pub failures: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeBuckets {
    pub fn unreachable_for(failures: usize) -> Self {
        let buckets = Self::default();
        buckets.failures.store(failures, Ordering::SeqCst);
        buckets
    }
}

#[async_trait]
impl BucketAdmin for FakeBuckets {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AssessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AssessError::ObjectStorage {
                bucket: bucket.to_string(),
                source: "connection refused".into(),
            });
        }
        Ok(self.existing.lock().unwrap().iter().any(|b| b == bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), AssessError> {
        self.created.lock().unwrap().push(bucket.to_string());
        self.existing.lock().unwrap().push(bucket.to_string());
        Ok(())
    }
}

/// Catalog server holding a list of databases.
#[derive(Clone, Default)]
pub struct FakeCatalogs {
    pub databases: Arc<Mutex<Vec<String>>>,
    pub created: Arc<Mutex<Vec<String>>>,
    pub open_sessions: Arc<AtomicUsize>,
}

struct FakeSession {
    catalogs: FakeCatalogs,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.catalogs.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogAdmin for FakeCatalogs {
    async fn connect(&self) -> Result<Box<dyn CatalogAdminSession>, AssessError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            catalogs: self.clone(),
        }))
    }
}

#[async_trait]
impl CatalogAdminSession for FakeSession {
    async fn database_exists(&self, database: &str) -> Result<bool, AssessError> {
        Ok(self.catalogs.databases.lock().unwrap().iter().any(|d| d == database))
    }

    async fn create_database(&self, database: &str) -> Result<(), AssessError> {
        self.catalogs.created.lock().unwrap().push(database.to_string());
        self.catalogs.databases.lock().unwrap().push(database.to_string());
        Ok(())
    }
}
