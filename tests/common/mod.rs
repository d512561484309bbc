#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use atomic_commit::core::domain::branch::{BranchDescriptor, ResourceManagerKind};
use atomic_commit::core::domain::classifier::{BackendError, ErrorClassifier};
use atomic_commit::core::domain::global_id::GlobalId;
use atomic_commit::core::domain::registry::ResourceManagerRegistry;
use atomic_commit::core::domain::statement::Statement;
use atomic_commit::core::domain::transaction::{
    BranchHandle, Operation, ResourceManager, TransactionError,
};

/// Commands sent to every scripted backend, in the order they were sent.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, target: &str, command: impl Into<String>) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{target}: {}", command.into()));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.contains(needle))
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Begin,
    Execute,
    Prepare,
    Commit,
    Rollback,
    Recover,
    CommitPrepared,
    RollbackPrepared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// A generic backend error.
    Error,
    /// The backend's "unknown transaction" response.
    NotFound,
    /// The call never completes.
    Hang,
    /// Prepare reports success but the backend keeps nothing.
    Forget,
    /// The backend applies the call, then the reply is lost.
    LostReply,
    /// The backend applies the call, then the call never completes.
    AppliedThenHang,
}

#[derive(Default)]
struct BackendState {
    failures: HashMap<Step, Failure>,
    rows: Vec<(String, u64)>,
    prepared: BTreeSet<String>,
    committed: Vec<String>,
    rolled_back: Vec<String>,
    released_clean: usize,
    released_closed: usize,
}

/// In-memory stand-in for one backend. Prepared transactions live in the
/// backend, not in the handle, so they outlive the coordinator like real
/// ones do.
pub struct ScriptedBackend {
    target: String,
    kind: ResourceManagerKind,
    journal: Journal,
    classifier: ErrorClassifier,
    state: Mutex<BackendState>,
}

impl ScriptedBackend {
    pub fn new(target: &str, kind: ResourceManagerKind, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            target: target.to_string(),
            kind,
            journal,
            classifier: ErrorClassifier::new(kind),
            state: Mutex::new(BackendState::default()),
        })
    }

    pub fn fail(&self, step: Step, failure: Failure) {
        self.state.lock().unwrap().failures.insert(step, failure);
    }

    pub fn heal(&self, step: Step) {
        self.state.lock().unwrap().failures.remove(&step);
    }

    /// Statements containing `needle` report `rows` affected (default 1).
    pub fn rows(&self, needle: &str, rows: u64) {
        self.state
            .lock()
            .unwrap()
            .rows
            .push((needle.to_string(), rows));
    }

    /// Leaves a prepared transaction behind, as a crashed coordinator would.
    pub fn seed_prepared(&self, id: &str) {
        self.state.lock().unwrap().prepared.insert(id.to_string());
    }

    pub fn prepared(&self) -> Vec<String> {
        self.state.lock().unwrap().prepared.iter().cloned().collect()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn rolled_back(&self) -> Vec<String> {
        self.state.lock().unwrap().rolled_back.clone()
    }

    pub fn released_clean(&self) -> usize {
        self.state.lock().unwrap().released_clean
    }

    pub fn released_closed(&self) -> usize {
        self.state.lock().unwrap().released_closed
    }

    fn failure(&self, step: Step) -> Option<Failure> {
        self.state.lock().unwrap().failures.get(&step).copied()
    }

    fn not_found(&self, id: &GlobalId, operation: Operation) -> TransactionError {
        let error = match self.kind {
            ResourceManagerKind::StandardSql2pc => BackendError::new(format!(
                "prepared transaction with identifier \"{id}\" does not exist"
            ))
            .with_sqlstate("42704"),
            ResourceManagerKind::Xa => BackendError::new("XAER_NOTA: Unknown XID")
                .with_number(1397)
                .with_sqlstate("XAE04"),
            ResourceManagerKind::Other => BackendError::new(format!("no transaction {id}")),
        };
        self.classifier.classify(operation, error)
    }

    async fn check(
        &self,
        step: Step,
        operation: Operation,
        id: &GlobalId,
    ) -> Result<Option<Failure>, TransactionError> {
        match self.failure(step) {
            Some(Failure::Error) => Err(self
                .classifier
                .classify(operation, BackendError::new(format!("{} exploded", self.target)))),
            Some(Failure::NotFound) => Err(self.not_found(id, operation)),
            Some(Failure::Hang) => std::future::pending().await,
            other => Ok(other),
        }
    }

    /// Outcome reported after the backend already applied a call.
    async fn settle(&self, failure: Option<Failure>, operation: Operation) -> Result<(), TransactionError> {
        match failure {
            Some(Failure::LostReply) => Err(self
                .classifier
                .classify(operation, BackendError::new(format!("{}: connection reset", self.target)))),
            Some(Failure::AppliedThenHang) => std::future::pending().await,
            _ => Ok(()),
        }
    }

    fn command(&self, standard: &str, xa: &str, id: &GlobalId) -> String {
        match self.kind {
            ResourceManagerKind::Xa => xa.replace("{id}", id.as_str()),
            _ => standard.replace("{id}", id.as_str()),
        }
    }

    fn resolve_prepared(&self, id: &GlobalId, commit: bool) -> Result<(), TransactionError> {
        let mut state = self.state.lock().unwrap();
        if !state.prepared.remove(id.as_str()) {
            drop(state);
            let operation = if commit { Operation::Commit } else { Operation::Rollback };
            return Err(self.not_found(id, operation));
        }
        if commit {
            state.committed.push(id.to_string());
        } else {
            state.rolled_back.push(id.to_string());
        }
        Ok(())
    }
}

pub struct ScriptedResourceManager(pub Arc<ScriptedBackend>);

#[async_trait]
impl ResourceManager for ScriptedResourceManager {
    fn kind(&self) -> ResourceManagerKind {
        self.0.kind
    }

    async fn begin(&self, global_id: &GlobalId) -> Result<Box<dyn BranchHandle>, TransactionError> {
        let backend = &self.0;
        backend.check(Step::Begin, Operation::Begin, global_id).await?;
        backend.journal.push(
            &backend.target,
            backend.command("BEGIN", "XA BEGIN '{id}'", global_id),
        );
        Ok(Box::new(ScriptedHandle {
            backend: backend.clone(),
            in_transaction: true,
            prepare_attempted: false,
        }))
    }

    async fn recover(&self) -> Result<Vec<String>, TransactionError> {
        let backend = &self.0;
        if backend.failure(Step::Recover).is_some() {
            return Err(TransactionError::RecoveryError(format!(
                "{} unreachable",
                backend.target
            )));
        }
        let listing = match backend.kind {
            ResourceManagerKind::Xa => "XA RECOVER",
            _ => "SELECT gid FROM pg_prepared_xacts",
        };
        backend.journal.push(&backend.target, listing);
        Ok(backend.prepared())
    }

    async fn commit_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        let backend = &self.0;
        backend
            .check(Step::CommitPrepared, Operation::Commit, global_id)
            .await?;
        backend.journal.push(
            &backend.target,
            backend.command("COMMIT PREPARED '{id}'", "XA COMMIT '{id}'", global_id),
        );
        backend.resolve_prepared(global_id, true)
    }

    async fn rollback_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        let backend = &self.0;
        backend
            .check(Step::RollbackPrepared, Operation::Rollback, global_id)
            .await?;
        backend.journal.push(
            &backend.target,
            backend.command("ROLLBACK PREPARED '{id}'", "XA ROLLBACK '{id}'", global_id),
        );
        backend.resolve_prepared(global_id, false)
    }
}

pub struct ScriptedHandle {
    backend: Arc<ScriptedBackend>,
    in_transaction: bool,
    prepare_attempted: bool,
}

#[async_trait]
impl BranchHandle for ScriptedHandle {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, TransactionError> {
        let id = GlobalId::parse("work").unwrap();
        self.backend
            .check(Step::Execute, Operation::Execute, &id)
            .await?;
        self.backend.journal.push(&self.backend.target, statement.sql.clone());
        let state = self.backend.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .find(|(needle, _)| statement.sql.contains(needle.as_str()))
            .map(|(_, rows)| *rows)
            .unwrap_or(1))
    }

    async fn prepare(&mut self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.prepare_attempted = true;
        let backend = &self.backend;
        let failure = backend.check(Step::Prepare, Operation::Prepare, global_id).await;
        if backend.kind == ResourceManagerKind::Xa {
            backend
                .journal
                .push(&backend.target, format!("XA END '{global_id}'"));
        }
        let failure = failure?;
        backend.journal.push(
            &backend.target,
            backend.command("PREPARE TRANSACTION '{id}'", "XA PREPARE '{id}'", global_id),
        );
        if failure != Some(Failure::Forget) {
            backend
                .state
                .lock()
                .unwrap()
                .prepared
                .insert(global_id.to_string());
        }
        backend.settle(failure, Operation::Prepare).await
    }

    async fn commit(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        let backend = &self.backend;
        let failure = backend.check(Step::Commit, Operation::Commit, global_id).await?;
        if was_prepared {
            backend.journal.push(
                &backend.target,
                backend.command("COMMIT PREPARED '{id}'", "XA COMMIT '{id}'", global_id),
            );
            backend.resolve_prepared(global_id, true)?;
        } else {
            if backend.kind == ResourceManagerKind::Xa {
                backend
                    .journal
                    .push(&backend.target, format!("XA END '{global_id}'"));
            }
            backend.journal.push(
                &backend.target,
                backend.command("COMMIT", "XA COMMIT '{id}' ONE PHASE", global_id),
            );
            backend
                .state
                .lock()
                .unwrap()
                .committed
                .push(global_id.to_string());
        }
        backend.settle(failure, Operation::Commit).await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        let backend = &self.backend;
        backend
            .check(Step::Rollback, Operation::Rollback, global_id)
            .await?;
        if was_prepared {
            backend.journal.push(
                &backend.target,
                backend.command("ROLLBACK PREPARED '{id}'", "XA ROLLBACK '{id}'", global_id),
            );
            let result = backend.resolve_prepared(global_id, false);
            self.in_transaction = false;
            result
        } else {
            backend.journal.push(
                &backend.target,
                backend.command("ROLLBACK", "XA ROLLBACK '{id}'", global_id),
            );
            // XA ROLLBACK resolves by id; the prepared-transaction dialect
            // needs ROLLBACK PREPARED once a prepare was attempted.
            let by_id = backend.kind == ResourceManagerKind::Xa || self.prepare_attempted;
            if by_id && backend.kind != ResourceManagerKind::Xa {
                backend
                    .journal
                    .push(&backend.target, format!("ROLLBACK PREPARED '{global_id}'"));
            }
            {
                let mut state = backend.state.lock().unwrap();
                if by_id {
                    state.prepared.remove(global_id.as_str());
                }
                state.rolled_back.push(global_id.to_string());
            }
            self.in_transaction = false;
            Ok(())
        }
    }

    async fn release(self: Box<Self>) {
        let mut state = self.backend.state.lock().unwrap();
        if self.in_transaction {
            state.released_closed += 1;
        } else {
            state.released_clean += 1;
        }
    }
}

/// Two scripted backends, `pg` (prepared-transaction dialect) and `my`
/// (XA), sharing one journal.
pub struct Fixture {
    pub journal: Journal,
    pub pg: Arc<ScriptedBackend>,
    pub my: Arc<ScriptedBackend>,
    pub registry: Arc<ResourceManagerRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        let journal = Journal::default();
        let pg = ScriptedBackend::new("pg", ResourceManagerKind::StandardSql2pc, journal.clone());
        let my = ScriptedBackend::new("my", ResourceManagerKind::Xa, journal.clone());
        let registry = ResourceManagerRegistry::new()
            .with("pg", Arc::new(ScriptedResourceManager(pg.clone())))
            .with("my", Arc::new(ScriptedResourceManager(my.clone())));
        Self {
            journal,
            pg,
            my,
            registry: Arc::new(registry),
        }
    }

    /// Branch one inserts into `pg`, branch two deletes from `my`.
    pub fn branches(&self) -> Vec<BranchDescriptor> {
        self.pg.rows("INSERT", 1);
        self.my.rows("DELETE", 0);
        vec![
            BranchDescriptor::new(ResourceManagerKind::StandardSql2pc, "pg").with_statement(
                Statement::new("INSERT INTO shop (name) VALUES ($1)").bind("shop3rd"),
            ),
            BranchDescriptor::new(ResourceManagerKind::Xa, "my").with_statement(
                Statement::new("DELETE FROM shop WHERE name = ?").bind("shop3rd"),
            ),
        ]
    }

    pub fn issued_commit(&self) -> bool {
        self.journal.contains("COMMIT")
    }
}

pub fn gid(id: &str) -> GlobalId {
    GlobalId::parse(id).unwrap()
}

/// Collects formatted log lines for the current thread while the returned
/// guard lives.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
