use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use lazy_static::lazy_static;
use crate::core::{DbError, Result, Value};
use crate::result::QueryResult;
use super::connection::MemoryConnection;

/// Body of a stored function: receives the bound arguments, returns rows.
pub type StoredFunction = Arc<dyn Fn(&[Value]) -> Result<QueryResult> + Send + Sync>;

// Process-wide databases addressed by `memory://<name>` URLs
lazy_static! {
    static ref NAMED_DATABASES: Mutex<HashMap<String, MemoryDatabase>> = Mutex::new(HashMap::new());
}

/// One statement as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Round-trip counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub statements: u64,
    pub fetches: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Default)]
struct DatabaseState {
    functions: HashMap<String, StoredFunction>,
    log: Vec<StatementRecord>,
    stats: MemoryStats,
    offline: bool,
}

/// In-process stored-function registry acting as a database.
///
/// Cloning yields another handle to the same database.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide database registered under `name`, created on first use.
    pub fn named(name: &str) -> Self {
        let mut registry = NAMED_DATABASES
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.entry(name.to_string()).or_default().clone()
    }

    /// Registers `handler` as the body of the function `name`.
    ///
    /// Names are matched case-insensitively. Registering an existing name replaces it.
    pub fn register_function<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[Value]) -> Result<QueryResult> + Send + Sync + 'static,
    {
        log::debug!("registering stored function {}", name);
        self.state()
            .functions
            .insert(name.to_ascii_lowercase(), Arc::new(handler));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.state().functions.contains_key(&name.to_ascii_lowercase())
    }

    /// Opens a new connection in auto-commit mode.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection::new(self.clone())
    }

    /// Simulates losing (or regaining) the network link.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn is_offline(&self) -> bool {
        self.state().offline
    }

    pub fn statements(&self) -> Vec<StatementRecord> {
        self.state().log.clone()
    }

    pub fn last_statement(&self) -> Option<StatementRecord> {
        self.state().log.last().cloned()
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.log.clear();
        state.stats = MemoryStats::default();
    }

    pub fn stats(&self) -> MemoryStats {
        self.state().stats
    }

    fn state(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_online(&self) -> Result<()> {
        if self.is_offline() {
            return Err(DbError::ConnectivityError("database is unreachable".into()));
        }
        Ok(())
    }

    pub(crate) fn record(&self, sql: &str, params: &[Value]) {
        let mut state = self.state();
        state.stats.statements += 1;
        state.log.push(StatementRecord {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }

    pub(crate) fn record_fetch(&self) {
        self.state().stats.fetches += 1;
    }

    pub(crate) fn record_commit(&self) {
        self.state().stats.commits += 1;
    }

    pub(crate) fn record_rollback(&self) {
        self.state().stats.rollbacks += 1;
    }

    /// Runs a stored function outside the registry lock.
    pub(crate) fn invoke(&self, function: &str, args: &[Value]) -> Result<QueryResult> {
        let handler = self
            .state()
            .functions
            .get(&function.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                DbError::ExecutionError(format!("function {} does not exist", function))
            })?;

        log::debug!("invoking {} with {} argument(s)", function, args.len());
        handler(args)
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        let mut functions: Vec<&String> = state.functions.keys().collect();
        functions.sort();
        f.debug_struct("MemoryDatabase")
            .field("functions", &functions)
            .field("stats", &state.stats)
            .field("offline", &state.offline)
            .finish()
    }
}
