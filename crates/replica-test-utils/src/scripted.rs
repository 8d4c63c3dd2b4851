//! Scripted handles, connectors and pullers.
//!
//! These stand in for real databases when a test needs to dictate exactly
//! which calls fail and count how often each collaborator was used.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use replica_core::{AliasConfig, Connector, DriverError, Handle, HandleKind, RemotePuller, RowSet, Value};

/// Corruption message as reported by SQLite.
pub const MALFORMED: &str = "database disk image is malformed";

type Outcome = Result<RowSet, DriverError>;

/// A one-cell result set.
pub fn scalar(value: impl Into<Value>) -> RowSet {
    RowSet::new(vec!["value".to_string()], vec![vec![value.into()]])
}

/// Handle that replays queued outcomes, then repeats a fallback outcome.
#[derive(Debug)]
pub struct ScriptedHandle {
    kind: HandleKind,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    delay: Mutex<Option<Duration>>,
    queries: AtomicUsize,
    closes: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedHandle {
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(RowSet::default())),
            delay: Mutex::new(None),
            queries: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Queue one outcome.
    pub fn push(&self, outcome: Outcome) -> &Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_ok(&self, rows: RowSet) -> &Self {
        self.push(Ok(rows))
    }

    pub fn push_err(&self, message: &str) -> &Self {
        self.push(Err(DriverError::new(message)))
    }

    /// Outcome used once the queue is empty.
    pub fn set_fallback(&self, outcome: Outcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    /// Sleep this long inside every query.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// SQL text of every query, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Handle for ScriptedHandle {
    fn kind(&self) -> HandleKind {
        self.kind
    }

    fn query(&self, sql: &str, _params: &[Value]) -> Result<RowSet, DriverError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(sql.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one shared [`ScriptedHandle`] per kind.
///
/// Reopening after an invalidation returns the same scripted handle, so a
/// script can span a sync.
#[derive(Debug)]
pub struct ScriptedConnector {
    handles: BTreeMap<HandleKind, Arc<ScriptedHandle>>,
    opens: AtomicUsize,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            handles: [HandleKind::Primary, HandleKind::ReadOnly, HandleKind::Remote]
                .into_iter()
                .map(|kind| (kind, Arc::new(ScriptedHandle::new(kind))))
                .collect(),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn handle(&self, kind: HandleKind) -> &Arc<ScriptedHandle> {
        &self.handles[&kind]
    }

    pub fn primary(&self) -> &Arc<ScriptedHandle> {
        self.handle(HandleKind::Primary)
    }

    pub fn remote(&self) -> &Arc<ScriptedHandle> {
        self.handle(HandleKind::Remote)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _config: &AliasConfig, kind: HandleKind) -> Result<Arc<dyn Handle>, DriverError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let handle: Arc<dyn Handle> = self.handle(kind).clone();
        Ok(handle)
    }
}

type PullAction = Box<dyn Fn(&AliasConfig) -> Result<(), DriverError> + Send + Sync>;

/// Puller that counts calls and runs a configurable action.
pub struct CountingPuller {
    calls: AtomicUsize,
    action: PullAction,
}

impl std::fmt::Debug for CountingPuller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingPuller")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl Default for CountingPuller {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingPuller {
    /// Puller that always succeeds without touching anything.
    pub fn new() -> Self {
        Self::with_action(|_| Ok(()))
    }

    /// Puller that always fails with `message`.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::with_action(move |_| Err(DriverError::new(message.clone())))
    }

    pub fn with_action(
        action: impl Fn(&AliasConfig) -> Result<(), DriverError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            action: Box::new(action),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemotePuller for CountingPuller {
    fn pull(&self, config: &AliasConfig) -> Result<(), DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.action)(config)
    }
}
