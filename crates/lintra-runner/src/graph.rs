//! The action graph and the generic scheduler driving it.
//!
//! An action is one unit of work in a DAG rooted at a synthetic root whose
//! dependencies are the caller-requested actions. Nodes live in an
//! index-based arena: `deps` and `triggers` are both edge lists, and holding
//! them as reference-counted pointers would form cycles. Scheduling state is
//! per-node: an atomic count of unfinished dependencies, a sticky failure
//! flag, and the errors recorded for this action.
//!
//! [`drive`] executes a graph: ready actions are fed through a work channel,
//! each runs on its own scoped worker thread under a semaphore permit, and
//! the last dependency of a node to finish enqueues it. The root is
//! necessarily the last action to be enqueued; receiving it ends the run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{bounded, Sender};

use crate::error::RunnerError;
use crate::semaphore::{Permit, Semaphore};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) struct ActionNode<T> {
    /// `None` only for the synthetic root.
    payload: Option<T>,
    deps: Vec<NodeId>,
    triggers: Vec<NodeId>,
    pending: AtomicU32,
    failed: AtomicBool,
    errors: Mutex<Vec<RunnerError>>,
}

impl<T> ActionNode<T> {
    fn new(payload: Option<T>) -> Self {
        Self {
            payload,
            deps: Vec::new(),
            triggers: Vec::new(),
            pending: AtomicU32::new(0),
            failed: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn payload(&self) -> &T {
        self.payload
            .as_ref()
            .expect("the synthetic root has no payload")
    }

    pub fn deps(&self) -> &[NodeId] {
        &self.deps
    }

    pub fn triggers(&self) -> &[NodeId] {
        &self.triggers
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Marks the action failed. The flag is sticky.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn push_error(&self, error: RunnerError) {
        self.errors
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(error);
    }

    pub fn take_errors(&self) -> Vec<RunnerError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(|err| err.into_inner()))
    }

    /// Decrements the unfinished-dependency count, reporting whether it
    /// reached zero. Exactly one caller observes the transition.
    fn decrement_pending(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

pub(crate) struct GraphBuilder<T> {
    nodes: Vec<ActionNode<T>>,
}

impl<T> GraphBuilder<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn add(&mut self, payload: T) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ActionNode::new(Some(payload)));
        id
    }

    /// Records that `node` depends on `dep`, registering `node` as a trigger
    /// of `dep`.
    pub fn add_dep(&mut self, node: NodeId, dep: NodeId) {
        self.nodes[dep.index()].triggers.push(node);
        self.nodes[node.index()].deps.push(dep);
    }

    pub fn payload_mut(&mut self, node: NodeId) -> &mut T {
        self.nodes[node.index()]
            .payload
            .as_mut()
            .expect("the synthetic root has no payload")
    }

    pub fn mark_failed(&mut self, node: NodeId) {
        *self.nodes[node.index()].failed.get_mut() = true;
    }

    pub fn is_failed(&self, node: NodeId) -> bool {
        self.nodes[node.index()].failed.load(Ordering::Relaxed)
    }

    pub fn push_error(&mut self, node: NodeId, error: RunnerError) {
        self.nodes[node.index()]
            .errors
            .get_mut()
            .unwrap_or_else(|err| err.into_inner())
            .push(error);
    }

    /// Sorts a node's dependency list by a key over the dependency payloads.
    /// Dependency order participates in cache keys, so it must be stable.
    pub fn sort_deps_by_key<K: Ord>(&mut self, node: NodeId, mut key: impl FnMut(&T) -> K) {
        let mut deps = std::mem::take(&mut self.nodes[node.index()].deps);
        deps.sort_by_key(|dep| key(self.nodes[dep.index()].payload()));
        self.nodes[node.index()].deps = deps;
    }

    /// Adds the synthetic root depending on `root_deps` and freezes the
    /// graph, initializing every pending count.
    pub fn finish(mut self, root_deps: &[NodeId]) -> ActionGraph<T> {
        let root = NodeId(self.nodes.len() as u32);
        self.nodes.push(ActionNode::new(None));
        for &dep in root_deps {
            self.nodes[dep.index()].triggers.push(root);
            self.nodes[root.index()].deps.push(dep);
        }
        for node in &mut self.nodes {
            *node.pending.get_mut() = node.deps.len() as u32;
        }
        ActionGraph {
            nodes: self.nodes,
            root,
        }
    }
}

pub(crate) struct ActionGraph<T> {
    nodes: Vec<ActionNode<T>>,
    root: NodeId,
}

impl<T> ActionGraph<T> {
    pub fn node(&self, id: NodeId) -> &ActionNode<T> {
        &self.nodes[id.index()]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Depth-first postorder over the graph: every dependency precedes its
    /// dependents, and the root comes last. This is the order results are
    /// reported in.
    pub fn topo_order(&self) -> Vec<NodeId> {
        enum Visit {
            Enter(NodeId),
            Exit(NodeId),
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![Visit::Enter(self.root)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if std::mem::replace(&mut seen[id.index()], true) {
                        continue;
                    }
                    stack.push(Visit::Exit(id));
                    for &dep in self.node(id).deps().iter().rev() {
                        if !seen[dep.index()] {
                            stack.push(Visit::Enter(dep));
                        }
                    }
                }
                Visit::Exit(id) => out.push(id),
            }
        }
        out
    }
}

/// How workers obtain permits from the gate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AcquireMode {
    /// Block until a permit is available before dispatching. Used at the
    /// package level: every package analysis takes a permit.
    Blocking,
    /// Dispatch inline on the current thread when no permit is available.
    /// Used at the analyzer level: the package's own permit then covers the
    /// work, which guarantees forward progress for every in-flight package.
    NonBlocking,
}

/// Executes an action graph to completion.
///
/// `exec` runs each non-root action at most once; its errors are recorded on
/// the failing node. Actions whose dependencies failed are skipped and
/// inherit the failure without recording a new error.
pub(crate) fn drive<T, F>(
    graph: &ActionGraph<T>,
    order: &[NodeId],
    semaphore: &Semaphore,
    mode: AcquireMode,
    exec: F,
) where
    T: Send + Sync,
    F: Fn(NodeId) -> Result<(), RunnerError> + Sync,
{
    // Sized to the action count: every action is enqueued exactly once, so
    // sends never block and no worker ever holds a permit across a send.
    let (tx, rx) = bounded::<NodeId>(graph.len());
    for &id in order {
        if graph.node(id).deps().is_empty() {
            tx.send(id).expect("work channel closed while seeding");
        }
    }

    std::thread::scope(|scope| {
        while let Ok(id) = rx.recv() {
            if id == graph.root() {
                // The root is the last action to be enqueued; everything
                // else has been handed to a worker already.
                break;
            }
            match mode {
                AcquireMode::Blocking => {
                    let permit = semaphore.acquire();
                    let tx = tx.clone();
                    let exec = &exec;
                    scope.spawn(move || handle(graph, id, exec, Some(permit), &tx));
                }
                AcquireMode::NonBlocking => match semaphore.try_acquire() {
                    Some(permit) => {
                        let tx = tx.clone();
                        let exec = &exec;
                        scope.spawn(move || handle(graph, id, exec, Some(permit), &tx));
                    }
                    // The gate is exhausted; run under the permit our
                    // enclosing package already holds.
                    None => handle(graph, id, &exec, None, &tx),
                },
            }
        }
    });
}

fn handle<T, F>(
    graph: &ActionGraph<T>,
    id: NodeId,
    exec: &F,
    permit: Option<Permit<'_>>,
    tx: &Sender<NodeId>,
) where
    F: Fn(NodeId) -> Result<(), RunnerError>,
{
    let node = graph.node(id);
    // The action may already be failed from graph construction, for example
    // because of unresolved imports.
    if !node.is_failed() {
        // A failed dependency fails this action too. No error is recorded
        // here: the first action in the chain that failed has it.
        if node.deps().iter().any(|&dep| graph.node(dep).is_failed()) {
            node.mark_failed();
        }
    }
    if !node.is_failed() {
        // Contain panics from analyzer code: an unwinding worker would never
        // decrement its dependents and the dispatch loop would wait forever.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| exec(id)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                node.mark_failed();
                node.push_error(err);
            }
            Err(_) => {
                node.mark_failed();
                node.push_error(RunnerError::Panicked);
            }
        }
    }
    // Free the permit before scheduling dependents.
    drop(permit);

    for &trigger in node.triggers() {
        if graph.node(trigger).decrement_pending() {
            tx.send(trigger).expect("work channel closed while scheduling");
        }
    }
}
