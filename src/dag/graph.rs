// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::state::TaskState;
use crate::dag::task::{Task, TaskId};
use crate::errors::{CycleError, GraphError};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct upstream tasks.
    deps: Vec<TaskId>,
    /// Direct downstream tasks.
    dependents: Vec<TaskId>,
}

/// Immutable, validated task graph.
///
/// Only [`GraphBuilder::build`] (or [`Graph::build`]) produces one, so every
/// `Graph` in the program is acyclic and has no dangling edges.
#[derive(Debug, Clone)]
pub struct Graph {
    tasks: HashMap<TaskId, Task>,
    nodes: HashMap<TaskId, DagNode>,
    order: Vec<TaskId>,
    entry: Option<TaskId>,
    exit: Option<TaskId>,
}

impl Graph {
    /// Build a graph from a task set and an edge set `(from, to)`.
    pub fn build(
        tasks: impl IntoIterator<Item = Task>,
        edges: impl IntoIterator<Item = (TaskId, TaskId)>,
    ) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        for task in tasks {
            builder = builder.task(task);
        }
        for (from, to) in edges {
            builder = builder.edge(from, to);
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Tasks in topological order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Task ids in a topological order consistent with every edge.
    pub fn topological_order(&self) -> &[TaskId] {
        &self.order
    }

    /// Immediate upstream tasks of `id`.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstream tasks of `id`.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no upstream, in topological order.
    pub fn entries(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.dependencies_of(id).is_empty())
            .map(|s| s.as_str())
            .collect()
    }

    /// Tasks with no downstream, in topological order.
    pub fn exits(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.dependents_of(id).is_empty())
            .map(|s| s.as_str())
            .collect()
    }

    /// The designated entry marker, if one was declared.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// The designated exit marker, if one was declared.
    pub fn exit(&self) -> Option<&str> {
        self.exit.as_deref()
    }

    /// Successors of `id` whose *other* upstreams are all `Success`.
    ///
    /// `state_of` reports the current state of a task in the caller's run.
    /// The successors' own state is not inspected; callers decide whether a
    /// returned task is still eligible for dispatch.
    pub fn ready_successors<F>(&self, id: &str, state_of: F) -> Vec<TaskId>
    where
        F: Fn(&str) -> Option<TaskState>,
    {
        self.dependents_of(id)
            .iter()
            .filter(|succ| {
                self.dependencies_of(succ)
                    .iter()
                    .filter(|up| up.as_str() != id)
                    .all(|up| state_of(up.as_str()) == Some(TaskState::Success))
            })
            .cloned()
            .collect()
    }

    /// Every task reachable from `id` (excluding `id`), in topological order.
    pub fn descendants_of(&self, id: &str) -> Vec<TaskId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self.dependents_of(id).iter().map(|s| s.as_str()).collect();

        while let Some(name) = stack.pop() {
            if seen.insert(name) {
                stack.extend(self.dependents_of(name).iter().map(|s| s.as_str()));
            }
        }

        self.order
            .iter()
            .filter(|t| seen.contains(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Explicit edge-set builder for [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    tasks: Vec<Task>,
    edges: Vec<(TaskId, TaskId)>,
    entry: Option<TaskId>,
    exit: Option<TaskId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add a dependency edge: `to` runs after `from`.
    pub fn edge(mut self, from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Add one edge from each of `upstream` to `task`.
    pub fn after<I, S>(mut self, task: &str, upstream: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for up in upstream {
            self.edges.push((up.into(), task.to_string()));
        }
        self
    }

    /// Declare the entry marker; `build` then requires it to be the only
    /// task without upstream.
    pub fn entry(mut self, id: impl Into<TaskId>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Declare the exit marker; `build` then requires it to be the only task
    /// without downstream.
    pub fn exit(mut self, id: impl Into<TaskId>) -> Self {
        self.exit = Some(id.into());
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<Graph, GraphError> {
        if self.tasks.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut tasks: HashMap<TaskId, Task> = HashMap::new();
        let mut insertion: Vec<TaskId> = Vec::new();
        for task in self.tasks {
            let id = task.id().to_string();
            if tasks.contains_key(&id) {
                return Err(GraphError::DuplicateTask(id));
            }
            insertion.push(id.clone());
            tasks.insert(id, task);
        }

        let mut nodes: HashMap<TaskId, DagNode> = insertion
            .iter()
            .map(|id| (id.clone(), DagNode::default()))
            .collect();

        let mut seen_edges: HashSet<(TaskId, TaskId)> = HashSet::new();
        let mut unique_edges: Vec<(TaskId, TaskId)> = Vec::new();
        for (from, to) in self.edges {
            for endpoint in [&from, &to] {
                if !tasks.contains_key(endpoint) {
                    return Err(GraphError::UnknownTask {
                        from: from.clone(),
                        to: to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            if !seen_edges.insert((from.clone(), to.clone())) {
                continue;
            }
            unique_edges.push((from.clone(), to.clone()));
            if let Some(node) = nodes.get_mut(&from) {
                node.dependents.push(to.clone());
            }
            if let Some(node) = nodes.get_mut(&to) {
                node.deps.push(from.clone());
            }
        }

        let order = topological_order(
            insertion.iter().map(|s| s.as_str()),
            unique_edges.iter().map(|(a, b)| (a.as_str(), b.as_str())),
        )?;

        let graph = Graph {
            tasks,
            nodes,
            order,
            entry: self.entry,
            exit: self.exit,
        };

        if let Some(entry) = graph.entry.as_deref() {
            let entries = graph.entries();
            if entries != [entry] {
                return Err(GraphError::Entry(owned(entries)));
            }
        }
        if let Some(exit) = graph.exit.as_deref() {
            let exits = graph.exits();
            if exits != [exit] {
                return Err(GraphError::Exit(owned(exits)));
            }
        }

        Ok(graph)
    }
}

fn owned(ids: Vec<&str>) -> Vec<String> {
    ids.into_iter().map(String::from).collect()
}

/// Topologically sort `nodes` under `edges` (`from` before `to`).
///
/// Fails with [`CycleError`] naming a task on a cycle.
pub fn topological_order<'a>(
    nodes: impl IntoIterator<Item = &'a str>,
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<TaskId>, CycleError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for node in nodes {
        graph.add_node(node);
    }
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(String::from).collect()),
        Err(cycle) => Err(CycleError {
            task: cycle.node_id().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::operator::NoopOperator;

    fn task(id: &str) -> Task {
        Task::new(id, Arc::new(NoopOperator))
    }

    fn diamond() -> Graph {
        GraphBuilder::new()
            .task(task("A"))
            .task(task("B"))
            .task(task("C"))
            .task(task("D"))
            .edge("A", "B")
            .edge("A", "C")
            .after("D", ["B", "C"])
            .entry("A")
            .exit("D")
            .build()
            .unwrap()
    }

    #[test]
    fn topological_order_respects_every_edge() {
        let graph = diamond();
        let pos = |id: &str| {
            graph
                .topological_order()
                .iter()
                .position(|t| t == id)
                .unwrap()
        };
        assert!(pos("A") < pos("B"));
        assert!(pos("A") < pos("C"));
        assert!(pos("B") < pos("D"));
        assert!(pos("C") < pos("D"));
        assert_eq!(graph.entries(), vec!["A"]);
        assert_eq!(graph.exits(), vec!["D"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = GraphBuilder::new()
            .task(task("A"))
            .task(task("B"))
            .edge("A", "B")
            .edge("B", "A")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = Graph::build(vec![task("A")], vec![("A".into(), "A".into())]).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle(CycleError {
                task: "A".to_string()
            })
        );
    }

    #[test]
    fn dangling_edges_and_duplicates_are_rejected() {
        let err = Graph::build(vec![task("A")], vec![("A".into(), "Z".into())]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask { ref missing, .. } if missing == "Z"));

        let err = Graph::build(vec![task("A"), task("A")], Vec::new()).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask("A".to_string()));

        assert_eq!(
            Graph::build(Vec::new(), Vec::new()).unwrap_err(),
            GraphError::Empty
        );
    }

    #[test]
    fn declared_entry_must_be_unique_root() {
        let err = GraphBuilder::new()
            .task(task("A"))
            .task(task("B"))
            .entry("A")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Entry(_)));
    }

    #[test]
    fn ready_successors_waits_for_all_other_upstreams() {
        let graph = diamond();
        let mut states: HashMap<&str, TaskState> = HashMap::new();
        states.insert("A", TaskState::Success);
        states.insert("B", TaskState::Success);
        states.insert("C", TaskState::Running);

        assert!(graph.ready_successors("B", |id| states.get(id).copied()).is_empty());

        states.insert("C", TaskState::Success);
        assert_eq!(
            graph.ready_successors("C", |id| states.get(id).copied()),
            vec!["D"]
        );

        let mut from_a = graph.ready_successors("A", |id| states.get(id).copied());
        from_a.sort();
        assert_eq!(from_a, vec!["B", "C"]);
    }

    #[test]
    fn descendants_are_transitive() {
        let graph = diamond();
        assert_eq!(graph.descendants_of("B"), vec!["D"]);
        let mut from_a = graph.descendants_of("A");
        from_a.sort();
        assert_eq!(from_a, vec!["B", "C", "D"]);
        assert!(graph.descendants_of("D").is_empty());
    }
}
