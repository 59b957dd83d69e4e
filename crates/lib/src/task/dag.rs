//! Dependency graph over registered tasks and its parallel execution waves.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::ScheduleError;
use super::{Task, TaskId};

pub struct TaskGraph {
  graph: DiGraph<TaskId, ()>,
  nodes: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
  /// Build the graph with an edge from every dependency to its dependent.
  ///
  /// Dependencies on ids not in `tasks` are ignored.
  pub fn from_tasks(tasks: &[Task]) -> Result<Self, ScheduleError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for task in tasks {
      let idx = graph.add_node(task.id.clone());
      nodes.insert(task.id.clone(), idx);
    }

    for task in tasks {
      let dependent_idx = nodes[&task.id];
      for dep in &task.dependencies {
        if let Some(&dep_idx) = nodes.get(dep) {
          graph.add_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    toposort(&graph, None).map_err(|_| ScheduleError::CycleDetected)?;
    Ok(Self { graph, nodes })
  }

  /// Direct dependencies of `id`.
  pub fn dependencies(&self, id: &TaskId) -> Vec<TaskId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect()
  }

  /// Tasks grouped into waves; every task's dependencies are in earlier waves.
  ///
  /// Ids within a wave are sorted.
  pub fn waves(&self) -> Result<Vec<Vec<TaskId>>, ScheduleError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(ScheduleError::CycleDetected);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<TaskId> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }
}
