use super::compiled_plan::{CompiledPlan, PlanStats};
use super::executor::NodeSlot;
use super::id::NodeId;
use std::collections::VecDeque;

/// Compiles the graph around a run target into an execution plan
pub struct GraphCompiler;

impl GraphCompiler {
    /// Compile the plan for running `target`.
    ///
    /// The plan covers the connected component containing `target`
    /// (edges taken in both directions). Inactive nodes and everything
    /// downstream of them are left out, as if removed. The remaining
    /// nodes are ordered so that every node follows all of its parents.
    ///
    /// # Arguments
    /// * `nodes` - Graph arena; destroyed nodes are `None`
    /// * `target` - Node whose component is compiled
    /// * `generation` - Generation counter for plan reuse
    pub fn compile(nodes: &[Option<NodeSlot>], target: NodeId, generation: u64) -> CompiledPlan {
        let start_time = std::time::Instant::now();

        let n = nodes.len();
        let t = target.index();
        if t >= n || nodes[t].is_none() {
            return CompiledPlan::empty(target, generation);
        }

        // Undirected reachability from the target
        let component = Self::component_of(nodes, t);

        // Inactive nodes and their descendants
        let blocked = Self::inactive_closure(nodes, &component);

        let scheduled: Vec<bool> = (0..n).map(|i| component[i] && !blocked[i]).collect();
        let order = Self::topological_sort(nodes, &scheduled);
        let skipped: Vec<usize> = (0..n).filter(|&i| component[i] && blocked[i]).collect();

        let source_nodes = order
            .iter()
            .filter(|&&i| Self::slot(nodes, i).map_or(true, |s| s.parents.is_empty()))
            .count();
        let sink_nodes = order
            .iter()
            .filter(|&&i| {
                Self::slot(nodes, i).map_or(true, |s| {
                    s.children.iter().all(|c| !scheduled.get(c.index()).copied().unwrap_or(false))
                })
            })
            .count();

        let compile_time_us = start_time.elapsed().as_micros() as u64;

        let stats = PlanStats {
            total_nodes: nodes.iter().filter(|slot| slot.is_some()).count(),
            component_nodes: component.iter().filter(|&&c| c).count(),
            scheduled_nodes: order.len(),
            inactive_nodes: skipped.len(),
            source_nodes,
            sink_nodes,
            compile_time_us,
        };

        CompiledPlan {
            target,
            order,
            skipped,
            generation,
            stats,
        }
    }

    fn slot(nodes: &[Option<NodeSlot>], idx: usize) -> Option<&NodeSlot> {
        nodes.get(idx).and_then(Option::as_ref)
    }

    /// Nodes connected to `start` through edges in either direction
    fn component_of(nodes: &[Option<NodeSlot>], start: usize) -> Vec<bool> {
        let mut seen = vec![false; nodes.len()];
        let mut stack = vec![start];
        seen[start] = true;

        while let Some(node) = stack.pop() {
            let Some(slot) = Self::slot(nodes, node) else {
                continue;
            };
            for neighbor in slot.parents.iter().chain(&slot.children) {
                let idx = neighbor.index();
                if idx < seen.len() && !seen[idx] && Self::slot(nodes, idx).is_some() {
                    seen[idx] = true;
                    stack.push(idx);
                }
            }
        }

        seen
    }

    /// Forward closure of the inactive nodes of a component
    fn inactive_closure(nodes: &[Option<NodeSlot>], component: &[bool]) -> Vec<bool> {
        let mut blocked = vec![false; nodes.len()];
        let mut stack: Vec<usize> = (0..nodes.len())
            .filter(|&i| component[i] && Self::slot(nodes, i).is_some_and(|s| !s.active))
            .collect();
        for &i in &stack {
            blocked[i] = true;
        }

        while let Some(node) = stack.pop() {
            let Some(slot) = Self::slot(nodes, node) else {
                continue;
            };
            for child in &slot.children {
                let idx = child.index();
                if idx < blocked.len() && !blocked[idx] {
                    blocked[idx] = true;
                    stack.push(idx);
                }
            }
        }

        blocked
    }

    /// Topological sort of scheduled nodes using Kahn's algorithm
    fn topological_sort(nodes: &[Option<NodeSlot>], scheduled: &[bool]) -> Vec<usize> {
        let n = nodes.len();
        let mut in_degree = vec![0usize; n];

        for (idx, slot) in nodes.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if !scheduled[idx] {
                continue;
            }
            in_degree[idx] = slot
                .parents
                .iter()
                .filter(|p| scheduled.get(p.index()).copied().unwrap_or(false))
                .count();
        }

        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&i| scheduled[i] && in_degree[i] == 0)
            .collect();
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            result.push(node);
            let Some(slot) = Self::slot(nodes, node) else {
                continue;
            };
            for child in &slot.children {
                let idx = child.index();
                if !scheduled.get(idx).copied().unwrap_or(false) {
                    continue;
                }
                in_degree[idx] -= 1;
                if in_degree[idx] == 0 {
                    queue.push_back(idx);
                }
            }
        }

        let expected = scheduled.iter().filter(|&&s| s).count();
        if result.len() != expected {
            tracing::warn!(
                "Graph has a cycle! Only {} of {} nodes scheduled.",
                result.len(),
                expected
            );
        }

        result
    }

    /// Check if adding the edge `parent -> child` would create a cycle.
    pub fn would_create_cycle(nodes: &[Option<NodeSlot>], parent: NodeId, child: NodeId) -> bool {
        // If `child` can already reach `parent`, the new edge closes a loop
        Self::descendants(nodes, child).contains(&parent.index())
    }

    /// `from` and every node reachable from it
    pub fn descendants(nodes: &[Option<NodeSlot>], from: NodeId) -> Vec<usize> {
        let mut visited = vec![false; nodes.len()];
        let mut stack = vec![from.index()];
        let mut result = Vec::new();

        while let Some(current) = stack.pop() {
            if current >= nodes.len() || visited[current] {
                continue;
            }
            visited[current] = true;
            result.push(current);
            if let Some(slot) = Self::slot(nodes, current) {
                stack.extend(slot.children.iter().map(|c| c.index()));
            }
        }

        result
    }
}
