//! Dependency graph over plan steps.
//!
//! Nodes are step positions in [`Plan::steps`]. An edge runs from the first
//! step carrying index `j` to every step that depends on `j`. Because
//! dependencies only point at lower indices the graph is acyclic, and the
//! topological order (ties broken by lowest `(index, position)`) is simply
//! ascending index order, stable by textual position.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::plan::{Plan, PlanError};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step index for each position.
    indices: Vec<usize>,
    /// Positions each position depends on.
    upstream: Vec<Vec<usize>>,
    /// Positions depending on each position.
    downstream: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn build(plan: &Plan) -> Self {
        let n = plan.steps.len();
        let mut upstream = vec![Vec::new(); n];
        let mut downstream = vec![Vec::new(); n];

        for (pos, step) in plan.steps.iter().enumerate() {
            for &dep in &step.dependencies {
                // References to indices never parsed have no producer.
                if let Some(from) = plan.position_of(dep) {
                    upstream[pos].push(from);
                    downstream[from].push(pos);
                }
            }
        }

        Self {
            indices: plan.steps.iter().map(|s| s.index).collect(),
            upstream,
            downstream,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Positions the step at `pos` waits on.
    pub fn upstream(&self, pos: usize) -> &[usize] {
        &self.upstream[pos]
    }

    /// Positions waiting on the step at `pos`.
    pub fn downstream(&self, pos: usize) -> &[usize] {
        &self.downstream[pos]
    }

    /// Scheduling key: lower runs first.
    pub fn priority(&self, pos: usize) -> (usize, usize) {
        (self.indices[pos], pos)
    }

    /// Positions in execution order (Kahn's algorithm).
    pub fn order(&self) -> Result<Vec<usize>, PlanError> {
        let n = self.len();
        let mut in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..n)
            .filter(|&pos| in_degree[pos] == 0)
            .map(|pos| Reverse(self.priority(pos)))
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse((_, pos))) = ready.pop() {
            order.push(pos);
            for &next in &self.downstream[pos] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(self.priority(next)));
                }
            }
        }

        if order.len() != n {
            let indices = (0..n)
                .filter(|&pos| in_degree[pos] > 0)
                .map(|pos| self.indices[pos])
                .collect();
            return Err(PlanError::DependencyCycle { indices });
        }

        Ok(order)
    }

    /// Group positions into waves: every step in a wave depends only on
    /// steps in earlier waves. Each wave is sorted by priority.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, PlanError> {
        let order = self.order()?;
        let mut level = vec![0usize; self.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();

        for pos in order {
            let l = self.upstream[pos]
                .iter()
                .map(|&up| level[up] + 1)
                .max()
                .unwrap_or(0);
            level[pos] = l;
            if waves.len() <= l {
                waves.resize_with(l + 1, Vec::new);
            }
            waves[l].push(pos);
        }

        for wave in &mut waves {
            wave.sort_by_key(|&pos| self.priority(pos));
        }
        Ok(waves)
    }

    /// Waves expressed as step indices.
    pub fn index_waves(&self) -> Result<Vec<Vec<usize>>, PlanError> {
        Ok(self
            .waves()?
            .into_iter()
            .map(|wave| wave.into_iter().map(|pos| self.indices[pos]).collect())
            .collect())
    }
}
