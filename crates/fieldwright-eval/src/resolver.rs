//! Execution ordering for a set of formulas.
//!
//! Formula `f` depends on formula `g` when `f`'s expression reads `g`'s
//! target field through `CF("...")`. The order is a depth-first post-order
//! over that graph, seeded by ascending priority with the original position
//! breaking ties, so dependencies always run first and unrelated formulas
//! keep their priority order.

use rustc_hash::FxHashMap;

/// One vertex of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaNode {
    /// Canonical key of the field this formula writes.
    pub target: String,
    pub priority: i64,
    /// Canonical keys of the fields this formula reads.
    pub references: Vec<String>,
}

/// The graph has a cycle, so no execution order exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle: {}", path.join(" -> "))]
pub struct DependencyCycle {
    /// Target keys along the cycle; the first key is repeated at the end.
    pub path: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

pub struct Resolver<'a> {
    nodes: &'a [FormulaNode],
    /// Target key to the formulas writing it.
    writers: FxHashMap<&'a str, Vec<usize>>,
}

impl<'a> Resolver<'a> {
    pub fn new(nodes: &'a [FormulaNode]) -> Self {
        let mut writers: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (i, node) in nodes.iter().enumerate() {
            writers.entry(node.target.as_str()).or_default().push(i);
        }
        Self { nodes, writers }
    }

    fn seed_order(&self, indices: &mut [usize]) {
        indices.sort_by_key(|&i| (self.nodes[i].priority, i));
    }

    /// Dependencies of `i`, in seed order. References to fields that no
    /// formula writes are ignored.
    fn dependencies(&self, i: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.nodes[i]
            .references
            .iter()
            .filter_map(|r| self.writers.get(r.as_str()))
            .flatten()
            .copied()
            .collect();
        self.seed_order(&mut deps);
        deps.dedup();
        deps
    }

    /// Indices into the node slice in execution order.
    pub fn resolve(&self) -> Result<Vec<usize>, DependencyCycle> {
        let mut seeds: Vec<usize> = (0..self.nodes.len()).collect();
        self.seed_order(&mut seeds);

        let mut marks: FxHashMap<usize, Mark> = FxHashMap::default();
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for seed in seeds {
            if !marks.contains_key(&seed) {
                self.visit(seed, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        i: usize,
        marks: &mut FxHashMap<usize, Mark>,
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), DependencyCycle> {
        marks.insert(i, Mark::InProgress);
        stack.push(i);

        for dep in self.dependencies(i) {
            match marks.get(&dep) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => return Err(self.cycle_error(stack, dep)),
                None => self.visit(dep, marks, stack, order)?,
            }
        }

        stack.pop();
        marks.insert(i, Mark::Done);
        order.push(i);
        Ok(())
    }

    fn cycle_error(&self, stack: &[usize], back_to: usize) -> DependencyCycle {
        let from = stack.iter().position(|&i| i == back_to).unwrap_or(0);
        let mut path: Vec<String> = stack[from..]
            .iter()
            .map(|&i| self.nodes[i].target.clone())
            .collect();
        path.push(self.nodes[back_to].target.clone());
        DependencyCycle { path }
    }
}

/// Convenience wrapper over [`Resolver`].
pub fn resolve_order(nodes: &[FormulaNode]) -> Result<Vec<usize>, DependencyCycle> {
    Resolver::new(nodes).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(target: &str, priority: i64, refs: &[&str]) -> FormulaNode {
        FormulaNode {
            target: target.into(),
            priority,
            references: refs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn dependencies_run_first() {
        let nodes = vec![
            node("Total", 0, &["Base", "Bonus"]),
            node("Base", 5, &[]),
            node("Bonus", 1, &["Base"]),
        ];
        assert_eq!(resolve_order(&nodes).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn priority_then_position_without_dependencies() {
        let nodes = vec![node("A", 2, &[]), node("B", 1, &[]), node("C", 1, &[])];
        assert_eq!(resolve_order(&nodes).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn external_references_are_ignored() {
        let nodes = vec![node("A", 0, &["NotAFormula"])];
        assert_eq!(resolve_order(&nodes).unwrap(), vec![0]);
    }

    #[test]
    fn two_node_cycle() {
        let nodes = vec![node("A", 0, &["B"]), node("B", 0, &["A"])];
        let err = resolve_order(&nodes).unwrap_err();
        assert_eq!(err.path, vec!["A", "B", "A"]);
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let nodes = vec![node("A", 0, &["A"])];
        assert_eq!(resolve_order(&nodes).unwrap_err().path, vec!["A", "A"]);
    }
}
