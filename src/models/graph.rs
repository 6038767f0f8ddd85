//! Graph algorithms over a ticket's subtask dependencies.
//!
//! Dependencies are sibling subtask names. The selector only ever asks
//! "are this subtask's dependencies satisfied?", which cannot notice a cycle;
//! these helpers let validation reject cyclic graphs up front.

use std::collections::HashMap;

use super::Subtask;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InStack,
    Finished,
}

/// Adjacency view of a ticket's subtasks, keyed by position.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    names: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    /// edges[i] = positions subtask i depends on
    edges: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph. Dependencies naming unknown subtasks are left out;
    /// use [`unknown_dependencies`] to report them.
    pub fn new(subtasks: &'a [Subtask]) -> Self {
        let names: Vec<&str> = subtasks.iter().map(|st| st.name.as_str()).collect();
        let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let edges = subtasks
            .iter()
            .map(|st| {
                st.dependencies
                    .iter()
                    .filter_map(|dep| index.get(dep.trim()).copied())
                    .collect()
            })
            .collect();
        Self { names, index, edges }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Find one dependency cycle, returned as the names along it with the
    /// first name repeated at the end (e.g. `[a, b, a]`).
    ///
    /// Iterative DFS, visiting subtasks in stored order so the reported
    /// cycle is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];

        for start in 0..self.names.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // (node, next edge to explore)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::InStack;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&dep) = self.edges[node].get(top.1) {
                    top.1 += 1;
                    match marks[dep] {
                        Mark::Unvisited => {
                            marks[dep] = Mark::InStack;
                            stack.push((dep, 0));
                        }
                        Mark::InStack => {
                            let from = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = stack[from..]
                                .iter()
                                .map(|(n, _)| self.names[*n].to_string())
                                .collect();
                            cycle.push(self.names[dep].to_string());
                            return Some(cycle);
                        }
                        Mark::Finished => {}
                    }
                } else {
                    marks[node] = Mark::Finished;
                    stack.pop();
                }
            }
        }
        None
    }
}

/// `(subtask, dependency)` pairs where the dependency names no sibling.
pub fn unknown_dependencies(subtasks: &[Subtask]) -> Vec<(String, String)> {
    let graph = DependencyGraph::new(subtasks);
    subtasks
        .iter()
        .flat_map(|st| {
            st.dependencies
                .iter()
                .filter(|dep| !graph.contains(dep.trim()))
                .map(move |dep| (st.name.clone(), dep.clone()))
        })
        .collect()
}
