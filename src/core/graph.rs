//! Job dependency graph
//!
//! Built once at load time. Jobs are addressed by their declaration index;
//! edges point from a job to the jobs it `needs`.

use crate::core::error::DefinitionError;
use crate::core::job::Job;
use std::collections::{BTreeSet, HashMap};

/// Validated, acyclic dependency graph over a pipeline's jobs
#[derive(Debug, Clone)]
pub struct JobGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// `deps[i]`: indices job `i` needs
    deps: Vec<Vec<usize>>,
    /// `dependents[i]`: indices that need job `i`
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

impl JobGraph {
    /// Build and validate the graph
    pub fn build(jobs: &[Job]) -> Result<Self, DefinitionError> {
        let mut index = HashMap::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            if index.insert(job.name.clone(), i).is_some() {
                return Err(DefinitionError::DuplicateJob(job.name.clone()));
            }
        }

        let mut deps = vec![Vec::new(); jobs.len()];
        let mut dependents = vec![Vec::new(); jobs.len()];
        for (i, job) in jobs.iter().enumerate() {
            for dependency in &job.needs {
                let j = *index
                    .get(dependency)
                    .ok_or_else(|| DefinitionError::UnknownDependency {
                        job: job.name.clone(),
                        dependency: dependency.clone(),
                    })?;
                if !deps[i].contains(&j) {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
            }
        }

        let mut graph = Self {
            names: jobs.iter().map(|j| j.name.clone()).collect(),
            index,
            deps,
            dependents,
            order: Vec::new(),
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(DefinitionError::CycleDetected { cycle });
        }
        graph.order = graph.kahn_order();
        Ok(graph)
    }

    /// DFS colouring; returns the job names along the first cycle found,
    /// closed by repeating its first job
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colour = vec![Colour::White; self.names.len()];
        let mut path = Vec::new();

        for start in 0..self.names.len() {
            if colour[start] == Colour::White {
                if let Some(cycle) = self.visit(start, &mut colour, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(&self, node: usize, colour: &mut [Colour], path: &mut Vec<usize>) -> Option<Vec<String>> {
        colour[node] = Colour::Grey;
        path.push(node);

        for &next in &self.deps[node] {
            match colour[next] {
                Colour::Grey => {
                    let from = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[from..].iter().map(|&n| self.names[n].clone()).collect();
                    cycle.push(self.names[next].clone());
                    return Some(cycle);
                }
                Colour::White => {
                    if let Some(cycle) = self.visit(next, colour, path) {
                        return Some(cycle);
                    }
                }
                Colour::Black => {}
            }
        }

        path.pop();
        colour[node] = Colour::Black;
        None
    }

    /// Kahn's algorithm; ties go to the earlier-declared job
    fn kahn_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &self.dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Declaration indices in topological order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Job names in topological order
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Indices job `index` needs
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.deps[index]
    }

    /// Indices that need job `index`
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Jobs without dependencies, in declaration order
    pub fn roots(&self) -> Vec<&str> {
        (0..self.names.len())
            .filter(|&i| self.deps[i].is_empty())
            .map(|i| self.names[i].as_str())
            .collect()
    }
}
