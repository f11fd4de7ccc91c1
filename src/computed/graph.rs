//! Dependency bookkeeping for computed paths.
//!
//! Holds only edges between path names, never values: the graph is a weak
//! back-reference into the store's path space. Cycles are rejected at
//! registration time, so traversal at read time cannot loop.

use std::collections::HashSet;
use std::collections::VecDeque;

use dashmap::DashMap;

use crate::ComputeError;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// computed path -> its declared dependencies
    forward: DashMap<String, Vec<String>>,
    /// dependency path -> computed paths that depend on it
    reverse: DashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            forward: DashMap::new(),
            reverse: DashMap::new(),
        }
    }

    /// Register edges for a computed path. Fails if the path is already
    /// registered or if any declared dependency (transitively) depends on
    /// the path itself.
    pub fn register(
        &self,
        path: &str,
        dependencies: &[String],
    ) -> std::result::Result<(), ComputeError> {
        if self.forward.contains_key(path) {
            return Err(ComputeError::AlreadyRegistered(path.to_string()));
        }
        for dep in dependencies {
            if dep == path || self.reaches(dep, path) {
                return Err(ComputeError::CycleDetected {
                    path: path.to_string(),
                    via: dep.clone(),
                });
            }
        }

        self.forward.insert(path.to_string(), dependencies.to_vec());
        for dep in dependencies {
            self.reverse.entry(dep.clone()).or_default().insert(path.to_string());
        }
        Ok(())
    }

    /// Remove a computed path's edges. Reverse edges pointing *at* the path
    /// (other computed paths depending on it) are left in place.
    pub fn unregister(
        &self,
        path: &str,
    ) -> bool {
        let Some((_, dependencies)) = self.forward.remove(path) else {
            return false;
        };
        for dep in &dependencies {
            if let Some(mut dependents) = self.reverse.get_mut(dep) {
                dependents.remove(path);
            }
            self.reverse.remove_if(dep, |_, dependents| dependents.is_empty());
        }
        true
    }

    pub fn is_registered(
        &self,
        path: &str,
    ) -> bool {
        self.forward.contains_key(path)
    }

    pub fn dependencies_of(
        &self,
        path: &str,
    ) -> Option<Vec<String>> {
        self.forward.get(path).map(|deps| deps.value().clone())
    }

    /// BFS over reverse edges: every computed path that depends on `path`
    /// directly or transitively.
    pub fn transitive_dependents(
        &self,
        path: &str,
    ) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(path.to_string());

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.reverse.get(&current) {
                for dependent in dependents.iter() {
                    if seen.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        seen
    }

    /// DFS over forward edges: does `from` (transitively) depend on `target`?
    fn reaches(
        &self,
        from: &str,
        target: &str,
    ) -> bool {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = vec![from.to_string()];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = self.forward.get(&current) {
                stack.extend(deps.iter().cloned());
            }
        }
        false
    }
}
