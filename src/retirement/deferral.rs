use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// "Retire only after" edges between messages, possibly across keys.
///
/// Edges are keyed by message identity rather than by record, so a source can
/// defer to a target that has not been registered yet. An edge disappears
/// when its target retires.
#[derive(Debug)]
pub struct DeferralGraph<M> {
    /// source -> targets it still waits on, in deferral order
    blockers: HashMap<M, Vec<M>>,
    /// target -> sources waiting on it, in deferral order
    waiters: HashMap<M, Vec<M>>,
}

impl<M> Default for DeferralGraph<M> {
    fn default() -> Self {
        Self {
            blockers: HashMap::new(),
            waiters: HashMap::new(),
        }
    }
}

impl<M: Eq + Hash + Clone> DeferralGraph<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `source -> target`. Returns false if the edge already existed.
    pub fn add(&mut self, source: M, target: M) -> bool {
        let targets = self.blockers.entry(source.clone()).or_default();
        if targets.contains(&target) {
            return false;
        }
        targets.push(target.clone());
        self.waiters.entry(target).or_default().push(source);
        true
    }

    pub fn is_blocked(&self, message: &M) -> bool {
        self.blockers
            .get(message)
            .is_some_and(|targets| !targets.is_empty())
    }

    pub fn pending_targets(&self, message: &M) -> &[M] {
        self.blockers.get(message).map_or(&[], Vec::as_slice)
    }

    /// Drops every edge pointing at `target` and returns the sources that
    /// were waiting on it.
    pub fn retire_target(&mut self, target: &M) -> Vec<M> {
        self.blockers.remove(target);
        let sources = self.waiters.remove(target).unwrap_or_default();
        for source in &sources {
            if let Some(targets) = self.blockers.get_mut(source) {
                targets.retain(|pending| pending != target);
                if targets.is_empty() {
                    self.blockers.remove(source);
                }
            }
        }
        sources
    }

    /// True when `from` transitively waits on `to`.
    pub fn depends_on(&self, from: &M, to: &M) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            for target in self.pending_targets(current) {
                if target == to {
                    return true;
                }
                if visited.insert(target) {
                    stack.push(target);
                }
            }
        }
        false
    }

    /// Everything `message` transitively waits on, nearest first.
    pub fn targets_closure(&self, message: &M) -> Vec<M> {
        self.closure(message, &self.blockers)
    }

    /// Everything transitively waiting on `message`, nearest first.
    pub fn waiters_closure(&self, message: &M) -> Vec<M> {
        self.closure(message, &self.waiters)
    }

    pub fn edge_count(&self) -> usize {
        self.blockers.values().map(Vec::len).sum()
    }

    fn closure(&self, start: &M, edges: &HashMap<M, Vec<M>>) -> Vec<M> {
        if !edges.contains_key(start) {
            return Vec::new();
        }
        let mut seen: HashSet<&M> = HashSet::new();
        let mut order = Vec::new();
        let mut frontier: VecDeque<&M> = VecDeque::from([start]);
        while let Some(current) = frontier.pop_front() {
            for next in edges.get(current).into_iter().flatten() {
                if next != start && seen.insert(next) {
                    order.push(next.clone());
                    frontier.push_back(next);
                }
            }
        }
        order
    }
}
