// ============================================================================
// Retirement Ledger
// ============================================================================
//
// Decides when a finished message may report completion to its caller.
//
// A record retires once it is:
// - completed (execution finished),
// - not held,
// - not waiting on any deferral target,
// - clear of its key queue (nothing unrelated registered before it on the
//   same key is still pending),
// - clear of universal-key barriers (Barrier policy only).
//
// A record that an earlier record of its key (transitively) waits on takes
// that waiter's queue position. Otherwise a same-key deferral would wait on
// itself through the queue.
//
// ============================================================================

use super::deferral::DeferralGraph;
use super::hold::HoldTable;
use super::key_queue::KeyQueues;
use super::record::RetirementRecord;
use super::stats::{KeyBacklog, RetirementStats};
use crate::config::UniversalKeyPolicy;
use crate::core::{ConcurrencyKey, ContractViolation, RegistrationSeq};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{debug, trace};

type Outcome<T> = std::result::Result<T, ContractViolation>;

/// Single-threaded retirement bookkeeping.
///
/// Every operation validates its contract before mutating anything, so a
/// rejected call leaves the ledger untouched. [`RetirementManager`] wraps this
/// in a lock for use from worker threads.
///
/// [`RetirementManager`]: super::RetirementManager
pub struct RetirementLedger<M, R> {
    policy: UniversalKeyPolicy,
    next_seq: RegistrationSeq,
    /// Arena of live records, in registration order
    records: BTreeMap<RegistrationSeq, RetirementRecord<M, R>>,
    index: HashMap<M, RegistrationSeq>,
    queues: KeyQueues,
    /// Live universal-key records (never queued)
    universal: BTreeSet<RegistrationSeq>,
    deferrals: DeferralGraph<M>,
    holds: HoldTable<M>,
    registered_total: u64,
    retired_total: u64,
}

impl<M, R> RetirementLedger<M, R>
where
    M: Eq + Hash + Clone + Debug,
{
    pub fn new(policy: UniversalKeyPolicy) -> Self {
        Self {
            policy,
            next_seq: RegistrationSeq(1),
            records: BTreeMap::new(),
            index: HashMap::new(),
            queues: KeyQueues::new(),
            universal: BTreeSet::new(),
            deferrals: DeferralGraph::new(),
            holds: HoldTable::new(),
            registered_total: 0,
            retired_total: 0,
        }
    }

    pub fn policy(&self) -> UniversalKeyPolicy {
        self.policy
    }

    /// Registers a message at the tail of `key`'s queue.
    pub fn register(&mut self, message: M, key: ConcurrencyKey, retiree: R) -> Outcome<RegistrationSeq> {
        if self.index.contains_key(&message) {
            return Err(ContractViolation::DuplicateRegistration(describe(&message)));
        }

        let seq = self.next_seq;
        self.next_seq = seq.next();

        if key.is_universal() {
            self.universal.insert(seq);
        } else {
            self.queues.push(key, seq);
        }

        trace!(message = ?message, %key, %seq, "message registered");
        self.index.insert(message.clone(), seq);
        self.records
            .insert(seq, RetirementRecord::new(message, key, seq, retiree));
        self.registered_total += 1;
        Ok(seq)
    }

    /// Gates `source`'s retirement on `target`'s retirement.
    ///
    /// Neither message has to be registered yet; the edge waits for them.
    /// Retired messages are forgotten, so an edge to a message that already
    /// retired is indistinguishable from one to a message not yet registered:
    /// `source` stays blocked until a message with that identity registers and
    /// retires. [`stats`](Self::stats) and [`backlog`](Self::backlog) report
    /// records stuck on such targets.
    pub fn defer(&mut self, source: M, target: M) -> Outcome<()> {
        if source == target {
            return Err(ContractViolation::SelfDeferral(describe(&source)));
        }
        if self.deferrals.depends_on(&target, &source) {
            return Err(ContractViolation::DeferralCycle {
                source_message: describe(&source),
                target: describe(&target),
            });
        }

        debug!(
            source = ?source,
            target = ?target,
            target_registered = self.index.contains_key(&target),
            "retirement deferred"
        );
        self.deferrals.add(source, target);
        Ok(())
    }

    pub fn hold(&mut self, message: &M) -> Outcome<u32> {
        self.seq_of(message)?;
        Ok(self.holds.hold(message))
    }

    /// Drops one hold. Returns true when the last hold is gone and completion
    /// was already signaled: the caller should signal completion again.
    pub fn release(&mut self, message: &M) -> Outcome<bool> {
        let seq = self.seq_of(message)?;
        let remaining = self
            .holds
            .release(message)
            .ok_or_else(|| ContractViolation::ReleaseWithoutHold(describe(message)))?;
        Ok(remaining == 0 && self.records[&seq].is_completed())
    }

    /// Marks `message` finished and returns every retiree that may now be
    /// retired, in the order they must be retired.
    ///
    /// Signaling completion again for a still registered message re-runs
    /// resolution, which is how a released hold takes effect.
    pub fn complete(&mut self, message: &M) -> Outcome<Vec<R>> {
        let seq = self.seq_of(message)?;
        if let Some(record) = self.records.get_mut(&seq) {
            record.mark_completed();
        }

        let mut candidates = Worklist::default();
        candidates.push(seq);
        // Deferring to a record can lift it past its waiter in the key queue,
        // so completed targets get another chance.
        for target in self.deferrals.targets_closure(message) {
            if let Some(&target_seq) = self.index.get(&target) {
                if self.records[&target_seq].is_completed() {
                    candidates.push(target_seq);
                }
            }
        }

        let (retirees, examined) = self.resolve(candidates);
        debug!(message = ?message, retired = retirees.len(), examined, "completion resolved");
        Ok(retirees)
    }

    pub fn is_retireable(&self, message: &M) -> Outcome<bool> {
        let seq = self.seq_of(message)?;
        Ok(self.is_eligible(seq))
    }

    pub fn is_registered(&self, message: &M) -> bool {
        self.index.contains_key(message)
    }

    /// Number of registered, unretired messages.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn queue_depth(&self, key: ConcurrencyKey) -> usize {
        if key.is_universal() {
            self.universal.len()
        } else {
            self.queues.depth(key)
        }
    }

    pub fn stats(&self) -> RetirementStats {
        let records = self.records.values();
        RetirementStats {
            registered_total: self.registered_total,
            retired_total: self.retired_total,
            pending: self.records.len(),
            completed_pending: records.clone().filter(|r| r.is_completed()).count(),
            held: self.holds.held_messages(),
            blocked_by_deferral: records
                .clone()
                .filter(|r| self.deferrals.is_blocked(r.message()))
                .count(),
            blocked_on_unregistered: records
                .filter(|r| self.waits_on_unregistered(r.message()))
                .count(),
            pending_deferral_edges: self.deferrals.edge_count(),
            keys: self.queues.key_count() + usize::from(!self.universal.is_empty()),
        }
    }

    /// Per-key queue state, universal key first, then ascending keys.
    pub fn backlog(&self) -> Vec<KeyBacklog> {
        let mut heads = Vec::new();
        if let Some(&head) = self.universal.first() {
            heads.push((ConcurrencyKey::UNIVERSAL, head));
        }
        for key in self.queues.keys() {
            if let Some(head) = self.queues.head(key) {
                heads.push((key, head));
            }
        }

        heads
            .into_iter()
            .map(|(key, head)| {
                let record = &self.records[&head];
                KeyBacklog {
                    key,
                    depth: self.queue_depth(key),
                    head_completed: record.is_completed(),
                    head_held: self.holds.is_held(record.message()),
                    head_deferred: self.deferrals.is_blocked(record.message()),
                    head_waiting_on_unregistered: self.waits_on_unregistered(record.message()),
                }
            })
            .collect()
    }

    fn seq_of(&self, message: &M) -> Outcome<RegistrationSeq> {
        self.index
            .get(message)
            .copied()
            .ok_or_else(|| ContractViolation::UnknownMessage(describe(message)))
    }

    /// True when `message` waits on a target that is not currently registered.
    fn waits_on_unregistered(&self, message: &M) -> bool {
        self.deferrals
            .pending_targets(message)
            .iter()
            .any(|target| !self.index.contains_key(target))
    }

    /// Fixpoint over candidates: retire whatever is eligible and queue up the
    /// records each retirement may have freed. Also returns how many
    /// candidates were examined.
    fn resolve(&mut self, mut candidates: Worklist) -> (Vec<R>, usize) {
        let mut retirees = Vec::new();
        let mut examined = 0;
        while let Some(seq) = candidates.pop() {
            examined += 1;
            if !self.records.contains_key(&seq) || !self.is_eligible(seq) {
                continue;
            }
            retirees.push(self.retire(seq, &mut candidates));
        }
        (retirees, examined)
    }

    fn retire(&mut self, seq: RegistrationSeq, candidates: &mut Worklist) -> R {
        let Some(record) = self.records.remove(&seq) else {
            unreachable!("retiring {} which is not live", seq);
        };
        let key = record.key();
        let (message, retiree) = record.into_parts();

        self.index.remove(&message);
        self.holds.forget(&message);
        if key.is_universal() {
            self.universal.remove(&seq);
        } else {
            self.queues.remove(key, seq);
        }
        let waiters = self.deferrals.retire_target(&message);
        self.retired_total += 1;
        trace!(message = ?message, %key, %seq, "message retired");

        if !key.is_universal() {
            self.push_queue_front(key, candidates);
        }
        for waiter in &waiters {
            if let Some(&waiter_seq) = self.index.get(waiter) {
                candidates.push(waiter_seq);
            }
        }

        if self.policy == UniversalKeyPolicy::Barrier {
            if key.is_universal() {
                let mut freed = Worklist::default();
                for other in self.queues.keys() {
                    self.push_queue_front(other, &mut freed);
                }
                freed.sort();
                candidates.extend(freed);
            }
            let barriers = self
                .universal
                .range(seq..)
                .filter(|s| self.records[*s].is_completed());
            candidates.extend(barriers.copied());
        }

        retiree
    }

    /// Queues the records of `key` that a retirement may have unblocked.
    ///
    /// Only the head can become queue-clear on its own. Any other record that
    /// became clear has the head as a (transitive) waiter and so sits in the
    /// head's target closure; under Barrier a live barrier can lend its slot
    /// the same way.
    fn push_queue_front(&self, key: ConcurrencyKey, candidates: &mut Worklist) {
        let Some(head) = self.queues.head(key) else {
            return;
        };
        let head_record = &self.records[&head];
        if head_record.is_completed() {
            candidates.push(head);
        }

        let mut lenders = vec![head_record.message()];
        if self.policy == UniversalKeyPolicy::Barrier {
            lenders.extend(self.universal.iter().map(|s| self.records[s].message()));
        }
        for lender in lenders {
            for target in self.deferrals.targets_closure(lender) {
                let Some(&target_seq) = self.index.get(&target) else {
                    continue;
                };
                let target_record = &self.records[&target_seq];
                if target_record.key() == key && target_record.is_completed() {
                    candidates.push(target_seq);
                }
            }
        }
    }

    fn is_eligible(&self, seq: RegistrationSeq) -> bool {
        let Some(record) = self.records.get(&seq) else {
            return false;
        };
        if !record.is_completed()
            || self.holds.is_held(record.message())
            || self.deferrals.is_blocked(record.message())
        {
            return false;
        }

        let dependents = self.live_dependents(record.message());
        self.is_queue_clear(record, &dependents) && self.is_barrier_clear(record, &dependents)
    }

    /// Live records that transitively wait on `message`.
    fn live_dependents(&self, message: &M) -> HashSet<RegistrationSeq> {
        self.deferrals
            .waiters_closure(message)
            .iter()
            .filter_map(|waiter| self.index.get(waiter).copied())
            .collect()
    }

    fn is_queue_clear(
        &self,
        record: &RetirementRecord<M, R>,
        dependents: &HashSet<RegistrationSeq>,
    ) -> bool {
        let key = record.key();
        if key.is_universal() {
            return true;
        }

        // Earliest slot held by a waiter on this key (or by a barrier that
        // waits on this record).
        let anchor = dependents
            .iter()
            .filter(|s| {
                let dependent_key = self.records[*s].key();
                dependent_key == key
                    || (self.policy == UniversalKeyPolicy::Barrier && dependent_key.is_universal())
            })
            .copied()
            .chain(std::iter::once(record.seq()))
            .min()
            .unwrap_or(record.seq());

        self.queues
            .before(key, record.seq())
            .all(|earlier| earlier > anchor || dependents.contains(&earlier))
    }

    fn is_barrier_clear(
        &self,
        record: &RetirementRecord<M, R>,
        dependents: &HashSet<RegistrationSeq>,
    ) -> bool {
        if self.policy != UniversalKeyPolicy::Barrier {
            return true;
        }

        if record.key().is_universal() {
            self.records
                .range(..record.seq())
                .all(|(earlier, _)| dependents.contains(earlier))
        } else {
            self.universal
                .range(..record.seq())
                .all(|barrier| dependents.contains(barrier))
        }
    }
}

impl<M, R> Debug for RetirementLedger<M, R>
where
    M: Eq + Hash + Clone + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetirementLedger")
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Resolution candidates in FIFO order. A record is queued at most once at a
/// time; it may be queued again after it was examined.
#[derive(Debug, Default)]
struct Worklist {
    order: VecDeque<RegistrationSeq>,
    queued: HashSet<RegistrationSeq>,
}

impl Worklist {
    fn push(&mut self, seq: RegistrationSeq) {
        if self.queued.insert(seq) {
            self.order.push_back(seq);
        }
    }

    fn pop(&mut self) -> Option<RegistrationSeq> {
        let seq = self.order.pop_front()?;
        self.queued.remove(&seq);
        Some(seq)
    }

    /// Reorders queued records by registration.
    fn sort(&mut self) {
        self.order.make_contiguous().sort_unstable();
    }
}

impl Extend<RegistrationSeq> for Worklist {
    fn extend<I: IntoIterator<Item = RegistrationSeq>>(&mut self, iter: I) {
        for seq in iter {
            self.push(seq);
        }
    }
}

impl IntoIterator for Worklist {
    type Item = RegistrationSeq;
    type IntoIter = std::collections::vec_deque::IntoIter<RegistrationSeq>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

fn describe<M: Debug>(message: &M) -> String {
    format!("{:?}", message)
}
