//! The flow classifier: a priority-ordered table of wildcarded rules.
//!
//! Rules live in a map keyed by an opaque [`RuleId`](struct.RuleId.html);
//! an index sorted by (priority descending, insertion sequence ascending)
//! drives `lookup`, and a hash index on the normalized (match, priority)
//! pair answers `find_exactly` without scanning. Ties between overlapping
//! rules at equal priority therefore go to the earlier insertion, and the
//! order is stable across runs.
//!
//! Cursor traversal hands out a snapshot of rule ids; deleting the rule
//! the cursor currently points at is safe because stale ids simply stop
//! resolving. Rules inserted mid-traversal are not visited on that pass.

use std::collections::HashMap;

use flow::{FlowKey, Match};
use rule::Rule;

/// Opaque, never-reused handle to an installed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u64);

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    priority: u32,
    seq: u64,
    id: RuleId,
}

#[derive(Debug, Default)]
pub struct Classifier {
    rules: HashMap<RuleId, Rule>,
    /// Sorted by (priority desc, seq asc).
    index: Vec<IndexEntry>,
    exact: HashMap<(Match, u32), RuleId>,
    next_id: u64,
    next_seq: u64,
}

impl Classifier {
    pub fn new() -> Classifier {
        Classifier::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    pub fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(&id)
    }

    /// Install a rule. If a rule with the same (match, priority) already
    /// exists it is displaced and returned with its id; this is the ADD
    /// replacement semantics, not an error.
    pub fn insert(&mut self, rule: Rule) -> (RuleId, Option<(RuleId, Rule)>) {
        let displaced = self
            .exact
            .get(&(rule.match_, rule.priority))
            .cloned()
            .and_then(|old| self.remove(old).map(|rule| (old, rule)));

        let id = RuleId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = IndexEntry {
            priority: rule.priority,
            seq,
            id,
        };
        let pos = self
            .index
            .binary_search_by(|probe| {
                probe
                    .priority
                    .cmp(&entry.priority)
                    .reverse()
                    .then(probe.seq.cmp(&entry.seq))
            })
            .unwrap_err();
        self.index.insert(pos, entry);
        self.exact.insert((rule.match_, rule.priority), id);
        self.rules.insert(id, rule);
        (id, displaced)
    }

    /// Remove and return a rule.
    pub fn remove(&mut self, id: RuleId) -> Option<Rule> {
        let rule = self.rules.remove(&id)?;
        self.exact.remove(&(rule.match_, rule.priority));
        if let Some(pos) = self.index.iter().position(|entry| entry.id == id) {
            self.index.remove(pos);
        }
        Some(rule)
    }

    /// The rule with exactly this match and priority, if any.
    pub fn find_exactly(&self, match_: &Match, priority: u32) -> Option<RuleId> {
        self.exact.get(&(*match_, priority)).cloned()
    }

    /// The highest-priority rule whose match subsumes the concrete flow.
    /// Equal-priority ties go to the earliest insertion.
    pub fn lookup(&self, flow: &FlowKey) -> Option<RuleId> {
        for entry in &self.index {
            if let Some(rule) = self.rules.get(&entry.id) {
                if rule.match_.matches(flow) {
                    return Some(entry.id);
                }
            }
        }
        None
    }

    /// True if any rule at exactly `priority` shares a concrete flow with
    /// `match_`.
    pub fn overlaps(&self, match_: &Match, priority: u32) -> bool {
        for entry in &self.index {
            if entry.priority != priority {
                continue;
            }
            if let Some(rule) = self.rules.get(&entry.id) {
                if rule.match_.overlaps(match_) {
                    return true;
                }
            }
        }
        false
    }

    /// Snapshot of every rule whose match is subsumed by `target`, in
    /// index order. An all-wildcard target enumerates everything. The
    /// returned ids stay valid across deletions (deleted ids no longer
    /// resolve through [`get`](#method.get)).
    pub fn cursor(&self, target: &Match) -> Vec<RuleId> {
        self.index
            .iter()
            .filter(|entry| match self.rules.get(&entry.id) {
                Some(rule) => target.subsumes(&rule.match_),
                None => false,
            })
            .map(|entry| entry.id)
            .collect()
    }

    /// Snapshot of every rule id, in index order.
    pub fn ids(&self) -> Vec<RuleId> {
        self.index.iter().map(|entry| entry.id).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flow;
    use smoltcp::wire::Ipv4Address;

    fn cidr(prefix: [u8; 4], bits: u32, priority: u32) -> Rule {
        let mut m = Match::catch_all();
        m.set_dl_type(flow::ETH_TYPE_IP);
        m.set_nw_src(Ipv4Address::from_bytes(&prefix), !0u32 << (32 - bits));
        Rule::new(m, priority, 0)
    }

    fn ip_flow(src: [u8; 4]) -> FlowKey {
        let mut key = FlowKey::default();
        key.dl_type = flow::ETH_TYPE_IP;
        key.nw_src = Ipv4Address::from_bytes(&src);
        key
    }

    #[test]
    fn test_insert_lookup() {
        let mut cls = Classifier::new();
        let (id, displaced) = cls.insert(cidr([10, 0, 0, 0], 24, 100));
        assert!(displaced.is_none());
        assert_eq!(cls.lookup(&ip_flow([10, 0, 0, 1])), Some(id));
        assert_eq!(cls.lookup(&ip_flow([10, 0, 1, 1])), None);
    }

    #[test]
    fn test_replacement() {
        let mut cls = Classifier::new();
        let mut first = cidr([10, 0, 0, 0], 24, 100);
        first.cookie = 1;
        let (id1, _) = cls.insert(first);
        let mut second = cidr([10, 0, 0, 0], 24, 100);
        second.cookie = 2;
        let (id2, displaced) = cls.insert(second);
        let (displaced_id, displaced_rule) = displaced.unwrap();
        assert_eq!(displaced_id, id1);
        assert_eq!(displaced_rule.cookie, 1);
        assert_ne!(id1, id2);
        assert_eq!(cls.len(), 1);
        assert_eq!(cls.get(id1), None);
    }

    #[test]
    fn test_higher_priority_wins() {
        let mut cls = Classifier::new();
        let (wide, _) = cls.insert(cidr([10, 0, 0, 0], 24, 100));
        let (narrow, _) = cls.insert(cidr([10, 0, 0, 1], 32, 200));
        assert_eq!(cls.lookup(&ip_flow([10, 0, 0, 1])), Some(narrow));
        assert_eq!(cls.lookup(&ip_flow([10, 0, 0, 2])), Some(wide));
    }

    #[test]
    fn test_equal_priority_tie_goes_to_earlier_insertion() {
        let mut cls = Classifier::new();
        let (first, _) = cls.insert(cidr([10, 0, 0, 0], 24, 100));
        let (_second, _) = cls.insert(cidr([10, 0, 0, 0], 16, 100));
        // both match; the earlier insertion wins
        assert_eq!(cls.lookup(&ip_flow([10, 0, 0, 1])), Some(first));
    }

    #[test]
    fn test_find_exactly() {
        let mut cls = Classifier::new();
        let rule = cidr([10, 0, 0, 0], 24, 100);
        let match_ = rule.match_;
        let (id, _) = cls.insert(rule);
        assert_eq!(cls.find_exactly(&match_, 100), Some(id));
        assert_eq!(cls.find_exactly(&match_, 101), None);
    }

    #[test]
    fn test_overlaps() {
        let mut cls = Classifier::new();
        cls.insert(cidr([10, 0, 0, 0], 24, 100));
        let host = cidr([10, 0, 0, 1], 32, 100).match_;
        assert!(cls.overlaps(&host, 100));
        // only the same priority level counts
        assert!(!cls.overlaps(&host, 200));
        let other = cidr([10, 0, 1, 0], 24, 100).match_;
        assert!(!cls.overlaps(&other, 100));
    }

    #[test]
    fn test_cursor_tolerates_deleting_current() {
        let mut cls = Classifier::new();
        let (a, _) = cls.insert(cidr([10, 0, 0, 0], 24, 100));
        let (b, _) = cls.insert(cidr([10, 0, 1, 0], 24, 100));
        let (c, _) = cls.insert(cidr([10, 0, 2, 0], 24, 100));
        let cursor = cls.cursor(&Match::catch_all());
        assert_eq!(cursor, vec![a, b, c]);
        let mut visited = Vec::new();
        for id in cursor {
            if cls.get(id).is_some() {
                visited.push(id);
                cls.remove(id);
            }
        }
        assert_eq!(visited, vec![a, b, c]);
        assert!(cls.is_empty());
    }

    #[test]
    fn test_cursor_filters_by_subsumption() {
        let mut cls = Classifier::new();
        let (narrow, _) = cls.insert(cidr([10, 0, 0, 1], 32, 100));
        let (_other, _) = cls.insert(cidr([192, 168, 0, 0], 16, 100));
        let target = cidr([10, 0, 0, 0], 24, 0).match_;
        assert_eq!(cls.cursor(&target), vec![narrow]);
    }
}
