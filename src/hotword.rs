//! Hot-word scorer (C6), spec §4.7.

use std::collections::HashMap;

/// Handle into the hot-word trie's state space. `0` is the root (no active
/// partial match).
pub type HotwordState = u32;

const ROOT: HotwordState = 0;

struct HwNode {
    children: HashMap<usize, HotwordState>,
    /// Sum of weights of every pattern whose spelling ends exactly at this
    /// node. Several overlapping patterns can end at the same node (or at
    /// nodes along the same path), and their weights accumulate (spec §4.7).
    weight_here: f32,
}

/// A token-keyed trie built from hot-word patterns plus per-pattern weights.
pub struct HotwordScorer {
    arena: Vec<HwNode>,
}

impl HotwordScorer {
    /// The trivial scorer: no patterns, every advance is a no-op.
    pub fn empty() -> Self {
        Self {
            arena: vec![HwNode {
                children: HashMap::new(),
                weight_here: 0.0,
            }],
        }
    }

    pub fn build<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = (P, f32)>,
        P: AsRef<[usize]>,
    {
        let mut scorer = Self::empty();
        for (pattern, weight) in patterns {
            let mut node = ROOT;
            for &label in pattern.as_ref() {
                node = *scorer.arena[node as usize]
                    .children
                    .entry(label)
                    .or_insert_with(|| {
                        scorer.arena.push(HwNode {
                            children: HashMap::new(),
                            weight_here: 0.0,
                        });
                        (scorer.arena.len() - 1) as HotwordState
                    });
            }
            scorer.arena[node as usize].weight_here += weight;
        }
        scorer
    }

    pub fn root_state(&self) -> HotwordState {
        ROOT
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 1
    }

    /// Advance by one label. Returns the new state and the bonus earned by
    /// this step (`0.0` if no pattern node was reached). When the current
    /// state has no child for `label`, the match resets to the root — and,
    /// per spec §4.7, a fresh pattern may still begin at this same label, so
    /// the root is tried once more before giving up (a single-level retry,
    /// not full Aho–Corasick failure links).
    pub fn advance(&self, state: HotwordState, label: usize) -> (HotwordState, f32) {
        if let Some(&child) = self.arena[state as usize].children.get(&label) {
            return (child, self.arena[child as usize].weight_here);
        }
        if state != ROOT {
            if let Some(&child) = self.arena[ROOT as usize].children.get(&label) {
                return (child, self.arena[child as usize].weight_here);
            }
        }
        (ROOT, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pattern_match_awards_weight_at_leaf() {
        let hw = HotwordScorer::build(vec![(vec![1usize, 2, 3], 5.0)]);
        let mut state = hw.root_state();
        let mut total = 0.0;
        for &label in &[1usize, 2, 3] {
            let (s, bonus) = hw.advance(state, label);
            state = s;
            total += bonus;
        }
        assert!((total - 5.0).abs() < 1e-6);
    }

    #[test]
    fn non_matching_extension_resets_to_root() {
        let hw = HotwordScorer::build(vec![(vec![1usize, 2], 1.0)]);
        let (s1, _) = hw.advance(hw.root_state(), 1);
        let (s2, bonus) = hw.advance(s1, 9); // breaks the pattern
        assert_eq!(s2, hw.root_state());
        assert_eq!(bonus, 0.0);
    }

    #[test]
    fn overlapping_patterns_accumulate() {
        // "new" and "new york" both score; "new york" should award both.
        let hw = HotwordScorer::build(vec![(vec![1usize, 2], 2.0), (vec![1, 2, 3], 4.0)]);
        let mut state = hw.root_state();
        let mut total = 0.0;
        for &label in &[1usize, 2, 3] {
            let (s, bonus) = hw.advance(state, label);
            state = s;
            total += bonus;
        }
        assert!((total - 6.0).abs() < 1e-6);
    }

    #[test]
    fn restart_after_reset_still_matches() {
        let hw = HotwordScorer::build(vec![(vec![2usize, 3], 1.0)]);
        // label sequence [9, 2, 3]: first label doesn't match, but a fresh
        // pattern can start at the very next label.
        let (s1, b1) = hw.advance(hw.root_state(), 9);
        assert_eq!(b1, 0.0);
        let (s2, b2) = hw.advance(s1, 2);
        assert_eq!(b2, 0.0);
        let (_, b3) = hw.advance(s2, 3);
        assert!((b3 - 1.0).abs() < 1e-6);
    }
}
