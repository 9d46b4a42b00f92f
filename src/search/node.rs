//! Per-state action statistics for PUCT.

use crate::moves::Action;
use std::collections::HashMap;

/// Statistics of one (state, action) edge.
#[derive(Clone, Debug, Default)]
pub struct ActionStats {
    /// Visit count.
    pub n: u32,
    /// Accumulated value.
    pub w: f32,
    /// Mean value, `w / n`.
    pub q: f32,
    /// Prior probability from the evaluator.
    pub p: f32,
    /// In-flight simulations currently holding this edge.
    pub vloss: u32,
}

impl ActionStats {
    /// Mean value with the virtual-loss penalty applied, used during
    /// selection so concurrent simulations prefer different branches.
    #[inline]
    fn q_effective(&self) -> f32 {
        let n = self.n + self.vloss;
        if n == 0 {
            0.0
        } else {
            (self.w - self.vloss as f32) / n as f32
        }
    }
}

/// Statistics for every legal action from one state. Created
/// zero-initialized on first visit, filled with priors on expansion.
#[derive(Debug, Default)]
pub struct SearchNode {
    stats: HashMap<Action, ActionStats>,
    legal_actions: Vec<Action>,
    /// Total visits over all actions.
    pub sum_n: u32,
    pub expanded: bool,
}

impl SearchNode {
    /// Install priors for the legal actions. A second expansion of the
    /// same node (two simulations racing to the same leaf) is a no-op.
    pub fn expand(&mut self, priors: Vec<(Action, f32)>) {
        if self.expanded {
            return;
        }
        for (action, p) in priors {
            self.legal_actions.push(action);
            self.stats.insert(
                action,
                ActionStats {
                    p,
                    ..ActionStats::default()
                },
            );
        }
        self.expanded = true;
    }

    #[inline]
    pub fn legal_actions(&self) -> &[Action] {
        &self.legal_actions
    }

    #[inline]
    pub fn stats(&self, action: Action) -> Option<&ActionStats> {
        self.stats.get(&action)
    }

    #[inline]
    pub fn stats_mut(&mut self, action: Action) -> Option<&mut ActionStats> {
        self.stats.get_mut(&action)
    }

    /// PUCT selection: maximize `Q + c_puct * P * sqrt(sum_n) / (1 + N)`,
    /// with virtual losses counted into Q and N.
    pub fn select(&self, c_puct: f32) -> Option<Action> {
        let total: u32 = self.stats.values().map(|s| s.n + s.vloss).sum();
        let sqrt_total = ((total + 1) as f32).sqrt();

        self.legal_actions
            .iter()
            .map(|&action| {
                let s = &self.stats[&action];
                let u = c_puct * s.p * sqrt_total / (1.0 + (s.n + s.vloss) as f32);
                (action, s.q_effective() + u)
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(action, _)| action)
    }

    #[inline]
    pub fn apply_virtual_loss(&mut self, action: Action) {
        if let Some(s) = self.stats.get_mut(&action) {
            s.vloss += 1;
        }
    }

    #[inline]
    pub fn revert_virtual_loss(&mut self, action: Action) {
        if let Some(s) = self.stats.get_mut(&action) {
            s.vloss = s.vloss.saturating_sub(1);
        }
    }

    /// Record one real visit of `action` with the given backed-up value.
    pub fn visit(&mut self, action: Action, value: f32) {
        if let Some(s) = self.stats.get_mut(&action) {
            s.n += 1;
            s.w += value;
            s.q = s.w / s.n as f32;
            self.sum_n += 1;
        }
    }

    /// Erase the visits of a forbidden action so it cannot be chosen.
    pub fn zero_visits(&mut self, action: Action) {
        if let Some(s) = self.stats.get_mut(&action) {
            self.sum_n -= s.n;
            s.n = 0;
            s.w = 0.0;
            s.q = 0.0;
        }
    }

    /// Best mean value over the visited actions; the root's value estimate.
    pub fn best_value(&self) -> Option<f32> {
        self.stats
            .values()
            .filter(|s| s.n > 0)
            .map(|s| s.q)
            .max_by(f32::total_cmp)
    }
}
