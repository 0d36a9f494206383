//Certipog
//Copyright (C) 2023-2024 The Certipog developers
//
//This program is free software: you can redistribute it and/or modify
//it under the terms of the GNU Affero General Public License as published by
//the Free Software Foundation, either version 3 of the License, or
//(at your option) any later version.
//
//This program is distributed in the hope that it will be useful,
//but WITHOUT ANY WARRANTY; without even the implied warranty of
//MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//GNU Affero General Public License for more details.
//
//You should have received a copy of the GNU Affero General Public License
//along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Two-watched-literal index over the active clause set. A clause watches
//! the negations of its first two literals; the reasoner keeps those two
//! positions non-falsified. Watch lists are append-only between
//! checkpoints, so a checkpoint only records the list lengths that change,
//! the original watched pair of each touched clause, and the trail
//! position. Restoring truncates the lists and rolls the trail back; the
//! reasoner then re-canonizes the leading literal pair of each touched
//! clause via [`Clause::rearrange`](super::clause::Clause::rearrange).

use rustc_hash::FxHashMap;

/// One trail entry: a unit literal and the clause that produced it (0 for
/// assumptions).
#[derive(Debug, Copy, Clone)]
pub struct TrailEntry {
    pub lit: i32,
    pub cid: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LiteralPair {
    pub lit1: i32,
    pub lit2: i32,
}

#[derive(Default)]
pub struct Watcher {
    watch_lists: FxHashMap<i32, Vec<usize>>,
    trail: Vec<TrailEntry>,
    propagate_count: usize,
    saving: bool,
    save_lengths: FxHashMap<i32, usize>,
    save_watched_pairs: FxHashMap<usize, LiteralPair>,
    save_unit_count: usize,
    save_propagate_count: usize,
}

impl Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clause_id(&mut self, cid: usize, lit: i32) {
        let wlist = self.watch_lists.entry(lit).or_default();
        if self.saving {
            self.save_lengths.entry(lit).or_insert(wlist.len());
        }
        wlist.push(cid);
    }

    pub fn add_unit(&mut self, lit: i32, cid: usize) {
        log::trace!("adding unit {} (clause #{}) to trail", lit, cid);
        self.trail.push(TrailEntry { lit, cid });
    }

    /// Next unpropagated unit, or 0 when the trail is exhausted.
    pub fn get_unit(&mut self) -> i32 {
        if self.propagate_count >= self.trail.len() {
            return 0;
        }
        let lit = self.trail[self.propagate_count].lit;
        self.propagate_count += 1;
        lit
    }

    pub fn list(&self, lit: i32) -> &[usize] {
        self.watch_lists.get(&lit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn trail(&self) -> &[TrailEntry] {
        &self.trail
    }

    /// Record the original watched pair of a clause, the first time it is
    /// touched after a checkpoint.
    pub fn watching(&mut self, cid: usize, lit1: i32, lit2: i32) {
        if self.saving {
            self.save_watched_pairs
                .entry(cid)
                .or_insert(LiteralPair { lit1, lit2 });
        }
    }

    pub fn checkpoint(&mut self) {
        self.saving = true;
        self.save_lengths.clear();
        self.save_watched_pairs.clear();
        self.save_unit_count = self.trail.len();
        self.save_propagate_count = self.propagate_count;
    }

    /// Undo everything since the last checkpoint and hand back the touched
    /// clauses with their original watched pairs, for the caller to
    /// rearrange.
    pub fn restore(&mut self) -> FxHashMap<usize, LiteralPair> {
        for (lit, len) in self.save_lengths.drain() {
            if let Some(wlist) = self.watch_lists.get_mut(&lit) {
                wlist.truncate(len);
            }
        }
        self.trail.truncate(self.save_unit_count);
        self.propagate_count = self.save_propagate_count;
        self.saving = false;
        std::mem::take(&mut self.save_watched_pairs)
    }

    pub fn is_initialized(&self) -> bool {
        !self.watch_lists.is_empty()
    }

    pub fn clear(&mut self) {
        self.watch_lists.clear();
        self.trail.clear();
        self.propagate_count = 0;
        self.saving = false;
        self.save_lengths.clear();
        self.save_watched_pairs.clear();
        self.save_unit_count = 0;
        self.save_propagate_count = 0;
    }

    // Debugging support
    pub fn is_watching(&self, cid: usize, lit: i32) -> bool {
        self.list(lit).contains(&cid)
    }

    pub fn on_trail(&self, lit: i32) -> bool {
        self.trail[self.propagate_count..]
            .iter()
            .any(|t| t.lit == lit)
    }
}

#[cfg(test)]
mod test_watcher {
    use super::*;

    #[test]
    fn unit_queue_is_fifo() {
        let mut w = Watcher::new();
        w.add_unit(3, 10);
        w.add_unit(-5, 11);
        assert_eq!(3, w.get_unit());
        assert_eq!(-5, w.get_unit());
        assert_eq!(0, w.get_unit());
    }

    #[test]
    fn restore_truncates_modified_lists() {
        let mut w = Watcher::new();
        w.add_clause_id(1, -2);
        w.add_clause_id(2, -2);
        w.add_unit(4, 1);
        w.checkpoint();
        w.add_clause_id(3, -2);
        w.add_clause_id(4, 7);
        w.add_unit(-9, 3);
        w.watching(3, 9, 2);
        assert_eq!(&[1, 2, 3], w.list(-2));
        let pairs = w.restore();
        assert_eq!(&[1, 2], w.list(-2));
        assert!(w.list(7).is_empty());
        assert_eq!(1, w.trail().len());
        assert_eq!(Some(&LiteralPair { lit1: 9, lit2: 2 }), pairs.get(&3));
    }

    #[test]
    fn restore_rolls_back_propagation_pointer() {
        let mut w = Watcher::new();
        w.add_unit(1, 5);
        assert_eq!(1, w.get_unit());
        w.checkpoint();
        w.add_unit(2, 6);
        assert_eq!(2, w.get_unit());
        w.restore();
        assert_eq!(0, w.get_unit());
        assert_eq!(1, w.trail().len());
    }
}
