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

//! Clauses are vectors of literals with two lazily maintained flags. The
//! canonical form sorts by variable id and collapses duplicates; a clause
//! containing both phases of a variable canonizes to the two-literal
//! tautology `[v, -v]`. Equality and hashing are defined on the canonical
//! form. A clause created as the argument of a lemma carries an activating
//! literal: the clause is only in force in contexts where that literal
//! holds. Regular clauses have activating literal 0.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

use super::literal::{abs_less, var_of};

#[derive(Debug, Clone)]
pub struct Clause {
    lits: Vec<i32>,
    is_tautology: bool,
    canonized: bool,
    activating_literal: i32,
}

impl Default for Clause {
    fn default() -> Self {
        Self::new()
    }
}

impl Clause {
    pub fn new() -> Self {
        Self {
            lits: vec![],
            is_tautology: false,
            canonized: true,
            activating_literal: 0,
        }
    }

    pub fn from_lits(lits: &[i32]) -> Self {
        Self {
            lits: lits.to_vec(),
            is_tautology: false,
            canonized: false,
            activating_literal: 0,
        }
    }

    pub fn unit(lit: i32) -> Self {
        Self {
            lits: vec![lit],
            is_tautology: false,
            canonized: true,
            activating_literal: 0,
        }
    }

    pub fn push(&mut self, lit: i32) {
        self.lits.push(lit);
        self.canonized = false;
    }

    /// Number of literals; a tautology reports length 0.
    pub fn len(&self) -> usize {
        if self.is_tautology {
            0
        } else {
            self.lits.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn literals(&self) -> &[i32] {
        &self.lits
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.lits.iter().copied()
    }

    pub fn activating_literal(&self) -> i32 {
        self.activating_literal
    }

    pub fn set_activating_literal(&mut self, alit: i32) {
        self.activating_literal = alit;
    }

    /// Sort by variable id, collapse duplicates, detect tautologies. A
    /// tautology is stored as `[v, -v]`.
    pub fn canonize(&mut self) {
        if self.canonized {
            return;
        }
        self.lits.sort_by(abs_less);
        let mut last_lit: i32 = 0;
        let mut write_pos = 0;
        self.is_tautology = false;
        for read_pos in 0..self.lits.len() {
            let lit = self.lits[read_pos];
            if lit.abs() == last_lit.abs() {
                if lit != last_lit {
                    self.is_tautology = true;
                    last_lit = lit;
                    break;
                }
            } else {
                self.lits[write_pos] = lit;
                write_pos += 1;
            }
            last_lit = lit;
        }
        if self.is_tautology {
            self.lits.truncate(2);
            self.lits[0] = last_lit.abs();
            self.lits[1] = -last_lit.abs();
        } else {
            self.lits.truncate(write_pos);
        }
        self.canonized = true;
    }

    pub fn tautology(&mut self) -> bool {
        self.canonize();
        self.is_tautology
    }

    /// Turn the clause into a tautology in place, reusing its first literal.
    pub fn make_tautology(&mut self) {
        self.lits.truncate(2);
        if self.lits.is_empty() {
            self.lits.push(1);
        }
        if self.lits.len() == 1 {
            self.lits.push(-self.lits[0]);
        } else {
            self.lits[1] = -self.lits[0];
        }
        self.is_tautology = true;
        self.canonized = true;
    }

    pub fn max_variable(&self) -> i32 {
        if self.is_tautology {
            return 0;
        }
        self.lits.iter().map(|lit| var_of(*lit)).max().unwrap_or(0)
    }

    pub fn contains(&self, lit: i32) -> bool {
        self.lits.contains(&lit)
    }

    pub fn swap_literals(&mut self, idx1: usize, idx2: usize) {
        self.lits.swap(idx1, idx2);
        self.canonized = false;
    }

    /// Permute literals so that the pair sits at positions 0 and 1. Used to
    /// restore watched positions after a checkpoint rollback.
    pub fn rearrange(&mut self, lit1: i32, lit2: i32) {
        for (slot, target) in [(0usize, lit1), (1usize, lit2)] {
            let mut found = false;
            for j in 0..self.lits.len() {
                if self.lits[j] == target {
                    self.lits.swap(slot, j);
                    found = true;
                    break;
                }
            }
            if !found {
                log::error!("rearrange: literal {} not found in clause", target);
            }
        }
        self.canonized = false;
    }

    /// Residual of the clause under a set of unit literals. `None` when
    /// some unit satisfies the clause.
    pub fn simplify(&self, unit_literals: &FxHashSet<i32>) -> Option<Vec<i32>> {
        let mut lits = vec![];
        for lit in self.iter() {
            if unit_literals.contains(&lit) {
                return None;
            }
            if !unit_literals.contains(&-lit) {
                lits.push(lit);
            }
        }
        Some(lits)
    }

    /// Element-wise comparison of canonical forms. Both sides must already
    /// be canonized.
    pub fn is_equal(&self, other: &Clause) -> bool {
        debug_assert!(self.canonized && other.canonized);
        self.is_tautology == other.is_tautology && self.len() == other.len() && {
            let n = self.len();
            self.lits[..n] == other.lits[..n]
        }
    }

    /// Is the clause satisfied by a total assignment (index var-1, value
    /// 0/1)?
    pub fn satisfied(&self, assignment: &[i8]) -> bool {
        self.is_tautology
            || self.lits.iter().any(|&lit| {
                let value = assignment[var_of(lit) as usize - 1];
                (lit < 0 && value == 0) || (lit > 0 && value == 1)
            })
    }
}

impl std::ops::Index<usize> for Clause {
    type Output = i32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.lits[index]
    }
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_tautology {
            return write!(f, "1 -1 0");
        }
        for lit in self.lits.iter() {
            write!(f, "{} ", lit)?;
        }
        write!(f, "0")
    }
}

const HASH_MODULUS: u64 = 2_147_483_647;
const HASH_CHUNK: usize = 1024;
const HASH_SEED: u64 = 0x43504f47;

/// Hash signatures over a table of per-variable random residues modulo a
/// Mersenne prime. Negative literals fold as `1 + M - v`. The table grows
/// on demand from a fixed-seed generator, so signatures are stable across
/// runs of the same instance.
pub struct ClauseHasher {
    var_hash: Vec<u64>,
    rng: StdRng,
}

impl Default for ClauseHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseHasher {
    pub fn new() -> Self {
        Self {
            var_hash: vec![],
            rng: StdRng::seed_from_u64(HASH_SEED),
        }
    }

    fn value_for(&mut self, var: usize) -> u64 {
        if var >= self.var_hash.len() {
            let osize = self.var_hash.len();
            let nsize = osize + (1 + (var - osize) / HASH_CHUNK) * HASH_CHUNK;
            for _ in osize..nsize {
                let value = self.rng.gen_range(0..HASH_MODULUS);
                self.var_hash.push(value);
            }
        }
        self.var_hash[var]
    }

    pub fn next_hash(&mut self, sofar: u64, val: i32) -> u64 {
        let vval = self.value_for(var_of(val) as usize);
        let lval = if val < 0 { 1 + HASH_MODULUS - vval } else { vval };
        (lval * sofar) % HASH_MODULUS
    }

    pub fn hash_clause(&mut self, clause: &mut Clause) -> u64 {
        clause.canonize();
        let mut val = 1;
        for i in 0..clause.len() {
            val = self.next_hash(val, clause[i]);
        }
        val
    }
}

/// Membership testing for the literals of one clause at a time, backed by
/// a generation-stamped vector over the input variables.
pub struct LiteralSet {
    last_gen: Vec<i32>,
    current_generation: i32,
}

impl LiteralSet {
    pub fn new(nvar: usize) -> Self {
        Self {
            last_gen: vec![0; nvar],
            current_generation: 1,
        }
    }

    pub fn load_clause(&mut self, clause: &Clause) {
        self.current_generation += 1;
        for lit in clause.iter() {
            let idx = var_of(lit) as usize - 1;
            self.last_gen[idx] = if lit < 0 {
                -self.current_generation
            } else {
                self.current_generation
            };
        }
    }

    pub fn contains(&self, lit: i32) -> bool {
        let idx = var_of(lit) as usize - 1;
        if lit < 0 {
            self.last_gen[idx] == -self.current_generation
        } else {
            self.last_gen[idx] == self.current_generation
        }
    }
}

#[cfg(test)]
mod test_clause {
    use super::*;

    #[test]
    fn canonize_sorts_and_dedupes() {
        let mut c = Clause::from_lits(&[4, -2, 4, 9]);
        c.canonize();
        assert_eq!(&[-2, 4, 9], c.literals());
        assert!(!c.tautology());
    }

    #[test]
    fn canonize_detects_tautology() {
        let mut c = Clause::from_lits(&[3, -5, -3]);
        assert!(c.tautology());
        assert_eq!(0, c.len());
        assert_eq!(&[3, -3], c.literals());
    }

    #[test]
    fn simplify_by_units() {
        let c = Clause::from_lits(&[1, -2, 3]);
        let mut units = FxHashSet::default();
        units.insert(2);
        assert_eq!(Some(vec![1, 3]), c.simplify(&units));
        units.insert(3);
        assert_eq!(None, c.simplify(&units));
    }

    #[test]
    fn rearrange_places_pair_first() {
        let mut c = Clause::from_lits(&[5, -6, 7, 8]);
        c.rearrange(7, -6);
        assert_eq!(7, c[0]);
        assert_eq!(-6, c[1]);
        let mut sorted = c.literals().to_vec();
        sorted.sort();
        assert_eq!(vec![-6, 5, 7, 8], sorted);
    }

    #[test]
    fn equal_clauses_share_hash() {
        let mut hasher = ClauseHasher::new();
        let mut a = Clause::from_lits(&[7, -3, 1]);
        let mut b = Clause::from_lits(&[1, 7, -3]);
        a.canonize();
        b.canonize();
        assert!(a.is_equal(&b));
        assert_eq!(hasher.hash_clause(&mut a), hasher.hash_clause(&mut b));
        let mut c = Clause::from_lits(&[1, 7, 3]);
        c.canonize();
        assert!(!a.is_equal(&c));
        assert_ne!(hasher.hash_clause(&mut a), hasher.hash_clause(&mut c));
    }

    #[test]
    fn hash_stable_across_hashers() {
        let mut h1 = ClauseHasher::new();
        let mut h2 = ClauseHasher::new();
        let mut c = Clause::from_lits(&[2, -4, 11]);
        assert_eq!(h1.hash_clause(&mut c), h2.hash_clause(&mut c));
    }

    #[test]
    fn literal_set_membership() {
        let mut lset = LiteralSet::new(6);
        let c = Clause::from_lits(&[1, -4, 6]);
        lset.load_clause(&c);
        assert!(lset.contains(1));
        assert!(lset.contains(-4));
        assert!(!lset.contains(4));
        assert!(!lset.contains(-1));
        let d = Clause::from_lits(&[2]);
        lset.load_clause(&d);
        assert!(lset.contains(2));
        assert!(!lset.contains(1));
    }
}
