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

//! Pre-compile CNF reduction, run before the formula is handed to the
//! external knowledge compiler. Alternates two passes until neither makes
//! progress:
//!
//! - classic unit propagation; unit literals over show variables are
//!   remembered and re-emitted in front of the reduced formula,
//! - ordered bounded variable elimination over the non-show variables: a
//!   variable v is resolved away when
//!   `|pos(v)|*|neg(v)| - (|pos(v)|+|neg(v)|) <= d*d - 2*d`, with
//!   resolvents deduplicated by hash and equality. When a resolvent
//!   reintroduces a smaller variable, the sweep pointer retreats to it.
//!
//! A conflict collapses the whole formula to a single empty clause.
//! Deleted clauses are turned into tautologies in place and compacted away
//! at the end of each pass.

use std::io::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::clause::{Clause, ClauseHasher};
use crate::core::literal::var_of;

pub struct CnfOptimizer {
    has_conflict: bool,
    keep_variables: FxHashSet<i32>,
    /// Unit literals over keep variables found during propagation; not
    /// part of `clauses`
    unit_keep_literals: Vec<i32>,
    clauses: Vec<Clause>,
    /// literal -> indices of live clauses containing it
    literal_map: FxHashMap<i32, FxHashSet<usize>>,
    /// clause hash -> indices, for duplicate rejection
    clause_lookup: FxHashMap<u64, Vec<usize>>,
    hasher: ClauseHasher,
}

impl CnfOptimizer {
    pub fn new(keep_variables: FxHashSet<i32>) -> Self {
        Self {
            has_conflict: false,
            keep_variables,
            unit_keep_literals: vec![],
            clauses: vec![],
            literal_map: FxHashMap::default(),
            clause_lookup: FxHashMap::default(),
            hasher: ClauseHasher::new(),
        }
    }

    fn is_keep_literal(&self, lit: i32) -> bool {
        self.keep_variables.contains(&var_of(lit))
    }

    /// Returns true when the clause was added, false for tautologies and
    /// duplicates.
    pub fn add_clause(&mut self, clause: &Clause) -> bool {
        let mut nclause = clause.clone();
        if nclause.tautology() {
            return false;
        }
        let hash = self.hasher.hash_clause(&mut nclause);
        if let Some(bucket) = self.clause_lookup.get(&hash) {
            for &idx in bucket {
                if nclause.is_equal(&self.clauses[idx]) {
                    return false;
                }
            }
        }
        let idx = self.clauses.len();
        for lit in nclause.iter() {
            self.literal_map.entry(lit).or_default().insert(idx);
            self.literal_map.entry(-lit).or_default();
        }
        self.clauses.push(nclause);
        self.clause_lookup.entry(hash).or_default().push(idx);
        true
    }

    fn delete_clause(&mut self, idx: usize) {
        let mut clause = std::mem::take(&mut self.clauses[idx]);
        if clause.tautology() {
            // Already deleted
            self.clauses[idx] = clause;
            return;
        }
        for lit in clause.iter() {
            if let Some(set) = self.literal_map.get_mut(&lit) {
                set.remove(&idx);
            }
        }
        let hash = self.hasher.hash_clause(&mut clause);
        if let Some(bucket) = self.clause_lookup.get_mut(&hash) {
            if let Some(pos) = bucket.iter().position(|&i| i == idx) {
                bucket.swap_remove(pos);
            }
        }
        clause.make_tautology();
        self.clauses[idx] = clause;
    }

    fn cause_conflict(&mut self) {
        self.clauses.clear();
        self.literal_map.clear();
        self.clause_lookup.clear();
        self.unit_keep_literals.clear();
        self.has_conflict = true;
        self.add_clause(&Clause::new());
    }

    pub fn has_conflict(&self) -> bool {
        self.has_conflict
    }

    pub fn optimize(&mut self) {
        let max_variable = self.compact_clauses();
        log::info!("optimizer starting with {} clauses", self.clauses.len());
        let mut propagated = self.unit_propagate();
        let mut eliminated = self.ordered_bve(2, max_variable);
        let mut propagate_count = 1;
        let mut eliminate_count = 1;
        while propagated || eliminated {
            propagated = false;
            if eliminated {
                propagated = self.unit_propagate();
                propagate_count += 1;
            }
            eliminated = false;
            if propagated {
                eliminated = self.ordered_bve(2, max_variable);
                eliminate_count += 1;
            }
        }
        self.compact_clauses();
        log::info!(
            "optimizer ran {} propagation and {} elimination passes; {} unit + {} non-unit clauses remain",
            propagate_count,
            eliminate_count,
            self.unit_keep_literals.len(),
            self.clauses.len()
        );
    }

    fn degree(&self, lit: i32) -> usize {
        self.literal_map.get(&lit).map(FxHashSet::len).unwrap_or(0)
    }

    fn ordered_bve(&mut self, max_degree: usize, max_variable: i32) -> bool {
        if self.has_conflict {
            return false;
        }
        let max_added = (max_degree * max_degree) as i64 - 2 * max_degree as i64;
        let mut elim_var_count = 0;
        let mut evar = 1;
        while evar <= max_variable {
            let mut next_evar = evar + 1;
            if self.is_keep_literal(evar) {
                evar = next_evar;
                continue;
            }
            let pos_degree = self.degree(evar);
            let neg_degree = self.degree(-evar);
            if pos_degree == 0 && neg_degree == 0 {
                evar = next_evar;
                continue;
            }
            let added = (pos_degree * neg_degree) as i64 - (pos_degree + neg_degree) as i64;
            if added <= max_added {
                log::debug!(
                    "BVE eliminating variable {} (pos {}, neg {})",
                    evar,
                    pos_degree,
                    neg_degree
                );
                elim_var_count += 1;
                let pos_ids: Vec<usize> =
                    self.literal_map.get(&evar).into_iter().flatten().copied().collect();
                let neg_ids: Vec<usize> =
                    self.literal_map.get(&-evar).into_iter().flatten().copied().collect();
                for &pidx in pos_ids.iter() {
                    for &nidx in neg_ids.iter() {
                        let resolvent = resolve(evar, &self.clauses[pidx], &self.clauses[nidx]);
                        self.add_clause(&resolvent);
                    }
                }
                // A resolvent may reintroduce an already swept variable
                for &nidx in neg_ids.iter() {
                    for lit in self.clauses[nidx].literals().to_vec() {
                        if lit > 0 && lit < next_evar && !self.is_keep_literal(lit) {
                            next_evar = lit;
                        }
                    }
                }
                for idx in pos_ids.into_iter().chain(neg_ids) {
                    self.delete_clause(idx);
                }
            }
            evar = next_evar;
        }
        log::debug!("BVE eliminated {} variables", elim_var_count);
        elim_var_count > 0
    }

    fn unit_propagate(&mut self) -> bool {
        if self.has_conflict {
            return false;
        }
        let mut unit_literals: Vec<i32> = vec![];
        let mut unit_set: FxHashSet<i32> = FxHashSet::default();
        for idx in 0..self.clauses.len() {
            let clause = &mut self.clauses[idx];
            if !clause.tautology() && clause.len() == 1 {
                let lit = clause[0];
                if unit_set.contains(&-lit) {
                    self.cause_conflict();
                    return false;
                }
                unit_literals.push(lit);
                unit_set.insert(lit);
                self.delete_clause(idx);
            }
        }
        let old_size = unit_literals.len();
        let mut prop_count = 0;
        while prop_count < unit_literals.len() {
            let ulit = unit_literals[prop_count];
            prop_count += 1;
            let mut deletion_list: Vec<usize> =
                self.literal_map.get(&ulit).into_iter().flatten().copied().collect();
            let falsified: Vec<usize> =
                self.literal_map.get(&-ulit).into_iter().flatten().copied().collect();
            for idx in falsified {
                let mut residual = Clause::new();
                for lit in self.clauses[idx].iter() {
                    if lit != -ulit {
                        residual.push(lit);
                    }
                }
                deletion_list.push(idx);
                if residual.len() == 0 {
                    self.cause_conflict();
                    return false;
                } else if residual.len() == 1 {
                    let lit = residual[0];
                    if unit_set.contains(&-lit) {
                        self.cause_conflict();
                        return false;
                    }
                    if unit_set.insert(lit) {
                        unit_literals.push(lit);
                    }
                } else {
                    self.add_clause(&residual);
                }
            }
            for idx in deletion_list {
                self.delete_clause(idx);
            }
        }
        for ulit in unit_literals.iter() {
            if self.is_keep_literal(*ulit) {
                self.unit_keep_literals.push(*ulit);
            }
        }
        unit_literals.len() > old_size
    }

    /// Drop tautologies (including deleted clauses), renumbering the
    /// survivors. Returns the maximum live variable.
    fn compact_clauses(&mut self) -> i32 {
        let mut live = vec![];
        let mut max_variable = 0;
        for mut clause in self.clauses.drain(..) {
            if clause.tautology() {
                continue;
            }
            max_variable = max_variable.max(clause.max_variable());
            live.push(clause);
        }
        self.clauses = live;
        self.literal_map.clear();
        self.clause_lookup.clear();
        for idx in 0..self.clauses.len() {
            let mut clause = self.clauses[idx].clone();
            let hash = self.hasher.hash_clause(&mut clause);
            self.clause_lookup.entry(hash).or_default().push(idx);
            for lit in clause.iter() {
                self.literal_map.entry(lit).or_default().insert(idx);
                self.literal_map.entry(-lit).or_default();
            }
        }
        max_variable
    }

    /// Emit the reduced formula as DIMACS, kept unit literals first.
    pub fn show<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        let mut max_variable = self.compact_clauses();
        for lit in self.unit_keep_literals.iter() {
            max_variable = max_variable.max(var_of(*lit));
        }
        writeln!(
            out,
            "p cnf {} {}",
            max_variable,
            self.unit_keep_literals.len() + self.clauses.len()
        )?;
        for lit in self.unit_keep_literals.iter() {
            writeln!(out, "{} 0", lit)?;
        }
        for clause in self.clauses.iter() {
            writeln!(out, "{}", clause)?;
        }
        Ok(())
    }
}

fn resolve(var: i32, pos_clause: &Clause, neg_clause: &Clause) -> Clause {
    let mut resolvent = Clause::new();
    for lit in pos_clause.iter() {
        if lit != var {
            resolvent.push(lit);
        }
    }
    for lit in neg_clause.iter() {
        if lit != -var {
            resolvent.push(lit);
        }
    }
    resolvent
}

#[cfg(test)]
mod test_optimizer {
    use super::*;

    fn keep(vars: &[i32]) -> FxHashSet<i32> {
        vars.iter().copied().collect()
    }

    fn live_clauses(opt: &mut CnfOptimizer) -> Vec<Vec<i32>> {
        opt.compact_clauses();
        let mut result: Vec<Vec<i32>> = opt
            .clauses
            .iter()
            .map(|c| c.literals().to_vec())
            .collect();
        result.sort();
        result
    }

    #[test]
    fn duplicate_clauses_are_rejected() {
        let mut opt = CnfOptimizer::new(keep(&[1, 2]));
        assert!(opt.add_clause(&Clause::from_lits(&[1, 2])));
        assert!(!opt.add_clause(&Clause::from_lits(&[2, 1])));
        assert!(!opt.add_clause(&Clause::from_lits(&[1, -1])));
    }

    #[test]
    fn unit_propagation_keeps_show_units() {
        let mut opt = CnfOptimizer::new(keep(&[1, 2]));
        opt.add_clause(&Clause::from_lits(&[1]));
        opt.add_clause(&Clause::from_lits(&[-1, 2]));
        opt.add_clause(&Clause::from_lits(&[-2, 3]));
        assert!(opt.unit_propagate());
        assert_eq!(vec![1, 2], {
            let mut units = opt.unit_keep_literals.clone();
            units.sort();
            units
        });
        // 3 is not a keep variable; its unit is propagated but not emitted
        assert_eq!(Vec::<Vec<i32>>::new(), live_clauses(&mut opt));
    }

    #[test]
    fn unit_conflict_collapses_to_empty_clause() {
        let mut opt = CnfOptimizer::new(keep(&[]));
        opt.add_clause(&Clause::from_lits(&[1]));
        opt.add_clause(&Clause::from_lits(&[-1]));
        assert!(!opt.unit_propagate());
        assert!(opt.has_conflict());
        assert_eq!(1, opt.clauses.len());
        assert_eq!(0, opt.clauses[0].len());
    }

    #[test]
    fn bve_resolves_out_cheap_variable() {
        // (1 v 3)(− 3 v 2): eliminating 3 yields (1 v 2)
        let mut opt = CnfOptimizer::new(keep(&[1, 2]));
        opt.add_clause(&Clause::from_lits(&[1, 3]));
        opt.add_clause(&Clause::from_lits(&[-3, 2]));
        assert!(opt.ordered_bve(2, 3));
        assert_eq!(vec![vec![1, 2]], live_clauses(&mut opt));
    }

    #[test]
    fn optimizer_output_prepends_units() {
        let mut opt = CnfOptimizer::new(keep(&[1, 4]));
        opt.add_clause(&Clause::from_lits(&[1]));
        opt.add_clause(&Clause::from_lits(&[4, 2]));
        opt.add_clause(&Clause::from_lits(&[4, -2]));
        opt.optimize();
        let mut buffer = vec![];
        opt.show(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("p cnf "));
        assert!(text.contains("1 0"));
        assert!(text.contains("4 0"));
    }
}
