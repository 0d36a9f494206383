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

//! The input formula and the reasoning machinery layered on top of it.

pub mod optimize;
pub mod reasoner;
pub mod reduced;

use std::io::Write;

use rustc_hash::FxHashSet;

use crate::core::clause::Clause;
use crate::errors::{CpogError, CpogResult};

/// The input CNF: clauses 1..=n in source order, the declared maximum
/// variable, and for projected instances the set of data (show) variables.
pub struct Cnf {
    clauses: Vec<Clause>,
    max_input_var: i32,
    data_variables: Option<FxHashSet<i32>>,
    projected: bool,
}

impl Cnf {
    pub fn new(
        clauses: Vec<Clause>,
        max_input_var: i32,
        data_variables: Option<FxHashSet<i32>>,
        projected: bool,
    ) -> Self {
        Self {
            clauses,
            max_input_var,
            data_variables,
            projected,
        }
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    pub fn max_variable(&self) -> i32 {
        self.max_input_var
    }

    pub fn data_variables(&self) -> Option<&FxHashSet<i32>> {
        self.data_variables.as_ref()
    }

    pub fn is_projected(&self) -> bool {
        self.projected
    }

    /// Input clause by id, 1-based.
    pub fn get_input_clause(&self, cid: usize) -> CpogResult<&Clause> {
        self.clauses
            .get(cid.wrapping_sub(1))
            .ok_or(CpogError::UnknownClause(cid, self.clauses.len(), 0))
    }

    pub(crate) fn get_input_clause_mut(&mut self, cid: usize) -> CpogResult<&mut Clause> {
        let count = self.clauses.len();
        self.clauses
            .get_mut(cid.wrapping_sub(1))
            .ok_or(CpogError::UnknownClause(cid, count, 0))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// First clause not satisfied by a total assignment (index var-1,
    /// value 0/1), or `None` when the formula is satisfied.
    pub fn first_falsified(&self, assignment: &[i8]) -> Option<usize> {
        (1..=self.clauses.len()).find(|&cid| !self.clauses[cid - 1].satisfied(assignment))
    }

    pub fn show<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "p cnf {} {}", self.max_input_var, self.clause_count())?;
        for clause in self.clauses.iter() {
            writeln!(out, "{}", clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_cnf {
    use super::*;

    fn simple_cnf() -> Cnf {
        let clauses = vec![
            Clause::from_lits(&[1, 2]),
            Clause::from_lits(&[-1, 3]),
        ];
        Cnf::new(clauses, 3, None, false)
    }

    #[test]
    fn clause_access_is_one_based() {
        let cnf = simple_cnf();
        assert_eq!(&[1, 2], cnf.get_input_clause(1).unwrap().literals());
        assert!(cnf.get_input_clause(0).is_err());
        assert!(cnf.get_input_clause(3).is_err());
    }

    #[test]
    fn detects_falsified_clause() {
        let cnf = simple_cnf();
        assert_eq!(None, cnf.first_falsified(&[1, 0, 1]));
        assert_eq!(Some(2), cnf.first_falsified(&[1, 0, 0]));
        assert_eq!(Some(1), cnf.first_falsified(&[0, 0, 1]));
    }
}
