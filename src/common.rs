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

/// How hard a single literal validation is allowed to try.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    /// BCP first, then the external solver pipeline
    Full,
    /// Unit propagation only
    Bcp,
    /// Unit propagation with a bounded budget
    BoundedBcp,
    /// Skip propagation, go straight to the solver
    Sat,
}

/// Options consumed by the reasoner and the justification engine. The
/// defaults mirror the flags of the `generate` subcommand.
#[derive(Debug, Clone)]
pub struct ProofOptions {
    /// Materialize the reverse clauses of Skolem nodes instead of leaving them virtual
    pub use_explicit_deletion: bool,
    /// Emit OR nodes as weak sums and skip the mutex justification
    pub weak_sum: bool,
    /// Justify the literal children of a product node with a single shared proof
    pub multi_literal: bool,
    /// Cache lemmas on shared OR nodes
    pub use_lemmas: bool,
    /// Remove the temporary files handed to the solver pipeline
    pub delete_files: bool,
    /// Use the LRAT pipeline once a reduced CNF has at least this many clauses
    pub drat_threshold: usize,
    /// Hard bound on proof clause ids
    pub clause_limit: usize,
    /// Propagation budget in bounded BCP mode
    pub bcp_limit: usize,
    /// Subtrees up to this size go monolithic; negative disables the bound
    pub monolithic_threshold: i64,
    /// Monolithic proofs require tree_size / dag_size at or below this ratio
    pub tree_ratio_threshold: f64,
    /// Delete input clauses by RUP instead of the structural labelling
    pub rup_deletion: bool,
}

impl Default for ProofOptions {
    fn default() -> Self {
        Self {
            use_explicit_deletion: false,
            weak_sum: false,
            multi_literal: true,
            use_lemmas: true,
            delete_files: true,
            drat_threshold: 1000,
            clause_limit: usize::MAX,
            bcp_limit: 1,
            monolithic_threshold: 1_000_000,
            tree_ratio_threshold: 5.0,
            rup_deletion: false,
        }
    }
}
