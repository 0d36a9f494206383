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

use thiserror::Error;

/// Errors that abort proof generation. Structural proof failures are not
/// represented here: they are soft results absorbed by the monolithic
/// fallback inside the justification engine.
#[derive(Debug, Error)]
pub enum CpogError {
    #[error("invalid CNF input: {0}")]
    MalformedCnf(String),
    #[error("invalid d-DNNF input at line {line}: {reason}")]
    MalformedNnf { line: usize, reason: String },
    #[error("invalid LRAT proof: {0}")]
    MalformedLrat(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
    #[error("clause #{0} requested, but only {1} input and {2} proof clauses exist")]
    UnknownClause(usize, usize, usize),
    #[error("adding clause #{0} exceeds the clause limit")]
    ClauseLimit(usize),
    #[error("Skolem node {xvar}: variable {var} occurs in both phases")]
    SkolemConflict { xvar: i32, var: i32 },
    #[error("SAT solver pipeline failed: {0}")]
    SolverPipeline(String),
    #[error("monolithic proof failed at node {0}")]
    MonolithicProof(i32),
    #[error("RUP validation of our own clause failed: {0}")]
    RupFailure(String),
    #[error("root of the d-DNNF could not be determined")]
    NoRoot,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CpogResult<T> = Result<T, CpogError>;
