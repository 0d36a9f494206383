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

//! A reduced CNF is a snapshot of the active clauses, simplified by the
//! current unit literals, with a map from local clause ids back to the
//! originating ids. It is what gets handed to the external SAT solver.
//! Two pipelines exist: `run_hinting_solver` produces an LRAT proof
//! (cadical piped through lrat-trim) whose steps are replayed with
//! remapped hints, and `run_solver` captures a plain DRAT proof whose
//! clauses the caller re-validates by RUP. The subprocess is treated as a
//! pure function from a CNF file to a proof; temporary files are removed
//! unless the run asks to keep them.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use rustc_hash::{FxHashMap, FxHashSet};
use tempfile::{Builder, TempPath};

use crate::core::clause::Clause;
use crate::errors::{CpogError, CpogResult};

const SAT_SOLVER: &str = "cadical";
const LRAT_TRIMMER: &str = "lrat-trim";

#[derive(Default)]
pub struct CnfReduced {
    clauses: Vec<Clause>,
    max_variable: i32,
    /// Local clause id -> originating clause id
    inverse_cid: FxHashMap<usize, usize>,
    /// Local id of an empty clause produced by simplification
    unsatisfiable_id: Option<usize>,
    proof_clauses: Vec<Option<Clause>>,
    proof_hints: Vec<Option<Clause>>,
    emitted_proof_clauses: usize,
    file_names: Vec<PathBuf>,
    temp_paths: Vec<TempPath>,
    pub delete_files: bool,
}

impl CnfReduced {
    pub fn new(delete_files: bool) -> Self {
        Self {
            delete_files,
            ..Self::default()
        }
    }

    /// Add a clause, simplified by the current units. Satisfied clauses
    /// are dropped.
    pub fn add_clause(&mut self, clause: &Clause, unit_literals: &FxHashSet<i32>, cid: usize) {
        let Some(lits) = clause.simplify(unit_literals) else {
            return;
        };
        let reduced = Clause::from_lits(&lits);
        self.max_variable = self.max_variable.max(reduced.max_variable());
        self.clauses.push(reduced);
        let local_cid = self.clauses.len();
        self.inverse_cid.insert(local_cid, cid);
        if lits.is_empty() {
            self.unsatisfiable_id = Some(local_cid);
        }
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    pub fn proof_size(&self) -> usize {
        self.proof_clauses.len()
    }

    pub fn file_name(&self) -> String {
        self.file_names
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn show<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "p cnf {} {}", self.max_variable, self.clause_count())?;
        for clause in self.clauses.iter() {
            writeln!(out, "{}", clause)?;
        }
        Ok(())
    }

    fn make_temp_file(&mut self, suffix: &str) -> CpogResult<PathBuf> {
        let file = Builder::new()
            .prefix("certipog-")
            .suffix(suffix)
            .tempfile()?;
        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        self.file_names.push(path.clone());
        if self.delete_files {
            self.temp_paths.push(temp_path);
        } else {
            temp_path
                .keep()
                .map_err(|e| CpogError::SolverPipeline(format!("cannot keep temp file: {}", e)))?;
        }
        Ok(path)
    }

    fn write_cnf_file(&mut self) -> CpogResult<PathBuf> {
        let path = self.make_temp_file(".cnf")?;
        let mut file = File::create(&path)?;
        self.show(&mut file)?;
        log::debug!(
            "wrote reduced CNF with {} clauses to {}",
            self.clause_count(),
            path.display()
        );
        Ok(path)
    }

    fn record_trivial_conflict(&mut self) {
        let local_cid = self.unsatisfiable_id.unwrap();
        log::debug!(
            "reduced CNF already contains empty clause, local id {}",
            local_cid
        );
        self.proof_clauses.push(Some(Clause::new()));
        self.proof_hints.push(Some(Clause::unit(local_cid as i32)));
    }

    /// Run the SAT solver and keep the DRAT proof clauses it prints. The
    /// caller validates each clause by RUP. Returns false when the solver
    /// yielded no usable refutation.
    pub fn run_solver(&mut self) -> CpogResult<bool> {
        if self.unsatisfiable_id.is_some() {
            self.record_trivial_conflict();
            return Ok(true);
        }
        let cnf_path = self.write_cnf_file()?;
        let output = match Command::new(SAT_SOLVER)
            .args(["--unsat", "-q", "--no-binary"])
            .arg(&cnf_path)
            .arg("-")
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                log::error!("cannot run {}: {}", SAT_SOLVER, e);
                return Ok(false);
            }
        };
        let text = String::from_utf8_lossy(&output.stdout);
        let Some(clauses) = parse_drat(&text) else {
            log::error!("solver reported the reduced formula satisfiable");
            return Ok(false);
        };
        if clauses.is_empty() {
            log::error!("solver produced no proof clauses");
            return Ok(false);
        }
        if clauses.last().map(Clause::len) != Some(0) {
            log::error!("solver proof does not end with the empty clause");
            return Ok(false);
        }
        for clause in clauses {
            let done = clause.len() == 0;
            self.proof_clauses.push(Some(clause));
            if done {
                break;
            }
        }
        log::debug!(
            "{}: {} input clauses -> {} proof clauses",
            self.file_name(),
            self.clause_count(),
            self.proof_clauses.len()
        );
        Ok(true)
    }

    /// Run the SAT solver with LRAT output, trimmed, and load the hinted
    /// proof. Returns false when no valid refutation was produced.
    pub fn run_hinting_solver(&mut self) -> CpogResult<bool> {
        if self.unsatisfiable_id.is_some() {
            self.record_trivial_conflict();
            return Ok(true);
        }
        let cnf_path = self.write_cnf_file()?;
        let lrat_path = self.make_temp_file(".lrat")?;
        let mut solver = match Command::new(SAT_SOLVER)
            .args(["--no-binary", "--unsat", "-q", "--lrat=1"])
            .arg(&cnf_path)
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!("cannot run {}: {}", SAT_SOLVER, e);
                return Ok(false);
            }
        };
        let solver_out = solver
            .stdout
            .take()
            .ok_or_else(|| CpogError::SolverPipeline("no solver stdout".to_string()))?;
        let trim_status = Command::new(LRAT_TRIMMER)
            .args(["--no-binary", "-q", "-"])
            .arg(&lrat_path)
            .stdin(Stdio::from(solver_out))
            .stderr(Stdio::null())
            .status();
        let _ = solver.wait();
        let trim_status = match trim_status {
            Ok(status) => status,
            Err(e) => {
                log::error!("cannot run {}: {}", LRAT_TRIMMER, e);
                return Ok(false);
            }
        };
        if !trim_status.success() {
            log::debug!("{} exited with {}", LRAT_TRIMMER, trim_status);
        }
        let lrat_file = match File::open(&lrat_path) {
            Ok(file) => file,
            Err(e) => {
                log::error!("no LRAT file {} produced: {}", lrat_path.display(), e);
                return Ok(false);
            }
        };
        self.load_hinted_proof(BufReader::new(lrat_file))?;
        if self.proof_clauses.is_empty() {
            log::error!("solver pipeline yielded no proof clauses");
            return Ok(false);
        }
        let last = self.proof_clauses.last().unwrap().as_ref().unwrap();
        if last.len() != 0 {
            log::error!("LRAT proof does not end with the empty clause");
            return Ok(false);
        }
        log::debug!(
            "{}: {} input clauses -> {} hinted proof clauses",
            self.file_name(),
            self.clause_count(),
            self.proof_clauses.len()
        );
        Ok(true)
    }

    /// Read proof clauses + hints in LRAT format, renumbering steps to be
    /// dense after the local clauses. Deletion lines are ignored.
    pub fn load_hinted_proof<R: BufRead>(&mut self, reader: R) -> CpogResult<()> {
        let nclause = self.clause_count();
        let mut lrat2local: FxHashMap<i64, usize> = FxHashMap::default();
        let mut next_id = nclause + 1;

        let mut text = String::new();
        let mut reader = reader;
        reader.read_to_string(&mut text)?;
        let mut tokens = text.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            let sid: i64 = token
                .parse()
                .map_err(|_| CpogError::MalformedLrat(format!("bad step id '{}'", token)))?;
            if tokens.peek() == Some(&"d") {
                tokens.next();
                for token in tokens.by_ref() {
                    if token == "0" {
                        break;
                    }
                }
                continue;
            }
            let lits = read_int_list(&mut tokens, sid)?;
            let hint_values = read_int_list(&mut tokens, sid)?;
            let mut hints = Clause::new();
            for hint in hint_values {
                let mapped = if hint > 0 && hint as usize <= nclause {
                    hint as usize
                } else {
                    *lrat2local.get(&hint).ok_or_else(|| {
                        CpogError::MalformedLrat(format!(
                            "step {} references unknown step {}",
                            sid, hint
                        ))
                    })?
                };
                hints.push(mapped as i32);
            }
            lrat2local.insert(sid, next_id);
            let mut clause = Clause::new();
            for lit in lits {
                clause.push(lit as i32);
            }
            self.proof_clauses.push(Some(clause));
            self.proof_hints.push(Some(hints));
            next_id += 1;
        }
        Ok(())
    }

    /// Hints for the next proof clause, remapped into the enclosing proof:
    /// local ids map through `inverse_cid`, later steps are offset from
    /// `start_id`. Must be called before `get_proof_clause`.
    pub fn get_proof_hint(&mut self, start_id: usize) -> Option<Clause> {
        if self.emitted_proof_clauses >= self.proof_hints.len() {
            return None;
        }
        let hints = self.proof_hints[self.emitted_proof_clauses].take()?;
        let ccount = self.clause_count();
        let mut remapped = Clause::new();
        for i in 0..hints.literals().len() {
            let hint = hints[i] as usize;
            let nhint = if hint <= ccount {
                self.inverse_cid[&hint]
            } else {
                start_id + hint - ccount - 1
            };
            remapped.push(nhint as i32);
        }
        Some(remapped)
    }

    /// Next proof clause, widened by the negations of the context
    /// literals so it holds in the enclosing proof.
    pub fn get_proof_clause(&mut self, context: &[i32]) -> Option<Clause> {
        if self.emitted_proof_clauses >= self.proof_clauses.len() {
            return None;
        }
        let mut clause = self.proof_clauses[self.emitted_proof_clauses].take()?;
        self.emitted_proof_clauses += 1;
        for lit in context {
            clause.push(-lit);
        }
        Some(clause)
    }
}

fn read_int_list<'a, I: Iterator<Item = &'a str>>(
    tokens: &mut I,
    sid: i64,
) -> CpogResult<Vec<i64>> {
    let mut values = vec![];
    loop {
        let token = tokens.next().ok_or_else(|| {
            CpogError::MalformedLrat(format!("step {} ended before terminator", sid))
        })?;
        let value: i64 = token
            .parse()
            .map_err(|_| CpogError::MalformedLrat(format!("step {}: bad token '{}'", sid, token)))?;
        if value == 0 {
            return Ok(values);
        }
        values.push(value);
    }
}

/// Parse the clauses of a DRAT refutation printed by the solver. Returns
/// `None` when the solver reported the formula satisfiable.
fn parse_drat(text: &str) -> Option<Vec<Clause>> {
    let mut clauses = vec![];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') || line.starts_with('d') {
            continue;
        }
        if line.starts_with('s') {
            if line.contains("UNSATISFIABLE") {
                continue;
            }
            return None;
        }
        if line.starts_with('v') {
            return None;
        }
        let mut clause = Clause::new();
        for token in line.split_whitespace() {
            let lit: i32 = match token.parse() {
                Ok(lit) => lit,
                Err(_) => return Some(clauses),
            };
            if lit == 0 {
                break;
            }
            clause.push(lit);
        }
        clauses.push(clause);
    }
    Some(clauses)
}

#[cfg(test)]
mod test_reduced {
    use super::*;

    #[test]
    fn simplification_drops_satisfied_clauses() {
        let mut rcnf = CnfReduced::new(true);
        let mut units = FxHashSet::default();
        units.insert(2);
        rcnf.add_clause(&Clause::from_lits(&[1, 2]), &units, 4);
        rcnf.add_clause(&Clause::from_lits(&[1, -2]), &units, 5);
        assert_eq!(1, rcnf.clause_count());
        assert_eq!(&[1], rcnf.clauses[0].literals());
        assert_eq!(5, rcnf.inverse_cid[&1]);
    }

    #[test]
    fn empty_residual_marks_unsat() {
        let mut rcnf = CnfReduced::new(true);
        let mut units = FxHashSet::default();
        units.insert(-3);
        rcnf.add_clause(&Clause::from_lits(&[3]), &units, 7);
        assert_eq!(Some(1), rcnf.unsatisfiable_id);
        assert!(rcnf.run_solver().unwrap());
        let hint = rcnf.get_proof_hint(100).unwrap();
        let clause = rcnf.get_proof_clause(&[]).unwrap();
        assert_eq!(0, clause.len());
        assert_eq!(&[1], hint.literals());
    }

    #[test]
    fn lrat_steps_are_remapped() {
        let mut rcnf = CnfReduced::new(true);
        let units = FxHashSet::default();
        rcnf.add_clause(&Clause::from_lits(&[1, 2]), &units, 10);
        rcnf.add_clause(&Clause::from_lits(&[-1]), &units, 11);
        rcnf.add_clause(&Clause::from_lits(&[-2]), &units, 12);
        let lrat = "4 2 0 1 2 0\n5 0 4 3 0\n";
        rcnf.load_hinted_proof(std::io::Cursor::new(lrat)).unwrap();
        // start_id 20: local ids 1..3 map through inverse_cid, step 4 -> 20
        let hint1 = rcnf.get_proof_hint(20).unwrap();
        let clause1 = rcnf.get_proof_clause(&[-5]).unwrap();
        assert_eq!(&[10, 11], hint1.literals());
        assert_eq!(&[2, 5], clause1.literals());
        let hint2 = rcnf.get_proof_hint(20).unwrap();
        let clause2 = rcnf.get_proof_clause(&[]).unwrap();
        assert_eq!(&[20, 12], hint2.literals());
        assert_eq!(0, clause2.len());
    }

    #[test]
    fn drat_parser_handles_deletions_and_status() {
        let clauses = parse_drat("d 1 2 0\n1 0\n0\n").unwrap();
        assert_eq!(2, clauses.len());
        assert_eq!(&[1], clauses[0].literals());
        assert_eq!(0, clauses[1].len());
        assert!(parse_drat("s SATISFIABLE\n").is_none());
    }
}
