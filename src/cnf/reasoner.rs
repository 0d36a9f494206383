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

//! Reasoning over the clause set and emission of the proof stream.
//!
//! The reasoner owns the input clauses, the proof clauses appended as the
//! proof is emitted, and the sparse auxiliary clauses that serve as lemma
//! arguments. Reasoning happens under a LIFO stack of context frames;
//! each frame records the literals asserted or derived in it, the
//! literals whose unit status was cleared on entry, and the clauses it
//! deactivated, so `pop_context` restores the exact prior state. Unit
//! propagation runs over the active clause set with two watched literals;
//! RUP validation temporarily negates a target clause, propagates to a
//! conflict and walks the justifying-id graph backwards to collect hints.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cnf::reduced::CnfReduced;
use crate::cnf::Cnf;
use crate::common::{ProofOptions, ValidationMode};
use crate::core::clause::{Clause, ClauseHasher};
use crate::core::literal::{var_of, CONFLICT_LIT};
use crate::core::watcher::Watcher;
use crate::errors::{CpogError, CpogResult};
use crate::statistics::Statistics;
use crate::writer::CpogWriter;

/// Marker delimiting frames on the three context stacks.
const CONTEXT_MARKER: i32 = 0;
const CLAUSE_MARKER: usize = 0;

/// Everything needed to define, prove, or apply a lemma at a shared node:
/// the reduced argument clauses (active id -> originating id, in id
/// order), original ids merged away as duplicates, the splitting literal,
/// and once proved the id of the clause justifying the lemma.
#[derive(Debug, Clone)]
pub struct LemmaInstance {
    pub splitting_literal: i32,
    /// Lemma argument clause id -> clause it stands for
    pub inverse_cid: std::collections::BTreeMap<usize, usize>,
    /// Original clauses that duplicate other arguments
    pub duplicate_cid: FxHashSet<usize>,
    pub xvar: i32,
    pub signature: u64,
    pub jid: usize,
}

impl LemmaInstance {
    fn new(xvar: i32, splitting_literal: i32) -> Self {
        Self {
            splitting_literal,
            inverse_cid: std::collections::BTreeMap::new(),
            duplicate_cid: FxHashSet::default(),
            xvar,
            signature: 0,
            jid: 0,
        }
    }

    /// Hash the splitting literal and the sorted argument ids into the
    /// signature used for cache lookup.
    fn sign(&mut self, hasher: &mut ClauseHasher) {
        let mut sig = 1;
        sig = hasher.next_hash(sig, self.splitting_literal);
        for &ncid in self.inverse_cid.keys() {
            sig = hasher.next_hash(sig, ncid as i32);
        }
        self.signature = sig;
        self.jid = 0;
    }
}

pub struct CnfReasoner {
    cnf: Cnf,
    pub options: ProofOptions,
    pub stats: Statistics,
    writer: CpogWriter,
    xvar_count: i32,
    proof_clauses: Vec<Clause>,
    /// Sparse shadow of proof ids whose clause acts as a lemma argument
    aux_clauses: FxHashMap<usize, Clause>,
    /// Clause hash -> aux ids, for sharing
    aux_clause_lookup: FxHashMap<u64, Vec<usize>>,
    hasher: ClauseHasher,
    unsatisfiable: bool,
    context_literal_stack: Vec<i32>,
    context_cleared_literal_stack: Vec<i32>,
    context_clause_stack: Vec<usize>,
    justifying_ids: FxHashMap<i32, usize>,
    unit_literals: FxHashSet<i32>,
    assigned_literals: Vec<i32>,
    curr_active_clauses: BTreeSet<usize>,
    next_active_clauses: BTreeSet<usize>,
}

impl CnfReasoner {
    pub fn new(cnf: Cnf, writer: CpogWriter, options: ProofOptions) -> Self {
        let xvar_count = cnf.max_variable();
        let mut stats = Statistics::default();
        stats.input_clauses = cnf.clause_count();
        stats.input_variables = cnf.max_variable() as usize;
        stats.data_variables = cnf.data_variables().map(FxHashSet::len).unwrap_or(0);
        Self {
            cnf,
            options,
            stats,
            writer,
            xvar_count,
            proof_clauses: vec![],
            aux_clauses: FxHashMap::default(),
            aux_clause_lookup: FxHashMap::default(),
            hasher: ClauseHasher::new(),
            unsatisfiable: false,
            context_literal_stack: vec![],
            context_cleared_literal_stack: vec![],
            context_clause_stack: vec![],
            justifying_ids: FxHashMap::default(),
            unit_literals: FxHashSet::default(),
            assigned_literals: vec![],
            curr_active_clauses: BTreeSet::new(),
            next_active_clauses: BTreeSet::new(),
        }
    }

    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    pub fn writer(&mut self) -> &mut CpogWriter {
        &mut self.writer
    }

    pub fn clause_count(&self) -> usize {
        self.cnf.clause_count()
    }

    pub fn max_variable(&self) -> i32 {
        self.cnf.max_variable()
    }

    pub fn proof_size(&self) -> usize {
        self.proof_clauses.len()
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }

    pub fn unit_literals(&self) -> &FxHashSet<i32> {
        &self.unit_literals
    }

    pub fn assigned_literals(&self) -> &[i32] {
        &self.assigned_literals
    }

    pub fn justifying_id(&self, lit: i32) -> Option<usize> {
        self.justifying_ids.get(&lit).copied()
    }

    pub fn reset_xvar(&mut self) {
        self.xvar_count = self.cnf.max_variable();
    }

    pub fn new_xvar(&mut self) -> i32 {
        self.xvar_count += 1;
        self.xvar_count
    }

    pub fn xvar_count(&self) -> i32 {
        self.xvar_count
    }

    /// Input, proof, or auxiliary clause by id. Aux clauses shadow the
    /// proof clause holding the same id.
    pub fn get_clause(&self, cid: usize) -> CpogResult<&Clause> {
        let input_count = self.cnf.clause_count();
        let proof_count = self.proof_clauses.len();
        if cid >= 1 && cid <= input_count {
            self.cnf.get_input_clause(cid)
        } else if let Some(clause) = self.aux_clauses.get(&cid) {
            Ok(clause)
        } else if cid > input_count && cid <= input_count + proof_count {
            Ok(&self.proof_clauses[cid - input_count - 1])
        } else {
            Err(CpogError::UnknownClause(cid, input_count, proof_count))
        }
    }

    fn get_clause_mut(&mut self, cid: usize) -> CpogResult<&mut Clause> {
        let input_count = self.cnf.clause_count();
        let proof_count = self.proof_clauses.len();
        if cid >= 1 && cid <= input_count {
            self.cnf.get_input_clause_mut(cid)
        } else if self.aux_clauses.contains_key(&cid) {
            Ok(self.aux_clauses.get_mut(&cid).unwrap())
        } else if cid > input_count && cid <= input_count + proof_count {
            Ok(&mut self.proof_clauses[cid - input_count - 1])
        } else {
            Err(CpogError::UnknownClause(cid, input_count, proof_count))
        }
    }

    // --- ACTIVE CLAUSE SET --- //

    pub fn activate_clause(&mut self, cid: usize) {
        self.curr_active_clauses.insert(cid);
    }

    pub fn deactivate_clause(&mut self, cid: usize) {
        self.curr_active_clauses.remove(&cid);
    }

    pub fn deactivate_all_clauses(&mut self) {
        self.curr_active_clauses.clear();
    }

    pub fn active_clauses(&self) -> &BTreeSet<usize> {
        &self.curr_active_clauses
    }

    pub fn extract_active_clauses(&self) -> BTreeSet<usize> {
        self.curr_active_clauses.clone()
    }

    pub fn set_active_clauses(&mut self, new_set: &BTreeSet<usize>) {
        self.curr_active_clauses = new_set.clone();
    }

    // --- PROOF EMISSION --- //

    fn add_proof_clause(&mut self, clause: Clause) -> CpogResult<usize> {
        let pcid = self.clause_count() + self.proof_clauses.len();
        if pcid >= self.options.clause_limit {
            return Err(CpogError::ClauseLimit(pcid + 1));
        }
        let cid = pcid + 1;
        if clause.literals().is_empty() {
            self.unsatisfiable = true;
        } else if clause.len() == 1 {
            let lit = clause[0];
            self.unit_literals.insert(lit);
            self.justifying_ids.insert(lit, cid);
        }
        self.proof_clauses.push(clause);
        Ok(cid)
    }

    /// Open an `a`/`as` line for the clause. Hints follow via `add_hint`;
    /// `finish_command(true)` closes the line.
    pub fn start_assertion(&mut self, clause: Clause, structural: bool) -> CpogResult<usize> {
        let cid = self.add_proof_clause(clause)?;
        if structural {
            self.writer.start_structural_assertion(cid)?;
        } else {
            self.writer.start_assertion(cid)?;
        }
        let clause = &self.proof_clauses[cid - self.cnf.clause_count() - 1];
        self.writer.write_clause(clause)?;
        Ok(cid)
    }

    pub fn add_hint(&mut self, hid: usize) -> CpogResult<()> {
        self.writer.add_int(hid as i64)?;
        Ok(())
    }

    pub fn add_hints(&mut self, hints: &Clause) -> CpogResult<()> {
        for i in 0..hints.literals().len() {
            self.add_hint(hints.literals()[i] as usize)?;
        }
        Ok(())
    }

    pub fn finish_command(&mut self, add_zero: bool) -> CpogResult<()> {
        if add_zero {
            self.writer.finish_line("0")?;
        } else {
            self.writer.finish_line("")?;
        }
        Ok(())
    }

    pub fn comment(&mut self, text: &str) -> CpogResult<()> {
        self.writer.comment(text)?;
        Ok(())
    }

    /// Declare a product node: defining clauses first, then the `p` line.
    /// Returns the id of the first defining clause.
    pub fn start_and(&mut self, var: i32, args: &[i32]) -> CpogResult<usize> {
        self.comment(&format!("Operation P{}", var))?;
        let mut clause = Clause::unit(var);
        for &arg in args {
            clause.push(-arg);
        }
        let cid = self.add_proof_clause(clause)?;
        for &arg in args {
            let mut aclause = Clause::unit(-var);
            aclause.push(arg);
            self.add_proof_clause(aclause)?;
        }
        self.writer.start_and(cid, var)?;
        self.writer.write_list(args)?;
        self.stats.defining_clauses += args.len() + 1;
        Ok(cid)
    }

    /// Declare a sum node. Mutex hints may follow before the line is
    /// finished with a trailing 0.
    pub fn start_or(&mut self, var: i32, args: &[i32]) -> CpogResult<usize> {
        let weak = self.options.weak_sum;
        self.comment(&format!("Operation {}{}", if weak { "WS" } else { "S" }, var))?;
        let (arg1, arg2) = (args[0], args[1]);
        let mut clause = Clause::unit(-var);
        clause.push(arg1);
        clause.push(arg2);
        let cid = self.add_proof_clause(clause)?;
        let mut aclause1 = Clause::unit(var);
        aclause1.push(-arg1);
        self.add_proof_clause(aclause1)?;
        let mut aclause2 = Clause::unit(var);
        aclause2.push(-arg2);
        self.add_proof_clause(aclause2)?;
        self.writer.start_or(cid, var, weak)?;
        self.writer.add_int(arg1 as i64)?;
        self.writer.add_int(arg2 as i64)?;
        self.stats.defining_clauses += args.len() + 1;
        Ok(cid)
    }

    /// Declare a Skolem node: one unit defining clause plus the reverse
    /// clauses. The reverse clauses always occupy their ids in the
    /// defining block; with explicit deletion off they are virtual
    /// (implied by the declaration, never printed separately).
    pub fn start_skolem(&mut self, var: i32, args: &[i32]) -> CpogResult<usize> {
        self.comment(&format!("Operation T{}", var))?;
        let cid = self.add_proof_clause(Clause::unit(var))?;
        self.stats.defining_clauses += 1;
        for &arg in args {
            let mut aclause = Clause::unit(-var);
            aclause.push(arg);
            self.add_proof_clause(aclause)?;
        }
        if self.options.use_explicit_deletion {
            self.stats.defining_clauses += args.len();
        } else {
            self.stats.virtual_clauses += args.len();
        }
        self.writer.start_skolem(cid, var)?;
        self.writer.write_list(args)?;
        Ok(cid)
    }

    // --- DOCUMENTATION COMMENTS (debug logging only) --- //

    pub fn document_input(&mut self, cid: usize) -> CpogResult<()> {
        if !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        let clause = self.get_clause(cid)?;
        let text = format!("{} {}", cid, clause);
        self.comment(&text)
    }

    pub fn document_and(&mut self, cid: usize, var: i32, args: &[i32]) -> CpogResult<()> {
        if !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        self.comment("Implicit declarations")?;
        let body: Vec<String> = args.iter().map(|a| (-a).to_string()).collect();
        self.comment(&format!("{} {} {}", cid, var, body.join(" ")))?;
        for (i, &arg) in args.iter().enumerate() {
            self.comment(&format!("{} {} {}", cid + i + 1, -var, arg))?;
        }
        Ok(())
    }

    pub fn document_or(&mut self, cid: usize, var: i32, args: &[i32]) -> CpogResult<()> {
        if !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        self.comment("Implicit declarations")?;
        let body: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.comment(&format!("{} {} {}", cid, -var, body.join(" ")))?;
        for (i, &arg) in args.iter().enumerate() {
            self.comment(&format!("{} {} {}", cid + i + 1, var, -arg))?;
        }
        Ok(())
    }

    pub fn document_skolem(&mut self, cid: usize, var: i32, args: &[i32]) -> CpogResult<()> {
        if !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        self.comment("Implicit declarations")?;
        self.comment(&format!("{} {}", cid, var))?;
        if self.options.use_explicit_deletion {
            for (i, &arg) in args.iter().enumerate() {
                self.comment(&format!("{} {} {}", cid + i + 1, -var, arg))?;
            }
        }
        Ok(())
    }

    // --- CONTEXT STACK --- //

    pub fn new_context(&mut self) {
        self.context_literal_stack.push(CONTEXT_MARKER);
        self.context_cleared_literal_stack.push(CONTEXT_MARKER);
        self.context_clause_stack.push(CLAUSE_MARKER);
    }

    pub fn push_assigned_literal(&mut self, lit: i32) {
        if self.unit_literals.contains(&lit) {
            log::error!("asserting literal {}, but it is already unit", lit);
        }
        if self.unit_literals.contains(&-lit) {
            log::error!("asserting literal {}, but {} is already unit", lit, -lit);
        }
        log::trace!("asserting literal {}", lit);
        self.unit_literals.insert(lit);
        self.assigned_literals.push(lit);
        self.context_literal_stack.push(lit);
    }

    pub fn push_derived_literal(&mut self, lit: i32, cid: usize) {
        if self.unit_literals.contains(&-lit) {
            log::error!("deriving literal {}, but {} is already unit", lit, -lit);
        }
        if self.unit_literals.contains(&lit) {
            log::error!("deriving literal {}, but it is already unit", lit);
        }
        self.unit_literals.insert(lit);
        self.justifying_ids.insert(lit, cid);
        self.context_literal_stack.push(lit);
    }

    /// Record a clause deactivation so the pop can re-activate it. Only
    /// input and aux clauses come back by default.
    pub fn push_clause(&mut self, cid: usize, force: bool) {
        if force || cid <= self.clause_count() || self.aux_clauses.contains_key(&cid) {
            self.context_clause_stack.push(cid);
        }
    }

    /// Move every assigned literal of the current frame to the cleared
    /// stack; the pop re-asserts them in their original order.
    pub fn clear_assigned_literals(&mut self) {
        while let Some(alit) = self.assigned_literals.pop() {
            self.unit_literals.remove(&alit);
            self.context_cleared_literal_stack.push(alit);
            log::trace!("cleared assigned literal {}", alit);
        }
    }

    pub fn pop_context(&mut self) {
        log::trace!("popping context");
        loop {
            let lit = self
                .context_literal_stack
                .pop()
                .expect("popped beyond base of context literal stack");
            if lit == CONTEXT_MARKER {
                break;
            }
            self.unit_literals.remove(&lit);
            if self.justifying_ids.remove(&lit).is_none() {
                self.assigned_literals.pop();
            }
        }
        loop {
            let lit = self
                .context_cleared_literal_stack
                .pop()
                .expect("popped beyond base of cleared literal stack");
            if lit == CONTEXT_MARKER {
                break;
            }
            self.unit_literals.insert(lit);
            self.assigned_literals.push(lit);
        }
        loop {
            let cid = self
                .context_clause_stack
                .pop()
                .expect("popped beyond base of context clause stack");
            if cid == CLAUSE_MARKER {
                break;
            }
            self.activate_clause(cid);
        }
    }

    // --- POG GENERATION SETUP --- //

    /// Scan the input clauses: register units, activate the rest, run one
    /// round of BCP. A conflict here makes the whole formula
    /// unsatisfiable and the empty clause lands in the proof.
    pub fn enable_pog(&mut self) -> CpogResult<()> {
        for cid in 1..=self.clause_count() {
            let clause = self.cnf.get_input_clause_mut(cid)?;
            if clause.tautology() {
                continue;
            }
            if clause.len() == 1 {
                let lit = clause[0];
                self.new_unit(lit, cid, true)?;
            } else {
                self.activate_clause(cid);
            }
        }
        if let Some(ncid) = self.bcp(false)? {
            self.comment(&format!("Formula unsatisfiable (empty clause ID = {})", ncid))?;
        }
        Ok(())
    }

    // --- UNIT HANDLING --- //

    /// A clause became unit under the current context. Input units are
    /// registered directly; derived units get an asserted justification
    /// unless the clause mentions no justified literal, in which case the
    /// clause itself already works as a hint.
    fn new_unit(&mut self, lit: i32, cid: usize, input: bool) -> CpogResult<()> {
        if input {
            if self.unit_literals.contains(&-lit) {
                self.found_conflict(cid)?;
                return Ok(());
            }
            self.unit_literals.insert(lit);
            self.justifying_ids.insert(lit, cid);
            log::trace!("unit literal {} justified by input clause #{}", lit, cid);
            return Ok(());
        }
        let clits = self.get_clause(cid)?.literals().to_vec();
        let need_new = clits
            .iter()
            .any(|clit| self.justifying_ids.contains_key(&-clit));
        if !need_new {
            self.push_derived_literal(lit, cid);
            log::trace!("unit literal {} already justified by clause #{}", lit, cid);
            return Ok(());
        }
        let mut clause = Clause::unit(lit);
        for alit in self.assigned_literals.clone() {
            clause.push(-alit);
        }
        let single = clause.literals().len() == 1;
        let ncid = self.start_assertion(clause, false)?;
        if !single {
            self.push_derived_literal(lit, ncid);
        }
        for clit in clits {
            if let Some(&jid) = self.justifying_ids.get(&-clit) {
                self.add_hint(jid)?;
            }
        }
        self.add_hint(cid)?;
        self.finish_command(true)?;
        self.stats.literal_justifications += 1;
        log::trace!("unit literal {} justified by proof clause #{}", lit, ncid);
        Ok(())
    }

    /// Validate a unit that needs exactly two hints.
    fn quick_validate_literal(&mut self, lit: i32, cid1: usize, cid2: usize) -> CpogResult<usize> {
        let mut clause = Clause::unit(lit);
        for alit in self.assigned_literals.clone() {
            clause.push(-alit);
        }
        let single = clause.literals().len() == 1;
        let ncid = self.start_assertion(clause, false)?;
        if !single {
            self.push_derived_literal(lit, ncid);
        }
        self.add_hint(cid1)?;
        self.add_hint(cid2)?;
        self.finish_command(true)?;
        self.stats.literal_justifications += 1;
        Ok(ncid)
    }

    /// Propagation falsified clause `cid`. Emit the conflict clause over
    /// the negated assigned literals; when no literal of the clause has a
    /// justifying id the clause itself is already the conflict.
    fn found_conflict(&mut self, cid: usize) -> CpogResult<usize> {
        let clits = self.get_clause(cid)?.literals().to_vec();
        let mut ncid = 0;
        let mut started = false;
        for clit in clits {
            if let Some(&jid) = self.justifying_ids.get(&-clit) {
                if !started {
                    started = true;
                    let mut clause = Clause::new();
                    for alit in self.assigned_literals.clone() {
                        clause.push(-alit);
                    }
                    ncid = self.start_assertion(clause, false)?;
                }
                self.add_hint(jid)?;
            }
        }
        if !started {
            return Ok(cid);
        }
        self.add_hint(cid)?;
        self.finish_command(true)?;
        self.stats.literal_justifications += 1;
        log::trace!("conflict on clause #{} generated assertion #{}", cid, ncid);
        Ok(ncid)
    }

    // --- BCP --- //

    /// Examine one clause under the current units.
    /// Returns 0 (satisfied, or watches installed), the unit literal, or
    /// [`CONFLICT_LIT`]. On the first pass all unassigned literals move to
    /// the front and both watch pointers are installed; later passes stop
    /// at two unassigned literals.
    fn bcp_unit_propagate(
        &mut self,
        cid: usize,
        first_pass: bool,
        watches: &mut Watcher,
    ) -> CpogResult<i32> {
        let input_count = self.cnf.clause_count();
        let proof_count = self.proof_clauses.len();
        let Self {
            cnf,
            proof_clauses,
            aux_clauses,
            unit_literals,
            ..
        } = self;
        let clause: &mut Clause = if cid >= 1 && cid <= input_count {
            cnf.get_input_clause_mut(cid)?
        } else if let Some(clause) = aux_clauses.get_mut(&cid) {
            clause
        } else if cid > input_count && cid <= input_count + proof_count {
            &mut proof_clauses[cid - input_count - 1]
        } else {
            return Err(CpogError::UnknownClause(cid, input_count, proof_count));
        };
        Ok(unit_propagate_step(clause, unit_literals, watches, cid, first_pass))
    }

    /// Neither satisfied nor falsified under the current units.
    fn is_active(&self, cid: usize) -> CpogResult<bool> {
        let clause = self.get_clause(cid)?;
        let mut unassigned_count = 0;
        for lit in clause.iter() {
            if self.unit_literals.contains(&lit) {
                return Ok(false);
            }
            if !self.unit_literals.contains(&-lit) {
                unassigned_count += 1;
            }
        }
        Ok(unassigned_count > 0)
    }

    /// Boolean constraint propagation over the active clauses. Returns
    /// the id of a generated conflict clause. Satisfied and falsified
    /// clauses leave the active set (recorded for the context pop).
    pub fn bcp(&mut self, bounded: bool) -> CpogResult<Option<usize>> {
        let mut conflict = false;
        let mut ncid = None;
        let mut pcount = 0;
        let mut watches = Watcher::new();

        let active: Vec<usize> = self.curr_active_clauses.iter().copied().collect();
        for cid in active {
            let ulit = self.bcp_unit_propagate(cid, true, &mut watches)?;
            if ulit == CONFLICT_LIT {
                conflict = true;
                ncid = Some(self.found_conflict(cid)?);
                break;
            } else if ulit != 0 {
                self.new_unit(ulit, cid, false)?;
                watches.add_unit(ulit, cid);
            }
        }

        while !conflict {
            let plit = watches.get_unit();
            if plit == 0 {
                break;
            }
            if bounded
                && pcount >= self.options.bcp_limit
                && self.curr_active_clauses.len() >= self.options.drat_threshold
            {
                break;
            }
            pcount += 1;
            let wlist: Vec<usize> = watches.list(plit).to_vec();
            for cid in wlist {
                let ulit = self.bcp_unit_propagate(cid, false, &mut watches)?;
                if ulit == CONFLICT_LIT {
                    conflict = true;
                    ncid = Some(self.found_conflict(cid)?);
                    break;
                } else if ulit != 0 {
                    self.new_unit(ulit, cid, false)?;
                    watches.add_unit(ulit, cid);
                }
            }
        }

        let active: Vec<usize> = self.curr_active_clauses.iter().copied().collect();
        for cid in active {
            if self.is_active(cid)? {
                self.next_active_clauses.insert(cid);
            } else {
                self.push_clause(cid, false);
            }
        }
        std::mem::swap(&mut self.curr_active_clauses, &mut self.next_active_clauses);
        self.next_active_clauses.clear();
        Ok(ncid)
    }

    // --- RUP --- //

    /// Install watch pointers over the active clauses and propagate the
    /// known units. Returns true on conflict.
    pub fn watches_setup(&mut self, watches: &mut Watcher) -> CpogResult<bool> {
        let mut conflict = false;
        let mut units: Vec<i32> = self.unit_literals.iter().copied().collect();
        units.sort_by_key(|l| l.abs());
        for ulit in units {
            let cid = self.justifying_ids.get(&ulit).copied().unwrap_or(0);
            watches.add_unit(ulit, cid);
        }
        let active: Vec<usize> = self.curr_active_clauses.iter().copied().collect();
        for cid in active {
            let ulit = self.bcp_unit_propagate(cid, true, watches)?;
            if ulit == CONFLICT_LIT {
                conflict = true;
                break;
            } else if ulit != 0 {
                self.push_derived_literal(ulit, cid);
                watches.add_unit(ulit, cid);
            }
        }
        while !conflict {
            let plit = watches.get_unit();
            if plit == 0 {
                break;
            }
            let wlist: Vec<usize> = watches.list(plit).to_vec();
            for cid in wlist {
                let ulit = self.bcp_unit_propagate(cid, false, watches)?;
                if ulit == CONFLICT_LIT {
                    conflict = true;
                    break;
                } else if ulit != 0 {
                    self.push_derived_literal(ulit, cid);
                    watches.add_unit(ulit, cid);
                }
            }
        }
        Ok(conflict)
    }

    /// Validate a clause by reverse unit propagation: negate its
    /// literals, propagate to a conflict, then walk the trail backwards
    /// from the conflict clause collecting the used justifications.
    /// Hints come back in forward order. With `add` the clause is
    /// asserted (returning its id) and activated; without, only `hints`
    /// is filled and `Some(0)` signals success. `None` means no conflict
    /// was reached.
    pub fn rup_validate(
        &mut self,
        target: &Clause,
        add: bool,
        watches: &mut Watcher,
        hints: &mut Vec<usize>,
    ) -> CpogResult<Option<usize>> {
        self.new_context();
        watches.checkpoint();

        for idx in 0..target.len() {
            let tlit = target[idx];
            if !self.unit_literals.contains(&-tlit) {
                self.push_assigned_literal(-tlit);
                watches.add_unit(-tlit, 0);
            }
        }

        let mut ncid = None;
        let mut conflict = false;
        let mut conflict_cid = 0;
        while !conflict {
            let plit = watches.get_unit();
            if plit == 0 {
                break;
            }
            let wlist: Vec<usize> = watches.list(plit).to_vec();
            for cid in wlist {
                let ulit = self.bcp_unit_propagate(cid, false, watches)?;
                if ulit == CONFLICT_LIT {
                    conflict = true;
                    // The conflict clause rides at the end of the trail so
                    // the hint walk picks it up
                    watches.add_unit(CONFLICT_LIT, cid);
                    conflict_cid = cid;
                    break;
                } else if ulit != 0 {
                    self.push_derived_literal(ulit, cid);
                    watches.add_unit(ulit, cid);
                }
            }
        }

        if conflict {
            hints.clear();
            let mut used: FxHashSet<usize> = FxHashSet::default();
            used.insert(conflict_cid);
            let trail = watches.trail().to_vec();
            for entry in trail.iter().rev() {
                let hid = entry.cid;
                if hid == 0 {
                    continue;
                }
                if used.contains(&hid) {
                    hints.push(hid);
                    let clits = self.get_clause(hid)?.literals().to_vec();
                    for lit in clits {
                        if let Some(&jid) = self.justifying_ids.get(&-lit) {
                            used.insert(jid);
                        }
                    }
                }
            }
            if hints.is_empty() {
                log::error!("couldn't generate hints for RUP validation");
            }
            hints.reverse();
            if add {
                let cid = self.start_assertion(target.clone(), false)?;
                for idx in 0..hints.len() {
                    self.add_hint(hints[idx])?;
                }
                self.finish_command(true)?;
                self.stats.literal_justifications += 1;
                self.activate_clause(cid);
                ncid = Some(cid);
            } else {
                ncid = Some(0);
            }
        } else {
            log::error!(
                "RUP validation failed for target clause {} (unit literals: {:?})",
                target,
                {
                    let mut units: Vec<i32> = self.unit_literals.iter().copied().collect();
                    units.sort_by_key(|l| l.abs());
                    units
                }
            );
        }

        // Undo assignments; literal positions within touched clauses must
        // be restored by hand
        let pairs = watches.restore();
        for (cid, pair) in pairs {
            self.get_clause_mut(cid)?.rearrange(pair.lit1, pair.lit2);
        }
        self.pop_context();

        // The added clause takes part in further propagation
        if let Some(cid) = ncid {
            if add && cid != 0 {
                let ulit = self.bcp_unit_propagate(cid, true, watches)?;
                if ulit == CONFLICT_LIT {
                    log::debug!("conflict on clause #{} generated by RUP step", cid);
                } else if ulit != 0 {
                    self.push_derived_literal(ulit, cid);
                    watches.add_unit(ulit, cid);
                }
            }
        }
        Ok(ncid)
    }

    // --- PARTITIONING --- //

    /// Group the active clauses into variable-disjoint components.
    /// Returns the variable -> representative map and, per representative,
    /// the clause ids of its component.
    pub fn partition_clauses(
        &mut self,
    ) -> CpogResult<(FxHashMap<i32, i32>, FxHashMap<i32, BTreeSet<usize>>)> {
        if let Some(ccid) = self.bcp(false)? {
            return Err(CpogError::Invariant(format!(
                "BCP generated conflict on clause #{} prior to partitioning",
                ccid
            )));
        }
        let mut var2rvar: FxHashMap<i32, i32> = FxHashMap::default();
        let mut rvar2vset: FxHashMap<i32, FxHashSet<i32>> = FxHashMap::default();
        let active: Vec<usize> = self.curr_active_clauses.iter().copied().collect();
        for &cid in active.iter() {
            let clits = self.get_clause(cid)?.literals().to_vec();
            let mut rvar = 0;
            for lit in clits {
                let var = var_of(lit);
                if self.unit_literals.contains(&-lit) {
                    continue;
                }
                if self.unit_literals.contains(&lit) {
                    return Err(CpogError::Invariant(format!(
                        "satisfied clause #{} (unit literal {}) found during partitioning",
                        cid, lit
                    )));
                }
                if let Some(&prev) = var2rvar.get(&var) {
                    if rvar == 0 {
                        rvar = prev;
                    }
                    continue;
                }
                if rvar == 0 {
                    rvar = var;
                    rvar2vset.insert(rvar, FxHashSet::default());
                }
                var2rvar.insert(var, rvar);
                rvar2vset.get_mut(&rvar).unwrap().insert(var);
            }
        }
        // Merge the groups joined by a clause, smaller into larger
        for &cid in active.iter() {
            let clits = self.get_clause(cid)?.literals().to_vec();
            let mut rvar1 = 0;
            let mut start = clits.len();
            for (i, lit) in clits.iter().enumerate() {
                if let Some(&r) = var2rvar.get(&var_of(*lit)) {
                    rvar1 = r;
                    start = i + 1;
                    break;
                }
            }
            for lit in clits.iter().skip(start) {
                let Some(&rvar2) = var2rvar.get(&var_of(*lit)) else {
                    continue;
                };
                if rvar1 == rvar2 {
                    continue;
                }
                let set1_len = rvar2vset[&rvar1].len();
                let set2_len = rvar2vset[&rvar2].len();
                let (from, into) = if set1_len >= set2_len {
                    (rvar2, rvar1)
                } else {
                    (rvar1, rvar2)
                };
                let moved = rvar2vset.remove(&from).unwrap();
                for mvar in moved.iter() {
                    var2rvar.insert(*mvar, into);
                }
                rvar2vset.get_mut(&into).unwrap().extend(moved);
                rvar1 = into;
            }
        }
        let mut rvar2cset: FxHashMap<i32, BTreeSet<usize>> = FxHashMap::default();
        for &rvar in rvar2vset.keys() {
            rvar2cset.insert(rvar, BTreeSet::new());
        }
        for &cid in active.iter() {
            let clits = self.get_clause(cid)?.literals().to_vec();
            for lit in clits {
                if let Some(&rvar) = var2rvar.get(&var_of(lit)) {
                    rvar2cset.get_mut(&rvar).unwrap().insert(cid);
                    break;
                }
            }
        }
        Ok((var2rvar, rvar2cset))
    }

    /// Snapshot the active clauses, simplified by the current units.
    pub fn extract_cnf(&self) -> CpogResult<CnfReduced> {
        let mut rcnf = CnfReduced::new(self.options.delete_files);
        for &cid in self.curr_active_clauses.iter() {
            let clause = self.get_clause(cid)?;
            rcnf.add_clause(clause, &self.unit_literals, cid);
        }
        Ok(rcnf)
    }

    /// Unit literals whose justifications the proof step relies on: those
    /// falsifying a literal of the clause or of any hint clause.
    pub fn filter_units(&self, clause: &Clause, hints: &Clause) -> CpogResult<Vec<i32>> {
        let mut units: FxHashSet<i32> = FxHashSet::default();
        for lit in clause.iter() {
            if self.unit_literals.contains(&-lit) {
                units.insert(-lit);
            }
        }
        for i in 0..hints.literals().len() {
            let hcid = hints.literals()[i] as usize;
            let hclause = self.get_clause(hcid)?;
            for lit in hclause.iter() {
                if self.unit_literals.contains(&-lit) {
                    units.insert(-lit);
                }
            }
        }
        let mut sorted: Vec<i32> = units.into_iter().collect();
        sorted.sort_by_key(|l| l.abs());
        Ok(sorted)
    }

    // --- SOLVER-BACKED VALIDATION --- //

    /// Hand the active clauses to the SAT solver to validate `lit`.
    /// Above the DRAT threshold the LRAT pipeline supplies hinted steps
    /// that are transliterated into the proof; below it the plain proof
    /// clauses are re-validated locally by RUP.
    fn reduce_run(&mut self, lit: i32) -> CpogResult<Option<usize>> {
        let mut rcnf = self.extract_cnf()?;
        if rcnf.clause_count() == 0 {
            log::error!(
                "CNF reduces to tautology when attempting to validate literal {}",
                lit
            );
            return Ok(None);
        }
        self.stats.sat_calls += 1;
        let mut ncid = 0;
        if rcnf.clause_count() >= self.options.drat_threshold {
            if rcnf.run_hinting_solver()? {
                let fname = rcnf.file_name();
                self.comment(&format!(
                    "Adding proof clauses from SAT solver on file {} to validate literal {}",
                    fname, lit
                ))?;
                let start_id = self.clause_count() + self.proof_clauses.len() + 1;
                loop {
                    let hints = rcnf.get_proof_hint(start_id);
                    let Some(clause) = rcnf.get_proof_clause(&self.assigned_literals.clone())
                    else {
                        break;
                    };
                    let hints = hints.unwrap_or_default();
                    let real_units = self.filter_units(&clause, &hints)?;
                    ncid = self.start_assertion(clause, false)?;
                    for ulit in real_units {
                        if let Some(&hid) = self.justifying_ids.get(&ulit) {
                            if hid != ncid {
                                self.add_hint(hid)?;
                            }
                        }
                    }
                    self.add_hints(&hints)?;
                    self.finish_command(true)?;
                    self.stats.literal_justifications += 1;
                }
                self.comment("End of proof clauses from SAT solver")?;
            }
        } else {
            let mut first_ncid = 0;
            if rcnf.run_solver()? {
                let fname = rcnf.file_name();
                self.comment(&format!(
                    "Adding proof clauses from SAT solver on file {} to validate literal {}",
                    fname, lit
                ))?;
                let mut watches = Watcher::new();
                let mut hints = vec![];
                self.new_context();
                let mut fail = self.watches_setup(&mut watches)?;
                while !fail {
                    let Some(clause) = rcnf.get_proof_clause(&self.assigned_literals.clone())
                    else {
                        break;
                    };
                    match self.rup_validate(&clause, true, &mut watches, &mut hints)? {
                        Some(cid) => {
                            if first_ncid == 0 {
                                first_ncid = cid;
                            }
                            ncid = cid;
                        }
                        None => {
                            fail = true;
                            log::error!(
                                "failed to re-validate solver proof clause while validating literal {}",
                                lit
                            );
                        }
                    }
                }
                self.pop_context();
                self.comment(&format!("End of proof clauses from SAT solver on file {}", fname))?;
                // The intermediate clauses are no longer needed
                for cid in first_ncid..=ncid {
                    self.deactivate_clause(cid);
                }
                if fail {
                    ncid = 0;
                }
            } else {
                self.comment(&format!(
                    "SAT solver failed running on file {} to validate literal {}",
                    rcnf.file_name(),
                    lit
                ))?;
            }
        }
        Ok(if ncid > 0 { Some(ncid) } else { None })
    }

    /// Justify that a literal holds under the current context. Returns
    /// the justifying clause id, or `None` when the requested mode could
    /// not establish it.
    pub fn validate_literal(
        &mut self,
        lit: i32,
        mode: ValidationMode,
    ) -> CpogResult<Option<usize>> {
        if let Some(&jid) = self.justifying_ids.get(&lit) {
            return Ok(Some(jid));
        }
        if self.unit_literals.contains(&lit) {
            return Ok(None);
        }
        let mut ncid = None;
        self.new_context();
        self.push_assigned_literal(-lit);
        if mode != ValidationMode::Sat && self.options.bcp_limit > 0 {
            ncid = self.bcp(mode == ValidationMode::BoundedBcp)?;
        }
        if ncid.is_none() && mode != ValidationMode::Bcp && mode != ValidationMode::BoundedBcp {
            ncid = self.reduce_run(lit)?;
        }
        self.pop_context();
        if let Some(cid) = ncid {
            if !self.unit_literals.contains(&lit) {
                self.push_derived_literal(lit, cid);
            }
        }
        Ok(ncid)
    }

    /// Bulk form: try each literal cheaply first; the stragglers share
    /// one auxiliary conjunction whose extension variable is validated
    /// with full effort, after which each literal follows in two hints.
    pub fn validate_literals(&mut self, lits: &[i32]) -> CpogResult<Option<Vec<usize>>> {
        let mut jids = vec![0usize; lits.len()];
        let mode = if self.options.multi_literal {
            ValidationMode::BoundedBcp
        } else {
            ValidationMode::Full
        };
        let mut args: Vec<i32> = vec![];
        let mut lit2idx: FxHashMap<i32, usize> = FxHashMap::default();
        for (i, &lit) in lits.iter().enumerate() {
            match self.validate_literal(lit, mode)? {
                Some(jid) => jids[i] = jid,
                None => {
                    args.push(-lit);
                    lit2idx.insert(-lit, i);
                }
            }
        }
        if args.is_empty() {
            return Ok(Some(jids));
        }
        if args.len() == 1 {
            let nlit = args[0];
            let i = lit2idx[&nlit];
            match self.validate_literal(-nlit, ValidationMode::Full)? {
                Some(jid) => {
                    jids[i] = jid;
                    return Ok(Some(jids));
                }
                None => {
                    log::error!("failed to validate literal {}", -nlit);
                    return Ok(None);
                }
            }
        }
        let defining_cid = self.find_or_make_aux_clause(&args)?;
        let aux = self.aux_clauses.get(&defining_cid).unwrap();
        let xvar = -aux.activating_literal();
        let aux_lits = aux.literals().to_vec();
        self.activate_clause(defining_cid);
        self.comment(&format!(
            "Handle {}/{} literals with SAT solver to validate extension variable {}",
            args.len(),
            lits.len(),
            xvar
        ))?;
        let ncid = self.validate_literal(xvar, ValidationMode::Full)?;
        match ncid {
            Some(ncid) => {
                for (i, &nlit) in aux_lits.iter().enumerate() {
                    let idx = lit2idx[&nlit];
                    let jid = self.quick_validate_literal(-nlit, ncid, defining_cid + i + 1)?;
                    jids[idx] = jid;
                }
                self.comment(&format!("Justifications of {} literals completed", args.len()))?;
                self.deactivate_clause(defining_cid);
                Ok(Some(jids))
            }
            None => {
                self.deactivate_clause(defining_cid);
                log::error!(
                    "couldn't validate literal {} representing conjunction of {} literals",
                    xvar,
                    args.len()
                );
                Ok(None)
            }
        }
    }

    // --- AUXILIARY CLAUSES AND LEMMAS --- //

    pub fn get_aux_clause(&self, cid: usize) -> Option<&Clause> {
        self.aux_clauses.get(&cid)
    }

    /// Find an existing auxiliary clause with these literals or create a
    /// fresh one: a new extension variable `x` with defining clauses
    /// `x ∨ l1 ∨ ... ∨ lk` and `¬x ∨ ¬li`, so asserting `¬x` puts the
    /// clause body in force. Returns the first defining clause id, which
    /// doubles as the aux clause id.
    pub fn find_or_make_aux_clause(&mut self, lits: &[i32]) -> CpogResult<usize> {
        let mut np = Clause::from_lits(lits);
        np.canonize();
        let hash = self.hasher.hash_clause(&mut np);
        if let Some(bucket) = self.aux_clause_lookup.get(&hash).cloned() {
            for xcid in bucket {
                match self.aux_clauses.get_mut(&xcid) {
                    None => log::error!(
                        "lookup table lists clause #{} under hash {}, but no such aux clause",
                        xcid,
                        hash
                    ),
                    Some(xcp) => {
                        xcp.canonize();
                        if np.is_equal(xcp) {
                            log::trace!("retrieved existing aux clause #{}", xcid);
                            return Ok(xcid);
                        }
                    }
                }
            }
        }
        let xvar = self.new_xvar();
        let args: Vec<i32> = np.iter().map(|l| -l).collect();
        self.stats.aux_and_nodes += 1;
        let defining_cid = self.start_and(xvar, &args)?;
        self.finish_command(false)?;
        self.document_and(defining_cid, xvar, &args)?;
        let mut aux = np.clone();
        aux.set_activating_literal(-xvar);
        self.aux_clauses.insert(defining_cid, aux);
        self.aux_clause_lookup.entry(hash).or_default().push(defining_cid);
        log::trace!("generated new aux clause #{}", defining_cid);
        Ok(defining_cid)
    }

    /// Add an active clause as a lemma argument: simplify it under the
    /// context; if simplification changed it, a shared auxiliary clause
    /// stands in for it.
    fn add_lemma_argument(&mut self, lemma: &mut LemmaInstance, cid: usize) -> CpogResult<()> {
        let clause = self.get_clause(cid)?;
        let Some(slits) = clause.simplify(&self.unit_literals) else {
            return Ok(());
        };
        let ncid = if slits.len() == clause.len() {
            cid
        } else {
            self.find_or_make_aux_clause(&slits)?
        };
        match lemma.inverse_cid.get(&ncid).copied() {
            None => {
                lemma.inverse_cid.insert(ncid, cid);
            }
            Some(ocid) => {
                if ncid == cid && ocid != cid {
                    lemma.duplicate_cid.insert(ocid);
                    lemma.inverse_cid.insert(ncid, cid);
                } else {
                    lemma.duplicate_cid.insert(cid);
                }
            }
        }
        Ok(())
    }

    /// Build the lemma instance for the current context: one argument per
    /// active clause, signed over the splitting literal and the sorted
    /// argument ids.
    pub fn extract_lemma(&mut self, xvar: i32, splitting_literal: i32) -> CpogResult<LemmaInstance> {
        let mut lemma = LemmaInstance::new(xvar, splitting_literal);
        let active: Vec<usize> = self.curr_active_clauses.iter().copied().collect();
        for cid in active {
            self.add_lemma_argument(&mut lemma, cid)?;
        }
        lemma.sign(&mut self.hasher);
        self.comment(&format!(
            "Extracted lemma for node N{}.  Signature {}",
            xvar, lemma.signature
        ))?;
        Ok(lemma)
    }

    /// Enter the lemma-proof context: only the activating literals of the
    /// argument clauses are asserted, everything context-specific is
    /// cleared.
    pub fn setup_proof(&mut self, lemma: &LemmaInstance) -> CpogResult<()> {
        self.new_context();
        self.clear_assigned_literals();
        self.comment(&format!(
            "Proof of lemma for N{}, signature {}",
            lemma.xvar, lemma.signature
        ))?;
        for (&ncid, &ocid) in lemma.inverse_cid.iter() {
            if ncid != ocid {
                self.deactivate_clause(ocid);
                self.activate_clause(ncid);
            }
            let alit = self
                .get_aux_clause(ncid)
                .map(Clause::activating_literal)
                .unwrap_or(0);
            if alit != 0 {
                self.push_assigned_literal(alit);
            }
        }
        for &ocid in lemma.duplicate_cid.iter() {
            self.deactivate_clause(ocid);
        }
        Ok(())
    }

    /// Leave the lemma-proof context, restoring the instance's clauses.
    pub fn restore_from_proof(&mut self, lemma: &LemmaInstance) -> CpogResult<()> {
        for (&ncid, &ocid) in lemma.inverse_cid.iter() {
            if ncid != ocid {
                self.deactivate_clause(ncid);
                self.activate_clause(ocid);
            }
        }
        self.pop_context();
        for &ocid in lemma.duplicate_cid.iter() {
            self.activate_clause(ocid);
            self.stats.lemma_argument_merges += 1;
        }
        Ok(())
    }

    /// Apply a proved lemma at an instance site: re-justify each aux
    /// argument from the current context, then assert the lemma root with
    /// the argument justifications plus the lemma's own proof.
    pub fn apply_lemma(
        &mut self,
        lemma: &LemmaInstance,
        instance: &LemmaInstance,
    ) -> CpogResult<Option<usize>> {
        if lemma.splitting_literal != instance.splitting_literal {
            log::error!(
                "lemma for node N{}: lemma and instance differ on splitting literal",
                lemma.xvar
            );
            return Ok(None);
        }
        for &ncid in lemma.inverse_cid.keys() {
            if !instance.inverse_cid.contains_key(&ncid) {
                log::error!(
                    "lemma for node N{}: argument clause #{} not found in instance",
                    lemma.xvar,
                    ncid
                );
                return Ok(None);
            }
        }
        for &ncid in instance.inverse_cid.keys() {
            if !lemma.inverse_cid.contains_key(&ncid) {
                log::error!(
                    "lemma for node N{}: instance argument clause #{} not found in lemma",
                    lemma.xvar,
                    ncid
                );
                return Ok(None);
            }
        }
        let mut arg_jids: Vec<usize> = vec![];
        self.comment(&format!(
            "Application of lemma for N{}, signature {}",
            lemma.xvar, lemma.signature
        ))?;
        for (&ncid, &ocid) in instance.inverse_cid.iter() {
            if ocid == ncid {
                continue;
            }
            let aux = self.get_aux_clause(ncid).ok_or_else(|| {
                CpogError::Invariant(format!("lemma argument #{} is not an aux clause", ncid))
            })?;
            let alit = aux.activating_literal();
            let aux_len = aux.len();
            if self.unit_literals.contains(&alit) {
                if let Some(&jid) = self.justifying_ids.get(&alit) {
                    arg_jids.push(jid);
                }
            } else {
                let mut clause = Clause::unit(alit);
                for lit in self.assigned_literals.clone() {
                    clause.push(-lit);
                }
                let ccid = self.start_assertion(clause, false)?;
                arg_jids.push(ccid);
                // Hints from the synthetic clause definition
                for offset in 1..=aux_len {
                    self.add_hint(ncid + offset)?;
                }
                // Hints based on context
                let olits = self.get_clause(ocid)?.literals().to_vec();
                for clit in olits {
                    if let Some(&jid) = self.justifying_ids.get(&-clit) {
                        self.add_hint(jid)?;
                    }
                }
                self.add_hint(ocid)?;
                self.finish_command(true)?;
                self.stats.lemma_application_clauses += 1;
            }
        }
        let mut clause = Clause::unit(lemma.xvar);
        for lit in self.assigned_literals.clone() {
            clause.push(-lit);
        }
        self.comment(&format!(
            "Justification of lemma root {} in context",
            lemma.xvar
        ))?;
        let jid = self.start_assertion(clause, false)?;
        for ajid in arg_jids {
            self.add_hint(ajid)?;
        }
        self.add_hint(lemma.jid)?;
        self.finish_command(true)?;
        self.stats.lemma_application_clauses += 1;
        Ok(Some(jid))
    }
}

/// Core of BCP for a single clause; see
/// [`CnfReasoner::bcp_unit_propagate`].
fn unit_propagate_step(
    clause: &mut Clause,
    unit_literals: &FxHashSet<i32>,
    watches: &mut Watcher,
    cid: usize,
    first_pass: bool,
) -> i32 {
    let mut watching = [0i32; 2];
    if !first_pass {
        watching[0] = clause[0];
        watching[1] = clause[1];
    }
    if clause.len() > 2 {
        watches.watching(cid, clause[0], clause[1]);
    }
    let mut unassigned_count = 0;
    for idx in 0..clause.len() {
        let clit = clause[idx];
        if unit_literals.contains(&clit) {
            // Satisfied
            return 0;
        } else if !unit_literals.contains(&-clit) {
            clause.swap_literals(unassigned_count, idx);
            unassigned_count += 1;
            if !first_pass && unassigned_count >= 2 {
                break;
            }
        }
    }
    if unassigned_count == 0 {
        return CONFLICT_LIT;
    }
    if unassigned_count == 1 {
        return clause[0];
    }
    let wlit0 = clause[0];
    let wlit1 = clause[1];
    if wlit0 != watching[0] && wlit0 != watching[1] {
        watches.add_clause_id(cid, -wlit0);
    }
    if wlit1 != watching[0] && wlit1 != watching[1] {
        watches.add_clause_id(cid, -wlit1);
    }
    0
}

#[cfg(test)]
mod test_reasoner {
    use super::*;
    use crate::parsers::cnf_from_dimacs;
    use std::io::Cursor;

    fn reasoner_from(text: &str) -> CnfReasoner {
        let cnf = cnf_from_dimacs(Cursor::new(text)).unwrap();
        let writer = CpogWriter::new(Box::new(std::io::sink()));
        CnfReasoner::new(cnf, writer, ProofOptions::default())
    }

    #[test]
    fn context_push_pop_restores_state() {
        let mut reasoner = reasoner_from("p cnf 3 2\n1 2 0\n-1 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        let before_units: Vec<i32> = reasoner.unit_literals().iter().copied().collect();
        let before_active = reasoner.extract_active_clauses();
        reasoner.new_context();
        reasoner.push_assigned_literal(-1);
        reasoner.push_derived_literal(3, 2);
        reasoner.deactivate_clause(2);
        reasoner.push_clause(2, false);
        assert!(reasoner.unit_literals().contains(&-1));
        assert_eq!(Some(2), reasoner.justifying_id(3));
        reasoner.pop_context();
        let after_units: Vec<i32> = reasoner.unit_literals().iter().copied().collect();
        assert_eq!(before_units, after_units);
        assert_eq!(before_active, reasoner.extract_active_clauses());
        assert_eq!(None, reasoner.justifying_id(3));
        assert!(reasoner.assigned_literals().is_empty());
    }

    #[test]
    fn cleared_literals_reassert_in_order() {
        let mut reasoner = reasoner_from("p cnf 3 1\n1 2 3 0\n");
        reasoner.new_context();
        reasoner.push_assigned_literal(1);
        reasoner.push_assigned_literal(-2);
        reasoner.new_context();
        reasoner.clear_assigned_literals();
        assert!(reasoner.assigned_literals().is_empty());
        assert!(!reasoner.unit_literals().contains(&1));
        reasoner.pop_context();
        assert_eq!(&[1, -2], reasoner.assigned_literals());
        assert!(reasoner.unit_literals().contains(&1));
        assert!(reasoner.unit_literals().contains(&-2));
        reasoner.pop_context();
        assert!(reasoner.assigned_literals().is_empty());
    }

    #[test]
    fn bcp_derives_units_and_conflicts() {
        let mut reasoner = reasoner_from("p cnf 3 3\n1 2 0\n-2 3 0\n-2 -3 0\n");
        for cid in 1..=3 {
            reasoner.activate_clause(cid);
        }
        reasoner.new_context();
        reasoner.push_assigned_literal(-1);
        // -1 forces 2, which forces 3 and -3: conflict
        let conflict = reasoner.bcp(false).unwrap();
        assert!(conflict.is_some());
        reasoner.pop_context();
    }

    #[test]
    fn bcp_moves_satisfied_clauses_out() {
        let mut reasoner = reasoner_from("p cnf 3 2\n1 2 0\n2 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        reasoner.new_context();
        reasoner.push_assigned_literal(2);
        assert_eq!(None, reasoner.bcp(false).unwrap());
        assert!(reasoner.active_clauses().is_empty());
        reasoner.pop_context();
        assert_eq!(2, reasoner.active_clauses().len());
    }

    #[test]
    fn enable_pog_finds_input_conflict() {
        let mut reasoner = reasoner_from("p cnf 1 2\n1 0\n-1 0\n");
        reasoner.enable_pog().unwrap();
        assert!(reasoner.is_unsatisfiable());
    }

    #[test]
    fn validate_literal_by_bcp() {
        // (1 2) with -1 assumed forces 2; validating 2 emits an assertion
        let mut reasoner = reasoner_from("p cnf 2 1\n1 2 0\n");
        reasoner.activate_clause(1);
        reasoner.new_context();
        reasoner.push_assigned_literal(-1);
        assert_eq!(None, reasoner.bcp(false).unwrap());
        // BCP already derived 2
        let jid = reasoner
            .validate_literal(2, ValidationMode::Bcp)
            .unwrap()
            .unwrap();
        assert!(jid > 0);
        reasoner.pop_context();
    }

    #[test]
    fn partition_splits_disjoint_supports() {
        let mut reasoner = reasoner_from("p cnf 4 2\n1 2 0\n3 4 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        let (var2rvar, rvar2cset) = reasoner.partition_clauses().unwrap();
        assert_eq!(2, rvar2cset.len());
        assert_eq!(var2rvar[&1], var2rvar[&2]);
        assert_eq!(var2rvar[&3], var2rvar[&4]);
        assert_ne!(var2rvar[&1], var2rvar[&3]);
    }

    #[test]
    fn partition_merges_shared_variable() {
        let mut reasoner = reasoner_from("p cnf 3 2\n1 2 0\n2 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        let (_, rvar2cset) = reasoner.partition_clauses().unwrap();
        assert_eq!(1, rvar2cset.len());
        let cset = rvar2cset.values().next().unwrap();
        assert_eq!(2, cset.len());
    }

    #[test]
    fn aux_clauses_are_shared() {
        let mut reasoner = reasoner_from("p cnf 4 1\n1 2 3 4 0\n");
        let cid1 = reasoner.find_or_make_aux_clause(&[-1, -2]).unwrap();
        let cid2 = reasoner.find_or_make_aux_clause(&[-2, -1]).unwrap();
        assert_eq!(cid1, cid2);
        let cid3 = reasoner.find_or_make_aux_clause(&[-1, -3]).unwrap();
        assert_ne!(cid1, cid3);
        let aux = reasoner.get_aux_clause(cid1).unwrap();
        assert_eq!(&[-1, -2], aux.literals());
        assert!(aux.activating_literal() < 0);
    }

    #[test]
    fn rup_validates_resolvent() {
        // (1 2) (-2 3): clause (1 3) follows by RUP
        let mut reasoner = reasoner_from("p cnf 3 2\n1 2 0\n-2 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        let mut watches = Watcher::new();
        assert!(!reasoner.watches_setup(&mut watches).unwrap());
        let mut hints = vec![];
        let target = Clause::from_lits(&[1, 3]);
        let result = reasoner
            .rup_validate(&target, false, &mut watches, &mut hints)
            .unwrap();
        assert_eq!(Some(0), result);
        assert!(!hints.is_empty());
        // Hints end at a conflicting clause
        assert!(hints.contains(&1) || hints.contains(&2));
    }

    #[test]
    fn lemma_signature_depends_on_context() {
        let mut reasoner = reasoner_from("p cnf 4 2\n1 2 0\n1 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        let lemma_a = reasoner.extract_lemma(10, 2).unwrap();
        let lemma_b = reasoner.extract_lemma(10, 2).unwrap();
        assert_eq!(lemma_a.signature, lemma_b.signature);
        let lemma_c = reasoner.extract_lemma(10, 3).unwrap();
        assert_ne!(lemma_a.signature, lemma_c.signature);
    }

    #[test]
    fn lemma_argument_uses_aux_for_reduced_clause() {
        let mut reasoner = reasoner_from("p cnf 3 2\n1 2 0\n1 2 3 0\n");
        reasoner.activate_clause(1);
        reasoner.activate_clause(2);
        reasoner.new_context();
        reasoner.push_assigned_literal(-3);
        let lemma = reasoner.extract_lemma(9, 0).unwrap();
        // Clause 1 passes through unchanged; clause 2 loses literal 3 and
        // is represented by a fresh aux clause
        assert_eq!(2, lemma.inverse_cid.len());
        assert_eq!(Some(&1), lemma.inverse_cid.get(&1));
        let (&aux_cid, &ocid) = lemma
            .inverse_cid
            .iter()
            .find(|(ncid, _)| **ncid != 1)
            .unwrap();
        assert_eq!(2, ocid);
        assert!(aux_cid > 2);
        assert_eq!(
            &[1, 2],
            reasoner.get_aux_clause(aux_cid).unwrap().literals()
        );
        assert!(lemma.duplicate_cid.is_empty());
        reasoner.pop_context();
    }
}
