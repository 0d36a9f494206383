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

//! Recursive justification of POG nodes. Each node's extension literal
//! is proved to follow from its defining clauses under the current
//! context, either structurally (splitting an OR on its decision
//! literal, partitioning the active clauses across the children of an
//! AND) or monolithically (reducing the active clauses plus the node's
//! subgraph and handing the result to the SAT solver pipeline). Shared
//! OR nodes get a lemma: the proof runs once against argument clauses
//! abstracted by activating literals, and each sharing site replays it
//! with a short derivation per argument.

use rustc_hash::FxHashSet;

use crate::cnf::reasoner::CnfReasoner;
use crate::cnf::reduced::CnfReduced;
use crate::common::ValidationMode;
use crate::core::clause::Clause;
use crate::core::literal::var_of;
use crate::errors::{CpogError, CpogResult};

use super::{NodeType, Pog};

/// Outcome of justifying one argument. An input literal matching the
/// splitting literal needs no clause of its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Justified {
    Proved(usize),
    Trivial,
}

impl Justified {
    pub fn cid(self) -> Option<usize> {
        match self {
            Justified::Proved(cid) => Some(cid),
            Justified::Trivial => None,
        }
    }
}

impl Pog {
    fn wants_monolithic(&self, cnf: &CnfReasoner, ntype: NodeType, tree_size: i64) -> bool {
        ntype != NodeType::Skolem
            && self.tree_ratio <= cnf.options.tree_ratio_threshold
            && (cnf.options.monolithic_threshold < 0
                || tree_size <= cnf.options.monolithic_threshold)
    }

    /// Justify that `rlit` holds under the current context. Returns
    /// `None` when no proof could be produced; the caller decides
    /// whether to retry monolithically or give up.
    pub fn justify(
        &mut self,
        cnf: &mut CnfReasoner,
        rlit: i32,
        splitting_literal: i32,
        use_lemma: bool,
    ) -> CpogResult<Option<Justified>> {
        if !self.is_node(rlit) {
            if splitting_literal != 0 {
                return Ok(Some(Justified::Trivial));
            }
            return match cnf.validate_literal(rlit, ValidationMode::Full)? {
                Some(cid) => Ok(Some(Justified::Proved(cid))),
                None => {
                    log::error!("validation of literal {} failed", rlit);
                    Ok(None)
                }
            };
        }
        let rvar = var_of(rlit);
        let (ntype, xvar, children, tree_size, defining_cid, want_lemma) = {
            let node = self.node(rvar);
            (
                node.ntype,
                node.xvar,
                node.children.clone(),
                node.tree_size,
                node.defining_cid,
                node.want_lemma(),
            )
        };
        if self.wants_monolithic(cnf, ntype, tree_size) {
            return self.justify_monolithic(cnf, rlit, splitting_literal);
        }
        if use_lemma && cnf.options.use_lemmas && want_lemma {
            let jid = self.apply_lemma_at(cnf, rvar, splitting_literal)?;
            if jid.is_none() {
                log::error!("failed lemma; giving up on validation of node {}", xvar);
            }
            return Ok(jid.map(Justified::Proved));
        }

        let mut jclause = Clause::unit(xvar);
        for alit in cnf.assigned_literals().to_vec() {
            jclause.push(-alit);
        }
        let mut hints: Vec<usize> = vec![];
        cnf.new_context();

        match ntype {
            NodeType::Or => {
                let clit = [children[0], children[1]];
                let split = self.find_splitting_literal(clit[0], clit[1]);
                let mut lhints: [Vec<usize>; 2] = [vec![], vec![]];
                let mut jcount = 0;
                let mut child_split = split;
                for i in 0..2 {
                    lhints[i].push(defining_cid + i + 1);
                    match self.justify(cnf, clit[i], child_split, true)? {
                        None => {
                            log::warn!(
                                "justification of node {} failed on child {} (split {})",
                                xvar,
                                clit[i],
                                child_split
                            );
                            cnf.pop_context();
                            return self.retry_monolithic(
                                cnf,
                                rlit,
                                splitting_literal,
                                "failed to justify child of sum node",
                            );
                        }
                        Some(Justified::Trivial) => {}
                        Some(Justified::Proved(jid)) => {
                            jcount += 1;
                            lhints[i].push(jid);
                        }
                    }
                    // Negate for the second child
                    child_split = -child_split;
                }
                if jcount > 1 && split == 0 {
                    cnf.pop_context();
                    return self.retry_monolithic(
                        cnf,
                        rlit,
                        splitting_literal,
                        "sum node has no splitting literal",
                    );
                }
                if jcount > 1 {
                    // Two steps: first split ⊃ xvar, then xvar
                    let mut jclause0 = Clause::unit(-split);
                    jclause0.push(xvar);
                    for alit in cnf.assigned_literals().to_vec() {
                        jclause0.push(-alit);
                    }
                    cnf.comment(&format!("Justify node S{}", xvar))?;
                    let cid0 = cnf.start_assertion(jclause0, false)?;
                    for &hid in lhints[0].iter() {
                        cnf.add_hint(hid)?;
                    }
                    cnf.finish_command(true)?;
                    cnf.stats.or_justifications += 1;
                    cnf.stats.addition_hints += lhints[0].len();
                    hints.push(cid0);
                    hints.extend(lhints[1].iter().copied());
                    cnf.stats.addition_hints += lhints[1].len();
                } else {
                    for lh in lhints.iter() {
                        hints.extend(lh.iter().copied());
                        cnf.stats.addition_hints += lh.len();
                    }
                }
                cnf.stats.or_justifications += 1;
            }

            NodeType::And | NodeType::True => {
                // A splitting literal means the parent is an OR
                if splitting_literal != 0 {
                    cnf.push_assigned_literal(splitting_literal);
                    jclause.push(-splitting_literal);
                    cnf.comment(&format!(
                        "Justify node P{}, assuming literal {}",
                        xvar, splitting_literal
                    ))?;
                    if let Some(ccid) = cnf.bcp(false)? {
                        log::warn!(
                            "BCP hit conflict (clause #{}) while justifying node {} under literal {}",
                            ccid,
                            xvar,
                            splitting_literal
                        );
                        cnf.pop_context();
                        return Ok(None);
                    }
                } else {
                    cnf.comment(&format!("Justify node P{}", xvar))?;
                }

                // Literal children first, in one bundle
                let mut cnext = 0;
                let mut lits = vec![];
                while cnext < children.len() && !self.is_node(children[cnext]) {
                    let clit = children[cnext];
                    if clit != splitting_literal {
                        lits.push(clit);
                    }
                    cnext += 1;
                }
                if !lits.is_empty() {
                    match cnf.validate_literals(&lits)? {
                        None => {
                            log::warn!(
                                "justification of node {} failed validating literal children",
                                xvar
                            );
                            cnf.pop_context();
                            return self.retry_monolithic(
                                cnf,
                                rlit,
                                splitting_literal,
                                "failed to validate literal children of product node",
                            );
                        }
                        Some(jids) => hints.extend(jids),
                    }
                }

                // Skolem children sit at the end
                let mut nonskolem_degree = children.len();
                while nonskolem_degree > 0
                    && self.is_node_type(children[nonskolem_degree - 1], NodeType::Skolem)
                {
                    nonskolem_degree -= 1;
                }
                let partition_count = nonskolem_degree - cnext;

                let mut skolem_ok = true;
                for &clit in children[nonskolem_degree..].iter() {
                    let snode = self.node(var_of(clit));
                    hints.push(snode.defining_cid);
                    if partition_count == 0 {
                        continue;
                    }
                    // Under a decision context every Skolem literal must
                    // already be unit
                    for &slit in snode.children.iter() {
                        if !cnf.unit_literals().contains(&slit) {
                            log::warn!(
                                "Skolem node {} under node {} has non-unit literal {}",
                                snode.xvar,
                                xvar,
                                slit
                            );
                            skolem_ok = false;
                        }
                    }
                }
                if !skolem_ok {
                    cnf.pop_context();
                    return self.retry_monolithic(
                        cnf,
                        rlit,
                        splitting_literal,
                        "found Skolem node with non-unit literal",
                    );
                }

                // Node children: partition the active clauses so each
                // child works on its own component
                let mut partition = None;
                if partition_count >= 2 {
                    let (var2rvar, rvar2cset) = cnf.partition_clauses()?;
                    let mut partition_ok = rvar2cset.len() == partition_count;
                    if partition_ok {
                        let mut rvar_used = FxHashSet::default();
                        for &pclit in children[cnext..nonskolem_degree].iter() {
                            let llit = self.first_literal(pclit)?;
                            match var2rvar.get(&var_of(llit)) {
                                None => {
                                    partition_ok = false;
                                    break;
                                }
                                Some(&prvar) => {
                                    if !rvar_used.insert(prvar) {
                                        partition_ok = false;
                                        break;
                                    }
                                }
                            }
                        }
                    } else {
                        log::debug!(
                            "node {}: partitioned clauses into {} sets for {} arguments",
                            xvar,
                            rvar2cset.len(),
                            partition_count
                        );
                    }
                    if !partition_ok {
                        cnf.pop_context();
                        return self.retry_monolithic(
                            cnf,
                            rlit,
                            splitting_literal,
                            "couldn't find partitioning",
                        );
                    }
                    partition = Some((var2rvar, rvar2cset));
                }

                let save_clauses = if partition_count > 1 {
                    Some(cnf.extract_active_clauses())
                } else {
                    None
                };
                for &clit in children[cnext..nonskolem_degree].iter() {
                    if let Some((var2rvar, rvar2cset)) = partition.as_ref() {
                        let llit = self.first_literal(clit)?;
                        let rvar = var2rvar[&var_of(llit)];
                        let pset = &rvar2cset[&rvar];
                        cnf.set_active_clauses(pset);
                    }
                    match self.justify(cnf, clit, 0, true)? {
                        Some(Justified::Proved(jid)) => hints.push(jid),
                        _ => {
                            log::warn!(
                                "justification of node {} failed on argument {}",
                                xvar,
                                clit
                            );
                            if let Some(save) = save_clauses.as_ref() {
                                cnf.set_active_clauses(save);
                            }
                            cnf.pop_context();
                            return self.retry_monolithic(
                                cnf,
                                rlit,
                                splitting_literal,
                                "couldn't justify node child of product node",
                            );
                        }
                    }
                }
                hints.push(defining_cid);
                if let Some(save) = save_clauses.as_ref() {
                    cnf.set_active_clauses(save);
                }
                cnf.stats.and_justifications += 1;
            }

            NodeType::Skolem => {
                hints.push(defining_cid);
                cnf.stats.skolem_justifications += 1;
            }

            NodeType::False => {
                return Err(CpogError::Invariant(format!(
                    "cannot justify constant FALSE node {}",
                    xvar
                )));
            }
        }

        let jcid = cnf.start_assertion(jclause, false)?;
        for &hint in hints.iter() {
            cnf.add_hint(hint)?;
        }
        cnf.finish_command(true)?;
        cnf.stats.addition_hints += hints.len();
        cnf.pop_context();
        log::debug!("node literal {} justified by clause {}", rlit, jcid);
        Ok(Some(Justified::Proved(jcid)))
    }

    fn retry_monolithic(
        &mut self,
        cnf: &mut CnfReasoner,
        rlit: i32,
        splitting_literal: i32,
        reason: &str,
    ) -> CpogResult<Option<Justified>> {
        log::warn!(
            "structural proof failed at node {} ({}); trying monolithic",
            var_of(rlit),
            reason
        );
        let result = self.justify_monolithic(cnf, rlit, splitting_literal)?;
        match result {
            Some(Justified::Proved(cid)) => {
                log::info!(
                    "monolithic proof succeeded at node {}, justifying id {}",
                    var_of(rlit),
                    cid
                );
            }
            _ => log::error!("monolithic proof also failed at node {}", var_of(rlit)),
        }
        Ok(result)
    }

    /// Collect the defining clauses of the subgraph rooted at `rlit`
    /// into the reduced CNF, each simplified by the given units. Skolem
    /// nodes contribute only their unit clause.
    pub(crate) fn export_subgraph(
        &self,
        cnf: &CnfReasoner,
        rlit: i32,
        rcnf: &mut CnfReduced,
        unit_literals: &FxHashSet<i32>,
        sofar: &mut FxHashSet<i32>,
    ) -> CpogResult<()> {
        let rvar = var_of(rlit);
        if !self.is_node(rlit) || sofar.contains(&rvar) {
            return Ok(());
        }
        sofar.insert(rvar);
        let node = self.node(rvar);
        if node.ntype == NodeType::Skolem {
            rcnf.add_clause(&Clause::unit(node.xvar), unit_literals, node.defining_cid);
            return Ok(());
        }
        let children = node.children.clone();
        let degree = children.len();
        let start_cid = node.defining_cid;
        for clit in children {
            self.export_subgraph(cnf, clit, rcnf, unit_literals, sofar)?;
        }
        for i in 0..=degree {
            let cid = start_cid + i;
            let clause = cnf.get_clause(cid)?;
            rcnf.add_clause(clause, unit_literals, cid);
        }
        Ok(())
    }

    /// Justify a subgraph with a single call to the hinting solver: the
    /// active clauses plus the subgraph's defining clauses, under the
    /// negated root, refute; every LRAT step is replayed with remapped
    /// hints widened by the context.
    pub fn justify_monolithic(
        &mut self,
        cnf: &mut CnfReasoner,
        rlit: i32,
        splitting_literal: i32,
    ) -> CpogResult<Option<Justified>> {
        if !self.is_node(rlit) {
            return match cnf.validate_literal(rlit, ValidationMode::Full)? {
                Some(cid) => Ok(Some(Justified::Proved(cid))),
                None => {
                    log::error!("validation of literal {} failed", rlit);
                    Ok(None)
                }
            };
        }
        let rvar = var_of(rlit);
        let tree_size = self.node(rvar).tree_size;
        cnf.new_context();
        cnf.push_assigned_literal(-rlit);
        if splitting_literal != 0 {
            cnf.push_assigned_literal(splitting_literal);
        }
        cnf.comment(&format!(
            "Preparing CNF to monolithically justify root node {} (tree size {})",
            rvar, tree_size
        ))?;
        let mut rcnf = cnf.extract_cnf()?;
        let input_clause_count = rcnf.clause_count();
        let units = cnf.unit_literals().clone();
        let mut sofar = FxHashSet::default();
        self.export_subgraph(cnf, rlit, &mut rcnf, &units, &mut sofar)?;
        cnf.stats.sat_calls += 1;
        if !rcnf.run_hinting_solver()? {
            log::warn!(
                "running SAT solver failed while justifying subgraph with root {}",
                rvar
            );
            cnf.pop_context();
            return Ok(None);
        }
        let fname = rcnf.file_name();
        cnf.comment(&format!(
            "Ran SAT solver on file {} ({} input clauses, {} defining clauses) to justify node {}",
            fname,
            input_clause_count,
            rcnf.clause_count() - input_clause_count,
            rvar
        ))?;
        let start_id = cnf.clause_count() + cnf.proof_size() + 1;
        let mut jcid = 0;
        loop {
            let hints = rcnf.get_proof_hint(start_id);
            let Some(clause) = rcnf.get_proof_clause(&cnf.assigned_literals().to_vec()) else {
                break;
            };
            let hints = hints.unwrap_or_default();
            let real_units = cnf.filter_units(&clause, &hints)?;
            jcid = cnf.start_assertion(clause, false)?;
            for ulit in real_units {
                if let Some(hid) = cnf.justifying_id(ulit) {
                    if hid != jcid {
                        cnf.add_hint(hid)?;
                    }
                }
            }
            cnf.add_hints(&hints)?;
            cnf.finish_command(true)?;
            cnf.stats.monolithic_clauses += 1;
            cnf.stats.addition_hints += hints.literals().len();
        }
        cnf.pop_context();
        cnf.comment(&format!(
            "End of proof clauses from SAT solver running on file {}",
            fname
        ))?;
        if jcid == 0 {
            return Ok(None);
        }
        log::debug!("subgraph with root {} justified by clause {}", rlit, jcid);
        Ok(Some(Justified::Proved(jcid)))
    }

    /// Hints proving the two children of an OR node mutually exclusive.
    /// A syntactic splitting literal yields the children's own defining
    /// clauses; otherwise the solver refutes the conjunction of both
    /// children and the final structural assertion is the hint.
    pub(crate) fn justify_mutex(
        &mut self,
        cnf: &mut CnfReasoner,
        node_idx: usize,
    ) -> CpogResult<Vec<usize>> {
        let clit1 = self.nodes()[node_idx].children[0];
        let clit2 = self.nodes()[node_idx].children[1];
        let xvar = self.nodes()[node_idx].xvar;
        let splitting_variable = var_of(self.find_splitting_literal(clit1, clit2));
        let mut hints = vec![];
        if splitting_variable != 0 {
            for clit in [clit1, clit2] {
                if self.is_node(clit) {
                    let cnode = self.node(var_of(clit));
                    for (ci, &lit) in cnode.children.iter().enumerate() {
                        if var_of(lit) == splitting_variable {
                            hints.push(cnode.defining_cid + 1 + ci);
                        }
                    }
                }
            }
            return Ok(hints);
        }
        // No decision variable: prove the mutex with the solver
        let mut rcnf = CnfReduced::new(cnf.options.delete_files);
        let mut units = FxHashSet::default();
        units.insert(clit1);
        units.insert(clit2);
        let prefix = vec![clit1, clit2];
        let mut sofar = FxHashSet::default();
        self.export_subgraph(cnf, clit1, &mut rcnf, &units, &mut sofar)?;
        self.export_subgraph(cnf, clit2, &mut rcnf, &units, &mut sofar)?;
        cnf.stats.sat_calls += 1;
        if !rcnf.run_hinting_solver()? {
            return Err(CpogError::SolverPipeline(format!(
                "mutex proof for node {} failed",
                xvar
            )));
        }
        let fname = rcnf.file_name();
        cnf.comment(&format!(
            "Ran SAT solver on file {} ({} defining clauses) to justify mutex for node {}",
            fname,
            rcnf.clause_count(),
            xvar
        ))?;
        let start_id = cnf.clause_count() + cnf.proof_size() + 1;
        let mut jcid = 0;
        loop {
            let step_hints = rcnf.get_proof_hint(start_id);
            let Some(clause) = rcnf.get_proof_clause(&prefix) else {
                break;
            };
            let step_hints = step_hints.unwrap_or_default();
            jcid = cnf.start_assertion(clause, true)?;
            cnf.add_hints(&step_hints)?;
            cnf.finish_command(true)?;
            cnf.stats.mutex_clauses += 1;
        }
        hints.push(jcid);
        cnf.comment(&format!(
            "End of proof clauses from SAT solver on file {} (mutex of node {})",
            fname, xvar
        ))?;
        Ok(hints)
    }

    /// Prove or apply the lemma cached at an OR node. On the first
    /// occurrence the instance becomes the lemma: a context holding only
    /// the activating literals of its argument clauses is set up and the
    /// node proved there. Every occurrence (including the first) then
    /// applies the lemma to its own context.
    fn apply_lemma_at(
        &mut self,
        cnf: &mut CnfReasoner,
        rvar: i32,
        splitting_literal: i32,
    ) -> CpogResult<Option<usize>> {
        let xvar = self.node(rvar).xvar;
        let instance = cnf.extract_lemma(xvar, splitting_literal)?;
        let found = self
            .node(rvar)
            .lemmas
            .iter()
            .position(|l| l.signature == instance.signature);
        let lemma_idx = match found {
            Some(idx) => idx,
            None => {
                // First occurrence: prove the instance as the lemma
                self.node_mut(rvar).lemmas.push(instance.clone());
                let lemma_idx = self.node(rvar).lemmas.len() - 1;
                log::debug!(
                    "setting up lemma for node {} with signature {}",
                    xvar,
                    instance.signature
                );
                cnf.setup_proof(&instance)?;
                let (ntype, tree_size) = {
                    let node = self.node(rvar);
                    (node.ntype, node.tree_size)
                };
                let proved = if self.wants_monolithic(cnf, ntype, tree_size) {
                    self.justify_monolithic(cnf, xvar, instance.splitting_literal)?
                } else {
                    self.justify(cnf, xvar, instance.splitting_literal, false)?
                };
                let jid = proved.and_then(Justified::cid);
                cnf.restore_from_proof(&instance)?;
                match jid {
                    None => {
                        log::error!(
                            "proof of lemma for node {} (signature {}) failed",
                            xvar,
                            instance.signature
                        );
                        return Ok(None);
                    }
                    Some(jid) => {
                        self.node_mut(rvar).lemmas[lemma_idx].jid = jid;
                        cnf.comment(&format!(
                            "Created lemma for node N{}.  Signature = {}.  Justifying clause = {}",
                            xvar, instance.signature, jid
                        ))?;
                        cnf.stats.lemma_definitions += 1;
                    }
                }
                lemma_idx
            }
        };
        let lemma = self.node(rvar).lemmas[lemma_idx].clone();
        if lemma.jid == 0 {
            return Ok(None);
        }
        cnf.stats.lemma_applications += 1;
        cnf.comment(&format!(
            "Applying lemma at node N{}.  Signature = {}",
            xvar, lemma.signature
        ))?;
        let jid = cnf.apply_lemma(&lemma, &instance)?;
        if jid.is_none() {
            log::error!(
                "application of lemma at node {} (signature {}) failed",
                xvar,
                lemma.signature
            );
        }
        Ok(jid)
    }

    /// Emit the refutation of an unsatisfiable input formula. When BCP
    /// already derived the empty clause there is nothing to do;
    /// otherwise the solver pipeline supplies the steps.
    pub fn justify_unsatisfiable(&mut self, cnf: &mut CnfReasoner) -> CpogResult<()> {
        if cnf.is_unsatisfiable() {
            return Ok(());
        }
        let mut rcnf = cnf.extract_cnf()?;
        cnf.stats.sat_calls += 1;
        if !rcnf.run_hinting_solver()? {
            return Err(CpogError::SolverPipeline(
                "could not generate proof of unsatisfiability".to_string(),
            ));
        }
        cnf.comment("Proof of unsatisfiability")?;
        let start_id = cnf.clause_count() + cnf.proof_size() + 1;
        loop {
            let hints = rcnf.get_proof_hint(start_id);
            let Some(clause) = rcnf.get_proof_clause(&[]) else {
                break;
            };
            let hints = hints.unwrap_or_default();
            let real_units = cnf.filter_units(&clause, &hints)?;
            let jcid = cnf.start_assertion(clause, false)?;
            let mut seen: FxHashSet<usize> = hints
                .literals()
                .iter()
                .map(|&h| h as usize)
                .collect();
            for ulit in real_units {
                if let Some(hid) = cnf.justifying_id(ulit) {
                    if hid != jcid && seen.insert(hid) {
                        cnf.add_hint(hid)?;
                    }
                }
            }
            cnf.add_hints(&hints)?;
            cnf.finish_command(true)?;
            cnf.stats.unsat_clauses += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_justify {
    use super::*;
    use crate::common::ProofOptions;
    use crate::parsers::{cnf_from_dimacs, parse_d4};
    use crate::writer::CpogWriter;
    use std::io::{Cursor, Read, Seek};

    fn structural_options() -> ProofOptions {
        // Force the structural path: no monolithic shortcut, no solver
        ProofOptions {
            monolithic_threshold: 0,
            tree_ratio_threshold: -1.0,
            ..ProofOptions::default()
        }
    }

    fn run_to_justified_root(
        cnf_text: &str,
        nnf_text: &str,
        options: ProofOptions,
    ) -> (Pog, CnfReasoner, std::fs::File, usize) {
        let file = tempfile::tempfile().unwrap();
        let cnf = cnf_from_dimacs(Cursor::new(cnf_text)).unwrap();
        let writer = CpogWriter::new(Box::new(file.try_clone().unwrap()));
        let mut reasoner = CnfReasoner::new(cnf, writer, options);
        reasoner.enable_pog().unwrap();
        let mut pog = Pog::new(&reasoner);
        let lines = parse_d4(Cursor::new(nnf_text)).unwrap();
        pog.read_d4(&lines, &mut reasoner).unwrap();
        pog.prepare(&mut reasoner).unwrap();
        let root = pog.root();
        let justified = pog.justify(&mut reasoner, root, 0, true).unwrap();
        let jcid = match justified {
            Some(Justified::Proved(cid)) => cid,
            other => panic!("root not justified: {:?}", other),
        };
        (pog, reasoner, file, jcid)
    }

    fn proof_text(mut file: std::fs::File, reasoner: &mut CnfReasoner) -> String {
        reasoner.writer().flush().unwrap();
        file.rewind().unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn justifies_decision_or_root_structurally() {
        let (pog, mut reasoner, file, jcid) = run_to_justified_root(
            "p cnf 2 1\n1 2 0\n",
            "o 1 0\no 2 0\nt 3 0\n1 2 0\n2 3 1 0\n2 3 -1 2 0\n",
            structural_options(),
        );
        // Root unit clause asserted
        let root_clause = reasoner.get_clause(jcid).unwrap();
        assert_eq!(&[pog.root()], root_clause.literals());
        assert_eq!(0, reasoner.stats.sat_calls);
        let text = proof_text(file, &mut reasoner);
        assert!(text.contains(&format!("r {}", pog.root())));
        // One product, one sum declaration
        assert!(text.lines().any(|l| l.split_whitespace().nth(1) == Some("p")));
        assert!(text.lines().any(|l| l.split_whitespace().nth(1) == Some("s")));
    }

    #[test]
    fn justifies_skolem_node_with_defining_hint() {
        // Projected: show 1, variable 2 eliminated
        let (pog, mut reasoner, file, _jcid) = run_to_justified_root(
            "c t pmc\nc p show 1 0\np cnf 2 2\n1 2 0\n1 -2 0\n",
            "o 1 0\nt 2 0\n1 2 1 2 0\n",
            structural_options(),
        );
        assert!(pog
            .nodes()
            .iter()
            .any(|n| n.ntype == NodeType::Skolem));
        assert_eq!(0, reasoner.stats.sat_calls);
        let text = proof_text(file, &mut reasoner);
        assert!(text.lines().any(|l| l.split_whitespace().nth(1) == Some("t")));
    }

    #[test]
    fn true_root_proof_is_single_unit_assertion() {
        let (pog, mut reasoner, file, jcid) =
            run_to_justified_root("p cnf 1 0\n", "t 1 0\n", structural_options());
        let root_clause = reasoner.get_clause(jcid).unwrap();
        assert_eq!(&[pog.root()], root_clause.literals());
        let text = proof_text(file, &mut reasoner);
        // Empty product declaration plus its RUP'd unit assertion
        assert!(text.contains(&format!("r {}", pog.root())));
        assert!(text.lines().any(|l| l.split_whitespace().nth(1) == Some("a")));
    }

    #[test]
    fn mutex_hints_come_from_split_children() {
        let cnf = cnf_from_dimacs(Cursor::new("p cnf 2 1\n1 2 0\n")).unwrap();
        let writer = CpogWriter::new(Box::new(std::io::sink()));
        let mut reasoner = CnfReasoner::new(cnf, writer, structural_options());
        reasoner.enable_pog().unwrap();
        let mut pog = Pog::new(&reasoner);
        let lines = parse_d4(Cursor::new(
            "o 1 0\no 2 0\nt 3 0\n1 2 0\n2 3 1 0\n2 3 -1 2 0\n",
        ))
        .unwrap();
        pog.read_d4(&lines, &mut reasoner).unwrap();
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        pog.concretize(&mut reasoner).unwrap();
        // OR node is index 1; its AND child holds -1 at position 0
        let and_defining = pog.nodes()[0].defining_cid;
        let hints = pog.justify_mutex(&mut reasoner, 1).unwrap();
        assert_eq!(vec![and_defining + 1], hints);
    }

    #[test]
    fn shared_or_node_is_proved_once_via_lemma() {
        // (1 v 3 v 4)(-1 v 3 v 4): both branches of the decision on 1
        // share the sub-DAG encoding 3 v 4
        let cnf_text = "p cnf 4 2\n1 3 4 0\n-1 3 4 0\n";
        let nnf_text =
            "o 1 0\no 2 0\no 3 0\nt 4 0\n1 2 0\n2 3 1 0\n2 3 -1 0\n3 4 3 0\n3 4 -3 4 0\n";
        let (pog, reasoner, _file, _jcid) = run_to_justified_root(
            cnf_text,
            nnf_text,
            ProofOptions {
                use_lemmas: true,
                ..structural_options()
            },
        );
        assert_eq!(0, reasoner.stats.sat_calls);
        assert_eq!(1, reasoner.stats.lemma_definitions);
        assert!(reasoner.stats.lemma_applications >= 2);
        // The shared OR node carries exactly one cached lemma
        let shared = pog
            .nodes()
            .iter()
            .filter(|n| n.ntype == NodeType::Or && n.indegree >= 2)
            .collect::<Vec<_>>();
        assert_eq!(1, shared.len());
        assert_eq!(1, shared[0].lemmas.len());
        assert!(shared[0].lemmas[0].jid > 0);
    }
}
