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

//! Deletion of the input clauses, the second half of the equivalence
//! proof: once the root unit holds, every input clause must be implied
//! by the root's sub-function. The structural prover labels each node
//! bottom-up with whether it entails the clause and emits a hint chain
//! from the labelling; when the root is not labelled, a partial
//! assignment satisfying the POG but falsifying the clause is
//! synthesised and reported. The alternative RUP prover deactivates the
//! input clauses and validates each deletion by unit propagation over
//! the root unit and the defining clauses.

use crate::cnf::reasoner::CnfReasoner;
use crate::core::clause::LiteralSet;
use crate::core::literal::var_of;
use crate::core::watcher::Watcher;
use crate::errors::{CpogError, CpogResult};

use super::{NodeType, Pog};

const LITERALS_PER_LINE: usize = 25;

/// Print a partial assignment in `s ... 0` solution lines.
fn print_solution(literals: &[i32]) {
    for (i, chunk) in literals.chunks(LITERALS_PER_LINE).enumerate() {
        let body: Vec<String> = chunk.iter().map(i32::to_string).collect();
        let last = (i + 1) * LITERALS_PER_LINE >= literals.len();
        println!("s {}{}", body.join(" "), if last { " 0" } else { "" });
    }
    if literals.is_empty() {
        println!("s 0");
    }
}

impl Pog {
    /// Delete all input clauses, in id order. Returns false when some
    /// clause is not implied by the root (an overcount); remaining
    /// deletions are skipped and the counter-model printed.
    pub fn delete_input_clauses(
        &mut self,
        cnf: &mut CnfReasoner,
        unit_cid: usize,
    ) -> CpogResult<bool> {
        if cnf.options.rup_deletion {
            return self.delete_input_clauses_rup(cnf, unit_cid);
        }
        cnf.comment("Delete input clauses")?;
        let mut lset = LiteralSet::new(cnf.max_variable() as usize);
        let mut overcount_literals: Vec<i32> = vec![];
        for cid in 1..=cnf.clause_count() {
            let deleted =
                self.delete_input_clause(cnf, cid, unit_cid, &mut lset, &mut overcount_literals)?;
            if !deleted {
                if !overcount_literals.is_empty() {
                    log::error!(
                        "OVERCOUNT: partial assignment contradicting clause #{}",
                        cid
                    );
                    print_solution(&overcount_literals);
                    if let Some(data) = cnf.cnf().data_variables() {
                        let mut data_literals = overcount_literals.clone();
                        data_literals.retain(|lit| data.contains(&var_of(*lit)));
                        log::error!("data variable assignment:");
                        print_solution(&data_literals);
                    }
                } else {
                    log::error!("OVERCOUNT on clause #{}: no counterexample found", cid);
                }
                log::error!("skipping remaining deletions");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Label every node with whether its sub-function entails the
    /// clause, collecting one hint per node on the implication path,
    /// then emit the deletion. AND/Skolem nodes imply when some child
    /// does (hint: that child's reverse clause); OR nodes imply when
    /// both children do (hint: the node's forward clause).
    fn delete_input_clause(
        &self,
        cnf: &mut CnfReasoner,
        cid: usize,
        unit_cid: usize,
        lset: &mut LiteralSet,
        overcount_literals: &mut Vec<i32>,
    ) -> CpogResult<bool> {
        let mut clause = cnf.get_clause(cid)?.clone();
        let mut dvp: Vec<usize> = vec![cid];
        if clause.tautology() {
            cnf.writer().clause_deletion(&dvp)?;
            return Ok(true);
        }
        lset.load_clause(&clause);
        dvp.push(unit_cid);
        let mut implies_clause = vec![false; self.node_count()];
        for nidx in 0..self.node_count() {
            let node = &self.nodes()[nidx];
            let mut implies = false;
            match node.ntype {
                NodeType::And | NodeType::True | NodeType::Skolem => {
                    // Some child must imply the clause
                    for (i, &clit) in node.children.iter().enumerate() {
                        implies = if self.is_node(clit) {
                            if clit <= 0 {
                                return Err(CpogError::Invariant(format!(
                                    "invalid node identifier {} while deleting clause #{}",
                                    clit, cid
                                )));
                            }
                            implies_clause[(clit - self.start_extension_var()) as usize]
                        } else {
                            lset.contains(clit)
                        };
                        if implies {
                            dvp.push(node.defining_cid + i + 1);
                            break;
                        }
                    }
                }
                NodeType::Or => {
                    // Both children must imply the clause
                    implies = true;
                    for &clit in node.children.iter() {
                        if self.is_node(clit) {
                            if clit <= 0 {
                                return Err(CpogError::Invariant(format!(
                                    "invalid node identifier {} while deleting clause #{}",
                                    clit, cid
                                )));
                            }
                            implies &=
                                implies_clause[(clit - self.start_extension_var()) as usize];
                        } else {
                            implies &= lset.contains(clit);
                        }
                        if !implies {
                            break;
                        }
                    }
                    if implies {
                        dvp.push(node.defining_cid);
                    }
                }
                NodeType::False => {
                    return Err(CpogError::Invariant(format!(
                        "constant FALSE node {} during deletion",
                        node.xvar
                    )));
                }
            }
            implies_clause[nidx] = implies;
        }
        let proved = *implies_clause.last().unwrap_or(&false);
        if proved {
            cnf.writer().clause_deletion(&dvp)?;
            cnf.stats.deletion_hints += dvp.len() - 1;
        } else if !self.get_deletion_counterexample(cnf, cid, &implies_clause, overcount_literals)? {
            log::error!(
                "clause #{}: no deletion proof, but counterexample generation also failed",
                cid
            );
        }
        Ok(proved)
    }

    /// Build a partial assignment satisfying the POG while falsifying
    /// the clause: falsify the clause's literals, then walk the marked
    /// subgraph top-down, satisfying every child of AND/Skolem nodes and
    /// picking a non-implying branch at OR nodes.
    fn get_deletion_counterexample(
        &self,
        cnf: &CnfReasoner,
        cid: usize,
        implies_clause: &[bool],
        literals: &mut Vec<i32>,
    ) -> CpogResult<bool> {
        log::info!("creating overcount counterexample for clause #{}", cid);
        let mut subgraph_node = vec![false; self.node_count()];
        // 0 = free, 1 = positive, -1 = negative
        let mut assignment = vec![0i32; self.max_input_var() as usize];
        let clause = cnf.get_clause(cid)?;
        let mut success = true;
        for lit in clause.iter() {
            let phase = if lit > 0 { -1 } else { 1 };
            assignment[var_of(lit) as usize - 1] = phase;
        }
        let last = self.node_count() - 1;
        subgraph_node[last] = true;
        for nidx in (0..self.node_count()).rev() {
            if !subgraph_node[nidx] {
                continue;
            }
            let node = &self.nodes()[nidx];
            match node.ntype {
                NodeType::And | NodeType::True | NodeType::Skolem => {
                    for (i, &clit) in node.children.iter().enumerate() {
                        if self.is_node(clit) {
                            let cidx = (clit - self.start_extension_var()) as usize;
                            if implies_clause[cidx] {
                                log::error!(
                                    "operand {} of node {} is falsified by the clause",
                                    i + 1,
                                    node.name()
                                );
                                success = false;
                            }
                            subgraph_node[cidx] = true;
                        } else {
                            let var = var_of(clit) as usize;
                            let phase = if clit > 0 { 1 } else { -1 };
                            let ophase = assignment[var - 1];
                            if ophase != 0 && ophase != phase {
                                log::error!(
                                    "child literal {} of node {} conflicts with the partial assignment",
                                    clit,
                                    node.name()
                                );
                                success = false;
                            }
                            assignment[var - 1] = phase;
                        }
                    }
                }
                NodeType::Or => {
                    // First child whose implication did not hold
                    let mut found = false;
                    for &clit in node.children.iter() {
                        if self.is_node(clit) {
                            let cidx = (clit - self.start_extension_var()) as usize;
                            if !implies_clause[cidx] {
                                subgraph_node[cidx] = true;
                                found = true;
                                break;
                            }
                        } else {
                            let var = var_of(clit) as usize;
                            let phase = if clit > 0 { 1 } else { -1 };
                            if assignment[var - 1] == 0 {
                                assignment[var - 1] = phase;
                            }
                            if assignment[var - 1] == phase {
                                found = true;
                                break;
                            }
                        }
                    }
                    if !found {
                        log::error!(
                            "node {}: couldn't satisfy either child of the sum",
                            node.name()
                        );
                        return Ok(false);
                    }
                }
                NodeType::False => {
                    return Err(CpogError::Invariant(format!(
                        "constant FALSE node {} in counterexample",
                        node.xvar
                    )));
                }
            }
        }
        literals.clear();
        for var in 1..=self.max_input_var() {
            let phase = assignment[var as usize - 1];
            if phase != 0 {
                literals.push(phase * var);
            }
        }
        Ok(success)
    }

    /// Slower alternative: deactivate the input clauses, activate the
    /// root unit and the defining clauses, and RUP-validate each input
    /// clause's deletion.
    fn delete_input_clauses_rup(
        &mut self,
        cnf: &mut CnfReasoner,
        unit_cid: usize,
    ) -> CpogResult<bool> {
        cnf.comment("Delete input clauses using reverse unit propagation")?;
        let mut watches = Watcher::new();
        cnf.deactivate_all_clauses();
        cnf.activate_clause(unit_cid);
        for nidx in 0..self.node_count() {
            let start_cid = self.nodes()[nidx].defining_cid;
            let degree = self.nodes()[nidx].degree();
            for ci in 0..=degree {
                cnf.activate_clause(start_cid + ci);
            }
        }
        cnf.watches_setup(&mut watches)?;
        let mut hints: Vec<usize> = vec![];
        let mut dvec: Vec<usize> = vec![];
        for cid in 1..=cnf.clause_count() {
            hints.clear();
            let clause = cnf.get_clause(cid)?.clone();
            if cnf
                .rup_validate(&clause, false, &mut watches, &mut hints)?
                .is_none()
            {
                log::warn!("RUP deletion of input clause #{} found no conflict", cid);
            }
            dvec.clear();
            dvec.push(cid);
            dvec.extend(hints.iter().copied());
            cnf.writer().clause_deletion(&dvec)?;
            cnf.stats.deletion_hints += dvec.len() - 1;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod test_deletion {
    use super::*;
    use crate::common::ProofOptions;
    use crate::parsers::{cnf_from_dimacs, parse_d4};
    use crate::pog::justify::Justified;
    use crate::writer::CpogWriter;
    use std::io::{Cursor, Read, Seek};

    fn structural_options() -> ProofOptions {
        ProofOptions {
            monolithic_threshold: 0,
            tree_ratio_threshold: -1.0,
            ..ProofOptions::default()
        }
    }

    fn build(
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
        let jcid = match pog.justify(&mut reasoner, root, 0, true).unwrap() {
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

    const SIMPLE_CNF: &str = "p cnf 2 1\n1 2 0\n";
    const SIMPLE_NNF: &str = "o 1 0\no 2 0\nt 3 0\n1 2 0\n2 3 1 0\n2 3 -1 2 0\n";

    #[test]
    fn structural_deletion_emits_hint_chain() {
        let (mut pog, mut reasoner, file, jcid) =
            build(SIMPLE_CNF, SIMPLE_NNF, structural_options());
        assert!(pog.delete_input_clauses(&mut reasoner, jcid).unwrap());
        let text = proof_text(file, &mut reasoner);
        let deletion = text
            .lines()
            .find(|l| l.starts_with("d "))
            .expect("deletion line");
        let fields: Vec<&str> = deletion.split_whitespace().collect();
        // d 1 <unit> <and reverse> <or forward> 0
        assert_eq!("d", fields[0]);
        assert_eq!("1", fields[1]);
        assert_eq!(jcid.to_string(), fields[2].to_string());
        assert_eq!("0", *fields.last().unwrap());
        assert!(fields.len() >= 5);
    }

    #[test]
    fn overcount_produces_counterexample() {
        // The d-DNNF claims TRUE although the formula forces variable 1
        let (mut pog, mut reasoner, _file, jcid) =
            build("p cnf 1 1\n1 0\n", "t 1 0\n", structural_options());
        assert!(!pog.delete_input_clauses(&mut reasoner, jcid).unwrap());
    }

    #[test]
    fn counterexample_assignment_falsifies_clause() {
        // Root OR(1, AND(-1, 2)) for the FALSE claim (1)(2 v -2)? Use a
        // wrong certificate: d-DNNF of (1 v 2) against CNF demanding 1
        let (mut pog, mut reasoner, _file, _jcid) =
            build("p cnf 2 2\n1 2 0\n1 0\n", SIMPLE_NNF, structural_options());
        // Clause 1 (1 v 2) is implied; clause 2 (1) is not: the branch
        // -1, 2 satisfies the POG but falsifies it
        let mut lset = LiteralSet::new(2);
        let mut overcount = vec![];
        assert!(pog
            .delete_input_clause(&mut reasoner, 1, _jcid, &mut lset, &mut overcount)
            .unwrap());
        assert!(!pog
            .delete_input_clause(&mut reasoner, 2, _jcid, &mut lset, &mut overcount)
            .unwrap());
        assert!(overcount.contains(&-1));
        assert!(overcount.contains(&2));
        let assignment: Vec<i8> = (1..=2)
            .map(|v| {
                if overcount.contains(&v) {
                    1
                } else {
                    0
                }
            })
            .collect();
        assert!(!reasoner.get_clause(2).unwrap().satisfied(&assignment));
    }

    #[test]
    fn rup_deletion_validates_each_clause() {
        let options = ProofOptions {
            rup_deletion: true,
            ..structural_options()
        };
        let (mut pog, mut reasoner, file, jcid) = build(SIMPLE_CNF, SIMPLE_NNF, options);
        assert!(pog.delete_input_clauses(&mut reasoner, jcid).unwrap());
        let text = proof_text(file, &mut reasoner);
        let deletion = text
            .lines()
            .find(|l| l.starts_with("d "))
            .expect("deletion line");
        let fields: Vec<&str> = deletion.split_whitespace().collect();
        assert_eq!("1", fields[1]);
        // RUP hints present between the clause id and the terminator
        assert!(fields.len() > 3);
    }

    #[test]
    fn tautologies_delete_without_hints() {
        let (mut pog, mut reasoner, file, jcid) = build(
            "p cnf 2 2\n1 -1 2 0\n1 2 0\n",
            SIMPLE_NNF,
            structural_options(),
        );
        assert!(pog.delete_input_clauses(&mut reasoner, jcid).unwrap());
        let text = proof_text(file, &mut reasoner);
        assert!(text.lines().any(|l| l == "d 1 0"));
    }
}
