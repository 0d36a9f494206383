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

//! End-to-end proof generation over the instances in `tests/instances`,
//! replayed through a small RUP checker: every assertion and deletion in
//! the emitted CPOG stream must be derivable by unit propagation from its
//! hint clauses alone. The instances are chosen so that no external SAT
//! solver is needed.

use std::collections::HashMap;
use std::path::PathBuf;

use rustc_hash::FxHashSet;

use certipog::common::ProofOptions;
use certipog::{generate, GenerateStatus};

use paste::paste;

/// Replays a CPOG stream. Clause ids 1..=n are the input clauses; every
/// directive adds, checks, or deletes clauses.
struct ProofChecker {
    clauses: HashMap<usize, Vec<i32>>,
    input_count: usize,
    root: Option<i32>,
}

impl ProofChecker {
    fn new(cnf_text: &str) -> Self {
        let mut clauses = HashMap::new();
        let mut pending: Vec<i32> = vec![];
        let mut cid = 0;
        for line in cnf_text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') || line.starts_with('p') {
                continue;
            }
            for token in line.split_whitespace() {
                let lit: i32 = token.parse().expect("bad CNF literal");
                if lit == 0 {
                    cid += 1;
                    clauses.insert(cid, pending.clone());
                    pending.clear();
                } else {
                    pending.push(lit);
                }
            }
        }
        Self {
            clauses,
            input_count: cid,
            root: None,
        }
    }

    /// One step of reverse unit propagation over the listed hints.
    fn check_rup(&self, target: &[i32], hints: &[usize]) -> Result<(), String> {
        let mut assigned: FxHashSet<i32> = target.iter().map(|l| -l).collect();
        if target.iter().any(|l| target.contains(&-l)) {
            // Tautology, nothing to derive
            return Ok(());
        }
        for &hid in hints {
            let clause = self
                .clauses
                .get(&hid)
                .ok_or_else(|| format!("hint #{} does not exist", hid))?;
            let mut unit = 0;
            let mut free = 0;
            let mut satisfied = false;
            for &lit in clause {
                if assigned.contains(&lit) {
                    satisfied = true;
                    break;
                }
                if !assigned.contains(&-lit) {
                    free += 1;
                    unit = lit;
                }
            }
            if satisfied {
                return Err(format!("hint #{} is satisfied, not unit", hid));
            }
            match free {
                0 => return Ok(()), // conflict; early exit permitted
                1 => {
                    assigned.insert(unit);
                }
                _ => return Err(format!("hint #{} is neither unit nor conflict", hid)),
            }
        }
        Err(format!(
            "hints {:?} produced no conflict for {:?}",
            hints, target
        ))
    }

    fn check_proof(&mut self, proof_text: &str) -> Result<(), String> {
        for line in proof_text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() || fields[0] == "c" {
                continue;
            }
            match fields[0] {
                "r" => {
                    self.root = Some(fields[1].parse().map_err(|_| "bad root")?);
                }
                "d" => {
                    let ids = parse_ids(&fields[1..])?;
                    let cid = ids[0];
                    let target = self
                        .clauses
                        .get(&cid)
                        .ok_or_else(|| format!("deleting unknown clause #{}", cid))?
                        .clone();
                    self.check_rup(&target, &ids[1..])
                        .map_err(|e| format!("deletion of #{}: {}", cid, e))?;
                    self.clauses.remove(&cid);
                }
                "D" => {
                    for cid in parse_ids(&fields[1..])? {
                        self.clauses.remove(&cid);
                    }
                }
                _ => {
                    let cid: usize = fields[0]
                        .parse()
                        .map_err(|_| format!("bad directive: {}", line))?;
                    match fields[1] {
                        "a" | "as" => {
                            let rest = parse_lits(&fields[2..])?;
                            let (lits, hint_part) = rest
                                .split_first_zero()
                                .ok_or_else(|| format!("missing separator: {}", line))?;
                            let hint_end = hint_part
                                .iter()
                                .position(|&v| v == 0)
                                .unwrap_or(hint_part.len());
                            let hints: Vec<usize> = hint_part[..hint_end]
                                .iter()
                                .map(|&h| h as usize)
                                .collect();
                            self.check_rup(&lits, &hints)
                                .map_err(|e| format!("assertion #{}: {}", cid, e))?;
                            self.clauses.insert(cid, lits);
                        }
                        "p" => {
                            let numbers = parse_lits(&fields[2..])?;
                            let (body, _) = numbers
                                .split_first_zero()
                                .ok_or_else(|| format!("unterminated: {}", line))?;
                            let (xvar, args) = (body[0], &body[1..]);
                            let mut forward = vec![xvar];
                            forward.extend(args.iter().map(|a| -a));
                            self.clauses.insert(cid, forward);
                            for (i, &arg) in args.iter().enumerate() {
                                self.clauses.insert(cid + i + 1, vec![-xvar, arg]);
                            }
                        }
                        "s" | "S" => {
                            let numbers = parse_lits(&fields[2..])?;
                            let (body, _) = numbers
                                .split_first_zero()
                                .ok_or_else(|| format!("unterminated: {}", line))?;
                            let xvar = body[0];
                            let (args, mutex_hints) = if fields[1] == "s" {
                                (&body[1..3], &body[3..])
                            } else {
                                (&body[1..], &body[..0])
                            };
                            if fields[1] == "s" {
                                // Children must be mutually exclusive
                                let target: Vec<i32> = args.iter().map(|a| -a).collect();
                                let hints: Vec<usize> =
                                    mutex_hints.iter().map(|&h| h as usize).collect();
                                self.check_rup(&target, &hints)
                                    .map_err(|e| format!("mutex of node {}: {}", xvar, e))?;
                            }
                            let mut forward = vec![-xvar];
                            forward.extend(args.iter().copied());
                            self.clauses.insert(cid, forward);
                            for (i, &arg) in args.iter().enumerate() {
                                self.clauses.insert(cid + i + 1, vec![xvar, -arg]);
                            }
                        }
                        "t" => {
                            let numbers = parse_lits(&fields[2..])?;
                            let (body, _) = numbers
                                .split_first_zero()
                                .ok_or_else(|| format!("unterminated: {}", line))?;
                            let (xvar, args) = (body[0], &body[1..]);
                            self.clauses.insert(cid, vec![xvar]);
                            // The reverse clauses occupy the rest of the
                            // block whether or not they are materialized
                            for (i, &arg) in args.iter().enumerate() {
                                self.clauses.insert(cid + i + 1, vec![-xvar, arg]);
                            }
                        }
                        other => return Err(format!("unknown directive '{}'", other)),
                    }
                }
            }
        }
        Ok(())
    }

    fn input_clauses_remaining(&self) -> usize {
        (1..=self.input_count)
            .filter(|cid| self.clauses.contains_key(cid))
            .count()
    }

    fn has_unit(&self, lit: i32) -> bool {
        self.clauses.values().any(|c| c.as_slice() == [lit])
    }

    fn has_empty_clause(&self) -> bool {
        self.clauses.values().any(|c| c.is_empty())
    }
}

trait SplitFirstZero {
    fn split_first_zero(&self) -> Option<(Vec<i32>, &[i32])>;
}

impl SplitFirstZero for Vec<i32> {
    fn split_first_zero(&self) -> Option<(Vec<i32>, &[i32])> {
        let pos = self.iter().position(|&v| v == 0)?;
        Some((self[..pos].to_vec(), &self[pos + 1..]))
    }
}

fn parse_ids(fields: &[&str]) -> Result<Vec<usize>, String> {
    let mut ids = vec![];
    for token in fields {
        let value: i64 = token.parse().map_err(|_| format!("bad id '{}'", token))?;
        if value == 0 {
            return Ok(ids);
        }
        ids.push(value as usize);
    }
    Err("id list not terminated".to_string())
}

fn parse_lits(fields: &[&str]) -> Result<Vec<i32>, String> {
    fields
        .iter()
        .map(|token| {
            token
                .parse::<i32>()
                .map_err(|_| format!("bad literal '{}'", token))
        })
        .collect()
}

fn instance_path(name: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("tests/instances/{}.{}", name, suffix))
}

fn structural_options() -> ProofOptions {
    // Keep every proof structural so no SAT solver is spawned
    ProofOptions {
        monolithic_threshold: 0,
        tree_ratio_threshold: -1.0,
        ..ProofOptions::default()
    }
}

fn run_instance(name: &str, options: ProofOptions) -> (GenerateStatus, i32, ProofChecker) {
    let out = tempfile::Builder::new()
        .prefix("certipog-test-")
        .suffix(".cpog")
        .tempfile()
        .unwrap();
    let report = generate(
        &instance_path(name, "cnf"),
        &instance_path(name, "nnf"),
        out.path(),
        options,
    )
    .unwrap();
    let cnf_text = std::fs::read_to_string(instance_path(name, "cnf")).unwrap();
    let proof_text = std::fs::read_to_string(out.path()).unwrap();
    let mut checker = ProofChecker::new(&cnf_text);
    checker
        .check_proof(&proof_text)
        .unwrap_or_else(|e| panic!("proof for {} fails RUP replay: {}\n{}", name, e, proof_text));
    (report.status, report.root_literal, checker)
}

macro_rules! proved_instance_tests {
    ($($name:ident,)*) => {
        $(
            paste! {
                #[test]
                fn [<proof_verifies_ $name>]() {
                    let (status, root, checker) =
                        run_instance(stringify!($name), structural_options());
                    assert_eq!(GenerateStatus::Proved, status);
                    assert_eq!(Some(root), checker.root);
                    assert!(checker.has_unit(root), "root unit clause missing");
                    assert_eq!(0, checker.input_clauses_remaining());
                }
            }
        )*
    }
}

proved_instance_tests! {
    simple_or,
    chain,
    projected,
    shared,
    single_literal,
}

#[test]
fn unsatisfiable_formula_ends_with_empty_clause() {
    let (status, _, checker) = run_instance("unsat", structural_options());
    assert_eq!(GenerateStatus::Unsatisfiable, status);
    assert!(checker.has_empty_clause());
}

#[test]
fn overcounting_circuit_is_rejected() {
    let (status, _, checker) = run_instance("overcount", structural_options());
    assert_eq!(GenerateStatus::Overcount, status);
    // The offending input clause is never deleted
    assert!(checker.input_clauses_remaining() > 0);
}

#[test]
fn weak_sums_skip_the_mutex_proof() {
    let options = ProofOptions {
        weak_sum: true,
        ..structural_options()
    };
    let out = tempfile::Builder::new()
        .prefix("certipog-test-")
        .suffix(".cpog")
        .tempfile()
        .unwrap();
    let report = generate(
        &instance_path("simple_or", "cnf"),
        &instance_path("simple_or", "nnf"),
        out.path(),
        options,
    )
    .unwrap();
    assert_eq!(GenerateStatus::Proved, report.status);
    let proof_text = std::fs::read_to_string(out.path()).unwrap();
    assert!(proof_text
        .lines()
        .any(|l| l.split_whitespace().nth(1) == Some("S")));
    let cnf_text = std::fs::read_to_string(instance_path("simple_or", "cnf")).unwrap();
    let mut checker = ProofChecker::new(&cnf_text);
    checker.check_proof(&proof_text).unwrap();
    assert_eq!(0, checker.input_clauses_remaining());
}

#[test]
fn rup_deletion_mode_verifies_too() {
    let options = ProofOptions {
        rup_deletion: true,
        ..structural_options()
    };
    let (status, root, checker) = run_instance("simple_or", options);
    assert_eq!(GenerateStatus::Proved, status);
    assert!(checker.has_unit(root));
    assert_eq!(0, checker.input_clauses_remaining());
}

#[test]
fn explicit_deletion_materializes_skolem_clauses() {
    let options = ProofOptions {
        use_explicit_deletion: true,
        ..structural_options()
    };
    let out = tempfile::Builder::new()
        .prefix("certipog-test-")
        .suffix(".cpog")
        .tempfile()
        .unwrap();
    let report = generate(
        &instance_path("projected", "cnf"),
        &instance_path("projected", "nnf"),
        out.path(),
        options,
    )
    .unwrap();
    assert_eq!(GenerateStatus::Proved, report.status);
    let proof_text = std::fs::read_to_string(out.path()).unwrap();
    let cnf_text = std::fs::read_to_string(instance_path("projected", "cnf")).unwrap();
    let mut checker = ProofChecker::new(&cnf_text);
    checker.check_proof(&proof_text).unwrap();
    assert_eq!(0, checker.input_clauses_remaining());
}

#[test]
fn lemma_reuse_keeps_the_proof_small() {
    // The shared OR subgraph is proved once; each extra site costs a
    // bounded number of clauses
    let (status, _, _) = run_instance("shared", structural_options());
    assert_eq!(GenerateStatus::Proved, status);
    let no_lemmas = ProofOptions {
        use_lemmas: false,
        ..structural_options()
    };
    let (status, _, _) = run_instance("shared", no_lemmas);
    assert_eq!(GenerateStatus::Proved, status);
}
