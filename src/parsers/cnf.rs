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

//! Reader for standard DIMACS CNF with the model-counting comment
//! directives:
//!
//! ```text
//! c t pmc
//! c p show 1 3 0
//! p cnf 4 2
//! 1 3 0
//! -1 4 0
//! ```
//!
//! `c p show` declares the data (non-projected) variables; `c t pmc` or
//! `c t pwmc` marks a projected instance. Clauses are 0-terminated and may
//! span lines.

use std::io::BufRead;

use rustc_hash::FxHashSet;

use crate::cnf::Cnf;
use crate::core::clause::Clause;
use crate::errors::{CpogError, CpogResult};

pub fn cnf_from_dimacs<R: BufRead>(reader: R) -> CpogResult<Cnf> {
    let mut expected_vars: Option<i32> = None;
    let mut expected_clauses: Option<usize> = None;
    let mut data_variables: Option<FxHashSet<i32>> = None;
    let mut projected = false;
    let mut clauses: Vec<Clause> = vec![];
    let mut pending: Vec<i32> = vec![];

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        let lineno = lineno + 1;
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('c') {
            process_comment(rest, &mut data_variables, &mut projected, lineno)?;
            continue;
        }
        if let Some(rest) = line.strip_prefix('p') {
            let mut tokens = rest.split_whitespace();
            if tokens.next() != Some("cnf") {
                return Err(CpogError::MalformedCnf(format!(
                    "line {}: header type is not 'cnf'",
                    lineno
                )));
            }
            let nvar = parse_token::<i32>(tokens.next(), "variable count", lineno)?;
            let nclause = parse_token::<usize>(tokens.next(), "clause count", lineno)?;
            expected_vars = Some(nvar);
            expected_clauses = Some(nclause);
            continue;
        }
        if expected_vars.is_none() {
            return Err(CpogError::MalformedCnf(format!(
                "line {}: clause data before 'p cnf' header",
                lineno
            )));
        }
        for token in line.split_whitespace() {
            let lit: i32 = token.parse().map_err(|_| {
                CpogError::MalformedCnf(format!("line {}: bad literal '{}'", lineno, token))
            })?;
            if lit == 0 {
                let mut clause = Clause::from_lits(&pending);
                clause.canonize();
                clauses.push(clause);
                pending.clear();
            } else {
                pending.push(lit);
            }
        }
    }
    if !pending.is_empty() {
        return Err(CpogError::MalformedCnf(
            "last clause is not 0-terminated".to_string(),
        ));
    }
    let expected_vars =
        expected_vars.ok_or_else(|| CpogError::MalformedCnf("no header line found".to_string()))?;
    let max_seen = clauses.iter().map(Clause::max_variable).max().unwrap_or(0);
    if max_seen > expected_vars {
        return Err(CpogError::MalformedCnf(format!(
            "encountered variable {}, but header declares max {}",
            max_seen, expected_vars
        )));
    }
    if let Some(expected) = expected_clauses {
        if clauses.len() != expected {
            return Err(CpogError::MalformedCnf(format!(
                "read {} clauses, header declares {}",
                clauses.len(),
                expected
            )));
        }
    }
    if let Some(show) = data_variables.as_ref() {
        if let Some(&bad) = show.iter().find(|v| **v <= 0 || **v > expected_vars) {
            return Err(CpogError::MalformedCnf(format!(
                "show variable {} out of range 1..{}",
                bad, expected_vars
            )));
        }
    }
    Ok(Cnf::new(clauses, expected_vars, data_variables, projected))
}

fn process_comment(
    rest: &str,
    data_variables: &mut Option<FxHashSet<i32>>,
    projected: &mut bool,
    lineno: usize,
) -> CpogResult<()> {
    let mut tokens = rest.split_whitespace();
    match tokens.next() {
        Some("p") => {
            if tokens.next() == Some("show") {
                let vars = data_variables.get_or_insert_with(FxHashSet::default);
                for token in tokens {
                    let var: i32 = token.parse().map_err(|_| {
                        CpogError::MalformedCnf(format!(
                            "line {}: bad show variable '{}'",
                            lineno, token
                        ))
                    })?;
                    if var == 0 {
                        break;
                    }
                    vars.insert(var);
                }
            }
        }
        Some("t") => {
            if matches!(tokens.next(), Some("pmc") | Some("pwmc")) {
                *projected = true;
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_token<T: std::str::FromStr>(
    token: Option<&str>,
    what: &str,
    lineno: usize,
) -> CpogResult<T> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| CpogError::MalformedCnf(format!("line {}: missing {}", lineno, what)))
}

#[cfg(test)]
mod test_cnf_parser {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_plain_cnf() {
        let text = "c a comment\np cnf 3 2\n1 -2 0\n2 3 0\n";
        let cnf = cnf_from_dimacs(Cursor::new(text)).unwrap();
        assert_eq!(2, cnf.clause_count());
        assert_eq!(3, cnf.max_variable());
        assert_eq!(&[1, -2], cnf.get_input_clause(1).unwrap().literals());
        assert!(cnf.data_variables().is_none());
    }

    #[test]
    fn reads_show_and_type_directives() {
        let text = "c t pmc\nc p show 1 3 0\np cnf 3 1\n1 2 3 0\n";
        let cnf = cnf_from_dimacs(Cursor::new(text)).unwrap();
        assert!(cnf.is_projected());
        let show = cnf.data_variables().unwrap();
        assert!(show.contains(&1) && show.contains(&3) && !show.contains(&2));
    }

    #[test]
    fn clauses_may_span_lines() {
        let text = "p cnf 4 2\n1 2\n-3 0 4\n0\n";
        let cnf = cnf_from_dimacs(Cursor::new(text)).unwrap();
        assert_eq!(2, cnf.clause_count());
        assert_eq!(&[1, 2, -3], cnf.get_input_clause(1).unwrap().literals());
        assert_eq!(&[4], cnf.get_input_clause(2).unwrap().literals());
    }

    #[test]
    fn rejects_count_mismatch() {
        let text = "p cnf 2 2\n1 0\n";
        assert!(cnf_from_dimacs(Cursor::new(text)).is_err());
    }

    #[test]
    fn rejects_variable_out_of_range() {
        let text = "p cnf 2 1\n1 5 0\n";
        assert!(cnf_from_dimacs(Cursor::new(text)).is_err());
    }
}
