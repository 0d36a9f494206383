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

//! Reader for the D4 text dialect of decision-DNNF files. Node lines carry
//! a tag letter (`t`/`f`/`a`/`o`), a node id and a terminating 0; edge
//! lines carry parent id, child id, zero or more literal labels and a
//! terminating 0:
//!
//! ```text
//! o 1 0
//! o 2 0
//! t 3 0
//! 2 3 -1 2 0
//! 1 2 0
//! ```
//!
//! Literal labels on an edge induce an implicit AND wrapper between parent
//! and child, which the POG builder materializes.

use std::io::BufRead;

use crate::errors::{CpogError, CpogResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum D4NodeKind {
    True,
    False,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum D4Line {
    Node { kind: D4NodeKind, id: i32 },
    Edge { parent: i32, child: i32, literals: Vec<i32> },
}

pub fn parse_d4<R: BufRead>(reader: R) -> CpogResult<Vec<D4Line>> {
    let mut lines = vec![];
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        let lineno = lineno + 1;
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let first = tokens.next().unwrap();
        let kind = match first {
            "t" => Some(D4NodeKind::True),
            "f" => Some(D4NodeKind::False),
            "a" => Some(D4NodeKind::And),
            "o" => Some(D4NodeKind::Or),
            _ => None,
        };
        let mut numbers: Vec<i32> = vec![];
        let number_tokens: Vec<&str> = if kind.is_some() {
            tokens.collect()
        } else {
            std::iter::once(first).chain(tokens).collect()
        };
        for token in number_tokens {
            let value: i32 = token.parse().map_err(|_| CpogError::MalformedNnf {
                line: lineno,
                reason: format!("bad integer '{}'", token),
            })?;
            numbers.push(value);
        }
        if numbers.last() != Some(&0) {
            return Err(CpogError::MalformedNnf {
                line: lineno,
                reason: "line not zero-terminated".to_string(),
            });
        }
        numbers.pop();
        if let Some(kind) = kind {
            if numbers.len() != 1 {
                return Err(CpogError::MalformedNnf {
                    line: lineno,
                    reason: format!("expected one node id, found {} numbers", numbers.len()),
                });
            }
            if numbers[0] <= 0 {
                return Err(CpogError::MalformedNnf {
                    line: lineno,
                    reason: format!("node id {} out of range", numbers[0]),
                });
            }
            lines.push(D4Line::Node { kind, id: numbers[0] });
        } else {
            if numbers.len() < 2 {
                return Err(CpogError::MalformedNnf {
                    line: lineno,
                    reason: format!("edge needs parent and child, found {} numbers", numbers.len()),
                });
            }
            lines.push(D4Line::Edge {
                parent: numbers[0],
                child: numbers[1],
                literals: numbers[2..].to_vec(),
            });
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod test_d4_parser {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_nodes_and_edges() {
        let text = "o 1 0\no 2 0\nt 3 0\n2 3 -1 2 0\n1 2 0\n";
        let lines = parse_d4(Cursor::new(text)).unwrap();
        assert_eq!(5, lines.len());
        assert_eq!(
            D4Line::Node {
                kind: D4NodeKind::Or,
                id: 1
            },
            lines[0]
        );
        assert_eq!(
            D4Line::Edge {
                parent: 2,
                child: 3,
                literals: vec![-1, 2]
            },
            lines[3]
        );
        assert_eq!(
            D4Line::Edge {
                parent: 1,
                child: 2,
                literals: vec![]
            },
            lines[4]
        );
    }

    #[test]
    fn rejects_unterminated_line() {
        assert!(parse_d4(Cursor::new("o 1\n")).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(parse_d4(Cursor::new("q 1 0\n")).is_err());
    }
}
