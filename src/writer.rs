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

//! Serializer for the CPOG proof stream. One directive per line:
//!
//! ```text
//! r l                      root declaration
//! <cid> p x c1 ... ck 0    product (AND) declaration
//! <cid> s x c1 c2 0        sum (OR) declaration
//! <cid> S x c1 c2 0        weak sum, mutex unchecked
//! <cid> t x l1 ... lk 0    Skolem declaration
//! <cid> a l... 0 h... 0    asserted clause with RUP hints
//! <cid> as l... 0 h... 0   structural assertion
//! d <cid> h... 0           single deletion with RUP hints
//! D c1 ... ck 0            batch deletion, no hints
//! c ...                    comment
//! ```
//!
//! Clause ids are assigned by the reasoner; the writer only formats.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::core::clause::Clause;

pub struct CpogWriter {
    out: BufWriter<Box<dyn Write>>,
}

impl CpogWriter {
    pub fn new(sink: Box<dyn Write>) -> Self {
        Self {
            out: BufWriter::new(sink),
        }
    }

    pub fn to_file(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "c {}", text)
    }

    pub fn declare_root(&mut self, lit: i32) -> io::Result<()> {
        writeln!(self.out, "r {}", lit)
    }

    pub fn start_assertion(&mut self, cid: usize) -> io::Result<()> {
        write!(self.out, "{} a", cid)
    }

    pub fn start_structural_assertion(&mut self, cid: usize) -> io::Result<()> {
        write!(self.out, "{} as", cid)
    }

    pub fn start_and(&mut self, cid: usize, xvar: i32) -> io::Result<()> {
        write!(self.out, "{} p {}", cid, xvar)
    }

    pub fn start_or(&mut self, cid: usize, xvar: i32, weak: bool) -> io::Result<()> {
        write!(self.out, "{} {} {}", cid, if weak { "S" } else { "s" }, xvar)
    }

    pub fn start_skolem(&mut self, cid: usize, xvar: i32) -> io::Result<()> {
        write!(self.out, "{} t {}", cid, xvar)
    }

    pub fn add_int(&mut self, value: i64) -> io::Result<()> {
        write!(self.out, " {}", value)
    }

    /// Write a 0-terminated integer list as part of the current line.
    pub fn write_list(&mut self, values: &[i32]) -> io::Result<()> {
        for value in values {
            write!(self.out, " {}", value)?;
        }
        write!(self.out, " 0")
    }

    pub fn write_clause(&mut self, clause: &Clause) -> io::Result<()> {
        if clause.len() == 0 && !clause.literals().is_empty() {
            // Tautology in canonical two-literal form
            return self.write_list(&[clause[0], -clause[0]]);
        }
        for i in 0..clause.len() {
            write!(self.out, " {}", clause[i])?;
        }
        write!(self.out, " 0")
    }

    pub fn finish_line(&mut self, trailer: &str) -> io::Result<()> {
        if trailer.is_empty() {
            writeln!(self.out)
        } else {
            writeln!(self.out, " {}", trailer)
        }
    }

    /// `d <cid> h1 ... hk 0`: ids[0] is the deleted clause, the rest hints.
    pub fn clause_deletion(&mut self, ids: &[usize]) -> io::Result<()> {
        write!(self.out, "d")?;
        for id in ids {
            write!(self.out, " {}", id)?;
        }
        writeln!(self.out, " 0")
    }

    /// `D c1 ... ck 0`: unhinted batch deletion.
    pub fn batch_deletion(&mut self, cids: &[usize]) -> io::Result<()> {
        write!(self.out, "D")?;
        for cid in cids {
            write!(self.out, " {}", cid)?;
        }
        writeln!(self.out, " 0")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
