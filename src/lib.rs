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

//! Certipog turns the output of a decision-DNNF knowledge compiler into
//! a CPOG proof that a simple checker can verify by unit propagation
//! alone. Given a CNF formula and a d-DNNF circuit claimed to represent
//! it, the generated proof establishes both directions of the
//! equivalence: every assignment satisfying the circuit satisfies the
//! formula (the input clauses can be deleted), and every model of the
//! formula is covered by the circuit (the root literal is asserted).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use peak_alloc::PeakAlloc;

pub mod cnf;
pub mod common;
pub mod core;
pub mod errors;
pub mod parsers;
pub mod pog;
pub mod statistics;
pub mod writer;

use cnf::reasoner::CnfReasoner;
use cnf::optimize::CnfOptimizer;
use cnf::Cnf;
use common::ProofOptions;
use errors::{CpogError, CpogResult};
use parsers::D4Line;
use pog::justify::Justified;
use pog::Pog;
use statistics::Statistics;
use writer::CpogWriter;

#[global_allocator]
pub static PEAK_ALLOC: PeakAlloc = PeakAlloc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GenerateStatus {
    /// Root asserted and all input clauses deleted
    Proved,
    /// The formula is unsatisfiable; the proof ends with the empty clause
    Unsatisfiable,
    /// Some input clause is not implied by the circuit
    Overcount,
}

pub struct GenerateReport {
    pub status: GenerateStatus,
    pub root_literal: i32,
    pub stats: Statistics,
}

/// Run the whole pipeline on in-memory inputs: ingest the d-DNNF, build
/// and compress the POG, emit the defining clauses, justify the root,
/// and delete the input clauses.
pub fn generate_proof(
    cnf: Cnf,
    nnf_lines: &[D4Line],
    writer: CpogWriter,
    options: ProofOptions,
) -> CpogResult<GenerateReport> {
    if options.weak_sum {
        log::warn!(
            "weak sums requested: the proof certifies only that every model \
             of the circuit satisfies the formula; counts may overcount"
        );
    }
    let mut reasoner = CnfReasoner::new(cnf, writer, options);
    reasoner.enable_pog()?;
    let mut pog = Pog::new(&reasoner);
    pog.read_d4(nnf_lines, &mut reasoner)?;
    pog.prepare(&mut reasoner)?;

    let status;
    if pog.root() == 0 {
        pog.justify_unsatisfiable(&mut reasoner)?;
        status = GenerateStatus::Unsatisfiable;
    } else {
        let root = pog.root();
        let use_lemmas = reasoner.options.use_lemmas;
        let unit_cid = match pog.justify(&mut reasoner, root, 0, use_lemmas)? {
            Some(Justified::Proved(cid)) => cid,
            _ => return Err(CpogError::MonolithicProof(root)),
        };
        log::info!("root literal {} asserted by clause #{}", root, unit_cid);
        status = if pog.delete_input_clauses(&mut reasoner, unit_cid)? {
            GenerateStatus::Proved
        } else {
            GenerateStatus::Overcount
        };
    }
    reasoner.writer().flush()?;
    let mut stats = std::mem::take(&mut reasoner.stats);
    stats.peak_memory_mb = PEAK_ALLOC.peak_usage_as_mb();
    Ok(GenerateReport {
        status,
        root_literal: pog.root(),
        stats,
    })
}

/// File-based entry point used by the CLI.
pub fn generate(
    cnf_path: &Path,
    nnf_path: &Path,
    cpog_path: &Path,
    options: ProofOptions,
) -> CpogResult<GenerateReport> {
    let cnf = parsers::cnf_from_dimacs(BufReader::new(File::open(cnf_path)?))?;
    let nnf_lines = parsers::parse_d4(BufReader::new(File::open(nnf_path)?))?;
    let writer = CpogWriter::to_file(cpog_path)?;
    generate_proof(cnf, &nnf_lines, writer, options)
}

/// Reduce a CNF formula for the external knowledge compiler: unit
/// propagation plus bounded variable elimination over the non-show
/// variables, with kept units re-emitted in front.
pub fn preprocess(cnf_path: &Path, out_path: &Path) -> CpogResult<()> {
    let cnf = parsers::cnf_from_dimacs(BufReader::new(File::open(cnf_path)?))?;
    let keep_variables = match cnf.data_variables() {
        Some(data) => data.clone(),
        None => (1..=cnf.max_variable()).collect(),
    };
    let mut optimizer = CnfOptimizer::new(keep_variables);
    for clause in cnf.clauses() {
        optimizer.add_clause(clause);
    }
    optimizer.optimize();
    let mut out = File::create(out_path)?;
    optimizer.show(&mut out)?;
    Ok(())
}
