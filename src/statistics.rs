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

use std::fmt;

/// Counters collected while the proof is generated. Everything is plain
/// increments; the summary is printed once at the end of the run.
#[derive(Default)]
pub struct Statistics {
    pub input_clauses: usize,
    pub input_variables: usize,
    pub data_variables: usize,
    pub pog_and_nodes: usize,
    pub pog_or_nodes: usize,
    pub pog_skolem_nodes: usize,
    pub defining_clauses: usize,
    pub virtual_clauses: usize,
    pub aux_and_nodes: usize,
    pub literal_justifications: usize,
    pub or_justifications: usize,
    pub and_justifications: usize,
    pub skolem_justifications: usize,
    pub monolithic_clauses: usize,
    pub mutex_clauses: usize,
    pub unsat_clauses: usize,
    pub lemma_definitions: usize,
    pub lemma_applications: usize,
    pub lemma_application_clauses: usize,
    pub lemma_argument_merges: usize,
    pub sat_calls: usize,
    pub addition_hints: usize,
    pub deletion_hints: usize,
    pub peak_memory_mb: f32,
}

impl Statistics {
    pub fn proof_clause_count(&self) -> usize {
        self.defining_clauses
            + self.literal_justifications
            + self.or_justifications
            + self.and_justifications
            + self.skolem_justifications
            + self.monolithic_clauses
            + self.mutex_clauses
            + self.unsat_clauses
            + self.lemma_application_clauses
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "input: {} clauses over {} variables ({} data)",
            self.input_clauses, self.input_variables, self.data_variables
        )?;
        writeln!(
            f,
            "POG: {} products | {} sums | {} Skolem | {} defining clauses ({} virtual)",
            self.pog_and_nodes,
            self.pog_or_nodes,
            self.pog_skolem_nodes,
            self.defining_clauses,
            self.virtual_clauses
        )?;
        writeln!(
            f,
            "justifications: {} literal | {} sum | {} product | {} Skolem | {} monolithic | {} mutex | {} unsat",
            self.literal_justifications,
            self.or_justifications,
            self.and_justifications,
            self.skolem_justifications,
            self.monolithic_clauses,
            self.mutex_clauses,
            self.unsat_clauses
        )?;
        writeln!(
            f,
            "lemmas: {} defined | {} applied ({} clauses, {} argument merges) | {} aux conjunctions",
            self.lemma_definitions,
            self.lemma_applications,
            self.lemma_application_clauses,
            self.lemma_argument_merges,
            self.aux_and_nodes
        )?;
        writeln!(
            f,
            "work: {} SAT calls | {} addition hints | {} deletion hints",
            self.sat_calls, self.addition_hints, self.deletion_hints
        )?;
        write!(f, "peak memory usage {:.1} Mb", self.peak_memory_mb)
    }
}
