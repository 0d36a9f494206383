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

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use certipog::common::ProofOptions;
use certipog::{generate, preprocess, GenerateStatus};

#[derive(Debug, Parser)]
#[clap(name = "certipog", version, author, about)]
pub struct App {
    #[clap(subcommand)]
    command: Command,
    /// Increase logging verbosity (repeatable)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a CPOG proof from a CNF formula and its d-DNNF circuit
    Generate {
        /// The input CNF, in DIMACS format
        #[clap(value_parser)]
        cnf: PathBuf,
        /// The d-DNNF produced by the knowledge compiler (D4 dialect)
        #[clap(value_parser)]
        ddnnf: PathBuf,
        /// The CPOG proof file to write
        #[clap(value_parser)]
        output: PathBuf,
        /// Emit OR nodes as weak sums and skip the mutex justification
        #[clap(long, alias = "weak-sum")]
        no_mutex: bool,
        /// Justify literal children of a product with one shared proof
        #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
        multi_literal: bool,
        /// Cache lemmas on shared OR nodes
        #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
        use_lemmas: bool,
        /// Materialize the reverse clauses of Skolem nodes
        #[clap(long)]
        explicit_deletion: bool,
        /// Delete input clauses by RUP instead of structural labelling
        #[clap(long)]
        rup_deletion: bool,
        /// Use the LRAT pipeline once a reduced CNF has this many clauses
        #[clap(long, default_value_t = 1000)]
        drat_threshold: usize,
        /// Subtrees up to this size go monolithic; negative disables
        #[clap(long, default_value_t = 1_000_000)]
        monolithic_threshold: i64,
        /// Monolithic proofs require tree/dag ratio at or below this
        #[clap(long, default_value_t = 5.0)]
        tree_ratio_threshold: f64,
        /// Propagation budget in bounded BCP mode
        #[clap(long, default_value_t = 1)]
        bcp_limit: usize,
        /// Abort once the proof reaches this many clauses
        #[clap(long, default_value_t = usize::MAX)]
        clause_limit: usize,
        /// Keep the temporary files handed to the solver pipeline
        #[clap(long)]
        keep_files: bool,
        /// Print run statistics on completion
        #[clap(short, long)]
        statistics: bool,
    },
    /// Reduce a CNF formula before handing it to the knowledge compiler
    Preprocess {
        /// The input CNF, in DIMACS format
        #[clap(value_parser)]
        cnf: PathBuf,
        /// The reduced CNF to write
        #[clap(value_parser)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let app = App::parse();
    let level = match app.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
    match app.command {
        Command::Generate {
            cnf,
            ddnnf,
            output,
            no_mutex,
            multi_literal,
            use_lemmas,
            explicit_deletion,
            rup_deletion,
            drat_threshold,
            monolithic_threshold,
            tree_ratio_threshold,
            bcp_limit,
            clause_limit,
            keep_files,
            statistics,
        } => {
            let options = ProofOptions {
                use_explicit_deletion: explicit_deletion,
                weak_sum: no_mutex,
                multi_literal,
                use_lemmas,
                delete_files: !keep_files,
                drat_threshold,
                clause_limit,
                bcp_limit,
                monolithic_threshold,
                tree_ratio_threshold,
                rup_deletion,
            };
            match generate(&cnf, &ddnnf, &output, options) {
                Ok(report) => {
                    if statistics {
                        println!("{}", report.stats);
                    }
                    match report.status {
                        GenerateStatus::Proved => {
                            log::info!(
                                "proof complete; root literal {} justified and {} input clauses deleted",
                                report.root_literal,
                                report.stats.input_clauses
                            );
                            ExitCode::SUCCESS
                        }
                        GenerateStatus::Unsatisfiable => {
                            log::info!("formula unsatisfiable; proof ends with the empty clause");
                            ExitCode::SUCCESS
                        }
                        GenerateStatus::Overcount => {
                            log::error!("circuit overcounts; proof incomplete");
                            ExitCode::FAILURE
                        }
                    }
                }
                Err(e) => {
                    log::error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Preprocess { cnf, output } => match preprocess(&cnf, &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        },
    }
}
