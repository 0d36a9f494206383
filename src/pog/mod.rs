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

//! The POG: an arena of AND / OR / SKOLEM / TRUE nodes indexed by their
//! extension variables. Children are literals referring either to input
//! variables or to other nodes. The graph is built from a D4 d-DNNF
//! file, compressed in two passes (constant folding + Skolemization,
//! then topological renumbering) and concretized by emitting the
//! defining clauses of every node in topological order.

pub mod deletion;
pub mod justify;

use std::io::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cnf::reasoner::{CnfReasoner, LemmaInstance};
use crate::core::literal::{match_phase, var_of, TRUE_ID};
use crate::errors::{CpogError, CpogResult};
use crate::parsers::{D4Line, D4NodeKind};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeType {
    True,
    False,
    And,
    Or,
    Skolem,
}

impl NodeType {
    fn prefix(self) -> char {
        match self {
            NodeType::True => 'T',
            NodeType::False => 'F',
            NodeType::And => 'P',
            NodeType::Or => 'S',
            NodeType::Skolem => 'T',
        }
    }
}

#[derive(Debug)]
pub struct PogNode {
    pub ntype: NodeType,
    pub xvar: i32,
    pub children: Vec<i32>,
    /// First clause of the node's defining block
    pub defining_cid: usize,
    pub indegree: usize,
    pub tree_size: i64,
    /// Proved lemmas cached on this node, looked up by signature
    pub lemmas: Vec<LemmaInstance>,
}

impl PogNode {
    pub fn new(ntype: NodeType, xvar: i32) -> Self {
        Self {
            ntype,
            xvar,
            children: vec![],
            defining_cid: 0,
            indegree: 0,
            tree_size: 1,
            lemmas: vec![],
        }
    }

    pub fn degree(&self) -> usize {
        self.children.len()
    }

    /// Shared OR nodes are the lemma candidates.
    pub fn want_lemma(&self) -> bool {
        self.ntype == NodeType::Or && self.indegree >= 2
    }

    pub fn name(&self) -> String {
        format!("{}{}_{:?}", self.ntype.prefix(), self.xvar, self.ntype)
    }
}

pub struct Pog {
    nodes: Vec<PogNode>,
    root_literal: i32,
    max_input_var: i32,
    start_extension_var: i32,
    pub(crate) tree_ratio: f64,
    data_variables: Option<FxHashSet<i32>>,
}

impl Pog {
    pub fn new(cnf: &CnfReasoner) -> Self {
        Self {
            nodes: vec![],
            root_literal: 0,
            max_input_var: cnf.max_variable(),
            start_extension_var: cnf.max_variable() + 1,
            tree_ratio: 1.0,
            data_variables: cnf.cnf().data_variables().cloned(),
        }
    }

    pub fn root(&self) -> i32 {
        self.root_literal
    }

    pub fn set_root(&mut self, rlit: i32) {
        self.root_literal = rlit;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_input_var(&self) -> i32 {
        self.max_input_var
    }

    pub fn start_extension_var(&self) -> i32 {
        self.start_extension_var
    }

    pub fn nodes(&self) -> &[PogNode] {
        &self.nodes
    }

    /// Does the literal refer to a node rather than an input variable?
    pub fn is_node(&self, lit: i32) -> bool {
        let offset = var_of(lit) - self.start_extension_var;
        offset >= 0 && (offset as usize) < self.nodes.len()
    }

    pub fn is_node_type(&self, lit: i32, ntype: NodeType) -> bool {
        self.is_node(lit) && self.node(var_of(lit)).ntype == ntype
    }

    pub fn node(&self, var: i32) -> &PogNode {
        &self.nodes[(var - self.start_extension_var) as usize]
    }

    pub(crate) fn node_mut(&mut self, var: i32) -> &mut PogNode {
        &mut self.nodes[(var - self.start_extension_var) as usize]
    }

    /// Projection literals are those of non-data variables in a
    /// projected instance.
    pub fn is_projection_literal(&self, lit: i32) -> bool {
        match self.data_variables.as_ref() {
            None => false,
            Some(data) => !data.contains(&var_of(lit)),
        }
    }

    fn add_node(&mut self, mut node: PogNode, cnf: &mut CnfReasoner) -> i32 {
        let xvar = cnf.new_xvar();
        node.xvar = xvar;
        self.nodes.push(node);
        xvar
    }

    // --- D4 INGEST --- //

    /// Build the raw POG from the parsed D4 lines. Edges with literal
    /// labels get an implicit AND wrapper. Root detection prefers a
    /// parentless degree-1 OR node; the first one encountered (smallest
    /// id) wins, later candidates only produce a warning.
    pub fn read_d4(&mut self, lines: &[D4Line], cnf: &mut CnfReasoner) -> CpogResult<()> {
        let mut nnf_idmap: std::collections::BTreeMap<i32, i32> = std::collections::BTreeMap::new();
        let mut node_with_parent: FxHashSet<i32> = FxHashSet::default();
        let mut arguments: Vec<Vec<i32>> = vec![];
        for line in lines {
            match line {
                D4Line::Node { kind, id } => {
                    let ntype = match kind {
                        D4NodeKind::True => NodeType::True,
                        D4NodeKind::False => NodeType::False,
                        D4NodeKind::And => NodeType::And,
                        D4NodeKind::Or => NodeType::Or,
                    };
                    let pid = self.add_node(PogNode::new(ntype, 0), cnf);
                    arguments.push(vec![]);
                    nnf_idmap.insert(*id, pid);
                }
                D4Line::Edge {
                    parent,
                    child,
                    literals,
                } => {
                    let ppid = *nnf_idmap.get(parent).ok_or_else(|| CpogError::MalformedNnf {
                        line: 0,
                        reason: format!("edge references undeclared node {}", parent),
                    })?;
                    let spid = *nnf_idmap.get(child).ok_or_else(|| CpogError::MalformedNnf {
                        line: 0,
                        reason: format!("edge references undeclared node {}", child),
                    })?;
                    let mut cpid = spid;
                    if !literals.is_empty() {
                        // AND wrapper holding the edge literals
                        cpid = self.add_node(PogNode::new(NodeType::And, 0), cnf);
                        let mut aargs = literals.clone();
                        aargs.push(spid);
                        arguments.push(aargs);
                    }
                    arguments[(ppid - self.start_extension_var) as usize].push(cpid);
                    node_with_parent.insert(cpid);
                }
            }
        }
        for (idx, args) in arguments.into_iter().enumerate() {
            self.nodes[idx].children = args;
        }
        for (&nid, &pid) in nnf_idmap.iter() {
            let (ntype, degree) = {
                let node = self.node(pid);
                (node.ntype, node.degree())
            };
            match ntype {
                NodeType::Or => {
                    if degree == 0 || degree > 2 {
                        return Err(CpogError::MalformedNnf {
                            line: 0,
                            reason: format!("OR node {} has invalid degree {}", nid, degree),
                        });
                    }
                    if degree == 1 && !node_with_parent.contains(&pid) {
                        if self.root_literal == 0 {
                            self.root_literal = pid;
                        } else if var_of(self.root_literal) != TRUE_ID {
                            log::warn!(
                                "ambiguous root: keeping {}, ignoring candidate {}",
                                self.root_literal,
                                pid
                            );
                        }
                    }
                }
                NodeType::False if self.root_literal == 0 => self.root_literal = -TRUE_ID,
                NodeType::True if self.root_literal == 0 => self.root_literal = TRUE_ID,
                _ => {}
            }
        }
        if self.root_literal == 0 {
            return Err(CpogError::NoRoot);
        }
        log::info!(
            "read D4 NNF with {} nodes, root literal {}",
            self.nodes.len(),
            self.root_literal
        );
        Ok(())
    }

    /// Compress twice and emit the defining clauses.
    pub fn prepare(&mut self, cnf: &mut CnfReasoner) -> CpogResult<()> {
        self.compress(true, cnf)?;
        self.compress(false, cnf)?;
        self.concretize(cnf)
    }

    // --- COMPRESSION --- //

    /// Nodes reachable from the root, children before parents.
    fn topo_order(&self, rlit: i32, markers: &mut [i32]) -> Vec<i32> {
        let mut rtopo = vec![];
        if !self.is_node(rlit) {
            return rtopo;
        }
        let mut stack: Vec<(i32, usize)> = vec![(var_of(rlit), 0)];
        while let Some((rid, next_child)) = stack.pop() {
            let idx = (rid - self.start_extension_var) as usize;
            if next_child == 0 {
                if markers[idx] != 0 {
                    continue;
                }
                markers[idx] = 1;
            }
            let node = &self.nodes[idx];
            if next_child < node.degree() {
                stack.push((rid, next_child + 1));
                let child = node.children[next_child];
                if self.is_node(child) {
                    let cidx = (var_of(child) - self.start_extension_var) as usize;
                    if markers[cidx] == 0 {
                        stack.push((var_of(child), 0));
                    }
                }
            } else {
                rtopo.push(rid);
            }
        }
        rtopo
    }

    /// Compress and renumber the graph. With `optimize` constants are
    /// folded, syntactic identities absorbed, and projection literals
    /// siphoned into Skolem siblings; without, the reachable nodes are
    /// renumbered in topological order.
    pub fn compress(&mut self, optimize: bool, cnf: &mut CnfReasoner) -> CpogResult<()> {
        if self.root_literal == 0 || var_of(self.root_literal) == TRUE_ID {
            self.nodes.clear();
            cnf.reset_xvar();
            if self.root_literal == TRUE_ID {
                // Constant true: an empty product
                self.add_node(PogNode::new(NodeType::And, 0), cnf);
                self.root_literal = self.start_extension_var;
            } else {
                self.root_literal = 0;
            }
            return Ok(());
        }
        if !self.is_node(self.root_literal) {
            // Root refers to an input literal
            let root = self.root_literal;
            self.nodes.clear();
            cnf.reset_xvar();
            if !optimize {
                let mut node = PogNode::new(NodeType::And, 0);
                node.children = vec![root];
                self.add_node(node, cnf);
                self.root_literal = self.start_extension_var;
            }
            return Ok(());
        }

        // Mapping from old node offset to new literal; also the topo
        // markers
        let mut remap = vec![0i32; self.nodes.len()];
        let rtopo = self.topo_order(self.root_literal, &mut remap);
        remap.fill(0);
        log::debug!(
            "compressing POG with {} nodes ({} reachable), root {}",
            self.nodes.len(),
            rtopo.len(),
            self.root_literal
        );
        let mut new_nodes: Vec<PogNode> = vec![];

        for oid in rtopo {
            let offset = (oid - self.start_extension_var) as usize;
            let node = &self.nodes[offset];
            if !optimize {
                let mut nchildren = vec![];
                for &child_lit in node.children.iter() {
                    let mut nchild_lit = child_lit;
                    if self.is_node(child_lit) {
                        let cidx = (var_of(child_lit) - self.start_extension_var) as usize;
                        nchild_lit = match_phase(remap[cidx], child_lit);
                    }
                    nchildren.push(nchild_lit);
                }
                let mut nnode = PogNode::new(
                    node.ntype,
                    new_nodes.len() as i32 + self.start_extension_var,
                );
                nnode.children = nchildren;
                remap[offset] = nnode.xvar;
                new_nodes.push(nnode);
                continue;
            }
            match node.ntype {
                NodeType::True => remap[offset] = TRUE_ID,
                NodeType::False => remap[offset] = -TRUE_ID,
                NodeType::Or => {
                    if node.degree() == 1 {
                        let child_lit = node.children[0];
                        let mut nchild_lit = child_lit;
                        if self.is_node(child_lit) {
                            let cidx = (var_of(child_lit) - self.start_extension_var) as usize;
                            nchild_lit = match_phase(remap[cidx], child_lit);
                        }
                        remap[offset] = nchild_lit;
                        continue;
                    }
                    let mut nchildren = vec![];
                    let mut tautology = false;
                    for &child_lit in node.children.iter() {
                        let mut nchild_lit = child_lit;
                        if child_lit == TRUE_ID {
                            tautology = true;
                            break;
                        }
                        if self.is_node(child_lit) {
                            let cidx = (var_of(child_lit) - self.start_extension_var) as usize;
                            nchild_lit = match_phase(remap[cidx], child_lit);
                            if nchild_lit == TRUE_ID {
                                tautology = true;
                                break;
                            }
                        }
                        nchildren.push(nchild_lit);
                        let last = nchildren.len() - 1;
                        for j in 0..last {
                            if nchildren[j] == -nchildren[last] {
                                tautology = true;
                            }
                        }
                    }
                    if tautology {
                        remap[offset] = TRUE_ID;
                        continue;
                    }
                    if nchildren[0] == -TRUE_ID || nchildren[1] == -TRUE_ID {
                        // One child false: the node is the other child
                        let other = if nchildren[0] == -TRUE_ID {
                            nchildren[1]
                        } else {
                            nchildren[0]
                        };
                        remap[offset] = other;
                        continue;
                    }
                    let mut nnode = PogNode::new(
                        NodeType::Or,
                        new_nodes.len() as i32 + self.start_extension_var,
                    );
                    nnode.children = nchildren;
                    remap[offset] = nnode.xvar;
                    new_nodes.push(nnode);
                }
                NodeType::And | NodeType::Skolem => {
                    let mut nchildren: Vec<i32> = vec![];
                    // Projection literals and merged Skolem grandchildren
                    let mut schildren: Vec<i32> = vec![];
                    let mut zeroed = false;
                    for &child_lit in node.children.iter() {
                        if child_lit == TRUE_ID {
                            continue;
                        }
                        if self.is_node(child_lit) {
                            let cidx = (var_of(child_lit) - self.start_extension_var) as usize;
                            let nchild_var = remap[cidx];
                            let nchild_lit = match_phase(nchild_var, child_lit);
                            if nchild_lit == TRUE_ID {
                                continue;
                            }
                            if nchild_lit == -TRUE_ID {
                                remap[offset] = -TRUE_ID;
                                zeroed = true;
                                break;
                            }
                            let noffset = nchild_var - self.start_extension_var;
                            let new_child = if noffset >= 0 && (noffset as usize) < new_nodes.len()
                            {
                                Some(&new_nodes[noffset as usize])
                            } else {
                                None
                            };
                            if let Some(cnode) = new_child {
                                if cnode.ntype == NodeType::Skolem {
                                    // Merge Skolem grandchildren into a
                                    // single sibling
                                    schildren.extend(cnode.children.iter().copied());
                                    continue;
                                }
                            }
                            nchildren.push(nchild_lit);
                        } else if self.is_projection_literal(child_lit) {
                            schildren.push(child_lit);
                        } else {
                            nchildren.push(child_lit);
                        }
                    }
                    if zeroed {
                        continue;
                    }
                    if let Some(var) = check_skolem(&mut schildren) {
                        return Err(CpogError::SkolemConflict {
                            xvar: new_nodes.len() as i32 + self.start_extension_var,
                            var,
                        });
                    }
                    if nchildren.is_empty() {
                        if schildren.is_empty() {
                            remap[offset] = TRUE_ID;
                        } else {
                            let mut nnode = PogNode::new(
                                NodeType::Skolem,
                                new_nodes.len() as i32 + self.start_extension_var,
                            );
                            nnode.children = schildren;
                            remap[offset] = nnode.xvar;
                            new_nodes.push(nnode);
                        }
                    } else if schildren.is_empty() {
                        if nchildren.len() == 1 {
                            remap[offset] = nchildren[0];
                        } else {
                            let mut nnode = PogNode::new(
                                NodeType::And,
                                new_nodes.len() as i32 + self.start_extension_var,
                            );
                            nnode.children = nchildren;
                            remap[offset] = nnode.xvar;
                            new_nodes.push(nnode);
                        }
                    } else {
                        let mut snode = PogNode::new(
                            NodeType::Skolem,
                            new_nodes.len() as i32 + self.start_extension_var,
                        );
                        snode.children = schildren;
                        let sxvar = snode.xvar;
                        new_nodes.push(snode);
                        nchildren.push(sxvar);
                        let mut nnode = PogNode::new(
                            NodeType::And,
                            new_nodes.len() as i32 + self.start_extension_var,
                        );
                        nnode.children = nchildren;
                        remap[offset] = nnode.xvar;
                        new_nodes.push(nnode);
                    }
                }
            }
        }

        // Re-seat the root through the remap
        let old_start = self.start_extension_var;
        let rvar = var_of(self.root_literal);
        let root_literal = match_phase(
            remap[(rvar - old_start) as usize],
            self.root_literal,
        );
        self.nodes.clear();
        cnf.reset_xvar();
        self.root_literal = root_literal;
        let nrvar = var_of(self.root_literal);
        if self.root_literal == 0 {
            // Unsatisfiable
        } else if nrvar == TRUE_ID {
            if self.root_literal < 0 {
                self.root_literal = 0;
            } else {
                self.add_node(PogNode::new(NodeType::True, 0), cnf);
                self.root_literal = self.start_extension_var;
            }
        } else if nrvar >= self.start_extension_var {
            for node in new_nodes {
                let xvar = self.add_node(node, cnf);
                let children = self.node(xvar).children.clone();
                for clit in children {
                    if self.is_node(clit) {
                        self.node_mut(var_of(clit)).indegree += 1;
                    }
                }
            }
        }
        // Otherwise the root is an input literal; the renumbering pass
        // wraps it
        log::info!(
            "{} POG has {} nodes, root literal {}",
            if optimize { "optimized" } else { "compressed" },
            self.nodes.len(),
            self.root_literal
        );
        Ok(())
    }

    // --- CONCRETIZATION --- //

    /// Emit the defining clauses of every node in topological order and
    /// record the start of each block. OR nodes carry their mutex hints
    /// on the declaration line.
    pub fn concretize(&mut self, cnf: &mut CnfReasoner) -> CpogResult<()> {
        if log::log_enabled!(log::Level::Debug) {
            cnf.comment("Input clauses")?;
            for cid in 1..=cnf.clause_count() {
                cnf.document_input(cid)?;
            }
        }
        cnf.writer().declare_root(self.root_literal)?;

        let mut last_tree_size: i64 = 0;
        let mut dag_size: i64 = 0;
        for idx in 0..self.nodes.len() {
            let ntype = self.nodes[idx].ntype;
            let xvar = self.nodes[idx].xvar;
            let args = self.nodes[idx].children.clone();
            if ntype != NodeType::Skolem {
                dag_size += 1 + args.len() as i64;
            }
            let mut tsize = args.len() as i64 + 1;
            let defining_cid;
            let mut need_zero = false;
            match ntype {
                NodeType::True | NodeType::And => {
                    defining_cid = cnf.start_and(xvar, &args)?;
                    for &child_lit in args.iter() {
                        if self.is_node(child_lit) {
                            tsize += self.node(var_of(child_lit)).tree_size;
                        }
                    }
                    cnf.stats.pog_and_nodes += 1;
                }
                NodeType::Or => {
                    if args.len() != 2 {
                        return Err(CpogError::Invariant(format!(
                            "OR node {} cannot have {} children",
                            xvar,
                            args.len()
                        )));
                    }
                    let hints = if cnf.options.weak_sum {
                        vec![]
                    } else {
                        self.justify_mutex(cnf, idx)?
                    };
                    need_zero = true;
                    defining_cid = cnf.start_or(xvar, &args)?;
                    for hid in hints {
                        cnf.add_hint(hid)?;
                    }
                    for &child_lit in args.iter() {
                        if self.is_node(child_lit) {
                            tsize += self.node(var_of(child_lit)).tree_size;
                        }
                    }
                    cnf.stats.pog_or_nodes += 1;
                }
                NodeType::Skolem => {
                    defining_cid = cnf.start_skolem(xvar, &args)?;
                    tsize = 0;
                    cnf.stats.pog_skolem_nodes += 1;
                }
                NodeType::False => {
                    return Err(CpogError::Invariant(format!(
                        "constant FALSE node {} survived compression",
                        xvar
                    )));
                }
            }
            cnf.finish_command(need_zero)?;
            self.nodes[idx].defining_cid = defining_cid;
            self.nodes[idx].tree_size = tsize;
            last_tree_size = tsize;
            match ntype {
                NodeType::Or => cnf.document_or(defining_cid, xvar, &args)?,
                NodeType::Skolem => cnf.document_skolem(defining_cid, xvar, &args)?,
                _ => cnf.document_and(defining_cid, xvar, &args)?,
            }
        }
        if dag_size > 0 {
            self.tree_ratio = last_tree_size as f64 / dag_size as f64;
            log::info!(
                "POG has DAG size {} and tree size {}, ratio {:.2}",
                dag_size,
                last_tree_size,
                self.tree_ratio
            );
        }
        Ok(())
    }

    // --- STRUCTURE QUERIES --- //

    /// Descend through first children until an input literal appears.
    pub fn first_literal(&self, mut rlit: i32) -> CpogResult<i32> {
        while self.is_node(rlit) {
            let node = self.node(var_of(rlit));
            if node.degree() == 0 {
                return Err(CpogError::Invariant(format!(
                    "node {} has no children while searching for first literal",
                    node.name()
                )));
            }
            rlit = node.children[0];
        }
        if var_of(rlit) >= self.start_extension_var {
            return Err(CpogError::Invariant(format!(
                "first literal {} is not an input literal",
                rlit
            )));
        }
        Ok(rlit)
    }

    /// Literal occurring positively among the first argument's literals
    /// and negatively among the second's (non-AND arguments count as
    /// singleton literal lists). 0 when none exists.
    pub fn find_splitting_literal(&self, rlit1: i32, rlit2: i32) -> i32 {
        let lits1: &[i32] = if self.is_node_type(rlit1, NodeType::And) {
            &self.node(var_of(rlit1)).children
        } else {
            std::slice::from_ref(&rlit1)
        };
        let lits2: &[i32] = if self.is_node_type(rlit2, NodeType::And) {
            &self.node(var_of(rlit2)).children
        } else {
            std::slice::from_ref(&rlit2)
        };
        for &l1 in lits1 {
            for &l2 in lits2 {
                if l1 == -l2 {
                    return l1;
                }
            }
        }
        0
    }

    pub fn show<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for node in self.nodes.iter() {
            let children: Vec<String> = node.children.iter().map(i32::to_string).collect();
            writeln!(out, "{}({})", node.name(), children.join(","))?;
        }
        writeln!(out, "ROOT {}", self.root_literal)
    }
}

/// Deduplicate Skolem children in place; a variable occurring in both
/// phases is returned as the offender.
fn check_skolem(literals: &mut Vec<i32>) -> Option<i32> {
    if literals.len() <= 1 {
        return None;
    }
    let mut lset: FxHashSet<i32> = FxHashSet::default();
    let mut next_pos = 0;
    for i in 0..literals.len() {
        let lit = literals[i];
        if lset.contains(&-lit) {
            return Some(var_of(lit));
        }
        if lset.insert(lit) {
            literals[next_pos] = lit;
            next_pos += 1;
        }
    }
    literals.truncate(next_pos);
    None
}

#[cfg(test)]
mod test_pog {
    use super::*;
    use crate::common::ProofOptions;
    use crate::parsers::{cnf_from_dimacs, parse_d4};
    use crate::writer::CpogWriter;
    use std::io::Cursor;

    fn reasoner_from(text: &str) -> CnfReasoner {
        let cnf = cnf_from_dimacs(Cursor::new(text)).unwrap();
        let writer = CpogWriter::new(Box::new(std::io::sink()));
        CnfReasoner::new(cnf, writer, ProofOptions::default())
    }

    fn pog_from(cnf_text: &str, nnf_text: &str) -> (Pog, CnfReasoner) {
        let mut reasoner = reasoner_from(cnf_text);
        reasoner.enable_pog().unwrap();
        let mut pog = Pog::new(&reasoner);
        let lines = parse_d4(Cursor::new(nnf_text)).unwrap();
        pog.read_d4(&lines, &mut reasoner).unwrap();
        (pog, reasoner)
    }

    // CNF (1 2) with d-DNNF OR(1, AND(-1, 2))
    const SIMPLE_CNF: &str = "p cnf 2 1\n1 2 0\n";
    const SIMPLE_NNF: &str = "o 1 0\no 2 0\nt 3 0\n1 2 0\n2 3 1 0\n2 3 -1 2 0\n";

    #[test]
    fn read_d4_builds_nodes_and_root() {
        let (pog, _) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        assert!(pog.root() > 0);
        assert!(pog.node_count() >= 3);
    }

    #[test]
    fn compress_folds_constants_and_wrappers() {
        let (mut pog, mut reasoner) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        // One AND (-1, 2) and one OR (1, and)
        assert_eq!(2, pog.node_count());
        let and_node = &pog.nodes()[0];
        let or_node = &pog.nodes()[1];
        assert_eq!(NodeType::And, and_node.ntype);
        assert_eq!(vec![-1, 2], and_node.children);
        assert_eq!(NodeType::Or, or_node.ntype);
        assert_eq!(vec![1, and_node.xvar], or_node.children);
        assert_eq!(or_node.xvar, pog.root());
    }

    #[test]
    fn compress_is_idempotent() {
        let (mut pog, mut reasoner) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        pog.compress(true, &mut reasoner).unwrap();
        let shape1: Vec<(NodeType, Vec<i32>)> = pog
            .nodes()
            .iter()
            .map(|n| (n.ntype, n.children.clone()))
            .collect();
        let root1 = pog.root();
        pog.compress(true, &mut reasoner).unwrap();
        let shape2: Vec<(NodeType, Vec<i32>)> = pog
            .nodes()
            .iter()
            .map(|n| (n.ntype, n.children.clone()))
            .collect();
        assert_eq!(shape1, shape2);
        assert_eq!(root1, pog.root());
    }

    #[test]
    fn compress_handles_false_root() {
        let (mut pog, mut reasoner) = pog_from("p cnf 1 2\n1 0\n-1 0\n", "f 1 0\n");
        assert_eq!(-TRUE_ID, pog.root());
        pog.compress(true, &mut reasoner).unwrap();
        assert_eq!(0, pog.root());
        assert_eq!(0, pog.node_count());
    }

    #[test]
    fn compress_handles_true_root() {
        let (mut pog, mut reasoner) = pog_from("p cnf 1 0\n", "t 1 0\n");
        assert_eq!(TRUE_ID, pog.root());
        pog.compress(true, &mut reasoner).unwrap();
        assert_eq!(pog.start_extension_var(), pog.root());
        assert_eq!(1, pog.node_count());
        assert_eq!(0, pog.nodes()[0].degree());
    }

    #[test]
    fn skolemization_siphons_projection_literals() {
        // show 1; variable 2 is projected away
        let cnf_text = "c p show 1 0\np cnf 2 2\n1 2 0\n1 -2 0\n";
        // d-DNNF: OR(1, AND(-1 ... )) is unsat on the -1 branch; use the
        // simple certificate AND(1, 2) for model 1=T,2=T of (1 v 2)
        let nnf_text = "t 1 0\no 2 0\n2 1 1 2 0\n";
        let (mut pog, mut reasoner) = pog_from(cnf_text, nnf_text);
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        // Projection literal 2 must live under a Skolem sibling
        let skolem = pog
            .nodes()
            .iter()
            .find(|n| n.ntype == NodeType::Skolem)
            .expect("skolem node");
        assert_eq!(vec![2], skolem.children);
        let and_node = pog
            .nodes()
            .iter()
            .find(|n| n.ntype == NodeType::And)
            .expect("and node");
        assert!(and_node.children.contains(&1));
        assert!(and_node.children.contains(&skolem.xvar));
    }

    #[test]
    fn check_skolem_flags_conflicts() {
        let mut ok = vec![2, 3, 2];
        assert_eq!(None, check_skolem(&mut ok));
        assert_eq!(vec![2, 3], ok);
        let mut bad = vec![2, -2];
        assert_eq!(Some(2), check_skolem(&mut bad));
    }

    #[test]
    fn splitting_literal_found_between_children() {
        let (mut pog, mut reasoner) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        let or_node = &pog.nodes()[1];
        let split = pog.find_splitting_literal(or_node.children[0], or_node.children[1]);
        assert_eq!(1, split);
        assert_eq!(0, pog.find_splitting_literal(1, 2));
    }

    #[test]
    fn concretize_emits_defining_blocks() {
        let (mut pog, mut reasoner) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        pog.concretize(&mut reasoner).unwrap();
        let and_node = &pog.nodes()[0];
        let or_node = &pog.nodes()[1];
        // AND block: 3 clauses starting after the input clause
        assert_eq!(2, and_node.defining_cid);
        assert_eq!(5, or_node.defining_cid);
        let def = reasoner.get_clause(2).unwrap();
        assert_eq!(&[and_node.xvar, 1, -2], def.literals());
        let rev = reasoner.get_clause(6).unwrap();
        assert_eq!(&[or_node.xvar, -1], rev.literals());
        assert!(pog.tree_ratio >= 1.0);
    }

    #[test]
    fn single_literal_formula_wraps_root() {
        let (mut pog, mut reasoner) = pog_from("p cnf 1 1\n1 0\n", "o 1 0\nt 2 0\n1 2 1 0\n");
        pog.compress(true, &mut reasoner).unwrap();
        // After optimization the root collapses to the bare literal
        assert_eq!(1, pog.root());
        pog.compress(false, &mut reasoner).unwrap();
        assert_eq!(1, pog.node_count());
        assert_eq!(NodeType::And, pog.nodes()[0].ntype);
        assert_eq!(vec![1], pog.nodes()[0].children);
        assert_eq!(pog.start_extension_var(), pog.root());
    }

    #[test]
    fn first_literal_descends_to_input() {
        let (mut pog, mut reasoner) = pog_from(SIMPLE_CNF, SIMPLE_NNF);
        pog.compress(true, &mut reasoner).unwrap();
        pog.compress(false, &mut reasoner).unwrap();
        let and_xvar = pog.nodes()[0].xvar;
        assert_eq!(-1, pog.first_literal(and_xvar).unwrap());
        assert_eq!(2, pog.first_literal(2).unwrap());
    }
}
