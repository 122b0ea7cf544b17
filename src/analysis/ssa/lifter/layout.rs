//! Basic block discovery on the stack-form instruction stream.
//!
//! Block leaders are the first instruction, every branch target, every handler entry,
//! both ends of every protected range, the instruction after every block-ending
//! instruction, and the instruction after every may-throw instruction inside a protected
//! range. The last rule guarantees that a covered block throws at most at its final
//! real instruction, so the locals flowing into a handler are exactly the locals at the
//! end of the throwing block.
//!
//! A leader on a label is moved back to the first label of its run, so a run of labels
//! never produces empty blocks.

use std::collections::{BTreeSet, HashMap};

use crate::{
    assembly::{CfInstruction, Label, MethodCode},
    metadata::{MethodRef, TypeRef},
    utils::graph::AdjacencyGraph,
    Error, Result,
};

/// A maximal straight-line range `start..end` of the instruction stream.
#[derive(Debug, Clone)]
pub(super) struct RawBlock {
    pub start: usize,
    pub end: usize,
    /// Normal successors in edge order (conditional: taken, then fall-through).
    pub normal: Vec<usize>,
    /// Handler blocks in dispatch order, with the guard of the matching table entry.
    pub exceptional: Vec<(Option<TypeRef>, usize)>,
    /// Execution continues past the last instruction of the code.
    pub falls_off: bool,
}

#[derive(Debug, Clone)]
struct ResolvedHandler {
    start: usize,
    end: usize,
    handler: usize,
    guard: Option<TypeRef>,
}

/// Block structure of one method body.
#[derive(Debug)]
pub(super) struct Layout {
    labels: HashMap<Label, usize>,
    pub blocks: Vec<RawBlock>,
    /// Guard caught on entry to each handler block; `None` if entries disagree or catch all.
    pub handler_guards: HashMap<usize, Option<TypeRef>>,
}

pub(super) fn malformed(method: &MethodRef, offset: usize, message: impl Into<String>) -> Error {
    Error::MalformedCode {
        method: method.clone(),
        offset,
        message: message.into(),
    }
}

impl Layout {
    pub fn build(method: &MethodRef, code: &MethodCode) -> Result<Layout> {
        let instructions = &code.instructions;
        let count = instructions.len();
        if count == 0 {
            return Err(malformed(method, 0, "method body is empty"));
        }

        let mut labels = HashMap::new();
        for (i, insn) in instructions.iter().enumerate() {
            if let CfInstruction::Label(label) = insn {
                if labels.insert(*label, i).is_some() {
                    return Err(malformed(method, i, format!("label {label} defined twice")));
                }
            }
        }
        let resolve = |label: Label, offset: usize| -> Result<usize> {
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| malformed(method, offset, format!("undefined label {label}")))
        };

        let mut handlers = Vec::with_capacity(code.handlers.len());
        for entry in &code.handlers {
            let start = resolve(entry.start, 0)?;
            let end = resolve(entry.end, 0)?;
            let handler = resolve(entry.handler, 0)?;
            if start > end {
                return Err(malformed(
                    method,
                    start,
                    format!("protected range {}..{} is reversed", entry.start, entry.end),
                ));
            }
            handlers.push(ResolvedHandler {
                start,
                end,
                handler,
                guard: entry.guard.clone(),
            });
        }
        let covered = |i: usize| handlers.iter().any(|h| h.start <= i && i < h.end);

        let mut raw_leaders = BTreeSet::new();
        raw_leaders.insert(0);
        for (i, insn) in instructions.iter().enumerate() {
            for target in insn.branch_targets() {
                raw_leaders.insert(resolve(target, i)?);
            }
            if insn.ends_block() || (insn.may_throw() && covered(i)) {
                raw_leaders.insert(i + 1);
            }
        }
        for h in &handlers {
            raw_leaders.extend([h.start, h.end, h.handler]);
        }

        let is_label = |i: usize| matches!(instructions[i], CfInstruction::Label(_));
        let leaders: BTreeSet<usize> = raw_leaders
            .into_iter()
            .filter(|&p| p < count)
            .map(|mut p| {
                while p > 0 && is_label(p - 1) {
                    p -= 1;
                }
                p
            })
            .collect();
        let leaders: Vec<usize> = leaders.into_iter().collect();

        let mut block_of = vec![0; count];
        let mut blocks = Vec::with_capacity(leaders.len());
        for (k, &start) in leaders.iter().enumerate() {
            let end = leaders.get(k + 1).copied().unwrap_or(count);
            block_of[start..end].fill(k);
            blocks.push(RawBlock {
                start,
                end,
                normal: Vec::new(),
                exceptional: Vec::new(),
                falls_off: false,
            });
        }

        let block_count = blocks.len();
        for k in 0..block_count {
            let (start, end) = (blocks[k].start, blocks[k].end);
            let first_real = (start..end).find(|&i| !is_label(i));
            let last_real = (start..end).rev().find(|&i| !is_label(i));
            let mut normal = Vec::new();
            let mut falls_off = false;
            let mut fallthrough = |normal: &mut Vec<usize>| {
                if k + 1 < block_count {
                    normal.push(k + 1);
                } else {
                    falls_off = true;
                }
            };
            match last_real.map(|i| (i, &instructions[i])) {
                Some((i, insn)) if insn.ends_block() => {
                    for target in insn.branch_targets() {
                        normal.push(block_of[resolve(target, i)?]);
                    }
                    if insn.falls_through() {
                        fallthrough(&mut normal);
                    }
                }
                _ => fallthrough(&mut normal),
            }

            let mut exceptional: Vec<(Option<TypeRef>, usize)> = Vec::new();
            let throws = (start..end).any(|i| instructions[i].may_throw());
            if throws {
                let anchor = first_real.unwrap_or(start);
                for h in handlers.iter().filter(|h| h.start <= anchor && anchor < h.end) {
                    let target = block_of[h.handler];
                    if !exceptional.iter().any(|(_, t)| *t == target) {
                        exceptional.push((h.guard.clone(), target));
                    }
                    if h.guard.is_none() {
                        break;
                    }
                }
            }

            blocks[k].normal = normal;
            blocks[k].exceptional = exceptional;
            blocks[k].falls_off = falls_off;
        }

        let mut handler_guards: HashMap<usize, Option<TypeRef>> = HashMap::new();
        for h in &handlers {
            let block = block_of[h.handler];
            handler_guards
                .entry(block)
                .and_modify(|guard| {
                    if *guard != h.guard {
                        *guard = None;
                    }
                })
                .or_insert_with(|| h.guard.clone());
        }

        Ok(Layout {
            labels,
            blocks,
            handler_guards,
        })
    }

    /// Instruction index of `label`.
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    /// Returns `true` if `block` is the entry of an exception handler.
    pub fn is_handler(&self, block: usize) -> bool {
        self.handler_guards.contains_key(&block)
    }

    /// Control-flow graph over the raw blocks, normal and exceptional edges.
    pub fn graph(&self) -> AdjacencyGraph {
        let mut graph = AdjacencyGraph::new(self.blocks.len());
        for (k, block) in self.blocks.iter().enumerate() {
            for &succ in &block.normal {
                graph.add_edge(k, succ);
            }
            for (_, succ) in &block.exceptional {
                graph.add_edge(k, *succ);
            }
        }
        graph
    }
}
