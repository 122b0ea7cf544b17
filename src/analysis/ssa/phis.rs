//! Phi simplification.
//!
//! - [`eliminate_trivial_phis`] replaces every phi that merges a single value (ignoring
//!   self-references) by that value. Removing one phi can make phis that used it trivial,
//!   so users are revisited until nothing changes. Running it on an already reduced
//!   function changes nothing.
//! - [`remove_dead_phis`] deletes phis whose value never reaches an instruction, including
//!   cycles of phis that only feed each other.

use std::collections::HashSet;

use crate::{
    analysis::ssa::{PhiId, SsaFunction, ValueDef, ValueUser},
    Result,
};

/// Removes trivial phis. Returns the number removed.
///
/// # Errors
///
/// Returns an error if the use-lists are inconsistent.
pub fn eliminate_trivial_phis(func: &mut SsaFunction) -> Result<usize> {
    let mut worklist: Vec<PhiId> = func.phis().map(|phi| phi.id()).collect();
    worklist.reverse();
    let mut removed = 0;

    while let Some(phi) = worklist.pop() {
        let node = func.phi(phi);
        if node.is_removed() {
            continue;
        }
        let Some(same) = node.trivial_operand() else {
            continue;
        };
        let value = node.value();

        let dependents: Vec<PhiId> = func
            .value(value)
            .users()
            .iter()
            .filter_map(|user| match user {
                ValueUser::Phi(p) if *p != phi => Some(*p),
                _ => None,
            })
            .collect();

        func.replace_all_uses(value, same);
        func.remove_phi(phi)?;
        removed += 1;
        worklist.extend(dependents);
    }
    Ok(removed)
}

/// Removes phis whose value is never read by an instruction. Returns the number removed.
///
/// # Errors
///
/// Returns an error if the use-lists are inconsistent.
pub fn remove_dead_phis(func: &mut SsaFunction) -> Result<usize> {
    let mut live: HashSet<PhiId> = HashSet::new();
    let mut worklist: Vec<PhiId> = func
        .phis()
        .filter(|phi| {
            func.value(phi.value())
                .users()
                .iter()
                .any(|user| matches!(user, ValueUser::Instruction(_)))
        })
        .map(|phi| phi.id())
        .collect();

    while let Some(phi) = worklist.pop() {
        if !live.insert(phi) {
            continue;
        }
        for &operand in func.phi(phi).operands() {
            if let ValueDef::Phi(source) = func.value(operand).def() {
                if !live.contains(&source) {
                    worklist.push(source);
                }
            }
        }
    }

    let dead: Vec<PhiId> = func
        .phis()
        .map(|phi| phi.id())
        .filter(|phi| !live.contains(phi))
        .collect();
    for &phi in &dead {
        func.set_phi_operands(phi, Vec::new());
    }
    for &phi in &dead {
        func.remove_phi(phi)?;
    }
    Ok(dead.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ssa::{BlockId, ConstValue, Position, SsaOp},
        metadata::{MethodRef, Proto, TypeRef, ValueType},
    };

    /// B0 -> B1 (loop header) <-> B2, B1 -> B3
    fn looped() -> (SsaFunction, [BlockId; 4]) {
        let mut func = SsaFunction::new(
            MethodRef::new(TypeRef::class("T"), "m", Proto::new(TypeRef::int(), vec![])),
            true,
        );
        let blocks = [
            func.add_block(),
            func.add_block(),
            func.add_block(),
            func.add_block(),
        ];
        (func, blocks)
    }

    #[test]
    fn test_trivial_loop_phi_chain() {
        let (mut func, [b0, b1, b2, b3]) = looped();
        let (_, c) = func.append_value(
            b0,
            SsaOp::Const(ConstValue::Int(7)),
            ValueType::Int,
            Position::at(0),
        );
        func.append_instruction(b0, SsaOp::Goto { target: b1 }, None, Position::at(1));
        func.add_predecessor(b1, b0);

        // b1: p1 = phi(c, p2); b2: p2 = phi(p1)
        let p1 = func.insert_phi(b1, ValueType::Int);
        let p2 = func.insert_phi(b2, ValueType::Int);
        let (v1, v2) = (func.phi(p1).value(), func.phi(p2).value());
        func.set_phi_operands(p1, vec![c, v2]);
        func.set_phi_operands(p2, vec![v1]);
        func.append_instruction(
            b1,
            SsaOp::If {
                cond: crate::assembly::IfCond::Eq,
                left: v1,
                right: None,
                then_target: b2,
                else_target: b3,
            },
            None,
            Position::at(2),
        );
        func.add_predecessor(b2, b1);
        func.add_predecessor(b3, b1);
        func.append_instruction(b2, SsaOp::Goto { target: b1 }, None, Position::at(3));
        func.add_predecessor(b1, b2);
        func.append_instruction(b3, SsaOp::Return { value: Some(v1) }, None, Position::at(4));

        assert_eq!(eliminate_trivial_phis(&mut func).unwrap(), 2);
        assert_eq!(func.phi_count(), 0);
        assert_eq!(
            func.terminator(b3).unwrap().op(),
            &SsaOp::Return { value: Some(c) }
        );

        let snapshot = func.clone();
        assert_eq!(eliminate_trivial_phis(&mut func).unwrap(), 0);
        assert_eq!(func, snapshot);
    }

    #[test]
    fn test_dead_phi_cycle() {
        let (mut func, [b0, b1, b2, b3]) = looped();
        let (_, c) = func.append_value(
            b0,
            SsaOp::Const(ConstValue::Int(1)),
            ValueType::Int,
            Position::at(0),
        );
        let (_, d) = func.append_value(
            b0,
            SsaOp::Const(ConstValue::Int(2)),
            ValueType::Int,
            Position::at(1),
        );
        func.append_instruction(b0, SsaOp::Goto { target: b1 }, None, Position::at(2));
        func.add_predecessor(b1, b0);
        let p1 = func.insert_phi(b1, ValueType::Int);
        let v1 = func.phi(p1).value();
        let p2 = func.insert_phi(b2, ValueType::Int);
        let v2 = func.phi(p2).value();
        func.set_phi_operands(p1, vec![c, v2]);
        func.set_phi_operands(p2, vec![v1, d]);
        func.append_instruction(b1, SsaOp::Goto { target: b3 }, None, Position::at(3));
        func.append_instruction(b3, SsaOp::Return { value: Some(c) }, None, Position::at(4));

        assert_eq!(remove_dead_phis(&mut func).unwrap(), 2);
        assert_eq!(func.phi_count(), 0);
        assert!(func.value(d).is_unused());
    }
}
