//! Parallel register moves.
//!
//! Moving arguments from one convention to another is a parallel assignment: every
//! destination must receive the value its source held *before* any move ran. When a
//! destination is still needed as a source, the moves are reordered, and a cycle is broken
//! by parking one register in a scratch register first.

use crate::error::{LinkError, Result};

/// What a single move does with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// 32-bit register move.
    Int32,
    /// 64-bit register move.
    Int64,
    /// `dst = src + offset`.
    Address(u32),
}

/// `dst <- src`, registers given by their hardware number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub dst: u8,
    pub src: u8,
    pub kind: MoveKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Copy all 64 bits of `reg` into `scratch`.
    Save { scratch: u8, reg: u8 },
    Move(Move),
}

/// Orders `moves` so that no source is overwritten before it is read.
///
/// Among the moves that are safe to emit, the earliest declared goes first; when every
/// pending destination is still read by another move, the first pending destination is
/// saved into `scratch` and its readers are redirected there.
pub fn sequence(moves: Vec<Move>, scratch: u8) -> Result<Vec<Step>> {
    let mut pending: Vec<Move> = moves.into_iter().filter(|m| !is_noop(m)).collect();
    let mut steps = Vec::with_capacity(pending.len() + 1);

    while !pending.is_empty() {
        let ready = (0..pending.len()).find(|&i| {
            let dst = pending[i].dst;
            pending
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || other.src != dst)
        });

        if let Some(i) = ready {
            steps.push(Step::Move(pending.remove(i)));
            continue;
        }

        if pending.iter().any(|m| m.src == scratch) {
            return Err(LinkError::UnresolvableShuffle);
        }

        let victim = pending[0].dst;
        steps.push(Step::Save { scratch, reg: victim });
        for m in pending.iter_mut().filter(|m| m.src == victim) {
            m.src = scratch;
        }
    }

    Ok(steps)
}

fn is_noop(m: &Move) -> bool {
    m.dst == m.src && !matches!(m.kind, MoveKind::Address(offset) if offset != 0)
}
