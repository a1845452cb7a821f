//! Instruction buffer with forward-referencing labels.

use crate::inst::{Inst, Label};
use std::fmt::Write as _;

/// Sequence of emitted instructions for one function, plus the label
/// positions branch resolution needs at execution time.
#[derive(Clone, Debug, Default)]
pub struct AsmBuffer {
    insts: Vec<Inst>,
    /// Label index -> instruction position. `u32::MAX` while unbound.
    labels: Vec<u32>,
}

const UNBOUND: u32 = u32::MAX;

impl AsmBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    /// Reserve a label for later binding; jumps may reference it first.
    pub fn new_label(&mut self) -> Label {
        let l = Label(self.labels.len() as u32);
        self.labels.push(UNBOUND);
        l
    }

    /// Bind `label` to the position of the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        debug_assert_eq!(self.labels[label.0 as usize], UNBOUND, "label bound twice");
        self.labels[label.0 as usize] = self.insts.len() as u32;
    }

    /// Instruction position a bound label points at.
    pub fn target(&self, label: Label) -> u32 {
        let pos = self.labels[label.0 as usize];
        debug_assert_ne!(pos, UNBOUND, "jump to unbound label");
        pos
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Human-readable listing with label markers interleaved.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (pos, inst) in self.insts.iter().enumerate() {
            for (li, &target) in self.labels.iter().enumerate() {
                if target == pos as u32 {
                    let _ = writeln!(out, "L{li}:");
                }
            }
            let _ = writeln!(out, "  {inst}");
        }
        // Labels bound past the last instruction (loop exits at the end).
        for (li, &target) in self.labels.iter().enumerate() {
            if target == self.insts.len() as u32 {
                let _ = writeln!(out, "L{li}:");
            }
        }
        out
    }
}
