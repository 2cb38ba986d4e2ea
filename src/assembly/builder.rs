//! Programmatic construction of instruction lists.
//!
//! [`BodyBuilder`] hands out labels before the instructions they name exist, which is what
//! forward branches need:
//!
//! ```rust
//! use cilmixin::assembly::{BodyBuilder, OpCode};
//! use cilmixin::metadata::token::Token;
//!
//! let mut builder = BodyBuilder::<Token>::new();
//! let done = builder.label();
//! builder
//!     .argument(OpCode::LDARG_0, 0)
//!     .branch(OpCode::BRFALSE_S, done)
//!     .op(OpCode::NOP)
//!     .mark(done)
//!     .op(OpCode::RET);
//!
//! let (instructions, _labels) = builder.build()?;
//! assert_eq!(instructions.len(), 4);
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::collections::{HashMap, HashSet};

use crate::{
    assembly::{encoder::assign_offsets, Immediate, Instruction, Label, Labels, OpCode, Operand},
    Error::Encode,
    Result,
};

/// Builder for instruction lists with symbolic branch targets.
#[derive(Debug, Clone)]
pub struct BodyBuilder<M> {
    labels: Labels,
    instructions: Vec<Instruction<M>>,
    pending: Vec<Label>,
    aliases: HashMap<Label, Label>,
    bound: HashSet<Label>,
    conflicts: Vec<Label>,
}

impl<M> Default for BodyBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> BodyBuilder<M> {
    /// Creates a builder with a fresh label allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_labels(Labels::default())
    }

    /// Creates a builder that continues an existing label allocator.
    #[must_use]
    pub fn with_labels(labels: Labels) -> Self {
        BodyBuilder {
            labels,
            instructions: Vec::new(),
            pending: Vec::new(),
            aliases: HashMap::new(),
            bound: HashSet::new(),
            conflicts: Vec::new(),
        }
    }

    /// Allocates a label to be bound later with [`BodyBuilder::mark`].
    pub fn label(&mut self) -> Label {
        self.labels.fresh()
    }

    /// Binds `label` to the next emitted instruction. Several labels may name the same
    /// instruction.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        if !self.bound.insert(label) {
            self.conflicts.push(label);
        }
        self.pending.push(label);
        self
    }

    /// Appends an instruction.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand<M>) -> &mut Self {
        let label = match self.pending.first() {
            Some(first) => {
                let first = *first;
                for alias in self.pending.drain(1..) {
                    self.aliases.insert(alias, first);
                }
                self.pending.clear();
                first
            }
            None => self.labels.fresh(),
        };

        self.instructions.push(Instruction::new(label, opcode, operand));
        self
    }

    /// Appends an instruction without operand.
    pub fn op(&mut self, opcode: OpCode) -> &mut Self {
        self.emit(opcode, Operand::None)
    }

    /// Appends an instruction with a member operand.
    pub fn member(&mut self, opcode: OpCode, member: M) -> &mut Self {
        self.emit(opcode, Operand::Member(member))
    }

    /// Appends a branch.
    pub fn branch(&mut self, opcode: OpCode, target: Label) -> &mut Self {
        self.emit(opcode, Operand::Target(target))
    }

    /// Appends a `switch`.
    pub fn switch(&mut self, targets: Vec<Label>) -> &mut Self {
        self.emit(OpCode::SWITCH, Operand::Switch(targets))
    }

    /// Appends a local variable instruction.
    pub fn local(&mut self, opcode: OpCode, index: u16) -> &mut Self {
        if opcode.implied_local().is_some() {
            return self.op(opcode);
        }
        self.emit(opcode, Operand::Local(index))
    }

    /// Appends an argument instruction. `ldarg.N` forms carry no operand.
    pub fn argument(&mut self, opcode: OpCode, index: u16) -> &mut Self {
        if opcode.operand_type().size() == Some(0) {
            return self.op(opcode);
        }
        self.emit(opcode, Operand::Argument(index))
    }

    /// Appends the most compact form of loading a 32-bit constant.
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.op(OpCode::LDC_I4_M1),
            0 => self.op(OpCode::LDC_I4_0),
            1 => self.op(OpCode::LDC_I4_1),
            2 => self.op(OpCode::LDC_I4_2),
            3 => self.op(OpCode::LDC_I4_3),
            4 => self.op(OpCode::LDC_I4_4),
            5 => self.op(OpCode::LDC_I4_5),
            6 => self.op(OpCode::LDC_I4_6),
            7 => self.op(OpCode::LDC_I4_7),
            8 => self.op(OpCode::LDC_I4_8),
            _ => match i8::try_from(value) {
                Ok(short) => self.emit(OpCode::LDC_I4_S, Operand::Immediate(Immediate::Int8(short))),
                Err(_) => self.emit(OpCode::LDC_I4, Operand::Immediate(Immediate::Int32(value))),
            },
        }
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Finishes the list, returning the instructions with offsets assigned and the label
    /// allocator for further use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if a label was marked twice, marked without a following
    /// instruction, or used as a branch target without being marked.
    pub fn build(mut self) -> Result<(Vec<Instruction<M>>, Labels)> {
        if let Some(label) = self.conflicts.first() {
            return Err(Encode(format!("label {label} marked more than once")));
        }
        if let Some(label) = self.pending.first() {
            return Err(Encode(format!("label {label} marks no instruction")));
        }

        let defined: HashSet<Label> = self.instructions.iter().map(|i| i.label).collect();
        let aliases = &self.aliases;
        let canonical = |label: Label| -> Result<Label> {
            let label = aliases.get(&label).copied().unwrap_or(label);
            if defined.contains(&label) {
                Ok(label)
            } else {
                Err(Encode(format!("branch to unbound label {label}")))
            }
        };

        for instruction in &mut self.instructions {
            match &mut instruction.operand {
                Operand::Target(label) => *label = canonical(*label)?,
                Operand::Switch(labels) => {
                    for label in labels.iter_mut() {
                        *label = canonical(*label)?;
                    }
                }
                _ => {}
            }
        }

        assign_offsets(&mut self.instructions);
        Ok((self.instructions, self.labels))
    }
}
