//! Instruction representation.
//!
//! A decoded [`Instruction`] keeps its byte offset for diagnostics, but branch targets refer to
//! other instructions by [`Label`], so instruction lists can be spliced, prefixed and re-encoded
//! without any offset bookkeeping. Metadata operands are generic over the member representation
//! `M`: raw [`crate::metadata::token::Token`]s, module handles, or symbolic members of a module
//! that is being imported from.

use std::fmt;

use crate::assembly::opcodes::OpCode;

/// Shape of an instruction's inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit displacement from the end of the instruction
    ShortBranchTarget,
    /// Signed 32-bit displacement from the end of the instruction
    BranchTarget,
    /// Signed 8-bit immediate
    Int8,
    /// Unsigned 8-bit immediate
    UInt8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit float immediate
    Float32,
    /// 64-bit float immediate
    Float64,
    /// 8-bit local index
    ShortLocal,
    /// 16-bit local index
    Local,
    /// 8-bit argument index
    ShortArgument,
    /// 16-bit argument index
    Argument,
    /// Field token
    Field,
    /// Method token
    Method,
    /// Type token
    Type,
    /// User string token
    String,
    /// Standalone signature token
    Signature,
    /// Type, field or method token
    Token,
    /// Jump table
    Switch,
    /// SSA phi node, never valid in a method body
    Phi,
}

impl OperandType {
    /// Encoded size of the operand, `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        match self {
            OperandType::None => Some(0),
            OperandType::ShortBranchTarget
            | OperandType::Int8
            | OperandType::UInt8
            | OperandType::ShortLocal
            | OperandType::ShortArgument => Some(1),
            OperandType::Local | OperandType::Argument => Some(2),
            OperandType::BranchTarget
            | OperandType::Int32
            | OperandType::Float32
            | OperandType::Field
            | OperandType::Method
            | OperandType::Type
            | OperandType::String
            | OperandType::Signature
            | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch | OperandType::Phi => None,
        }
    }

    /// The token kind expected by metadata operands.
    #[must_use]
    pub const fn token_kind(&self) -> Option<TokenKind> {
        match self {
            OperandType::Field => Some(TokenKind::Field),
            OperandType::Method => Some(TokenKind::Method),
            OperandType::Type => Some(TokenKind::Type),
            OperandType::String => Some(TokenKind::String),
            OperandType::Signature => Some(TokenKind::Signature),
            OperandType::Token => Some(TokenKind::Member),
            _ => None,
        }
    }
}

/// What a metadata operand is expected to refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A type
    Type,
    /// A field
    Field,
    /// A method
    Method,
    /// A user string
    String,
    /// A standalone signature
    Signature,
    /// A type, field or method (`ldtoken`)
    Member,
}

/// Control flow behavior of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method, then falls through
    Call,
    /// Returns from the method or filter
    Return,
    /// Jump table
    Switch,
    /// Throws
    Throw,
    /// Ends a finally or fault block
    EndFinally,
    /// Leaves a protected region
    Leave,
    /// Prefix modifying the next instruction
    Meta,
    /// Debugger breakpoint
    Break,
}

/// Immediate operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// `ldc.i4.s`
    Int8(i8),
    /// `unaligned.`, `no.`
    UInt8(u8),
    /// `ldc.i4`
    Int32(i32),
    /// `ldc.i8`
    Int64(i64),
    /// `ldc.r4`
    Float32(f32),
    /// `ldc.r8`
    Float64(f64),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value:?}"),
            Immediate::Float64(value) => write!(f, "{value:?}"),
        }
    }
}

/// Position-independent identity of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L_{:04}", self.0)
    }
}

/// Allocator of fresh labels. One allocator serves all instruction lists of a method body so
/// that lists can be combined without clashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Labels {
    next: u32,
}

impl Labels {
    /// Creates an allocator that starts after `used`.
    #[must_use]
    pub fn starting_at(next: u32) -> Self {
        Labels { next }
    }

    /// Returns a label that has not been handed out before.
    pub fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }

    /// The next label value that would be handed out.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<M> {
    /// No operand
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Local variable index
    Local(u16),
    /// Argument index
    Argument(u16),
    /// Branch target
    Target(Label),
    /// Jump table targets
    Switch(Vec<Label>),
    /// Metadata reference
    Member(M),
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<M> {
    /// Identity used by branch operands and exception handlers
    pub label: Label,
    /// Byte offset within the encoded stream
    pub offset: u32,
    /// The opcode
    pub opcode: OpCode,
    /// The operand
    pub operand: Operand<M>,
}

impl<M> Instruction<M> {
    /// Creates an instruction at offset 0, to be placed by the encoder.
    pub fn new(label: Label, opcode: OpCode, operand: Operand<M>) -> Self {
        Instruction {
            label,
            offset: 0,
            opcode,
            operand,
        }
    }

    /// Encoded size in bytes, opcode included.
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match (&self.operand, self.opcode.operand_type().size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len() as u32,
            (_, Some(size)) => size,
            (_, None) => 0,
        };
        self.opcode.size() + operand
    }

    /// Returns `true` for call-family instructions (`call`, `callvirt`, `newobj`, ...).
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.opcode.flow() == crate::assembly::FlowType::Call
    }

    /// Returns the branch targets of the instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Target(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// The local variable index, explicit or implied by the opcode.
    #[must_use]
    pub fn local(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(index) => Some(index),
            _ => self.opcode.implied_local(),
        }
    }

    /// The argument index, explicit or implied by the opcode.
    #[must_use]
    pub fn argument(&self) -> Option<u16> {
        match self.operand {
            Operand::Argument(index) => Some(index),
            _ => self.opcode.implied_argument(),
        }
    }

    /// Points a local variable instruction at `index`, switching to the smallest form of the
    /// same family that can encode it. Other instructions are left alone.
    pub fn set_local(&mut self, index: u16) {
        let (implied, short, long): (&[OpCode], OpCode, OpCode) = match self.opcode {
            OpCode::LDLOC_0
            | OpCode::LDLOC_1
            | OpCode::LDLOC_2
            | OpCode::LDLOC_3
            | OpCode::LDLOC_S
            | OpCode::LDLOC => (
                &[OpCode::LDLOC_0, OpCode::LDLOC_1, OpCode::LDLOC_2, OpCode::LDLOC_3],
                OpCode::LDLOC_S,
                OpCode::LDLOC,
            ),
            OpCode::STLOC_0
            | OpCode::STLOC_1
            | OpCode::STLOC_2
            | OpCode::STLOC_3
            | OpCode::STLOC_S
            | OpCode::STLOC => (
                &[OpCode::STLOC_0, OpCode::STLOC_1, OpCode::STLOC_2, OpCode::STLOC_3],
                OpCode::STLOC_S,
                OpCode::STLOC,
            ),
            OpCode::LDLOCA_S | OpCode::LDLOCA => (&[], OpCode::LDLOCA_S, OpCode::LDLOCA),
            _ => return,
        };

        (self.opcode, self.operand) = match implied.get(usize::from(index)) {
            Some(opcode) => (*opcode, Operand::None),
            None if index <= u16::from(u8::MAX) => (short, Operand::Local(index)),
            None => (long, Operand::Local(index)),
        };
    }

    /// The metadata operand, if any.
    pub fn member(&self) -> Option<&M> {
        match &self.operand {
            Operand::Member(member) => Some(member),
            _ => None,
        }
    }

    /// Converts the metadata operand, keeping everything else.
    ///
    /// # Errors
    ///
    /// Propagates the error of `map`.
    pub fn try_map_member<N, E, F>(self, map: F) -> Result<Instruction<N>, E>
    where
        F: FnOnce(M) -> Result<N, E>,
    {
        let operand = match self.operand {
            Operand::None => Operand::None,
            Operand::Immediate(value) => Operand::Immediate(value),
            Operand::Local(index) => Operand::Local(index),
            Operand::Argument(index) => Operand::Argument(index),
            Operand::Target(label) => Operand::Target(label),
            Operand::Switch(labels) => Operand::Switch(labels),
            Operand::Member(member) => Operand::Member(map(member)?),
        };

        Ok(Instruction {
            label: self.label,
            offset: self.offset,
            opcode: self.opcode,
            operand,
        })
    }
}

impl<M: fmt::Display> fmt::Display for Instruction<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(value) => write!(f, " {value}"),
            Operand::Local(index) => write!(f, " V_{index}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
            Operand::Target(label) => write!(f, " {label}"),
            Operand::Switch(labels) => {
                f.write_str(" (")?;
                for (index, label) in labels.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label}")?;
                }
                f.write_str(")")
            }
            Operand::Member(member) => write!(f, " {member}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn sizes() {
        let ret: Instruction<Token> = Instruction::new(Label(0), OpCode::RET, Operand::None);
        assert_eq!(ret.size(), 1);

        let ceq: Instruction<Token> = Instruction::new(Label(1), OpCode::CEQ, Operand::None);
        assert_eq!(ceq.size(), 2);

        let call = Instruction::new(
            Label(2),
            OpCode::CALL,
            Operand::Member(Token::new(0x0600_0001)),
        );
        assert_eq!(call.size(), 5);
        assert!(call.is_call());

        let switch: Instruction<Token> = Instruction::new(
            Label(3),
            OpCode::SWITCH,
            Operand::Switch(vec![Label(0), Label(1), Label(2)]),
        );
        assert_eq!(switch.size(), 1 + 4 + 12);
        assert_eq!(switch.targets(), vec![Label(0), Label(1), Label(2)]);

        let ldloc: Instruction<Token> =
            Instruction::new(Label(4), OpCode::LDLOC, Operand::Local(300));
        assert_eq!(ldloc.size(), 4);
    }

    #[test]
    fn local_forms_follow_the_index() {
        let mut store: Instruction<Token> = Instruction::new(Label(0), OpCode::STLOC_0, Operand::None);
        assert_eq!(store.local(), Some(0));

        store.set_local(3);
        assert_eq!((store.opcode, store.local()), (OpCode::STLOC_3, Some(3)));
        store.set_local(4);
        assert_eq!(store.opcode, OpCode::STLOC_S);
        assert_eq!(store.operand, Operand::Local(4));
        store.set_local(256);
        assert_eq!(store.opcode, OpCode::STLOC);
        assert_eq!(store.local(), Some(256));

        let mut address: Instruction<Token> =
            Instruction::new(Label(1), OpCode::LDLOCA_S, Operand::Local(0));
        address.set_local(1);
        assert_eq!((address.opcode, address.local()), (OpCode::LDLOCA_S, Some(1)));

        let mut arg: Instruction<Token> = Instruction::new(Label(2), OpCode::LDARG_2, Operand::None);
        arg.set_local(1);
        assert_eq!(arg.opcode, OpCode::LDARG_2);
        assert_eq!((arg.local(), arg.argument()), (None, Some(2)));
    }

    #[test]
    fn fresh_labels_are_unique() {
        let mut labels = Labels::default();
        let a = labels.fresh();
        let b = labels.fresh();
        assert_ne!(a, b);
        assert_eq!(labels.peek(), 2);
    }

    #[test]
    fn map_member_keeps_identity() {
        let call = Instruction::new(
            Label(7),
            OpCode::CALLVIRT,
            Operand::Member(Token::new(0x0A00_0002)),
        );
        let mapped: Instruction<u32> = call
            .try_map_member(|token| Ok::<_, ()>(token.row()))
            .unwrap();
        assert_eq!(mapped.label, Label(7));
        assert_eq!(mapped.member(), Some(&2));
        assert_eq!(mapped.to_string(), "L_0007: callvirt 2");
    }
}
