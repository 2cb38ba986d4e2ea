//! CIL instruction stream decoding.
//!
//! [`decode`] turns a raw instruction stream into [`Instruction`]s in two passes. The first pass
//! reads opcodes and operands sequentially, recording branch and switch targets as absolute byte
//! offsets. The second pass maps each recorded offset to the label of the instruction starting
//! there, using a binary search over the decoded offsets. A target that does not land on an
//! instruction boundary inside the stream fails the whole decode: once offsets are inconsistent
//! the stream cannot be continued safely.
//!
//! Metadata tokens are handed to a [`TokenResolver`] together with the kind of member the
//! opcode expects, so callers decide what a member operand becomes.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilmixin::assembly::{decode, Labels, OpCode, Operand, RawTokens};
//!
//! // ldarg.0; brtrue.s +1; nop; ret
//! let code = [0x02, 0x2D, 0x01, 0x00, 0x2A];
//! let mut labels = Labels::default();
//! let instructions = decode(&code, 0, &RawTokens, &mut labels)?;
//!
//! assert_eq!(instructions.len(), 4);
//! assert_eq!(instructions[1].opcode, OpCode::BRTRUE_S);
//! assert_eq!(instructions[1].operand, Operand::Target(instructions[3].label));
//! # Ok::<(), cilmixin::Error>(())
//! ```

use crate::{
    assembly::{Immediate, Instruction, Label, Labels, OpCode, Operand, OperandType, TokenKind},
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Turns metadata tokens found in an instruction stream into members.
pub trait TokenResolver {
    /// The member representation produced.
    type Member;

    /// Resolves `token`, which the opcode expects to be of `kind`.
    ///
    /// # Errors
    ///
    /// Implementations fail if the token does not refer to a valid member of the expected kind.
    fn resolve(&self, token: Token, kind: TokenKind) -> Result<Self::Member>;
}

/// Resolver that keeps tokens as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTokens;

impl TokenResolver for RawTokens {
    type Member = Token;

    fn resolve(&self, token: Token, _kind: TokenKind) -> Result<Token> {
        Ok(token)
    }
}

enum Pending {
    Single(usize, i64),
    Table(usize, Vec<i64>),
}

/// Decodes a complete instruction stream.
///
/// Labels for the decoded instructions are taken from `labels`, so decoding into an existing
/// body keeps labels unique across everything that allocator has handed out.
///
/// # Arguments
///
/// * `code` - The raw instruction bytes, without method header
/// * `local_count` - Number of locals; any local index at or above it is rejected
/// * `resolver` - Resolves metadata tokens to members
/// * `labels` - Label allocator
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] for unknown opcodes, phi operands, local indices out of
/// range, truncated operands, branch targets outside the stream or inside an instruction, and
/// for tokens the resolver rejects.
pub fn decode<R: TokenResolver>(
    code: &[u8],
    local_count: usize,
    resolver: &R,
    labels: &mut Labels,
) -> Result<Vec<Instruction<R::Member>>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    let mut pending = Vec::new();

    while parser.has_more_data() {
        let offset = parser.pos() as u32;
        let index = instructions.len();
        let (opcode, operand) =
            decode_one(&mut parser, local_count, resolver, index, &mut pending)
                .map_err(|error| relocate(error, offset))?;

        instructions.push(Instruction {
            label: labels.fresh(),
            offset,
            opcode,
            operand,
        });
    }

    for entry in pending {
        match entry {
            Pending::Single(index, target) => {
                let label = target_label(&instructions, code.len(), target)
                    .map_err(|message| decode_error!(instructions[index].offset, message))?;
                instructions[index].operand = Operand::Target(label);
            }
            Pending::Table(index, targets) => {
                let mut resolved = Vec::with_capacity(targets.len());
                for target in targets {
                    resolved.push(
                        target_label(&instructions, code.len(), target).map_err(|message| {
                            decode_error!(instructions[index].offset, message)
                        })?,
                    );
                }
                instructions[index].operand = Operand::Switch(resolved);
            }
        }
    }

    Ok(instructions)
}

fn relocate(error: crate::Error, offset: u32) -> crate::Error {
    match error {
        crate::Error::Decode { .. } => error,
        other => decode_error!(offset, other.to_string()),
    }
}

fn decode_one<R: TokenResolver>(
    parser: &mut Parser,
    local_count: usize,
    resolver: &R,
    index: usize,
    pending: &mut Vec<Pending>,
) -> Result<(OpCode, Operand<R::Member>)> {
    let offset = parser.pos() as u32;
    let first = parser.read_le::<u8>()?;
    let opcode = if first == crate::assembly::opcodes::FE_PREFIX {
        let second = parser.read_le::<u8>()?;
        OpCode::from_extended(second)
            .ok_or_else(|| decode_error!(offset, "unknown opcode FE {:02X}", second))?
    } else {
        OpCode::from_byte(first)
            .ok_or_else(|| decode_error!(offset, "unknown opcode {:02X}", first))?
    };

    if let Some(local) = opcode.implied_local() {
        check_local(offset, local, local_count)?;
    }

    let operand = match opcode.operand_type() {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::ShortLocal => {
            let local = u16::from(parser.read_le::<u8>()?);
            check_local(offset, local, local_count)?;
            Operand::Local(local)
        }
        OperandType::Local => {
            let local = parser.read_le::<u16>()?;
            check_local(offset, local, local_count)?;
            Operand::Local(local)
        }
        OperandType::ShortArgument => Operand::Argument(u16::from(parser.read_le::<u8>()?)),
        OperandType::Argument => Operand::Argument(parser.read_le::<u16>()?),
        OperandType::ShortBranchTarget => {
            let displacement = i64::from(parser.read_le::<i8>()?);
            pending.push(Pending::Single(index, parser.pos() as i64 + displacement));
            Operand::Target(Label::default())
        }
        OperandType::BranchTarget => {
            let displacement = i64::from(parser.read_le::<i32>()?);
            pending.push(Pending::Single(index, parser.pos() as i64 + displacement));
            Operand::Target(Label::default())
        }
        OperandType::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            if count > parser.remaining() / 4 {
                return Err(decode_error!(offset, "switch table with {} entries", count));
            }
            let mut displacements = Vec::with_capacity(count);
            for _ in 0..count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }
            // Relative to the end of the whole operand
            let end = parser.pos() as i64;
            pending.push(Pending::Table(
                index,
                displacements.into_iter().map(|d| end + d).collect(),
            ));
            Operand::Switch(Vec::new())
        }
        OperandType::Field
        | OperandType::Method
        | OperandType::Type
        | OperandType::String
        | OperandType::Signature
        | OperandType::Token => {
            let token = Token::new(parser.read_le::<u32>()?);
            let kind = opcode
                .operand_type()
                .token_kind()
                .unwrap_or(TokenKind::Member);
            Operand::Member(resolver.resolve(token, kind)?)
        }
        OperandType::Phi => {
            return Err(decode_error!(offset, "unsupported operand of {}", opcode));
        }
    };

    Ok((opcode, operand))
}

fn check_local(offset: u32, local: u16, local_count: usize) -> Result<()> {
    if usize::from(local) >= local_count {
        return Err(decode_error!(
            offset,
            "local V_{} out of range, method has {} locals",
            local,
            local_count
        ));
    }
    Ok(())
}

fn target_label<M>(
    instructions: &[Instruction<M>],
    code_size: usize,
    target: i64,
) -> std::result::Result<Label, String> {
    if target < 0 || target >= code_size as i64 {
        return Err(format!("branch target IL_{target:04x} outside the method"));
    }

    match instructions.binary_search_by_key(&(target as u32), |i| i.offset) {
        Ok(index) => Ok(instructions[index].label),
        Err(_) => Err(format!("branch target IL_{target:04x} inside an instruction")),
    }
}

/// Maps a byte offset to the label of the instruction that starts there.
///
/// Returns `Ok(None)` for the offset just past the last instruction, which exception handlers
/// use to mean "end of method".
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] if `offset` is inside an instruction or past the end.
pub fn label_at<M>(instructions: &[Instruction<M>], offset: u32) -> Result<Option<Label>> {
    let end = instructions.last().map_or(0, |last| last.offset + last.size());
    if offset == end {
        return Ok(None);
    }
    if offset > end {
        return Err(decode_error!(offset, "offset past the end of the method"));
    }

    match instructions.binary_search_by_key(&offset, |i| i.offset) {
        Ok(index) => Ok(Some(instructions[index].label)),
        Err(_) => Err(decode_error!(offset, "offset inside an instruction")),
    }
}
