//! CIL instruction stream encoding.
//!
//! The reverse of [`crate::assembly::decode`]: instructions are laid out sequentially, labels
//! are turned back into displacements relative to the end of each operand, and member operands
//! are turned into tokens through a [`TokenEncoder`]. Decoding a stream and encoding the result
//! reproduces the original bytes for every supported opcode.
//!
//! [`optimize_branches`] picks the short or long form of every branch. It starts from the long
//! forms and shrinks whatever fits a signed byte, repeating until nothing changes. Shrinking a
//! branch only ever moves code closer together, so the loop converges.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilmixin::assembly::{decode, encode, Labels, RawTokens};
//!
//! let code = [0x02, 0x2D, 0x01, 0x00, 0x2A];
//! let instructions = decode(&code, 0, &RawTokens, &mut Labels::default())?;
//! assert_eq!(encode(&instructions, &RawTokens)?, code);
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        decoder::RawTokens, FlowType, Immediate, Instruction, Label, Operand, OperandType,
    },
    file::io::write_le,
    metadata::token::Token,
    Error::Encode,
    Result,
};

/// Turns members back into metadata tokens.
pub trait TokenEncoder<M> {
    /// Returns the token of `member`.
    ///
    /// # Errors
    ///
    /// Implementations fail if the member has no token in the output module.
    fn token(&self, member: &M) -> Result<Token>;
}

impl TokenEncoder<Token> for RawTokens {
    fn token(&self, member: &Token) -> Result<Token> {
        Ok(*member)
    }
}

/// Computes the offset every instruction would be encoded at, storing it in
/// [`Instruction::offset`]. Returns the code size.
pub fn assign_offsets<M>(instructions: &mut [Instruction<M>]) -> u32 {
    let mut offset = 0;
    for instruction in instructions {
        instruction.offset = offset;
        offset += instruction.size();
    }
    offset
}

/// Maps every label to the offset its instruction is encoded at.
#[must_use]
pub fn label_offsets<M>(instructions: &[Instruction<M>]) -> HashMap<Label, u32> {
    let mut offsets = HashMap::with_capacity(instructions.len());
    let mut offset = 0;
    for instruction in instructions {
        offsets.insert(instruction.label, offset);
        offset += instruction.size();
    }
    offsets
}

/// Encodes an instruction list.
///
/// Offsets are computed from instruction sizes; the stored offsets are ignored.
///
/// # Errors
///
/// Returns [`crate::Error::Encode`] if a branch refers to a label that is not in the list, a
/// short branch displacement does not fit a signed byte, an operand does not match the
/// opcode's operand shape, or a member has no token.
pub fn encode<M, T: TokenEncoder<M>>(instructions: &[Instruction<M>], tokens: &T) -> Result<Vec<u8>> {
    let offsets = label_offsets(instructions);
    let mut buffer = Vec::new();

    for instruction in instructions {
        let start = buffer.len() as u32;
        let end = start + instruction.size();
        instruction.opcode.write(&mut buffer);

        let target = |label: &Label| -> Result<i64> {
            offsets
                .get(label)
                .map(|offset| i64::from(*offset) - i64::from(end))
                .ok_or_else(|| Encode(format!("{} refers to unknown label {}", instruction.opcode, label)))
        };

        match (instruction.opcode.operand_type(), &instruction.operand) {
            (OperandType::None, Operand::None) => {}
            (OperandType::Int8, Operand::Immediate(Immediate::Int8(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::UInt8, Operand::Immediate(Immediate::UInt8(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::Int32, Operand::Immediate(Immediate::Int32(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::Int64, Operand::Immediate(Immediate::Int64(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::Float32, Operand::Immediate(Immediate::Float32(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::Float64, Operand::Immediate(Immediate::Float64(value))) => {
                write_le(&mut buffer, *value);
            }
            (OperandType::ShortLocal, Operand::Local(index))
            | (OperandType::ShortArgument, Operand::Argument(index)) => {
                let index = u8::try_from(*index).map_err(|_| {
                    Encode(format!("{} index {} exceeds a byte", instruction.opcode, index))
                })?;
                write_le(&mut buffer, index);
            }
            (OperandType::Local, Operand::Local(index))
            | (OperandType::Argument, Operand::Argument(index)) => {
                write_le(&mut buffer, *index);
            }
            (OperandType::ShortBranchTarget, Operand::Target(label)) => {
                let displacement = target(label)?;
                let displacement = i8::try_from(displacement).map_err(|_| {
                    Encode(format!(
                        "{} at IL_{:04x} cannot reach {} ({} bytes)",
                        instruction.opcode, start, label, displacement
                    ))
                })?;
                write_le(&mut buffer, displacement);
            }
            (OperandType::BranchTarget, Operand::Target(label)) => {
                let displacement = i32::try_from(target(label)?)
                    .map_err(|_| Encode(format!("{} displacement overflow", instruction.opcode)))?;
                write_le(&mut buffer, displacement);
            }
            (OperandType::Switch, Operand::Switch(labels)) => {
                write_le(&mut buffer, labels.len() as u32);
                for label in labels {
                    let displacement = i32::try_from(target(label)?).map_err(|_| {
                        Encode(format!("{} displacement overflow", instruction.opcode))
                    })?;
                    write_le(&mut buffer, displacement);
                }
            }
            (
                OperandType::Field
                | OperandType::Method
                | OperandType::Type
                | OperandType::String
                | OperandType::Signature
                | OperandType::Token,
                Operand::Member(member),
            ) => {
                write_le(&mut buffer, tokens.token(member)?.value());
            }
            (shape, _) => {
                return Err(Encode(format!(
                    "operand of {} at {} does not match shape {:?}",
                    instruction.opcode, instruction.label, shape
                )));
            }
        }
    }

    Ok(buffer)
}

/// Chooses the smallest branch forms that reach their targets and recomputes offsets.
///
/// `leave` and all conditional and unconditional branches take part; `switch` has no short
/// form.
pub fn optimize_branches<M>(instructions: &mut [Instruction<M>]) {
    for instruction in instructions.iter_mut() {
        if is_branch(instruction) {
            instruction.opcode = instruction.opcode.long_form();
        }
    }

    loop {
        assign_offsets(instructions);
        let offsets = label_offsets(instructions);

        let shrinkable: Vec<usize> = instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| {
                is_branch(instruction) && instruction.opcode.short_form().is_some()
            })
            .filter_map(|(index, instruction)| {
                let Operand::Target(label) = &instruction.operand else {
                    return None;
                };
                let target = i64::from(*offsets.get(label)?);
                let origin = i64::from(instruction.offset);

                // Everything past this branch moves 3 bytes closer once it shrinks
                let target = if target > origin { target - 3 } else { target };
                let displacement = target - (origin + 2);
                (-128..=127).contains(&displacement).then_some(index)
            })
            .collect();

        if shrinkable.is_empty() {
            break;
        }

        for index in shrinkable {
            if let Some(short) = instructions[index].opcode.short_form() {
                instructions[index].opcode = short;
            }
        }
    }
}

fn is_branch<M>(instruction: &Instruction<M>) -> bool {
    matches!(instruction.operand, Operand::Target(_))
        && matches!(
            instruction.opcode.flow(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        )
}
