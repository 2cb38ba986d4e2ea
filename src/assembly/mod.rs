//! CIL instruction decoding, encoding and construction.
//!
//! This module turns raw method body instruction streams into label-based [`Instruction`] lists
//! and back. Labels make instruction lists position independent: the merge engine prepends
//! constructor prologues, splices replacement bodies and drops instructions without touching a
//! single offset, and only the encoder turns labels back into displacements.
//!
//! # Architecture
//!
//! - [`opcodes`] - The complete ECMA-335 opcode table with operand shapes and flow types
//! - [`instruction`] - Instructions, operands and labels, generic over the member type
//! - [`decoder`] - Two-pass decoding and the [`TokenResolver`] seam
//! - [`encoder`] - Encoding, offset assignment and short/long branch form selection
//! - [`builder`] - [`BodyBuilder`] for assembling instruction lists in code
//!
//! # Member Operands
//!
//! Instructions are generic over `M`, the representation of metadata operands. Decoding with
//! [`RawTokens`] keeps plain [`crate::metadata::token::Token`]s; a module decodes into its own
//! handles, and the intent loader decodes mixin bodies into symbolic members that are bound to
//! the target module later.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::assembly::{decode, encode, optimize_branches, Labels, OpCode, RawTokens};
//!
//! // br IL_0005; ret
//! let code = [0x38, 0x00, 0x00, 0x00, 0x00, 0x2A];
//! let mut instructions = decode(&code, 0, &RawTokens, &mut Labels::default())?;
//!
//! optimize_branches(&mut instructions);
//! assert_eq!(instructions[0].opcode, OpCode::BR_S);
//! assert_eq!(encode(&instructions, &RawTokens)?, vec![0x2B, 0x00, 0x2A]);
//! # Ok::<(), cilmixin::Error>(())
//! ```

pub mod builder;
pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod opcodes;

pub use builder::BodyBuilder;
pub use decoder::{decode, label_at, RawTokens, TokenResolver};
pub use encoder::{assign_offsets, encode, label_offsets, optimize_branches, TokenEncoder};
pub use instruction::{
    FlowType, Immediate, Instruction, Label, Labels, Operand, OperandType, TokenKind,
};
pub use opcodes::OpCode;
