//! The ECMA-335 opcode table.
//!
//! Every CIL opcode is an [`OpCode`]: a one-byte value, or `0xFE` followed by a second byte,
//! stored as `0xFEXX`. Each opcode knows its mnemonic, the shape of its inline operand and how it
//! affects control flow. Reserved encodings have no entry and are rejected by the decoder.
#![allow(missing_docs)]

use std::{fmt, sync::OnceLock};

use crate::assembly::instruction::{FlowType, OperandType};

/// Table entry for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodeInfo {
    /// The opcode value, `0xFEXX` for two-byte opcodes
    pub code: u16,
    /// The mnemonic, e.g. `ldarg.0`
    pub mnemonic: &'static str,
    /// Shape of the inline operand
    pub operand: OperandType,
    /// Control flow behavior
    pub flow: FlowType,
}

/// A CIL opcode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpCode(u16);

/// Leading byte of two-byte opcodes
pub const FE_PREFIX: u8 = 0xFE;

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $operand:ident, $flow:ident;)*) => {
        impl OpCode {
            $(pub const $name: OpCode = OpCode($code);)*
        }

        const TABLE: &[OpCodeInfo] = &[
            $(OpCodeInfo {
                code: $code,
                mnemonic: $mnemonic,
                operand: OperandType::$operand,
                flow: FlowType::$flow,
            },)*
        ];
    };
}

opcodes! {
    NOP = 0x00, "nop", None, Sequential;
    BREAK = 0x01, "break", None, Break;
    LDARG_0 = 0x02, "ldarg.0", None, Sequential;
    LDARG_1 = 0x03, "ldarg.1", None, Sequential;
    LDARG_2 = 0x04, "ldarg.2", None, Sequential;
    LDARG_3 = 0x05, "ldarg.3", None, Sequential;
    LDLOC_0 = 0x06, "ldloc.0", None, Sequential;
    LDLOC_1 = 0x07, "ldloc.1", None, Sequential;
    LDLOC_2 = 0x08, "ldloc.2", None, Sequential;
    LDLOC_3 = 0x09, "ldloc.3", None, Sequential;
    STLOC_0 = 0x0A, "stloc.0", None, Sequential;
    STLOC_1 = 0x0B, "stloc.1", None, Sequential;
    STLOC_2 = 0x0C, "stloc.2", None, Sequential;
    STLOC_3 = 0x0D, "stloc.3", None, Sequential;
    LDARG_S = 0x0E, "ldarg.s", ShortArgument, Sequential;
    LDARGA_S = 0x0F, "ldarga.s", ShortArgument, Sequential;
    STARG_S = 0x10, "starg.s", ShortArgument, Sequential;
    LDLOC_S = 0x11, "ldloc.s", ShortLocal, Sequential;
    LDLOCA_S = 0x12, "ldloca.s", ShortLocal, Sequential;
    STLOC_S = 0x13, "stloc.s", ShortLocal, Sequential;
    LDNULL = 0x14, "ldnull", None, Sequential;
    LDC_I4_M1 = 0x15, "ldc.i4.m1", None, Sequential;
    LDC_I4_0 = 0x16, "ldc.i4.0", None, Sequential;
    LDC_I4_1 = 0x17, "ldc.i4.1", None, Sequential;
    LDC_I4_2 = 0x18, "ldc.i4.2", None, Sequential;
    LDC_I4_3 = 0x19, "ldc.i4.3", None, Sequential;
    LDC_I4_4 = 0x1A, "ldc.i4.4", None, Sequential;
    LDC_I4_5 = 0x1B, "ldc.i4.5", None, Sequential;
    LDC_I4_6 = 0x1C, "ldc.i4.6", None, Sequential;
    LDC_I4_7 = 0x1D, "ldc.i4.7", None, Sequential;
    LDC_I4_8 = 0x1E, "ldc.i4.8", None, Sequential;
    LDC_I4_S = 0x1F, "ldc.i4.s", Int8, Sequential;
    LDC_I4 = 0x20, "ldc.i4", Int32, Sequential;
    LDC_I8 = 0x21, "ldc.i8", Int64, Sequential;
    LDC_R4 = 0x22, "ldc.r4", Float32, Sequential;
    LDC_R8 = 0x23, "ldc.r8", Float64, Sequential;
    DUP = 0x25, "dup", None, Sequential;
    POP = 0x26, "pop", None, Sequential;
    JMP = 0x27, "jmp", Method, Call;
    CALL = 0x28, "call", Method, Call;
    CALLI = 0x29, "calli", Signature, Call;
    RET = 0x2A, "ret", None, Return;
    BR_S = 0x2B, "br.s", ShortBranchTarget, UnconditionalBranch;
    BRFALSE_S = 0x2C, "brfalse.s", ShortBranchTarget, ConditionalBranch;
    BRTRUE_S = 0x2D, "brtrue.s", ShortBranchTarget, ConditionalBranch;
    BEQ_S = 0x2E, "beq.s", ShortBranchTarget, ConditionalBranch;
    BGE_S = 0x2F, "bge.s", ShortBranchTarget, ConditionalBranch;
    BGT_S = 0x30, "bgt.s", ShortBranchTarget, ConditionalBranch;
    BLE_S = 0x31, "ble.s", ShortBranchTarget, ConditionalBranch;
    BLT_S = 0x32, "blt.s", ShortBranchTarget, ConditionalBranch;
    BNE_UN_S = 0x33, "bne.un.s", ShortBranchTarget, ConditionalBranch;
    BGE_UN_S = 0x34, "bge.un.s", ShortBranchTarget, ConditionalBranch;
    BGT_UN_S = 0x35, "bgt.un.s", ShortBranchTarget, ConditionalBranch;
    BLE_UN_S = 0x36, "ble.un.s", ShortBranchTarget, ConditionalBranch;
    BLT_UN_S = 0x37, "blt.un.s", ShortBranchTarget, ConditionalBranch;
    BR = 0x38, "br", BranchTarget, UnconditionalBranch;
    BRFALSE = 0x39, "brfalse", BranchTarget, ConditionalBranch;
    BRTRUE = 0x3A, "brtrue", BranchTarget, ConditionalBranch;
    BEQ = 0x3B, "beq", BranchTarget, ConditionalBranch;
    BGE = 0x3C, "bge", BranchTarget, ConditionalBranch;
    BGT = 0x3D, "bgt", BranchTarget, ConditionalBranch;
    BLE = 0x3E, "ble", BranchTarget, ConditionalBranch;
    BLT = 0x3F, "blt", BranchTarget, ConditionalBranch;
    BNE_UN = 0x40, "bne.un", BranchTarget, ConditionalBranch;
    BGE_UN = 0x41, "bge.un", BranchTarget, ConditionalBranch;
    BGT_UN = 0x42, "bgt.un", BranchTarget, ConditionalBranch;
    BLE_UN = 0x43, "ble.un", BranchTarget, ConditionalBranch;
    BLT_UN = 0x44, "blt.un", BranchTarget, ConditionalBranch;
    SWITCH = 0x45, "switch", Switch, Switch;
    LDIND_I1 = 0x46, "ldind.i1", None, Sequential;
    LDIND_U1 = 0x47, "ldind.u1", None, Sequential;
    LDIND_I2 = 0x48, "ldind.i2", None, Sequential;
    LDIND_U2 = 0x49, "ldind.u2", None, Sequential;
    LDIND_I4 = 0x4A, "ldind.i4", None, Sequential;
    LDIND_U4 = 0x4B, "ldind.u4", None, Sequential;
    LDIND_I8 = 0x4C, "ldind.i8", None, Sequential;
    LDIND_I = 0x4D, "ldind.i", None, Sequential;
    LDIND_R4 = 0x4E, "ldind.r4", None, Sequential;
    LDIND_R8 = 0x4F, "ldind.r8", None, Sequential;
    LDIND_REF = 0x50, "ldind.ref", None, Sequential;
    STIND_REF = 0x51, "stind.ref", None, Sequential;
    STIND_I1 = 0x52, "stind.i1", None, Sequential;
    STIND_I2 = 0x53, "stind.i2", None, Sequential;
    STIND_I4 = 0x54, "stind.i4", None, Sequential;
    STIND_I8 = 0x55, "stind.i8", None, Sequential;
    STIND_R4 = 0x56, "stind.r4", None, Sequential;
    STIND_R8 = 0x57, "stind.r8", None, Sequential;
    ADD = 0x58, "add", None, Sequential;
    SUB = 0x59, "sub", None, Sequential;
    MUL = 0x5A, "mul", None, Sequential;
    DIV = 0x5B, "div", None, Sequential;
    DIV_UN = 0x5C, "div.un", None, Sequential;
    REM = 0x5D, "rem", None, Sequential;
    REM_UN = 0x5E, "rem.un", None, Sequential;
    AND = 0x5F, "and", None, Sequential;
    OR = 0x60, "or", None, Sequential;
    XOR = 0x61, "xor", None, Sequential;
    SHL = 0x62, "shl", None, Sequential;
    SHR = 0x63, "shr", None, Sequential;
    SHR_UN = 0x64, "shr.un", None, Sequential;
    NEG = 0x65, "neg", None, Sequential;
    NOT = 0x66, "not", None, Sequential;
    CONV_I1 = 0x67, "conv.i1", None, Sequential;
    CONV_I2 = 0x68, "conv.i2", None, Sequential;
    CONV_I4 = 0x69, "conv.i4", None, Sequential;
    CONV_I8 = 0x6A, "conv.i8", None, Sequential;
    CONV_R4 = 0x6B, "conv.r4", None, Sequential;
    CONV_R8 = 0x6C, "conv.r8", None, Sequential;
    CONV_U4 = 0x6D, "conv.u4", None, Sequential;
    CONV_U8 = 0x6E, "conv.u8", None, Sequential;
    CALLVIRT = 0x6F, "callvirt", Method, Call;
    CPOBJ = 0x70, "cpobj", Type, Sequential;
    LDOBJ = 0x71, "ldobj", Type, Sequential;
    LDSTR = 0x72, "ldstr", String, Sequential;
    NEWOBJ = 0x73, "newobj", Method, Call;
    CASTCLASS = 0x74, "castclass", Type, Sequential;
    ISINST = 0x75, "isinst", Type, Sequential;
    CONV_R_UN = 0x76, "conv.r.un", None, Sequential;
    UNBOX = 0x79, "unbox", Type, Sequential;
    THROW = 0x7A, "throw", None, Throw;
    LDFLD = 0x7B, "ldfld", Field, Sequential;
    LDFLDA = 0x7C, "ldflda", Field, Sequential;
    STFLD = 0x7D, "stfld", Field, Sequential;
    LDSFLD = 0x7E, "ldsfld", Field, Sequential;
    LDSFLDA = 0x7F, "ldsflda", Field, Sequential;
    STSFLD = 0x80, "stsfld", Field, Sequential;
    STOBJ = 0x81, "stobj", Type, Sequential;
    CONV_OVF_I1_UN = 0x82, "conv.ovf.i1.un", None, Sequential;
    CONV_OVF_I2_UN = 0x83, "conv.ovf.i2.un", None, Sequential;
    CONV_OVF_I4_UN = 0x84, "conv.ovf.i4.un", None, Sequential;
    CONV_OVF_I8_UN = 0x85, "conv.ovf.i8.un", None, Sequential;
    CONV_OVF_U1_UN = 0x86, "conv.ovf.u1.un", None, Sequential;
    CONV_OVF_U2_UN = 0x87, "conv.ovf.u2.un", None, Sequential;
    CONV_OVF_U4_UN = 0x88, "conv.ovf.u4.un", None, Sequential;
    CONV_OVF_U8_UN = 0x89, "conv.ovf.u8.un", None, Sequential;
    CONV_OVF_I_UN = 0x8A, "conv.ovf.i.un", None, Sequential;
    CONV_OVF_U_UN = 0x8B, "conv.ovf.u.un", None, Sequential;
    BOX = 0x8C, "box", Type, Sequential;
    NEWARR = 0x8D, "newarr", Type, Sequential;
    LDLEN = 0x8E, "ldlen", None, Sequential;
    LDELEMA = 0x8F, "ldelema", Type, Sequential;
    LDELEM_I1 = 0x90, "ldelem.i1", None, Sequential;
    LDELEM_U1 = 0x91, "ldelem.u1", None, Sequential;
    LDELEM_I2 = 0x92, "ldelem.i2", None, Sequential;
    LDELEM_U2 = 0x93, "ldelem.u2", None, Sequential;
    LDELEM_I4 = 0x94, "ldelem.i4", None, Sequential;
    LDELEM_U4 = 0x95, "ldelem.u4", None, Sequential;
    LDELEM_I8 = 0x96, "ldelem.i8", None, Sequential;
    LDELEM_I = 0x97, "ldelem.i", None, Sequential;
    LDELEM_R4 = 0x98, "ldelem.r4", None, Sequential;
    LDELEM_R8 = 0x99, "ldelem.r8", None, Sequential;
    LDELEM_REF = 0x9A, "ldelem.ref", None, Sequential;
    STELEM_I = 0x9B, "stelem.i", None, Sequential;
    STELEM_I1 = 0x9C, "stelem.i1", None, Sequential;
    STELEM_I2 = 0x9D, "stelem.i2", None, Sequential;
    STELEM_I4 = 0x9E, "stelem.i4", None, Sequential;
    STELEM_I8 = 0x9F, "stelem.i8", None, Sequential;
    STELEM_R4 = 0xA0, "stelem.r4", None, Sequential;
    STELEM_R8 = 0xA1, "stelem.r8", None, Sequential;
    STELEM_REF = 0xA2, "stelem.ref", None, Sequential;
    LDELEM = 0xA3, "ldelem", Type, Sequential;
    STELEM = 0xA4, "stelem", Type, Sequential;
    UNBOX_ANY = 0xA5, "unbox.any", Type, Sequential;
    CONV_OVF_I1 = 0xB3, "conv.ovf.i1", None, Sequential;
    CONV_OVF_U1 = 0xB4, "conv.ovf.u1", None, Sequential;
    CONV_OVF_I2 = 0xB5, "conv.ovf.i2", None, Sequential;
    CONV_OVF_U2 = 0xB6, "conv.ovf.u2", None, Sequential;
    CONV_OVF_I4 = 0xB7, "conv.ovf.i4", None, Sequential;
    CONV_OVF_U4 = 0xB8, "conv.ovf.u4", None, Sequential;
    CONV_OVF_I8 = 0xB9, "conv.ovf.i8", None, Sequential;
    CONV_OVF_U8 = 0xBA, "conv.ovf.u8", None, Sequential;
    REFANYVAL = 0xC2, "refanyval", Type, Sequential;
    CKFINITE = 0xC3, "ckfinite", None, Sequential;
    MKREFANY = 0xC6, "mkrefany", Type, Sequential;
    LDTOKEN = 0xD0, "ldtoken", Token, Sequential;
    CONV_U2 = 0xD1, "conv.u2", None, Sequential;
    CONV_U1 = 0xD2, "conv.u1", None, Sequential;
    CONV_I = 0xD3, "conv.i", None, Sequential;
    CONV_OVF_I = 0xD4, "conv.ovf.i", None, Sequential;
    CONV_OVF_U = 0xD5, "conv.ovf.u", None, Sequential;
    ADD_OVF = 0xD6, "add.ovf", None, Sequential;
    ADD_OVF_UN = 0xD7, "add.ovf.un", None, Sequential;
    MUL_OVF = 0xD8, "mul.ovf", None, Sequential;
    MUL_OVF_UN = 0xD9, "mul.ovf.un", None, Sequential;
    SUB_OVF = 0xDA, "sub.ovf", None, Sequential;
    SUB_OVF_UN = 0xDB, "sub.ovf.un", None, Sequential;
    ENDFINALLY = 0xDC, "endfinally", None, EndFinally;
    LEAVE = 0xDD, "leave", BranchTarget, Leave;
    LEAVE_S = 0xDE, "leave.s", ShortBranchTarget, Leave;
    STIND_I = 0xDF, "stind.i", None, Sequential;
    CONV_U = 0xE0, "conv.u", None, Sequential;
    ARGLIST = 0xFE00, "arglist", None, Sequential;
    CEQ = 0xFE01, "ceq", None, Sequential;
    CGT = 0xFE02, "cgt", None, Sequential;
    CGT_UN = 0xFE03, "cgt.un", None, Sequential;
    CLT = 0xFE04, "clt", None, Sequential;
    CLT_UN = 0xFE05, "clt.un", None, Sequential;
    LDFTN = 0xFE06, "ldftn", Method, Sequential;
    LDVIRTFTN = 0xFE07, "ldvirtftn", Method, Sequential;
    LDARG = 0xFE09, "ldarg", Argument, Sequential;
    LDARGA = 0xFE0A, "ldarga", Argument, Sequential;
    STARG = 0xFE0B, "starg", Argument, Sequential;
    LDLOC = 0xFE0C, "ldloc", Local, Sequential;
    LDLOCA = 0xFE0D, "ldloca", Local, Sequential;
    STLOC = 0xFE0E, "stloc", Local, Sequential;
    LOCALLOC = 0xFE0F, "localloc", None, Sequential;
    ENDFILTER = 0xFE11, "endfilter", None, Return;
    UNALIGNED = 0xFE12, "unaligned.", UInt8, Meta;
    VOLATILE = 0xFE13, "volatile.", None, Meta;
    TAIL = 0xFE14, "tail.", None, Meta;
    INITOBJ = 0xFE15, "initobj", Type, Sequential;
    CONSTRAINED = 0xFE16, "constrained.", Type, Meta;
    CPBLK = 0xFE17, "cpblk", None, Sequential;
    INITBLK = 0xFE18, "initblk", None, Sequential;
    NO = 0xFE19, "no.", UInt8, Meta;
    RETHROW = 0xFE1A, "rethrow", None, Throw;
    SIZEOF = 0xFE1C, "sizeof", Type, Sequential;
    REFANYTYPE = 0xFE1D, "refanytype", None, Sequential;
    READONLY = 0xFE1E, "readonly.", None, Meta;
}

struct Lookup {
    single: [Option<&'static OpCodeInfo>; 256],
    extended: [Option<&'static OpCodeInfo>; 256],
}

fn lookup() -> &'static Lookup {
    static LOOKUP: OnceLock<Lookup> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut single = [None; 256];
        let mut extended = [None; 256];
        for info in TABLE {
            let low = (info.code & 0xFF) as usize;
            if info.code >> 8 == u16::from(FE_PREFIX) {
                extended[low] = Some(info);
            } else {
                single[low] = Some(info);
            }
        }
        Lookup { single, extended }
    })
}

impl OpCode {
    /// Looks up a one-byte opcode. Returns `None` for reserved bytes and for the `0xFE` prefix.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        lookup().single[byte as usize].map(|info| OpCode(info.code))
    }

    /// Looks up the two-byte opcode `0xFE second`.
    #[must_use]
    pub fn from_extended(second: u8) -> Option<OpCode> {
        lookup().extended[second as usize].map(|info| OpCode(info.code))
    }

    /// Looks up an opcode by its 16-bit value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<OpCode> {
        if code >> 8 == u16::from(FE_PREFIX) {
            Self::from_extended((code & 0xFF) as u8)
        } else if code <= 0xFF {
            Self::from_byte(code as u8)
        } else {
            None
        }
    }

    /// Every defined opcode in table order.
    pub fn all() -> impl Iterator<Item = OpCode> {
        TABLE.iter().map(|info| OpCode(info.code))
    }

    fn info(self) -> &'static OpCodeInfo {
        let low = (self.0 & 0xFF) as usize;
        let entry = if self.is_extended() {
            lookup().extended[low]
        } else {
            lookup().single[low]
        };
        // OpCode values only originate from TABLE
        entry.unwrap_or(&TABLE[0])
    }

    /// The 16-bit opcode value.
    #[must_use]
    pub fn code(self) -> u16 {
        self.0
    }

    /// Returns `true` for `0xFE`-prefixed opcodes.
    #[must_use]
    pub fn is_extended(self) -> bool {
        self.0 >> 8 == u16::from(FE_PREFIX)
    }

    /// Encoded size of the opcode itself.
    #[must_use]
    pub fn size(self) -> u32 {
        if self.is_extended() {
            2
        } else {
            1
        }
    }

    /// The mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Shape of the inline operand.
    #[must_use]
    pub fn operand_type(self) -> OperandType {
        self.info().operand
    }

    /// Control flow behavior.
    #[must_use]
    pub fn flow(self) -> FlowType {
        self.info().flow
    }

    /// The long form of a short branch, or `self`.
    #[must_use]
    pub fn long_form(self) -> OpCode {
        match self.0 {
            0x2B..=0x37 => OpCode(self.0 + 0x0D),
            0xDE => OpCode::LEAVE,
            _ => self,
        }
    }

    /// The short form of a long branch, if it has one.
    #[must_use]
    pub fn short_form(self) -> Option<OpCode> {
        match self.0 {
            0x38..=0x44 => Some(OpCode(self.0 - 0x0D)),
            0xDD => Some(OpCode::LEAVE_S),
            _ => None,
        }
    }

    /// For `ldloc.N` / `stloc.N`, the implied local index.
    #[must_use]
    pub fn implied_local(self) -> Option<u16> {
        match self.0 {
            0x06..=0x09 => Some(self.0 - 0x06),
            0x0A..=0x0D => Some(self.0 - 0x0A),
            _ => None,
        }
    }

    /// For `ldarg.N`, the implied argument index.
    #[must_use]
    pub fn implied_argument(self) -> Option<u16> {
        match self.0 {
            0x02..=0x05 => Some(self.0 - 0x02),
            _ => None,
        }
    }

    /// Writes the opcode bytes.
    pub fn write(self, buffer: &mut Vec<u8>) {
        if self.is_extended() {
            buffer.push(FE_PREFIX);
        }
        buffer.push((self.0 & 0xFF) as u8);
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCode({:#06x}, {})", self.0, self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_is_consistent() {
        let mut codes = HashSet::new();
        let mut mnemonics = HashSet::new();
        for opcode in OpCode::all() {
            assert!(codes.insert(opcode.code()), "duplicate {:?}", opcode);
            assert!(mnemonics.insert(opcode.mnemonic()));
            assert_eq!(OpCode::from_code(opcode.code()), Some(opcode));
        }
        assert_eq!(codes.len(), 219);
    }

    #[test]
    fn reserved_bytes() {
        assert!(OpCode::from_byte(0x24).is_none());
        assert!(OpCode::from_byte(0x77).is_none());
        assert!(OpCode::from_byte(0xFE).is_none());
        assert!(OpCode::from_extended(0x08).is_none());
        assert!(OpCode::from_extended(0x1B).is_none());
    }

    #[test]
    fn branch_forms() {
        assert_eq!(OpCode::BR_S.long_form(), OpCode::BR);
        assert_eq!(OpCode::BLT_UN_S.long_form(), OpCode::BLT_UN);
        assert_eq!(OpCode::LEAVE_S.long_form(), OpCode::LEAVE);
        assert_eq!(OpCode::BRTRUE.short_form(), Some(OpCode::BRTRUE_S));
        assert_eq!(OpCode::LEAVE.short_form(), Some(OpCode::LEAVE_S));
        assert_eq!(OpCode::SWITCH.short_form(), None);
        assert_eq!(OpCode::CALL.long_form(), OpCode::CALL);
    }

    #[test]
    fn metadata() {
        assert_eq!(OpCode::CEQ.size(), 2);
        assert_eq!(OpCode::CEQ.mnemonic(), "ceq");
        assert_eq!(OpCode::NEWOBJ.flow(), FlowType::Call);
        assert_eq!(OpCode::LDFLD.operand_type(), OperandType::Field);
        assert_eq!(OpCode::STLOC_2.implied_local(), Some(2));
        assert_eq!(OpCode::LDARG_3.implied_argument(), Some(3));
        assert_eq!(OpCode::LDLOC_0.implied_argument(), None);

        let mut bytes = Vec::new();
        OpCode::LDLOCA.write(&mut bytes);
        assert_eq!(bytes, [0xFE, 0x0D]);
    }
}
