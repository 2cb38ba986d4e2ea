//! Method bodies.
//!
//! A method body exists in two forms. [`RawBody`] is the ECMA-335 II.25.4 encoding: a tiny or fat
//! header, the instruction stream, and optional exception-handling data sections with offsets
//! in bytes. [`MethodBody`] is the decoded form the patch engine works on, with label-based
//! instructions and exception handlers whose ranges name instructions rather than offsets.
//!
//! Locals are stored beside the body in the module image rather than behind a standalone
//! signature token, so a fat header written here always carries a null local signature token.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::metadata::body::RawBody;
//!
//! // Tiny header: 2 bytes of code
//! let raw = RawBody::parse(&[0x0A, 0x00, 0x2A])?;
//! assert_eq!(raw.code, vec![0x00, 0x2A]);
//! assert_eq!(raw.max_stack, 8);
//! assert_eq!(raw.to_bytes()?, vec![0x0A, 0x00, 0x2A]);
//! # Ok::<(), cilmixin::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Common Intermediate Language Physical Layout

use crate::{
    assembly::{
        decode, encode, label_at, label_offsets, optimize_branches, Instruction, Label, Labels,
        TokenEncoder, TokenResolver, TokenKind,
    },
    file::{
        io::{write_le, write_le_at},
        parser::Parser,
    },
    metadata::{
        flags::{ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
        typesig::TypeSig,
    },
    Error::Encode,
    Result,
};

/// Largest code size a tiny header can describe
const TINY_CODE_LIMIT: usize = 64;
/// Largest max-stack a tiny header implies
const TINY_MAX_STACK: u16 = 8;
/// Fat header size in 4-byte units, stored in the top nibble of the flags word
const FAT_HEADER_DWORDS: u16 = 3;

/// An exception-handling clause with byte offsets, as encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Handler kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected range
    pub try_offset: u32,
    /// Length of the protected range
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token for catch clauses, filter offset for filter clauses, otherwise 0
    pub class_or_filter: u32,
}

impl ExceptionClause {
    fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}

/// A method body in its encoded form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBody {
    /// Zero-initialize locals
    pub init_locals: bool,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// The instruction stream
    pub code: Vec<u8>,
    /// Exception-handling clauses
    pub clauses: Vec<ExceptionClause>,
}

impl RawBody {
    /// Parses an encoded method body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for unknown header formats and
    /// [`crate::Error::OutOfBounds`] for truncated bodies.
    pub fn parse(data: &[u8]) -> Result<RawBody> {
        let mut parser = Parser::new(data);
        let first = parser.peek_byte()?;

        match MethodBodyFlags::from_bits_truncate(u16::from(first & 0b11)) {
            MethodBodyFlags::TINY_FORMAT => {
                parser.advance_by(1)?;
                let code = parser.read_bytes(usize::from(first >> 2))?.to_vec();
                Ok(RawBody {
                    init_locals: false,
                    max_stack: TINY_MAX_STACK,
                    code,
                    clauses: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                let flags_and_size = parser.read_le::<u16>()?;
                let header_size = usize::from(flags_and_size >> 12) * 4;
                let flags = MethodBodyFlags::from_bits_truncate(flags_and_size & 0x0FFF);
                let max_stack = parser.read_le::<u16>()?;
                let code_size = parser.read_le::<u32>()? as usize;
                let _local_signature = parser.read_le::<u32>()?;
                if header_size < 12 {
                    return Err(malformed_error!("Fat header of {} bytes", header_size));
                }

                parser.seek(header_size)?;
                let code = parser.read_bytes(code_size)?.to_vec();

                let mut clauses = Vec::new();
                if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    read_sections(&mut parser, &mut clauses)?;
                }

                Ok(RawBody {
                    init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    max_stack,
                    code,
                    clauses,
                })
            }
            _ => Err(malformed_error!(
                "Method header is neither fat nor tiny - {}",
                first
            )),
        }
    }

    /// Returns `true` if the body can use a tiny header.
    #[must_use]
    pub fn is_tiny(&self, local_count: usize) -> bool {
        self.code.len() < TINY_CODE_LIMIT
            && self.max_stack <= TINY_MAX_STACK
            && local_count == 0
            && self.clauses.is_empty()
            && !self.init_locals
    }

    /// Encodes the body, choosing a tiny header where possible. A body with locals must use
    /// [`RawBody::to_bytes_with_locals`] so the header reflects them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if the code is larger than a fat header can describe.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with_locals(0)
    }

    /// Encodes the body for a method with `local_count` locals.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if the code is larger than a fat header can describe.
    pub fn to_bytes_with_locals(&self, local_count: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.code.len() + 12);

        if self.is_tiny(local_count) {
            buffer.push(((self.code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
            buffer.extend_from_slice(&self.code);
            return Ok(buffer);
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if !self.clauses.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        let code_size = u32::try_from(self.code.len())
            .map_err(|_| Encode(format!("method body of {} bytes", self.code.len())))?;

        write_le(&mut buffer, flags.bits() | (FAT_HEADER_DWORDS << 12));
        write_le(&mut buffer, self.max_stack);
        write_le(&mut buffer, code_size);
        write_le(&mut buffer, 0_u32);
        buffer.extend_from_slice(&self.code);

        if !self.clauses.is_empty() {
            while buffer.len() % 4 != 0 {
                buffer.push(0);
            }
            write_section(&mut buffer, &self.clauses)?;
        }

        Ok(buffer)
    }
}

fn read_sections(parser: &mut Parser, clauses: &mut Vec<ExceptionClause>) -> Result<()> {
    loop {
        parser.align(4)?;
        let kind = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
        if !kind.contains(SectionFlags::EHTABLE) {
            return Err(malformed_error!("Unsupported method data section - {:?}", kind));
        }

        if kind.contains(SectionFlags::FAT_FORMAT) {
            let low = u32::from(parser.read_le::<u16>()?);
            let high = u32::from(parser.read_le::<u8>()?);
            let size = (high << 16) | low;
            if size < 4 {
                return Err(malformed_error!("Exception section of {} bytes", size));
            }
            for _ in 0..(size - 4) / 24 {
                clauses.push(ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(
                        (parser.read_le::<u32>()? & 0xFFFF) as u16,
                    ),
                    try_offset: parser.read_le::<u32>()?,
                    try_length: parser.read_le::<u32>()?,
                    handler_offset: parser.read_le::<u32>()?,
                    handler_length: parser.read_le::<u32>()?,
                    class_or_filter: parser.read_le::<u32>()?,
                });
            }
        } else {
            let size = u32::from(parser.read_le::<u8>()?);
            let _reserved = parser.read_le::<u16>()?;
            if size < 4 {
                return Err(malformed_error!("Exception section of {} bytes", size));
            }
            for _ in 0..(size - 4) / 12 {
                clauses.push(ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u16>()?),
                    try_offset: u32::from(parser.read_le::<u16>()?),
                    try_length: u32::from(parser.read_le::<u8>()?),
                    handler_offset: u32::from(parser.read_le::<u16>()?),
                    handler_length: u32::from(parser.read_le::<u8>()?),
                    class_or_filter: parser.read_le::<u32>()?,
                });
            }
        }

        if !kind.contains(SectionFlags::MORE_SECTS) {
            return Ok(());
        }
    }
}

fn write_section(buffer: &mut Vec<u8>, clauses: &[ExceptionClause]) -> Result<()> {
    let small_size = 4 + clauses.len() * 12;
    if small_size <= usize::from(u8::MAX) && clauses.iter().all(ExceptionClause::fits_small) {
        buffer.push(SectionFlags::EHTABLE.bits());
        buffer.push(small_size as u8);
        write_le(buffer, 0_u16);
        for clause in clauses {
            write_le(buffer, clause.flags.bits());
            write_le(buffer, clause.try_offset as u16);
            write_le(buffer, clause.try_length as u8);
            write_le(buffer, clause.handler_offset as u16);
            write_le(buffer, clause.handler_length as u8);
            write_le(buffer, clause.class_or_filter);
        }
        return Ok(());
    }

    let fat_size = 4 + clauses.len() * 24;
    if fat_size > 0x00FF_FFFF {
        return Err(Encode(format!("{} exception clauses", clauses.len())));
    }
    let header = ((fat_size as u32) << 8)
        | u32::from((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
    let start = buffer.len();
    buffer.extend_from_slice(&[0; 4]);
    write_le_at(buffer, start, header)?;
    for clause in clauses {
        write_le(buffer, u32::from(clause.flags.bits()));
        write_le(buffer, clause.try_offset);
        write_le(buffer, clause.try_length);
        write_le(buffer, clause.handler_offset);
        write_le(buffer, clause.handler_length);
        write_le(buffer, clause.class_or_filter);
    }
    Ok(())
}

/// An exception handler whose ranges are given by labels. An end of `None` means the end of the
/// method.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler<M> {
    /// Handler kind
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: Label,
    /// First instruction after the protected range
    pub try_end: Option<Label>,
    /// First handler instruction
    pub handler_start: Label,
    /// First instruction after the handler
    pub handler_end: Option<Label>,
    /// Caught type, for catch clauses
    pub catch_type: Option<M>,
    /// First filter instruction, for filter clauses
    pub filter_start: Option<Label>,
}

impl<M> ExceptionHandler<M> {
    /// Every label the handler refers to.
    pub fn labels(&self) -> impl Iterator<Item = Label> {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
            self.filter_start,
        ]
        .into_iter()
        .flatten()
    }

    /// Converts the catch type, keeping everything else.
    ///
    /// # Errors
    ///
    /// Propagates the error of `map`.
    pub fn try_map_catch<N, E, F>(self, map: F) -> std::result::Result<ExceptionHandler<N>, E>
    where
        F: FnOnce(M) -> std::result::Result<N, E>,
    {
        Ok(ExceptionHandler {
            flags: self.flags,
            try_start: self.try_start,
            try_end: self.try_end,
            handler_start: self.handler_start,
            handler_end: self.handler_end,
            catch_type: self.catch_type.map(map).transpose()?,
            filter_start: self.filter_start,
        })
    }
}

/// A decoded method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody<M> {
    /// Zero-initialize locals
    pub init_locals: bool,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// The instructions
    pub instructions: Vec<Instruction<M>>,
    /// Exception handlers
    pub exception_handlers: Vec<ExceptionHandler<M>>,
    /// Label allocator for this body
    pub labels: Labels,
}

impl<M> Default for MethodBody<M> {
    fn default() -> Self {
        MethodBody {
            init_locals: false,
            max_stack: TINY_MAX_STACK,
            locals: Vec::new(),
            instructions: Vec::new(),
            exception_handlers: Vec::new(),
            labels: Labels::default(),
        }
    }
}

impl<M> MethodBody<M> {
    /// Decodes a raw body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the instruction stream or an exception clause is
    /// invalid, and propagates resolver failures.
    pub fn decode<R>(raw: &RawBody, locals: Vec<TypeSig>, resolver: &R) -> Result<Self>
    where
        R: TokenResolver<Member = M>,
    {
        Self::decode_with_labels(raw, locals, resolver, Labels::default())
    }

    /// Decodes a raw body, taking labels from `labels`. Used when the result is combined with
    /// instructions that already hold labels from the same allocator.
    ///
    /// # Errors
    ///
    /// See [`MethodBody::decode`].
    pub fn decode_with_labels<R>(
        raw: &RawBody,
        locals: Vec<TypeSig>,
        resolver: &R,
        mut labels: Labels,
    ) -> Result<Self>
    where
        R: TokenResolver<Member = M>,
    {
        let instructions = decode(&raw.code, locals.len(), resolver, &mut labels)?;
        let exception_handlers = decode_handlers(&raw.clauses, &instructions, resolver)?;

        Ok(MethodBody {
            init_locals: raw.init_locals,
            max_stack: raw.max_stack,
            locals,
            instructions,
            exception_handlers,
            labels,
        })
    }

    /// Encodes the body. Offsets are recomputed from the instruction sizes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if a branch or handler refers to a missing instruction,
    /// a short branch is out of range, or a member has no token.
    pub fn encode<T: TokenEncoder<M>>(&self, tokens: &T) -> Result<RawBody> {
        let code = encode(&self.instructions, tokens)?;
        let offsets = label_offsets(&self.instructions);
        let end = code.len() as u32;

        let offset = |label: Option<Label>| -> Result<u32> {
            match label {
                None => Ok(end),
                Some(label) => offsets
                    .get(&label)
                    .copied()
                    .ok_or_else(|| Encode(format!("exception handler refers to unknown {label}"))),
            }
        };

        let mut clauses = Vec::with_capacity(self.exception_handlers.len());
        for handler in &self.exception_handlers {
            let try_offset = offset(Some(handler.try_start))?;
            let handler_offset = offset(Some(handler.handler_start))?;
            let try_end = offset(handler.try_end)?;
            let handler_end = offset(handler.handler_end)?;
            if try_end < try_offset || handler_end < handler_offset {
                return Err(Encode("exception handler range ends before it starts".to_string()));
            }

            let class_or_filter = if handler.flags.contains(ExceptionHandlerFlags::FILTER) {
                offset(handler.filter_start)?
            } else if let Some(catch_type) = &handler.catch_type {
                tokens.token(catch_type)?.value()
            } else {
                0
            };

            clauses.push(ExceptionClause {
                flags: handler.flags,
                try_offset,
                try_length: try_end - try_offset,
                handler_offset,
                handler_length: handler_end - handler_offset,
                class_or_filter,
            });
        }

        Ok(RawBody {
            init_locals: self.init_locals,
            max_stack: self.max_stack,
            code,
            clauses,
        })
    }

    /// Re-selects short and long branch forms.
    pub fn optimize_branches(&mut self) {
        optimize_branches(&mut self.instructions);
    }

    /// The label of the instruction starting at `offset`, `None` for the end of the method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if no instruction starts at `offset`.
    pub fn offset_at(&self, offset: u32) -> Result<Option<Label>> {
        label_at(&self.instructions, offset)
    }

    /// Position of the instruction carrying `label`.
    #[must_use]
    pub fn position(&self, label: Label) -> Option<usize> {
        self.instructions.iter().position(|i| i.label == label)
    }

    /// Returns `true` if [`MethodBody::inconsistency`] finds nothing, without checking
    /// argument indices.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.inconsistency(None).is_none()
    }

    /// Describes the first reference this body cannot satisfy: a branch target or handler
    /// boundary naming no instruction of the body, a local index outside the declared locals, or
    /// an argument index at or past `arguments` when the argument count is known. The end of
    /// the method is a valid handler boundary.
    #[must_use]
    pub fn inconsistency(&self, arguments: Option<usize>) -> Option<String> {
        let labels: std::collections::HashSet<Label> =
            self.instructions.iter().map(|i| i.label).collect();

        for instruction in &self.instructions {
            if let Some(target) = instruction.targets().into_iter().find(|t| !labels.contains(t)) {
                return Some(format!("{} branches to missing {target}", instruction.label));
            }
            if let Some(local) = instruction.local() {
                if usize::from(local) >= self.locals.len() {
                    return Some(format!(
                        "{} uses local {local} of {}",
                        instruction.label,
                        self.locals.len()
                    ));
                }
            }
            if let (Some(argument), Some(count)) = (instruction.argument(), arguments) {
                if usize::from(argument) >= count {
                    return Some(format!(
                        "{} uses argument {argument} of {count}",
                        instruction.label
                    ));
                }
            }
        }

        self.exception_handlers
            .iter()
            .flat_map(ExceptionHandler::labels)
            .find(|label| !labels.contains(label))
            .map(|label| format!("exception handler names missing {label}"))
    }
}

fn decode_handlers<R: TokenResolver>(
    clauses: &[ExceptionClause],
    instructions: &[Instruction<R::Member>],
    resolver: &R,
) -> Result<Vec<ExceptionHandler<R::Member>>> {
    let start = |offset: u32| -> Result<Label> {
        label_at(instructions, offset)?
            .ok_or_else(|| decode_error!(offset, "exception handler starts at the end of the method"))
    };

    let mut handlers = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let is_filter = clause.flags.contains(ExceptionHandlerFlags::FILTER);
        let is_catch = clause.flags.bits() == ExceptionHandlerFlags::EXCEPTION.bits();

        let catch_type = if is_catch && clause.class_or_filter != 0 {
            Some(resolver.resolve(Token::new(clause.class_or_filter), TokenKind::Type)?)
        } else {
            None
        };

        handlers.push(ExceptionHandler {
            flags: clause.flags,
            try_start: start(clause.try_offset)?,
            try_end: label_at(instructions, clause.try_offset + clause.try_length)?,
            handler_start: start(clause.handler_offset)?,
            handler_end: label_at(instructions, clause.handler_offset + clause.handler_length)?,
            catch_type,
            filter_start: if is_filter {
                Some(start(clause.class_or_filter)?)
            } else {
                None
            },
        });
    }
    Ok(handlers)
}
