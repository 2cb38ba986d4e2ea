//! Metadata tokens.
//!
//! A token is the 32-bit operand CIL instructions use to refer to metadata: the high byte
//! selects a table, the low 24 bits are a 1-based row. Module images use the ECMA-335 table
//! numbers for the tables they carry, listed in [`TokenTable`].

use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

/// The metadata tables a module image exposes through tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum TokenTable {
    /// Reference to a type defined elsewhere
    TypeRef = 0x01,
    /// Type defined in this module
    TypeDef = 0x02,
    /// Field defined in this module
    Field = 0x04,
    /// Method defined in this module
    MethodDef = 0x06,
    /// Reference to a field or method defined elsewhere
    MemberRef = 0x0A,
    /// Raw signature blob
    StandAloneSig = 0x11,
    /// Type specification (array, generic instantiation, ...)
    TypeSpec = 0x1B,
    /// User string literal
    UserString = 0x70,
}

impl TokenTable {
    /// Maps a table byte back to a known table.
    #[must_use]
    pub fn from_id(id: u8) -> Option<TokenTable> {
        TokenTable::iter().find(|table| *table as u8 == id)
    }
}

/// A metadata token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Wraps a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table and a 1-based row.
    #[must_use]
    pub fn from_parts(table: TokenTable, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table, if it is one a module image carries.
    #[must_use]
    pub fn kind(&self) -> Option<TokenTable> {
        TokenTable::from_id(self.table())
    }

    /// The 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// The 0-based arena index the row refers to, `None` for row 0.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        (self.row() as usize).checked_sub(1)
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
