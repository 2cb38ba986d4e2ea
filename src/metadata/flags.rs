//! Attribute flags of types, fields, methods, parameters and method bodies.
//!
//! The values follow ECMA-335 II.23.1. Access bits are a 3-bit enumeration embedded in the
//! attribute word rather than independent flags; [`FieldAttributes::access`],
//! [`MethodAttributes::access`] and [`TypeAttributes::visibility`] translate them to and from
//! [`AccessLevel`].

use bitflags::bitflags;

use crate::signature::AccessLevel;

/// Bitmask for the access sub-field of field and method attributes
pub const MEMBER_ACCESS_MASK: u16 = 0x0007;
/// Bitmask for the visibility sub-field of type attributes
pub const TYPE_VISIBILITY_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Type attributes
    pub struct TypeAttributes: u32 {
        /// Top-level type, not visible outside the assembly
        const NOT_PUBLIC = 0x0000_0000;
        /// Top-level type, visible everywhere
        const PUBLIC = 0x0000_0001;
        /// Nested, visible everywhere
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, visible to the enclosing type only
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, visible to the enclosing type and sub-types
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, visible within the assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, visible to sub-types within the assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, visible to sub-types or within the assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields have explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type cannot be instantiated
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Static initializer may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// The visibility as an access level. Top-level non-public types count as `Assembly`.
    #[must_use]
    pub fn visibility(self) -> AccessLevel {
        match self.bits() & TYPE_VISIBILITY_MASK {
            0 | 5 => AccessLevel::Assembly,
            1 | 2 => AccessLevel::Public,
            3 => AccessLevel::Private,
            4 => AccessLevel::Family,
            6 => AccessLevel::FamilyAndAssembly,
            _ => AccessLevel::FamilyOrAssembly,
        }
    }

    /// Replaces the visibility sub-field. Top-level types only distinguish `NotPublic` (up to
    /// `Assembly`) and `Public`.
    #[must_use]
    pub fn with_visibility(self, level: AccessLevel, nested: bool) -> Self {
        let bits = if nested {
            match level {
                AccessLevel::Private => 3,
                AccessLevel::FamilyAndAssembly => 6,
                AccessLevel::Family => 4,
                AccessLevel::Assembly => 5,
                AccessLevel::FamilyOrAssembly => 7,
                AccessLevel::Public => 2,
            }
        } else if level <= AccessLevel::Assembly {
            0
        } else {
            1
        };
        Self::from_bits_retain((self.bits() & !TYPE_VISIBILITY_MASK) | bits)
    }
}

fn member_access(bits: u16) -> Option<AccessLevel> {
    match bits & MEMBER_ACCESS_MASK {
        1 => Some(AccessLevel::Private),
        2 => Some(AccessLevel::FamilyAndAssembly),
        3 => Some(AccessLevel::Assembly),
        4 => Some(AccessLevel::Family),
        5 => Some(AccessLevel::FamilyOrAssembly),
        6 => Some(AccessLevel::Public),
        _ => None,
    }
}

fn member_access_bits(level: AccessLevel) -> u16 {
    match level {
        AccessLevel::Private => 1,
        AccessLevel::FamilyAndAssembly => 2,
        AccessLevel::Assembly => 3,
        AccessLevel::Family => 4,
        AccessLevel::FamilyOrAssembly => 5,
        AccessLevel::Public => 6,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field attributes
    pub struct FieldAttributes: u16 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in the assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on the type, not per instance
        const STATIC = 0x0010;
        /// Only assignable during initialization
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Not serialized when the type is remoted
        const NOT_SERIALIZED = 0x0080;
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0400;
        /// Field has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

impl FieldAttributes {
    /// The access level, `None` for compiler-controlled fields.
    #[must_use]
    pub fn access(self) -> Option<AccessLevel> {
        member_access(self.bits())
    }

    /// Replaces the access sub-field.
    #[must_use]
    pub fn with_access(self, level: AccessLevel) -> Self {
        Self::from_bits_retain((self.bits() & !MEMBER_ACCESS_MASK) | member_access_bits(level))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method attributes
    pub struct MethodAttributes: u16 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in the assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on the type, not per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Method can only be overridden if also accessible
        const STRICT = 0x0200;
        /// Method has no implementation
        const ABSTRACT = 0x0400;
        /// Name is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has security associated with it
        const HAS_SECURITY = 0x4000;
        /// Method calls another method containing security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodAttributes {
    /// The access level, `None` for compiler-controlled methods.
    #[must_use]
    pub fn access(self) -> Option<AccessLevel> {
        member_access(self.bits())
    }

    /// Replaces the access sub-field.
    #[must_use]
    pub fn with_access(self, level: AccessLevel) -> Self {
        Self::from_bits_retain((self.bits() & !MEMBER_ACCESS_MASK) | member_access_bits(level))
    }

    /// Clears the access sub-field, making the method compiler-controlled.
    #[must_use]
    pub fn compiler_controlled(self) -> Self {
        Self::from_bits_retain(self.bits() & !MEMBER_ACCESS_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method implementation attributes
    pub struct MethodImplAttributes: u16 {
        /// Method impl is IL
        const IL = 0x0000;
        /// Method impl is native
        const NATIVE = 0x0001;
        /// Method impl is OPTIL
        const OPTIL = 0x0002;
        /// Method impl is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method impl is unmanaged
        const UNMANAGED = 0x0004;
        /// Method may not be inlined
        const NO_INLINING = 0x0008;
        /// Method is defined, body provided elsewhere
        const FORWARD_REF = 0x0010;
        /// Method is single-threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Method may not be optimized
        const NO_OPTIMIZATION = 0x0040;
        /// Signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Method should be inlined if possible
        const AGGRESSIVE_INLINING = 0x0100;
        /// Reserved for internal use
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Parameter attributes
    pub struct ParamAttributes: u16 {
        /// Parameter is input
        const IN = 0x0001;
        /// Parameter is output
        const OUT = 0x0002;
        /// Parameter is optional
        const OPTIONAL = 0x0010;
        /// Parameter has a default value
        const HAS_DEFAULT = 0x1000;
        /// Parameter has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method body header flags
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header
        const TINY_FORMAT = 0x2;
        /// Fat method header
        const FAT_FORMAT = 0x3;
        /// More data sections follow the code
        const MORE_SECTS = 0x8;
        /// Locals are zero-initialized
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method data section flags
    pub struct SectionFlags: u8 {
        /// Exception handling table
        const EHTABLE = 0x1;
        /// Optimized IL table
        const OPT_ILTABLE = 0x2;
        /// Fat section layout
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Exception handling clause kinds
    pub struct ExceptionHandlerFlags: u16 {
        /// Typed catch clause
        const EXCEPTION = 0x0000;
        /// Filter and handler clause
        const FILTER = 0x0001;
        /// Finally clause
        const FINALLY = 0x0002;
        /// Fault clause
        const FAULT = 0x0004;
    }
}
