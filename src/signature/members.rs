//! Field, method and parameter signatures.
//!
//! Member signatures are plain values: they are not interned, but equality, hashing and ordering
//! are structural, so a [`MethodSignature`] computed from a mixin module compares equal to the
//! one computed from the target module whenever both describe the same declaring type, name,
//! calling convention and parameter shapes.

use std::fmt;

use bitflags::bitflags;

use crate::{metadata::typesig::TypeSig, signature::TypeSignature};

bitflags! {
    /// Calling convention flags of a method signature (ECMA-335 II.23.2.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct CallingConvention: u8 {
        /// Variable argument list
        const VARARG = 0x05;
        /// Generic method with type parameters
        const GENERIC = 0x10;
        /// Instance method, `this` is passed implicitly
        const HAS_THIS = 0x20;
        /// `this` is passed as an explicit first parameter
        const EXPLICIT_THIS = 0x40;
    }
}

impl CallingConvention {
    /// Plain static convention.
    pub const DEFAULT: CallingConvention = CallingConvention::empty();

    /// Returns `true` for instance methods.
    #[must_use]
    pub fn is_instance(self) -> bool {
        self.contains(CallingConvention::HAS_THIS)
    }
}

/// Visibility levels in increasing order.
///
/// The order is the lattice used for promotion:
/// `Private < FamilyAndAssembly < Family < Assembly < FamilyOrAssembly < Public`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AccessLevel {
    /// Accessible only from the declaring type
    #[default]
    Private,
    /// Accessible from derived types in the same assembly
    FamilyAndAssembly,
    /// Accessible from derived types
    Family,
    /// Accessible from the same assembly
    Assembly,
    /// Accessible from derived types or the same assembly
    FamilyOrAssembly,
    /// Accessible from everywhere
    Public,
}

impl AccessLevel {
    /// Joins two levels: `Family` and `Assembly` join to `FamilyOrAssembly`, anything else to
    /// the greater of the two.
    #[must_use]
    pub fn join(self, other: AccessLevel) -> AccessLevel {
        match (self, other) {
            (AccessLevel::Family, AccessLevel::Assembly)
            | (AccessLevel::Assembly, AccessLevel::Family) => AccessLevel::FamilyOrAssembly,
            _ => self.max(other),
        }
    }

    /// Returns `true` if a member at this level is at least as visible as `required`.
    #[must_use]
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self.join(required) == self
    }
}

bitflags! {
    /// How a mixin uses a method parameter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        /// The parameter is read
        const READ = 0x1;
        /// The parameter is written
        const WRITE = 0x2;
    }
}

/// A field identified by declaring type, name and field type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldSignature {
    /// The declaring type
    pub declaring: TypeSignature,
    /// The field name
    pub name: String,
    /// The field type
    pub field_type: TypeSig,
}

impl FieldSignature {
    /// Creates a new field signature.
    #[must_use]
    pub fn new(declaring: TypeSignature, name: &str, field_type: TypeSig) -> Self {
        FieldSignature {
            declaring,
            name: name.to_string(),
            field_type,
        }
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring, self.name)
    }
}

impl fmt::Debug for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring, self.name)
    }
}

/// A method identified by declaring type, name, calling convention and parameter types.
///
/// The return type is not part of the identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    /// The declaring type
    pub declaring: TypeSignature,
    /// The method name
    pub name: String,
    /// Calling convention flags
    pub call_conv: CallingConvention,
    /// Parameter types in declaration order, `this` excluded
    pub parameters: Vec<TypeSig>,
}

impl MethodSignature {
    /// Creates a new method signature.
    #[must_use]
    pub fn new(
        declaring: TypeSignature,
        name: &str,
        call_conv: CallingConvention,
        parameters: Vec<TypeSig>,
    ) -> Self {
        MethodSignature {
            declaring,
            name: name.to_string(),
            call_conv,
            parameters,
        }
    }

    /// Returns the signature of the parameter at `index`.
    #[must_use]
    pub fn parameter(&self, index: usize) -> Option<ParameterSignature> {
        self.parameters.get(index).map(|param_type| ParameterSignature {
            method: self.clone(),
            index,
            param_type: param_type.clone(),
        })
    }

    /// Returns `true` for instance constructors. Type initializers (`.cctor`) have no base call
    /// and are merged as plain methods.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.declaring, self.name)?;
        for (index, parameter) in self.parameters.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{parameter}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} [{:?}]", self.call_conv)
    }
}

/// A parameter identified by its method and zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterSignature {
    /// The declaring method
    pub method: MethodSignature,
    /// Zero-based position, `this` excluded
    pub index: usize,
    /// The parameter type
    pub param_type: TypeSig,
}

impl fmt::Display for ParameterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{} in {}", self.index, self.param_type, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Primitive;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn player() -> TypeSignature {
        TypeSignature::class("Tests.Members.Player").unwrap()
    }

    fn int() -> TypeSig {
        TypeSig::Named(TypeSignature::builtin(Primitive::I4))
    }

    #[test]
    fn structural_equality() {
        let a = player().method(
            "Damage",
            CallingConvention::HAS_THIS,
            vec![int(), TypeSig::SzArray(Box::new(int()))],
        );
        let b = MethodSignature::new(
            TypeSignature::class("Tests.Members.Player").unwrap(),
            "Damage",
            CallingConvention::HAS_THIS,
            vec![int(), TypeSig::SzArray(Box::new(int()))],
        );

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = player().method("Damage", CallingConvention::HAS_THIS, vec![int()]);
        assert_ne!(a, c);
    }

    #[test]
    fn only_instance_constructors_keep_a_prologue() {
        let ctor = player().method(".ctor", CallingConvention::HAS_THIS, vec![int()]);
        let cctor = player().method(".cctor", CallingConvention::DEFAULT, vec![]);
        assert!(ctor.is_constructor());
        assert!(!cctor.is_constructor());
    }

    #[test]
    fn display_forms() {
        let field = player().field("health", int());
        assert_eq!(field.to_string(), "Tests.Members.Player::health");

        let method = player().method(
            "Move",
            CallingConvention::HAS_THIS,
            vec![int(), TypeSig::Named(TypeSignature::builtin(Primitive::R4))],
        );
        assert_eq!(
            method.to_string(),
            "Tests.Members.Player::Move(System.Int32, System.Single)"
        );

        let parameter = method.parameter(1).unwrap();
        assert_eq!(
            parameter.to_string(),
            "[1]System.Single in Tests.Members.Player::Move(System.Int32, System.Single)"
        );
        assert!(method.parameter(2).is_none());
    }

    #[test]
    fn access_join() {
        use AccessLevel::*;

        assert_eq!(Family.join(Assembly), FamilyOrAssembly);
        assert_eq!(Assembly.join(Family), FamilyOrAssembly);
        assert_eq!(Private.join(Assembly), Assembly);
        assert_eq!(Public.join(Family), Public);
        assert_eq!(FamilyAndAssembly.join(Family), Family);

        assert!(Public.satisfies(Assembly));
        assert!(Assembly.satisfies(Assembly));
        assert!(!Family.satisfies(Assembly));
        assert!(FamilyOrAssembly.satisfies(Family));
    }
}
