//! Custom attributes.
//!
//! Attributes are what the intent loader reads to find out what a mixin module wants done. Only
//! the pieces the loader needs are kept: the attribute type's full name and its fixed arguments
//! as strings (target type names, module names, member names).

use std::fmt;

/// A custom attribute attached to a module, type or member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomAttribute {
    /// Full name of the attribute type
    pub type_name: String,
    /// Fixed constructor arguments
    pub arguments: Vec<String>,
}

impl CustomAttribute {
    /// Creates an attribute without arguments.
    pub fn new(type_name: impl Into<String>) -> Self {
        CustomAttribute {
            type_name: type_name.into(),
            arguments: Vec::new(),
        }
    }

    /// Creates an attribute with a single string argument.
    pub fn with_argument(type_name: impl Into<String>, argument: impl Into<String>) -> Self {
        CustomAttribute {
            type_name: type_name.into(),
            arguments: vec![argument.into()],
        }
    }

    /// The attribute type name without namespace.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.type_name
            .rsplit_once('.')
            .map_or(self.type_name.as_str(), |(_, name)| name)
    }

    /// The first argument, if any.
    #[must_use]
    pub fn argument(&self) -> Option<&str> {
        self.arguments.first().map(String::as_str)
    }
}

impl fmt::Display for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.type_name)?;
        if !self.arguments.is_empty() {
            write!(f, "(\"{}\")", self.arguments.join("\", \""))?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        let attribute = CustomAttribute::with_argument("Vial.Mixins.PatchAttribute", "Game");
        assert_eq!(attribute.short_name(), "PatchAttribute");
        assert_eq!(attribute.argument(), Some("Game"));
        assert_eq!(attribute.to_string(), "[Vial.Mixins.PatchAttribute(\"Game\")]");

        let bare = CustomAttribute::new("Mixin");
        assert_eq!(bare.short_name(), "Mixin");
        assert_eq!(bare.argument(), None);
        assert_eq!(bare.to_string(), "[Mixin]");
    }
}
