//! The intent vocabulary.
//!
//! A mixin module says what it wants through custom attributes on the module, its types and
//! their members. Attribute types are recognised by their short name, with or without the
//! `Attribute` suffix, either unqualified or in the `Vial.Mixins` namespace. Attributes of any
//! other namespace are not intents and are skipped.
//!
//! | Attribute | Target | Meaning |
//! |---|---|---|
//! | `Patch(module)` | module | names the target module, required |
//! | `Required(module)` | module | searches `module` after the target |
//! | `Mixin` | type, method | merge into the target definition |
//! | `Dependency` | type, member | use the target definition, relaxing its visibility |
//! | `Inject` | type, member | add the definition to the target |
//! | `BaseDependency` | method | call the pre-merge body of the mixed method |
//! | `Name(target)` | type, member | match `target` instead of the own name |
//! | `RewriteBase` | constructor | keep the replacement's base constructor call |
//! | `Transparent` | type, member | ignored by the loader |

use strum::{Display, EnumDiscriminants};

use crate::{metadata::attribute::CustomAttribute, Error, Result};

/// Namespace of the intent attributes.
pub const NAMESPACE: &str = "Vial.Mixins";

/// One intent attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumDiscriminants)]
#[strum_discriminants(name(IntentKind), derive(Hash, Display), doc = "Discriminant-only kind of an [`Intent`].")]
pub enum Intent {
    /// The module patches the named module
    Patch(String),
    /// The module depends on the named module
    Required(String),
    /// Use the target definition
    Dependency,
    /// Merge into the target definition
    Mixin,
    /// Add to the target
    Inject,
    /// Refers to the pre-merge body
    BaseDependency,
    /// Match this name instead of the own name
    Name(String),
    /// Keep the replacement's base constructor call
    RewriteBase,
    /// Ignored by the loader
    Transparent,
}

impl Intent {
    /// Reads an attribute. Returns `None` for attributes that are not intents.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if an intent that takes an argument has none.
    pub fn from_attribute(attribute: &CustomAttribute) -> Result<Option<Intent>> {
        if let Some((namespace, _)) = attribute.type_name.rsplit_once('.') {
            if namespace != NAMESPACE {
                return Ok(None);
            }
        }

        let short = attribute.short_name();
        let name = short.strip_suffix("Attribute").unwrap_or(short);
        let argument = || {
            attribute.argument().map(str::to_string).ok_or_else(|| {
                Error::Configuration(format!("{attribute} requires an argument"))
            })
        };

        Ok(Some(match name {
            "Patch" => Intent::Patch(argument()?),
            "Required" => Intent::Required(argument()?),
            "Dependency" => Intent::Dependency,
            "Mixin" => Intent::Mixin,
            "Inject" => Intent::Inject,
            "BaseDependency" => Intent::BaseDependency,
            "Name" => Intent::Name(argument()?),
            "RewriteBase" => Intent::RewriteBase,
            "Transparent" => Intent::Transparent,
            _ => return Ok(None),
        }))
    }

    /// The attribute that expresses this intent.
    #[must_use]
    pub fn to_attribute(&self) -> CustomAttribute {
        let type_name = format!("{NAMESPACE}.{}Attribute", IntentKind::from(self));
        match self.argument() {
            Some(argument) => CustomAttribute::with_argument(type_name, argument),
            None => CustomAttribute::new(type_name),
        }
    }

    /// The module or type name carried by `Patch`, `Required` and `Name`.
    #[must_use]
    pub fn argument(&self) -> Option<&str> {
        match self {
            Intent::Patch(argument) | Intent::Required(argument) | Intent::Name(argument) => {
                Some(argument)
            }
            _ => None,
        }
    }
}

/// The intents of one module, type or member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intents(Vec<Intent>);

impl Intents {
    /// Reads every intent among `attributes`.
    ///
    /// # Errors
    ///
    /// See [`Intent::from_attribute`].
    pub fn parse(attributes: &[CustomAttribute]) -> Result<Self> {
        let mut intents = Vec::new();
        for attribute in attributes {
            if let Some(intent) = Intent::from_attribute(attribute)? {
                intents.push(intent);
            }
        }
        Ok(Intents(intents))
    }

    /// Returns `true` if an intent of `kind` is present.
    #[must_use]
    pub fn has(&self, kind: IntentKind) -> bool {
        self.0.iter().any(|intent| IntentKind::from(intent) == kind)
    }

    /// The `Name` target, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.iter().find_map(|intent| match intent {
            Intent::Name(target) => Some(target.as_str()),
            _ => None,
        })
    }

    /// The `Patch` target, if any.
    #[must_use]
    pub fn patch(&self) -> Option<&str> {
        self.0.iter().find_map(|intent| match intent {
            Intent::Patch(target) => Some(target.as_str()),
            _ => None,
        })
    }

    /// Every `Required` module, in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|intent| match intent {
            Intent::Required(module) => Some(module.as_str()),
            _ => None,
        })
    }

    /// Adds an intent implied by the enclosing type.
    pub fn push(&mut self, intent: Intent) {
        self.0.push(intent);
    }

    /// The intents in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.0.iter()
    }

    /// Returns `true` if no intent is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fails if both `a` and `b` are present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] naming `owner` and both intents.
    pub fn exclusive(&self, a: IntentKind, b: IntentKind, owner: &dyn std::fmt::Display) -> Result<()> {
        if self.has(a) && self.has(b) {
            return Err(Error::Configuration(format!(
                "{owner} cannot be both {a} and {b}"
            )));
        }
        Ok(())
    }
}
