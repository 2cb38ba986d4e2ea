//! Patch application options.

/// Default suffix of preserved-original method names.
pub const DEFAULT_BASE_SUFFIX: &str = "<Base>$";

/// Options for [`crate::Patcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOptions {
    /// Suffix appended to a method name (before the decimal counter) to name its preserved
    /// original
    pub base_suffix: String,

    /// Search the required modules listed by a configuration when a symbol is not found in
    /// the target
    pub resolve_in_required: bool,

    /// Re-select short and long branch forms after merging
    pub optimize_branches: bool,

    /// Fail with [`crate::Error::Validation`] when dependencies or mixins stay unresolved.
    /// When disabled they are only listed in the report.
    pub fail_on_unresolved: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            base_suffix: DEFAULT_BASE_SUFFIX.to_string(),
            resolve_in_required: true,
            optimize_branches: true,
            fail_on_unresolved: true,
        }
    }
}

impl PatchOptions {
    /// Resolves in the target only.
    #[must_use]
    pub fn strict() -> Self {
        PatchOptions {
            resolve_in_required: false,
            ..Self::default()
        }
    }

    /// Reports unresolved symbols instead of failing.
    ///
    /// **Warning**: a module patched this way may reference members that do not exist.
    #[must_use]
    pub fn permissive() -> Self {
        PatchOptions {
            fail_on_unresolved: false,
            ..Self::default()
        }
    }

    /// Sets the preserved-original suffix.
    #[must_use]
    pub fn with_base_suffix(mut self, suffix: &str) -> Self {
        self.base_suffix = suffix.to_string();
        self
    }

    /// Enables or disables the required-module fallback.
    #[must_use]
    pub fn with_resolve_in_required(mut self, enabled: bool) -> Self {
        self.resolve_in_required = enabled;
        self
    }

    /// Enables or disables branch form optimization.
    #[must_use]
    pub fn with_optimize_branches(mut self, enabled: bool) -> Self {
        self.optimize_branches = enabled;
        self
    }

    /// Enables or disables failing on unresolved symbols.
    #[must_use]
    pub fn with_fail_on_unresolved(mut self, enabled: bool) -> Self {
        self.fail_on_unresolved = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_options_presets() {
        let default = PatchOptions::default();
        assert_eq!(default.base_suffix, "<Base>$");
        assert!(default.resolve_in_required);
        assert!(default.optimize_branches);
        assert!(default.fail_on_unresolved);

        let strict = PatchOptions::strict();
        assert!(!strict.resolve_in_required);
        assert!(strict.fail_on_unresolved);

        let permissive = PatchOptions::permissive();
        assert!(permissive.resolve_in_required);
        assert!(!permissive.fail_on_unresolved);
    }

    #[test]
    fn test_setters_chain() {
        let options = PatchOptions::default()
            .with_base_suffix("$orig")
            .with_optimize_branches(false)
            .with_resolve_in_required(false);
        assert_eq!(options.base_suffix, "$orig");
        assert!(!options.optimize_branches);
        assert_eq!(
            options.with_resolve_in_required(true).with_base_suffix("<Base>$"),
            PatchOptions::default().with_optimize_branches(false)
        );
    }
}
