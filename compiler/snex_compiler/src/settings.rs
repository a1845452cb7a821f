//! Compiler configuration handed in by the host.

/// Identifiers for the optional optimization passes, spelled the way hosts
/// enable them.
pub mod optimizations {
    pub const CONSTANT_FOLDING: &str = "ConstantFolding";
    pub const BINARY_OP: &str = "BinaryOpOptimisation";
    pub const DEAD_CODE_ELIMINATION: &str = "DeadCodeElimination";
    pub const INLINING: &str = "Inlining";

    pub const ALL: &[&str] = &[
        CONSTANT_FOLDING,
        BINARY_OP,
        DEAD_CODE_ELIMINATION,
        INLINING,
    ];
}

/// Per-compilation settings.
#[derive(Clone, Debug)]
pub struct CompilerSettings {
    /// When set, `float` and `double` coerce implicitly in both
    /// directions. When cleared they only mix through an explicit cast.
    pub relaxed_float_policy: bool,
    /// Enabled optimization pass identifiers, from [`optimizations`].
    pub enabled_optimizations: Vec<String>,
}

impl CompilerSettings {
    /// Everything on; what a release host uses.
    pub fn all_optimizations() -> Self {
        CompilerSettings {
            relaxed_float_policy: true,
            enabled_optimizations: optimizations::ALL
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }

    #[must_use]
    pub fn with_optimization(mut self, name: &str) -> Self {
        if !self.is_enabled(name) {
            self.enabled_optimizations.push(name.to_owned());
        }
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_optimizations.iter().any(|o| o == name)
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        CompilerSettings {
            relaxed_float_policy: true,
            enabled_optimizations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_optimizations() {
        let s = CompilerSettings::default();
        assert!(!s.is_enabled(optimizations::CONSTANT_FOLDING));
        assert!(s.relaxed_float_policy);
    }

    #[test]
    fn with_optimization_is_idempotent() {
        let s = CompilerSettings::default()
            .with_optimization(optimizations::INLINING)
            .with_optimization(optimizations::INLINING);
        assert_eq!(s.enabled_optimizations.len(), 1);
    }
}
