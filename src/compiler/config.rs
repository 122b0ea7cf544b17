//! Configuration for the optimization pipeline.
//!
//! [`CompilerConfig`] controls which passes run, how the scheduler iterates and how strict
//! lifting is. The presets [`CompilerConfig::aggressive`] and
//! [`CompilerConfig::conservative`] cover the common trade-offs.

use crate::analysis::LiftConfig;

/// Configuration for the class inliner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInliningConfig {
    /// Run the class inliner (default: true).
    pub enabled: bool,

    /// Maximum estimated instruction count of all calls force-inlined for one allocation
    /// site (default: 65).
    pub instruction_allowance: usize,

    /// Maximum number of inline-then-reanalyze rounds per allocation site (default: 8).
    ///
    /// Inlining a constructor can expose further calls on the same instance; the site is
    /// re-analyzed after each round until no eligible call remains.
    pub max_inlining_rounds: usize,

    /// Record a `SiteRejected` event for every rejected allocation (default: false).
    pub log_rejections: bool,
}

impl Default for ClassInliningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instruction_allowance: 65,
            max_inlining_rounds: 8,
            log_rejections: false,
        }
    }
}

impl ClassInliningConfig {
    /// Creates the default class inlining configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with class inlining disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Configuration for a compilation run.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Options for lifting every method body.
    pub lift: LiftConfig,

    /// Class inliner settings.
    pub class_inlining: ClassInliningConfig,

    /// Forward bridge methods to their targets through a lens layer (default: true).
    pub enable_bridge_forwarding: bool,

    /// Merge straight-line block chains after inlining (default: true).
    pub enable_block_merging: bool,

    /// Run the SSA verifier on every function a pass changed (default: false).
    pub verify_after_passes: bool,

    /// Maximum iterations of the whole pipeline (default: 5).
    pub max_iterations: usize,

    /// Maximum iterations per phase before moving on (default: 10).
    pub max_phase_iterations: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            lift: LiftConfig::default(),
            class_inlining: ClassInliningConfig::default(),
            enable_bridge_forwarding: true,
            enable_block_merging: true,
            verify_after_passes: false,
            max_iterations: 5,
            max_phase_iterations: 10,
        }
    }
}

impl CompilerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that inlines more and iterates longer.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            class_inlining: ClassInliningConfig {
                instruction_allowance: 200,
                max_inlining_rounds: 16,
                ..ClassInliningConfig::default()
            },
            max_iterations: 10,
            max_phase_iterations: 20,
            ..Self::default()
        }
    }

    /// Creates a configuration that only lifts, verifying everything strictly.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            lift: LiftConfig {
                strict_stack: true,
                verify: true,
            },
            class_inlining: ClassInliningConfig::disabled(),
            enable_bridge_forwarding: false,
            enable_block_merging: false,
            verify_after_passes: true,
            max_iterations: 1,
            max_phase_iterations: 1,
        }
    }

    /// Sets the class inlining configuration.
    #[must_use]
    pub fn with_class_inlining(mut self, config: ClassInliningConfig) -> Self {
        self.class_inlining = config;
        self
    }

    /// Sets the lifting configuration.
    #[must_use]
    pub fn with_lift(mut self, lift: LiftConfig) -> Self {
        self.lift = lift;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert!(config.class_inlining.enabled);
        assert_eq!(config.class_inlining.instruction_allowance, 65);
        assert_eq!(config.class_inlining.max_inlining_rounds, 8);
        assert!(config.enable_bridge_forwarding);
        assert!(config.lift.verify);
        assert!(!config.lift.strict_stack);
    }

    #[test]
    fn test_presets() {
        let aggressive = CompilerConfig::aggressive();
        assert!(aggressive.class_inlining.instruction_allowance > 65);
        assert!(aggressive.max_iterations > CompilerConfig::default().max_iterations);

        let conservative = CompilerConfig::conservative();
        assert!(!conservative.class_inlining.enabled);
        assert!(conservative.lift.strict_stack);
        assert!(conservative.verify_after_passes);
    }
}
