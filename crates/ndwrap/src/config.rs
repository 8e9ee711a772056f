//! Configuration for the wrapper kernels.

/// What `copy_` does when it cannot carry a mutation through wrappers:
/// the operands are not both wrappers, or their levels differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPolicy {
    /// Warn and leave the destination untouched.
    #[default]
    Degrade,
    /// Return `DispatchError::MutationNotPreserved`.
    Fail,
}

/// Options passed to [`register_wrapper_kernels`](crate::wrapper::register_wrapper_kernels).
#[derive(Debug, Clone, Default)]
pub struct WrapperConfig {
    pub mutation_policy: MutationPolicy,
}

impl WrapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.mutation_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_degrades() {
        assert_eq!(WrapperConfig::new().mutation_policy, MutationPolicy::Degrade);
    }

    #[test]
    fn test_builder() {
        let config = WrapperConfig::new().with_mutation_policy(MutationPolicy::Fail);
        assert_eq!(config.mutation_policy, MutationPolicy::Fail);
    }
}
