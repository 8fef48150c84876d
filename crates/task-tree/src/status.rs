//! Status reported when polling a node's execution.

/// The observed state of a node's execution.
///
/// `Running` is the only non-terminal state. Once a runner reports `Success`
/// or `Failure` it keeps reporting the same value until it is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The node is still executing on its worker.
    Running,

    /// The node completed successfully.
    ///
    /// For actions: the operation returned `true`.
    /// For composites: every child that had to run succeeded.
    Success,

    /// The node failed, was cancelled, or raised an error.
    Failure,
}

impl Status {
    /// Returns `true` if this status is `Success` or `Failure`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Running)
    }

    /// Returns `true` if this status is `Running`.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }

    /// Returns `true` if this status is `Success`.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Returns `true` if this status is `Failure`.
    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failure)
    }
}

impl From<bool> for Status {
    #[inline]
    fn from(succeeded: bool) -> Self {
        if succeeded {
            Status::Success
        } else {
            Status::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_the_only_non_terminal_status() {
        assert!(!Status::Running.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(Status::Failure.is_terminal());
    }

    #[test]
    fn bool_maps_to_terminal_status() {
        assert_eq!(Status::from(true), Status::Success);
        assert_eq!(Status::from(false), Status::Failure);
    }
}
