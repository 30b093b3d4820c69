#![forbid(unsafe_code)]

//! Status of an asynchronous operation stored inside state.

use crate::shallow::{Same, ShallowEq};

/// Lifecycle of one tracked pending operation.
///
/// A field of this type moves `Default -> Loading -> Success | Failure` as a
/// staged update drives the operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AsyncStatus<R, E> {
    /// Nothing has been requested yet.
    #[default]
    Default,
    Loading,
    Success(R),
    Failure(E),
}

impl<R, E> AsyncStatus<R, E> {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failure(_))
    }

    #[must_use]
    pub fn response(&self) -> Option<&R> {
        match self {
            Self::Success(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Build a settled status from an operation result.
    #[must_use]
    pub fn settle(result: Result<R, E>) -> Self {
        match result {
            Ok(r) => Self::Success(r),
            Err(e) => Self::Failure(e),
        }
    }
}

impl<R: Same, E: Same> Same for AsyncStatus<R, E> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Default, Self::Default) | (Self::Loading, Self::Loading) => true,
            (Self::Success(a), Self::Success(b)) => a.same(b),
            (Self::Failure(a), Self::Failure(b)) => a.same(b),
            _ => false,
        }
    }
}

impl<R: Same, E: Same> ShallowEq for AsyncStatus<R, E> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_default_variant() {
        let status: AsyncStatus<i32, String> = AsyncStatus::default();
        assert_eq!(status, AsyncStatus::Default);
        assert!(!status.is_loading());
        assert!(!status.is_settled());
    }

    #[test]
    fn settle_maps_result() {
        let ok: AsyncStatus<i32, String> = AsyncStatus::settle(Ok(100));
        assert_eq!(ok.response(), Some(&100));
        assert!(ok.is_settled());

        let err: AsyncStatus<i32, String> = AsyncStatus::settle(Err("error".into()));
        assert_eq!(err.error().map(String::as_str), Some("error"));
        assert!(err.response().is_none());
    }

    #[test]
    fn shallow_gate_distinguishes_variants() {
        let loading: AsyncStatus<i32, String> = AsyncStatus::Loading;
        assert!(loading.shallow_eq(&AsyncStatus::Loading));
        assert!(!loading.shallow_eq(&AsyncStatus::Success(1)));
        assert!(AsyncStatus::<i32, String>::Success(1).shallow_eq(&AsyncStatus::Success(1)));
    }
}
