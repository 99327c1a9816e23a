//! Result vocabulary for event interpreters.
//!
//! The engine uses `std::result::Result` directly; `Ok`/`Err`, `map`,
//! `map_err` and `and_then` are the std combinators. This module only names
//! the shape interpreters return and adds the two-armed `fold`.

/// Outcome of interpreting one event: the value that completes a step, or the
/// message of a domain failure.
pub type StepResult<T, E = String> = Result<T, E>;

/// Extra combinators over `Result`.
pub trait ResultExt<T, E> {
    /// Collapse both arms into one value (pattern match as a function).
    fn fold<R>(self, on_ok: impl FnOnce(T) -> R, on_err: impl FnOnce(E) -> R) -> R;

    /// Build a result from an optional value.
    fn from_option(option: Option<T>, error: E) -> Self;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn fold<R>(self, on_ok: impl FnOnce(T) -> R, on_err: impl FnOnce(E) -> R) -> R {
        match self {
            Ok(value) => on_ok(value),
            Err(error) => on_err(error),
        }
    }

    fn from_option(option: Option<T>, error: E) -> Self {
        option.ok_or(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_selects_the_matching_arm() {
        let ok: StepResult<i32> = Ok(2);
        let err: StepResult<i32> = Err("bad".to_string());

        assert_eq!(ok.fold(|v| v * 10, |_| -1), 20);
        assert_eq!(err.fold(|v| v * 10, |e| e.len() as i32), 3);
    }

    #[test]
    fn from_option_uses_the_error_for_none() {
        let missing: StepResult<i32> = ResultExt::from_option(None, "missing".to_string());
        assert_eq!(missing, Err("missing".to_string()));
        assert_eq!(<StepResult<i32>>::from_option(Some(1), String::new()), Ok(1));
    }
}
