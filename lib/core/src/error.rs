//! Error handling foundation for deal-courier.
//!
//! Only the `Result` alias lives here. Each crate defines its own domain
//! error enums in its `error` module and reports them through rootcause,
//! so a failure carries the context of the layer that produced it.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "refused")
        }
    }

    impl std::error::Error for Refused {}

    fn refuse() -> Result<(), Refused> {
        Err(Refused.into())
    }

    #[test]
    fn result_alias_carries_typed_reports() {
        let ok: Result<u32> = Ok(7);
        assert_eq!(ok.expect("should be ok"), 7);

        let err = refuse().expect_err("should fail");
        assert!(err.to_string().contains("refused"));
    }
}
