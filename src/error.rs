//! Errors for bundlechange

use failure::Fail;

/// The single error type returned by this crate.
///
/// Per the design note in spec.md §7, there are two logically distinct
/// failure modes upstream (validator diagnostics vs. parse-time invalid
/// input), but only the latter ever surfaces as a `Result::Err` here: the
/// validator always returns a list of diagnostic strings and never fails.
#[derive(Debug, Fail, PartialEq, Eq, Clone)]
pub enum BundleError {
    /// A charm/bundle reference URL did not match the grammar in spec.md §6.
    #[fail(display = "invalid reference url `{}`: {}", _0, _1)]
    InvalidReference(String, String),

    /// A unit placement directive did not parse under v3 or v4 rules.
    #[fail(display = "invalid placement directive `{}`: {}", _0, _1)]
    InvalidPlacement(String, String),

    /// A placement directive referred to a service, machine, or unit index
    /// that does not exist in the bundle being lowered.
    ///
    /// The change-set generator assumes a validated bundle (spec.md §4.C); this
    /// variant exists for the cases spec.md §9 calls out as the generator's own
    /// responsibility to re-check (self-referential `to: "name=N"` placements).
    #[fail(display = "placement directive refers to unknown {}: {}", _0, _1)]
    UnknownPlacementTarget(&'static str, String),

    /// A bundle declared a `to` placement on a legacy (v3) bundle targeting a
    /// machine other than `"0"`.
    #[fail(
        display = "legacy bundles may only place units on machine 0, got `{}`",
        _0
    )]
    LegacyNonZeroMachine(String),

    /// The input wasn't well-formed YAML at all, so it never became a
    /// `RawBundle` for the validator or generator to look at.
    #[fail(display = "malformed bundle YAML: {}", _0)]
    MalformedYaml(String),
}
