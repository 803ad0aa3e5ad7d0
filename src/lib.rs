//! Parses Juju-style charm and bundle references, validates bundle YAML
//! documents against the deployment model's invariants, and lowers a valid
//! bundle into an ordered, dependency-linked change-set a client can execute
//! one record at a time.
//!
//! The three pieces are independent: [`reference`] and [`placement`] are
//! pure parsers with no knowledge of a whole bundle, [`validate`] walks a
//! decoded bundle tree and accumulates diagnostics without ever panicking or
//! returning early, and [`changeset`] assumes its input already passed
//! validation and produces the deployment plan.

pub mod changeset;
pub mod error;
pub mod model;
pub mod placement;
pub mod reference;
pub mod validate;

pub use changeset::{Method, Record};
pub use error::BundleError;
pub use model::RawBundle;
pub use reference::{Reference, Schema};
pub use placement::UnitPlacement;

/// Validate a bundle document, then lower it into a change-set. Returns the
/// validator's diagnostics unconsumed; a non-empty list means the change-set
/// pipeline was still run against a document that didn't pass validation, so
/// callers working with untrusted input should check `errors` before trusting
/// the records.
pub fn parse_bundle(yaml: &str) -> Result<(RawBundle, Vec<String>, Vec<Record>), BundleError> {
    let bundle = RawBundle::from_str(yaml).map_err(|e| BundleError::MalformedYaml(e.to_string()))?;
    let errors = validate::validate(&bundle);
    let records = changeset::parse(&bundle)?;
    Ok((bundle, errors, records))
}
