//! A thin, order-preserving view over a decoded bundle YAML tree.
//!
//! The validator and the change-set generator both need to walk a bundle
//! whose shape may be malformed in arbitrary ways, so unlike `bundle.rs`'s
//! `Application`/`Bundle` structs (which fail to deserialize on the first
//! unexpected field), this module works directly against a `serde_yaml::Value`
//! tree and never rejects a shape up front — only the validator decides
//! what's wrong, and it does so by producing diagnostics rather than by
//! failing to parse.

use serde_yaml::{Mapping, Value};

/// A decoded bundle document.
///
/// Wraps a `serde_yaml::Value`, whose `Mapping` variant preserves the input's
/// key insertion order — this satisfies the "insertion-ordered mappings"
/// requirement without pulling in a dependency the teacher never used.
#[derive(Debug, Clone)]
pub struct RawBundle {
    root: Value,
}

impl RawBundle {
    pub fn new(root: Value) -> Self {
        RawBundle { root }
    }

    pub fn from_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(RawBundle {
            root: serde_yaml::from_str(yaml)?,
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        self.root.as_mapping()
    }

    /// The bundle-level `series`, if present and a string.
    pub fn series(&self) -> Option<&str> {
        get_str(self.as_mapping()?, "series")
    }

    /// The bundle-level `series` key's raw value, whatever its type —
    /// the validator needs this to report "series must be a string" when
    /// it isn't one.
    pub fn raw_series(&self) -> Option<&Value> {
        get(self.as_mapping()?, "series")
    }

    /// The services/applications mapping, under whichever spelling is present.
    /// Per spec.md's dual-key aliasing, `services` is consulted first, then
    /// `applications`.
    pub fn services(&self) -> Option<&Mapping> {
        let m = self.as_mapping()?;
        get(m, "services")
            .or_else(|| get(m, "applications"))
            .and_then(Value::as_mapping)
    }

    /// Whichever of `services`/`applications` is present, as a raw `Value`
    /// (so the validator can complain if it isn't a mapping at all).
    pub fn raw_services(&self) -> Option<&Value> {
        let m = self.as_mapping()?;
        get(m, "services").or_else(|| get(m, "applications"))
    }

    pub fn machines(&self) -> Option<&Mapping> {
        get(self.as_mapping()?, "machines").and_then(Value::as_mapping)
    }

    pub fn raw_machines(&self) -> Option<&Value> {
        get(self.as_mapping()?, "machines")
    }

    /// A bundle is "legacy" (version 3) when it has no top-level `machines`
    /// key at all — distinct from having an empty one.
    pub fn is_legacy_bundle(&self) -> bool {
        self.as_mapping()
            .map(|m| !m.contains_key(&Value::from("machines")))
            .unwrap_or(true)
    }

    pub fn relations(&self) -> Option<&Vec<Value>> {
        get(self.as_mapping()?, "relations").and_then(Value::as_sequence)
    }

    pub fn raw_relations(&self) -> Option<&Value> {
        get(self.as_mapping()?, "relations")
    }
}

/// Look up `key` in `m`, treating `m` as a string-keyed mapping.
pub fn get<'a>(m: &'a Mapping, key: &str) -> Option<&'a Value> {
    m.get(&Value::from(key))
}

pub fn get_str<'a>(m: &'a Mapping, key: &str) -> Option<&'a str> {
    get(m, key)?.as_str()
}

pub fn get_bool(m: &Mapping, key: &str) -> Option<bool> {
    get(m, key)?.as_bool()
}

pub fn get_mapping<'a>(m: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    get(m, key)?.as_mapping()
}

/// Coerce a value to an `i64` the way Python's `int()` would for the types
/// that actually appear in YAML-decoded bundles: a native integer, or a
/// string made up entirely of digits (with an optional leading `-`).
pub fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

/// A single service/application entry, together with its name.
#[derive(Debug, Clone, Copy)]
pub struct ServiceView<'a> {
    pub name: &'a str,
    raw: &'a Value,
}

impl<'a> ServiceView<'a> {
    pub fn new(name: &'a str, raw: &'a Value) -> Self {
        ServiceView { name, raw }
    }

    pub fn as_mapping(&self) -> Option<&'a Mapping> {
        self.raw.as_mapping()
    }

    pub fn raw_charm(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "charm")
    }

    pub fn charm_str(&self) -> Option<&'a str> {
        self.raw_charm()?.as_str()
    }

    /// `num_units` defaults to 0 when absent (spec.md's data model), unlike
    /// the stricter original which rejects a missing key outright.
    pub fn raw_num_units(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "num_units")
    }

    /// The raw `to` value — absent, a scalar, or a sequence. Callers
    /// normalize this into a `Vec<String>` themselves, since the validator
    /// and the generator normalize slightly differently (the generator
    /// additionally performs v4 "sticky" extension).
    pub fn raw_to(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "to")
    }

    pub fn raw_constraints(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "constraints")
    }

    pub fn raw_storage(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "storage")
    }

    pub fn raw_options(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "options")
    }

    pub fn raw_annotations(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "annotations")
    }

    pub fn raw_expose(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "expose")
    }
}

/// Normalize a `to` value into a list of placement-directive strings.
/// A missing key normalizes to an empty list; a bare scalar normalizes to a
/// single-element list; a sequence is read element-by-element, non-string
/// elements stringified via their YAML rendering so callers still get a
/// diagnostic-friendly value instead of silently dropping the entry.
pub fn normalize_to_list(v: Option<&Value>) -> Vec<String> {
    match v {
        None => Vec::new(),
        Some(Value::Sequence(seq)) => seq.iter().map(value_to_display_string).collect(),
        Some(other) => vec![value_to_display_string(other)],
    }
}

fn value_to_display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => serde_yaml::to_string(v).unwrap_or_default().trim().to_string(),
    }
}

/// A single machine entry, together with its id.
#[derive(Debug, Clone, Copy)]
pub struct MachineView<'a> {
    pub id: &'a str,
    raw: &'a Value,
}

impl<'a> MachineView<'a> {
    pub fn new(id: &'a str, raw: &'a Value) -> Self {
        MachineView { id, raw }
    }

    pub fn as_mapping(&self) -> Option<&'a Mapping> {
        self.raw.as_mapping()
    }

    pub fn series(&self) -> Option<&'a str> {
        get_str(self.as_mapping()?, "series")
    }

    pub fn raw_constraints(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "constraints")
    }

    pub fn raw_annotations(&self) -> Option<&'a Value> {
        get(self.as_mapping()?, "annotations")
    }
}
