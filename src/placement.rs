//! Parsing of unit placement directives (the `to:` field on a service).
//!
//! Two incompatible grammars exist: legacy (v3, used by bundles with no
//! `machines` section) and v4. Grounded in
//! `original_source/jujubundlelib/models.py`'s `parse_v3_unit_placement` /
//! `parse_v4_unit_placement`.

use crate::error::BundleError;

/// A single parsed placement directive.
///
/// Each field uses the empty string to mean "absent", matching spec.md §3's
/// data model description verbatim (unlike `Reference`, which uses `Option`
/// for its optional fields — this type's shape is specified directly).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitPlacement {
    pub container_type: String,
    pub machine: String,
    pub service: String,
    pub unit: String,
}

impl UnitPlacement {
    pub fn machine(&self) -> Option<&str> {
        none_if_empty(&self.machine)
    }

    pub fn service(&self) -> Option<&str> {
        none_if_empty(&self.service)
    }

    pub fn unit(&self) -> Option<&str> {
        none_if_empty(&self.unit)
    }

    pub fn container_type(&self) -> Option<&str> {
        none_if_empty(&self.container_type)
    }
}

fn none_if_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Parse a placement directive under legacy (bundle version 3) rules:
/// `[container:]( machine-id | service-name )[=unit-index]`.
pub fn parse_v3(placement: &str) -> Result<UnitPlacement, BundleError> {
    let mut rest = placement;

    let container_type = if let Some(idx) = rest.find(':') {
        let (container, remainder) = rest.split_at(idx);
        rest = &remainder[1..];
        container.to_string()
    } else {
        String::new()
    };

    let unit = if let Some(idx) = rest.find('=') {
        let (target, remainder) = rest.split_at(idx);
        let unit = remainder[1..].to_string();
        rest = target;
        unit
    } else {
        String::new()
    };

    let (machine, service) = if is_digits(rest) {
        (rest.to_string(), String::new())
    } else {
        (String::new(), rest.to_string())
    };

    Ok(UnitPlacement {
        container_type,
        machine,
        service,
        unit,
    })
}

/// Parse a placement directive under version 4 rules:
/// `[container:]( machine-id | "new" | service-name )[/unit-index]`.
pub fn parse_v4(placement: &str) -> Result<UnitPlacement, BundleError> {
    let mut rest = placement;

    let container_type = if let Some(idx) = rest.find(':') {
        let (container, remainder) = rest.split_at(idx);
        rest = &remainder[1..];
        container.to_string()
    } else {
        String::new()
    };

    let unit = if let Some(idx) = rest.find('/') {
        let (target, remainder) = rest.split_at(idx);
        let unit = remainder[1..].to_string();
        rest = target;
        unit
    } else {
        String::new()
    };

    let (machine, service) = if is_digits(rest) || rest == "new" {
        (rest.to_string(), String::new())
    } else {
        (String::new(), rest.to_string())
    };

    Ok(UnitPlacement {
        container_type,
        machine,
        service,
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_machine() {
        let p = parse_v3("0").unwrap();
        assert_eq!(p.machine(), Some("0"));
        assert_eq!(p.service(), None);
    }

    #[test]
    fn v3_service_with_unit() {
        let p = parse_v3("wordpress=2").unwrap();
        assert_eq!(p.service(), Some("wordpress"));
        assert_eq!(p.unit(), Some("2"));
    }

    #[test]
    fn v3_container_on_machine() {
        let p = parse_v3("lxc:0").unwrap();
        assert_eq!(p.container_type(), Some("lxc"));
        assert_eq!(p.machine(), Some("0"));
    }

    #[test]
    fn v4_new_machine() {
        let p = parse_v4("new").unwrap();
        assert_eq!(p.machine(), Some("new"));
    }

    #[test]
    fn v4_service_with_unit() {
        let p = parse_v4("wordpress/2").unwrap();
        assert_eq!(p.service(), Some("wordpress"));
        assert_eq!(p.unit(), Some("2"));
    }

    #[test]
    fn v4_container_on_new_machine() {
        let p = parse_v4("lxc:new").unwrap();
        assert_eq!(p.container_type(), Some("lxc"));
        assert_eq!(p.machine(), Some("new"));
    }

    #[test]
    fn v4_container_on_existing_machine() {
        let p = parse_v4("kvm:3").unwrap();
        assert_eq!(p.container_type(), Some("kvm"));
        assert_eq!(p.machine(), Some("3"));
    }

    #[test]
    fn v3_vs_v4_differ_on_numeric_with_slash() {
        // v3 treats the whole thing as a service name (no '/' splitting rule).
        let v3 = parse_v3("wordpress").unwrap();
        assert_eq!(v3.service(), Some("wordpress"));
        // v4 recognizes "new" as a machine keyword that v3 does not.
        let v3_new = parse_v3("new").unwrap();
        assert_eq!(v3_new.service(), Some("new"));
        assert_eq!(v3_new.machine(), None);
    }
}
