//! Bundle validation.
//!
//! Walks a decoded bundle tree and accumulates human-readable diagnostics.
//! Unlike the reference and placement parsers, this never fails: malformed
//! input produces diagnostics, not an `Err`. Grounded in
//! `original_source/jujubundlelib/validate.py`.

use std::collections::HashSet;

use serde_yaml::Value;

use crate::model::{self, MachineView, RawBundle, ServiceView};
use crate::placement::{self, UnitPlacement};
use crate::reference::Reference;

/// Accumulates diagnostics while walking a bundle. Mirrors the original's
/// `BundleValidator`, minus the bundle reference itself (we thread `&RawBundle`
/// through function arguments instead of storing it on the collector, since
/// Rust's borrow checker makes a self-referential "bundle + errors" struct
/// awkward for no benefit here).
#[derive(Debug, Default)]
struct Collector {
    errors: Vec<String>,
}

impl Collector {
    fn push(&mut self, message: String) {
        self.errors.push(message);
    }
}

const CONSTRAINT_KEYS: &[&str] = &[
    "arch",
    "cpu-cores",
    "cores",
    "mem",
    "root-disk",
    "container",
    "cpu-power",
    "tags",
    "networks",
    "instance-type",
];

/// Validate a decoded bundle tree, returning a possibly-empty ordered list
/// of diagnostic strings. Never panics or raises on malformed input.
pub fn validate(bundle: &RawBundle) -> Vec<String> {
    if bundle.as_mapping().is_none() {
        return vec!["bundle does not appear to be a bundle".to_string()];
    }

    if let Some(raw_machines) = bundle.raw_machines() {
        if raw_machines.as_mapping().is_none() {
            return vec!["machines spec does not appear to be well-formed".to_string()];
        }
    }

    let raw_services = bundle.raw_services();
    match raw_services {
        None => return vec!["bundle does not define any (services|applications)".to_string()],
        Some(v) => {
            if let Some(m) = v.as_mapping() {
                if m.is_empty() {
                    return vec![
                        "bundle does not define any (services|applications)".to_string()
                    ];
                }
            }
        }
    }

    let mut collector = Collector::default();

    if let Some(series) = bundle.raw_series() {
        validate_series(&mut collector, series);
    }

    let mut machines_used: HashSet<String> = HashSet::new();
    validate_machines(&mut collector, bundle);
    validate_services(&mut collector, bundle, &mut machines_used);
    validate_relations(&mut collector, bundle);

    if let Some(machines) = bundle.machines() {
        for (id, _) in machines.iter() {
            if let Some(id_str) = id.as_str() {
                if !machines_used.contains(id_str) {
                    collector.push(format!(
                        "machine {} not referred to by a placement directive",
                        id_str
                    ));
                }
            }
        }
    }

    collector.errors
}

fn validate_series(collector: &mut Collector, series: &Value) {
    match series.as_str() {
        Some(s) => {
            if !is_valid_series(s) {
                collector.push(format!("bundle has invalid series {}", s));
            }
        }
        None => {
            collector.push(format!(
                "bundle has invalid series {}",
                display_scalar(series)
            ));
        }
    }
}

/// A series is valid per the reference grammar and must not be the
/// bundle-typed sentinel `"bundle"`.
fn is_valid_series(s: &str) -> bool {
    crate::reference::valid_series(s) && s != "bundle"
}

fn validate_machines(collector: &mut Collector, bundle: &RawBundle) {
    let machines = match bundle.machines() {
        Some(m) => m,
        None => return,
    };
    for (id, raw) in machines.iter() {
        let id_str = match id.as_str() {
            Some(s) => s.to_string(),
            None => display_scalar(id),
        };
        match id_str.parse::<i64>() {
            Ok(n) if n < 0 => collector.push(format!(
                "machine {} has an invalid id, must be positive digit",
                id_str
            )),
            Ok(_) => {}
            Err(_) => collector.push(format!(
                "machine {} has an invalid id, must be digit",
                id_str
            )),
        }

        let view = MachineView::new(&id_str, raw);
        if let Some(constraints) = view.raw_constraints() {
            if !valid_constraints(constraints) {
                collector.push(format!(
                    "machine {} has invalid constraints {}",
                    id_str,
                    display_scalar(constraints)
                ));
            }
        }
        if let Some(mapping) = view.as_mapping() {
            if model::get(mapping, "series").is_some() {
                match view.series() {
                    Some(s) if is_valid_series(s) => {}
                    Some(s) => collector.push(format!(
                        "machine {} has invalid series {}",
                        id_str, s
                    )),
                    None => collector.push(format!(
                        "machine {} has invalid series {}",
                        id_str,
                        display_scalar(model::get(mapping, "series").unwrap())
                    )),
                }
            }
        }
        if let Some(annotations) = view.raw_annotations() {
            if !valid_annotations(annotations) {
                collector.push(format!(
                    "machine {} has invalid annotations {}",
                    id_str,
                    display_scalar(annotations)
                ));
            }
        }
    }
}

/// Annotations must be a mapping whose keys are all strings.
fn valid_annotations(v: &Value) -> bool {
    match v.as_mapping() {
        Some(m) => m.keys().all(|k| k.as_str().is_some()),
        None => false,
    }
}

/// A constraints string is a space-separated list of `key=value` tokens
/// drawn from a closed key set, each with a non-empty value.
fn valid_constraints(v: &Value) -> bool {
    let s = match v.as_str() {
        Some(s) => s,
        None => return false,
    };
    if s.trim().is_empty() {
        return true;
    }
    s.split_whitespace().all(|token| {
        let parts: Vec<&str> = token.splitn(2, '=').collect();
        match parts[..] {
            [key, value] => !value.is_empty() && CONSTRAINT_KEYS.contains(&key),
            _ => false,
        }
    })
}

fn validate_services(
    collector: &mut Collector,
    bundle: &RawBundle,
    machines_used: &mut HashSet<String>,
) {
    let services = match bundle.services() {
        Some(s) => s,
        None => {
            collector.push("services spec does not appear to be well-formed".to_string());
            return;
        }
    };

    let is_legacy = bundle.is_legacy_bundle();

    let service_lookup: std::collections::HashMap<&str, Option<i64>> = services
        .iter()
        .filter_map(|(name, raw)| {
            let name = name.as_str()?;
            let view = ServiceView::new(name, raw);
            let units = match view.raw_num_units() {
                None => Some(0),
                Some(v) => model::coerce_i64(v),
            };
            Some((name, units))
        })
        .collect();

    for (name, raw) in services.iter() {
        let service_name = match name.as_str() {
            Some(s) => s,
            None => continue,
        };
        let view = ServiceView::new(service_name, raw);

        let charm = match view.charm_str() {
            None => {
                collector.push(format!(
                    "invalid charm specified for service {}: charm is required",
                    service_name
                ));
                None
            }
            Some(charm_str) => match Reference::parse(charm_str, false) {
                Err(e) => {
                    collector.push(format!(
                        "invalid charm specified for service {}: {}",
                        service_name, e
                    ));
                    None
                }
                Ok(reference) => {
                    if reference.is_local() {
                        collector.push(format!(
                            "local charms not allowed for service {}: {}",
                            service_name, reference
                        ));
                    }
                    if reference.is_bundle() {
                        collector.push(format!(
                            "bundles not allowed for service {}: {}",
                            service_name, reference
                        ));
                    }
                    Some(reference)
                }
            },
        };

        if let Some(constraints) = view.raw_constraints() {
            if !valid_constraints(constraints) {
                collector.push(format!(
                    "service {} has invalid constraints {}",
                    service_name,
                    display_scalar(constraints)
                ));
            }
        }

        let num_units = match view.raw_num_units() {
            None => Some(0),
            Some(v) => model::coerce_i64(v),
        };

        let num_units = match num_units {
            None => {
                collector.push(format!(
                    "invalid units for service {}: must be a digit",
                    service_name
                ));
                validate_placements(
                    collector,
                    &view,
                    charm.as_ref(),
                    bundle,
                    &service_lookup,
                    machines_used,
                    is_legacy,
                );
                continue;
            }
            Some(n) => n,
        };

        if num_units < 0 {
            collector.push(format!(
                "invalid units for service {}: must be a positive digit",
                service_name
            ));
        }

        let placement_count = validate_placements(
            collector,
            &view,
            charm.as_ref(),
            bundle,
            &service_lookup,
            machines_used,
            is_legacy,
        );
        if placement_count as i64 > num_units {
            collector.push(format!("too many units for service {}", service_name));
        }

        if let Some(options) = view.raw_options() {
            if options.as_mapping().is_none() {
                collector.push(format!("service {} has malformed options", service_name));
            }
        }

        if let Some(storage) = view.raw_storage() {
            if storage.as_mapping().is_none() {
                collector.push(format!("service {} has malformed storage", service_name));
            }
        }

        if let Some(annotations) = view.raw_annotations() {
            if !valid_annotations(annotations) {
                collector.push(format!(
                    "service {} has invalid annotations {}",
                    service_name,
                    display_scalar(annotations)
                ));
            }
        }

        if let Some(expose) = view.raw_expose() {
            if expose.as_bool().is_none() {
                collector.push(format!(
                    "service {} has invalid expose value {}",
                    service_name,
                    display_scalar(expose)
                ));
            }
        }
    }
}

fn validate_placements(
    collector: &mut Collector,
    view: &ServiceView,
    charm: Option<&Reference>,
    bundle: &RawBundle,
    service_lookup: &std::collections::HashMap<&str, Option<i64>>,
    machines_used: &mut HashSet<String>,
    is_legacy: bool,
) -> usize {
    let directives = model::normalize_to_list(view.raw_to());
    for directive in &directives {
        validate_placement(
            collector,
            directive,
            charm,
            bundle,
            service_lookup,
            machines_used,
            is_legacy,
        );
    }
    directives.len()
}

fn validate_placement(
    collector: &mut Collector,
    directive: &str,
    charm: Option<&Reference>,
    bundle: &RawBundle,
    service_lookup: &std::collections::HashMap<&str, Option<i64>>,
    machines_used: &mut HashSet<String>,
    is_legacy: bool,
) {
    let parsed: Result<UnitPlacement, _> = if is_legacy {
        placement::parse_v3(directive)
    } else {
        placement::parse_v4(directive)
    };
    let unit_placement = match parsed {
        Ok(p) => p,
        Err(e) => {
            collector.push(e.to_string());
            return;
        }
    };

    if let Some(container_type) = unit_placement.container_type() {
        if container_type != "lxc" && container_type != "kvm" {
            collector.push(format!(
                "placement {} has invalid container type {}",
                directive, container_type
            ));
        }
    }

    if let Some(target_service) = unit_placement.service() {
        match service_lookup.get(target_service) {
            None => collector.push(format!(
                "placement {} refers to non-existant service {}",
                directive, target_service
            )),
            Some(&target_num_units) => {
                if let (Some(unit), Some(target_num_units)) =
                    (unit_placement.unit(), target_num_units)
                {
                    if let Ok(idx) = unit.parse::<i64>() {
                        if idx + 1 > target_num_units {
                            collector.push(format!(
                                "placement {} specifies a unit greater than the units in service {}",
                                directive, target_service
                            ));
                        }
                    }
                }
            }
        }
        return;
    }

    if let Some(machine) = unit_placement.machine() {
        if is_legacy {
            if machine != "0" {
                collector.push(format!(
                    "legacy bundles may only place units on machine 0, got {}",
                    machine
                ));
            }
            return;
        }
        if machine == "new" {
            return;
        }
        match bundle.machines().and_then(|m| model::get(m, machine)) {
            None => collector.push(format!(
                "placement {} refers to a non-existant machine {}",
                directive, machine
            )),
            Some(machine_raw) => {
                if let Some(charm) = charm {
                    let machine_view = MachineView::new(machine, machine_raw);
                    let effective_series = machine_view.series().or_else(|| bundle.series());
                    if effective_series != charm.series.as_deref() {
                        collector.push(format!(
                            "charm {} cannot be deployed to machine with different series {}",
                            charm,
                            effective_series.unwrap_or("")
                        ));
                    }
                }
                machines_used.insert(machine.to_string());
            }
        }
    }
}

fn validate_relations(collector: &mut Collector, bundle: &RawBundle) {
    let raw_relations = match bundle.raw_relations() {
        None => return,
        Some(v) => v,
    };
    let relations = match raw_relations.as_sequence() {
        Some(seq) => seq,
        None => {
            collector.push(format!(
                "relations {} are malformed",
                display_scalar(raw_relations)
            ));
            return;
        }
    };

    let services = bundle.services();

    for relation in relations {
        let endpoints = match relation.as_sequence() {
            Some(seq) => seq,
            None => {
                collector.push(format!(
                    "relation {} is malformed",
                    display_scalar(relation)
                ));
                continue;
            }
        };
        for endpoint in endpoints {
            let endpoint_str = match endpoint.as_str() {
                Some(s) => s,
                None => {
                    collector.push(format!(
                        "endpoint {} is malformed; name and interface required",
                        display_scalar(endpoint)
                    ));
                    continue;
                }
            };
            let service_name = endpoint_str.split(':').next().unwrap_or("");
            let has_interface = endpoint_str.contains(':')
                && endpoint_str.splitn(2, ':').nth(1).map_or(false, |s| !s.is_empty());
            let too_many_colons = endpoint_str.matches(':').count() > 1;
            if service_name.is_empty() || (endpoint_str.contains(':') && !has_interface) || too_many_colons {
                collector.push(format!(
                    "endpoint {} is malformed; name and interface required",
                    endpoint_str
                ));
                continue;
            }
            let exists = services
                .map(|m| m.contains_key(&Value::from(service_name)))
                .unwrap_or(false);
            if !exists {
                collector.push(format!(
                    "relation {} refers to a non-existant service {}",
                    display_scalar(relation),
                    service_name
                ));
            }
        }
    }
}

fn display_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_mapping() {
        let b = RawBundle::from_str("- 1\n- 2\n").unwrap();
        assert_eq!(validate(&b), vec!["bundle does not appear to be a bundle"]);
    }

    #[test]
    fn rejects_missing_services() {
        let b = RawBundle::from_str("series: trusty\n").unwrap();
        assert_eq!(
            validate(&b),
            vec!["bundle does not define any (services|applications)"]
        );
    }

    #[test]
    fn accepts_minimal_valid_bundle() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-42\n    num_units: 0\n",
        )
        .unwrap();
        assert_eq!(validate(&b), Vec::<String>::new());
    }

    #[test]
    fn flags_invalid_series() {
        let b = RawBundle::from_str(
            "series: Bundle!\nservices:\n  django:\n    charm: cs:trusty/django-42\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("invalid series")));
    }

    #[test]
    fn flags_local_and_bundle_typed_charms() {
        let b = RawBundle::from_str(
            "services:\n  a:\n    charm: local:trusty/a-1\n  b:\n    charm: cs:bundle/b-1\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("local charms not allowed")));
        assert!(errs.iter().any(|e| e.contains("bundles not allowed")));
    }

    #[test]
    fn flags_bad_num_units() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-1\n    num_units: abc\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("must be a digit")));
    }

    #[test]
    fn flags_negative_num_units() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-1\n    num_units: -1\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("must be a positive digit")));
    }

    #[test]
    fn flags_too_many_placements() {
        let b = RawBundle::from_str(
            "machines: {}\nservices:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 1\n    to:\n      - \"new\"\n      - \"new\"\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("too many units")));
    }

    #[test]
    fn flags_unknown_constraint_key() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-1\n    constraints: bogus=1\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("invalid constraints")));
    }

    #[test]
    fn flags_negative_machine_id() {
        let b = RawBundle::from_str(
            "machines:\n  \"-1\": {}\nservices:\n  django:\n    charm: cs:trusty/django-1\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("must be positive digit")));
    }

    #[test]
    fn flags_relation_to_missing_service() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-1\nrelations:\n  - [\"django:db\", \"missing:db\"]\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs.iter().any(|e| e.contains("non-existant service missing")));
    }

    #[test]
    fn flags_unused_machine() {
        let b = RawBundle::from_str(
            "machines:\n  \"0\": {}\nservices:\n  django:\n    charm: cs:trusty/django-1\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs
            .iter()
            .any(|e| e.contains("machine 0 not referred to by a placement directive")));
    }

    #[test]
    fn legacy_bundle_rejects_nonzero_machine_placement() {
        let b = RawBundle::from_str(
            "services:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 1\n    to: \"5\"\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert!(errs
            .iter()
            .any(|e| e.contains("legacy bundles may only place units on machine 0")));
    }

    #[test]
    fn s7_multi_error_scenario() {
        let b = RawBundle::from_str(
            "machines:\n  \"-1\": {}\nservices:\n  django:\n    charm: cs:trusty/django-1\n    constraints: bogus=1\nrelations:\n  - [\"django:db\", \"missing:db\"]\n",
        )
        .unwrap();
        let errs = validate(&b);
        assert_eq!(errs.len(), 3);
        // validate_machines runs before validate_services, which runs before
        // validate_relations.
        assert!(errs[0].contains("must be positive digit"));
        assert!(errs[1].contains("invalid constraints"));
        assert!(errs[2].contains("non-existant service missing"));
    }
}
