//! Validator scenario and cross-component tests.

use bundlechange::model::RawBundle;
use bundlechange::{changeset, validate};

fn bundle(yaml: &str) -> RawBundle {
    RawBundle::from_str(yaml).expect("valid yaml fixture")
}

#[test]
fn s7_validator_multi_error_in_encounter_order() {
    let b = bundle(
        "machines:\n  \"-1\":\n    series: trusty\nservices:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 1\n    constraints: \"bogus-key=1\"\nrelations:\n  - [\"django:db\", \"missing:db\"]\n",
    );
    let errors = validate::validate(&b);

    assert!(errors.len() >= 3);
    let machine_idx = errors.iter().position(|e| e.contains("-1")).unwrap();
    let constraint_idx = errors
        .iter()
        .position(|e| e.contains("bogus-key"))
        .unwrap();
    let relation_idx = errors.iter().position(|e| e.contains("missing")).unwrap();

    // validate_machines runs before validate_services, which runs before
    // validate_relations.
    assert!(machine_idx < constraint_idx);
    assert!(constraint_idx < relation_idx);
}

#[test]
fn validator_accepts_a_well_formed_bundle_with_no_diagnostics() {
    let b = bundle(
        "machines:\n  \"0\":\n    series: trusty\nservices:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 1\n    to: \"0\"\nrelations: []\n",
    );
    assert_eq!(validate::validate(&b), Vec::<String>::new());
}

#[test]
fn a_validated_bundle_lowers_cleanly_to_a_changeset() {
    let b = bundle(
        "machines:\n  \"0\":\n    series: trusty\nservices:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 2\n    to:\n      - \"0\"\n  pgsql:\n    charm: cs:trusty/pgsql-1\n    num_units: 1\nrelations:\n  - [\"django:db\", \"pgsql:db\"]\n",
    );
    assert_eq!(validate::validate(&b), Vec::<String>::new());

    let records = changeset::parse(&b).unwrap();
    assert!(records.iter().any(|r| r.method == changeset::Method::AddRelation));

    let mut seen = std::collections::HashSet::new();
    for r in &records {
        assert!(seen.insert(r.id.clone()), "duplicate record id {}", r.id);
    }

    let positions: std::collections::HashMap<&str, usize> =
        records.iter().enumerate().map(|(i, r)| (r.id.as_str(), i)).collect();
    for (i, record) in records.iter().enumerate() {
        for req in &record.requires {
            assert!(positions[req.as_str()] < i);
        }
    }
}

#[test]
fn accepts_either_services_or_applications_spelling() {
    let a = bundle("applications:\n  django:\n    charm: cs:trusty/django-1\n    num_units: 1\n");
    assert_eq!(validate::validate(&a), Vec::<String>::new());
    assert_eq!(changeset::parse(&a).unwrap().len(), 3);
}
