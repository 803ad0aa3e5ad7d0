//! End-to-end change-set scenarios, one per named case in spec.md §8.

use bundlechange::changeset::{self, Method};
use bundlechange::model::RawBundle;
use serde_yaml::Value;

fn bundle(yaml: &str) -> RawBundle {
    RawBundle::from_str(yaml).expect("valid yaml fixture")
}

#[test]
fn s1_simplest_service() {
    let b = bundle("services:\n  django:\n    charm: cs:trusty/django-42\n    num_units: 0\n");
    let records = changeset::parse(&b).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "addCharm-0");
    assert_eq!(records[0].args, vec![Value::String("cs:trusty/django-42".into())]);
    assert_eq!(records[0].requires, Vec::<String>::new());

    assert_eq!(records[1].id, "addService-1");
    assert_eq!(records[1].method, Method::Deploy);
    assert_eq!(
        records[1].args,
        vec![
            Value::String("cs:trusty/django-42".into()),
            Value::String("django".into()),
            Value::Mapping(Default::default()),
        ]
    );
    assert_eq!(records[1].requires, vec!["addCharm-0".to_string()]);
}

#[test]
fn s2_colocation_onto_existing_unit() {
    let b = bundle(
        "machines: {}\nservices:\n  django-new:\n    charm: cs:trusty/django-1\n    num_units: 1\n  django-unit:\n    charm: cs:trusty/django-1\n    num_units: 1\n    to: django-new/0\n",
    );
    let records = changeset::parse(&b).unwrap();

    let django_unit_deploy = records
        .iter()
        .find(|r| r.method == Method::Deploy && r.args[1] == Value::String("django-unit".into()))
        .unwrap();
    let units: Vec<_> = records.iter().filter(|r| r.method == Method::AddUnit).collect();
    assert_eq!(units.len(), 2);

    let colocated = units
        .iter()
        .find(|u| u.args[0] == Value::String(format!("${}", django_unit_deploy.id)))
        .unwrap();
    let base = units
        .iter()
        .find(|u| u.id != colocated.id)
        .unwrap();

    assert_eq!(colocated.args[2], Value::String(format!("${}", base.id)));
    assert!(colocated.requires.contains(&base.id));
    assert!(colocated.requires.contains(&django_unit_deploy.id));
}

#[test]
fn s3_container_on_existing_machine() {
    let b = bundle(
        "machines:\n  \"0\": {}\nservices:\n  x:\n    charm: cs:trusty/x-1\n    num_units: 1\n    to: lxc:0\n",
    );
    let records = changeset::parse(&b).unwrap();

    let machine0 = records
        .iter()
        .find(|r| {
            r.method == Method::AddMachines
                && r.args[0]
                    .as_mapping()
                    .map(|m| m.contains_key(&Value::from("series")))
                    .unwrap_or(false)
        })
        .unwrap();
    assert_eq!(
        machine0.args[0].as_mapping().unwrap().get(&Value::from("series")),
        Some(&Value::String(String::new()))
    );

    let container = records
        .iter()
        .find(|r| r.method == Method::AddMachines && r.id != machine0.id)
        .unwrap();
    let container_args = container.args[0].as_mapping().unwrap();
    assert_eq!(
        container_args.get(&Value::from("containerType")),
        Some(&Value::String("lxc".into()))
    );
    assert_eq!(
        container_args.get(&Value::from("parentId")),
        Some(&Value::String(format!("${}", machine0.id)))
    );
    assert_eq!(container.requires, vec![machine0.id.clone()]);

    let unit = records.iter().find(|r| r.method == Method::AddUnit).unwrap();
    assert_eq!(unit.args[2], Value::String(format!("${}", container.id)));
}

#[test]
fn s4_new_machine() {
    let b = bundle("machines: {}\nservices:\n  x:\n    charm: cs:trusty/x-1\n    num_units: 1\n    to: new\n");
    let records = changeset::parse(&b).unwrap();

    let machine = records.iter().find(|r| r.method == Method::AddMachines).unwrap();
    assert_eq!(machine.args[0], Value::Mapping(Default::default()));
    assert_eq!(machine.requires, Vec::<String>::new());

    let unit = records.iter().find(|r| r.method == Method::AddUnit).unwrap();
    assert_eq!(unit.args[2], Value::String(format!("${}", machine.id)));
}

#[test]
fn s5_legacy_v3_bootstrap_placement() {
    let b = bundle("services:\n  django:\n    charm: cs:trusty/django-42\n    num_units: 1\n    to: \"0\"\n");
    let records = changeset::parse(&b).unwrap();

    let unit = records.iter().find(|r| r.method == Method::AddUnit).unwrap();
    assert_eq!(unit.args[2], Value::String("0".to_string()));
    assert_eq!(unit.requires.len(), 1);
}

#[test]
fn s6_v4_sticky_placement() {
    let b = bundle(
        "machines: {}\nservices:\n  wordpress:\n    charm: cs:trusty/wordpress-1\n    num_units: 3\n  django:\n    charm: cs:trusty/django-1\n    num_units: 3\n    to:\n      - lxc:wordpress\n",
    );
    let records = changeset::parse(&b).unwrap();

    let wordpress_deploy = records
        .iter()
        .find(|r| r.method == Method::Deploy && r.args[1] == Value::String("wordpress".into()))
        .unwrap();
    let wordpress_units: Vec<_> = records
        .iter()
        .filter(|r| r.method == Method::AddUnit && r.args[0] == Value::String(format!("${}", wordpress_deploy.id)))
        .collect();
    assert_eq!(wordpress_units.len(), 3);

    let containers: Vec<_> = records
        .iter()
        .filter(|r| {
            r.method == Method::AddMachines
                && r.args[0]
                    .as_mapping()
                    .map(|m| m.contains_key(&Value::from("containerType")))
                    .unwrap_or(false)
        })
        .collect();
    assert_eq!(containers.len(), 3);

    // Each container's parent is a distinct wordpress unit (the positional
    // fallback: django/i colocates with wordpress/i).
    let mut parents: Vec<&Value> = containers
        .iter()
        .map(|c| c.args[0].as_mapping().unwrap().get(&Value::from("parentId")).unwrap())
        .collect();
    parents.sort_by_key(|v| v.as_str().unwrap().to_string());
    let mut expected: Vec<String> = wordpress_units.iter().map(|u| format!("${}", u.id)).collect();
    expected.sort();
    assert_eq!(
        parents.iter().map(|v| v.as_str().unwrap().to_string()).collect::<Vec<_>>(),
        expected
    );
}

#[test]
fn legacy_machine_placement_outside_zero_is_rejected() {
    let b = bundle("services:\n  x:\n    charm: cs:trusty/x-1\n    num_units: 1\n    to: \"3\"\n");
    assert!(changeset::parse(&b).is_err());
}
