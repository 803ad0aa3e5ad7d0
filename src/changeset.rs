//! The change-set generator: lowers a decoded bundle tree into an ordered,
//! dependency-linked sequence of deployment records.
//!
//! Grounded in `original_source/jujubundlelib/changeset.py` (the complete
//! implementation; the sibling `src/changeset.py` copy in the same source
//! tree is an older, superseded variant and is not used here). The pipeline
//! is expressed as a fixed sequence of stages on a single `ChangeSet` struct
//! rather than the original's "each handler returns the next handler"
//! continuation chain, since a systems language gains nothing from threading
//! function pointers where a plain method sequence reads the same way.

use std::collections::HashMap;

use serde::Serialize;
use serde_derive::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::BundleError;
use crate::model::{self, RawBundle, ServiceView};
use crate::placement;

/// The deployment operation a [`Record`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    AddCharm,
    Deploy,
    AddMachines,
    AddUnit,
    AddRelation,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::AddCharm => "addCharm",
            Method::Deploy => "deploy",
            Method::AddMachines => "addMachines",
            Method::AddUnit => "addUnit",
            Method::AddRelation => "addRelation",
        }
    }
}

impl Serialize for Method {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// One primitive deployment operation in a generated change-set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub method: Method,
    pub args: Vec<Value>,
    pub requires: Vec<String>,
}

impl Record {
    /// The method name some consumers expect instead of `"deploy"` — see
    /// spec.md §9's "dual spellings" design note. `Record` always serializes
    /// as `"deploy"`; callers that need the legacy name ask for it explicitly.
    pub fn into_legacy_method_name(&self) -> &'static str {
        match self.method {
            Method::Deploy => "addService",
            other => other.as_str(),
        }
    }
}

/// Per-run state for the generator: a strictly increasing counter and the
/// two name→recordId maps described in spec.md §3's Lifecycle note. Nothing
/// here outlives one call to [`parse`].
struct ChangeSet {
    counter: u64,
    services_added: HashMap<String, String>,
    machines_added: HashMap<String, String>,
    out: Vec<Record>,
}

impl ChangeSet {
    fn new() -> Self {
        ChangeSet {
            counter: 0,
            services_added: HashMap::new(),
            machines_added: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn next_id(&mut self, method: &str) -> String {
        let id = format!("{}-{}", method, self.counter);
        self.counter += 1;
        id
    }

    fn send(&mut self, record: Record) {
        self.out.push(record);
    }
}

fn services_iter(bundle: &RawBundle) -> impl Iterator<Item = (&Value, &Value)> {
    bundle.services().into_iter().flat_map(|m| m.iter())
}

fn machines_iter(bundle: &RawBundle) -> impl Iterator<Item = (&Value, &Value)> {
    bundle.machines().into_iter().flat_map(|m| m.iter())
}

fn relations_iter(bundle: &RawBundle) -> impl Iterator<Item = &Value> {
    bundle.relations().into_iter().flat_map(|r| r.iter())
}

fn num_units_of(view: &ServiceView) -> usize {
    view.raw_num_units()
        .and_then(model::coerce_i64)
        .unwrap_or(0)
        .max(0) as usize
}

/// Lower a bundle into its change-set. The caller is expected to have
/// validated the bundle first (spec.md §4.C); malformed placement directives
/// still surface as a `BundleError` rather than panicking.
pub fn parse(bundle: &RawBundle) -> Result<Vec<Record>, BundleError> {
    let mut cs = ChangeSet::new();
    handle_services(&mut cs, bundle)?;
    handle_machines(&mut cs, bundle)?;
    handle_relations(&mut cs, bundle)?;
    handle_units(&mut cs, bundle)?;
    Ok(cs.out)
}

fn handle_services(cs: &mut ChangeSet, bundle: &RawBundle) -> Result<(), BundleError> {
    let mut charms: HashMap<String, String> = HashMap::new();

    for (name, raw) in services_iter(bundle) {
        let service_name = name.as_str().unwrap_or_default().to_string();
        let view = ServiceView::new(&service_name, raw);
        let charm_url = view
            .charm_str()
            .ok_or_else(|| {
                BundleError::InvalidReference(
                    service_name.clone(),
                    "charm is required".to_string(),
                )
            })?
            .to_string();

        let charm_record_id = match charms.get(&charm_url) {
            Some(id) => id.clone(),
            None => {
                let id = cs.next_id("addCharm");
                cs.send(Record {
                    id: id.clone(),
                    method: Method::AddCharm,
                    args: vec![Value::String(charm_url.clone())],
                    requires: vec![],
                });
                charms.insert(charm_url.clone(), id.clone());
                id
            }
        };

        let record_id = cs.next_id("addService");
        let options = view
            .raw_options()
            .cloned()
            .unwrap_or_else(|| Value::Mapping(Mapping::new()));
        cs.send(Record {
            id: record_id.clone(),
            method: Method::Deploy,
            args: vec![
                Value::String(charm_url),
                Value::String(service_name.clone()),
                options,
            ],
            requires: vec![charm_record_id],
        });
        cs.services_added.insert(service_name, record_id);
    }
    Ok(())
}

fn handle_machines(cs: &mut ChangeSet, bundle: &RawBundle) -> Result<(), BundleError> {
    for (name, raw) in machines_iter(bundle) {
        let machine_id = match name.as_str() {
            Some(s) => s.to_string(),
            None => model::coerce_i64(name)
                .map(|n| n.to_string())
                .unwrap_or_default(),
        };
        let mapping = raw.as_mapping();
        let series = mapping
            .and_then(|m| model::get_str(m, "series"))
            .unwrap_or("")
            .to_string();
        let constraints = mapping
            .and_then(|m| model::get(m, "constraints"))
            .cloned()
            .unwrap_or_else(|| Value::Mapping(Mapping::new()));

        let mut args = Mapping::new();
        args.insert(Value::from("series"), Value::from(series));
        args.insert(Value::from("constraints"), constraints);

        let record_id = cs.next_id("addMachines");
        cs.send(Record {
            id: record_id.clone(),
            method: Method::AddMachines,
            args: vec![Value::Mapping(args)],
            requires: vec![],
        });
        cs.machines_added.insert(machine_id, record_id);
    }
    Ok(())
}

fn handle_relations(cs: &mut ChangeSet, bundle: &RawBundle) -> Result<(), BundleError> {
    for relation in relations_iter(bundle) {
        let endpoints: Vec<&str> = match relation.as_sequence() {
            Some(seq) => seq.iter().filter_map(Value::as_str).collect(),
            None => continue,
        };

        let mut args = Vec::with_capacity(endpoints.len());
        let mut requires = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let (name, interface) = split_endpoint(endpoint);
            let record_id = cs
                .services_added
                .get(name)
                .cloned()
                .ok_or_else(|| BundleError::UnknownPlacementTarget("service", name.to_string()))?;
            let rendered = match interface {
                Some(iface) => format!("${}:{}", record_id, iface),
                None => format!("${}", record_id),
            };
            args.push(Value::String(rendered));
            requires.push(record_id);
        }

        let record_id = cs.next_id("addRelation");
        cs.send(Record {
            id: record_id,
            method: Method::AddRelation,
            args,
            requires,
        });
    }
    Ok(())
}

fn split_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once(':') {
        Some((name, iface)) if !iface.is_empty() => (name, Some(iface)),
        Some((name, _)) => (name, None),
        None => (endpoint, None),
    }
}

fn handle_units(cs: &mut ChangeSet, bundle: &RawBundle) -> Result<(), BundleError> {
    let is_legacy = bundle.is_legacy_bundle();

    // Pass 1: create a pending addUnit record for every unit of every
    // service, fully indexed, before any placement resolution begins.
    let mut units: HashMap<String, String> = HashMap::new();
    let mut pending: HashMap<String, Record> = HashMap::new();

    for (name, raw) in services_iter(bundle) {
        let service_name = name.as_str().unwrap_or_default();
        let view = ServiceView::new(service_name, raw);
        let service_record_id = cs
            .services_added
            .get(service_name)
            .cloned()
            .ok_or_else(|| {
                BundleError::UnknownPlacementTarget("service", service_name.to_string())
            })?;

        for i in 0..num_units_of(&view) {
            let record_id = cs.next_id("addUnit");
            let record = Record {
                id: record_id.clone(),
                method: Method::AddUnit,
                args: vec![
                    Value::String(format!("${}", service_record_id)),
                    Value::from(1),
                    Value::Null,
                ],
                requires: vec![service_record_id.clone()],
            };
            units.insert(format!("{}/{}", service_name, i), record_id.clone());
            pending.insert(record_id, record);
        }
    }

    // Pass 2: resolve placements and emit, service by service, unit by unit.
    for (name, raw) in services_iter(bundle) {
        let service_name = name.as_str().unwrap_or_default();
        let view = ServiceView::new(service_name, raw);
        let num_units = num_units_of(&view);

        let mut directives = model::normalize_to_list(view.raw_to());
        if !directives.is_empty() && !is_legacy {
            if let Some(last) = directives.last().cloned() {
                while directives.len() < num_units {
                    directives.push(last.clone());
                }
            }
        }

        for i in 0..num_units {
            let key = format!("{}/{}", service_name, i);
            let record_id = units.get(&key).expect("populated in pass 1").clone();
            let mut record = pending.remove(&record_id).expect("populated in pass 1");

            if let Some(directive) = directives.get(i) {
                record = resolve_unit_placement(
                    cs,
                    &units,
                    is_legacy,
                    service_name,
                    i,
                    directive,
                    record,
                )?;
            }
            cs.send(record);
        }
    }

    Ok(())
}

/// Resolve a single unit's placement directive against the decision tree in
/// spec.md §4.C, mutating `record`'s target arg and `requires`.
fn resolve_unit_placement(
    cs: &mut ChangeSet,
    units: &HashMap<String, String>,
    is_legacy: bool,
    service_name: &str,
    unit_index: usize,
    directive: &str,
    mut record: Record,
) -> Result<Record, BundleError> {
    let unit_placement = if is_legacy {
        placement::parse_v3(directive)?
    } else {
        placement::parse_v4(directive)?
    };

    if let Some(machine) = unit_placement.machine() {
        if machine == "new" {
            let machine_record_id = cs.next_id("addMachines");
            let mut opts = Mapping::new();
            if let Some(container_type) = unit_placement.container_type() {
                opts.insert(Value::from("containerType"), Value::from(container_type));
            }
            cs.send(Record {
                id: machine_record_id.clone(),
                method: Method::AddMachines,
                args: vec![Value::Mapping(opts)],
                requires: vec![],
            });
            record.requires.push(machine_record_id.clone());
            record.args[2] = Value::String(format!("${}", machine_record_id));
            return Ok(record);
        }

        if is_legacy {
            if machine != "0" {
                return Err(BundleError::LegacyNonZeroMachine(machine.to_string()));
            }
            record.args[2] = Value::String("0".to_string());
            return Ok(record);
        }

        let machine_record_id = cs
            .machines_added
            .get(machine)
            .cloned()
            .ok_or_else(|| BundleError::UnknownPlacementTarget("machine", machine.to_string()))?;
        let target_id = match unit_placement.container_type() {
            Some(container_type) => emit_container(cs, container_type, &machine_record_id),
            None => machine_record_id,
        };
        record.requires.push(target_id.clone());
        record.args[2] = Value::String(format!("${}", target_id));
        return Ok(record);
    }

    let target_service = unit_placement.service().unwrap_or(service_name);
    let unit_idx = match unit_placement.unit() {
        Some(u) => u.parse::<usize>().map_err(|_| {
            BundleError::InvalidPlacement(directive.to_string(), format!("invalid unit index: {}", u))
        })?,
        // No explicit unit index: co-locate with the positionally-matching
        // unit of the target service (see the test corpus's
        // test_placement_unit_in_service for why this is positional rather
        // than always index 0).
        None => unit_index,
    };
    let key = format!("{}/{}", target_service, unit_idx);
    let target_record_id = units
        .get(&key)
        .cloned()
        .ok_or_else(|| BundleError::UnknownPlacementTarget("unit", key))?;
    let target_id = match unit_placement.container_type() {
        Some(container_type) => emit_container(cs, container_type, &target_record_id),
        None => target_record_id,
    };
    record.requires.push(target_id.clone());
    record.args[2] = Value::String(format!("${}", target_id));
    Ok(record)
}

fn emit_container(cs: &mut ChangeSet, container_type: &str, parent_id: &str) -> String {
    let record_id = cs.next_id("addMachines");
    let mut opts = Mapping::new();
    opts.insert(Value::from("containerType"), Value::from(container_type));
    opts.insert(Value::from("parentId"), Value::from(format!("${}", parent_id)));
    cs.send(Record {
        id: record_id.clone(),
        method: Method::AddMachines,
        args: vec![Value::Mapping(opts)],
        requires: vec![parent_id.to_string()],
    });
    record_id
}
