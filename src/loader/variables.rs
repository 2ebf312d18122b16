use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::hcl::RawPayload;

/// Where a variable binding came from. Later precedence tiers overwrite
/// earlier ones; the winning binding keeps its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VarOrigin {
    /// `default` attribute of a `variable` block.
    Default { file: String },
    /// `TF_VAR_*` environment variable.
    Env { key: String },
    /// A tfvars-style variable-definition file.
    VarFile { path: String },
    /// Directly specified, e.g. module call arguments.
    Manual,
}

impl fmt::Display for VarOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarOrigin::Default { file } => write!(f, "default@{}", file),
            VarOrigin::Env { key } => write!(f, "env:{}", key),
            VarOrigin::VarFile { path } => write!(f, "{}", path),
            VarOrigin::Manual => write!(f, "manual"),
        }
    }
}

/// The winning value for one variable name.
#[derive(Debug, Clone, Serialize)]
pub struct VarBinding {
    pub value: Value,
    pub origin: VarOrigin,
}

/// Winning bindings for one directory load.
pub type VarMap = BTreeMap<String, VarBinding>;

/// Every binding observed at any tier, in application order. Downstream
/// consumers emit these as synthetic variable blocks.
#[derive(Debug, Clone, Serialize)]
pub struct VarSighting {
    pub name: String,
    pub value: Value,
    pub origin: VarOrigin,
}

/// Variable-definition files collected for one directory, already parsed.
#[derive(Debug, Default)]
pub(crate) struct VarFileSet {
    pub hcl_tfvars: Option<(String, RawPayload)>,
    pub json_tfvars: Option<(String, RawPayload)>,
    /// `*.auto.tfvars` / `*.auto.tfvars.json`, ascending filename order.
    pub auto_var_files: Vec<(String, RawPayload)>,
    /// Caller-supplied var-files, in the caller's order.
    pub explicit_var_files: Vec<(String, RawPayload)>,
}

/// Record one binding: sighted always, and made the current winner.
pub(crate) fn bind(
    var_map: &mut VarMap,
    sightings: &mut Vec<VarSighting>,
    name: &str,
    value: Value,
    origin: VarOrigin,
) {
    sightings.push(VarSighting {
        name: name.to_string(),
        value: value.clone(),
        origin: origin.clone(),
    });
    var_map.insert(name.to_string(), VarBinding { value, origin });
}

/// Apply the precedence tiers above variable defaults, lowest to highest:
/// environment, terraform.tfvars, terraform.tfvars.json, auto var-files,
/// explicit var-files, direct overrides. `var_map` arrives seeded with the
/// defaults from stage one.
pub(crate) fn resolve(
    var_map: &mut VarMap,
    sightings: &mut Vec<VarSighting>,
    env_vars: &BTreeMap<String, String>,
    files: VarFileSet,
    specified_vars: Option<&serde_json::Map<String, Value>>,
) {
    for (key, value) in env_vars {
        if let Some(name) = key.strip_prefix("TF_VAR_") {
            bind(
                var_map,
                sightings,
                name,
                Value::String(value.clone()),
                VarOrigin::Env { key: key.clone() },
            );
        }
    }

    if let Some((path, data)) = files.hcl_tfvars {
        for (name, value) in &data {
            bind(
                var_map,
                sightings,
                name,
                unwrap_single(value),
                VarOrigin::VarFile { path: path.clone() },
            );
        }
    }

    if let Some((path, data)) = files.json_tfvars {
        for (name, value) in &data {
            bind(
                var_map,
                sightings,
                name,
                value.clone(),
                VarOrigin::VarFile { path: path.clone() },
            );
        }
    }

    for (path, data) in files.auto_var_files {
        apply_var_file(var_map, sightings, &path, &data);
    }

    for (path, data) in files.explicit_var_files {
        apply_var_file(var_map, sightings, &path, &data);
    }

    if let Some(vars) = specified_vars {
        for (name, value) in vars {
            bind(var_map, sightings, name, value.clone(), VarOrigin::Manual);
        }
    }
}

fn apply_var_file(
    var_map: &mut VarMap,
    sightings: &mut Vec<VarSighting>,
    path: &str,
    data: &RawPayload,
) {
    let json_shaped = path.ends_with(".json");
    for (name, value) in data {
        let value = if json_shaped {
            value.clone()
        } else {
            unwrap_single(value)
        };
        bind(
            var_map,
            sightings,
            name,
            value,
            VarOrigin::VarFile {
                path: path.to_string(),
            },
        );
    }
}

/// Undo HCL2's single-element list wrapping.
pub(crate) fn unwrap_single(value: &Value) -> Value {
    if let Value::Array(items) = value {
        if items.len() == 1 {
            return items[0].clone();
        }
    }
    value.clone()
}
