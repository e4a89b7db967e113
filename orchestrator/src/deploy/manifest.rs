//! Compose manifest validation and tenant isolation.
//!
//! Manifests are handled as an untyped, insertion-ordered YAML tree so that
//! keys this crate knows nothing about survive a load/inject/save cycle
//! unchanged and in their original order.

use std::path::Path;

use api_models::models::ValidationResponse;
use serde_yaml::{Mapping, Value};

use crate::docker::naming::{network_name, TENANT_LABEL_KEY};
use crate::errors::PlatformError;
use crate::filesys::file::File;

/// Outcome of validating a manifest. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn to_response(&self) -> ValidationResponse {
        ValidationResponse {
            valid: self.valid,
            errors: self.errors.clone(),
        }
    }
}

/// Parse manifest text into an ordered tree
pub fn parse_manifest(text: &str) -> Result<Value, PlatformError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Serialize a manifest tree back to YAML
pub fn render_manifest(doc: &Value) -> Result<String, PlatformError> {
    Ok(serde_yaml::to_string(doc)?)
}

/// Read and parse a manifest file
pub async fn load_manifest(path: &Path) -> Result<Value, PlatformError> {
    let text = File::new(path).read_string().await?;
    parse_manifest(&text)
}

/// Serialize a manifest tree and write it over `path`
pub async fn save_manifest(path: &Path, doc: &Value) -> Result<(), PlatformError> {
    let text = render_manifest(doc)?;
    File::new(path).write_string(&text).await
}

/// Validate raw manifest text; a parse failure yields a single error entry
pub fn validate_manifest_text(text: &str) -> ValidationResult {
    match parse_manifest(text) {
        Ok(doc) => validate_manifest(&doc),
        Err(e) => ValidationResult::from_errors(vec![format!("failed to parse manifest: {}", e)]),
    }
}

/// Check that `services` exists, is a mapping, and that every service names
/// an `image` or a `build`. All violations are collected in document order.
pub fn validate_manifest(doc: &Value) -> ValidationResult {
    let mut errors = Vec::new();

    let Some(root) = doc.as_mapping() else {
        errors.push("manifest root must be a mapping".to_string());
        return ValidationResult::from_errors(errors);
    };

    match root.get("services") {
        None => errors.push("'services' field is required".to_string()),
        Some(Value::Mapping(services)) => {
            for (name, service) in services {
                let name = key_name(name);
                match service {
                    Value::Mapping(def) => {
                        if !def.contains_key("image") && !def.contains_key("build") {
                            errors.push(format!("service '{}' requires 'image' or 'build'", name));
                        }
                    }
                    Value::Null => {
                        errors.push(format!("service '{}' requires 'image' or 'build'", name));
                    }
                    _ => errors.push(format!("service '{}' must be a mapping", name)),
                }
            }
        }
        Some(_) => errors.push("'services' must be a mapping".to_string()),
    }

    ValidationResult::from_errors(errors)
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

/// Bind every service to its tenant: a `serverId` label, membership of the
/// tenant network, and a top-level declaration of that network as external.
///
/// Idempotent. A manifest without a `services` mapping is left untouched.
pub fn inject_tenant(doc: &mut Value, server_id: &str) {
    let network = network_name(server_id);

    let Some(root) = doc.as_mapping_mut() else {
        return;
    };
    let Some(Value::Mapping(services)) = root.get_mut("services") else {
        return;
    };

    for (_, service) in services.iter_mut() {
        if service.is_null() {
            *service = Value::Mapping(Mapping::new());
        }
        if let Some(def) = service.as_mapping_mut() {
            inject_label(def, server_id);
            attach_network(def, &network);
        }
    }

    let declared = matches!(root.get("networks"), Some(Value::Mapping(_)));
    if !declared {
        root.insert(Value::from("networks"), Value::Mapping(Mapping::new()));
    }
    if let Some(Value::Mapping(networks)) = root.get_mut("networks") {
        let mut external = Mapping::new();
        external.insert(Value::from("external"), Value::Bool(true));
        networks.insert(Value::from(network), Value::Mapping(external));
    }
}

fn inject_label(def: &mut Mapping, server_id: &str) {
    let usable = matches!(
        def.get("labels"),
        Some(Value::Mapping(_)) | Some(Value::Sequence(_))
    );
    if !usable {
        def.insert(Value::from("labels"), Value::Mapping(Mapping::new()));
    }

    match def.get_mut("labels") {
        Some(Value::Mapping(labels)) => {
            labels.insert(Value::from(TENANT_LABEL_KEY), Value::from(server_id));
        }
        // list form: ["key=value", ...]
        Some(Value::Sequence(labels)) => {
            let entry = Value::from(format!("{}={}", TENANT_LABEL_KEY, server_id));
            let prefix = format!("{}=", TENANT_LABEL_KEY);
            let existing = labels.iter().position(|label| {
                label
                    .as_str()
                    .is_some_and(|s| s == TENANT_LABEL_KEY || s.starts_with(&prefix))
            });
            match existing {
                Some(index) => labels[index] = entry,
                None => labels.push(entry),
            }
        }
        _ => {}
    }
}

fn attach_network(def: &mut Mapping, network: &str) {
    let usable = matches!(
        def.get("networks"),
        Some(Value::Mapping(_)) | Some(Value::Sequence(_))
    );
    if !usable {
        def.insert(Value::from("networks"), Value::Sequence(Vec::new()));
    }

    match def.get_mut("networks") {
        Some(Value::Sequence(networks)) => {
            if !networks.iter().any(|n| n.as_str() == Some(network)) {
                networks.push(Value::from(network));
            }
        }
        // long form: { name: { aliases: ... } }
        Some(Value::Mapping(networks)) => {
            if !networks.contains_key(network) {
                networks.insert(Value::from(network), Value::Null);
            }
        }
        _ => {}
    }
}
