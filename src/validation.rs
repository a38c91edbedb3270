//! # Validator / Normalizer
//!
//! Enforces the schema and reference invariants of §4.3 and normalizes
//! tags/labels/roles in place. Collects every problem found into a
//! `Vec<ValidationError>` instead of stopping at the first one: a "report
//! everything, then fail" shape.

use std::collections::{HashMap, HashSet};

use crate::errors::ValidationError;
use crate::model::{
    Document, Execution, Host, Resource, RESOURCE_TYPE_COMMAND, RESOURCE_TYPE_FILE,
    STRATEGY_FREE, STRATEGY_LINEAR, STRATEGY_SERIAL, TRANSPORT_AUTO, TRANSPORT_LOCAL,
    TRANSPORT_SSH, TRANSPORT_WINRM,
};

/// Validates `document` and normalizes it in place. On success the document
/// is guaranteed to satisfy every invariant in §4.3. On failure, every
/// violation found is returned (not just the first).
pub fn validate_and_normalize(document: &mut Document) -> Result<(), Vec<ValidationError>> {
    normalize(document);

    let mut errors = Vec::new();
    validate_version(document, &mut errors);
    validate_execution(&document.execution, &mut errors);
    let host_names = validate_hosts(&document.inventory.hosts, &mut errors);
    let handler_ids: HashSet<String> = document.handlers.iter().map(|h| h.id.clone()).collect();
    validate_resources(&document.resources, &host_names, &handler_ids, &mut errors);
    validate_resources(&document.handlers, &host_names, &handler_ids, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn normalize(document: &mut Document) {
    for host in &mut document.inventory.hosts {
        normalize_host(host);
    }
    for resource in document
        .resources
        .iter_mut()
        .chain(document.handlers.iter_mut())
    {
        normalize_tags(&mut resource.tags);
    }
}

fn normalize_host(host: &mut Host) {
    host.address = host.address.trim().to_string();
    host.user = host.user.trim().to_string();
    host.jump_address = host.jump_address.trim().to_string();
    host.jump_user = host.jump_user.trim().to_string();
    host.proxy_command = host.proxy_command.trim().to_string();

    if host.transport.is_empty() {
        host.transport = TRANSPORT_LOCAL.to_string();
    }

    normalize_tags(&mut host.roles);
    host.labels = normalize_map(&host.labels);
    host.topology = normalize_map(&host.topology);
}

fn normalize_tags(tags: &mut Vec<String>) {
    let mut cleaned: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    *tags = cleaned;
}

fn normalize_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in map {
        out.insert(k.trim().to_lowercase(), v.clone());
    }
    out
}

fn validate_version(document: &Document, errors: &mut Vec<ValidationError>) {
    if document.version.trim().is_empty() {
        errors.push(ValidationError::EmptyVersion);
    }
}

const ALLOWED_STRATEGIES: &[&str] = &[STRATEGY_LINEAR, STRATEGY_FREE, STRATEGY_SERIAL];

fn validate_execution(execution: &Execution, errors: &mut Vec<ValidationError>) {
    if !execution.strategy.is_empty() && !ALLOWED_STRATEGIES.contains(&execution.strategy.as_str())
    {
        errors.push(ValidationError::InvalidStrategy(execution.strategy.clone()));
    }
    if execution.max_fail_percentage > 100 {
        errors.push(ValidationError::InvalidMaxFailPercentage(
            execution.max_fail_percentage,
        ));
    }
}

fn validate_hosts(hosts: &[Host], errors: &mut Vec<ValidationError>) -> HashSet<String> {
    let mut seen = HashSet::new();
    for host in hosts {
        if host.name.trim().is_empty() {
            errors.push(ValidationError::EmptyHostName);
            continue;
        }
        if !seen.insert(host.name.clone()) {
            errors.push(ValidationError::DuplicateHost(host.name.clone()));
        }

        if !is_valid_transport(&host.transport) {
            errors.push(ValidationError::InvalidTransport {
                host: host.name.clone(),
                transport: host.transport.clone(),
            });
        }

        validate_port(&host.name, "port", host.port, errors);
        validate_port(&host.name, "jump_port", host.jump_port, errors);
    }
    seen
}

fn is_valid_transport(transport: &str) -> bool {
    matches!(
        transport,
        TRANSPORT_LOCAL | TRANSPORT_SSH | TRANSPORT_WINRM | TRANSPORT_AUTO
    ) || transport.starts_with(crate::model::PLUGIN_PREFIX)
}

fn validate_port(host: &str, field: &str, port: u32, errors: &mut Vec<ValidationError>) {
    if port != 0 && port > 65535 {
        errors.push(ValidationError::InvalidPort {
            host: host.to_string(),
            field: field.to_string(),
            port,
        });
    }
}

fn validate_resources(
    resources: &[Resource],
    host_names: &HashSet<String>,
    handler_ids: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    let ids: HashSet<String> = resources.iter().map(|r| r.id.clone()).collect();

    for resource in resources {
        if resource.id.trim().is_empty() {
            errors.push(ValidationError::EmptyResourceId);
            continue;
        }
        if !seen.insert(resource.id.clone()) {
            errors.push(ValidationError::DuplicateResource(resource.id.clone()));
        }

        if resource.host.trim().is_empty() {
            errors.push(ValidationError::EmptyResourceHost(resource.id.clone()));
        } else if !host_names.contains(&resource.host) {
            errors.push(ValidationError::UnknownHost {
                resource: resource.id.clone(),
                host: resource.host.clone(),
            });
        }
        if let Some(delegate) = &resource.delegate_to {
            if !delegate.is_empty() && !host_names.contains(delegate) {
                errors.push(ValidationError::UnknownDelegate {
                    resource: resource.id.clone(),
                    host: delegate.clone(),
                });
            }
        }

        match resource.kind.as_str() {
            RESOURCE_TYPE_FILE => {
                if resource.path.trim().is_empty() {
                    errors.push(ValidationError::FileMissingPath(resource.id.clone()));
                }
            }
            RESOURCE_TYPE_COMMAND => {
                if resource.command.trim().is_empty() {
                    errors.push(ValidationError::CommandMissingCommand(resource.id.clone()));
                }
                if resource.retries < 0 {
                    errors.push(ValidationError::InvalidRetries {
                        resource: resource.id.clone(),
                        retries: resource.retries,
                    });
                }
                if resource.retry_delay_seconds < 0 {
                    errors.push(ValidationError::InvalidRetryDelay {
                        resource: resource.id.clone(),
                        retry_delay_seconds: resource.retry_delay_seconds,
                    });
                }
            }
            other => {
                errors.push(ValidationError::UnsupportedResourceType(
                    resource.id.clone(),
                    other.to_string(),
                ));
            }
        }

        for (relation, deps) in [
            ("depends_on", &resource.depends_on),
            ("require", &resource.require),
            ("before", &resource.before),
            ("notify", &resource.notify),
            ("subscribe", &resource.subscribe),
        ] {
            for dep in deps {
                if !ids.contains(dep) {
                    errors.push(ValidationError::UnknownDependency {
                        resource: resource.id.clone(),
                        relation: relation.to_string(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        for dep in &resource.notify_handlers {
            if !handler_ids.contains(dep) {
                errors.push(ValidationError::UnknownDependency {
                    resource: resource.id.clone(),
                    relation: "notify_handlers".to_string(),
                    dep: dep.clone(),
                });
            }
        }
    }
}
