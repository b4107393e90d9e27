//! Identifiers encoded in OSB binding paths.

const SERVICE_BINDINGS_SEGMENT: &str = "service_bindings";

/// The filter is only mounted on `.../service_instances/{id}/service_bindings/{id}`,
/// so a mismatch is a wiring bug, not bad client input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to extract binding id from path {path}")]
pub struct PathError {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath<'a> {
    pub instance_id: &'a str,
    pub binding_id: &'a str,
}

pub fn extract_service_id_bind_id(path: &str) -> Result<BindingPath<'_>, PathError> {
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        &[.., instance_id, SERVICE_BINDINGS_SEGMENT, binding_id] => Ok(BindingPath {
            instance_id,
            binding_id,
        }),
        _ => Err(PathError {
            path: path.to_string(),
        }),
    }
}

pub fn extract_bind_id(path: &str) -> Result<&str, PathError> {
    extract_service_id_bind_id(path).map(|ids| ids.binding_id)
}
