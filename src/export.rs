use chrono::NaiveDate;
use k8s_openapi::api::networking::v1::Ingress;

const DOCUMENT_SEPARATOR: &str = "---\n";

/// Copy of `ingress` without server-populated fields, fit for re-applying.
///
/// Labels are kept as is; annotations are dropped only if the map is empty.
pub fn sanitize(ingress: &Ingress) -> Ingress {
    let mut sanitized = ingress.clone();
    let meta = &mut sanitized.metadata;

    meta.creation_timestamp = None;
    meta.generation = None;
    meta.resource_version = None;
    meta.self_link = None;
    meta.uid = None;
    meta.managed_fields = None;

    if meta.annotations.as_ref().is_some_and(|a| a.is_empty()) {
        meta.annotations = None;
    }

    sanitized.status = None;
    sanitized
}

/// Render each ingress as its own YAML document, in the given order.
///
/// serde_yaml has no line-width setting, so long scalars are not folded.
pub fn to_yaml(ingresses: &[Ingress]) -> Result<String, serde_yaml::Error> {
    let documents = ingresses
        .iter()
        .map(|ingress| serde_yaml::to_string(&sanitize(ingress)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents.join(DOCUMENT_SEPARATOR))
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("tailscale-ingresses-{}.yaml", date.format("%Y-%m-%d"))
}
