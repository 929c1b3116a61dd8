use std::fmt;

use k8s_openapi::api::networking::v1::{Ingress, IngressStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressState {
    Ready,
    Pending,
    Unknown,
}

impl fmt::Display for IngressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressState::Ready => f.write_str("Ready"),
            IngressState::Pending => f.write_str("Pending"),
            IngressState::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Readiness of an ingress judged from its load-balancer status.
pub fn classify(status: Option<&IngressStatus>) -> IngressState {
    let points = match status
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
    {
        Some(points) if !points.is_empty() => points,
        _ => return IngressState::Pending,
    };

    let has_address = points.iter().any(|point| {
        point.ip.as_deref().is_some_and(|ip| !ip.is_empty())
            || point.hostname.as_deref().is_some_and(|h| !h.is_empty())
    });

    if has_address {
        IngressState::Ready
    } else {
        IngressState::Unknown
    }
}

/// One line of the dashboard table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRow {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub path: String,
    pub service_name: String,
    pub service_port: String,
    pub state: IngressState,
    pub created: String,
    pub link: Option<String>,
}

impl From<&Ingress> for IngressRow {
    fn from(ingress: &Ingress) -> Self {
        let meta = &ingress.metadata;
        let spec = ingress.spec.as_ref();
        let rule = spec.and_then(|s| s.rules.as_ref()).and_then(|r| r.first());
        let path = rule
            .and_then(|r| r.http.as_ref())
            .and_then(|http| http.paths.first());

        // Created resources only carry a default backend.
        let service = path
            .and_then(|p| p.backend.service.as_ref())
            .or_else(|| {
                spec.and_then(|s| s.default_backend.as_ref())
                    .and_then(|b| b.service.as_ref())
            });

        let path = path.and_then(|p| p.path.clone()).filter(|p| !p.is_empty());

        let first_point = ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|points| points.first());

        let link = first_point.and_then(|point| {
            let hostname = point.hostname.as_deref().filter(|h| !h.is_empty())?;
            let https = point
                .ports
                .as_ref()
                .is_some_and(|ports| ports.iter().any(|p| p.port == 443));
            let scheme = if https { "https" } else { "http" };
            Some(format!(
                "{scheme}://{hostname}{}",
                path.as_deref().unwrap_or("/")
            ))
        });

        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            host: rule.and_then(|r| r.host.clone()).unwrap_or_default(),
            path: path.unwrap_or_else(|| "/".to_string()),
            service_name: service.map(|s| s.name.clone()).unwrap_or_default(),
            service_port: service
                .and_then(|s| s.port.as_ref())
                .and_then(|p| p.number)
                .map(|n| n.to_string())
                .unwrap_or_default(),
            state: classify(ingress.status.as_ref()),
            created: meta
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.format("%b %-d, %Y %H:%M:%S").to_string())
                .unwrap_or_default(),
            link,
        }
    }
}
