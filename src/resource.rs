use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::api::ObjectMeta;

use crate::form::IngressFormInput;

/// Ingress class handled by the Tailscale operator. Resources without it are
/// never listed.
pub const INGRESS_CLASS: &str = "tailscale";
pub const TAGS_KEY: &str = "tags";
pub const PROXY_CLASS_KEY: &str = "proxy-class";

pub fn is_tailscale(ingress: &Ingress) -> bool {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        == Some(INGRESS_CLASS)
}

fn non_empty_map<'a>(
    entries: impl IntoIterator<Item = (&'static str, &'a str)>,
) -> Option<BTreeMap<String, String>> {
    let map: BTreeMap<String, String> = entries
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    (!map.is_empty()).then_some(map)
}

fn service_backend(form: &IngressFormInput) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: form.service_name.clone(),
            port: Some(ServiceBackendPort {
                number: Some(form.service_port),
                ..Default::default()
            }),
        }),
        ..Default::default()
    }
}

impl IngressFormInput {
    /// Resource submitted on creation.
    ///
    /// Creation only sets a default backend, tags go to an annotation and the
    /// TLS entry names the ingress rather than the host. Updates build a host
    /// rule instead (see [`IngressFormInput::to_update_resource`]); the two
    /// shapes are kept apart so existing clients see the same resources.
    pub fn to_create_resource(&self) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: non_empty_map([(PROXY_CLASS_KEY, self.proxy_class.as_str())]),
                annotations: non_empty_map([(TAGS_KEY, self.tags.as_str())]),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: Some(INGRESS_CLASS.to_string()),
                default_backend: Some(service_backend(self)),
                tls: self.tls_enabled.then(|| {
                    vec![IngressTLS {
                        hosts: Some(vec![self.name.clone()]),
                        secret_name: None,
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Resource submitted on update: a single host rule with one path.
    pub fn to_update_resource(&self) -> Ingress {
        let path = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path.clone()
        };

        let tls = (self.tls_enabled && !self.tls_secret_name.is_empty()).then(|| {
            vec![IngressTLS {
                hosts: Some(vec![self.host.clone()]),
                secret_name: Some(self.tls_secret_name.clone()),
            }]
        });

        Ingress {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: non_empty_map([
                    (TAGS_KEY, self.tags.as_str()),
                    (PROXY_CLASS_KEY, self.proxy_class.as_str()),
                ]),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: Some(INGRESS_CLASS.to_string()),
                rules: Some(vec![IngressRule {
                    host: Some(self.host.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(path),
                            path_type: self.path_type.to_string(),
                            backend: service_backend(self),
                        }],
                    }),
                }]),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
