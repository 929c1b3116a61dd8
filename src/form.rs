use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::api::networking::v1::Ingress;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::{PROXY_CLASS_KEY, TAGS_KEY};

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(from = "String")]
pub enum PathType {
    Exact,
    #[default]
    Prefix,
    ImplementationSpecific,
}

impl PathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Exact => "Exact",
            PathType::Prefix => "Prefix",
            PathType::ImplementationSpecific => "ImplementationSpecific",
        }
    }

    /// Unrecognized values fall back to `Prefix`.
    pub fn parse_or_default(value: &str) -> Self {
        match value {
            "Exact" => PathType::Exact,
            "ImplementationSpecific" => PathType::ImplementationSpecific,
            _ => PathType::Prefix,
        }
    }
}

impl From<String> for PathType {
    fn from(value: String) -> Self {
        Self::parse_or_default(&value)
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat form model of a Tailscale ingress.
///
/// Only the first rule, first path and first TLS entry of a resource can be
/// represented here; saving an edited resource drops everything else.
/// Missing fields in a request body take the values of a fresh form.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressFormInput {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub service_name: String,
    pub service_port: i32,
    pub path: String,
    pub path_type: PathType,
    pub tls_enabled: bool,
    pub tls_secret_name: String,
    pub tags: String,
    pub proxy_class: String,
}

impl Default for IngressFormInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: "default".to_string(),
            host: String::new(),
            service_name: String::new(),
            service_port: 80,
            path: "/".to_string(),
            path_type: PathType::Prefix,
            tls_enabled: false,
            tls_secret_name: String::new(),
            tags: String::new(),
            proxy_class: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    Name,
    Namespace,
    Host,
    ServiceName,
    ServicePort,
    TlsSecretName,
}

#[derive(Debug, Error, Serialize, Default, Clone, PartialEq, Eq)]
#[error("invalid ingress form: {} field(s) rejected", .0.len())]
#[serde(transparent)]
pub struct ValidationErrors(pub BTreeMap<FormField, &'static str>);

impl IngressFormInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = BTreeMap::new();

        if self.name.is_empty() {
            errors.insert(FormField::Name, "Name is required");
        } else if !NAME_PATTERN.is_match(&self.name) {
            errors.insert(
                FormField::Name,
                "Name must consist of lowercase alphanumeric characters or \"-\"",
            );
        }

        if self.namespace.is_empty() {
            errors.insert(FormField::Namespace, "Namespace is required");
        }

        if self.host.is_empty() {
            errors.insert(FormField::Host, "Host is required");
        }

        if self.service_name.is_empty() {
            errors.insert(FormField::ServiceName, "Service name is required");
        }

        if !(1..=65535).contains(&self.service_port) {
            errors.insert(FormField::ServicePort, "Valid service port is required");
        }

        if self.tls_enabled && self.tls_secret_name.is_empty() {
            errors.insert(
                FormField::TlsSecretName,
                "TLS Secret name is required when TLS is enabled",
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Populate a form for editing an existing resource.
    pub fn from_resource(ingress: &Ingress) -> Self {
        let spec = ingress.spec.as_ref();
        let rule = spec.and_then(|s| s.rules.as_ref()).and_then(|r| r.first());
        let path = rule
            .and_then(|r| r.http.as_ref())
            .and_then(|http| http.paths.first());
        let service = path.and_then(|p| p.backend.service.as_ref());
        let tls = spec.and_then(|s| s.tls.as_ref()).and_then(|t| t.first());
        let label = |key: &str| {
            ingress
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(key))
                .cloned()
                .unwrap_or_default()
        };

        Self {
            name: ingress.metadata.name.clone().unwrap_or_default(),
            namespace: ingress
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            host: rule.and_then(|r| r.host.clone()).unwrap_or_default(),
            service_name: service.map(|s| s.name.clone()).unwrap_or_default(),
            service_port: service
                .and_then(|s| s.port.as_ref())
                .and_then(|p| p.number)
                .unwrap_or(80),
            path: path
                .and_then(|p| p.path.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "/".to_string()),
            path_type: path
                .map(|p| PathType::parse_or_default(&p.path_type))
                .unwrap_or_default(),
            tls_enabled: tls.is_some(),
            tls_secret_name: tls.and_then(|t| t.secret_name.clone()).unwrap_or_default(),
            tags: label(TAGS_KEY),
            proxy_class: label(PROXY_CLASS_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec, IngressTLS,
    };
    use kube::api::ObjectMeta;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn valid_form() -> IngressFormInput {
        IngressFormInput {
            name: "web".to_string(),
            host: "web.example.com".to_string(),
            service_name: "web-svc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn fresh_form_defaults() {
        let form = IngressFormInput::default();
        assert_eq!(form.namespace, "default");
        assert_eq!(form.service_port, 80);
        assert_eq!(form.path, "/");
        assert_eq!(form.path_type, PathType::Prefix);
        assert!(!form.tls_enabled);
    }

    #[test]
    fn valid_form_passes() {
        assert_eq!(valid_form().validate(), Ok(()));
    }

    #[rstest]
    #[case("My_Ingress", false)]
    #[case("my-ingress-1", true)]
    #[case("-leading", false)]
    #[case("trailing-", false)]
    #[case("a", true)]
    #[case("", false)]
    fn name_validation(#[case] name: &str, #[case] ok: bool) {
        let form = IngressFormInput {
            name: name.to_string(),
            ..valid_form()
        };
        let result = form.validate();
        assert_eq!(result.is_ok(), ok, "name {name:?}");
        if let Err(errors) = result {
            assert!(errors.0.contains_key(&FormField::Name));
        }
    }

    #[rstest]
    #[case(0, false)]
    #[case(-1, false)]
    #[case(8080, true)]
    #[case(65535, true)]
    #[case(65536, false)]
    fn port_validation(#[case] port: i32, #[case] ok: bool) {
        let form = IngressFormInput {
            service_port: port,
            ..valid_form()
        };
        assert_eq!(form.validate().is_ok(), ok, "port {port}");
    }

    #[rstest]
    #[case("", false)]
    #[case("my-secret", true)]
    fn tls_secret_required_when_enabled(#[case] secret: &str, #[case] ok: bool) {
        let form = IngressFormInput {
            tls_enabled: true,
            tls_secret_name: secret.to_string(),
            ..valid_form()
        };
        assert_eq!(form.validate().is_ok(), ok);
    }

    #[test]
    fn reports_every_failing_field() {
        let form = IngressFormInput {
            namespace: String::new(),
            service_port: 0,
            tls_enabled: true,
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.0.keys().copied().collect::<Vec<_>>(),
            vec![
                FormField::Name,
                FormField::Namespace,
                FormField::Host,
                FormField::ServiceName,
                FormField::ServicePort,
                FormField::TlsSecretName,
            ]
        );
        assert_eq!(errors.0[&FormField::Name], "Name is required");
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let form: IngressFormInput = serde_json::from_value(serde_json::json!({
            "name": "web",
            "host": "web.example.com",
            "serviceName": "web-svc",
            "servicePort": 8080,
            "pathType": "Exact",
            "tlsEnabled": true,
            "tlsSecretName": "web-tls"
        }))
        .unwrap();

        assert_eq!(form.namespace, "default");
        assert_eq!(form.path, "/");
        assert_eq!(form.service_port, 8080);
        assert_eq!(form.path_type, PathType::Exact);
        assert_eq!(form.tls_secret_name, "web-tls");
    }

    #[test]
    fn unknown_path_type_deserializes_as_prefix() {
        let form: IngressFormInput =
            serde_json::from_value(serde_json::json!({ "pathType": "Weird" })).unwrap();
        assert_eq!(form.path_type, PathType::Prefix);

        let form: IngressFormInput =
            serde_json::from_value(serde_json::json!({ "pathType": "ImplementationSpecific" }))
                .unwrap();
        assert_eq!(form.path_type, PathType::ImplementationSpecific);
    }

    #[test]
    fn validation_errors_serialize_by_field_name() {
        let form = IngressFormInput {
            service_name: String::new(),
            ..valid_form()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({ "serviceName": "Service name is required" })
        );
    }

    #[test]
    fn populate_from_bare_resource_uses_defaults() {
        let ingress = Ingress {
            metadata: ObjectMeta {
                name: Some("bare".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let form = IngressFormInput::from_resource(&ingress);
        assert_eq!(
            form,
            IngressFormInput {
                name: "bare".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn populate_takes_first_rule_and_tls_entry() {
        let path = |p: &str, svc: &str| HTTPIngressPath {
            path: Some(p.to_string()),
            path_type: "Weird".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: svc.to_string(),
                    port: None,
                }),
                ..Default::default()
            },
        };
        let ingress = Ingress {
            metadata: ObjectMeta {
                name: Some("multi".to_string()),
                namespace: Some("apps".to_string()),
                labels: Some(BTreeMap::from([
                    (TAGS_KEY.to_string(), "a,b".to_string()),
                    (PROXY_CLASS_KEY.to_string(), "external".to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![
                    IngressRule {
                        host: Some("one.example.com".to_string()),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![path("/one", "one-svc"), path("/two", "two-svc")],
                        }),
                    },
                    IngressRule {
                        host: Some("two.example.com".to_string()),
                        http: None,
                    },
                ]),
                tls: Some(vec![
                    IngressTLS {
                        hosts: Some(vec!["one.example.com".to_string()]),
                        secret_name: Some("one-tls".to_string()),
                    },
                    IngressTLS {
                        hosts: None,
                        secret_name: Some("two-tls".to_string()),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let form = IngressFormInput::from_resource(&ingress);
        assert_eq!(
            form,
            IngressFormInput {
                name: "multi".to_string(),
                namespace: "apps".to_string(),
                host: "one.example.com".to_string(),
                service_name: "one-svc".to_string(),
                service_port: 80,
                path: "/one".to_string(),
                path_type: PathType::Prefix,
                tls_enabled: true,
                tls_secret_name: "one-tls".to_string(),
                tags: "a,b".to_string(),
                proxy_class: "external".to_string(),
            }
        );
    }
}
