//! Namespaced object identity

use kube::ResourceExt;
use std::fmt;

/// Name and namespace of a namespaced Kubernetes object.
///
/// Orders by namespace, then name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a Kubernetes object, namespace defaults to `default`
    pub fn from_resource<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    #[test]
    fn test_display() {
        assert_eq!(ObjectKey::new("ns", "svc").to_string(), "ns/svc");
    }

    #[test]
    fn test_from_resource_defaults_namespace() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("svc".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_resource(&svc), ObjectKey::new("default", "svc"));
    }

    #[test]
    fn test_ordering_is_namespace_first() {
        let mut keys = vec![
            ObjectKey::new("b", "a"),
            ObjectKey::new("a", "z"),
            ObjectKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ObjectKey::new("a", "b"),
                ObjectKey::new("a", "z"),
                ObjectKey::new("b", "a"),
            ]
        );
    }
}
