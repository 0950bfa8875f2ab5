//! Unstructured Kubernetes-style resource.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, GroupVersionKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{type_name, PathError, ResourceError};
use crate::path::FieldPath;
use crate::provenance::{OwnerRef, Provenance};

/// A resource as observed in (or desired for) the cluster.
///
/// `metadata` is typed; every other top-level field (`spec`, `status`,
/// `data`, ...) is kept verbatim in `data`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Key used to address attachments: (apiVersion, kind, namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(|s| s.to_string()),
            name: name.to_string(),
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            _ => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// The identity 5-tuple: attachment key plus uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub id: ResourceId,
    pub uid: Option<String>,
}

impl Resource {
    /// Decode a resource from an arbitrary JSON document.
    pub fn from_value(v: Value) -> Result<Self, ResourceError> {
        if !v.is_object() {
            return Err(ResourceError::NotAnObject(type_name(&v)));
        }
        Ok(serde_json::from_value(v)?)
    }

    pub fn to_value(&self) -> Result<Value, ResourceError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref().filter(|s| !s.is_empty())
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.api_version, &self.kind, self.namespace(), self.name())
    }

    pub fn identity(&self) -> Identity {
        Identity { id: self.id(), uid: self.uid().map(|s| s.to_string()) }
    }

    pub fn equals_by_identity(&self, other: &Resource) -> bool {
        self.api_version == other.api_version
            && self.kind == other.kind
            && self.namespace() == other.namespace()
            && self.name() == other.name()
            && self.uid() == other.uid()
    }

    /// Identity, then cheap cardinality checks on metadata collections, then
    /// full structural equality.
    pub fn equals_by_value(&self, other: &Resource) -> bool {
        if !self.equals_by_identity(other) {
            return false;
        }
        let (a, b) = (&self.metadata, &other.metadata);
        let map_len = |m: &Option<BTreeMap<String, String>>| m.as_ref().map_or(0, |m| m.len());
        if map_len(&a.labels) != map_len(&b.labels)
            || map_len(&a.annotations) != map_len(&b.annotations)
            || a.owner_references.as_ref().map_or(0, |v| v.len()) != b.owner_references.as_ref().map_or(0, |v| v.len())
            || a.finalizers.as_ref().map_or(0, |v| v.len()) != b.finalizers.as_ref().map_or(0, |v| v.len())
        {
            return false;
        }
        self == other
    }

    pub fn spec(&self) -> Option<&Value> {
        self.data.get("spec")
    }

    pub fn status(&self) -> Option<&Value> {
        self.data.get("status")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.as_ref()?.get(key).map(|s| s.as_str())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.as_ref()?.get(key).map(|s| s.as_str())
    }

    /// Look up a dot path across the whole document, metadata included.
    pub fn get_path(&self, path: &FieldPath) -> Result<Option<Value>, ResourceError> {
        use crate::path::Segment;
        let (head, rest) = match path.segments().split_first() {
            Some((Segment::Key(k), rest)) => (k.as_str(), rest),
            Some(_) => return Ok(None),
            None => return Err(PathError::Empty.into()),
        };
        let found = match head {
            "apiVersion" if rest.is_empty() => Some(Value::String(self.api_version.clone())),
            "kind" if rest.is_empty() => Some(Value::String(self.kind.clone())),
            "apiVersion" | "kind" => None,
            "metadata" => {
                let meta = serde_json::to_value(&self.metadata)?;
                FieldPath::walk(&meta, rest).cloned()
            }
            key => self.data.get(key).and_then(|v| FieldPath::walk(v, rest)).cloned(),
        };
        Ok(found)
    }

    /// Write a value at a dot path inside the non-metadata part of the document.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), ResourceError> {
        let mut doc = Value::Object(std::mem::take(&mut self.data));
        let res = path.set(&mut doc, value);
        if let Value::Object(map) = doc {
            self.data = map;
        }
        res.map_err(Into::into)
    }

    pub fn with_annotation(&self, key: &str, value: &str) -> Resource {
        let mut out = self.clone();
        out.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        out
    }

    pub fn with_name(&self, name: &str) -> Resource {
        let mut out = self.clone();
        out.metadata.name = Some(name.to_string());
        out
    }

    /// Copy with the provenance annotations written out.
    pub fn with_provenance(&self, p: &Provenance) -> Resource {
        let mut out = self.clone();
        let annos = out.metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (k, v) in p.annotations() {
            annos.insert(k.to_string(), v);
        }
        out
    }

    /// Typed provenance read back from annotations, if this resource was
    /// created by a watch.
    pub fn provenance(&self) -> Option<Provenance> {
        Provenance::from_annotations(self.metadata.annotations.as_ref()?)
    }

    /// Whether the provenance marker names `watch` as the creator.
    pub fn created_by(&self, watch: &OwnerRef) -> bool {
        self.provenance().map_or(false, |p| p.watch.uid == watch.uid)
    }
}

impl TryFrom<DynamicObject> for Resource {
    type Error = ResourceError;

    fn try_from(obj: DynamicObject) -> Result<Self, Self::Error> {
        Resource::from_value(serde_json::to_value(obj)?)
    }
}

impl TryFrom<Resource> for DynamicObject {
    type Error = ResourceError;

    fn try_from(r: Resource) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(r.to_value()?)?)
    }
}
