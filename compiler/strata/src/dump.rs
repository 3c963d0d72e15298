//! Serializable summaries of resolved instances for display.

use indexmap::IndexMap;
use serde::Serialize;
use strata_eval::{ClassInstance, DeclaredResource, Hint, ResolvedProperty};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassDump {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub public: bool,
    /// Hierarchy level whose class list included the class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_at: Option<usize>,
    pub properties: Vec<PropertyDump>,
    pub resources: Vec<ResourceDump>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropertyDump {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    pub value: Option<serde_json::Value>,
    /// The declared default, whether or not it supplied `value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<HintDump>,
    /// Hierarchy level the value came from; absent for defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_at: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "hint", rename_all = "snake_case")]
pub enum HintDump {
    MissingValue,
    TypeMismatch { expected: String, actual: String },
    Encrypted,
}

impl From<&Hint> for HintDump {
    fn from(hint: &Hint) -> Self {
        match hint {
            Hint::MissingValue => HintDump::MissingValue,
            Hint::TypeMismatch { expected, actual } => HintDump::TypeMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Hint::Encrypted => HintDump::Encrypted,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceDump {
    #[serde(rename = "type")]
    pub type_name: String,
    pub title: String,
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl From<&DeclaredResource> for ResourceDump {
    fn from(resource: &DeclaredResource) -> Self {
        ResourceDump {
            type_name: resource.type_name.clone(),
            title: resource.title.clone(),
            attributes: resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }
}

impl ClassDump {
    pub fn of(instance: &ClassInstance, included_at: Option<usize>) -> Self {
        let overrides = instance.overrides();
        let properties = instance
            .properties()
            .iter()
            .map(|(name, property)| property_dump(name, property, overrides.get(name).copied()))
            .collect();
        ClassDump {
            name: instance.name().to_string(),
            title: instance.title().map(str::to_string),
            kind: instance.kind().to_string(),
            parent: instance.parent().map(str::to_string),
            public: instance.is_public(),
            included_at,
            properties,
            resources: instance.resources().iter().map(ResourceDump::from).collect(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDump> {
        self.properties.iter().find(|p| p.name == name)
    }
}

fn property_dump(
    name: &str,
    property: &ResolvedProperty,
    overridden_at: Option<usize>,
) -> PropertyDump {
    PropertyDump {
        name: name.to_string(),
        type_: property.type_.as_ref().map(ToString::to_string),
        value: property.value.as_ref().map(strata_ir::Value::to_json),
        default: property.default.as_ref().map(strata_ir::Value::to_json),
        error: property.error.as_ref().map(ToString::to_string),
        hints: property.hints.iter().map(HintDump::from).collect(),
        overridden_at,
    }
}
