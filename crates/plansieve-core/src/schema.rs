//! Expression schema builder.
//!
//! Produces the grammar document handed to an external plan generator so
//! constrained generation can only name filters registered in the active
//! pipeline. The serialized shape is a compatibility contract with that
//! consumer: a top-level `filters` object whose `AND`/`OR`/`XOR`/`NOT` keys
//! are arrays of a self-referencing `definitions.condition`.

use crate::registry::FilterDescriptor;
use serde::{Serialize, Serializer, ser::SerializeMap};

const CONDITION_REF: &str = "#/definitions/condition";

const FILTERS_DESCRIPTION: &str =
    "A complex filter object used to apply multiple question-based filters with logical operators";
const CONDITION_DESCRIPTION: &str =
    "A filter condition which can be an question-based filter or another logical operator";
const FILTER_NAME_DESCRIPTION: &str = "The name of the filter.";
const QUESTION_DESCRIPTION: &str = "A Question, this filter should answer. Question has to contain all important information for filter.";

// Key order is part of the document; it matches what generators were
// prompted with historically.
const OPERATORS: [(&str, &str); 4] = [
    (
        "AND",
        "A list of conditions where all must be true (logical AND)",
    ),
    (
        "OR",
        "A list of conditions where at least one must be true (logical OR)",
    ),
    (
        "XOR",
        "A list of conditions where exactly one must be true (logical XOR)",
    ),
    (
        "NOT",
        "A single condition that must not be true (logical NOT)",
    ),
];

///
/// SchemaNode
///
/// Minimal JSON-schema fragment. Built fresh for every descriptor list;
/// nothing is shared or mutated after construction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchemaNode {
    Object(ObjectSchema),
    Array {
        description: Option<&'static str>,
        items: Box<Self>,
    },
    String {
        description: &'static str,
        choices: Option<Vec<FilterDescriptor>>,
    },
    Ref(&'static str),
}

///
/// ObjectSchema
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectSchema {
    pub description: Option<&'static str>,
    pub properties: Vec<(&'static str, SchemaNode)>,
    pub required: Vec<&'static str>,
    pub one_of: Vec<SchemaNode>,
    pub definitions: Vec<(&'static str, SchemaNode)>,
    pub additional_properties: Option<bool>,
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;

        match self {
            Self::Object(object) => {
                if let Some(description) = object.description {
                    map.serialize_entry("description", description)?;
                }
                map.serialize_entry("type", "object")?;
                if !object.properties.is_empty() {
                    map.serialize_entry("properties", &Entries(&object.properties))?;
                }
                if !object.required.is_empty() {
                    map.serialize_entry("required", &object.required)?;
                }
                if !object.one_of.is_empty() {
                    map.serialize_entry("oneOf", &object.one_of)?;
                }
                if !object.definitions.is_empty() {
                    map.serialize_entry("definitions", &Entries(&object.definitions))?;
                }
                if let Some(additional) = object.additional_properties {
                    map.serialize_entry("additionalProperties", &additional)?;
                }
            }
            Self::Array { description, items } => {
                if let Some(description) = description {
                    map.serialize_entry("description", description)?;
                }
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", items)?;
            }
            Self::String {
                description,
                choices,
            } => {
                map.serialize_entry("description", description)?;
                map.serialize_entry("type", "string")?;
                if let Some(choices) = choices {
                    let names: Vec<&str> = choices.iter().map(|d| d.name.as_str()).collect();
                    let descriptions: Vec<&str> =
                        choices.iter().map(|d| d.description.as_str()).collect();
                    map.serialize_entry("enum", &names)?;
                    map.serialize_entry("enumDescriptions", &descriptions)?;
                }
            }
            Self::Ref(target) => {
                map.serialize_entry("$ref", target)?;
            }
        }

        map.end()
    }
}

// Ordered key/value pairs serialized as a JSON object.
struct Entries<'a>(&'a [(&'static str, SchemaNode)]);

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, node) in self.0 {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

///
/// SchemaDoc
///
/// Grammar document for one filter registry.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaDoc {
    descriptors: Vec<FilterDescriptor>,
    filters: SchemaNode,
}

impl SchemaDoc {
    /// Descriptors in enum order.
    #[must_use]
    pub fn descriptors(&self) -> &[FilterDescriptor] {
        &self.descriptors
    }

    /// Filter names in enum order.
    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    #[must_use]
    pub fn contains_filter(&self, name: &str) -> bool {
        self.descriptors.iter().any(|d| d.name == name)
    }

    /// The `filters` schema object.
    #[must_use]
    pub const fn root(&self) -> &SchemaNode {
        &self.filters
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for SchemaDoc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("filters", &self.filters)?;
        map.end()
    }
}

/// Build the grammar document for `descriptors`, preserving input order in
/// the `enum`/`enumDescriptions` arrays.
#[must_use]
pub fn build_schema(descriptors: &[FilterDescriptor]) -> SchemaDoc {
    let leaf = SchemaNode::Object(ObjectSchema {
        properties: vec![
            (
                "filter_name",
                SchemaNode::String {
                    description: FILTER_NAME_DESCRIPTION,
                    choices: Some(descriptors.to_vec()),
                },
            ),
            (
                "question",
                SchemaNode::String {
                    description: QUESTION_DESCRIPTION,
                    choices: None,
                },
            ),
        ],
        required: vec!["filter_name", "question"],
        ..ObjectSchema::default()
    });

    let wrapper = SchemaNode::Object(ObjectSchema {
        properties: operator_properties(),
        ..ObjectSchema::default()
    });

    let condition = SchemaNode::Object(ObjectSchema {
        description: Some(CONDITION_DESCRIPTION),
        one_of: vec![leaf, wrapper],
        ..ObjectSchema::default()
    });

    let filters = SchemaNode::Object(ObjectSchema {
        description: Some(FILTERS_DESCRIPTION),
        properties: operator_properties(),
        definitions: vec![("condition", condition)],
        additional_properties: Some(false),
        ..ObjectSchema::default()
    });

    SchemaDoc {
        descriptors: descriptors.to_vec(),
        filters,
    }
}

fn operator_properties() -> Vec<(&'static str, SchemaNode)> {
    OPERATORS
        .iter()
        .map(|(tag, description)| {
            (
                *tag,
                SchemaNode::Array {
                    description: Some(*description),
                    items: Box::new(SchemaNode::Ref(CONDITION_REF)),
                },
            )
        })
        .collect()
}
