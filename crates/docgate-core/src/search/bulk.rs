//! Bulk request body
//!
//! A bulk body is an ordered list of `(action, document)` pairs. On the wire
//! (both in the job queue and towards the engine) each action immediately
//! precedes its document.

use docgate_common::types::{Document, IndexName};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Directive telling the engine which index the next document goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAction {
    pub index: IndexTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTarget {
    #[serde(rename = "_index")]
    pub index: IndexName,
}

impl IndexAction {
    pub fn new(index: IndexName) -> Self {
        Self {
            index: IndexTarget { index },
        }
    }

    pub fn target(&self) -> &IndexName {
        &self.index.index
    }
}

/// Ordered action/document pairs of one bulk write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkBody {
    operations: Vec<(IndexAction, Document)>,
}

impl BulkBody {
    /// Pair every document with an index action for `index`, keeping order
    pub fn for_documents(index: &IndexName, documents: Vec<Document>) -> Self {
        let operations = documents
            .into_iter()
            .map(|doc| (IndexAction::new(index.clone()), doc))
            .collect();
        Self { operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[(IndexAction, Document)] {
        &self.operations
    }

    /// Whether every action targets `index`
    pub fn targets_only(&self, index: &IndexName) -> bool {
        self.operations.iter().all(|(action, _)| action.target() == index)
    }

    /// Newline-delimited JSON as expected by the `_bulk` endpoint
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for (action, document) in &self.operations {
            out.push_str(&serde_json::to_string(action)?);
            out.push('\n');
            out.push_str(&serde_json::to_string(document)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Line<'a> {
    Action(&'a IndexAction),
    Document(&'a Document),
}

impl Serialize for BulkBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.operations
                .iter()
                .flat_map(|(action, doc)| [Line::Action(action), Line::Document(doc)]),
        )
    }
}

impl<'de> Deserialize<'de> for BulkBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let lines = Vec::<Value>::deserialize(deserializer)?;
        if lines.len() % 2 != 0 {
            return Err(D::Error::custom("bulk body must alternate actions and documents"));
        }

        let mut operations = Vec::with_capacity(lines.len() / 2);
        let mut iter = lines.into_iter();
        while let (Some(action), Some(document)) = (iter.next(), iter.next()) {
            let action: IndexAction = serde_json::from_value(action).map_err(D::Error::custom)?;
            let document = match document {
                Value::Object(map) => map,
                other => {
                    return Err(D::Error::custom(format!(
                        "bulk document must be an object, got {}",
                        other
                    )))
                }
            };
            operations.push((action, document));
        }

        Ok(Self { operations })
    }
}
