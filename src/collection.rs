/// Collections: titled, rule-based buckets of tabs
use crate::error::{Error, FilterError};
use crate::filter::{compile_all, split_filter_text, Pattern};
use crate::tab_data::{CollectionId, Tab};
use serde::{Deserialize, Deserializer, Serialize};

/// Title given to the collection a fresh store is populated with
pub const DEFAULT_COLLECTION_TITLE: &str = "default";

/// The user-editable part of a collection, as stored and exported.
/// `filters` holds the raw lines, comments included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFields {
    pub title: String,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_priority")]
    pub priority: i64,
    #[serde(default)]
    pub allow_duplicates: bool,
}

impl CollectionFields {
    pub fn new(title: impl Into<String>, filter_text: &str, priority: i64, allow_duplicates: bool) -> Self {
        CollectionFields {
            title: title.into(),
            filters: split_filter_text(filter_text),
            priority,
            allow_duplicates,
        }
    }
}

/// A persisted collection row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: CollectionId,
    #[serde(flatten)]
    pub fields: CollectionFields,
}

/// Partial update of a collection row. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionUpdate {
    pub title: Option<String>,
    pub filters: Option<Vec<String>>,
    pub priority: Option<i64>,
    pub allow_duplicates: Option<bool>,
}

impl From<CollectionFields> for CollectionUpdate {
    fn from(fields: CollectionFields) -> Self {
        CollectionUpdate {
            title: Some(fields.title),
            filters: Some(fields.filters),
            priority: Some(fields.priority),
            allow_duplicates: Some(fields.allow_duplicates),
        }
    }
}

impl CollectionUpdate {
    pub fn apply(self, fields: &mut CollectionFields) {
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(filters) = self.filters {
            fields.filters = filters;
        }
        if let Some(priority) = self.priority {
            fields.priority = priority;
        }
        if let Some(allow_duplicates) = self.allow_duplicates {
            fields.allow_duplicates = allow_duplicates;
        }
    }
}

/// Priority may arrive as a number or a numeric string
fn deserialize_priority<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Priority {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Priority::deserialize(deserializer)? {
        Priority::Int(n) => Ok(n),
        Priority::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        Priority::Float(f) => Err(serde::de::Error::custom(format!("priority must be an integer, got {f}"))),
        Priority::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("priority must be an integer, got {s:?}"))),
    }
}

/// A collection with its filters compiled and ready for matching
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    id: Option<CollectionId>,
    pub title: String,
    filters: Vec<Pattern>,
    original_filters: Vec<String>,
    pub priority: i64,
    pub allow_duplicates: bool,
    /// Loaded on demand
    pub tabs: Option<Vec<Tab>>,
}

impl Collection {
    /// Compile a transient (unsaved) collection. Fails on the first invalid filter.
    pub fn new<S: AsRef<str>>(
        title: impl Into<String>,
        filter_lines: &[S],
        priority: i64,
        allow_duplicates: bool,
    ) -> Result<Collection, FilterError> {
        let (filters, original_filters) = compile_all(filter_lines)?;
        Ok(Collection {
            id: None,
            title: title.into(),
            filters,
            original_filters,
            priority,
            allow_duplicates,
            tabs: None,
        })
    }

    pub fn from_fields(fields: &CollectionFields) -> Result<Collection, FilterError> {
        Collection::new(
            fields.title.clone(),
            &fields.filters,
            fields.priority,
            fields.allow_duplicates,
        )
    }

    pub fn from_record(record: &CollectionRecord) -> Result<Collection, FilterError> {
        let mut collection = Collection::from_fields(&record.fields)?;
        collection.id = Some(record.id);
        Ok(collection)
    }

    pub fn with_id(mut self, id: CollectionId) -> Collection {
        self.id = Some(id);
        self
    }

    pub fn with_tabs(mut self, tabs: Vec<Tab>) -> Collection {
        self.tabs = Some(tabs);
        self
    }

    pub fn id(&self) -> Option<CollectionId> {
        self.id
    }

    /// The id, or `MissingId` for a collection that was never saved
    pub fn require_id(&self) -> Result<CollectionId, Error> {
        self.id.ok_or(Error::MissingId("Collection"))
    }

    pub fn filters(&self) -> &[Pattern] {
        &self.filters
    }

    pub fn original_filters(&self) -> &[String] {
        &self.original_filters
    }

    pub fn fields(&self) -> CollectionFields {
        CollectionFields {
            title: self.title.clone(),
            filters: self.original_filters.clone(),
            priority: self.priority,
            allow_duplicates: self.allow_duplicates,
        }
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.as_ref().map_or(0, Vec::len)
    }

    /// Same title, compiled filter sources, priority and duplicate policy.
    /// Comments do not take part in the comparison.
    pub fn same_definition(&self, other: &Collection) -> bool {
        self.title == other.title
            && self.priority == other.priority
            && self.allow_duplicates == other.allow_duplicates
            && self
                .filters
                .iter()
                .map(Pattern::source)
                .eq(other.filters.iter().map(Pattern::source))
    }
}
