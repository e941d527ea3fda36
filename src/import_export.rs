/// Import and export
///
/// Formats:
/// - Tabs List: one `url | title` per line, title optional
/// - Tabs JSON: an array of raw tabs
/// - Collections JSON: an array of collections with their filters and tabs
///
/// Tabs List and Tabs JSON are routed like tabs sent from the browser.
/// Collections JSON puts tabs straight into their collection.
use crate::collection::{Collection, CollectionFields};
use crate::context::AppContext;
use crate::error::Result;
use crate::favicon::FaviconHash;
use crate::ingest::Outcome;
use crate::storage::TabStore;
use crate::tab_data::{now_millis, normalize_url, RawTab, TabInput};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    TabsList,
    TabsJson,
    CollectionsJson,
}

impl ImportFormat {
    pub const ALL: [ImportFormat; 3] = [
        ImportFormat::TabsList,
        ImportFormat::TabsJson,
        ImportFormat::CollectionsJson,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ImportFormat::TabsList => "Tabs List",
            ImportFormat::TabsJson => "Tabs JSON",
            ImportFormat::CollectionsJson => "Collections JSON",
        }
    }
}

/// What an import did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub tabs_added: usize,
    pub tabs_rejected: usize,
    pub collections_created: usize,
    pub collections_merged: usize,
}

impl ImportReport {
    fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let tabs_added = outcomes.iter().filter(|o| o.is_routed()).count();
        ImportReport {
            tabs_added,
            tabs_rejected: outcomes.len() - tabs_added,
            ..ImportReport::default()
        }
    }
}

/// A tab as it appears in Collections JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedTab {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub favicon_hash: Option<FaviconHash>,
    #[serde(default)]
    pub creation_time: Option<f64>,
}

/// A collection as it appears in Collections JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCollection {
    #[serde(flatten)]
    pub fields: CollectionFields,
    #[serde(default)]
    pub tabs: Vec<ExportedTab>,
}

impl From<&Collection> for ExportedCollection {
    fn from(collection: &Collection) -> Self {
        let tabs = collection
            .tabs
            .iter()
            .flatten()
            .map(|tab| ExportedTab {
                url: tab.url.clone(),
                title: tab.title.clone(),
                favicon_hash: tab.favicon.clone(),
                creation_time: Some(tab.creation_time),
            })
            .collect();
        ExportedCollection {
            fields: collection.fields(),
            tabs,
        }
    }
}

/// Parse Tabs List text. Blank lines are skipped; an empty title counts as none.
pub fn parse_tabs_list(text: &str) -> Vec<RawTab> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('|') {
            Some((url, title)) => {
                let title = title.trim();
                RawTab::new(url.trim(), (!title.is_empty()).then(|| title.to_string()))
            }
            None => RawTab::new(line, None),
        })
        .collect()
}

pub fn parse_tabs_json(json: &str) -> Result<Vec<RawTab>> {
    Ok(serde_json::from_str(json)?)
}

pub fn parse_collections_json(json: &str) -> Result<Vec<ExportedCollection>> {
    Ok(serde_json::from_str(json)?)
}

pub async fn import<S: TabStore>(ctx: &AppContext<S>, format: ImportFormat, text: &str) -> Result<ImportReport> {
    match format {
        ImportFormat::TabsList => import_tabs_list(ctx, text).await,
        ImportFormat::TabsJson => import_tabs_json(ctx, text).await,
        ImportFormat::CollectionsJson => import_collections_json(ctx, text).await,
    }
}

pub async fn import_tabs_list<S: TabStore>(ctx: &AppContext<S>, text: &str) -> Result<ImportReport> {
    let outcomes = ctx.send_tabs(&parse_tabs_list(text)).await?;
    Ok(ImportReport::from_outcomes(&outcomes))
}

pub async fn import_tabs_json<S: TabStore>(ctx: &AppContext<S>, json: &str) -> Result<ImportReport> {
    let outcomes = ctx.send_tabs(&parse_tabs_json(json)?).await?;
    Ok(ImportReport::from_outcomes(&outcomes))
}

/// Merge each imported collection into an existing one with the same
/// definition, or create it. Every filter is compiled before anything is
/// written, so an invalid filter aborts the whole import.
pub async fn import_collections_json<S: TabStore>(ctx: &AppContext<S>, json: &str) -> Result<ImportReport> {
    let imported = parse_collections_json(json)?;
    let compiled = imported
        .iter()
        .map(|c| Collection::from_fields(&c.fields))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut report = ImportReport::default();
    let mut existing = ctx.load_collections(true).await?;
    let mut inputs = Vec::new();

    for (source, candidate) in imported.iter().zip(&compiled) {
        let index = match existing.iter().position(|c| c.same_definition(candidate)) {
            Some(index) => {
                report.collections_merged += 1;
                index
            }
            None => {
                let created = ctx.create_collection(source.fields.clone()).await?;
                existing.push(created.with_tabs(Vec::new()));
                report.collections_created += 1;
                existing.len() - 1
            }
        };

        let target = &existing[index];
        let collection_id = target.require_id()?;
        let mut urls: HashSet<String> = target.tabs.iter().flatten().map(|t| t.url.clone()).collect();
        // Tabs queued for earlier imported collections merged into the same target
        urls.extend(
            inputs
                .iter()
                .filter(|i: &&TabInput| i.collection_id == collection_id)
                .map(|i| i.url.clone()),
        );

        for tab in &source.tabs {
            let url = normalize_url(&tab.url);
            if !target.allow_duplicates && !urls.insert(url.clone()) {
                log::info!("Tab {} is already in {}", url, target.title);
                report.tabs_rejected += 1;
                continue;
            }
            inputs.push(TabInput {
                collection_id,
                url,
                title: tab.title.clone(),
                favicon_hash: tab.favicon_hash.clone(),
                creation_time: tab.creation_time.unwrap_or_else(now_millis),
            });
        }
    }

    report.tabs_added = inputs.len();
    if !inputs.is_empty() {
        ctx.store().bulk_add_tabs(inputs).await?;
    }
    log::info!(
        "Imported {} tab(s) into {} new and {} existing collection(s)",
        report.tabs_added,
        report.collections_created,
        report.collections_merged
    );
    Ok(report)
}

/// Every stored tab as `url | title`, one per line
pub async fn export_tabs_list<S: TabStore + ?Sized>(store: &S) -> Result<String> {
    let tabs = store.get_all_tabs().await?;
    let mut out = String::new();
    for tab in tabs {
        out.push_str(&tab.url);
        out.push_str(" | ");
        out.push_str(tab.title.as_deref().unwrap_or(""));
        out.push('\n');
    }
    Ok(out)
}

pub async fn export_collections_json<S: TabStore>(ctx: &AppContext<S>) -> Result<String> {
    let collections = ctx.load_collections(true).await?;
    let exported: Vec<ExportedCollection> = collections.iter().map(ExportedCollection::from).collect();
    Ok(serde_json::to_string_pretty(&exported)?)
}
