/// Collections page: edit collections, browse their tabs, import/export and settings

use yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};
use patternfly_yew::prelude::*;
use std::rc::Rc;
use crate::chrome::{export_to_file, save_settings, ChromeStore};
use crate::collection::{Collection, CollectionFields};
use crate::context::AppContext;
use crate::import_export::{export_collections_json, export_tabs_list, import, ImportFormat};
use crate::settings::SettingValue;
use crate::storage::TabStore;
use crate::tab_data::{now_millis, Tab};
use super::components::{SettingField, TabItem};
use super::open_context;

/// Shared page context. Two handles are equal when they point at the same context.
#[derive(Clone)]
pub struct Ctx(Rc<AppContext<ChromeStore>>);

impl PartialEq for Ctx {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone, PartialEq)]
enum ViewState {
    Loading,
    Idle,
    Busy(String),
    Message(String),
    Error(String),
}

/// Contents of the create/edit form
#[derive(Clone, Debug, Default, PartialEq)]
struct Draft {
    editing: Option<Collection>,
    title: String,
    filters: String,
    priority: String,
    allow_duplicates: bool,
}

impl Draft {
    fn from_collection(collection: &Collection) -> Self {
        Draft {
            editing: Some(collection.clone()),
            title: collection.title.clone(),
            filters: collection.original_filters().join("\n"),
            priority: collection.priority.to_string(),
            allow_duplicates: collection.allow_duplicates,
        }
    }

    fn fields(&self) -> Result<CollectionFields, String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title is required".to_string());
        }
        let priority = match self.priority.trim() {
            "" => 0,
            text => text
                .parse::<i64>()
                .map_err(|_| format!("Priority must be an integer, not {:?}", text))?,
        };
        Ok(CollectionFields::new(title, &self.filters, priority, self.allow_duplicates))
    }
}

async fn reload(ctx: Ctx, collections: UseStateHandle<Vec<Collection>>, state: UseStateHandle<ViewState>) {
    match ctx.0.load_collections(true).await {
        Ok(loaded) => collections.set(loaded),
        Err(e) => state.set(ViewState::Error(format!("Failed to load collections: {}", e))),
    }
}

#[function_component(CollectionsPage)]
pub fn collections_page() -> Html {
    let ctx = use_state(|| None::<Ctx>);
    let collections = use_state(Vec::<Collection>::new);
    let state = use_state(|| ViewState::Loading);
    let draft = use_state(Draft::default);
    let import_text = use_state(String::new);
    let import_format = use_state(|| ImportFormat::TabsList);
    let settings_version = use_state(|| 0u32);

    // Build the context and load collections on mount
    {
        let ctx = ctx.clone();
        let collections = collections.clone();
        let state = state.clone();

        use_effect_with((), move |_| {
            spawn_local(async move {
                match open_context().await {
                    Ok(opened) => {
                        let opened = Ctx(Rc::new(opened));
                        if let Err(e) = opened.0.cleanup_favicons(now_millis()).await {
                            log::error!("Favicon cleanup failed: {}", e);
                        }
                        ctx.set(Some(opened.clone()));
                        state.set(ViewState::Idle);
                        reload(opened, collections, state).await;
                    }
                    Err(e) => state.set(ViewState::Error(format!("Failed to open storage: {}", e))),
                }
            });
            || ()
        });
    }

    // Form inputs
    let on_title_input = {
        let draft = draft.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                draft.set(Draft { title: input.value(), ..(*draft).clone() });
            }
        })
    };

    let on_filters_input = {
        let draft = draft.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlTextAreaElement>() {
                draft.set(Draft { filters: input.value(), ..(*draft).clone() });
            }
        })
    };

    let on_priority_input = {
        let draft = draft.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                draft.set(Draft { priority: input.value(), ..(*draft).clone() });
            }
        })
    };

    let on_allow_duplicates = {
        let draft = draft.clone();
        Callback::from(move |e: Event| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                draft.set(Draft { allow_duplicates: input.checked(), ..(*draft).clone() });
            }
        })
    };

    // Create or edit
    let on_save = {
        let ctx = ctx.clone();
        let draft = draft.clone();
        let collections = collections.clone();
        let state = state.clone();

        Callback::from(move |_| {
            let Some(ctx) = (*ctx).clone() else { return };
            let fields = match draft.fields() {
                Ok(fields) => fields,
                Err(e) => {
                    state.set(ViewState::Error(e));
                    return;
                }
            };

            let editing = draft.editing.clone();
            let draft = draft.clone();
            let collections = collections.clone();
            let state = state.clone();
            state.set(ViewState::Busy("Saving collection...".to_string()));

            spawn_local(async move {
                let saved = match &editing {
                    Some(collection) => ctx.0.edit_collection(collection, fields).await,
                    None => ctx.0.create_collection(fields).await,
                };
                match saved {
                    Ok(_) => {
                        draft.set(Draft::default());
                        state.set(ViewState::Idle);
                        reload(ctx, collections, state).await;
                    }
                    Err(e) => state.set(ViewState::Error(e.to_string())),
                }
            });
        })
    };

    let on_cancel_edit = {
        let draft = draft.clone();
        Callback::from(move |_| draft.set(Draft::default()))
    };

    let on_edit = {
        let draft = draft.clone();
        Callback::from(move |collection: Collection| draft.set(Draft::from_collection(&collection)))
    };

    let on_delete = {
        let ctx = ctx.clone();
        let collections = collections.clone();
        let state = state.clone();

        Callback::from(move |collection: Collection| {
            let Some(ctx) = (*ctx).clone() else { return };
            let collections = collections.clone();
            let state = state.clone();

            spawn_local(async move {
                match ctx.0.delete_collection(&collection).await {
                    Ok(()) => reload(ctx, collections, state).await,
                    Err(e) => state.set(ViewState::Error(format!("Delete failed: {}", e))),
                }
            });
        })
    };

    let on_clear = {
        let ctx = ctx.clone();
        let collections = collections.clone();
        let state = state.clone();

        Callback::from(move |collection: Collection| {
            let Some(ctx) = (*ctx).clone() else { return };
            let collections = collections.clone();
            let state = state.clone();

            spawn_local(async move {
                match ctx.0.clear_collection(&collection).await {
                    Ok(removed) => {
                        state.set(ViewState::Message(format!("{} tab(s) removed from {}", removed, collection.title)));
                        reload(ctx, collections, state).await;
                    }
                    Err(e) => state.set(ViewState::Error(format!("Clear failed: {}", e))),
                }
            });
        })
    };

    let on_delete_tab = {
        let ctx = ctx.clone();
        let state = state.clone();

        Callback::from(move |tab: Tab| {
            let Some(ctx) = (*ctx).clone() else { return };
            let state = state.clone();

            spawn_local(async move {
                if let Err(e) = ctx.0.delete_tab(&tab).await {
                    state.set(ViewState::Error(format!("Delete failed: {}", e)));
                }
            });
        })
    };

    // Import
    let on_import_text = {
        let import_text = import_text.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlTextAreaElement>() {
                import_text.set(input.value());
            }
        })
    };

    let on_import_format = {
        let import_format = import_format.clone();
        Callback::from(move |e: Event| {
            if let Some(select) = e.target_dyn_into::<HtmlSelectElement>() {
                if let Some(format) = ImportFormat::ALL.iter().find(|f| f.label() == select.value()) {
                    import_format.set(*format);
                }
            }
        })
    };

    let on_import = {
        let ctx = ctx.clone();
        let import_text = import_text.clone();
        let import_format = import_format.clone();
        let collections = collections.clone();
        let state = state.clone();

        Callback::from(move |_| {
            let Some(ctx) = (*ctx).clone() else { return };
            let text = (*import_text).clone();
            let format = *import_format;
            let import_text = import_text.clone();
            let collections = collections.clone();
            let state = state.clone();
            state.set(ViewState::Busy(format!("Importing {}...", format.label())));

            spawn_local(async move {
                match import(&ctx.0, format, &text).await {
                    Ok(report) => {
                        import_text.set(String::new());
                        state.set(ViewState::Message(format!(
                            "Imported {} tab(s), skipped {}; {} collection(s) created, {} merged",
                            report.tabs_added,
                            report.tabs_rejected,
                            report.collections_created,
                            report.collections_merged
                        )));
                        reload(ctx, collections, state).await;
                    }
                    Err(e) => state.set(ViewState::Error(format!("Import failed: {}", e))),
                }
            });
        })
    };

    // Export
    let on_export_tabs = {
        let ctx = ctx.clone();
        let state = state.clone();

        Callback::from(move |_| {
            let Some(ctx) = (*ctx).clone() else { return };
            let state = state.clone();

            spawn_local(async move {
                match export_tabs_list(ctx.0.store()).await {
                    Ok(text) => export_to_file(&text, &format!("tabs-{}.txt", now_millis() as i64)),
                    Err(e) => state.set(ViewState::Error(format!("Export failed: {}", e))),
                }
            });
        })
    };

    let on_export_collections = {
        let ctx = ctx.clone();
        let state = state.clone();

        Callback::from(move |_| {
            let Some(ctx) = (*ctx).clone() else { return };
            let state = state.clone();

            spawn_local(async move {
                match export_collections_json(&ctx.0).await {
                    Ok(json) => export_to_file(&json, &format!("collections-{}.json", now_millis() as i64)),
                    Err(e) => state.set(ViewState::Error(format!("Export failed: {}", e))),
                }
            });
        })
    };

    // Settings
    let on_setting_change = {
        let ctx = ctx.clone();
        let state = state.clone();
        let settings_version = settings_version.clone();

        Callback::from(move |(key, value): (&'static str, SettingValue)| {
            let Some(ctx) = (*ctx).clone() else { return };
            if let Err(e) = ctx.0.set_setting(key, value) {
                state.set(ViewState::Error(e.to_string()));
                return;
            }
            settings_version.set(*settings_version + 1);

            let settings = ctx.0.settings().clone();
            let state = state.clone();
            spawn_local(async move {
                if let Err(e) = save_settings(&settings).await {
                    state.set(ViewState::Error(format!("Failed to save settings: {}", e)));
                }
            });
        })
    };

    let is_busy = matches!(*state, ViewState::Loading | ViewState::Busy(_));
    let total_tabs: usize = collections.iter().map(Collection::tab_count).sum();

    let settings_fields: Html = match &*ctx {
        Some(ctx) => ctx
            .0
            .settings()
            .iter()
            .map(|(key, setting)| html! {
                <SettingField
                    key_name={key}
                    setting={setting.clone()}
                    on_change={on_setting_change.clone()}
                />
            })
            .collect(),
        None => html! {},
    };

    let cards: Html = match &*ctx {
        Some(ctx) => collections
            .iter()
            .map(|collection| html! {
                <CollectionCard
                    key={collection.id().map(|id| id.to_string()).unwrap_or_default()}
                    ctx={ctx.clone()}
                    collection={collection.clone()}
                    on_edit={on_edit.clone()}
                    on_clear={on_clear.clone()}
                    on_delete={on_delete.clone()}
                    on_delete_tab={on_delete_tab.clone()}
                />
            })
            .collect(),
        None => html! {},
    };

    html! {
        <div class="container">
            <div class="header">
                <h1 class="main-title">{"Collections"}</h1>
                <Button onclick={on_export_tabs} variant={ButtonVariant::Secondary} disabled={is_busy}>
                    {"Export Tabs List"}
                </Button>
                <Button onclick={on_export_collections} variant={ButtonVariant::Secondary} disabled={is_busy}>
                    {"Export Collections JSON"}
                </Button>
            </div>

            // Status display
            {match &*state {
                ViewState::Loading => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{"Loading collections..."}</p>
                    </div>
                },
                ViewState::Busy(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                ViewState::Message(msg) => html! {
                    <Alert r#type={AlertType::Info} title={msg.clone()} inline={true}>
                    </Alert>
                },
                ViewState::Error(err) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err.clone()}
                    </Alert>
                },
                ViewState::Idle => html! {}
            }}

            // Create / edit form
            <div class="collection-form">
                <h2>{if draft.editing.is_some() { "Edit collection" } else { "New collection" }}</h2>
                <input
                    type="text"
                    placeholder="Title"
                    value={draft.title.clone()}
                    oninput={on_title_input}
                    class="form-input"
                />
                <textarea
                    placeholder="One filter per line: text, /regex/ or # comment"
                    value={draft.filters.clone()}
                    oninput={on_filters_input}
                    class="form-textarea"
                />
                <input
                    type="text"
                    placeholder="Priority"
                    value={draft.priority.clone()}
                    oninput={on_priority_input}
                    class="form-input"
                />
                <label>
                    <input type="checkbox" checked={draft.allow_duplicates} onchange={on_allow_duplicates} />
                    {" Allow duplicates"}
                </label>
                <div class="form-actions">
                    <Button onclick={on_save} disabled={is_busy}>
                        {if draft.editing.is_some() { "Save" } else { "Create" }}
                    </Button>
                    if draft.editing.is_some() {
                        <Button onclick={on_cancel_edit} variant={ButtonVariant::Secondary}>
                            {"Cancel"}
                        </Button>
                    }
                </div>
            </div>

            // Collections list
            if collections.is_empty() {
                <div class="empty-state">
                    <p>{"No collections yet."}</p>
                </div>
            } else {
                <div class="collections-list">
                    {cards}
                </div>
            }

            // Import
            <div class="import-container">
                <h2>{"Import"}</h2>
                <select onchange={on_import_format}>
                    {for ImportFormat::ALL.iter().map(|format| html! {
                        <option value={format.label()} selected={*format == *import_format}>{format.label()}</option>
                    })}
                </select>
                <textarea
                    value={(*import_text).clone()}
                    oninput={on_import_text}
                    class="form-textarea"
                />
                <Button onclick={on_import} disabled={is_busy || import_text.trim().is_empty()}>
                    {"Import"}
                </Button>
            </div>

            // Settings
            <div class="settings-container">
                <h2>{"Settings"}</h2>
                {settings_fields}
            </div>

            <div class="footer">
                {format!("{} collections • {} total tabs", collections.len(), total_tabs)}
            </div>
        </div>
    }
}

#[derive(Properties, PartialEq)]
struct CollectionCardProps {
    ctx: Ctx,
    collection: Collection,
    on_edit: Callback<Collection>,
    on_clear: Callback<Collection>,
    on_delete: Callback<Collection>,
    on_delete_tab: Callback<Tab>,
}

#[function_component(CollectionCard)]
fn collection_card(props: &CollectionCardProps) -> Html {
    let expanded = use_state(|| false);
    let tabs = use_state(Vec::<Tab>::new);

    // Follow the collection's tabs in the store
    {
        let tabs = tabs.clone();
        let ctx = props.ctx.clone();

        use_effect_with(props.collection.clone(), move |collection| {
            tabs.set(collection.tabs.clone().unwrap_or_default());
            let watch = collection.id().map(|id| {
                let tabs = tabs.clone();
                ctx.0.store().watch_tabs(id, Rc::new(move |current: &[Tab]| tabs.set(current.to_vec())))
            });
            move || {
                if let Some(watch) = watch {
                    ctx.0.store().unwatch(watch);
                }
            }
        });
    }

    let toggle_expanded = {
        let expanded = expanded.clone();
        Callback::from(move |_| expanded.set(!*expanded))
    };

    let collection = &props.collection;
    let favicons = props.ctx.0.favicon_cache();

    html! {
        <div class="collection-card">
            <div class="collection-header">
                <div class="collection-title-container">
                    <h3 class="collection-title">{&collection.title}</h3>
                    <p class="collection-meta">
                        {format!(
                            "priority {} • {} tabs{}",
                            collection.priority,
                            tabs.len(),
                            if collection.allow_duplicates { " • duplicates allowed" } else { "" }
                        )}
                    </p>
                </div>

                <div class="collection-actions">
                    <Button onclick={toggle_expanded} variant={ButtonVariant::Secondary}>
                        {if *expanded { "▲ Collapse" } else { "▼ Expand" }}
                    </Button>
                    <Button
                        onclick={props.on_edit.reform({
                            let collection = collection.clone();
                            move |_| collection.clone()
                        })}
                        variant={ButtonVariant::Secondary}
                    >
                        {"Edit"}
                    </Button>
                    <Button
                        onclick={props.on_clear.reform({
                            let collection = collection.clone();
                            move |_| collection.clone()
                        })}
                        variant={ButtonVariant::Secondary}
                    >
                        {"Clear"}
                    </Button>
                    <Button
                        onclick={props.on_delete.reform({
                            let collection = collection.clone();
                            move |_| collection.clone()
                        })}
                        variant={ButtonVariant::Danger}
                    >
                        {"Delete"}
                    </Button>
                </div>
            </div>

            <ul class="filter-list">
                {for collection.original_filters().iter().map(|line| html! {
                    <li class={if line.starts_with('#') { "filter-comment" } else { "filter" }}>{line}</li>
                })}
            </ul>

            if *expanded {
                <div class="tabs-list">
                    {for tabs.iter().map(|tab| {
                        let favicon = favicons.and_then(|cache| tab.favicon.as_ref().and_then(|hash| cache.get(hash)));
                        html! {
                            <TabItem
                                key={tab.id.map(|id| id.to_string()).unwrap_or_else(|| tab.url.clone())}
                                tab={tab.clone()}
                                favicon={favicon}
                                on_delete={props.on_delete_tab.clone()}
                            />
                        }
                    })}
                </div>
            }
        </div>
    }
}
