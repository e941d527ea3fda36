/// Reusable UI components

use yew::prelude::*;
use web_sys::{HtmlInputElement, HtmlSelectElement};
use patternfly_yew::prelude::*;
use crate::settings::{Setting, SettingKind, SettingValue};
use crate::tab_data::Tab;

#[derive(Properties, PartialEq)]
pub struct TabItemProps {
    pub tab: Tab,
    #[prop_or_default]
    pub favicon: Option<String>,
    pub on_delete: Callback<Tab>,
}

#[function_component(TabItem)]
pub fn tab_item(props: &TabItemProps) -> Html {
    let on_delete = {
        let tab = props.tab.clone();
        let on_delete = props.on_delete.clone();
        Callback::from(move |_| on_delete.emit(tab.clone()))
    };
    let label = props.tab.title.clone().unwrap_or_else(|| props.tab.url.clone());

    html! {
        <div class="tab-item">
            if let Some(src) = &props.favicon {
                <img class="tab-favicon" src={src.clone()} alt="" />
            }
            <a class="tab-link" href={props.tab.url.clone()} target="_blank" title={props.tab.url.clone()}>
                {label}
            </a>
            <Button onclick={on_delete} variant={ButtonVariant::Plain}>{"✕"}</Button>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct SettingFieldProps {
    pub key_name: &'static str,
    pub setting: Setting,
    pub on_change: Callback<(&'static str, SettingValue)>,
}

/// One renderer per setting kind
#[function_component(SettingField)]
pub fn setting_field(props: &SettingFieldProps) -> Html {
    let key = props.key_name;
    let emit = {
        let on_change = props.on_change.clone();
        move |value: SettingValue| on_change.emit((key, value))
    };

    let control = match &props.setting.kind {
        SettingKind::Bool => {
            let checked = props.setting.value().as_bool().unwrap_or(false);
            let onchange = Callback::from(move |e: Event| {
                if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                    emit(SettingValue::Bool(input.checked()));
                }
            });
            html! { <input type="checkbox" checked={checked} onchange={onchange} /> }
        }
        SettingKind::Number { min, max } => {
            let value = props.setting.value().as_number().unwrap_or(*min).to_string();
            let onchange = Callback::from(move |e: Event| {
                if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                    emit(SettingValue::Number(input.value_as_number()));
                }
            });
            let max = max.is_finite().then(|| max.to_string());
            html! { <input type="number" min={min.to_string()} max={max} value={value} onchange={onchange} /> }
        }
        SettingKind::String { max_length, .. } => {
            let value = props.setting.value().as_text().unwrap_or_default().to_string();
            let onchange = Callback::from(move |e: Event| {
                if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                    emit(SettingValue::Text(input.value()));
                }
            });
            html! { <input type="text" maxlength={max_length.to_string()} value={value} onchange={onchange} /> }
        }
        SettingKind::SingleValue { allowed } => {
            let current = props.setting.value().as_text().unwrap_or_default().to_string();
            let onchange = Callback::from(move |e: Event| {
                if let Some(select) = e.target_dyn_into::<HtmlSelectElement>() {
                    emit(SettingValue::Text(select.value()));
                }
            });
            html! {
                <select onchange={onchange}>
                    {for allowed.iter().map(|option| html! {
                        <option value={*option} selected={*option == current}>{*option}</option>
                    })}
                </select>
            }
        }
    };

    html! {
        <div class="setting-field">
            <label class="setting-name" title={props.setting.description}>
                {props.setting.name}
            </label>
            {control}
        </div>
    }
}
