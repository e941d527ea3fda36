/// Popup UI: send the selected tabs to their collections
use yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use patternfly_yew::prelude::*;
use crate::chrome::{close_tabs, open_collections_page, selected_tabs};
use crate::error::Result;
use crate::ingest::{Outcome, Rejection};
use crate::tab_data::RawTab;
use super::open_context;

#[derive(Clone, PartialEq)]
enum AppState {
    Idle,
    Loading(String),
    Done(SendSummary),
    Error(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct SendSummary {
    saved: usize,
    unmatched: usize,
    ambiguous: usize,
    duplicates: usize,
    closed: usize,
}

impl SendSummary {
    fn new(outcomes: &[Outcome]) -> Self {
        let mut summary = SendSummary::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Routed(_) => summary.saved += 1,
                Outcome::Rejected(Rejection::NoMatch) => summary.unmatched += 1,
                Outcome::Rejected(Rejection::AmbiguousMatch) => summary.ambiguous += 1,
                Outcome::Rejected(Rejection::DuplicateNotAllowed) => summary.duplicates += 1,
            }
        }
        summary
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("{} tab(s) saved", self.saved)];
        if self.unmatched > 0 {
            lines.push(format!("{} matched no collection", self.unmatched));
        }
        if self.ambiguous > 0 {
            lines.push(format!("{} matched several collections", self.ambiguous));
        }
        if self.duplicates > 0 {
            lines.push(format!("{} already saved", self.duplicates));
        }
        if self.closed > 0 {
            lines.push(format!("{} tab(s) closed", self.closed));
        }
        lines
    }
}

/// Route the highlighted tabs and close the saved ones when the setting asks for it
async fn send_selected_tabs() -> Result<SendSummary> {
    let ctx = open_context().await?;
    let tabs = selected_tabs().await?;
    let raws: Vec<RawTab> = tabs.iter().map(|t| t.to_raw()).collect();

    let outcomes = ctx.send_tabs(&raws).await?;
    let mut summary = SendSummary::new(&outcomes);

    if ctx.settings().close_when_sending() {
        let saved_ids: Vec<i32> = tabs
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.is_routed())
            .map(|(tab, _)| tab.id)
            .collect();
        close_tabs(&saved_ids).await?;
        summary.closed = saved_ids.len();
    }

    if let Err(e) = ctx.cleanup_favicons_now().await {
        log::error!("Favicon cleanup failed: {}", e);
    }
    Ok(summary)
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Idle);

    let on_send = {
        let state = state.clone();

        Callback::from(move |_| {
            let state = state.clone();
            state.set(AppState::Loading("Sending tabs...".to_string()));

            spawn_local(async move {
                match send_selected_tabs().await {
                    Ok(summary) => state.set(AppState::Done(summary)),
                    Err(e) => {
                        log::error!("Sending tabs failed: {}", e);
                        state.set(AppState::Error(format!("Failed to send tabs: {}", e)));
                    }
                }
            });
        })
    };

    let on_open_collections = {
        let state = state.clone();
        Callback::from(move |_| {
            let state = state.clone();
            spawn_local(async move {
                if let Err(e) = open_collections_page().await {
                    state.set(AppState::Error(e.to_string()));
                }
            });
        })
    };

    let is_busy = matches!(*state, AppState::Loading(_));

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Tab Collections"}</h1>

            {match &*state {
                AppState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                AppState::Done(summary) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Success} title={"Done"} inline={true}>
                            {for summary.lines().into_iter().map(|line| html! { <p>{line}</p> })}
                        </Alert>
                    </div>
                },
                AppState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                AppState::Idle => html! {}
            }}

            <div class="flex-column-gap">
                <Button onclick={on_send} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                    {"Send selected tabs"}
                </Button>
                <Button onclick={on_open_collections} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {"Open collections"}
                </Button>
            </div>

            <p class="footer-popup">
                {concat!("Tab Collections v", env!("CARGO_PKG_VERSION"))}
            </p>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab_data::CollectionId;

    #[test]
    fn test_summary_counts_outcomes() {
        let outcomes = vec![
            Outcome::Routed(CollectionId::new()),
            Outcome::Routed(CollectionId::new()),
            Outcome::Rejected(Rejection::NoMatch),
            Outcome::Rejected(Rejection::DuplicateNotAllowed),
        ];

        let summary = SendSummary::new(&outcomes);

        assert_eq!(summary.saved, 2);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.lines(), vec!["2 tab(s) saved", "1 matched no collection", "1 already saved"]);
    }
}
