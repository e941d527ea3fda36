/// Tab Collections - Chrome Extension that files tabs into rule-based collections
/// Built with Rust + WASM + Yew

pub mod chrome;
pub mod collection;
pub mod context;
pub mod error;
pub mod favicon;
pub mod filter;
pub mod import_export;
pub mod ingest;
pub mod matcher;
pub mod settings;
pub mod stability;
pub mod storage;
pub mod tab_data;
pub mod ui;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Validate one filter line; the error message describes why it does not compile
#[wasm_bindgen]
pub fn check_filter(line: &str) -> Result<(), JsValue> {
    filter::compile(line)
        .map(|_| ())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Stability of `url` against a single pattern filter, or -1 when the line
/// is a comment, invalid, or does not match
#[wasm_bindgen]
pub fn filter_stability(line: &str, url: &str) -> i32 {
    match filter::compile(line) {
        Ok(filter::FilterLine::Pattern(pattern)) if pattern.is_match(url) => {
            stability::stability(&pattern, url) as i32
        }
        _ => -1,
    }
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

// Start the Yew app for the collections page
#[wasm_bindgen]
pub fn start_collections_page() {
    yew::Renderer::<ui::collections::CollectionsPage>::new().render();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_stability() {
        assert_eq!(filter_stability("abc", "abc"), 0);
        assert_eq!(filter_stability("cat", "https://dogs.example"), -1);
        assert_eq!(filter_stability("# cat", "cat"), -1);
        assert_eq!(filter_stability("/(/", "("), -1);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod web_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_check_filter() {
        assert!(check_filter("/docs\\.rs/").is_ok());
        assert!(check_filter("# note").is_ok());
        assert!(check_filter("/(/").is_err());
    }
}
