/// UI module exports
pub mod collections;
pub mod components;
pub mod popup;

use crate::chrome::{load_settings, ChromeStore};
use crate::context::AppContext;
use crate::error::Result;

/// Settings are loaded before the context is built
pub(crate) async fn open_context() -> Result<AppContext<ChromeStore>> {
    let settings = load_settings().await?;
    AppContext::init(ChromeStore::new(), settings).await
}
