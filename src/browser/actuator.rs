use async_trait::async_trait;
use std::sync::Arc;

use super::manager::PageManager;
use crate::error::{EngineError, Result};
use crate::models::coerce_checked;
use crate::playback::{Actuator, PageSnapshot};

/// Production actuator: step effects are applied by JS evaluated in the
/// page, querying by the compiled locator and dispatching bubbling synthetic
/// events.
pub struct CdpActuator {
    manager: Arc<PageManager>,
}

impl CdpActuator {
    pub fn new(manager: Arc<PageManager>) -> Self {
        Self { manager }
    }

    /// JS that resolves `el` from the locator candidates, treating a
    /// malformed locator as a miss and trying the next candidate.
    fn resolve_prelude(selector: &str) -> Result<String> {
        let candidates = serde_json::to_string(&[selector])
            .map_err(|e| EngineError::Browser(format!("Failed to encode selector: {}", e)))?;
        Ok(format!(
            r#"const candidates = {candidates};
let el = null;
for (const loc of candidates) {{
    try {{
        el = loc.startsWith('//')
            ? document.evaluate(loc, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue
            : document.querySelector(loc);
    }} catch (err) {{
        el = null;
    }}
    if (el) break;
}}"#
        ))
    }

    /// Resolve the element and run `effect` on it. Returns false when the
    /// element vanished between the existence probe and the effect.
    async fn apply(&self, selector: &str, effect: &str) -> Result<()> {
        let prelude = Self::resolve_prelude(selector)?;
        let script = format!(
            r#"(() => {{
{prelude}
if (!el) return false;
{effect}
return true;
}})()"#
        );
        let applied = self.manager.evaluate(&script).await?;
        if applied.as_bool() != Some(true) {
            tracing::debug!("Element vanished before effect: {}", selector);
        }
        Ok(())
    }

    fn encode(value: &str) -> Result<String> {
        serde_json::to_string(value)
            .map_err(|e| EngineError::Browser(format!("Failed to encode value: {}", e)))
    }
}

#[async_trait]
impl Actuator for CdpActuator {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let value = self
            .manager
            .evaluate(
                "({ url: location.href, title: document.title, ready_state: document.readyState })",
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Browser(format!("Failed to read page status: {}", e)))
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let prelude = Self::resolve_prelude(selector)?;
        let script = format!(
            r#"(() => {{
{prelude}
return !!el;
}})()"#
        );
        let value = self.manager.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.apply(selector, "el.click();").await
    }

    async fn set_value(&self, selector: &str, value: &str, _tag_name: &str) -> Result<()> {
        let value = Self::encode(value)?;
        let effect = format!(
            r#"const value = {value};
if (el.tagName === 'SELECT') {{
    el.value = value;
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
}} else {{
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    el.dispatchEvent(new Event('blur', {{ bubbles: true }}));
}}"#
        );
        self.apply(selector, &effect).await
    }

    async fn type_text(
        &self,
        selector: &str,
        value: &str,
        is_content_editable: bool,
    ) -> Result<()> {
        let checked = coerce_checked(value);
        let value = Self::encode(value)?;
        let effect = format!(
            r#"const value = {value};
if ({is_content_editable}) {{
    el.focus();
    el.textContent = value;
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    el.dispatchEvent(new Event('blur', {{ bubbles: true }}));
}} else if (el.type === 'checkbox' || el.type === 'radio') {{
    el.checked = {checked};
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
}} else {{
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    el.dispatchEvent(new Event('blur', {{ bubbles: true }}));
}}"#
        );
        self.apply(selector, &effect).await
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let key = Self::encode(key)?;
        let effect = format!(
            r#"const key = {key};
el.dispatchEvent(new KeyboardEvent('keydown', {{ key: key, bubbles: true }}));
el.dispatchEvent(new KeyboardEvent('keyup', {{ key: key, bubbles: true }}));"#
        );
        self.apply(selector, &effect).await
    }

    async fn current_url(&self) -> Result<String> {
        self.manager.current_url().await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.manager.navigate(url).await
    }
}
