use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::manager::PageManager;
use crate::capture::{CapturedEvent, EventSource};
use crate::error::Result;

const BINDING_NAME: &str = "__reenactCapture";

/// Injected into every document. Installs capture-phase listeners so events
/// are observed even when an inner handler stops propagation, filters out
/// interactions inside the engine's own control surface, and ships each event
/// over the CDP binding with the ancestor facts needed for selector
/// synthesis.
const CAPTURE_SCRIPT: &str = r#"
(() => {
    if (window.__reenactInstalled) { window.__reenactArmed = true; return true; }
    window.__reenactInstalled = true;
    window.__reenactArmed = true;

    const ALLOWED_KEYS = ['Enter', 'Tab', 'Escape', 'ArrowUp', 'ArrowDown', 'ArrowLeft', 'ArrowRight'];

    function send(event) {
        if (!window.__reenactArmed) return;
        if (typeof __reenactCapture === 'function') {
            __reenactCapture(JSON.stringify(event));
        }
    }

    function insideOwnUi(el) {
        return !!(el && el.closest && el.closest('[data-reenact-ui]'));
    }

    // Per-ancestor (tag, id, ordinal) facts, target first. The walk stops at
    // the first id because an id is treated as globally unique.
    function pathFacts(el) {
        const path = [];
        let node = el;
        while (node && node.nodeType === 1) {
            let ordinal = 1;
            let sib = node.previousElementSibling;
            while (sib) {
                if (sib.tagName === node.tagName) ordinal += 1;
                sib = sib.previousElementSibling;
            }
            const id = node.id || null;
            path.push({ tag: node.tagName.toLowerCase(), id: id, ordinal: ordinal });
            if (id) break;
            node = node.parentElement;
        }
        return path;
    }

    document.addEventListener('click', (e) => {
        const el = e.target;
        if (!el || insideOwnUi(el)) return;
        send({ kind: 'click', path: pathFacts(el), timestamp: Date.now() });
    }, true);

    document.addEventListener('change', (e) => {
        const el = e.target;
        if (!el || insideOwnUi(el)) return;
        const isCheck = el.type === 'checkbox' || el.type === 'radio';
        send({
            kind: 'change',
            path: pathFacts(el),
            value: isCheck ? String(el.checked) : (el.value !== undefined ? String(el.value) : ''),
            tag: el.tagName.toLowerCase(),
            timestamp: Date.now()
        });
    }, true);

    document.addEventListener('input', (e) => {
        const el = e.target;
        if (!el || insideOwnUi(el)) return;
        const editable = !!el.isContentEditable;
        send({
            kind: 'input',
            path: pathFacts(el),
            value: editable ? (el.textContent || '') : (el.value !== undefined ? String(el.value) : ''),
            tag: el.tagName.toLowerCase(),
            is_content_editable: editable,
            timestamp: Date.now()
        });
    }, true);

    document.addEventListener('keydown', (e) => {
        const el = e.target;
        if (!el || insideOwnUi(el)) return;
        if (!ALLOWED_KEYS.includes(e.key)) return;
        send({ kind: 'key', path: pathFacts(el), key: e.key, timestamp: Date.now() });
    }, true);

    return true;
})()
"#;

/// Production event source: the capture script reports interactions over a
/// CDP binding, re-armed on every navigation.
pub struct CdpEventSource {
    manager: Arc<PageManager>,
    event_sender: broadcast::Sender<CapturedEvent>,
    cancel_sender: broadcast::Sender<()>,
}

impl CdpEventSource {
    pub fn new(manager: Arc<PageManager>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            manager,
            event_sender: event_tx,
            cancel_sender: cancel_tx,
        }
    }
}

#[async_trait]
impl EventSource for CdpEventSource {
    async fn install(&self) -> Result<()> {
        let mut stream = self.manager.setup_event_binding(BINDING_NAME).await?;
        self.manager
            .add_script_on_new_document(CAPTURE_SCRIPT)
            .await?;
        // The registered script only covers future documents; arm the
        // current one directly.
        self.manager.evaluate(CAPTURE_SCRIPT).await?;

        let sender = self.event_sender.clone();
        let mut cancel_rx = self.cancel_sender.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        tracing::debug!("Capture binding pump cancelled");
                        break;
                    }
                    maybe_call = stream.next() => {
                        let Some(call) = maybe_call else {
                            tracing::debug!("CDP binding stream ended");
                            break;
                        };
                        if call.name != BINDING_NAME {
                            continue;
                        }
                        match serde_json::from_str::<CapturedEvent>(&call.payload) {
                            Ok(event) => {
                                let _ = sender.send(event);
                            }
                            Err(err) => {
                                tracing::warn!("Discarding malformed capture payload: {}", err);
                            }
                        }
                    }
                }
            }
        });

        tracing::info!("Capture listeners installed");
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        let _ = self.cancel_sender.send(());
        // Disarm rather than tear down: the new-document script persists, so
        // the flag gates delivery instead.
        self.manager
            .evaluate("window.__reenactArmed = false; true")
            .await?;
        tracing::info!("Capture listeners disarmed");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CapturedEvent> {
        self.event_sender.subscribe()
    }
}
