//! Abstract automation backend capability.
//!
//! The engine never talks to a browser directly: every query and action goes
//! through the [`UiDriver`] trait, so implementations can be swapped (CDP,
//! WebDriver bridge, in-process fake). The crate ships [`MockDriver`], a
//! scriptable fake page used by the unit tests and the examples; the real
//! Chromium-backed implementation lives in the `browser` module behind the
//! `browser` feature.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::locator::Locator;
use crate::result::{SondarError, SondarResult};

/// Opaque reference to a resolved live element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Backend-assigned identifier, stable for the element's lifetime
    pub id: String,
    /// Element tag name, when the backend reports one
    pub tag_name: Option<String>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: None,
        }
    }

    /// Attach the element's tag name
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }
}

/// Backend capability consumed by the engine.
///
/// `resolve` reports a missing element as `Ok(None)`, not an error; errors
/// are reserved for backend faults (connection loss, stale references,
/// script failures). Polling callers treat both `Ok(None)` and `Err` as
/// "not yet" — see the waiter.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Resolve a locator to a live element, if one currently matches
    async fn resolve(&self, locator: &Locator) -> SondarResult<Option<ElementHandle>>;

    /// Whether the element is still attached to the rendered UI
    async fn is_present(&self, handle: &ElementHandle) -> SondarResult<bool>;

    /// Whether the element is rendered visibly
    async fn is_visible(&self, handle: &ElementHandle) -> SondarResult<bool>;

    /// Whether the element is present, visible and not obscured
    async fn is_clickable(&self, handle: &ElementHandle) -> SondarResult<bool>;

    /// Whether the element accepts input (no `disabled` state)
    async fn is_enabled(&self, handle: &ElementHandle) -> SondarResult<bool>;

    /// Read an attribute value, `None` when the attribute is absent
    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> SondarResult<Option<String>>;

    /// Native-style activation (simulated input event)
    async fn activate(&self, handle: &ElementHandle) -> SondarResult<()>;

    /// Script-driven activation, bypassing simulated input
    async fn synthetic_activate(&self, handle: &ElementHandle) -> SondarResult<()>;

    /// Type text into the element
    async fn type_text(&self, handle: &ElementHandle, text: &str) -> SondarResult<()>;

    /// Assign the element's scroll offset. Backends clamp to the scrollable
    /// extent, so an oversized value means "scroll to the end".
    async fn set_scroll_offset(&self, handle: &ElementHandle, offset: f64) -> SondarResult<()>;

    /// Advance the element's scroll offset by a relative delta
    async fn scroll_by(&self, handle: &ElementHandle, delta: f64) -> SondarResult<()>;

    /// Move the synthetic pointer onto the element
    async fn move_pointer_to(&self, handle: &ElementHandle) -> SondarResult<()>;

    /// Evaluate an expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> SondarResult<Value>;
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// How a mock toggle surface routes activations to its state holder
#[derive(Debug, Clone)]
struct ToggleWiring {
    /// Element whose `checked` state flips (may be the surface itself)
    target: String,
    /// Whether a synthetic activation flips the state
    on_synthetic: bool,
    /// Whether a native activation flips the state
    on_native: bool,
}

/// A scripted element inside [`MockDriver`]'s fake page
#[derive(Debug, Clone)]
pub struct MockElement {
    id: String,
    tag_name: Option<String>,
    matchers: Vec<Locator>,
    appears_after: Duration,
    visible: bool,
    obscured_for: Option<Duration>,
    enabled_after: Duration,
    enabled_at_offset: Option<(String, f64)>,
    attributes: HashMap<String, String>,
    attribute_removals: Vec<(String, Duration)>,
    attribute_changes: Vec<(String, String, Duration)>,
    mounts_at_offset: Option<(String, f64)>,
    failing_probes: u32,
    pointer_faults: u32,
    checked: Option<bool>,
    toggle: Option<ToggleWiring>,
    scroll_offset: f64,
    scroll_extent: f64,
}

impl MockElement {
    /// Create a visible element that is present immediately
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: None,
            matchers: Vec::new(),
            appears_after: Duration::ZERO,
            visible: true,
            obscured_for: None,
            enabled_after: Duration::ZERO,
            enabled_at_offset: None,
            attributes: HashMap::new(),
            attribute_removals: Vec::new(),
            attribute_changes: Vec::new(),
            mounts_at_offset: None,
            failing_probes: 0,
            pointer_faults: 0,
            checked: None,
            toggle: None,
            scroll_offset: 0.0,
            scroll_extent: 1_000_000.0,
        }
    }

    /// Register a locator this element answers to (repeatable)
    #[must_use]
    pub fn matched_by(mut self, locator: Locator) -> Self {
        self.matchers.push(locator);
        self
    }

    /// Set the element's tag name
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }

    /// Element only appears this long after the driver is created
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Render the element invisibly
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Element is covered by another surface for this long
    #[must_use]
    pub const fn obscured_for(mut self, duration: Duration) -> Self {
        self.obscured_for = Some(duration);
        self
    }

    /// Element only becomes enabled this long after creation
    #[must_use]
    pub const fn enabled_after(mut self, delay: Duration) -> Self {
        self.enabled_after = delay;
        self
    }

    /// Element only becomes enabled once the given host has been scrolled
    /// at least this far
    #[must_use]
    pub fn enabled_at_offset(mut self, host: impl Into<String>, offset: f64) -> Self {
        self.enabled_at_offset = Some((host.into(), offset));
        self
    }

    /// Set an attribute present from the start
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Schedule an attribute to disappear at the given time
    #[must_use]
    pub fn attribute_removed_after(mut self, name: impl Into<String>, at: Duration) -> Self {
        self.attribute_removals.push((name.into(), at));
        self
    }

    /// Schedule an attribute to change value at the given time
    #[must_use]
    pub fn attribute_set_after(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        at: Duration,
    ) -> Self {
        self.attribute_changes.push((name.into(), value.into(), at));
        self
    }

    /// Element is windowed: it only mounts once the given host's scroll
    /// offset reaches `offset`
    #[must_use]
    pub fn mounts_at_offset(mut self, host: impl Into<String>, offset: f64) -> Self {
        self.mounts_at_offset = Some((host.into(), offset));
        self
    }

    /// First `n` resolutions of this element fail with a stale-reference
    /// fault before succeeding
    #[must_use]
    pub const fn failing_probes(mut self, n: u32) -> Self {
        self.failing_probes = n;
        self
    }

    /// First `n` pointer moves onto this element fail
    #[must_use]
    pub const fn pointer_faults(mut self, n: u32) -> Self {
        self.pointer_faults = n;
        self
    }

    /// Give the element a semantic boolean state
    #[must_use]
    pub fn checked(mut self, value: bool) -> Self {
        self.checked = Some(value);
        if value {
            self.attributes.insert("checked".to_string(), String::new());
        }
        self
    }

    /// Wire activations on this element to flip `target`'s checked state
    #[must_use]
    pub fn toggles(
        mut self,
        target: impl Into<String>,
        on_synthetic: bool,
        on_native: bool,
    ) -> Self {
        self.toggle = Some(ToggleWiring {
            target: target.into(),
            on_synthetic,
            on_native,
        });
        self
    }

    /// Cap for scroll offset assignment (the scrollable extent)
    #[must_use]
    pub const fn scroll_extent(mut self, extent: f64) -> Self {
        self.scroll_extent = extent;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    elements: Vec<MockElement>,
    calls: Vec<String>,
    eval_values: HashMap<String, Value>,
    checked_bindings: HashMap<String, String>,
}

/// Scriptable fake page for unit testing the engine.
///
/// Element timing is driven by the tokio clock, so tests running under
/// `#[tokio::test(start_paused = true)]` get deterministic virtual time.
#[derive(Debug)]
pub struct MockDriver {
    epoch: Instant,
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create an empty fake page; the clock starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add a scripted element
    pub fn add_element(&mut self, element: MockElement) {
        self.state.lock().unwrap().elements.push(element);
    }

    /// Script a fixed result for an `evaluate` expression
    pub fn script_eval(&mut self, expression: impl Into<String>, value: Value) {
        self.state
            .lock()
            .unwrap()
            .eval_values
            .insert(expression.into(), value);
    }

    /// Bind an `evaluate` expression to an element's live checked state
    pub fn bind_checked_expression(
        &mut self,
        expression: impl Into<String>,
        element_id: impl Into<String>,
    ) {
        self.state
            .lock()
            .unwrap()
            .checked_bindings
            .insert(expression.into(), element_id.into());
    }

    /// Full call history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Whether any recorded call starts with the prefix
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .any(|c| c.starts_with(prefix))
    }

    /// Number of recorded calls starting with the prefix
    #[must_use]
    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Current scroll offset of an element, if it exists
    #[must_use]
    pub fn scroll_offset_of(&self, id: &str) -> Option<f64> {
        self.state
            .lock()
            .unwrap()
            .elements
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.scroll_offset)
    }

    /// Current checked state of an element, if it has one
    #[must_use]
    pub fn checked_state_of(&self, id: &str) -> Option<bool> {
        self.state
            .lock()
            .unwrap()
            .elements
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.checked)
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Mounted = appearance time reached and, for windowed elements, the host
/// scrolled far enough. Computed against the full element list so windowed
/// items can consult their host's offset.
fn is_mounted(elements: &[MockElement], element: &MockElement, now: Duration) -> bool {
    if now < element.appears_after {
        return false;
    }
    match &element.mounts_at_offset {
        None => true,
        Some((host_id, min_offset)) => elements
            .iter()
            .find(|e| &e.id == host_id)
            .is_some_and(|host| host.scroll_offset >= *min_offset),
    }
}

fn attribute_at(element: &MockElement, name: &str, now: Duration) -> Option<String> {
    if element
        .attribute_removals
        .iter()
        .any(|(n, at)| n == name && now >= *at)
    {
        return None;
    }
    if let Some((_, value, _)) = element
        .attribute_changes
        .iter()
        .filter(|(n, _, at)| n == name && now >= *at)
        .last()
    {
        return Some(value.clone());
    }
    element.attributes.get(name).cloned()
}

fn flip_checked(state: &mut MockState, target_id: &str) {
    if let Some(target) = state.elements.iter_mut().find(|e| e.id == target_id) {
        let next = !target.checked.unwrap_or(false);
        target.checked = Some(next);
        if next {
            target.attributes.insert("checked".to_string(), String::new());
        } else {
            target.attributes.remove("checked");
        }
    }
}

impl MockState {
    fn find(&self, id: &str) -> SondarResult<&MockElement> {
        self.elements
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| SondarError::backend(format!("unknown element handle: {id}")))
    }
}

#[async_trait]
impl UiDriver for MockDriver {
    async fn resolve(&self, locator: &Locator) -> SondarResult<Option<ElementHandle>> {
        let now = self.now();
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("resolve:{locator}"));

        let index = state
            .elements
            .iter()
            .position(|e| e.matchers.contains(locator) && is_mounted(&state.elements, e, now));
        let Some(index) = index else {
            return Ok(None);
        };

        if state.elements[index].failing_probes > 0 {
            state.elements[index].failing_probes -= 1;
            let id = state.elements[index].id.clone();
            return Err(SondarError::backend(format!(
                "stale element reference: {id}"
            )));
        }

        let element = &state.elements[index];
        let mut handle = ElementHandle::new(element.id.clone());
        handle.tag_name = element.tag_name.clone();
        Ok(Some(handle))
    }

    async fn is_present(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let now = self.now();
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .find(|e| e.id == handle.id)
            .is_some_and(|e| is_mounted(&state.elements, e, now)))
    }

    async fn is_visible(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let now = self.now();
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .find(|e| e.id == handle.id)
            .is_some_and(|e| is_mounted(&state.elements, e, now) && e.visible))
    }

    async fn is_clickable(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let now = self.now();
        let state = self.state.lock().unwrap();
        Ok(state.elements.iter().find(|e| e.id == handle.id).is_some_and(
            |e| {
                is_mounted(&state.elements, e, now)
                    && e.visible
                    && e.obscured_for.map_or(true, |until| now >= until)
            },
        ))
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let now = self.now();
        let state = self.state.lock().unwrap();
        let element = state.find(&handle.id)?;
        if now < element.enabled_after {
            return Ok(false);
        }
        if attribute_at(element, "disabled", now).is_some() {
            return Ok(false);
        }
        let scrolled_enough = match &element.enabled_at_offset {
            None => true,
            Some((host_id, min_offset)) => state
                .elements
                .iter()
                .find(|e| &e.id == host_id)
                .is_some_and(|host| host.scroll_offset >= *min_offset),
        };
        Ok(scrolled_enough)
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> SondarResult<Option<String>> {
        let now = self.now();
        let state = self.state.lock().unwrap();
        let element = state.find(&handle.id)?;
        Ok(attribute_at(element, name, now))
    }

    async fn activate(&self, handle: &ElementHandle) -> SondarResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("activate:{}", handle.id));
        let wiring = state.find(&handle.id)?.toggle.clone();
        if let Some(wiring) = wiring {
            if wiring.on_native {
                flip_checked(&mut state, &wiring.target);
            }
        }
        Ok(())
    }

    async fn synthetic_activate(&self, handle: &ElementHandle) -> SondarResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("synthetic_activate:{}", handle.id));
        let wiring = state.find(&handle.id)?.toggle.clone();
        if let Some(wiring) = wiring {
            if wiring.on_synthetic {
                flip_checked(&mut state, &wiring.target);
            }
        }
        Ok(())
    }

    async fn type_text(&self, handle: &ElementHandle, text: &str) -> SondarResult<()> {
        self.record(format!("type_text:{}:{text}", handle.id));
        Ok(())
    }

    async fn set_scroll_offset(&self, handle: &ElementHandle, offset: f64) -> SondarResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("set_scroll_offset:{}:{offset}", handle.id));
        let element = state
            .elements
            .iter_mut()
            .find(|e| e.id == handle.id)
            .ok_or_else(|| SondarError::backend(format!("unknown element handle: {}", handle.id)))?;
        element.scroll_offset = offset.min(element.scroll_extent).max(0.0);
        Ok(())
    }

    async fn scroll_by(&self, handle: &ElementHandle, delta: f64) -> SondarResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("scroll_by:{}:{delta}", handle.id));
        let element = state
            .elements
            .iter_mut()
            .find(|e| e.id == handle.id)
            .ok_or_else(|| SondarError::backend(format!("unknown element handle: {}", handle.id)))?;
        element.scroll_offset = (element.scroll_offset + delta)
            .min(element.scroll_extent)
            .max(0.0);
        Ok(())
    }

    async fn move_pointer_to(&self, handle: &ElementHandle) -> SondarResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("move_pointer_to:{}", handle.id));
        if let Some(element) = state.elements.iter_mut().find(|e| e.id == handle.id) {
            if element.pointer_faults > 0 {
                element.pointer_faults -= 1;
                return Err(SondarError::backend(format!(
                    "pointer move failed: {}",
                    handle.id
                )));
            }
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> SondarResult<Value> {
        let state = self.state.lock().unwrap();
        if let Some(element_id) = state.checked_bindings.get(expression) {
            let checked = state
                .elements
                .iter()
                .find(|e| &e.id == element_id)
                .and_then(|e| e.checked)
                .unwrap_or(false);
            return Ok(Value::Bool(checked));
        }
        state
            .eval_values
            .get(expression)
            .cloned()
            .ok_or_else(|| SondarError::backend(format!("unscripted expression: {expression}")))
    }
}

// =============================================================================
// TESTS
// =============================================================================
