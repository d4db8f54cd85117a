//! Secure-mode placeholder renderer.
//!
//! A placeholder is `$[[name]]`, optionally wrapped in matching quotes (the
//! whole quoted literal is then the placeholder). Each placeholder becomes a
//! slot reference `$<n>`; slot `n` is bound in a [`ParameterTable`] owned by
//! the caller. Parameter values never enter the source text, so a value that
//! itself looks like a placeholder is never expanded.

use once_cell::sync::Lazy;
use regex::Regex;
use scriptgate_core::{GateResult, ScriptError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Placeholder syntax, for messages and help output
pub const PLACEHOLDER_EXAMPLE: &str = "$[[name]]";

pub use scriptgate_core::Parameters;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\[\[\s*([A-Za-z_][A-Za-z0-9_]*)\s*\]\]").expect("placeholder pattern compiles")
});

/// One bound slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSlot {
    /// Logical parameter name
    pub name: String,
    /// Bound value; `None` when the caller supplied no value
    pub value: Option<Value>,
}

/// Caller-private slot table
///
/// Scripts can reach a slot only through a `$<n>` reference the renderer
/// wrote, and slots are read-only expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    slots: Vec<ParameterSlot>,
}

impl ParameterTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot index bound to `name`
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Iterate over slots in index order
    pub fn iter(&self) -> impl Iterator<Item = &ParameterSlot> {
        self.slots.iter()
    }

    /// Value of slot `index`
    ///
    /// # Errors
    ///
    /// Returns `KeyError` when the slot's parameter was not supplied, and
    /// `IndexError` for a slot outside the table
    pub fn lookup(&self, index: usize) -> GateResult<&Value> {
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| ScriptError::runtime("IndexError", format!("no parameter slot ${index}")))?;
        slot.value
            .as_ref()
            .ok_or_else(|| ScriptError::runtime("KeyError", format!("'{}'", slot.name)))
    }

    /// Bound values by name, skipping unbound slots
    #[must_use]
    pub fn to_parameters(&self) -> Parameters {
        self.slots
            .iter()
            .filter_map(|s| s.value.clone().map(|v| (s.name.clone(), v)))
            .collect()
    }

    fn bind(&mut self, name: &str, params: &Parameters) -> usize {
        if let Some(index) = self.slot_of(name) {
            return index;
        }
        self.slots.push(ParameterSlot {
            name: name.to_string(),
            value: params.get(name).cloned(),
        });
        self.slots.len() - 1
    }
}

/// Output of rendering: slot-referencing source plus its table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedScript {
    source: String,
    table: ParameterTable,
    slot_offsets: Vec<usize>,
}

impl RenderedScript {
    /// Rendered source text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Slot table
    #[must_use]
    pub fn table(&self) -> &ParameterTable {
        &self.table
    }

    /// Byte offsets in [`source`](Self::source) of the slot references the
    /// renderer wrote, ascending
    #[must_use]
    pub fn slot_offsets(&self) -> &[usize] {
        &self.slot_offsets
    }

    /// Split into source and table
    #[must_use]
    pub fn into_parts(self) -> (String, ParameterTable) {
        (self.source, self.table)
    }
}

/// Placeholder renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Create a renderer
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rewrite placeholders into slot references
    ///
    /// Placeholders inside comments or embedded in longer string literals
    /// are left as written. Names missing from `params` still get a slot;
    /// reading it raises `KeyError`.
    #[must_use]
    pub fn render(&self, source: &str, params: &Parameters) -> RenderedScript {
        let mut out = String::with_capacity(source.len());
        let mut table = ParameterTable::new();
        let mut slot_offsets = Vec::new();
        let bytes = source.as_bytes();
        let mut i = 0;

        while i < source.len() {
            let rest = &source[i..];
            match bytes[i] {
                b'#' => {
                    let end = rest.find('\n').map_or(source.len(), |n| i + n);
                    out.push_str(&source[i..end]);
                    i = end;
                }
                quote @ (b'\'' | b'"') => {
                    let end = string_literal_end(source, i, quote);
                    let literal = &source[i..end];
                    let prefixed = out
                        .chars()
                        .next_back()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_');
                    match quoted_placeholder(literal, quote) {
                        Some(name) if !prefixed => {
                            let slot = table.bind(name, params);
                            slot_offsets.push(out.len());
                            push_slot(&mut out, slot, &source[end..]);
                        }
                        _ => out.push_str(literal),
                    }
                    i = end;
                }
                b'$' => {
                    if let Some(caps) = PLACEHOLDER.captures(rest) {
                        let whole = caps.get(0).map_or(0, |m| m.end());
                        let name = caps.get(1).map_or("", |m| m.as_str());
                        let slot = table.bind(name, params);
                        slot_offsets.push(out.len());
                        push_slot(&mut out, slot, &rest[whole..]);
                        i += whole;
                    } else {
                        out.push('$');
                        i += 1;
                    }
                }
                _ => {
                    let c = rest.chars().next().map_or(1, char::len_utf8);
                    out.push_str(&rest[..c]);
                    i += c;
                }
            }
        }

        debug!(placeholders = slot_offsets.len(), slots = table.len(), "template rendered");
        RenderedScript {
            source: out,
            table,
            slot_offsets,
        }
    }
}

/// Emit `$n`, separated from a following identifier character
fn push_slot(out: &mut String, slot: usize, following: &str) {
    out.push('$');
    out.push_str(&slot.to_string());
    if following
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        out.push(' ');
    }
}

/// Byte offset just past the string literal starting at `start`
///
/// Unterminated literals run to the end of input; the compiler reports them.
fn string_literal_end(source: &str, start: usize, quote: u8) -> usize {
    let bytes = source.as_bytes();
    let triple = bytes.get(start + 1) == Some(&quote) && bytes.get(start + 2) == Some(&quote);
    let mut i = start + if triple { 3 } else { 1 };
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !triple => return i,
            b if b == quote => {
                if !triple {
                    return i + 1;
                }
                if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                    return i + 3;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Name of a placeholder that makes up the entire quoted literal
fn quoted_placeholder(literal: &str, quote: u8) -> Option<&str> {
    let q = quote as char;
    let inner = literal.strip_prefix(q)?.strip_suffix(q)?;
    if inner.starts_with(q) {
        return None;
    }
    let caps = PLACEHOLDER.captures(inner)?;
    if caps.get(0)?.end() != inner.len() {
        return None;
    }
    Some(caps.get(1)?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_bare_and_quoted_placeholders() {
        let p = params(&[("name", json!("bob")), ("limit", json!(10))]);
        let rendered = TemplateRenderer::new().render(
            "q = \"select * from t where n = '$[[name]]'\"\nx = '$[[name]]'\ny = $[[limit]]",
            &p,
        );
        assert_eq!(
            rendered.source(),
            "q = \"select * from t where n = '$[[name]]'\"\nx = $0\ny = $1"
        );
        assert_eq!(rendered.table().len(), 2);
        assert_eq!(rendered.table().lookup(0).unwrap(), &json!("bob"));
        assert_eq!(rendered.table().lookup(1).unwrap(), &json!(10));
    }

    #[test]
    fn test_repeated_name_shares_slot() {
        let p = params(&[("a", json!(1))]);
        let rendered = TemplateRenderer::new().render("x = $[[a]] + $[[ a ]]", &p);
        assert_eq!(rendered.source(), "x = $0 + $0");
        assert_eq!(rendered.table().len(), 1);
    }

    #[test]
    fn test_unbound_name_fails_at_lookup() {
        let rendered = TemplateRenderer::new().render("x = $[[missing]]", &Parameters::new());
        let err = rendered.table().lookup(0).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing'");
    }

    #[test]
    fn test_value_that_looks_like_placeholder_is_not_expanded() {
        let p = params(&[("a", json!("$[[b]]")), ("b", json!("secret"))]);
        let rendered = TemplateRenderer::new().render("x = $[[a]]", &p);
        assert_eq!(rendered.table().len(), 1);
        assert_eq!(rendered.table().lookup(0).unwrap(), &json!("$[[b]]"));
    }

    #[test]
    fn test_comments_untouched() {
        let rendered = TemplateRenderer::new().render("# uses $[[a]]\nx = 1", &Parameters::new());
        assert_eq!(rendered.source(), "# uses $[[a]]\nx = 1");
        assert!(rendered.table().is_empty());
    }

    #[test]
    fn test_slot_offsets_recorded() {
        let rendered = TemplateRenderer::new().render("x = $[[a]] + '$[[b]]' + $[[a]]  # $[[c]]", &Parameters::new());
        assert_eq!(rendered.source(), "x = $0 + $1 + $0  # $[[c]]");
        assert_eq!(rendered.slot_offsets(), &[4, 9, 14]);
        let written = TemplateRenderer::new().render("x = $0", &Parameters::new());
        assert!(written.slot_offsets().is_empty());
    }

    #[test]
    fn test_slot_separated_from_identifier() {
        let rendered = TemplateRenderer::new().render("x = $[[a]]if 1 else 2", &Parameters::new());
        assert_eq!(rendered.source(), "x = $0 if 1 else 2");
    }

    #[test]
    fn test_to_parameters_skips_unbound() {
        let p = params(&[("a", json!(1))]);
        let rendered = TemplateRenderer::new().render("x = ($[[a]], $[[b]])", &p);
        let bound = rendered.table().to_parameters();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound.get("a"), Some(&json!(1)));
    }

    proptest::proptest! {
        #[test]
        fn prop_render_is_idempotent(
            value in ".*",
            prefix in "[a-z =+(]{0,12}",
            suffix in "[a-z )+]{0,12}",
        ) {
            let p = params(&[("p", json!(value))]);
            let template = format!("{prefix}$[[p]]{suffix}");
            let once = TemplateRenderer::new().render(&template, &p);
            let twice = TemplateRenderer::new().render(once.source(), &Parameters::new());
            proptest::prop_assert_eq!(twice.source(), once.source());
            proptest::prop_assert!(twice.table().is_empty());
        }
    }
}
