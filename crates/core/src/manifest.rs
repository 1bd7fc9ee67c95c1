//! The elements manifest describing an exported bundle.
//!
//! ```xml
//! <ee4p>
//!   <group id="..." name="Demo">
//!     <element name="Intro" thumbMode="1" id="..."/>
//!   </group>
//! </ee4p>
//! ```
//!
//! Output is indented by two spaces, has no XML declaration and no trailing
//! newline. Attribute order is fixed: `id` then `name` on the group, `name`,
//! `thumbMode`, `id` on elements.

use crate::error::{Result, SplitError};
use crate::identity;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

pub const ROOT_TAG: &str = "ee4p";
pub const GROUP_TAG: &str = "group";
pub const ELEMENT_TAG: &str = "element";

/// Attributes every group must carry.
const GROUP_ATTRS: &[&str] = &["id", "name"];

/// Attributes every element must carry, in the order they are checked.
const ELEMENT_ATTRS: &[&str] = &["name", "thumbMode", "id"];

/// Thumbnail mode written on every element.
pub const THUMB_MODE: &str = "1";

/// One slide in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Display name.
    pub name: String,
    /// Shared stem of the slide's fragment and preview files.
    pub id: Uuid,
    pub thumb_mode: String,
}

impl ManifestEntry {
    /// Create an entry with the standard thumbnail mode.
    pub fn new(name: impl Into<String>, id: Uuid) -> Self {
        Self {
            name: name.into(),
            id,
            thumb_mode: THUMB_MODE.to_string(),
        }
    }
}

/// A group of exported slides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Derived from the group name, so re-exports target the same group.
    pub group_id: Uuid,
    pub group_name: String,
    /// Entries in slide order.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Manifest for `group_name` with entries in the given order.
    pub fn build(group_name: &str, entries: Vec<ManifestEntry>) -> Self {
        Self {
            group_id: identity::reproducible_id(group_name),
            group_name: group_name.to_string(),
            entries,
        }
    }

    /// Rename the group, re-deriving its identifier.
    pub fn rename_group(&mut self, name: &str) {
        self.group_id = identity::reproducible_id(name);
        self.group_name = name.to_string();
    }

    /// Add entries after the existing ones.
    pub fn append(&mut self, entries: impl IntoIterator<Item = ManifestEntry>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the manifest text format.
    pub fn to_xml(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len() + 4);
        lines.push(format!("<{}>", ROOT_TAG));

        let group_attrs = format!(
            "id=\"{}\" name=\"{}\"",
            self.group_id,
            escape_attr(&self.group_name)
        );
        if self.entries.is_empty() {
            lines.push(format!("  <{} {}/>", GROUP_TAG, group_attrs));
        } else {
            lines.push(format!("  <{} {}>", GROUP_TAG, group_attrs));
            for entry in &self.entries {
                lines.push(format!(
                    "    <{} name=\"{}\" thumbMode=\"{}\" id=\"{}\"/>",
                    ELEMENT_TAG,
                    escape_attr(&entry.name),
                    escape_attr(&entry.thumb_mode),
                    entry.id
                ));
            }
            lines.push(format!("  </{}>", GROUP_TAG));
        }

        lines.push(format!("</{}>", ROOT_TAG));
        lines.join("\n")
    }

    /// Write the manifest to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_xml())?;
        debug!("Wrote manifest with {} entries to {:?}", self.len(), path);
        Ok(())
    }

    /// Parse manifest text.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(SplitError::ManifestError(format!(
                "Root element is not '{}'",
                ROOT_TAG
            )));
        }

        let group = first_child(root, GROUP_TAG)
            .ok_or_else(|| SplitError::ManifestError("No group element found".to_string()))?;
        let group_id = parse_id(group, "group")?;
        let group_name = group.attribute("name").unwrap_or_default().to_string();

        let entries = group
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == ELEMENT_TAG)
            .map(|el| -> Result<ManifestEntry> {
                Ok(ManifestEntry {
                    name: el.attribute("name").unwrap_or_default().to_string(),
                    id: parse_id(el, "element")?,
                    thumb_mode: el.attribute("thumbMode").unwrap_or(THUMB_MODE).to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            group_id,
            group_name,
            entries,
        })
    }

    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }
}

fn first_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
}

fn parse_id(node: Node<'_, '_>, what: &str) -> Result<Uuid> {
    let raw = node
        .attribute("id")
        .ok_or_else(|| SplitError::ManifestError(format!("{} has no id", what)))?;
    Uuid::parse_str(raw)
        .map_err(|e| SplitError::ManifestError(format!("{} id '{}' is invalid: {}", what, raw, e)))
}

/// Escape text for a double-quoted attribute value.
pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

/// Outcome of a structural manifest check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub is_valid: bool,
    /// Human-readable explanation; `"Valid"` when the check passed.
    pub reason: String,
}

impl Validation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            reason: "Valid".to_string(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
        }
    }
}

/// Check a manifest file on disk.
pub fn validate(path: &Path) -> Validation {
    match std::fs::read_to_string(path) {
        Ok(xml) => validate_str(&xml),
        Err(e) => Validation::fail(format!("Cannot read manifest: {}", e)),
    }
}

/// Check manifest text: correct root, a group with `id` and `name`, and at
/// least one element where every element carries `name`, `thumbMode` and `id`.
pub fn validate_str(xml: &str) -> Validation {
    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => return Validation::fail(format!("XML parse error: {}", e)),
    };

    let root = doc.root_element();
    if root.tag_name().name() != ROOT_TAG {
        return Validation::fail(format!("Root element is not '{}'", ROOT_TAG));
    }

    let Some(group) = first_child(root, GROUP_TAG) else {
        return Validation::fail("No group element found");
    };
    for attr in GROUP_ATTRS {
        if group.attribute(*attr).is_none() {
            return Validation::fail(format!("Group missing required attribute '{}'", attr));
        }
    }

    let elements: Vec<_> = group
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == ELEMENT_TAG)
        .collect();
    if elements.is_empty() {
        return Validation::fail("No elements found in group");
    }

    for (i, el) in elements.iter().enumerate() {
        if let Some(attr) = ELEMENT_ATTRS.iter().find(|a| el.attribute(**a).is_none()) {
            return Validation::fail(format!(
                "Element {} missing required attribute '{}'",
                i + 1,
                attr
            ));
        }
    }

    Validation::ok()
}
