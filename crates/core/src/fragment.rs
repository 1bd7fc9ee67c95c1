//! Single-slide fragments and slide display names.
//!
//! A fragment is a structural copy of the whole package with every other
//! slide unlinked from the presentation and then garbage-collected, so the
//! kept slide retains its layout, master, theme and media.

use crate::config::OutputConfig;
use crate::error::{Result, SplitError};
use crate::package::{
    element_ranges, parse_relationships, rel_id_attr, rels_part_for, splice_out, Package,
    Presentation, Slide, CONTENT_TYPES_PART,
};
use roxmltree::Document;
use std::collections::HashSet;
use tracing::debug;

/// Derives fragments and display names from a loaded presentation.
#[derive(Debug, Clone)]
pub struct FragmentExtractor {
    title_max_chars: usize,
    display_name_max_chars: usize,
}

impl Default for FragmentExtractor {
    fn default() -> Self {
        Self::new(&OutputConfig::default())
    }
}

impl FragmentExtractor {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            title_max_chars: config.title_max_chars,
            display_name_max_chars: config.display_name_max_chars,
        }
    }

    /// Package containing only the slide at `ordinal` (1-based).
    ///
    /// The source presentation is left untouched.
    pub fn extract(&self, presentation: &Presentation, ordinal: usize) -> Result<Package> {
        self.try_extract(presentation, ordinal).map_err(|e| match e {
            SplitError::FragmentFailed { .. } => e,
            other => SplitError::FragmentFailed {
                ordinal,
                message: other.to_string(),
            },
        })
    }

    fn try_extract(&self, presentation: &Presentation, ordinal: usize) -> Result<Package> {
        let kept = presentation
            .slide(ordinal)
            .ok_or_else(|| SplitError::FragmentFailed {
                ordinal,
                message: format!(
                    "presentation has {} slides",
                    presentation.slide_count()
                ),
            })?;

        let dropped: Vec<&Slide> = presentation
            .slides()
            .iter()
            .rev()
            .filter(|s| s.ordinal != ordinal)
            .collect();
        let dropped_rel_ids: HashSet<&str> = dropped.iter().map(|s| s.rel_id.as_str()).collect();
        let dropped_slide_ids: HashSet<u32> = dropped.iter().map(|s| s.slide_id).collect();

        let mut package = presentation.package().clone();
        let main = presentation.main_part();

        let main_xml = unlink_slides(package.part_xml(main)?, &dropped_rel_ids, &dropped_slide_ids)?;
        package.insert_part(main, main_xml.into_bytes());

        let rels_name = rels_part_for(main);
        let rels_xml = remove_relationships(package.part_xml(&rels_name)?, &dropped_rel_ids)?;
        package.insert_part(&rels_name, rels_xml.into_bytes());

        let removed = package.prune_unreachable()?;
        if !removed.is_empty() {
            let types = remove_content_types(package.part_xml(CONTENT_TYPES_PART)?, &removed)?;
            package.insert_part(CONTENT_TYPES_PART, types.into_bytes());
        }

        if !package.contains(&kept.part_name) {
            return Err(SplitError::FragmentFailed {
                ordinal,
                message: format!("slide part {} was lost", kept.part_name),
            });
        }

        debug!(
            "Slide {} fragment: {} parts ({} removed)",
            ordinal,
            package.len(),
            removed.len()
        );
        Ok(package)
    }

    /// Human-readable name for a slide.
    ///
    /// The first shape with text that is either a placeholder or shorter than
    /// the title limit wins; whitespace is collapsed and long names end in
    /// `...`. Slides with no such shape are called `Slide N`.
    pub fn display_name(&self, slide: &Slide) -> String {
        slide
            .shapes
            .iter()
            .map(|shape| (shape, shape.text.trim()))
            .find(|(shape, text)| {
                !text.is_empty()
                    && (shape.is_placeholder || text.chars().count() < self.title_max_chars)
            })
            .map(|(_, text)| self.shorten(collapse_whitespace(text)))
            .unwrap_or_else(|| format!("Slide {}", slide.ordinal))
    }

    fn shorten(&self, title: String) -> String {
        let max = self.display_name_max_chars;
        if title.chars().count() <= max {
            return title;
        }
        // Too short for an ellipsis: plain cut.
        let keep = max.saturating_sub(ELLIPSIS.len());
        if keep == 0 {
            return title.chars().take(max).collect();
        }
        let head: String = title.chars().take(keep).collect();
        format!("{}{}", head, ELLIPSIS)
    }
}

const ELLIPSIS: &str = "...";

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every reference to dropped slides from the presentation part:
/// slide-list entries, custom-show entries and section-list slide ids.
fn unlink_slides(xml: &str, rel_ids: &HashSet<&str>, slide_ids: &HashSet<u32>) -> Result<String> {
    let doc = Document::parse(xml)?;
    let ranges = element_ranges(&doc, |node| match rel_id_attr(node) {
        Some(id) => rel_ids.contains(id),
        None => {
            node.tag_name().name() == "sldId"
                && node
                    .attribute("id")
                    .and_then(|v| v.parse::<u32>().ok())
                    .is_some_and(|id| slide_ids.contains(&id))
        }
    });
    Ok(splice_out(xml, ranges))
}

fn remove_relationships(xml: &str, rel_ids: &HashSet<&str>) -> Result<String> {
    // Fails early on a malformed part.
    parse_relationships(xml)?;
    let doc = Document::parse(xml)?;
    let ranges = element_ranges(&doc, |node| {
        node.tag_name().name() == "Relationship"
            && node.attribute("Id").is_some_and(|id| rel_ids.contains(id))
    });
    Ok(splice_out(xml, ranges))
}

fn remove_content_types(xml: &str, removed: &[String]) -> Result<String> {
    let removed: HashSet<String> = removed.iter().map(|n| n.to_ascii_lowercase()).collect();
    let doc = Document::parse(xml)?;
    let ranges = element_ranges(&doc, |node| {
        node.tag_name().name() == "Override"
            && node.attribute("PartName").is_some_and(|name| {
                removed.contains(&name.trim_start_matches('/').to_ascii_lowercase())
            })
    });
    Ok(splice_out(xml, ranges))
}
