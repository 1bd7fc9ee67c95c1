//! In-memory presentation packages.
//!
//! A `.pptx` file is an OPC package: a zip of XML parts linked together by
//! relationship parts (`_rels/*.rels`). [`Package`] holds every part in
//! memory in its original order so a structural copy is a plain clone, and
//! [`Presentation`] layers the slide list and per-slide shape text on top.

use crate::error::{Result, SplitError};
use roxmltree::{Document, Node};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Part listing the content type of every other part.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Relationships of the package itself.
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";

/// A single named part of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part name without a leading slash, e.g. `ppt/slides/slide1.xml`.
    pub name: String,
    /// Raw part bytes.
    pub data: Vec<u8>,
}

/// An OPC package held in memory.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: Vec<Part>,
}

impl Package {
    /// Create an empty package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a package from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a package from any seekable zip stream.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(Part {
                name: entry.name().to_string(),
                data,
            });
        }

        Ok(Self { parts })
    }

    /// Read a package from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the package has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Part names in storage order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Stored spelling of `name`. Part names compare case-insensitively.
    pub fn find_part_name(&self, name: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.name.as_str())
    }

    /// Whether a part with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.find_part_name(name).is_some()
    }

    /// Raw bytes of a part.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.data.as_slice())
    }

    /// A part decoded as UTF-8 XML text, without a byte-order mark.
    pub fn part_xml(&self, name: &str) -> Result<&str> {
        let data = self.part(name).ok_or_else(|| SplitError::InvalidPackage {
            path: PathBuf::from(name),
            message: "part is missing".to_string(),
        })?;
        let text = std::str::from_utf8(data).map_err(|e| SplitError::InvalidPackage {
            path: PathBuf::from(name),
            message: format!("part is not UTF-8: {}", e),
        })?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
    }

    /// Insert a part, replacing any existing part of the same name in place.
    pub fn insert_part(&mut self, name: &str, data: Vec<u8>) {
        match self
            .parts
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Remove a part, returning it if present.
    pub fn remove_part(&mut self, name: &str) -> Option<Part> {
        let index = self
            .parts
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))?;
        Some(self.parts.remove(index))
    }

    /// Relationships declared by `source` (`""` for the package itself).
    ///
    /// A part without a relationship part has no relationships.
    pub fn relationships(&self, source: &str) -> Result<Vec<Relationship>> {
        let rels_name = rels_part_for(source);
        if !self.contains(&rels_name) {
            return Ok(Vec::new());
        }
        parse_relationships(self.part_xml(&rels_name)?)
    }

    /// Serialize the package as a zip stream, content types first.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let ordered = self
            .parts
            .iter()
            .filter(|p| p.name == CONTENT_TYPES_PART)
            .chain(self.parts.iter().filter(|p| p.name != CONTENT_TYPES_PART));

        for part in ordered {
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.data)?;
        }

        Ok(zip.finish()?)
    }

    /// Save the package to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = self.write_to(BufWriter::new(file))?;
        writer.flush()?;
        Ok(())
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Drop every part that cannot be reached from the package relationships.
    ///
    /// Content types, reachable parts and the relationship parts of reachable
    /// sources survive. Returns the names of removed parts.
    pub fn prune_unreachable(&mut self) -> Result<Vec<String>> {
        let mut keep: HashSet<String> = HashSet::new();
        keep.insert(CONTENT_TYPES_PART.to_ascii_lowercase());
        keep.insert(PACKAGE_RELS_PART.to_ascii_lowercase());

        let mut queue = VecDeque::from([String::new()]);
        while let Some(source) = queue.pop_front() {
            for rel in self.relationships(&source)? {
                if rel.external {
                    continue;
                }
                let target = resolve_target(&source, &rel.target);
                let Some(stored) = self.find_part_name(&target) else {
                    continue;
                };
                if keep.insert(stored.to_ascii_lowercase()) {
                    keep.insert(rels_part_for(stored).to_ascii_lowercase());
                    queue.push_back(stored.to_string());
                }
            }
        }

        let removed: Vec<String> = self
            .parts
            .iter()
            .filter(|p| !keep.contains(&p.name.to_ascii_lowercase()))
            .map(|p| p.name.clone())
            .collect();
        self.parts
            .retain(|p| keep.contains(&p.name.to_ascii_lowercase()));

        debug!("Pruned {} unreachable parts", removed.len());
        Ok(removed)
    }
}

/// One entry of a relationship part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship id, e.g. `rId3`.
    pub id: String,
    /// Relationship type URI.
    pub rel_type: String,
    /// Target as written, relative to the source part's directory.
    pub target: String,
    /// Whether the target lives outside the package.
    pub external: bool,
}

/// Name of the relationship part for `source` (`""` for the package).
pub fn rels_part_for(source: &str) -> String {
    if source.is_empty() {
        return PACKAGE_RELS_PART.to_string();
    }
    match source.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &source[..i], &source[i + 1..]),
        None => format!("_rels/{}.rels", source),
    }
}

/// Resolve a relationship target against its source part.
pub fn resolve_target(source: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or_default();

    let (mut segments, relative): (Vec<&str>, &str) = match target.strip_prefix('/') {
        Some(absolute) => (Vec::new(), absolute),
        None => {
            let mut base: Vec<&str> = source.split('/').collect();
            base.pop();
            (base, target)
        }
    };

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.retain(|s| !s.is_empty());
    segments.join("/")
}

/// Parse a relationship part.
pub fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let doc = Document::parse(xml)?;
    let rels = doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .map(|n| Relationship {
            id: n.attribute("Id").unwrap_or_default().to_string(),
            rel_type: n.attribute("Type").unwrap_or_default().to_string(),
            target: n.attribute("Target").unwrap_or_default().to_string(),
            external: n
                .attribute("TargetMode")
                .is_some_and(|m| m.eq_ignore_ascii_case("External")),
        })
        .collect();
    Ok(rels)
}

/// Relationship-id attribute (`r:id`) of an element, whatever its prefix.
pub(crate) fn rel_id_attr<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attributes()
        .find(|a| {
            a.name() == "id"
                && a
                    .namespace()
                    .is_some_and(|ns| ns.ends_with("/relationships"))
        })
        .map(|a| a.value())
}

/// Remove byte ranges from `text`, last range first so earlier offsets stay
/// valid. Ranges must not overlap.
pub(crate) fn splice_out(text: &str, mut ranges: Vec<Range<usize>>) -> String {
    ranges.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = text.to_string();
    for range in ranges {
        out.replace_range(range, "");
    }
    out
}

/// Ranges of the outermost elements matching `pred`, in document order.
pub(crate) fn element_ranges<F>(doc: &Document<'_>, mut pred: F) -> Vec<Range<usize>>
where
    F: FnMut(Node<'_, '_>) -> bool,
{
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        let range = node.range();
        // Nested inside something already removed.
        if ranges.last().is_some_and(|last| range.start < last.end) {
            continue;
        }
        if pred(node) {
            ranges.push(range);
        }
    }
    ranges
}

/// A top-level shape on a slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// Shape text, paragraphs joined with newlines.
    pub text: String,
    /// Whether the shape fills a layout placeholder (title, body, ...).
    pub is_placeholder: bool,
}

impl Shape {
    /// Create a shape.
    pub fn new(text: impl Into<String>, is_placeholder: bool) -> Self {
        Self {
            text: text.into(),
            is_placeholder,
        }
    }
}

/// One slide of a presentation.
#[derive(Debug, Clone)]
pub struct Slide {
    /// 1-based position in the deck.
    pub ordinal: usize,
    /// Numeric id from the slide list.
    pub slide_id: u32,
    /// Relationship id binding the slide to the presentation part.
    pub rel_id: String,
    /// Package part holding the slide.
    pub part_name: String,
    /// Top-level text-capable shapes in document order.
    pub shapes: Vec<Shape>,
}

/// A loaded presentation. Read-only for the duration of an export.
#[derive(Debug, Clone)]
pub struct Presentation {
    path: PathBuf,
    package: Package,
    main_part: String,
    slides: Vec<Slide>,
}

impl Presentation {
    /// Load a presentation file.
    pub fn open(path: &Path) -> Result<Self> {
        let package = Package::open(path).map_err(|e| invalid(path, e))?;
        Self::from_package(path, package)
    }

    /// Interpret an already-loaded package as a presentation.
    pub fn from_package(path: impl Into<PathBuf>, package: Package) -> Result<Self> {
        let path = path.into();
        Self::load(&path, package).map_err(|e| match e {
            SplitError::InvalidPackage { .. } => e,
            other => invalid(&path, other),
        })
    }

    fn load(path: &Path, package: Package) -> Result<Self> {
        let main_part = package
            .relationships("")?
            .into_iter()
            .find(|r| r.rel_type.ends_with("/officeDocument"))
            .map(|r| resolve_target("", &r.target))
            .and_then(|name| package.find_part_name(&name).map(str::to_string))
            .ok_or_else(|| SplitError::InvalidPackage {
                path: path.to_path_buf(),
                message: "no main presentation part".to_string(),
            })?;

        let main_rels = package.relationships(&main_part)?;
        let main_xml = package.part_xml(&main_part)?;
        let doc = Document::parse(main_xml)?;

        let mut slides = Vec::new();
        let slide_list = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "sldIdLst");

        if let Some(list) = slide_list {
            for entry in list
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "sldId")
            {
                let ordinal = slides.len() + 1;
                let rel_id = rel_id_attr(entry).ok_or_else(|| SplitError::InvalidPackage {
                    path: path.to_path_buf(),
                    message: format!("slide {} has no relationship id", ordinal),
                })?;
                let slide_id = entry
                    .attribute("id")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or_default();
                let rel = main_rels
                    .iter()
                    .find(|r| r.id == rel_id)
                    .ok_or_else(|| SplitError::InvalidPackage {
                        path: path.to_path_buf(),
                        message: format!("slide {} references unknown relationship {}", ordinal, rel_id),
                    })?;
                let part_name = package
                    .find_part_name(&resolve_target(&main_part, &rel.target))
                    .ok_or_else(|| SplitError::InvalidPackage {
                        path: path.to_path_buf(),
                        message: format!("slide {} part '{}' is missing", ordinal, rel.target),
                    })?
                    .to_string();
                let shapes = parse_slide_shapes(package.part_xml(&part_name)?)?;

                slides.push(Slide {
                    ordinal,
                    slide_id,
                    rel_id: rel_id.to_string(),
                    part_name,
                    shapes,
                });
            }
        }

        debug!("Loaded {:?} with {} slides", path, slides.len());

        Ok(Self {
            path: path.to_path_buf(),
            package,
            main_part,
            slides,
        })
    }

    /// Source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying package.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Name of the main presentation part.
    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    /// Slides in ordinal order.
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Number of slides.
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Slide at a 1-based ordinal.
    pub fn slide(&self, ordinal: usize) -> Option<&Slide> {
        ordinal.checked_sub(1).and_then(|i| self.slides.get(i))
    }
}

fn invalid(path: &Path, err: SplitError) -> SplitError {
    SplitError::InvalidPackage {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Read the top-level `sp` shapes of a slide part.
pub fn parse_slide_shapes(xml: &str) -> Result<Vec<Shape>> {
    let doc = Document::parse(xml)?;
    let Some(tree) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "spTree")
    else {
        return Ok(Vec::new());
    };

    let shapes = tree
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "sp")
        .map(|sp| Shape {
            text: shape_text(sp),
            is_placeholder: child(sp, "nvSpPr")
                .and_then(|n| child(n, "nvPr"))
                .and_then(|n| child(n, "ph"))
                .is_some(),
        })
        .collect();

    Ok(shapes)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn shape_text(sp: Node<'_, '_>) -> String {
    let Some(body) = child(sp, "txBody") else {
        return String::new();
    };

    body.children()
        .filter(|n| n.is_element() && n.tag_name().name() == "p")
        .map(|p| {
            let mut text = String::new();
            for node in p.descendants().filter(|n| n.is_element()) {
                match node.tag_name().name() {
                    "t" => text.push_str(node.text().unwrap_or_default()),
                    "br" => text.push('\n'),
                    _ => {}
                }
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n")
}
