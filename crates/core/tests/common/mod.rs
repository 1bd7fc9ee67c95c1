//! Synthetic presentation decks for tests and benches.
//!
//! Decks are assembled part by part with the `zip` crate: content types,
//! package and presentation relationships, one master, one layout, one theme,
//! a section list covering every slide, and the slides themselves with their
//! own media.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const NS_DECL: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// One text shape on a slide.
#[derive(Debug, Clone)]
pub struct ShapeSpec {
    pub text: String,
    pub placeholder: bool,
}

/// One slide of a synthetic deck.
#[derive(Debug, Clone, Default)]
pub struct SlideSpec {
    pub shapes: Vec<ShapeSpec>,
    pub with_image: bool,
}

/// Builder for small but structurally complete decks.
#[derive(Debug, Clone, Default)]
pub struct DeckBuilder {
    slides: Vec<SlideSpec>,
}

impl DeckBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slide with a single title placeholder and a picture.
    pub fn titled(self, title: &str) -> Self {
        self.slide(SlideSpec {
            shapes: vec![ShapeSpec {
                text: title.to_string(),
                placeholder: true,
            }],
            with_image: true,
        })
    }

    /// Slide with no text at all.
    pub fn blank(self) -> Self {
        self.slide(SlideSpec::default())
    }

    /// Slide with arbitrary shapes: `(text, is_placeholder)`.
    pub fn shapes(self, shapes: &[(&str, bool)]) -> Self {
        self.slide(SlideSpec {
            shapes: shapes
                .iter()
                .map(|(text, placeholder)| ShapeSpec {
                    text: text.to_string(),
                    placeholder: *placeholder,
                })
                .collect(),
            with_image: false,
        })
    }

    pub fn slide(mut self, spec: SlideSpec) -> Self {
        self.slides.push(spec);
        self
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Every part of the deck as `(name, contents)`.
    pub fn parts(&self) -> Vec<(String, Vec<u8>)> {
        let n = self.slides.len();
        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
        let mut push = |name: &str, data: String| parts.push((name.to_string(), data.into_bytes()));

        push("[Content_Types].xml", self.content_types());
        push(
            "_rels/.rels",
            rels(&[("rId1", "officeDocument", "ppt/presentation.xml")]),
        );
        push("ppt/presentation.xml", self.presentation());

        let mut pres_rels = vec![("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string())];
        for i in 1..=n {
            pres_rels.push((format!("rId{}", i + 1), "slide", format!("slides/slide{}.xml", i)));
        }
        pres_rels.push((format!("rId{}", n + 2), "theme", "theme/theme1.xml".to_string()));
        let borrowed: Vec<(&str, &str, &str)> = pres_rels
            .iter()
            .map(|(id, t, target)| (id.as_str(), *t, target.as_str()))
            .collect();
        push("ppt/_rels/presentation.xml.rels", rels(&borrowed));

        push(
            "ppt/slideMasters/slideMaster1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sldMaster {NS_DECL}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
            ),
        );
        push(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "theme", "../theme/theme1.xml"),
            ]),
        );
        push(
            "ppt/slideLayouts/slideLayout1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sldLayout {NS_DECL} type="title"><p:cSld name="Title Slide"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld></p:sldLayout>"#
            ),
        );
        push(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]),
        );
        push(
            "ppt/theme/theme1.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements/></a:theme>"#.to_string(),
        );

        for (i, slide) in self.slides.iter().enumerate() {
            let number = i + 1;
            push(&format!("ppt/slides/slide{}.xml", number), slide_xml(slide));
            let mut slide_rels = vec![("rId1".to_string(), "slideLayout", "../slideLayouts/slideLayout1.xml".to_string())];
            if slide.with_image {
                slide_rels.push(("rId2".to_string(), "image", format!("../media/image{}.png", number)));
            }
            let borrowed: Vec<(&str, &str, &str)> = slide_rels
                .iter()
                .map(|(id, t, target)| (id.as_str(), *t, target.as_str()))
                .collect();
            push(&format!("ppt/slides/_rels/slide{}.xml.rels", number), rels(&borrowed));
        }

        for (i, slide) in self.slides.iter().enumerate() {
            if slide.with_image {
                parts.push((
                    format!("ppt/media/image{}.png", i + 1),
                    format!("image-bytes-{}", i + 1).into_bytes(),
                ));
            }
        }

        parts
    }

    /// Zip the deck into bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in self.parts() {
            zip.start_file(name, options).unwrap();
            zip.write_all(&data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Write the deck to `dir/name` and return the path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    fn content_types(&self) -> String {
        let mut overrides = vec![
            ("/ppt/presentation.xml", "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml".to_string()),
            ("/ppt/slideMasters/slideMaster1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml".to_string()),
            ("/ppt/slideLayouts/slideLayout1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml".to_string()),
            ("/ppt/theme/theme1.xml", "application/vnd.openxmlformats-officedocument.theme+xml".to_string()),
        ]
        .into_iter()
        .map(|(p, t)| (p.to_string(), t))
        .collect::<Vec<_>>();
        for i in 1..=self.slides.len() {
            overrides.push((
                format!("/ppt/slides/slide{}.xml", i),
                "application/vnd.openxmlformats-officedocument.presentationml.slide+xml".to_string(),
            ));
        }

        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/>"#,
        );
        for (part, content_type) in overrides {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                part, content_type
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    fn presentation(&self) -> String {
        let n = self.slides.len();
        let slide_ids: String = (1..=n)
            .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + i, i + 1))
            .collect();
        let section_ids: String = (1..=n)
            .map(|i| format!(r#"<p14:sldId id="{}"/>"#, 255 + i))
            .collect();
        let slide_list = if n == 0 {
            String::new()
        } else {
            format!("<p:sldIdLst>{}</p:sldIdLst>", slide_ids)
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation {NS_DECL}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>{slide_list}<p:sldSz cx="12192000" cy="6858000"/><p:notesSz cx="6858000" cy="9144000"/><p:extLst><p:ext uri="{{521415D9-36F7-43E2-AB2F-B90AF26B5E84}}"><p14:sectionLst xmlns:p14="http://schemas.microsoft.com/office/powerpoint/2010/main"><p14:section name="Default Section" id="{{6F5D4E3C-2B1A-4C9D-8E7F-0A1B2C3D4E5F}}"><p14:sldIdLst>{section_ids}</p14:sldIdLst></p14:section></p14:sectionLst></p:ext></p:extLst></p:presentation>"#
        )
    }
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(
                r#"<Relationship Id="{}" Type="{}/{}" Target="{}"/>"#,
                id, REL_TYPE, kind, target
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
        REL_NS, body
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn slide_xml(slide: &SlideSpec) -> String {
    let mut tree = String::from(
        r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#,
    );
    for (i, shape) in slide.shapes.iter().enumerate() {
        let id = i + 2;
        let ph = if shape.placeholder {
            if i == 0 {
                r#"<p:ph type="title"/>"#.to_string()
            } else {
                format!(r#"<p:ph idx="{}"/>"#, i)
            }
        } else {
            String::new()
        };
        let paragraphs: String = shape
            .text
            .split('\n')
            .map(|line| {
                format!(
                    r#"<a:p><a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r></a:p>"#,
                    escape(line)
                )
            })
            .collect();
        tree.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Shape {id}"/><p:cNvSpPr/><p:nvPr>{ph}</p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
        ));
    }
    if slide.with_image {
        tree.push_str(r#"<p:pic><p:nvPicPr><p:cNvPr id="20" name="Picture"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill><p:spPr/></p:pic>"#);
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld {NS_DECL}><p:cSld><p:spTree>{tree}</p:spTree></p:cSld></p:sld>"#
    )
}

/// Names of the entries of a zip file on disk, in storage order.
pub fn zip_entry_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Read one entry of a zip file on disk.
pub fn read_zip_entry(path: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    data
}
