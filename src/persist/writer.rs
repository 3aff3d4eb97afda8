//! Document writer
//!
//! Emits elements with quick-xml. Formats are written as integer ids taken
//! from the caller's [`FormatTable`]; formats it has not seen are registered.

use super::{Result, DOCUMENT_TAG, DOCUMENT_VERSION, GROUP_TAG, REGION_TAG, SLOT_TAG};
use crate::error::PersistError;
use crate::models::{Children, ElementId, ElementTree, FormatTable};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| PersistError::Write(e.to_string()))
}

/// Serializes element trees into the XML document format
pub struct DocumentWriter<'a> {
    formats: &'a mut FormatTable,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(formats: &'a mut FormatTable) -> Self {
        Self { formats }
    }

    /// Write `roots` (and everything beneath them) as one document
    pub fn write_document(&mut self, tree: &ElementTree, roots: &[ElementId]) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        let mut document = BytesStart::new(DOCUMENT_TAG);
        document.push_attribute(("version", DOCUMENT_VERSION));
        emit(&mut writer, Event::Start(document))?;
        for root in roots {
            self.write_element(&mut writer, tree, *root)?;
        }
        emit(&mut writer, Event::End(BytesEnd::new(DOCUMENT_TAG)))?;

        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| PersistError::Write(e.to_string()))
    }

    fn write_element(&mut self, writer: &mut XmlWriter, tree: &ElementTree, id: ElementId) -> Result<()> {
        let node = tree
            .get(id)
            .ok_or_else(|| PersistError::Structure(format!("stale element {:?}", id)))?;
        let tag = node.kind().tag();
        let mut start = BytesStart::new(tag);
        self.write_add_attributes(&mut start, tree, id);

        let has_content = !node.regions().is_empty() || !node.children().is_empty();
        if !has_content {
            return emit(writer, Event::Empty(start));
        }
        emit(writer, Event::Start(start))?;
        for text in node.regions() {
            write_region(writer, text)?;
        }
        self.write_children(writer, tree, node.children())?;
        emit(writer, Event::End(BytesEnd::new(tag)))
    }

    /// `handle` and, when the element has a format, `format`
    fn write_add_attributes(&mut self, start: &mut BytesStart<'_>, tree: &ElementTree, id: ElementId) {
        let Some(node) = tree.get(id) else {
            return;
        };
        start.push_attribute(("handle", node.handle().to_string().as_str()));
        if let Some(format) = node.format() {
            let format_id = self.formats.register(format);
            start.push_attribute(("format", format_id.to_string().as_str()));
        }
    }

    fn write_children(&mut self, writer: &mut XmlWriter, tree: &ElementTree, children: &Children) -> Result<()> {
        match children {
            Children::None => Ok(()),
            Children::Fixed(slots) => {
                for slot in slots {
                    match slot {
                        Some(child) => {
                            emit(writer, Event::Start(BytesStart::new(SLOT_TAG)))?;
                            self.write_element(writer, tree, *child)?;
                            emit(writer, Event::End(BytesEnd::new(SLOT_TAG)))?;
                        }
                        None => emit(writer, Event::Empty(BytesStart::new(SLOT_TAG)))?,
                    }
                }
                Ok(())
            }
            Children::Positional(children) => {
                for child in children {
                    self.write_element(writer, tree, *child)?;
                }
                Ok(())
            }
            Children::Grouped(groups) => {
                for group in groups {
                    if group.is_empty() {
                        emit(writer, Event::Empty(BytesStart::new(GROUP_TAG)))?;
                        continue;
                    }
                    emit(writer, Event::Start(BytesStart::new(GROUP_TAG)))?;
                    for child in group {
                        self.write_element(writer, tree, *child)?;
                    }
                    emit(writer, Event::End(BytesEnd::new(GROUP_TAG)))?;
                }
                Ok(())
            }
        }
    }
}

// Empty regions are written as empty tags so indentation never leaks into the text
fn write_region(writer: &mut XmlWriter, text: &str) -> Result<()> {
    if text.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new(REGION_TAG)));
    }
    emit(writer, Event::Start(BytesStart::new(REGION_TAG)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(REGION_TAG)))
}
