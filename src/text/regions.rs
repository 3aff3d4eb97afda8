//! Character-indexed text regions of an element
//!
//! All offsets are character counts, not byte offsets. Editing a region
//! shifts or collapses the cursor entries that point into it.

use crate::error::TreeError;
use crate::models::core::ElementId;
use crate::models::tree::{ElementTree, Result};
use crate::text::cursor::{CursorStateCollection, CursorStateEntry};
use serde::{Deserialize, Serialize};

/// Range of text spanning one or more regions of a single element
///
/// `ending_text_index` and `ending_region` left as `None` mean "to the end".
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RegionSpan {
    pub starting_text_index: usize,
    pub starting_region: usize,
    pub ending_text_index: Option<usize>,
    pub ending_region: Option<usize>,
}

impl RegionSpan {
    /// Span from a start position to the end of the element
    pub fn to_end(starting_region: usize, starting_text_index: usize) -> Self {
        Self {
            starting_text_index,
            starting_region,
            ending_text_index: None,
            ending_region: None,
        }
    }

    /// Span between two explicit positions
    pub fn between(starting_region: usize, starting_text_index: usize, ending_region: usize, ending_text_index: usize) -> Self {
        Self {
            starting_text_index,
            starting_region,
            ending_text_index: Some(ending_text_index),
            ending_region: Some(ending_region),
        }
    }

    fn last_region(&self, region_count: usize) -> usize {
        self.ending_region.unwrap_or(region_count.saturating_sub(1))
    }

    /// Part of `text` (region `region` of `region_count`) that lies inside the span
    pub fn clip(&self, region: usize, text: &str, region_count: usize) -> String {
        let last = self.last_region(region_count);
        if region < self.starting_region || region > last {
            return String::new();
        }
        let length = text.chars().count();
        let start = if region == self.starting_region {
            self.starting_text_index.min(length)
        } else {
            0
        };
        let end = match self.ending_text_index {
            Some(end) if region == last => end.min(length),
            _ => length,
        };
        text.chars().skip(start).take(end.saturating_sub(start)).collect()
    }
}

/// Byte offset of character `index`, clamped to the end
fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices().nth(index).map_or(text.len(), |(offset, _)| offset)
}

impl ElementTree {
    pub fn text(&self, id: ElementId, region: usize) -> Option<&str> {
        self.get(id).and_then(|node| node.regions().get(region)).map(String::as_str)
    }

    pub fn number_regions(&self, id: ElementId) -> usize {
        self.get(id).map_or(0, |node| node.regions().len())
    }

    /// Replace a whole region. Entries in it are clamped to the new length.
    pub fn set_text(
        &mut self,
        id: ElementId,
        region: usize,
        text: &str,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let count = node.regions.len();
        let slot = node
            .regions
            .get_mut(region)
            .ok_or(TreeError::RegionOutOfRange { region, count })?;
        *slot = text.to_string();
        let length = text.chars().count();

        if let Some(cursors) = cursors {
            cursors.rewrite(|entry| match *entry {
                CursorStateEntry::Element {
                    element,
                    text_index: Some(offset),
                    region: r,
                } if element == id && r == region && offset > length => {
                    Some(CursorStateEntry::at_text(id, region, length))
                }
                _ => None,
            });
        }
        self.node(id)?.notify(|visual| visual.element_data_changed(id));
        Ok(())
    }

    /// Insert `text` at character `text_index` of `region`
    ///
    /// Entries after the insertion point move forward. An entry exactly at
    /// the insertion point moves too unless `prefer_earlier_position` is set.
    pub fn insert_text(
        &mut self,
        id: ElementId,
        region: usize,
        text_index: usize,
        text: &str,
        prefer_earlier_position: bool,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let count = node.regions.len();
        let target = node
            .regions
            .get_mut(region)
            .ok_or(TreeError::RegionOutOfRange { region, count })?;
        let length = target.chars().count();
        if text_index > length {
            return Err(TreeError::TextIndexOutOfRange {
                index: text_index,
                length,
            });
        }
        target.insert_str(byte_offset(target, text_index), text);
        let inserted = text.chars().count();

        if let Some(cursors) = cursors {
            cursors.rewrite(|entry| match *entry {
                CursorStateEntry::Element {
                    element,
                    text_index: Some(offset),
                    region: r,
                } if element == id && r == region => {
                    let moves = offset > text_index || (offset == text_index && !prefer_earlier_position);
                    moves.then(|| CursorStateEntry::at_text(id, region, offset + inserted))
                }
                _ => None,
            });
        }
        self.node(id)?.notify(|visual| visual.element_data_changed(id));
        log::trace!("inserted {} chars into {:?} region {} at {}", inserted, id, region, text_index);
        Ok(())
    }

    /// Remove the text covered by `span`, returning it
    ///
    /// The starting region keeps its prefix, the ending region keeps its
    /// suffix and any regions between them are emptied. Regions are not merged.
    pub fn remove_text(
        &mut self,
        id: ElementId,
        span: RegionSpan,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<String> {
        let node = self.node_mut(id)?;
        let count = node.regions.len();
        let start_region = span.starting_region;
        let end_region = span.last_region(count);
        if start_region >= count {
            return Err(TreeError::RegionOutOfRange {
                region: start_region,
                count,
            });
        }
        if end_region >= count {
            return Err(TreeError::RegionOutOfRange {
                region: end_region,
                count,
            });
        }
        if end_region < start_region {
            return Err(TreeError::InvalidSpan);
        }

        let start_length = node.regions[start_region].chars().count();
        let end_length = node.regions[end_region].chars().count();
        let start_text = span.starting_text_index;
        let end_text = span.ending_text_index.unwrap_or(end_length);
        if start_text > start_length {
            return Err(TreeError::TextIndexOutOfRange {
                index: start_text,
                length: start_length,
            });
        }
        if end_text > end_length {
            return Err(TreeError::TextIndexOutOfRange {
                index: end_text,
                length: end_length,
            });
        }
        if start_region == end_region && end_text < start_text {
            return Err(TreeError::InvalidSpan);
        }

        let mut removed = String::new();
        if start_region == end_region {
            let text = &mut node.regions[start_region];
            let range = byte_offset(text, start_text)..byte_offset(text, end_text);
            removed.extend(text.drain(range));
        } else {
            let first = &mut node.regions[start_region];
            let cut = byte_offset(first, start_text);
            removed.push_str(&first[cut..]);
            first.truncate(cut);
            for region in start_region + 1..end_region {
                removed.push_str(&std::mem::take(&mut node.regions[region]));
            }
            let last = &mut node.regions[end_region];
            let cut = byte_offset(last, end_text);
            removed.extend(last.drain(..cut));
        }

        if let Some(cursors) = cursors {
            let collapsed = CursorStateEntry::at_text(id, start_region, start_text);
            cursors.rewrite(|entry| {
                let CursorStateEntry::Element {
                    element,
                    text_index: Some(offset),
                    region,
                } = *entry
                else {
                    return None;
                };
                if element != id || region < start_region || region > end_region {
                    return None;
                }
                let before = region == start_region && offset <= start_text;
                let after = region == end_region && offset >= end_text;
                match (before, after) {
                    (true, _) => None,
                    (false, true) if start_region == end_region => {
                        Some(CursorStateEntry::at_text(id, region, offset - (end_text - start_text)))
                    }
                    (false, true) => Some(CursorStateEntry::at_text(id, region, offset - end_text)),
                    (false, false) => Some(collapsed),
                }
            });
        }
        self.node(id)?.notify(|visual| visual.element_data_changed(id));
        log::trace!("removed {:?} from {:?}", removed, id);
        Ok(removed)
    }
}
