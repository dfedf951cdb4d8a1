//! In-memory data set and its Implicit/Explicit VR Little Endian codec
//!
//! Elements are kept ordered by tag, which is also the order required on the
//! wire. Text values are stored already encoded in the data set's specific
//! character set: ISO_IR 100 (Latin-1) unless the data set declares
//! `ISO_IR 192`, which selects UTF-8.

use crate::dimse::tag::{dictionary_vr, tags, Tag, Vr};
use crate::error::{DicomError, Result};
use crate::protocol::uid::TransferSyntax;
use bytes::BufMut;
use encoding::all::{ISO_8859_1, UTF_8};
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use std::collections::BTreeMap;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Deepest sequence nesting accepted when decoding
pub const MAX_SEQUENCE_DEPTH: usize = 32;

/// Character repertoire used for text values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterSet {
    /// ISO_IR 100 (also used for the default repertoire)
    #[default]
    Latin1,
    /// ISO_IR 192
    Utf8,
}

impl CharacterSet {
    /// Interpret a SpecificCharacterSet value (multi-valued terms allowed)
    pub fn from_term(term: &str) -> Self {
        if term
            .split('\\')
            .any(|t| t.trim().eq_ignore_ascii_case("ISO_IR 192"))
        {
            CharacterSet::Utf8
        } else {
            CharacterSet::Latin1
        }
    }

    /// Defined term written into SpecificCharacterSet
    pub fn term(self) -> &'static str {
        match self {
            CharacterSet::Latin1 => "ISO_IR 100",
            CharacterSet::Utf8 => "ISO_IR 192",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        let decoded = match self {
            CharacterSet::Latin1 => ISO_8859_1.decode(bytes, DecoderTrap::Replace),
            CharacterSet::Utf8 => UTF_8.decode(bytes, DecoderTrap::Replace),
        };
        decoded.unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        let encoded = match self {
            CharacterSet::Latin1 => ISO_8859_1.encode(text, EncoderTrap::Replace),
            CharacterSet::Utf8 => UTF_8.encode(text, EncoderTrap::Strict),
        };
        encoded.unwrap_or_else(|_| text.as_bytes().to_vec())
    }
}

/// Element value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw little-endian value bytes
    Primitive(Vec<u8>),
    /// Sequence items
    Sequence(Vec<DataSet>),
}

/// One data element
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Vr,
    pub value: Value,
}

/// Ordered collection of data elements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    elements: BTreeMap<Tag, Element>,
    charset: CharacterSet,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty data set whose text values use `charset`
    pub fn with_charset(charset: CharacterSet) -> Self {
        DataSet {
            elements: BTreeMap::new(),
            charset,
        }
    }

    pub fn charset(&self) -> CharacterSet {
        self.charset
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    /// Elements in ascending tag order
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Insert or replace an element
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.tag, element);
    }

    /// Set a text attribute; an empty string makes it a return key
    ///
    /// The VR comes from the built-in dictionary. Setting SpecificCharacterSet
    /// switches the encoding of text values put afterwards.
    pub fn put_str(&mut self, tag: Tag, value: &str) {
        if tag == tags::SPECIFIC_CHARACTER_SET {
            self.charset = CharacterSet::from_term(value);
        }
        let vr = match dictionary_vr(tag) {
            Vr::UN => Vr::LO,
            vr => vr,
        };
        let mut bytes = if vr == Vr::UI {
            value.as_bytes().to_vec()
        } else {
            self.charset.encode(value)
        };
        if bytes.len() % 2 == 1 {
            bytes.push(vr.padding());
        }
        self.insert(Element {
            tag,
            vr,
            value: Value::Primitive(bytes),
        });
    }

    pub fn put_u16(&mut self, tag: Tag, value: u16) {
        self.insert(Element {
            tag,
            vr: Vr::US,
            value: Value::Primitive(value.to_le_bytes().to_vec()),
        });
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) {
        self.insert(Element {
            tag,
            vr: Vr::UL,
            value: Value::Primitive(value.to_le_bytes().to_vec()),
        });
    }

    /// Set a sequence attribute; an empty item list is a sequence return key
    pub fn put_sequence(&mut self, tag: Tag, items: Vec<DataSet>) {
        self.insert(Element {
            tag,
            vr: Vr::SQ,
            value: Value::Sequence(items),
        });
    }

    /// Text value with padding removed, `None` if the attribute is absent
    pub fn get_str(&self, tag: Tag) -> Option<String> {
        match &self.get(tag)?.value {
            Value::Primitive(bytes) => Some(
                self.charset
                    .decode(bytes)
                    .trim_matches(|c: char| c == ' ' || c == '\0')
                    .to_string(),
            ),
            Value::Sequence(_) => None,
        }
    }

    /// Text value split at the backslash value delimiter
    pub fn get_strs(&self, tag: Tag) -> Vec<String> {
        match self.get_str(tag) {
            Some(text) if !text.is_empty() => {
                text.split('\\').map(|s| s.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn get_u16(&self, tag: Tag) -> Option<u16> {
        match &self.get(tag)?.value {
            Value::Primitive(bytes) if bytes.len() >= 2 => {
                Some(u16::from_le_bytes([bytes[0], bytes[1]]))
            }
            _ => None,
        }
    }

    pub fn get_u32(&self, tag: Tag) -> Option<u32> {
        match &self.get(tag)?.value {
            Value::Primitive(bytes) if bytes.len() >= 4 => {
                Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            _ => None,
        }
    }

    pub fn get_sequence(&self, tag: Tag) -> Option<&[DataSet]> {
        match &self.get(tag)?.value {
            Value::Sequence(items) => Some(items),
            Value::Primitive(_) => None,
        }
    }

    /// Encode with defined lengths in the given transfer syntax
    pub fn encode(&self, ts: TransferSyntax) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf, ts.is_explicit_vr())?;
        Ok(buf)
    }

    fn encode_into(&self, buf: &mut Vec<u8>, explicit: bool) -> Result<()> {
        for element in self.elements.values() {
            match &element.value {
                Value::Primitive(bytes) => {
                    let padded = bytes.len() % 2 == 1;
                    let length = bytes.len() + usize::from(padded);
                    put_element_header(buf, element.tag, element.vr, length, explicit)?;
                    buf.extend_from_slice(bytes);
                    if padded {
                        buf.put_u8(element.vr.padding());
                    }
                }
                Value::Sequence(items) => {
                    let mut body = Vec::new();
                    for item in items {
                        let mut item_bytes = Vec::new();
                        item.encode_into(&mut item_bytes, explicit)?;
                        put_tag(&mut body, tags::ITEM);
                        body.put_u32_le(length_u32(item_bytes.len())?);
                        body.extend_from_slice(&item_bytes);
                    }
                    put_element_header(buf, element.tag, Vr::SQ, body.len(), explicit)?;
                    buf.extend_from_slice(&body);
                }
            }
        }
        Ok(())
    }

    /// Decode a complete data set encoded in the given transfer syntax
    ///
    /// Sequences and items with undefined length are accepted. Sequences
    /// nested deeper than [`MAX_SEQUENCE_DEPTH`] are rejected.
    pub fn decode(data: &[u8], ts: TransferSyntax) -> Result<Self> {
        let mut parser = Parser {
            data,
            pos: 0,
            explicit: ts.is_explicit_vr(),
        };
        parser.parse_dataset(Some(data.len()), CharacterSet::default(), 0)
    }
}

fn length_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&l| l != UNDEFINED_LENGTH)
        .ok_or_else(|| DicomError::violation(format!("Element too large: {} bytes", len)))
}

fn put_tag(buf: &mut Vec<u8>, tag: Tag) {
    buf.put_u16_le(tag.group());
    buf.put_u16_le(tag.element());
}

fn put_element_header(
    buf: &mut Vec<u8>,
    tag: Tag,
    vr: Vr,
    length: usize,
    explicit: bool,
) -> Result<()> {
    put_tag(buf, tag);
    let length = length_u32(length)?;
    if !explicit {
        buf.put_u32_le(length);
        return Ok(());
    }
    buf.put_slice(&vr.code());
    if vr.has_long_length() {
        buf.put_u16_le(0);
        buf.put_u32_le(length);
    } else {
        let short = u16::try_from(length).map_err(|_| {
            DicomError::violation(format!(
                "{} value of {} bytes does not fit a {:?} length field",
                tag, length, vr
            ))
        })?;
        buf.put_u16_le(short);
    }
    Ok(())
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Parser<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                DicomError::violation(format!(
                    "Data set truncated at offset {} (needed {} more bytes)",
                    self.pos, n
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let group = self.read_u16()?;
        let element = self.read_u16()?;
        Ok(Tag(group, element))
    }

    fn end_of(&self, length: u32) -> Result<usize> {
        let end = self.pos + length as usize;
        if end > self.data.len() {
            return Err(DicomError::violation(format!(
                "Length {} at offset {} overruns the data set",
                length, self.pos
            )));
        }
        Ok(end)
    }

    fn read_header(&mut self, tag: Tag) -> Result<(Vr, u32)> {
        if !self.explicit {
            return Ok((dictionary_vr(tag), self.read_u32()?));
        }
        let code = self.take(2)?;
        let vr = Vr::from_code([code[0], code[1]]).ok_or_else(|| {
            DicomError::violation(format!(
                "Unknown VR {:?} for {}",
                String::from_utf8_lossy(code),
                tag
            ))
        })?;
        let length = if vr.has_long_length() {
            self.take(2)?;
            self.read_u32()?
        } else {
            u32::from(self.read_u16()?)
        };
        Ok((vr, length))
    }

    /// Parse elements until `end`, or until an item delimitation when `end` is `None`
    fn parse_dataset(
        &mut self,
        end: Option<usize>,
        charset: CharacterSet,
        depth: usize,
    ) -> Result<DataSet> {
        let mut dataset = DataSet::with_charset(charset);
        loop {
            match end {
                Some(end) if self.pos >= end => break,
                None if self.pos >= self.data.len() => {
                    return Err(DicomError::violation(
                        "Item with undefined length is missing its delimiter",
                    ))
                }
                _ => {}
            }

            let tag = self.read_tag()?;
            if tag == tags::ITEM_DELIMITATION {
                self.read_u32()?;
                if end.is_some() {
                    return Err(DicomError::violation(
                        "Unexpected item delimitation in a defined-length item",
                    ));
                }
                break;
            }

            let (vr, length) = self.read_header(tag)?;
            let element = if length == UNDEFINED_LENGTH {
                if vr != Vr::SQ && vr != Vr::UN {
                    return Err(DicomError::violation(format!(
                        "Undefined length on non-sequence element {}",
                        tag
                    )));
                }
                // UN with undefined length always holds Implicit VR LE items
                let explicit = self.explicit;
                if vr == Vr::UN {
                    self.explicit = false;
                }
                let items = self.parse_sequence(None, dataset.charset, depth + 1);
                self.explicit = explicit;
                let items = items?;
                Element {
                    tag,
                    vr: Vr::SQ,
                    value: Value::Sequence(items),
                }
            } else if vr == Vr::SQ {
                let seq_end = self.end_of(length)?;
                let items = self.parse_sequence(Some(seq_end), dataset.charset, depth + 1)?;
                Element {
                    tag,
                    vr,
                    value: Value::Sequence(items),
                }
            } else {
                let bytes = self.take(length as usize)?;
                Element {
                    tag,
                    vr,
                    value: Value::Primitive(bytes.to_vec()),
                }
            };

            if let Some(end) = end {
                if self.pos > end {
                    return Err(DicomError::violation(format!(
                        "Element {} overruns its enclosing item (ends at {})",
                        tag, end
                    )));
                }
            }

            if tag == tags::SPECIFIC_CHARACTER_SET {
                if let Value::Primitive(bytes) = &element.value {
                    dataset.charset = CharacterSet::from_term(&String::from_utf8_lossy(bytes));
                }
            }
            dataset.insert(element);
        }
        Ok(dataset)
    }

    fn parse_sequence(
        &mut self,
        end: Option<usize>,
        charset: CharacterSet,
        depth: usize,
    ) -> Result<Vec<DataSet>> {
        if depth > MAX_SEQUENCE_DEPTH {
            return Err(DicomError::violation(format!(
                "Sequences nested deeper than {} levels at offset {}",
                MAX_SEQUENCE_DEPTH, self.pos
            )));
        }
        let mut items = Vec::new();
        loop {
            match end {
                Some(end) if self.pos >= end => break,
                _ => {}
            }

            let tag = self.read_tag()?;
            let length = self.read_u32()?;
            if tag == tags::SEQUENCE_DELIMITATION {
                if end.is_some() {
                    return Err(DicomError::violation(
                        "Unexpected sequence delimitation in a defined-length sequence",
                    ));
                }
                break;
            }
            if tag != tags::ITEM {
                return Err(DicomError::violation(format!(
                    "Expected a sequence item, found {}",
                    tag
                )));
            }
            let item = if length == UNDEFINED_LENGTH {
                self.parse_dataset(None, charset, depth)?
            } else {
                let item_end = self.end_of(length)?;
                self.parse_dataset(Some(item_end), charset, depth)?
            };
            items.push(item);
        }
        Ok(items)
    }
}
