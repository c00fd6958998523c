//! Streaming MARCXML extractor
//!
//! [`MarcRecords`] yields one [`MetadataFields`] per `<record>` element of a
//! MARCXML collection. Only the record currently being read is held in
//! memory.
//!
//! | Tag | Subfields  | Field                                  |
//! |-----|------------|----------------------------------------|
//! | 001 |            | `_marc_id`                             |
//! | 034 | d, e, f, g | `_bbox_w`, `_bbox_e`, `_bbox_n`, `_bbox_s` |
//! | 100 | a          | `dc_creator_sm`                        |
//! | 110 | a          | `dc_creator_sm`                        |
//! | 245 | a, b       | `dc_title_s`                           |
//! | 260 | b          | `dc_publisher_s`                       |
//! | 260 | c          | `dct_issued_dt`, `solr_year_i`         |
//! | 520 | a          | `dc_description_s`                     |
//! | 650 | a          | `dc_subject_sm`                        |
//! | 651 | a          | `dct_spatial_sm`                       |

use crate::coordinates::convert_coord;
use crate::error::{ExtractError, ExtractResult};
use crate::fields::MetadataFields;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::io::BufRead;
use std::sync::LazyLock;
use tracing::{debug, warn};

static YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}").unwrap_or_else(|e| panic!("year pattern is invalid: {e}"))
});

/// One variable field as read from the document
#[derive(Debug, Default)]
struct DataField {
    tag: String,
    subfields: Vec<(String, String)>,
}

impl DataField {
    fn first(&self, code: &str) -> Option<&str> {
        self.subfields
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, v)| v.as_str())
    }
}

/// Fields of the record currently being read
#[derive(Debug, Default)]
struct RecordBuffer {
    control: Vec<(String, String)>,
    data: Vec<DataField>,
}

/// Where the reader is inside the current record
#[derive(Debug)]
enum Cursor {
    Outside,
    Record,
    Control(String),
    Data,
    Subfield(String),
}

/// Iterator over the records of a MARCXML collection.
pub struct MarcRecords<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    text: String,
    cursor: Cursor,
    record: RecordBuffer,
    field: DataField,
    depth: usize,
    done: bool,
}

impl<R: BufRead> MarcRecords<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            text: String::new(),
            cursor: Cursor::Outside,
            record: RecordBuffer::default(),
            field: DataField::default(),
            depth: 0,
            done: false,
        }
    }

    fn xml_error(&self, source: quick_xml::Error) -> ExtractError {
        ExtractError::Xml {
            position: self.reader.buffer_position(),
            source,
        }
    }

    fn next_record(&mut self) -> ExtractResult<Option<MetadataFields>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_event_into(&mut self.buf)
                .map(Event::into_owned);
            let event = match read {
                Ok(event) => event,
                Err(source) => return Err(self.xml_error(source)),
            };

            match event {
                Event::Start(ref e) => {
                    self.depth += 1;
                    self.text.clear();
                    self.open(e)?;
                },
                Event::Empty(ref e) => {
                    if e.local_name().as_ref() == b"record" {
                        debug!("Skipping empty MARC record");
                    }
                },
                Event::Text(ref e) => {
                    let unescaped = e.unescape().map_err(|source| self.xml_error(source))?;
                    self.text.push_str(&unescaped);
                },
                Event::CData(ref e) => {
                    self.text.push_str(&String::from_utf8_lossy(e));
                },
                Event::End(ref e) => {
                    self.depth = self.depth.saturating_sub(1);
                    if e.local_name().as_ref() == b"record" {
                        self.cursor = Cursor::Outside;
                        let record = std::mem::take(&mut self.record);
                        return Ok(Some(canonical_fields(&record)));
                    }
                    self.close();
                    self.text.clear();
                },
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(ExtractError::Truncated("record".to_string()));
                    }
                    return Ok(None);
                },
                _ => {},
            }
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) -> ExtractResult<()> {
        match e.local_name().as_ref() {
            b"record" => {
                self.record = RecordBuffer::default();
                self.cursor = Cursor::Record;
            },
            b"controlfield" => {
                self.cursor = Cursor::Control(attribute(e, b"tag")?);
            },
            b"datafield" => {
                self.field = DataField {
                    tag: attribute(e, b"tag")?,
                    subfields: Vec::new(),
                };
                self.cursor = Cursor::Data;
            },
            b"subfield" if matches!(self.cursor, Cursor::Data) => {
                self.cursor = Cursor::Subfield(attribute(e, b"code")?);
            },
            _ => {},
        }
        Ok(())
    }

    fn close(&mut self) {
        match std::mem::replace(&mut self.cursor, Cursor::Record) {
            Cursor::Control(tag) => {
                self.record.control.push((tag, self.text.trim().to_string()));
            },
            Cursor::Subfield(code) => {
                self.field
                    .subfields
                    .push((code, self.text.trim().to_string()));
                self.cursor = Cursor::Data;
            },
            Cursor::Data => {
                self.record.data.push(std::mem::take(&mut self.field));
            },
            Cursor::Outside => self.cursor = Cursor::Outside,
            Cursor::Record => {},
        }
    }
}

impl<R: BufRead> Iterator for MarcRecords<R> {
    type Item = ExtractResult<MetadataFields>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(fields)) => Some(Ok(fields)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

/// Iterate over the records of a MARCXML document.
pub fn records<R: BufRead>(input: R) -> MarcRecords<R> {
    MarcRecords::new(input)
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> ExtractResult<String> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(attr
            .unescape_value()
            .map_err(|source| ExtractError::Xml {
                position: 0,
                source,
            })?
            .trim()
            .to_string()),
        None => Err(ExtractError::invalid(
            &String::from_utf8_lossy(e.local_name().as_ref()),
            format!("missing '{}' attribute", String::from_utf8_lossy(name)),
        )),
    }
}

fn trim_punctuation(value: &str, chars: &[char]) -> String {
    value.trim().trim_end_matches(chars).trim().to_string()
}

fn canonical_fields(record: &RecordBuffer) -> MetadataFields {
    let mut fields = MetadataFields::new();

    for (tag, value) in &record.control {
        if tag == "001" && !value.is_empty() {
            fields.set_text("_marc_id", value.as_str());
        }
    }

    for field in &record.data {
        match field.tag.as_str() {
            "034" => {
                let corners = [("d", "_bbox_w"), ("e", "_bbox_e"), ("f", "_bbox_n"), ("g", "_bbox_s")];
                for (code, key) in corners {
                    let Some(raw) = field.first(code) else { continue };
                    match convert_coord(raw, None) {
                        Some(value) => fields.set_text_once(key, value.normalized().to_string()),
                        None => warn!(value = raw, subfield = code, "Unparsable coordinate in 034"),
                    }
                }
            },
            "100" | "110" => {
                if let Some(name) = field.first("a") {
                    fields.add_to_set("dc_creator_sm", trim_punctuation(name, &[',', '.']));
                }
            },
            "245" => {
                let title: Vec<&str> = ["a", "b"].iter().filter_map(|c| field.first(c)).collect();
                if !title.is_empty() {
                    let joined = title.join(" ");
                    let title = trim_punctuation(&joined, &['/', ':', ';', ',', '.', ' ']);
                    fields.set_text_once("dc_title_s", title);
                }
            },
            "260" => {
                if let Some(publisher) = field.first("b") {
                    let publisher = trim_punctuation(publisher, &[',', ':', ';']);
                    fields.set_text_once("dc_publisher_s", publisher);
                }
                if let Some(date) = field.first("c") {
                    let issued = trim_punctuation(date, &['.']);
                    if let Some(year) = YEAR_REGEX.find(&issued) {
                        fields.set_text_once("solr_year_i", year.as_str());
                    }
                    fields.set_text_once("dct_issued_dt", issued);
                }
            },
            "520" => {
                if let Some(description) = field.first("a") {
                    fields.set_text_once("dc_description_s", description);
                }
            },
            "650" => {
                if let Some(subject) = field.first("a") {
                    fields.add_to_set("dc_subject_sm", trim_punctuation(subject, &['.']));
                }
            },
            "651" => {
                if let Some(place) = field.first("a") {
                    fields.add_to_set("dct_spatial_sm", trim_punctuation(place, &['.']));
                }
            },
            _ => {},
        }
    }

    fields
}
