//! Record-at-a-time snapshot reader.

use crate::record::{Attributes, SnapshotRecord};
use brickmap_core::FormatError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::marker::PhantomData;

/// Iterator over the records of one snapshot document.
///
/// Yields one `Result` per record element so the caller decides whether a
/// malformed record is skipped or aborts the import. An XML syntax error is
/// yielded once and ends the stream. Elements other than the record element
/// are ignored.
pub struct SnapshotReader<R: BufRead, T: SnapshotRecord> {
    reader: Reader<R>,
    buf: Vec<u8>,
    done: bool,
    _record: PhantomData<T>,
}

impl<R: BufRead, T: SnapshotRecord> SnapshotReader<R, T> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            done: false,
            _record: PhantomData,
        }
    }

    fn xml_error(&self, reason: impl std::fmt::Display) -> FormatError {
        FormatError::Xml {
            position: self.reader.buffer_position() as u64,
            reason: reason.to_string(),
        }
    }

    fn decode(&self, element: &BytesStart<'_>) -> Result<T, FormatError> {
        let mut attrs = Attributes::new(T::ELEMENT);
        for attr in element.attributes() {
            let attr = attr.map_err(|e| self.xml_error(e))?;
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| self.xml_error(e))?;
            attrs.insert(name, value.into_owned());
        }
        T::from_attributes(&attrs)
    }
}

impl<R: BufRead, T: SnapshotRecord> Iterator for SnapshotReader<R, T> {
    type Item = Result<T, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event.into_owned(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(self.xml_error(e)));
                }
            };
            match event {
                Event::Empty(ref element) | Event::Start(ref element)
                    if element.name().as_ref() == T::ELEMENT.as_bytes() =>
                {
                    return Some(self.decode(element));
                }
                Event::Eof => {
                    self.done = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

/// Read records of type `T` from `inner`.
pub fn read_snapshot<R: BufRead, T: SnapshotRecord>(inner: R) -> SnapshotReader<R, T> {
    SnapshotReader::new(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickmap_core::{ColorEquivalence, Direction, PartEquivalence};

    const PARTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<partmaps>
  <partmap id="1" masterid="3001" designid="3001" decorid="" name="Brick 2 x 4" blid="3001" ldrawid="3001.dat"
           ldd2bl="1" bl2ldd="1" ldd2dat="0" dat2ldd="0" bl2dat="0" dat2bl="0" lastmod="2016-11-20 10:00:00.0"/>
  <partmap id="2" masterid="3002" designid="3002" decorid="" name="Brick 2 x 3" blid="3002"
           ldd2bl="1" bl2ldd="0" ldd2dat="0" dat2ldd="0" bl2dat="0" dat2bl="0" lastmod=""/>
  <partmap id="3" masterid="3003" designid="3003" decorid="" name="Brick &amp; Co" blid="3003" ldrawid="3003.dat"
           ldd2bl="yes" bl2ldd="0" ldd2dat="1" dat2ldd="0" bl2dat="0" dat2bl="0" lastmod=""></partmap>
</partmaps>
"#;

    #[test]
    fn test_reader_yields_one_result_per_record() {
        let results: Vec<_> = read_snapshot::<_, PartEquivalence>(PARTS.as_bytes()).collect();
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.map_id, 1);
        assert!(first.enables(Direction::MarketplaceToPrimary));
        assert!(first.last_modified.is_some());

        assert_eq!(
            results[1].as_ref().unwrap_err(),
            &FormatError::MissingAttribute {
                element: "partmap",
                attribute: "ldrawid"
            }
        );

        let third = results[2].as_ref().unwrap();
        assert_eq!(third.name, "Brick & Co");
        assert!(!third.enables(Direction::PrimaryToMarketplace));
        assert!(third.enables(Direction::PrimaryToOpenFormat));
    }

    #[test]
    fn test_other_elements_are_ignored() {
        let doc = r#"<colormaps><comment text="x"/><colormap id="1" ldd="21" bl="5" ldraw="4" r="180" g="0" b="0" a="255"
            inuse="1" metallic="0" transparent="0" glitter="0" lddname="Bright Red" group="1" notes="" lastmod=""/></colormaps>"#;
        let colors: Vec<ColorEquivalence> = read_snapshot(doc.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].primary, Some(21));
        assert_eq!(colors[0].color.r, 180);
    }

    #[test]
    fn test_syntax_error_ends_stream() {
        let doc = r#"<partmaps><partmap id="1" masterid="a" designid="a" decorid="" name="" blid="" ldrawid=""
            ldd2bl="0" bl2ldd="0" ldd2dat="0" dat2ldd="0" bl2dat="0" dat2bl="0" lastmod=""/></wrong>
            <partmap id="2"/></partmaps>"#;
        let results: Vec<_> = read_snapshot::<_, PartEquivalence>(doc.as_bytes()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(FormatError::Xml { .. })));
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let results: Vec<_> =
            read_snapshot::<_, ColorEquivalence>("<colormaps/>".as_bytes()).collect();
        assert!(results.is_empty());
    }
}
