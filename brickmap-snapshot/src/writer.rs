//! Streaming snapshot writer.

use crate::record::SnapshotRecord;
use brickmap_core::FormatError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Write;
use std::marker::PhantomData;

fn io_error(e: impl std::fmt::Display) -> FormatError {
    FormatError::Io {
        reason: e.to_string(),
    }
}

/// Writes one snapshot document: declaration, root element, one empty
/// element per record.
pub struct SnapshotWriter<W: Write, T: SnapshotRecord> {
    writer: Writer<W>,
    written: usize,
    _record: PhantomData<T>,
}

impl<W: Write, T: SnapshotRecord> SnapshotWriter<W, T> {
    /// Write the declaration and open the root element.
    pub fn new(inner: W) -> Result<Self, FormatError> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(io_error)?;
        writer
            .write_event(Event::Start(BytesStart::new(T::ROOT)))
            .map_err(io_error)?;
        Ok(Self {
            writer,
            written: 0,
            _record: PhantomData,
        })
    }

    pub fn write(&mut self, record: &T) -> Result<(), FormatError> {
        let attributes = record.to_attributes();
        let mut element = BytesStart::new(T::ELEMENT);
        for (name, value) in &attributes {
            element.push_attribute((*name, value.as_str()));
        }
        self.writer
            .write_event(Event::Empty(element))
            .map_err(io_error)?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the root element and hand back the sink.
    pub fn finish(mut self) -> Result<W, FormatError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(T::ROOT)))
            .map_err(io_error)?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n").map_err(io_error)?;
        inner.flush().map_err(io_error)?;
        Ok(inner)
    }
}

/// Write `records` as a complete document. Returns the record count.
pub fn write_snapshot<'a, W, T, I>(inner: W, records: I) -> Result<usize, FormatError>
where
    W: Write,
    T: SnapshotRecord + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = SnapshotWriter::<W, T>::new(inner)?;
    for record in records {
        writer.write(record)?;
    }
    let count = writer.written();
    writer.finish()?;
    Ok(count)
}
