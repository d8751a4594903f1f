use crate::exporter::ExportModel;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::io::Write;

/// Write the export as one JSON document, indented by two spaces and followed
/// by a newline. Text is written as-is apart from the escapes JSON requires.
pub fn write_json<W: Write>(writer: &mut W, model: &ExportModel) -> std::io::Result<()> {
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut *writer, formatter);
    model.serialize(&mut ser)?;
    writeln!(writer)?;
    writer.flush()
}
