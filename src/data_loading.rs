use crate::{EventMarker, PipelineError, Result, SensorReading, Session, NUM_AXES};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Bytes per reading in an `.eimu` file: six little-endian f32 values
const READING_BYTES: usize = NUM_AXES * 4;

const CSV_HEADER: [&str; 7] = ["ax", "ay", "az", "gx", "gy", "gz", "event"];

fn format_error(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::FileFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::Io(e),
    })
}

/// Load one session file, picking the parser from the file extension.
///
/// `position` is `(file_index, total_files)` when the file is part of a
/// directory load and is only used for progress output.
pub fn load_session(path: &Path, position: Option<(usize, usize)>) -> Result<Session> {
    match position {
        Some((index, total)) => info!("Loading session {}/{}: {}", index, total, path.display()),
        None => info!("Loading session: {}", path.display()),
    }

    let is_csv = path
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));

    let session = if is_csv {
        read_csv_session(path)?
    } else {
        read_eimu_session(path)?
    };

    debug!(
        "{}: version {}, {} Hz, {} readings, {} markers",
        path.display(),
        session.version(),
        session.sample_rate(),
        session.len(),
        session.markers().len()
    );

    Ok(session.with_source(path.to_path_buf(), position))
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let chunk = self.bytes.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(chunk)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

/// Parse the binary `.eimu` layout:
/// `u32 version, u32 sample_rate, u32 marker_count`, then per marker
/// `u32 index, u8 tag_len, tag bytes`, then `[f32; 6]` readings to EOF.
pub fn read_eimu_session(path: &Path) -> Result<Session> {
    let mut bytes = Vec::new();
    BufReader::new(open(path)?).read_to_end(&mut bytes)?;
    parse_eimu(&bytes).map_err(|reason| format_error(path, reason))
}

fn parse_eimu(bytes: &[u8]) -> std::result::Result<Session, String> {
    let mut cursor = ByteCursor { bytes, pos: 0 };
    let truncated = |what: &str| format!("file ends inside the {}", what);

    let version = cursor.u32().ok_or_else(|| truncated("header"))?;
    let sample_rate = cursor.u32().ok_or_else(|| truncated("header"))?;
    let marker_count = cursor.u32().ok_or_else(|| truncated("header"))?;

    let mut markers = Vec::with_capacity(marker_count.min(1024) as usize);
    for i in 0..marker_count {
        let index = cursor.u32().ok_or_else(|| truncated("marker table"))?;
        let tag_len = cursor.u8().ok_or_else(|| truncated("marker table"))?;
        let tag = cursor
            .take(tag_len as usize)
            .ok_or_else(|| truncated("marker table"))?;
        let kind = std::str::from_utf8(tag)
            .map_err(|e| format!("marker {} has a non UTF-8 tag: {}", i, e))?;
        markers.push(EventMarker::new(index as usize, kind));
    }

    let data = cursor.remaining();
    if data.len() % READING_BYTES != 0 {
        return Err(format!(
            "{} trailing bytes do not form a complete reading",
            data.len() % READING_BYTES
        ));
    }

    let readings: Vec<SensorReading> = data
        .chunks_exact(READING_BYTES)
        .map(|chunk| {
            let values: Vec<f64> = chunk
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect();
            SensorReading::new(
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
            )
        })
        .collect();

    Session::new(readings, markers, sample_rate, version).map_err(|e| e.to_string())
}

/// Write a session in the `.eimu` layout read by [`read_eimu_session`]
pub fn write_eimu_session(path: &Path, session: &Session) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&session.version().to_le_bytes())?;
    writer.write_all(&session.sample_rate().to_le_bytes())?;
    writer.write_all(&(session.markers().len() as u32).to_le_bytes())?;

    for marker in session.markers() {
        let tag = marker.kind.as_bytes();
        let tag_len = u8::try_from(tag.len()).map_err(|_| {
            PipelineError::InvalidSession(format!("marker tag '{}' exceeds 255 bytes", marker.kind))
        })?;
        writer.write_all(&(marker.index as u32).to_le_bytes())?;
        writer.write_all(&[tag_len])?;
        writer.write_all(tag)?;
    }

    for reading in session.readings() {
        for value in reading.channels() {
            writer.write_all(&(value as f32).to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Parse a CSV session: a `sample_rate,<n>,version,<v>` record, the
/// `ax,ay,az,gx,gy,gz,event` header, then one reading per row. A non-empty
/// `event` cell places a marker of that tag at the row.
pub fn read_csv_session(path: &Path) -> Result<Session> {
    let file = open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut records = rdr.records();
    let csv_error = |e: csv::Error| format_error(path, e.to_string());

    let meta = records
        .next()
        .ok_or_else(|| format_error(path, "missing sample_rate/version record"))?
        .map_err(csv_error)?;
    if meta.get(0) != Some("sample_rate") || meta.get(2) != Some("version") {
        return Err(format_error(
            path,
            "first record must be 'sample_rate,<n>,version,<v>'",
        ));
    }
    let parse_u32 = |field: Option<&str>, name: &str| -> Result<u32> {
        field
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| format_error(path, format!("invalid {}", name)))
    };
    let sample_rate = parse_u32(meta.get(1), "sample_rate")?;
    let version = parse_u32(meta.get(3), "version")?;

    let header = records
        .next()
        .ok_or_else(|| format_error(path, "missing column header"))?
        .map_err(csv_error)?;
    if header.iter().take(NUM_AXES).ne(CSV_HEADER.iter().take(NUM_AXES).copied()) {
        return Err(format_error(
            path,
            format!("expected header '{}'", CSV_HEADER.join(",")),
        ));
    }

    let mut readings = Vec::new();
    let mut markers = Vec::new();
    for (row, record) in records.enumerate() {
        let record = record.map_err(csv_error)?;
        let mut values = [0.0f64; NUM_AXES];
        for (axis, value) in values.iter_mut().enumerate() {
            *value = record
                .get(axis)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| {
                    format_error(
                        path,
                        format!("row {}: invalid {} value", row + 1, CSV_HEADER[axis]),
                    )
                })?;
        }
        if let Some(event) = record.get(NUM_AXES).filter(|s| !s.is_empty()) {
            markers.push(EventMarker::new(readings.len(), event));
        }
        readings.push(SensorReading::new(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        ));
    }

    Session::new(readings, markers, sample_rate, version)
        .map_err(|e| format_error(path, e.to_string()))
}

/// Every file under `root` with the given extension (case-insensitive),
/// in lexicographic path order.
pub fn scan_session_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(PipelineError::FileNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => PipelineError::Io(io),
            None => PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "filesystem loop while scanning sessions",
            )),
        })?;
        let path = entry.path();
        let matches = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|s| s.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    debug!("Found {} session files under {}", files.len(), root.display());
    Ok(files)
}
