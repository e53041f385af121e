use crate::error::BenchmarkError;
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Errors raised while writing records.
pub type RecordError = BenchmarkError;

/// Column names, in the order [`BenchmarkRecord::fields`] emits them.
pub const HEADER: [&str; 21] = [
    "cores",
    "size",
    "cluster",
    "features",
    "km_wct_local",
    "km_wct_native",
    "km_wct_gpu",
    "km_wct_local_mt",
    "km_wct_native_mt",
    "dbscan_wct_local",
    "dbscan_wct_native",
    "dbscan_wct_gpu",
    "dbscan_wct_local_mt",
    "dbscan_wct_native_mt",
    "gpu_excl_kmeans",
    "local_mt_excl_kmeans",
    "native_mt_excl_kmeans",
    "gpu_excl_dbscan",
    "local_mt_excl_dbscan",
    "native_mt_excl_dbscan",
    "dbscan_cmp",
];

/// Written in place of a time that was not measured.
pub const NOT_MEASURED: &str = "-1";

/// Timings of one benchmark pass.
///
/// Wall-clock slots follow the variant column order (local, native, gpu,
/// local multi-thread, native multi-thread); exclusive slots hold the gpu,
/// local multi-thread and native multi-thread kernel times.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRecord {
    pub cores: usize,
    pub size: usize,
    pub clusters: usize,
    pub features: usize,
    pub kmeans_wall: [Option<Duration>; 5],
    pub dbscan_wall: [Option<Duration>; 5],
    pub kmeans_exclusive: [Option<Duration>; 3],
    pub dbscan_exclusive: [Option<Duration>; 3],
    /// Set when two DBSCAN label buffers of the pass differ
    pub dbscan_mismatch: bool,
}

impl BenchmarkRecord {
    pub fn new(cores: usize, size: usize, clusters: usize, features: usize) -> Self {
        Self {
            cores,
            size,
            clusters,
            features,
            kmeans_wall: [None; 5],
            dbscan_wall: [None; 5],
            kmeans_exclusive: [None; 3],
            dbscan_exclusive: [None; 3],
            dbscan_mismatch: false,
        }
    }

    /// Row values; times in seconds.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.cores.to_string(),
            self.size.to_string(),
            self.clusters.to_string(),
            self.features.to_string(),
        ];

        let times = self
            .kmeans_wall
            .iter()
            .chain(&self.dbscan_wall)
            .chain(&self.kmeans_exclusive)
            .chain(&self.dbscan_exclusive);
        fields.extend(times.map(|t| format_time(*t)));

        fields.push(u8::from(self.dbscan_mismatch).to_string());
        fields
    }
}

fn format_time(time: Option<Duration>) -> String {
    match time {
        Some(t) => format!("{:.6}", t.as_secs_f64()),
        None => NOT_MEASURED.to_string(),
    }
}

/// Destination of benchmark records.
pub trait RecordSink {
    fn write_header(&mut self) -> Result<(), RecordError>;

    fn write_record(&mut self, record: &BenchmarkRecord) -> Result<(), RecordError>;

    /// Free-text line, e.g. a cancellation notice.
    fn write_note(&mut self, _note: &str) -> Result<(), RecordError> {
        Ok(())
    }
}

/// In-memory sink, handy for tests and library callers.
impl RecordSink for Vec<BenchmarkRecord> {
    fn write_header(&mut self) -> Result<(), RecordError> {
        Ok(())
    }

    fn write_record(&mut self, record: &BenchmarkRecord) -> Result<(), RecordError> {
        self.push(record.clone());
        Ok(())
    }
}

/// `;`-delimited CSV sink. Every row is flushed as soon as it is written.
pub struct CsvRecordSink<W: Write> {
    writer: Writer<W>,
    header_written: bool,
}

impl CsvRecordSink<File> {
    /// Open `path`, appending to an existing file when `append` is set.
    ///
    /// The header is skipped when appending to a non-empty file.
    pub fn create<P: AsRef<Path>>(path: P, append: bool) -> Result<Self, RecordError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        let has_content = append && file.metadata()?.len() > 0;

        let mut sink = Self::from_writer(file);
        sink.header_written = has_content;
        Ok(sink)
    }
}

impl<W: Write> CsvRecordSink<W> {
    pub fn from_writer(inner: W) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .has_headers(false)
            .from_writer(inner);
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> Result<W, RecordError> {
        self.writer
            .into_inner()
            .map_err(|e| RecordError::Io(e.into_error()))
    }
}

impl<W: Write> RecordSink for CsvRecordSink<W> {
    fn write_header(&mut self) -> Result<(), RecordError> {
        if self.header_written {
            return Ok(());
        }
        self.writer.write_record(HEADER)?;
        self.writer.flush()?;
        self.header_written = true;
        Ok(())
    }

    fn write_record(&mut self, record: &BenchmarkRecord) -> Result<(), RecordError> {
        self.writer.write_record(record.fields())?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_note(&mut self, note: &str) -> Result<(), RecordError> {
        self.writer.write_record([note])?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_record() -> BenchmarkRecord {
        let mut record = BenchmarkRecord::new(4, 1024, 4, 2);
        record.kmeans_wall[0] = Some(Duration::from_millis(1500));
        record.dbscan_exclusive[1] = Some(Duration::from_micros(250));
        record.dbscan_mismatch = true;
        record
    }

    #[test]
    fn test_fields_layout() {
        let fields = sample_record().fields();

        assert_eq!(fields.len(), HEADER.len());
        assert_eq!(&fields[..4], &["4", "1024", "4", "2"]);
        assert_eq!(fields[4], "1.500000");
        assert_eq!(fields[5], NOT_MEASURED);
        assert_eq!(fields[18], "0.000250");
        assert_eq!(fields[20], "1");
    }

    #[test]
    fn test_csv_output() {
        let mut sink = CsvRecordSink::from_writer(Vec::new());
        sink.write_header().unwrap();
        sink.write_record(&sample_record()).unwrap();
        sink.write_note("Job cancelled").unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cores;size;cluster;features;km_wct_local;"));
        assert!(lines[0].ends_with(";dbscan_cmp"));
        assert!(lines[1].starts_with("4;1024;4;2;1.500000;-1;"));
        assert_eq!(lines[1].split(';').count(), 21);
        assert_eq!(lines[2], "Job cancelled");
    }

    #[test]
    fn test_append_skips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");

        {
            let mut sink = CsvRecordSink::create(&path, true).unwrap();
            sink.write_header().unwrap();
            sink.write_record(&sample_record()).unwrap();
        }
        {
            let mut sink = CsvRecordSink::create(&path, true).unwrap();
            sink.write_header().unwrap();
            sink.write_record(&sample_record()).unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("cores;")).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_truncate_without_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "stale\n").unwrap();

        let mut sink = CsvRecordSink::create(&path, false).unwrap();
        sink.write_header().unwrap();
        drop(sink);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("cores;"));
        assert!(!text.contains("stale"));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<BenchmarkRecord> = Vec::new();
        sink.write_header().unwrap();
        sink.write_record(&sample_record()).unwrap();
        sink.write_note("ignored").unwrap();

        assert_eq!(sink.len(), 1);
        assert!(sink[0].dbscan_mismatch);
    }
}
