//! Rendering of a [`DispatchReport`] on stdout.

use std::io::{self, Write};

use fanout::{DispatchReport, DispatchSummary, ExecutionError, OutputRecord};
use serde::Serialize;

use crate::args::OutputFormat;

/// JSON shape of one record. Output is rendered as lossy UTF-8 text.
#[derive(Debug, Serialize)]
struct RecordView<'a> {
    index: usize,
    item: &'a str,
    bytes: usize,
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ExecutionError>,
    output: std::borrow::Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<std::borrow::Cow<'a, str>>,
}

impl<'a> From<&'a OutputRecord> for RecordView<'a> {
    fn from(record: &'a OutputRecord) -> Self {
        Self {
            index: record.index,
            item: record.item.as_str(),
            bytes: record.len(),
            exit_code: record.exit_code,
            error: record.error.as_ref(),
            output: record.stdout_lossy(),
            stderr: record.stderr.as_deref().map(String::from_utf8_lossy),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportView<'a> {
    summary: &'a DispatchSummary,
    records: Vec<RecordView<'a>>,
}

/// Writes `report` in the requested format. Records must already be in
/// submission order.
pub fn render<W: Write>(
    out: &mut W,
    report: &DispatchReport,
    format: OutputFormat,
    print_sample: bool,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => write_text(out, report, print_sample),
        OutputFormat::Json => write_json(out, report),
    }
}

fn write_text<W: Write>(out: &mut W, report: &DispatchReport, print_sample: bool) -> io::Result<()> {
    for record in &report.records {
        let status = match &record.error {
            None => "ok".to_string(),
            Some(err) => format!("failed: {err}"),
        };
        writeln!(
            out,
            "{:>5}  {}  {} bytes  {}",
            record.index,
            record.item,
            record.len(),
            status
        )?;
    }

    let summary = &report.summary;
    writeln!(
        out,
        "{} items, {} failed, {} bytes total, limit {}, peak {}, {:.2?}",
        summary.total,
        summary.failed,
        summary.total_bytes,
        summary.limit,
        summary.peak_concurrency,
        summary.elapsed
    )?;

    if print_sample {
        if let Some(sample) = report.records.iter().find(|r| r.is_success()) {
            writeln!(out, "--- output of {} ---", sample.item)?;
            out.write_all(&sample.stdout)?;
            if !sample.stdout.ends_with(b"\n") && !sample.stdout.is_empty() {
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

fn write_json<W: Write>(out: &mut W, report: &DispatchReport) -> io::Result<()> {
    let view = ReportView {
        summary: &report.summary,
        records: report.records.iter().map(RecordView::from).collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &view)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout::{ConcurrencyLimit, DispatchId, Timestamp, WorkItem};
    use std::time::Duration;

    fn record(index: usize, item: &str, stdout: &[u8], error: Option<ExecutionError>) -> OutputRecord {
        OutputRecord {
            index,
            item: WorkItem::new(item).unwrap(),
            stdout: stdout.to_vec(),
            stderr: None,
            exit_code: if error.is_none() { Some(0) } else { Some(3) },
            error,
            started_at: Some(Timestamp::now()),
            finished_at: Timestamp::now(),
        }
    }

    fn report() -> DispatchReport {
        let records = vec![
            record(0, "abc123", b"100644 blob x\tREADME\n", None),
            record(
                1,
                "def456",
                b"",
                Some(ExecutionError::NonZeroExit {
                    program: "git".into(),
                    code: Some(3),
                    signal: None,
                }),
            ),
        ];
        DispatchReport {
            summary: DispatchSummary {
                dispatch_id: DispatchId::new_random(),
                total: 2,
                failed: 1,
                total_bytes: records.iter().map(|r| r.len() as u64).sum(),
                limit: ConcurrencyLimit::new(4).unwrap(),
                peak_concurrency: 2,
                elapsed: Duration::from_millis(15),
            },
            records,
        }
    }

    fn render_to_string(format: OutputFormat, sample: bool) -> String {
        let mut buf = Vec::new();
        render(&mut buf, &report(), format, sample).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_text_has_one_line_per_record_and_a_summary() {
        let text = render_to_string(OutputFormat::Text, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("abc123") && lines[0].ends_with("ok"));
        assert!(lines[1].contains("def456") && lines[1].contains("failed"));
        assert!(lines[2].starts_with("2 items, 1 failed, 21 bytes total, limit 4, peak 2"));
    }

    #[test]
    fn test_text_sample_prints_first_successful_output() {
        let text = render_to_string(OutputFormat::Text, true);
        assert!(text.contains("--- output of abc123 ---"));
        assert!(text.ends_with("100644 blob x\tREADME\n"));
    }

    #[test]
    fn test_json_is_parseable_with_errors_tagged() {
        let text = render_to_string(OutputFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        let records = value["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["bytes"], 21);
        assert!(records[0].get("error").is_none());
        assert_eq!(records[1]["error"]["kind"], "non_zero_exit");
        assert_eq!(value["summary"]["failed"], 1);
    }
}
