use crate::metrics::{DocumentMetrics, PageMetrics};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// JSON-lines trace of rendering decisions, one object per line.
pub(crate) struct DebugLogger {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub(crate) fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            counters: BTreeMap::new(),
        })
    }

    pub(crate) fn log_json(&mut self, json: &str) {
        let _ = writeln!(self.writer, "{json}");
    }

    pub(crate) fn increment(&mut self, key: &str, amount: u64) {
        let entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub(crate) fn log_fallback(&mut self, page: usize, paint: &str, cols: u32, rows: u32) {
        self.increment("raster.fallback", 1);
        self.log_json(&format!(
            "{{\"type\":\"raster.fallback\",\"page\":{},\"paint\":\"{}\",\"cols\":{},\"rows\":{}}}",
            page,
            json_escape(paint),
            cols,
            rows
        ));
    }

    pub(crate) fn log_page(&mut self, page: &PageMetrics) {
        self.increment("pages", 1);
        self.increment("draws", page.draw_count as u64);
        self.increment("text_runs", page.text_runs as u64);
        self.increment("images", page.images as u64);
        self.log_json(&format!(
            "{{\"type\":\"page.close\",\"page\":{},\"draws\":{},\"skipped\":{},\"fallbacks\":{},\"content_bytes\":{},\"resources\":{},\"render_ms\":{:.3}}}",
            page.page_number,
            page.draw_count,
            page.skipped_count,
            page.raster_fallbacks,
            page.content_bytes,
            page.resource_refs,
            page.render_ms
        ));
    }

    pub(crate) fn log_discarded(&mut self, page: usize) {
        self.increment("pages.discarded", 1);
        self.log_json(&format!("{{\"type\":\"page.discarded\",\"page\":{page}}}"));
    }

    /// Writes the counters and document totals, then clears the counters.
    pub(crate) fn emit_summary(&mut self, context: &str, metrics: &DocumentMetrics) {
        let counters = std::mem::take(&mut self.counters);
        let counts_json = counters
            .iter()
            .map(|(key, value)| format!("\"{}\":{}", json_escape(key), value))
            .collect::<Vec<_>>()
            .join(",");
        let r = &metrics.resources;
        let json = format!(
            "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{{{}}},\"resources\":{{\"fonts\":{},\"images\":{},\"image_bytes\":{},\"shadings\":{},\"tilings\":{},\"ext_gstates\":{}}},\"total_bytes\":{}}}",
            json_escape(context),
            counts_json,
            r.fonts,
            r.images,
            r.image_bytes,
            r.shadings,
            r.tilings,
            r.ext_gstates,
            metrics.total_bytes
        );
        self.log_json(&json);
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_lines_and_summary_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let mut logger = DebugLogger::new(&path).expect("logger");
        logger.log_fallback(1, "linear \"gradient\"", 4, 2);
        logger.log_page(&PageMetrics {
            page_number: 1,
            draw_count: 3,
            ..PageMetrics::default()
        });
        logger.emit_summary("doc", &DocumentMetrics::default());
        logger.flush().expect("flush");

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"paint\":\"linear \\\"gradient\\\"\""));
        assert!(lines[1].starts_with("{\"type\":\"page.close\",\"page\":1,\"draws\":3"));
        assert!(lines[2].contains("\"counts\":{\"draws\":3,\"images\":0,\"pages\":1,\"raster.fallback\":1,\"text_runs\":0}"));
    }

    #[test]
    fn control_characters_are_escaped() {
        assert_eq!(json_escape("a\u{1}b\n"), "a\\u0001b\\n");
    }
}
