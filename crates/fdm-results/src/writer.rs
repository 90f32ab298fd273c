//! JSON-lines sample writer.

use std::io::Write;

use fdm_system::Value;
use serde::Serialize;

use crate::{ResultsResult, TimeSeries};

/// One logged sample as written to disk: `{"t": 0.1, "y": {...}}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Sample<'a> {
    pub t: f64,
    pub y: Option<&'a Value>,
}

/// Streams samples as one JSON object per line.
#[derive(Debug)]
pub struct JsonlWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn write_sample(&mut self, t: f64, y: Option<&Value>) -> ResultsResult<()> {
        serde_json::to_writer(&mut self.out, &Sample { t, y })?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Write every sample of a series (or of one of its fields).
    pub fn write_series(&mut self, series: &TimeSeries) -> ResultsResult<()> {
        for (t, y) in series.iter() {
            self.write_sample(t, Some(y))?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> ResultsResult<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::Record;

    #[test]
    fn one_object_per_line() {
        let mut w = JsonlWriter::new(Vec::new());
        let y: Value = Record::new().with("pos", 1.5).with("on", true).into();
        w.write_sample(0.0, Some(&y)).unwrap();
        w.write_sample(0.1, None).unwrap();
        assert_eq!(w.records_written(), 2);

        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"t":0.0,"y":{"pos":1.5,"on":true}}"#);
        assert_eq!(lines[1], r#"{"t":0.1,"y":null}"#);
    }
}
