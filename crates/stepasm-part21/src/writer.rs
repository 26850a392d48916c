//! Part 21 writer: emits the file skeleton and instances to any
//! [`std::io::Write`] sink.

use crate::error::StepError;
use crate::table::{Instance, InstanceKind, Record};
use std::fmt::Write as _;
use std::io::Write;

/// Streaming Part 21 writer.
///
/// Call [`begin`](Self::begin) once, then any number of instance writes,
/// then [`finish`](Self::finish).
pub struct StepWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> StepWriter<W> {
    /// Wrap a sink.
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Write `ISO-10303-21;`, the header section and `DATA;`.
    pub fn begin(&mut self, header: &str) -> Result<(), StepError> {
        writeln!(self.out, "ISO-10303-21;")?;
        writeln!(self.out, "HEADER;")?;
        let header = header.trim();
        if !header.is_empty() {
            writeln!(self.out, "{header}")?;
        }
        writeln!(self.out, "ENDSEC;")?;
        writeln!(self.out, "DATA;")?;
        Ok(())
    }

    /// Write one instance.
    pub fn write_instance(&mut self, instance: &Instance) -> Result<(), StepError> {
        writeln!(self.out, "{}", format_instance(instance))?;
        self.written += 1;
        Ok(())
    }

    /// Write `instance` under `new_id` with references mapped through `f`.
    pub fn write_renumbered(
        &mut self,
        instance: &Instance,
        new_id: u64,
        f: impl FnMut(u64) -> u64,
    ) -> Result<(), StepError> {
        self.write_instance(&instance.renumbered(new_id, f))
    }

    /// Number of instances written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the DATA section and the file, returning the sink.
    pub fn finish(mut self) -> Result<W, StepError> {
        writeln!(self.out, "ENDSEC;")?;
        writeln!(self.out, "END-ISO-10303-21;")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Render one instance as a single Part 21 statement.
pub fn format_instance(instance: &Instance) -> String {
    match &instance.kind {
        InstanceKind::Simple(r) => format!("#{} = {}({});", instance.id, r.keyword, r.params),
        InstanceKind::Complex(records) => {
            let body: Vec<String> = records.iter().map(format_record).collect();
            format!("#{} = ( {} );", instance.id, body.join("\n"))
        }
    }
}

fn format_record(record: &Record) -> String {
    format!("{}({})", record.keyword, record.params)
}

/// Format a real the way Part 21 requires: always a decimal point, upper
/// case exponent (`0.`, `-2.5`, `1.E-07`).
pub fn format_real(value: f64) -> String {
    if value == 0.0 {
        return "0.".to_string();
    }
    let abs = value.abs();
    if (1e-4..1e15).contains(&abs) {
        let mut s = format!("{value}");
        if !s.contains('.') {
            s.push('.');
        }
        s
    } else {
        // {:E} gives "1E-7" or "1.5E-7"
        let s = format!("{value:E}");
        match s.split_once('E') {
            Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.E{exp}"),
            _ => s,
        }
    }
}

/// Quote a string literal, doubling embedded apostrophes.
pub fn format_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Format a list of reals as `(a,b,c)`.
pub fn format_real_list(values: &[f64]) -> String {
    let mut out = String::from("(");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", format_real(*v));
    }
    out.push(')');
    out
}
