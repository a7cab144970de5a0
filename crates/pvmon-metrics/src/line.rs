//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt::{self, Write as _};

/// One point of the Prometheus import text format:
/// `name{label="value",...} value timestamp_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: String,
    /// Labels in emission order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
    /// Decimal places kept when rendering; `None` renders the raw value.
    pub precision: Option<u32>,
    pub timestamp_ms: i64,
}

impl MetricLine {
    pub fn new(name: impl Into<String>, value: f64, timestamp_ms: i64) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            value,
            precision: None,
            timestamp_ms,
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn precision(mut self, decimals: u32) -> Self {
        self.precision = Some(decimals);
        self
    }

    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value after rounding to the configured precision.
    pub fn rendered_value(&self) -> f64 {
        match self.precision {
            Some(decimals) => round_to(self.value, decimals),
            None => self.value,
        }
    }
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.labels.is_empty() {
            f.write_char('{')?;
            for (index, (key, value)) in self.labels.iter().enumerate() {
                if index > 0 {
                    f.write_char(',')?;
                }
                write!(f, "{key}=\"")?;
                write_escaped(f, value)?;
                f.write_char('"')?;
            }
            f.write_char('}')?;
        }
        f.write_char(' ')?;
        write_value(f, self.rendered_value())?;
        write!(f, " {}", self.timestamp_ms)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            other => f.write_char(other)?,
        }
    }
    Ok(())
}

fn write_value(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_nan() {
        f.write_str("NaN")
    } else if value.is_infinite() {
        f.write_str(if value > 0.0 { "+Inf" } else { "-Inf" })
    } else if value == 0.0 {
        // normalises -0
        f.write_str("0")
    } else {
        write!(f, "{value}")
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Render lines as one newline-terminated request body.
pub fn encode_lines(lines: &[MetricLine]) -> String {
    let mut body = String::with_capacity(lines.len() * 64);
    for line in lines {
        // Writing into a String cannot fail.
        let _ = writeln!(body, "{line}");
    }
    body
}
