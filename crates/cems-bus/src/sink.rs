//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Sample sinks that subscribers register with the live bus."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::io::Write;

use cems_sim::Sample;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use crate::SinkError;

/// Receiver of live samples for one classroom.
///
/// Notifications run on the bus dispatch path, so implementations should hand
/// work off quickly. Errors and panics are contained by the bus.
pub trait SampleSink: Send + Sync {
    fn notify(&self, sample: &Sample) -> Result<(), SinkError>;

    /// Label used in delivery logs.
    fn name(&self) -> &str {
        "sink"
    }
}

/// Adapts a plain closure.
pub struct FnSink<F> {
    name: String,
    callback: F,
}

impl<F> FnSink<F>
where
    F: Fn(&Sample) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self::named("callback", callback)
    }

    pub fn named(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> SampleSink for FnSink<F>
where
    F: Fn(&Sample) + Send + Sync,
{
    fn notify(&self, sample: &Sample) -> Result<(), SinkError> {
        (self.callback)(sample);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").field("name", &self.name).finish()
    }
}

/// Emits each sample as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SampleSink for TracingSink {
    fn notify(&self, sample: &Sample) -> Result<(), SinkError> {
        if sample.offline {
            info!(classroom = %sample.classroom_id, time = %sample.timestamp, "classroom offline");
        } else {
            info!(
                classroom = %sample.classroom_id,
                time = %sample.timestamp,
                power_w = sample.power,
                current_ma = sample.current,
                voltage_v = sample.voltage,
                "live sample"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Forwards samples into an unbounded channel for async consumers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SampleSink for ChannelSink {
    fn notify(&self, sample: &Sample) -> Result<(), SinkError> {
        self.tx
            .send(sample.clone())
            .map_err(|_| SinkError::Closed("channel receiver dropped".into()))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> SampleSink for JsonLinesSink<W> {
    fn notify(&self, sample: &Sample) -> Result<(), SinkError> {
        let line = serde_json::to_string(sample)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

/// Keeps every sample it receives. Handy for inspection and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

impl SampleSink for RecordingSink {
    fn notify(&self, sample: &Sample) -> Result<(), SinkError> {
        self.samples.lock().push(sample.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cems_common::ClassroomId;
    use chrono::Utc;

    fn offline_sample() -> Sample {
        Sample::offline(ClassroomId::new(4).unwrap(), Utc::now())
    }

    #[test]
    fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        assert!(sink.notify(&offline_sample()).is_ok());
        drop(rx);
        assert!(matches!(
            sink.notify(&offline_sample()),
            Err(SinkError::Closed(_))
        ));
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_sample() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.notify(&offline_sample()).unwrap();
        sink.notify(&offline_sample()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["classroom"], 4);
        assert_eq!(value["offline"], true);
    }

    #[test]
    fn fn_sink_carries_its_name() {
        let sink = FnSink::named("dashboard", |_: &Sample| {});
        assert_eq!(sink.name(), "dashboard");
        assert!(sink.notify(&offline_sample()).is_ok());
    }
}
