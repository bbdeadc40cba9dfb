use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use vigil_core::SourceId;

use super::Engine;

impl Engine {
    /// Human-readable dump of the latest readings for `source_ids`.
    ///
    /// One block per known source, fields in name order, arrival time last.
    /// Unknown sources are skipped.
    ///
    /// ```text
    /// 42:
    ///     temp : 30
    ///     received_at : 2024-05-01T12:00:00.000Z
    /// ```
    pub fn readings_summary(&self, source_ids: &[SourceId]) -> String {
        let memory = self.inner.lock_memory();
        let mut out = String::new();

        for source_id in source_ids {
            let Some(fact) = memory.facts.reading(source_id) else {
                continue;
            };
            let _ = writeln!(out, "{source_id}:");
            for (name, value) in fact.reading.fields() {
                match value.as_str() {
                    Some(text) => {
                        let _ = writeln!(out, "    {name} : {text}");
                    }
                    None => {
                        let _ = writeln!(out, "    {name} : {value}");
                    }
                }
            }
            let received_at = DateTime::<Utc>::from_timestamp_millis(fact.arrival_millis)
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| fact.arrival_millis.to_string());
            let _ = writeln!(out, "    received_at : {received_at}");
            out.push('\n');
        }

        out
    }
}
