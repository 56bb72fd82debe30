//! Per-layer outcome report.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LayerOutcome {
    Optimized,
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub layer: String,
    pub outcome: LayerOutcome,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            LayerOutcome::Optimized => write!(f, "{} - OPTIMIZED", self.layer),
            LayerOutcome::Rejected(reason) => {
                write!(f, "{} - Not Optimizing ({reason})", self.layer)
            }
        }
    }
}

/// One line per layer considered, in the order they were visited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    pub entries: Vec<ReportEntry>,
}

impl CompileReport {
    pub fn optimized(&mut self, layer: impl Into<String>) {
        self.entries.push(ReportEntry {
            layer: layer.into(),
            outcome: LayerOutcome::Optimized,
        });
    }

    pub fn rejected(&mut self, layer: impl Into<String>, reason: impl Into<String>) {
        self.entries.push(ReportEntry {
            layer: layer.into(),
            outcome: LayerOutcome::Rejected(reason.into()),
        });
    }

    pub fn optimized_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == LayerOutcome::Optimized)
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.entries.len() - self.optimized_count()
    }

    pub fn outcome(&self, layer: &str) -> Option<&LayerOutcome> {
        self.entries
            .iter()
            .find(|e| e.layer == layer)
            .map(|e| &e.outcome)
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_follow_the_fixed_format() {
        let mut report = CompileReport::default();
        report.optimized("Glow");
        report.rejected("Wave", "Transition has exit time");
        assert_eq!(
            report.to_string(),
            "Glow - OPTIMIZED\nWave - Not Optimizing (Transition has exit time)"
        );
        assert_eq!(report.optimized_count(), 1);
        assert_eq!(report.rejected_count(), 1);
        assert_eq!(
            report.outcome("Wave"),
            Some(&LayerOutcome::Rejected("Transition has exit time".into()))
        );
    }
}
